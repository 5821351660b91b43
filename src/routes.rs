use crate::{
    api::{attendance, credential, justification, report, schedule},
    auth::middleware::auth_middleware,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

// Helper to build per-route limiter
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / requests_per_min as u64).max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        // period and burst are both non-zero above
        .unwrap_or_default();
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let scan_limiter = Arc::new(build_limiter(config.rate_scan_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(
                web::scope("/attendance")
                    // /attendance/entry, /attendance/exit
                    .service(
                        web::resource("/entry")
                            .wrap(scan_limiter.clone())
                            .route(web::post().to(attendance::mark_entry)),
                    )
                    .service(
                        web::resource("/exit")
                            .wrap(scan_limiter.clone())
                            .route(web::post().to(attendance::mark_exit)),
                    )
                    .service(web::resource("/manual").route(web::post().to(attendance::mark_manual)))
                    .service(
                        web::resource("/monthly-sheets")
                            .route(web::post().to(attendance::create_monthly_sheets)),
                    )
                    .service(
                        web::resource("/remove-duplicates")
                            .route(web::post().to(attendance::remove_duplicates)),
                    )
                    .service(web::resource("/justify").route(web::post().to(attendance::justify)))
                    .service(
                        web::resource("/unjustified/{employee_id}")
                            .route(web::get().to(attendance::unjustified_days)),
                    )
                    .service(
                        web::resource("/check-real/{employee_id}/{date}")
                            .route(web::get().to(attendance::check_attendance)),
                    )
                    // /attendance/report/...
                    .service(
                        web::resource("/report/month/{year}/{month}")
                            .route(web::get().to(attendance::month_records)),
                    )
                    .service(
                        web::resource("/report/range").route(web::post().to(attendance::range_records)),
                    )
                    .service(
                        web::resource("/report/stats/{year}/{month}")
                            .route(web::get().to(attendance::monthly_stats)),
                    )
                    .service(web::resource("/cleanup").route(web::post().to(attendance::cleanup))),
            )
            .service(
                web::scope("/reports")
                    .service(
                        web::resource("/year/{year}/month/{month}")
                            .route(web::get().to(report::by_year_month)),
                    )
                    .service(web::resource("/year/{year}").route(web::get().to(report::by_year)))
                    .service(web::resource("/date-range").route(web::post().to(report::by_date_range)))
                    .service(web::resource("/employee/{id}").route(web::get().to(report::by_employee)))
                    .service(
                        web::resource("/stats/year/{year}/month/{month}")
                            .route(web::get().to(report::stats)),
                    )
                    .service(web::resource("/sync-all").route(web::post().to(report::sync_all)))
                    .service(web::resource("/sync-status").route(web::get().to(report::sync_status)))
                    .service(web::resource("/fix-months").route(web::post().to(report::fix_months))),
            )
            .service(
                web::scope("/qr")
                    // /qr
                    .service(
                        web::resource("")
                            .route(web::post().to(credential::create_credential))
                            .route(web::get().to(credential::list_credentials)),
                    )
                    // /qr/{id}/deactivate
                    .service(
                        web::resource("/{id}/deactivate")
                            .route(web::put().to(credential::deactivate_credential)),
                    ),
            )
            .service(
                web::scope("/justifications")
                    .service(
                        web::resource("")
                            .route(web::post().to(justification::create_justification))
                            .route(web::get().to(justification::list_justifications)),
                    )
                    .service(
                        web::resource("/pending")
                            .route(web::get().to(justification::pending_justifications)),
                    )
                    .service(
                        web::resource("/employee/{employee_id}")
                            .route(web::get().to(justification::employee_justifications)),
                    )
                    .service(
                        web::resource("/verify/{employee_id}/{date}")
                            .route(web::get().to(justification::verify_justification)),
                    )
                    .service(
                        web::resource("/{id}").route(web::get().to(justification::get_justification)),
                    )
                    .service(
                        web::resource("/{id}/approve")
                            .route(web::put().to(justification::approve_justification)),
                    )
                    .service(
                        web::resource("/{id}/reject")
                            .route(web::put().to(justification::reject_justification)),
                    ),
            )
            .service(
                web::scope("/schedule")
                    .service(web::resource("").route(web::post().to(schedule::create_schedule))),
            ),
    );
}
