use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod models;
mod routes;
mod service;
mod store;
mod utils;

#[cfg(test)]
mod test_support;

use config::Config;
use db::init_db;

use crate::docs::ApiDoc;
use crate::service::{
    credentials::CredentialIssuer,
    duplicates::DuplicateCollapser,
    engine::AttendanceEngine,
    events::{
        BroadcastPublisher, EventFanout, LogNotificationSink, MySqlNotificationSink,
        NotificationSink,
    },
    justifications::JustificationDesk,
    reports::ReportMaterializer,
    retention::RetentionSweeper,
    schedule::ScheduleResolver,
    sheets::SheetGenerator,
};
use crate::store::{Stores, memory::InMemoryStore};
use crate::utils::day_bounds::{Clock, SystemClock};
use tracing::{info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

const REALTIME_CAPACITY: usize = 256;

#[get("/")]
async fn index() -> impl Responder {
    "Attendance service is running"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let calendar = config.calendar()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (stores, notifier) = match &config.database_url {
        Some(url) => {
            let pool = init_db(url).await?;
            let notifier: Arc<dyn NotificationSink> = Arc::new(MySqlNotificationSink::new(pool.clone()));
            (Stores::mysql(pool), notifier)
        }
        None => {
            warn!("DATABASE_URL not set, using the in-memory store");
            let notifier: Arc<dyn NotificationSink> = Arc::new(LogNotificationSink);
            (Stores::memory(Arc::new(InMemoryStore::new())), notifier)
        }
    };

    let publisher = Arc::new(BroadcastPublisher::new(REALTIME_CAPACITY));
    let mut realtime = publisher.subscribe();
    actix_web::rt::spawn(async move {
        loop {
            match realtime.recv().await {
                Ok(event) => tracing::debug!(event = %event.event, "Realtime event"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Realtime subscriber lagged")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let reports = Arc::new(ReportMaterializer::new(&stores, calendar, clock.clone()));
    let events = EventFanout::new(notifier, publisher, calendar);
    let engine = Arc::new(AttendanceEngine::new(
        &stores,
        reports.clone(),
        events,
        calendar,
        clock.clone(),
    ));
    let justifications = Data::new(JustificationDesk::new(&stores, engine.clone(), clock.clone()));
    let engine = Data::from(engine);
    let reports = Data::from(reports);
    let sheets = Data::new(SheetGenerator::new(&stores, calendar, clock.clone()));
    let duplicates = Data::new(DuplicateCollapser::new(&stores, calendar));
    let sweeper = Arc::new(RetentionSweeper::new(&stores, calendar, clock.clone()));
    let issuer = Data::new(CredentialIssuer::new(&stores, clock));
    let schedules = Data::new(ScheduleResolver::new(stores.schedules.clone(), calendar));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    if config.retention_enabled {
        actix_web::rt::spawn(sweeper.clone().run(shutdown_rx));
    }
    let sweeper = Data::from(sweeper);

    let server_addr = config.server_addr.clone();
    let config_data = config.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // wildcard matches JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::new(config.clone()))
            .app_data(engine.clone())
            .app_data(reports.clone())
            .app_data(sheets.clone())
            .app_data(duplicates.clone())
            .app_data(sweeper.clone())
            .app_data(issuer.clone())
            .app_data(schedules.clone())
            .app_data(justifications.clone())
            .service(index)
            .configure(|cfg| routes::configure(cfg, config_data.clone()))
    })
    .bind(server_addr)?
    .run()
    .await?;

    // receivers may already be gone when retention is off
    let _ = shutdown_tx.send(true);
    info!("Server stopped");
    Ok(())
}
