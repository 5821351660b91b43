use anyhow::{Context, anyhow};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

use crate::utils::day_bounds::DayCalendar;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_addr: String,
    /// In-memory store when unset
    pub database_url: Option<String>,
    pub jwt_secret: String,

    // Rate limiting
    pub rate_scan_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,
    /// Business timezone as minutes east of UTC
    pub utc_offset_minutes: i32,
    pub retention_enabled: bool,
}

fn parsed_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();

        let config = Self {
            server_addr: env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty()),
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,

            rate_scan_per_min: parsed_or("RATE_SCAN_PER_MIN", 30)?,
            rate_protected_per_min: parsed_or("RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            utc_offset_minutes: parsed_or("UTC_OFFSET_MINUTES", -300)?,
            retention_enabled: parsed_or("RETENTION_ENABLED", true)?,
        };
        config.calendar()?;
        Ok(config)
    }

    pub fn calendar(&self) -> anyhow::Result<DayCalendar> {
        DayCalendar::from_offset_minutes(self.utc_offset_minutes)
            .ok_or_else(|| anyhow!("UTC_OFFSET_MINUTES out of range: {}", self.utc_offset_minutes))
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    fn config(offset: i32) -> Config {
        Config {
            server_addr: "127.0.0.1:0".into(),
            database_url: None,
            jwt_secret: "secret".into(),
            rate_scan_per_min: 30,
            rate_protected_per_min: 1000,
            api_prefix: "/api".into(),
            utc_offset_minutes: offset,
            retention_enabled: false,
        }
    }

    #[test]
    fn it_should_build_the_business_calendar() {
        assert!(config(-300).calendar().is_ok());
        assert!(config(0).calendar().is_ok());
    }

    #[test]
    fn it_should_reject_offsets_beyond_a_day() {
        assert!(config(24 * 60).calendar().is_err());
    }
}
