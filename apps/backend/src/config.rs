//! Server configuration from environment variables

use std::str::FromStr;

use anyhow::Context;
use srs_core::SessionConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// In-memory storage when unset.
    pub database_url: Option<String>,
    pub session: SessionConfig,
    pub max_interval_days: u32,
}

impl Config {
    /// Read `.env` (if present) and the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = SessionConfig::default();

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse(&lookup, "PORT", 3000)?,
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            session: SessionConfig {
                daily_limit: parse(&lookup, "SRS_DAILY_LIMIT", defaults.daily_limit)?,
                max_attempts: parse(&lookup, "SRS_MAX_ATTEMPTS", defaults.max_attempts)?,
            },
            max_interval_days: parse(&lookup, "SRS_MAX_INTERVAL_DAYS", 365)?,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a number, got '{raw}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert_eq!(config.database_url, None);
        assert_eq!(config.session, SessionConfig::default());
        assert_eq!(config.max_interval_days, 365);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("PORT", "8080"),
            ("DATABASE_URL", "postgres://localhost/srs"),
            ("SRS_DAILY_LIMIT", "50"),
            ("SRS_MAX_INTERVAL_DAYS", "180"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/srs"));
        assert_eq!(config.session.daily_limit, 50);
        assert_eq!(config.session.max_attempts, 3);
        assert_eq!(config.max_interval_days, 180);
    }

    #[test]
    fn test_rejects_non_numeric_limit() {
        let err = config(&[("SRS_DAILY_LIMIT", "lots")]).unwrap_err();
        assert!(err.to_string().contains("SRS_DAILY_LIMIT"));
    }
}
