use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub notify_webhook_url: Option<String>,
    pub admin_username: Option<String>,
    pub min_key_len: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| env::var(k).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match non_empty("PORT") {
            Some(p) => p.parse().with_context(|| format!("PORT is not a valid port: {p}"))?,
            None => 8081,
        };
        let min_key_len = match non_empty("MIN_ENROLLMENT_KEY_LEN") {
            Some(n) => n
                .parse()
                .with_context(|| format!("MIN_ENROLLMENT_KEY_LEN is not a number: {n}"))?,
            None => 6,
        };

        Ok(Config {
            database_url: non_empty("DATABASE_URL").unwrap_or_else(|| "sqlite://coursegate.db".into()),
            port,
            notify_webhook_url: non_empty("NOTIFY_WEBHOOK_URL"),
            admin_username: non_empty("ADMIN_USERNAME"),
            min_key_len,
        })
    }
}
