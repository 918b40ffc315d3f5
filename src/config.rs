use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    /// Absent means the in-memory store.
    pub database_url: Option<String>,
    /// YAML file with branches, users, policies and delegations.
    pub org_seed: Option<String>,
    /// Comma-separated list of webhook URLs notified on workflow events.
    pub webhook_urls: Vec<String>,
    /// Signs webhook bodies (x-docflow-signature) when set.
    pub webhook_secret: Option<String>,
    /// Per-attempt notification timeout.
    /// Set via DOCFLOW_NOTIFY_TIMEOUT_MS. Default: 5000.
    pub notify_timeout_ms: u64,
    /// Set via DOCFLOW_NOTIFY_MAX_ATTEMPTS. Default: 4.
    pub notify_max_attempts: u32,
    pub env: String,
}

impl Config {
    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }

    pub fn is_production(&self) -> bool {
        self.env == "production"
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let env = std::env::var("DOCFLOW_ENV")
        .or_else(|_| std::env::var("RUST_ENV"))
        .unwrap_or_else(|_| "development".into());

    let cfg = Config {
        port: std::env::var("DOCFLOW_PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .unwrap_or(8080),
        database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
        org_seed: std::env::var("DOCFLOW_ORG_SEED").ok().filter(|s| !s.is_empty()),
        webhook_urls: parse_list(&std::env::var("DOCFLOW_WEBHOOK_URLS").unwrap_or_default()),
        webhook_secret: std::env::var("DOCFLOW_WEBHOOK_SECRET")
            .ok()
            .filter(|s| !s.is_empty()),
        notify_timeout_ms: std::env::var("DOCFLOW_NOTIFY_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5000),
        notify_max_attempts: std::env::var("DOCFLOW_NOTIFY_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(4),
        env,
    };

    if cfg.is_production() {
        if cfg.database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set in production; the in-memory store is not durable");
        }
        if !cfg.webhook_urls.is_empty() && cfg.webhook_secret.is_none() {
            anyhow::bail!("DOCFLOW_WEBHOOK_SECRET must be set when webhooks are enabled in production");
        }
    }

    Ok(cfg)
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
