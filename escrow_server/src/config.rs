//! Server configuration.
//!
//! Everything the process needs before it can open the database is read from `ESC_*` environment variables. Invalid
//! values are logged and replaced with their defaults; the server never refuses to start over a typo.
//!
//! Business rules are NOT configured here. They live in the database `config` table and are read through
//! [`escrow_engine::ConfigApi`].
use std::env;

use chrono::Duration;
use escrow_common::{format_duration, parse_boolean_flag, parse_duration};
use log::*;

const DEFAULT_ESC_HOST: &str = "127.0.0.1";
const DEFAULT_ESC_PORT: u16 = 8360;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/escrow.db";
const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::minutes(1);
const DEFAULT_RECONCILE_ROW_TIMEOUT: Duration = Duration::seconds(5);
const DEFAULT_RECONCILE_BATCH_SIZE: u32 = 100;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Time between reconciliation passes.
    pub reconcile_interval: Duration,
    /// Time budget for reconciling a single order. Orders that run over are retried on the next pass.
    pub reconcile_row_timeout: Duration,
    /// Number of open orders read from the database per page.
    pub reconcile_batch_size: u32,
    /// If true, pending migrations are applied when the server starts.
    pub run_migrations: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_ESC_HOST.to_string(),
            port: DEFAULT_ESC_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            reconcile_row_timeout: DEFAULT_RECONCILE_ROW_TIMEOUT,
            reconcile_batch_size: DEFAULT_RECONCILE_BATCH_SIZE,
            run_migrations: true,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("ESC_HOST").ok().unwrap_or_else(|| DEFAULT_ESC_HOST.into());
        let port = env::var("ESC_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for ESC_PORT. {e} Using the default, {DEFAULT_ESC_PORT}, instead."
                    );
                    DEFAULT_ESC_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_ESC_PORT);
        let database_url = env::var("ESC_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ ESC_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let reconcile_interval = duration_from_env("ESC_RECONCILE_INTERVAL", DEFAULT_RECONCILE_INTERVAL);
        let reconcile_row_timeout = duration_from_env("ESC_RECONCILE_ROW_TIMEOUT", DEFAULT_RECONCILE_ROW_TIMEOUT);
        let reconcile_batch_size = env::var("ESC_RECONCILE_BATCH_SIZE")
            .ok()
            .and_then(|s| match s.parse::<u32>() {
                Ok(0) => {
                    warn!("🪛️ ESC_RECONCILE_BATCH_SIZE cannot be zero. Using the default.");
                    None
                },
                Ok(n) => Some(n),
                Err(e) => {
                    warn!("🪛️ Invalid configuration value for ESC_RECONCILE_BATCH_SIZE. {e}");
                    None
                },
            })
            .unwrap_or(DEFAULT_RECONCILE_BATCH_SIZE);
        let run_migrations = parse_boolean_flag(env::var("ESC_RUN_MIGRATIONS").ok(), true);
        Self {
            host,
            port,
            database_url,
            reconcile_interval,
            reconcile_row_timeout,
            reconcile_batch_size,
            run_migrations,
        }
    }
}

fn duration_from_env(name: &str, default: Duration) -> Duration {
    env::var(name)
        .map_err(|_| info!("🪛️ {name} is not set. Using the default value of {}.", format_duration(default)))
        .and_then(|s| parse_duration(&s).map_err(|e| warn!("🪛️ Invalid configuration value for {name}. {e}")))
        .ok()
        .filter(|d| {
            let positive = *d > Duration::zero();
            if !positive {
                warn!("🪛️ {name} must be positive. Using the default value of {}.", format_duration(default));
            }
            positive
        })
        .unwrap_or(default)
}
