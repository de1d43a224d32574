//! Environment-driven configuration, resolved once at process start.
//!
//! Follows the same `dotenvy::dotenv().ok()` + `std::env::var` pattern as
//! `runtimes::runtime_config::RuntimeConfig::resolve_sqlite_db_name`, just
//! aggregated into one struct so callers don't scatter `env::var` calls.

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Postgres connection string for the event store / repositories.
    pub database_url: String,
    /// Label used to namespace outbox/streaming topics; no broker client
    /// ships in this crate (see `relay::PublishSink`).
    pub broker_url: Option<String>,
    /// How often the outbox relay polls for unpublished entries.
    pub relay_interval: Duration,
    /// Max outbox entries published per relay tick.
    pub relay_batch_size: usize,
    /// How long published outbox entries are kept before cleanup.
    pub outbox_retention: Duration,
    /// Default `recursion_limit` for graphs that don't set one explicitly.
    pub default_recursion_limit: u64,
    /// Default per-node executor timeout.
    pub default_executor_timeout: Duration,
    /// Default wall-clock deadline for a single run.
    pub default_run_deadline: Duration,
}

impl AppConfig {
    /// Load configuration from the environment, applying `.env` first (if
    /// present) and falling back to hardcoded defaults for anything unset.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            database_url: env_var("DATABASE_URL", "postgres://localhost/weavegraph"),
            broker_url: std::env::var("BROKER_URL").ok(),
            relay_interval: Duration::from_millis(env_parse("WEAVEGRAPH_RELAY_INTERVAL_MS", 1_000)),
            relay_batch_size: env_parse("WEAVEGRAPH_RELAY_BATCH_SIZE", 10),
            outbox_retention: Duration::from_secs(
                env_parse("WEAVEGRAPH_OUTBOX_RETENTION_SECS", 7 * 24 * 60 * 60),
            ),
            default_recursion_limit: env_parse("WEAVEGRAPH_RECURSION_LIMIT", 25),
            default_executor_timeout: Duration::from_millis(
                env_parse("WEAVEGRAPH_EXECUTOR_TIMEOUT_MS", 30_000),
            ),
            default_run_deadline: Duration::from_secs(env_parse("WEAVEGRAPH_RUN_DEADLINE_SECS", 3_600)),
        }
    }
}

fn env_var(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
