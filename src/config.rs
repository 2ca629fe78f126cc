use std::time::Duration;

use crate::middleware::credentials::HashParams;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Unset selects the in-memory store.
    pub database_url: Option<String>,
    /// Lifetime of SESSION credentials minted at login.
    pub session_ttl: Duration,
    pub hash: HashParams,
    /// Requests per window per IP on the auth endpoints. 0 = disabled.
    pub rate_limit: usize,
    pub rate_limit_window: Duration,
    /// Most distinct IPs the throttle tracks at once.
    pub rate_limit_capacity: usize,
    /// Outbound frames queued per realtime channel before it is dropped.
    pub ws_buffer: usize,
    /// Tombstoned workers older than this are purged. 0 = keep forever.
    pub tombstone_retention_days: u32,
    pub dashboard_origin: String,
    pub production: bool,
}

impl Config {
    /// Defaults with cheap hashing and no throttle.
    pub fn for_tests() -> Self {
        Self {
            port: 0,
            database_url: None,
            session_ttl: Duration::from_secs(86_400),
            hash: HashParams::for_tests(),
            rate_limit: 0,
            rate_limit_window: Duration::from_secs(60),
            rate_limit_capacity: 10_000,
            ws_buffer: 64,
            tombstone_retention_days: 0,
            dashboard_origin: "http://localhost:3000".into(),
            production: false,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Longest tombstone retention accepted, in days (100 years).
pub const MAX_RETENTION_DAYS: u32 = 36_500;

pub fn check_retention_days(days: u32) -> anyhow::Result<()> {
    if days > MAX_RETENTION_DAYS {
        anyhow::bail!(
            "tombstone retention of {} days exceeds the maximum of {}",
            days,
            MAX_RETENTION_DAYS
        );
    }
    Ok(())
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let env_mode = std::env::var("FORGE_ENV")
        .or_else(|_| std::env::var("RUST_ENV"))
        .unwrap_or_default();
    let production = env_mode == "production";

    let database_url = std::env::var("DATABASE_URL")
        .ok()
        .filter(|v| !v.trim().is_empty());

    if database_url.is_none() {
        if production {
            anyhow::bail!(
                "DATABASE_URL is not set. The in-memory store loses all data on restart \
                 and is refused when FORGE_ENV=production."
            );
        }
        eprintln!("⚠️  DATABASE_URL is not set, using the in-memory store. Data will not survive a restart.");
    }

    let tombstone_retention_days = env_or("FORGE_TOMBSTONE_RETENTION_DAYS", 0u32);
    check_retention_days(tombstone_retention_days)?;

    let defaults = HashParams::default();
    let hash = HashParams {
        memory_kib: env_or("FORGE_HASH_MEMORY_KIB", defaults.memory_kib),
        iterations: env_or("FORGE_HASH_ITERATIONS", defaults.iterations),
        parallelism: defaults.parallelism,
    };

    Ok(Config {
        port: env_or("FORGE_PORT", 8080),
        database_url,
        session_ttl: Duration::from_secs(env_or("FORGE_SESSION_TTL_SECS", 86_400)),
        hash,
        rate_limit: env_or("FORGE_RATE_LIMIT", 10),
        rate_limit_window: Duration::from_secs(env_or("FORGE_RATE_LIMIT_WINDOW", 60)),
        rate_limit_capacity: env_or("FORGE_RATE_LIMIT_CAPACITY", 10_000),
        ws_buffer: env_or("FORGE_WS_BUFFER", 64),
        tombstone_retention_days,
        dashboard_origin: std::env::var("DASHBOARD_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".into()),
        production,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("FORGE_TEST_ENV_OR_GARBAGE", "not-a-number");
        assert_eq!(env_or("FORGE_TEST_ENV_OR_GARBAGE", 42u32), 42);
        std::env::set_var("FORGE_TEST_ENV_OR_GARBAGE", " 7 ");
        assert_eq!(env_or("FORGE_TEST_ENV_OR_GARBAGE", 42u32), 7);
        assert_eq!(env_or("FORGE_TEST_ENV_OR_UNSET", 9usize), 9);
    }

    #[test]
    fn test_test_config_disables_throttle() {
        let cfg = Config::for_tests();
        assert_eq!(cfg.rate_limit, 0);
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.hash, HashParams::for_tests());
    }

    #[test]
    fn test_retention_days_bound() {
        assert!(check_retention_days(0).is_ok());
        assert!(check_retention_days(MAX_RETENTION_DAYS).is_ok());
        assert!(check_retention_days(MAX_RETENTION_DAYS + 1).is_err());
        assert!(check_retention_days(u32::MAX).is_err());
    }
}
