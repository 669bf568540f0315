use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::NaiveTime;

const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

/// Server settings, read from `ROLLCALL_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub status_tick: Duration,
    /// Local time of day the roll-up and reconciliation run.
    pub daily_at: NaiveTime,
    pub public_url: String,
    pub retention_days: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = get("ROLLCALL_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("ROLLCALL_JWT_SECRET is unset or still a placeholder; set it in .env");
        }

        let port: u16 = var("ROLLCALL_PORT", "3000")
            .parse()
            .context("ROLLCALL_PORT must be a port number")?;

        let tick_secs: u64 = var("ROLLCALL_STATUS_TICK_SECS", "60")
            .parse()
            .context("ROLLCALL_STATUS_TICK_SECS must be a whole number of seconds")?;
        if tick_secs == 0 {
            bail!("ROLLCALL_STATUS_TICK_SECS must be positive");
        }

        let daily_raw = var("ROLLCALL_DAILY_AT", "00:05");
        let daily_at = NaiveTime::parse_from_str(&daily_raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&daily_raw, "%H:%M:%S"))
            .with_context(|| format!("ROLLCALL_DAILY_AT '{daily_raw}' is not HH:MM"))?;

        let retention_days: u32 = var("ROLLCALL_RETENTION_DAYS", "30")
            .parse()
            .context("ROLLCALL_RETENTION_DAYS must be a whole number of days")?;

        Ok(Self {
            jwt_secret,
            db_path: var("ROLLCALL_DB_PATH", "rollcall.db").into(),
            host: var("ROLLCALL_HOST", "0.0.0.0"),
            port,
            status_tick: Duration::from_secs(tick_secs),
            daily_at,
            public_url: var("ROLLCALL_PUBLIC_URL", "http://localhost:3000"),
            retention_days,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_with_only_a_secret() {
        let cfg = config(&[("ROLLCALL_JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.status_tick, Duration::from_secs(60));
        assert_eq!(cfg.daily_at, NaiveTime::from_hms_opt(0, 5, 0).unwrap());
        assert_eq!(cfg.retention_days, 30);
        assert_eq!(cfg.db_path, PathBuf::from("rollcall.db"));
    }

    #[test]
    fn placeholder_secret_is_refused() {
        assert!(config(&[]).is_err());
        assert!(config(&[("ROLLCALL_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn bad_values_are_reported() {
        let secret = ("ROLLCALL_JWT_SECRET", "s3cret");
        assert!(config(&[secret, ("ROLLCALL_DAILY_AT", "25:00")]).is_err());
        assert!(config(&[secret, ("ROLLCALL_STATUS_TICK_SECS", "0")]).is_err());
        let cfg = config(&[secret, ("ROLLCALL_DAILY_AT", "01:30:15")]).unwrap();
        assert_eq!(cfg.daily_at, NaiveTime::from_hms_opt(1, 30, 15).unwrap());
    }
}
