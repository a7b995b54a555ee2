//! Process configuration, read once from the environment at startup.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use omiesync_ledger::LedgerAccounts;

use crate::dispatch::{DispatcherConfig, RetryPolicy};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_SOURCE_VIEW: &str = "vw_omie_sync";
pub const DEFAULT_OMIE_BASE_URL: &str = "https://app.omie.com.br/api/v1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
    Postgres { database_url: String, view: String },
    /// Empty in-memory record set (development).
    Memory,
}

#[derive(Clone, PartialEq, Eq)]
pub struct OmieConfig {
    pub base_url: String,
    pub app_key: String,
    pub app_secret: String,
    /// Use the in-memory ledger instead of calling the remote API.
    pub dry_run: bool,
}

impl std::fmt::Debug for OmieConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OmieConfig")
            .field("base_url", &self.base_url)
            .field("app_key", &"<redacted>")
            .field("app_secret", &"<redacted>")
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub source: SourceConfig,
    pub omie: OmieConfig,
    pub accounts: LedgerAccounts,
    pub dispatcher: DispatcherConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let bind_addr: SocketAddr = env.parsed("BIND_ADDR", DEFAULT_BIND_ADDR.parse().ok())?;

        let source = match env.get("SOURCE").as_deref().unwrap_or("postgres") {
            "postgres" => SourceConfig::Postgres {
                database_url: env.required("DATABASE_URL")?,
                view: env
                    .get("SOURCE_VIEW")
                    .unwrap_or_else(|| DEFAULT_SOURCE_VIEW.to_string()),
            },
            "memory" => SourceConfig::Memory,
            other => {
                return Err(ConfigError::Invalid {
                    var: "SOURCE",
                    value: other.to_string(),
                    reason: "expected `postgres` or `memory`".to_string(),
                });
            }
        };

        let dry_run = env.flag("OMIE_DRY_RUN")?;
        let credential = |var: &'static str| -> Result<String, ConfigError> {
            if dry_run {
                Ok(env.get(var).unwrap_or_default())
            } else {
                env.required(var)
            }
        };
        let omie = OmieConfig {
            base_url: env
                .get("OMIE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OMIE_BASE_URL.to_string()),
            app_key: credential("OMIE_APP_KEY")?,
            app_secret: credential("OMIE_APP_SECRET")?,
            dry_run,
        };

        let accounts = LedgerAccounts {
            counterparty_code: env.parsed("OMIE_CLIENT_CODE", Some(0))?,
            receivable_category: env
                .get("OMIE_RECEIVABLE_CATEGORY")
                .unwrap_or_else(|| "1.01.01".to_string()),
            payable_category: env
                .get("OMIE_PAYABLE_CATEGORY")
                .unwrap_or_else(|| "2.01.01".to_string()),
            account_id: env.parsed("OMIE_ACCOUNT_ID", Some(0))?,
        };

        let defaults = DispatcherConfig::default();
        let concurrency: usize = env.parsed("DISPATCH_CONCURRENCY", Some(defaults.concurrency))?;
        if concurrency == 0 {
            return Err(ConfigError::Invalid {
                var: "DISPATCH_CONCURRENCY",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let max_attempts: u32 = env.parsed("DISPATCH_MAX_ATTEMPTS", Some(defaults.retry.max_attempts))?;
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "DISPATCH_MAX_ATTEMPTS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let base_delay_ms: u64 = env.parsed(
            "DISPATCH_BASE_DELAY_MS",
            Some(defaults.retry.base_delay.as_millis() as u64),
        )?;
        let interval_ms: u64 =
            env.parsed("DISPATCH_INTERVAL_MS", Some(defaults.interval.as_millis() as u64))?;
        let timeout_secs: u64 =
            env.parsed("DISPATCH_TIMEOUT_SECS", Some(defaults.call_timeout.as_secs()))?;

        let dispatcher = DispatcherConfig {
            concurrency,
            interval: Duration::from_millis(interval_ms),
            call_timeout: Duration::from_secs(timeout_secs),
            retry: RetryPolicy::exponential(max_attempts, Duration::from_millis(base_delay_ms)),
            ..defaults
        };

        Ok(Self {
            bind_addr,
            source,
            omie,
            accounts,
            dispatcher,
        })
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, var: &str) -> Option<String> {
        (self.0)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, var: &'static str) -> Result<String, ConfigError> {
        self.get(var).ok_or(ConfigError::Missing(var))
    }

    fn parsed<T>(&self, var: &'static str, default: Option<T>) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(var) {
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value: raw,
            }),
            None => default.ok_or(ConfigError::Missing(var)),
        }
    }

    fn flag(&self, var: &'static str) -> Result<bool, ConfigError> {
        match self.get(var).map(|v| v.to_lowercase()).as_deref() {
            None | Some("0" | "false" | "no" | "off") => Ok(false),
            Some("1" | "true" | "yes" | "on") => Ok(true),
            Some(other) => Err(ConfigError::Invalid {
                var,
                value: other.to_string(),
                reason: "expected a boolean".to_string(),
            }),
        }
    }
}
