//! Process configuration loaded from environment variables.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use uuid::Uuid;

use crate::identity::StaticTokens;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Config {
    /// Database file (from FLAGKEEPER_DB_PATH). `None` uses the platform data directory.
    pub database_path: Option<PathBuf>,
    /// How long to wait on a locked database (from FLAGKEEPER_CONNECT_TIMEOUT_SECS)
    pub connect_timeout: Duration,
    /// Upper bound on a single request (from FLAGKEEPER_FETCH_TIMEOUT_SECS)
    pub fetch_timeout: Duration,
    /// Bearer tokens and the users they identify (from FLAGKEEPER_TOKENS,
    /// formatted as `token=uuid,token=uuid`)
    pub tokens: StaticTokens,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_path = lookup("FLAGKEEPER_DB_PATH").map(PathBuf::from);

        let connect_timeout = seconds(&lookup, "FLAGKEEPER_CONNECT_TIMEOUT_SECS")?
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let fetch_timeout =
            seconds(&lookup, "FLAGKEEPER_FETCH_TIMEOUT_SECS")?.unwrap_or(DEFAULT_FETCH_TIMEOUT);

        let tokens = match lookup("FLAGKEEPER_TOKENS") {
            Some(raw) => parse_tokens(&raw)?,
            None => StaticTokens::default(),
        };
        if tokens.is_empty() {
            tracing::warn!("FLAGKEEPER_TOKENS is empty, every authenticated request will be rejected");
        }

        Ok(Self {
            database_path,
            connect_timeout,
            fetch_timeout,
            tokens,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            tokens: StaticTokens::default(),
        }
    }
}

fn seconds(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<Duration>> {
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .with_context(|| format!("{key} must be a whole number of seconds, got {raw:?}"))
        })
        .transpose()
}

fn parse_tokens(raw: &str) -> Result<StaticTokens> {
    let mut tokens = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (token, user) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("token entry {entry:?} is not token=uuid"))?;
        let user_id = Uuid::parse_str(user.trim())
            .with_context(|| format!("token entry {entry:?} has an invalid user id"))?;
        tokens.insert(token.trim().to_string(), user_id);
    }
    Ok(StaticTokens::new(tokens))
}
