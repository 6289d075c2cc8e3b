//! Command-line and environment configuration.

use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::api::CachePolicy;
use crate::store::LastPolicy;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("--timeout must be at least one second")]
    ZeroTimeout,

    #[error("--cache-capacity must be at least 1")]
    ZeroCapacity,

    #[error("--seed cannot be combined with --remote")]
    SeedWithRemote,
}

/// Watch HTTP cache validation while driving a car REST resource from the keyboard.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Address the embedded origin binds to (port 0 picks a free one)
    #[arg(long, env = "CACHELENS_BIND", default_value = "127.0.0.1:0")]
    pub bind: String,

    /// Talk to an already running origin at HOST:PORT instead of embedding one
    #[arg(long, env = "CACHELENS_REMOTE")]
    pub remote: Option<String>,

    /// max-age, in seconds, the embedded origin advertises on cacheable responses
    #[arg(long, env = "CACHELENS_MAX_AGE", default_value_t = 0)]
    pub max_age: u64,

    /// Which car the embedded origin reports as the last one
    #[arg(long, value_enum, env = "CACHELENS_LAST", default_value_t = LastPolicy::HighestId)]
    pub last: LastPolicy,

    /// Seconds to wait for a complete response before giving up
    #[arg(long, env = "CACHELENS_TIMEOUT", default_value_t = 10)]
    pub timeout: u64,

    /// Maximum number of responses the client cache keeps
    #[arg(long, env = "CACHELENS_CACHE_CAPACITY", default_value_t = 256)]
    pub cache_capacity: usize,

    /// Cars created in the embedded origin before the session starts
    #[arg(long, env = "CACHELENS_SEED")]
    pub seed: Option<usize>,

    /// Keys to run instead of reading the keyboard, e.g. "1 4 4 2 4 x"
    #[arg(long)]
    pub script: Option<String>,

    /// Log filter; RUST_LOG takes precedence when set
    #[arg(long, env = "CACHELENS_LOG", default_value = "warn")]
    pub log: String,
}

/// Cars seeded into the embedded origin when `--seed` is not given.
const DEFAULT_SEED: usize = 3;

impl Config {
    /// Checks the constraints clap cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.remote.is_some() && self.seed.is_some() {
            return Err(ConfigError::SeedWithRemote);
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            max_age: self.max_age,
        }
    }

    /// Number of cars to create in the embedded origin.
    pub fn seed_count(&self) -> usize {
        self.seed.unwrap_or(DEFAULT_SEED)
    }
}
