use std::fs;
use std::net::SocketAddr;
use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, FixedOffset};
use log::{debug, trace};
use once_cell::sync::Lazy;
use pingora::server::configuration::{Opt, ServerConf};
use pingora_error::{Error, ErrorType::*, OrErr, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

static POOL_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("Invalid regex pattern for pool name"));

#[derive(Default, Debug, Serialize, Deserialize, Validate)]
pub struct Config {
    #[serde(default)]
    pub pingora: ServerConf,

    #[validate(nested)]
    pub ral: Ral,

    #[validate(nested)]
    #[serde(default)]
    pub executor: PoolConfig,
    #[validate(nested)]
    #[serde(default)]
    pub engine: Engine,
    #[validate(nested)]
    #[serde(default)]
    pub trend: Trend,
    #[validate(nested)]
    #[serde(default)]
    pub compute: ComputeConf,
    #[validate(nested)]
    #[serde(default)]
    pub fixtures: Fixtures,
}

// Config file load and validation
impl Config {
    // Does not have to be async until we want runtime reload
    pub fn load_from_yaml<P>(path: P) -> Result<Self>
    where
        P: AsRef<std::path::Path> + std::fmt::Display,
    {
        let conf_str = fs::read_to_string(&path).or_err_with(ReadError, || {
            format!("Unable to read conf file from {path}")
        })?;
        debug!("Conf file read from {path}");
        Self::from_yaml(&conf_str)
    }

    // config file load entry point
    pub fn load_yaml_with_opt_override(opt: &Opt) -> Result<Self> {
        if let Some(path) = &opt.conf {
            let mut conf = Self::load_from_yaml(path)?;
            conf.merge_with_opt(opt);
            Ok(conf)
        } else {
            Error::e_explain(ReadError, "No path specified")
        }
    }

    pub fn from_yaml(conf_str: &str) -> Result<Self> {
        trace!("Read conf file: {conf_str}");
        let conf: Config = serde_yaml::from_str(conf_str).or_err_with(ReadError, || {
            format!("Unable to parse yaml conf {conf_str}")
        })?;

        trace!("Loaded conf: {conf:?}");

        conf.validate()
            .or_err_with(FileReadError, || "Conf file valid failed")?;

        Ok(conf)
    }

    pub fn to_yaml(&self) -> String {
        serde_yaml::to_string(self).unwrap_or_default()
    }

    pub fn merge_with_opt(&mut self, opt: &Opt) {
        if opt.daemon {
            self.pingora.daemon = true;
        }
    }
}

#[derive(Clone, Default, Debug, Serialize, Deserialize, Validate)]
pub struct Ral {
    #[validate(length(min = 1))]
    #[validate(nested)]
    pub listeners: Vec<Listener>,

    pub status: Option<Status>,
    pub prometheus: Option<Prometheus>,
    pub log: Option<Log>,
    pub sentry: Option<Sentry>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Listener {
    pub address: SocketAddr,
    pub tls: Option<Tls>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tls {
    pub cert_path: String,
    pub key_path: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Status {
    pub address: SocketAddr,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Prometheus {
    pub address: SocketAddr,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Log {
    pub path: String,
    #[serde(default = "Log::default_level")]
    pub level: String,
}

impl Log {
    fn default_level() -> String {
        "info".to_string()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Sentry {
    pub dsn: String,
}

/// What happens to a task the pool cannot admit.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionPolicy {
    /// Refuse at submission with `PoolSaturated`
    #[default]
    Abort,
    /// Drop the task; its handle resolves to `PoolSaturated`
    Discard,
    /// Run the task on the submitting thread
    CallerRuns,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "PoolConfig::validate_sizes"))]
pub struct PoolConfig {
    #[serde(default = "PoolConfig::default_name")]
    #[validate(custom(function = "PoolConfig::validate_name"))]
    pub name: String,
    #[serde(default = "PoolConfig::default_core_size")]
    #[validate(range(min = 1))]
    pub core_size: usize,
    #[serde(default = "PoolConfig::default_max_size")]
    pub max_size: usize,
    #[serde(default = "PoolConfig::default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "PoolConfig::default_keep_alive_ms")]
    pub keep_alive_ms: u64,
    #[serde(default)]
    pub rejection_policy: RejectionPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            core_size: Self::default_core_size(),
            max_size: Self::default_max_size(),
            queue_capacity: Self::default_queue_capacity(),
            keep_alive_ms: Self::default_keep_alive_ms(),
            rejection_policy: RejectionPolicy::default(),
        }
    }
}

impl PoolConfig {
    /// Pool with a fixed number of workers and no practical queue bound.
    pub fn fixed(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            core_size: size,
            max_size: size,
            queue_capacity: usize::MAX,
            ..Self::default()
        }
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }

    fn default_name() -> String {
        "taskExecutor".to_string()
    }

    fn default_core_size() -> usize {
        10
    }

    fn default_max_size() -> usize {
        20
    }

    fn default_queue_capacity() -> usize {
        20
    }

    fn default_keep_alive_ms() -> u64 {
        60_000
    }

    fn validate_name(name: &str) -> Result<(), ValidationError> {
        if POOL_NAME_REGEX.is_match(name) {
            Ok(())
        } else {
            let mut err = ValidationError::new("invalid_pool_name");
            err.add_param("name".into(), &name.to_string());
            Err(err)
        }
    }

    fn validate_sizes(&self) -> Result<(), ValidationError> {
        if self.max_size < self.core_size {
            Err(ValidationError::new("max_size_below_core_size"))
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Engine {
    #[serde(default = "Engine::default_request_timeout_ms")]
    #[validate(range(min = 1))]
    pub request_timeout_ms: u64,
    /// Workers of the CPU scheduler; defaults to the available parallelism
    #[validate(range(min = 1))]
    pub cpu_workers: Option<usize>,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            request_timeout_ms: Self::default_request_timeout_ms(),
            cpu_workers: None,
        }
    }
}

impl Engine {
    fn default_request_timeout_ms() -> u64 {
        10_000
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cpu_workers(&self) -> usize {
        self.cpu_workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(usize::from)
                .unwrap_or(1)
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Trend {
    #[serde(default = "Trend::default_endpoint")]
    #[validate(url)]
    pub endpoint: String,
    #[serde(default = "Trend::default_timeout_ms")]
    #[validate(range(min = 1))]
    pub timeout_ms: u64,
    #[serde(default)]
    #[validate(range(max = 5))]
    pub retries: u32,
    #[serde(default = "Trend::default_geo")]
    pub geo: String,
    #[serde(default = "Trend::default_language")]
    pub language: String,
}

impl Default for Trend {
    fn default() -> Self {
        Self {
            endpoint: Self::default_endpoint(),
            timeout_ms: Self::default_timeout_ms(),
            retries: 0,
            geo: Self::default_geo(),
            language: Self::default_language(),
        }
    }
}

impl Trend {
    fn default_endpoint() -> String {
        "https://trends.google.com".to_string()
    }

    fn default_timeout_ms() -> u64 {
        3_000
    }

    fn default_geo() -> String {
        "US".to_string()
    }

    fn default_language() -> String {
        "ko".to_string()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct ComputeConf {
    #[serde(default = "ComputeConf::default_samples")]
    #[validate(range(min = 1))]
    pub samples: u64,
    #[serde(default = "ComputeConf::default_seed")]
    pub seed: u64,
}

impl Default for ComputeConf {
    fn default() -> Self {
        Self {
            samples: Self::default_samples(),
            seed: Self::default_seed(),
        }
    }
}

impl ComputeConf {
    fn default_samples() -> u64 {
        200_000
    }

    fn default_seed() -> u64 {
        42
    }
}

/// Seed data for the in-memory store and cache.
#[derive(Clone, Default, Debug, Serialize, Deserialize, Validate)]
pub struct Fixtures {
    #[serde(default)]
    #[validate(nested)]
    pub entities: Vec<EntityFixture>,
    #[serde(default)]
    pub cache: HashMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct EntityFixture {
    #[validate(range(min = 1, max = 4))]
    pub family: u8,
    pub id: i64,
    pub title: Option<String>,
    pub description: Option<String>,
    pub created_at: Option<DateTime<FixedOffset>>,
    pub modified_at: Option<DateTime<FixedOffset>>,
}
