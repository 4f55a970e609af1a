use crate::types::CommitmentLevel;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Rpc {
    #[serde(default = "default_rpc_url")]
    pub url: String,
    /// Commitment used for confirmation waits
    #[serde(default)]
    pub commitment: CommitmentLevel,
}

fn default_rpc_url() -> String {
    "https://api.devnet.solana.com".to_string()
}

impl Default for Rpc {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            commitment: CommitmentLevel::Finalized,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PacingMode {
    #[default]
    Fixed,
    TokenBucket,
    None,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncSettings {
    /// Delay between successive per-pool fetches
    #[serde(default = "default_inter_pool_delay_ms")]
    pub inter_pool_delay_ms: u64,
    #[serde(default)]
    pub pacing: PacingMode,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    #[serde(default = "default_burst")]
    pub burst: u32,
}

fn default_inter_pool_delay_ms() -> u64 {
    1000
}
fn default_requests_per_second() -> u32 {
    10
}
fn default_burst() -> u32 {
    20
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            inter_pool_delay_ms: default_inter_pool_delay_ms(),
            pacing: PacingMode::default(),
            requests_per_second: default_requests_per_second(),
            burst: default_burst(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrySettings {
    /// Total attempts including the first one (clamped to 3..=5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    200
}
fn default_max_delay_ms() -> u64 {
    5000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BatchSettings {
    #[serde(default = "default_max_instructions_per_transaction")]
    pub max_instructions_per_transaction: usize,
    /// Bins per position
    #[serde(default = "default_position_width")]
    pub position_width: u32,
    /// Bins per bin-array account; 256 unless the program says otherwise
    #[serde(default = "default_bin_array_size")]
    pub bin_array_size: u32,
}

fn default_max_instructions_per_transaction() -> usize {
    8
}
fn default_position_width() -> u32 {
    16
}
fn default_bin_array_size() -> u32 {
    crate::bin_array::BIN_ARRAY_SIZE
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_instructions_per_transaction: default_max_instructions_per_transaction(),
            position_width: default_position_width(),
            bin_array_size: default_bin_array_size(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[serde(rename = "json")]
    Json,
    #[default]
    #[serde(rename = "pretty")]
    Pretty,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub rpc: Rpc,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub batch: BatchSettings,
    #[serde(default)]
    pub log: LogSettings,
}

impl Settings {
    /// Loads `Config.toml` from the working directory (optional) plus `DLMM__*`
    /// variables, then applies the flat `DLMM_*` overrides.
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(File::with_name("Config").required(false))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load(File::from(path.as_ref()))
    }

    fn load(file: File<config::FileSourceFile, config::FileFormat>) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix("DLMM").separator("__"))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;
        apply_env_overrides(&mut settings);
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.max_instructions_per_transaction == 0 {
            return Err(ConfigError::Message(
                "batch.max_instructions_per_transaction must be positive".into(),
            ));
        }
        if self.batch.position_width == 0 || self.batch.position_width > self.batch.bin_array_size {
            return Err(ConfigError::Message(format!(
                "batch.position_width must be in 1..={}",
                self.batch.bin_array_size
            )));
        }
        Ok(())
    }
}

fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(url) = env::var("DLMM_RPC_URL") {
        let trimmed = url.trim();
        if !trimmed.is_empty() {
            settings.rpc.url = trimmed.to_string();
        }
    }
    if let Some(delay) = parse_env::<u64>("DLMM_SYNC_INTER_POOL_DELAY_MS") {
        settings.sync.inter_pool_delay_ms = delay;
    }
    if let Some(attempts) = parse_env::<u32>("DLMM_RETRY_MAX_ATTEMPTS") {
        settings.retry.max_attempts = attempts;
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("Ignoring {}={:?}: not a valid value", key, raw);
            None
        }
    }
}
