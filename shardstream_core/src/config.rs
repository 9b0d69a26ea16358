//! Configuration for writing, reading, and publishing datasets.
//!
//! Every component takes its configuration as an explicit value. A
//! [`PipelineConfig`] can be parsed from TOML and then adjusted through
//! `SHARDSTREAM_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, IoContext, Result};

pub const MEGABYTE: u64 = 1024 * 1024;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub writer: WriterConfig,
    pub reader: ReaderConfig,
    pub catalog: CatalogConfig,
}

/// Shard rollover limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Close a shard once its directory exceeds this many bytes.
    pub max_shard_bytes: u64,
    /// Close a shard once its directory holds more than this many files.
    pub max_shard_files: u64,
    /// Samples between disk usage measurements.
    pub check_interval: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Directory under which each fetched shard gets its own unique temp dir.
    pub scratch_dir: PathBuf,
}

/// Connection settings for the remote dataset catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub base_url: String,
    pub project_id: String,
    pub api_key: String,
    /// Per-request timeout, including archive downloads.
    pub timeout_secs: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_shard_bytes: 100 * MEGABYTE,
            max_shard_files: 10_000,
            check_interval: 100,
        }
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.bench-ai.com".to_string(),
            project_id: String::new(),
            api_key: String::new(),
            timeout_secs: 60,
        }
    }
}

impl WriterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_shard_bytes == 0 {
            return Err(Error::config("writer.max_shard_bytes must be greater than 0"));
        }
        if self.max_shard_files == 0 {
            return Err(Error::config("writer.max_shard_files must be greater than 0"));
        }
        if self.check_interval == 0 {
            return Err(Error::config("writer.check_interval must be greater than 0"));
        }
        Ok(())
    }
}

impl CatalogConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(Error::config("catalog.base_url must not be empty"));
        }
        if self.timeout_secs == 0 {
            return Err(Error::config("catalog.timeout_secs must be greater than 0"));
        }
        Ok(())
    }
}

impl FromStr for PipelineConfig {
    type Err = Error;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::config_with_source("failed to parse TOML config", e))
    }
}

impl PipelineConfig {
    /// Load and validate configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).at(path)?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SHARDSTREAM_*` environment overrides. Unparseable values are ignored.
    ///
    /// - `SHARDSTREAM_MAX_SHARD_BYTES`, `SHARDSTREAM_MAX_SHARD_FILES`,
    ///   `SHARDSTREAM_CHECK_INTERVAL`
    /// - `SHARDSTREAM_SCRATCH_DIR`
    /// - `SHARDSTREAM_CATALOG_URL`, `SHARDSTREAM_PROJECT_ID`,
    ///   `SHARDSTREAM_API_KEY`, `SHARDSTREAM_TIMEOUT_SECS`
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_parse("SHARDSTREAM_MAX_SHARD_BYTES") {
            self.writer.max_shard_bytes = v;
        }
        if let Some(v) = env_parse("SHARDSTREAM_MAX_SHARD_FILES") {
            self.writer.max_shard_files = v;
        }
        if let Some(v) = env_parse("SHARDSTREAM_CHECK_INTERVAL") {
            self.writer.check_interval = v;
        }
        if let Ok(val) = std::env::var("SHARDSTREAM_SCRATCH_DIR") {
            self.reader.scratch_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("SHARDSTREAM_CATALOG_URL") {
            self.catalog.base_url = val;
        }
        if let Ok(val) = std::env::var("SHARDSTREAM_PROJECT_ID") {
            self.catalog.project_id = val;
        }
        if let Ok(val) = std::env::var("SHARDSTREAM_API_KEY") {
            self.catalog.api_key = val;
        }
        if let Some(v) = env_parse("SHARDSTREAM_TIMEOUT_SECS") {
            self.catalog.timeout_secs = v;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.writer.validate()?;
        self.catalog.validate()
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.parse().ok()
}
