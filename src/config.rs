//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - channel-store.toml (default configuration)
//! - channel-store.local.toml (git-ignored local overrides)
//! - Environment variables (CHANNEL_STORE_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # channel-store.toml
//! [chunking]
//! depth_range_size = 1000
//! time_range_size = 86400000000
//!
//! [store]
//! inline_data_size_threshold = 4194304
//! max_data_nodes = 10000
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! CHANNEL_STORE_CHUNKING__DEPTH_RANGE_SIZE=500
//! CHANNEL_STORE_LOGGING__FORMAT=json
//! ```
//!
//! Configuration is read once and passed by reference into every call;
//! nothing in the engine mutates it.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Bucket sizes used when partitioning channel data into chunks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Width of a depth bucket, in unscaled index units
    #[serde(default = "default_depth_range_size")]
    pub depth_range_size: i64,

    /// Width of a time bucket, in microseconds
    #[serde(default = "default_time_range_size")]
    pub time_range_size: i64,
}

/// Chunk persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Serialized `data` larger than this many bytes is moved to the blob store
    #[serde(default = "default_inline_data_size_threshold")]
    pub inline_data_size_threshold: usize,

    /// Segment size used by segmented blob stores
    #[serde(default = "default_blob_chunk_size")]
    pub blob_chunk_size: usize,

    /// Node budget for strict fetches (sum of chunk record counts)
    #[serde(default = "default_max_data_nodes")]
    pub max_data_nodes: usize,

    /// Largest chunk document accepted after blob externalization
    #[serde(default = "default_max_document_size")]
    pub max_document_size: usize,

    /// Directory for the file blob store (None = in-memory blobs)
    #[serde(default)]
    pub blob_dir: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Append logs to this file instead of stderr
    #[serde(default)]
    pub file: Option<PathBuf>,
}

// Default value functions
fn default_depth_range_size() -> i64 {
    1000
}
fn default_time_range_size() -> i64 {
    86_400_000_000 // one day in microseconds
}
fn default_inline_data_size_threshold() -> usize {
    4 * 1024 * 1024 // 4 MiB
}
fn default_blob_chunk_size() -> usize {
    255 * 1024
}
fn default_max_data_nodes() -> usize {
    10_000
}
fn default_max_document_size() -> usize {
    16 * 1024 * 1024 // 16 MiB
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. channel-store.toml (base configuration)
    /// 2. channel-store.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (CHANNEL_STORE_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("channel-store.toml"))
            .merge(Toml::file("channel-store.local.toml"))
            .merge(Env::prefixed("CHANNEL_STORE_").split("__"))
            .extract()
    }

    /// Load configuration from specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("CHANNEL_STORE_").split("__"))
            .extract()
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        ChunkingConfig {
            depth_range_size: default_depth_range_size(),
            time_range_size: default_time_range_size(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            inline_data_size_threshold: default_inline_data_size_threshold(),
            blob_chunk_size: default_blob_chunk_size(),
            max_data_nodes: default_max_data_nodes(),
            max_document_size: default_max_document_size(),
            blob_dir: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}
