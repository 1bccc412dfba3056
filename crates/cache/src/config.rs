//! Cache configuration for chunk strides, capacity and preload windows.
//!
//! Configuration can be loaded from a JSON file, environment variables,
//! or created programmatically.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Tunables shared by the byte-window and record-window caches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Byte stride of one raw-byte chunk
    pub byte_chunk_size: u32,
    /// Maximum number of chunks held per cache
    pub chunk_capacity: usize,
    /// Bytes shown per row in the byte window
    pub row_width: u32,
    /// Records requested per record chunk
    pub records_per_chunk: u32,
    /// Assumed average record size in bytes, used for estimation
    pub avg_record_size: u32,
    /// Chunks preloaded on each side of the viewed chunk
    pub preload_chunks: u32,
    /// Records of context loaded before a jump target
    pub context_records: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            byte_chunk_size: 4096,
            chunk_capacity: 100,
            row_width: 16,
            records_per_chunk: 100,
            avg_record_size: 4,
            preload_chunks: 2,
            context_records: 20,
        }
    }
}

impl CacheConfig {
    /// Sets the raw-byte chunk stride.
    pub fn with_byte_chunk_size(mut self, bytes: u32) -> Self {
        self.byte_chunk_size = bytes;
        self
    }

    /// Sets the maximum number of cached chunks.
    pub fn with_chunk_capacity(mut self, chunks: usize) -> Self {
        self.chunk_capacity = chunks;
        self
    }

    /// Sets the byte-window row width.
    pub fn with_row_width(mut self, bytes: u32) -> Self {
        self.row_width = bytes;
        self
    }

    /// Sets the record chunk parameters.
    pub fn with_record_layout(mut self, records_per_chunk: u32, avg_record_size: u32) -> Self {
        self.records_per_chunk = records_per_chunk;
        self.avg_record_size = avg_record_size;
        self
    }

    /// Sets the preload window, in chunks per side.
    pub fn with_preload_chunks(mut self, chunks: u32) -> Self {
        self.preload_chunks = chunks;
        self
    }

    /// Sets the number of context records loaded before a jump target.
    pub fn with_context_records(mut self, records: u32) -> Self {
        self.context_records = records;
        self
    }

    /// Address stride of one record chunk.
    ///
    /// This is a heuristic: real record sizes vary, so a chunk fetched at a
    /// key may cover more or fewer bytes than the stride.
    pub fn record_stride(&self) -> u64 {
        u64::from(self.records_per_chunk.max(1)) * u64::from(self.avg_record_size.max(1))
    }

    /// Checks that every stride and size is non-zero.
    ///
    /// # Errors
    /// Returns the name of the first zero-valued field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("byte_chunk_size", u64::from(self.byte_chunk_size)),
            ("chunk_capacity", self.chunk_capacity as u64),
            ("row_width", u64::from(self.row_width)),
            ("records_per_chunk", u64::from(self.records_per_chunk)),
            ("avg_record_size", u64::from(self.avg_record_size)),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(ConfigError::InvalidValue(name.to_string()));
            }
        }
        if self.row_width > self.byte_chunk_size {
            return Err(ConfigError::InvalidValue("row_width".to_string()));
        }
        Ok(())
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `ADDRSCOPE_BYTE_CHUNK_SIZE` (default: 4096)
    /// - `ADDRSCOPE_CHUNK_CAPACITY` (default: 100)
    /// - `ADDRSCOPE_ROW_WIDTH` (default: 16)
    /// - `ADDRSCOPE_RECORDS_PER_CHUNK` (default: 100)
    /// - `ADDRSCOPE_AVG_RECORD_SIZE` (default: 4)
    /// - `ADDRSCOPE_PRELOAD_CHUNKS` (default: 2)
    /// - `ADDRSCOPE_CONTEXT_RECORDS` (default: 20)
    ///
    /// # Errors
    /// Returns an error if any environment variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        env_override("ADDRSCOPE_BYTE_CHUNK_SIZE", &mut config.byte_chunk_size)?;
        env_override("ADDRSCOPE_CHUNK_CAPACITY", &mut config.chunk_capacity)?;
        env_override("ADDRSCOPE_ROW_WIDTH", &mut config.row_width)?;
        env_override("ADDRSCOPE_RECORDS_PER_CHUNK", &mut config.records_per_chunk)?;
        env_override("ADDRSCOPE_AVG_RECORD_SIZE", &mut config.avg_record_size)?;
        env_override("ADDRSCOPE_PRELOAD_CHUNKS", &mut config.preload_chunks)?;
        env_override("ADDRSCOPE_CONTEXT_RECORDS", &mut config.context_records)?;

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    ///
    /// Missing keys take their default values:
    /// ```json
    /// { "byte_chunk_size": 4096, "chunk_capacity": 100 }
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        Ok(())
    }
}

fn env_override<T: std::str::FromStr>(name: &str, slot: &mut T) -> Result<(), ConfigError> {
    if let Ok(val) = std::env::var(name) {
        *slot = val
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(name.to_string()))?;
    }
    Ok(())
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
