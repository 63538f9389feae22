use serde::{Deserialize, Serialize};

/// Configuration for archive production
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Archives kept under the prefix after each backup (0 disables retention)
    /// Default: 7
    #[serde(default = "default_retention_count")]
    pub retention_count: usize,

    /// gzip level, 0-9
    /// Default: 6
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,

    /// Documents fetched per cursor round trip
    /// Default: 1000
    #[serde(default = "default_cursor_batch_size")]
    pub cursor_batch_size: usize,

    /// Compressed bytes per chunk handed to the upload
    /// Default: 64KB
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Chunks buffered between export and upload
    /// Default: 8
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_retention_count() -> usize {
    7
}

fn default_compression_level() -> u32 {
    6
}

fn default_cursor_batch_size() -> usize {
    1000
}

fn default_chunk_size() -> usize {
    64 * 1024 // 64KB
}

fn default_channel_capacity() -> usize {
    8
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            retention_count: default_retention_count(),
            compression_level: default_compression_level(),
            cursor_batch_size: default_cursor_batch_size(),
            chunk_size: default_chunk_size(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl BackupConfig {
    pub fn with_retention_count(mut self, count: usize) -> Self {
        self.retention_count = count;
        self
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.min(9);
        self
    }

    pub fn with_cursor_batch_size(mut self, size: usize) -> Self {
        self.cursor_batch_size = size.max(1);
        self
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }
}

/// Configuration for restores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreConfig {
    /// Documents per unordered insert
    /// Default: 1000
    #[serde(default = "default_restore_batch_size")]
    pub batch_size: usize,
}

fn default_restore_batch_size() -> usize {
    1000
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            batch_size: default_restore_batch_size(),
        }
    }
}

impl RestoreConfig {
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }
}
