//! Per-instance stream configuration
//!
//! Sizes can be given in bytes or parsed from strings such as `"4kb"`.

use std::path::PathBuf;

/// Default in-memory threshold before a request body spills to disk
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 4 * 1024;

/// Default number of bytes pulled from the source per read
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Environment variable overriding `max_buffer_size`
pub const ENV_MAX_BUFFER_SIZE: &str = "TSERVE_MAX_BUFFER_SIZE";

/// Environment variable overriding `spill_dir`
pub const ENV_SPILL_DIR: &str = "TSERVE_SPILL_DIR";

/// Configuration for a [`BufferedSeekableStream`](crate::BufferedSeekableStream)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Bytes kept in memory before the body moves to an overflow file
    pub max_buffer_size: usize,
    /// Upper bound on a single read from the source
    pub chunk_size: usize,
    /// Directory for overflow files; the OS temp dir when `None`
    pub spill_dir: Option<PathBuf>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            spill_dir: None,
        }
    }
}

impl StreamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the spill threshold in bytes
    pub fn max_buffer_size(mut self, size: usize) -> Self {
        self.max_buffer_size = size;
        self
    }

    /// Set the read chunk size; zero is bumped to one byte
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Set the directory overflow files are created in
    pub fn spill_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spill_dir = Some(dir.into());
        self
    }

    /// Defaults overridden by `TSERVE_MAX_BUFFER_SIZE` and `TSERVE_SPILL_DIR`
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var(ENV_MAX_BUFFER_SIZE) {
            match parse_size(&raw) {
                Some(size) => config.max_buffer_size = size,
                None => tracing::warn!(
                    var = ENV_MAX_BUFFER_SIZE,
                    value = %raw,
                    "ignoring unparseable buffer size"
                ),
            }
        }
        if let Some(dir) = std::env::var_os(ENV_SPILL_DIR) {
            config.spill_dir = Some(PathBuf::from(dir));
        }

        config
    }
}

/// Parse a size such as `"10"`, `"512b"`, `"4kb"` or `"2mb"`
pub fn parse_size(s: &str) -> Option<usize> {
    let s = s.trim().to_lowercase();

    let (num_str, multiplier) = if let Some(n) = s.strip_suffix("gb") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("mb") {
        (n, 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("kb") {
        (n, 1024)
    } else if let Some(n) = s.strip_suffix('b') {
        (n, 1)
    } else {
        (s.as_str(), 1)
    };

    let num: usize = num_str.trim().parse().ok()?;
    num.checked_mul(multiplier)
}

/// Format a byte count for log output
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1}GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1}MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1}KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes}B")
    }
}
