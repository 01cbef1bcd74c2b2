use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::TailerError;

/// Poll interval used when none is configured.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Size of a single read from the tailed file when none is configured.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Largest accepted read buffer, the buffer is allocated up front.
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Settings of a single `Tailer`
///
/// Can be built in code or deserialized as part of a larger configuration file. Missing fields
/// take their defaults, so only `path` is really required.
///
/// ```rust
/// # use std::time::Duration;
/// # use filetail::TailerConfig;
/// let config = TailerConfig::new("/var/log/mail.log")
///     .poll_interval(Duration::from_millis(250))
///     .from_start(false);
/// assert_eq!(config.poll_interval_ms, 250);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TailerConfig {
    /// file to be tailed, it does not have to exist yet
    pub path: PathBuf,
    pub poll_interval_ms: u64,
    /// read content that is already present in file on first open instead of skipping to its end
    pub from_start: bool,
    pub buffer_size: usize,
}

impl Default for TailerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            from_start: true,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl TailerConfig {
    /// Config for tailing `path` with default settings
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    pub fn from_start(mut self, from_start: bool) -> Self {
        self.from_start = from_start;
        self
    }

    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn poll_interval_duration(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Check that config describes something that can actually be tailed
    pub fn validate(&self) -> Result<(), TailerError> {
        if self.path.as_os_str().is_empty() {
            return Err(TailerError::Configuration(
                "path to tailed file is empty".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(TailerError::Configuration(
                "poll interval must be positive".to_string(),
            ));
        }
        if self.buffer_size == 0 {
            return Err(TailerError::Configuration(
                "buffer size must be positive".to_string(),
            ));
        }
        if self.buffer_size > MAX_BUFFER_SIZE {
            return Err(TailerError::Configuration(format!(
                "buffer size {} exceeds maximum of {MAX_BUFFER_SIZE} bytes",
                self.buffer_size
            )));
        }
        Ok(())
    }
}
