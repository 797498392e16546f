//! Timeout defaults applied by the injected prologues

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("connect timeout {millis} ms does not fit a Java int")]
    ConnectTimeoutOutOfRange { millis: u64 },
    #[error("read timeout {millis} ms does not fit a Java int")]
    ReadTimeoutOutOfRange { millis: u64 },
}

/// Validated connect/read timeouts in milliseconds.
///
/// Both values travel through `setConnectTimeout(I)V` and
/// `setReadTimeout(I)V`, so they must fit a non-negative Java `int`.
/// Construction is the only validation point; a built value is always
/// safe to embed in bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutDefaults {
    connect_millis: i32,
    read_millis: i32,
}

impl TimeoutDefaults {
    pub fn new(connect_millis: u64, read_millis: u64) -> Result<Self, ConfigError> {
        let connect = i32::try_from(connect_millis)
            .map_err(|_| ConfigError::ConnectTimeoutOutOfRange { millis: connect_millis })?;
        let read = i32::try_from(read_millis)
            .map_err(|_| ConfigError::ReadTimeoutOutOfRange { millis: read_millis })?;
        Ok(Self { connect_millis: connect, read_millis: read })
    }

    pub fn connect_millis(&self) -> i32 {
        self.connect_millis
    }

    pub fn read_millis(&self) -> i32 {
        self.read_millis
    }
}
