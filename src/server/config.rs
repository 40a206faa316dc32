use std::{env, str::FromStr, time::Duration};

use crate::logger::micro::*;

pub const DEFAULT_BACKLOG: i32 = 50;
pub const DEFAULT_IO_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_HEAD_LINE: usize = 4096;

pub const BACKLOG_ENV: &str = "EMBEDHTTP_BACKLOG";
pub const IO_TIMEOUT_ENV: &str = "EMBEDHTTP_IO_TIMEOUT_SECS";
pub const MAX_HEAD_LINE_ENV: &str = "EMBEDHTTP_MAX_HEAD_LINE";

/// Tunables of the listener and of every exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Pending-connection queue length passed to `listen(2)`.
    pub backlog: i32,
    /// Read and write timeout of accepted connections. `None` blocks forever.
    pub io_timeout: Option<Duration>,
    /// Longest request line or header line accepted, in bytes.
    pub max_head_line: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            backlog: DEFAULT_BACKLOG,
            io_timeout: Some(Duration::from_secs(DEFAULT_IO_TIMEOUT_SECS)),
            max_head_line: DEFAULT_MAX_HEAD_LINE,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `EMBEDHTTP_*` environment variables.
    /// Unparsable values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(backlog) = parse_var::<i32, _>(&lookup, BACKLOG_ENV) {
            config.backlog = backlog;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, IO_TIMEOUT_ENV) {
            // 0 disables the timeout
            config.io_timeout = if secs == 0 { None } else { Some(Duration::from_secs(secs)) };
        }
        if let Some(max) = parse_var::<usize, _>(&lookup, MAX_HEAD_LINE_ENV) {
            config.max_head_line = max;
        }
        config
    }

    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn max_head_line(mut self, max: usize) -> Self {
        self.max_head_line = max;
        self
    }
}

fn parse_var<T: FromStr, F: Fn(&str) -> Option<String>>(lookup: &F, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("{}={:?} is not valid, using default", key, raw);
            None
        }
    }
}
