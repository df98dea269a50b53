//! Tailing options.

use crate::error::{Error, Result};
use std::time::Duration;

/// Options fixed for the lifetime of a tail session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailOptions {
    /// Number of recent complete lines kept in the backlog.
    pub backlog_size: usize,
    /// Window size, in bytes, of the backward scan.
    pub chunk_size: usize,
    /// Messages buffered per observer before the oldest are dropped.
    pub queue_capacity: usize,
    /// Delay before re-checking a file that could not be read.
    pub retry_cooldown: Duration,
    /// Stop the session once its last observer leaves.
    pub stop_when_idle: bool,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            backlog_size: 10,
            chunk_size: 512,
            queue_capacity: 64,
            retry_cooldown: Duration::from_secs(1),
            stop_when_idle: true,
        }
    }
}

impl TailOptions {
    pub fn with_backlog_size(mut self, backlog_size: usize) -> Self {
        self.backlog_size = backlog_size;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_retry_cooldown(mut self, retry_cooldown: Duration) -> Self {
        self.retry_cooldown = retry_cooldown;
        self
    }

    pub fn with_stop_when_idle(mut self, stop_when_idle: bool) -> Self {
        self.stop_when_idle = stop_when_idle;
        self
    }

    /// Rejects options no session can run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| {
            Err(Error::InvalidConfig {
                message: message.to_string(),
            })
        };

        if self.backlog_size == 0 {
            return invalid("backlog_size must be at least 1");
        }
        if self.chunk_size == 0 {
            return invalid("chunk_size must be at least 1");
        }
        if self.queue_capacity == 0 {
            return invalid("queue_capacity must be at least 1");
        }
        Ok(())
    }
}
