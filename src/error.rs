//! Error types for the wallet monitor

use thiserror::Error;

/// Failure to obtain a block or receipt after the bounded retry loop.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Every attempt returned an RPC/transport error
    #[error("{what}: failed after {attempts} attempts: {source:#}")]
    Exhausted {
        what: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    /// The provider kept answering `null`
    #[error("{what}: not available after {attempts} attempts")]
    Missing { what: String, attempts: u32 },

    /// Shutdown was requested while retrying
    #[error("cancelled by shutdown")]
    Cancelled,
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

/// Errors surfaced by the public monitor API.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Address could not be parsed as a 20-byte hex address
    #[error("Invalid wallet address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Service was constructed outside a tokio runtime
    #[error("No tokio runtime available to host the polling worker")]
    NoRuntime,

    /// Worker did not exit within the shutdown timeout
    #[error("Polling worker did not stop within {0:?}")]
    ShutdownTimeout(std::time::Duration),

    /// Worker task panicked
    #[error("Polling worker panicked: {0}")]
    WorkerPanicked(String),
}
