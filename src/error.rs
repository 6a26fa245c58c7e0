//! Error types for the decision core.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::types::{FlowId, LinkId};

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type.
#[derive(Error, Debug)]
pub enum Error {
    // Runtime data errors
    #[error("invalid link {link}: only {num_links} links configured")]
    InvalidLink { link: LinkId, num_links: usize },

    #[error("invalid flow id {0}: must be below 256")]
    InvalidFlow(u32),

    #[error("unrealistic delay {0}ms (allowed 0..=10000ms)")]
    UnrealisticDelay(f64),

    #[error("out-of-order event for {subject}: {got:?} precedes last applied {last:?}")]
    OutOfOrder {
        subject: String,
        last: Duration,
        got: Duration,
    },

    #[error("flow {flow} already bound to contract {contract}")]
    ContractAlreadyAssigned { flow: FlowId, contract: String },

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this is a per-event data error.
    ///
    /// These are logged and dropped; the run continues.
    pub fn is_runtime(&self) -> bool {
        matches!(
            self,
            Error::InvalidLink { .. }
                | Error::InvalidFlow(_)
                | Error::UnrealisticDelay(_)
                | Error::OutOfOrder { .. }
                | Error::ContractAlreadyAssigned { .. }
        )
    }

    /// Check if the error must abort start-up.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::InvalidConfig(_))
    }
}
