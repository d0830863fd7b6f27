//! Error handling for the sync engine.
//!
//! This module provides a centralized error type and result alias for all
//! engine operations. Per-store sync outcomes are deliberately *not*
//! errors — they are folded into [`crate::engine::RunResult`] counters —
//! so the variants here cover configuration, store enumeration and step
//! execution failures only.
//!
//! # Examples
//!
//! ```rust
//! use storesync_core::error::{Error, Result};
//!
//! fn validate_batch_size(size: usize) -> Result<()> {
//!     if size == 0 {
//!         return Err(Error::config("batch size must be positive"));
//!     }
//!     Ok(())
//! }
//! ```

use std::io;
use thiserror::Error;

/// Comprehensive error type for sync engine operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid engine configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Store enumeration or lookup failures
    #[error("Store error: {0}")]
    Store(String),

    /// A sync step failed; the message names the failed step(s)
    #[error("Step error: {0}")]
    Step(String),

    /// I/O operation failures
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Catch-all for other errors
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Convenience type alias for Results with engine errors.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new store error with the given message.
    pub fn store(msg: impl Into<String>) -> Self {
        Error::Store(msg.into())
    }

    /// Creates a new step error with the given message.
    pub fn step(msg: impl Into<String>) -> Self {
        Error::Step(msg.into())
    }
}
