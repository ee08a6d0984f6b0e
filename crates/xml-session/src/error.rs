//! Error types for the session layer
//!
//! Only misuse surfaces as `Err`: failing to acquire the engine slot,
//! touching a released session, bad configuration, malformed input at
//! parse time. Engine-reported compile and runtime failures are
//! recovered into each processor's [`crate::Diagnostics`] batch
//! instead, because callers of this API poll error state after a null
//! result rather than catching failures.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A live session already holds the engine slot.
    #[error("license error: {0}")]
    License(String),

    /// The owning session has been released.
    #[error("session has been released")]
    Released,

    /// Unknown configuration key or malformed value.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("XML parsing error: {0}")]
    Parse(String),

    /// Expression rejected at compile time by a loud-by-contract
    /// operation (path evaluation).
    #[error("syntax error: {0}")]
    Syntax(String),

    /// A value of the wrong shape was supplied, e.g. an atomic where
    /// a node is required.
    #[error("value error: {0}")]
    Value(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine error: {0}")]
    Engine(String),
}

pub type Result<T> = std::result::Result<T, Error>;
