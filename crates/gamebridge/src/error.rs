//! Error types for the bridge crate.

use thiserror::Error;

/// Bridge error type
#[derive(Error, Debug)]
pub enum BridgeError {
    /// WASM engine, linking, or module call error
    #[error("WASM bridge error: {0}")]
    Wasm(String),

    /// Out-of-bounds or otherwise invalid access to module memory
    #[error("module memory error: {0}")]
    Memory(String),

    /// Storage backend error
    #[error("storage error: {0}")]
    Storage(String),

    /// Session used outside its lifecycle (init twice, tick before init)
    #[error("session state error: {0}")]
    State(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
