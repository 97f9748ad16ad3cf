// nasvm/src/error/mod.rs
//
// Copyright (c) 2025 Arcella Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Centralized error handling for nasvm.
//!
//! Uses `thiserror` to define structured errors and `anyhow` for convenient propagation.
//! All modules return `Result<T, NasvmError>` for internal logic,
//! and `anyhow::Result<T>` (re-exported as `AnyResult`) is used by `main`.
//!
//! A malformed server reply is not an error here; the RPC layer turns it
//! into [`crate::rpc::Outcome::Failure`].

use std::path::PathBuf;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// The root error type for all nasvm failures.
#[derive(Error, Debug)]
pub enum NasvmError {
    /// The server did not answer the `connect` message with `"connected"`.
    #[error("No session: {0}")]
    Handshake(String),

    /// `auth.login` did not return `true`.
    #[error("Authentication failed for {user}@{server}")]
    Auth { user: String, server: String },

    /// A call was attempted on a session that never authenticated.
    #[error("No authenticated session")]
    NotAuthenticated,

    /// The server answered a call with an `error.reason`.
    #[error("{method} failed: {reason}")]
    Rpc { method: String, reason: String },

    /// Websocket-level failure (refused, reset, protocol violation).
    #[error("Transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    /// The server closed the connection before replying.
    #[error("Connection closed by server")]
    ConnectionClosed,

    /// No reply arrived within the configured bound.
    #[error("No reply from server within {seconds}s")]
    Timeout { seconds: u64 },

    /// The interactive prompt yielded nothing.
    #[error("Empty password")]
    EmptyPassword,

    /// OS credential storage failure.
    #[error("Credential store error: {0}")]
    Credential(#[from] keyring::Error),

    /// A destructive action was requested without `--force`.
    #[error("Refusing to {action} without --force")]
    ForceRequired { action: String },

    /// Signalling a local process failed.
    #[error("Failed to signal local process {pid}: {reason}")]
    Signal { pid: i32, reason: String },

    /// Configuration loading or parsing error.
    #[error("Config error: {0}")]
    Config(String),

    /// I/O error (terminal prompt, config file, log directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// IO error with associated path for better diagnostics
    #[error("I/O error at {path:?}: {source}")]
    IoWithPath {
        source: std::io::Error,
        path: PathBuf,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General-purpose error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl NasvmError {
    /// Whether this error ends the whole invocation rather than a single VM id.
    ///
    /// `vm::run_batch` records non-fatal errors against the id and moves on.
    /// Connection, handshake and authentication problems leave no usable
    /// session, so nothing after them can run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, NasvmError::Rpc { .. } | NasvmError::Signal { .. })
    }

    /// Creates an `IoWithPath` error from a path and an I/O error.
    pub fn io_with_path(path: PathBuf, source: std::io::Error) -> Self {
        Self::IoWithPath { source, path }
    }
}

/// Convenient alias for `Result<T, NasvmError>`.
pub type Result<T> = std::result::Result<T, NasvmError>;

pub use anyhow::Result as AnyResult;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(NasvmError::Handshake("bad".into()).is_fatal());
        assert!(NasvmError::ConnectionClosed.is_fatal());
        assert!(NasvmError::Auth { user: "root".into(), server: "nas".into() }.is_fatal());
        assert!(!NasvmError::Rpc { method: "vm.start".into(), reason: "nope".into() }.is_fatal());
        assert!(!NasvmError::Signal { pid: 1, reason: "EPERM".into() }.is_fatal());
    }

    #[test]
    fn test_auth_message_names_target() {
        let err = NasvmError::Auth { user: "admin".into(), server: "nas.lan".into() };
        assert_eq!(err.to_string(), "Authentication failed for admin@nas.lan");
    }
}
