//! Error types shared across the client and engine.
//!
//! Calls to the simulation engine have three outcomes: success, a
//! [`TransportError`] (the engine could not be reached or answered with
//! something unreadable), or an application failure (the engine answered
//! but reported a non-success status). [`CallError`] carries the two
//! failure branches so the session controller can treat them differently.

use thiserror::Error;

use crate::protocol::RunStatus;

/// The engine could not be reached, or its answer could not be read.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("request to {endpoint} failed: {message}")]
    Network { endpoint: String, message: String },

    #[error("{endpoint} returned HTTP {status}")]
    Http {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("could not decode response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
}

impl TransportError {
    /// True when the engine signals at the HTTP level that there is no
    /// longer a run behind the endpoint (404 / 410).
    pub fn is_session_gone(&self) -> bool {
        matches!(self, Self::Http { status: 404 | 410, .. })
    }

    pub fn endpoint(&self) -> &str {
        match self {
            Self::Network { endpoint, .. }
            | Self::Http { endpoint, .. }
            | Self::Decode { endpoint, .. } => endpoint,
        }
    }
}

/// Failure of one engine call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CallError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("engine reported {status}: {message}")]
    Application { status: RunStatus, message: String },
}

impl CallError {
    pub fn application(status: RunStatus, message: impl Into<String>) -> Self {
        Self::Application {
            status,
            message: message.into(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Invalid engine input (bits/bases strings, lengths, parameters).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("bits and bases must have the same length ({bits} vs {bases})")]
    LengthMismatch { bits: usize, bases: usize },

    #[error("invalid {field} symbol {symbol:?} at position {index}")]
    InvalidSymbol {
        field: &'static str,
        symbol: char,
        index: usize,
    },

    #[error("{0} must be greater than zero")]
    Empty(&'static str),

    #[error("{field} exceeds the limit of {max} qubits")]
    TooLarge { field: &'static str, max: usize },
}

/// Invalid client configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a positive integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },

    #[error("engine URL {0:?} must start with http:// or https://")]
    InvalidUrl(String),
}
