//! Typed SDK for the stake HTTP API.

pub mod client;

pub use client::{Client, ProofAttachment, RetryPolicy};
use thiserror::Error;

/// Machine-readable class of a rejected request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    InvalidState,
    NotFound,
    Storage,
    Unauthenticated,
    Other(String),
}

impl From<&str> for ErrorKind {
    fn from(kind: &str) -> Self {
        match kind {
            "validation" => Self::Validation,
            "authorization" => Self::Authorization,
            "invalid_state" => Self::InvalidState,
            "not_found" => Self::NotFound,
            "storage" => Self::Storage,
            "unauthenticated" => Self::Unauthenticated,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Error type for client operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("{status}: {message}")]
    Api {
        status: reqwest::StatusCode,
        kind: ErrorKind,
        message: String,
        field: Option<String>,
    },
    #[error("failed: {status}: {body}")]
    FailedWithBody {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid URL scheme: {0} (expected http or https)")]
    InvalidScheme(String),
}

impl Error {
    /// Kind reported by the server, if the request reached it.
    pub fn kind(&self) -> Option<&ErrorKind> {
        match self {
            Error::Api { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// Field a validation failure refers to.
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::Api { field, .. } => field.as_deref(),
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
