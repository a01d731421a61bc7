//! Error types for the harvester.
//!
//! Uses the dual-error pattern: `HarvesterError` for library consumers,
//! carrying the identifier and the stage that failed, and the stage-specific
//! `TransportError` and `ParseError` underneath it.

use std::fmt;

use thiserror::Error;

/// Stage of a single-record resolution step that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Fetching the record body from the VL service.
    Fetch,
    /// Parsing the fetched body into a document tree.
    Parse,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch => f.write_str("fetch"),
            Self::Parse => f.write_str("parse"),
        }
    }
}

/// Failure of the transport layer for one request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failure, timeout or any other client-side HTTP error.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP status {status} for {url}")]
    Status { status: u16, url: String },

    /// The response body exceeds the configured maximum size.
    #[error("Response too large: {size} bytes (max {max} bytes)")]
    ResponseTooLarge { size: u64, max: u64 },

    /// All retry attempts failed with transient errors.
    #[error("Giving up after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    /// The service answered with an OAI-PMH error instead of a record.
    #[error("OAI error {code}: {message}")]
    Oai { code: String, message: String },
}

impl TransportError {
    /// Whether retrying the same request may succeed.
    ///
    /// Connection errors, timeouts and server errors (5xx) are transient;
    /// client errors (4xx), invalid URLs and oversized bodies are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_connect() || e.is_timeout(),
            Self::Status { status, .. } => (500..600).contains(status),
            Self::ResponseTooLarge { .. } | Self::RetriesExhausted { .. } | Self::Oai { .. } => {
                false
            }
        }
    }
}

/// Failure to turn a response body into a document tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The body is empty or contains only whitespace.
    #[error("Empty document")]
    Empty,

    /// The body was read but contains no element at all.
    #[error("No XML element found in document")]
    NoElements,

    /// The tokenizer failed before a single element was read.
    #[error("XML syntax error at byte {position}: {message}")]
    Syntax { position: u64, message: String },
}

/// Main error type for the harvester library.
#[derive(Debug, Error)]
pub enum HarvesterError {
    /// The identifier cannot name a VL record.
    #[error("Invalid VL identifier: '{0}'. Expected a non-empty token without whitespace, '&', '#' or '?'")]
    InvalidIdentifier(String),

    /// The configured base URL is unusable.
    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// Any other configuration problem.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Building the HTTP client failed.
    #[error("Failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Fetching the record for an identifier failed.
    #[error("Failed to fetch record {identifier}: {source}")]
    Fetch {
        identifier: String,
        #[source]
        source: TransportError,
    },

    /// Parsing the record for an identifier failed.
    #[error("Failed to parse record {identifier}: {source}")]
    Parse {
        identifier: String,
        #[source]
        source: ParseError,
    },
}

impl HarvesterError {
    /// Identifier of the record the error belongs to, if any.
    #[must_use]
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Self::Fetch { identifier, .. } | Self::Parse { identifier, .. } => Some(identifier),
            Self::InvalidIdentifier(identifier) => Some(identifier),
            _ => None,
        }
    }

    /// Resolution stage that failed, for record-level errors.
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Fetch { .. } => Some(Stage::Fetch),
            Self::Parse { .. } => Some(Stage::Parse),
            _ => None,
        }
    }
}

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, HarvesterError>;
