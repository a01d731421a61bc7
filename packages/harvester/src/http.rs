//! HTTP transport for fetching records from a Visual Library OAI endpoint.
//!
//! The transport performs exactly one GET per call. Retrying is a decision of
//! the caller (see [`crate::resolver`]).

use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;

use crate::config::HarvesterConfig;
use crate::error::{HarvesterError, Result, TransportError};

/// User agent string identifying this harvester.
const USER_AGENT: &str = concat!("vl-harvester/", env!("CARGO_PKG_VERSION"));

/// Transport boundary: "GET body for URL".
///
/// Implemented by [`HttpFetcher`] for real deployments; tests substitute an
/// in-memory implementation.
pub trait Fetch: Send + Sync {
    /// Fetch the raw body behind `url`.
    fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, TransportError>;
}

impl<T: Fetch + ?Sized> Fetch for Arc<T> {
    fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, TransportError> {
        (**self).fetch(url)
    }
}

impl<T: Fetch + ?Sized> Fetch for Box<T> {
    fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, TransportError> {
        (**self).fetch(url)
    }
}

/// Blocking `reqwest` transport.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_response_size: u64,
}

impl HttpFetcher {
    /// Create a transport using the timeout and size limit of `config`.
    pub fn new(config: &HarvesterConfig) -> Result<Self> {
        let client = create_client(config.timeout_secs)?;
        Ok(Self {
            client,
            max_response_size: config.max_response_size,
        })
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, TransportError> {
        download_bytes(&self.client, url, self.max_response_size)
    }
}

/// Create a configured HTTP client.
///
/// # Arguments
/// * `timeout_secs` - Timeout applied to every request
///
/// # Returns
/// A `reqwest::blocking::Client` configured with timeout and user agent.
pub fn create_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .map_err(HarvesterError::Client)
}

/// Download content from a URL, enforcing a maximum body size.
///
/// Non-success statuses are reported as [`TransportError::Status`].
///
/// # Arguments
/// * `client` - HTTP client to use
/// * `url` - URL to download from
/// * `max_size` - Largest accepted body in bytes
///
/// # Returns
/// Raw bytes of the response body
pub fn download_bytes(
    client: &Client,
    url: &str,
    max_size: u64,
) -> std::result::Result<Vec<u8>, TransportError> {
    tracing::debug!(url = %url, "GET");

    let response = client.get(url).send()?;
    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    // Reject early when the server announces an oversized body
    if let Some(size) = response.content_length() {
        if size > max_size {
            return Err(TransportError::ResponseTooLarge {
                size,
                max: max_size,
            });
        }
    }

    let bytes = response.bytes()?;
    let size = bytes.len() as u64;
    if size > max_size {
        return Err(TransportError::ResponseTooLarge {
            size,
            max: max_size,
        });
    }

    tracing::trace!(url = %url, bytes = size, "Response received");
    Ok(bytes.to_vec())
}

/// Decode a response body as UTF-8, replacing invalid sequences.
///
/// # Arguments
/// * `bytes` - Raw body
/// * `context` - Description of the body for the warning log
pub fn bytes_to_string(bytes: &[u8], context: &str) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(e) => {
            tracing::warn!(
                context = %context,
                valid_up_to = e.valid_up_to(),
                "Invalid UTF-8 in response, decoding lossily"
            );
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}
