//! Configuration constants, validation and URL building for the harvester.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

use crate::error::{HarvesterError, Result};

/// OAI endpoint of the Frankfurt University Library Visual Library deployment.
pub const DEFAULT_BASE_URL: &str = "https://sammlungen.ub.uni-frankfurt.de/oai/";

/// Metadata format requested from the OAI endpoint.
pub const DEFAULT_METADATA_PREFIX: &str = "mets";

/// HTTP timeout in seconds.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Default maximum HTTP response size in bytes (100 MB).
pub const DEFAULT_MAX_RESPONSE_SIZE: u64 = 100 * 1024 * 1024;

/// Base delay for exponential backoff between retries (milliseconds).
pub const RETRY_BASE_DELAY_MS: u64 = 500;

/// Environment variable holding the OAI base URL.
pub const ENV_BASE_URL: &str = "VL_OAI_BASE_URL";
/// Environment variable holding the metadata prefix.
pub const ENV_METADATA_PREFIX: &str = "VL_METADATA_PREFIX";
/// Environment variable holding the HTTP timeout in seconds.
pub const ENV_TIMEOUT_SECS: &str = "VL_HTTP_TIMEOUT_SECS";
/// Environment variable holding the number of retries for transient errors.
pub const ENV_MAX_RETRIES: &str = "VL_MAX_RETRIES";
/// Environment variable switching to fail-fast resolution.
pub const ENV_FAIL_FAST: &str = "VL_FAIL_FAST";

/// Identifier pattern: any token without whitespace or URL delimiters.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static IDENTIFIER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s&#?]+$").expect("valid regex"));

/// What the resolution engine does when one branch of a graph fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Record the failure as a node of the graph and continue with siblings.
    #[default]
    Record,
    /// Abort the whole resolution with the first error.
    FailFast,
}

/// Runtime configuration of a [`crate::VisualLibrary`] instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvesterConfig {
    /// OAI endpoint of the VL deployment to query.
    pub base_url: String,
    /// Value of the `metadataPrefix` request parameter.
    pub metadata_prefix: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Largest accepted response body in bytes.
    pub max_response_size: u64,
    /// Retries for transient transport errors (0 disables retrying).
    pub max_retries: u32,
    /// Base delay for exponential backoff in milliseconds.
    pub retry_base_delay_ms: u64,
    /// Handling of failed branches.
    pub failure_policy: FailurePolicy,
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            metadata_prefix: DEFAULT_METADATA_PREFIX.to_string(),
            timeout_secs: HTTP_TIMEOUT_SECS,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            max_retries: 0,
            retry_base_delay_ms: RETRY_BASE_DELAY_MS,
            failure_policy: FailurePolicy::Record,
        }
    }
}

impl HarvesterConfig {
    /// Create a configuration for the given OAI base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Unset variables keep their defaults; numbers that fail to parse fall
    /// back to the default as well. The resulting base URL is validated.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let base_url = lookup(ENV_BASE_URL).unwrap_or(defaults.base_url);
        validate_base_url(&base_url)?;

        let metadata_prefix = lookup(ENV_METADATA_PREFIX)
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(defaults.metadata_prefix);

        let timeout_secs = lookup(ENV_TIMEOUT_SECS)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.timeout_secs);

        let max_retries = lookup(ENV_MAX_RETRIES)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.max_retries);

        let failure_policy = match lookup(ENV_FAIL_FAST) {
            Some(v) if matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes") => {
                FailurePolicy::FailFast
            }
            _ => FailurePolicy::Record,
        };

        Ok(Self {
            base_url,
            metadata_prefix,
            timeout_secs,
            max_retries,
            failure_policy,
            ..defaults
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_metadata_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.metadata_prefix = prefix.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_max_response_size(mut self, bytes: u64) -> Self {
        self.max_response_size = bytes;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay_ms = base_delay_ms;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Check the configuration before it is used by an engine.
    pub fn validate(&self) -> Result<()> {
        validate_base_url(&self.base_url)?;
        if self.metadata_prefix.trim().is_empty() {
            return Err(HarvesterError::Config(
                "metadata prefix must not be empty".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(HarvesterError::Config(
                "timeout must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    /// Request URL for one record under this configuration.
    pub fn record_url(&self, identifier: &str) -> Result<String> {
        record_url(&self.base_url, &self.metadata_prefix, identifier)
    }
}

/// Validate a VL identifier.
///
/// Identifiers are opaque, but they travel as a query parameter, so they
/// must be non-empty and free of whitespace and URL delimiters.
///
/// # Examples
/// ```
/// use vl_harvester::config::validate_identifier;
///
/// assert!(validate_identifier("10771471").is_ok());
/// assert!(validate_identifier("").is_err());
/// assert!(validate_identifier("1&verb=ListRecords").is_err());
/// ```
pub fn validate_identifier(identifier: &str) -> Result<()> {
    if IDENTIFIER_PATTERN.is_match(identifier) {
        Ok(())
    } else {
        Err(HarvesterError::InvalidIdentifier(identifier.to_string()))
    }
}

/// Validate that a base URL is an absolute HTTP(S) URL.
pub fn validate_base_url(base_url: &str) -> Result<()> {
    parse_base_url(base_url).map(|_| ())
}

fn parse_base_url(base_url: &str) -> Result<Url> {
    let invalid = |reason: String| HarvesterError::InvalidBaseUrl {
        url: base_url.to_string(),
        reason,
    };

    let url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

/// Build the `GetRecord` request URL for an identifier.
///
/// Query parameters already present on `base_url` are kept.
///
/// # Examples
/// ```
/// use vl_harvester::config::record_url;
///
/// assert_eq!(
///     record_url("https://vl.example.org/oai/", "mets", "10771471").unwrap(),
///     "https://vl.example.org/oai/?verb=GetRecord&metadataPrefix=mets&identifier=10771471"
/// );
/// ```
pub fn record_url(base_url: &str, metadata_prefix: &str, identifier: &str) -> Result<String> {
    let mut url = parse_base_url(base_url)?;
    url.query_pairs_mut()
        .append_pair("verb", "GetRecord")
        .append_pair("metadataPrefix", metadata_prefix)
        .append_pair("identifier", identifier);
    Ok(url.into())
}

/// Public landing page of a record, derived from the origin of the base URL.
///
/// # Examples
/// ```
/// use vl_harvester::config::record_page_url;
///
/// assert_eq!(
///     record_page_url("https://sammlungen.ub.uni-frankfurt.de/oai/", "10688403").as_deref(),
///     Some("https://sammlungen.ub.uni-frankfurt.de/10688403")
/// );
/// ```
pub fn record_page_url(base_url: &str, identifier: &str) -> Option<String> {
    let url = parse_base_url(base_url).ok()?;
    Some(format!("{}/{identifier}", url.origin().ascii_serialization()))
}

/// Extract the record identifier from a METS pointer URL.
///
/// Uses the `identifier` query parameter when present, otherwise a trailing
/// all-digit path segment.
///
/// # Examples
/// ```
/// use vl_harvester::config::identifier_from_url;
///
/// assert_eq!(
///     identifier_from_url("https://vl.example.org/oai/?verb=GetRecord&metadataPrefix=mets&identifier=10771471").as_deref(),
///     Some("10771471")
/// );
/// assert_eq!(identifier_from_url("https://vl.example.org/10902187").as_deref(), Some("10902187"));
/// assert_eq!(identifier_from_url("https://vl.example.org/about"), None);
/// ```
pub fn identifier_from_url(href: &str) -> Option<String> {
    let url = Url::parse(href.trim()).ok()?;

    if let Some((_, value)) = url.query_pairs().find(|(key, _)| key == "identifier") {
        let value = value.trim();
        return (!value.is_empty()).then(|| value.to_string());
    }

    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .filter(|segment| segment.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
}
