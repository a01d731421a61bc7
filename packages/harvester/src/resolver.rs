//! Resolution engine and public API.
//!
//! [`VisualLibrary`] turns one identifier into a [`ResolvedGraph`]: it
//! fetches, parses, classifies and builds the root record, then expands the
//! child references depth-first. Every identifier is resolved at most once
//! per call; the graph itself serves as the visited set, and an entity is
//! inserted before any of its children are expanded, so shared records and
//! cycles terminate.

use std::fmt;
use std::thread;
use std::time::Duration;

use crate::builder::build_entity;
use crate::classify::{classify, oai_error};
use crate::config::{validate_identifier, FailurePolicy, HarvesterConfig};
use crate::error::{HarvesterError, Result, TransportError};
use crate::graph::{FailedNode, Node, ResolvedGraph};
use crate::http::{Fetch, HttpFetcher};
use crate::types::{Entity, Identifier};
use crate::xml::{parse_document, Document, RawDocument};

/// Client for one Visual Library deployment.
///
/// Holds the configuration and the transport. Each call owns its own
/// visited set, so one instance can serve concurrent calls.
///
/// # Examples
/// ```no_run
/// use vl_harvester::{HarvesterConfig, VisualLibrary};
///
/// let vl = VisualLibrary::new(HarvesterConfig::default())?;
/// let graph = vl.get_element_for_id("10771471")?;
/// println!("{:?} with {} records", graph.root().title, graph.len());
/// # Ok::<(), vl_harvester::HarvesterError>(())
/// ```
pub struct VisualLibrary {
    config: HarvesterConfig,
    fetcher: Box<dyn Fetch>,
}

impl fmt::Debug for VisualLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisualLibrary")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl VisualLibrary {
    /// Create a client using the HTTP transport.
    pub fn new(config: HarvesterConfig) -> Result<Self> {
        config.validate()?;
        let fetcher = HttpFetcher::new(&config)?;
        Ok(Self {
            config,
            fetcher: Box::new(fetcher),
        })
    }

    /// Create a client with a custom transport.
    pub fn with_fetcher(config: HarvesterConfig, fetcher: impl Fetch + 'static) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            fetcher: Box::new(fetcher),
        })
    }

    /// Create a client configured from `VL_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(HarvesterConfig::from_env()?)
    }

    #[must_use]
    pub fn config(&self) -> &HarvesterConfig {
        &self.config
    }

    /// Fetch and parse the record for one identifier, without classifying
    /// it or following any reference.
    ///
    /// # Errors
    /// [`HarvesterError::InvalidIdentifier`], or a fetch/parse error naming
    /// the identifier.
    pub fn get_data_for_id(&self, identifier: &str) -> Result<RawDocument> {
        validate_identifier(identifier)?;
        self.fetch_document(&Identifier::new(identifier))
    }

    /// Resolve an identifier and everything reachable from it.
    ///
    /// # Errors
    /// Failure of the root record is always returned. Failures below the
    /// root are recorded in the graph, or returned under
    /// [`FailurePolicy::FailFast`].
    pub fn get_element_for_id(&self, identifier: &str) -> Result<ResolvedGraph> {
        validate_identifier(identifier)?;
        let id = Identifier::new(identifier);
        let doc = self.fetch_document(&id)?;
        self.resolve_from_document(id, doc)
    }

    /// Resolve a record whose document the caller already has.
    ///
    /// Only the root document is taken from `xml`; child records are
    /// fetched as usual.
    pub fn get_element_from_xml(
        &self,
        identifier: &str,
        xml: impl AsRef<[u8]>,
    ) -> Result<ResolvedGraph> {
        validate_identifier(identifier)?;
        let id = Identifier::new(identifier);
        let doc = parse_record(&id, xml.as_ref())?;
        self.resolve_from_document(id, doc)
    }

    fn resolve_from_document(&self, id: Identifier, doc: Document) -> Result<ResolvedGraph> {
        let (root, children) = self.build(doc, &id);
        let mut resolution = Resolution::new(self, root, children);
        resolution.run()?;
        let graph = resolution.graph;

        tracing::info!(
            identifier = %id,
            nodes = graph.len(),
            failures = graph.failures().count(),
            fetches = resolution.fetches,
            "Resolution complete"
        );
        Ok(graph)
    }

    /// Fetch, parse, classify and build one record.
    fn load(&self, id: &Identifier) -> Result<(Entity, Vec<Identifier>)> {
        let doc = self.fetch_document(id)?;
        Ok(self.build(doc, id))
    }

    /// Classify and build; the document is consumed.
    fn build(&self, doc: Document, id: &Identifier) -> (Entity, Vec<Identifier>) {
        let kind = classify(&doc);
        tracing::debug!(identifier = %id, kind = %kind, "Classified record");
        build_entity(&doc, kind, id, &self.config.base_url)
    }

    fn fetch_document(&self, id: &Identifier) -> Result<Document> {
        let url = self.config.record_url(id.as_str())?;
        let bytes = self
            .fetch_with_retry(&url)
            .map_err(|source| HarvesterError::Fetch {
                identifier: id.to_string(),
                source,
            })?;
        tracing::trace!(identifier = %id, bytes = bytes.len(), "Record fetched");
        parse_record(id, &bytes)
    }

    /// Fetch with exponential backoff for transient failures.
    ///
    /// With `max_retries == 0` the first error is returned unchanged.
    fn fetch_with_retry(&self, url: &str) -> std::result::Result<Vec<u8>, TransportError> {
        let max_retries = self.config.max_retries;
        let mut last_error: Option<String> = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                // base, 2 * base, 4 * base, ...
                let delay = self
                    .config
                    .retry_base_delay_ms
                    .saturating_mul(2u64.saturating_pow(attempt - 1));
                tracing::debug!(attempt, delay_ms = delay, "Retrying after delay");
                thread::sleep(Duration::from_millis(delay));
            }

            match self.fetcher.fetch(url) {
                Ok(bytes) => return Ok(bytes),
                Err(e) if max_retries > 0 && e.is_transient() => {
                    tracing::warn!(
                        url = %url,
                        error = %e,
                        attempt = attempt + 1,
                        max_retries,
                        "Transient transport error, will retry"
                    );
                    last_error = Some(e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        Err(TransportError::RetriesExhausted {
            attempts: max_retries + 1,
            message: last_error.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

/// Parse a response body, rejecting OAI-PMH error responses.
///
/// An error response means the service answered but has no such record, so
/// it is reported as a failed fetch rather than as a parse failure.
fn parse_record(id: &Identifier, bytes: &[u8]) -> Result<Document> {
    let doc = parse_document(bytes).map_err(|source| HarvesterError::Parse {
        identifier: id.to_string(),
        source,
    })?;
    if let Some(source) = oai_error(&doc) {
        tracing::debug!(identifier = %id, error = %source, "OAI error response");
        return Err(HarvesterError::Fetch {
            identifier: id.to_string(),
            source,
        });
    }
    Ok(doc)
}

/// State of one `get_element_for_id` call.
struct Resolution<'a> {
    library: &'a VisualLibrary,
    graph: ResolvedGraph,
    /// Identifiers still to resolve, with their depth below the root.
    pending: Vec<(Identifier, usize)>,
    fetches: usize,
}

impl<'a> Resolution<'a> {
    fn new(library: &'a VisualLibrary, root: Entity, children: Vec<Identifier>) -> Self {
        let mut resolution = Self {
            library,
            graph: ResolvedGraph::new(root),
            pending: Vec::new(),
            fetches: 0,
        };
        resolution.schedule(children, 1);
        resolution
    }

    /// Queue children so that they are popped in document order.
    fn schedule(&mut self, children: Vec<Identifier>, depth: usize) {
        self.pending
            .extend(children.into_iter().rev().map(|child| (child, depth)));
    }

    fn run(&mut self) -> Result<()> {
        while let Some((id, depth)) = self.pending.pop() {
            if self.graph.contains(id.as_str()) {
                tracing::trace!(identifier = %id, "Already resolved");
                continue;
            }

            self.fetches += 1;
            match self.library.load(&id) {
                Ok((entity, children)) => {
                    tracing::debug!(
                        identifier = %id,
                        depth,
                        children = children.len(),
                        "Resolved record"
                    );
                    self.graph.insert(Node::Resolved(entity));
                    self.schedule(children, depth + 1);
                }
                Err(error) => match self.library.config.failure_policy {
                    FailurePolicy::FailFast => return Err(error),
                    FailurePolicy::Record => {
                        tracing::warn!(
                            identifier = %id,
                            depth,
                            error = %error,
                            "Failed to resolve record, recording failure"
                        );
                        self.graph.insert(Node::Failed(FailedNode {
                            identifier: id,
                            error,
                        }));
                    }
                },
            }
        }
        Ok(())
    }
}
