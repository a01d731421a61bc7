//! VL Harvester - Resolve Visual Library records into linked entity graphs.
//!
//! This crate fetches bibliographic records (journals, volumes, issues and
//! articles) from a Visual Library OAI endpoint and materializes them as
//! typed entities, following the references between records so that one
//! identifier yields the complete graph below it.
//!
//! # Example
//!
//! ```
//! use vl_harvester::config;
//!
//! // Validate identifiers and build request URLs
//! assert!(config::validate_identifier("10771471").is_ok());
//! assert_eq!(
//!     config::record_url("https://vl.example.org/oai/", "mets", "10771471").unwrap(),
//!     "https://vl.example.org/oai/?verb=GetRecord&metadataPrefix=mets&identifier=10771471"
//! );
//! ```
//!
//! # Architecture
//!
//! - [`config`]: Configuration, identifier validation and URL building
//! - [`error`]: Error types and Result alias
//! - [`http`]: Transport boundary and the blocking HTTP client
//! - [`xml`]: Lenient parsing into a navigable document tree
//! - [`classify`]: Entity kind detection from OAI header markers
//! - [`mets`]: Navigation of the METS structure of a record
//! - [`builder`]: Per-kind mapping of records to entities
//! - [`types`]: Entity data model
//! - [`graph`]: The resolved, deduplicated entity graph
//! - [`resolver`]: Resolution engine and the [`VisualLibrary`] client

pub mod builder;
pub mod classify;
pub mod config;
pub mod error;
pub mod graph;
pub mod http;
pub mod mets;
pub mod resolver;
pub mod types;
pub mod xml;

// Re-export the client and its main entry points
pub use builder::build_entity;
pub use classify::classify;
pub use resolver::VisualLibrary;
pub use xml::{parse_document, Document, RawDocument};

// Re-export commonly used items
pub use config::{FailurePolicy, HarvesterConfig};
pub use error::{HarvesterError, ParseError, Result, Stage, TransportError};
pub use graph::{FailedNode, Node, NodeRef, ResolvedGraph};
pub use http::{Fetch, HttpFetcher};
pub use types::{Entity, EntityDetails, EntityKind, Identifier, Page};
