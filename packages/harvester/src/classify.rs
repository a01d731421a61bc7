//! Entity classification from OAI header markers.
//!
//! A record's kind is read from the `setSpec` values of its OAI header.
//! When several known markers are present the most specific kind wins, so
//! the result does not depend on the order of the markers.
//!
//! An OAI-PMH error response carries no record to classify; it is detected
//! separately by [`oai_error`] and reported as a failed fetch.

use crate::error::TransportError;
use crate::types::{EntityKind, IssueLevel};
use crate::xml::{get_text, Document};

/// `setSpec` values and the kind each one marks.
const SET_SPEC_KINDS: &[(&str, EntityKind)] = &[
    ("periodical", EntityKind::Journal),
    ("journal", EntityKind::Journal),
    ("journal_volume", EntityKind::Issue),
    ("journal_issue", EntityKind::Issue),
    ("article", EntityKind::Article),
];

/// Marker distinguishing volumes from issues.
const VOLUME_SET_SPEC: &str = "journal_volume";

/// Kind marked by a single `setSpec` value.
///
/// # Examples
/// ```
/// use vl_harvester::classify::kind_for_set_spec;
/// use vl_harvester::types::EntityKind;
///
/// assert_eq!(kind_for_set_spec(" Periodical "), Some(EntityKind::Journal));
/// assert_eq!(kind_for_set_spec("ubffm"), None);
/// ```
#[must_use]
pub fn kind_for_set_spec(set_spec: &str) -> Option<EntityKind> {
    let set_spec = set_spec.trim();
    SET_SPEC_KINDS
        .iter()
        .find(|(marker, _)| marker.eq_ignore_ascii_case(set_spec))
        .map(|(_, kind)| *kind)
}

fn specificity(kind: EntityKind) -> u8 {
    match kind {
        EntityKind::Unknown => 0,
        EntityKind::Journal => 1,
        EntityKind::Issue => 2,
        EntityKind::Article => 3,
    }
}

/// All `setSpec` values of the record header, trimmed and lower-cased.
pub fn set_specs(doc: &Document) -> Vec<String> {
    let Some(header) = doc.find("header") else {
        return Vec::new();
    };
    header
        .find_all("setspec")
        .map(|node| get_text(node).to_lowercase())
        .filter(|spec| !spec.is_empty())
        .collect()
}

/// Determine the entity kind of a parsed record.
///
/// Never fails: documents without a header or without a known marker are
/// [`EntityKind::Unknown`].
///
/// # Examples
/// ```
/// use vl_harvester::classify::classify;
/// use vl_harvester::types::EntityKind;
/// use vl_harvester::xml::parse_document;
///
/// let doc = parse_document(b"<record><header><setSpec>article</setSpec></header></record>").unwrap();
/// assert_eq!(classify(&doc), EntityKind::Article);
/// ```
pub fn classify(doc: &Document) -> EntityKind {
    set_specs(doc)
        .iter()
        .filter_map(|spec| kind_for_set_spec(spec))
        .max_by_key(|kind| specificity(*kind))
        .unwrap_or(EntityKind::Unknown)
}

/// The OAI-PMH error of a response that carries no record.
///
/// A response with a `record` element is never an error, even if it also
/// contains an `error` element somewhere in its metadata.
///
/// # Examples
/// ```
/// use vl_harvester::classify::oai_error;
/// use vl_harvester::xml::parse_document;
///
/// let doc = parse_document(br#"<OAI-PMH><error code="badArgument">Illegal</error></OAI-PMH>"#).unwrap();
/// assert!(oai_error(&doc).is_some());
/// ```
pub fn oai_error(doc: &Document) -> Option<TransportError> {
    if doc.find("record").is_some() {
        return None;
    }
    let error = doc.find("error")?;
    Some(TransportError::Oai {
        code: error
            .attribute("code")
            .map(|code| code.trim().to_string())
            .unwrap_or_default(),
        message: get_text(error),
    })
}

/// Level of an issue-kind record given its `setSpec` values.
pub fn issue_level(set_specs: &[String]) -> IssueLevel {
    if set_specs
        .iter()
        .any(|spec| spec.eq_ignore_ascii_case(VOLUME_SET_SPEC))
    {
        IssueLevel::Volume
    } else {
        IssueLevel::Issue
    }
}
