//! Helpers for extracting data from parsed record documents.

use super::document::Node;

/// Collapse runs of whitespace into single spaces and trim the ends.
///
/// # Examples
/// ```
/// use vl_harvester::xml::normalize_whitespace;
///
/// assert_eq!(normalize_whitespace("  Verhandlungen\n   des  Vereins "), "Verhandlungen des Vereins");
/// ```
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Get the whitespace-normalized text content of a node.
///
/// # Arguments
/// * `node` - Node to get text from
///
/// # Returns
/// All descendant text, normalized, or an empty string if there is none
pub fn get_text(node: Node<'_>) -> String {
    normalize_whitespace(&node.text_content())
}

/// Get the text content of a node, or `None` if it is blank.
pub fn non_empty_text(node: Node<'_>) -> Option<String> {
    Some(get_text(node)).filter(|text| !text.is_empty())
}

/// Normalized text of a node's direct text children, if non-blank.
///
/// Text inside child elements is ignored, so an unclosed element that
/// swallowed its siblings still yields only its own words.
pub fn own_text(node: Node<'_>) -> Option<String> {
    let text = node
        .children()
        .filter(Node::is_text)
        .map(|child| child.text_content())
        .collect::<Vec<_>>()
        .join(" ");
    Some(normalize_whitespace(&text)).filter(|text| !text.is_empty())
}

/// Text of the first descendant matching `tag`, if non-blank.
pub fn find_text(node: Node<'_>, tag: &str) -> Option<String> {
    node.find(tag).and_then(non_empty_text)
}

/// Check whether an attribute equals `value`, ignoring ASCII case.
///
/// # Arguments
/// * `node` - Node to check
/// * `name` - Attribute name
/// * `value` - Expected value
pub fn has_attribute_value(node: Node<'_>, name: &str, value: &str) -> bool {
    node.attribute(name)
        .is_some_and(|actual| actual.trim().eq_ignore_ascii_case(value))
}

/// First descendant matching `tag` whose attribute `name` equals `value`.
///
/// # Examples
/// ```
/// use vl_harvester::xml::{parse_document, find_with_attribute};
///
/// let doc = parse_document(br#"<r><div TYPE="a"/><div TYPE="b"/></r>"#).unwrap();
/// let b = find_with_attribute(doc.root(), "div", "type", "b");
/// assert!(b.is_some());
/// ```
pub fn find_with_attribute<'a>(
    node: Node<'a>,
    tag: &str,
    name: &str,
    value: &str,
) -> Option<Node<'a>> {
    node.find_all(tag)
        .find(|candidate| has_attribute_value(*candidate, name, value))
}

/// All descendants matching `tag` whose attribute `name` equals `value`.
pub fn find_all_with_attribute<'a, 't>(
    node: Node<'a>,
    tag: &'t str,
    name: &'t str,
    value: &'t str,
) -> impl Iterator<Item = Node<'a>> + 't
where
    'a: 't,
{
    node.find_all(tag)
        .filter(move |candidate| has_attribute_value(*candidate, name, value))
}

/// Nearest ancestor element matching `tag`.
///
/// # Arguments
/// * `node` - Starting node; the node itself is not considered
/// * `tag` - Tag name of the ancestor
///
/// # Returns
/// `Some(ancestor)` if the node is nested inside a matching element
pub fn find_ancestor<'a>(node: Node<'a>, tag: &str) -> Option<Node<'a>> {
    node.ancestors().find(|ancestor| ancestor.has_tag_name(tag))
}
