//! Lenient XML/HTML parser built on `quick-xml` events.
//!
//! Record bodies served by VL are not always well-formed. The parser keeps
//! whatever structure it can recover:
//!
//! - end tags need not match the open element; an end tag closes the nearest
//!   open element with the same name, and stray end tags are ignored
//! - elements still open at the end of input are closed implicitly
//! - attributes may be unquoted, valueless or duplicated
//! - unknown entities are kept as literal text
//! - a tokenizer error after the first element truncates the tree instead of
//!   failing the whole document

use std::borrow::Cow;

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::document::{Document, NodeKind};
use crate::error::ParseError;
use crate::http::bytes_to_string;

/// Parse raw response bytes into a [`Document`].
///
/// # Arguments
/// * `bytes` - Raw response body (UTF-8; invalid sequences are replaced)
///
/// # Returns
/// The recovered document tree, or an error if the body is empty or holds no
/// element at all.
///
/// # Examples
/// ```
/// use vl_harvester::xml::parse_document;
///
/// let doc = parse_document(b"<record><title>Decheniana</title>").unwrap();
/// assert_eq!(doc.find("title").unwrap().text(), Some("Decheniana"));
/// ```
pub fn parse_document(bytes: &[u8]) -> Result<Document, ParseError> {
    let text = bytes_to_string(bytes, "record body");
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let mut reader = Reader::from_str(&text);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    config.check_comments = false;

    let mut doc = Document::empty();
    // Open elements as (node id, lower-cased name); the document node is implicit
    let mut open: Vec<(usize, String)> = Vec::new();
    let mut elements = 0usize;

    loop {
        let parent = open.last().map_or(0, |(id, _)| *id);
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let (name, kind) = element(&e);
                let id = doc.push(parent, kind);
                open.push((id, name));
                elements += 1;
            }
            Ok(Event::Empty(e)) => {
                let (_, kind) = element(&e);
                doc.push(parent, kind);
                elements += 1;
            }
            Ok(Event::End(e)) => {
                let name = lower_name(e.name().as_ref());
                match open.iter().rposition(|(_, open_name)| *open_name == name) {
                    Some(position) => open.truncate(position),
                    None => tracing::trace!(tag = %name, "Ignoring unmatched end tag"),
                }
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .unwrap_or_else(|_| String::from_utf8_lossy(&e).into_owned().into());
                push_text(&mut doc, parent, text);
            }
            Ok(Event::CData(e)) => {
                push_text(&mut doc, parent, String::from_utf8_lossy(&e));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                let position = reader.error_position();
                if elements == 0 {
                    return Err(ParseError::Syntax {
                        position,
                        message: e.to_string(),
                    });
                }
                tracing::warn!(
                    position = position,
                    error = %e,
                    "Malformed markup, keeping partial document"
                );
                break;
            }
        }
    }

    if elements == 0 {
        return Err(ParseError::NoElements);
    }
    Ok(doc)
}

fn lower_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).to_lowercase()
}

fn element(e: &BytesStart<'_>) -> (String, NodeKind) {
    let name = lower_name(e.name().as_ref());
    let attributes = e
        .html_attributes()
        .with_checks(false)
        .filter_map(|attr| match attr {
            Ok(attr) => Some(attribute(&attr)),
            Err(err) => {
                tracing::trace!(tag = %name, error = %err, "Skipping malformed attribute");
                None
            }
        })
        .collect();
    (
        name.clone(),
        NodeKind::Element { name, attributes },
    )
}

fn attribute(attr: &Attribute<'_>) -> (String, String) {
    let key = lower_name(attr.key.as_ref());
    let value = match attr.unescape_value() {
        Ok(value) => value.into_owned(),
        Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
    };
    (key, value)
}

fn push_text(doc: &mut Document, parent: usize, text: Cow<'_, str>) {
    if text.trim().is_empty() {
        return;
    }
    doc.push(parent, NodeKind::Text(text.into_owned()));
}
