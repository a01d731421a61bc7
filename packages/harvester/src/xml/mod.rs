//! Response parsing: lenient XML/HTML to a navigable document tree.

mod document;
mod parser;
mod utils;

pub use document::{Descendants, Document, Node, RawDocument};
pub use parser::parse_document;
pub use utils::{
    find_all_with_attribute, find_ancestor, find_text, find_with_attribute, get_text,
    has_attribute_value, non_empty_text, normalize_whitespace, own_text,
};
