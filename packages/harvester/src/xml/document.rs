//! Owned, navigable XML document tree.
//!
//! Nodes live in an arena owned by [`Document`]; [`Node`] is a cheap `Copy`
//! handle borrowing the document.
//!
//! Element and attribute names are stored lower-cased. Lookups compare
//! case-insensitively, and a query without a namespace prefix matches the
//! local part of a prefixed name (`"div"` matches `mets:div`).

use std::fmt;

use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Root,
    Element {
        name: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<usize>,
    pub(crate) children: Vec<usize>,
}

/// A parsed XML/HTML document.
#[derive(Clone)]
pub struct Document {
    pub(crate) nodes: Vec<NodeData>,
}

/// Parsed response for one identifier, as returned by the raw data-access path.
pub type RawDocument = Document;

impl Document {
    /// Parse raw response bytes leniently. See [`super::parse_document`].
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        super::parser::parse_document(bytes)
    }

    /// Parse a string leniently.
    pub fn parse_str(text: &str) -> Result<Self, ParseError> {
        super::parser::parse_document(text.as_bytes())
    }

    pub(crate) fn empty() -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Root,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub(crate) fn push(&mut self, parent: usize, kind: NodeKind) -> usize {
        let id = self.nodes.len();
        self.nodes.push(NodeData {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        id
    }

    /// The document node (parent of all top-level nodes).
    #[must_use]
    pub fn root(&self) -> Node<'_> {
        Node { doc: self, id: 0 }
    }

    /// The first top-level element.
    #[must_use]
    pub fn root_element(&self) -> Option<Node<'_>> {
        self.root().element_children().next()
    }

    /// Number of element nodes in the document.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Element { .. }))
            .count()
    }

    /// First element anywhere in the document matching `tag`.
    #[must_use]
    pub fn find(&self, tag: &str) -> Option<Node<'_>> {
        self.root().find(tag)
    }

    /// All elements in the document matching `tag`, in document order.
    pub fn find_all<'a, 't>(&'a self, tag: &'t str) -> impl Iterator<Item = Node<'a>> + 't
    where
        'a: 't,
    {
        self.root().find_all(tag)
    }

    /// All nodes in document order.
    pub fn descendants(&self) -> Descendants<'_> {
        self.root().descendants()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.nodes.len())
            .field(
                "root_element",
                &self.root_element().map(|n| n.name().to_string()),
            )
            .finish()
    }
}

/// Handle to one node of a [`Document`].
#[derive(Clone, Copy)]
pub struct Node<'a> {
    doc: &'a Document,
    id: usize,
}

impl PartialEq for Node<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.doc, other.doc) && self.id == other.id
    }
}

impl Eq for Node<'_> {}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data().kind {
            NodeKind::Root => write!(f, "Root"),
            NodeKind::Element { name, .. } => write!(f, "Element(<{name}>)"),
            NodeKind::Text(text) => write!(f, "Text({text:?})"),
        }
    }
}

/// Compare a stored (lower-case) name against a query.
fn name_matches(name: &str, query: &str) -> bool {
    if query.contains(':') {
        name.eq_ignore_ascii_case(query)
    } else {
        local_part(name).eq_ignore_ascii_case(query)
    }
}

fn local_part(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

impl<'a> Node<'a> {
    fn data(&self) -> &'a NodeData {
        &self.doc.nodes[self.id]
    }

    fn wrap(&self, id: usize) -> Node<'a> {
        Node { doc: self.doc, id }
    }

    /// The document this node belongs to.
    #[must_use]
    pub fn document(&self) -> &'a Document {
        self.doc
    }

    #[must_use]
    pub fn is_element(&self) -> bool {
        matches!(self.data().kind, NodeKind::Element { .. })
    }

    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self.data().kind, NodeKind::Text(_))
    }

    /// Qualified, lower-cased tag name (`mets:div`); empty for non-elements.
    #[must_use]
    pub fn name(&self) -> &'a str {
        match &self.data().kind {
            NodeKind::Element { name, .. } => name,
            _ => "",
        }
    }

    /// Tag name without namespace prefix (`div`).
    #[must_use]
    pub fn local_name(&self) -> &'a str {
        local_part(self.name())
    }

    /// Whether this is an element matching `tag`.
    #[must_use]
    pub fn has_tag_name(&self, tag: &str) -> bool {
        self.is_element() && name_matches(self.name(), tag)
    }

    /// Attribute value by name, using the same matching rules as tags.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&'a str> {
        match &self.data().kind {
            NodeKind::Element { attributes, .. } => attributes
                .iter()
                .find(|(key, _)| name_matches(key, name))
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }

    /// All attributes as `(name, value)` pairs.
    pub fn attributes(&self) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        let attributes: &'a [(String, String)] = match &self.data().kind {
            NodeKind::Element { attributes, .. } => attributes,
            _ => &[],
        };
        attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// First direct text child, borrowed from the document.
    #[must_use]
    pub fn text(&self) -> Option<&'a str> {
        self.children().find_map(|child| match &child.data().kind {
            NodeKind::Text(text) => Some(text.as_str()),
            _ => None,
        })
    }

    /// All descendant text, concatenated in document order.
    #[must_use]
    pub fn text_content(&self) -> String {
        if let NodeKind::Text(text) = &self.data().kind {
            return text.clone();
        }
        self.descendants()
            .filter_map(|n| match &n.data().kind {
                NodeKind::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn parent(&self) -> Option<Node<'a>> {
        self.data().parent.map(|id| self.wrap(id))
    }

    /// Parent, if it is an element.
    #[must_use]
    pub fn parent_element(&self) -> Option<Node<'a>> {
        self.parent().filter(Node::is_element)
    }

    /// Ancestor elements, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = Node<'a>> {
        std::iter::successors(self.parent_element(), Node::parent_element)
    }

    /// All direct children, including text nodes.
    pub fn children(&self) -> impl Iterator<Item = Node<'a>> + 'a {
        let doc = self.doc;
        self.data().children.iter().map(move |&id| Node { doc, id })
    }

    /// Direct element children.
    pub fn element_children(&self) -> impl Iterator<Item = Node<'a>> + 'a {
        self.children().filter(Node::is_element)
    }

    /// All nodes below this one in document order, excluding this node.
    #[must_use]
    pub fn descendants(&self) -> Descendants<'a> {
        Descendants {
            doc: self.doc,
            stack: self.data().children.iter().rev().copied().collect(),
        }
    }

    /// First descendant element matching `tag`.
    #[must_use]
    pub fn find(&self, tag: &str) -> Option<Node<'a>> {
        self.descendants().find(|n| n.has_tag_name(tag))
    }

    /// All descendant elements matching `tag`, in document order.
    pub fn find_all<'t>(&self, tag: &'t str) -> impl Iterator<Item = Node<'a>> + 't
    where
        'a: 't,
    {
        self.descendants().filter(move |n| n.has_tag_name(tag))
    }

    /// First direct child element matching `tag`.
    #[must_use]
    pub fn find_child(&self, tag: &str) -> Option<Node<'a>> {
        self.children().find(|n| n.has_tag_name(tag))
    }

    /// Direct child elements matching `tag`.
    pub fn find_children<'t>(&self, tag: &'t str) -> impl Iterator<Item = Node<'a>> + 't
    where
        'a: 't,
    {
        self.children().filter(move |n| n.has_tag_name(tag))
    }

    /// Descendant reached by a slash-separated path of child tags
    /// (e.g. `"mods:titleInfo/mods:title"`).
    #[must_use]
    pub fn find_by_path(&self, path: &str) -> Option<Node<'a>> {
        path.split('/')
            .filter(|part| !part.is_empty())
            .try_fold(*self, |current, part| current.find_child(part))
    }
}

/// Pre-order iterator over the nodes below a starting node.
pub struct Descendants<'a> {
    doc: &'a Document,
    stack: Vec<usize>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = Node<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.doc.nodes[id].children.iter().rev().copied());
        Some(Node { doc: self.doc, id })
    }
}
