//! The resolved entity graph.
//!
//! Nodes are stored once per identifier in discovery order. Entities refer
//! to their children by identifier, so a record reached from several parents
//! is the same node for all of them, and cycles need no shared ownership.

use std::collections::{HashMap, HashSet};

use serde::{Serialize, Serializer};

use crate::error::{HarvesterError, Stage};
use crate::types::{Entity, Identifier, Page};

/// A child record that could not be resolved.
#[derive(Debug, Serialize)]
pub struct FailedNode {
    pub identifier: Identifier,
    #[serde(serialize_with = "serialize_error")]
    pub error: HarvesterError,
}

impl FailedNode {
    /// Stage (fetch or parse) that failed.
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        self.error.stage()
    }
}

fn serialize_error<S: Serializer>(error: &HarvesterError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// One node of a [`ResolvedGraph`].
#[derive(Debug, Serialize)]
#[serde(tag = "status", content = "node", rename_all = "snake_case")]
pub enum Node {
    Resolved(Entity),
    Failed(FailedNode),
}

impl Node {
    #[must_use]
    pub fn identifier(&self) -> &Identifier {
        match self {
            Self::Resolved(entity) => &entity.id,
            Self::Failed(failed) => &failed.identifier,
        }
    }

    fn as_node_ref(&self) -> NodeRef<'_> {
        match self {
            Self::Resolved(entity) => NodeRef::Resolved(entity),
            Self::Failed(failed) => NodeRef::Failed(failed),
        }
    }
}

/// Borrowed view of a node.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Resolved(&'a Entity),
    Failed(&'a FailedNode),
}

impl<'a> NodeRef<'a> {
    #[must_use]
    pub fn identifier(&self) -> &'a Identifier {
        match self {
            Self::Resolved(entity) => &entity.id,
            Self::Failed(failed) => &failed.identifier,
        }
    }

    /// The entity, if the node resolved.
    #[must_use]
    pub fn entity(&self) -> Option<&'a Entity> {
        match self {
            Self::Resolved(entity) => Some(entity),
            Self::Failed(_) => None,
        }
    }

    /// The failure, if the node did not resolve.
    #[must_use]
    pub fn failure(&self) -> Option<&'a FailedNode> {
        match self {
            Self::Resolved(_) => None,
            Self::Failed(failed) => Some(failed),
        }
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Root entity plus every record reachable through child references,
/// each present exactly once.
#[derive(Debug, Serialize)]
pub struct ResolvedGraph {
    root: Entity,
    nodes: Vec<Node>,
    #[serde(skip)]
    index: HashMap<Identifier, usize>,
}

impl ResolvedGraph {
    /// Start a graph from its resolved root.
    pub(crate) fn new(root: Entity) -> Self {
        Self {
            root,
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Add a node. A node for an identifier already present is ignored.
    pub(crate) fn insert(&mut self, node: Node) -> bool {
        let id = node.identifier();
        if self.contains(id.as_str()) {
            return false;
        }
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(node);
        true
    }

    /// The root entity.
    #[must_use]
    pub fn root(&self) -> &Entity {
        &self.root
    }

    #[must_use]
    pub fn root_id(&self) -> &Identifier {
        &self.root.id
    }

    /// Node for an identifier.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<NodeRef<'_>> {
        if self.root.id == id {
            return Some(NodeRef::Resolved(&self.root));
        }
        self.index.get(id).map(|&i| self.nodes[i].as_node_ref())
    }

    /// Resolved entity for an identifier.
    #[must_use]
    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.get(id).and_then(|node| node.entity())
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.root.id == id || self.index.contains_key(id)
    }

    /// Number of nodes, including the root and failed nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len() + 1
    }

    /// Always `false`: a graph contains at least its root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// All nodes in discovery order, root first.
    pub fn iter(&self) -> impl Iterator<Item = NodeRef<'_>> {
        std::iter::once(NodeRef::Resolved(&self.root)).chain(self.nodes.iter().map(Node::as_node_ref))
    }

    /// All resolved entities in discovery order, root first.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.iter().filter_map(|node| node.entity())
    }

    /// Nodes whose resolution failed.
    pub fn failures(&self) -> impl Iterator<Item = &FailedNode> {
        self.nodes.iter().filter_map(|node| match node {
            Node::Failed(failed) => Some(failed),
            Node::Resolved(_) => None,
        })
    }

    /// Whether every reachable record resolved.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Children of an entity in its document order.
    ///
    /// A record listed under several parents yields the same `&Entity` for
    /// each of them.
    pub fn children(&self, id: &str) -> impl Iterator<Item = NodeRef<'_>> {
        self.entity(id)
            .into_iter()
            .flat_map(|entity| entity.children.iter())
            .filter_map(move |child| self.get(child.as_str()))
    }

    /// Entities that list `id` as a child, in discovery order.
    #[must_use]
    pub fn referrers(&self, id: &str) -> Vec<&Entity> {
        self.entities()
            .filter(|entity| entity.children.iter().any(|child| child == id))
            .collect()
    }

    /// A scanned page and the first entity, in discovery order, listing it.
    #[must_use]
    pub fn page(&self, id: &str) -> Option<(&Entity, &Page)> {
        self.entities()
            .find_map(|entity| entity.page(id).map(|page| (entity, page)))
    }

    /// Depth-first pre-order traversal from the root, each node once.
    #[must_use]
    pub fn walk(&self) -> Vec<NodeRef<'_>> {
        let mut seen: HashSet<&Identifier> = HashSet::new();
        let mut order = Vec::with_capacity(self.len());
        let mut stack = vec![NodeRef::Resolved(&self.root)];

        while let Some(node) = stack.pop() {
            if !seen.insert(node.identifier()) {
                continue;
            }
            order.push(node);
            if let Some(entity) = node.entity() {
                stack.extend(
                    entity
                        .children
                        .iter()
                        .rev()
                        .filter_map(|child| self.get(child.as_str())),
                );
            }
        }
        order
    }
}
