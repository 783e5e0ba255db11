//! Hierarchical catalog tree for configuration UIs.
//!
//! Catalog identifiers are dotted paths (`netflix.popular.movie`); the tree
//! groups descriptors by shared path prefixes. Nodes live in an
//! index-addressed arena and insertion walks the path segments iteratively,
//! which keeps ownership acyclic and depth bounded by the segment count.

use serde::Serialize;

use crate::model::CatalogDescriptor;

/// Nested, serializable tree node. Rebuilt per request; never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogTreeNode {
    pub id: String,
    pub name: String,
    pub leaf: bool,
    pub children: Vec<CatalogTreeNode>,
}

struct ArenaNode {
    id: String,
    name: String,
    leaf: bool,
    children: Vec<usize>,
}

/// Arena-backed catalog tree. Node 0 is the synthetic root.
pub struct CatalogTree {
    nodes: Vec<ArenaNode>,
}

impl CatalogTree {
    fn new() -> Self {
        Self {
            nodes: vec![ArenaNode {
                id: String::new(),
                name: "Root".to_string(),
                leaf: false,
                children: Vec::new(),
            }],
        }
    }

    /// Insert a leaf for `descriptor`, creating intermediate nodes for each
    /// path segment as needed and reusing existing ones sharing a prefix.
    fn insert(&mut self, descriptor: &CatalogDescriptor) {
        let segments: Vec<&str> = descriptor.id.split('.').collect();
        let Some((last, intermediates)) = segments.split_last() else {
            return;
        };

        let mut cursor = 0usize;
        for segment in intermediates {
            cursor = match self.find_child(cursor, segment) {
                Some(idx) => idx,
                None => {
                    let idx = self.push_node(segment.to_string(), display_name(segment), false);
                    self.nodes[cursor].children.push(idx);
                    idx
                }
            };
        }

        let leaf = self.push_node(descriptor.id.clone(), display_name(last), true);
        self.nodes[cursor].children.push(leaf);
    }

    fn find_child(&self, parent: usize, segment: &str) -> Option<usize> {
        self.nodes[parent]
            .children
            .iter()
            .copied()
            .find(|&idx| !self.nodes[idx].leaf && self.nodes[idx].id == segment)
    }

    fn push_node(&mut self, id: String, name: String, leaf: bool) -> usize {
        self.nodes.push(ArenaNode {
            id,
            name,
            leaf,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    /// The root's children as nested serializable nodes.
    pub fn to_nodes(&self) -> Vec<CatalogTreeNode> {
        self.nodes[0]
            .children
            .iter()
            .map(|&idx| self.materialize(idx))
            .collect()
    }

    fn materialize(&self, idx: usize) -> CatalogTreeNode {
        let node = &self.nodes[idx];
        CatalogTreeNode {
            id: node.id.clone(),
            name: node.name.clone(),
            leaf: node.leaf,
            children: node
                .children
                .iter()
                .map(|&child| self.materialize(child))
                .collect(),
        }
    }
}

/// Build the catalog tree for a set of manifest descriptors.
pub fn build_tree(descriptors: &[CatalogDescriptor]) -> CatalogTree {
    let mut tree = CatalogTree::new();
    for descriptor in descriptors {
        tree.insert(descriptor);
    }
    tree
}

/// Path segment to display name: underscores become spaces, words are
/// title-cased.
fn display_name(segment: &str) -> String {
    segment
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
