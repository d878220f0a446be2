//! Case-insensitive filtering of the password tree.
//!
//! A node whose display name contains the query matches with its whole
//! subtree. A folder that does not match itself is kept only when some
//! descendant matches, and then only with the matching parts.

use crate::tree::PwNode;
use serde::Serialize;

/// A node retained by a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "match", rename_all = "lowercase")]
pub enum Match<'a> {
    /// The node matched by name, every descendant is included.
    Whole { node: &'a PwNode },
    /// Some descendants matched.
    Partial {
        node: &'a PwNode,
        children: Vec<Match<'a>>,
    },
}

impl<'a> Match<'a> {
    pub fn node(&self) -> &'a PwNode {
        match self {
            Match::Whole { node } | Match::Partial { node, .. } => *node,
        }
    }

    pub fn name(&self) -> &'a str {
        self.node().name()
    }

    pub fn is_entry(&self) -> bool {
        self.node().is_entry()
    }

    /// Number of entries this match retains.
    pub fn password_count(&self) -> usize {
        match self {
            Match::Whole { node } => node.password_count(),
            Match::Partial { children, .. } => children.iter().map(Match::password_count).sum(),
        }
    }

    /// Materialize the match as a standalone tree.
    pub fn to_node(&self) -> PwNode {
        match self {
            Match::Whole { node } => (*node).clone(),
            Match::Partial { node, children } => {
                let kept = children.iter().map(Match::to_node).collect();
                if node.is_root() {
                    PwNode::new_root(kept)
                } else {
                    PwNode::new_folder(node.path().to_vec(), kept)
                }
            }
        }
    }
}

/// Children of `node` that match `predicate`, in their original order.
///
/// An empty predicate matches everything.
pub fn find_children<'a>(node: &'a PwNode, predicate: &str) -> Vec<Match<'a>> {
    let needle = predicate.to_lowercase();
    collect_matches(node, &needle)
}

fn collect_matches<'a>(node: &'a PwNode, needle: &str) -> Vec<Match<'a>> {
    node.children()
        .iter()
        .filter_map(|child| {
            if child.name().to_lowercase().contains(needle) {
                Some(Match::Whole { node: child })
            } else if child.is_entry() {
                None
            } else {
                let children = collect_matches(child, needle);
                (!children.is_empty()).then_some(Match::Partial {
                    node: child,
                    children,
                })
            }
        })
        .collect()
}

/// The subset of `root` retained by `predicate`, as a new tree.
pub fn filter_tree(root: &PwNode, predicate: &str) -> PwNode {
    Match::Partial {
        node: root,
        children: find_children(root, predicate),
    }
    .to_node()
}
