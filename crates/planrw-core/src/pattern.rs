//! # Declarative Pattern Matching for Rules
//!
//! Each rule declares a [`Pattern`] describing the plan shape it can rewrite. The
//! registry checks the pattern before calling `apply`, so rules are not invoked on
//! nodes they would reject anyway.
//!
//! ## Pattern Language
//!
//! - `Pattern::Node(matcher, children)`: the node satisfies `matcher` and its
//!   children match the child patterns pairwise. An empty child list places no
//!   constraint on the children.
//! - `Pattern::Any`: matches any node.
//! - `Pattern::Leaf`: matches only nodes without children.
//!
//! ## Group References
//!
//! A group reference matches a non-`Any` pattern when the subplan it resolves to
//! (through the [`Lookup`]) does. A group reference that cannot be resolved only
//! matches `Any`, `Leaf`, or an explicit `GroupReference` kind matcher.

use crate::plan::{JoinType, Lookup, PlanNode, PlanNodeKind};

#[derive(Debug, Clone)]
pub enum Pattern {
    /// Match a node with child patterns.
    Node(NodeMatcher, Vec<Pattern>),
    /// Match anything.
    Any,
    /// Match a node with no children.
    Leaf,
}

/// Matcher for a single node, ignoring its children.
#[derive(Debug, Clone)]
pub enum NodeMatcher {
    Kind(PlanNodeKind),
    /// A join of exactly this type.
    Join(JoinType),
}

impl NodeMatcher {
    fn matches(&self, node: &PlanNode) -> bool {
        match (self, node) {
            (NodeMatcher::Kind(kind), node) => node.kind() == *kind,
            (NodeMatcher::Join(join_type), PlanNode::Join(join)) => join.join_type == *join_type,
            (NodeMatcher::Join(_), _) => false,
        }
    }
}

impl Pattern {
    /// A join of the given type with two arbitrary inputs.
    pub fn join(join_type: JoinType) -> Self {
        Pattern::Node(NodeMatcher::Join(join_type), vec![Pattern::Any, Pattern::Any])
    }

    /// A node of the given kind with arbitrary children.
    pub fn kind(kind: PlanNodeKind) -> Self {
        Pattern::Node(NodeMatcher::Kind(kind), vec![])
    }
}

/// Check whether `node` matches `pattern`.
pub fn matches(pattern: &Pattern, node: &PlanNode, lookup: &dyn Lookup) -> bool {
    match pattern {
        Pattern::Any => true,
        Pattern::Leaf => node.children().is_empty(),
        Pattern::Node(matcher, children) => {
            if let PlanNode::GroupReference(group) = node {
                if matcher.matches(node) {
                    return children.is_empty();
                }
                return match lookup.resolve(group) {
                    Some(resolved) => matches(pattern, &resolved, lookup),
                    None => false,
                };
            }
            if !matcher.matches(node) {
                return false;
            }
            if children.is_empty() {
                return true;
            }
            let node_children = node.children();
            node_children.len() == children.len()
                && children
                    .iter()
                    .zip(node_children)
                    .all(|(p, child)| matches(p, child, lookup))
        }
    }
}
