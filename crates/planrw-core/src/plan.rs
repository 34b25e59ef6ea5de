//! # Plan Nodes
//!
//! Relational plan nodes form an immutable tree. Children are held in `Arc` so a
//! subtree may be shared by several parents (for example a leaf reused unchanged by
//! a rewritten join tree) without copying or locking.
//!
//! ## Group references
//!
//! A [`PlanNode::GroupReference`] stands in for a subplan that lives in an external
//! plan table (the optimizer's memo). It is an index ([`GroupId`]) rather than a
//! pointer, and the subplan behind it is reached only through a [`Lookup`].
//! [`PlanTable`] is the arena implementation used by tests and by callers that do
//! not run a memo of their own; [`NoLookup`] resolves nothing.

use crate::error::{PlanError, Result};
use crate::expr::Expression;
use crate::types::Symbol;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Identity of a plan node, issued by [`crate::allocator::IdAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlanNodeId(pub u32);

impl fmt::Display for PlanNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Index of a subplan in a [`PlanTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group {}", self.0)
    }
}

/// SQL join types.
///
/// Only inner joins may be reordered: moving an outer join relative to other joins
/// can change which rows are null-extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JoinType::Inner => "INNER",
            JoinType::Left => "LEFT",
            JoinType::Right => "RIGHT",
            JoinType::Full => "FULL",
        };
        write!(f, "{}", name)
    }
}

/// Equality predicate `left = right` between one symbol from each join input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EquiJoinClause {
    pub left: Symbol,
    pub right: Symbol,
}

impl EquiJoinClause {
    pub fn new(left: Symbol, right: Symbol) -> Self {
        Self { left, right }
    }

    pub fn flip(&self) -> Self {
        Self::new(self.right.clone(), self.left.clone())
    }
}

impl fmt::Display for EquiJoinClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.left.name(), self.right.name())
    }
}

/// Ordered, key-unique mapping from output symbol to expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Assignments {
    entries: Vec<(Symbol, Expression)>,
}

impl Assignments {
    /// Build assignments, rejecting a symbol that is assigned twice.
    pub fn new(entries: impl IntoIterator<Item = (Symbol, Expression)>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (symbol, expression) in entries {
            if !seen.insert(symbol.clone()) {
                return Err(PlanError::DuplicateAssignment(symbol));
            }
            out.push((symbol, expression));
        }
        Ok(Self { entries: out })
    }

    /// `s := s` for every symbol.
    pub fn identity<'a>(symbols: impl IntoIterator<Item = &'a Symbol>) -> Self {
        let mut seen = HashSet::new();
        Self {
            entries: symbols
                .into_iter()
                .filter(|s| seen.insert((*s).clone()))
                .map(|s| (s.clone(), Expression::reference(s)))
                .collect(),
        }
    }

    pub fn get(&self, symbol: &Symbol) -> Option<&Expression> {
        self.entries.iter().find(|(s, _)| s == symbol).map(|(_, e)| e)
    }

    pub fn outputs(&self) -> Vec<Symbol> {
        self.entries.iter().map(|(s, _)| s.clone()).collect()
    }

    pub fn expressions(&self) -> impl Iterator<Item = &Expression> {
        self.entries.iter().map(|(_, e)| e)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &Expression)> {
        self.entries.iter().map(|(s, e)| (s, e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether every assignment is `s := s`.
    pub fn is_identity(&self) -> bool {
        self.entries
            .iter()
            .all(|(s, e)| e.as_symbol() == Some(s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValuesNode {
    pub id: PlanNodeId,
    pub output_symbols: Vec<Symbol>,
    pub rows: Vec<Vec<Expression>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectNode {
    pub id: PlanNodeId,
    pub source: Arc<PlanNode>,
    pub assignments: Assignments,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterNode {
    pub id: PlanNodeId,
    pub source: Arc<PlanNode>,
    pub predicate: Expression,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JoinNode {
    pub id: PlanNodeId,
    pub join_type: JoinType,
    pub left: Arc<PlanNode>,
    pub right: Arc<PlanNode>,
    /// Equality clauses, left symbol from `left`, right symbol from `right`.
    pub criteria: Vec<EquiJoinClause>,
    /// Residual (non-equi) predicate evaluated on joined rows.
    pub filter: Option<Expression>,
    pub output_symbols: Vec<Symbol>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupReferenceNode {
    pub id: PlanNodeId,
    pub group: GroupId,
    pub output_symbols: Vec<Symbol>,
}

/// Relational plan node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanNode {
    /// Inline rows; a leaf.
    Values(ValuesNode),
    /// Computes `assignments` from the rows of `source`.
    Project(ProjectNode),
    /// Keeps the rows of `source` for which `predicate` holds.
    Filter(FilterNode),
    /// Combines two inputs on equi-criteria and an optional residual filter.
    Join(JoinNode),
    /// Opaque handle to a subplan in an external plan table.
    GroupReference(GroupReferenceNode),
}

/// Kind discriminant of a plan node, used by rule patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanNodeKind {
    Values,
    Project,
    Filter,
    Join,
    GroupReference,
}

impl PlanNode {
    pub fn id(&self) -> PlanNodeId {
        match self {
            PlanNode::Values(n) => n.id,
            PlanNode::Project(n) => n.id,
            PlanNode::Filter(n) => n.id,
            PlanNode::Join(n) => n.id,
            PlanNode::GroupReference(n) => n.id,
        }
    }

    pub fn kind(&self) -> PlanNodeKind {
        match self {
            PlanNode::Values(_) => PlanNodeKind::Values,
            PlanNode::Project(_) => PlanNodeKind::Project,
            PlanNode::Filter(_) => PlanNodeKind::Filter,
            PlanNode::Join(_) => PlanNodeKind::Join,
            PlanNode::GroupReference(_) => PlanNodeKind::GroupReference,
        }
    }

    pub fn output_symbols(&self) -> Vec<Symbol> {
        match self {
            PlanNode::Values(n) => n.output_symbols.clone(),
            PlanNode::Project(n) => n.assignments.outputs(),
            PlanNode::Filter(n) => n.source.output_symbols(),
            PlanNode::Join(n) => n.output_symbols.clone(),
            PlanNode::GroupReference(n) => n.output_symbols.clone(),
        }
    }

    pub fn children(&self) -> Vec<&Arc<PlanNode>> {
        match self {
            PlanNode::Values(_) | PlanNode::GroupReference(_) => vec![],
            PlanNode::Project(n) => vec![&n.source],
            PlanNode::Filter(n) => vec![&n.source],
            PlanNode::Join(n) => vec![&n.left, &n.right],
        }
    }

    /// Render the tree with one node per line, children indented below parents.
    pub fn display(&self, indent: usize) -> String {
        let pad = "  ".repeat(indent);
        let mut s = match self {
            PlanNode::Values(n) => {
                let names: Vec<&str> = n.output_symbols.iter().map(|s| s.name()).collect();
                format!("{}Values{} [{}] rows={}\n", pad, n.id, names.join(", "), n.rows.len())
            }
            PlanNode::Project(n) => {
                let items: Vec<String> = n
                    .assignments
                    .iter()
                    .map(|(s, e)| format!("{} := {}", s.name(), e))
                    .collect();
                format!("{}Project{} [{}]\n", pad, n.id, items.join(", "))
            }
            PlanNode::Filter(n) => format!("{}Filter{} {}\n", pad, n.id, n.predicate),
            PlanNode::Join(n) => {
                let criteria: Vec<String> = n.criteria.iter().map(|c| c.to_string()).collect();
                let filter = n
                    .filter
                    .as_ref()
                    .map(|f| format!(" filter={}", f))
                    .unwrap_or_default();
                format!(
                    "{}Join{} {} [{}]{}\n",
                    pad,
                    n.id,
                    n.join_type,
                    criteria.join(", "),
                    filter
                )
            }
            PlanNode::GroupReference(n) => format!("{}GroupReference{} {}\n", pad, n.id, n.group),
        };
        for child in self.children() {
            s.push_str(&child.display(indent + 1));
        }
        s
    }
}

/// Resolves group references to the subplans they stand for.
pub trait Lookup {
    fn resolve(&self, group: &GroupReferenceNode) -> Option<Arc<PlanNode>>;
}

/// A lookup that never resolves anything; every group reference stays opaque.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

impl Lookup for NoLookup {
    fn resolve(&self, _group: &GroupReferenceNode) -> Option<Arc<PlanNode>> {
        None
    }
}

/// Arena of subplans addressed by [`GroupId`].
#[derive(Debug, Clone, Default)]
pub struct PlanTable {
    plans: Vec<Arc<PlanNode>>,
}

impl PlanTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `plan` and return a group reference node standing in for it.
    pub fn insert(&mut self, id: PlanNodeId, plan: PlanNode) -> PlanNode {
        let group = GroupId(self.plans.len() as u32);
        let output_symbols = plan.output_symbols();
        self.plans.push(Arc::new(plan));
        PlanNode::GroupReference(GroupReferenceNode {
            id,
            group,
            output_symbols,
        })
    }

    pub fn get(&self, group: GroupId) -> Option<&Arc<PlanNode>> {
        self.plans.get(group.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

impl Lookup for PlanTable {
    fn resolve(&self, group: &GroupReferenceNode) -> Option<Arc<PlanNode>> {
        self.get(group.group).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    fn sym(name: &str) -> Symbol {
        Symbol::new(Type::Bigint, name)
    }

    fn values(id: u32, names: &[&str]) -> PlanNode {
        PlanNode::Values(ValuesNode {
            id: PlanNodeId(id),
            output_symbols: names.iter().map(|n| sym(n)).collect(),
            rows: vec![],
        })
    }

    #[test]
    fn test_assignments_reject_duplicates() {
        let result = Assignments::new(vec![
            (sym("a"), Expression::reference(&sym("x"))),
            (sym("a"), Expression::reference(&sym("y"))),
        ]);
        assert!(matches!(result, Err(PlanError::DuplicateAssignment(s)) if s == sym("a")));
    }

    #[test]
    fn test_assignments_identity() {
        let assignments = Assignments::identity(&[sym("a"), sym("b"), sym("a")]);
        assert_eq!(assignments.outputs(), vec![sym("a"), sym("b")]);
        assert!(assignments.is_identity());
        assert_eq!(assignments.get(&sym("b")), Some(&Expression::reference(&sym("b"))));
    }

    #[test]
    fn test_output_symbols() {
        let left = Arc::new(values(0, &["a"]));
        let right = Arc::new(values(1, &["b", "c"]));
        let join = PlanNode::Join(JoinNode {
            id: PlanNodeId(2),
            join_type: JoinType::Inner,
            left,
            right,
            criteria: vec![EquiJoinClause::new(sym("a"), sym("b"))],
            filter: None,
            output_symbols: vec![sym("a"), sym("c")],
        });
        assert_eq!(join.output_symbols(), vec![sym("a"), sym("c")]);
        assert_eq!(join.kind(), PlanNodeKind::Join);
        assert_eq!(join.children().len(), 2);
    }

    #[test]
    fn test_plan_table_lookup() {
        let mut table = PlanTable::new();
        let reference = table.insert(PlanNodeId(7), values(0, &["a", "b"]));
        let PlanNode::GroupReference(group) = &reference else {
            panic!("expected a group reference");
        };
        assert_eq!(group.output_symbols, vec![sym("a"), sym("b")]);
        assert_eq!(table.resolve(group).map(|p| p.id()), Some(PlanNodeId(0)));
        assert!(NoLookup.resolve(group).is_none());
    }

    #[test]
    fn test_display_indents_children() {
        let join = PlanNode::Join(JoinNode {
            id: PlanNodeId(2),
            join_type: JoinType::Inner,
            left: Arc::new(values(0, &["a"])),
            right: Arc::new(values(1, &["b"])),
            criteria: vec![EquiJoinClause::new(sym("a"), sym("b"))],
            filter: None,
            output_symbols: vec![sym("a"), sym("b")],
        });
        let text = join.display(0);
        assert_eq!(
            text,
            "Join#2 INNER [a = b]\n  Values#0 [a] rows=0\n  Values#1 [b] rows=0\n"
        );
    }
}
