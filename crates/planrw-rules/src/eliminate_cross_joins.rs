//! # Eliminate Cross Joins Rule
//!
//! Reorders a chain of inner joins so that each join has at least one equi-join
//! criterion whenever the join graph allows it:
//!
//! ```text
//! (a CROSS JOIN b) JOIN c ON a.x = c.x AND b.y = c.y
//!     ==>  (a JOIN c ON a.x = c.x) JOIN b ON c.y = b.y
//! ```
//!
//! ## Applicability
//!
//! The rule fires on an inner join when the flattened join graph has at least three
//! nodes, contains a cross join, is not ambiguous, and the solver's order differs
//! from the written order. In every other case it declines and the plan is left
//! as is. Outer joins are never reordered: they are opaque leaves of the graph.
//!
//! ## Reconstruction
//!
//! The replacement is a left-deep chain in solver order. The join adding node `n`
//! carries every criterion between `n` and the nodes joined before it, oriented so
//! the accumulated side's symbol is on the left. Leaves are reused unchanged unless
//! a projection was pushed down to them, in which case they are wrapped in a
//! projection computing exactly the symbols they have to provide. Pulled-up
//! filters are re-applied as one conjunction on top of the chain, and the root's
//! output symbols are preserved.

use crate::join_graph::JoinGraph;
use crate::join_order::{get_join_order, is_original_order};
use planrw_core::allocator::IdAllocator;
use planrw_core::analyzer::TypeAnalyzer;
use planrw_core::config::{JoinReorderingStrategy, RewriteConfig};
use planrw_core::error::Result;
use planrw_core::expr::combine_conjuncts;
use planrw_core::pattern::Pattern;
use planrw_core::plan::{
    Assignments, EquiJoinClause, FilterNode, JoinNode, JoinType, Lookup, PlanNode, ProjectNode,
};
use planrw_core::rule::{Rule, RuleContext};
use planrw_core::types::TypeProvider;
use std::sync::Arc;
use tracing::{debug, trace};

/// Reorders inner join chains to avoid cross joins.
pub struct EliminateCrossJoinsRule;

impl Rule for EliminateCrossJoinsRule {
    fn name(&self) -> &str {
        "EliminateCrossJoins"
    }

    fn pattern(&self) -> Pattern {
        Pattern::join(JoinType::Inner)
    }

    fn is_enabled(&self, config: &RewriteConfig) -> bool {
        config.join_reordering_strategy == JoinReorderingStrategy::EliminateCrossJoins
    }

    fn apply(&self, node: &PlanNode, ctx: &mut RuleContext<'_>) -> Result<Option<PlanNode>> {
        eliminate_cross_joins(node, ctx.lookup, ctx.id_allocator, ctx.type_analyzer)
    }
}

/// Rewrite the inner join tree rooted at `root`, or return `None` if it should stay.
pub fn eliminate_cross_joins(
    root: &PlanNode,
    lookup: &dyn Lookup,
    id_allocator: &mut IdAllocator,
    type_analyzer: &TypeAnalyzer,
) -> Result<Option<PlanNode>> {
    let PlanNode::Join(join) = root else {
        return Ok(None);
    };
    if join.join_type != JoinType::Inner {
        return Ok(None);
    }

    let graph = JoinGraph::build_from(root, lookup)?;
    if graph.size() < 3 || !graph.contains_cross_join() {
        trace!(
            "Join graph under {} has {} nodes and cross join {}, nothing to eliminate",
            root.id(),
            graph.size(),
            graph.contains_cross_join()
        );
        return Ok(None);
    }
    if graph.is_ambiguous() {
        debug!("Join graph under {} redefines symbols, keeping the written order", root.id());
        return Ok(None);
    }

    let order = get_join_order(&graph);
    if is_original_order(&order) {
        trace!("Written order under {} is already the best order", root.id());
        return Ok(None);
    }

    debug!("Reordering {} join inputs under {} as {:?}", graph.size(), root.id(), order);
    let replacement = build_join_tree(&graph, &order, id_allocator, type_analyzer)?;
    trace!("Replacement plan:\n{}", replacement.display(0));
    Ok(Some(replacement))
}

/// Left-deep join chain over `graph`'s nodes in `order`.
fn build_join_tree(
    graph: &JoinGraph,
    order: &[usize],
    id_allocator: &mut IdAllocator,
    type_analyzer: &TypeAnalyzer,
) -> Result<PlanNode> {
    let mut joined = vec![false; graph.size()];
    let mut result = leaf(graph, order[0], id_allocator, type_analyzer)?;
    joined[order[0]] = true;

    for &next in &order[1..] {
        let right = leaf(graph, next, id_allocator, type_analyzer)?;
        let criteria: Vec<EquiJoinClause> = graph
            .edges()
            .iter()
            .filter_map(|edge| {
                if edge.right == next && joined[edge.left] {
                    Some(EquiJoinClause::new(edge.left_symbol.clone(), edge.right_symbol.clone()))
                } else if edge.left == next && joined[edge.right] {
                    Some(EquiJoinClause::new(edge.right_symbol.clone(), edge.left_symbol.clone()))
                } else {
                    None
                }
            })
            .collect();
        let mut output_symbols = result.output_symbols();
        output_symbols.extend(right.output_symbols());
        result = Arc::new(PlanNode::Join(JoinNode {
            id: id_allocator.next_id(),
            join_type: JoinType::Inner,
            left: result,
            right,
            criteria,
            filter: None,
            output_symbols,
        }));
        joined[next] = true;
    }

    let outputs = graph.output_symbols().to_vec();
    if graph.filters().is_empty() {
        return Ok(match Arc::unwrap_or_clone(result) {
            PlanNode::Join(mut top) => {
                top.output_symbols = outputs;
                PlanNode::Join(top)
            }
            other => other,
        });
    }

    let filtered = PlanNode::Filter(FilterNode {
        id: id_allocator.next_id(),
        source: result,
        predicate: combine_conjuncts(graph.filters().to_vec()),
    });
    if filtered.output_symbols() == outputs {
        return Ok(filtered);
    }
    Ok(PlanNode::Project(ProjectNode {
        id: id_allocator.next_id(),
        source: Arc::new(filtered),
        assignments: Assignments::identity(&outputs),
    }))
}

/// Node `index` as a join input, wrapped in a projection if symbols were pushed to it.
fn leaf(
    graph: &JoinGraph,
    index: usize,
    id_allocator: &mut IdAllocator,
    type_analyzer: &TypeAnalyzer,
) -> Result<Arc<PlanNode>> {
    let node = graph.node(index);
    if !graph.needs_projection(index) {
        return Ok(node.clone());
    }

    let types = TypeProvider::from_symbols(&node.output_symbols());
    for (symbol, expression) in graph.assignments(index) {
        type_analyzer.check_assignment(symbol, expression, &types)?;
    }
    Ok(Arc::new(PlanNode::Project(ProjectNode {
        id: id_allocator.next_id(),
        source: node.clone(),
        assignments: Assignments::new(graph.assignments(index).to_vec())?,
    })))
}
