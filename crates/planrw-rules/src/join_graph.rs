//! # Join Graph
//!
//! Flattens a tree of inner joins into an undirected multigraph whose nodes are the
//! join leaves and whose edges are the equi-join criteria.
//!
//! ## Flattening
//!
//! Starting at the root, the builder descends through:
//!
//! - inner joins, whose criteria become edges (a join without criteria is a cross
//!   join) and whose residual filter is pulled up,
//! - filters, whose predicate is pulled up,
//! - projections in which every assignment depends on exactly one underlying symbol
//!   (`a2 := -a1`, `f := f`); their assignments are composed with the source and
//!   pushed down to the leaf that owns the underlying symbol,
//! - group references whose resolved subplan flattens into more than one node.
//!
//! Anything else is a leaf: outer joins, values, projections that combine several
//! symbols, and group references that resolve to a single node or not at all.
//!
//! Leaves are numbered left to right, so for a left-deep tree the leaf order is the
//! order the query was written in. Edges keep discovery order: the left subtree's
//! edges, then the right subtree's, then the join's own criteria.
//!
//! ## Pushed-down assignments
//!
//! Every symbol a criterion, a filter or the root output list needs is traced back
//! to one leaf and to an expression over that leaf's outputs. When the same symbol
//! name is traced to two different definitions, or two leaves would expose the same
//! symbol name, the graph is marked ambiguous and must not be rebuilt.

use planrw_core::error::{PlanError, Result};
use planrw_core::expr::Expression;
use planrw_core::plan::{
    Assignments, FilterNode, GroupReferenceNode, JoinNode, JoinType, Lookup, PlanNode, ProjectNode,
};
use planrw_core::types::Symbol;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::trace;

/// One equi-join criterion between two leaves.
///
/// `left_symbol` is produced by node `left` and `right_symbol` by node `right`,
/// oriented as the criterion was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub left: usize,
    pub left_symbol: Symbol,
    pub right: usize,
    pub right_symbol: Symbol,
}

/// A flattened inner-join tree.
#[derive(Debug, Clone)]
pub struct JoinGraph {
    nodes: Vec<Arc<PlanNode>>,
    edges: Vec<Edge>,
    filters: Vec<Expression>,
    output_symbols: Vec<Symbol>,
    assignments: Vec<Vec<(Symbol, Expression)>>,
    contains_cross_join: bool,
    ambiguous: bool,
}

impl JoinGraph {
    /// Flatten the tree rooted at `root`, resolving group references via `lookup`.
    pub fn build_from(root: &PlanNode, lookup: &dyn Lookup) -> Result<JoinGraph> {
        let root = Arc::new(root.clone());
        let builder = JoinGraphBuilder { lookup };
        let mut partial = builder.visit(&root)?;

        let output_symbols = root.output_symbols();
        for symbol in &output_symbols {
            partial.require(symbol)?;
        }
        let graph = partial.finish(output_symbols);
        trace!(
            "join graph: {} nodes, {} edges, {} filters, cross join: {}, ambiguous: {}",
            graph.size(),
            graph.edges.len(),
            graph.filters.len(),
            graph.contains_cross_join,
            graph.ambiguous
        );
        Ok(graph)
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, index: usize) -> &Arc<PlanNode> {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> &[Arc<PlanNode>] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Predicates pulled up from filters and join filters, in discovery order.
    pub fn filters(&self) -> &[Expression] {
        &self.filters
    }

    /// Output symbols of the flattened root.
    pub fn output_symbols(&self) -> &[Symbol] {
        &self.output_symbols
    }

    /// Whether some flattened inner join had no criteria.
    pub fn contains_cross_join(&self) -> bool {
        self.contains_cross_join
    }

    /// Whether the graph cannot be rebuilt without changing which symbol is which.
    pub fn is_ambiguous(&self) -> bool {
        self.ambiguous
    }

    /// Symbols node `index` has to provide, each defined over the node's outputs.
    pub fn assignments(&self, index: usize) -> &[(Symbol, Expression)] {
        &self.assignments[index]
    }

    /// Whether node `index` has to be wrapped in a projection to provide its symbols.
    pub fn needs_projection(&self, index: usize) -> bool {
        self.assignments[index]
            .iter()
            .any(|(symbol, expression)| expression.as_symbol() != Some(symbol))
    }

    /// Neighbor sets, one per node.
    pub fn adjacency(&self) -> Vec<BTreeSet<usize>> {
        let mut adjacency = vec![BTreeSet::new(); self.nodes.len()];
        for edge in &self.edges {
            adjacency[edge.left].insert(edge.right);
            adjacency[edge.right].insert(edge.left);
        }
        adjacency
    }
}

/// Where a symbol in scope comes from: a leaf and an expression over its outputs.
#[derive(Debug, Clone, PartialEq)]
struct Binding {
    node: usize,
    expression: Expression,
}

#[derive(Debug, Default)]
struct PartialGraph {
    nodes: Vec<Arc<PlanNode>>,
    edges: Vec<Edge>,
    filters: Vec<Expression>,
    scope: HashMap<Symbol, Binding>,
    required: Vec<(Symbol, Binding)>,
    contains_cross_join: bool,
    ambiguous: bool,
}

impl PartialGraph {
    fn leaf(node: Arc<PlanNode>) -> Self {
        let scope = node
            .output_symbols()
            .into_iter()
            .map(|symbol| {
                let binding = Binding {
                    node: 0,
                    expression: Expression::reference(&symbol),
                };
                (symbol, binding)
            })
            .collect();
        Self {
            nodes: vec![node],
            scope,
            ..Self::default()
        }
    }

    /// Renumber every node index by `offset`.
    fn shifted(mut self, offset: usize) -> Self {
        for edge in &mut self.edges {
            edge.left += offset;
            edge.right += offset;
        }
        for binding in self.scope.values_mut() {
            binding.node += offset;
        }
        for (_, binding) in &mut self.required {
            binding.node += offset;
        }
        self
    }

    /// Merge `other`, whose indices must already be shifted past this graph's nodes.
    fn absorb(&mut self, other: PartialGraph) {
        self.nodes.extend(other.nodes);
        self.edges.extend(other.edges);
        self.filters.extend(other.filters);
        for (symbol, binding) in other.scope {
            if self.scope.insert(symbol, binding).is_some() {
                self.ambiguous = true;
            }
        }
        self.required.extend(other.required);
        self.contains_cross_join |= other.contains_cross_join;
        self.ambiguous |= other.ambiguous;
    }

    fn require(&mut self, symbol: &Symbol) -> Result<()> {
        let binding = self
            .scope
            .get(symbol)
            .cloned()
            .ok_or_else(|| PlanError::UnknownSymbol(symbol.name().to_string()))?;
        self.required.push((symbol.clone(), binding));
        Ok(())
    }

    fn pull_up(&mut self, predicate: &Expression) -> Result<()> {
        for symbol in predicate.free_symbols() {
            self.require(&symbol)?;
        }
        self.filters.push(predicate.clone());
        Ok(())
    }

    /// Restrict the scope to `symbols`, the outputs of the node just visited.
    fn retain_scope(&mut self, symbols: &[Symbol]) -> Result<()> {
        let mut scope = HashMap::with_capacity(symbols.len());
        for symbol in symbols {
            let binding = self
                .scope
                .get(symbol)
                .cloned()
                .ok_or_else(|| PlanError::UnknownSymbol(symbol.name().to_string()))?;
            scope.insert(symbol.clone(), binding);
        }
        self.scope = scope;
        Ok(())
    }

    fn finish(self, output_symbols: Vec<Symbol>) -> JoinGraph {
        let mut ambiguous = self.ambiguous;
        let mut assignments: Vec<Vec<(Symbol, Expression)>> = vec![Vec::new(); self.nodes.len()];
        let mut definitions: HashMap<String, Binding> = HashMap::new();
        for (symbol, binding) in self.required {
            match definitions.get(symbol.name()) {
                Some(existing) => {
                    if *existing != binding {
                        ambiguous = true;
                    }
                }
                None => {
                    assignments[binding.node].push((symbol.clone(), binding.expression.clone()));
                    definitions.insert(symbol.name().to_string(), binding);
                }
            }
        }

        // Two leaves exposing the same name would collide in a rebuilt join.
        let mut owners: HashMap<String, usize> = HashMap::new();
        for (index, node) in self.nodes.iter().enumerate() {
            let wrapped = assignments[index]
                .iter()
                .any(|(symbol, expression)| expression.as_symbol() != Some(symbol));
            let exposed: Vec<Symbol> = if wrapped {
                assignments[index].iter().map(|(s, _)| s.clone()).collect()
            } else {
                node.output_symbols()
            };
            for symbol in exposed {
                if let Some(owner) = owners.insert(symbol.name().to_string(), index) {
                    if owner != index {
                        ambiguous = true;
                    }
                }
            }
        }

        JoinGraph {
            nodes: self.nodes,
            edges: self.edges,
            filters: self.filters,
            output_symbols,
            assignments,
            contains_cross_join: self.contains_cross_join,
            ambiguous,
        }
    }
}

struct JoinGraphBuilder<'a> {
    lookup: &'a dyn Lookup,
}

impl JoinGraphBuilder<'_> {
    fn visit(&self, node: &Arc<PlanNode>) -> Result<PartialGraph> {
        match node.as_ref() {
            PlanNode::Join(join) if join.join_type == JoinType::Inner => self.visit_join(join),
            PlanNode::Project(project) if is_single_symbol_projection(&project.assignments) => {
                self.visit_project(project)
            }
            PlanNode::Filter(filter) => self.visit_filter(filter),
            PlanNode::GroupReference(group) => self.visit_group_reference(node, group),
            _ => Ok(PartialGraph::leaf(node.clone())),
        }
    }

    fn visit_join(&self, join: &JoinNode) -> Result<PartialGraph> {
        let mut graph = self.visit(&join.left)?;
        let right = self.visit(&join.right)?.shifted(graph.nodes.len());

        let mut edges = Vec::with_capacity(join.criteria.len());
        let mut required = Vec::with_capacity(join.criteria.len() * 2);
        for clause in &join.criteria {
            let left = graph
                .scope
                .get(&clause.left)
                .cloned()
                .ok_or_else(|| unknown_join_symbol(join, &clause.left, "left"))?;
            let right_binding = right
                .scope
                .get(&clause.right)
                .cloned()
                .ok_or_else(|| unknown_join_symbol(join, &clause.right, "right"))?;
            debug_assert_ne!(left.node, right_binding.node);
            edges.push(Edge {
                left: left.node,
                left_symbol: clause.left.clone(),
                right: right_binding.node,
                right_symbol: clause.right.clone(),
            });
            required.push((clause.left.clone(), left));
            required.push((clause.right.clone(), right_binding));
        }

        graph.absorb(right);
        graph.contains_cross_join |= join.criteria.is_empty();
        graph.edges.extend(edges);
        graph.required.extend(required);
        if let Some(filter) = &join.filter {
            graph.pull_up(filter)?;
        }
        graph.retain_scope(&join.output_symbols)?;
        Ok(graph)
    }

    fn visit_project(&self, project: &ProjectNode) -> Result<PartialGraph> {
        let mut graph = self.visit(&project.source)?;
        let mut scope = HashMap::with_capacity(project.assignments.len());
        for (symbol, expression) in project.assignments.iter() {
            let underlying = expression
                .free_symbols()
                .into_iter()
                .next()
                .ok_or_else(|| PlanError::UnknownSymbol(symbol.name().to_string()))?;
            let source = graph
                .scope
                .get(&underlying)
                .ok_or_else(|| PlanError::UnknownSymbol(underlying.name().to_string()))?;
            let composed = expression.substitute(&HashMap::from([(
                underlying.clone(),
                source.expression.clone(),
            )]));
            scope.insert(
                symbol.clone(),
                Binding {
                    node: source.node,
                    expression: composed,
                },
            );
        }
        graph.scope = scope;
        Ok(graph)
    }

    fn visit_filter(&self, filter: &FilterNode) -> Result<PartialGraph> {
        let mut graph = self.visit(&filter.source)?;
        graph.pull_up(&filter.predicate)?;
        Ok(graph)
    }

    fn visit_group_reference(
        &self,
        node: &Arc<PlanNode>,
        group: &GroupReferenceNode,
    ) -> Result<PartialGraph> {
        if let Some(resolved) = self.lookup.resolve(group) {
            let mut graph = self.visit(&resolved)?;
            if graph.nodes.len() > 1 {
                graph.retain_scope(&group.output_symbols)?;
                return Ok(graph);
            }
        }
        Ok(PartialGraph::leaf(node.clone()))
    }
}

/// Whether each assignment depends on exactly one underlying symbol.
fn is_single_symbol_projection(assignments: &Assignments) -> bool {
    assignments
        .expressions()
        .all(|expression| expression.free_symbols().len() == 1)
}

fn unknown_join_symbol(join: &JoinNode, symbol: &Symbol, side: &'static str) -> PlanError {
    PlanError::UnknownJoinSymbol {
        join: join.id.to_string(),
        symbol: symbol.clone(),
        side,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planrw_core::expr::ResolvedFunction;
    use planrw_core::plan::{EquiJoinClause, NoLookup, PlanNodeId, PlanTable, ValuesNode};
    use planrw_core::types::Type;

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

    fn join(
        id: u32,
        join_type: JoinType,
        left: PlanNode,
        right: PlanNode,
        criteria: &[(&str, &str)],
    ) -> PlanNode {
        let mut output_symbols = left.output_symbols();
        output_symbols.extend(right.output_symbols());
        PlanNode::Join(JoinNode {
            id: PlanNodeId(id),
            join_type,
            left: Arc::new(left),
            right: Arc::new(right),
            criteria: criteria
                .iter()
                .map(|(l, r)| EquiJoinClause::new(sym(l), sym(r)))
                .collect(),
            filter: None,
            output_symbols,
        })
    }

    fn inner(id: u32, left: PlanNode, right: PlanNode, criteria: &[(&str, &str)]) -> PlanNode {
        join(id, JoinType::Inner, left, right, criteria)
    }

    #[test]
    fn test_flattens_left_deep_tree_in_order() {
        let plan = inner(
            4,
            inner(2, values(0, &["a"]), values(1, &["b"]), &[]),
            values(3, &["c"]),
            &[("a", "c"), ("b", "c")],
        );
        let graph = JoinGraph::build_from(&plan, &NoLookup).unwrap();
        assert_eq!(graph.size(), 3);
        let ids: Vec<PlanNodeId> = graph.nodes().iter().map(|n| n.id()).collect();
        assert_eq!(ids, vec![PlanNodeId(0), PlanNodeId(1), PlanNodeId(3)]);
        assert!(graph.contains_cross_join());
        assert!(!graph.is_ambiguous());
        assert_eq!(
            graph.edges(),
            &[
                Edge {
                    left: 0,
                    left_symbol: sym("a"),
                    right: 2,
                    right_symbol: sym("c"),
                },
                Edge {
                    left: 1,
                    left_symbol: sym("b"),
                    right: 2,
                    right_symbol: sym("c"),
                },
            ]
        );
    }

    #[test]
    fn test_outer_join_is_a_leaf() {
        let plan = inner(
            4,
            join(2, JoinType::Left, values(0, &["a"]), values(1, &["b"]), &[("a", "b")]),
            values(3, &["c"]),
            &[("a", "c")],
        );
        let graph = JoinGraph::build_from(&plan, &NoLookup).unwrap();
        assert_eq!(graph.size(), 2);
        assert!(!graph.contains_cross_join());
    }

    #[test]
    fn test_unknown_criterion_symbol_is_an_error() {
        let plan = inner(2, values(0, &["a"]), values(1, &["b"]), &[("b", "a")]);
        let err = JoinGraph::build_from(&plan, &NoLookup).unwrap_err();
        assert!(matches!(err, PlanError::UnknownJoinSymbol { side: "left", .. }));
    }

    #[test]
    fn test_single_symbol_projection_is_pushed_to_its_leaf() {
        let project = PlanNode::Project(ProjectNode {
            id: PlanNodeId(3),
            source: Arc::new(inner(2, values(0, &["a1"]), values(1, &["b"]), &[])),
            assignments: Assignments::new(vec![
                (
                    sym("a2"),
                    Expression::negation(
                        ResolvedFunction::negation(Type::Bigint),
                        Expression::reference(&sym("a1")),
                    ),
                ),
                (sym("b"), Expression::reference(&sym("b"))),
            ])
            .unwrap(),
        });
        let plan = inner(5, project, values(4, &["c"]), &[("a2", "c")]);
        let graph = JoinGraph::build_from(&plan, &NoLookup).unwrap();
        assert_eq!(graph.size(), 3);
        assert!(graph.needs_projection(0));
        assert!(!graph.needs_projection(1));
        assert_eq!(graph.assignments(0)[0].0, sym("a2"));
        assert_eq!(graph.edges()[0].left, 0);
        assert_eq!(graph.edges()[0].right, 2);
    }

    #[test]
    fn test_projection_combining_symbols_is_a_leaf() {
        let project = PlanNode::Project(ProjectNode {
            id: PlanNodeId(3),
            source: Arc::new(inner(2, values(0, &["a1"]), values(1, &["b"]), &[])),
            assignments: Assignments::new(vec![(
                sym("a2"),
                Expression::arithmetic(
                    planrw_core::expr::ArithmeticOp::Add,
                    ResolvedFunction::arithmetic(
                        planrw_core::expr::ArithmeticOp::Add,
                        Type::Bigint,
                    ),
                    Expression::reference(&sym("a1")),
                    Expression::reference(&sym("b")),
                ),
            )])
            .unwrap(),
        });
        let plan = inner(5, project, values(4, &["c"]), &[("a2", "c")]);
        let graph = JoinGraph::build_from(&plan, &NoLookup).unwrap();
        assert_eq!(graph.size(), 2);
    }

    #[test]
    fn test_conflicting_definitions_are_ambiguous() {
        // Both leaves expose `x`.
        let plan = inner(
            4,
            inner(2, values(0, &["x"]), values(1, &["b"]), &[]),
            values(3, &["x2", "x"]),
            &[("b", "x2")],
        );
        let PlanNode::Join(mut root) = plan else {
            unreachable!()
        };
        root.output_symbols = vec![sym("b")];
        let graph = JoinGraph::build_from(&PlanNode::Join(root), &NoLookup).unwrap();
        assert!(graph.is_ambiguous());
    }

    #[test]
    fn test_group_reference_is_flattened_only_when_it_joins() {
        let mut table = PlanTable::new();
        let a = table.insert(PlanNodeId(10), values(0, &["a"]));
        let b = table.insert(PlanNodeId(11), values(1, &["b"]));
        let ab = table.insert(PlanNodeId(12), inner(2, a, b, &[]));
        let plan = inner(4, ab, values(3, &["c"]), &[("a", "c")]);

        let graph = JoinGraph::build_from(&plan, &table).unwrap();
        assert_eq!(graph.size(), 3);
        assert!(matches!(
            graph.node(0).as_ref(),
            PlanNode::GroupReference(g) if g.id == PlanNodeId(10)
        ));

        let opaque = JoinGraph::build_from(&plan, &NoLookup).unwrap();
        assert_eq!(opaque.size(), 2);
    }

    #[test]
    fn test_adjacency() {
        let plan = inner(
            4,
            inner(2, values(0, &["a"]), values(1, &["b"]), &[]),
            values(3, &["c"]),
            &[("a", "c"), ("b", "c")],
        );
        let graph = JoinGraph::build_from(&plan, &NoLookup).unwrap();
        let adjacency = graph.adjacency();
        assert_eq!(adjacency[0], BTreeSet::from([2]));
        assert_eq!(adjacency[2], BTreeSet::from([0, 1]));
    }
}
