//! Rule that applies lambda capture desugaring to every expression a plan node holds.

use crate::lambda_capture::desugar_lambda_captures;
use planrw_core::error::Result;
use planrw_core::expr::Expression;
use planrw_core::pattern::Pattern;
use planrw_core::plan::{Assignments, FilterNode, JoinNode, PlanNode, ProjectNode, ValuesNode};
use planrw_core::rule::{Rule, RuleContext};

/// Desugars lambda captures in projections, filters, join filters and values rows.
///
/// The node keeps its id and its inputs; only the expressions change. The rule
/// declines when no expression changed.
pub struct DesugarLambdaExpressionRule;

impl Rule for DesugarLambdaExpressionRule {
    fn name(&self) -> &str {
        "DesugarLambdaExpression"
    }

    fn pattern(&self) -> Pattern {
        Pattern::Any
    }

    fn apply(&self, node: &PlanNode, ctx: &mut RuleContext<'_>) -> Result<Option<PlanNode>> {
        let types = ctx.symbol_allocator.types();
        let mut changed = false;
        let mut rewrite = |expression: &Expression| -> Result<Expression> {
            let rewritten = desugar_lambda_captures(expression, &types, ctx.symbol_allocator)?;
            changed |= rewritten != *expression;
            Ok(rewritten)
        };

        let replacement = match node {
            PlanNode::Project(project) => {
                let mut entries = Vec::with_capacity(project.assignments.len());
                for (symbol, expression) in project.assignments.iter() {
                    entries.push((symbol.clone(), rewrite(expression)?));
                }
                PlanNode::Project(ProjectNode {
                    assignments: Assignments::new(entries)?,
                    ..project.clone()
                })
            }
            PlanNode::Filter(filter) => PlanNode::Filter(FilterNode {
                predicate: rewrite(&filter.predicate)?,
                ..filter.clone()
            }),
            PlanNode::Join(join) => PlanNode::Join(JoinNode {
                filter: join.filter.as_ref().map(&mut rewrite).transpose()?,
                ..join.clone()
            }),
            PlanNode::Values(values) => {
                let mut rows = Vec::with_capacity(values.rows.len());
                for row in &values.rows {
                    rows.push(row.iter().map(&mut rewrite).collect::<Result<Vec<_>>>()?);
                }
                PlanNode::Values(ValuesNode {
                    rows,
                    ..values.clone()
                })
            }
            PlanNode::GroupReference(_) => return Ok(None),
        };

        Ok(changed.then_some(replacement))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planrw_core::allocator::{IdAllocator, SymbolAllocator};
    use planrw_core::analyzer::TypeAnalyzer;
    use planrw_core::config::RewriteConfig;
    use planrw_core::expr::{ArithmeticOp, LambdaExpression, ResolvedFunction, ScalarValue};
    use planrw_core::plan::{GroupId, GroupReferenceNode, JoinType, NoLookup, PlanNodeId};
    use planrw_core::types::{Symbol, Type};
    use std::sync::Arc;

    fn int(name: &str) -> Symbol {
        Symbol::new(Type::Integer, name)
    }

    fn add(left: Expression, right: Expression) -> Expression {
        Expression::arithmetic(
            ArithmeticOp::Add,
            ResolvedFunction::arithmetic(ArithmeticOp::Add, Type::Integer),
            left,
            right,
        )
    }

    fn apply(node: &PlanNode, symbols: &mut SymbolAllocator) -> Option<PlanNode> {
        let mut ids = IdAllocator::new();
        let analyzer = TypeAnalyzer::new();
        let config = RewriteConfig::default();
        let mut ctx = RuleContext {
            lookup: &NoLookup,
            id_allocator: &mut ids,
            symbol_allocator: symbols,
            type_analyzer: &analyzer,
            config: &config,
        };
        DesugarLambdaExpressionRule.apply(node, &mut ctx).unwrap()
    }

    fn values(names: &[&str]) -> Arc<PlanNode> {
        Arc::new(PlanNode::Values(ValuesNode {
            id: PlanNodeId(0),
            output_symbols: names.iter().map(|n| int(n)).collect(),
            rows: vec![],
        }))
    }

    /// `(x) -> a + x`
    fn capturing_lambda() -> Expression {
        Expression::lambda(
            vec![int("x")],
            add(Expression::reference(&int("a")), Expression::reference(&int("x"))),
        )
    }

    /// `$bind(a, (a_0, x) -> a_0 + x)`
    fn bound_lambda() -> Expression {
        Expression::bind(
            vec![Expression::reference(&int("a"))],
            LambdaExpression::new(
                vec![int("a_0"), int("x")],
                add(Expression::reference(&int("a_0")), Expression::reference(&int("x"))),
            ),
        )
    }

    /// `any_match(function)`, a boolean call over a lambda.
    fn any_match(function: Expression) -> Expression {
        Expression::Call {
            function: ResolvedFunction::new(
                "any_match",
                vec![Type::function(vec![Type::Integer], Type::Integer)],
                Type::Boolean,
            ),
            arguments: vec![function],
        }
    }

        #[test]
    fn test_project_assignment_is_desugared() {
        let lambda = Expression::lambda(
            vec![int("x")],
            add(Expression::reference(&int("a")), Expression::reference(&int("x"))),
        );
        let project = PlanNode::Project(ProjectNode {
            id: PlanNodeId(1),
            source: values(&["a"]),
            assignments: Assignments::new(vec![(int("f"), lambda)]).unwrap(),
        });
        let mut symbols = SymbolAllocator::with_symbols(vec![int("a"), int("f")]);

        let Some(PlanNode::Project(result)) = apply(&project, &mut symbols) else {
            panic!("expected a rewritten projection");
        };
        assert_eq!(result.id, PlanNodeId(1));
        assert_eq!(
            result.assignments.get(&int("f")),
            Some(&Expression::bind(
                vec![Expression::reference(&int("a"))],
                LambdaExpression::new(
                    vec![int("a_0"), int("x")],
                    add(Expression::reference(&int("a_0")), Expression::reference(&int("x"))),
                ),
            ))
        );
        assert!(symbols.contains("a_0"));
    }

    #[test]
    fn test_rule_declines_without_captures() {
        let lambda = Expression::lambda(vec![int("x")], Expression::reference(&int("x")));
        let project = PlanNode::Project(ProjectNode {
            id: PlanNodeId(1),
            source: values(&["a"]),
            assignments: Assignments::new(vec![(int("f"), lambda)]).unwrap(),
        });
        let mut symbols = SymbolAllocator::with_symbols(vec![int("a"), int("f")]);
        assert!(apply(&project, &mut symbols).is_none());
    }

    #[test]
    fn test_filter_predicate_is_desugared() {
        let filter = PlanNode::Filter(FilterNode {
            id: PlanNodeId(3),
            source: values(&["a"]),
            predicate: any_match(capturing_lambda()),
        });
        let mut symbols = SymbolAllocator::with_symbols(vec![int("a")]);

        let Some(PlanNode::Filter(result)) = apply(&filter, &mut symbols) else {
            panic!("expected a rewritten filter");
        };
        assert_eq!(result.id, PlanNodeId(3));
        assert_eq!(result.source, values(&["a"]));
        assert_eq!(result.predicate, any_match(bound_lambda()));
    }

    #[test]
    fn test_join_filter_is_desugared() {
        let join = PlanNode::Join(JoinNode {
            id: PlanNodeId(4),
            join_type: JoinType::Inner,
            left: values(&["a"]),
            right: values(&["b"]),
            criteria: vec![],
            filter: Some(any_match(capturing_lambda())),
            output_symbols: vec![int("a"), int("b")],
        });
        let mut symbols = SymbolAllocator::with_symbols(vec![int("a"), int("b")]);

        let Some(PlanNode::Join(result)) = apply(&join, &mut symbols) else {
            panic!("expected a rewritten join");
        };
        assert_eq!(result.id, PlanNodeId(4));
        assert_eq!(result.filter, Some(any_match(bound_lambda())));
        assert_eq!(result.output_symbols, vec![int("a"), int("b")]);
    }

    #[test]
    fn test_values_row_is_desugared() {
        let one = Expression::constant(Type::Integer, ScalarValue::Integer(1));
        let rows = PlanNode::Values(ValuesNode {
            id: PlanNodeId(5),
            output_symbols: vec![int("n"), int("f")],
            rows: vec![vec![one.clone(), capturing_lambda()]],
        });
        let mut symbols = SymbolAllocator::with_symbols(vec![int("a"), int("n"), int("f")]);

        let Some(PlanNode::Values(result)) = apply(&rows, &mut symbols) else {
            panic!("expected rewritten values");
        };
        assert_eq!(result.id, PlanNodeId(5));
        assert_eq!(result.rows, vec![vec![one, bound_lambda()]]);
    }

    #[test]
    fn test_group_reference_is_not_rewritten() {
        let reference = PlanNode::GroupReference(GroupReferenceNode {
            id: PlanNodeId(6),
            group: GroupId(1),
            output_symbols: vec![int("a")],
        });
        let mut symbols = SymbolAllocator::with_symbols(vec![int("a")]);
        assert!(apply(&reference, &mut symbols).is_none());
        assert!(!symbols.contains("a_0"));
    }
}
