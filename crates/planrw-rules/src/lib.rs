//! # Built-in Rewrite Rules
//!
//! This crate provides the plan rewrites that run on top of `planrw-core`:
//!
//! - **`EliminateCrossJoinsRule`**: Flattens a chain of inner joins into a
//!   [`join_graph::JoinGraph`], picks an order that avoids cross joins
//!   ([`join_order`]) and rebuilds the chain in that order. Enabled only under the
//!   `ELIMINATE_CROSS_JOINS` join reordering strategy.
//! - **`DesugarLambdaExpressionRule`**: Rewrites lambdas that capture symbols of
//!   the enclosing scope into `Bind` expressions over closed lambdas
//!   ([`lambda_capture`]).

pub mod desugar_lambda;
pub mod eliminate_cross_joins;
pub mod join_graph;
pub mod join_order;
pub mod lambda_capture;

use planrw_core::rule::RuleRegistry;

/// Create a rule registry with all built-in rules.
pub fn default_rule_registry() -> RuleRegistry {
    let mut registry = RuleRegistry::new();
    registry.add_rule(Box::new(desugar_lambda::DesugarLambdaExpressionRule));
    registry.add_rule(Box::new(eliminate_cross_joins::EliminateCrossJoinsRule));
    registry
}
