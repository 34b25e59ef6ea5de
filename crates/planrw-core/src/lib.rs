//! # planrw-core: Plan and Expression IR for the Plan Rewriter
//!
//! This crate defines the intermediate representation the rewrite rules operate on
//! and the collaborator interfaces they consume. It contains no rewrite logic of its
//! own; the rules live in `planrw-rules`.
//!
//! ## Module Overview
//!
//! - **`types`**: Semantic types, symbols (name + type) and the `TypeProvider`.
//! - **`allocator`**: Fresh symbol allocation and plan node id allocation.
//! - **`expr`**: Immutable scalar expression trees, including lambdas and binds.
//! - **`plan`**: Immutable relational plan nodes, group references and lookups.
//! - **`analyzer`**: Type derivation for scalar expressions.
//! - **`pattern`**: Declarative pattern matching for rule applicability checks.
//! - **`rule`**: The `Rule` trait, rule context and rule registry.
//! - **`config`**: Session switches deciding which rules are enabled.
//! - **`error`**: Precondition violations surfaced by the rewriters.

pub mod allocator;
pub mod analyzer;
pub mod config;
pub mod error;
pub mod expr;
pub mod pattern;
pub mod plan;
pub mod rule;
pub mod types;

pub use error::{PlanError, Result};
