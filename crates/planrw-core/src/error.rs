//! # Error Types
//!
//! The rewriters in this workspace do not have a recoverable-error taxonomy: when a
//! transformation cannot be proven sound it simply does not fire (`Ok(None)`).
//! The variants below are reserved for *precondition violations*, i.e. plans or
//! expressions that could only have been produced by a bug elsewhere in the planner.
//! They are surfaced to the caller as hard failures instead of being silently
//! corrected.

use crate::types::{Symbol, Type};

/// Precondition violations detected while rewriting plans or expressions.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// A projection assigns the same output symbol twice.
    #[error("duplicate assignment for symbol {0}")]
    DuplicateAssignment(Symbol),
    /// A join criterion references a symbol that its side of the join does not produce.
    #[error("join {join}: symbol {symbol} is not produced by the {side} input")]
    UnknownJoinSymbol {
        join: String,
        symbol: Symbol,
        side: &'static str,
    },
    /// An expression or output list references a symbol that is not in scope.
    #[error("symbol {0} is not in scope")]
    UnknownSymbol(String),
    /// A reference shares its name with a lambda argument but not its type.
    #[error("reference {reference} conflicts with lambda argument {argument}")]
    LambdaArgumentTypeMismatch { reference: Symbol, argument: Symbol },
    /// A bind expression captures more values than its lambda declares arguments.
    #[error("bind captures {captured} values but its lambda declares {arguments} arguments")]
    BindArityMismatch { captured: usize, arguments: usize },
    /// An expression's type does not match the symbol it is assigned to.
    #[error("expression assigned to {symbol} has type {actual}")]
    TypeMismatch { symbol: Symbol, actual: Type },
    /// The rewrite configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<serde_json::Error> for PlanError {
    fn from(err: serde_json::Error) -> Self {
        PlanError::InvalidConfig(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PlanError>;
