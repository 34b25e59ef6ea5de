//! # Symbols and Types
//!
//! A [`Symbol`] names a column or a lambda argument inside a plan. Symbols carry
//! their semantic [`Type`] with them, and two symbols are equal only when both the
//! name and the type match. Symbols are plain values: renaming one produces a new
//! `Symbol`, nothing is ever mutated in place.
//!
//! A [`TypeProvider`] is the read-only view of the symbols visible in some
//! enclosing scope, keyed by name.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Semantic type of a symbol or expression.
///
/// Only the handful of types that participate in capture analysis and
/// projection type-checking are modelled. `Unknown` is the type of symbols
/// whose type has not been inferred yet; it is compatible with every type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Type {
    Unknown,
    Boolean,
    Integer,
    Bigint,
    Double,
    Varchar,
    /// Type of a lambda: `function(arguments) -> return_type`.
    Function {
        arguments: Vec<Type>,
        return_type: Box<Type>,
    },
}

impl Type {
    pub fn function(arguments: Vec<Type>, return_type: Type) -> Self {
        Type::Function {
            arguments,
            return_type: Box::new(return_type),
        }
    }

    /// Whether a value of type `other` may be stored in a symbol of this type.
    pub fn is_compatible_with(&self, other: &Type) -> bool {
        matches!(self, Type::Unknown) || matches!(other, Type::Unknown) || self == other
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Unknown => write!(f, "unknown"),
            Type::Boolean => write!(f, "boolean"),
            Type::Integer => write!(f, "integer"),
            Type::Bigint => write!(f, "bigint"),
            Type::Double => write!(f, "double"),
            Type::Varchar => write!(f, "varchar"),
            Type::Function {
                arguments,
                return_type,
            } => {
                write!(f, "function(")?;
                for (i, arg) in arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ") -> {}", return_type)
            }
        }
    }
}

/// A named, typed variable in a plan or expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol {
    name: String,
    ty: Type,
}

impl Symbol {
    pub fn new(ty: Type, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.ty)
    }
}

/// Types of the symbols visible in an enclosing scope, keyed by symbol name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeProvider {
    types: BTreeMap<String, Type>,
}

impl TypeProvider {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_symbols<'a>(symbols: impl IntoIterator<Item = &'a Symbol>) -> Self {
        Self {
            types: symbols
                .into_iter()
                .map(|s| (s.name().to_string(), s.ty().clone()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Type> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
