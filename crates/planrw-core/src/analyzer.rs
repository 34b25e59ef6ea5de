//! Type derivation for scalar expressions.

use crate::error::{PlanError, Result};
use crate::expr::{Expression, LambdaExpression};
use crate::types::{Symbol, Type, TypeProvider};

/// Computes expression types from symbol types and resolved function signatures.
///
/// A reference whose symbol type is `Unknown` falls back to the type provider. The
/// analyzer does not resolve overloads; every operator already carries its
/// [`crate::expr::ResolvedFunction`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeAnalyzer;

impl TypeAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn type_of(&self, expression: &Expression, types: &TypeProvider) -> Result<Type> {
        match expression {
            Expression::SymbolReference(symbol) => Ok(self.symbol_type(symbol, types)),
            Expression::Constant { ty, .. } => Ok(ty.clone()),
            Expression::Lambda(lambda) => self.lambda_type(lambda, types),
            Expression::Bind {
                captured_values,
                function,
            } => {
                if captured_values.len() > function.arguments.len() {
                    return Err(PlanError::BindArityMismatch {
                        captured: captured_values.len(),
                        arguments: function.arguments.len(),
                    });
                }
                for value in captured_values {
                    self.type_of(value, types)?;
                }
                match self.lambda_type(function, types)? {
                    Type::Function {
                        arguments,
                        return_type,
                    } => Ok(Type::Function {
                        arguments: arguments[captured_values.len()..].to_vec(),
                        return_type,
                    }),
                    other => Ok(other),
                }
            }
            Expression::ArithmeticBinary {
                function, left, right, ..
            } => {
                self.type_of(left, types)?;
                self.type_of(right, types)?;
                Ok(function.return_type.clone())
            }
            Expression::ArithmeticNegation { function, operand } => {
                self.type_of(operand, types)?;
                Ok(function.return_type.clone())
            }
            Expression::Comparison { left, right, .. } => {
                self.type_of(left, types)?;
                self.type_of(right, types)?;
                Ok(Type::Boolean)
            }
            Expression::Not(operand) => {
                self.type_of(operand, types)?;
                Ok(Type::Boolean)
            }
            Expression::Logical { terms, .. } => {
                for term in terms {
                    self.type_of(term, types)?;
                }
                Ok(Type::Boolean)
            }
            Expression::Call {
                function,
                arguments,
            } => {
                for argument in arguments {
                    self.type_of(argument, types)?;
                }
                Ok(function.return_type.clone())
            }
        }
    }

    /// Check that `expression` may be assigned to `symbol`.
    pub fn check_assignment(
        &self,
        symbol: &Symbol,
        expression: &Expression,
        types: &TypeProvider,
    ) -> Result<()> {
        let actual = self.type_of(expression, types)?;
        if symbol.ty().is_compatible_with(&actual) {
            Ok(())
        } else {
            Err(PlanError::TypeMismatch {
                symbol: symbol.clone(),
                actual,
            })
        }
    }

    fn symbol_type(&self, symbol: &Symbol, types: &TypeProvider) -> Type {
        match symbol.ty() {
            Type::Unknown => types.get(symbol.name()).cloned().unwrap_or(Type::Unknown),
            ty => ty.clone(),
        }
    }

    fn lambda_type(&self, lambda: &LambdaExpression, types: &TypeProvider) -> Result<Type> {
        let body = self.type_of(&lambda.body, types)?;
        Ok(Type::function(
            lambda.arguments.iter().map(|a| a.ty().clone()).collect(),
            body,
        ))
    }
}
