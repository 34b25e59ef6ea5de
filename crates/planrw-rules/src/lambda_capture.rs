//! # Lambda Capture Desugaring
//!
//! Rewrites lambdas that reference symbols of an enclosing scope into lambdas with
//! no free variables. Each captured symbol becomes an extra leading lambda argument,
//! and the captured value is supplied explicitly by a `Bind`:
//!
//! ```text
//! (x) -> a + x    ==>    $bind(a, (a_0, x) -> a_0 + x)
//! ```
//!
//! ## Traversal
//!
//! Lambda bodies are rewritten before the lambda itself, so inner lambdas are
//! desugared first. While a body is rewritten, every symbol reference it makes is
//! recorded in first-occurrence order. A nested lambda contributes only the symbols
//! *it* captures (its `Bind` values), never its own arguments, so the outer lambda
//! sees exactly the references that escape the inner one.
//!
//! ## Fresh names
//!
//! Capture arguments are allocated by the session's [`SymbolAllocator`] with the
//! captured symbol's type. Names visible in the result are reserved: the type
//! provider's names, the arguments of the lambda and of every lambda enclosing it,
//! every symbol mentioned in the body, and the captures allocated so far.

use planrw_core::allocator::SymbolAllocator;
use planrw_core::error::{PlanError, Result};
use planrw_core::expr::{Expression, LambdaExpression};
use planrw_core::types::{Symbol, TypeProvider};
use std::collections::{BTreeSet, HashMap};
use tracing::trace;

/// Desugar every lambda in `expression` so that none of them has free variables.
///
/// Lambdas without captures keep their shape (no `Bind` is introduced), so the
/// rewrite is a no-op on already capture-free expressions.
pub fn desugar_lambda_captures(
    expression: &Expression,
    types: &TypeProvider,
    allocator: &mut SymbolAllocator,
) -> Result<Expression> {
    let mut rewriter = LambdaCaptureDesugaringRewriter {
        types,
        allocator,
        enclosing: Vec::new(),
    };
    rewriter.rewrite(expression, &mut Vec::new())
}

struct LambdaCaptureDesugaringRewriter<'a> {
    types: &'a TypeProvider,
    allocator: &'a mut SymbolAllocator,
    /// Argument names of the lambdas around the one being rewritten.
    enclosing: Vec<String>,
}

impl LambdaCaptureDesugaringRewriter<'_> {
    fn rewrite(
        &mut self,
        expression: &Expression,
        referenced: &mut Vec<Symbol>,
    ) -> Result<Expression> {
        match expression {
            Expression::SymbolReference(symbol) => {
                record(referenced, symbol);
                Ok(expression.clone())
            }
            Expression::Lambda(lambda) => {
                let (captured_values, function) = self.rewrite_lambda(lambda, referenced)?;
                if captured_values.is_empty() {
                    Ok(Expression::Lambda(function))
                } else {
                    Ok(Expression::bind(captured_values, function))
                }
            }
            Expression::Bind {
                captured_values,
                function,
            } => {
                let mut values = Vec::with_capacity(captured_values.len());
                for value in captured_values {
                    values.push(self.rewrite(value, referenced)?);
                }
                // New captures become the leading arguments, so their values go first.
                let (mut captures, function) = self.rewrite_lambda(function, referenced)?;
                captures.extend(values);
                Ok(Expression::bind(captures, function))
            }
            other => other.try_map_operands(|child| self.rewrite(child, referenced)),
        }
    }

    /// Desugar one lambda, returning the values it captures and the closed lambda.
    fn rewrite_lambda(
        &mut self,
        lambda: &LambdaExpression,
        referenced: &mut Vec<Symbol>,
    ) -> Result<(Vec<Expression>, LambdaExpression)> {
        let scope = self.enclosing.len();
        self.enclosing.extend(lambda.arguments.iter().map(|a| a.name().to_string()));
        let mut body_references = Vec::new();
        let body = self.rewrite(&lambda.body, &mut body_references);
        self.enclosing.truncate(scope);
        let body = body?;

        let mut captured = Vec::new();
        for symbol in body_references {
            if lambda.arguments.contains(&symbol) {
                continue;
            }
            if let Some(argument) = lambda.arguments.iter().find(|a| a.name() == symbol.name()) {
                return Err(PlanError::LambdaArgumentTypeMismatch {
                    reference: symbol,
                    argument: argument.clone(),
                });
            }
            captured.push(symbol);
        }

        if captured.is_empty() {
            return Ok((vec![], LambdaExpression::new(lambda.arguments.clone(), body)));
        }

        let mut reserved: BTreeSet<String> = self.types.names().map(str::to_string).collect();
        reserved.extend(lambda.arguments.iter().map(|a| a.name().to_string()));
        reserved.extend(self.enclosing.iter().cloned());
        body.collect_symbol_names(&mut reserved);

        let mut arguments = Vec::with_capacity(captured.len() + lambda.arguments.len());
        let mut captured_values = Vec::with_capacity(captured.len());
        let mut mapping = HashMap::new();
        for symbol in &captured {
            let fresh = self
                .allocator
                .new_symbol_avoiding(symbol.name(), symbol.ty().clone(), &reserved);
            reserved.insert(fresh.name().to_string());
            mapping.insert(symbol.clone(), Expression::reference(&fresh));
            captured_values.push(Expression::reference(symbol));
            arguments.push(fresh);
            record(referenced, symbol);
        }
        arguments.extend(lambda.arguments.iter().cloned());

        let function = LambdaExpression::new(arguments, body.substitute(&mapping));
        trace!("desugared lambda captures [{}] into {}", names(&captured), function);
        Ok((captured_values, function))
    }
}

fn record(referenced: &mut Vec<Symbol>, symbol: &Symbol) {
    if !referenced.contains(symbol) {
        referenced.push(symbol.clone());
    }
}

fn names(symbols: &[Symbol]) -> String {
    symbols.iter().map(|s| s.name()).collect::<Vec<_>>().join(", ")
}
