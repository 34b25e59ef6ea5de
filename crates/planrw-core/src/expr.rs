//! # Scalar Expressions
//!
//! Scalar expressions are immutable trees embedded in plan nodes: projection
//! assignments, filter predicates, join filters and values rows. They are built
//! bottom-up by the planner and never patched afterwards; every rewrite produces a
//! new tree from rewritten children.
//!
//! ## Binding forms
//!
//! Two variants introduce bindings:
//!
//! - [`Expression::Lambda`] binds its argument symbols inside its body.
//! - [`Expression::Bind`] partially applies a lambda: `Bind([v1, .., vk], λ(p1..pn))`
//!   is the lambda `λ(p(k+1)..pn)` with `p1..pk` bound to `v1..vk`. The capture
//!   desugaring rewriter produces these so that lambdas have no free variables.
//!
//! Scoping is by *name*: a lambda argument hides every outer symbol with the same
//! name inside the lambda body. [`Expression::free_symbols`] and
//! [`Expression::substitute`] both respect that.
//!
//! All other variants are ordinary operators whose children are visited without
//! any special interpretation.

use crate::types::{Symbol, Type};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Constant value for expressions.
///
/// Uses `OrderedFloat` for `f64` so that constants can take part in `Eq`/`Hash`
/// comparisons of whole expression trees.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Integer(i32),
    Bigint(i64),
    Double(OrderedFloat<f64>),
    Varchar(String),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "NULL"),
            ScalarValue::Boolean(v) => write!(f, "{}", v),
            ScalarValue::Integer(v) => write!(f, "{}", v),
            ScalarValue::Bigint(v) => write!(f, "{}", v),
            ScalarValue::Double(v) => write!(f, "{}", v),
            ScalarValue::Varchar(v) => write!(f, "'{}'", v),
        }
    }
}

/// A function or operator whose overload has already been resolved by the analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedFunction {
    pub name: String,
    pub argument_types: Vec<Type>,
    pub return_type: Type,
}

impl ResolvedFunction {
    pub fn new(name: impl Into<String>, argument_types: Vec<Type>, return_type: Type) -> Self {
        Self {
            name: name.into(),
            argument_types,
            return_type,
        }
    }

    /// Resolved `$operator$<op>` for a binary arithmetic operator over one type.
    pub fn arithmetic(op: ArithmeticOp, ty: Type) -> Self {
        Self::new(
            format!("$operator${}", op.name()),
            vec![ty.clone(), ty.clone()],
            ty,
        )
    }

    /// Resolved `$operator$negation` over one type.
    pub fn negation(ty: Type) -> Self {
        Self::new("$operator$negation", vec![ty.clone()], ty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,
}

impl ArithmeticOp {
    pub fn name(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "add",
            ArithmeticOp::Subtract => "subtract",
            ArithmeticOp::Multiply => "multiply",
            ArithmeticOp::Divide => "divide",
            ArithmeticOp::Modulus => "modulus",
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Subtract => "-",
            ArithmeticOp::Multiply => "*",
            ArithmeticOp::Divide => "/",
            ArithmeticOp::Modulus => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl ComparisonOp {
    fn symbol(&self) -> &'static str {
        match self {
            ComparisonOp::Equal => "=",
            ComparisonOp::NotEqual => "<>",
            ComparisonOp::LessThan => "<",
            ComparisonOp::LessThanOrEqual => "<=",
            ComparisonOp::GreaterThan => ">",
            ComparisonOp::GreaterThanOrEqual => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
}

/// A lambda: `(arguments) -> body`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LambdaExpression {
    pub arguments: Vec<Symbol>,
    pub body: Box<Expression>,
}

impl LambdaExpression {
    pub fn new(arguments: Vec<Symbol>, body: Expression) -> Self {
        Self {
            arguments,
            body: Box::new(body),
        }
    }

    fn binds(&self, name: &str) -> bool {
        self.arguments.iter().any(|a| a.name() == name)
    }

    /// Substitute inside the body, leaving names rebound by this lambda untouched.
    fn substitute(&self, mapping: &HashMap<Symbol, Expression>) -> LambdaExpression {
        if mapping.keys().any(|s| self.binds(s.name())) {
            let visible: HashMap<Symbol, Expression> = mapping
                .iter()
                .filter(|(s, _)| !self.binds(s.name()))
                .map(|(s, e)| (s.clone(), e.clone()))
                .collect();
            LambdaExpression::new(self.arguments.clone(), self.body.substitute(&visible))
        } else {
            LambdaExpression::new(self.arguments.clone(), self.body.substitute(mapping))
        }
    }
}

/// Scalar expression tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expression {
    /// Reference to a symbol in scope.
    SymbolReference(Symbol),
    /// Typed constant.
    Constant { ty: Type, value: ScalarValue },
    /// Lambda abstraction.
    Lambda(LambdaExpression),
    /// Partial application of `function` to `captured_values` (leading arguments).
    Bind {
        captured_values: Vec<Expression>,
        function: LambdaExpression,
    },
    /// Binary arithmetic (`a + b`, `a * b`, ...).
    ArithmeticBinary {
        op: ArithmeticOp,
        function: ResolvedFunction,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// Unary minus.
    ArithmeticNegation {
        function: ResolvedFunction,
        operand: Box<Expression>,
    },
    /// Comparison (`a = b`, `a < b`, ...).
    Comparison {
        op: ComparisonOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// Boolean negation.
    Not(Box<Expression>),
    /// Flat conjunction or disjunction.
    Logical { op: LogicalOp, terms: Vec<Expression> },
    /// Call of a resolved function.
    Call {
        function: ResolvedFunction,
        arguments: Vec<Expression>,
    },
}

impl Expression {
    pub fn reference(symbol: &Symbol) -> Self {
        Expression::SymbolReference(symbol.clone())
    }

    pub fn constant(ty: Type, value: ScalarValue) -> Self {
        Expression::Constant { ty, value }
    }

    pub fn lambda(arguments: Vec<Symbol>, body: Expression) -> Self {
        Expression::Lambda(LambdaExpression::new(arguments, body))
    }

    pub fn bind(captured_values: Vec<Expression>, function: LambdaExpression) -> Self {
        Expression::Bind {
            captured_values,
            function,
        }
    }

    pub fn arithmetic(
        op: ArithmeticOp,
        function: ResolvedFunction,
        left: Expression,
        right: Expression,
    ) -> Self {
        Expression::ArithmeticBinary {
            op,
            function,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn negation(function: ResolvedFunction, operand: Expression) -> Self {
        Expression::ArithmeticNegation {
            function,
            operand: Box::new(operand),
        }
    }

    pub fn comparison(op: ComparisonOp, left: Expression, right: Expression) -> Self {
        Expression::Comparison {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// The symbol this expression is a bare reference to, if any.
    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Expression::SymbolReference(s) => Some(s),
            _ => None,
        }
    }

    /// Free symbols of this expression, in order of first occurrence (pre-order).
    ///
    /// References to lambda arguments inside the lambda body are bound and are not
    /// reported; each distinct symbol appears once.
    pub fn free_symbols(&self) -> Vec<Symbol> {
        let mut out = Vec::new();
        self.collect_free_symbols(&mut Vec::new(), &mut out);
        out
    }

    fn collect_free_symbols<'a>(&'a self, bound: &mut Vec<&'a str>, out: &mut Vec<Symbol>) {
        match self {
            Expression::SymbolReference(s) => {
                if !bound.contains(&s.name()) && !out.contains(s) {
                    out.push(s.clone());
                }
            }
            Expression::Lambda(lambda) => collect_lambda_free_symbols(lambda, bound, out),
            Expression::Bind {
                captured_values,
                function,
            } => {
                for value in captured_values {
                    value.collect_free_symbols(bound, out);
                }
                collect_lambda_free_symbols(function, bound, out);
            }
            other => {
                for child in other.operands() {
                    child.collect_free_symbols(bound, out);
                }
            }
        }
    }

    /// Names of every symbol mentioned anywhere in the tree, lambda arguments included.
    pub fn collect_symbol_names(&self, out: &mut BTreeSet<String>) {
        match self {
            Expression::SymbolReference(s) => {
                out.insert(s.name().to_string());
            }
            Expression::Lambda(lambda) => {
                out.extend(lambda.arguments.iter().map(|a| a.name().to_string()));
                lambda.body.collect_symbol_names(out);
            }
            Expression::Bind {
                captured_values,
                function,
            } => {
                for value in captured_values {
                    value.collect_symbol_names(out);
                }
                out.extend(function.arguments.iter().map(|a| a.name().to_string()));
                function.body.collect_symbol_names(out);
            }
            other => {
                for child in other.operands() {
                    child.collect_symbol_names(out);
                }
            }
        }
    }

    /// Replace free references to the keys of `mapping` by the mapped expressions.
    pub fn substitute(&self, mapping: &HashMap<Symbol, Expression>) -> Expression {
        if mapping.is_empty() {
            return self.clone();
        }
        match self {
            Expression::SymbolReference(s) => {
                mapping.get(s).cloned().unwrap_or_else(|| self.clone())
            }
            Expression::Lambda(lambda) => Expression::Lambda(lambda.substitute(mapping)),
            Expression::Bind {
                captured_values,
                function,
            } => Expression::Bind {
                captured_values: captured_values.iter().map(|v| v.substitute(mapping)).collect(),
                function: function.substitute(mapping),
            },
            other => other.map_operands(|child| child.substitute(mapping)),
        }
    }

    /// Direct operands of a non-binding node. Binding forms return an empty list;
    /// callers handle `Lambda` and `Bind` themselves.
    fn operands(&self) -> Vec<&Expression> {
        match self {
            Expression::SymbolReference(_)
            | Expression::Constant { .. }
            | Expression::Lambda(_)
            | Expression::Bind { .. } => vec![],
            Expression::ArithmeticBinary { left, right, .. }
            | Expression::Comparison { left, right, .. } => vec![left, right],
            Expression::ArithmeticNegation { operand, .. } | Expression::Not(operand) => {
                vec![operand]
            }
            Expression::Logical { terms, .. } => terms.iter().collect(),
            Expression::Call { arguments, .. } => arguments.iter().collect(),
        }
    }

    fn map_operands(&self, mut f: impl FnMut(&Expression) -> Expression) -> Expression {
        self.try_map_operands::<std::convert::Infallible>(|e| Ok(f(e)))
            .unwrap_or_else(|never| match never {})
    }

    /// Rebuild a non-binding node from operands transformed by `f`.
    ///
    /// `Lambda` and `Bind` are returned as clones: their scoping rules differ per
    /// traversal, so every traversal matches them explicitly.
    pub fn try_map_operands<E>(
        &self,
        mut f: impl FnMut(&Expression) -> Result<Expression, E>,
    ) -> Result<Expression, E> {
        Ok(match self {
            Expression::SymbolReference(_)
            | Expression::Constant { .. }
            | Expression::Lambda(_)
            | Expression::Bind { .. } => self.clone(),
            Expression::ArithmeticBinary {
                op,
                function,
                left,
                right,
            } => Expression::ArithmeticBinary {
                op: *op,
                function: function.clone(),
                left: Box::new(f(left)?),
                right: Box::new(f(right)?),
            },
            Expression::ArithmeticNegation { function, operand } => Expression::ArithmeticNegation {
                function: function.clone(),
                operand: Box::new(f(operand)?),
            },
            Expression::Comparison { op, left, right } => Expression::Comparison {
                op: *op,
                left: Box::new(f(left)?),
                right: Box::new(f(right)?),
            },
            Expression::Not(operand) => Expression::Not(Box::new(f(operand)?)),
            Expression::Logical { op, terms } => Expression::Logical {
                op: *op,
                terms: terms.iter().map(&mut f).collect::<Result<_, _>>()?,
            },
            Expression::Call {
                function,
                arguments,
            } => Expression::Call {
                function: function.clone(),
                arguments: arguments.iter().map(&mut f).collect::<Result<_, _>>()?,
            },
        })
    }

    /// Flatten AND-chains: `(A AND (B AND C))` → `[A, B, C]`.
    pub fn conjuncts(&self) -> Vec<&Expression> {
        match self {
            Expression::Logical {
                op: LogicalOp::And,
                terms,
            } => terms.iter().flat_map(|e| e.conjuncts()).collect(),
            other => vec![other],
        }
    }
}

fn collect_lambda_free_symbols<'a>(
    lambda: &'a LambdaExpression,
    bound: &mut Vec<&'a str>,
    out: &mut Vec<Symbol>,
) {
    let depth = bound.len();
    bound.extend(lambda.arguments.iter().map(|a| a.name()));
    lambda.body.collect_free_symbols(bound, out);
    bound.truncate(depth);
}

/// Combine predicates with AND. A single predicate is returned as is, an empty
/// list becomes `TRUE`.
pub fn combine_conjuncts(predicates: Vec<Expression>) -> Expression {
    let mut terms: Vec<Expression> = Vec::new();
    for predicate in predicates {
        terms.extend(predicate.conjuncts().into_iter().cloned());
    }
    match terms.len() {
        0 => Expression::constant(Type::Boolean, ScalarValue::Boolean(true)),
        1 => terms.remove(0),
        _ => Expression::Logical {
            op: LogicalOp::And,
            terms,
        },
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for LambdaExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        let names: Vec<&str> = self.arguments.iter().map(|a| a.name()).collect();
        write_list(f, &names)?;
        write!(f, ") -> {}", self.body)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::SymbolReference(s) => write!(f, "{}", s.name()),
            Expression::Constant { value, .. } => write!(f, "{}", value),
            Expression::Lambda(lambda) => write!(f, "{}", lambda),
            Expression::Bind {
                captured_values,
                function,
            } => {
                write!(f, "$bind(")?;
                write_list(f, captured_values)?;
                write!(f, ", {})", function)
            }
            Expression::ArithmeticBinary { op, left, right, .. } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Expression::ArithmeticNegation { operand, .. } => write!(f, "-({})", operand),
            Expression::Comparison { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Expression::Not(operand) => write!(f, "NOT ({})", operand),
            Expression::Logical { op, terms } => {
                let sep = match op {
                    LogicalOp::And => " AND ",
                    LogicalOp::Or => " OR ",
                };
                write!(f, "(")?;
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{}", sep)?;
                    }
                    write!(f, "{}", term)?;
                }
                write!(f, ")")
            }
            Expression::Call {
                function,
                arguments,
            } => {
                write!(f, "{}(", function.name)?;
                write_list(f, arguments)?;
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> Symbol {
        Symbol::new(Type::Integer, name)
    }

    fn r(name: &str) -> Expression {
        Expression::reference(&sym(name))
    }

    fn add(left: Expression, right: Expression) -> Expression {
        Expression::arithmetic(
            ArithmeticOp::Add,
            ResolvedFunction::arithmetic(ArithmeticOp::Add, Type::Integer),
            left,
            right,
        )
    }

    #[test]
    fn test_free_symbols_first_occurrence_order() {
        let expr = add(add(r("b"), r("a")), r("b"));
        assert_eq!(expr.free_symbols(), vec![sym("b"), sym("a")]);
    }

    #[test]
    fn test_free_symbols_skip_lambda_arguments() {
        // (x) -> a + x
        let expr = Expression::lambda(vec![sym("x")], add(r("a"), r("x")));
        assert_eq!(expr.free_symbols(), vec![sym("a")]);
    }

    #[test]
    fn test_free_symbols_of_bind_include_captured_values() {
        let expr = Expression::bind(
            vec![r("a")],
            LambdaExpression::new(vec![sym("a_0"), sym("x")], add(r("a_0"), r("x"))),
        );
        assert_eq!(expr.free_symbols(), vec![sym("a")]);
    }

    #[test]
    fn test_substitute_respects_shadowing() {
        // a + ((a) -> a)   with a := z
        let inner = Expression::lambda(vec![sym("a")], r("a"));
        let expr = Expression::Call {
            function: ResolvedFunction::new("apply", vec![], Type::Integer),
            arguments: vec![r("a"), inner.clone()],
        };
        let mapping = HashMap::from([(sym("a"), r("z"))]);
        let rewritten = expr.substitute(&mapping);
        assert_eq!(
            rewritten,
            Expression::Call {
                function: ResolvedFunction::new("apply", vec![], Type::Integer),
                arguments: vec![r("z"), inner],
            }
        );
    }

    #[test]
    fn test_collect_symbol_names_includes_lambda_arguments() {
        let expr = Expression::lambda(vec![sym("x")], add(r("a"), r("x")));
        let mut names = BTreeSet::new();
        expr.collect_symbol_names(&mut names);
        assert_eq!(names, BTreeSet::from(["a".to_string(), "x".to_string()]));
    }

    #[test]
    fn test_combine_conjuncts() {
        let p = Expression::comparison(ComparisonOp::Equal, r("a"), r("b"));
        let q = Expression::comparison(ComparisonOp::LessThan, r("c"), r("d"));
        assert_eq!(combine_conjuncts(vec![p.clone()]), p);
        let combined = combine_conjuncts(vec![p.clone(), q.clone()]);
        assert_eq!(combined.conjuncts(), vec![&p, &q]);
        assert_eq!(
            combine_conjuncts(vec![]),
            Expression::constant(Type::Boolean, ScalarValue::Boolean(true))
        );
    }

    #[test]
    fn test_display() {
        let expr = Expression::bind(
            vec![r("a")],
            LambdaExpression::new(vec![sym("a_0"), sym("x")], add(r("a_0"), r("x"))),
        );
        assert_eq!(expr.to_string(), "$bind(a, (a_0, x) -> (a_0 + x))");
    }
}
