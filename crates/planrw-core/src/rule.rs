//! # Rule System
//!
//! This module defines the rule trait and rule registry used to drive plan rewrites.
//!
//! A rule inspects one plan node and either produces a replacement node or declines
//! by returning `Ok(None)`. Declining is the normal outcome whenever the rule cannot
//! prove its rewrite is sound; `Err` is reserved for precondition violations.
//!
//! ## Pattern Matching
//!
//! Each rule declares a [`Pattern`]. The registry checks it before calling `apply`.
//!
//! ## Rule Context
//!
//! Rules receive a [`RuleContext`] with the collaborators they may need: the lookup
//! for group references, the plan node id allocator, the symbol allocator, the
//! type analyzer and the session configuration. Allocators are borrowed mutably, so
//! one context belongs to one planning thread at a time.

use crate::allocator::{IdAllocator, SymbolAllocator};
use crate::analyzer::TypeAnalyzer;
use crate::config::RewriteConfig;
use crate::error::Result;
use crate::pattern::{matches, Pattern};
use crate::plan::{Lookup, PlanNode};
use tracing::debug;

/// Context passed to rules during application.
pub struct RuleContext<'a> {
    pub lookup: &'a dyn Lookup,
    pub id_allocator: &'a mut IdAllocator,
    pub symbol_allocator: &'a mut SymbolAllocator,
    pub type_analyzer: &'a TypeAnalyzer,
    pub config: &'a RewriteConfig,
}

/// A rule rewrites a matching plan node into an equivalent one.
pub trait Rule: Send + Sync {
    /// Unique name of this rule.
    fn name(&self) -> &str;

    /// Pattern that this rule matches against.
    fn pattern(&self) -> Pattern;

    /// Whether the session configuration allows this rule to run.
    fn is_enabled(&self, _config: &RewriteConfig) -> bool {
        true
    }

    /// Apply the rule to a matching node.
    ///
    /// Returns `Ok(None)` when the rule does not fire. A returned replacement is a
    /// complete plan; rules never return partial results.
    fn apply(&self, node: &PlanNode, ctx: &mut RuleContext<'_>) -> Result<Option<PlanNode>>;
}

/// Registry of rewrite rules, tried in registration order.
pub struct RuleRegistry {
    pub rules: Vec<Box<dyn Rule>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn add_rule(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    /// Rules enabled under `config`.
    pub fn active_rules(&self, config: &RewriteConfig) -> Vec<&dyn Rule> {
        self.rules
            .iter()
            .map(|r| r.as_ref())
            .filter(|r| r.is_enabled(config))
            .collect()
    }

    /// Apply the first enabled rule whose pattern matches `node` and that fires.
    ///
    /// Returns the rule's name together with the replacement.
    pub fn apply_first(
        &self,
        node: &PlanNode,
        ctx: &mut RuleContext<'_>,
    ) -> Result<Option<(String, PlanNode)>> {
        for rule in self.active_rules(ctx.config) {
            if !matches(&rule.pattern(), node, ctx.lookup) {
                continue;
            }
            if let Some(replacement) = rule.apply(node, ctx)? {
                debug!("Rule {} fired on node {}", rule.name(), node.id());
                return Ok(Some((rule.name().to_string(), replacement)));
            }
        }
        Ok(None)
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
