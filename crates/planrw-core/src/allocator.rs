//! # Allocators
//!
//! Both allocators are explicit values threaded through every rewrite (no global
//! counters), so rewrites are reproducible and independent planning sessions can
//! run in parallel with their own allocators.

use crate::plan::PlanNodeId;
use crate::types::{Symbol, Type, TypeProvider};
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// Issues fresh, session-unique symbols.
///
/// Fresh names are derived from a hint: a trailing `_<digits>` is stripped and
/// `_<n>` appended, where `n` comes from a per-allocator counter. The counter keeps
/// advancing until the candidate collides with nothing registered in the allocator
/// and nothing in the caller's reserved set.
#[derive(Debug, Clone, Default)]
pub struct SymbolAllocator {
    symbols: BTreeMap<String, Type>,
    next_id: u64,
}

impl SymbolAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator that already knows the given symbols.
    pub fn with_symbols(symbols: impl IntoIterator<Item = Symbol>) -> Self {
        Self {
            symbols: symbols
                .into_iter()
                .map(|s| (s.name().to_string(), s.ty().clone()))
                .collect(),
            next_id: 0,
        }
    }

    /// Snapshot of every registered symbol.
    pub fn types(&self) -> TypeProvider {
        let symbols: Vec<Symbol> = self
            .symbols
            .iter()
            .map(|(name, ty)| Symbol::new(ty.clone(), name.clone()))
            .collect();
        TypeProvider::from_symbols(&symbols)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn new_symbol(&mut self, hint: &str, ty: Type) -> Symbol {
        self.new_symbol_avoiding(hint, ty, &BTreeSet::new())
    }

    /// Fresh symbol whose name is neither registered nor in `reserved`.
    pub fn new_symbol_avoiding(
        &mut self,
        hint: &str,
        ty: Type,
        reserved: &BTreeSet<String>,
    ) -> Symbol {
        let base = strip_numeric_suffix(hint);
        let name = loop {
            let candidate = format!("{}_{}", base, self.next_id);
            self.next_id += 1;
            if !self.symbols.contains_key(&candidate) && !reserved.contains(&candidate) {
                break candidate;
            }
        };
        trace!("allocated symbol {} from hint {}", name, hint);
        self.symbols.insert(name.clone(), ty.clone());
        Symbol::new(ty, name)
    }
}

/// `a_12` → `a`, `a_` → `a`; a leading underscore is kept.
fn strip_numeric_suffix(hint: &str) -> &str {
    match hint.rfind('_') {
        Some(index) if index > 0 => {
            let tail = &hint[index + 1..];
            if tail.is_empty() || tail.chars().all(|c| c.is_ascii_digit()) {
                &hint[..index]
            } else {
                hint
            }
        }
        _ => hint,
    }
}

/// Issues plan node ids in increasing order.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    next_id: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator whose first id is `first`, for callers that already used lower ids.
    pub fn starting_at(first: u32) -> Self {
        Self { next_id: first }
    }

    pub fn next_id(&mut self) -> PlanNodeId {
        let id = PlanNodeId(self.next_id);
        self.next_id += 1;
        id
    }
}
