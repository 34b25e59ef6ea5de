//! # Rewrite Configuration
//!
//! Session-level switches that decide which rules are enabled. The configuration
//! can be built in code (`RewriteConfig::default()`), parsed from the session
//! property strings used by the planner (`"ELIMINATE_CROSS_JOINS"`), or
//! deserialized from JSON.

use crate::error::{PlanError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How inner join chains may be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinReorderingStrategy {
    /// Keep the join order written in the query.
    None,
    /// Reorder only to remove cross joins, preserving the written order otherwise.
    #[default]
    EliminateCrossJoins,
    /// Leave join ordering to the cost-based reordering rules.
    Automatic,
}

impl FromStr for JoinReorderingStrategy {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "NONE" => Ok(JoinReorderingStrategy::None),
            "ELIMINATE_CROSS_JOINS" => Ok(JoinReorderingStrategy::EliminateCrossJoins),
            "AUTOMATIC" => Ok(JoinReorderingStrategy::Automatic),
            other => Err(PlanError::InvalidConfig(format!(
                "unknown join reordering strategy: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for JoinReorderingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JoinReorderingStrategy::None => "NONE",
            JoinReorderingStrategy::EliminateCrossJoins => "ELIMINATE_CROSS_JOINS",
            JoinReorderingStrategy::Automatic => "AUTOMATIC",
        };
        write!(f, "{}", name)
    }
}

/// Rule switches for one planning session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteConfig {
    #[serde(default)]
    pub join_reordering_strategy: JoinReorderingStrategy,
}

impl RewriteConfig {
    pub fn with_join_reordering_strategy(mut self, strategy: JoinReorderingStrategy) -> Self {
        self.join_reordering_strategy = strategy;
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
