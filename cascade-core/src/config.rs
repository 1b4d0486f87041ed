//! Engine configuration.
//!
//! A [`Graph`](crate::graph::Graph) carries one [`EngineConfig`] for its
//! whole lifetime. Both policies apply uniformly to every port and edge.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, GraphError};
use crate::graph::PortRef;
use crate::value::{Value, ValueKind};

/// What happens when a value does not match a port's declared kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypePolicy {
    /// Refuse mismatched literals and edges at assignment time. Mismatched
    /// values arriving over an edge fail the consuming node.
    #[default]
    Reject,

    /// Convert where [`Value::coerce`] knows how; refuse otherwise.
    Coerce,
}

impl TypePolicy {
    /// Check `value` against the declared `kind` of `port`.
    ///
    /// Sentinels always pass.
    pub fn admit(
        self,
        port: PortRef,
        kind: Option<ValueKind>,
        value: Value,
    ) -> Result<Value, GraphError> {
        let (Some(expected), Some(found)) = (kind, value.kind()) else {
            return Ok(value);
        };
        if expected == found {
            return Ok(value);
        }
        let mismatch = GraphError::TypeMismatch {
            port,
            expected,
            found,
        };
        match self {
            TypePolicy::Reject => Err(mismatch),
            TypePolicy::Coerce => value.coerce(expected).ok_or(mismatch),
        }
    }

    /// Whether an edge between ports of the given kinds can carry values.
    pub fn compatible(self, from: Option<ValueKind>, to: Option<ValueKind>) -> bool {
        match (from, to) {
            (Some(from), Some(to)) if from != to => match self {
                TypePolicy::Reject => false,
                TypePolicy::Coerce => convertible(from, to),
            },
            _ => true,
        }
    }
}

/// Kind pairs [`Value::coerce`] can convert between for at least some values.
fn convertible(from: ValueKind, to: ValueKind) -> bool {
    use ValueKind::*;
    matches!(
        (from, to),
        (Int, Float) | (Float, Int) | (Bool, Int) | (Int, Bool)
    ) || (from != List && (to == Text || to == List))
}

/// What happens when an edge would close a dependency cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePolicy {
    /// Accept the edge. Pulls break the cycle with the visited set and
    /// return the partial value, which is never cached as fresh.
    #[default]
    Tolerate,

    /// Refuse the edge with [`GraphError::Cycle`].
    Reject,
}

/// Per-graph engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EngineConfig {
    pub type_policy: TypePolicy,
    pub cycle_policy: CyclePolicy,
}

impl EngineConfig {
    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_type_policy(mut self, policy: TypePolicy) -> Self {
        self.type_policy = policy;
        self
    }

    pub fn with_cycle_policy(mut self, policy: CyclePolicy) -> Self {
        self.cycle_policy = policy;
        self
    }
}
