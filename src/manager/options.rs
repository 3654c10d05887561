//! Per-call options and outcomes for manager operations.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::BackendKind;
use crate::error::CacheError;
use crate::notify::ChangeOrigin;

// == Write Mode ==
/// How a `set` without a target spreads over persistent backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// First backend in priority order that accepts the write keeps the only copy
    #[default]
    FirstAvailable,
    /// Every available backend receives a copy
    ReplicateAll,
}

impl FromStr for WriteMode {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" | "first_available" => Ok(WriteMode::FirstAvailable),
            "all" | "replicate_all" => Ok(WriteMode::ReplicateAll),
            other => Err(CacheError::Internal(format!("unknown write mode '{}'", other))),
        }
    }
}

// == Expiry ==
/// When a written value stops being readable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Expiry {
    /// The manager's configured default (which may itself be "never")
    #[default]
    Default,
    Never,
    /// Relative to the time of the write
    In(Duration),
    /// Absolute Unix milliseconds
    At(u64),
}

impl Expiry {
    /// Absolute expiry for a write happening at `now`.
    pub fn resolve(self, now: u64, default: Option<Duration>) -> Option<u64> {
        let relative =
            |d: Duration| now.saturating_add(u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        match self {
            Expiry::Default => default.map(relative),
            Expiry::Never => None,
            Expiry::In(d) => Some(relative(d)),
            Expiry::At(at) => Some(at),
        }
    }
}

// == Set Options ==
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub expiry: Expiry,
    /// Write only this persistent backend; its failure fails the call
    pub target: Option<BackendKind>,
    pub origin: ChangeOrigin,
}

impl SetOptions {
    pub fn expiring_in(expiry: Duration) -> Self {
        Self {
            expiry: Expiry::In(expiry),
            ..Self::default()
        }
    }

    pub fn never_expiring() -> Self {
        Self {
            expiry: Expiry::Never,
            ..Self::default()
        }
    }

    pub fn with_target(mut self, target: BackendKind) -> Self {
        self.target = Some(target);
        self
    }
}

// == Get Options ==
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Returned when no tier holds a live value
    pub default: Option<Value>,
    /// Consult only this backend after the memory tier
    pub target: Option<BackendKind>,
}

impl GetOptions {
    pub fn with_default(default: Value) -> Self {
        Self {
            default: Some(default),
            target: None,
        }
    }

    pub fn from_backend(target: BackendKind) -> Self {
        Self {
            default: None,
            target: Some(target),
        }
    }
}

// == Outcomes ==
/// Which persistent backends ended up holding a written value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SetOutcome {
    pub persisted_to: Vec<BackendKind>,
}

impl SetOutcome {
    /// False when the value lives in the memory tier only.
    pub fn is_persisted(&self) -> bool {
        !self.persisted_to.is_empty()
    }
}

/// Result of a namespace clear.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClearReport {
    pub removed: BTreeMap<BackendKind, usize>,
    pub failed: Vec<BackendKind>,
}

/// Result of an expiration sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Expired entries removed per tier
    pub removed: BTreeMap<BackendKind, usize>,
    /// Backends whose sweep failed this round
    pub failed: Vec<BackendKind>,
    /// Deferred removals that finally went through
    pub pending_retried: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.removed.values().sum()
    }
}
