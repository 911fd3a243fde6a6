//! Shared message and value types
//!
//! Argument and return values are dynamic JSON values so that matching is
//! plain value equality over heterogeneous argument lists. Recorded-call
//! notifications travel over an unbounded channel to the owning test and are
//! never buffered or replayed by the core.

use serde::{Deserialize, Serialize};

/// Dynamic value used for stub arguments and results
pub type Value = serde_json::Value;

/// Ordered argument list for one call
pub type CallArgs = Vec<Value>;

/// Notification sent to the owning test each time an installed stub runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedCall {
    /// Identity of the doubled source, when `send_source_in_messages` is set
    pub source: Option<String>,
    /// Operation name that was invoked
    pub name: String,
    /// Argument values the stub was invoked with
    pub args: CallArgs,
}

impl RecordedCall {
    pub fn new(source: Option<String>, name: impl Into<String>, args: CallArgs) -> Self {
        Self {
            source,
            name: name.into(),
            args,
        }
    }
}

/// Which registrations a `clear` removes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearTarget {
    /// Remove every registration on the double
    All,
    /// Remove registrations for one operation name
    Name(String),
    /// Remove registrations for each listed name
    Names(Vec<String>),
}

impl ClearTarget {
    /// Whether a registration under `name` is selected for removal
    pub fn selects(&self, name: &str) -> bool {
        match self {
            ClearTarget::All => true,
            ClearTarget::Name(n) => n == name,
            ClearTarget::Names(ns) => ns.iter().any(|n| n == name),
        }
    }
}

impl From<&str> for ClearTarget {
    fn from(name: &str) -> Self {
        ClearTarget::Name(name.to_string())
    }
}
