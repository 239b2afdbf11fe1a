//! Hierarchical, dot-segmented jurisdictions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A scope bounding where a grant or bundle owner has power.
///
/// `"*"` covers everything. Any other jurisdiction covers itself and every
/// scope below it by whole dot segments: `system` covers `system.load` but
/// not `systemd`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Jurisdiction(String);

impl Jurisdiction {
    pub const WILDCARD: &'static str = "*";

    pub fn new(scope: impl Into<String>) -> Self {
        Self(scope.into())
    }

    /// The universal jurisdiction.
    pub fn wildcard() -> Self {
        Self(Self::WILDCARD.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.0 == Self::WILDCARD
    }

    /// Whether `scope` falls inside this jurisdiction.
    pub fn contains(&self, scope: &str) -> bool {
        if self.is_wildcard() || self.0 == scope {
            return true;
        }
        scope
            .strip_prefix(self.0.as_str())
            .is_some_and(|rest| rest.starts_with('.'))
    }

    /// Whether another jurisdiction is nested inside this one.
    pub fn encloses(&self, other: &Jurisdiction) -> bool {
        self.contains(other.as_str())
    }
}

impl fmt::Debug for Jurisdiction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Jurisdiction({})", self.0)
    }
}

impl fmt::Display for Jurisdiction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Jurisdiction {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for Jurisdiction {
    fn from(s: String) -> Self {
        Self(s)
    }
}
