use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An ordered (host, target) architecture pair naming a build configuration.
///
/// `native` specs have `host == target`. The canonical string form used in
/// URLs, storage keys, and JSON maps is `host:target`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SpecTuple {
    pub host: String,
    pub target: String,
}

impl SpecTuple {
    pub fn new(host: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            target: target.into(),
        }
    }

    pub fn native(&self) -> bool {
        self.host == self.target
    }

    /// The spec of the host atom that must exist for `self.hostDepends` to
    /// resolve: `(host, host)`.
    pub fn host_spec(&self) -> SpecTuple {
        SpecTuple::new(self.host.clone(), self.host.clone())
    }
}

impl fmt::Display for SpecTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.target)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid spec tuple {0:?}, expected \"host:target\"")]
pub struct ParseSpecTupleError(String);

impl FromStr for SpecTuple {
    type Err = ParseSpecTupleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, target) = s
            .split_once(':')
            .ok_or_else(|| ParseSpecTupleError(s.to_string()))?;
        if host.is_empty() || target.is_empty() {
            return Err(ParseSpecTupleError(s.to_string()));
        }
        Ok(SpecTuple::new(host, target))
    }
}
