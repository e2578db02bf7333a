use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SmartwayError;

/// Identifier of one competing approach (e.g. `A`, `B`, `C`, `D`).
///
/// Lanes are fixed at configuration time; the identifier is what the
/// physical endpoints use on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LaneId(String);

impl LaneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LaneId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// The ordered set of configured lanes.
///
/// Order matters: it breaks scoring ties, defines "index 0" for the learned
/// strategy, and drives the forced-rotation pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LaneSet(Vec<LaneId>);

impl LaneSet {
    /// Build a lane set, rejecting empty input and duplicates.
    pub fn new(lanes: Vec<LaneId>) -> Result<Self, SmartwayError> {
        if lanes.is_empty() {
            return Err(SmartwayError::Config("at least one lane must be configured".into()));
        }
        for (i, lane) in lanes.iter().enumerate() {
            if lanes[..i].contains(lane) {
                return Err(SmartwayError::Config(format!("duplicate lane '{lane}'")));
            }
        }
        Ok(Self(lanes))
    }

    /// Convenience constructor from string identifiers.
    pub fn from_ids<I, S>(ids: I) -> Result<Self, SmartwayError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ids.into_iter().map(LaneId::new).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LaneId> {
        self.0.iter()
    }

    pub fn contains(&self, lane: &LaneId) -> bool {
        self.0.contains(lane)
    }

    /// Position of a lane in configuration order.
    pub fn index_of(&self, lane: &LaneId) -> Option<usize> {
        self.0.iter().position(|l| l == lane)
    }

    pub fn get(&self, index: usize) -> Option<&LaneId> {
        self.0.get(index)
    }

    /// First configured lane. Lane sets are never empty.
    pub fn first(&self) -> &LaneId {
        &self.0[0]
    }

    /// Look up a lane by its wire identifier.
    pub fn resolve(&self, id: &str) -> Result<&LaneId, SmartwayError> {
        self.0
            .iter()
            .find(|l| l.as_str() == id)
            .ok_or_else(|| SmartwayError::UnknownLane(id.to_string()))
    }
}

impl<'a> IntoIterator for &'a LaneSet {
    type Item = &'a LaneId;
    type IntoIter = std::slice::Iter<'a, LaneId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
