//! Value types exchanged with the coordination service.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a TTL-bound lease held by the coordination service.
///
/// Rendered in lowercase hex, the way etcd tooling prints lease ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseId(i64);

impl LeaseId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl From<i64> for LeaseId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// The election record naming the current leader.
///
/// `key` and `create_revision` identify the specific campaign entry, which is
/// what a resumed election handle needs to resign on the leader's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderRecord {
    /// Candidate identity stored as the record value.
    pub value: String,
    /// Storage key of the campaign entry.
    pub key: String,
    /// Revision at which the campaign entry was created.
    pub create_revision: i64,
    /// Lease the campaign entry is attached to.
    pub lease: LeaseId,
}

impl LeaderRecord {
    pub fn new(
        value: impl Into<String>,
        key: impl Into<String>,
        create_revision: i64,
        lease: LeaseId,
    ) -> Self {
        Self {
            value: value.into(),
            key: key.into(),
            create_revision,
            lease,
        }
    }
}
