//! Common types used throughout the call-history library

use std::fmt;
use std::time::Duration;
use serde::{Deserialize, Serialize};

/// Correlation id for one transaction's log and trace output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TrailId(pub u64);

impl TrailId {
    pub fn new() -> Self {
        Self(rand::random())
    }
}

impl fmt::Display for TrailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Direction of a call from the home network's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallDirection {
    /// Terminating: the served user is the callee
    Incoming,
    /// Originating: the served user is the caller
    Outgoing,
}

impl CallDirection {
    pub fn is_outgoing(&self) -> bool {
        *self == CallDirection::Outgoing
    }
}

/// Display name and address of one call party
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyIdentity {
    /// Unescaped display name; `None` when the message carried none
    pub display_name: Option<String>,
    pub uri: String,
}

impl PartyIdentity {
    pub fn new(display_name: Option<&str>, uri: impl Into<String>) -> Self {
        Self {
            display_name: display_name.map(str::to_string),
            uri: uri.into(),
        }
    }
}

/// Kind of call fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FragmentType {
    /// Call answered
    Begin,
    /// Call failed or was rejected
    Rejected,
    /// Call ended
    End,
}

impl FragmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FragmentType::Begin => "BEGIN",
            FragmentType::Rejected => "REJECTED",
            FragmentType::End => "END",
        }
    }
}

impl fmt::Display for FragmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable piece of a call's history, as handed to the store.
///
/// A call is identified within an owner's call list by
/// [`unique_id`](CallFragment::unique_id): the storage timestamp of the call
/// start plus a random id. BEGIN/REJECTED and END fragments of the same call
/// share it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFragment {
    /// Owner of the call list this fragment is filed under
    pub owner_identity: String,
    /// Opaque, ordered storage timestamp of the call start
    pub timestamp: String,
    /// Random component of the call's unique id
    pub id: String,
    pub fragment_type: FragmentType,
    /// XML body
    pub body: String,
    pub ttl: Duration,
    pub trail: TrailId,
}

impl CallFragment {
    pub fn unique_id(&self) -> String {
        format!("{}_{}", self.timestamp, self.id)
    }
}
