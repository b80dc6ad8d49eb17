//! Call list storage
//!
//! [`CallListStore`] is the keyed, TTL-aware store fragments end up in.
//! Production deployments back it with a replicated database; the
//! [`MemoryCallListStore`] here serves single-node deployments and tests.
//!
//! [`CallListStoreProcessor`] sits between the transaction recorders and the
//! store: it queues fragments and writes them from a pool of worker tasks so
//! no signaling path ever waits on storage.

pub mod processor;

pub use processor::{CallListStoreProcessor, FragmentWriter};

use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use async_trait::async_trait;
use dashmap::DashMap;

use crate::errors::Result;
use crate::types::{CallFragment, FragmentType};

/// Durable call list storage keyed by owner identity
#[async_trait]
pub trait CallListStore: Send + Sync {
    /// Store one fragment under its owner, expiring after `fragment.ttl`
    async fn write_call_fragment(&self, fragment: &CallFragment) -> Result<()>;

    /// All live fragments for an owner, oldest call first
    async fn get_call_fragments(&self, owner_identity: &str) -> Result<Vec<CallFragment>>;

    /// Delete every fragment for an owner whose timestamp is strictly before
    /// `cutoff_timestamp`
    async fn delete_old_call_fragments(&self, owner_identity: &str, cutoff_timestamp: &str) -> Result<()>;
}

/// Fragments of one call list, ordered by (timestamp, id, type)
type CallList = BTreeMap<(String, String, FragmentType), StoredFragment>;

#[derive(Debug, Clone)]
struct StoredFragment {
    fragment: CallFragment,
    expires_at: Instant,
}

/// In-memory call list store
#[derive(Debug, Default)]
pub struct MemoryCallListStore {
    call_lists: DashMap<String, CallList>,
}

impl MemoryCallListStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of owners with at least one stored fragment
    pub fn owner_count(&self) -> usize {
        self.call_lists.iter().filter(|entry| !entry.value().is_empty()).count()
    }

    /// Drop expired fragments across every call list
    pub fn purge_expired(&self) {
        let now = Instant::now();
        for mut entry in self.call_lists.iter_mut() {
            entry.value_mut().retain(|_, stored| stored.expires_at > now);
        }
        self.call_lists.retain(|_, list| !list.is_empty());
    }
}

#[async_trait]
impl CallListStore for MemoryCallListStore {
    async fn write_call_fragment(&self, fragment: &CallFragment) -> Result<()> {
        let key = (
            fragment.timestamp.clone(),
            fragment.id.clone(),
            fragment.fragment_type,
        );
        let stored = StoredFragment {
            fragment: fragment.clone(),
            expires_at: Instant::now() + fragment.ttl.max(Duration::from_millis(1)),
        };

        self.call_lists
            .entry(fragment.owner_identity.clone())
            .or_default()
            .insert(key, stored);
        Ok(())
    }

    async fn get_call_fragments(&self, owner_identity: &str) -> Result<Vec<CallFragment>> {
        let now = Instant::now();
        Ok(self
            .call_lists
            .get(owner_identity)
            .map(|list| {
                list.values()
                    .filter(|stored| stored.expires_at > now)
                    .map(|stored| stored.fragment.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_old_call_fragments(&self, owner_identity: &str, cutoff_timestamp: &str) -> Result<()> {
        if let Some(mut list) = self.call_lists.get_mut(owner_identity) {
            list.retain(|(timestamp, _, _), _| timestamp.as_str() >= cutoff_timestamp);
        }
        Ok(())
    }
}
