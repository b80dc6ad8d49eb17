//! Call list store processor
//!
//! Decouples fragment writes from the signaling path. Recorders hand
//! fragments over through [`FragmentWriter::write_call_list_entry`], which
//! only enqueues. A fixed pool of worker tasks drains the queue and, per
//! fragment:
//!
//! 1. writes it to the [`CallListStore`], timing the write
//! 2. reports the latency to the [`LoadMonitor`]
//! 3. on success, trims the owner's call list to the configured length
//! 4. on success, notifies the owner's call list subscribers
//!
//! A full queue refuses the fragment immediately; it is counted as a failed
//! call.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CallHistoryConfig;
use crate::errors::{CallHistoryError, Result};
use crate::load_monitor::LoadMonitor;
use crate::notifier::CallListNotifier;
use crate::stats::CallHistoryStats;
use crate::store::CallListStore;
use crate::types::CallFragment;

/// Non-blocking sink for call fragments
pub trait FragmentWriter: Send + Sync {
    /// Hand a fragment over for writing. Returns as soon as it is queued.
    fn write_call_list_entry(&self, fragment: CallFragment) -> Result<()>;
}

struct WorkerContext {
    store: Arc<dyn CallListStore>,
    load_monitor: Arc<LoadMonitor>,
    stats: Arc<CallHistoryStats>,
    notifier: Arc<dyn CallListNotifier>,
    max_call_list_length: usize,
}

/// Bounded queue plus worker pool in front of the call list store
pub struct CallListStoreProcessor {
    sender: Mutex<Option<mpsc::Sender<CallFragment>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    context: Arc<WorkerContext>,
}

impl CallListStoreProcessor {
    /// Start the worker pool. Must be called from within a tokio runtime.
    pub fn new(
        config: &CallHistoryConfig,
        store: Arc<dyn CallListStore>,
        load_monitor: Arc<LoadMonitor>,
        stats: Arc<CallHistoryStats>,
        notifier: Arc<dyn CallListNotifier>,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            CallHistoryError::ConfigError(format!("call list store processor needs a tokio runtime: {}", e))
        })?;

        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let context = Arc::new(WorkerContext {
            store,
            load_monitor,
            stats,
            notifier,
            max_call_list_length: config.max_call_list_length,
        });

        let workers = (0..config.workers.max(1))
            .map(|worker_id| runtime.spawn(run_worker(worker_id, receiver.clone(), context.clone())))
            .collect();

        info!(
            "Call list store processor started with {} workers (queue {}, max call list length {})",
            config.workers.max(1),
            config.queue_capacity.max(1),
            config.max_call_list_length
        );

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            context,
        })
    }

    /// Stop accepting fragments, let the workers drain the queue and wait
    /// for them to exit
    pub async fn shutdown(&self) {
        self.sender.lock().take();
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                warn!("Call list store worker ended abnormally: {}", e);
            }
        }
        debug!("Call list store processor stopped");
    }
}

impl FragmentWriter for CallListStoreProcessor {
    fn write_call_list_entry(&self, fragment: CallFragment) -> Result<()> {
        let sender = self.sender.lock().clone();
        let result = match sender {
            Some(sender) => sender.try_send(fragment).map_err(|e| match e {
                TrySendError::Full(_) => CallHistoryError::QueueFull,
                TrySendError::Closed(_) => CallHistoryError::ProcessorShutdown,
            }),
            None => Err(CallHistoryError::ProcessorShutdown),
        };

        if result.is_err() {
            self.context.stats.record_failed(None);
            self.context.load_monitor.request_abandoned();
        }
        result
    }
}

async fn run_worker(
    worker_id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<CallFragment>>>,
    context: Arc<WorkerContext>,
) {
    loop {
        let next = receiver.lock().await.recv().await;
        match next {
            Some(fragment) => context.process(fragment).await,
            None => break,
        }
    }
    debug!(worker_id, "Call list store worker exiting");
}

impl WorkerContext {
    async fn process(&self, fragment: CallFragment) {
        let trail = fragment.trail;
        let owner = fragment.owner_identity.as_str();

        let start = Instant::now();
        let result = self.store.write_call_fragment(&fragment).await;
        let latency = start.elapsed();
        self.load_monitor.request_complete(latency);

        if let Err(e) = result {
            warn!(%trail, "Failed to write {} fragment for {}: {}", fragment.fragment_type, owner, e);
            self.stats.record_failed(Some(latency));
            return;
        }

        debug!(
            %trail,
            "Wrote {} fragment {} for {} in {}us",
            fragment.fragment_type,
            fragment.unique_id(),
            owner,
            latency.as_micros()
        );
        self.stats.record_completed(latency);

        if self.max_call_list_length > 0 {
            if let Err(e) = self.trim_call_list(owner).await {
                warn!(%trail, "Failed to trim call list for {}: {}", owner, e);
            }
        }

        if let Err(e) = self.notifier.send_notify(owner, trail).await {
            warn!(%trail, "Call list notification for {} failed: {}", owner, e);
            self.stats.record_notify_failure();
        }
    }

    /// Keep the newest `max_call_list_length` calls. Everything started
    /// before the oldest kept call is deleted; calls sharing its start second
    /// are kept.
    async fn trim_call_list(&self, owner: &str) -> Result<()> {
        let fragments = self.store.get_call_fragments(owner).await?;

        let calls: BTreeSet<(String, String)> = fragments
            .into_iter()
            .map(|fragment| (fragment.timestamp, fragment.id))
            .collect();

        if calls.len() <= self.max_call_list_length {
            return Ok(());
        }

        let excess = calls.len() - self.max_call_list_length;
        if let Some((oldest_kept, _)) = calls.iter().nth(excess) {
            debug!("Trimming up to {} old calls from call list of {}", excess, owner);
            self.store.delete_old_call_fragments(owner, oldest_kept).await?;
        }
        Ok(())
    }
}
