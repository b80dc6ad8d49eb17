//! Host-facing application server surface
//!
//! The host signaling layer asks [`CallHistoryAppServer::get_app_tsx`]
//! whether to record each new transaction. When it gets a recorder back it
//! drives it through the [`AppServerTsx`] events and lends it a
//! [`TsxHelper`] for forwarding messages and dialog bookkeeping.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rvoip_call_history::app_server::CallHistoryAppServer;
//! use rvoip_call_history::config::CallHistoryConfig;
//! use rvoip_call_history::message::{Method, SipRequest};
//! use rvoip_call_history::store::MemoryCallListStore;
//!
//! # async fn example() -> rvoip_call_history::errors::Result<()> {
//! let config = CallHistoryConfig::new("homedomain").with_max_call_list_length(100);
//! let app_server = CallHistoryAppServer::new(config, Arc::new(MemoryCallListStore::new()))?;
//!
//! let options = SipRequest::new(Method::Options, "sip:6505551234@homedomain");
//! assert!(app_server.get_app_tsx(&options, None).is_none());
//! # Ok(())
//! # }
//! ```

mod tsx;

pub use tsx::{CallHistoryTsx, TsxState};

use std::sync::Arc;
use tracing::{debug, info};

use crate::config::CallHistoryConfig;
use crate::errors::Result;
use crate::load_monitor::LoadMonitor;
use crate::message::{Method, SipRequest, SipResponse};
use crate::notifier::{CallListNotifier, HttpNotifier};
use crate::stats::{CallHistoryStats, StatsSnapshot};
use crate::store::{CallListStore, CallListStoreProcessor, FragmentWriter};
use crate::timestamp::{Clock, SystemClock};
use crate::types::TrailId;

use tsx::Recording;

/// Services the host offers a transaction while it is being recorded
pub trait TsxHelper {
    /// Forward a request on its way
    fn send_request(&mut self, req: &SipRequest);

    /// Forward a response back upstream
    fn send_response(&mut self, rsp: &SipResponse);

    /// Stay on the dialog this transaction creates, leaving `dialog_id` for
    /// later in-dialog transactions
    fn add_to_dialog(&mut self, dialog_id: String);

    /// Token left by [`add_to_dialog`](TsxHelper::add_to_dialog) on the
    /// dialog this transaction belongs to
    fn dialog_id(&self) -> Option<String>;

    fn trail(&self) -> TrailId;
}

/// The events a transaction delivers to its recorder
pub trait AppServerTsx: Send {
    /// First request of a transaction outside any dialog
    fn on_initial_request(&mut self, req: &SipRequest, helper: &mut dyn TsxHelper);

    /// Request within a dialog the service attached to
    fn on_in_dialog_request(&mut self, req: &SipRequest, helper: &mut dyn TsxHelper);

    /// Response from one fork of the transaction
    fn on_response(&mut self, rsp: &SipResponse, fork_id: u32, helper: &mut dyn TsxHelper);
}

/// Decides which transactions get recorded and owns everything recorders
/// share
pub struct CallHistoryAppServer {
    config: CallHistoryConfig,
    recording: Recording,
    processor: Option<Arc<CallListStoreProcessor>>,
}

impl CallHistoryAppServer {
    /// Build the service writing to `store`. Must be called from within a
    /// tokio runtime.
    pub fn new(config: CallHistoryConfig, store: Arc<dyn CallListStore>) -> Result<Self> {
        let notifier = Arc::new(HttpNotifier::from_config(&config)?);
        Self::with_notifier(config, store, notifier)
    }

    /// Build the service with a custom change notifier
    pub fn with_notifier(
        config: CallHistoryConfig,
        store: Arc<dyn CallListStore>,
        notifier: Arc<dyn CallListNotifier>,
    ) -> Result<Self> {
        config.validate()?;

        let load_monitor = Arc::new(LoadMonitor::new(config.load_monitor.clone()));
        let stats = Arc::new(CallHistoryStats::new());
        let processor = Arc::new(CallListStoreProcessor::new(
            &config,
            store,
            load_monitor.clone(),
            stats.clone(),
            notifier,
        )?);

        info!(
            "Call history service {} ready for {}",
            config.service_name, config.home_domain
        );

        let recording = Recording {
            writer: processor.clone(),
            load_monitor,
            stats,
            clock: Arc::new(SystemClock),
            ttl: config.call_list_ttl,
        };

        Ok(Self {
            config,
            recording,
            processor: Some(processor),
        })
    }

    /// Build the service around an existing fragment writer, without a
    /// store processor of its own
    pub fn with_writer(config: CallHistoryConfig, writer: Arc<dyn FragmentWriter>) -> Result<Self> {
        config.validate()?;

        let recording = Recording {
            writer,
            load_monitor: Arc::new(LoadMonitor::new(config.load_monitor.clone())),
            stats: Arc::new(CallHistoryStats::new()),
            clock: Arc::new(SystemClock),
            ttl: config.call_list_ttl,
        };

        Ok(Self {
            config,
            recording,
            processor: None,
        })
    }

    /// Replace the clock call timestamps are taken from
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.recording.clock = clock;
        self
    }

    /// Return a recorder for the transaction `req` starts, or `None` if it
    /// is not worth recording. `dialog_id` is the token this service left on
    /// the dialog `req` belongs to, if any.
    pub fn get_app_tsx(&self, req: &SipRequest, dialog_id: Option<&str>) -> Option<CallHistoryTsx> {
        let recordable = dialog_id.is_some() || matches!(req.method, Method::Invite | Method::Bye);
        if !recordable {
            debug!("Not recording {} transaction", req.method);
            return None;
        }

        debug!("Recording {} transaction", req.method);
        Some(CallHistoryTsx::new(self.recording.clone()))
    }

    pub fn service_name(&self) -> &str {
        &self.config.service_name
    }

    pub fn config(&self) -> &CallHistoryConfig {
        &self.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.recording.stats.snapshot()
    }

    pub fn load_monitor(&self) -> &Arc<LoadMonitor> {
        &self.recording.load_monitor
    }

    /// Stop the store processor after it has written everything queued
    pub async fn shutdown(&self) {
        if let Some(processor) = &self.processor {
            processor.shutdown().await;
        }
    }
}
