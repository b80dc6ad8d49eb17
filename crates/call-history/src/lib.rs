//! # RVoIP Call History
//!
//! Call list application server: sits in the SIP signaling path and turns
//! each call's transactions into call history fragments filed under the
//! subscriber's call list.
//!
//! ## Features
//!
//! - **Transaction recording**: one recorder per INVITE or BYE transaction,
//!   producing at most one BEGIN/REJECTED fragment per call leg whatever the
//!   number of forks, and one END fragment per BYE
//! - **Privacy aware**: the answerer is left out when the response asks for
//!   `Privacy: id`
//! - **Non-blocking writes**: fragments are queued to a worker pool in front
//!   of the store, behind a latency-adaptive token bucket
//! - **Change notifications**: an HTTP POST per call list change
//!
//! ## Architecture
//!
//! - `app_server`: admission of transactions and the per-transaction recorder
//! - `identity`: caller, callee and answerer extraction
//! - `fragment`: XML fragment bodies
//! - `timestamp`: body and storage timestamps
//! - `dialog`: token tying a BYE back to its call
//! - `store`: call list storage and the write pipeline
//! - `load_monitor`: overload guard for store writes
//! - `notifier`: call list change notifications
//! - `message`: read-only views of the host's SIP messages

pub mod app_server;
pub mod config;
pub mod dialog;
pub mod errors;
pub mod fragment;
pub mod identity;
pub mod load_monitor;
pub mod message;
pub mod notifier;
pub mod stats;
pub mod store;
pub mod timestamp;
pub mod types;

// Re-export key types
pub use app_server::{AppServerTsx, CallHistoryAppServer, CallHistoryTsx, TsxHelper, TsxState};
pub use config::CallHistoryConfig;
pub use errors::{CallHistoryError, Result};
pub use store::{CallListStore, MemoryCallListStore};
pub use types::{CallDirection, CallFragment, FragmentType, PartyIdentity, TrailId};
