//! Per-transaction call recorder
//!
//! One [`CallHistoryTsx`] follows one transaction:
//!
//! ```text
//!  NEW ──on_initial_request──▶ AWAITING_RESULT ──final response──▶ DONE
//!   │                                                              ▲
//!   └──────────────on_in_dialog_request(BYE)───────────────────────┘
//! ```
//!
//! - An INVITE that names its parties is timestamped and tied to the dialog
//!   with a [`DialogToken`]; its first final response becomes a BEGIN
//!   (2xx) or REJECTED fragment.
//! - A BYE within that dialog becomes an END fragment filed under the same
//!   call, straight away.
//! - Later final responses (other forks, retransmissions) are only
//!   forwarded.
//!
//! Every message is forwarded whatever happens to the recording.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{AppServerTsx, TsxHelper};
use crate::dialog::DialogToken;
use crate::fragment::{call_record_xml, end_xml, CallOutcome, CallRecord};
use crate::identity::{extract_answerer, extract_call_parties, CallParties};
use crate::load_monitor::LoadMonitor;
use crate::message::{SipRequest, SipResponse};
use crate::stats::CallHistoryStats;
use crate::store::FragmentWriter;
use crate::timestamp::{CallTimestamp, Clock};
use crate::types::{CallDirection, CallFragment, FragmentType, PartyIdentity, TrailId};

/// Everything recorders share with the application server
#[derive(Clone)]
pub(crate) struct Recording {
    pub(crate) writer: Arc<dyn FragmentWriter>,
    pub(crate) load_monitor: Arc<LoadMonitor>,
    pub(crate) stats: Arc<CallHistoryStats>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ttl: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TsxState {
    New,
    AwaitingResult,
    Done,
}

/// Call captured from the initial request
#[derive(Debug, Clone)]
struct CallStart {
    parties: CallParties,
    start_time: CallTimestamp,
    id: String,
}

pub struct CallHistoryTsx {
    recording: Recording,
    state: TsxState,
    call: Option<CallStart>,
    answerer: Option<PartyIdentity>,
    includes_initial_request: bool,
    has_written: bool,
}

impl CallHistoryTsx {
    pub(crate) fn new(recording: Recording) -> Self {
        Self {
            recording,
            state: TsxState::New,
            call: None,
            answerer: None,
            includes_initial_request: false,
            has_written: false,
        }
    }

    pub fn state(&self) -> TsxState {
        self.state
    }

    /// Whether a final response has already been acted on
    pub fn has_written(&self) -> bool {
        self.has_written
    }

    pub fn includes_initial_request(&self) -> bool {
        self.includes_initial_request
    }

    pub fn direction(&self) -> Option<CallDirection> {
        self.call.as_ref().map(|call| call.parties.direction)
    }

    pub fn owner_identity(&self) -> Option<&str> {
        self.call.as_ref().map(|call| call.parties.owner_identity.as_str())
    }

    /// `<storage timestamp>_<id>` of the call, once started
    pub fn unique_id(&self) -> Option<String> {
        self.call
            .as_ref()
            .map(|call| format!("{}_{}", call.start_time.storage, call.id))
    }

    pub fn answerer(&self) -> Option<&PartyIdentity> {
        self.answerer.as_ref()
    }

    fn record_call_outcome(&mut self, rsp: &SipResponse, trail: TrailId) {
        let Some(call) = &self.call else {
            return;
        };

        let answer_time;
        let (fragment_type, outcome) = if rsp.status.is_success() {
            answer_time = CallTimestamp::capture(self.recording.clock.as_ref());
            self.answerer = extract_answerer(rsp);
            let outcome = CallOutcome::Answered {
                answer_time: &answer_time.display,
                answerer: self.answerer.as_ref(),
            };
            (FragmentType::Begin, outcome)
        } else {
            (FragmentType::Rejected, CallOutcome::Rejected)
        };

        let record = CallRecord {
            caller: &call.parties.caller,
            callee: &call.parties.callee,
            direction: call.parties.direction,
            start_time: &call.start_time.display,
            outcome,
        };

        let body = match call_record_xml(&record) {
            Ok(body) => body,
            Err(e) => {
                warn!(%trail, "Not recording {} fragment: {}", fragment_type, e);
                return;
            }
        };

        self.write_fragment(CallFragment {
            owner_identity: call.parties.owner_identity.clone(),
            timestamp: call.start_time.storage.clone(),
            id: call.id.clone(),
            fragment_type,
            body,
            ttl: self.recording.ttl,
            trail,
        });
    }

    fn record_call_end(&self, dialog_id: Option<String>, trail: TrailId) {
        let Some(dialog_id) = dialog_id else {
            warn!(%trail, "BYE outside a recorded dialog, not recording call end");
            return;
        };

        let token = match DialogToken::decode(&dialog_id) {
            Ok(token) => token,
            Err(e) => {
                warn!(%trail, "Not recording call end: {}", e);
                return;
            }
        };

        let end_time = CallTimestamp::capture(self.recording.clock.as_ref());
        let body = match end_xml(&end_time.display) {
            Ok(body) => body,
            Err(e) => {
                warn!(%trail, "Not recording END fragment: {}", e);
                return;
            }
        };

        self.write_fragment(CallFragment {
            owner_identity: token.owner_identity,
            timestamp: token.timestamp,
            id: token.id,
            fragment_type: FragmentType::End,
            body,
            ttl: self.recording.ttl,
            trail,
        });
    }

    /// Pass a fragment to the store unless the overload guard refuses it
    fn write_fragment(&self, fragment: CallFragment) {
        let trail = fragment.trail;
        let fragment_type = fragment.fragment_type;

        if !self.recording.load_monitor.admit_request() {
            warn!(%trail, "Store overloaded, not recording {} fragment for {}", fragment_type, fragment.owner_identity);
            self.recording.stats.record_overload();
            return;
        }

        info!(%trail, "Recording {} fragment {} for {}", fragment_type, fragment.unique_id(), fragment.owner_identity);
        if let Err(e) = self.recording.writer.write_call_list_entry(fragment) {
            warn!(%trail, "Failed to queue {} fragment: {}", fragment_type, e);
        }
    }
}

impl AppServerTsx for CallHistoryTsx {
    fn on_initial_request(&mut self, req: &SipRequest, helper: &mut dyn TsxHelper) {
        let trail = helper.trail();

        let parties = match extract_call_parties(req) {
            Ok(parties) => parties,
            Err(e) => {
                warn!(%trail, "Not recording {}: {}", req.method, e);
                helper.send_request(req);
                return;
            }
        };

        let start_time = CallTimestamp::capture(self.recording.clock.as_ref());
        let id = rand::random::<u32>().to_string();

        let token = DialogToken::new(start_time.storage.clone(), id.clone(), parties.owner_identity.clone());
        helper.add_to_dialog(token.encode());

        debug!(
            %trail,
            "{} {:?} call for {} started at {}",
            req.method,
            parties.direction,
            parties.owner_identity,
            start_time.display
        );

        self.includes_initial_request = req.method.is_call_control();
        self.call = Some(CallStart {
            parties,
            start_time,
            id,
        });

        helper.send_request(req);
        self.state = TsxState::AwaitingResult;
    }

    fn on_in_dialog_request(&mut self, req: &SipRequest, helper: &mut dyn TsxHelper) {
        let trail = helper.trail();

        if req.method.is_dialog_terminating() {
            self.record_call_end(helper.dialog_id(), trail);
            helper.send_request(req);
            self.state = TsxState::Done;
        } else {
            debug!(%trail, "Forwarding in-dialog {}", req.method);
            helper.send_request(req);
            self.state = TsxState::AwaitingResult;
        }
    }

    fn on_response(&mut self, rsp: &SipResponse, fork_id: u32, helper: &mut dyn TsxHelper) {
        let trail = helper.trail();

        // Abandoned at the initial request; stays New
        if self.state == TsxState::New {
            debug!(%trail, fork_id, "Forwarding {} for unrecorded transaction", rsp.status);
            helper.send_response(rsp);
            return;
        }

        if self.has_written || !rsp.status.is_final() {
            debug!(%trail, fork_id, "Forwarding {} without recording", rsp.status);
            helper.send_response(rsp);
            return;
        }

        self.has_written = true;
        if self.includes_initial_request {
            self.record_call_outcome(rsp, trail);
        } else {
            debug!(%trail, fork_id, "{} response to {} not recorded", rsp.status, rsp.cseq_method);
        }

        self.state = TsxState::Done;
        helper.send_response(rsp);
    }
}
