//! Call party extraction
//!
//! Pulls the caller, callee and answerer out of a transaction's identity
//! bearing headers.
//!
//! ## Direction
//!
//! A request is *outgoing* when it carries a `P-Served-User` header with
//! `sescase=orig`, otherwise *incoming*:
//!
//! | Direction | Caller                        | Callee       | Owner  |
//! |-----------|-------------------------------|--------------|--------|
//! | Outgoing  | first `P-Asserted-Identity`   | `To`         | caller |
//! | Incoming  | `From`                        | Request-URI  | callee |
//!
//! An outgoing request without `P-Asserted-Identity` cannot be attributed
//! to a caller and is not recorded.
//!
//! ## Privacy
//!
//! The answerer is read from the final response's `P-Asserted-Identity`
//! unless the response carries `Privacy: id`. Caller and callee always come
//! from the request and are never suppressed.
//!
//! Display names are returned unescaped; escaping for XML happens when the
//! fragment body is written.

use tracing::{debug, warn};

use crate::errors::{CallHistoryError, Result};
use crate::message::{headers, HeaderAccess, NameAddr, SipRequest, SipResponse};
use crate::types::{CallDirection, PartyIdentity};

const SESCASE: &str = "sescase";
const SESCASE_ORIG: &str = "orig";
const PRIVACY_ID: &str = "id";

/// Identity data captured from a dialog-initiating request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallParties {
    pub direction: CallDirection,
    pub caller: PartyIdentity,
    pub callee: PartyIdentity,
    /// Address of the call-list owner
    pub owner_identity: String,
}

impl From<NameAddr> for PartyIdentity {
    fn from(addr: NameAddr) -> Self {
        PartyIdentity {
            display_name: addr.display_name,
            uri: addr.uri,
        }
    }
}

/// Work out the call direction from the served-user context
pub fn call_direction(req: &SipRequest) -> CallDirection {
    let served_user = match req.name_addr(headers::P_SERVED_USER) {
        Ok(Some(served_user)) => served_user,
        Ok(None) => return CallDirection::Incoming,
        Err(e) => {
            debug!("Ignoring unparseable P-Served-User: {}", e);
            return CallDirection::Incoming;
        }
    };

    match served_user.param(SESCASE) {
        Some(sescase) if sescase.eq_ignore_ascii_case(SESCASE_ORIG) => CallDirection::Outgoing,
        _ => CallDirection::Incoming,
    }
}

/// Extract direction, caller, callee and owner from an initial request
pub fn extract_call_parties(req: &SipRequest) -> Result<CallParties> {
    let direction = call_direction(req);

    let (caller, callee) = match direction {
        CallDirection::Outgoing => {
            let callee = req
                .name_addr(headers::TO)?
                .ok_or(CallHistoryError::MissingHeader(headers::TO))?;

            let caller = match req.name_addr(headers::P_ASSERTED_IDENTITY)? {
                Some(asserted) => asserted,
                None => {
                    warn!("{} request missing P-Asserted-Identity", req.method);
                    return Err(CallHistoryError::MissingHeader(headers::P_ASSERTED_IDENTITY));
                }
            };

            (PartyIdentity::from(caller), PartyIdentity::from(callee))
        }
        CallDirection::Incoming => {
            let caller = req
                .name_addr(headers::FROM)?
                .ok_or(CallHistoryError::MissingHeader(headers::FROM))?;

            if req.uri.trim().is_empty() {
                return Err(CallHistoryError::InvalidHeader {
                    header: "Request-URI",
                    value: req.uri.clone(),
                });
            }

            // The Request-URI carries no display name
            (PartyIdentity::from(caller), PartyIdentity::new(None, req.uri.trim()))
        }
    };

    let owner_identity = match direction {
        CallDirection::Outgoing => caller.uri.clone(),
        CallDirection::Incoming => callee.uri.clone(),
    };

    Ok(CallParties {
        direction,
        caller,
        callee,
        owner_identity,
    })
}

/// Whether the message asks for its identity to be withheld
pub fn privacy_requested<M: HeaderAccess>(msg: &M) -> bool {
    msg.headers_named(headers::PRIVACY).any(|header| {
        header
            .value
            .split(';')
            .any(|token| token.trim().eq_ignore_ascii_case(PRIVACY_ID))
    })
}

/// Answering party from a final response, unless withheld or absent
pub fn extract_answerer(rsp: &SipResponse) -> Option<PartyIdentity> {
    if privacy_requested(rsp) {
        debug!("Answerer identity withheld by Privacy header");
        return None;
    }

    match rsp.name_addr(headers::P_ASSERTED_IDENTITY) {
        Ok(answerer) => answerer.map(PartyIdentity::from),
        Err(e) => {
            debug!("Ignoring unparseable answerer identity: {}", e);
            None
        }
    }
}
