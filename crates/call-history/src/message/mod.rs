//! # SIP Message Views
//!
//! Read-only views of the SIP messages the host signaling layer hands to the
//! call-history application server. The host owns parsing, routing and
//! transport; this module only exposes what the recorder needs to read:
//!
//! - the request method and Request-URI
//! - the response status code
//! - an ordered list of headers queried by (case-insensitive) name
//!
//! Identity-bearing headers are interpreted through [`NameAddr`].
//!
//! ## Examples
//!
//! ```rust
//! use rvoip_call_history::message::{HeaderAccess, Method, SipRequest, headers};
//!
//! let request = SipRequest::new(Method::Invite, "sip:6505551234@homedomain")
//!     .with_header("From", "Alice <sip:6505551000@homedomain>;tag=1234")
//!     .with_header("To", "Bob <sip:6505551234@homedomain>");
//!
//! let from = request.name_addr(headers::FROM).unwrap().unwrap();
//! assert_eq!(from.display_name.as_deref(), Some("Alice"));
//! assert_eq!(from.uri, "sip:6505551000@homedomain");
//! ```

mod name_addr;

pub use name_addr::NameAddr;

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::errors::{CallHistoryError, Result};

/// Header names the call-history service reads
pub mod headers {
    pub const FROM: &str = "From";
    pub const TO: &str = "To";
    pub const P_ASSERTED_IDENTITY: &str = "P-Asserted-Identity";
    pub const P_SERVED_USER: &str = "P-Served-User";
    pub const PRIVACY: &str = "Privacy";
}

/// SIP request methods (RFC 3261 and extensions)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Invite,
    Ack,
    Bye,
    Cancel,
    Options,
    Register,
    Update,
    Info,
    Prack,
    Subscribe,
    Notify,
    Refer,
    Message,
    Other(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Invite => "INVITE",
            Method::Ack => "ACK",
            Method::Bye => "BYE",
            Method::Cancel => "CANCEL",
            Method::Options => "OPTIONS",
            Method::Register => "REGISTER",
            Method::Update => "UPDATE",
            Method::Info => "INFO",
            Method::Prack => "PRACK",
            Method::Subscribe => "SUBSCRIBE",
            Method::Notify => "NOTIFY",
            Method::Refer => "REFER",
            Method::Message => "MESSAGE",
            Method::Other(name) => name,
        }
    }

    /// Whether this method initiates a call dialog
    pub fn is_call_control(&self) -> bool {
        *self == Method::Invite
    }

    /// Whether this method terminates a dialog
    pub fn is_dialog_terminating(&self) -> bool {
        *self == Method::Bye
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = CallHistoryError;

    // Method names are case-sensitive (RFC 3261 section 7.1)
    fn from_str(s: &str) -> Result<Self> {
        let method = match s {
            "INVITE" => Method::Invite,
            "ACK" => Method::Ack,
            "BYE" => Method::Bye,
            "CANCEL" => Method::Cancel,
            "OPTIONS" => Method::Options,
            "REGISTER" => Method::Register,
            "UPDATE" => Method::Update,
            "INFO" => Method::Info,
            "PRACK" => Method::Prack,
            "SUBSCRIBE" => Method::Subscribe,
            "NOTIFY" => Method::Notify,
            "REFER" => Method::Refer,
            "MESSAGE" => Method::Message,
            "" => {
                return Err(CallHistoryError::InvalidHeader {
                    header: "request-line",
                    value: s.to_string(),
                })
            }
            other => Method::Other(other.to_string()),
        };
        Ok(method)
    }
}

/// SIP response status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const TRYING: StatusCode = StatusCode(100);
    pub const RINGING: StatusCode = StatusCode(180);
    pub const OK: StatusCode = StatusCode(200);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const REQUEST_TIMEOUT: StatusCode = StatusCode(408);
    pub const BUSY_HERE: StatusCode = StatusCode(486);

    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// 1xx
    pub fn is_provisional(&self) -> bool {
        self.0 < 200
    }

    pub fn is_final(&self) -> bool {
        !self.is_provisional()
    }

    /// 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.0)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single header as received, name and raw value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Case-insensitive name match, also accepting the compact form
    pub fn is(&self, name: &str) -> bool {
        if self.name.eq_ignore_ascii_case(name) {
            return true;
        }
        match compact_form(name) {
            Some(compact) => self.name.eq_ignore_ascii_case(compact),
            None => false,
        }
    }
}

fn compact_form(name: &str) -> Option<&'static str> {
    if name.eq_ignore_ascii_case(headers::FROM) {
        Some("f")
    } else if name.eq_ignore_ascii_case(headers::TO) {
        Some("t")
    } else {
        None
    }
}

/// Header lookup shared by requests and responses
pub trait HeaderAccess {
    /// All headers in the order they appear in the message
    fn headers(&self) -> &[Header];

    /// First header with the given name
    fn header(&self, name: &str) -> Option<&Header> {
        self.headers().iter().find(|h| h.is(name))
    }

    /// Every header with the given name, in message order
    fn headers_named<'a>(&'a self, name: &'a str) -> Box<dyn Iterator<Item = &'a Header> + 'a> {
        Box::new(self.headers().iter().filter(move |h| h.is(name)))
    }

    fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    /// Parse the first header with the given name as a name-addr.
    ///
    /// `Ok(None)` when the header is absent, `Err` when it is present but
    /// cannot be parsed.
    fn name_addr(&self, name: &'static str) -> Result<Option<NameAddr>> {
        match self.header(name) {
            Some(header) => NameAddr::parse(&header.value)
                .map(Some)
                .map_err(|_| CallHistoryError::InvalidHeader {
                    header: name,
                    value: header.value.clone(),
                }),
            None => Ok(None),
        }
    }
}

/// A SIP request as seen by the application server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SipRequest {
    pub method: Method,
    /// Request-URI
    pub uri: String,
    pub headers: Vec<Header>,
}

impl SipRequest {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }
}

impl HeaderAccess for SipRequest {
    fn headers(&self) -> &[Header] {
        &self.headers
    }
}

/// A SIP response as seen by the application server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SipResponse {
    pub status: StatusCode,
    pub reason: String,
    /// Method from the CSeq header
    pub cseq_method: Method,
    pub headers: Vec<Header>,
}

impl SipResponse {
    pub fn new(status: StatusCode, reason: impl Into<String>, cseq_method: Method) -> Self {
        Self {
            status,
            reason: reason.into(),
            cseq_method,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }
}

impl HeaderAccess for SipResponse {
    fn headers(&self) -> &[Header] {
        &self.headers
    }
}
