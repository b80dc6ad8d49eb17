//! Call timestamps
//!
//! Each logical event (call start, call end) captures the current instant
//! exactly once and renders it twice: a human-readable form embedded in the
//! fragment body and an ordered key the store sorts and expires records by.

use std::fmt;
use chrono::{DateTime, Local, TimeZone};

/// Pattern of timestamps embedded in fragment bodies
pub const XML_PATTERN: &str = "%Y-%m-%dT%H:%M:%S";

/// Pattern of timestamps used as store ordering keys
pub const TIMESTAMP_PATTERN: &str = "%Y%m%d%H%M%S";

/// Source of the current instant
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Wall clock in the local time zone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock frozen at one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Local>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        self.0
    }
}

/// Render an instant with a strftime-style pattern
pub fn create_formatted_timestamp<Tz>(timestamp: &DateTime<Tz>, pattern: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    timestamp.format(pattern).to_string()
}

/// Both renderings of one captured instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallTimestamp {
    /// Body form, [`XML_PATTERN`]
    pub display: String,
    /// Store key form, [`TIMESTAMP_PATTERN`]
    pub storage: String,
}

impl CallTimestamp {
    pub fn capture(clock: &dyn Clock) -> Self {
        Self::from_instant(&clock.now())
    }

    pub fn from_instant<Tz>(instant: &DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        Self {
            display: create_formatted_timestamp(instant, XML_PATTERN),
            storage: create_formatted_timestamp(instant, TIMESTAMP_PATTERN),
        }
    }
}
