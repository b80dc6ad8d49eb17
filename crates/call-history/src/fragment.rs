//! Call fragment body generation
//!
//! Fragment bodies are small XML documents without a root element. A BEGIN
//! fragment for an answered outgoing call looks like:
//!
//! ```text
//! <to>
//! 	<URI>sip:6505551234@homedomain</URI>
//! 	<name>Bob</name>
//! </to>
//! <from>
//! 	<URI>sip:6505550000@homedomain</URI>
//! 	<name>Alice</name>
//! </from>
//! <outgoing>1</outgoing>
//! <start-time>2024-03-01T12:34:56</start-time>
//! <answered>1</answered>
//! <answer-time>2024-03-01T12:35:02</answer-time>
//! <answerer>
//! 	<URI>sip:6505551235@homedomain</URI>
//! 	<name>Bob&apos;s cell</name>
//! </answerer>
//! ```
//!
//! followed by a blank line. Element order is fixed. Optional elements
//! (`name`, `answer-time`, `answerer`) are left out entirely when absent.

use std::io::Cursor;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::errors::{CallHistoryError, Result};
use crate::types::{CallDirection, PartyIdentity};

mod tag {
    pub const TO: &str = "to";
    pub const FROM: &str = "from";
    pub const URI: &str = "URI";
    pub const NAME: &str = "name";
    pub const OUTGOING: &str = "outgoing";
    pub const START_TIME: &str = "start-time";
    pub const ANSWERED: &str = "answered";
    pub const ANSWER_TIME: &str = "answer-time";
    pub const ANSWERER: &str = "answerer";
    pub const END_TIME: &str = "end-time";
}

const BODY_TERMINATOR: &str = "\n\n";

/// How a call attempt concluded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome<'a> {
    Answered {
        answer_time: &'a str,
        answerer: Option<&'a PartyIdentity>,
    },
    Rejected,
}

/// Everything that goes into a BEGIN or REJECTED body
#[derive(Debug, Clone)]
pub struct CallRecord<'a> {
    pub caller: &'a PartyIdentity,
    pub callee: &'a PartyIdentity,
    pub direction: CallDirection,
    pub start_time: &'a str,
    pub outcome: CallOutcome<'a>,
}

/// Body for a BEGIN (answered) or REJECTED fragment
pub fn call_record_xml(record: &CallRecord<'_>) -> Result<String> {
    let mut xml = FragmentXml::new();

    xml.party(tag::TO, record.callee)?;
    xml.party(tag::FROM, record.caller)?;
    xml.text_element(tag::OUTGOING, flag(record.direction.is_outgoing()))?;
    xml.text_element(tag::START_TIME, record.start_time)?;

    match &record.outcome {
        CallOutcome::Answered { answer_time, answerer } => {
            xml.text_element(tag::ANSWERED, flag(true))?;
            xml.text_element(tag::ANSWER_TIME, answer_time)?;
            if let Some(answerer) = answerer {
                xml.party(tag::ANSWERER, answerer)?;
            }
        }
        CallOutcome::Rejected => {
            xml.text_element(tag::ANSWERED, flag(false))?;
        }
    }

    xml.finish()
}

/// Body for an END fragment
pub fn end_xml(end_time: &str) -> Result<String> {
    let mut xml = FragmentXml::new();
    xml.text_element(tag::END_TIME, end_time)?;
    xml.finish()
}

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

/// Tab-indented writer for root-less fragment bodies
struct FragmentXml {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl FragmentXml {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Cursor::new(Vec::new()), b'\t', 1),
        }
    }

    fn write(&mut self, event: Event<'_>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| CallHistoryError::XmlError(e.to_string()))
    }

    /// `<name>text</name>`, with the text escaped
    fn text_element(&mut self, name: &str, text: &str) -> Result<()> {
        self.write(Event::Start(BytesStart::new(name)))?;
        self.write(Event::Text(BytesText::new(text)))?;
        self.write(Event::End(BytesEnd::new(name)))
    }

    /// URI then optional display name, wrapped in `name`
    fn party(&mut self, name: &str, party: &PartyIdentity) -> Result<()> {
        self.write(Event::Start(BytesStart::new(name)))?;
        self.text_element(tag::URI, &party.uri)?;
        if let Some(display_name) = &party.display_name {
            self.text_element(tag::NAME, display_name)?;
        }
        self.write(Event::End(BytesEnd::new(name)))
    }

    fn finish(self) -> Result<String> {
        let mut xml = String::from_utf8(self.writer.into_inner().into_inner())
            .map_err(|e| CallHistoryError::XmlError(e.to_string()))?;
        xml.push_str(BODY_TERMINATOR);
        Ok(xml)
    }
}
