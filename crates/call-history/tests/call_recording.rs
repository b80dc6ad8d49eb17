//! Call recording scenarios driven through the application server

use std::sync::Arc;
use chrono::{Local, TimeZone};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use rvoip_call_history::message::{headers, Method, SipRequest, SipResponse, StatusCode};
use rvoip_call_history::store::FragmentWriter;
use rvoip_call_history::timestamp::FixedClock;
use rvoip_call_history::{
    AppServerTsx, CallFragment, CallHistoryAppServer, CallHistoryConfig, FragmentType, Result,
    TrailId, TsxHelper, TsxState,
};

const T: &str = "2024-03-01T12:34:56";
const DIALOG_TOKEN: &str = "123_123_c2lwOjY1MDU1NTEyMzRAaG9tZWRvbWFpbg==";

#[derive(Default)]
struct CapturingWriter {
    fragments: Mutex<Vec<CallFragment>>,
}

impl CapturingWriter {
    fn fragments(&self) -> Vec<CallFragment> {
        self.fragments.lock().clone()
    }
}

impl FragmentWriter for CapturingWriter {
    fn write_call_list_entry(&self, fragment: CallFragment) -> Result<()> {
        self.fragments.lock().push(fragment);
        Ok(())
    }
}

/// Host side of one transaction
#[derive(Default)]
struct TestHelper {
    forwarded_requests: Vec<SipRequest>,
    forwarded_responses: Vec<SipResponse>,
    added_dialog_id: Option<String>,
    dialog_id: Option<String>,
}

impl TestHelper {
    fn in_dialog(dialog_id: &str) -> Self {
        Self {
            dialog_id: Some(dialog_id.to_string()),
            ..Default::default()
        }
    }
}

impl TsxHelper for TestHelper {
    fn send_request(&mut self, req: &SipRequest) {
        self.forwarded_requests.push(req.clone());
    }

    fn send_response(&mut self, rsp: &SipResponse) {
        self.forwarded_responses.push(rsp.clone());
    }

    fn add_to_dialog(&mut self, dialog_id: String) {
        self.added_dialog_id = Some(dialog_id);
    }

    fn dialog_id(&self) -> Option<String> {
        self.dialog_id.clone()
    }

    fn trail(&self) -> TrailId {
        TrailId(0x1234)
    }
}

fn app_server() -> (CallHistoryAppServer, Arc<CapturingWriter>) {
    let writer = Arc::new(CapturingWriter::default());
    let clock = FixedClock(Local.with_ymd_and_hms(2024, 3, 1, 12, 34, 56).unwrap());
    let app_server = CallHistoryAppServer::with_writer(CallHistoryConfig::new("homedomain"), writer.clone())
        .unwrap()
        .with_clock(Arc::new(clock));
    (app_server, writer)
}

fn incoming_invite() -> SipRequest {
    SipRequest::new(Method::Invite, "sip:6505551234@homedomain")
        .with_header(headers::FROM, "\"Alice\" <sip:6505551000@homedomain>;tag=10.0.0.1-1")
        .with_header(headers::TO, "<sip:6505551234@homedomain>")
}

fn outgoing_invite() -> SipRequest {
    SipRequest::new(Method::Invite, "sip:6505551234@homedomain")
        .with_header(headers::FROM, "<sip:6505550000@homedomain>;tag=10.0.0.1-2")
        .with_header(headers::TO, "<sip:6505551234@homedomain>")
        .with_header(headers::P_ASSERTED_IDENTITY, "\"Alice\" <sip:6505550000@homedomain>")
        .with_header(headers::P_SERVED_USER, "<sip:6505550000@homedomain>;sescase=orig;regstate=reg")
}

fn ok(method: Method) -> SipResponse {
    SipResponse::new(StatusCode::OK, "OK", method)
}

fn answered_by_bobs_cell() -> SipResponse {
    ok(Method::Invite).with_header(headers::P_ASSERTED_IDENTITY, "\"Bob's cell\" <sip:6505551235@homedomain>")
}

const OUTGOING_PREFIX: &str = "<to>\n\t<URI>sip:6505551234@homedomain</URI>\n</to>\n\
     <from>\n\t<URI>sip:6505550000@homedomain</URI>\n\t<name>Alice</name>\n</from>\n\
     <outgoing>1</outgoing>\n";

#[test]
fn test_incoming_call_answered() {
    let (app_server, writer) = app_server();
    let req = incoming_invite();
    let mut tsx = app_server.get_app_tsx(&req, None).unwrap();
    let mut helper = TestHelper::default();

    tsx.on_initial_request(&req, &mut helper);
    tsx.on_response(&ok(Method::Invite), 0, &mut helper);

    let fragments = writer.fragments();
    assert_eq!(fragments.len(), 1);
    assert_eq!(fragments[0].fragment_type, FragmentType::Begin);
    assert_eq!(fragments[0].owner_identity, "sip:6505551234@homedomain");
    assert_eq!(fragments[0].timestamp, "20240301123456");
    assert_eq!(
        fragments[0].body,
        format!(
            "<to>\n\t<URI>sip:6505551234@homedomain</URI>\n</to>\n\
             <from>\n\t<URI>sip:6505551000@homedomain</URI>\n\t<name>Alice</name>\n</from>\n\
             <outgoing>0</outgoing>\n<start-time>{T}</start-time>\n\
             <answered>1</answered>\n<answer-time>{T}</answer-time>\n\n"
        )
    );
    assert_eq!(helper.forwarded_requests, vec![req]);
    assert_eq!(helper.forwarded_responses.len(), 1);
}

#[test]
fn test_caller_name_with_quoted_pairs() {
    let (app_server, writer) = app_server();
    let req = SipRequest::new(Method::Invite, "sip:6505551234@homedomain")
        .with_header(headers::FROM, r#""Bob \"B\" Smith" <sip:6505551000@homedomain>;tag=3"#)
        .with_header(headers::TO, "<sip:6505551234@homedomain>");
    let mut tsx = app_server.get_app_tsx(&req, None).unwrap();
    let mut helper = TestHelper::default();

    tsx.on_initial_request(&req, &mut helper);
    tsx.on_response(&ok(Method::Invite), 0, &mut helper);

    let fragments = writer.fragments();
    assert_eq!(fragments.len(), 1);
    assert!(fragments[0]
        .body
        .contains("<from>\n\t<URI>sip:6505551000@homedomain</URI>\n\t<name>Bob &quot;B&quot; Smith</name>\n</from>"));
}

#[test]
fn test_outgoing_call_answered_with_answerer() {
    let (app_server, writer) = app_server();
    let req = outgoing_invite();
    let mut tsx = app_server.get_app_tsx(&req, None).unwrap();
    let mut helper = TestHelper::default();

    tsx.on_initial_request(&req, &mut helper);
    tsx.on_response(&answered_by_bobs_cell(), 0, &mut helper);

    let fragments = writer.fragments();
    assert_eq!(fragments.len(), 1);
    assert_eq!(fragments[0].owner_identity, "sip:6505550000@homedomain");
    assert_eq!(
        fragments[0].body,
        format!(
            "{OUTGOING_PREFIX}<start-time>{T}</start-time>\n\
             <answered>1</answered>\n<answer-time>{T}</answer-time>\n\
             <answerer>\n\t<URI>sip:6505551235@homedomain</URI>\n\t<name>Bob&apos;s cell</name>\n</answerer>\n\n"
        )
    );
    assert_eq!(tsx.answerer().map(|a| a.uri.as_str()), Some("sip:6505551235@homedomain"));
}

#[test]
fn test_privacy_withholds_answerer() {
    let (app_server, writer) = app_server();
    let req = outgoing_invite();
    let mut tsx = app_server.get_app_tsx(&req, None).unwrap();
    let mut helper = TestHelper::default();

    tsx.on_initial_request(&req, &mut helper);
    tsx.on_response(&answered_by_bobs_cell().with_header(headers::PRIVACY, "id"), 0, &mut helper);

    let fragments = writer.fragments();
    assert_eq!(fragments.len(), 1);
    assert_eq!(
        fragments[0].body,
        format!(
            "{OUTGOING_PREFIX}<start-time>{T}</start-time>\n\
             <answered>1</answered>\n<answer-time>{T}</answer-time>\n\n"
        )
    );
    assert!(tsx.answerer().is_none());
}

#[test]
fn test_outgoing_call_without_asserted_identity_is_not_recorded() {
    let (app_server, writer) = app_server();
    let req = SipRequest::new(Method::Invite, "sip:6505551234@homedomain")
        .with_header(headers::FROM, "<sip:6505550000@homedomain>;tag=1")
        .with_header(headers::TO, "<sip:6505551234@homedomain>")
        .with_header(headers::P_SERVED_USER, "<sip:6505550000@homedomain>;sescase=orig");
    let mut tsx = app_server.get_app_tsx(&req, None).unwrap();
    let mut helper = TestHelper::default();

    tsx.on_initial_request(&req, &mut helper);
    assert_eq!(tsx.state(), TsxState::New);
    assert!(helper.added_dialog_id.is_none());

    tsx.on_response(&ok(Method::Invite), 0, &mut helper);

    assert_eq!(tsx.state(), TsxState::New);
    assert!(writer.fragments().is_empty());
    assert_eq!(helper.forwarded_requests, vec![req]);
    assert_eq!(helper.forwarded_responses.len(), 1);
}

#[test]
fn test_only_first_final_response_is_recorded() {
    let (app_server, writer) = app_server();
    let req = incoming_invite();
    let mut tsx = app_server.get_app_tsx(&req, None).unwrap();
    let mut helper = TestHelper::default();

    tsx.on_initial_request(&req, &mut helper);
    tsx.on_response(&SipResponse::new(StatusCode::RINGING, "Ringing", Method::Invite), 1, &mut helper);
    tsx.on_response(&ok(Method::Invite), 1, &mut helper);
    tsx.on_response(&ok(Method::Invite), 2, &mut helper);
    tsx.on_response(&SipResponse::new(StatusCode::BUSY_HERE, "Busy Here", Method::Invite), 3, &mut helper);

    let fragments = writer.fragments();
    assert_eq!(fragments.len(), 1);
    assert_eq!(fragments[0].fragment_type, FragmentType::Begin);
    assert_eq!(helper.forwarded_responses.len(), 4);
}

#[test]
fn test_invite_then_bye() {
    let (app_server, writer) = app_server();

    let invite = incoming_invite();
    let mut invite_tsx = app_server.get_app_tsx(&invite, None).unwrap();
    let mut invite_helper = TestHelper::default();
    invite_tsx.on_initial_request(&invite, &mut invite_helper);
    invite_tsx.on_response(&ok(Method::Invite), 0, &mut invite_helper);

    let dialog_id = invite_helper.added_dialog_id.clone().unwrap();

    let bye = SipRequest::new(Method::Bye, "sip:6505551000@10.0.0.1");
    let mut bye_tsx = app_server.get_app_tsx(&bye, Some(&dialog_id)).unwrap();
    let mut bye_helper = TestHelper::in_dialog(&dialog_id);
    bye_tsx.on_in_dialog_request(&bye, &mut bye_helper);
    bye_tsx.on_response(&ok(Method::Bye), 0, &mut bye_helper);

    let fragments = writer.fragments();
    assert_eq!(fragments.len(), 2);
    assert_eq!(fragments[0].fragment_type, FragmentType::Begin);
    assert_eq!(fragments[1].fragment_type, FragmentType::End);
    assert_eq!(fragments[1].body, format!("<end-time>{T}</end-time>\n\n"));
    assert_eq!(fragments[1].unique_id(), fragments[0].unique_id());
    assert_eq!(fragments[1].owner_identity, "sip:6505551234@homedomain");
    assert_eq!(bye_helper.forwarded_requests, vec![bye]);
    assert_eq!(bye_helper.forwarded_responses.len(), 1);
}

#[test]
fn test_bye_with_known_dialog_token() {
    let (app_server, writer) = app_server();
    let bye = SipRequest::new(Method::Bye, "sip:6505551000@10.0.0.1");
    let mut tsx = app_server.get_app_tsx(&bye, Some(DIALOG_TOKEN)).unwrap();
    let mut helper = TestHelper::in_dialog(DIALOG_TOKEN);

    tsx.on_in_dialog_request(&bye, &mut helper);

    let fragments = writer.fragments();
    assert_eq!(fragments.len(), 1);
    assert_eq!(fragments[0].owner_identity, "sip:6505551234@homedomain");
    assert_eq!(fragments[0].unique_id(), "123_123");
    assert_eq!(fragments[0].fragment_type, FragmentType::End);
}

#[test]
fn test_rejected_call() {
    let (app_server, writer) = app_server();
    let req = incoming_invite();
    let mut tsx = app_server.get_app_tsx(&req, None).unwrap();
    let mut helper = TestHelper::default();

    tsx.on_initial_request(&req, &mut helper);
    tsx.on_response(&SipResponse::new(StatusCode::NOT_FOUND, "Not Found", Method::Invite), 0, &mut helper);

    let fragments = writer.fragments();
    assert_eq!(fragments.len(), 1);
    assert_eq!(fragments[0].fragment_type, FragmentType::Rejected);
    assert_eq!(
        fragments[0].body,
        format!(
            "<to>\n\t<URI>sip:6505551234@homedomain</URI>\n</to>\n\
             <from>\n\t<URI>sip:6505551000@homedomain</URI>\n\t<name>Alice</name>\n</from>\n\
             <outgoing>0</outgoing>\n<start-time>{T}</start-time>\n\
             <answered>0</answered>\n\n"
        )
    );
}

#[test]
fn test_options_is_not_recorded() {
    let (app_server, _) = app_server();
    let options = SipRequest::new(Method::Options, "sip:6505551234@homedomain");
    assert!(app_server.get_app_tsx(&options, None).is_none());

    // Within a dialog the service attached to, any method gets a recorder
    assert!(app_server.get_app_tsx(&options, Some(DIALOG_TOKEN)).is_some());
}

#[test]
fn test_out_of_dialog_bye_attaches_but_records_nothing() {
    let (app_server, writer) = app_server();
    let bye = SipRequest::new(Method::Bye, "sip:6505551234@homedomain")
        .with_header(headers::FROM, "<sip:6505551000@homedomain>;tag=1")
        .with_header(headers::TO, "<sip:6505551234@homedomain>;tag=2");
    let mut tsx = app_server.get_app_tsx(&bye, None).unwrap();
    let mut helper = TestHelper::default();

    tsx.on_initial_request(&bye, &mut helper);
    assert!(helper.added_dialog_id.is_some());
    assert!(!tsx.includes_initial_request());

    tsx.on_response(&ok(Method::Bye), 0, &mut helper);
    assert!(writer.fragments().is_empty());
    assert_eq!(helper.forwarded_responses.len(), 1);
}

#[test]
fn test_overload_is_counted() {
    let writer = Arc::new(CapturingWriter::default());
    let mut config = CallHistoryConfig::new("homedomain");
    config.load_monitor.max_tokens = 1;
    config.load_monitor.init_token_rate = 0.01;
    config.load_monitor.min_token_rate = 0.01;
    let app_server = CallHistoryAppServer::with_writer(config, writer.clone()).unwrap();

    for _ in 0..3 {
        let req = incoming_invite();
        let mut tsx = app_server.get_app_tsx(&req, None).unwrap();
        let mut helper = TestHelper::default();
        tsx.on_initial_request(&req, &mut helper);
        tsx.on_response(&ok(Method::Invite), 0, &mut helper);
        assert_eq!(helper.forwarded_responses.len(), 1);
    }

    assert_eq!(writer.fragments().len(), 1);
    assert_eq!(app_server.stats().not_recorded_overload, 2);
}
