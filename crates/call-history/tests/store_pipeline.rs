//! End-to-end: recorder, store processor, memory store and HTTP notifier

use std::sync::Arc;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rvoip_call_history::message::{headers, Method, SipRequest, SipResponse, StatusCode};
use rvoip_call_history::{
    AppServerTsx, CallHistoryAppServer, CallHistoryConfig, CallListStore, FragmentType,
    MemoryCallListStore, TrailId, TsxHelper,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("rvoip_call_history=debug")
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct Helper {
    added_dialog_id: Option<String>,
    dialog_id: Option<String>,
}

impl TsxHelper for Helper {
    fn send_request(&mut self, _req: &SipRequest) {}

    fn send_response(&mut self, _rsp: &SipResponse) {}

    fn add_to_dialog(&mut self, dialog_id: String) {
        self.added_dialog_id = Some(dialog_id);
    }

    fn dialog_id(&self) -> Option<String> {
        self.dialog_id.clone()
    }

    fn trail(&self) -> TrailId {
        TrailId::new()
    }
}

fn invite_from(caller: &str) -> SipRequest {
    SipRequest::new(Method::Invite, "sip:6505551234@homedomain")
        .with_header(headers::FROM, format!("<{}>;tag=1", caller))
        .with_header(headers::TO, "<sip:6505551234@homedomain>")
}

/// Run one answered call and its BYE through the app server
fn place_call(app_server: &CallHistoryAppServer, caller: &str) {
    let invite = invite_from(caller);
    let mut helper = Helper::default();
    let mut tsx = app_server.get_app_tsx(&invite, None).unwrap();
    tsx.on_initial_request(&invite, &mut helper);
    tsx.on_response(&SipResponse::new(StatusCode::OK, "OK", Method::Invite), 0, &mut helper);

    let dialog_id = helper.added_dialog_id.unwrap();
    let bye = SipRequest::new(Method::Bye, caller);
    let mut bye_helper = Helper {
        dialog_id: Some(dialog_id.clone()),
        ..Default::default()
    };
    let mut bye_tsx = app_server.get_app_tsx(&bye, Some(&dialog_id)).unwrap();
    bye_tsx.on_in_dialog_request(&bye, &mut bye_helper);
}

#[tokio::test]
async fn test_call_is_stored_and_notified() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notify"))
        .and(body_json(json!({ "impu": "sip:6505551234@homedomain" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCallListStore::new());
    let config = CallHistoryConfig::new("homedomain")
        .with_workers(1)
        .with_notify_url(format!("{}/notify", server.uri()));
    let app_server = CallHistoryAppServer::new(config, store.clone()).unwrap();

    place_call(&app_server, "sip:6505551000@homedomain");
    app_server.shutdown().await;

    let fragments = store.get_call_fragments("sip:6505551234@homedomain").await.unwrap();
    let types: Vec<FragmentType> = fragments.iter().map(|f| f.fragment_type).collect();
    assert_eq!(types, vec![FragmentType::Begin, FragmentType::End]);
    assert_eq!(fragments[0].unique_id(), fragments[1].unique_id());

    let stats = app_server.stats();
    assert_eq!(stats.completed_calls, 2);
    assert_eq!(stats.failed_calls, 0);
    assert_eq!(stats.notify_failures, 0);
}

#[tokio::test]
async fn test_notify_failures_are_counted_not_fatal() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCallListStore::new());
    let config = CallHistoryConfig::new("homedomain").with_notify_url(server.uri());
    let app_server = CallHistoryAppServer::new(config, store.clone()).unwrap();

    place_call(&app_server, "sip:6505551000@homedomain");
    app_server.shutdown().await;

    assert_eq!(store.get_call_fragments("sip:6505551234@homedomain").await.unwrap().len(), 2);
    let stats = app_server.stats();
    assert_eq!(stats.completed_calls, 2);
    assert_eq!(stats.notify_failures, 2);
}

#[tokio::test]
async fn test_invalid_config_is_refused() {
    let config = CallHistoryConfig::new("homedomain").with_notify_url("not a url");
    let result = CallHistoryAppServer::new(config, Arc::new(MemoryCallListStore::new()));
    assert!(result.is_err());
}
