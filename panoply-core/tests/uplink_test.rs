use base64::{engine::general_purpose::STANDARD, Engine as _};
use panoply_core::{Credentials, EventEmitter, EventPayload, Uplink, UplinkConfig, SDK_IDENTIFIER};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn credentials() -> Credentials {
    Credentials::new("test/key", STANDARD.encode("rand2/uuid/awsaccount/region")).unwrap()
}

/// Forwards every published event to a channel the test can await on.
fn capture(emitter: &EventEmitter) -> mpsc::UnboundedReceiver<(String, EventPayload)> {
    let (tx, rx) = mpsc::unbounded_channel();
    emitter.on("*", move |name, payload| {
        let _ = tx.send((name.to_string(), payload.clone()));
    });
    rx
}

async fn next_named(
    rx: &mut mpsc::UnboundedReceiver<(String, EventPayload)>,
    name: &str,
) -> EventPayload {
    let wait = async {
        loop {
            let (event, payload) = rx.recv().await.expect("event channel closed");
            if event == name {
                return payload;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .unwrap_or_else(|_| panic!("no '{}' event", name))
}

async fn queue_server(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/queue"))
        .respond_with(ResponseTemplate::new(status).set_body_string("<SendMessageResponse/>"))
        .mount(&server)
        .await;
    server
}

fn start(server: &MockServer, config: UplinkConfig) -> (Uplink, Arc<EventEmitter>) {
    let emitter = Arc::new(EventEmitter::new());
    let config = config.with_endpoint(format!("{}/queue", server.uri()));
    let uplink = Uplink::with_emitter(credentials(), config, emitter.clone()).unwrap();
    (uplink, emitter)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_flush_after_interval() {
    let server = queue_server(200).await;
    let (uplink, emitter) = start(
        &server,
        UplinkConfig::default().with_flush_interval(Duration::from_millis(100)),
    );
    let mut events = capture(&emitter);

    uplink.write("users", json!({"id": 1})).unwrap();
    uplink.write("users", json!({"id": 2})).unwrap();

    let send = next_named(&mut events, "send").await;
    let flush = next_named(&mut events, "flush").await;

    let EventPayload::Send { request: sent } = send else {
        panic!("unexpected payload");
    };
    let EventPayload::Flush { request, response } = flush else {
        panic!("unexpected payload");
    };

    assert_eq!(sent.batch_id, request.batch_id);
    assert_eq!(request.records, 2);
    assert_eq!(response.status, 200);
    assert!(request.body.starts_with("Action=SendMessage&MessageBody="));
    assert!(request.body.contains("%22__table%22%3A%22users%22"));
    assert!(request.body.contains(&format!(
        "MessageAttribute.3.Value.StringValue={}",
        SDK_IDENTIFIER
    )));
    assert_eq!(uplink.pending(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_request_is_form_encoded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/queue"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("MessageAttribute.1.Value.StringValue=test%2Fkey"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (uplink, _emitter) = start(
        &server,
        UplinkConfig::default().with_flush_interval(Duration::from_secs(60)),
    );
    uplink.write("orders", json!({"total": 9.5})).unwrap();
    uplink.close().await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let content_length = requests[0]
        .headers
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    assert_eq!(content_length, Some(requests[0].body.len()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_size_trigger_flushes_before_interval() {
    let server = queue_server(200).await;
    let (uplink, emitter) = start(
        &server,
        UplinkConfig::default()
            .with_flush_interval(Duration::from_secs(60))
            .with_max_batch_bytes(64),
    );
    let mut events = capture(&emitter);

    for i in 0..4 {
        uplink
            .write("events", json!({"id": i, "name": "a fairly long record body"}))
            .unwrap();
    }

    let flush = next_named(&mut events, "flush").await;
    let EventPayload::Flush { request, .. } = flush else {
        panic!("unexpected payload");
    };
    assert!(request.records >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_batch_emits_error_and_worker_survives() {
    let server = queue_server(500).await;
    let (uplink, emitter) = start(
        &server,
        UplinkConfig::default().with_flush_interval(Duration::from_millis(50)),
    );
    let mut events = capture(&emitter);

    uplink.write("users", json!({"id": 1})).unwrap();
    let first = next_named(&mut events, "error").await;
    let EventPayload::Error {
        error_code,
        request,
        ..
    } = first
    else {
        panic!("unexpected payload");
    };
    assert_eq!(error_code, "P3006");
    assert_eq!(request.map(|r| r.records), Some(1));

    uplink.write("users", json!({"id": 2})).unwrap();
    let second = next_named(&mut events, "error").await;
    assert!(matches!(second, EventPayload::Error { .. }));

    // dropped batches are not resent
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_idle_uplink_sends_nothing() {
    let server = queue_server(200).await;
    let (uplink, _emitter) = start(
        &server,
        UplinkConfig::default().with_flush_interval(Duration::from_millis(20)),
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    uplink.close().await.unwrap();

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_flushes_remaining_records() {
    let server = queue_server(200).await;
    let (uplink, emitter) = start(
        &server,
        UplinkConfig::default().with_flush_interval(Duration::from_secs(60)),
    );
    let mut events = capture(&emitter);

    for i in 0..3 {
        uplink.write("users", json!({"id": i})).unwrap();
    }
    uplink.close().await.unwrap();

    let flush = next_named(&mut events, "flush").await;
    let EventPayload::Flush { request, .. } = flush else {
        panic!("unexpected payload");
    };
    assert_eq!(request.records, 3);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unreachable_endpoint_reports_error() {
    let emitter = Arc::new(EventEmitter::new());
    let mut events = capture(&emitter);
    let config = UplinkConfig::default()
        .with_flush_interval(Duration::from_millis(50))
        .with_endpoint("http://127.0.0.1:1/queue");
    let uplink = Uplink::with_emitter(credentials(), config, emitter.clone()).unwrap();

    uplink.write("users", json!({"id": 1})).unwrap();

    let error = next_named(&mut events, "error").await;
    assert!(matches!(error, EventPayload::Error { .. }));
    assert!(emitter.has_handlers("*"));
}
