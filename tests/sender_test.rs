//! Tests for the delivery sender's failure policy.

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use edgeflow::{
    Data, DeliveryConfig, DeliveryError, DeliverySender, Destination, Event, Flow,
    HttpTransport, PipelineContext, SerializeError, Transport,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A transport that answers from a script instead of the network.
struct MockTransport {
    destination: Destination,
    calls: AtomicUsize,
    fail_with: Option<u16>,
    delay: Duration,
}

impl MockTransport {
    fn ok() -> Self {
        Self {
            destination: Destination::new("http://mock.local/ingest"),
            calls: AtomicUsize::new(0),
            fail_with: None,
            delay: Duration::ZERO,
        }
    }

    fn failing(status: u16) -> Self {
        Self {
            fail_with: Some(status),
            ..Self::ok()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self { delay, ..Self::ok() }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn destination(&self) -> &Destination {
        &self.destination
    }

    async fn send(&self, _payload: &[u8], _correlation_id: &str) -> Result<Vec<u8>, DeliveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.fail_with {
            Some(status) => Err(DeliveryError::Status {
                url: self.destination.url.clone(),
                status,
            }),
            None => Ok(b"ok".to_vec()),
        }
    }
}

fn delivery_error(flow: &Flow) -> &DeliveryError {
    flow.err()
        .and_then(|e| e.downcast_ref::<DeliveryError>())
        .expect("flow should fail with a delivery error")
}

#[derive(Default)]
struct Received {
    requests: Mutex<Vec<(HeaderMap, Vec<u8>)>>,
}

async fn ingest(
    State(received): State<Arc<Received>>,
    headers: HeaderMap,
    body: Bytes,
) -> &'static str {
    received.requests.lock().unwrap().push((headers, body.to_vec()));
    "accepted"
}

async fn unavailable() -> StatusCode {
    StatusCode::SERVICE_UNAVAILABLE
}

/// Start a local HTTP sink and return its base URL.
async fn start_sink() -> (String, Arc<Received>) {
    let received = Arc::new(Received::default());
    let app = Router::new()
        .route("/ingest", post(ingest))
        .route("/down", post(unavailable))
        .with_state(received.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), received)
}

fn unreachable_sender(persist: bool) -> DeliverySender<HttpTransport> {
    let mut config = DeliveryConfig::new("http://127.0.0.1:1/ingest");
    config.persist_on_failure = persist;
    config.timeout_ms = 2_000;
    DeliverySender::from_config(&config).unwrap()
}

#[tokio::test]
async fn test_no_data_fails_without_sending() {
    let sender = DeliverySender::new(MockTransport::ok()).persist_on_failure(true);
    let mut ctx = PipelineContext::new("no-data");

    let flow = sender.send(&mut ctx, None).await;

    assert!(matches!(delivery_error(&flow), DeliveryError::NoData));
    assert_eq!(flow.err().unwrap().to_string(), "No Data Received");
    assert!(ctx.retry_data().is_none());
    assert_eq!(sender.transport().calls(), 0);
}

#[tokio::test]
async fn test_unsupported_data_fails_without_retry() {
    let sender = DeliverySender::new(MockTransport::ok()).persist_on_failure(true);
    let mut ctx = PipelineContext::new("opaque");

    let flow = sender.send(&mut ctx, Some(Data::opaque(42u64))).await;

    assert!(matches!(
        delivery_error(&flow),
        DeliveryError::Serialize(SerializeError::Unsupported)
    ));
    assert!(ctx.retry_data().is_none());
    assert_eq!(sender.transport().calls(), 0);
}

#[tokio::test]
async fn test_unreachable_with_persist_fills_retry_slot() {
    let sender = unreachable_sender(true);
    let mut ctx = PipelineContext::new("persist-on");

    let flow = sender.send(&mut ctx, Some(Data::from("21.5"))).await;

    assert!(!flow.is_continue());
    assert!(matches!(
        delivery_error(&flow),
        DeliveryError::Transport { .. }
    ));
    let record = ctx.retry_data().expect("retry record should be stored");
    assert_eq!(record.payload, b"21.5".to_vec());
    assert_eq!(record.correlation_id, "persist-on");
    assert_eq!(record.destination.url, "http://127.0.0.1:1/ingest");
    assert_eq!(record.retry_count, 0);
}

#[tokio::test]
async fn test_unreachable_without_persist_leaves_slot_empty() {
    let sender = unreachable_sender(false);
    let mut ctx = PipelineContext::new("persist-off");

    let flow = sender.send(&mut ctx, Some(Data::from("21.5"))).await;

    assert!(matches!(
        delivery_error(&flow),
        DeliveryError::Transport { .. }
    ));
    assert!(ctx.retry_data().is_none());
}

#[tokio::test]
async fn test_persisted_payload_is_serialized_form() {
    let sender = DeliverySender::new(MockTransport::failing(503)).persist_on_failure(true);
    let mut ctx = PipelineContext::new("marshal");
    let event = Event::new("boiler").with_reading("pressure", "2.1");

    let flow = sender.send(&mut ctx, Some(Data::marshal(event.clone()))).await;

    assert!(matches!(
        delivery_error(&flow),
        DeliveryError::Status { status: 503, .. }
    ));
    let record = ctx.take_retry_data().unwrap();
    let stored: Event = serde_json::from_slice(&record.payload).unwrap();
    assert_eq!(stored, event);
    assert_eq!(record.destination, *sender.transport().destination());
}

#[tokio::test]
async fn test_slow_transport_times_out() {
    let sender = DeliverySender::new(MockTransport::slow(Duration::from_secs(5)))
        .timeout(Duration::from_millis(50))
        .persist_on_failure(true);
    let mut ctx = PipelineContext::new("slow");

    let flow = sender.send(&mut ctx, Some(Data::from(vec![1u8, 2, 3]))).await;

    assert!(matches!(
        delivery_error(&flow),
        DeliveryError::Timeout { .. }
    ));
    assert_eq!(ctx.retry_data().unwrap().payload, vec![1u8, 2, 3]);
}

#[tokio::test]
async fn test_successful_delivery_continues_with_nothing() {
    let (base, received) = start_sink().await;
    let mut config = DeliveryConfig::new(format!("{base}/ingest"));
    config.auth_header = Some("Authorization".to_string());
    config.auth_value = Some("Bearer edge-token".to_string());
    let sender = DeliverySender::from_config(&config).unwrap();
    let mut ctx = PipelineContext::new("corr-ok");

    let event = Event::new("thermostat").with_reading("temp", "21.5");
    let flow = sender.send(&mut ctx, Some(Data::marshal(event.clone()))).await;

    assert!(matches!(flow, Flow::Continue(None)));
    assert!(ctx.retry_data().is_none());

    let requests = received.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let (headers, body) = &requests[0];
    assert_eq!(headers["x-correlation-id"], "corr-ok");
    assert_eq!(headers["content-type"], "application/json");
    assert_eq!(headers["authorization"], "Bearer edge-token");
    assert_eq!(serde_json::from_slice::<Event>(body).unwrap(), event);
}

#[tokio::test]
async fn test_pass_response_continues_with_body() {
    let (base, _received) = start_sink().await;
    let mut config = DeliveryConfig::new(format!("{base}/ingest"));
    config.pass_response = true;
    let sender = DeliverySender::from_config(&config).unwrap();
    let mut ctx = PipelineContext::new("corr-pass");

    let flow = sender.send(&mut ctx, Some(Data::from("hello"))).await;

    match flow {
        Flow::Continue(Some(Data::Bytes(body))) => assert_eq!(body, b"accepted".to_vec()),
        other => panic!("expected response body, got {other:?}"),
    }
}

#[tokio::test]
async fn test_error_status_is_a_failed_send() {
    let (base, _received) = start_sink().await;
    let mut config = DeliveryConfig::new(format!("{base}/down"));
    config.persist_on_failure = true;
    let sender = DeliverySender::from_config(&config).unwrap();
    let mut ctx = PipelineContext::new("corr-down");

    let flow = sender.send(&mut ctx, Some(Data::from("hello"))).await;

    assert!(matches!(
        delivery_error(&flow),
        DeliveryError::Status { status: 503, .. }
    ));
    assert!(ctx.retry_data().is_some());
}

#[test]
fn test_from_config_rejects_bad_url() {
    let config = DeliveryConfig::new("mqtt://broker:1883");
    assert!(DeliverySender::from_config(&config).is_err());
}
