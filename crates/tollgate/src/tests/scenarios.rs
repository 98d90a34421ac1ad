//! End-to-end produce scenarios.
//!
//! Each one sends a single message on topic `orders` through the producer
//! and checks what reached the engine and the transport.

use super::harness::{EngineReply, MockEngine, RecordingTransport};
use crate::audience::{OperationType, RuntimeConfig};
use crate::error::ShimError;
use crate::gate::Gate;
use crate::message::{ByteEncoder, ProducerMessage};
use crate::producer::InterceptingProducer;

fn orders_message() -> ProducerMessage {
    ProducerMessage::new("orders").with_value(ByteEncoder(b"original".to_vec()))
}

/// Active engine rewrites the payload
#[tokio::test]
async fn modified_payload_is_sent() {
    let engine = MockEngine::new();
    engine.queue_response(EngineReply::Modified(b"X".to_vec()));
    let handle = engine.start().await;

    let transport = RecordingTransport::new();
    let producer = InterceptingProducer::new(engine.gate().await, transport.clone());

    producer.send_message(orders_message(), None).await.unwrap();

    let requests = engine.received_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].component_name, "kafka");
    assert_eq!(requests[0].operation_name, "orders");
    assert_eq!(requests[0].operation_type, OperationType::Producer);
    assert_eq!(requests[0].data, b"original".to_vec());

    assert_eq!(transport.sent_values(), vec![Some(b"X".to_vec())]);

    engine.shutdown();
    handle.abort();
}

/// Disabled handle leaves the payload alone
#[tokio::test]
async fn disabled_handle_sends_identical_bytes() {
    let transport = RecordingTransport::new();
    let producer = InterceptingProducer::new(Gate::disabled(), transport.clone());

    producer.send_message(orders_message(), None).await.unwrap();

    assert_eq!(transport.sent_values(), vec![Some(b"original".to_vec())]);
}

/// Strict errors turn an engine error into a failed send
#[tokio::test]
async fn strict_error_fails_and_sends_nothing() {
    let engine = MockEngine::new();
    engine.queue_response(EngineReply::Error("timeout".to_string()));
    let handle = engine.start().await;

    let transport = RecordingTransport::new();
    let producer = InterceptingProducer::new(engine.gate().await, transport.clone());

    let strict = RuntimeConfig::strict();
    let err = producer
        .send_message(orders_message(), Some(&strict))
        .await
        .unwrap_err();

    assert!(matches!(err, ShimError::Process { .. }));
    assert!(err.to_string().contains("timeout"));
    assert_eq!(transport.sent_count(), 0);

    engine.shutdown();
    handle.abort();
}

/// Lenient policy sends the original payload on engine error
#[tokio::test]
async fn lenient_error_sends_original() {
    let engine = MockEngine::new();
    engine.queue_response(EngineReply::Error("timeout".to_string()));
    let handle = engine.start().await;

    let transport = RecordingTransport::new();
    let producer = InterceptingProducer::new(engine.gate().await, transport.clone());

    producer.send_message(orders_message(), None).await.unwrap();

    assert_eq!(engine.received_count(), 1);
    assert_eq!(transport.sent_values(), vec![Some(b"original".to_vec())]);

    engine.shutdown();
    handle.abort();
}
