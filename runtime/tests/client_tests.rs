//! Integration tests for the relay client against the in-memory broker.
//!
//! All timing tests run with paused time, so retry and reconnect delays
//! elapse instantly and deterministically.

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use ticket_relay_core::{BrokerError, JSON_CONTENT_TYPE};
use ticket_relay_runtime::{
    ClientConfig, ClientError, ConnectionPhase, HealthStatus, PublishPolicy, ReconnectPolicy,
    RelayClient,
};
use ticket_relay_testing::{InMemoryBroker, decode_body};
use tokio::time::Instant;

const QUEUE: &str = "support_tickets_queue";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Ticket {
    ticket_id: String,
    customer_name: String,
    customer_email: String,
    issue: String,
}

fn ticket(id: &str) -> Ticket {
    Ticket {
        ticket_id: id.to_string(),
        customer_name: "Ada Lovelace".to_string(),
        customer_email: "ada@example.com".to_string(),
        issue: "Cannot log in".to_string(),
    }
}

async fn connected_client(broker: &InMemoryBroker) -> RelayClient {
    RelayClient::new(Arc::new(broker.clone()), ClientConfig::new(QUEUE))
        .await
        .unwrap()
}

/// Poll `condition` every 100ms of virtual time, up to one minute.
async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..600 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    condition()
}

// ============================================================================
// Construction
// ============================================================================

#[tokio::test(start_paused = true)]
async fn unreachable_broker_fails_construction_without_supervisor() {
    let broker = InMemoryBroker::with_queue(QUEUE);
    broker.set_reachable(false);

    let result = RelayClient::new(Arc::new(broker.clone()), ClientConfig::new(QUEUE)).await;

    assert!(matches!(
        result,
        Err(ClientError::Connection(BrokerError::ConnectionFailed(_)))
    ));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(broker.connect_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn channel_failure_closes_the_fresh_connection() {
    let broker = InMemoryBroker::with_queue(QUEUE);
    broker.refuse_channels(1);

    let result = RelayClient::new(Arc::new(broker.clone()), ClientConfig::new(QUEUE)).await;

    assert!(matches!(
        result,
        Err(ClientError::Connection(BrokerError::ChannelFailed(_)))
    ));
    assert_eq!(broker.open_connections(), 0);
    assert_eq!(broker.released_connections(), 1);
}

#[tokio::test(start_paused = true)]
async fn new_client_reports_connected_phase() {
    let broker = InMemoryBroker::with_queue(QUEUE);
    let client = connected_client(&broker).await;

    assert!(client.is_connected());
    assert!(matches!(
        client.phase().await,
        ConnectionPhase::Connected { generation: 1, .. }
    ));

    client.close().await;
}

// ============================================================================
// Publishing
// ============================================================================

#[tokio::test(start_paused = true)]
async fn publish_sends_json_to_default_exchange_in_one_attempt() {
    let broker = InMemoryBroker::with_queue(QUEUE);
    let client = connected_client(&broker).await;

    client.publish(QUEUE, &ticket("T-100")).await.unwrap();

    let published = broker.published();
    assert_eq!(published.len(), 1);
    assert_eq!(broker.publish_attempts(), 1);

    let message = &published[0];
    assert_eq!(message.exchange, "");
    assert_eq!(message.routing_key, QUEUE);
    assert!(!message.mandatory);
    assert!(!message.immediate);
    assert_eq!(message.content_type, JSON_CONTENT_TYPE);
    assert_eq!(decode_body::<Ticket>(message).unwrap(), ticket("T-100"));
    assert_eq!(broker.queue_depth(QUEUE), Some(1));

    client.close().await;
}

#[tokio::test(start_paused = true)]
async fn publish_exhausts_after_three_attempts_and_two_waits() {
    let broker = InMemoryBroker::with_queue(QUEUE);
    let client = connected_client(&broker).await;
    broker.fail_all_publishes(true);

    let started = Instant::now();
    let err = client.publish(QUEUE, &ticket("T-1")).await.unwrap_err();
    let elapsed = started.elapsed();

    match err {
        ClientError::PublishExhausted { attempts, source } => {
            assert_eq!(attempts, 3);
            assert!(matches!(source, BrokerError::PublishFailed { .. }));
        }
        other => panic!("expected PublishExhausted, got {other:?}"),
    }
    assert_eq!(broker.publish_attempts(), 3);
    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_secs(3));

    client.close().await;
}

#[tokio::test(start_paused = true)]
async fn publish_recovers_from_transient_send_failures() {
    let broker = InMemoryBroker::with_queue(QUEUE);
    let client = connected_client(&broker).await;
    broker.fail_publishes(2);

    client.publish(QUEUE, &ticket("T-2")).await.unwrap();

    assert_eq!(broker.publish_attempts(), 3);
    assert_eq!(broker.published().len(), 1);

    client.close().await;
}

#[tokio::test(start_paused = true)]
async fn serialization_failure_is_not_retried() {
    let broker = InMemoryBroker::with_queue(QUEUE);
    let client = connected_client(&broker).await;

    // JSON object keys must be strings.
    let mut payload = BTreeMap::new();
    payload.insert(vec![1_u8], "value");

    let started = Instant::now();
    let err = client.publish(QUEUE, &payload).await.unwrap_err();

    assert!(matches!(err, ClientError::Serialization(_)));
    assert_eq!(broker.publish_attempts(), 0);
    assert_eq!(started.elapsed(), Duration::ZERO);

    client.close().await;
}

#[tokio::test(start_paused = true)]
async fn publish_while_disconnected_returns_not_connected_without_sending() {
    let broker = InMemoryBroker::with_queue(QUEUE);
    let client = connected_client(&broker).await;
    broker.set_reachable(false);
    broker.drop_connection("broker restarted");

    assert!(eventually(|| broker.connect_attempts() >= 2).await);
    assert!(!client.is_connected());
    assert!(matches!(
        client.phase().await,
        ConnectionPhase::Disconnected { .. }
    ));

    let started = Instant::now();
    let err = client.publish(QUEUE, &ticket("T-3")).await.unwrap_err();

    assert!(matches!(err, ClientError::NotConnected));
    assert_eq!(broker.publish_attempts(), 0);
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert!(started.elapsed() < Duration::from_secs(3));

    client.close().await;
}

#[tokio::test(start_paused = true)]
async fn publish_picks_up_new_channel_after_reconnect() {
    let broker = InMemoryBroker::with_queue(QUEUE);
    let policy = PublishPolicy::builder()
        .retry_delay(Duration::from_millis(500))
        .build();
    let config = ClientConfig::new(QUEUE)
        .with_publish_policy(policy)
        .with_reconnect_policy(ReconnectPolicy::new(Duration::from_millis(200)));
    let client = RelayClient::new(Arc::new(broker.clone()), config)
        .await
        .unwrap();

    broker.drop_connection("connection reset by peer");
    client.publish(QUEUE, &ticket("T-4")).await.unwrap();

    assert_eq!(broker.published().len(), 1);
    assert_eq!(broker.connect_attempts(), 2);

    client.close().await;
}

// ============================================================================
// Reconnection
// ============================================================================

#[tokio::test(start_paused = true)]
async fn supervisor_reconnects_on_third_attempt() {
    let broker = InMemoryBroker::with_queue(QUEUE);
    let client = connected_client(&broker).await;
    broker.refuse_connects(2);

    let started = Instant::now();
    broker.drop_connection("broker restarted");

    assert!(eventually(|| client.is_connected() && broker.connect_attempts() == 4).await);
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert!(matches!(
        client.phase().await,
        ConnectionPhase::Connected { generation: 2, .. }
    ));

    client.publish(QUEUE, &ticket("T-5")).await.unwrap();
    assert_eq!(broker.published().len(), 1);
    assert_eq!(broker.open_connections(), 1);

    client.close().await;
}

#[tokio::test(start_paused = true)]
async fn supervisor_survives_repeated_drops() {
    let broker = InMemoryBroker::with_queue(QUEUE);
    let client = connected_client(&broker).await;

    for round in 2..=5 {
        assert!(broker.drop_connection("flapping network"));
        assert!(eventually(|| broker.connect_attempts() == round && client.is_connected()).await);
    }

    assert!(matches!(
        client.phase().await,
        ConnectionPhase::Connected { generation: 5, .. }
    ));
    assert_eq!(broker.open_connections(), 1);

    client.close().await;
}

#[tokio::test(start_paused = true)]
async fn stale_closure_signal_is_ignored() {
    let broker = InMemoryBroker::with_queue(QUEUE);
    let client = connected_client(&broker).await;

    broker.drop_connection("broker restarted");
    assert!(eventually(|| client.is_connected() && broker.connect_attempts() == 2).await);

    assert!(broker.replay_closure(1, "late signal from first connection"));
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert!(client.is_connected());
    assert_eq!(broker.connect_attempts(), 2);
    assert!(matches!(
        client.phase().await,
        ConnectionPhase::Connected { generation: 2, .. }
    ));

    client.close().await;
}

#[tokio::test(start_paused = true)]
async fn failed_reconnect_records_last_error() {
    let broker = InMemoryBroker::with_queue(QUEUE);
    let client = connected_client(&broker).await;
    broker.set_reachable(false);
    broker.drop_connection("broker restarted");

    assert!(eventually(|| broker.connect_attempts() >= 2).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    match client.phase().await {
        ConnectionPhase::Disconnected { last_error } => {
            assert!(last_error.unwrap().contains("connection refused"));
        }
        other => panic!("expected Disconnected, got {other:?}"),
    }

    client.close().await;
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn double_close_is_a_no_op() {
    let broker = InMemoryBroker::with_queue(QUEUE);
    let client = connected_client(&broker).await;

    client.close().await;
    client.close().await;

    assert!(!client.is_connected());
    assert_eq!(client.phase().await, ConnectionPhase::Closed);
    assert_eq!(broker.open_connections(), 0);
    assert_eq!(broker.released_connections(), 1);
    assert_eq!(broker.connect_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn closed_client_rejects_publish_and_probe() {
    let broker = InMemoryBroker::with_queue(QUEUE);
    let client = connected_client(&broker).await;
    client.close().await;

    let started = Instant::now();
    assert!(matches!(
        client.publish(QUEUE, &ticket("T-6")).await,
        Err(ClientError::Closed)
    ));
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert!(matches!(client.health_check().await, Err(ClientError::Closed)));
    assert_eq!(broker.publish_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn close_during_reconnect_stops_further_attempts() {
    let broker = InMemoryBroker::with_queue(QUEUE);
    let client = connected_client(&broker).await;
    broker.set_reachable(false);
    broker.drop_connection("broker down");

    assert!(eventually(|| broker.connect_attempts() >= 2).await);

    let started = Instant::now();
    client.close().await;
    assert!(started.elapsed() < Duration::from_secs(5));

    let attempts = broker.connect_attempts();
    broker.set_reachable(true);
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(broker.connect_attempts(), attempts);
    assert_eq!(client.phase().await, ConnectionPhase::Closed);
    assert_eq!(broker.open_connections(), 0);
}

#[tokio::test(start_paused = true)]
async fn drop_after_close_does_not_reconnect() {
    let broker = InMemoryBroker::with_queue(QUEUE);
    let client = connected_client(&broker).await;
    client.close().await;

    assert!(!broker.drop_connection("late drop"));
    broker.replay_closure(1, "late drop");
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(broker.connect_attempts(), 1);
    assert!(!client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn close_during_slow_reconnect_handshake_releases_the_new_connection() {
    let broker = InMemoryBroker::with_queue(QUEUE);
    let client = connected_client(&broker).await;
    broker.set_connect_latency(Duration::from_secs(1));
    broker.drop_connection("broker restarted");

    assert!(eventually(|| broker.connect_attempts() >= 2).await);
    tokio::time::sleep(Duration::from_millis(500)).await;
    client.close().await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(broker.connect_attempts(), 2);
    assert_eq!(broker.open_connections(), 0);
    assert_eq!(broker.released_connections(), 2);
    assert_eq!(client.phase().await, ConnectionPhase::Closed);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_client_releases_its_connection() {
    let broker = InMemoryBroker::with_queue(QUEUE);
    let client = connected_client(&broker).await;
    assert_eq!(broker.open_connections(), 1);

    drop(client);

    assert!(eventually(|| broker.open_connections() == 0).await);
    assert_eq!(broker.released_connections(), 1);
    assert_eq!(broker.connect_attempts(), 1);
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test(start_paused = true)]
async fn health_check_reports_queue_status() {
    let broker = InMemoryBroker::with_queue(QUEUE);
    let client = connected_client(&broker).await;
    client.publish(QUEUE, &ticket("T-7")).await.unwrap();

    let status = client.health_check().await.unwrap().unwrap();
    assert_eq!(status.name, QUEUE);
    assert_eq!(status.message_count, 1);
    assert_eq!(status.consumer_count, 0);

    let check = client.health().await;
    assert_eq!(check.status, HealthStatus::Healthy);
    assert_eq!(check.metadata("messages"), Some("1"));

    client.close().await;
}

#[tokio::test(start_paused = true)]
async fn health_check_distinguishes_open_socket_from_working_broker() {
    let broker = InMemoryBroker::with_queue(QUEUE);
    let client = connected_client(&broker).await;
    broker.set_unresponsive(true);

    assert!(client.is_connected());
    let err = client.health_check().await.unwrap_err();
    assert!(matches!(err, ClientError::BrokerUnresponsive { ref queue, .. } if queue == QUEUE));

    let check = client.health().await;
    assert!(check.status.is_unhealthy());
    assert_eq!(check.metadata("reason"), Some("broker_unresponsive"));

    client.close().await;
}

#[tokio::test(start_paused = true)]
async fn health_check_on_missing_queue_is_unresponsive() {
    let broker = InMemoryBroker::new();
    let client = connected_client(&broker).await;

    let err = client.health_check().await.unwrap_err();
    assert!(err.to_string().contains("NOT_FOUND"));

    client.close().await;
}

#[tokio::test(start_paused = true)]
async fn health_check_while_disconnected_is_not_connected() {
    let broker = InMemoryBroker::with_queue(QUEUE);
    let client = connected_client(&broker).await;
    broker.set_reachable(false);
    broker.drop_connection("broker down");

    assert!(eventually(|| broker.connect_attempts() >= 2).await);
    assert!(matches!(client.health_check().await, Err(ClientError::NotConnected)));
    assert_eq!(client.health().await.metadata("reason"), Some("not_connected"));

    client.close().await;
}

#[tokio::test(start_paused = true)]
async fn empty_queue_name_skips_inspection() {
    let broker = InMemoryBroker::new();
    let client = RelayClient::new(Arc::new(broker.clone()), ClientConfig::new(""))
        .await
        .unwrap();

    assert!(client.health_check().await.unwrap().is_none());
    assert!(client.health().await.status.is_healthy());

    client.close().await;
}
