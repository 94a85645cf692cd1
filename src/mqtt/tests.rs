use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc;

use super::backoff::ReconnectBackoff;
use super::client::{ConnectionState, MqttClient};
use super::message::{ConnectReturnCode, MessageId, MqttEvent, MqttMessage, QoS};
use super::router::{SubscriptionState, TopicRouter};
use super::service::PublishRequest;
use super::topic::{
    TopicPattern, topic_matches, validate_publish_topic, validate_subscribe_topic,
};
use super::transport::Transport;
use crate::config::{BirthMessage, MqttSettings, Settings};
use crate::utils::error::{MqttError, TopicError, TransportError};

#[derive(Debug, Default)]
struct TransportLog {
    connects: usize,
    reconnects: usize,
    disconnects: usize,
    subscribes: Vec<(String, QoS)>,
    unsubscribes: Vec<String>,
    publishes: Vec<(String, String, QoS, bool)>,
    fail_connect: bool,
    fail_subscribe: bool,
    reconnect_failures: usize,
    reconnect_times: Vec<tokio::time::Instant>,
    next_id: MessageId,
}

impl TransportLog {
    fn next_id(&mut self) -> MessageId {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Clone, Default)]
struct MockTransport {
    log: Arc<Mutex<TransportLog>>,
}

impl MockTransport {
    fn log(&self) -> std::sync::MutexGuard<'_, TransportLog> {
        self.log.lock().unwrap()
    }
}

impl Transport for MockTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        let mut log = self.log();
        log.connects += 1;
        if log.fail_connect {
            return Err(TransportError::Io("connection refused".to_string()));
        }
        Ok(())
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        let mut log = self.log();
        log.reconnects += 1;
        log.reconnect_times.push(tokio::time::Instant::now());
        if log.reconnect_failures > 0 {
            log.reconnect_failures -= 1;
            return Err(TransportError::Io("broker unreachable".to_string()));
        }
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.log().disconnects += 1;
        Ok(())
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<MessageId, TransportError> {
        let mut log = self.log();
        if log.fail_subscribe {
            return Err(TransportError::NotConnected);
        }
        log.subscribes.push((topic.to_string(), qos));
        Ok(log.next_id())
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<MessageId, TransportError> {
        let mut log = self.log();
        log.unsubscribes.push(topic.to_string());
        Ok(log.next_id())
    }

    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<MessageId, TransportError> {
        let mut log = self.log();
        log.publishes.push((
            topic.to_string(),
            String::from_utf8_lossy(payload).to_string(),
            qos,
            retain,
        ));
        Ok(log.next_id())
    }
}

fn fast_settings() -> MqttSettings {
    let mut settings = Settings::default().mqtt;
    settings.reconnect_base_delay_ms = 1;
    settings.reconnect_max_delay_ms = 8;
    settings
}

fn connected_client(
    settings: &MqttSettings,
) -> (
    MqttClient<MockTransport>,
    mpsc::UnboundedReceiver<MqttEvent>,
    MockTransport,
) {
    let transport = MockTransport::default();
    let (client, events) = MqttClient::new(transport.clone(), settings).unwrap();
    client.start().unwrap();
    client.on_connect(0).unwrap();
    (client, events, transport)
}

fn recorder() -> (
    impl Fn(MqttMessage) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<MqttMessage>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback = move |msg: MqttMessage| {
        let _ = tx.send(msg);
    };
    (callback, rx)
}

async fn expect_message(rx: &mut mpsc::UnboundedReceiver<MqttMessage>) -> MqttMessage {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("callback was not invoked")
        .expect("channel closed")
}

async fn expect_silence(rx: &mut mpsc::UnboundedReceiver<MqttMessage>) {
    let res = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
    assert!(res.is_err(), "unexpected callback invocation: {res:?}");
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

// ---- topic matching ----

#[test]
fn test_literal_patterns_match_only_equal_topics() {
    let cases = ["test-topic", "a/b/c", "home/sensor", "a//b", "/leading"];
    for pattern in cases {
        for topic in cases {
            assert_eq!(topic_matches(pattern, topic), pattern == topic);
        }
    }
}

#[test]
fn test_single_level_wildcard() {
    assert!(topic_matches("a/+/c", "a/b/c"));
    assert!(!topic_matches("a/+/c", "a/b/b/c"));
    assert!(topic_matches("test-topic/+/on", "test-topic/bier/on"));
    assert!(!topic_matches("test-topic/+/on", "test-topic/bier"));
    assert!(topic_matches("+", "a"));
    assert!(!topic_matches("+", "a/b"));
}

#[test]
fn test_multi_level_wildcard() {
    assert!(topic_matches("a/#", "a"));
    assert!(topic_matches("a/#", "a/b/c"));
    assert!(!topic_matches("b/#", "a/b/c"));
    assert!(topic_matches("test-topic/#", "test-topic"));
    assert!(!topic_matches("test-topic/#", "another-test-topic"));
    assert!(topic_matches("#", "any/topic/at/all"));
    assert!(topic_matches("a/+/#", "a/b"));
}

#[test]
fn test_pattern_parse_rejects_malformed_filters() {
    assert_eq!(TopicPattern::parse(""), Err(TopicError::Empty));
    assert_eq!(
        TopicPattern::parse("a/#/c"),
        Err(TopicError::MultiLevelNotLast)
    );
    assert!(matches!(
        TopicPattern::parse("a/b#"),
        Err(TopicError::MisplacedWildcard { wildcard: '#', .. })
    ));
    assert!(matches!(
        TopicPattern::parse("a/b+/c"),
        Err(TopicError::MisplacedWildcard { wildcard: '+', .. })
    ));
    assert_eq!(
        validate_subscribe_topic("bad\0one"),
        Err(TopicError::NullCharacter)
    );
    assert!(matches!(
        validate_subscribe_topic(&"a".repeat(65_536)),
        Err(TopicError::TooLong(65_536))
    ));
    assert!(!topic_matches("a/#/c", "a/b/c"));
}

#[test]
fn test_publish_topic_validation() {
    assert!(validate_publish_topic("test/topic").is_ok());
    assert!(matches!(
        validate_publish_topic("bad+topic"),
        Err(TopicError::WildcardInPublish(_))
    ));
    assert!(validate_publish_topic("a/#").is_err());
    assert!(validate_publish_topic("").is_err());
}

#[test]
fn test_pattern_reports_wildcards() {
    let pattern: TopicPattern = "home/+/temperature".parse().unwrap();
    assert!(pattern.has_wildcards());
    assert_eq!(pattern.segments().len(), 3);
    assert_eq!(pattern.to_string(), "home/+/temperature");
    assert!(!TopicPattern::parse("home/kitchen").unwrap().has_wildcards());
}

// ---- backoff ----

#[test]
fn test_backoff_doubles_and_caps() {
    let mut backoff = ReconnectBackoff::new(Duration::from_secs(1), Duration::from_secs(8));
    let delays: Vec<u64> = (0..6).map(|_| backoff.next_delay().as_secs()).collect();
    assert_eq!(delays, vec![1, 2, 4, 8, 8, 8]);
}

#[test]
fn test_backoff_reset_returns_to_base() {
    let mut backoff = ReconnectBackoff::default();
    for _ in 0..4 {
        backoff.next_delay();
    }
    assert_eq!(backoff.current_delay(), Duration::from_secs(16));
    backoff.reset();
    assert_eq!(backoff.attempts(), 0);
    assert_eq!(backoff.next_delay(), Duration::from_secs(1));
}

#[test]
fn test_backoff_default_cap_after_many_failures() {
    let mut backoff = ReconnectBackoff::default();
    for _ in 0..64 {
        backoff.next_delay();
    }
    assert_eq!(backoff.next_delay(), ReconnectBackoff::DEFAULT_MAX);
}

// ---- router ----

fn noop() -> Arc<dyn Fn(MqttMessage) + Send + Sync> {
    Arc::new(|_| {})
}

#[test]
fn test_router_shared_pattern_needs_one_network_subscribe() {
    let mut router = TopicRouter::new();
    let first = router.subscribe("a/+/c", QoS::AtMostOnce, noop()).unwrap();
    let second = router.subscribe("a/+/c", QoS::AtMostOnce, noop()).unwrap();

    assert!(first.is_new);
    assert!(!second.is_new);
    assert_eq!(router.len(), 1);
    assert_eq!(router.subscription("a/+/c").unwrap().callback_count(), 2);
    assert_eq!(router.dispatch("a/b/c").len(), 2);
    assert!(router.dispatch("a/b/b/c").is_empty());
}

#[test]
fn test_router_rejects_invalid_pattern() {
    let mut router = TopicRouter::new();
    let res = router.subscribe("a/#/b", QoS::AtMostOnce, noop());
    assert!(res.is_err());
    assert!(router.is_empty());
}

#[test]
fn test_router_last_unsubscribe_drops_subscription() {
    let mut router = TopicRouter::new();
    let first = router.subscribe("test/topic", QoS::AtLeastOnce, noop()).unwrap();
    let second = router.subscribe("test/topic", QoS::AtLeastOnce, noop()).unwrap();
    router.mark_pending("test/topic", 7);

    assert_eq!(router.unsubscribe(&first.handle), None);
    assert!(router.contains("test/topic"));
    assert_eq!(router.pending_count(), 1);

    assert_eq!(router.unsubscribe(&second.handle), Some("test/topic".to_string()));
    assert!(!router.contains("test/topic"));
    assert_eq!(router.pending_count(), 0);
    assert_eq!(router.unsubscribe(&second.handle), None);
}

#[test]
fn test_router_ack_activates_pending_subscription() {
    let mut router = TopicRouter::new();
    router.subscribe("home/sensor", QoS::ExactlyOnce, noop()).unwrap();
    assert_eq!(
        router.subscription("home/sensor").unwrap().state,
        SubscriptionState::Unsent
    );

    router.mark_pending("home/sensor", 3);
    assert_eq!(
        router.subscription("home/sensor").unwrap().state,
        SubscriptionState::Pending(3)
    );

    assert_eq!(router.on_subscribe_ack(3, QoS::AtLeastOnce), Some("home/sensor"));
    assert_eq!(
        router.subscription("home/sensor").unwrap().state,
        SubscriptionState::Active(QoS::AtLeastOnce)
    );
    assert_eq!(router.on_subscribe_ack(3, QoS::AtLeastOnce), None);
}

#[test]
fn test_router_resubscribe_requests_cover_every_pattern_once() {
    let mut router = TopicRouter::new();
    router.subscribe("topic/test", QoS::AtLeastOnce, noop()).unwrap();
    router.subscribe("home/sensor", QoS::ExactlyOnce, noop()).unwrap();
    router.subscribe("home/sensor", QoS::ExactlyOnce, noop()).unwrap();
    router.subscribe("still/pending", QoS::AtMostOnce, noop()).unwrap();
    router.mark_pending("topic/test", 1);
    router.on_subscribe_ack(1, QoS::AtLeastOnce);
    router.mark_pending("still/pending", 2);

    let requests = router.resubscribe_requests();
    assert_eq!(
        requests,
        vec![
            ("home/sensor".to_string(), QoS::ExactlyOnce),
            ("still/pending".to_string(), QoS::AtMostOnce),
            ("topic/test".to_string(), QoS::AtLeastOnce),
        ]
    );
    assert_eq!(router.pending_count(), 0);
    assert_eq!(
        router.subscription("topic/test").unwrap().state,
        SubscriptionState::Unsent
    );
}

#[test]
fn test_router_rejected_subscription_goes_back_to_unsent() {
    let mut router = TopicRouter::new();
    router.subscribe("denied/#", QoS::AtMostOnce, noop()).unwrap();
    router.mark_pending("denied/#", 9);

    assert_eq!(router.on_subscribe_rejected(9), Some("denied/#".to_string()));
    assert_eq!(
        router.subscription("denied/#").unwrap().state,
        SubscriptionState::Unsent
    );
}

// ---- service data ----

#[test]
fn test_publish_request_coerces_ascii_qos_and_retain() {
    let request = PublishRequest::from_service_data(&json!({
        "topic": "test/topic",
        "payload": "",
        "qos": "2",
        "retain": "no",
    }))
    .unwrap();

    assert_eq!(request.topic, "test/topic");
    assert_eq!(request.payload, "");
    assert_eq!(request.qos, QoS::ExactlyOnce);
    assert!(!request.retain);
}

#[test]
fn test_publish_request_defaults() {
    let request = PublishRequest::from_service_data(&json!({"topic": "a"})).unwrap();
    assert_eq!(request.qos, QoS::AtMostOnce);
    assert!(!request.retain);
    assert_eq!(request.payload, "");
}

#[test]
fn test_publish_request_rejects_bad_values() {
    assert!(PublishRequest::from_service_data(&json!({"payload": "x"})).is_err());
    assert!(PublishRequest::from_service_data(&json!({"topic": "a", "qos": 3})).is_err());
    assert!(PublishRequest::from_service_data(&json!({"topic": "a", "qos": "high"})).is_err());
    assert!(PublishRequest::from_service_data(&json!({"topic": "a", "retain": "maybe"})).is_err());
}

#[test]
fn test_publish_request_stringifies_non_text_payloads() {
    let payload = |value: Value| {
        PublishRequest::from_service_data(&json!({"topic": "a", "payload": value}))
            .unwrap()
            .payload
    };
    assert_eq!(payload(json!(5)), "5");
    assert_eq!(payload(json!(2.5)), "2.5");
    assert_eq!(payload(json!(true)), "true");
    assert_eq!(payload(json!({"on": 1})), r#"{"on":1}"#);
    assert_eq!(payload(json!("as is")), "as is");
}

#[test]
fn test_publish_request_rejects_unknown_keys() {
    let res = PublishRequest::from_service_data(&json!({
        "topic": "a",
        "payload": "x",
        "colour": "red",
    }));
    assert!(matches!(res, Err(MqttError::ServiceData(_))));
}

// ---- client ----

#[test]
fn test_client_requires_runtime() {
    let res = MqttClient::new(MockTransport::default(), &fast_settings());
    assert!(matches!(res, Err(MqttError::NoRuntime)));
}

#[tokio::test]
async fn test_start_connects_transport() {
    let (client, _events, transport) = connected_client(&fast_settings());
    assert_eq!(transport.log().connects, 1);
    assert_eq!(client.connection_state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_start_failure_is_setup_error_without_retry() {
    let transport = MockTransport::default();
    transport.log().fail_connect = true;
    let (client, _events) = MqttClient::new(transport.clone(), &fast_settings()).unwrap();

    let res = client.start();
    assert!(matches!(res, Err(MqttError::Setup(_))));
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(transport.log().connects, 1);
    assert_eq!(transport.log().reconnects, 0);
}

#[tokio::test]
async fn test_subscribe_topic_delivers_and_unsubscribe_stops() {
    let (client, _events, transport) = connected_client(&fast_settings());
    let (callback, mut rx) = recorder();

    let handle = client
        .subscribe("test-topic", QoS::AtMostOnce, callback)
        .unwrap();
    assert_eq!(
        transport.log().subscribes,
        vec![("test-topic".to_string(), QoS::AtMostOnce)]
    );

    client.on_message("test-topic", b"test-payload", 0);
    let msg = expect_message(&mut rx).await;
    assert_eq!(msg.topic, "test-topic");
    assert_eq!(msg.payload, "test-payload");

    client.unsubscribe(&handle);
    assert_eq!(transport.log().unsubscribes, vec!["test-topic".to_string()]);
    assert_eq!(client.subscription_count(), 0);

    client.on_message("test-topic", b"test-payload", 0);
    expect_silence(&mut rx).await;
}

#[tokio::test]
async fn test_subscribe_topic_not_match() {
    let (client, _events, _transport) = connected_client(&fast_settings());
    let (callback, mut rx) = recorder();
    client
        .subscribe("test-topic", QoS::AtMostOnce, callback)
        .unwrap();

    client.on_message("another-test-topic", b"test-payload", 0);
    expect_silence(&mut rx).await;
}

#[tokio::test]
async fn test_subscribe_wildcards_deliver_concrete_topic() {
    let (client, _events, _transport) = connected_client(&fast_settings());
    let (level_cb, mut level_rx) = recorder();
    let (tree_cb, mut tree_rx) = recorder();
    client
        .subscribe("test-topic/+/on", QoS::AtMostOnce, level_cb)
        .unwrap();
    client
        .subscribe("test-topic/#", QoS::AtMostOnce, tree_cb)
        .unwrap();

    client.on_message("test-topic/bier/on", b"test-payload", 0);
    assert_eq!(expect_message(&mut level_rx).await.topic, "test-topic/bier/on");
    assert_eq!(expect_message(&mut tree_rx).await.topic, "test-topic/bier/on");

    client.on_message("test-topic", b"root", 0);
    assert_eq!(expect_message(&mut tree_rx).await.payload, "root");
    expect_silence(&mut level_rx).await;
}

#[tokio::test]
async fn test_shared_pattern_invokes_each_callback_once() {
    let (client, _events, transport) = connected_client(&fast_settings());
    let (first, mut first_rx) = recorder();
    let (second, mut second_rx) = recorder();

    let first_handle = client.subscribe("a/+/c", QoS::AtLeastOnce, first).unwrap();
    client.subscribe("a/+/c", QoS::AtLeastOnce, second).unwrap();
    assert_eq!(transport.log().subscribes.len(), 1);

    client.on_message("a/b/c", b"one", 1);
    assert_eq!(expect_message(&mut first_rx).await.payload, "one");
    assert_eq!(expect_message(&mut second_rx).await.payload, "one");
    expect_silence(&mut first_rx).await;
    expect_silence(&mut second_rx).await;

    client.unsubscribe(&first_handle);
    assert!(transport.log().unsubscribes.is_empty());

    client.on_message("a/x/c", b"two", 1);
    assert_eq!(expect_message(&mut second_rx).await.payload, "two");
    expect_silence(&mut first_rx).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_callback_does_not_delay_others() {
    let (client, _events, _transport) = connected_client(&fast_settings());
    let (fast, mut fast_rx) = recorder();
    client
        .subscribe("slow/topic", QoS::AtMostOnce, |_| {
            std::thread::sleep(Duration::from_millis(300));
        })
        .unwrap();
    client.subscribe("slow/#", QoS::AtMostOnce, fast).unwrap();

    let started = std::time::Instant::now();
    client.on_message("slow/topic", b"x", 0);
    assert!(started.elapsed() < Duration::from_millis(100));
    expect_message(&mut fast_rx).await;
}

#[tokio::test]
async fn test_receiving_message_emits_hub_event() {
    let (client, mut events, _transport) = connected_client(&fast_settings());

    client.on_message("test_topic", "Hello World!".as_bytes(), 1);

    match events.recv().await.unwrap() {
        MqttEvent::MessageReceived(msg) => {
            assert_eq!(msg.topic, "test_topic");
            assert_eq!(msg.payload, "Hello World!");
            assert_eq!(msg.qos, QoS::AtLeastOnce);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_non_utf8_payload_is_reported_not_delivered() {
    let (client, mut events, _transport) = connected_client(&fast_settings());
    let (callback, mut rx) = recorder();
    client
        .subscribe("test_topic", QoS::AtMostOnce, callback)
        .unwrap();

    client.on_message("test_topic", &[0x9a], 1);

    assert_eq!(
        events.recv().await.unwrap(),
        MqttEvent::DecodeError {
            topic: "test_topic".to_string(),
            payload: vec![0x9a],
            qos: 1,
        }
    );
    expect_silence(&mut rx).await;
}

#[tokio::test]
async fn test_messages_dropped_while_disconnected() {
    let (client, mut events, _transport) = connected_client(&fast_settings());
    let (callback, mut rx) = recorder();
    client.subscribe("a/#", QoS::AtMostOnce, callback).unwrap();

    client.on_disconnect(0);
    client.on_message("a/b", b"late", 0);

    expect_silence(&mut rx).await;
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_subscribe_before_connect_is_sent_on_connect() {
    let transport = MockTransport::default();
    let (client, _events) = MqttClient::new(transport.clone(), &fast_settings()).unwrap();
    client.start().unwrap();

    client.subscribe("early/topic", QoS::AtLeastOnce, |_| {}).unwrap();
    assert!(transport.log().subscribes.is_empty());
    assert_eq!(
        client.subscription_state("early/topic"),
        Some(SubscriptionState::Unsent)
    );

    client.on_connect(0).unwrap();
    assert_eq!(
        transport.log().subscribes,
        vec![("early/topic".to_string(), QoS::AtLeastOnce)]
    );
    assert_eq!(
        client.subscription_state("early/topic"),
        Some(SubscriptionState::Pending(1))
    );

    client.on_subscribe(1, 1);
    assert_eq!(
        client.subscription_state("early/topic"),
        Some(SubscriptionState::Active(QoS::AtLeastOnce))
    );
}

#[tokio::test]
async fn test_subscribe_rejects_invalid_pattern() {
    let (client, _events, transport) = connected_client(&fast_settings());
    let res = client.subscribe("bad/#/pattern", QoS::AtMostOnce, |_| {});
    assert!(matches!(res, Err(MqttError::Topic(TopicError::MultiLevelNotLast))));
    assert!(transport.log().subscribes.is_empty());
}

#[tokio::test]
async fn test_refused_subscription_is_unsent() {
    let (client, _events, _transport) = connected_client(&fast_settings());
    client.subscribe("denied/topic", QoS::AtMostOnce, |_| {}).unwrap();
    client.on_subscribe(1, 0x80);
    assert_eq!(
        client.subscription_state("denied/topic"),
        Some(SubscriptionState::Unsent)
    );
}

#[tokio::test]
async fn test_failed_connection_results_in_disconnect() {
    let (client, _events, transport) = connected_client(&fast_settings());
    for result_code in 1..6 {
        let res = client.on_connect(result_code);
        assert!(matches!(
            res,
            Err(MqttError::Transport(TransportError::ConnectionRefused(code)))
                if code == ConnectReturnCode::from(result_code)
        ));
        assert_eq!(transport.log().disconnects, result_code as usize);
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    }
}

#[tokio::test]
async fn test_disconnect_tries_no_reconnect_on_stop() {
    let (client, _events, transport) = connected_client(&fast_settings());
    client.on_disconnect(0);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(transport.log().reconnects, 0);
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_disconnect_tries_reconnect_with_backoff() {
    let (client, _events, transport) = connected_client(&fast_settings());
    transport.log().reconnect_failures = 3;

    client.on_disconnect(1);
    assert_eq!(client.connection_state(), ConnectionState::Reconnecting);

    let log = transport.clone();
    wait_for(move || log.log().reconnects == 4).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.log().reconnects, 4);
    assert_eq!(client.connection_state(), ConnectionState::Connecting);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_attempts_wait_doubling_delays() {
    let (client, _events, transport) = connected_client(&fast_settings());
    transport.log().reconnect_failures = 3;

    let lost_at = tokio::time::Instant::now();
    client.on_disconnect(1);
    let log = transport.clone();
    wait_for(move || log.log().reconnects == 4).await;

    let times = transport.log().reconnect_times.clone();
    let mut previous = lost_at;
    let delays: Vec<Duration> = times
        .iter()
        .map(|&at| {
            let delay = at - previous;
            previous = at;
            delay
        })
        .collect();
    assert_eq!(delays, [1, 2, 4, 8].map(Duration::from_millis).to_vec());
}

#[tokio::test(start_paused = true)]
async fn test_successful_reconnect_resets_delay() {
    let (client, _events, transport) = connected_client(&fast_settings());
    transport.log().reconnect_failures = 2;
    client.on_disconnect(1);
    let log = transport.clone();
    wait_for(move || log.log().reconnects == 3).await;
    client.on_connect(0).unwrap();

    let lost_again = tokio::time::Instant::now();
    client.on_disconnect(1);
    let log = transport.clone();
    wait_for(move || log.log().reconnects == 4).await;

    let last = *transport.log().reconnect_times.last().unwrap();
    assert_eq!(last - lost_again, Duration::from_millis(1));
}

#[tokio::test]
async fn test_stop_cancels_scheduled_reconnect() {
    let mut settings = fast_settings();
    settings.reconnect_base_delay_ms = 100;
    settings.reconnect_max_delay_ms = 100;
    let (client, _events, transport) = connected_client(&settings);

    client.on_disconnect(1);
    client.stop();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(transport.log().reconnects, 0);
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_reconnect_resubscribes_every_pattern_once() {
    let (client, _events, transport) = connected_client(&fast_settings());
    let (topic_cb, mut topic_rx) = recorder();
    let (sensor_cb, mut sensor_rx) = recorder();

    client
        .subscribe("topic/test", QoS::AtLeastOnce, topic_cb)
        .unwrap();
    client
        .subscribe("home/sensor", QoS::ExactlyOnce, sensor_cb)
        .unwrap();
    client.subscribe("home/sensor", QoS::ExactlyOnce, |_| {}).unwrap();
    client.on_subscribe(1, 1);

    client.on_disconnect(1);
    let log = transport.clone();
    wait_for(move || log.log().reconnects == 1).await;
    client.on_connect(0).unwrap();

    let subscribes = transport.log().subscribes.clone();
    assert_eq!(
        subscribes[2..],
        [
            ("home/sensor".to_string(), QoS::ExactlyOnce),
            ("topic/test".to_string(), QoS::AtLeastOnce),
        ]
    );
    assert_eq!(client.subscription_count(), 2);
    assert!(matches!(
        client.subscription_state("topic/test"),
        Some(SubscriptionState::Pending(_))
    ));

    client.on_message("topic/test", b"back", 1);
    client.on_message("home/sensor", b"again", 2);
    assert_eq!(expect_message(&mut topic_rx).await.payload, "back");
    assert_eq!(expect_message(&mut sensor_rx).await.payload, "again");
    expect_silence(&mut topic_rx).await;
}

#[tokio::test]
async fn test_failed_resubscribe_waits_for_next_reconnect() {
    let (client, _events, transport) = connected_client(&fast_settings());
    client.subscribe("flaky/topic", QoS::AtMostOnce, |_| {}).unwrap();

    client.on_disconnect(1);
    transport.log().fail_subscribe = true;
    client.on_connect(0).unwrap();
    assert_eq!(
        client.subscription_state("flaky/topic"),
        Some(SubscriptionState::Unsent)
    );

    transport.log().fail_subscribe = false;
    client.on_disconnect(1);
    client.on_connect(0).unwrap();
    assert!(matches!(
        client.subscription_state("flaky/topic"),
        Some(SubscriptionState::Pending(_))
    ));
}

#[tokio::test]
async fn test_birth_message_published_on_connect() {
    let mut settings = fast_settings();
    settings.birth_message = Some(BirthMessage {
        topic: "birth".to_string(),
        payload: "birth".to_string(),
        qos: 0,
        retain: false,
    });
    let (_client, _events, transport) = connected_client(&settings);

    let publishes = transport.log().publishes.clone();
    assert_eq!(
        publishes.last(),
        Some(&(
            "birth".to_string(),
            "birth".to_string(),
            QoS::AtMostOnce,
            false
        ))
    );
}

#[tokio::test]
async fn test_publish_validates_topic() {
    let (client, _events, transport) = connected_client(&fast_settings());

    let res = client.publish("bad+topic", "x", QoS::AtMostOnce, false);
    assert!(matches!(res, Err(MqttError::Topic(_))));
    assert!(transport.log().publishes.is_empty());

    client
        .publish("test-topic", "test-payload", QoS::AtLeastOnce, true)
        .unwrap();
    assert_eq!(
        transport.log().publishes,
        vec![(
            "test-topic".to_string(),
            "test-payload".to_string(),
            QoS::AtLeastOnce,
            true
        )]
    );
}

#[tokio::test]
async fn test_publish_service_with_ascii_qos_retain_flags() {
    let (client, _events, transport) = connected_client(&fast_settings());

    client
        .publish_service(&json!({
            "topic": "test/topic",
            "payload": "",
            "qos": "2",
            "retain": "no",
        }))
        .unwrap();

    assert_eq!(
        transport.log().publishes,
        vec![("test/topic".to_string(), String::new(), QoS::ExactlyOnce, false)]
    );
}

#[tokio::test]
async fn test_publish_service_with_payload_and_template_does_not_publish() {
    let (client, _events, transport) = connected_client(&fast_settings());

    let res = client.publish_service(&json!({
        "topic": "test/topic",
        "payload": "not a template",
        "payload_template": "a template",
    }));
    assert!(matches!(res, Err(MqttError::ServiceData(_))));
    assert!(transport.log().publishes.is_empty());
}

#[tokio::test]
async fn test_publish_service_with_template_only_does_not_publish_empty_payload() {
    let (client, _events, transport) = connected_client(&fast_settings());

    let res = client.publish_service(&json!({
        "topic": "test/topic",
        "payload_template": "{{ 1+1 }}",
    }));
    assert!(matches!(res, Err(MqttError::ServiceData(_))));
    assert!(transport.log().publishes.is_empty());
}

#[tokio::test]
async fn test_publish_service_without_topic_does_not_publish() {
    let (client, _events, transport) = connected_client(&fast_settings());

    let res = client.publish_service(&json!({"payload": "orphan"}));
    assert!(matches!(res, Err(MqttError::ServiceData(_))));
    assert!(transport.log().publishes.is_empty());
}

#[tokio::test]
async fn test_stop_disconnects_transport() {
    let (client, _events, transport) = connected_client(&fast_settings());
    client.stop();
    assert_eq!(transport.log().disconnects, 1);
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);

    // the transport reports the disconnect it was asked for
    client.on_disconnect(0);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.log().reconnects, 0);
}
