//! MQTT client component
//!
//! `MqttClient` is the hub-facing side of the bridge. It owns one transport,
//! one topic router and the reconnect state, and it reports every inbound
//! message to the hub through an event channel.
//!
//! Concurrency and usage notes:
//! - All state lives behind a single `std::sync::Mutex`. Subscribe,
//!   unsubscribe and the re-subscribe after a reconnect are serialized by it.
//! - The lock is never held across an await and never while a subscriber
//!   callback runs. Dispatch clones the matching callbacks out first and then
//!   spawns each on the runtime.
//! - The reconnect loop is a background task. It sleeps between attempts with
//!   `tokio::time::sleep` and is aborted by an intentional `stop`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{BirthMessage, MqttSettings};
use crate::mqtt::backoff::ReconnectBackoff;
use crate::mqtt::message::{ConnectReturnCode, MessageId, MqttEvent, MqttMessage, QoS};
use crate::mqtt::router::{SubscriptionHandle, SubscriptionState, TopicRouter};
use crate::mqtt::service::PublishRequest;
use crate::mqtt::topic::validate_publish_topic;
use crate::mqtt::transport::Transport;
use crate::utils::error::{MqttError, TransportError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

struct ClientState<T> {
    transport: T,
    router: TopicRouter,
    backoff: ReconnectBackoff,
    connection: ConnectionState,
    shutting_down: bool,
    reconnect_task: Option<JoinHandle<()>>,
}

pub struct MqttClient<T: Transport> {
    shared: Arc<Mutex<ClientState<T>>>,
    events: UnboundedSender<MqttEvent>,
    runtime: Handle,
    birth_message: Option<BirthMessage>,
}

impl<T: Transport> Clone for MqttClient<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            events: self.events.clone(),
            runtime: self.runtime.clone(),
            birth_message: self.birth_message.clone(),
        }
    }
}

fn lock_state<T>(shared: &Mutex<ClientState<T>>) -> MutexGuard<'_, ClientState<T>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Transport> MqttClient<T> {
    /// Create a client around `transport`. Must be called from within a tokio
    /// runtime; callbacks and the reconnect loop are spawned on it.
    ///
    /// Returns the receiving end of the hub event channel alongside the client.
    pub fn new(
        transport: T,
        settings: &MqttSettings,
    ) -> Result<(Self, UnboundedReceiver<MqttEvent>), MqttError> {
        let runtime = Handle::try_current().map_err(|_| MqttError::NoRuntime)?;
        let (events, receiver) = mpsc::unbounded_channel();
        let backoff = ReconnectBackoff::new(
            Duration::from_millis(settings.reconnect_base_delay_ms),
            Duration::from_millis(settings.reconnect_max_delay_ms),
        );

        let state = ClientState {
            transport,
            router: TopicRouter::new(),
            backoff,
            connection: ConnectionState::Disconnected,
            shutting_down: false,
            reconnect_task: None,
        };

        let client = Self {
            shared: Arc::new(Mutex::new(state)),
            events,
            runtime,
            birth_message: settings.birth_message.clone(),
        };
        Ok((client, receiver))
    }

    fn lock(&self) -> MutexGuard<'_, ClientState<T>> {
        lock_state(&self.shared)
    }

    /// Open the broker connection. A failure here is a setup failure and is
    /// not retried.
    pub fn start(&self) -> Result<(), MqttError> {
        let mut state = self.lock();
        state.shutting_down = false;
        state.connection = ConnectionState::Connecting;

        if let Err(e) = state.transport.connect() {
            state.connection = ConnectionState::Disconnected;
            error!(error = %e, "Unable to connect to the MQTT broker");
            return Err(MqttError::Setup(e));
        }

        info!("Connecting to the MQTT broker");
        Ok(())
    }

    /// Intentional shutdown. Cancels any scheduled reconnect.
    pub fn stop(&self) {
        let mut state = self.lock();
        state.shutting_down = true;
        if let Some(task) = state.reconnect_task.take() {
            task.abort();
        }
        state.router.reset();
        state.connection = ConnectionState::Disconnected;

        if let Err(e) = state.transport.disconnect() {
            warn!(error = %e, "Error while disconnecting from the MQTT broker");
        }
        info!("MQTT client stopped");
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.lock().connection
    }

    pub fn subscription_state(&self, pattern: &str) -> Option<SubscriptionState> {
        self.lock().router.subscription(pattern).map(|s| s.state)
    }

    pub fn subscription_count(&self) -> usize {
        self.lock().router.len()
    }

    /// Register `callback` for every message matching `pattern`.
    ///
    /// The callback is live immediately. A filter that was not subscribed
    /// before is requested from the broker when connected, otherwise on the
    /// next connect.
    pub fn subscribe<F>(
        &self,
        pattern: &str,
        qos: QoS,
        callback: F,
    ) -> Result<SubscriptionHandle, MqttError>
    where
        F: Fn(MqttMessage) + Send + Sync + 'static,
    {
        let mut state = self.lock();
        let registration = state.router.subscribe(pattern, qos, Arc::new(callback))?;

        if registration.is_new && state.connection == ConnectionState::Connected {
            match state.transport.subscribe(pattern, qos) {
                Ok(message_id) => state.router.mark_pending(pattern, message_id),
                Err(e) => warn!(
                    pattern,
                    error = %e,
                    "Subscribe request failed, retrying after reconnect"
                ),
            }
        }

        debug!(pattern, id = %registration.handle.id(), "Callback registered");
        Ok(registration.handle)
    }

    /// Remove one callback. The broker subscription is dropped with the last one.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        let mut state = self.lock();
        let Some(pattern) = state.router.unsubscribe(handle) else {
            return;
        };

        if state.connection == ConnectionState::Connected {
            if let Err(e) = state.transport.unsubscribe(&pattern) {
                warn!(pattern = %pattern, error = %e, "Unsubscribe request failed");
            }
        }
        debug!(pattern = %pattern, "Subscription removed");
    }

    pub fn publish(
        &self,
        topic: &str,
        payload: &str,
        qos: QoS,
        retain: bool,
    ) -> Result<MessageId, MqttError> {
        validate_publish_topic(topic)?;
        let mut state = self.lock();
        let message_id = state
            .transport
            .publish(topic, payload.as_bytes(), qos, retain)?;
        Ok(message_id)
    }

    /// Handle a call to the `mqtt.publish` service.
    pub fn publish_service(&self, data: &Value) -> Result<MessageId, MqttError> {
        let request = PublishRequest::from_service_data(data).inspect_err(|e| {
            error!(error = %e, "Invalid publish service call");
        })?;
        self.publish(&request.topic, &request.payload, request.qos, request.retain)
    }

    /// CONNACK received. A refused connection is disconnected and reported
    /// back as `TransportError::ConnectionRefused`.
    pub fn on_connect(&self, result_code: u8) -> Result<(), MqttError> {
        let code = ConnectReturnCode::from(result_code);
        let mut state = self.lock();

        if code != ConnectReturnCode::Accepted {
            error!(result_code, "Unable to connect to the MQTT broker: {code}");
            state.connection = ConnectionState::Disconnected;
            if let Err(e) = state.transport.disconnect() {
                warn!(error = %e, "Error while disconnecting from the MQTT broker");
            }
            return Err(TransportError::ConnectionRefused(code).into());
        }

        info!("Connected to the MQTT broker");
        state.connection = ConnectionState::Connected;
        state.backoff.reset();
        if let Some(task) = state.reconnect_task.take() {
            task.abort();
        }

        for (pattern, qos) in state.router.resubscribe_requests() {
            match state.transport.subscribe(&pattern, qos) {
                Ok(message_id) => state.router.mark_pending(&pattern, message_id),
                Err(e) => warn!(pattern = %pattern, error = %e, "Re-subscribe failed"),
            }
        }

        if let Some(birth) = &self.birth_message {
            let published = QoS::try_from(birth.qos).and_then(|qos| {
                validate_publish_topic(&birth.topic)?;
                state
                    .transport
                    .publish(&birth.topic, birth.payload.as_bytes(), qos, birth.retain)
                    .map_err(MqttError::from)
            });
            if let Err(e) = published {
                error!(topic = %birth.topic, error = %e, "Unable to publish birth message");
            }
        }
        Ok(())
    }

    /// Connection to the broker went away. Result code 0 means the
    /// disconnect was requested.
    pub fn on_disconnect(&self, result_code: u8) {
        let mut state = self.lock();
        state.router.reset();

        if result_code == 0 || state.shutting_down {
            state.connection = ConnectionState::Disconnected;
            info!("Disconnected from the MQTT broker");
            return;
        }

        warn!(result_code, "Lost connection to the MQTT broker");
        state.connection = ConnectionState::Reconnecting;

        if state
            .reconnect_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
        {
            debug!("Reconnect already scheduled");
            return;
        }
        let shared = Arc::clone(&self.shared);
        state.reconnect_task = Some(self.runtime.spawn(reconnect_loop(shared)));
    }

    /// A message arrived from the broker.
    pub fn on_message(&self, topic: &str, payload: &[u8], qos: u8) {
        let text = match std::str::from_utf8(payload) {
            Ok(text) => text.to_string(),
            Err(_) => {
                error!("Illegal utf-8 unicode payload from MQTT topic: {topic}, Payload: {payload:?}");
                self.emit(MqttEvent::DecodeError {
                    topic: topic.to_string(),
                    payload: payload.to_vec(),
                    qos,
                });
                return;
            }
        };

        let qos = match QoS::try_from(qos) {
            Ok(qos) => qos,
            Err(e) => {
                error!(topic, error = %e, "Dropping message");
                return;
            }
        };

        let callbacks = {
            let state = self.lock();
            if state.connection != ConnectionState::Connected {
                debug!(topic, "Not connected, dropping message");
                return;
            }
            state.router.dispatch(topic)
        };

        let message = MqttMessage {
            topic: topic.to_string(),
            payload: text,
            qos,
            timestamp: Utc::now().timestamp_millis(),
        };
        self.emit(MqttEvent::MessageReceived(message.clone()));

        for callback in callbacks {
            let message = message.clone();
            self.runtime.spawn(async move { callback(message) });
        }
    }

    /// SUBACK received. A granted value above 2 is a refusal.
    pub fn on_subscribe(&self, message_id: MessageId, granted_qos: u8) {
        let mut state = self.lock();
        match QoS::try_from(granted_qos) {
            Ok(granted) => {
                if let Some(pattern) = state.router.on_subscribe_ack(message_id, granted) {
                    debug!(pattern, granted = %granted, "Subscription granted");
                }
            }
            Err(_) => {
                if let Some(pattern) = state.router.on_subscribe_rejected(message_id) {
                    warn!(pattern = %pattern, granted_qos, "Broker refused subscription");
                }
            }
        }
    }

    /// UNSUBACK received.
    pub fn on_unsubscribe(&self, message_id: MessageId) {
        debug!(message_id, "Unsubscribe acknowledged");
    }

    fn emit(&self, event: MqttEvent) {
        if self.events.send(event).is_err() {
            debug!("Hub event receiver dropped");
        }
    }
}

async fn reconnect_loop<T: Transport>(shared: Arc<Mutex<ClientState<T>>>) {
    loop {
        let delay = {
            let mut state = lock_state(&shared);
            if state.shutting_down {
                return;
            }
            state.backoff.next_delay()
        };

        info!(delay_ms = delay.as_millis() as u64, "Reconnecting to the MQTT broker");
        tokio::time::sleep(delay).await;

        let reconnected = {
            let mut state = lock_state(&shared);
            if state.shutting_down || state.connection == ConnectionState::Connected {
                return;
            }
            match state.transport.reconnect() {
                Ok(()) => {
                    state.backoff.reset();
                    state.connection = ConnectionState::Connecting;
                    true
                }
                Err(e) => {
                    warn!(error = %e, attempt = state.backoff.attempts(), "Reconnect failed");
                    false
                }
            }
        };

        if reconnected {
            info!("Reconnected to the MQTT broker");
            return;
        }
    }
}
