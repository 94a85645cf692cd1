//! Topic router
//!
//! The router owns the mapping from subscription filters to the callbacks
//! registered under them and the bookkeeping that ties outstanding broker
//! requests to their filters. It never talks to the network: operations that
//! need a broker round trip tell the caller so, and the caller (the MQTT
//! client) issues the request and reports the outcome back.
//!
//! Concurrency note: the router is not synchronized on its own. The client
//! keeps it behind the same lock as the transport so subscribe, unsubscribe
//! and re-subscribe are serialized.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::mqtt::message::{MessageId, MqttMessage, QoS};
use crate::mqtt::topic::TopicPattern;
use crate::utils::error::TopicError;

pub type SubscriberId = Uuid;

/// Callback invoked with every message whose topic matches the filter it was
/// registered under.
pub type MessageCallback = Arc<dyn Fn(MqttMessage) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Not requested on the current connection yet.
    Unsent,
    /// Requested; waiting for the broker to grant it.
    Pending(MessageId),
    /// Granted by the broker at the given QoS.
    Active(QoS),
}

pub struct Subscription {
    pub pattern: TopicPattern,
    pub qos: QoS,
    pub state: SubscriptionState,
    callbacks: HashMap<SubscriberId, MessageCallback>,
}

impl Subscription {
    fn new(pattern: TopicPattern, qos: QoS) -> Self {
        Self {
            pattern,
            qos,
            state: SubscriptionState::Unsent,
            callbacks: HashMap::new(),
        }
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    pub fn has_subscriber(&self, id: &SubscriberId) -> bool {
        self.callbacks.contains_key(id)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("pattern", &self.pattern.as_str())
            .field("qos", &self.qos)
            .field("state", &self.state)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

/// Identifies one registered callback. Hand it back to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pattern: String,
    id: SubscriberId,
}

impl SubscriptionHandle {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }
}

/// Result of registering a callback.
#[derive(Debug, Clone)]
pub struct Registration {
    pub handle: SubscriptionHandle,
    /// True when the filter was not subscribed before and the broker must be asked.
    pub is_new: bool,
}

#[derive(Debug, Default)]
pub struct TopicRouter {
    subscriptions: HashMap<String, Subscription>,
    pending: HashMap<MessageId, String>,
}

impl TopicRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` under `pattern`. The filter is validated first.
    pub fn subscribe(
        &mut self,
        pattern: &str,
        qos: QoS,
        callback: MessageCallback,
    ) -> Result<Registration, TopicError> {
        let parsed = TopicPattern::parse(pattern)?;
        let is_new = !self.subscriptions.contains_key(pattern);

        let subscription = self
            .subscriptions
            .entry(pattern.to_string())
            .or_insert_with(|| Subscription::new(parsed, qos));

        if !is_new && subscription.qos != qos {
            debug!(
                pattern,
                existing = %subscription.qos,
                requested = %qos,
                "Filter already subscribed, keeping existing QoS"
            );
        }

        let id = Uuid::new_v4();
        subscription.callbacks.insert(id, callback);

        Ok(Registration {
            handle: SubscriptionHandle {
                pattern: pattern.to_string(),
                id,
            },
            is_new,
        })
    }

    /// Remove one callback. Returns the filter when it was the last callback
    /// and the subscription has been dropped, so the caller can unsubscribe
    /// at the broker.
    pub fn unsubscribe(&mut self, handle: &SubscriptionHandle) -> Option<String> {
        let subscription = self.subscriptions.get_mut(&handle.pattern)?;
        if subscription.callbacks.remove(&handle.id).is_none() {
            debug!(pattern = %handle.pattern, id = %handle.id, "Unknown subscriber");
            return None;
        }
        if !subscription.callbacks.is_empty() {
            return None;
        }

        self.subscriptions.remove(&handle.pattern);
        self.pending.retain(|_, pattern| *pattern != handle.pattern);
        Some(handle.pattern.clone())
    }

    /// Record the message id the broker request for `pattern` was sent with.
    pub fn mark_pending(&mut self, pattern: &str, message_id: MessageId) {
        if let Some(subscription) = self.subscriptions.get_mut(pattern) {
            subscription.state = SubscriptionState::Pending(message_id);
            self.pending.insert(message_id, pattern.to_string());
        }
    }

    /// The broker granted the subscribe sent with `message_id`.
    pub fn on_subscribe_ack(&mut self, message_id: MessageId, granted: QoS) -> Option<&str> {
        let Some(pattern) = self.pending.remove(&message_id) else {
            warn!(message_id, "Subscribe acknowledgment for unknown message id");
            return None;
        };

        let subscription = self.subscriptions.get_mut(&pattern)?;
        subscription.state = SubscriptionState::Active(granted);
        Some(subscription.pattern.as_str())
    }

    /// The broker refused the subscribe sent with `message_id`. The filter
    /// stays registered and is requested again after the next reconnect.
    pub fn on_subscribe_rejected(&mut self, message_id: MessageId) -> Option<String> {
        let pattern = self.pending.remove(&message_id)?;
        if let Some(subscription) = self.subscriptions.get_mut(&pattern) {
            subscription.state = SubscriptionState::Unsent;
        }
        Some(pattern)
    }

    /// Snapshot of every callback registered under a filter matching `topic`.
    ///
    /// The callbacks are cloned out so they can be invoked after the caller
    /// releases whatever lock guards the router.
    pub fn dispatch(&self, topic: &str) -> Vec<MessageCallback> {
        self.subscriptions
            .values()
            .filter(|s| s.pattern.matches(topic))
            .flat_map(|s| s.callbacks.values().cloned())
            .collect()
    }

    /// Forget every outstanding broker request. Called when the connection drops.
    pub fn reset(&mut self) {
        self.pending.clear();
        for subscription in self.subscriptions.values_mut() {
            subscription.state = SubscriptionState::Unsent;
        }
    }

    /// Every filter that has to be requested on a fresh connection, with the
    /// QoS it was recorded at. Resets the pending bookkeeping first.
    pub fn resubscribe_requests(&mut self) -> Vec<(String, QoS)> {
        self.reset();
        let mut requests: Vec<(String, QoS)> = self
            .subscriptions
            .iter()
            .map(|(pattern, s)| (pattern.clone(), s.qos))
            .collect();
        requests.sort_by(|a, b| a.0.cmp(&b.0));
        requests
    }

    pub fn subscription(&self, pattern: &str) -> Option<&Subscription> {
        self.subscriptions.get(pattern)
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.subscriptions.contains_key(pattern)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}
