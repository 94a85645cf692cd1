//! The `mqtt` module bridges an MQTT broker to the hub.
//!
//! - `topic`: validated topic filters and wildcard matching
//! - `router`: filter → callback mapping and broker request bookkeeping
//! - `backoff`: reconnect delay sequence
//! - `client`: the component wiring router, transport and hub events together
//! - `service`: parsing of `mqtt.publish` service data
//! - `transport`: the seam to the underlying MQTT client library

pub mod backoff;
pub mod client;
pub mod message;
pub mod router;
pub mod service;
pub mod topic;
pub mod transport;

pub use client::{ConnectionState, MqttClient};
pub use message::{MessageId, MqttEvent, MqttMessage, QoS};
pub use router::{SubscriptionHandle, SubscriptionState, TopicRouter};
pub use topic::{TopicPattern, topic_matches};
pub use transport::Transport;

#[cfg(test)]
mod tests;
