//! Broker transport seam
//!
//! The MQTT protocol itself is handled by an external client library. This
//! trait is the subset of that library the bridge drives. Implementations
//! report inbound traffic by calling the matching `MqttClient::on_*` method
//! from their own network task, never from inside one of these calls.

use crate::mqtt::message::{MessageId, QoS};
use crate::utils::error::TransportError;

pub trait Transport: Send + 'static {
    /// Open the initial connection to the broker.
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Re-open a connection that was lost.
    fn reconnect(&mut self) -> Result<(), TransportError>;

    fn disconnect(&mut self) -> Result<(), TransportError>;

    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<MessageId, TransportError>;

    fn unsubscribe(&mut self, topic: &str) -> Result<MessageId, TransportError>;

    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<MessageId, TransportError>;
}
