//! Broker collaborator: status publishing, last-will, and the command channel.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::credentials::MqttCredentials;
use crate::error::BrokerError;

pub mod client;
pub mod commands;
pub mod messaging;

#[cfg(test)]
pub mod mock;

pub use client::MqttConnector;
pub use commands::FleetCommand;

/// Publishes retained fleet state below a topic root.
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    /// Publish `payload` on `{root}/{path}`. Never waits on a disconnected
    /// broker: a full outgoing queue is reported as `BrokerError::Publish`.
    async fn publish(&self, path: &str, payload: String, retain: bool) -> Result<(), BrokerError>;

    fn is_connected(&self) -> bool;

    /// Mark the controller as gone and end the session cleanly.
    async fn close(&self) -> Result<(), BrokerError>;
}

/// An acknowledged broker session. `commands` closes when the session ends
/// for good, e.g. the broker refuses a reconnect.
pub struct BrokerSession {
    pub publisher: Arc<dyn StatusPublisher>,
    pub commands: mpsc::Receiver<FleetCommand>,
}

#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Connect, wait for the broker to acknowledge, and publish the
    /// retained `connected` marker.
    async fn connect(&self, credentials: &MqttCredentials) -> Result<BrokerSession, BrokerError>;
}
