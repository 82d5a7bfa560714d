//! Error types for every component boundary.
//!
//! Configuration, broker and discovery errors are fatal at startup. Link errors
//! are always recovered by the owning record. Persistence errors are fatal only
//! when writing.

use thiserror::Error;

/// Missing or invalid broker credentials.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("MQTT_HOSTNAME is not set")]
    MissingHostname,

    #[error("MQTT_TOPIC is empty")]
    MissingTopic,

    #[error("Invalid MQTT_PORT '{0}'")]
    InvalidPort(String),
}

/// Broker session failures.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Failed to connect to MQTT broker {host}:{port}: {reason}")]
    Connect { host: String, port: u16, reason: String },

    #[error("MQTT broker refused the connection: {0}")]
    Refused(String),

    #[error("No acknowledgement from MQTT broker after {0} seconds")]
    AckTimeout(u64),

    #[error("Failed to publish to {topic}: {reason}")]
    Publish { topic: String, reason: String },

    #[error("MQTT session ended")]
    SessionEnded,
}

/// Radio failures for a single device. Never fatal to a fleet pass.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("No Bluetooth adapter available")]
    NoAdapter,

    #[error("Device {0} not found")]
    NotFound(String),

    #[error("Device {0} disconnected")]
    Disconnected(String),

    #[error("Device {address} does not expose characteristic {characteristic}")]
    MissingCharacteristic { address: String, characteristic: String },

    #[error("Unexpected power state payload {0:?}")]
    InvalidPayload(Vec<u8>),

    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
}

impl From<btleplug::Error> for LinkError {
    fn from(error: btleplug::Error) -> Self {
        LinkError::Bluetooth(error.to_string())
    }
}

/// Discovery could not produce an inventory.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("No devices found nearby, try restarting your basestations")]
    NoDevices,

    #[error("Scan failed: {0}")]
    Scan(#[from] LinkError),
}

/// Inventory file failures.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed inventory: {0}")]
    Malformed(String),

    #[error("Failed to serialize inventory: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Fatal startup failures.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Bluetooth is unavailable: {0}")]
    Radio(LinkError),
}
