//! Outbound topics and fleet status payloads. Everything is published retained.

use tracing::{debug, error};

use super::StatusPublisher;
use crate::basestation::Basestation;
use crate::error::BrokerError;
use crate::hardware::types::device_id;

pub const ANNOUNCE: &str = "$announce";
pub const CONNECTED: &str = "connected";
pub const COMMAND: &str = "$command";

pub fn topic(root: &str, path: &str) -> String {
    format!("{}/{}", root, path)
}

pub fn state_path(address: &str) -> String {
    format!("{}/state", device_id(address))
}

/// Filter matching every per-device command topic.
pub fn set_filter(root: &str) -> String {
    topic(root, "+/set")
}

pub fn state_payload(record: &Basestation) -> String {
    serde_json::json!({
        "address": record.address(),
        "state": record.state().to_string(),
        "unreachable": record.is_unreachable(),
        "power_state": record.power_state(),
        "last_failure": record.last_failure(),
    })
    .to_string()
}

pub async fn publish_connected(
    publisher: &dyn StatusPublisher,
    up: bool,
) -> Result<(), BrokerError> {
    let payload = if up { "1" } else { "0" };
    publisher.publish(CONNECTED, payload.to_string(), true).await
}

pub async fn publish_basestation(
    publisher: &dyn StatusPublisher,
    record: &Basestation,
) -> Result<(), BrokerError> {
    publisher.publish(&state_path(record.address()), state_payload(record), true).await?;
    debug!("Published state of {}: {}", record.address(), record.state());
    Ok(())
}

/// Publish every record; failures are logged and do not stop the pass.
pub async fn publish_fleet(publisher: &dyn StatusPublisher, records: &[Basestation]) -> usize {
    let mut published = 0;
    for record in records {
        match publish_basestation(publisher, record).await {
            Ok(()) => published += 1,
            Err(e) => error!("Failed to publish state of {}: {}", record.address(), e),
        }
    }
    published
}
