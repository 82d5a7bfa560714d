//! Incoming command topics.
//!
//! `{root}/$command` accepts `TEST` and `DISCOVER` for the whole fleet;
//! `{root}/{device_id}/set` accepts `ON`, `OFF`, `IDENTIFY` and `TEST`.

use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FleetCommand {
    /// Health-check every record.
    TestAll,
    /// Rescan and replace the inventory.
    Discover,
    Test(String),
    TurnOn(String),
    TurnOff(String),
    Identify(String),
}

impl FleetCommand {
    /// Device id targeted by the command, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            FleetCommand::TestAll | FleetCommand::Discover => None,
            FleetCommand::Test(id)
            | FleetCommand::TurnOn(id)
            | FleetCommand::TurnOff(id)
            | FleetCommand::Identify(id) => Some(id),
        }
    }
}

pub fn parse_command(root: &str, topic: &str, payload: &[u8]) -> Option<FleetCommand> {
    let rest = topic.strip_prefix(root)?.strip_prefix('/')?;
    let action = String::from_utf8_lossy(payload).trim().to_uppercase();

    if rest == "$command" {
        return match action.as_str() {
            "TEST" => Some(FleetCommand::TestAll),
            "DISCOVER" => Some(FleetCommand::Discover),
            _ => {
                warn!("Unknown fleet command: {}", action);
                None
            }
        };
    }

    let id = rest.strip_suffix("/set")?;
    if id.is_empty() || id.contains('/') {
        return None;
    }
    let id = id.to_lowercase();

    match action.as_str() {
        "ON" | "1" => Some(FleetCommand::TurnOn(id)),
        "OFF" | "0" => Some(FleetCommand::TurnOff(id)),
        "IDENTIFY" => Some(FleetCommand::Identify(id)),
        "TEST" => Some(FleetCommand::Test(id)),
        _ => {
            warn!("Unknown command '{}' for basestation {}", action, id);
            None
        }
    }
}
