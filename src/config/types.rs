//! Runtime settings built once from the command line.

use std::path::PathBuf;
use std::time::Duration;

use crate::app::cli::Args;

pub const DEFAULT_INVENTORY_FILE: &str = "basestations.json5";

/// Connection retry policy for a single device operation.
///
/// The baseline is one attempt per operation; more attempts wait `backoff`
/// between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn single() -> Self {
        Self { max_attempts: 1, backoff: Duration::ZERO }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::single()
    }
}

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub inventory_path: PathBuf,
    pub force_discovery: bool,
    pub run_once: bool,
    pub retry: RetryPolicy,
    pub scan_duration: Duration,
    pub broker: BrokerSettings,
}

#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub ack_timeout: Duration,
    pub keepalive: Duration,
    pub reconnect_interval: Duration,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(10),
            keepalive: Duration::from_secs(60),
            reconnect_interval: Duration::from_secs(5),
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            inventory_path: PathBuf::from(DEFAULT_INVENTORY_FILE),
            force_discovery: false,
            run_once: false,
            retry: RetryPolicy::single(),
            scan_duration: Duration::from_secs(5),
            broker: BrokerSettings::default(),
        }
    }
}

impl From<&Args> for AgentSettings {
    fn from(args: &Args) -> Self {
        Self {
            inventory_path: args.inventory.clone(),
            force_discovery: args.discover,
            run_once: args.once,
            retry: RetryPolicy {
                max_attempts: args.connect_attempts,
                backoff: Duration::from_millis(args.connect_backoff_ms),
            },
            scan_duration: Duration::from_secs(args.scan_secs),
            broker: BrokerSettings {
                ack_timeout: Duration::from_secs(args.broker_timeout_secs),
                keepalive: Duration::from_secs(args.keepalive_secs),
                reconnect_interval: Duration::from_secs(args.reconnect_secs),
            },
        }
    }
}
