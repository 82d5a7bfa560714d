//! Command-line argument definitions (clap).

use std::path::PathBuf;

use clap::Parser;

use crate::config::types::DEFAULT_INVENTORY_FILE;

#[derive(Parser, Debug)]
#[command(name = "basestation-agent")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Lighthouse basestation inventory and MQTT status agent",
    long_about = None
)]
pub struct Args {
    // === Inventory ===
    /// Inventory file (JSON5)
    #[arg(
        long,
        env = "BASESTATIONS_FILE",
        default_value = DEFAULT_INVENTORY_FILE,
        help_heading = "Inventory"
    )]
    pub inventory: PathBuf,

    /// Ignore the saved inventory and scan for basestations
    #[arg(short = 'd', long, help_heading = "Inventory")]
    pub discover: bool,

    /// Bluetooth scan duration in seconds
    #[arg(long = "scan-secs", default_value_t = 5, help_heading = "Inventory")]
    pub scan_secs: u64,

    // === Device Connections ===
    /// Connection attempts per device operation
    #[arg(
        long = "connect-attempts",
        env = "BASESTATION_CONNECT_ATTEMPTS",
        default_value_t = 1,
        help_heading = "Device Connections"
    )]
    pub connect_attempts: u32,

    /// Delay between connection attempts in milliseconds
    #[arg(
        long = "connect-backoff-ms",
        env = "BASESTATION_CONNECT_BACKOFF_MS",
        default_value_t = 500,
        help_heading = "Device Connections"
    )]
    pub connect_backoff_ms: u64,

    // === Broker ===
    /// Seconds to wait for the broker to acknowledge the session
    #[arg(long = "broker-timeout-secs", default_value_t = 10, help_heading = "Broker")]
    pub broker_timeout_secs: u64,

    /// MQTT keepalive in seconds
    #[arg(long = "keepalive-secs", default_value_t = 60, help_heading = "Broker")]
    pub keepalive_secs: u64,

    /// Delay before reconnecting after the broker connection drops
    #[arg(long = "reconnect-secs", default_value_t = 5, help_heading = "Broker")]
    pub reconnect_secs: u64,

    // === Run Mode ===
    /// Run startup and one health-check pass, then exit
    #[arg(long, help_heading = "Run Mode")]
    pub once: bool,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR, CRITICAL)
    #[arg(long = "log-level", help_heading = "Run Mode")]
    pub log_level: Option<String>,
}
