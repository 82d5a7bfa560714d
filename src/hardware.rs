//! Radio collaborator traits and the btleplug implementation.

use async_trait::async_trait;

use crate::error::LinkError;

pub mod types;
pub mod lighthouse;

#[cfg(test)]
pub mod mock;

pub use lighthouse::LighthouseRadio;

use types::ScanReport;

/// One physical basestation reachable over BLE.
///
/// Every call other than `address` performs radio I/O and may fail with a
/// [`LinkError`]. State reads and writes are only valid between `connect`
/// and `disconnect`.
#[async_trait]
pub trait BasestationLink: Send + Sync {
    /// Hardware address, the stable identity of the device.
    fn address(&self) -> &str;

    async fn connect(&self) -> Result<(), LinkError>;

    async fn disconnect(&self) -> Result<(), LinkError>;

    async fn is_turned_on(&self) -> Result<bool, LinkError>;

    async fn turn_on(&self) -> Result<(), LinkError>;

    async fn turn_off(&self) -> Result<(), LinkError>;

    /// Make the device blink.
    async fn identify(&self) -> Result<(), LinkError>;
}

/// Enumerates nearby basestations and hands out links by address.
#[async_trait]
pub trait BasestationRadio: Send + Sync {
    /// Scan once. Devices that refuse a probe are reported in
    /// `ScanReport::probe_failures` instead of failing the whole scan.
    async fn scan(&self) -> Result<ScanReport, LinkError>;

    /// Handle for a previously known address. Performs no I/O.
    fn link(&self, address: &str) -> Box<dyn BasestationLink>;
}
