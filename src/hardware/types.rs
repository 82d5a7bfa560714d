//! Scan results returned by the radio.

use std::fmt;

use super::BasestationLink;
use crate::error::LinkError;

/// A device that showed up in the scan but refused the connection probe.
#[derive(Debug, Clone)]
pub struct ProbeFailure {
    pub address: String,
    pub error: LinkError,
}

#[derive(Default)]
pub struct ScanReport {
    pub devices: Vec<Box<dyn BasestationLink>>,
    pub probe_failures: Vec<ProbeFailure>,
}

impl ScanReport {
    pub fn addresses(&self) -> Vec<&str> {
        self.devices.iter().map(|d| d.address()).collect()
    }
}

impl fmt::Debug for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanReport")
            .field("devices", &self.addresses())
            .field("probe_failures", &self.probe_failures)
            .finish()
    }
}

/// Canonical form of a hardware address: uppercase, colon separated.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_uppercase().replace('-', ":")
}

/// Topic-safe device id: lowercase address without separators.
pub fn device_id(address: &str) -> String {
    address
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address(" c3:1a:0b:22:9f:01 "), "C3:1A:0B:22:9F:01");
        assert_eq!(normalize_address("c3-1a-0b-22-9f-01"), "C3:1A:0B:22:9F:01");
    }

    #[test]
    fn test_device_id() {
        assert_eq!(device_id("C3:1A:0B:22:9F:01"), "c31a0b229f01");
    }
}
