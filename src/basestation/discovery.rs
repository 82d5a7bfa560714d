//! Discovery: scan the radio and build a fresh inventory.

use std::collections::HashSet;

use tracing::{info, warn};

use super::record::Basestation;
use crate::config::types::RetryPolicy;
use crate::error::DiscoveryError;
use crate::hardware::types::normalize_address;
use crate::hardware::BasestationRadio;

/// Scan once and turn every found device into a fresh `Unknown` record.
///
/// Devices that refuse the probe are logged and skipped. An empty result is
/// an error: the basestations are most likely powered off.
pub async fn discover(
    radio: &dyn BasestationRadio,
    retry: RetryPolicy,
) -> Result<Vec<Basestation>, DiscoveryError> {
    info!("Discovering basestations...");

    let report = radio.scan().await?;

    for failure in &report.probe_failures {
        warn!(
            "Some device refused connection while discovering, address: {}, reason: {}",
            failure.address, failure.error
        );
    }

    let mut seen = HashSet::new();
    let records: Vec<Basestation> = report
        .devices
        .into_iter()
        .filter(|link| seen.insert(normalize_address(link.address())))
        .map(|link| Basestation::discovered(link).with_retry(retry))
        .collect();

    if records.is_empty() {
        return Err(DiscoveryError::NoDevices);
    }

    info!("Found {} basestations!", records.len());
    Ok(records)
}
