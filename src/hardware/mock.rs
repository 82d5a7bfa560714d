//! In-memory radio used by the test suite.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::types::{ProbeFailure, ScanReport};
use super::{BasestationLink, BasestationRadio};
use crate::error::LinkError;

#[derive(Debug, Default)]
struct DeviceState {
    reachable: bool,
    powered: bool,
    connected: bool,
    connects: u32,
    disconnects: u32,
    failing_connects: u32,
    ignore_toggle: bool,
    fail_toggle: bool,
    fail_read: bool,
    fail_after_link: bool,
}

/// Shared handle to a simulated basestation.
#[derive(Debug, Clone)]
pub struct MockDevice {
    address: String,
    state: Arc<Mutex<DeviceState>>,
}

impl MockDevice {
    pub fn new(address: &str, reachable: bool, powered: bool) -> Self {
        Self {
            address: address.to_string(),
            state: Arc::new(Mutex::new(DeviceState { reachable, powered, ..Default::default() })),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut DeviceState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn link(&self) -> Box<dyn BasestationLink> {
        Box::new(MockLink { device: self.clone() })
    }

    pub fn is_powered(&self) -> bool {
        self.with(|s| s.powered)
    }

    pub fn is_connected(&self) -> bool {
        self.with(|s| s.connected)
    }

    pub fn connects(&self) -> u32 {
        self.with(|s| s.connects)
    }

    pub fn disconnects(&self) -> u32 {
        self.with(|s| s.disconnects)
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.with(|s| s.reachable = reachable);
    }

    /// Fail the next `n` connection attempts, then behave normally.
    pub fn fail_next_connects(&self, n: u32) {
        self.with(|s| s.failing_connects = n);
    }

    /// Accept toggle commands without changing the power state.
    pub fn ignore_toggles(&self) {
        self.with(|s| s.ignore_toggle = true);
    }

    /// Drop the link when a toggle command is written.
    pub fn fail_toggles(&self) {
        self.with(|s| s.fail_toggle = true);
    }

    pub fn fail_reads(&self) {
        self.with(|s| s.fail_read = true);
    }

    /// Open the link but fail the rest of `connect`, like a service discovery error.
    pub fn fail_after_link(&self) {
        self.with(|s| s.fail_after_link = true);
    }
}

pub struct MockLink {
    device: MockDevice,
}

impl MockLink {
    fn require_connection(&self, s: &DeviceState) -> Result<(), LinkError> {
        if s.connected {
            Ok(())
        } else {
            Err(LinkError::Disconnected(self.device.address.clone()))
        }
    }

    fn toggle(&self, target: bool) -> Result<(), LinkError> {
        self.device.with(|s| {
            self.require_connection(s)?;
            if s.fail_toggle {
                return Err(LinkError::Disconnected(self.device.address.clone()));
            }
            if !s.ignore_toggle {
                s.powered = target;
            }
            Ok(())
        })
    }
}

#[async_trait]
impl BasestationLink for MockLink {
    fn address(&self) -> &str {
        &self.device.address
    }

    async fn connect(&self) -> Result<(), LinkError> {
        self.device.with(|s| {
            s.connects += 1;
            if s.failing_connects > 0 {
                s.failing_connects -= 1;
                return Err(LinkError::Disconnected(self.device.address.clone()));
            }
            if !s.reachable {
                return Err(LinkError::Disconnected(self.device.address.clone()));
            }
            s.connected = true;
            if s.fail_after_link {
                return Err(LinkError::Bluetooth("service discovery failed".to_string()));
            }
            Ok(())
        })
    }

    async fn disconnect(&self) -> Result<(), LinkError> {
        self.device.with(|s| {
            s.disconnects += 1;
            s.connected = false;
        });
        Ok(())
    }

    async fn is_turned_on(&self) -> Result<bool, LinkError> {
        self.device.with(|s| {
            self.require_connection(s)?;
            if s.fail_read {
                return Err(LinkError::Disconnected(self.device.address.clone()));
            }
            Ok(s.powered)
        })
    }

    async fn turn_on(&self) -> Result<(), LinkError> {
        self.toggle(true)
    }

    async fn turn_off(&self) -> Result<(), LinkError> {
        self.toggle(false)
    }

    async fn identify(&self) -> Result<(), LinkError> {
        self.device.with(|s| self.require_connection(s))
    }
}

/// Radio whose scan returns a fixed set of devices.
#[derive(Default)]
pub struct MockRadio {
    devices: Vec<MockDevice>,
    refusing: Vec<String>,
    scan_error: Option<LinkError>,
    scans: AtomicU32,
}

impl MockRadio {
    pub fn new(devices: Vec<MockDevice>) -> Self {
        Self { devices, ..Default::default() }
    }

    /// Addresses that show up in scans but refuse the probe.
    pub fn with_refusing(mut self, addresses: &[&str]) -> Self {
        self.refusing = addresses.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_scan_error(mut self, error: LinkError) -> Self {
        self.scan_error = Some(error);
        self
    }

    pub fn scans(&self) -> u32 {
        self.scans.load(Ordering::SeqCst)
    }

    pub fn device(&self, address: &str) -> Option<&MockDevice> {
        self.devices.iter().find(|d| d.address == address)
    }
}

#[async_trait]
impl BasestationRadio for MockRadio {
    async fn scan(&self) -> Result<ScanReport, LinkError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.scan_error {
            return Err(error.clone());
        }

        Ok(ScanReport {
            devices: self.devices.iter().map(MockDevice::link).collect(),
            probe_failures: self
                .refusing
                .iter()
                .map(|address| ProbeFailure {
                    address: address.clone(),
                    error: LinkError::Disconnected(address.clone()),
                })
                .collect(),
        })
    }

    fn link(&self, address: &str) -> Box<dyn BasestationLink> {
        match self.device(address) {
            Some(device) => device.link(),
            None => MockDevice::new(address, false, false).link(),
        }
    }
}
