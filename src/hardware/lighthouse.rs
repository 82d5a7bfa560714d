//! Lighthouse V2 basestations over btleplug.
//!
//! Basestations advertise as `LHB-XXXXXXXX` and expose a power characteristic
//! (write 0x01 to wake, 0x00 to sleep) and an identify characteristic that
//! makes the front LED blink.

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};
use uuid::{uuid, Uuid};

use super::types::{normalize_address, ProbeFailure, ScanReport};
use super::{BasestationLink, BasestationRadio};
use crate::error::LinkError;

const NAME_PREFIX: &str = "LHB-";
const POWER_CHARACTERISTIC: Uuid = uuid!("00001525-1212-efde-1523-785feabcd124");
const IDENTIFY_CHARACTERISTIC: Uuid = uuid!("00008421-1212-efde-1523-785feabcd124");

const POWER_ON: u8 = 0x01;
const POWER_OFF: u8 = 0x00;
const STATE_STANDBY: u8 = 0x02;
const IDENTIFY: u8 = 0x01;

const LOOKUP_POLL: Duration = Duration::from_millis(250);

/// Interpret the power characteristic. Sleep and standby both count as off.
pub(crate) fn decode_power_state(payload: &[u8]) -> Result<bool, LinkError> {
    match payload.first() {
        Some(&POWER_OFF) | Some(&STATE_STANDBY) => Ok(false),
        Some(_) => Ok(true),
        None => Err(LinkError::InvalidPayload(payload.to_vec())),
    }
}

fn is_basestation_name(name: Option<&str>) -> bool {
    name.map(|n| n.starts_with(NAME_PREFIX)).unwrap_or(false)
}

pub struct LighthouseRadio {
    adapter: Adapter,
    scan_duration: Duration,
}

impl LighthouseRadio {
    /// Open the first Bluetooth adapter on this host.
    pub async fn new(scan_duration: Duration) -> Result<Self, LinkError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(LinkError::NoAdapter)?;

        match adapter.adapter_info().await {
            Ok(name) => info!("Using Bluetooth adapter: {}", name),
            Err(e) => debug!("Could not read adapter info: {}", e),
        }

        Ok(Self { adapter, scan_duration })
    }

    async fn probe(peripheral: &Peripheral) -> Result<(), LinkError> {
        peripheral.connect().await?;
        let result: Result<(), LinkError> = async {
            peripheral.discover_services().await?;
            let address = normalize_address(&peripheral.address().to_string());
            find_characteristic(peripheral, &address, POWER_CHARACTERISTIC).map(|_| ())
        }
        .await;

        if let Err(e) = peripheral.disconnect().await {
            debug!("Probe disconnect failed: {}", e);
        }
        result
    }
}

#[async_trait]
impl BasestationRadio for LighthouseRadio {
    async fn scan(&self) -> Result<ScanReport, LinkError> {
        info!("Scanning for basestations ({}s)...", self.scan_duration.as_secs());

        self.adapter.start_scan(ScanFilter::default()).await?;
        tokio::time::sleep(self.scan_duration).await;
        if let Err(e) = self.adapter.stop_scan().await {
            debug!("Failed to stop scan cleanly: {}", e);
        }

        let mut report = ScanReport::default();

        for peripheral in self.adapter.peripherals().await? {
            let properties = match peripheral.properties().await {
                Ok(Some(properties)) => properties,
                Ok(None) => continue,
                Err(e) => {
                    trace!("Skipping peripheral without properties: {}", e);
                    continue;
                }
            };

            if !is_basestation_name(properties.local_name.as_deref()) {
                continue;
            }

            let address = normalize_address(&properties.address.to_string());
            debug!("Probing {} ({})", address, properties.local_name.as_deref().unwrap_or("?"));

            match Self::probe(&peripheral).await {
                Ok(()) => report.devices.push(Box::new(LighthouseLink::with_peripheral(
                    address,
                    self.adapter.clone(),
                    self.scan_duration,
                    peripheral,
                ))),
                Err(error) => {
                    warn!(
                        "Basestation {} refused connection while discovering: {}",
                        address, error
                    );
                    report.probe_failures.push(ProbeFailure { address, error });
                }
            }
        }

        Ok(report)
    }

    fn link(&self, address: &str) -> Box<dyn BasestationLink> {
        Box::new(LighthouseLink::new(
            normalize_address(address),
            self.adapter.clone(),
            self.scan_duration,
        ))
    }
}

pub struct LighthouseLink {
    address: String,
    adapter: Adapter,
    lookup_timeout: Duration,
    peripheral: Mutex<Option<Peripheral>>,
}

impl LighthouseLink {
    fn new(address: String, adapter: Adapter, lookup_timeout: Duration) -> Self {
        Self {
            address,
            adapter,
            lookup_timeout,
            peripheral: Mutex::new(None),
        }
    }

    fn with_peripheral(
        address: String,
        adapter: Adapter,
        lookup_timeout: Duration,
        peripheral: Peripheral,
    ) -> Self {
        Self {
            address,
            adapter,
            lookup_timeout,
            peripheral: Mutex::new(Some(peripheral)),
        }
    }

    async fn known_peripheral(&self) -> Result<Option<Peripheral>, LinkError> {
        for peripheral in self.adapter.peripherals().await? {
            if normalize_address(&peripheral.address().to_string()) == self.address {
                return Ok(Some(peripheral));
            }
        }
        Ok(None)
    }

    /// Resolve the address to a peripheral, scanning briefly if the adapter
    /// has not seen it yet.
    async fn lookup(&self) -> Result<Peripheral, LinkError> {
        if let Some(peripheral) = self.known_peripheral().await? {
            return Ok(peripheral);
        }

        debug!("{} not cached by adapter, scanning", self.address);
        self.adapter.start_scan(ScanFilter::default()).await?;

        let started = std::time::Instant::now();
        let found = loop {
            if let Some(peripheral) = self.known_peripheral().await? {
                break Some(peripheral);
            }
            if started.elapsed() >= self.lookup_timeout {
                break None;
            }
            tokio::time::sleep(LOOKUP_POLL).await;
        };

        if let Err(e) = self.adapter.stop_scan().await {
            debug!("Failed to stop scan cleanly: {}", e);
        }

        found.ok_or_else(|| LinkError::NotFound(self.address.clone()))
    }

    async fn connected(&self) -> Result<Peripheral, LinkError> {
        let cached = self.peripheral.lock().await.clone();
        let disconnected = || LinkError::Disconnected(self.address.clone());

        let peripheral = cached.ok_or_else(disconnected)?;
        if peripheral.is_connected().await? {
            Ok(peripheral)
        } else {
            Err(disconnected())
        }
    }

    async fn write(&self, characteristic: Uuid, value: u8) -> Result<(), LinkError> {
        let peripheral = self.connected().await?;
        let ch = find_characteristic(&peripheral, &self.address, characteristic)?;
        peripheral.write(&ch, &[value], WriteType::WithResponse).await?;
        Ok(())
    }
}

fn find_characteristic(
    peripheral: &Peripheral,
    address: &str,
    uuid: Uuid,
) -> Result<Characteristic, LinkError> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == uuid)
        .ok_or_else(|| LinkError::MissingCharacteristic {
            address: address.to_string(),
            characteristic: uuid.to_string(),
        })
}

#[async_trait]
impl BasestationLink for LighthouseLink {
    fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&self) -> Result<(), LinkError> {
        let cached = self.peripheral.lock().await.clone();
        let peripheral = match cached {
            Some(peripheral) => peripheral,
            None => self.lookup().await?,
        };

        // Cached before connecting so `disconnect` can release a half-open session
        *self.peripheral.lock().await = Some(peripheral.clone());

        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        peripheral.discover_services().await?;
        trace!("Connected to {}", self.address);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), LinkError> {
        let guard = self.peripheral.lock().await;
        if let Some(peripheral) = guard.as_ref() {
            if peripheral.is_connected().await? {
                peripheral.disconnect().await?;
                trace!("Disconnected from {}", self.address);
            }
        }
        Ok(())
    }

    async fn is_turned_on(&self) -> Result<bool, LinkError> {
        let peripheral = self.connected().await?;
        let ch = find_characteristic(&peripheral, &self.address, POWER_CHARACTERISTIC)?;
        let payload = peripheral.read(&ch).await?;
        trace!("{} power payload: {:02x?}", self.address, payload);
        decode_power_state(&payload)
    }

    async fn turn_on(&self) -> Result<(), LinkError> {
        self.write(POWER_CHARACTERISTIC, POWER_ON).await
    }

    async fn turn_off(&self) -> Result<(), LinkError> {
        self.write(POWER_CHARACTERISTIC, POWER_OFF).await
    }

    async fn identify(&self) -> Result<(), LinkError> {
        self.write(IDENTIFY_CHARACTERISTIC, IDENTIFY).await
    }
}
