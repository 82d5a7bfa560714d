//! Fleet orchestration: startup sequence and the steady-state command loop.
//!
//! A single task owns the inventory and drives every record sequentially, so
//! at most one radio connection is open at a time.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::basestation::discovery::discover;
use crate::basestation::{Basestation, InventoryStore};
use crate::config::credentials::MqttCredentials;
use crate::config::types::AgentSettings;
use crate::error::{BrokerError, FleetError, LinkError, PersistenceError};
use crate::hardware::types::device_id;
use crate::hardware::BasestationRadio;
use crate::mqtt::{messaging, BrokerConnector, FleetCommand, StatusPublisher};

pub struct FleetController {
    settings: AgentSettings,
    radio: Arc<dyn BasestationRadio>,
    store: InventoryStore,
    inventory: Vec<Basestation>,
    publisher: Arc<dyn StatusPublisher>,
}

impl FleetController {
    /// Validate credentials, open the broker session, then open the radio
    /// with `open_radio`. Nothing touches the radio or the inventory before
    /// the broker has acknowledged.
    pub async fn connect<F, Fut>(
        settings: AgentSettings,
        credentials: &MqttCredentials,
        connector: &dyn BrokerConnector,
        open_radio: F,
    ) -> Result<(Self, mpsc::Receiver<FleetCommand>), FleetError>
    where
        F: FnOnce(Duration) -> Fut,
        Fut: Future<Output = Result<Arc<dyn BasestationRadio>, LinkError>>,
    {
        credentials.check()?;
        info!("Credentials OK, topic root: {}", credentials.topic_root());

        let session = connector.connect(credentials).await?;
        let radio = open_radio(settings.scan_duration).await.map_err(FleetError::Radio)?;

        let store = InventoryStore::new(settings.inventory_path.clone());
        let controller = Self {
            settings,
            radio,
            store,
            inventory: Vec::new(),
            publisher: session.publisher,
        };
        Ok((controller, session.commands))
    }

    /// Full startup: broker, radio, inventory, first health-check pass, publication.
    pub async fn start<F, Fut>(
        settings: AgentSettings,
        credentials: &MqttCredentials,
        connector: &dyn BrokerConnector,
        open_radio: F,
    ) -> Result<(Self, mpsc::Receiver<FleetCommand>), FleetError>
    where
        F: FnOnce(Duration) -> Fut,
        Fut: Future<Output = Result<Arc<dyn BasestationRadio>, LinkError>>,
    {
        let (mut controller, commands) =
            Self::connect(settings, credentials, connector, open_radio).await?;

        controller.prepare_inventory().await?;
        controller.test_all().await;
        controller.persist().await?;
        controller.publish_all().await;

        Ok((controller, commands))
    }

    /// Load the persisted inventory, or discover one when there is none (or
    /// discovery is forced), and persist the result.
    pub async fn prepare_inventory(&mut self) -> Result<(), FleetError> {
        let retry = self.settings.retry;

        let loaded = if self.settings.force_discovery {
            info!("Discovery forced, ignoring {:?}", self.store.path());
            None
        } else {
            self.store.load(self.radio.as_ref(), retry).await
        };

        self.inventory = match loaded {
            Some(records) if !records.is_empty() => records,
            _ => discover(self.radio.as_ref(), retry).await?,
        };

        self.persist().await?;
        Ok(())
    }

    #[cfg(test)]
    pub fn inventory(&self) -> &[Basestation] {
        &self.inventory
    }

    pub fn publisher(&self) -> Arc<dyn StatusPublisher> {
        Arc::clone(&self.publisher)
    }

    /// Health-check every record. Individual failures never abort the pass.
    pub async fn test_all(&mut self) -> usize {
        info!("Testing {} basestations...", self.inventory.len());

        let mut reachable = 0;
        for record in &mut self.inventory {
            if record.test().await {
                reachable += 1;
            }
        }

        info!("{}/{} basestations reachable", reachable, self.inventory.len());
        reachable
    }

    pub async fn publish_all(&self) -> usize {
        if !self.publisher.is_connected() {
            warn!("Broker session is down, publications may be dropped");
        }
        messaging::publish_fleet(self.publisher.as_ref(), &self.inventory).await
    }

    async fn persist(&self) -> Result<(), PersistenceError> {
        self.store.save(&self.inventory).await
    }

    /// Process broker commands and local `signals` until `shutdown` completes.
    ///
    /// Ends with `BrokerError::SessionEnded` when the broker command channel
    /// closes. A shutdown while a command is running abandons it and releases
    /// every radio link.
    pub async fn run<S>(
        &mut self,
        mut commands: mpsc::Receiver<FleetCommand>,
        mut signals: mpsc::Receiver<FleetCommand>,
        shutdown: S,
    ) -> Result<(), FleetError>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut signals_open = true;
        info!("Basestation agent running, waiting for commands");

        loop {
            let command = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    return Ok(());
                }
                command = commands.recv() => match command {
                    Some(command) => command,
                    None => {
                        error!("Broker session ended");
                        return Err(BrokerError::SessionEnded.into());
                    }
                },
                signal = signals.recv(), if signals_open => match signal {
                    Some(command) => command,
                    None => {
                        signals_open = false;
                        continue;
                    }
                },
            };

            let interrupted = tokio::select! {
                _ = &mut shutdown => true,
                _ = self.handle(command) => false,
            };
            if interrupted {
                info!("Shutdown requested, abandoning the running command");
                self.release_links().await;
                return Ok(());
            }
        }
    }

    async fn release_links(&mut self) {
        for record in &mut self.inventory {
            record.disconnect().await;
        }
    }

    /// Apply one command, then persist and publish what it touched.
    pub async fn handle(&mut self, command: FleetCommand) {
        match command {
            FleetCommand::TestAll => {
                self.test_all().await;
                self.commit_all().await;
            }
            FleetCommand::Discover => {
                self.rediscover().await;
                self.commit_all().await;
            }
            command => self.handle_device(command).await,
        }
    }

    async fn rediscover(&mut self) {
        match discover(self.radio.as_ref(), self.settings.retry).await {
            Ok(records) => {
                self.inventory = records;
                self.test_all().await;
            }
            Err(e) => warn!(
                "Rediscovery failed, keeping {} basestations, reason: {}",
                self.inventory.len(),
                e
            ),
        }
    }

    async fn handle_device(&mut self, command: FleetCommand) {
        let Some(id) = command.target().map(str::to_string) else {
            return;
        };
        let Some(index) = self.inventory.iter().position(|r| device_id(r.address()) == id) else {
            warn!("Ignoring {:?}, no basestation with id {}", command, id);
            return;
        };

        let record = &mut self.inventory[index];
        match command {
            FleetCommand::Test(_) => {
                record.test().await;
            }
            FleetCommand::TurnOn(_) => {
                record.turn_on().await;
            }
            FleetCommand::TurnOff(_) => {
                record.turn_off().await;
            }
            FleetCommand::Identify(_) => {
                record.identify().await;
            }
            FleetCommand::TestAll | FleetCommand::Discover => {}
        }

        if let Err(e) = self.persist().await {
            error!("Failed to save basestations, reason: {}", e);
        }
        let record = &self.inventory[index];
        if let Err(e) = messaging::publish_basestation(self.publisher.as_ref(), record).await {
            error!("Failed to publish state of {}: {}", record.address(), e);
        }
    }

    async fn commit_all(&self) {
        if let Err(e) = self.persist().await {
            error!("Failed to save basestations, reason: {}", e);
        }
        self.publish_all().await;
    }
}
