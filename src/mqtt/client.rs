//! rumqttc session: connection acknowledgement, reconnects and command intake.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, LastWill, MqttOptions,
    Outgoing, Packet, QoS,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::commands::{parse_command, FleetCommand};
use super::messaging::{self, ANNOUNCE, COMMAND, CONNECTED};
use super::{BrokerConnector, BrokerSession, StatusPublisher};
use crate::config::credentials::MqttCredentials;
use crate::config::types::BrokerSettings;
use crate::error::BrokerError;

const REQUEST_CAPACITY: usize = 32;
const COMMAND_CAPACITY: usize = 16;

/// Client id: `basestation-agent-{hostname}-{short uuid}`.
fn client_id() -> String {
    let hostname = hostname::get()
        .unwrap_or_else(|_| std::ffi::OsString::from("unknown"))
        .to_string_lossy()
        .to_string();
    let unique_id = Uuid::new_v4().to_string();
    format!("basestation-agent-{}-{}", hostname, &unique_id[..8])
}

pub struct MqttConnector {
    settings: BrokerSettings,
}

impl MqttConnector {
    pub fn new(settings: BrokerSettings) -> Self {
        Self { settings }
    }

    fn options(&self, credentials: &MqttCredentials, port: u16) -> MqttOptions {
        let root = credentials.topic_root();
        let mut options = MqttOptions::new(client_id(), credentials.hostname.clone(), port);
        options.set_keep_alive(self.settings.keepalive);
        options.set_clean_session(true);
        options.set_last_will(LastWill::new(
            messaging::topic(root, ANNOUNCE),
            Vec::<u8>::new(),
            QoS::AtLeastOnce,
            true,
        ));

        if credentials.is_auth() {
            let username = credentials.username.clone().unwrap_or_default();
            let password = credentials.password.clone().unwrap_or_default();
            options.set_credentials(username, password);
        }
        options
    }
}

#[async_trait]
impl BrokerConnector for MqttConnector {
    async fn connect(&self, credentials: &MqttCredentials) -> Result<BrokerSession, BrokerError> {
        let port = credentials.port_number().map_err(|e| BrokerError::Connect {
            host: credentials.hostname.clone(),
            port: 0,
            reason: e.to_string(),
        })?;
        let root = credentials.topic_root().to_string();

        info!("Connecting to MQTT, server: {}:{}", credentials.hostname, port);

        let options = self.options(credentials, port);
        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));
        let (ack_tx, ack_rx) = oneshot::channel();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);

        let event_task = tokio::spawn(run_event_loop(EventLoopContext {
            eventloop,
            client: client.clone(),
            root: root.clone(),
            connected: Arc::clone(&connected),
            ack: Some(ack_tx),
            commands: command_tx,
            settings: self.settings.clone(),
        }));

        let acknowledged = match tokio::time::timeout(self.settings.ack_timeout, ack_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BrokerError::Connect {
                host: credentials.hostname.clone(),
                port,
                reason: "event loop stopped before acknowledgement".to_string(),
            }),
            Err(_) => Err(BrokerError::AckTimeout(self.settings.ack_timeout.as_secs())),
        };

        let acknowledged = acknowledged.map_err(|e| match e {
            BrokerError::Connect { reason, .. } => BrokerError::Connect {
                host: credentials.hostname.clone(),
                port,
                reason,
            },
            other => other,
        });

        if let Err(e) = acknowledged {
            event_task.abort();
            return Err(e);
        }

        let publisher = Arc::new(MqttPublisher {
            client,
            root,
            connected,
            event_task,
        });
        messaging::publish_connected(publisher.as_ref(), true).await?;

        Ok(BrokerSession {
            publisher,
            commands: command_rx,
        })
    }
}

struct EventLoopContext {
    eventloop: EventLoop,
    client: AsyncClient,
    root: String,
    connected: Arc<AtomicBool>,
    ack: Option<oneshot::Sender<Result<(), BrokerError>>>,
    commands: mpsc::Sender<FleetCommand>,
    settings: BrokerSettings,
}

impl EventLoopContext {
    /// Returns false when the session should stop.
    fn on_connack(&mut self, code: ConnectReturnCode) -> bool {
        if code != ConnectReturnCode::Success {
            self.fail(BrokerError::Refused(format!("{:?}", code)));
            return false;
        }

        self.connected.store(true, Ordering::SeqCst);
        info!("MQTT Connected!");

        let filters = [messaging::set_filter(&self.root), messaging::topic(&self.root, COMMAND)];
        for filter in filters {
            if let Err(e) = self.client.try_subscribe(filter.as_str(), QoS::AtLeastOnce) {
                error!("Failed to subscribe to {}: {}", filter, e);
            }
        }

        match self.ack.take() {
            Some(ack) => {
                let _ = ack.send(Ok(()));
            }
            None => {
                // Reconnected: the last-will may have cleared our presence marker
                let topic = messaging::topic(&self.root, CONNECTED);
                if let Err(e) = self.client.try_publish(topic, QoS::AtLeastOnce, true, "1") {
                    error!("Failed to republish connected marker: {}", e);
                }
            }
        }
        true
    }

    fn on_publish(&self, topic: &str, payload: &[u8]) {
        let Some(command) = parse_command(&self.root, topic, payload) else {
            trace!("Ignoring message on {}", topic);
            return;
        };

        debug!("Received command: {:?}", command);
        if let Err(e) = self.commands.try_send(command) {
            warn!("Dropping command, controller busy or stopped: {}", e);
        }
    }

    /// Hand a failure to the pending `connect` call, or log it once the
    /// session was acknowledged.
    fn fail(&mut self, error: BrokerError) {
        self.connected.store(false, Ordering::SeqCst);
        match self.ack.take() {
            Some(ack) => {
                let _ = ack.send(Err(error));
            }
            None => error!("MQTT session error: {}", error),
        }
    }
}

/// Drive the session. Returning drops the command sender, which is how the
/// controller learns the session is gone for good.
async fn run_event_loop(mut ctx: EventLoopContext) {
    loop {
        match ctx.eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                if !ctx.on_connack(connack.code) {
                    return;
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                ctx.on_publish(&publish.topic, &publish.payload);
            }
            Ok(Event::Incoming(Packet::PubAck(_))) => {
                debug!("Data published.");
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                ctx.connected.store(false, Ordering::SeqCst);
                debug!("MQTT session closed");
                return;
            }
            Ok(_) => {}
            Err(ConnectionError::ConnectionRefused(code)) => {
                // A broker that rejects us is fatal, before or after the first ack
                ctx.fail(BrokerError::Refused(format!("{:?}", code)));
                return;
            }
            Err(e) => {
                if ctx.ack.is_some() {
                    ctx.fail(BrokerError::Connect {
                        host: String::new(),
                        port: 0,
                        reason: e.to_string(),
                    });
                    return;
                }

                ctx.connected.store(false, Ordering::SeqCst);
                let wait = ctx.settings.reconnect_interval;
                warn!("MQTT connection lost: {}, reconnecting in {}ms", e, wait.as_millis());
                tokio::time::sleep(wait).await;
            }
        }
    }
}

pub struct MqttPublisher {
    client: AsyncClient,
    root: String,
    connected: Arc<AtomicBool>,
    event_task: JoinHandle<()>,
}

#[async_trait]
impl StatusPublisher for MqttPublisher {
    async fn publish(&self, path: &str, payload: String, retain: bool) -> Result<(), BrokerError> {
        let topic = messaging::topic(&self.root, path);
        trace!("Publishing {} bytes on {}", payload.len(), topic);

        // The request queue is not drained while the broker is away
        self.client
            .try_publish(topic.as_str(), QoS::AtLeastOnce, retain, payload.into_bytes())
            .map_err(|e| BrokerError::Publish {
                topic,
                reason: e.to_string(),
            })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.event_task.is_finished()
    }

    async fn close(&self) -> Result<(), BrokerError> {
        messaging::publish_connected(self, false).await?;
        self.client.try_disconnect().map_err(|e| BrokerError::Publish {
            topic: messaging::topic(&self.root, CONNECTED),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        self.event_task.abort();
    }
}
