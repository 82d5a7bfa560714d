//! In-memory broker used by the test suite.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{BrokerConnector, BrokerSession, FleetCommand, StatusPublisher};
use crate::config::credentials::MqttCredentials;
use crate::error::BrokerError;
use crate::mqtt::messaging;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

pub struct MockPublisher {
    root: String,
    connected: AtomicBool,
    stalled: AtomicBool,
    messages: Mutex<Vec<Published>>,
}

impl MockPublisher {
    pub fn new(root: &str) -> Self {
        Self {
            root: root.to_string(),
            connected: AtomicBool::new(true),
            stalled: AtomicBool::new(false),
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn messages(&self) -> Vec<Published> {
        self.messages.lock().unwrap().clone()
    }

    /// Last payload published on `{root}/{path}`.
    pub fn last(&self, path: &str) -> Option<String> {
        let topic = messaging::topic(&self.root, path);
        self.messages()
            .into_iter()
            .rev()
            .find(|m| m.topic == topic)
            .map(|m| m.payload)
    }

    /// Make every later publish hang.
    pub fn stall(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl StatusPublisher for MockPublisher {
    async fn publish(&self, path: &str, payload: String, retain: bool) -> Result<(), BrokerError> {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.messages.lock().unwrap().push(Published {
            topic: messaging::topic(&self.root, path),
            payload,
            retain,
        });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), BrokerError> {
        messaging::publish_connected(self, false).await?;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector handing out a [`MockPublisher`], or refusing every connection.
pub struct MockConnector {
    refuse: bool,
    attempts: AtomicU32,
    publisher: Arc<MockPublisher>,
    commands: Mutex<Option<mpsc::Receiver<FleetCommand>>>,
    sender: Mutex<Option<mpsc::Sender<FleetCommand>>>,
}

impl MockConnector {
    pub fn new(root: &str) -> Self {
        let (sender, receiver) = mpsc::channel(16);
        Self {
            refuse: false,
            attempts: AtomicU32::new(0),
            publisher: Arc::new(MockPublisher::new(root)),
            commands: Mutex::new(Some(receiver)),
            sender: Mutex::new(Some(sender)),
        }
    }

    pub fn refusing(root: &str) -> Self {
        Self { refuse: true, ..Self::new(root) }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn publisher(&self) -> Arc<MockPublisher> {
        Arc::clone(&self.publisher)
    }

    /// Sender feeding the session's command channel.
    pub fn command_sender(&self) -> mpsc::Sender<FleetCommand> {
        self.sender
            .lock()
            .unwrap()
            .clone()
            .expect("session still open")
    }

    /// Drop the broker side of the command channel, as a dead session does.
    pub fn end_session(&self) {
        self.publisher.connected.store(false, Ordering::SeqCst);
        self.sender.lock().unwrap().take();
    }
}

#[async_trait]
impl BrokerConnector for MockConnector {
    async fn connect(&self, credentials: &MqttCredentials) -> Result<BrokerSession, BrokerError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(BrokerError::Connect {
                host: credentials.hostname.clone(),
                port: credentials.port_number().unwrap_or_default(),
                reason: "Connection refused".to_string(),
            });
        }

        let commands = self
            .commands
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| BrokerError::Refused("session already taken".to_string()))?;

        messaging::publish_connected(self.publisher.as_ref(), true).await?;

        Ok(BrokerSession {
            publisher: self.publisher.clone(),
            commands,
        })
    }
}
