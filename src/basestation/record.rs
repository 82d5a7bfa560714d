//! A single basestation: its radio link plus cached reachability and power state.
//!
//! Every public operation is a connect, act, disconnect unit. Radio failures are
//! recorded on the record and reported through the return value; they never
//! propagate as errors.

use std::fmt;

use tracing::{debug, info, warn};

use crate::config::types::RetryPolicy;
use crate::error::LinkError;
use crate::hardware::BasestationLink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    On,
    Off,
}

impl From<bool> for PowerState {
    fn from(on: bool) -> Self {
        if on {
            PowerState::On
        } else {
            PowerState::Off
        }
    }
}

/// Derived view of a record's reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No connection attempted by this process and nothing known to be reachable.
    Unknown,
    Unreachable,
    Reachable(PowerState),
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Unknown => write!(f, "unknown"),
            LinkState::Unreachable => write!(f, "unreachable"),
            LinkState::Reachable(PowerState::On) => write!(f, "on"),
            LinkState::Reachable(PowerState::Off) => write!(f, "off"),
        }
    }
}

/// Result of `turn_on` / `turn_off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The device now reports the requested state.
    Changed,
    /// The device was already in the requested state; nothing was sent.
    AlreadyInState,
    /// Could not connect.
    Unreachable,
    /// The command was accepted but the device still reports the old state.
    NotApplied,
    /// The link dropped part way through.
    Failed,
}

pub struct Basestation {
    link: Box<dyn BasestationLink>,
    address: String,
    unreachable: bool,
    power_state: bool,
    attempted: bool,
    last_failure: Option<String>,
    retry: RetryPolicy,
}

impl Basestation {
    /// Fresh record for a device found by a scan.
    pub fn discovered(link: Box<dyn BasestationLink>) -> Self {
        Self::restored(link, true, false)
    }

    /// Record carrying previously persisted state.
    pub fn restored(link: Box<dyn BasestationLink>, unreachable: bool, power_state: bool) -> Self {
        let address = link.address().to_string();
        Self {
            link,
            address,
            unreachable,
            power_state,
            attempted: false,
            last_failure: None,
            retry: RetryPolicy::single(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_unreachable(&self) -> bool {
        self.unreachable
    }

    /// Last known power state; stale while unreachable.
    pub fn power_state(&self) -> bool {
        self.power_state
    }

    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    pub fn state(&self) -> LinkState {
        match (self.unreachable, self.attempted) {
            (true, false) => LinkState::Unknown,
            (true, true) => LinkState::Unreachable,
            (false, _) => LinkState::Reachable(self.power_state.into()),
        }
    }

    fn mark_failed(&mut self, error: &LinkError) {
        self.unreachable = true;
        self.last_failure = Some(error.to_string());
    }

    /// Open the radio link, retrying per the record's policy.
    pub async fn connect(&mut self) -> bool {
        self.attempted = true;
        let attempts = self.retry.attempts();

        for attempt in 1..=attempts {
            match self.link.connect().await {
                Ok(()) => {
                    self.unreachable = false;
                    self.last_failure = None;
                    return true;
                }
                Err(e) => {
                    warn!(
                        "Connection to {} failed (attempt {}/{}), reason: {}",
                        self.address, attempt, attempts, e
                    );
                    self.mark_failed(&e);

                    if attempt < attempts {
                        // Release any half-open session before the next attempt
                        self.disconnect().await;
                        if !self.retry.backoff.is_zero() {
                            tokio::time::sleep(self.retry.backoff).await;
                        }
                    }
                }
            }
        }

        false
    }

    pub async fn disconnect(&mut self) {
        if let Err(e) = self.link.disconnect().await {
            debug!("Disconnect from {} failed: {}", self.address, e);
        }
    }

    /// Query the device and update `power_state`. Only valid while connected.
    pub async fn read_power_state(&mut self) -> bool {
        match self.link.is_turned_on().await {
            Ok(on) => {
                self.power_state = on;
                true
            }
            Err(e) => {
                warn!("Failed to read power state of {}, reason: {}", self.address, e);
                self.mark_failed(&e);
                false
            }
        }
    }

    /// Health check: connect, read the power state, disconnect.
    pub async fn test(&mut self) -> bool {
        info!("Testing connection to basestation {}", self.address);

        let ok = self.connect().await && self.read_power_state().await;
        self.disconnect().await;

        if ok {
            info!("Connection to {} successful, state: {}", self.address, self.state());
        }
        ok
    }

    pub async fn turn_on(&mut self) -> ToggleOutcome {
        self.set_power(true).await
    }

    pub async fn turn_off(&mut self) -> ToggleOutcome {
        self.set_power(false).await
    }

    async fn set_power(&mut self, target: bool) -> ToggleOutcome {
        let label = PowerState::from(target);
        info!("Turning basestation {} {:?}", self.address, label);

        let outcome = if self.connect().await {
            self.apply_power(target).await
        } else {
            ToggleOutcome::Unreachable
        };
        self.disconnect().await;

        match outcome {
            ToggleOutcome::Changed => info!("Basestation {} is now {:?}", self.address, label),
            ToggleOutcome::AlreadyInState => {
                info!("Basestation {} already {:?}", self.address, label)
            }
            ToggleOutcome::NotApplied => {
                warn!("Basestation {} accepted the command but did not change state", self.address)
            }
            ToggleOutcome::Unreachable | ToggleOutcome::Failed => {
                warn!("Failed to turn basestation {} {:?}", self.address, label)
            }
        }
        outcome
    }

    /// Body of a toggle; the caller owns connect and disconnect.
    async fn apply_power(&mut self, target: bool) -> ToggleOutcome {
        if !self.read_power_state().await {
            return ToggleOutcome::Failed;
        }
        if self.power_state == target {
            return ToggleOutcome::AlreadyInState;
        }

        let sent = if target {
            self.link.turn_on().await
        } else {
            self.link.turn_off().await
        };
        if let Err(e) = sent {
            warn!("Power command to {} failed, reason: {}", self.address, e);
            self.mark_failed(&e);
            return ToggleOutcome::Failed;
        }

        if !self.read_power_state().await {
            return ToggleOutcome::Failed;
        }
        if self.power_state == target {
            ToggleOutcome::Changed
        } else {
            ToggleOutcome::NotApplied
        }
    }

    /// Blink the device. Same failure policy as `test`.
    pub async fn identify(&mut self) -> bool {
        info!("Identifying basestation {}", self.address);

        let ok = if self.connect().await {
            match self.link.identify().await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Identify on {} failed, reason: {}", self.address, e);
                    self.mark_failed(&e);
                    false
                }
            }
        } else {
            false
        };
        self.disconnect().await;
        ok
    }
}

impl fmt::Debug for Basestation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Basestation")
            .field("address", &self.address)
            .field("unreachable", &self.unreachable)
            .field("power_state", &self.power_state)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
