//! MQTT broker credentials, sourced from the environment once at startup.

use std::fmt;

use crate::error::ConfigError;

pub const DEFAULT_PORT: &str = "1883";
pub const DEFAULT_TOPIC: &str = "basestations";

#[derive(Clone, PartialEq, Eq)]
pub struct MqttCredentials {
    pub hostname: String,
    pub port: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic: String,
}

impl MqttCredentials {
    /// Read `MQTT_*` variables from the process environment.
    pub fn load() -> Self {
        Self::load_from(|key| std::env::var(key).ok())
    }

    /// Build credentials from an arbitrary key lookup. Empty values count as unset.
    pub fn load_from<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            hostname: get("MQTT_HOSTNAME").unwrap_or_default(),
            port: get("MQTT_PORT").unwrap_or_else(|| DEFAULT_PORT.to_string()),
            username: get("MQTT_USERNAME"),
            password: get("MQTT_PASSWORD"),
            topic: get("MQTT_TOPIC").unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
        }
    }

    /// Verify hostname, port and topic are all present and usable.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.hostname.is_empty() {
            return Err(ConfigError::MissingHostname);
        }
        self.port_number()?;
        if self.topic.trim_matches('/').is_empty() {
            return Err(ConfigError::MissingTopic);
        }
        Ok(())
    }

    pub fn port_number(&self) -> Result<u16, ConfigError> {
        match self.port.parse::<u16>() {
            Ok(port) if port > 0 => Ok(port),
            _ => Err(ConfigError::InvalidPort(self.port.clone())),
        }
    }

    /// Authenticated connect is used only when both username and password are set.
    pub fn is_auth(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Topic root without trailing separators.
    pub fn topic_root(&self) -> &str {
        self.topic.trim_end_matches('/')
    }
}

impl fmt::Debug for MqttCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttCredentials")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("topic", &self.topic)
            .finish()
    }
}
