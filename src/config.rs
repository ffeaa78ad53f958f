//! Bridge configuration
//!
//! Resolution order, lowest to highest precedence:
//!   built-in defaults → JSON file (`--config`) → environment → CLI flags
//!
//! Environment variables:
//!   LOCATOR_MQTT_HOST        broker host
//!   LOCATOR_MQTT_PORT        broker port
//!   LOCATOR_MQTT_CLIENT_ID   MQTT client id
//!   LOCATOR_MQTT_USERNAME    broker user (defaults to the client id)
//!   LOCATOR_MQTT_PASSWORD    broker password
//!   LOCATOR_TELEMETRY_CHANNEL channel the locators publish telemetry on
//!   LOCATOR_COMMAND_CHANNEL  channel the locators read commands from
//!   LOCATOR_RETRY_SECS       fixed delay between connection attempts
//!   LOCATOR_HTTP_BIND        HTTP listen address

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

const DEFAULT_BROKER_HOST: &str = "mqtt3.thingspeak.com";
const DEFAULT_BROKER_PORT: u16 = 1883;
const DEFAULT_TELEMETRY_CHANNEL: &str = "2983140";
const DEFAULT_COMMAND_CHANNEL: &str = "3038672";
const DEFAULT_COMMAND_FIELD: &str = "field1";
const DEFAULT_RETRY_SECS: u64 = 5;
const DEFAULT_HTTP_BIND: &str = "127.0.0.1:8000";

/// Static description of one locator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorConfig {
    pub id: String,
    /// Trailing field segment of the telemetry topic this locator owns
    pub channel_field: String,
    /// Display code before any command is issued
    pub code: String,
}

impl LocatorConfig {
    pub fn new(
        id: impl Into<String>,
        channel_field: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            channel_field: channel_field.into(),
            code: code.into(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub keep_alive_secs: u64,
    pub clean_session: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_BROKER_HOST.to_string(),
            port: DEFAULT_BROKER_PORT,
            client_id: String::new(),
            username: String::new(),
            password: String::new(),
            keep_alive_secs: 60,
            clean_session: false,
        }
    }
}

impl BrokerConfig {
    /// Broker user; relays such as ThingSpeak use the client id when none is set
    pub fn effective_username(&self) -> &str {
        if self.username.is_empty() {
            &self.client_id
        } else {
            &self.username
        }
    }
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("keep_alive_secs", &self.keep_alive_secs)
            .field("clean_session", &self.clean_session)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_HTTP_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub broker: BrokerConfig,
    pub telemetry_channel_id: String,
    pub command_channel_id: String,
    pub command_field: String,
    pub retry_interval_secs: u64,
    pub http: HttpConfig,
    pub locators: Vec<LocatorConfig>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            telemetry_channel_id: DEFAULT_TELEMETRY_CHANNEL.to_string(),
            command_channel_id: DEFAULT_COMMAND_CHANNEL.to_string(),
            command_field: DEFAULT_COMMAND_FIELD.to_string(),
            retry_interval_secs: DEFAULT_RETRY_SECS,
            http: HttpConfig::default(),
            locators: vec![
                LocatorConfig::new("1", "field1", "1234"),
                LocatorConfig::new("2", "field2", "5678"),
            ],
        }
    }
}

impl BridgeConfig {
    /// Load defaults, overlay the JSON file if given, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            BridgeError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Overlay `LOCATOR_*` environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("LOCATOR_MQTT_HOST") {
            self.broker.host = host;
        }
        if let Ok(port) = std::env::var("LOCATOR_MQTT_PORT") {
            self.broker.port = port.parse().map_err(|_| {
                BridgeError::Config(format!("LOCATOR_MQTT_PORT is not a port: {}", port))
            })?;
        }
        if let Ok(client_id) = std::env::var("LOCATOR_MQTT_CLIENT_ID") {
            self.broker.client_id = client_id;
        }
        if let Ok(username) = std::env::var("LOCATOR_MQTT_USERNAME") {
            self.broker.username = username;
        }
        if let Ok(password) = std::env::var("LOCATOR_MQTT_PASSWORD") {
            self.broker.password = password;
        }
        if let Ok(channel) = std::env::var("LOCATOR_TELEMETRY_CHANNEL") {
            self.telemetry_channel_id = channel;
        }
        if let Ok(channel) = std::env::var("LOCATOR_COMMAND_CHANNEL") {
            self.command_channel_id = channel;
        }
        if let Ok(secs) = std::env::var("LOCATOR_RETRY_SECS") {
            self.retry_interval_secs = secs.parse().map_err(|_| {
                BridgeError::Config(format!("LOCATOR_RETRY_SECS is not a number: {}", secs))
            })?;
        }
        if let Ok(bind) = std::env::var("LOCATOR_HTTP_BIND") {
            self.http.bind = bind;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.locators.is_empty() {
            return Err(BridgeError::Config("at least one locator is required".into()));
        }
        for locator in &self.locators {
            if locator.id.trim().is_empty() {
                return Err(BridgeError::Config("locator id must not be empty".into()));
            }
            if locator.channel_field.trim().is_empty() || locator.channel_field.contains('/') {
                return Err(BridgeError::Config(format!(
                    "locator {} has an invalid channel field: {:?}",
                    locator.id, locator.channel_field
                )));
            }
        }
        if self.retry_interval_secs == 0 {
            return Err(BridgeError::Config(
                "retry interval must be at least one second".into(),
            ));
        }
        self.bind_addr()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.http.bind.parse().map_err(|_| {
            BridgeError::Config(format!("invalid HTTP bind address: {}", self.http.bind))
        })
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    /// Telemetry topic for one locator channel field
    pub fn subscribe_topic(&self, channel_field: &str) -> String {
        format!(
            "channels/{}/subscribe/fields/{}",
            self.telemetry_channel_id, channel_field
        )
    }

    /// One telemetry topic per configured locator, in registration order
    pub fn subscribe_topics(&self) -> Vec<String> {
        self.locators
            .iter()
            .map(|l| self.subscribe_topic(&l.channel_field))
            .collect()
    }

    pub fn command_topic(&self) -> String {
        crate::command::command_topic(&self.command_channel_id, &self.command_field)
    }
}
