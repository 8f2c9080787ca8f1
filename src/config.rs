//! Device configuration file
//!
//! ```toml
//! [mqtt]
//! host = "192.168.10.1"
//! client_id = "box_mokka"
//!
//! [link]
//! interface = "eth0"
//! ip_ending = 20
//!
//! [[props]]
//! id = "box"
//! number = 2
//! relay_pin = 17
//! ```
//!
//! Every section is optional; a missing file yields the defaults.

use std::path::{Path, PathBuf};

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::link::sysfs::DEFAULT_SYSFS_ROOT;
use crate::link::LinkIdentity;
use crate::mqtt::config::{MqttConfig, MIN_KEEP_ALIVE_SECS};
use crate::mqtt::manager::{
    ManagerSettings, DEFAULT_BROADCAST_INTERVAL_MS, DEFAULT_FAULT_REPORT_INTERVAL_MS,
};
use crate::mqtt::transport::SUBSCRIBE_BATCH;
use crate::props::{Prop, PropRegistry, PROP_ID_MAX_LEN};

/// Overrides the config file location
pub const CONFIG_ENV: &str = "PROPCONTROLLER_CONFIG";
const CONFIG_DIR: &str = "propcontroller";
const CONFIG_FILE: &str = "config.toml";

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub link: LinkConfig,
    pub manager: ManagerConfig,
    pub props: Vec<PropConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct LinkConfig {
    pub interface: String,
    /// First three octets of the room network
    pub subnet: [u8; 3],
    /// Last octet of the device address, also the last byte of its MAC
    pub ip_ending: u8,
    pub sysfs_root: PathBuf,
    /// Run on every link re-initialization, empty to only log
    pub reinit_command: Vec<String>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            interface: "eth0".to_string(),
            subnet: [192, 168, 10],
            ip_ending: 100,
            sysfs_root: PathBuf::from(DEFAULT_SYSFS_ROOT),
            reinit_command: Vec::new(),
        }
    }
}

impl LinkConfig {
    pub fn identity(&self) -> LinkIdentity {
        LinkIdentity::from_ip_ending(self.subnet, self.ip_ending)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ManagerConfig {
    pub broadcast_interval_ms: u64,
    pub fault_report_interval_ms: u64,
    /// Sleep between two `routine()` calls of the device loop
    pub tick_interval_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            broadcast_interval_ms: DEFAULT_BROADCAST_INTERVAL_MS,
            fault_report_interval_ms: DEFAULT_FAULT_REPORT_INTERVAL_MS,
            tick_interval_ms: 10,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PropConfig {
    pub id: String,
    pub number: i32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub relay_pin: Option<u8>,
}

impl PropConfig {
    pub fn to_prop(&self) -> Prop {
        let prop = Prop::new(self.id.clone(), self.number);
        match &self.name {
            Some(name) => prop.with_name(name.clone()),
            None => prop,
        }
    }
}

impl Config {
    /// `$PROPCONTROLLER_CONFIG`, else the per-user config directory.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    pub async fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()).await
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        let config = if tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?
        {
            let content = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
            let config: Config = toml::from_str(&content)
                .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;
            info!("Loaded configuration from {}", path.display());
            config
        } else {
            warn!(
                "Config file {} does not exist, using defaults",
                path.display()
            );
            Config::default()
        };

        config.validate()?;
        debug!("{:?}", config);
        Ok(config)
    }

    /// Rejects settings the broker client or the room namespace cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.mqtt.client_id.is_empty() {
            return Err(eyre!("mqtt.client_id must not be empty"));
        }
        if self.mqtt.keep_alive_secs < MIN_KEEP_ALIVE_SECS {
            return Err(eyre!(
                "mqtt.keep_alive_secs must be at least {}, got {}",
                MIN_KEEP_ALIVE_SECS,
                self.mqtt.keep_alive_secs
            ));
        }
        if self.manager.tick_interval_ms == 0 {
            return Err(eyre!("manager.tick_interval_ms must be positive"));
        }
        if let Some(prop) = self.props.iter().find(|p| p.id.len() > PROP_ID_MAX_LEN) {
            return Err(eyre!(
                "Prop id {} is longer than {} bytes",
                prop.id,
                PROP_ID_MAX_LEN
            ));
        }

        // Prop command topics, the room topic and the extras
        let topics = self.props.len() + 1 + self.mqtt.extra_topics.len();
        let capacity = self.mqtt.request_capacity * SUBSCRIBE_BATCH;
        if topics > capacity {
            return Err(eyre!(
                "{} topics exceed what mqtt.request_capacity = {} can subscribe ({})",
                topics,
                self.mqtt.request_capacity,
                capacity
            ));
        }
        Ok(())
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        let mut settings = ManagerSettings::new(self.mqtt.client_id.clone(), self.link.identity());
        settings.retry_interval_ms = self.mqtt.retry_interval_ms;
        settings.broadcast_interval_ms = self.manager.broadcast_interval_ms;
        settings.fault_report_interval_ms = self.manager.fault_report_interval_ms;
        settings
    }

    /// Registry without callbacks, mostly to validate ids up front.
    pub fn registry(&self) -> Result<PropRegistry> {
        PropRegistry::new(self.props.iter().map(PropConfig::to_prop).collect())
            .map_err(|e| eyre!("Invalid prop configuration: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    const ROOM_CONFIG: &str = r#"
[mqtt]
client_id = "box_mokka"
extra_topics = ["/er/music/cmd"]

[link]
ip_ending = 20

[manager]
tick_interval_ms = 5

[[props]]
id = "box"
number = 2
relay_pin = 17

[[props]]
id = "_mokka"
number = 8
name = "Mokka machine"
"#;

    #[tokio::test]
    async fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml"))
            .await
            .unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.mqtt.host, "192.168.10.1");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.retry_interval_ms, 5000);
    }

    #[tokio::test]
    async fn partial_file_keeps_defaults_for_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, ROOM_CONFIG).unwrap();

        let config = Config::load_from(&path).await.unwrap();
        assert_eq!(config.mqtt.client_id, "box_mokka");
        assert_eq!(config.mqtt.keep_alive_secs, 5);
        assert_eq!(config.mqtt.extra_topics, ["/er/music/cmd"]);
        assert_eq!(config.link.interface, "eth0");
        assert_eq!(config.manager.tick_interval_ms, 5);
        assert_eq!(config.manager.broadcast_interval_ms, 1000);
        assert_eq!(config.props.len(), 2);
        assert_eq!(config.props[0].relay_pin, Some(17));
        assert_eq!(config.props[1].name.as_deref(), Some("Mokka machine"));
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[mqtt\nport = 1883").unwrap();

        assert!(Config::load_from(&path).await.is_err());
    }

    #[test]
    fn short_keep_alive_is_rejected() {
        let mut config = Config::default();
        config.mqtt.keep_alive_secs = 1;
        assert!(config.validate().is_err());

        config.mqtt.keep_alive_secs = 5;
        config.mqtt.client_id.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn topic_count_is_bounded_by_request_capacity() {
        let mut config = Config::default();
        config.mqtt.request_capacity = 1;
        config.props = (0..SUBSCRIBE_BATCH)
            .map(|i| PropConfig {
                id: format!("prop{i}"),
                number: i as i32,
                name: None,
                relay_pin: None,
            })
            .collect();
        assert!(config.validate().is_err());

        config.mqtt.request_capacity = 2;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn settings_follow_the_file() {
        let config: Config = toml::from_str(ROOM_CONFIG).unwrap();
        let settings = config.manager_settings();

        assert_eq!(settings.client_id, "box_mokka");
        assert_eq!(settings.identity.address, Ipv4Addr::new(192, 168, 10, 20));
        assert_eq!(settings.identity.mac, [0x90, 0xA2, 0xDA, 0x10, 0xA9, 20]);
        assert_eq!(settings.retry_interval_ms, 5000);

        let registry = config.registry().unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(1).unwrap().display_name(), "Mokka machine");
    }

    #[test]
    fn duplicate_prop_ids_are_reported() {
        let mut config: Config = toml::from_str(ROOM_CONFIG).unwrap();
        config.props[1].id = "box".to_string();
        assert!(config.registry().is_err());
    }
}
