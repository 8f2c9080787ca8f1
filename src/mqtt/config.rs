use serde::{Deserialize, Serialize};

/// Broker address the room controller runs on
pub const DEFAULT_BROKER_HOST: &str = "192.168.10.1";
pub const DEFAULT_BROKER_PORT: u16 = 1883;
/// rumqttc refuses shorter keep-alive intervals
pub const MIN_KEEP_ALIVE_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    /// Fixed client identifier, unique per device in the room
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    pub connect_timeout_ms: u64,
    /// Upper bound a single `pump_once` waits for inbound traffic
    pub pump_timeout_ms: u64,
    pub max_events_per_pump: usize,
    pub request_capacity: usize,
    pub retry_interval_ms: u64,
    /// Topics subscribed in addition to the room namespace; messages on them
    /// reach the fallback handler.
    pub extra_topics: Vec<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_BROKER_HOST.to_string(),
            port: DEFAULT_BROKER_PORT,
            client_id: "prop".to_string(),
            username: None,
            password: None,
            keep_alive_secs: MIN_KEEP_ALIVE_SECS,
            connect_timeout_ms: 3000,
            pump_timeout_ms: 5,
            max_events_per_pump: 16,
            request_capacity: 32,
            retry_interval_ms: 5000,
            extra_topics: Vec::new(),
        }
    }
}
