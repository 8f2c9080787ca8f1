//! # propcontroller
//!
//! Control-plane for a network-connected escape-room prop. A single
//! [`mqtt::MqttManager`] keeps the broker connection alive, routes inbound
//! room commands to the prop callbacks and broadcasts every prop's status to
//! the room-control panel (ERP).
//!
//! ```text
//! routine()
//!   ├─► LinkMonitor        (adapter / cable check)
//!   ├─► BrokerSupervisor   (connect, resubscribe, pump) ──► TopicRouter ──► prop callbacks
//!   └─► StatusBroadcaster  (1 Hz heartbeat) ──► format_status ──► /er/riddles/info
//! ```
//!
//! Everything outside that loop (the socket, the MQTT codec, GPIO) is reached
//! through the small traits in [`mqtt::transport`], [`link`] and [`platform`].

pub mod config;
pub mod error;
pub mod link;
pub mod mqtt;
pub mod platform;
pub mod props;

pub use error::ManagerError;
