//! # MQTT Control Plane
//!
//! Everything the prop needs to take part in the room's MQTT namespace:
//! keeping a broker session alive, routing room commands to prop callbacks
//! and publishing the status heartbeat the room-control panel listens to.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Broker settings and defaults
//! ├── transport.rs        - Transport trait and the rumqttc-backed client
//! ├── router.rs           - Topic namespace and inbound dispatch
//! ├── message_manager.rs  - Status message wire format
//! ├── broadcaster.rs      - Rate-limited status heartbeat
//! ├── mqtt_handler.rs     - Broker connection state machine
//! └── manager.rs          - MqttManager facade tying the pieces together
//! ```
//!
//! ## Topics
//!
//! - `/er/<prop id>/cmd` carries `activate`, `finish` or `reset` for one prop
//! - `/er/cmd` carries the room-wide `start` and `reset`
//! - `/er/riddles/info` receives one status message per visible prop
//!
//! All timing is driven by the caller: nothing here spawns threads or
//! sleeps, each [`MqttManager::routine`] call does a bounded amount of work.

pub mod broadcaster;
pub mod config;
pub mod manager;
pub mod message_manager;
pub mod mqtt_handler;
pub mod router;
pub mod transport;

pub use broadcaster::{BroadcastReport, StatusBroadcaster};
pub use config::MqttConfig;
pub use manager::{
    Collaborators, Initializing, ManagerSettings, MqttManager, RoutineReport, Running,
};
pub use message_manager::{display_name, format_status, FormatError};
pub use mqtt_handler::{BrokerSupervisor, ConnectionState};
pub use router::{
    prop_command_topic, Dispatch, TopicRouter, BROADCAST_TOPIC, GLOBAL_COMMAND_TOPIC,
};
pub use transport::{RumqttTransport, Transport};
