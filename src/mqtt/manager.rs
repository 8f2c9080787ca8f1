//! MqttManager - single entry point the device loop calls
//!
//! The manager is a typestate machine with two states:
//!
//! 1. `Initializing` - collaborators are wired but the network link is not up yet
//! 2. `Running`      - `routine()` may be called from the device loop
//!
//! Everything it owns (timers, connection state, fault window) lives in the
//! value itself, so several managers can coexist and tests can drive time
//! through an injected [`Clock`].

use std::fmt;

use statum::{machine, state};
use tracing::{debug, info};

use super::broadcaster::{BroadcastReport, StatusBroadcaster};
use super::mqtt_handler::{BrokerSupervisor, ConnectionState};
use super::router::TopicRouter;
use super::transport::Transport;
use crate::error::ManagerError;
use crate::link::{HardwareStatus, LinkIdentity, LinkLayer, LinkMonitor};
use crate::platform::{Clock, Console};

pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_BROADCAST_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_FAULT_REPORT_INTERVAL_MS: u64 = 1000;

/// Timing and identity of one manager instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSettings {
    pub client_id: String,
    pub identity: LinkIdentity,
    pub retry_interval_ms: u64,
    pub broadcast_interval_ms: u64,
    pub fault_report_interval_ms: u64,
}

impl ManagerSettings {
    pub fn new(client_id: impl Into<String>, identity: LinkIdentity) -> Self {
        Self {
            client_id: client_id.into(),
            identity,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            broadcast_interval_ms: DEFAULT_BROADCAST_INTERVAL_MS,
            fault_report_interval_ms: DEFAULT_FAULT_REPORT_INTERVAL_MS,
        }
    }
}

/// External services the manager talks to
pub struct Collaborators {
    pub transport: Box<dyn Transport>,
    pub link: Box<dyn LinkLayer>,
    pub console: Box<dyn Console>,
    pub clock: Box<dyn Clock>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Result of one `routine()` tick
#[derive(Debug)]
pub struct RoutineReport {
    pub hardware: HardwareStatus,
    pub connection: Result<ConnectionState, ManagerError>,
    pub broadcast: Result<Option<BroadcastReport>, ManagerError>,
}

#[state]
#[derive(Debug, Clone)]
pub enum ManagerState {
    Initializing,
    Running,
}

#[machine]
#[derive(Debug)]
pub struct MqttManager<S: ManagerState> {
    settings: ManagerSettings,
    router: TopicRouter,
    io: Collaborators,
    link_monitor: LinkMonitor,
    supervisor: BrokerSupervisor,
    broadcaster: StatusBroadcaster,
    hardware: HardwareStatus,
}

impl<S: ManagerState> MqttManager<S> {
    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    pub fn router(&self) -> &TopicRouter {
        &self.router
    }
}

impl MqttManager<Initializing> {
    pub fn create(settings: ManagerSettings, router: TopicRouter, io: Collaborators) -> Self {
        debug!("Creating MqttManager for {} props", router.registry().len());
        let link_monitor = LinkMonitor::new(settings.fault_report_interval_ms);
        let supervisor = BrokerSupervisor::new(
            settings.client_id.clone(),
            settings.retry_interval_ms,
            settings.identity,
        );
        let broadcaster = StatusBroadcaster::new(settings.broadcast_interval_ms);

        Self::new(
            settings,
            router,
            io,
            link_monitor,
            supervisor,
            broadcaster,
            HardwareStatus::Ok,
        )
    }

    /// Brings the network link up with the device identity and hands out a
    /// manager ready for the device loop.
    pub fn initialize(mut self) -> MqttManager<Running> {
        let identity = self.settings.identity;
        self.io.console.write_line("Initializing network link...");
        self.io.link.reinitialize(&identity);
        let address = format!("Local address: {}", identity);
        self.io.console.write_line(&address);
        self.io.console.write_line("Network link initialized");

        info!(
            "MqttManager {} running with {} props",
            self.settings.client_id,
            self.router.registry().len()
        );
        self.transition()
    }
}

impl MqttManager<Running> {
    /// One device-loop tick: hardware check, broker supervision, heartbeat.
    ///
    /// `states` holds the current state string of every prop, in registry order.
    pub fn routine<S: AsRef<str>>(&mut self, states: &[S]) -> RoutineReport {
        let connection = self.check();
        if let Err(e) = &connection {
            debug!("Check: {}", e);
        }

        let broadcast = self.broadcast_statuses(states);
        if let Err(e) = &broadcast {
            debug!("Broadcast: {}", e);
        }

        RoutineReport {
            hardware: self.hardware,
            connection,
            broadcast,
        }
    }

    pub fn check(&mut self) -> Result<ConnectionState, ManagerError> {
        let now = self.io.clock.now_millis();
        let (link, console) = (&*self.io.link, &*self.io.console);
        self.hardware = self.link_monitor.check_hardware(link, console, now);

        self.supervisor.check(
            self.hardware,
            &mut *self.io.transport,
            &mut *self.io.link,
            &*self.io.console,
            &mut self.router,
            now,
        )
    }

    pub fn broadcast_statuses<S: AsRef<str>>(
        &mut self,
        states: &[S],
    ) -> Result<Option<BroadcastReport>, ManagerError> {
        let now = self.io.clock.now_millis();
        self.broadcaster.broadcast_statuses(
            self.router.registry(),
            states,
            &mut *self.io.transport,
            now,
        )
    }

    /// Publishes a non-retained message on an arbitrary topic.
    pub fn publish(&mut self, topic: &str, payload: &str) -> Result<(), ManagerError> {
        if self.io.transport.publish(topic, payload.as_bytes(), false) {
            Ok(())
        } else {
            Err(ManagerError::PublishFailed {
                topic: topic.to_string(),
            })
        }
    }

    /// Subscribes an additional topic for the current session only; it is
    /// not re-subscribed after a reconnect. Messages on it reach the fallback
    /// handler.
    pub fn subscribe(&mut self, topic: &str) -> Result<(), ManagerError> {
        if self.io.transport.subscribe(topic) {
            Ok(())
        } else {
            Err(ManagerError::SubscribeFailed {
                topic: topic.to_string(),
            })
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    pub fn hardware_status(&self) -> HardwareStatus {
        self.hardware
    }
}
