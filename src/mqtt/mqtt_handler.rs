//! Broker connection state machine
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──ok──► Connected
//!      ▲                           │                 │
//!      └──────────failed───────────┘   transport lost (seen on next check)
//! ```
//!
//! Attempts are spaced by a fixed retry interval and never give up. After a
//! failed attempt the lower network layer is re-initialized, since a stale
//! interface configuration is a common cause of broker timeouts.

use tracing::{debug, info, warn};

use super::router::TopicRouter;
use super::transport::Transport;
use crate::error::ManagerError;
use crate::link::{HardwareStatus, LinkIdentity, LinkLayer};
use crate::platform::{interval_elapsed, Console};

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone)]
pub struct BrokerSupervisor {
    client_id: String,
    retry_interval_ms: u64,
    identity: LinkIdentity,
    state: ConnectionState,
    /// `None` until the first attempt and again after every success
    last_attempt: Option<u64>,
}

impl BrokerSupervisor {
    pub fn new(
        client_id: impl Into<String>,
        retry_interval_ms: u64,
        identity: LinkIdentity,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            retry_interval_ms,
            identity,
            state: ConnectionState::Disconnected,
            last_attempt: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// One supervision step.
    ///
    /// While connected this pumps the transport, which delivers inbound
    /// messages to `router`. While disconnected it attempts a reconnect once
    /// the retry interval has passed.
    pub fn check(
        &mut self,
        hardware: HardwareStatus,
        transport: &mut dyn Transport,
        link: &mut dyn LinkLayer,
        console: &dyn Console,
        router: &mut TopicRouter,
        now: u64,
    ) -> Result<ConnectionState, ManagerError> {
        if !hardware.is_ok() {
            return Err(ManagerError::TransportUnavailable(hardware));
        }

        if self.state == ConnectionState::Connected {
            if transport.is_connected() {
                transport.pump_once(&mut |topic, payload| {
                    router.dispatch(topic, payload);
                });
                return Ok(ConnectionState::Connected);
            }

            let code = transport.last_error_code();
            console.write_line(&format!("MQTT: Connection lost, return code: {code}"));
            warn!("Broker connection lost (code {})", code);
            self.state = ConnectionState::Disconnected;
        }

        if !interval_elapsed(self.last_attempt, now, self.retry_interval_ms) {
            return Ok(self.state);
        }

        self.last_attempt = Some(now);
        self.reconnect(transport, link, console, router)
    }

    fn reconnect(
        &mut self,
        transport: &mut dyn Transport,
        link: &mut dyn LinkLayer,
        console: &dyn Console,
        router: &TopicRouter,
    ) -> Result<ConnectionState, ManagerError> {
        self.state = ConnectionState::Connecting;
        console.write_line("MQTT: Connecting ...");

        if transport.connect(&self.client_id) {
            self.state = ConnectionState::Connected;
            console.write_line(&format!("MQTT: Connected (id: {})", self.client_id));
            let subscribed = resubscribe(transport, router);
            info!(
                "Connected as {}, {} topics subscribed",
                self.client_id, subscribed
            );
            self.last_attempt = None;
            return Ok(ConnectionState::Connected);
        }

        self.state = ConnectionState::Disconnected;
        let code = transport.last_error_code();
        console.write_line(&format!("MQTT: Failed, return code: {code}"));
        debug!(
            "Reinitializing link as {} before next attempt",
            self.identity
        );
        link.reinitialize(&self.identity);
        Err(ManagerError::ConnectFailed { code })
    }
}

/// Subscribes the router's full topic set, returns how many were accepted.
fn resubscribe(transport: &mut dyn Transport, router: &TopicRouter) -> usize {
    let topics: Vec<&str> = router.subscriptions().collect();
    let accepted = transport.subscribe_many(&topics);
    if accepted < topics.len() {
        warn!(
            "Only {} of {} topics subscribed, raise mqtt.request_capacity",
            accepted,
            topics.len()
        );
    }
    accepted
}
