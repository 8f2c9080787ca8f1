//! Broker transport seam and its rumqttc implementation
//!
//! The manager only needs six operations from the MQTT client. Keeping them
//! behind [`Transport`] lets the connection state machine run against a
//! scripted fake in tests and against `rumqttc` on the device.

use std::time::{Duration, Instant};

use rumqttc::{
    Client, ConnectReturnCode, Connection, ConnectionError, Event, MqttOptions, Packet, QoS,
    SubscribeFilter,
};
use tracing::{debug, info, warn};

use super::config::MqttConfig;

/// Return codes reported by [`Transport::last_error_code`].
///
/// Negative values are client-side conditions, positive values are the
/// broker's CONNACK refusal codes.
pub mod codes {
    pub const CONNECTION_TIMEOUT: i32 = -4;
    pub const CONNECTION_LOST: i32 = -3;
    pub const CONNECT_FAILED: i32 = -2;
    pub const DISCONNECTED: i32 = -1;
    pub const CONNECTED: i32 = 0;
    pub const BAD_PROTOCOL: i32 = 1;
    pub const BAD_CLIENT_ID: i32 = 2;
    pub const UNAVAILABLE: i32 = 3;
    pub const BAD_CREDENTIALS: i32 = 4;
    pub const UNAUTHORIZED: i32 = 5;
}

/// Minimal publish/subscribe client used by the manager.
///
/// Every call must return within a bounded time; the whole device loop stalls
/// while one of them blocks.
pub trait Transport {
    fn connect(&mut self, client_id: &str) -> bool;

    fn is_connected(&self) -> bool;

    fn publish(&mut self, topic: &str, payload: &[u8], retained: bool) -> bool;

    fn subscribe(&mut self, topic: &str) -> bool;

    /// Subscribes a whole topic set, returns how many topics were accepted.
    fn subscribe_many(&mut self, topics: &[&str]) -> usize {
        topics.iter().filter(|topic| self.subscribe(topic)).count()
    }

    /// Drives keep-alives and hands every received message to `on_message`.
    fn pump_once(&mut self, on_message: &mut dyn FnMut(&str, &[u8]));

    fn last_error_code(&self) -> i32;
}

/// Topic filters carried by one SUBSCRIBE packet.
///
/// Each packet takes one slot of the request queue, so a session can hold at
/// most `request_capacity * SUBSCRIBE_BATCH` topics.
pub const SUBSCRIBE_BATCH: usize = 32;

/// [`Transport`] over the synchronous `rumqttc` client.
///
/// A fresh client/connection pair is created on every `connect`, so a
/// failed session never lingers in the background.
pub struct RumqttTransport {
    config: MqttConfig,
    session: Option<(Client, Connection)>,
    connected: bool,
    last_error: i32,
}

impl RumqttTransport {
    pub fn new(config: MqttConfig) -> Self {
        Self {
            config,
            session: None,
            connected: false,
            last_error: codes::DISCONNECTED,
        }
    }

    fn options(&self, client_id: &str) -> MqttOptions {
        let mut options = MqttOptions::new(client_id, self.config.host.clone(), self.config.port);
        options
            .set_keep_alive(Duration::from_secs(self.config.keep_alive_secs))
            .set_clean_session(true);
        if let Some(user) = &self.config.username {
            let password = self.config.password.clone().unwrap_or_default();
            options.set_credentials(user.clone(), password);
        }
        options
    }

    /// Session with a client whose event loop is never polled, so requests
    /// only fill the queue.
    #[cfg(test)]
    pub(crate) fn with_idle_session(mut self, client_id: &str) -> Self {
        let session = Client::new(self.options(client_id), self.config.request_capacity);
        self.session = Some(session);
        self.connected = true;
        self
    }

    fn mark_lost(&mut self, code: i32) {
        self.connected = false;
        self.last_error = code;
    }
}

impl Transport for RumqttTransport {
    fn connect(&mut self, client_id: &str) -> bool {
        self.session = None;
        self.connected = false;

        let (client, mut connection) =
            Client::new(self.options(client_id), self.config.request_capacity);
        let deadline = Instant::now() + Duration::from_millis(self.config.connect_timeout_ms);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.last_error = codes::CONNECTION_TIMEOUT;
                return false;
            }

            match connection.recv_timeout(remaining) {
                Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
                    if ack.code != ConnectReturnCode::Success {
                        self.last_error = refusal_code(ack.code);
                        return false;
                    }
                    info!(
                        "Connected to {}:{} as {}",
                        self.config.host, self.config.port, client_id
                    );
                    self.connected = true;
                    self.last_error = codes::CONNECTED;
                    self.session = Some((client, connection));
                    return true;
                }
                Ok(Ok(event)) => debug!("Event while connecting: {:?}", event),
                Ok(Err(e)) => {
                    debug!("Connect to {} failed: {}", self.config.host, e);
                    self.last_error = error_code(&e, false);
                    return false;
                }
                Err(_) => {
                    self.last_error = codes::CONNECTION_TIMEOUT;
                    return false;
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retained: bool) -> bool {
        let Some((client, _)) = self.session.as_ref().filter(|_| self.connected) else {
            return false;
        };
        match client.try_publish(topic, QoS::AtMostOnce, retained, payload.to_vec()) {
            Ok(()) => true,
            Err(e) => {
                debug!("Publish to {} rejected: {}", topic, e);
                false
            }
        }
    }

    fn subscribe(&mut self, topic: &str) -> bool {
        let Some((client, _)) = self.session.as_ref().filter(|_| self.connected) else {
            return false;
        };
        match client.try_subscribe(topic, QoS::AtMostOnce) {
            Ok(()) => true,
            Err(e) => {
                warn!("Subscribe to {} rejected: {}", topic, e);
                false
            }
        }
    }

    fn subscribe_many(&mut self, topics: &[&str]) -> usize {
        let Some((client, _)) = self.session.as_ref().filter(|_| self.connected) else {
            return 0;
        };

        let mut accepted = 0;
        for batch in topics.chunks(SUBSCRIBE_BATCH) {
            let filters = batch
                .iter()
                .map(|topic| SubscribeFilter::new(topic.to_string(), QoS::AtMostOnce));
            match client.try_subscribe_many(filters) {
                Ok(()) => accepted += batch.len(),
                Err(e) => warn!("Subscribing {} topics rejected: {}", batch.len(), e),
            }
        }
        accepted
    }

    fn pump_once(&mut self, on_message: &mut dyn FnMut(&str, &[u8])) {
        let timeout = Duration::from_millis(self.config.pump_timeout_ms);
        let mut lost = None;

        if let Some((_, connection)) = self.session.as_mut() {
            for _ in 0..self.config.max_events_per_pump {
                match connection.recv_timeout(timeout) {
                    Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                        on_message(publish.topic.as_str(), publish.payload.as_ref());
                    }
                    Ok(Ok(Event::Incoming(Packet::Disconnect))) => {
                        lost = Some(codes::CONNECTION_LOST);
                        break;
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => {
                        warn!("MQTT connection error: {}", e);
                        lost = Some(error_code(&e, true));
                        break;
                    }
                    // Nothing pending within the pump window
                    Err(_) => break,
                }
            }
        }

        if let Some(code) = lost {
            self.session = None;
            self.mark_lost(code);
        }
    }

    fn last_error_code(&self) -> i32 {
        self.last_error
    }
}

fn refusal_code(code: ConnectReturnCode) -> i32 {
    match code {
        ConnectReturnCode::Success => codes::CONNECTED,
        ConnectReturnCode::RefusedProtocolVersion => codes::BAD_PROTOCOL,
        ConnectReturnCode::BadClientId => codes::BAD_CLIENT_ID,
        ConnectReturnCode::ServiceUnavailable => codes::UNAVAILABLE,
        ConnectReturnCode::BadUserNamePassword => codes::BAD_CREDENTIALS,
        ConnectReturnCode::NotAuthorized => codes::UNAUTHORIZED,
    }
}

fn error_code(error: &ConnectionError, established: bool) -> i32 {
    match error {
        ConnectionError::ConnectionRefused(code) => refusal_code(*code),
        ConnectionError::NetworkTimeout | ConnectionError::FlushTimeout => {
            codes::CONNECTION_TIMEOUT
        }
        _ if established => codes::CONNECTION_LOST,
        _ => codes::CONNECT_FAILED,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use super::{codes, Transport};

    #[derive(Debug, Default)]
    pub struct FakeState {
        pub connect_results: VecDeque<bool>,
        pub connect_calls: Vec<String>,
        pub connected: bool,
        pub publish_ok: bool,
        pub published: Vec<(String, String, bool)>,
        pub subscriptions: Vec<String>,
        pub inbound: VecDeque<(String, Vec<u8>)>,
        pub pumps: usize,
        pub error_code: i32,
    }

    /// Scripted transport. Connect attempts fail unless a result is queued.
    #[derive(Debug, Clone, Default)]
    pub struct FakeTransport {
        pub state: Rc<RefCell<FakeState>>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            let transport = Self::default();
            {
                let mut state = transport.state.borrow_mut();
                state.publish_ok = true;
                state.error_code = codes::DISCONNECTED;
            }
            transport
        }

        pub fn queue_connect(&self, result: bool) {
            self.state.borrow_mut().connect_results.push_back(result);
        }

        pub fn drop_connection(&self) {
            let mut state = self.state.borrow_mut();
            state.connected = false;
            state.error_code = codes::CONNECTION_LOST;
        }

        pub fn deliver(&self, topic: &str, payload: &str) {
            self.state
                .borrow_mut()
                .inbound
                .push_back((topic.to_string(), payload.as_bytes().to_vec()));
        }

        pub fn connect_calls(&self) -> usize {
            self.state.borrow().connect_calls.len()
        }

        pub fn published(&self) -> Vec<(String, String, bool)> {
            self.state.borrow().published.clone()
        }

        pub fn subscriptions(&self) -> Vec<String> {
            self.state.borrow().subscriptions.clone()
        }
    }

    impl Transport for FakeTransport {
        fn connect(&mut self, client_id: &str) -> bool {
            let mut state = self.state.borrow_mut();
            state.connect_calls.push(client_id.to_string());
            let ok = state.connect_results.pop_front().unwrap_or(false);
            state.connected = ok;
            state.error_code = if ok {
                codes::CONNECTED
            } else {
                codes::CONNECT_FAILED
            };
            ok
        }

        fn is_connected(&self) -> bool {
            self.state.borrow().connected
        }

        fn publish(&mut self, topic: &str, payload: &[u8], retained: bool) -> bool {
            let mut state = self.state.borrow_mut();
            if !state.connected || !state.publish_ok {
                return false;
            }
            let payload = String::from_utf8_lossy(payload).into_owned();
            state.published.push((topic.to_string(), payload, retained));
            true
        }

        fn subscribe(&mut self, topic: &str) -> bool {
            let mut state = self.state.borrow_mut();
            if !state.connected {
                return false;
            }
            state.subscriptions.push(topic.to_string());
            true
        }

        fn pump_once(&mut self, on_message: &mut dyn FnMut(&str, &[u8])) {
            let pending: Vec<_> = {
                let mut state = self.state.borrow_mut();
                state.pumps += 1;
                state.inbound.drain(..).collect()
            };
            for (topic, payload) in pending {
                on_message(&topic, &payload);
            }
        }

        fn last_error_code(&self) -> i32 {
            self.state.borrow().error_code
        }
    }
}
