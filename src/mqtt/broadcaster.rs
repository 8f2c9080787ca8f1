//! Periodic status heartbeat for the room-control panel

use tracing::{debug, warn};

use super::message_manager::format_status;
use super::router::BROADCAST_TOPIC;
use super::transport::Transport;
use crate::error::ManagerError;
use crate::platform::interval_elapsed;
use crate::props::PropRegistry;

/// What one broadcast batch did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub published: usize,
    /// Hidden props (`_` prefix or negative number)
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct StatusBroadcaster {
    interval_ms: u64,
    last_broadcast: Option<u64>,
}

impl StatusBroadcaster {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_broadcast: None,
        }
    }

    /// Publishes one status message per visible prop, at most once per
    /// interval. Returns `Ok(None)` when called inside the current window.
    ///
    /// A failed publish does not stop the batch and is not retried.
    pub fn broadcast_statuses<S: AsRef<str>>(
        &mut self,
        registry: &PropRegistry,
        states: &[S],
        transport: &mut dyn Transport,
        now: u64,
    ) -> Result<Option<BroadcastReport>, ManagerError> {
        if !interval_elapsed(self.last_broadcast, now, self.interval_ms) {
            return Ok(None);
        }
        if states.len() != registry.len() {
            return Err(ManagerError::StateCountMismatch {
                expected: registry.len(),
                actual: states.len(),
            });
        }

        let mut report = BroadcastReport::default();
        for (prop, state) in registry.iter().zip(states) {
            if !prop.is_broadcast() {
                report.skipped += 1;
                continue;
            }

            let payload = match format_status(
                prop.id(),
                &prop.display_name(),
                state.as_ref(),
                prop.number(),
            ) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Status of {} not sent: {}", prop.id(), e);
                    report.failed += 1;
                    continue;
                }
            };

            if transport.publish(BROADCAST_TOPIC, payload.as_bytes(), false) {
                report.published += 1;
            } else {
                report.failed += 1;
            }
        }

        self.last_broadcast = Some(now);
        debug!("Status broadcast: {:?}", report);
        Ok(Some(report))
    }
}
