//! Inbound command routing
//!
//! Topics follow the room convention:
//!
//! ```text
//! /er/<prop id>/cmd   activate | finish | reset   -> that prop's callback
//! /er/cmd             start | reset               -> room-wide hook
//! anything else                                   -> fallback handler (optional)
//! ```
//!
//! Matching is exact and case-sensitive on both topic and payload.

use std::fmt;

use tracing::{debug, info};

use crate::props::{PropCommand, PropRegistry, RoomCommand, RoomHooks};

pub const GLOBAL_COMMAND_TOPIC: &str = "/er/cmd";
pub const BROADCAST_TOPIC: &str = "/er/riddles/info";

pub fn prop_command_topic(id: &str) -> String {
    format!("/er/{id}/cmd")
}

/// Receives every message the room namespace does not handle.
pub type FallbackHandler = Box<dyn FnMut(&str, &[u8])>;

/// Which branch handled an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Prop { index: usize, command: PropCommand },
    Room(RoomCommand),
    Fallback,
    Unmatched,
}

pub struct TopicRouter {
    registry: PropRegistry,
    /// Same order as the registry
    command_topics: Vec<String>,
    room: RoomHooks,
    fallback: Option<FallbackHandler>,
    extra_topics: Vec<String>,
}

impl TopicRouter {
    pub fn new(registry: PropRegistry, room: RoomHooks) -> Self {
        let command_topics = registry.iter().map(|prop| prop.command_topic()).collect();
        Self {
            registry,
            command_topics,
            room,
            fallback: None,
            extra_topics: Vec::new(),
        }
    }

    pub fn with_fallback(mut self, handler: impl FnMut(&str, &[u8]) + 'static) -> Self {
        self.fallback = Some(Box::new(handler));
        self
    }

    pub fn with_extra_topics(mut self, topics: Vec<String>) -> Self {
        self.extra_topics = topics;
        self
    }

    pub fn registry(&self) -> &PropRegistry {
        &self.registry
    }

    /// Everything to subscribe after a (re)connect: prop command topics in
    /// registry order, the global command topic, then the extra topics.
    pub fn subscriptions(&self) -> impl Iterator<Item = &str> {
        self.command_topics
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(GLOBAL_COMMAND_TOPIC))
            .chain(self.extra_topics.iter().map(String::as_str))
    }

    pub fn dispatch(&mut self, topic: &str, payload: &[u8]) -> Dispatch {
        if let Some(index) = self.command_topics.iter().position(|t| t == topic) {
            if let Some(command) = PropCommand::parse(payload) {
                if let Some(prop) = self.registry.iter_mut().nth(index) {
                    if prop.callbacks_mut().invoke(command) {
                        info!("Prop {}: {}", prop.id(), command.as_str());
                        return Dispatch::Prop { index, command };
                    }
                    debug!("Prop {} has no {} callback", prop.id(), command.as_str());
                }
            }
            return self.fall_back(topic, payload);
        }

        if topic == GLOBAL_COMMAND_TOPIC {
            if let Some(command) = RoomCommand::parse(payload) {
                info!("Room command: {:?}", command);
                if !self.room.invoke(command) {
                    debug!("No room hook for {:?}", command);
                }
                return Dispatch::Room(command);
            }
        }

        self.fall_back(topic, payload)
    }

    fn fall_back(&mut self, topic: &str, payload: &[u8]) -> Dispatch {
        match self.fallback.as_mut() {
            Some(handler) => {
                handler(topic, payload);
                Dispatch::Fallback
            }
            None => {
                debug!("Dropped message on {} ({} bytes)", topic, payload.len());
                Dispatch::Unmatched
            }
        }
    }
}

impl fmt::Debug for TopicRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicRouter")
            .field("registry", &self.registry)
            .field("room", &self.room)
            .field("fallback", &self.fallback.is_some())
            .field("extra_topics", &self.extra_topics)
            .finish()
    }
}
