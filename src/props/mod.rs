//! Props and the registry the manager routes commands to
//!
//! A prop is one physical puzzle. The surrounding application builds the
//! [`PropRegistry`] once at startup; after that the manager only reads prop
//! identities and invokes their callbacks.

pub mod relay;

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

use crate::mqtt::message_manager::display_name;
use crate::mqtt::router::prop_command_topic;

/// Ids starting with this prefix are routed but never broadcast.
pub const EXCLUDE_PREFIX: char = '_';

/// Longest accepted prop id in bytes.
pub const PROP_ID_MAX_LEN: usize = 31;

/// Callback attached to a prop or room command.
pub type Action = Box<dyn FnMut()>;

/// Lifecycle command addressed to a single prop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropCommand {
    Activate,
    Finish,
    Reset,
}

impl PropCommand {
    /// Exact, case-sensitive payload match.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        match payload {
            b"activate" => Some(PropCommand::Activate),
            b"finish" => Some(PropCommand::Finish),
            b"reset" => Some(PropCommand::Reset),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PropCommand::Activate => "activate",
            PropCommand::Finish => "finish",
            PropCommand::Reset => "reset",
        }
    }
}

/// Room-wide command sent on the global command topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomCommand {
    Start,
    Reset,
}

impl RoomCommand {
    pub fn parse(payload: &[u8]) -> Option<Self> {
        match payload {
            b"start" => Some(RoomCommand::Start),
            b"reset" => Some(RoomCommand::Reset),
            _ => None,
        }
    }
}

/// States the room-control panel knows how to display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropState {
    #[default]
    NotActivated,
    Activated,
    Finished,
}

impl PropState {
    pub fn as_str(self) -> &'static str {
        match self {
            PropState::NotActivated => "Not activated",
            PropState::Activated => "Activated",
            PropState::Finished => "Finished",
        }
    }
}

impl fmt::Display for PropState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for PropState {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// The three optional lifecycle hooks of a prop.
#[derive(Default)]
pub struct PropCallbacks {
    on_activate: Option<Action>,
    on_finish: Option<Action>,
    on_reset: Option<Action>,
}

impl PropCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_activate(mut self, action: impl FnMut() + 'static) -> Self {
        self.on_activate = Some(Box::new(action));
        self
    }

    pub fn on_finish(mut self, action: impl FnMut() + 'static) -> Self {
        self.on_finish = Some(Box::new(action));
        self
    }

    pub fn on_reset(mut self, action: impl FnMut() + 'static) -> Self {
        self.on_reset = Some(Box::new(action));
        self
    }

    pub fn has(&self, command: PropCommand) -> bool {
        match command {
            PropCommand::Activate => self.on_activate.is_some(),
            PropCommand::Finish => self.on_finish.is_some(),
            PropCommand::Reset => self.on_reset.is_some(),
        }
    }

    /// Runs the hook for `command`. Returns `false` if none is attached.
    pub fn invoke(&mut self, command: PropCommand) -> bool {
        let slot = match command {
            PropCommand::Activate => &mut self.on_activate,
            PropCommand::Finish => &mut self.on_finish,
            PropCommand::Reset => &mut self.on_reset,
        };
        match slot {
            Some(action) => {
                action();
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for PropCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropCallbacks")
            .field("on_activate", &self.on_activate.is_some())
            .field("on_finish", &self.on_finish.is_some())
            .field("on_reset", &self.on_reset.is_some())
            .finish()
    }
}

/// Room start/reset hooks.
#[derive(Default)]
pub struct RoomHooks {
    on_start: Option<Action>,
    on_reset: Option<Action>,
}

impl RoomHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start(mut self, action: impl FnMut() + 'static) -> Self {
        self.on_start = Some(Box::new(action));
        self
    }

    pub fn on_reset(mut self, action: impl FnMut() + 'static) -> Self {
        self.on_reset = Some(Box::new(action));
        self
    }

    pub fn invoke(&mut self, command: RoomCommand) -> bool {
        let slot = match command {
            RoomCommand::Start => &mut self.on_start,
            RoomCommand::Reset => &mut self.on_reset,
        };
        match slot {
            Some(action) => {
                action();
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for RoomHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomHooks")
            .field("on_start", &self.on_start.is_some())
            .field("on_reset", &self.on_reset.is_some())
            .finish()
    }
}

#[derive(Debug)]
pub struct Prop {
    id: String,
    number: i32,
    name: Option<String>,
    callbacks: PropCallbacks,
}

impl Prop {
    pub fn new(id: impl Into<String>, number: i32) -> Self {
        Self {
            id: id.into(),
            number,
            name: None,
            callbacks: PropCallbacks::default(),
        }
    }

    /// Overrides the name derived from the id.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_callbacks(mut self, callbacks: PropCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Index shown in the room-control panel
    pub fn number(&self) -> i32 {
        self.number
    }

    pub fn display_name(&self) -> Cow<'_, str> {
        match &self.name {
            Some(name) => Cow::Borrowed(name.as_str()),
            None => Cow::Owned(display_name(&self.id)),
        }
    }

    pub fn command_topic(&self) -> String {
        prop_command_topic(&self.id)
    }

    /// Hidden props are excluded from status broadcasts.
    pub fn is_broadcast(&self) -> bool {
        !self.id.starts_with(EXCLUDE_PREFIX) && self.number >= 0
    }

    pub fn callbacks(&self) -> &PropCallbacks {
        &self.callbacks
    }

    pub(crate) fn callbacks_mut(&mut self) -> &mut PropCallbacks {
        &mut self.callbacks
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("prop #{index} has an empty id")]
    EmptyId { index: usize },

    #[error("prop id {id:?} is registered twice")]
    DuplicateId { id: String },

    #[error("prop id {id:?} is longer than {max} bytes")]
    IdTooLong { id: String, max: usize },

    #[error("prop id {id:?} contains invalid character {ch:?}")]
    InvalidId { id: String, ch: char },
}

/// Insertion-ordered, fixed set of props.
#[derive(Debug, Default)]
pub struct PropRegistry {
    props: Vec<Prop>,
}

impl PropRegistry {
    pub fn new(props: Vec<Prop>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        for (index, prop) in props.iter().enumerate() {
            validate_id(index, &prop.id)?;
            if !seen.insert(prop.id.as_str()) {
                return Err(RegistryError::DuplicateId {
                    id: prop.id.clone(),
                });
            }
        }
        Ok(Self { props })
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Prop> {
        self.props.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Prop> {
        self.props.get(index)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.props.iter().position(|prop| prop.id == id)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Prop> {
        self.props.iter_mut()
    }
}

fn validate_id(index: usize, id: &str) -> Result<(), RegistryError> {
    if id.is_empty() {
        return Err(RegistryError::EmptyId { index });
    }
    if id.len() > PROP_ID_MAX_LEN {
        return Err(RegistryError::IdTooLong {
            id: id.to_string(),
            max: PROP_ID_MAX_LEN,
        });
    }
    // Ids end up inside topics and unescaped-looking JSON
    if let Some(ch) = id.chars().find(|&c| !is_id_char(c)) {
        return Err(RegistryError::InvalidId {
            id: id.to_string(),
            ch,
        });
    }
    Ok(())
}

fn is_id_char(c: char) -> bool {
    c.is_ascii() && !c.is_ascii_whitespace() && !matches!(c, '"' | '/' | '+' | '#')
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn commands_match_exactly() {
        assert_eq!(
            PropCommand::parse(b"activate"),
            Some(PropCommand::Activate)
        );
        assert_eq!(PropCommand::parse(b"Activate"), None);
        assert_eq!(PropCommand::parse(b"reset "), None);
        assert_eq!(RoomCommand::parse(b"start"), Some(RoomCommand::Start));
        assert_eq!(RoomCommand::parse(b"activate"), None);
    }

    #[test]
    fn callbacks_report_missing_slots() {
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        let count = move || counter.set(counter.get() + 1);
        let mut callbacks = PropCallbacks::new().on_finish(count);

        assert!(!callbacks.invoke(PropCommand::Activate));
        assert!(callbacks.invoke(PropCommand::Finish));
        assert!(callbacks.has(PropCommand::Finish));
        assert!(!callbacks.has(PropCommand::Reset));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn hidden_props_are_not_broadcast() {
        assert!(Prop::new("box", 2).is_broadcast());
        assert!(!Prop::new("_mokka", 8).is_broadcast());
        assert!(!Prop::new("box", -1).is_broadcast());
    }

    #[test]
    fn explicit_name_wins_over_derived() {
        assert_eq!(Prop::new("yammy_choco", 5).display_name(), "Yammy choco");
        let named = Prop::new("yammy_choco", 5).with_name("Chocolate");
        assert_eq!(named.display_name(), "Chocolate");
    }

    #[test]
    fn registry_keeps_insertion_order() {
        let registry = PropRegistry::new(vec![
            Prop::new("box", 2),
            Prop::new("yammy_choco", 5),
            Prop::new("_mokka", 8),
        ])
        .unwrap();

        let ids: Vec<_> = registry.iter().map(Prop::id).collect();
        assert_eq!(ids, ["box", "yammy_choco", "_mokka"]);
        assert_eq!(registry.position("_mokka"), Some(2));
    }

    #[test]
    fn registry_rejects_bad_ids() {
        let twice = vec![Prop::new("box", 1), Prop::new("box", 2)];
        assert_eq!(
            PropRegistry::new(twice).unwrap_err(),
            RegistryError::DuplicateId { id: "box".into() }
        );
        assert_eq!(
            PropRegistry::new(vec![Prop::new("", 1)]).unwrap_err(),
            RegistryError::EmptyId { index: 0 }
        );
        assert!(matches!(
            PropRegistry::new(vec![Prop::new("a/b", 1)]),
            Err(RegistryError::InvalidId { ch: '/', .. })
        ));
        assert!(matches!(
            PropRegistry::new(vec![Prop::new("say\"hi", 1)]),
            Err(RegistryError::InvalidId { ch: '"', .. })
        ));
        assert!(matches!(
            PropRegistry::new(vec![Prop::new("x".repeat(32), 1)]),
            Err(RegistryError::IdTooLong { max: 31, .. })
        ));
    }
}
