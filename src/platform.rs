//! Console and clock collaborators
//!
//! The manager never reads the wall clock or prints directly. Both go through
//! these traits so a test can drive time by hand and capture every
//! diagnostic line.

use std::time::Instant;

use tracing::info;

/// Sink for operator-facing diagnostic lines.
pub trait Console {
    fn write_line(&self, text: &str);
}

/// Monotonic millisecond clock.
pub trait Clock {
    fn now_millis(&self) -> u64;
}

/// Forwards diagnostic lines into the `tracing` pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingConsole;

impl Console for TracingConsole {
    fn write_line(&self, text: &str) {
        info!(target: "propcontroller::console", "{}", text);
    }
}

/// Milliseconds since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Returns `true` once `interval_ms` has passed since `last`, or when there is no `last`.
pub(crate) fn interval_elapsed(last: Option<u64>, now: u64, interval_ms: u64) -> bool {
    match last {
        None => true,
        Some(last) => now.saturating_sub(last) >= interval_ms,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Hand-driven fakes for the collaborator traits

    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::{Clock, Console};

    #[derive(Debug, Default, Clone)]
    pub struct ManualClock {
        now: Rc<Cell<u64>>,
    }

    impl ManualClock {
        pub fn at(millis: u64) -> Self {
            let clock = Self::default();
            clock.set(millis);
            clock
        }

        pub fn set(&self, millis: u64) {
            self.now.set(millis);
        }

        pub fn advance(&self, millis: u64) {
            self.now.set(self.now.get() + millis);
        }
    }

    impl Clock for ManualClock {
        fn now_millis(&self) -> u64 {
            self.now.get()
        }
    }

    #[derive(Debug, Default, Clone)]
    pub struct RecordingConsole {
        lines: Rc<RefCell<Vec<String>>>,
    }

    impl RecordingConsole {
        pub fn lines(&self) -> Vec<String> {
            self.lines.borrow().clone()
        }

        pub fn count_containing(&self, needle: &str) -> usize {
            self.lines
                .borrow()
                .iter()
                .filter(|line| line.contains(needle))
                .count()
        }
    }

    impl Console for RecordingConsole {
        fn write_line(&self, text: &str) {
            self.lines.borrow_mut().push(text.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_is_inclusive_at_the_boundary() {
        assert!(interval_elapsed(None, 0, 5000));
        assert!(!interval_elapsed(Some(1000), 5999, 5000));
        assert!(interval_elapsed(Some(1000), 6000, 5000));
    }

    #[test]
    fn clock_going_backwards_never_elapses() {
        assert!(!interval_elapsed(Some(10_000), 500, 1000));
    }
}
