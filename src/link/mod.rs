//! Physical link monitoring
//!
//! Before any broker traffic is attempted the manager asks the link layer
//! whether the network adapter is present and the cable is plugged in. While
//! either is missing, reconnect attempts are suppressed and a diagnostic line
//! is written at most once per report window.

pub mod sysfs;

use std::fmt;
use std::net::Ipv4Addr;

use tracing::{debug, info};

use crate::platform::{interval_elapsed, Console};

pub use sysfs::SysfsLink;

/// Vendor part of the device MAC; the last octet is the device's `ip_ending`.
pub const MAC_PREFIX: [u8; 5] = [0x90, 0xA2, 0xDA, 0x10, 0xA9];

/// Outcome of a hardware check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareStatus {
    Ok,
    NoAdapter,
    NoLink,
}

impl HardwareStatus {
    pub fn is_ok(self) -> bool {
        self == HardwareStatus::Ok
    }
}

impl fmt::Display for HardwareStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HardwareStatus::Ok => write!(f, "network hardware ok"),
            HardwareStatus::NoAdapter => write!(f, "network adapter missing"),
            HardwareStatus::NoLink => write!(f, "LAN cable missing"),
        }
    }
}

/// Addressing the lower layer is (re)brought up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkIdentity {
    pub mac: [u8; 6],
    pub address: Ipv4Addr,
}

impl LinkIdentity {
    /// Derives MAC and address from the per-device `ip_ending` within a /24 subnet.
    pub fn from_ip_ending(subnet: [u8; 3], ip_ending: u8) -> Self {
        let mut mac = [0u8; 6];
        mac[..5].copy_from_slice(&MAC_PREFIX);
        mac[5] = ip_ending;
        Self {
            mac,
            address: Ipv4Addr::new(subnet[0], subnet[1], subnet[2], ip_ending),
        }
    }

    pub fn mac_string(&self) -> String {
        self.mac
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(":")
    }
}

impl fmt::Display for LinkIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.address, self.mac_string())
    }
}

/// Lower network layer the manager depends on.
pub trait LinkLayer {
    fn hardware_present(&self) -> bool;

    fn link_up(&self) -> bool;

    /// Re-establishes the interface, e.g. after a failed broker connect.
    fn reinitialize(&mut self, identity: &LinkIdentity);
}

/// Rate-limited hardware fault reporter.
#[derive(Debug, Clone)]
pub struct LinkMonitor {
    report_interval_ms: u64,
    last_report: Option<u64>,
    faulted: bool,
}

impl LinkMonitor {
    pub fn new(report_interval_ms: u64) -> Self {
        Self {
            report_interval_ms,
            last_report: None,
            faulted: false,
        }
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    pub fn check_hardware(
        &mut self,
        link: &dyn LinkLayer,
        console: &dyn Console,
        now: u64,
    ) -> HardwareStatus {
        let status = if !link.hardware_present() {
            HardwareStatus::NoAdapter
        } else if !link.link_up() {
            HardwareStatus::NoLink
        } else {
            HardwareStatus::Ok
        };

        if status.is_ok() {
            if self.faulted {
                console.write_line("network hardware is restored");
                info!("Network hardware restored");
                // A new fault after recovery is reported right away
                self.last_report = None;
            }
            self.faulted = false;
            return status;
        }

        if interval_elapsed(self.last_report, now, self.report_interval_ms) {
            console.write_line(&status.to_string());
            self.last_report = Some(now);
        } else {
            debug!("Suppressed repeated hardware fault report: {}", status);
        }
        self.faulted = true;
        status
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::{LinkIdentity, LinkLayer};

    /// Link whose state is flipped by the test.
    #[derive(Debug, Clone)]
    pub struct FakeLink {
        pub adapter: Rc<Cell<bool>>,
        pub link: Rc<Cell<bool>>,
        pub reinits: Rc<RefCell<Vec<LinkIdentity>>>,
    }

    impl FakeLink {
        pub fn up() -> Self {
            Self {
                adapter: Rc::new(Cell::new(true)),
                link: Rc::new(Cell::new(true)),
                reinits: Rc::default(),
            }
        }

        pub fn reinit_count(&self) -> usize {
            self.reinits.borrow().len()
        }
    }

    impl LinkLayer for FakeLink {
        fn hardware_present(&self) -> bool {
            self.adapter.get()
        }

        fn link_up(&self) -> bool {
            self.link.get()
        }

        fn reinitialize(&mut self, identity: &LinkIdentity) {
            self.reinits.borrow_mut().push(*identity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeLink;
    use super::*;
    use crate::platform::testing::RecordingConsole;

    #[test]
    fn identity_follows_ip_ending() {
        let identity = LinkIdentity::from_ip_ending([192, 168, 10], 42);
        assert_eq!(identity.address, Ipv4Addr::new(192, 168, 10, 42));
        assert_eq!(identity.mac_string(), "90:A2:DA:10:A9:2A");
    }

    #[test]
    fn adapter_is_checked_before_cable() {
        let link = FakeLink::up();
        link.adapter.set(false);
        link.link.set(false);
        let console = RecordingConsole::default();
        let mut monitor = LinkMonitor::new(1000);

        assert_eq!(
            monitor.check_hardware(&link, &console, 0),
            HardwareStatus::NoAdapter
        );
        assert_eq!(console.lines(), vec!["network adapter missing"]);
    }

    #[test]
    fn persistent_fault_is_reported_once_per_window() {
        let link = FakeLink::up();
        link.link.set(false);
        let console = RecordingConsole::default();
        let mut monitor = LinkMonitor::new(1000);

        for now in [0, 300, 900] {
            assert_eq!(
                monitor.check_hardware(&link, &console, now),
                HardwareStatus::NoLink
            );
        }
        assert_eq!(console.count_containing("LAN cable missing"), 1);

        monitor.check_hardware(&link, &console, 1000);
        assert_eq!(console.count_containing("LAN cable missing"), 2);
    }

    #[test]
    fn recovery_is_reported_once() {
        let link = FakeLink::up();
        link.link.set(false);
        let console = RecordingConsole::default();
        let mut monitor = LinkMonitor::new(1000);

        monitor.check_hardware(&link, &console, 0);
        link.link.set(true);
        assert!(monitor.check_hardware(&link, &console, 10).is_ok());
        assert!(monitor.check_hardware(&link, &console, 20).is_ok());

        assert_eq!(console.count_containing("restored"), 1);
        assert!(!monitor.is_faulted());
    }

    #[test]
    fn fault_after_recovery_is_reported_immediately() {
        let link = FakeLink::up();
        let console = RecordingConsole::default();
        let mut monitor = LinkMonitor::new(1000);

        link.link.set(false);
        monitor.check_hardware(&link, &console, 0);
        link.link.set(true);
        monitor.check_hardware(&link, &console, 200);
        link.link.set(false);
        assert_eq!(
            monitor.check_hardware(&link, &console, 400),
            HardwareStatus::NoLink
        );

        assert_eq!(console.count_containing("LAN cable missing"), 2);
        assert!(monitor.is_faulted());
    }

    #[test]
    fn healthy_link_is_silent() {
        let link = FakeLink::up();
        let console = RecordingConsole::default();
        let mut monitor = LinkMonitor::new(1000);

        assert!(monitor.check_hardware(&link, &console, 0).is_ok());
        assert!(console.lines().is_empty());
    }
}
