//! Linux link layer backed by `/sys/class/net`

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, info, warn};

use super::{LinkIdentity, LinkLayer};

pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/net";

/// Reads adapter presence and carrier state of one interface.
///
/// `reinitialize` runs the configured command with `PROP_IFACE`, `PROP_MAC`
/// and `PROP_ADDRESS` in its environment. Without a command it only logs.
#[derive(Debug, Clone)]
pub struct SysfsLink {
    interface: String,
    root: PathBuf,
    reinit_command: Vec<String>,
}

impl SysfsLink {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            root: PathBuf::from(DEFAULT_SYSFS_ROOT),
            reinit_command: Vec::new(),
        }
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_reinit_command(mut self, command: Vec<String>) -> Self {
        self.reinit_command = command;
        self
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    fn interface_dir(&self) -> PathBuf {
        self.root.join(&self.interface)
    }
}

impl LinkLayer for SysfsLink {
    fn hardware_present(&self) -> bool {
        self.interface_dir().is_dir()
    }

    fn link_up(&self) -> bool {
        // Reading carrier fails with EINVAL while the interface is down
        match fs::read_to_string(self.interface_dir().join("carrier")) {
            Ok(content) => content.trim() == "1",
            Err(e) => {
                debug!("Reading carrier of {} failed: {}", self.interface, e);
                false
            }
        }
    }

    fn reinitialize(&mut self, identity: &LinkIdentity) {
        let Some((program, args)) = self.reinit_command.split_first() else {
            debug!(
                "No reinit command configured for {}, keeping {}",
                self.interface, identity
            );
            return;
        };

        info!("Reinitializing {} as {}", self.interface, identity);
        let result = Command::new(program)
            .args(args)
            .env("PROP_IFACE", &self.interface)
            .env("PROP_MAC", identity.mac_string())
            .env("PROP_ADDRESS", identity.address.to_string())
            .status();

        match result {
            Ok(status) if status.success() => debug!("Reinit command finished"),
            Ok(status) => warn!("Reinit command exited with {}", status),
            Err(e) => warn!("Failed to run reinit command {}: {}", program, e),
        }
    }
}
