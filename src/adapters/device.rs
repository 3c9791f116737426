//! Device conditions for the recurring backup

use std::sync::atomic::{AtomicBool, Ordering};

use crate::backup::DeviceConditions;

/// Conditions set by the caller rather than read from the system
#[derive(Debug, Default)]
pub struct StaticConditions {
    charging: AtomicBool,
    network: AtomicBool,
}

impl StaticConditions {
    pub fn new(charging: bool, network: bool) -> Self {
        Self {
            charging: AtomicBool::new(charging),
            network: AtomicBool::new(network),
        }
    }

    /// A plugged-in, connected machine
    pub fn always_ready() -> Self {
        Self::new(true, true)
    }

    pub fn set_charging(&self, charging: bool) {
        self.charging.store(charging, Ordering::SeqCst);
    }

    pub fn set_network(&self, network: bool) {
        self.network.store(network, Ordering::SeqCst);
    }
}

impl DeviceConditions for StaticConditions {
    fn is_charging(&self) -> bool {
        self.charging.load(Ordering::SeqCst)
    }

    fn has_network(&self) -> bool {
        self.network.load(Ordering::SeqCst)
    }
}
