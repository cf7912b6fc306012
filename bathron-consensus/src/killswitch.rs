//! The emergency burn kill switch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A process-wide switch that disables burn claims and mints.
///
/// Read by validators at their documented check points; flipping it is
/// idempotent and logged. It intentionally does not affect settlement: M1
/// already in circulation keeps working during an emergency.
#[derive(Clone, Debug)]
pub struct EmergencySwitch {
    burns_enabled: Arc<AtomicBool>,
}

impl EmergencySwitch {
    /// A switch in the default (enabled) position.
    pub fn new() -> EmergencySwitch {
        EmergencySwitch {
            burns_enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn burns_enabled(&self) -> bool {
        self.burns_enabled.load(Ordering::SeqCst)
    }

    pub fn set_burns_enabled(&self, enabled: bool) {
        let previous = self.burns_enabled.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            tracing::warn!(enabled, "emergency burn switch flipped");
        }
    }
}

impl Default for EmergencySwitch {
    fn default() -> Self {
        EmergencySwitch::new()
    }
}
