//! Engine configuration
//!
//! Applications usually author this next to the rest of their device
//! settings, so it derives serde behind the `serde` feature.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::monitor::QX_PORT_TIMEOUT_MSEC;

/// Default number of communication ports
pub const QX_NUM_PORTS: u8 = 1;

/// Protocol engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ProtocolConfig {
    /// Ports to bring up; must not exceed the engine's port capacity
    pub num_ports: u8,
    /// Time without a valid frame before a port counts as disconnected
    pub port_timeout_ms: u32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            num_ports: QX_NUM_PORTS,
            port_timeout_ms: QX_PORT_TIMEOUT_MSEC,
        }
    }
}
