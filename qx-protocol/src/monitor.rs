//! Per-port link liveness
//!
//! The protocol has no timer of its own. The application either reports
//! elapsed time with [`ConnectionMonitor::tick`] or lets the monitor read a
//! free-running millisecond clock through
//! [`ConnectionMonitor::update_from_clock`]. Either way, a port that has not
//! completed a frame within the timeout is flagged disconnected; the next
//! good frame reconnects it.

/// Default time without a valid frame before a port counts as lost
pub const QX_PORT_TIMEOUT_MSEC: u32 = 2000;

/// Connection state of one port
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionMonitor {
    timeout_ms: u32,
    /// Milliseconds since the last valid frame
    timeout_cntr: u32,
    connected: bool,
    /// Clock value at the last valid frame
    last_rx_msg_time: u32,
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new(QX_PORT_TIMEOUT_MSEC)
    }
}

impl ConnectionMonitor {
    /// Create a monitor for a port that has not received anything yet
    pub fn new(timeout_ms: u32) -> Self {
        Self {
            timeout_ms,
            timeout_cntr: 0,
            connected: false,
            last_rx_msg_time: 0,
        }
    }

    /// Record a successfully received frame at `now_ms`
    pub fn record_rx(&mut self, now_ms: u32) {
        self.timeout_cntr = 0;
        self.connected = true;
        self.last_rx_msg_time = now_ms;
    }

    /// Advance the timeout counter by `elapsed_ms`
    ///
    /// Returns true if this call took the port from connected to
    /// disconnected.
    pub fn tick(&mut self, elapsed_ms: u32) -> bool {
        self.timeout_cntr = self.timeout_cntr.saturating_add(elapsed_ms);
        self.evaluate()
    }

    /// Derive the timeout counter from a free-running clock
    ///
    /// Returns true if this call took the port from connected to
    /// disconnected.
    pub fn update_from_clock(&mut self, now_ms: u32) -> bool {
        self.timeout_cntr = now_ms.wrapping_sub(self.last_rx_msg_time);
        self.evaluate()
    }

    fn evaluate(&mut self) -> bool {
        if self.connected && self.timeout_cntr > self.timeout_ms {
            self.connected = false;
            return true;
        }
        false
    }

    /// Returns true if a frame arrived within the timeout window
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Milliseconds since the last valid frame
    pub fn timeout_count(&self) -> u32 {
        self.timeout_cntr
    }

    /// Clock value recorded for the last valid frame
    pub fn last_rx_msg_time(&self) -> u32 {
        self.last_rx_msg_time
    }
}
