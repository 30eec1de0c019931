//! Communication port state
//!
//! Each port owns its receive state machine, the one message instance all
//! receptions on that port decode into, its liveness monitor and the
//! diagnostic counters. Ports share nothing, so each can be driven from its
//! own interrupt or polling loop.

use crate::checksum::Crc32;
use crate::codec::FrameCodec;
use crate::error::{Error, FrameError};
use crate::message::Message;
use crate::monitor::ConnectionMonitor;
use crate::rx::{RxProgress, RxState, RxStateMachine};
use crate::types::PortId;

/// One physical or logical link
#[derive(Debug, Clone)]
pub struct CommsPort {
    id: PortId,
    rx: RxStateMachine,
    pub(crate) rx_msg: Message,
    pub(crate) monitor: ConnectionMonitor,
    chksum_fail_cnt: u32,
    /// Bytes received while waiting for a start marker
    non_q_cnt: u32,
    /// Outcome of the most recent frame (frame error or dispatch status)
    pub(crate) last_status: Option<Result<(), Error>>,
}

impl CommsPort {
    /// Create an idle port
    pub fn new(id: PortId, timeout_ms: u32) -> Self {
        Self {
            id,
            rx: RxStateMachine::new(),
            rx_msg: Message::new(id),
            monitor: ConnectionMonitor::new(timeout_ms),
            chksum_fail_cnt: 0,
            non_q_cnt: 0,
            last_status: None,
        }
    }

    /// Consume one byte
    ///
    /// Returns `Ok(true)` when the byte completed a valid frame, which is
    /// then available through [`rx_msg`](Self::rx_msg).
    pub(crate) fn receive<K: Crc32>(
        &mut self,
        byte: u8,
        codec: &mut FrameCodec<'_, K>,
    ) -> Result<bool, FrameError> {
        match self.rx.feed(byte, &mut self.rx_msg, codec) {
            Ok(RxProgress::Pending) => Ok(false),
            Ok(RxProgress::Skipped(n)) => {
                self.non_q_cnt = self.non_q_cnt.wrapping_add(u32::from(n));
                Ok(false)
            }
            Ok(RxProgress::Complete) => Ok(true),
            Err(e) => {
                if e.is_integrity_failure() {
                    self.chksum_fail_cnt = self.chksum_fail_cnt.wrapping_add(1);
                }
                self.last_status = Some(Err(e.into()));
                Err(e)
            }
        }
    }

    pub fn id(&self) -> PortId {
        self.id
    }

    /// Current receive state
    pub fn rx_state(&self) -> RxState {
        self.rx.state()
    }

    /// Bytes of the in-progress frame
    pub fn rx_count(&self) -> u16 {
        self.rx.rx_count()
    }

    /// Receive buffer of this port
    ///
    /// Holds the last completed message only until the next start marker
    /// arrives; from then on it is the partially received frame.
    pub fn rx_msg(&self) -> &Message {
        &self.rx_msg
    }

    pub fn is_connected(&self) -> bool {
        self.monitor.is_connected()
    }

    /// Milliseconds since the last valid frame
    pub fn timeout_count(&self) -> u32 {
        self.monitor.timeout_count()
    }

    pub fn last_rx_msg_time(&self) -> u32 {
        self.monitor.last_rx_msg_time()
    }

    /// Frames dropped for a checksum or CRC32 mismatch
    pub fn chksum_fail_count(&self) -> u32 {
        self.chksum_fail_cnt
    }

    /// Bytes skipped while out of sync
    pub fn non_q_count(&self) -> u32 {
        self.non_q_cnt
    }

    /// Outcome of the most recent frame, if any frame ended yet
    pub fn last_status(&self) -> Option<Result<(), Error>> {
        self.last_status
    }
}
