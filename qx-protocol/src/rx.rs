//! Byte-at-a-time receive state machine
//!
//! ```text
//! START_WAIT ─Q,X─▶ GET_PROTOCOL_VER ─▶ GET_QX_LEN0 ─▶ GET_QX_LEN1
//!     ▲                                                   │
//!     │                                                   ▼
//! GET_CHKSUM ◀── GET_DATA ◀── GET_QB_LEN1 ◀──────── GET_QB_LEN0
//! ```
//!
//! Every failure drops the current frame and returns to `START_WAIT`.
//! Bytes seen while waiting for the start markers are reported as skipped
//! so the port can count them.

use crate::checksum::{accumulate8, Crc32};
use crate::codec::{
    trailer_len, FrameCodec, CHECKSUM_LEN, LEGACY_PROTOCOL_VERSION, MIN_FRAME_LEN,
    PROTOCOL_VERSION, QX_MAX_MSG_LEN, START_MARKER_0, START_MARKER_1,
};
use crate::error::FrameError;
use crate::message::Message;

/// Receive states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxState {
    /// Scanning for 'Q' 'X'
    #[default]
    StartWait,
    /// Got markers, waiting for protocol version
    GetProtocolVer,
    /// Full frame length, high byte
    GetQxLen0,
    /// Full frame length, low byte
    GetQxLen1,
    /// Body length, high byte
    GetQbLen0,
    /// Body length, low byte
    GetQbLen1,
    /// Header, payload and CRC trailer
    GetData,
    /// Final checksum byte
    GetChksum,
}

/// Result of feeding one byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxProgress {
    /// Byte consumed, frame not complete yet
    Pending,
    /// Bytes discarded while out of sync (a held 'Q' can be released here too)
    Skipped(u8),
    /// Byte completed a validated frame, now decoded in the message
    Complete,
}

/// Receive state machine
#[derive(Debug, Clone, Default)]
pub struct RxStateMachine {
    state: RxState,
    /// Bytes of the current frame stored so far
    rx_cntr: u16,
    qx_len: u16,
    qb_len: u16,
    trailer: usize,
    /// A 'Q' was seen and the next byte decides if it starts a frame
    pending_q: bool,
}

impl RxStateMachine {
    /// Create a state machine waiting for a start marker
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    pub fn state(&self) -> RxState {
        self.state
    }

    /// Bytes of the in-progress frame received so far
    pub fn rx_count(&self) -> u16 {
        self.rx_cntr
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        self.state = RxState::StartWait;
        self.rx_cntr = 0;
        self.qx_len = 0;
        self.qb_len = 0;
        self.trailer = 0;
    }

    fn fail(&mut self, e: FrameError) -> Result<RxProgress, FrameError> {
        self.reset();
        Err(e)
    }

    /// Store a frame byte and add it to the running checksum
    fn store(&mut self, byte: u8, msg: &mut Message) {
        msg.buf[self.rx_cntr as usize] = byte;
        msg.running_checksum = accumulate8(msg.running_checksum, byte);
        self.rx_cntr += 1;
    }

    fn scan_start(&mut self, byte: u8, msg: &mut Message) -> RxProgress {
        if self.pending_q {
            self.pending_q = false;
            if byte == START_MARKER_1 {
                msg.begin_rx();
                msg.buf[0] = START_MARKER_0;
                msg.buf[1] = START_MARKER_1;
                self.rx_cntr = 2;
                self.state = RxState::GetProtocolVer;
                return RxProgress::Pending;
            }
            // The held 'Q' was noise; this byte may still open a frame
            if byte == START_MARKER_0 {
                self.pending_q = true;
                return RxProgress::Skipped(1);
            }
            return RxProgress::Skipped(2);
        }

        if byte == START_MARKER_0 {
            self.pending_q = true;
            RxProgress::Pending
        } else {
            RxProgress::Skipped(1)
        }
    }

    /// Feed a single byte
    ///
    /// Returns `Ok(RxProgress::Complete)` once the byte completes a frame
    /// that passed every check; the decoded frame is then in `msg`.
    pub fn feed<K: Crc32>(
        &mut self,
        byte: u8,
        msg: &mut Message,
        codec: &mut FrameCodec<'_, K>,
    ) -> Result<RxProgress, FrameError> {
        match self.state {
            RxState::StartWait => Ok(self.scan_start(byte, msg)),
            RxState::GetProtocolVer => {
                let legacy = match byte {
                    PROTOCOL_VERSION => false,
                    LEGACY_PROTOCOL_VERSION if codec.has_legacy() => true,
                    _ => return self.fail(FrameError::VersionMismatch),
                };
                msg.legacy_header = legacy;
                self.store(byte, msg);
                self.state = RxState::GetQxLen0;
                Ok(RxProgress::Pending)
            }
            RxState::GetQxLen0 => {
                self.qx_len = u16::from(byte) << 8;
                self.store(byte, msg);
                self.state = RxState::GetQxLen1;
                Ok(RxProgress::Pending)
            }
            RxState::GetQxLen1 => {
                self.qx_len |= u16::from(byte);
                let qx_len = self.qx_len as usize;
                if !(MIN_FRAME_LEN..=QX_MAX_MSG_LEN).contains(&qx_len) {
                    return self.fail(FrameError::LengthInvalid);
                }
                self.store(byte, msg);
                self.state = RxState::GetQbLen0;
                Ok(RxProgress::Pending)
            }
            RxState::GetQbLen0 => {
                self.qb_len = u16::from(byte) << 8;
                self.store(byte, msg);
                self.state = RxState::GetQbLen1;
                Ok(RxProgress::Pending)
            }
            RxState::GetQbLen1 => {
                self.qb_len |= u16::from(byte);
                match trailer_len(self.qx_len as usize, self.qb_len as usize) {
                    Some(trailer) => self.trailer = trailer,
                    None => return self.fail(FrameError::LengthInvalid),
                }
                self.store(byte, msg);
                self.state = RxState::GetData;
                Ok(RxProgress::Pending)
            }
            RxState::GetData => {
                // Unreachable while GetQxLen1 bounds qx_len; keeps the buffer
                // write in range if that check is ever relaxed.
                if self.rx_cntr as usize >= QX_MAX_MSG_LEN - CHECKSUM_LEN {
                    return self.fail(FrameError::Overrun);
                }
                self.store(byte, msg);
                if self.rx_cntr == self.qx_len - CHECKSUM_LEN as u16 {
                    self.state = RxState::GetChksum;
                }
                Ok(RxProgress::Pending)
            }
            RxState::GetChksum => {
                let qb_len = self.qb_len as usize;
                let trailer = self.trailer;
                msg.buf[self.rx_cntr as usize] = byte;
                self.reset();

                if byte != msg.running_checksum {
                    return Err(FrameError::ChecksumMismatch);
                }
                codec.parse_received(msg, qb_len, trailer)?;
                Ok(RxProgress::Complete)
            }
        }
    }
}
