//! Message buffer and decoded header
//!
//! A [`Message`] owns one fixed-capacity wire buffer plus the offsets the
//! codec and the parser callbacks work with. Offsets are plain indices
//! into the buffer, which always starts at index 0:
//!
//! ```text
//! 0         7      attrib_offset   payload_start        payload_end
//! │ prefix  │ type │ attrib ... hdr │ value bytes ...    │ [crc32] chk
//! ```
//!
//! `payload_start` is fixed by the codec once the header is laid out;
//! parser callbacks only move the general-purpose cursor.

use crate::codec::{FRAME_PREFIX_LEN, QX_MAX_MSG_LEN};
use crate::error::Error;
use crate::types::{DeviceId, MsgType, ParseType, PortId};

/// Protocol extension block (carried when the extension option is set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Extension {
    /// Extension identifier
    pub id: u8,
    /// Reserved, zero on the wire
    pub r0: u8,
    /// Reserved, zero on the wire
    pub r1: u8,
}

/// Header fields of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MessageHeader {
    /// Total frame length on the wire (filled in by the codec)
    pub length: u16,
    /// 32-bit attribute number
    pub attrib: u32,
    /// Message type
    pub msg_type: MsgType,
    /// Extension block present
    pub add_extension: bool,
    /// CRC32 trailer present
    pub add_crc32: bool,
    /// Extension block contents
    pub extension: Extension,
    /// Source and target addresses omitted from the wire
    pub remove_addr_fields: bool,
    /// Transmit-request and response-request addresses omitted from the wire
    pub remove_req_fields: bool,
    /// Sender
    pub source: DeviceId,
    /// Receiver
    pub target: DeviceId,
    /// Device that requested this transmission
    pub trans_req: DeviceId,
    /// Device the response should be sent to
    pub resp_req: DeviceId,
}

/// A QX message: header, wire buffer and per-message processing state
#[derive(Debug, Clone)]
pub struct Message {
    pub(crate) parse_type: ParseType,
    pub(crate) suppress_auto_response: bool,
    pub(crate) running_checksum: u8,
    pub(crate) crc32: u32,
    pub(crate) att_not_handled: bool,
    pub(crate) legacy_header: bool,
    pub(crate) port: PortId,
    pub(crate) header: MessageHeader,

    pub(crate) buf: [u8; QX_MAX_MSG_LEN],
    /// Bytes of `buf` holding the frame
    pub(crate) len: usize,
    pub(crate) attrib_offset: usize,
    pub(crate) payload_start: usize,
    pub(crate) payload_end: usize,
    /// Highest index value writes may reach (room is kept for the trailer)
    pub(crate) write_limit: usize,
    pub(crate) cursor: usize,
}

impl Message {
    /// Create an empty message bound to `port`
    pub fn new(port: PortId) -> Self {
        Self {
            parse_type: ParseType::CurValSend,
            suppress_auto_response: false,
            running_checksum: 0,
            crc32: 0,
            att_not_handled: false,
            legacy_header: false,
            port,
            header: MessageHeader::default(),
            buf: [0; QX_MAX_MSG_LEN],
            len: 0,
            attrib_offset: FRAME_PREFIX_LEN,
            payload_start: FRAME_PREFIX_LEN,
            payload_end: FRAME_PREFIX_LEN,
            write_limit: QX_MAX_MSG_LEN,
            cursor: FRAME_PREFIX_LEN,
        }
    }

    /// Clear per-frame state before a new reception
    pub(crate) fn begin_rx(&mut self) {
        let port = self.port;
        *self = Self::new(port);
    }

    /// Port the message arrived on or will leave from
    pub fn port(&self) -> PortId {
        self.port
    }

    /// Decoded (or pending) header
    pub fn header(&self) -> &MessageHeader {
        &self.header
    }

    /// Attribute number
    pub fn attrib(&self) -> u32 {
        self.header.attrib
    }

    /// Message type
    pub fn msg_type(&self) -> MsgType {
        self.header.msg_type
    }

    /// Direction the parser callback must move data
    pub fn parse_type(&self) -> ParseType {
        self.parse_type
    }

    /// Frame uses the legacy header layout
    pub fn is_legacy_header(&self) -> bool {
        self.legacy_header
    }

    /// Stop the router from sending the automatic CurVal reply
    pub fn disable_std_response(&mut self) {
        self.suppress_auto_response = true;
    }

    /// Returns true if a parser suppressed the automatic reply
    pub fn is_std_response_disabled(&self) -> bool {
        self.suppress_auto_response
    }

    /// Mark the attribute as not handled by this device
    pub fn set_attribute_unhandled(&mut self) {
        self.att_not_handled = true;
    }

    /// Returns true if no parser claimed the attribute
    pub fn is_attribute_unhandled(&self) -> bool {
        self.att_not_handled
    }

    /// Running 8-bit checksum of the frame
    pub fn checksum(&self) -> u8 {
        self.running_checksum
    }

    /// CRC32 of the frame, when the CRC32 option is in use
    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    /// Complete wire frame
    pub fn frame(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Offset of the attribute field within the frame
    pub fn attrib_offset(&self) -> usize {
        self.attrib_offset
    }

    /// Offset of the first value byte within the frame
    pub fn payload_start(&self) -> usize {
        self.payload_start
    }

    /// Value bytes (after the header, before any trailer)
    pub fn payload(&self) -> &[u8] {
        &self.buf[self.payload_start..self.payload_end]
    }

    /// Unread value bytes left after the cursor
    pub fn remaining(&self) -> usize {
        self.payload_end.saturating_sub(self.cursor)
    }

    /// Move the cursor back to the first value byte
    pub fn rewind(&mut self) {
        self.cursor = self.payload_start;
    }

    /// Read `N` value bytes at the cursor
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let end = self.cursor + N;
        if end > self.payload_end {
            return Err(Error::MsgLengthInvalid);
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.cursor..end]);
        self.cursor = end;
        Ok(out)
    }

    /// Read value bytes into `out`
    pub fn read_bytes(&mut self, out: &mut [u8]) -> Result<(), Error> {
        let end = self.cursor + out.len();
        if end > self.payload_end {
            return Err(Error::MsgLengthInvalid);
        }
        out.copy_from_slice(&self.buf[self.cursor..end]);
        self.cursor = end;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        self.read_array::<1>().map(|b| b[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, Error> {
        self.read_array::<1>().map(|b| b[0] as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16, Error> {
        self.read_array().map(u16::from_be_bytes)
    }

    pub fn read_i16(&mut self) -> Result<i16, Error> {
        self.read_array().map(i16::from_be_bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32, Error> {
        self.read_array().map(u32::from_be_bytes)
    }

    pub fn read_i32(&mut self) -> Result<i32, Error> {
        self.read_array().map(i32::from_be_bytes)
    }

    pub fn read_f32(&mut self) -> Result<f32, Error> {
        self.read_array().map(f32::from_be_bytes)
    }

    /// Append value bytes at the cursor
    ///
    /// Fails with [`Error::MsgLengthInvalid`] if the bytes would not leave
    /// room for the frame trailer.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<(), Error> {
        let end = self.cursor + data.len();
        if end > self.write_limit {
            return Err(Error::MsgLengthInvalid);
        }
        self.buf[self.cursor..end].copy_from_slice(data);
        self.cursor = end;
        self.payload_end = end;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), Error> {
        self.write_bytes(&[value])
    }

    pub fn write_i8(&mut self, value: i8) -> Result<(), Error> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), Error> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_i16(&mut self, value: i16) -> Result<(), Error> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), Error> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<(), Error> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_f32(&mut self, value: f32) -> Result<(), Error> {
        self.write_bytes(&value.to_be_bytes())
    }
}
