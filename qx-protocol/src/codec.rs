//! Frame encoding and decoding
//!
//! Frame format:
//! ```text
//! ┌───┬───┬─────┬────────┬────────┬──────────────────┬─────────┬──────────┐
//! │ Q │ X │ VER │ QX LEN │ QB LEN │ HEADER + PAYLOAD │ [CRC32] │ CHECKSUM │
//! │1B │1B │ 1B  │ 2B BE  │ 2B BE  │ QB LEN bytes     │  4B BE  │ 1B       │
//! └───┴───┴─────┴────────┴────────┴──────────────────┴─────────┴──────────┘
//! ```
//!
//! - QX LEN: total frame length, markers and checksum included
//! - QB LEN: header + payload length, so `QX = 7 + QB + crc + 1`
//! - CHECKSUM: wrapping sum of every byte from VER through the CRC trailer
//! - CRC32: over bytes `[0, 7 + QB)`, present when the header says so
//!
//! Standard header (protocol version 1):
//! ```text
//! type(1) attrib(4) options(1) [ext_id r0 r1] [src tgt] [treq rreq]
//! ```
//! Version 0 frames carry a legacy header whose layout is supplied by a
//! [`LegacyHeaderCodec`].

use crate::checksum::{checksum8, Crc32};
use crate::error::{Error, FrameError};
use crate::message::{Extension, Message, MessageHeader};
use crate::rx::{RxProgress, RxStateMachine};
use crate::types::{DeviceId, MsgType, PortId};

/// First start marker
pub const START_MARKER_0: u8 = b'Q';
/// Second start marker
pub const START_MARKER_1: u8 = b'X';

/// Protocol version carrying the standard header
pub const PROTOCOL_VERSION: u8 = 0x01;
/// Protocol version carrying a legacy header
pub const LEGACY_PROTOCOL_VERSION: u8 = 0x00;

/// Q + X + LEN1 + LEN2 + CHKSUM
pub const QX_MAX_OUTER_FRAME_LEN: usize = 5;
/// Everything between the outer frame bytes
pub const QX_MAX_PAYLOAD_LEN: usize = 64;
/// Largest frame on the wire
pub const QX_MAX_MSG_LEN: usize = QX_MAX_OUTER_FRAME_LEN + QX_MAX_PAYLOAD_LEN;

/// Markers, version and both length fields
pub const FRAME_PREFIX_LEN: usize = 7;
pub const CHECKSUM_LEN: usize = 1;
pub const CRC32_LEN: usize = 4;
/// Prefix, one body byte and the checksum
pub const MIN_FRAME_LEN: usize = FRAME_PREFIX_LEN + 1 + CHECKSUM_LEN;

/// Option byte: extension block present
pub const OPT_EXTENSION: u8 = 1 << 0;
/// Option byte: CRC32 trailer present
pub const OPT_CRC32: u8 = 1 << 1;
/// Option byte: source/target addresses removed
pub const OPT_REMOVE_ADDR: u8 = 1 << 2;
/// Option byte: request addresses removed
pub const OPT_REMOVE_REQ: u8 = 1 << 3;

/// Bytes following the body for a frame with the given lengths
///
/// Returns `None` when the lengths cannot describe a valid frame.
pub fn trailer_len(qx_len: usize, qb_len: usize) -> Option<usize> {
    if qb_len == 0 {
        return None;
    }
    let trailer = qx_len.checked_sub(FRAME_PREFIX_LEN + qb_len)?;
    match trailer {
        t if t == CHECKSUM_LEN || t == CHECKSUM_LEN + CRC32_LEN => Some(t),
        _ => None,
    }
}

/// Alternate header layout for version 0 frames
///
/// Installed once in the engine; the same object builds outgoing legacy
/// headers and parses incoming ones.
pub trait LegacyHeaderCodec {
    /// Write the header for `header` into `out`, returning the bytes used
    fn build_header(&self, header: &MessageHeader, out: &mut [u8]) -> Result<usize, Error>;

    /// Fill `header` from the start of `body`, returning the bytes consumed
    fn parse_header(&self, body: &[u8], header: &mut MessageHeader) -> Result<usize, Error>;

    /// Offset of the attribute field within the header
    fn attrib_offset(&self) -> usize {
        1
    }
}

/// The QB header used by earlier rig firmware
///
/// `type(1) attrib(2)`; no options and no addressing.
#[derive(Debug, Clone, Copy, Default)]
pub struct QbLegacyHeader;

impl LegacyHeaderCodec for QbLegacyHeader {
    fn build_header(&self, header: &MessageHeader, out: &mut [u8]) -> Result<usize, Error> {
        let attrib = u16::try_from(header.attrib).map_err(|_| Error::InvalidExtension)?;
        if out.len() < 3 {
            return Err(Error::MsgLengthInvalid);
        }
        out[0] = header.msg_type.to_byte();
        out[1..3].copy_from_slice(&attrib.to_be_bytes());
        Ok(3)
    }

    fn parse_header(&self, body: &[u8], header: &mut MessageHeader) -> Result<usize, Error> {
        if body.len() < 3 {
            return Err(Error::MsgLengthInvalid);
        }
        header.msg_type = MsgType::from_byte(body[0]).ok_or(Error::MsgTypeNotSupported)?;
        header.attrib = u32::from(u16::from_be_bytes([body[1], body[2]]));
        header.remove_addr_fields = true;
        header.remove_req_fields = true;
        Ok(3)
    }
}

/// Sequential reader over a received header
struct HeaderReader<'b> {
    data: &'b [u8],
    pos: usize,
}

impl<'b> HeaderReader<'b> {
    fn u8(&mut self) -> Result<u8, FrameError> {
        let byte = *self.data.get(self.pos).ok_or(FrameError::HeaderInvalid)?;
        self.pos += 1;
        Ok(byte)
    }

    fn u32(&mut self) -> Result<u32, FrameError> {
        let bytes = self
            .data
            .get(self.pos..self.pos + 4)
            .ok_or(FrameError::HeaderInvalid)?;
        self.pos += 4;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

/// Parse a standard header from the start of `body`
fn parse_standard_header(body: &[u8]) -> Result<(MessageHeader, usize), FrameError> {
    let mut r = HeaderReader { data: body, pos: 0 };
    let mut header = MessageHeader {
        msg_type: MsgType::from_byte(r.u8()?).ok_or(FrameError::UnsupportedType)?,
        attrib: r.u32()?,
        ..MessageHeader::default()
    };

    let options = r.u8()?;
    header.add_extension = options & OPT_EXTENSION != 0;
    header.add_crc32 = options & OPT_CRC32 != 0;
    header.remove_addr_fields = options & OPT_REMOVE_ADDR != 0;
    header.remove_req_fields = options & OPT_REMOVE_REQ != 0;

    if header.add_extension {
        header.extension = Extension {
            id: r.u8()?,
            r0: r.u8()?,
            r1: r.u8()?,
        };
        if header.extension.r0 != 0 || header.extension.r1 != 0 {
            return Err(FrameError::InvalidExtension);
        }
    }
    // Removed address fields stay at their broadcast default
    if !header.remove_addr_fields {
        header.source = DeviceId(r.u8()?);
        header.target = DeviceId(r.u8()?);
    }
    if !header.remove_req_fields {
        header.trans_req = DeviceId(r.u8()?);
        header.resp_req = DeviceId(r.u8()?);
    }

    Ok((header, r.pos))
}

fn option_byte(header: &MessageHeader) -> u8 {
    let mut options = 0;
    if header.add_extension {
        options |= OPT_EXTENSION;
    }
    if header.add_crc32 {
        options |= OPT_CRC32;
    }
    if header.remove_addr_fields {
        options |= OPT_REMOVE_ADDR;
    }
    if header.remove_req_fields {
        options |= OPT_REMOVE_REQ;
    }
    options
}

/// Frame codec bound to a CRC32 implementation and optional legacy layout
pub struct FrameCodec<'c, K: Crc32> {
    crc: &'c mut K,
    legacy: Option<&'c dyn LegacyHeaderCodec>,
}

impl<'c, K: Crc32> FrameCodec<'c, K> {
    /// Create a codec
    pub fn new(crc: &'c mut K, legacy: Option<&'c dyn LegacyHeaderCodec>) -> Self {
        Self { crc, legacy }
    }

    /// Returns true if version 0 frames can be built and parsed
    pub fn has_legacy(&self) -> bool {
        self.legacy.is_some()
    }

    /// Lay out the prefix and header of `msg` and position the cursor at
    /// the first value byte
    ///
    /// Uses `msg.header` and the message's legacy flag. Length fields are
    /// left zero until [`finish`](Self::finish).
    pub fn begin(&mut self, msg: &mut Message) -> Result<(), Error> {
        let trailer = CHECKSUM_LEN + if msg.header.add_crc32 { CRC32_LEN } else { 0 };
        let version = if msg.legacy_header {
            LEGACY_PROTOCOL_VERSION
        } else {
            PROTOCOL_VERSION
        };

        msg.buf[..FRAME_PREFIX_LEN].copy_from_slice(&[
            START_MARKER_0,
            START_MARKER_1,
            version,
            0,
            0,
            0,
            0,
        ]);
        msg.write_limit = QX_MAX_MSG_LEN - trailer;
        msg.cursor = FRAME_PREFIX_LEN;
        msg.payload_end = FRAME_PREFIX_LEN;

        if msg.legacy_header {
            let codec = self.legacy.ok_or(Error::Generic)?;
            if msg.header.add_extension {
                return Err(Error::InvalidExtension);
            }
            let header = msg.header;
            let used = codec.build_header(&header, &mut msg.buf[FRAME_PREFIX_LEN..msg.write_limit])?;
            msg.attrib_offset = FRAME_PREFIX_LEN + codec.attrib_offset();
            msg.cursor += used;
        } else {
            let header = msg.header;
            msg.write_u8(header.msg_type.to_byte())?;
            msg.attrib_offset = msg.cursor;
            msg.write_u32(header.attrib)?;
            msg.write_u8(option_byte(&header))?;
            if header.add_extension {
                msg.write_bytes(&[header.extension.id, 0, 0])?;
            }
            if !header.remove_addr_fields {
                msg.write_bytes(&[header.source.0, header.target.0])?;
            }
            if !header.remove_req_fields {
                msg.write_bytes(&[header.trans_req.0, header.resp_req.0])?;
            }
        }

        msg.payload_start = msg.cursor;
        msg.payload_end = msg.cursor;
        Ok(())
    }

    /// Fill in the length fields and append the trailer
    pub fn finish(&mut self, msg: &mut Message) -> Result<(), Error> {
        let body_end = msg.payload_end;
        let qb_len = body_end - FRAME_PREFIX_LEN;
        let crc_len = if msg.header.add_crc32 { CRC32_LEN } else { 0 };
        let total = body_end + crc_len + CHECKSUM_LEN;
        if qb_len == 0 || total > QX_MAX_MSG_LEN {
            return Err(Error::MsgLengthInvalid);
        }

        msg.buf[3..5].copy_from_slice(&(total as u16).to_be_bytes());
        msg.buf[5..7].copy_from_slice(&(qb_len as u16).to_be_bytes());

        if msg.header.add_crc32 {
            let crc = self.crc.compute(&msg.buf[..body_end]);
            msg.buf[body_end..body_end + CRC32_LEN].copy_from_slice(&crc.to_be_bytes());
            msg.crc32 = crc;
        }

        let checksum = checksum8(&msg.buf[2..body_end + crc_len]);
        msg.buf[total - 1] = checksum;
        msg.running_checksum = checksum;
        msg.header.length = total as u16;
        msg.len = total;
        msg.cursor = msg.payload_start;
        Ok(())
    }

    /// Encode a complete frame carrying `payload`
    pub fn encode(
        &mut self,
        port: PortId,
        header: &MessageHeader,
        legacy: bool,
        payload: &[u8],
    ) -> Result<Message, Error> {
        let mut msg = Message::new(port);
        msg.header = *header;
        msg.legacy_header = legacy;
        self.begin(&mut msg)?;
        msg.write_bytes(payload)?;
        self.finish(&mut msg)?;
        Ok(msg)
    }

    /// Decode a buffer holding exactly one frame
    pub fn decode(&mut self, bytes: &[u8]) -> Result<Message, FrameError> {
        let mut rx = RxStateMachine::new();
        let mut msg = Message::new(PortId::default());

        for (i, &byte) in bytes.iter().enumerate() {
            match rx.feed(byte, &mut msg, self)? {
                RxProgress::Skipped(_) => return Err(FrameError::ExtraBytes),
                RxProgress::Pending => {}
                RxProgress::Complete if i + 1 == bytes.len() => return Ok(msg),
                RxProgress::Complete => return Err(FrameError::ExtraBytes),
            }
        }
        Err(FrameError::Incomplete)
    }

    /// Validate and decode a frame whose checksum already matched
    ///
    /// `msg.buf` holds the full frame; `qb_len` and `trailer` come from the
    /// length fields.
    pub(crate) fn parse_received(
        &mut self,
        msg: &mut Message,
        qb_len: usize,
        trailer: usize,
    ) -> Result<(), FrameError> {
        let body_end = FRAME_PREFIX_LEN + qb_len;
        let crc_present = trailer == CHECKSUM_LEN + CRC32_LEN;

        if crc_present {
            let t = &msg.buf[body_end..body_end + CRC32_LEN];
            let received = u32::from_be_bytes([t[0], t[1], t[2], t[3]]);
            let computed = self.crc.compute(&msg.buf[..body_end]);
            msg.crc32 = computed;
            if received != computed {
                return Err(FrameError::Crc32Mismatch);
            }
        }

        let body = &msg.buf[FRAME_PREFIX_LEN..body_end];
        let (mut header, used, attrib_offset) = if msg.legacy_header {
            let codec = self.legacy.ok_or(FrameError::VersionMismatch)?;
            let mut header = MessageHeader::default();
            let used = codec
                .parse_header(body, &mut header)
                .map_err(|_| FrameError::HeaderInvalid)?;
            header.add_crc32 = crc_present;
            (header, used, codec.attrib_offset())
        } else {
            let (header, used) = parse_standard_header(body)?;
            if header.add_crc32 != crc_present {
                return Err(FrameError::LengthInvalid);
            }
            (header, used, 1)
        };
        if used > qb_len {
            return Err(FrameError::HeaderInvalid);
        }

        let total = body_end + trailer;
        header.length = total as u16;
        msg.header = header;
        msg.len = total;
        msg.attrib_offset = FRAME_PREFIX_LEN + attrib_offset;
        msg.payload_start = FRAME_PREFIX_LEN + used;
        msg.payload_end = body_end;
        msg.write_limit = body_end;
        msg.cursor = msg.payload_start;
        Ok(())
    }
}
