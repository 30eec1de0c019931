//! Outbound message assembly
//!
//! Every send follows the same steps: turn the caller's [`TxOptions`] into a
//! header, lay out the frame prefix, let the endpoint's parser pack the
//! value, seal the frame and hand it to the [`Link`].

use crate::checksum::Crc32;
use crate::codec::FrameCodec;
use crate::endpoint::{run_parser, AttributeParser};
use crate::error::Error;
use crate::link::Link;
use crate::message::{Extension, Message, MessageHeader};
use crate::types::{DeviceId, MsgType, ParseType, PortId};

/// Per-send options
///
/// The defaults send a standard-header frame to broadcast with every
/// address field present and no CRC32 trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxOptions {
    /// Extension id; zero sends no extension block
    pub ff_ext: u8,
    pub use_crc32: bool,
    pub remove_addr_fields: bool,
    pub remove_req_fields: bool,
    pub target_addr: DeviceId,
    pub trans_req_addr: DeviceId,
    pub resp_req_addr: DeviceId,
    /// Build the frame with the installed legacy header codec
    pub legacy_header: bool,
}

impl TxOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to(mut self, target: DeviceId) -> Self {
        self.target_addr = target;
        self
    }

    pub fn with_crc32(mut self) -> Self {
        self.use_crc32 = true;
        self
    }

    pub fn with_extension(mut self, id: u8) -> Self {
        self.ff_ext = id;
        self
    }

    pub fn without_addr_fields(mut self) -> Self {
        self.remove_addr_fields = true;
        self
    }

    pub fn without_req_fields(mut self) -> Self {
        self.remove_req_fields = true;
        self
    }

    /// Set the transmit-request origin and response-request target
    pub fn with_request_addrs(mut self, trans_req: DeviceId, resp_req: DeviceId) -> Self {
        self.trans_req_addr = trans_req;
        self.resp_req_addr = resp_req;
        self
    }

    pub fn legacy(mut self) -> Self {
        self.legacy_header = true;
        self
    }

    pub(crate) fn header(&self, source: DeviceId, msg_type: MsgType, attrib: u32) -> MessageHeader {
        MessageHeader {
            length: 0,
            attrib,
            msg_type,
            add_extension: self.ff_ext != 0,
            add_crc32: self.use_crc32,
            extension: Extension {
                id: self.ff_ext,
                r0: 0,
                r1: 0,
            },
            remove_addr_fields: self.remove_addr_fields,
            remove_req_fields: self.remove_req_fields,
            source,
            target: self.target_addr,
            trans_req: self.trans_req_addr,
            resp_req: self.resp_req_addr,
        }
    }
}

/// Builds frames and pushes them out through the link
pub(crate) struct Transmitter<'t, L: Link, K: Crc32> {
    link: &'t mut L,
    codec: FrameCodec<'t, K>,
}

impl<'t, L: Link, K: Crc32> Transmitter<'t, L, K> {
    pub(crate) fn new(link: &'t mut L, codec: FrameCodec<'t, K>) -> Self {
        Self { link, codec }
    }

    /// Assemble a frame for `header`
    ///
    /// Read requests carry no value and skip the parser. For every other
    /// type the parser packs the value; if it does not claim the attribute
    /// nothing is built.
    pub(crate) fn build(
        &mut self,
        port: PortId,
        header: &MessageHeader,
        legacy: bool,
        parser: Option<&mut dyn AttributeParser>,
    ) -> Result<Message, Error> {
        let mut msg = Message::new(port);
        msg.header = *header;
        msg.legacy_header = legacy;
        self.codec.begin(&mut msg)?;

        if let (Some(parse_type), Some(parser)) = (ParseType::send_for(header.msg_type), parser) {
            msg.parse_type = parse_type;
            if !run_parser(parser, &mut msg)? {
                return Err(Error::AttNotHandled);
            }
        }

        self.codec.finish(&mut msg)?;
        Ok(msg)
    }

    /// Ask the link whether the reply to `msg` belongs on another port
    pub(crate) fn forward(&mut self, msg: &Message) -> Option<PortId> {
        self.link.forward(msg)
    }

    /// Hand a finished frame to the link
    pub(crate) fn transmit(&mut self, msg: &Message) -> Result<(), Error> {
        debug!(
            "Send {} attrib {} on port {}",
            msg.msg_type(),
            msg.attrib(),
            msg.port().0
        );
        self.link.send(msg)
    }

    /// Build and transmit in one go
    pub(crate) fn send(
        &mut self,
        port: PortId,
        header: &MessageHeader,
        legacy: bool,
        parser: Option<&mut dyn AttributeParser>,
    ) -> Result<(), Error> {
        let msg = self.build(port, header, legacy, parser)?;
        self.transmit(&msg)
    }
}
