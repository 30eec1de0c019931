//! Local servers and clients
//!
//! A server provides attributes: it answers Read/Write requests and pushes
//! current values. A client consumes them: it issues requests and takes
//! current-value messages. Both are just an address plus the parser that
//! knows what each attribute number means for the application.

use crate::error::Error;
use crate::message::Message;
use crate::types::DeviceId;

/// Application hook that packs and unpacks attribute values
///
/// Called with the message positioned at its first value byte. The
/// direction comes from [`Message::parse_type`]. Return
/// [`Error::AttNotHandled`] (or call [`Message::set_attribute_unhandled`])
/// for attribute numbers this endpoint does not own.
pub trait AttributeParser {
    fn parse(&mut self, msg: &mut Message) -> Result<(), Error>;
}

impl<F> AttributeParser for F
where
    F: FnMut(&mut Message) -> Result<(), Error>,
{
    fn parse(&mut self, msg: &mut Message) -> Result<(), Error> {
        self(msg)
    }
}

/// Handle to a registered server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServerId(pub(crate) usize);

/// Handle to a registered client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClientId(pub(crate) usize);

/// Locally addressable attribute provider
pub struct Server<'a> {
    pub(crate) address: DeviceId,
    pub(crate) parser: &'a mut dyn AttributeParser,
}

impl<'a> Server<'a> {
    pub fn new(address: DeviceId, parser: &'a mut dyn AttributeParser) -> Self {
        Self { address, parser }
    }

    pub fn address(&self) -> DeviceId {
        self.address
    }
}

/// Locally addressable requester
pub struct Client<'a> {
    pub(crate) address: DeviceId,
    pub(crate) parser: &'a mut dyn AttributeParser,
}

impl<'a> Client<'a> {
    pub fn new(address: DeviceId, parser: &'a mut dyn AttributeParser) -> Self {
        Self { address, parser }
    }

    pub fn address(&self) -> DeviceId {
        self.address
    }
}

/// Run `parser` over `msg` and report whether it claimed the attribute
///
/// Resets the per-endpoint flags first so one endpoint's verdict does not
/// leak into the next.
pub(crate) fn run_parser(
    parser: &mut dyn AttributeParser,
    msg: &mut Message,
) -> Result<bool, Error> {
    msg.att_not_handled = false;
    msg.suppress_auto_response = false;
    msg.rewind();

    match parser.parse(msg) {
        Ok(()) => Ok(!msg.att_not_handled),
        Err(Error::AttNotHandled) => {
            msg.att_not_handled = true;
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
