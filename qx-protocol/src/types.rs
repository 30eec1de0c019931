//! Addressing and message classification types

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Device address used in the source/target/request address fields
///
/// The address space is open ended; the associated constants name the
/// devices of a standard rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceId(pub u8);

impl DeviceId {
    /// Every device accepts messages sent here
    pub const BROADCAST: Self = Self(0);
    /// Wedge lens controller (slot 1 for legacy reasons)
    pub const LENS_CONTROLLER: Self = Self(1);
    /// Gimbal
    pub const GIMBAL: Self = Self(2);
    /// Focus/iris/zoom module integrated in the gimbal
    pub const GIMBAL_INT_FIZ: Self = Self(3);
    /// External API controller
    pub const API_CONTROLLER: Self = Self(10);

    /// Returns true for the broadcast address
    pub fn is_broadcast(self) -> bool {
        self == Self::BROADCAST
    }

    /// Returns true if an endpoint at this address should take a message
    /// addressed to `target`
    pub fn accepts(self, target: DeviceId) -> bool {
        target == self || target.is_broadcast()
    }
}

/// Communication port index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PortId(pub u8);

impl PortId {
    /// Index into the port registry
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Message type as seen on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MsgType {
    /// Current value of the attribute
    #[default]
    CurVal,
    /// Read request (answered with CurVal)
    Read,
    /// Write absolute value
    WriteAbs,
    /// Write relative value
    WriteRel,
}

// Wire format values
const MSG_TYPE_CURVAL: u8 = 0;
const MSG_TYPE_READ: u8 = 1;
const MSG_TYPE_WRITE_ABS: u8 = 2;
const MSG_TYPE_WRITE_REL: u8 = 3;

impl MsgType {
    /// Parse a message type from its wire format byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            MSG_TYPE_CURVAL => Some(MsgType::CurVal),
            MSG_TYPE_READ => Some(MsgType::Read),
            MSG_TYPE_WRITE_ABS => Some(MsgType::WriteAbs),
            MSG_TYPE_WRITE_REL => Some(MsgType::WriteRel),
            _ => None,
        }
    }

    /// Convert to wire format byte
    pub fn to_byte(self) -> u8 {
        match self {
            MsgType::CurVal => MSG_TYPE_CURVAL,
            MsgType::Read => MSG_TYPE_READ,
            MsgType::WriteAbs => MSG_TYPE_WRITE_ABS,
            MsgType::WriteRel => MSG_TYPE_WRITE_REL,
        }
    }

    /// Returns true for types a server answers with an automatic CurVal
    pub fn is_request(self) -> bool {
        !matches!(self, MsgType::CurVal)
    }
}

/// Direction a parser callback moves data between message and application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseType {
    /// Pack application value into an outgoing CurVal
    #[default]
    CurValSend,
    /// Unpack a received CurVal into the application
    CurValRecv,
    /// Pack an absolute write
    WriteAbsSend,
    /// Apply a received absolute write
    WriteAbsRecv,
    /// Pack a relative write
    WriteRelSend,
    /// Apply a received relative write
    WriteRelRecv,
}

impl ParseType {
    /// Returns true if the parser should write into the message
    pub fn is_send(self) -> bool {
        matches!(
            self,
            ParseType::CurValSend | ParseType::WriteAbsSend | ParseType::WriteRelSend
        )
    }

    /// Parse direction used to unpack a received message of `msg_type`
    ///
    /// Read requests carry no value, so there is nothing to unpack.
    pub fn recv_for(msg_type: MsgType) -> Option<Self> {
        match msg_type {
            MsgType::CurVal => Some(ParseType::CurValRecv),
            MsgType::Read => None,
            MsgType::WriteAbs => Some(ParseType::WriteAbsRecv),
            MsgType::WriteRel => Some(ParseType::WriteRelRecv),
        }
    }

    /// Parse direction used to pack an outgoing message of `msg_type`
    pub fn send_for(msg_type: MsgType) -> Option<Self> {
        match msg_type {
            MsgType::CurVal => Some(ParseType::CurValSend),
            MsgType::Read => None,
            MsgType::WriteAbs => Some(ParseType::WriteAbsSend),
            MsgType::WriteRel => Some(ParseType::WriteRelSend),
        }
    }
}
