//! QX attribute framing protocol
//!
//! Devices in a motorized camera rig (gimbal, lens controller, accessory
//! modules) expose numbered attributes that peers read, write (absolute or
//! relative) or receive current-value pushes for. This crate frames those
//! messages over any ordered byte link, reassembles them from a noisy
//! stream one byte at a time, and routes them to local servers and clients.
//!
//! # Frame Layout
//!
//! ```text
//! ┌─────┬─────┬─────┬────────┬────────┬────────────────┬─────────┬───────┐
//! │ 'Q' │ 'X' │ VER │ QX LEN │ QB LEN │ HEADER + VALUE │ [CRC32] │ CHKSM │
//! │ 1B  │ 1B  │ 1B  │ 2B BE  │ 2B BE  │ QB LEN bytes   │ 4B BE   │ 1B    │
//! └─────┴─────┴─────┴────────┴────────┴────────────────┴─────────┴───────┘
//! ```
//!
//! QX LEN counts the whole frame (at most 69 bytes), QB LEN the header and
//! value. The standard header (version 1) is:
//!
//! ```text
//! type(1) attrib(4) options(1) [ext_id r0 r1] [src tgt] [treq rreq]
//! ```
//!
//! Version 0 frames use an application-supplied legacy header codec.
//!
//! # Usage
//!
//! Build a [`ProtocolEngine`] with a [`Link`] and a [`Clock`], register
//! servers and clients with their [`AttributeParser`]s, then feed received
//! bytes to [`ProtocolEngine::receive_byte`] and call
//! [`ProtocolEngine::tick`] from the application's periodic loop.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

#[macro_use]
mod fmt;

pub mod checksum;
pub mod codec;
pub mod config;
pub mod endpoint;
pub mod engine;
pub mod error;
pub mod link;
pub mod message;
pub mod monitor;
pub mod port;
pub mod rx;
pub mod tx;
pub mod types;

mod router;

pub use checksum::{Crc32, SoftwareCrc32};
pub use codec::{FrameCodec, LegacyHeaderCodec, QbLegacyHeader, QX_MAX_MSG_LEN, QX_MAX_PAYLOAD_LEN};
pub use config::ProtocolConfig;
pub use endpoint::{AttributeParser, ClientId, ServerId};
pub use engine::ProtocolEngine;
pub use error::{status_code, Error, FrameError};
pub use link::{Clock, Link, SerialLink};
pub use message::{Message, MessageHeader};
pub use monitor::QX_PORT_TIMEOUT_MSEC;
pub use port::CommsPort;
pub use tx::TxOptions;
pub use types::{DeviceId, MsgType, ParseType, PortId};
