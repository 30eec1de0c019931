//! QX Hardware Abstraction Layer
//!
//! This crate defines the byte transport traits that chip-specific code
//! implements for each physical link of a QX device. The protocol crate
//! only ever sees these traits, so the same framing and routing logic runs
//! over a UART, a BLE characteristic or a host-side test double.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Application (gimbal, lens controller)  │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  qx-protocol (framing, routing)         │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  qx-hal (this crate - traits)           │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │  UART driver  │       │   BLE stack   │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`serial::SerialTx`], [`serial::SerialRx`] - Byte stream transport

#![no_std]
#![deny(unsafe_code)]

pub mod serial;

pub use serial::{SerialRx, SerialTx};
