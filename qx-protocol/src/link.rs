//! Collaborators the engine talks to
//!
//! [`Link`] carries finished frames out of the engine and decides whether
//! a message should be forwarded elsewhere. [`Clock`] supplies the
//! free-running millisecond counter used for liveness. [`SerialLink`] is a
//! ready-made [`Link`] over a set of `qx-hal` UART transmitters, one per
//! port.

use qx_hal::SerialTx;

use crate::error::Error;
use crate::message::Message;
use crate::types::PortId;

/// Outbound transport
pub trait Link {
    /// Hand a fully encoded frame to the transport for `msg.port()`
    ///
    /// Called synchronously; failures are reported, never retried here.
    fn send(&mut self, msg: &Message) -> Result<(), Error>;

    /// Inspect a received message before it is dispatched
    ///
    /// Returning a port redirects the automatic response there. The
    /// message itself can be mirrored by the implementation but not
    /// modified.
    fn forward(&mut self, _msg: &Message) -> Option<PortId> {
        None
    }
}

/// Free-running millisecond counter
pub trait Clock {
    fn now_ms(&self) -> u32;
}

impl<F> Clock for F
where
    F: Fn() -> u32,
{
    fn now_ms(&self) -> u32 {
        self()
    }
}

/// [`Link`] that writes frames to one UART transmitter per port
///
/// Port `n` maps to the `n`th transmitter.
pub struct SerialLink<T: SerialTx, const N: usize> {
    ports: [T; N],
}

impl<T: SerialTx, const N: usize> SerialLink<T, N> {
    pub fn new(ports: [T; N]) -> Self {
        Self { ports }
    }

    /// Transmitter behind `port`
    pub fn port_mut(&mut self, port: PortId) -> Option<&mut T> {
        self.ports.get_mut(port.index())
    }

    pub fn into_inner(self) -> [T; N] {
        self.ports
    }
}

impl<T: SerialTx, const N: usize> Link for SerialLink<T, N> {
    fn send(&mut self, msg: &Message) -> Result<(), Error> {
        let port = msg.port();
        let tx = self.ports.get_mut(port.index()).ok_or(Error::Generic)?;

        if tx.write_all(msg.frame()).and_then(|()| tx.flush()).is_err() {
            warn!("UART write failed on port {}", port.0);
            return Err(Error::Transport);
        }
        trace!("TX: {} bytes on port {}", msg.frame().len(), port.0);
        Ok(())
    }
}
