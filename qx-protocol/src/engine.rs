//! Protocol engine
//!
//! Owns the port, server and client registries together with the
//! collaborators (link, clock, CRC32, optional legacy header codec). All
//! protocol operations go through one engine instance, so nothing lives in
//! global state. Registries are fixed-capacity and never reallocate:
//!
//! - `P` ports, of which `config.num_ports` are brought up
//! - `S` servers
//! - `N` clients

use heapless::Vec;
use qx_hal::SerialRx;

use crate::checksum::{Crc32, SoftwareCrc32};
use crate::codec::{FrameCodec, LegacyHeaderCodec};
use crate::config::ProtocolConfig;
use crate::endpoint::{AttributeParser, Client, ClientId, Server, ServerId};
use crate::error::Error;
use crate::link::{Clock, Link};
use crate::port::CommsPort;
use crate::router;
use crate::tx::{Transmitter, TxOptions};
use crate::types::{DeviceId, MsgType, PortId};

/// Bytes pulled from a receiver per read in [`ProtocolEngine::poll_serial`]
const RX_CHUNK_LEN: usize = 32;

/// Local endpoint a send originates from
#[derive(Clone, Copy)]
enum Origin {
    Server(ServerId),
    Client(ClientId),
}

/// QX protocol engine
pub struct ProtocolEngine<'a, L, C, K, const P: usize, const S: usize, const N: usize>
where
    L: Link,
    C: Clock,
    K: Crc32,
{
    config: ProtocolConfig,
    ports: Vec<CommsPort, P>,
    servers: Vec<Server<'a>, S>,
    clients: Vec<Client<'a>, N>,
    link: L,
    clock: C,
    crc: K,
    legacy: Option<&'a dyn LegacyHeaderCodec>,
}

impl<'a, L, C, const P: usize, const S: usize, const N: usize>
    ProtocolEngine<'a, L, C, SoftwareCrc32, P, S, N>
where
    L: Link,
    C: Clock,
{
    /// Create an engine using the software CRC32
    pub fn new(config: ProtocolConfig, link: L, clock: C) -> Result<Self, Error> {
        Self::with_crc32(config, link, clock, SoftwareCrc32)
    }
}

impl<'a, L, C, K, const P: usize, const S: usize, const N: usize> ProtocolEngine<'a, L, C, K, P, S, N>
where
    L: Link,
    C: Clock,
    K: Crc32,
{
    /// Create an engine with a substitute (e.g. hardware) CRC32
    ///
    /// Fails with [`Error::Generic`] if the configured port count is zero or
    /// exceeds `P`.
    pub fn with_crc32(config: ProtocolConfig, link: L, clock: C, crc: K) -> Result<Self, Error> {
        let num_ports = usize::from(config.num_ports);
        if num_ports == 0 || num_ports > P {
            warn!("Invalid port count {} (capacity {})", num_ports, P);
            return Err(Error::Generic);
        }

        let mut ports = Vec::new();
        for i in 0..config.num_ports {
            ports
                .push(CommsPort::new(PortId(i), config.port_timeout_ms))
                .map_err(|_| Error::Generic)?;
        }

        Ok(Self {
            config,
            ports,
            servers: Vec::new(),
            clients: Vec::new(),
            link,
            clock,
            crc,
            legacy: None,
        })
    }

    /// Accept and build version 0 frames with `codec`
    pub fn with_legacy_header(mut self, codec: &'a dyn LegacyHeaderCodec) -> Self {
        self.legacy = Some(codec);
        self
    }

    /// Register a server at `address`
    pub fn init_srv(
        &mut self,
        address: DeviceId,
        parser: &'a mut dyn AttributeParser,
    ) -> Result<ServerId, Error> {
        let id = ServerId(self.servers.len());
        self.servers
            .push(Server::new(address, parser))
            .map_err(|_| Error::Generic)?;
        debug!("Server {} registered at device {}", id.0, address.0);
        Ok(id)
    }

    /// Register a client at `address`
    pub fn init_cli(
        &mut self,
        address: DeviceId,
        parser: &'a mut dyn AttributeParser,
    ) -> Result<ClientId, Error> {
        let id = ClientId(self.clients.len());
        self.clients
            .push(Client::new(address, parser))
            .map_err(|_| Error::Generic)?;
        debug!("Client {} registered at device {}", id.0, address.0);
        Ok(id)
    }

    /// Feed one received byte to `port`
    ///
    /// Returns true only for the byte that completed a valid frame. That
    /// frame has been dispatched by the time this returns; the outcome is
    /// kept in [`CommsPort::last_status`].
    pub fn receive_byte(&mut self, port: PortId, byte: u8) -> bool {
        let Self {
            ports,
            servers,
            clients,
            link,
            clock,
            crc,
            legacy,
            ..
        } = self;
        let Some(port) = ports.get_mut(port.index()) else {
            return false;
        };

        let mut codec = FrameCodec::new(crc, *legacy);
        match port.receive(byte, &mut codec) {
            Ok(false) => false,
            Ok(true) => {
                port.monitor.record_rx(clock.now_ms());
                trace!(
                    "RX {} attrib {} from device {} on port {}",
                    port.rx_msg.msg_type(),
                    port.rx_msg.attrib(),
                    port.rx_msg.header().source.0,
                    port.id().0
                );

                let mut tx = Transmitter::new(link, codec);
                let status = router::dispatch(&mut port.rx_msg, servers, clients, &mut tx);
                if let Err(e) = status {
                    debug!("Dispatch on port {}: {}", port.id().0, e);
                }
                port.last_status = Some(status);
                true
            }
            Err(e) => {
                warn!("Frame dropped on port {}: {}", port.id().0, e);
                false
            }
        }
    }

    /// Drain everything `rx` has buffered into `port`
    ///
    /// Returns the number of frames completed.
    pub fn poll_serial<R: SerialRx>(&mut self, port: PortId, rx: &mut R) -> Result<usize, R::Error> {
        let mut buf = [0u8; RX_CHUNK_LEN];
        let mut frames = 0;

        loop {
            let n = rx.read_available(&mut buf)?.min(RX_CHUNK_LEN);
            if n == 0 {
                break;
            }
            for &byte in &buf[..n] {
                if self.receive_byte(port, byte) {
                    frames += 1;
                }
            }
        }
        Ok(frames)
    }

    /// Account `elapsed_ms` of silence on `port`
    pub fn tick(&mut self, port: PortId, elapsed_ms: u32) -> Result<(), Error> {
        let port = self.ports.get_mut(port.index()).ok_or(Error::Generic)?;
        if port.monitor.tick(elapsed_ms) {
            info!("Port {} disconnected", port.id().0);
        }
        Ok(())
    }

    /// Recompute liveness of `port` from the clock
    pub fn connection_status_update(&mut self, port: PortId) -> Result<(), Error> {
        let now = self.clock.now_ms();
        let port = self.ports.get_mut(port.index()).ok_or(Error::Generic)?;
        if port.monitor.update_from_clock(now) {
            info!("Port {} disconnected", port.id().0);
        }
        Ok(())
    }

    /// Push the current value of `attrib` from a server
    pub fn send_srv_curval(
        &mut self,
        server: ServerId,
        port: PortId,
        attrib: u32,
        opts: &TxOptions,
    ) -> Result<(), Error> {
        self.send(Origin::Server(server), port, MsgType::CurVal, attrib, opts)
    }

    /// Ask the target for the current value of `attrib`
    pub fn send_cli_read(
        &mut self,
        client: ClientId,
        port: PortId,
        attrib: u32,
        opts: &TxOptions,
    ) -> Result<(), Error> {
        self.send(Origin::Client(client), port, MsgType::Read, attrib, opts)
    }

    /// Write an absolute value packed by the client's parser
    pub fn send_cli_write_abs(
        &mut self,
        client: ClientId,
        port: PortId,
        attrib: u32,
        opts: &TxOptions,
    ) -> Result<(), Error> {
        self.send(Origin::Client(client), port, MsgType::WriteAbs, attrib, opts)
    }

    /// Write a relative value packed by the client's parser
    pub fn send_cli_write_rel(
        &mut self,
        client: ClientId,
        port: PortId,
        attrib: u32,
        opts: &TxOptions,
    ) -> Result<(), Error> {
        self.send(Origin::Client(client), port, MsgType::WriteRel, attrib, opts)
    }

    /// Absolute write that always carries the request addresses
    ///
    /// Used for routed command chains where the receiver must know who
    /// asked and where the answer goes.
    pub fn send_control(
        &mut self,
        client: ClientId,
        port: PortId,
        attrib: u32,
        opts: &TxOptions,
    ) -> Result<(), Error> {
        let mut opts = *opts;
        opts.remove_req_fields = false;
        self.send(Origin::Client(client), port, MsgType::WriteAbs, attrib, &opts)
    }

    fn send(
        &mut self,
        origin: Origin,
        port: PortId,
        msg_type: MsgType,
        attrib: u32,
        opts: &TxOptions,
    ) -> Result<(), Error> {
        let Self {
            ports,
            servers,
            clients,
            link,
            crc,
            legacy,
            ..
        } = self;
        if port.index() >= ports.len() {
            return Err(Error::Generic);
        }

        let (address, parser) = match origin {
            Origin::Server(id) => servers
                .get_mut(id.0)
                .map(|s| (s.address, &mut *s.parser)),
            Origin::Client(id) => clients
                .get_mut(id.0)
                .map(|c| (c.address, &mut *c.parser)),
        }
        .ok_or(Error::Generic)?;

        let header = opts.header(address, msg_type, attrib);
        let mut tx = Transmitter::new(link, FrameCodec::new(crc, *legacy));
        let result = tx.send(port, &header, opts.legacy_header, Some(parser));
        if let Err(e) = result {
            warn!("Send attrib {} on port {} failed: {}", attrib, port.0, e);
        }
        result
    }

    /// Port state and counters
    pub fn port(&self, port: PortId) -> Option<&CommsPort> {
        self.ports.get(port.index())
    }

    pub fn ports(&self) -> &[CommsPort] {
        &self.ports
    }

    /// Returns true if `port` received a valid frame within its timeout
    pub fn is_connected(&self, port: PortId) -> bool {
        self.port(port).is_some_and(CommsPort::is_connected)
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }
}
