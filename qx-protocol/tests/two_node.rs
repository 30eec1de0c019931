//! Two devices talking over an in-memory wire: an API controller client and
//! a gimbal server.

use std::cell::Cell;

use proptest::prelude::*;
use qx_protocol::rx::RxState;
use qx_protocol::{
    Clock, DeviceId, Error, FrameCodec, Link, Message, MessageHeader, MsgType, ParseType, PortId,
    ProtocolConfig, ProtocolEngine, QbLegacyHeader, SoftwareCrc32, TxOptions,
};

const ZOOM: u32 = 42;
const PORT: PortId = PortId(0);

/// Link that keeps the raw bytes of every frame sent
#[derive(Default)]
struct Wire {
    frames: Vec<Vec<u8>>,
}

impl Link for Wire {
    fn send(&mut self, msg: &Message) -> Result<(), Error> {
        self.frames.push(msg.frame().to_vec());
        Ok(())
    }
}

type Node<'a, C> = ProtocolEngine<'a, Wire, C, SoftwareCrc32, 1, 2, 2>;

fn node<'a>() -> Node<'a, impl Clock> {
    Node::new(ProtocolConfig::default(), Wire::default(), || 0u32).unwrap()
}

/// Move everything `from` sent into `to`, returning completed frames
fn deliver<C1: Clock, C2: Clock>(from: &mut Node<'_, C1>, to: &mut Node<'_, C2>) -> usize {
    let frames = std::mem::take(&mut from.link_mut().frames);
    frames
        .iter()
        .flatten()
        .filter(|&&byte| to.receive_byte(PORT, byte))
        .count()
}

/// Read request injected straight onto the wire
fn read_header(attrib: u32) -> MessageHeader {
    MessageHeader {
        msg_type: MsgType::Read,
        attrib,
        source: DeviceId::API_CONTROLLER,
        target: DeviceId::GIMBAL,
        ..Default::default()
    }
}

fn decode(bytes: &[u8]) -> Message {
    let mut crc = SoftwareCrc32;
    FrameCodec::new(&mut crc, None).decode(bytes).unwrap()
}

/// Gimbal zoom attribute backed by `zoom`
fn zoom_server(zoom: &Cell<u16>) -> impl FnMut(&mut Message) -> Result<(), Error> + '_ {
    move |msg: &mut Message| {
        if msg.attrib() != ZOOM {
            return Err(Error::AttNotHandled);
        }
        match msg.parse_type() {
            ParseType::CurValSend => msg.write_u16(zoom.get()),
            ParseType::WriteAbsRecv => {
                zoom.set(msg.read_u16()?);
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Controller side: stores CurVal updates, packs `setpoint` for writes
fn zoom_client<'a>(
    seen: &'a Cell<Option<u16>>,
    setpoint: u16,
) -> impl FnMut(&mut Message) -> Result<(), Error> + 'a {
    move |msg: &mut Message| match msg.parse_type() {
        ParseType::CurValRecv => {
            seen.set(Some(msg.read_u16()?));
            Ok(())
        }
        ParseType::WriteAbsSend => msg.write_u16(setpoint),
        _ => Ok(()),
    }
}

#[test]
fn read_request_gets_current_value() {
    let zoom = Cell::new(3000);
    let seen = Cell::new(None);
    let mut server_parser = zoom_server(&zoom);
    let mut client_parser = zoom_client(&seen, 0);

    let mut gimbal = node();
    gimbal.init_srv(DeviceId::GIMBAL, &mut server_parser).unwrap();
    let mut api = node();
    let client = api.init_cli(DeviceId::API_CONTROLLER, &mut client_parser).unwrap();

    let opts = TxOptions::new().to(DeviceId::GIMBAL);
    api.send_cli_read(client, PORT, ZOOM, &opts).unwrap();

    let request = decode(&api.link().frames[0]);
    assert_eq!(request.msg_type(), MsgType::Read);
    assert_eq!(request.attrib(), ZOOM);
    assert_eq!(request.header().target, DeviceId::GIMBAL);
    assert_eq!(request.header().source, DeviceId::API_CONTROLLER);

    assert_eq!(deliver(&mut api, &mut gimbal), 1);
    assert_eq!(gimbal.port(PORT).unwrap().last_status(), Some(Ok(())));

    let response = decode(&gimbal.link().frames[0]);
    assert_eq!(response.msg_type(), MsgType::CurVal);
    assert_eq!(response.attrib(), ZOOM);
    assert_eq!(response.header().target, DeviceId::API_CONTROLLER);
    assert_eq!(response.header().source, DeviceId::GIMBAL);

    assert_eq!(deliver(&mut gimbal, &mut api), 1);
    assert_eq!(seen.get(), Some(3000));
    assert!(api.is_connected(PORT));
}

#[test]
fn suppressed_read_gets_no_response() {
    let mut server_parser = |msg: &mut Message| -> Result<(), Error> {
        msg.disable_std_response();
        msg.write_u16(1)
    };
    let mut client_parser = |_: &mut Message| -> Result<(), Error> { Ok(()) };

    let mut gimbal = node();
    gimbal.init_srv(DeviceId::GIMBAL, &mut server_parser).unwrap();
    let mut api = node();
    let client = api.init_cli(DeviceId::API_CONTROLLER, &mut client_parser).unwrap();

    let opts = TxOptions::new().to(DeviceId::GIMBAL);
    api.send_cli_read(client, PORT, ZOOM, &opts).unwrap();

    assert_eq!(deliver(&mut api, &mut gimbal), 1);
    assert_eq!(gimbal.port(PORT).unwrap().last_status(), Some(Ok(())));
    assert!(gimbal.link().frames.is_empty());
}

#[test]
fn write_updates_server_and_echoes_value() {
    let zoom = Cell::new(0);
    let seen = Cell::new(None);
    let mut server_parser = zoom_server(&zoom);
    let mut client_parser = zoom_client(&seen, 1234);

    let mut gimbal = node();
    gimbal.init_srv(DeviceId::GIMBAL, &mut server_parser).unwrap();
    let mut api = node();
    let client = api.init_cli(DeviceId::API_CONTROLLER, &mut client_parser).unwrap();

    let opts = TxOptions::new().to(DeviceId::GIMBAL).with_crc32();
    api.send_cli_write_abs(client, PORT, ZOOM, &opts).unwrap();

    assert_eq!(deliver(&mut api, &mut gimbal), 1);
    assert_eq!(zoom.get(), 1234);

    let response = decode(&gimbal.link().frames[0]);
    assert!(response.header().add_crc32);

    assert_eq!(deliver(&mut gimbal, &mut api), 1);
    assert_eq!(seen.get(), Some(1234));
}

#[test]
fn write_to_unowned_attribute_is_not_handled() {
    let zoom = Cell::new(50);
    let seen = Cell::new(None);
    let mut server_parser = zoom_server(&zoom);
    let mut client_parser = zoom_client(&seen, 999);

    let mut gimbal = node();
    gimbal.init_srv(DeviceId::GIMBAL, &mut server_parser).unwrap();
    let mut api = node();
    let client = api.init_cli(DeviceId::API_CONTROLLER, &mut client_parser).unwrap();

    let opts = TxOptions::new().to(DeviceId::GIMBAL);
    api.send_cli_write_abs(client, PORT, ZOOM + 1, &opts).unwrap();

    assert_eq!(deliver(&mut api, &mut gimbal), 1);
    let port = gimbal.port(PORT).unwrap();
    assert_eq!(port.last_status(), Some(Err(Error::AttNotHandled)));
    assert!(port.rx_msg().is_attribute_unhandled());
    assert_eq!(zoom.get(), 50);
    assert!(gimbal.link().frames.is_empty());
}

#[test]
fn legacy_request_and_response() {
    let legacy = QbLegacyHeader;
    let zoom = Cell::new(77);
    let seen = Cell::new(None);
    let mut server_parser = zoom_server(&zoom);
    let mut client_parser = zoom_client(&seen, 0);

    let mut gimbal = node().with_legacy_header(&legacy);
    gimbal.init_srv(DeviceId::GIMBAL, &mut server_parser).unwrap();
    let mut api = node().with_legacy_header(&legacy);
    let client = api.init_cli(DeviceId::API_CONTROLLER, &mut client_parser).unwrap();

    api.send_cli_read(client, PORT, ZOOM, &TxOptions::new().legacy())
        .unwrap();
    assert_eq!(api.link().frames[0][2], 0x00);

    assert_eq!(deliver(&mut api, &mut gimbal), 1);
    assert_eq!(gimbal.link().frames[0][2], 0x00);
    assert_eq!(deliver(&mut gimbal, &mut api), 1);
    assert_eq!(seen.get(), Some(77));
}

#[test]
fn legacy_frame_needs_codec() {
    let legacy = QbLegacyHeader;
    let mut client_parser = |_: &mut Message| -> Result<(), Error> { Ok(()) };
    let mut api = node().with_legacy_header(&legacy);
    let client = api.init_cli(DeviceId::API_CONTROLLER, &mut client_parser).unwrap();
    let mut gimbal = node();

    api.send_cli_read(client, PORT, ZOOM, &TxOptions::new().legacy())
        .unwrap();

    assert_eq!(deliver(&mut api, &mut gimbal), 0);
    assert_eq!(
        gimbal.port(PORT).unwrap().last_status(),
        Some(Err(Error::Generic))
    );
}

#[test]
fn oversized_length_is_rejected_early() {
    let mut gimbal = node();
    for byte in [b'Q', b'X', 0x01, 0x00, 0x46] {
        assert!(!gimbal.receive_byte(PORT, byte));
    }

    let port = gimbal.port(PORT).unwrap();
    assert_eq!(port.last_status(), Some(Err(Error::MsgLengthInvalid)));
    assert_eq!(port.rx_state(), RxState::StartWait);
    assert_eq!(port.rx_count(), 0);
}

#[test]
fn forward_hook_redirects_response() {
    struct TwoPortWire {
        sent_on: Vec<PortId>,
    }

    impl Link for TwoPortWire {
        fn send(&mut self, msg: &Message) -> Result<(), Error> {
            self.sent_on.push(msg.port());
            Ok(())
        }

        fn forward(&mut self, msg: &Message) -> Option<PortId> {
            (msg.port() == PortId(0)).then_some(PortId(1))
        }
    }

    let zoom = Cell::new(5);
    let mut server_parser = zoom_server(&zoom);
    let config = ProtocolConfig {
        num_ports: 2,
        ..Default::default()
    };
    let mut gimbal: ProtocolEngine<'_, TwoPortWire, _, SoftwareCrc32, 2, 1, 1> =
        ProtocolEngine::new(config, TwoPortWire { sent_on: Vec::new() }, || 0u32).unwrap();
    gimbal.init_srv(DeviceId::GIMBAL, &mut server_parser).unwrap();

    let mut crc = SoftwareCrc32;
    let header = read_header(ZOOM);
    let request = FrameCodec::new(&mut crc, None)
        .encode(PortId(0), &header, false, &[])
        .unwrap();
    for &byte in request.frame() {
        gimbal.receive_byte(PortId(0), byte);
    }

    assert_eq!(gimbal.link().sent_on, vec![PortId(1)]);
}

proptest! {
    #[test]
    fn noise_before_frame_is_skipped(
        noise in prop::collection::vec(any::<u8>().prop_filter("start marker", |b| *b != b'Q'), 0..64)
    ) {
        let zoom = Cell::new(9);
        let mut server_parser = zoom_server(&zoom);
        let mut gimbal = node();
        gimbal.init_srv(DeviceId::GIMBAL, &mut server_parser).unwrap();

        let mut crc = SoftwareCrc32;
        let request = FrameCodec::new(&mut crc, None)
            .encode(PORT, &read_header(ZOOM), false, &[])
            .unwrap();

        let completed = noise
            .iter()
            .chain(request.frame())
            .filter(|&&byte| gimbal.receive_byte(PORT, byte))
            .count();

        prop_assert_eq!(completed, 1);
        let port = gimbal.port(PORT).unwrap();
        prop_assert_eq!(port.non_q_count(), noise.len() as u32);
        prop_assert_eq!(port.chksum_fail_count(), 0);
        prop_assert_eq!(gimbal.link().frames.len(), 1);
    }
}
