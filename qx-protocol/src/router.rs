//! Dispatch of received messages to local endpoints
//!
//! CurVal messages feed clients. Read and write requests go to servers,
//! which answer with an automatic CurVal unless their parser suppresses it.

use crate::checksum::Crc32;
use crate::endpoint::{run_parser, Client, Server};
use crate::error::Error;
use crate::link::Link;
use crate::message::{Extension, Message, MessageHeader};
use crate::tx::Transmitter;
use crate::types::{DeviceId, MsgType, ParseType, PortId};

/// Route a validated message to every endpoint it addresses
///
/// Returns [`Error::AttNotHandled`] (and flags the message) when no endpoint
/// claimed the attribute.
pub(crate) fn dispatch<L: Link, K: Crc32>(
    msg: &mut Message,
    servers: &mut [Server<'_>],
    clients: &mut [Client<'_>],
    tx: &mut Transmitter<'_, L, K>,
) -> Result<(), Error> {
    let reply_port = tx.forward(msg).unwrap_or(msg.port());
    let target = msg.header.target;
    let mut handled = false;

    match msg.msg_type() {
        MsgType::CurVal => {
            for client in clients.iter_mut().filter(|c| c.address.accepts(target)) {
                msg.parse_type = ParseType::CurValRecv;
                handled |= run_parser(&mut *client.parser, msg)?;
            }
        }
        MsgType::Read | MsgType::WriteAbs | MsgType::WriteRel => {
            for server in servers.iter_mut().filter(|s| s.address.accepts(target)) {
                handled |= serve(server, msg, tx, reply_port)?;
            }
        }
    }

    if !handled {
        msg.att_not_handled = true;
        debug!(
            "Attrib {} for device {} not handled",
            msg.attrib(),
            target.0
        );
        return Err(Error::AttNotHandled);
    }
    msg.att_not_handled = false;
    Ok(())
}

/// Let one server process a request and send its automatic response
fn serve<L: Link, K: Crc32>(
    server: &mut Server<'_>,
    msg: &mut Message,
    tx: &mut Transmitter<'_, L, K>,
    reply_port: PortId,
) -> Result<bool, Error> {
    // A write whose recv parse succeeded has already changed application
    // state, so it counts as handled even if no CurVal can be packed.
    let mut claimed = false;
    if let Some(parse_type) = ParseType::recv_for(msg.msg_type()) {
        msg.parse_type = parse_type;
        if !run_parser(&mut *server.parser, msg)? {
            return Ok(false);
        }
        claimed = true;
        if msg.suppress_auto_response {
            trace!("Auto response suppressed for attrib {}", msg.attrib());
            return Ok(true);
        }
    }

    let header = response_header(&msg.header, server.address);
    let response = match tx.build(reply_port, &header, msg.legacy_header, Some(&mut *server.parser)) {
        Ok(response) => response,
        Err(Error::AttNotHandled) => {
            debug!("No current value packed for attrib {}", msg.attrib());
            return Ok(claimed);
        }
        Err(e) => return Err(e),
    };
    if response.suppress_auto_response {
        trace!("Auto response suppressed for attrib {}", msg.attrib());
        return Ok(true);
    }
    tx.transmit(&response)?;
    Ok(true)
}

/// Header of the CurVal answering `request`, sent from `source`
///
/// Goes to the response-request address when the request carried one,
/// otherwise back to the requester. Field layout mirrors the request.
pub(crate) fn response_header(request: &MessageHeader, source: DeviceId) -> MessageHeader {
    let target = if request.remove_req_fields || request.resp_req.is_broadcast() {
        request.source
    } else {
        request.resp_req
    };

    MessageHeader {
        length: 0,
        attrib: request.attrib,
        msg_type: MsgType::CurVal,
        add_extension: request.add_extension,
        add_crc32: request.add_crc32,
        extension: Extension {
            id: request.extension.id,
            r0: 0,
            r1: 0,
        },
        remove_addr_fields: request.remove_addr_fields,
        remove_req_fields: request.remove_req_fields,
        source,
        target,
        trans_req: request.trans_req,
        resp_req: request.resp_req,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::SoftwareCrc32;
    use crate::codec::{FrameCodec, QbLegacyHeader};
    use crate::endpoint::AttributeParser;
    use crate::link::mock::RecordingLink;
    use crate::tx::TxOptions;

    const ZOOM: u32 = 42;

    fn request(msg_type: MsgType, opts: TxOptions, payload: &[u8]) -> Message {
        let mut crc = SoftwareCrc32;
        let mut codec = FrameCodec::new(&mut crc, None);
        let header = opts.header(DeviceId::API_CONTROLLER, msg_type, ZOOM);
        codec.encode(PortId(0), &header, false, payload).unwrap()
    }

    /// Server-side zoom attribute backed by `value`
    fn zoom_parser(value: &mut u16) -> impl AttributeParser + '_ {
        move |msg: &mut Message| -> Result<(), Error> {
            if msg.attrib() != ZOOM {
                return Err(Error::AttNotHandled);
            }
            match msg.parse_type() {
                ParseType::CurValSend => msg.write_u16(*value),
                ParseType::WriteAbsRecv => {
                    *value = msg.read_u16()?;
                    Ok(())
                }
                ParseType::WriteRelRecv => {
                    *value = value.wrapping_add_signed(msg.read_i16()?);
                    Ok(())
                }
                _ => Ok(()),
            }
        }
    }

    fn run(
        msg: &mut Message,
        servers: &mut [Server<'_>],
        clients: &mut [Client<'_>],
        link: &mut RecordingLink,
    ) -> Result<(), Error> {
        let mut crc = SoftwareCrc32;
        let mut tx = Transmitter::new(link, FrameCodec::new(&mut crc, None));
        dispatch(msg, servers, clients, &mut tx)
    }

    fn decode(msg: &Message) -> Message {
        let mut crc = SoftwareCrc32;
        FrameCodec::new(&mut crc, None).decode(msg.frame()).unwrap()
    }

    #[test]
    fn test_read_gets_auto_response() {
        let mut zoom = 3000;
        let mut parser = zoom_parser(&mut zoom);
        let mut servers = [Server::new(DeviceId::GIMBAL, &mut parser)];
        let mut link = RecordingLink::default();

        let mut msg = request(MsgType::Read, TxOptions::new().to(DeviceId::GIMBAL), &[]);
        run(&mut msg, &mut servers, &mut [], &mut link).unwrap();

        assert_eq!(link.sent.len(), 1);
        let mut reply = decode(&link.sent[0]);
        assert_eq!(reply.msg_type(), MsgType::CurVal);
        assert_eq!(reply.attrib(), ZOOM);
        assert_eq!(reply.header().source, DeviceId::GIMBAL);
        assert_eq!(reply.header().target, DeviceId::API_CONTROLLER);
        assert_eq!(reply.read_u16().unwrap(), 3000);
    }

    #[test]
    fn test_write_applies_then_reports_new_value() {
        let mut zoom = 10;
        {
            let mut parser = zoom_parser(&mut zoom);
            let mut servers = [Server::new(DeviceId::GIMBAL, &mut parser)];
            let mut link = RecordingLink::default();

            let opts = TxOptions::new().to(DeviceId::GIMBAL);
            let mut msg = request(MsgType::WriteRel, opts, &(-4i16).to_be_bytes());
            run(&mut msg, &mut servers, &mut [], &mut link).unwrap();

            let mut reply = decode(&link.sent[0]);
            assert_eq!(reply.read_u16().unwrap(), 6);
        }
        assert_eq!(zoom, 6);
    }

    #[test]
    fn test_suppressed_response() {
        let mut parser = |msg: &mut Message| -> Result<(), Error> {
            msg.read_u16()?;
            msg.disable_std_response();
            Ok(())
        };
        let mut servers = [Server::new(DeviceId::GIMBAL, &mut parser)];
        let mut link = RecordingLink::default();

        let opts = TxOptions::new().to(DeviceId::GIMBAL);
        let mut msg = request(MsgType::WriteAbs, opts, &[0, 1]);
        run(&mut msg, &mut servers, &mut [], &mut link).unwrap();

        assert!(link.sent.is_empty());
        assert!(msg.is_std_response_disabled());
    }

    #[test]
    fn test_unaddressed_write_is_not_handled() {
        let mut calls = 0;
        let mut parser = |_: &mut Message| -> Result<(), Error> {
            calls += 1;
            Ok(())
        };
        let mut link = RecordingLink::default();
        {
            let mut servers = [Server::new(DeviceId::GIMBAL, &mut parser)];
            let opts = TxOptions::new().to(DeviceId::LENS_CONTROLLER);
            let mut msg = request(MsgType::WriteAbs, opts, &[0, 1]);

            assert_eq!(
                run(&mut msg, &mut servers, &mut [], &mut link),
                Err(Error::AttNotHandled)
            );
            assert!(msg.is_attribute_unhandled());
        }
        assert_eq!(calls, 0);
        assert!(link.sent.is_empty());
    }

    #[test]
    fn test_write_only_attribute_is_handled() {
        let mut stored = 0u16;
        {
            let mut parser = |msg: &mut Message| -> Result<(), Error> {
                match msg.parse_type() {
                    ParseType::WriteAbsRecv => {
                        stored = msg.read_u16()?;
                        Ok(())
                    }
                    _ => Err(Error::AttNotHandled),
                }
            };
            let mut servers = [Server::new(DeviceId::GIMBAL, &mut parser)];
            let mut link = RecordingLink::default();

            let opts = TxOptions::new().to(DeviceId::GIMBAL);
            let mut msg = request(MsgType::WriteAbs, opts, &0x0102u16.to_be_bytes());

            assert_eq!(run(&mut msg, &mut servers, &mut [], &mut link), Ok(()));
            assert!(!msg.is_attribute_unhandled());
            assert!(link.sent.is_empty());
        }
        assert_eq!(stored, 0x0102);
    }

    #[test]
    fn test_unknown_attribute_leaves_state_alone() {
        let mut zoom = 77;
        {
            let mut parser = zoom_parser(&mut zoom);
            let mut servers = [Server::new(DeviceId::GIMBAL, &mut parser)];
            let mut link = RecordingLink::default();

            let mut crc = SoftwareCrc32;
            let header = TxOptions::new()
                .to(DeviceId::GIMBAL)
                .header(DeviceId::API_CONTROLLER, MsgType::WriteAbs, 99);
            let mut msg = FrameCodec::new(&mut crc, None)
                .encode(PortId(0), &header, false, &[0, 1])
                .unwrap();

            assert_eq!(
                run(&mut msg, &mut servers, &mut [], &mut link),
                Err(Error::AttNotHandled)
            );
            assert!(link.sent.is_empty());
        }
        assert_eq!(zoom, 77);
    }

    #[test]
    fn test_curval_broadcast_reaches_every_client() {
        let mut seen_a = None;
        let mut seen_b = None;
        let mut link = RecordingLink::default();
        {
            let mut a = |msg: &mut Message| -> Result<(), Error> {
                seen_a = Some(msg.read_u8()?);
                Ok(())
            };
            let mut b = |msg: &mut Message| -> Result<(), Error> {
                seen_b = Some(msg.read_u8()?);
                Ok(())
            };
            let mut clients = [
                Client::new(DeviceId::LENS_CONTROLLER, &mut a),
                Client::new(DeviceId::API_CONTROLLER, &mut b),
            ];

            let mut msg = request(MsgType::CurVal, TxOptions::new(), &[9]);
            run(&mut msg, &mut [], &mut clients, &mut link).unwrap();
        }
        assert_eq!(seen_a, Some(9));
        assert_eq!(seen_b, Some(9));
        assert!(link.sent.is_empty());
    }

    #[test]
    fn test_curval_is_not_given_to_servers() {
        let mut zoom = 1;
        let mut parser = zoom_parser(&mut zoom);
        let mut servers = [Server::new(DeviceId::GIMBAL, &mut parser)];
        let mut link = RecordingLink::default();

        let mut msg = request(MsgType::CurVal, TxOptions::new().to(DeviceId::GIMBAL), &[0, 5]);
        assert_eq!(
            run(&mut msg, &mut servers, &mut [], &mut link),
            Err(Error::AttNotHandled)
        );
    }

    #[test]
    fn test_response_goes_to_resp_req() {
        let mut zoom = 1;
        let mut parser = zoom_parser(&mut zoom);
        let mut servers = [Server::new(DeviceId::GIMBAL, &mut parser)];
        let mut link = RecordingLink::default();

        let opts = TxOptions::new()
            .to(DeviceId::GIMBAL)
            .with_request_addrs(DeviceId::API_CONTROLLER, DeviceId::LENS_CONTROLLER);
        let mut msg = request(MsgType::Read, opts, &[]);
        run(&mut msg, &mut servers, &mut [], &mut link).unwrap();

        let reply = decode(&link.sent[0]);
        assert_eq!(reply.header().target, DeviceId::LENS_CONTROLLER);
        assert_eq!(reply.header().trans_req, DeviceId::API_CONTROLLER);
    }

    #[test]
    fn test_forward_hook_redirects_response() {
        let mut zoom = 1;
        let mut parser = zoom_parser(&mut zoom);
        let mut servers = [Server::new(DeviceId::GIMBAL, &mut parser)];
        let mut link = RecordingLink {
            redirect: Some(PortId(2)),
            ..Default::default()
        };

        let mut msg = request(MsgType::Read, TxOptions::new().to(DeviceId::GIMBAL), &[]);
        run(&mut msg, &mut servers, &mut [], &mut link).unwrap();

        assert_eq!(link.forwarded, 1);
        assert_eq!(link.sent[0].port(), PortId(2));
    }

    #[test]
    fn test_response_mirrors_request_layout() {
        let request = TxOptions::new()
            .to(DeviceId::GIMBAL)
            .with_crc32()
            .with_extension(5)
            .without_req_fields()
            .header(DeviceId::API_CONTROLLER, MsgType::WriteAbs, ZOOM);
        let header = response_header(&request, DeviceId::GIMBAL);

        assert!(header.add_crc32 && header.add_extension && header.remove_req_fields);
        assert!(!header.remove_addr_fields);
        assert_eq!(header.extension.id, 5);
        assert_eq!(header.target, DeviceId::API_CONTROLLER);
        assert_eq!(header.msg_type, MsgType::CurVal);
    }

    #[test]
    fn test_legacy_request_gets_legacy_response() {
        let legacy = QbLegacyHeader;
        let mut crc = SoftwareCrc32;
        let header = TxOptions::new().header(DeviceId::API_CONTROLLER, MsgType::Read, ZOOM);
        let mut msg = FrameCodec::new(&mut crc, Some(&legacy))
            .encode(PortId(0), &header, true, &[])
            .unwrap();

        let mut zoom = 12;
        let mut parser = zoom_parser(&mut zoom);
        let mut servers = [Server::new(DeviceId::GIMBAL, &mut parser)];
        let mut link = RecordingLink::default();
        let mut tx_crc = SoftwareCrc32;
        let mut tx = Transmitter::new(&mut link, FrameCodec::new(&mut tx_crc, Some(&legacy)));
        dispatch(&mut msg, &mut servers, &mut [], &mut tx).unwrap();

        assert_eq!(link.sent.len(), 1);
        assert!(link.sent[0].is_legacy_header());
        assert_eq!(link.sent[0].payload(), &12u16.to_be_bytes());
    }
}
