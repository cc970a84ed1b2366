//! Phase-one connection messages.

use crate::error::Result;
use crate::protocol::constants::*;
use crate::protocol::message::{DataMessage, Message, WriteExt};

/// TNS CONNECT packet payload.
///
/// Sent as the first packet of the handshake. Not a DATA packet, so it
/// carries no data flags. When the connect descriptor exceeds
/// `TNS_MAX_CONNECT_DATA` the descriptor travels in a follow-up DATA packet.
pub struct ConnectMessage<'a> {
    /// Connect descriptor, e.g. `(DESCRIPTION=...)`.
    pub connect_string: &'a [u8],
    /// Requested SDU.
    pub sdu: u32,
    /// Whether to advertise OOB support.
    pub enable_oob: bool,
}

impl ConnectMessage<'_> {
    /// Whether the descriptor fits into the CONNECT packet itself.
    pub fn connect_data_in_packet(&self) -> bool {
        self.connect_string.len() <= TNS_MAX_CONNECT_DATA as usize
    }
}

impl Message for ConnectMessage<'_> {
    fn wire_size(&self) -> usize {
        let mut size = 0;
        size += 2; // version_desired
        size += 2; // version_minimum
        size += 2; // service_options
        size += 2; // sdu (16-bit)
        size += 2; // tdu (16-bit)
        size += 2; // protocol_characteristics
        size += 2; // line_turnaround
        size += 2; // value_of_1
        size += 2; // connect_data_length
        size += 2; // connect_data_offset
        size += 4; // max_receivable_data
        size += 1; // nsi_flags_1
        size += 1; // nsi_flags_2
        size += 24; // obsolete fields
        size += 4; // large_sdu
        size += 4; // large_tdu
        size += 4; // connect_flags_1
        size += 4; // connect_flags_2
        if self.connect_data_in_packet() {
            size += self.connect_string.len();
        }
        size
    }

    fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        let connect_data_len = self.connect_string.len() as u16;

        buf.write_u16_be(TNS_VERSION_DESIRED);
        buf.write_u16_be(TNS_VERSION_MINIMUM);

        let mut service_options = TNS_GSO_DONT_CARE;
        if self.enable_oob {
            service_options |= TNS_GSO_CAN_RECV_ATTENTION;
        }
        buf.write_u16_be(service_options);

        buf.write_u16_be(self.sdu as u16);
        buf.write_u16_be(self.sdu as u16);
        buf.write_u16_be(TNS_PROTOCOL_CHARACTERISTICS);
        buf.write_u16_be(0); // line turnaround
        buf.write_u16_be(1); // value of 1

        buf.write_u16_be(connect_data_len);
        buf.write_u16_be(74); // offset to connect data
        buf.write_u32_be(0); // max receivable data

        let nsi_flags = TNS_NSI_SUPPORT_SECURITY_RENEG | TNS_NSI_DISABLE_NA;
        buf.write_u8(nsi_flags);
        buf.write_u8(nsi_flags);

        buf.write_zeros(24);

        buf.write_u32_be(self.sdu);
        buf.write_u32_be(self.sdu);

        buf.write_u32_be(if self.enable_oob { TNS_CHECK_OOB } else { 0 });
        buf.write_u32_be(0);

        if self.connect_data_in_packet() {
            buf.write_bytes(self.connect_string);
        }
        Ok(())
    }
}

/// Protocol negotiation message (phase two, first round trip).
pub struct ProtocolMessage<'a> {
    /// Driver name reported to the server.
    pub driver_name: &'a [u8],
}

impl Default for ProtocolMessage<'_> {
    fn default() -> Self {
        Self {
            driver_name: DRIVER_NAME.as_bytes(),
        }
    }
}

impl Message for ProtocolMessage<'_> {
    fn wire_size(&self) -> usize {
        1 + 1 + 1 + self.driver_name.len() + 1
    }

    fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.write_u8(TNS_MSG_TYPE_PROTOCOL);
        buf.write_u8(6); // client protocol version
        buf.write_u8(0); // array terminator
        buf.write_bytes(self.driver_name);
        buf.write_u8(0); // null terminator
        Ok(())
    }
}

impl DataMessage for ProtocolMessage<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_message_wire_size() {
        let connect_str = b"(DESCRIPTION=(ADDRESS=(HOST=localhost)(PORT=1521)))";
        let msg = ConnectMessage {
            connect_string: connect_str,
            sdu: 8192,
            enable_oob: false,
        };
        let mut buf = Vec::with_capacity(msg.wire_size());
        msg.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), msg.wire_size());
        assert!(msg.connect_data_in_packet());
    }

    #[test]
    fn test_connect_message_large_descriptor() {
        let connect_str = vec![b'x'; 300];
        let msg = ConnectMessage {
            connect_string: &connect_str,
            sdu: 8192,
            enable_oob: false,
        };
        assert!(!msg.connect_data_in_packet());
        let mut buf = Vec::with_capacity(msg.wire_size());
        msg.write_to(&mut buf).unwrap();
        // Descriptor not embedded; header only.
        assert_eq!(buf.len(), msg.wire_size());
        assert_eq!(buf.len(), 66);
    }

    #[test]
    fn test_oob_advertised_in_service_options() {
        let msg = ConnectMessage {
            connect_string: b"x",
            sdu: 8192,
            enable_oob: true,
        };
        let mut buf = Vec::new();
        msg.write_to(&mut buf).unwrap();
        let service_options = u16::from_be_bytes([buf[4], buf[5]]);
        assert!(service_options & TNS_GSO_CAN_RECV_ATTENTION != 0);
    }

    #[test]
    fn test_protocol_message_wire_size() {
        let msg = ProtocolMessage::default();
        let mut buf = Vec::with_capacity(msg.wire_size());
        msg.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), msg.wire_size());
        assert_eq!(buf[0], TNS_MSG_TYPE_PROTOCOL);
    }
}
