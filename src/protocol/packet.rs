//! TNS packet structure.

use crate::protocol::constants::*;
use crate::protocol::message::write_packet_header;
use bytes::Bytes;

/// TNS packet header size.
pub const HEADER_SIZE: usize = 8;

/// A TNS packet.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Packet type.
    pub packet_type: u8,
    /// Packet flags.
    pub packet_flags: u8,
    /// Packet payload (excluding header).
    pub payload: Bytes,
}

impl Packet {
    /// Create a new packet with the given type and payload.
    pub fn new(packet_type: u8, payload: Bytes) -> Self {
        Self {
            packet_type,
            packet_flags: 0,
            payload,
        }
    }

    /// Create a new packet with flags.
    pub fn with_flags(packet_type: u8, packet_flags: u8, payload: Bytes) -> Self {
        Self {
            packet_type,
            packet_flags,
            payload,
        }
    }

    /// Data flags of a DATA packet, when present.
    pub fn data_flags(&self) -> u16 {
        if self.packet_type != TNS_PACKET_TYPE_DATA || self.payload.len() < 2 {
            return 0;
        }
        u16::from_be_bytes([self.payload[0], self.payload[1]])
    }

    /// Check if this is a DATA packet carrying an end-of-response mark.
    pub fn has_end_of_response(&self) -> bool {
        let flags = self.data_flags();
        (flags & TNS_DATA_FLAGS_END_OF_RESPONSE) != 0 || (flags & TNS_DATA_FLAGS_EOF) != 0
    }

    /// Marker type for MARKER packets. The payload is `{1, 0, marker_type}`,
    /// though some servers send a bare single byte.
    pub fn marker_type(&self) -> Option<u8> {
        if self.packet_type != TNS_PACKET_TYPE_MARKER {
            return None;
        }
        if self.payload.len() >= 3 {
            Some(self.payload[2])
        } else {
            self.payload.first().copied()
        }
    }

    /// Total packet size (header plus payload).
    pub fn total_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Serialize the packet to bytes.
    pub fn to_bytes(&self, use_large_sdu: bool) -> Bytes {
        let total_len = self.total_size();
        let mut buf = Vec::with_capacity(total_len);
        write_packet_header(
            &mut buf,
            self.packet_type,
            self.packet_flags,
            total_len,
            use_large_sdu,
        );
        buf.extend_from_slice(&self.payload);
        Bytes::from(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_type() {
        let pkt = Packet::new(
            TNS_PACKET_TYPE_MARKER,
            Bytes::from_static(&[1, 0, TNS_MARKER_TYPE_RESET]),
        );
        assert_eq!(pkt.marker_type(), Some(TNS_MARKER_TYPE_RESET));

        let bare = Packet::new(TNS_PACKET_TYPE_MARKER, Bytes::from_static(&[1]));
        assert_eq!(bare.marker_type(), Some(1));

        let data = Packet::new(TNS_PACKET_TYPE_DATA, Bytes::from_static(&[0, 0]));
        assert_eq!(data.marker_type(), None);
    }

    #[test]
    fn test_end_of_response_flag() {
        let payload = TNS_DATA_FLAGS_END_OF_RESPONSE.to_be_bytes();
        let pkt = Packet::new(TNS_PACKET_TYPE_DATA, Bytes::copy_from_slice(&payload));
        assert!(pkt.has_end_of_response());

        let plain = Packet::new(TNS_PACKET_TYPE_DATA, Bytes::from_static(&[0, 0, 3]));
        assert!(!plain.has_end_of_response());
    }

    #[test]
    fn test_to_bytes_legacy_and_modern() {
        let pkt = Packet::new(TNS_PACKET_TYPE_DATA, Bytes::from_static(&[0, 0, 1, 2]));

        let legacy = pkt.to_bytes(false);
        assert_eq!(legacy.len(), 12);
        assert_eq!(&legacy[0..2], &[0, 12]);
        assert_eq!(legacy[4], TNS_PACKET_TYPE_DATA);

        let modern = pkt.to_bytes(true);
        assert_eq!(&modern[0..4], &[0, 0, 0, 12]);
    }
}
