//! Message traits and write helpers for zero-copy TTC serialization.
//!
//! Request codecs implement [`Message`]: they can compute their wire size up
//! front, so serialization happens into a single exactly-sized allocation.

use crate::error::Result;
use crate::protocol::constants::*;

/// A message that can calculate its wire size and serialize itself.
pub trait Message {
    /// Serialized size in bytes (excluding packet header and data flags).
    fn wire_size(&self) -> usize;

    /// Write the message content into `buf`.
    ///
    /// The caller guarantees the buffer has capacity from `wire_size()`.
    fn write_to(&self, buf: &mut Vec<u8>) -> Result<()>;
}

/// A message carried in a DATA packet, which has a 2-byte flags prefix.
pub trait DataMessage: Message {
    /// Data flags for this message.
    fn data_flags(&self) -> u16 {
        0
    }
}

// Size calculation helpers. These must agree byte-for-byte with the
// corresponding WriteExt methods; the wire-size tests enforce that.

/// Wire size of a UB2 value.
#[inline]
pub const fn ub2_wire_size(val: u16) -> usize {
    match val {
        0 => 1,
        1..=0xFF => 2,
        _ => 3,
    }
}

/// Wire size of a UB4 value.
#[inline]
pub const fn ub4_wire_size(val: u32) -> usize {
    match val {
        0 => 1,
        1..=0xFF => 2,
        0x100..=0xFFFF => 3,
        0x10000..=0xFFFFFF => 4,
        _ => 5,
    }
}

/// Wire size of a UB8 value.
#[inline]
pub const fn ub8_wire_size(val: u64) -> usize {
    match val {
        0 => 1,
        1..=0xFF => 2,
        0x100..=0xFFFF => 3,
        0x10000..=0xFFFFFF => 4,
        0x1000000..=0xFFFFFFFF => 5,
        0x100000000..=0xFFFFFFFFFF => 6,
        0x10000000000..=0xFFFFFFFFFFFF => 7,
        0x1000000000000..=0xFFFFFFFFFFFFFF => 8,
        _ => 9,
    }
}

/// Wire size of length-prefixed bytes (chunked long form above 252 bytes).
#[inline]
pub const fn bytes_with_length_wire_size(len: usize) -> usize {
    if len == 0 {
        1
    } else if len <= TNS_MAX_SHORT_LENGTH {
        1 + len
    } else {
        let num_chunks = len.div_ceil(65536);
        1 + (num_chunks * 5) + len + 1
    }
}

/// Wire size of a length-prefixed string.
#[inline]
pub const fn str_with_length_wire_size(s: &str) -> usize {
    bytes_with_length_wire_size(s.len())
}

/// Wire size of an auth key/value pair.
pub fn key_value_wire_size(key: &str, value: &str, flags: u32) -> usize {
    let key_len = key.len();
    let value_len = value.len();

    ub4_wire_size(key_len as u32)
        + bytes_with_length_wire_size(key_len)
        + ub4_wire_size(value_len as u32)
        + if value_len == 0 {
            0
        } else {
            bytes_with_length_wire_size(value_len)
        }
        + ub4_wire_size(flags)
}

/// Extension trait for writing TTC data into a `Vec<u8>`.
pub trait WriteExt {
    fn write_u8(&mut self, val: u8);
    fn write_u16_be(&mut self, val: u16);
    fn write_u16_le(&mut self, val: u16);
    fn write_u32_be(&mut self, val: u32);
    fn write_u64_be(&mut self, val: u64);
    fn write_bytes(&mut self, bytes: &[u8]);
    fn write_zeros(&mut self, count: usize);
    fn write_ub1(&mut self, val: u8);
    fn write_ub2(&mut self, val: u16);
    fn write_ub4(&mut self, val: u32);
    fn write_ub8(&mut self, val: u64);
    fn write_bytes_with_length(&mut self, bytes: &[u8]);
    fn write_str_with_length(&mut self, s: &str);
    fn write_key_value(&mut self, key: &str, value: &str, flags: u32);
}

impl WriteExt for Vec<u8> {
    #[inline]
    fn write_u8(&mut self, val: u8) {
        self.push(val);
    }

    #[inline]
    fn write_u16_be(&mut self, val: u16) {
        self.extend_from_slice(&val.to_be_bytes());
    }

    #[inline]
    fn write_u16_le(&mut self, val: u16) {
        self.extend_from_slice(&val.to_le_bytes());
    }

    #[inline]
    fn write_u32_be(&mut self, val: u32) {
        self.extend_from_slice(&val.to_be_bytes());
    }

    #[inline]
    fn write_u64_be(&mut self, val: u64) {
        self.extend_from_slice(&val.to_be_bytes());
    }

    #[inline]
    fn write_bytes(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }

    #[inline]
    fn write_zeros(&mut self, count: usize) {
        self.resize(self.len() + count, 0);
    }

    #[inline]
    fn write_ub1(&mut self, val: u8) {
        self.push(val);
    }

    fn write_ub2(&mut self, val: u16) {
        if val == 0 {
            self.push(0);
        } else if val <= 0xFF {
            self.push(1);
            self.push(val as u8);
        } else {
            self.push(2);
            self.push((val >> 8) as u8);
            self.push(val as u8);
        }
    }

    fn write_ub4(&mut self, val: u32) {
        if val == 0 {
            self.push(0);
        } else {
            let bytes = val.to_be_bytes();
            let leading = (val.leading_zeros() / 8) as usize;
            self.push((4 - leading) as u8);
            self.extend_from_slice(&bytes[leading..]);
        }
    }

    fn write_ub8(&mut self, val: u64) {
        if val == 0 {
            self.push(0);
        } else {
            let bytes = val.to_be_bytes();
            let leading = (val.leading_zeros() / 8) as usize;
            self.push((8 - leading) as u8);
            self.extend_from_slice(&bytes[leading..]);
        }
    }

    fn write_bytes_with_length(&mut self, bytes: &[u8]) {
        let len = bytes.len();
        if len == 0 {
            self.push(0);
        } else if len <= TNS_MAX_SHORT_LENGTH {
            self.push(len as u8);
            self.extend_from_slice(bytes);
        } else {
            self.push(TNS_LONG_LENGTH_INDICATOR);
            let mut offset = 0;
            while offset < len {
                let chunk_len = std::cmp::min(len - offset, 65536);
                self.write_ub4(chunk_len as u32);
                self.extend_from_slice(&bytes[offset..offset + chunk_len]);
                offset += chunk_len;
            }
            self.write_ub4(0);
        }
    }

    #[inline]
    fn write_str_with_length(&mut self, s: &str) {
        self.write_bytes_with_length(s.as_bytes());
    }

    fn write_key_value(&mut self, key: &str, value: &str, flags: u32) {
        let key_bytes = key.as_bytes();
        let value_bytes = value.as_bytes();

        self.write_ub4(key_bytes.len() as u32);
        self.write_bytes_with_length(key_bytes);
        self.write_ub4(value_bytes.len() as u32);
        if !value_bytes.is_empty() {
            self.write_bytes_with_length(value_bytes);
        }
        self.write_ub4(flags);
    }
}

/// Write a TNS packet header.
///
/// The legacy form uses a u16 length plus a u16 checksum; the modern form
/// (protocol version 315 and up) uses a u32 length.
pub fn write_packet_header(
    buf: &mut Vec<u8>,
    packet_type: u8,
    packet_flags: u8,
    total_size: usize,
    use_large_sdu: bool,
) {
    if use_large_sdu {
        buf.write_u32_be(total_size as u32);
    } else {
        buf.write_u16_be(total_size as u16);
        buf.write_u16_be(0); // checksum, legacy and unused
    }
    buf.write_u8(packet_type);
    buf.write_u8(packet_flags);
    buf.write_u16_be(0); // header checksum, unused
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ub2_wire_size() {
        assert_eq!(ub2_wire_size(0), 1);
        assert_eq!(ub2_wire_size(255), 2);
        assert_eq!(ub2_wire_size(256), 3);
        assert_eq!(ub2_wire_size(65535), 3);
    }

    #[test]
    fn test_ub4_wire_size_matches_written() {
        let mut buf = Vec::new();
        for val in [0u32, 1, 255, 256, 65535, 65536, 0xFFFFFF, 0x1000000, u32::MAX] {
            buf.clear();
            buf.write_ub4(val);
            assert_eq!(buf.len(), ub4_wire_size(val), "UB4 size mismatch for {}", val);
        }
    }

    #[test]
    fn test_ub8_wire_size_matches_written() {
        let mut buf = Vec::new();
        for val in [0u64, 1, 0xFF, 0x100, 0x10000, 0x1000000, 0x100000000, u64::MAX] {
            buf.clear();
            buf.write_ub8(val);
            assert_eq!(buf.len(), ub8_wire_size(val), "UB8 size mismatch for {}", val);
        }
    }

    #[test]
    fn test_bytes_with_length_wire_size_matches_written() {
        let mut buf = Vec::new();
        for len in [0usize, 1, 100, 252, 253, 300, 65536, 70000] {
            buf.clear();
            let data = vec![0u8; len];
            buf.write_bytes_with_length(&data);
            assert_eq!(
                buf.len(),
                bytes_with_length_wire_size(len),
                "length-prefixed size mismatch for len={}",
                len
            );
        }
    }

    #[test]
    fn test_write_ub2_big_endian() {
        let mut buf = Vec::new();
        buf.write_ub2(0x1234);
        assert_eq!(buf, vec![2, 0x12, 0x34]);
    }

    #[test]
    fn test_write_key_value() {
        let mut buf = Vec::new();
        buf.write_key_value("KEY", "VALUE", 0);
        assert_eq!(buf.len(), key_value_wire_size("KEY", "VALUE", 0));
    }

    #[test]
    fn test_packet_header_forms() {
        let mut buf = Vec::new();
        write_packet_header(&mut buf, TNS_PACKET_TYPE_DATA, 0, 100, false);
        assert_eq!(buf.len(), PACKET_HEADER_SIZE);
        assert_eq!(buf[0..2], [0, 100]);
        assert_eq!(buf[4], TNS_PACKET_TYPE_DATA);

        buf.clear();
        write_packet_header(&mut buf, TNS_PACKET_TYPE_DATA, 0, 100, true);
        assert_eq!(buf.len(), PACKET_HEADER_SIZE);
        assert_eq!(buf[0..4], [0, 0, 0, 100]);
    }
}
