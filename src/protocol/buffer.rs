//! Buffer utilities for reading and writing TTC protocol data.
//!
//! `ReadBuffer` presents the payloads of one or more DATA packets as a single
//! resumable byte cursor. Typed readers fail with `Error::OutOfPackets` when
//! the data runs out; callers record a restore point before attempting a
//! message decode and rewind on that error, so the same input plus a newly
//! received packet replays cleanly. This is the mechanism that lets the
//! cooperative engine suspend in the middle of a message.

use crate::error::{Error, Result};
use crate::protocol::constants::*;
use bytes::{BufMut, Bytes, BytesMut};

/// A restore point into a [`ReadBuffer`].
#[derive(Debug, Clone, Copy)]
pub struct RestorePoint {
    chunk: usize,
    pos: usize,
}

/// A buffer for reading TTC protocol data spanning multiple packets.
pub struct ReadBuffer {
    chunks: Vec<Bytes>,
    chunk: usize,
    pos: usize,
}

impl ReadBuffer {
    /// Create an empty read buffer.
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            chunk: 0,
            pos: 0,
        }
    }

    /// Create a read buffer over a single chunk of data.
    pub fn from_bytes(data: Bytes) -> Self {
        Self {
            chunks: vec![data],
            chunk: 0,
            pos: 0,
        }
    }

    /// Append another packet payload to the end of the stream.
    pub fn push_chunk(&mut self, data: Bytes) {
        if !data.is_empty() {
            self.chunks.push(data);
        }
    }

    /// Discard all data and reset the cursor.
    pub fn reset(&mut self) {
        self.chunks.clear();
        self.chunk = 0;
        self.pos = 0;
    }

    /// Record a restore point for resumable decoding.
    pub fn save(&self) -> RestorePoint {
        RestorePoint {
            chunk: self.chunk,
            pos: self.pos,
        }
    }

    /// Rewind to a previously recorded restore point.
    pub fn restore(&mut self, point: RestorePoint) {
        self.chunk = point.chunk;
        self.pos = point.pos;
    }

    /// Total unread bytes across all chunks.
    pub fn remaining(&self) -> usize {
        let mut total = 0;
        for (i, c) in self.chunks.iter().enumerate().skip(self.chunk) {
            if i == self.chunk {
                total += c.len().saturating_sub(self.pos);
            } else {
                total += c.len();
            }
        }
        total
    }

    /// Check whether at least `n` unread bytes are available.
    pub fn has_remaining(&self, n: usize) -> bool {
        self.remaining() >= n
    }

    #[track_caller]
    fn out_of_packets(&self, needed: usize) -> Error {
        Error::OutOfPackets {
            needed,
            available: self.remaining(),
            location: std::panic::Location::caller(),
        }
    }

    /// Read a single byte.
    #[track_caller]
    pub fn read_u8(&mut self) -> Result<u8> {
        while self.chunk < self.chunks.len() {
            if self.pos < self.chunks[self.chunk].len() {
                let val = self.chunks[self.chunk][self.pos];
                self.pos += 1;
                return Ok(val);
            }
            self.chunk += 1;
            self.pos = 0;
        }
        Err(self.out_of_packets(1))
    }

    /// Read raw bytes, copying across chunk boundaries when necessary.
    #[track_caller]
    pub fn read_bytes(&mut self, n: usize) -> Result<Bytes> {
        if !self.has_remaining(n) {
            return Err(self.out_of_packets(n));
        }
        // Fast path: the current chunk covers the whole read.
        if self.chunk < self.chunks.len() && self.chunks[self.chunk].len() - self.pos >= n {
            let out = self.chunks[self.chunk].slice(self.pos..self.pos + n);
            self.pos += n;
            return Ok(out);
        }
        let mut out = BytesMut::with_capacity(n);
        let mut left = n;
        while left > 0 {
            let chunk = &self.chunks[self.chunk];
            let avail = chunk.len() - self.pos;
            let take = avail.min(left);
            out.extend_from_slice(&chunk[self.pos..self.pos + take]);
            self.pos += take;
            left -= take;
            if self.pos == chunk.len() {
                self.chunk += 1;
                self.pos = 0;
            }
        }
        Ok(out.freeze())
    }

    /// Skip `n` bytes.
    #[track_caller]
    pub fn skip(&mut self, n: usize) -> Result<()> {
        if !self.has_remaining(n) {
            return Err(self.out_of_packets(n));
        }
        let mut left = n;
        while left > 0 {
            let chunk_len = self.chunks[self.chunk].len();
            let avail = chunk_len - self.pos;
            let take = avail.min(left);
            self.pos += take;
            left -= take;
            if self.pos == chunk_len && left > 0 {
                self.chunk += 1;
                self.pos = 0;
            }
        }
        Ok(())
    }

    /// Read a big-endian u16.
    pub fn read_u16_be(&mut self) -> Result<u16> {
        let b1 = self.read_u8()?;
        let b2 = self.read_u8()?;
        Ok(u16::from_be_bytes([b1, b2]))
    }

    /// Read a little-endian u16.
    pub fn read_u16_le(&mut self) -> Result<u16> {
        let b1 = self.read_u8()?;
        let b2 = self.read_u8()?;
        Ok(u16::from_le_bytes([b1, b2]))
    }

    /// Read a big-endian u32.
    pub fn read_u32_be(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a big-endian u64.
    pub fn read_u64_be(&mut self) -> Result<u64> {
        let b = self.read_bytes(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(&b);
        Ok(u64::from_be_bytes(arr))
    }

    /// Read a UB1 value.
    pub fn read_ub1(&mut self) -> Result<u8> {
        self.read_u8()
    }

    /// Read a variable-length u16 (Oracle UB2: length byte + big-endian value).
    pub fn read_ub2(&mut self) -> Result<u16> {
        let length = self.read_u8()?;
        match length & 0x7f {
            0 => Ok(0),
            1 => Ok(self.read_u8()? as u16),
            2 => {
                let b1 = self.read_u8()? as u16;
                let b2 = self.read_u8()? as u16;
                Ok((b1 << 8) | b2)
            }
            n => Err(Error::protocol(format!("invalid UB2 length: {}", n))),
        }
    }

    /// Read a variable-length u32 (Oracle UB4).
    pub fn read_ub4(&mut self) -> Result<u32> {
        let length = self.read_u8()?;
        if length == 0 {
            return Ok(0);
        }
        if length & 0x80 != 0 || length > 4 {
            return Err(Error::protocol(format!("invalid UB4 length: {}", length)));
        }
        let mut val: u32 = 0;
        for _ in 0..length {
            val = (val << 8) | (self.read_u8()? as u32);
        }
        Ok(val)
    }

    /// Read a variable-length u64 (Oracle UB8).
    pub fn read_ub8(&mut self) -> Result<u64> {
        let length = self.read_u8()?;
        if length == 0 {
            return Ok(0);
        }
        if length & 0x80 != 0 || length > 8 {
            return Err(Error::protocol(format!("invalid UB8 length: {}", length)));
        }
        let mut val: u64 = 0;
        for _ in 0..length {
            val = (val << 8) | (self.read_u8()? as u64);
        }
        Ok(val)
    }

    /// Read a variable-length signed offset (SB2 on the wire).
    pub fn read_sb2(&mut self) -> Result<i16> {
        Ok(self.read_ub2()? as i16)
    }

    /// Skip a UB4 without decoding it.
    pub fn skip_ub4(&mut self) -> Result<()> {
        let length = self.read_u8()?;
        if length > 0 && length & 0x80 == 0 {
            self.skip(length as usize)?;
        }
        Ok(())
    }

    /// Read bytes with a one-byte length prefix.
    ///
    /// Length 0 means NULL. Length 0xFE introduces the chunked long form:
    /// repeated `{chunk_len: ub4 > 0, bytes}` terminated by a zero length.
    pub fn read_bytes_with_length(&mut self) -> Result<Option<Bytes>> {
        let length = self.read_u8()?;
        if length == TNS_NULL_LENGTH_INDICATOR || length == 0xff {
            return Ok(None);
        }
        if length == TNS_LONG_LENGTH_INDICATOR {
            let mut result = BytesMut::new();
            loop {
                let chunk_len = self.read_ub4()?;
                if chunk_len == 0 {
                    break;
                }
                let chunk = self.read_bytes(chunk_len as usize)?;
                result.extend_from_slice(&chunk);
            }
            return Ok(Some(result.freeze()));
        }
        Ok(Some(self.read_bytes(length as usize)?))
    }

    /// Read a string with a one-byte length prefix.
    ///
    /// Inbound data may arrive in any single-byte database charset, so the
    /// conversion is lossy rather than strict.
    pub fn read_str_with_length(&mut self) -> Result<Option<String>> {
        match self.read_bytes_with_length()? {
            Some(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).to_string())),
            None => Ok(None),
        }
    }

    /// Skip length-prefixed bytes that may use the chunked long form.
    pub fn skip_raw_bytes_chunked(&mut self) -> Result<()> {
        let length = self.read_u8()?;
        if length != TNS_LONG_LENGTH_INDICATOR {
            self.skip(length as usize)?;
        } else {
            loop {
                let chunk_len = self.read_ub4()?;
                if chunk_len == 0 {
                    break;
                }
                self.skip(chunk_len as usize)?;
            }
        }
        Ok(())
    }
}

impl Default for ReadBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// A buffer for writing TTC protocol data.
///
/// The buffer accumulates a complete request; the transport splits it into
/// DATA packets bounded by the negotiated SDU when sending.
pub struct WriteBuffer {
    data: BytesMut,
}

impl WriteBuffer {
    /// Create a new write buffer with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(8192)
    }

    /// Create a new write buffer with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
        }
    }

    /// Current length of the buffer.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Buffer contents as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Freeze the buffer into immutable bytes.
    pub fn freeze(self) -> Bytes {
        self.data.freeze()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, val: u8) {
        self.data.put_u8(val);
    }

    /// Write a big-endian u16.
    pub fn write_u16_be(&mut self, val: u16) {
        self.data.put_u16(val);
    }

    /// Write a little-endian u16.
    pub fn write_u16_le(&mut self, val: u16) {
        self.data.put_u16_le(val);
    }

    /// Write a big-endian u32.
    pub fn write_u32_be(&mut self, val: u32) {
        self.data.put_u32(val);
    }

    /// Write a big-endian u64.
    pub fn write_u64_be(&mut self, val: u64) {
        self.data.put_u64(val);
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Write a variable-length u32 (Oracle UB4).
    pub fn write_ub4(&mut self, val: u32) {
        if val == 0 {
            self.write_u8(0);
        } else {
            let bytes = val.to_be_bytes();
            let leading = (val.leading_zeros() / 8) as usize;
            self.write_u8((4 - leading) as u8);
            self.data.extend_from_slice(&bytes[leading..]);
        }
    }

    /// Write a variable-length u64 (Oracle UB8).
    pub fn write_ub8(&mut self, val: u64) {
        if val == 0 {
            self.write_u8(0);
        } else {
            let bytes = val.to_be_bytes();
            let leading = (val.leading_zeros() / 8) as usize;
            self.write_u8((8 - leading) as u8);
            self.data.extend_from_slice(&bytes[leading..]);
        }
    }

    /// Write bytes with a length prefix, chunking long values.
    pub fn write_bytes_with_length(&mut self, bytes: &[u8]) {
        let len = bytes.len();
        if len == 0 {
            self.write_u8(0);
        } else if len <= TNS_MAX_SHORT_LENGTH {
            self.write_u8(len as u8);
            self.write_bytes(bytes);
        } else {
            self.write_u8(TNS_LONG_LENGTH_INDICATOR);
            let mut offset = 0;
            while offset < len {
                let chunk_len = std::cmp::min(len - offset, 65536);
                self.write_ub4(chunk_len as u32);
                self.write_bytes(&bytes[offset..offset + chunk_len]);
                offset += chunk_len;
            }
            self.write_ub4(0);
        }
    }

    /// Write a string with a length prefix.
    pub fn write_str_with_length(&mut self, s: &str) {
        self.write_bytes_with_length(s.as_bytes());
    }

    /// Write padding zeros.
    pub fn write_zeros(&mut self, count: usize) {
        self.data.resize(self.data.len() + count, 0);
    }
}

impl Default for WriteBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_across_chunks() {
        let mut buf = ReadBuffer::new();
        buf.push_chunk(Bytes::from_static(&[0x12, 0x34]));
        buf.push_chunk(Bytes::from_static(&[0x56, 0x78]));

        assert_eq!(buf.remaining(), 4);
        assert_eq!(buf.read_u32_be().unwrap(), 0x12345678);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_out_of_packets_then_resume() {
        let mut buf = ReadBuffer::new();
        buf.push_chunk(Bytes::from_static(&[0x01, 0x02]));

        let point = buf.save();
        assert_eq!(buf.read_u8().unwrap(), 1);
        let err = buf.read_u32_be().unwrap_err();
        assert!(err.is_out_of_packets());

        // Another packet arrives; replay from the restore point.
        buf.restore(point);
        buf.push_chunk(Bytes::from_static(&[0x03, 0x04, 0x05]));
        assert_eq!(buf.read_u8().unwrap(), 1);
        assert_eq!(buf.read_u32_be().unwrap(), 0x02030405);
    }

    #[test]
    fn test_ub2_roundtrip_forms() {
        let mut buf = ReadBuffer::from_bytes(Bytes::from_static(&[0, 1, 0xff, 2, 0x12, 0x34]));
        assert_eq!(buf.read_ub2().unwrap(), 0);
        assert_eq!(buf.read_ub2().unwrap(), 0xff);
        assert_eq!(buf.read_ub2().unwrap(), 0x1234);
    }

    #[test]
    fn test_ub4_rejects_negative_length() {
        let mut buf = ReadBuffer::from_bytes(Bytes::from_static(&[0x81, 1]));
        assert!(buf.read_ub4().is_err());
    }

    #[test]
    fn test_bytes_with_length_short() {
        let mut buf = ReadBuffer::from_bytes(Bytes::from_static(&[3, b'a', b'b', b'c', 0]));
        assert_eq!(
            buf.read_bytes_with_length().unwrap().unwrap().as_ref(),
            b"abc"
        );
        assert!(buf.read_bytes_with_length().unwrap().is_none());
    }

    #[test]
    fn test_bytes_with_length_chunked() {
        // 0xFE marker, chunk of 3 bytes, terminating zero length
        let data: &[u8] = &[0xfe, 1, 3, b'x', b'y', b'z', 0];
        let mut buf = ReadBuffer::from_bytes(Bytes::copy_from_slice(data));
        assert_eq!(
            buf.read_bytes_with_length().unwrap().unwrap().as_ref(),
            b"xyz"
        );
    }

    #[test]
    fn test_write_then_read_long_value() {
        let mut wbuf = WriteBuffer::new();
        let payload = vec![0xabu8; 70000];
        wbuf.write_bytes_with_length(&payload);

        let mut rbuf = ReadBuffer::from_bytes(wbuf.freeze());
        let back = rbuf.read_bytes_with_length().unwrap().unwrap();
        assert_eq!(back.len(), payload.len());
        assert_eq!(&back[..], &payload[..]);
    }

    #[test]
    fn test_write_ub4_forms() {
        let mut buf = WriteBuffer::new();
        buf.write_ub4(0);
        buf.write_ub4(1);
        buf.write_ub4(0x8061);
        assert_eq!(buf.as_bytes(), &[0, 1, 1, 2, 0x80, 0x61]);
    }

    #[test]
    fn test_skip_chunked() {
        let data: &[u8] = &[0xfe, 1, 2, 9, 9, 0, 0x55];
        let mut buf = ReadBuffer::from_bytes(Bytes::copy_from_slice(data));
        buf.skip_raw_bytes_chunked().unwrap();
        assert_eq!(buf.read_u8().unwrap(), 0x55);
    }
}
