//! LOB operation message.
//!
//! All server-side LOB operations go through one opcode-discriminated
//! function: read, write, trim, length, open/close, and temporary LOB
//! management. Write payloads ride behind the header as a LOB_DATA message.

use crate::error::Result;
use crate::protocol::constants::*;
use crate::protocol::message::{
    bytes_with_length_wire_size, ub4_wire_size, ub8_wire_size, DataMessage, Message, WriteExt,
};

/// A LOB operation request.
pub struct LobOpMessage<'a> {
    /// Operation code (`TNS_LOB_OP_*`).
    pub operation: u32,
    /// Source locator bytes.
    pub source_locator: &'a [u8],
    /// Destination locator, used by copy-style operations.
    pub dest_locator: Option<&'a [u8]>,
    /// 1-based offset into the LOB.
    pub source_offset: u64,
    /// Destination offset.
    pub dest_offset: u64,
    /// Amount to read, trim length, or temp LOB type number.
    pub amount: u64,
    /// Whether the amount field is meaningful for this operation.
    pub send_amount: bool,
    /// Data for write operations.
    pub data: Option<&'a [u8]>,
}

impl<'a> LobOpMessage<'a> {
    /// Read `amount` bytes/chars starting at `offset` (1-based).
    pub fn read(locator: &'a [u8], offset: u64, amount: u64) -> Self {
        Self {
            operation: TNS_LOB_OP_READ,
            source_locator: locator,
            dest_locator: None,
            source_offset: offset,
            dest_offset: 0,
            amount,
            send_amount: true,
            data: None,
        }
    }

    /// Write `data` at `offset` (1-based).
    pub fn write(locator: &'a [u8], offset: u64, data: &'a [u8]) -> Self {
        Self {
            operation: TNS_LOB_OP_WRITE,
            source_locator: locator,
            dest_locator: None,
            source_offset: offset,
            dest_offset: 0,
            amount: 0,
            send_amount: false,
            data: Some(data),
        }
    }

    /// Truncate to `new_length`.
    pub fn trim(locator: &'a [u8], new_length: u64) -> Self {
        Self {
            operation: TNS_LOB_OP_TRIM,
            source_locator: locator,
            dest_locator: None,
            source_offset: 0,
            dest_offset: 0,
            amount: new_length,
            send_amount: true,
            data: None,
        }
    }

    /// Query the current length.
    pub fn get_length(locator: &'a [u8]) -> Self {
        Self::simple(TNS_LOB_OP_GET_LENGTH, locator)
    }

    /// Create a temporary LOB of the given type.
    pub fn create_temp(locator: &'a [u8], ora_type_num: u16) -> Self {
        Self {
            operation: TNS_LOB_OP_CREATE_TEMP,
            source_locator: locator,
            dest_locator: None,
            source_offset: ora_type_num as u64,
            dest_offset: TNS_DURATION_SESSION as u64,
            amount: 0,
            send_amount: true,
            data: None,
        }
    }

    /// Free a temporary LOB.
    pub fn free_temp(locator: &'a [u8]) -> Self {
        Self::simple(TNS_LOB_OP_FREE_TEMP, locator)
    }

    /// Open the LOB for read/write access.
    pub fn open(locator: &'a [u8]) -> Self {
        let mut msg = Self::simple(TNS_LOB_OP_OPEN, locator);
        msg.amount = TNS_LOB_OPEN_READ_WRITE as u64;
        msg.send_amount = true;
        msg
    }

    /// Close a previously opened LOB.
    pub fn close(locator: &'a [u8]) -> Self {
        Self::simple(TNS_LOB_OP_CLOSE, locator)
    }

    fn simple(operation: u32, locator: &'a [u8]) -> Self {
        Self {
            operation,
            source_locator: locator,
            dest_locator: None,
            source_offset: 0,
            dest_offset: 0,
            amount: 0,
            send_amount: false,
            data: None,
        }
    }
}

impl Message for LobOpMessage<'_> {
    fn wire_size(&self) -> usize {
        let mut size = 0;
        size += 3; // message type, function code, sequence number

        size += 1; // source locator pointer
        size += ub4_wire_size(self.source_locator.len() as u32);
        size += 1; // dest locator pointer
        size += ub4_wire_size(self.dest_locator.map_or(0, |l| l.len() as u32));

        size += 2; // short amount pointers
        size += 2; // character-set and offset flags

        size += 1; // amount pointer
        size += ub8_wire_size(self.source_offset);
        size += ub8_wire_size(self.dest_offset);
        size += 1; // send amount flag

        size += ub4_wire_size(self.operation);
        size += self.source_locator.len();
        if let Some(dest) = self.dest_locator {
            size += dest.len();
        }
        if self.send_amount {
            size += ub8_wire_size(self.amount);
        }
        if let Some(data) = self.data {
            size += 1; // LOB_DATA message type
            size += bytes_with_length_wire_size(data.len());
        }
        size
    }

    fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.write_u8(TNS_MSG_TYPE_FUNCTION);
        buf.write_u8(TNS_FUNC_LOB_OP);
        buf.write_u8(1); // sequence number

        buf.write_u8(1); // source locator pointer
        buf.write_ub4(self.source_locator.len() as u32);
        match self.dest_locator {
            Some(dest) => {
                buf.write_u8(1);
                buf.write_ub4(dest.len() as u32);
            }
            None => {
                buf.write_u8(0);
                buf.write_ub4(0);
            }
        }

        buf.write_u8(0); // short source amount pointer
        buf.write_u8(0); // short dest amount pointer
        buf.write_u8(0); // charset pointer
        buf.write_u8(0); // offset flags

        buf.write_u8(u8::from(self.send_amount)); // amount pointer
        buf.write_ub8(self.source_offset);
        buf.write_ub8(self.dest_offset);
        buf.write_u8(u8::from(self.data.is_some()));

        buf.write_ub4(self.operation);
        buf.write_bytes(self.source_locator);
        if let Some(dest) = self.dest_locator {
            buf.write_bytes(dest);
        }
        if self.send_amount {
            buf.write_ub8(self.amount);
        }
        if let Some(data) = self.data {
            buf.write_u8(TNS_MSG_TYPE_LOB_DATA);
            buf.write_bytes_with_length(data);
        }
        Ok(())
    }
}

impl DataMessage for LobOpMessage<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_wire_size(msg: &LobOpMessage<'_>) {
        let mut buf = Vec::with_capacity(msg.wire_size());
        msg.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), msg.wire_size());
    }

    #[test]
    fn test_read_message() {
        let locator = vec![1u8; 40];
        let msg = LobOpMessage::read(&locator, 1, 8192);
        assert_eq!(msg.operation, TNS_LOB_OP_READ);
        check_wire_size(&msg);
    }

    #[test]
    fn test_write_message() {
        let locator = vec![2u8; 40];
        let msg = LobOpMessage::write(&locator, 11, b"hello lob");
        check_wire_size(&msg);
    }

    #[test]
    fn test_trim_and_length() {
        let locator = vec![3u8; 40];
        check_wire_size(&LobOpMessage::trim(&locator, 100));
        check_wire_size(&LobOpMessage::get_length(&locator));
    }

    #[test]
    fn test_temp_lifecycle() {
        let locator = vec![0u8; 40];
        let msg = LobOpMessage::create_temp(&locator, ORA_TYPE_NUM_CLOB);
        assert_eq!(msg.source_offset, ORA_TYPE_NUM_CLOB as u64);
        check_wire_size(&msg);
        check_wire_size(&LobOpMessage::free_temp(&locator));
        check_wire_size(&LobOpMessage::open(&locator));
        check_wire_size(&LobOpMessage::close(&locator));
    }

    #[test]
    fn test_large_write_chunks() {
        let locator = vec![4u8; 40];
        let data = vec![0xaau8; 70000];
        let msg = LobOpMessage::write(&locator, 1, &data);
        check_wire_size(&msg);
    }
}
