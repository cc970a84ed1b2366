//! Fetch message for retrieving more rows from an open cursor.

use crate::error::Result;
use crate::protocol::constants::*;
use crate::protocol::message::{ub4_wire_size, DataMessage, Message, WriteExt};

/// Fetch request: cursor id plus the number of rows wanted.
pub struct FetchMessage {
    /// Cursor id assigned by the server during execute.
    pub cursor_id: u32,
    /// Number of rows to fetch.
    pub fetch_size: u32,
}

impl FetchMessage {
    /// Create a new fetch message.
    pub fn new(cursor_id: u32, fetch_size: u32) -> Self {
        Self {
            cursor_id,
            fetch_size,
        }
    }
}

impl Message for FetchMessage {
    fn wire_size(&self) -> usize {
        3 + ub4_wire_size(self.cursor_id) + ub4_wire_size(self.fetch_size)
    }

    fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.write_u8(TNS_MSG_TYPE_FUNCTION);
        buf.write_u8(TNS_FUNC_FETCH);
        buf.write_u8(1); // sequence number
        buf.write_ub4(self.cursor_id);
        buf.write_ub4(self.fetch_size);
        Ok(())
    }
}

impl DataMessage for FetchMessage {}
