//! Piggyback messages prepended to a following request.
//!
//! Piggybacks carry housekeeping the driver defers until it has a real
//! reason to talk to the server: closing evicted cursors, releasing
//! temporary LOBs, flushing withheld OUT binds.

use crate::error::Result;
use crate::protocol::constants::*;
use crate::protocol::message::{ub4_wire_size, Message, WriteExt};

/// Close a batch of server-side cursors.
///
/// Cursor ids accumulate as cached statements are evicted or invalidated;
/// the ids travel ahead of the next request.
pub struct CloseCursorsPiggyback<'a> {
    /// Cursor ids to close.
    pub cursor_ids: &'a [u32],
}

impl Message for CloseCursorsPiggyback<'_> {
    fn wire_size(&self) -> usize {
        let mut size = 0;
        size += 3; // message type, function code, sequence number
        size += 1; // array pointer
        size += ub4_wire_size(self.cursor_ids.len() as u32);
        for id in self.cursor_ids {
            size += ub4_wire_size(*id);
        }
        size
    }

    fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.write_u8(TNS_MSG_TYPE_PIGGYBACK);
        buf.write_u8(TNS_FUNC_CLOSE_CURSORS);
        buf.write_u8(1); // sequence number
        buf.write_u8(1); // array pointer
        buf.write_ub4(self.cursor_ids.len() as u32);
        for id in self.cursor_ids {
            buf.write_ub4(*id);
        }
        Ok(())
    }
}

/// Release a batch of temporary LOB locators.
pub struct FreeTempLobsPiggyback<'a> {
    /// Locators to free.
    pub locators: &'a [Vec<u8>],
}

impl Message for FreeTempLobsPiggyback<'_> {
    fn wire_size(&self) -> usize {
        let total: usize = self.locators.iter().map(Vec::len).sum();
        let mut size = 0;
        size += 3; // message type, function code, sequence number
        size += 1; // locator pointer
        size += ub4_wire_size(total as u32);
        size += 2; // null dest locator pointer and length
        size += ub4_wire_size(TNS_LOB_OP_FREE_TEMP);
        size += total;
        size
    }

    fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        let total: usize = self.locators.iter().map(Vec::len).sum();
        buf.write_u8(TNS_MSG_TYPE_PIGGYBACK);
        buf.write_u8(TNS_FUNC_LOB_OP);
        buf.write_u8(1); // sequence number
        buf.write_u8(1); // locator pointer
        buf.write_ub4(total as u32);
        buf.write_u8(0); // dest locator pointer
        buf.write_u8(0); // dest locator length
        buf.write_ub4(TNS_LOB_OP_FREE_TEMP);
        for locator in self.locators {
            buf.write_bytes(locator);
        }
        Ok(())
    }
}

/// Ask the server to release OUT binds it is withholding.
pub struct FlushOutBindsMessage;

impl Message for FlushOutBindsMessage {
    fn wire_size(&self) -> usize {
        1
    }

    fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.write_u8(TNS_MSG_TYPE_FLUSH_OUT_BINDS);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_cursors_wire_size() {
        for ids in [vec![], vec![5u32], vec![1, 2, 300, 70000]] {
            let msg = CloseCursorsPiggyback { cursor_ids: &ids };
            let mut buf = Vec::with_capacity(msg.wire_size());
            msg.write_to(&mut buf).unwrap();
            assert_eq!(buf.len(), msg.wire_size());
            assert_eq!(buf[0], TNS_MSG_TYPE_PIGGYBACK);
            assert_eq!(buf[1], TNS_FUNC_CLOSE_CURSORS);
        }
    }

    #[test]
    fn test_free_temp_lobs_wire_size() {
        let locators = vec![vec![1u8; 40], vec![2u8; 40]];
        let msg = FreeTempLobsPiggyback {
            locators: &locators,
        };
        let mut buf = Vec::with_capacity(msg.wire_size());
        msg.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), msg.wire_size());
    }

    #[test]
    fn test_flush_out_binds() {
        let msg = FlushOutBindsMessage;
        let mut buf = Vec::new();
        msg.write_to(&mut buf).unwrap();
        assert_eq!(buf, vec![TNS_MSG_TYPE_FLUSH_OUT_BINDS]);
    }
}
