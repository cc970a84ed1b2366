//! Single-function messages: commit, rollback, ping, logoff, session release.

use crate::error::Result;
use crate::protocol::constants::*;
use crate::protocol::message::{ub4_wire_size, DataMessage, Message, WriteExt};

/// A function call with no arguments.
pub struct SimpleFunctionMessage {
    function_code: u8,
}

impl SimpleFunctionMessage {
    pub fn commit() -> Self {
        Self {
            function_code: TNS_FUNC_COMMIT,
        }
    }

    pub fn rollback() -> Self {
        Self {
            function_code: TNS_FUNC_ROLLBACK,
        }
    }

    pub fn ping() -> Self {
        Self {
            function_code: TNS_FUNC_PING,
        }
    }

    pub fn logoff() -> Self {
        Self {
            function_code: TNS_FUNC_LOGOFF,
        }
    }
}

impl Message for SimpleFunctionMessage {
    fn wire_size(&self) -> usize {
        3
    }

    fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.write_u8(TNS_MSG_TYPE_FUNCTION);
        buf.write_u8(self.function_code);
        buf.write_u8(1); // sequence number
        Ok(())
    }
}

impl DataMessage for SimpleFunctionMessage {}

/// DRCP session release.
///
/// Standalone connections deauthenticate; pooled connections release plainly
/// so the server session stays attachable.
pub struct SessionReleaseMessage<'a> {
    /// Session tag to retag the released session, when any.
    pub tag: Option<&'a str>,
    /// Release mode bits; `DRCP_DEAUTHENTICATE` for standalone close.
    pub release_mode: u32,
}

impl Message for SessionReleaseMessage<'_> {
    fn wire_size(&self) -> usize {
        let tag_len = self.tag.map_or(0, str::len);
        let mut size = 0;
        size += 3; // message type, function code, sequence number
        size += 1; // tag pointer
        size += ub4_wire_size(tag_len as u32);
        size += tag_len;
        size += ub4_wire_size(self.release_mode);
        size
    }

    fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.write_u8(TNS_MSG_TYPE_ONEWAY_FN);
        buf.write_u8(TNS_FUNC_SESSION_RELEASE);
        buf.write_u8(1); // sequence number
        match self.tag {
            Some(tag) if !tag.is_empty() => {
                buf.write_u8(1);
                buf.write_ub4(tag.len() as u32);
                buf.write_bytes(tag.as_bytes());
            }
            _ => {
                buf.write_u8(0);
                buf.write_ub4(0);
            }
        }
        buf.write_ub4(self.release_mode);
        Ok(())
    }
}

impl DataMessage for SessionReleaseMessage<'_> {}
