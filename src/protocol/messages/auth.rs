//! Authentication messages.

use super::data_types;
use crate::error::Result;
use crate::protocol::constants::*;
use crate::protocol::message::{
    bytes_with_length_wire_size, key_value_wire_size, ub4_wire_size, DataMessage, Message,
    WriteExt,
};

/// Authentication phase 1.
///
/// Sends the username and client identity; the server answers with the
/// verifier data for the challenge (AUTH_VFR_DATA, AUTH_SESSKEY, salts).
pub struct AuthPhaseOneMessage<'a> {
    /// Username.
    pub username: &'a str,
    /// Auth mode bits (logon plus any administrative privilege).
    pub auth_mode: u32,
    /// Terminal name.
    pub terminal: &'a str,
    /// Program name.
    pub program: &'a str,
    /// Machine name.
    pub machine: &'a str,
    /// Process id.
    pub pid: &'a str,
    /// OS user.
    pub sid: &'a str,
}

impl Message for AuthPhaseOneMessage<'_> {
    fn wire_size(&self) -> usize {
        let has_user = !self.username.is_empty();
        let user_bytes_len = self.username.len();

        let mut size = 0;
        size += 1; // message type
        size += 1; // function code
        size += 1; // sequence number
        size += 1; // user presence flag
        size += ub4_wire_size(user_bytes_len as u32);
        size += ub4_wire_size(self.auth_mode);
        size += 1; // pointer to key/value pairs
        size += ub4_wire_size(5); // num_pairs
        size += 1; // authivl pointer
        size += 1; // authovln pointer

        if has_user {
            size += bytes_with_length_wire_size(user_bytes_len);
        }

        size += key_value_wire_size("AUTH_TERMINAL", self.terminal, 0);
        size += key_value_wire_size("AUTH_PROGRAM_NM", self.program, 0);
        size += key_value_wire_size("AUTH_MACHINE", self.machine, 0);
        size += key_value_wire_size("AUTH_PID", self.pid, 0);
        size += key_value_wire_size("AUTH_SID", self.sid, 0);

        size
    }

    fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        let has_user = !self.username.is_empty();
        let user_bytes = self.username.as_bytes();

        buf.write_u8(TNS_MSG_TYPE_FUNCTION);
        buf.write_u8(TNS_FUNC_AUTH_PHASE_ONE);
        buf.write_u8(1); // sequence number

        buf.write_u8(if has_user { 1 } else { 0 });
        buf.write_ub4(user_bytes.len() as u32);
        buf.write_ub4(self.auth_mode);

        buf.write_u8(1); // pointer to key/value pairs
        buf.write_ub4(5); // num_pairs
        buf.write_u8(1); // authivl pointer
        buf.write_u8(1); // authovln pointer

        if has_user {
            buf.write_bytes_with_length(user_bytes);
        }

        buf.write_key_value("AUTH_TERMINAL", self.terminal, 0);
        buf.write_key_value("AUTH_PROGRAM_NM", self.program, 0);
        buf.write_key_value("AUTH_MACHINE", self.machine, 0);
        buf.write_key_value("AUTH_PID", self.pid, 0);
        buf.write_key_value("AUTH_SID", self.sid, 0);

        Ok(())
    }
}

impl DataMessage for AuthPhaseOneMessage<'_> {}

/// Authentication phase 2.
///
/// Sends the encrypted session key, the PBKDF2 speedy key when the 12c
/// verifier is in play, and the encrypted password. Session parameters ride
/// along: charset, driver identity, purity for DRCP, and the timezone
/// ALTER SESSION statement.
pub struct AuthPhaseTwoMessage<'a> {
    /// Username.
    pub username: &'a str,
    /// Auth mode bits, matching phase one plus the password flag.
    pub auth_mode: u32,
    /// Encrypted session key (hex).
    pub session_key: &'a str,
    /// Speedy key for the 12c verifier (hex).
    pub speedy_key: Option<&'a str>,
    /// Encrypted password (hex).
    pub encoded_password: &'a str,
    /// DRCP purity.
    pub purity: u32,
    /// Edition for edition-based redefinition.
    pub edition: Option<&'a str>,
    /// Timezone ALTER SESSION statement.
    pub timezone_stmt: &'a str,
    /// Driver version string reported to the server.
    pub driver_version: &'a str,
}

impl AuthPhaseTwoMessage<'_> {
    fn num_pairs(&self) -> u32 {
        // session key, password, charset, driver name, purity, alter session
        let mut num_pairs = 6u32;
        if self.speedy_key.is_some() {
            num_pairs += 1;
        }
        if self.edition.is_some() {
            num_pairs += 1;
        }
        num_pairs
    }
}

impl Message for AuthPhaseTwoMessage<'_> {
    fn wire_size(&self) -> usize {
        let has_user = !self.username.is_empty();
        let user_bytes_len = self.username.len();

        let mut size = 0;
        size += 1; // message type
        size += 1; // function code
        size += 1; // sequence number
        size += 1; // user presence flag
        size += ub4_wire_size(user_bytes_len as u32);
        size += ub4_wire_size(self.auth_mode);
        size += 1; // pointer to key/value pairs
        size += ub4_wire_size(self.num_pairs());
        size += 1; // authivl pointer
        size += 1; // authovln pointer

        if has_user {
            size += bytes_with_length_wire_size(user_bytes_len);
        }

        size += key_value_wire_size("AUTH_SESSKEY", self.session_key, 1);
        if let Some(sk) = self.speedy_key {
            size += key_value_wire_size("AUTH_PBKDF2_SPEEDY_KEY", sk, 0);
        }
        size += key_value_wire_size("AUTH_PASSWORD", self.encoded_password, 0);
        size += key_value_wire_size("SESSION_CLIENT_CHARSET", "873", 0);
        size += key_value_wire_size("SESSION_CLIENT_DRIVER_NAME", self.driver_version, 0);
        size += key_value_wire_size("AUTH_KPPL_PURITY", purity_str(self.purity), 1);
        if let Some(edition) = self.edition {
            size += key_value_wire_size("AUTH_ORA_EDITION", edition, 0);
        }
        size += key_value_wire_size("AUTH_ALTER_SESSION", self.timezone_stmt, 1);

        size
    }

    fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        let has_user = !self.username.is_empty();
        let user_bytes = self.username.as_bytes();

        buf.write_u8(TNS_MSG_TYPE_FUNCTION);
        buf.write_u8(TNS_FUNC_AUTH_PHASE_TWO);
        buf.write_u8(2); // sequence number

        buf.write_u8(if has_user { 1 } else { 0 });
        buf.write_ub4(user_bytes.len() as u32);
        buf.write_ub4(self.auth_mode);

        buf.write_u8(1); // pointer to key/value pairs
        buf.write_ub4(self.num_pairs());
        buf.write_u8(1); // authivl pointer
        buf.write_u8(1); // authovln pointer

        if has_user {
            buf.write_bytes_with_length(user_bytes);
        }

        buf.write_key_value("AUTH_SESSKEY", self.session_key, 1);
        if let Some(sk) = self.speedy_key {
            buf.write_key_value("AUTH_PBKDF2_SPEEDY_KEY", sk, 0);
        }
        buf.write_key_value("AUTH_PASSWORD", self.encoded_password, 0);
        buf.write_key_value("SESSION_CLIENT_CHARSET", "873", 0);
        buf.write_key_value("SESSION_CLIENT_DRIVER_NAME", self.driver_version, 0);
        buf.write_key_value("AUTH_KPPL_PURITY", purity_str(self.purity), 1);
        if let Some(edition) = self.edition {
            buf.write_key_value("AUTH_ORA_EDITION", edition, 0);
        }
        buf.write_key_value("AUTH_ALTER_SESSION", self.timezone_stmt, 1);

        Ok(())
    }
}

impl DataMessage for AuthPhaseTwoMessage<'_> {}

/// Token authentication: a single round trip carrying the bearer token
/// instead of the password challenge.
pub struct AuthTokenMessage<'a> {
    /// Username; may be empty for token-only identities.
    pub username: &'a str,
    /// Auth mode bits; the IAM token bit is set by the caller.
    pub auth_mode: u32,
    /// The bearer token.
    pub token: &'a str,
    /// Driver version string reported to the server.
    pub driver_version: &'a str,
}

impl Message for AuthTokenMessage<'_> {
    fn wire_size(&self) -> usize {
        let has_user = !self.username.is_empty();
        let user_bytes_len = self.username.len();

        let mut size = 0;
        size += 1; // message type
        size += 1; // function code
        size += 1; // sequence number
        size += 1; // user presence flag
        size += ub4_wire_size(user_bytes_len as u32);
        size += ub4_wire_size(self.auth_mode);
        size += 1; // pointer to key/value pairs
        size += ub4_wire_size(3); // num_pairs
        size += 1; // authivl pointer
        size += 1; // authovln pointer

        if has_user {
            size += bytes_with_length_wire_size(user_bytes_len);
        }

        size += key_value_wire_size("AUTH_TOKEN", self.token, 0);
        size += key_value_wire_size("SESSION_CLIENT_CHARSET", "873", 0);
        size += key_value_wire_size("SESSION_CLIENT_DRIVER_NAME", self.driver_version, 0);

        size
    }

    fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        let has_user = !self.username.is_empty();
        let user_bytes = self.username.as_bytes();

        buf.write_u8(TNS_MSG_TYPE_FUNCTION);
        buf.write_u8(TNS_FUNC_AUTH_PHASE_TWO);
        buf.write_u8(1); // sequence number

        buf.write_u8(if has_user { 1 } else { 0 });
        buf.write_ub4(user_bytes.len() as u32);
        buf.write_ub4(self.auth_mode);

        buf.write_u8(1); // pointer to key/value pairs
        buf.write_ub4(3); // num_pairs
        buf.write_u8(1); // authivl pointer
        buf.write_u8(1); // authovln pointer

        if has_user {
            buf.write_bytes_with_length(user_bytes);
        }

        buf.write_key_value("AUTH_TOKEN", self.token, 0);
        buf.write_key_value("SESSION_CLIENT_CHARSET", "873", 0);
        buf.write_key_value("SESSION_CLIENT_DRIVER_NAME", self.driver_version, 0);

        Ok(())
    }
}

impl DataMessage for AuthTokenMessage<'_> {}

fn purity_str(purity: u32) -> &'static str {
    match purity {
        1 => "NEW",
        2 => "SELF",
        _ => "DEFAULT",
    }
}

/// FastAuth message (Oracle 23ai and up).
///
/// Folds protocol negotiation, data types and auth phase 1 into one round
/// trip.
pub struct FastAuthMessage<'a> {
    /// Driver name for the embedded protocol message.
    pub driver_name: &'a [u8],
    /// Compile-time capabilities.
    pub compile_caps: &'a [u8],
    /// Runtime capabilities.
    pub runtime_caps: &'a [u8],
    /// Embedded auth phase 1.
    pub auth: AuthPhaseOneMessage<'a>,
}

impl Message for FastAuthMessage<'_> {
    fn wire_size(&self) -> usize {
        let mut size = 0;

        size += 4; // fast auth header: type, version, two flags

        // Embedded protocol message
        size += 1; // message type
        size += 1; // protocol version
        size += 1; // array terminator
        size += self.driver_name.len();
        size += 1; // null terminator

        // Server charset info
        size += 2 + 1 + 2;

        size += 1; // ttc field version

        // Embedded data types message
        size += 1; // message type
        size += 2; // charset
        size += 2; // ncharset
        size += 1; // encoding flags
        size += bytes_with_length_wire_size(self.compile_caps.len());
        size += bytes_with_length_wire_size(self.runtime_caps.len());
        size += data_types::data_types_array_wire_size();

        size += self.auth.wire_size();

        size
    }

    fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.write_u8(TNS_MSG_TYPE_FAST_AUTH);
        buf.write_u8(1); // fast auth version
        buf.write_u8(TNS_SERVER_CONVERTS_CHARS);
        buf.write_u8(0);

        buf.write_u8(TNS_MSG_TYPE_PROTOCOL);
        buf.write_u8(6); // client protocol version
        buf.write_u8(0); // array terminator
        buf.write_bytes(self.driver_name);
        buf.write_u8(0); // null terminator

        // Server charset info, filled in by the server
        buf.write_u16_be(0);
        buf.write_u8(0);
        buf.write_u16_be(0);

        buf.write_u8(TNS_CCAP_FIELD_VERSION_19_1_EXT_1);

        buf.write_u8(TNS_MSG_TYPE_DATA_TYPES);
        buf.write_u16_le(TNS_CHARSET_UTF8);
        buf.write_u16_le(TNS_CHARSET_UTF8);
        buf.write_u8(TNS_ENCODING_MULTI_BYTE | TNS_ENCODING_CONV_LENGTH);
        buf.write_bytes_with_length(self.compile_caps);
        buf.write_bytes_with_length(self.runtime_caps);
        data_types::write_data_types_array(buf);

        self.auth.write_to(buf)?;

        Ok(())
    }
}

impl DataMessage for FastAuthMessage<'_> {}
