//! Negotiated connection capabilities.
//!
//! Capabilities are computed during phase one from the ACCEPT packet and
//! refined by the Protocol message response; they are frozen for the rest of
//! the connection's lifetime.

use crate::protocol::constants::*;

/// Capabilities negotiated for a connection.
#[derive(Debug, Clone)]
pub struct Capabilities {
    /// Negotiated TNS protocol version.
    pub protocol_version: u16,
    /// Session data unit (maximum packet size).
    pub sdu: u32,
    /// Database character set id.
    pub charset_id: u16,
    /// National character set id.
    pub ncharset_id: u16,
    /// Whether out-of-band breaks are usable on this connection.
    pub supports_oob: bool,
    /// Whether the server emits explicit end-of-response markers.
    pub supports_end_of_response: bool,
    /// Whether fast auth is supported (Oracle 23ai and up).
    pub supports_fast_auth: bool,
    /// TTC field version used for parsing. May be lowered to the server's.
    pub ttc_field_version: u8,
    /// Server's actual TTC field version (governs the fields it sends).
    pub server_ttc_field_version: u8,
    /// Compile-time capability bitmap.
    pub compile_caps: Vec<u8>,
    /// Runtime capability bitmap.
    pub runtime_caps: Vec<u8>,
}

impl Capabilities {
    /// Create default client capabilities.
    pub fn new() -> Self {
        let ttc_field_version = TNS_CCAP_FIELD_VERSION_MAX;

        let mut compile_caps = vec![0u8; TNS_CCAP_MAX];
        compile_caps[TNS_CCAP_SQL_VERSION] = TNS_CCAP_SQL_VERSION_MAX;
        compile_caps[TNS_CCAP_LOGON_TYPES] = TNS_CCAP_O5LOGON
            | TNS_CCAP_O5LOGON_NP
            | TNS_CCAP_O7LOGON
            | TNS_CCAP_O8LOGON_LONG_IDENTIFIER
            | TNS_CCAP_O9LOGON_LONG_PASSWORD;
        compile_caps[TNS_CCAP_FEATURE_BACKPORT] =
            TNS_CCAP_CTB_IMPLICIT_POOL | TNS_CCAP_CTB_OAUTH_MSG_ON_ERR;
        compile_caps[TNS_CCAP_FIELD_VERSION] = ttc_field_version;
        compile_caps[TNS_CCAP_SERVER_DEFINE_CONV] = 1;
        compile_caps[TNS_CCAP_DEQUEUE_WITH_SELECTOR] = 1;
        compile_caps[TNS_CCAP_TTC1] =
            TNS_CCAP_FAST_BVEC | TNS_CCAP_END_OF_CALL_STATUS | TNS_CCAP_IND_RCD;
        compile_caps[TNS_CCAP_OCI1] = TNS_CCAP_FAST_SESSION_PROPAGATE | TNS_CCAP_APP_CTX_PIGGYBACK;
        compile_caps[TNS_CCAP_TDS_VERSION] = TNS_CCAP_TDS_VERSION_MAX;
        compile_caps[TNS_CCAP_RPC_VERSION] = TNS_CCAP_RPC_VERSION_MAX;
        compile_caps[TNS_CCAP_RPC_SIG] = TNS_CCAP_RPC_SIG_VALUE;
        compile_caps[TNS_CCAP_DBF_VERSION] = TNS_CCAP_DBF_VERSION_MAX;
        compile_caps[TNS_CCAP_LOB] = TNS_CCAP_LOB_UB8_SIZE
            | TNS_CCAP_LOB_ENCS
            | TNS_CCAP_LOB_PREFETCH_DATA
            | TNS_CCAP_LOB_TEMP_SIZE
            | TNS_CCAP_LOB_PREFETCH_LENGTH
            | TNS_CCAP_LOB_12C;
        compile_caps[TNS_CCAP_UB2_DTY] = 1;
        compile_caps[TNS_CCAP_LOB2] = TNS_CCAP_LOB2_QUASI | TNS_CCAP_LOB2_2GB_PREFETCH;
        compile_caps[TNS_CCAP_TTC3] = TNS_CCAP_IMPLICIT_RESULTS
            | TNS_CCAP_BIG_CHUNK_CLR
            | TNS_CCAP_KEEP_OUT_ORDER
            | TNS_CCAP_LTXID;
        compile_caps[TNS_CCAP_TTC2] = TNS_CCAP_ZLNP;
        compile_caps[TNS_CCAP_OCI2] = TNS_CCAP_DRCP;
        compile_caps[TNS_CCAP_CLIENT_FN] = TNS_CCAP_CLIENT_FN_MAX;
        compile_caps[TNS_CCAP_SESS_SIGNATURE_VERSION] = TNS_CCAP_FIELD_VERSION_12_2;
        compile_caps[TNS_CCAP_TTC4] = TNS_CCAP_INBAND_NOTIFICATION | TNS_CCAP_EXPLICIT_BOUNDARY;
        compile_caps[TNS_CCAP_TTC5] = TNS_CCAP_VECTOR_SUPPORT
            | TNS_CCAP_TOKEN_SUPPORTED
            | TNS_CCAP_PIPELINING_SUPPORT
            | TNS_CCAP_PIPELINING_BREAK
            | TNS_CCAP_TTC5_SESSIONLESS_TXNS;
        compile_caps[TNS_CCAP_VECTOR_FEATURES] =
            TNS_CCAP_VECTOR_FEATURE_BINARY | TNS_CCAP_VECTOR_FEATURE_SPARSE;
        compile_caps[TNS_CCAP_OCI3] = TNS_CCAP_OCI3_OCSSYNC;

        let mut runtime_caps = vec![0u8; TNS_RCAP_MAX];
        runtime_caps[TNS_RCAP_COMPAT] = TNS_RCAP_COMPAT_81;
        runtime_caps[TNS_RCAP_TTC] = TNS_RCAP_TTC_ZERO_COPY | TNS_RCAP_TTC_32K;

        Self {
            protocol_version: 0,
            sdu: TNS_SDU_DEFAULT,
            charset_id: TNS_CHARSET_UTF8,
            ncharset_id: TNS_CHARSET_UTF16,
            // The cooperative engine cannot receive urgent data, so OOB is
            // never advertised; breaks fall back to in-band markers.
            supports_oob: false,
            supports_end_of_response: false,
            supports_fast_auth: false,
            ttc_field_version,
            server_ttc_field_version: 0,
            compile_caps,
            runtime_caps,
        }
    }

    /// Whether packet headers use the 4-byte length form.
    pub fn use_large_sdu(&self) -> bool {
        self.protocol_version >= TNS_VERSION_MIN_LARGE_SDU
    }

    /// Adjust capabilities from the ACCEPT packet.
    pub fn adjust_for_protocol(&mut self, version: u16, _options: u16, flags2: u32) {
        self.protocol_version = version;

        if version >= TNS_VERSION_MIN_END_OF_RESPONSE {
            self.supports_end_of_response = (flags2 & TNS_ACCEPT_FLAG_HAS_END_OF_RESPONSE) != 0;
            if self.supports_end_of_response {
                self.compile_caps[TNS_CCAP_TTC4] |= TNS_CCAP_END_OF_RESPONSE;
            }
        }

        self.supports_fast_auth = (flags2 & TNS_ACCEPT_FLAG_FAST_AUTH) != 0;
    }

    /// Adjust capabilities from the server's capability vectors.
    ///
    /// Only the TTC field version is lowered to the server's value; the other
    /// entries stay as advertised.
    pub fn adjust_for_server_caps(
        &mut self,
        server_compile_caps: &[u8],
        server_runtime_caps: &[u8],
    ) {
        if server_compile_caps.len() > TNS_CCAP_FIELD_VERSION {
            let server_field_version = server_compile_caps[TNS_CCAP_FIELD_VERSION];
            self.server_ttc_field_version = server_field_version;
            if server_field_version < self.ttc_field_version {
                self.ttc_field_version = server_field_version;
                self.compile_caps[TNS_CCAP_FIELD_VERSION] = server_field_version;
            }
        }

        let _ = server_runtime_caps;
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::new()
    }
}

/// Cached endpoint state enabling a shortened phase two on reconnect.
///
/// Written once per described endpoint, read by every subsequent connection
/// to the same endpoint. Held in a process-wide map; never persisted.
#[derive(Debug, Clone, Default)]
pub struct ConnectionCookie {
    pub protocol_version: u16,
    pub server_banner: String,
    pub charset_id: u16,
    pub ncharset_id: u16,
    pub flags: u32,
    pub compile_caps: Vec<u8>,
    pub runtime_caps: Vec<u8>,
    pub populated: bool,
}
