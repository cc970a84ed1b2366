//! O5LOGON challenge/response authentication.
//!
//! Two round trips: phase one sends the username and client identity and the
//! server answers with verifier data; phase two derives the session key,
//! proves knowledge of the password, and carries the session parameters.
//! On 23ai servers FastAuth folds phase one into the connect exchange.

use crate::error::{Error, Result};
use crate::protocol::buffer::ReadBuffer;
use crate::protocol::capabilities::Capabilities;
use crate::protocol::constants::*;
use crate::protocol::crypto::{
    bytes_to_hex_upper, decrypt_cbc, derive_key_pbkdf2, encrypt_cbc, hex_to_bytes, md5_hash,
    random_bytes, sha1_hash, sha512_hash,
};
use crate::protocol::messages::{
    AuthPhaseOneMessage, AuthPhaseTwoMessage, FastAuthMessage, ProtocolMessage,
};
use crate::protocol::packet::Packet;
use crate::protocol::transport::Transport;
use log::debug;
use std::collections::HashMap;

/// Administrative privilege requested at logon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    Default,
    /// Preliminary connection for startup/shutdown.
    Prelim,
    SysDba,
    SysOper,
    SysAsm,
    SysBkp,
    SysDgd,
    SysKmt,
    SysRac,
}

impl AuthMode {
    /// Wire bits for this mode, before the logon/password bits.
    pub fn wire_bits(self) -> u32 {
        match self {
            AuthMode::Default => 0,
            AuthMode::Prelim => TNS_AUTH_MODE_PRELIM,
            AuthMode::SysDba => TNS_AUTH_MODE_SYSDBA,
            AuthMode::SysOper => TNS_AUTH_MODE_SYSOPER,
            AuthMode::SysAsm => TNS_AUTH_MODE_SYSASM,
            AuthMode::SysBkp => TNS_AUTH_MODE_SYSBKP,
            AuthMode::SysDgd => TNS_AUTH_MODE_SYSDGD,
            AuthMode::SysKmt => TNS_AUTH_MODE_SYSKMT,
            AuthMode::SysRac => TNS_AUTH_MODE_SYSRAC,
        }
    }
}

/// Credentials and session options for logon.
#[derive(Clone)]
pub struct AuthCredentials {
    pub username: String,
    pub password: String,
    /// Token for IAM authentication; used instead of the password exchange.
    pub token: Option<String>,
    pub auth_mode: AuthMode,
    /// DRCP purity.
    pub purity: u32,
    /// Edition for edition-based redefinition.
    pub edition: Option<String>,
}

impl AuthCredentials {
    /// Password credentials with default options.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            token: None,
            auth_mode: AuthMode::Default,
            purity: 0,
            edition: None,
        }
    }
}

impl std::fmt::Debug for AuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthCredentials")
            .field("username", &self.username)
            .field("auth_mode", &self.auth_mode)
            .finish_non_exhaustive()
    }
}

/// Session state accumulated during authentication.
#[derive(Debug, Default)]
pub struct SessionData {
    /// Key/value pairs returned by the server.
    pub params: HashMap<String, String>,
    /// Verifier type from AUTH_VFR_DATA.
    pub verifier_type: u32,
    /// Combo key kept for the server-proof check.
    pub combo_key: Option<Vec<u8>>,
}

impl SessionData {
    /// Server session id, once authenticated.
    pub fn session_id(&self) -> Option<u32> {
        self.params.get("AUTH_SESSION_ID")?.parse().ok()
    }

    /// Server session serial number.
    pub fn serial_num(&self) -> Option<u16> {
        self.params.get("AUTH_SERIAL_NUM")?.parse().ok()
    }

    /// Server version, decoded from AUTH_VERSION_NO.
    pub fn server_version(&self, ttc_field_version: u8) -> Option<(u8, u8, u8, u8, u8)> {
        let version: u32 = self.params.get("AUTH_VERSION_NO")?.parse().ok()?;
        if ttc_field_version >= TNS_CCAP_FIELD_VERSION_18_1 {
            Some((
                ((version >> 24) & 0xFF) as u8,
                ((version >> 16) & 0xFF) as u8,
                ((version >> 12) & 0x0F) as u8,
                ((version >> 4) & 0xFF) as u8,
                (version & 0x0F) as u8,
            ))
        } else {
            Some((
                ((version >> 24) & 0xFF) as u8,
                ((version >> 20) & 0x0F) as u8,
                ((version >> 12) & 0x0F) as u8,
                ((version >> 8) & 0x0F) as u8,
                (version & 0x0F) as u8,
            ))
        }
    }
}

/// Client identity strings for the CID and auth key/value pairs.
pub struct ClientIdentity {
    pub program: String,
    pub machine: String,
    pub pid: String,
    pub osuser: String,
}

impl ClientIdentity {
    pub fn gather() -> Self {
        Self {
            program: DRIVER_NAME.to_string(),
            machine: hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id().to_string(),
            osuser: whoami::username(),
        }
    }
}

/// Run the full authentication: the token exchange when a bearer token is
/// present, the two-phase password challenge otherwise.
pub async fn authenticate(
    transport: &mut Transport,
    creds: &AuthCredentials,
    caps: &mut Capabilities,
) -> Result<SessionData> {
    if let Some(token) = &creds.token {
        return token_auth(transport, creds, token).await;
    }
    let mut session = phase_one(transport, creds).await?;
    phase_two(transport, creds, caps, &mut session).await?;
    Ok(session)
}

/// Single-round-trip token authentication.
async fn token_auth(
    transport: &mut Transport,
    creds: &AuthCredentials,
    token: &str,
) -> Result<SessionData> {
    let driver_version = format!("{} : {}", DRIVER_NAME, env!("CARGO_PKG_VERSION"));
    let msg = crate::protocol::messages::AuthTokenMessage {
        username: &creds.username,
        auth_mode: TNS_AUTH_MODE_LOGON
            | TNS_AUTH_MODE_IAM_TOKEN
            | creds.auth_mode.wire_bits(),
        token,
        driver_version: &driver_version,
    };
    transport.send_data_message(&msg).await?;
    let response = read_auth_packet(transport).await?;
    parse_auth_response(response)
}

/// Phase one: send client identity, receive verifier data.
async fn phase_one(transport: &mut Transport, creds: &AuthCredentials) -> Result<SessionData> {
    let identity = ClientIdentity::gather();
    let msg = AuthPhaseOneMessage {
        username: &creds.username,
        auth_mode: TNS_AUTH_MODE_LOGON | creds.auth_mode.wire_bits(),
        terminal: "unknown",
        program: &identity.program,
        machine: &identity.machine,
        pid: &identity.pid,
        sid: &identity.osuser,
    };
    transport.send_data_message(&msg).await?;

    let response = read_auth_packet(transport).await?;
    parse_auth_response(response)
}

/// Phase two: answer the challenge with the encrypted session key and
/// password, then verify the server's proof.
pub async fn phase_two(
    transport: &mut Transport,
    creds: &AuthCredentials,
    caps: &mut Capabilities,
    session: &mut SessionData,
) -> Result<()> {
    let (session_key, speedy_key, encoded_password) = generate_verifier(creds, session)?;
    let tz_stmt = timezone_statement();
    let driver_version = format!("{} : {}", DRIVER_NAME, env!("CARGO_PKG_VERSION"));

    let msg = AuthPhaseTwoMessage {
        username: &creds.username,
        auth_mode: TNS_AUTH_MODE_LOGON
            | TNS_AUTH_MODE_WITH_PASSWORD
            | creds.auth_mode.wire_bits(),
        session_key: &session_key,
        speedy_key: speedy_key.as_deref(),
        encoded_password: &encoded_password,
        purity: creds.purity,
        edition: creds.edition.as_deref(),
        timezone_stmt: &tz_stmt,
        driver_version: &driver_version,
    };
    transport.send_data_message(&msg).await?;

    let response = read_auth_packet(transport).await?;
    let response_session = parse_auth_response(response)?;

    if let Some(combo_key) = &session.combo_key {
        if let Some(svr_response) = response_session.params.get("AUTH_SVR_RESPONSE") {
            let encoded = hex_to_bytes(svr_response)
                .ok_or_else(|| Error::protocol("invalid AUTH_SVR_RESPONSE hex"))?;
            let decrypted = decrypt_cbc(combo_key, &encoded);
            if decrypted.len() < 32 || &decrypted[16..32] != b"SERVER_TO_CLIENT" {
                return Err(Error::InvalidServerResponse);
            }
        }
    }

    for (k, v) in response_session.params {
        session.params.insert(k, v);
    }
    debug!(
        "authenticated; session id {:?}, serial {:?}",
        session.session_id(),
        session.serial_num()
    );
    let _ = caps;
    Ok(())
}

/// FastAuth: protocol + data types + auth phase one in one round trip.
pub async fn fast_auth(
    transport: &mut Transport,
    caps: &mut Capabilities,
    creds: &AuthCredentials,
) -> Result<SessionData> {
    let identity = ClientIdentity::gather();

    // FastAuth pins the 19.1 ext 1 field version; the server formats its
    // response fields accordingly.
    let mut fast_auth_compile_caps = caps.compile_caps.clone();
    fast_auth_compile_caps[TNS_CCAP_FIELD_VERSION] = TNS_CCAP_FIELD_VERSION_19_1_EXT_1;
    caps.ttc_field_version = TNS_CCAP_FIELD_VERSION_19_1_EXT_1;

    let msg = FastAuthMessage {
        driver_name: DRIVER_NAME.as_bytes(),
        compile_caps: &fast_auth_compile_caps,
        runtime_caps: &caps.runtime_caps,
        auth: AuthPhaseOneMessage {
            username: &creds.username,
            auth_mode: TNS_AUTH_MODE_LOGON | creds.auth_mode.wire_bits(),
            terminal: "unknown",
            program: &identity.program,
            machine: &identity.machine,
            pid: &identity.pid,
            sid: &identity.osuser,
        },
    };
    transport.send_data_message(&msg).await?;

    let response = read_auth_packet(transport).await?;
    parse_fast_auth_response(response, caps)
}

/// Exchange Protocol and DataTypes messages (the non-FastAuth path).
pub async fn negotiate_protocol(
    transport: &mut Transport,
    caps: &mut Capabilities,
) -> Result<String> {
    use crate::protocol::messages::DataTypesMessage;

    transport.send_data_message(&ProtocolMessage::default()).await?;
    let response = read_auth_packet(transport).await?;

    let mut buf = ReadBuffer::from_bytes(response.payload);
    let _data_flags = buf.read_u16_be()?;
    let msg_type = buf.read_u8()?;
    if msg_type != TNS_MSG_TYPE_PROTOCOL {
        return Err(Error::protocol(format!(
            "expected protocol response, got message type {}",
            msg_type
        )));
    }
    let banner = parse_protocol_body(&mut buf, caps)?;

    let data_types_msg = DataTypesMessage {
        compile_caps: &caps.compile_caps,
        runtime_caps: &caps.runtime_caps,
    };
    transport.send_data_message(&data_types_msg).await?;
    let response = read_auth_packet(transport).await?;

    let mut buf = ReadBuffer::from_bytes(response.payload);
    let _data_flags = buf.read_u16_be()?;
    let msg_type = buf.read_u8()?;
    if msg_type != TNS_MSG_TYPE_DATA_TYPES {
        return Err(Error::protocol(format!(
            "expected data types response, got message type {}",
            msg_type
        )));
    }
    skip_data_types_body(&mut buf)?;

    Ok(banner)
}

/// Parse the body of a protocol response, after the message type byte.
fn parse_protocol_body(buf: &mut ReadBuffer, caps: &mut Capabilities) -> Result<String> {
    let _server_version = buf.read_u8()?;
    let _zero = buf.read_u8()?;

    let mut banner = Vec::new();
    loop {
        let b = buf.read_u8()?;
        if b == 0 {
            break;
        }
        banner.push(b);
    }

    caps.charset_id = buf.read_u16_le()?;
    let _server_flags = buf.read_u8()?;

    let num_elem = buf.read_u16_le()?;
    if num_elem > 0 {
        buf.skip((num_elem * 5) as usize)?;
    }

    let fdo_length = buf.read_u16_be()?;
    buf.skip(fdo_length as usize)?;

    if let Some(server_compile_caps) = buf.read_bytes_with_length()? {
        caps.adjust_for_server_caps(&server_compile_caps, &[]);
    }
    if let Some(server_runtime_caps) = buf.read_bytes_with_length()? {
        caps.adjust_for_server_caps(&[], &server_runtime_caps);
    }

    Ok(String::from_utf8_lossy(&banner).to_string())
}

fn skip_data_types_body(buf: &mut ReadBuffer) -> Result<()> {
    loop {
        let data_type = buf.read_u16_be()?;
        if data_type == 0 {
            break;
        }
        let conv_data_type = buf.read_u16_be()?;
        if conv_data_type != 0 {
            buf.skip(4)?;
        }
    }
    if buf.remaining() > 0 {
        buf.skip(buf.remaining())?;
    }
    Ok(())
}

/// Parse a FastAuth response: embedded Protocol, DataTypes, auth parameter
/// and status messages.
fn parse_fast_auth_response(packet: Packet, caps: &mut Capabilities) -> Result<SessionData> {
    let mut buf = ReadBuffer::from_bytes(packet.payload);
    let _data_flags = buf.read_u16_be()?;

    let mut session = SessionData::default();
    while buf.remaining() > 0 {
        let msg_type = buf.read_u8()?;
        match msg_type {
            TNS_MSG_TYPE_PROTOCOL => {
                let _banner = parse_protocol_body(&mut buf, caps)?;
            }
            TNS_MSG_TYPE_DATA_TYPES => {
                skip_data_types_body(&mut buf)?;
            }
            TNS_MSG_TYPE_PARAMETER => {
                parse_auth_parameters(&mut buf, &mut session)?;
            }
            TNS_MSG_TYPE_ERROR => {
                // A full error block; a zero code is simply call status.
                if let Some(err) = scan_error_block(&mut buf)? {
                    return Err(err);
                }
            }
            TNS_MSG_TYPE_END_OF_RESPONSE => break,
            _ => break,
        }
    }
    Ok(session)
}

async fn read_auth_packet(transport: &mut Transport) -> Result<Packet> {
    loop {
        let packet = transport.read_packet().await?;
        match packet.packet_type {
            TNS_PACKET_TYPE_DATA => return Ok(packet),
            TNS_PACKET_TYPE_MARKER => {
                return recover_auth_error(transport).await;
            }
            TNS_PACKET_TYPE_CONTROL => continue,
            other => {
                return Err(Error::UnexpectedPacketType {
                    expected: TNS_PACKET_TYPE_DATA,
                    actual: other,
                })
            }
        }
    }
}

/// The server broke the exchange; reset and surface the error that follows.
async fn recover_auth_error(transport: &mut Transport) -> Result<Packet> {
    transport.send_marker(TNS_MARKER_TYPE_RESET).await?;

    let mut reset_seen = false;
    for _ in 0..16 {
        let packet = transport.read_packet().await?;
        match packet.packet_type {
            TNS_PACKET_TYPE_MARKER => {
                if packet.marker_type() == Some(TNS_MARKER_TYPE_RESET) {
                    reset_seen = true;
                }
            }
            TNS_PACKET_TYPE_DATA if reset_seen => {
                let mut buf = ReadBuffer::from_bytes(packet.payload.clone());
                let _data_flags = buf.read_u16_be()?;
                let msg_type = buf.read_u8()?;
                if msg_type == TNS_MSG_TYPE_ERROR {
                    if let Some(err) = scan_error_block(&mut buf)? {
                        return Err(err);
                    }
                }
                return Err(Error::AuthenticationFailed {
                    message: "server broke the logon exchange".to_string(),
                });
            }
            _ => {}
        }
    }
    Err(Error::protocol(
        "break received during logon but no error followed",
    ))
}

/// Extract ORA-nnnnn from an error block without fully modelling it.
fn scan_error_block(buf: &mut ReadBuffer) -> Result<Option<Error>> {
    let remaining = buf.read_bytes(buf.remaining())?;
    let ora = b"ORA-";
    if let Some(pos) = remaining.windows(4).position(|w| w == ora) {
        let msg_end = remaining[pos..]
            .iter()
            .position(|&b| b == 0)
            .map(|p| pos + p)
            .unwrap_or(remaining.len());
        let msg_bytes = &remaining[pos..msg_end];
        let message = String::from_utf8_lossy(msg_bytes).to_string();
        let code = message
            .get(4..)
            .and_then(|s| s.split(':').next())
            .and_then(|s| s.trim().parse::<u32>().ok())
            .unwrap_or(0);
        if code != 0 {
            return Ok(Some(Error::from_server(code, message)));
        }
    }
    Ok(None)
}

/// Parse an auth response packet (parameter, error or status message).
pub fn parse_auth_response(packet: Packet) -> Result<SessionData> {
    let mut buf = ReadBuffer::from_bytes(packet.payload);
    let mut session = SessionData::default();

    let _data_flags = buf.read_u16_be()?;
    let msg_type = buf.read_u8()?;

    match msg_type {
        TNS_MSG_TYPE_PARAMETER => {
            parse_auth_parameters(&mut buf, &mut session)?;
        }
        TNS_MSG_TYPE_ERROR => {
            if let Some(err) = scan_error_block(&mut buf)? {
                return Err(err);
            }
            return Err(Error::AuthenticationFailed {
                message: "logon rejected without a server error".to_string(),
            });
        }
        TNS_MSG_TYPE_STATUS => {
            let _status = buf.read_ub4()?;
            if buf.remaining() > 0 {
                let next = buf.read_u8()?;
                if next == TNS_MSG_TYPE_PARAMETER {
                    parse_auth_parameters(&mut buf, &mut session)?;
                }
            }
        }
        _ => {}
    }

    Ok(session)
}

fn parse_auth_parameters(buf: &mut ReadBuffer, session: &mut SessionData) -> Result<()> {
    let num_params = buf.read_ub2()?;
    for _ in 0..num_params {
        if buf.remaining() < 3 {
            break;
        }
        if buf.read_ub4().is_err() {
            break;
        }
        let key = match buf.read_str_with_length() {
            Ok(Some(k)) => k,
            Ok(None) => String::new(),
            Err(_) => break,
        };
        if buf.read_ub4().is_err() {
            break;
        }
        let value = match buf.read_str_with_length() {
            Ok(Some(v)) => v,
            Ok(None) => String::new(),
            Err(_) => break,
        };

        if key == "AUTH_VFR_DATA" {
            if let Ok(verifier_type) = buf.read_ub4() {
                session.verifier_type = verifier_type;
            }
        } else if buf.read_ub4().is_err() {
            break;
        }

        let clean_key = key.trim_end_matches('\0').to_string();
        if !clean_key.is_empty()
            && clean_key
                .chars()
                .all(|c| c.is_ascii_graphic() || c.is_ascii_whitespace())
        {
            session.params.insert(clean_key, value);
        }
    }
    Ok(())
}

/// Derive the verifier response for the negotiated verifier type.
fn generate_verifier(
    creds: &AuthCredentials,
    session: &mut SessionData,
) -> Result<(String, Option<String>, String)> {
    let verifier_data = session
        .params
        .get("AUTH_VFR_DATA")
        .ok_or_else(|| Error::protocol("missing AUTH_VFR_DATA"))?;
    let verifier_bytes = hex_to_bytes(verifier_data)
        .ok_or_else(|| Error::protocol("invalid AUTH_VFR_DATA hex"))?;

    let password = creds.password.as_bytes();

    match session.verifier_type {
        TNS_VERIFIER_TYPE_12C => generate_12c_verifier(password, &verifier_bytes, session),
        TNS_VERIFIER_TYPE_11G_1 | TNS_VERIFIER_TYPE_11G_2 => {
            generate_11g_verifier(password, &verifier_bytes, session)
        }
        _ => Err(Error::UnsupportedVerifierType {
            verifier_type: session.verifier_type,
        }),
    }
}

/// 12c verifier: PBKDF2-derived keys, SHA-512 password hash.
fn generate_12c_verifier(
    password: &[u8],
    verifier_data: &[u8],
    session: &mut SessionData,
) -> Result<(String, Option<String>, String)> {
    let iterations: u32 = session
        .params
        .get("AUTH_PBKDF2_VGEN_COUNT")
        .ok_or_else(|| Error::protocol("missing AUTH_PBKDF2_VGEN_COUNT"))?
        .parse()
        .map_err(|_| Error::protocol("invalid AUTH_PBKDF2_VGEN_COUNT"))?;

    let keylen = 32usize;

    let mut salt = verifier_data.to_vec();
    salt.extend_from_slice(b"AUTH_PBKDF2_SPEEDY_KEY");
    let password_key = derive_key_pbkdf2(password, &salt, 64, iterations);

    let mut hash_input = password_key.clone();
    hash_input.extend_from_slice(verifier_data);
    let password_hash: Vec<u8> = sha512_hash(&hash_input)[..keylen].to_vec();

    let server_sesskey = session
        .params
        .get("AUTH_SESSKEY")
        .ok_or_else(|| Error::protocol("missing AUTH_SESSKEY"))?;
    let server_sesskey_bytes = hex_to_bytes(server_sesskey)
        .ok_or_else(|| Error::protocol("invalid AUTH_SESSKEY hex"))?;
    let session_key_part_a = decrypt_cbc(&password_hash, &server_sesskey_bytes);

    let session_key_part_b = random_bytes(session_key_part_a.len());
    let encrypted_client_key = encrypt_cbc(&password_hash, &session_key_part_b, false);
    let session_key =
        bytes_to_hex_upper(&encrypted_client_key[..32.min(encrypted_client_key.len())]);

    let csk_salt = session
        .params
        .get("AUTH_PBKDF2_CSK_SALT")
        .ok_or_else(|| Error::protocol("missing AUTH_PBKDF2_CSK_SALT"))?;
    let csk_salt_bytes = hex_to_bytes(csk_salt)
        .ok_or_else(|| Error::protocol("invalid AUTH_PBKDF2_CSK_SALT hex"))?;
    let sder_count: u32 = session
        .params
        .get("AUTH_PBKDF2_SDER_COUNT")
        .ok_or_else(|| Error::protocol("missing AUTH_PBKDF2_SDER_COUNT"))?
        .parse()
        .map_err(|_| Error::protocol("invalid AUTH_PBKDF2_SDER_COUNT"))?;

    let mut temp_key = session_key_part_b[..keylen.min(session_key_part_b.len())].to_vec();
    temp_key.extend_from_slice(&session_key_part_a[..keylen.min(session_key_part_a.len())]);
    let temp_key_hex = bytes_to_hex_upper(&temp_key);
    let combo_key =
        derive_key_pbkdf2(temp_key_hex.as_bytes(), &csk_salt_bytes, keylen, sder_count);

    let speedy_salt = random_bytes(16);
    let mut speedy_plaintext = speedy_salt.clone();
    speedy_plaintext.extend_from_slice(&password_key);
    let speedy_encrypted = encrypt_cbc(&combo_key, &speedy_plaintext, false);
    let speedy_key = bytes_to_hex_upper(&speedy_encrypted[..80.min(speedy_encrypted.len())]);

    session.combo_key = Some(combo_key.clone());

    let password_salt = random_bytes(16);
    let mut password_with_salt = password_salt;
    password_with_salt.extend_from_slice(password);
    let encrypted_password = encrypt_cbc(&combo_key, &password_with_salt, false);
    let encoded_password = bytes_to_hex_upper(&encrypted_password);

    Ok((session_key, Some(speedy_key), encoded_password))
}

/// 11g verifier: SHA-1 password hash, MD5-derived combo key.
fn generate_11g_verifier(
    password: &[u8],
    verifier_data: &[u8],
    session: &mut SessionData,
) -> Result<(String, Option<String>, String)> {
    let mut hash_input = password.to_vec();
    hash_input.extend_from_slice(verifier_data);
    let mut password_hash = sha1_hash(&hash_input).to_vec();
    password_hash.extend_from_slice(&[0u8; 4]);

    let server_sesskey = session
        .params
        .get("AUTH_SESSKEY")
        .ok_or_else(|| Error::protocol("missing AUTH_SESSKEY"))?;
    let server_sesskey_bytes = hex_to_bytes(server_sesskey)
        .ok_or_else(|| Error::protocol("invalid AUTH_SESSKEY hex"))?;
    let session_key_part_a = decrypt_cbc(&password_hash, &server_sesskey_bytes);

    let session_key_part_b = random_bytes(session_key_part_a.len());
    let encrypted_client_key = encrypt_cbc(&password_hash, &session_key_part_b, false);
    let session_key =
        bytes_to_hex_upper(&encrypted_client_key[..48.min(encrypted_client_key.len())]);

    let key_len = 24;
    let mut xor_result = vec![0u8; key_len];
    for i in 16..40 {
        if i < session_key_part_a.len() && i < session_key_part_b.len() {
            xor_result[i - 16] = session_key_part_a[i] ^ session_key_part_b[i];
        }
    }

    let part1 = md5_hash(&xor_result[..16]);
    let part2 = md5_hash(&xor_result[16..]);
    let mut combo_key = part1.to_vec();
    combo_key.extend_from_slice(&part2[..8]);

    let password_salt = random_bytes(16);
    let mut password_with_salt = password_salt;
    password_with_salt.extend_from_slice(password);
    let encrypted_password = encrypt_cbc(&combo_key, &password_with_salt, false);
    let encoded_password = bytes_to_hex_upper(&encrypted_password);

    session.combo_key = Some(combo_key);

    Ok((session_key, None, encoded_password))
}

/// Build the ALTER SESSION statement carrying the client timezone.
fn timezone_statement() -> String {
    let now = chrono::Local::now();
    let offset = now.offset();
    let total = offset.local_minus_utc();
    let hours = total / 3600;
    let minutes = (total.abs() % 3600) / 60;
    let sign = if hours >= 0 { "+" } else { "-" };
    format!(
        "ALTER SESSION SET TIME_ZONE='{}{:02}:{:02}'\0",
        sign,
        hours.abs(),
        minutes
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_auth_mode_bits() {
        assert_eq!(AuthMode::Default.wire_bits(), 0);
        assert_eq!(AuthMode::SysDba.wire_bits(), TNS_AUTH_MODE_SYSDBA);
        assert_eq!(AuthMode::SysRac.wire_bits(), TNS_AUTH_MODE_SYSRAC);
    }

    #[test]
    fn test_timezone_statement_shape() {
        let stmt = timezone_statement();
        assert!(stmt.starts_with("ALTER SESSION SET TIME_ZONE='"));
        assert!(stmt.ends_with("'\0"));
    }

    #[test]
    fn test_server_version_decoding() {
        let mut session = SessionData::default();
        // 23.4.0.24.5 in the 18.1+ layout
        let packed: u32 = (23 << 24) | (4 << 16) | (0 << 12) | (24 << 4) | 5;
        session
            .params
            .insert("AUTH_VERSION_NO".to_string(), packed.to_string());
        assert_eq!(
            session.server_version(TNS_CCAP_FIELD_VERSION_19_1),
            Some((23, 4, 0, 24, 5))
        );
    }

    #[test]
    fn test_parse_auth_parameters() {
        // One AUTH_SESSION_ID=42 pair in wire form.
        let mut body = Vec::new();
        {
            use crate::protocol::message::WriteExt;
            body.write_u16_be(0); // data flags
            body.write_u8(TNS_MSG_TYPE_PARAMETER);
            body.write_ub2(1); // num params
            body.write_ub4("AUTH_SESSION_ID".len() as u32);
            body.write_str_with_length("AUTH_SESSION_ID");
            body.write_ub4(2);
            body.write_str_with_length("42");
            body.write_ub4(0); // flags
        }
        let packet = Packet::new(TNS_PACKET_TYPE_DATA, Bytes::from(body));
        let session = parse_auth_response(packet).unwrap();
        assert_eq!(session.session_id(), Some(42));
    }

    #[test]
    fn test_scan_error_block_finds_code() {
        let data = b"garbage prefix ORA-01017: invalid username/password\0tail";
        let mut buf = ReadBuffer::from_bytes(Bytes::copy_from_slice(data));
        let err = scan_error_block(&mut buf).unwrap().unwrap();
        assert_eq!(err.code(), Some(1017));
    }

    #[test]
    fn test_generate_verifier_requires_data() {
        let creds = AuthCredentials::new("scott", "tiger");
        let mut session = SessionData::default();
        assert!(generate_verifier(&creds, &mut session).is_err());
    }
}
