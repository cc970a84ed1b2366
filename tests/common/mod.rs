//! Scripted TNS listener used by the wire-level integration tests.
//!
//! The mock speaks just enough of the protocol to drive the client through
//! the connect handshake, O5LOGON and the execute/fetch pipeline without a
//! database.

#![allow(dead_code)]

use orathin::protocol::constants::*;
use orathin::protocol::message::WriteExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const SERVER_TTC_VERSION: u8 = TNS_CCAP_FIELD_VERSION_19_1;

pub async fn bind_listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, format!("{}:{}/MOCKPDB", addr.ip(), addr.port()))
}

pub async fn read_packet(sock: &mut TcpStream, large: bool) -> (u8, u8, Vec<u8>) {
    let mut header = [0u8; 8];
    sock.read_exact(&mut header).await.unwrap();
    let len = if large {
        u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize
    } else {
        u16::from_be_bytes([header[0], header[1]]) as usize
    };
    let mut payload = vec![0u8; len - 8];
    sock.read_exact(&mut payload).await.unwrap();
    (header[4], header[5], payload)
}

pub async fn write_packet(sock: &mut TcpStream, large: bool, ptype: u8, flags: u8, payload: &[u8]) {
    let total = payload.len() + 8;
    let mut buf: Vec<u8> = Vec::with_capacity(total);
    if large {
        buf.write_u32_be(total as u32);
    } else {
        buf.write_u16_be(total as u16);
        buf.write_u16_be(0);
    }
    WriteExt::write_u8(&mut buf, ptype);
    WriteExt::write_u8(&mut buf, flags);
    buf.write_u16_be(0);
    buf.extend_from_slice(payload);
    sock.write_all(&buf).await.unwrap();
    sock.flush().await.unwrap();
}

pub async fn write_data(sock: &mut TcpStream, body: &[u8]) {
    let mut payload = Vec::with_capacity(body.len() + 2);
    payload.write_u16_be(0); // data flags
    payload.extend_from_slice(body);
    write_packet(sock, true, TNS_PACKET_TYPE_DATA, 0, &payload).await;
}

pub fn accept_payload() -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_u16_be(315); // protocol version: modern framing, no fast auth
    buf.write_u16_be(0); // options
    buf.write_zeros(10);
    WriteExt::write_u8(&mut buf, 0); // nsi flags
    buf.write_zeros(9);
    buf.write_u32_be(8192); // sdu
    buf
}

pub fn write_key_value(buf: &mut Vec<u8>, key: &str, value: &str, flags: u32) {
    buf.write_ub4(key.len() as u32);
    buf.write_str_with_length(key);
    buf.write_ub4(value.len() as u32);
    buf.write_str_with_length(value);
    buf.write_ub4(flags);
}

pub fn protocol_response() -> Vec<u8> {
    let mut buf = Vec::new();
    WriteExt::write_u8(&mut buf, TNS_MSG_TYPE_PROTOCOL);
    WriteExt::write_u8(&mut buf, 6); // server protocol version
    WriteExt::write_u8(&mut buf, 0);
    buf.write_bytes(b"Mock TNS listener");
    WriteExt::write_u8(&mut buf, 0);
    WriteExt::write_u16_le(&mut buf, TNS_CHARSET_UTF8);
    WriteExt::write_u8(&mut buf, 0); // server flags
    WriteExt::write_u16_le(&mut buf, 0); // elements
    buf.write_u16_be(0); // fdo
    let mut compile_caps = vec![0u8; TNS_CCAP_MAX];
    compile_caps[TNS_CCAP_FIELD_VERSION] = SERVER_TTC_VERSION;
    buf.write_bytes_with_length(&compile_caps);
    buf.write_bytes_with_length(&[0u8; TNS_RCAP_MAX]);
    buf
}

pub fn auth_phase_one_response() -> Vec<u8> {
    let mut buf = Vec::new();
    WriteExt::write_u8(&mut buf, TNS_MSG_TYPE_PARAMETER);
    buf.write_ub2(5);
    // Verifier data carries the verifier type in its flags slot.
    buf.write_ub4("AUTH_VFR_DATA".len() as u32);
    buf.write_str_with_length("AUTH_VFR_DATA");
    let vfr = "AA".repeat(16);
    buf.write_ub4(vfr.len() as u32);
    buf.write_str_with_length(&vfr);
    buf.write_ub4(TNS_VERIFIER_TYPE_12C);

    write_key_value(&mut buf, "AUTH_PBKDF2_VGEN_COUNT", "16", 0);
    write_key_value(&mut buf, "AUTH_SESSKEY", &"AB".repeat(32), 0);
    write_key_value(&mut buf, "AUTH_PBKDF2_CSK_SALT", &"CD".repeat(16), 0);
    write_key_value(&mut buf, "AUTH_PBKDF2_SDER_COUNT", "3", 0);
    buf
}

pub fn auth_phase_two_response() -> Vec<u8> {
    let mut buf = Vec::new();
    WriteExt::write_u8(&mut buf, TNS_MSG_TYPE_PARAMETER);
    buf.write_ub2(3);
    write_key_value(&mut buf, "AUTH_SESSION_ID", "42", 0);
    write_key_value(&mut buf, "AUTH_SERIAL_NUM", "7", 0);
    // 19.1.0.0.1 in the 18.1+ packing
    let version: u32 = (19 << 24) | (1 << 16) | 1;
    write_key_value(&mut buf, "AUTH_VERSION_NO", &version.to_string(), 0);
    buf
}

/// Serve the connect handshake and logon on an accepted socket.
pub async fn serve_handshake(sock: &mut TcpStream) {
    let (ptype, _, _) = read_packet(sock, false).await;
    assert_eq!(ptype, TNS_PACKET_TYPE_CONNECT);
    write_packet(sock, false, TNS_PACKET_TYPE_ACCEPT, 0, &accept_payload()).await;

    let (ptype, _, _) = read_packet(sock, true).await; // protocol
    assert_eq!(ptype, TNS_PACKET_TYPE_DATA);
    write_data(sock, &protocol_response()).await;

    let (ptype, _, _) = read_packet(sock, true).await; // data types
    assert_eq!(ptype, TNS_PACKET_TYPE_DATA);
    let mut dt = Vec::new();
    WriteExt::write_u8(&mut dt, TNS_MSG_TYPE_DATA_TYPES);
    dt.write_u16_be(0); // terminator
    write_data(sock, &dt).await;

    let (ptype, _, _) = read_packet(sock, true).await; // auth phase one
    assert_eq!(ptype, TNS_PACKET_TYPE_DATA);
    write_data(sock, &auth_phase_one_response()).await;

    let (ptype, _, _) = read_packet(sock, true).await; // auth phase two
    assert_eq!(ptype, TNS_PACKET_TYPE_DATA);
    write_data(sock, &auth_phase_two_response()).await;
}

/// Describe info for a single column.
#[allow(clippy::too_many_arguments)]
pub fn describe_info(
    name: &str,
    ora_type: u8,
    precision: u8,
    scale: u8,
    csfrm: u8,
) -> Vec<u8> {
    let mut buf = Vec::new();
    WriteExt::write_u8(&mut buf, TNS_MSG_TYPE_DESCRIBE_INFO);
    WriteExt::write_u8(&mut buf, 0); // leading raw bytes, empty
    buf.write_ub4(22); // max row size
    buf.write_ub4(1); // num columns
    WriteExt::write_u8(&mut buf, 0); // flags

    WriteExt::write_u8(&mut buf, ora_type);
    WriteExt::write_u8(&mut buf, 0); // flags
    WriteExt::write_u8(&mut buf, precision);
    WriteExt::write_u8(&mut buf, scale);
    buf.write_ub4(22); // buffer size
    buf.write_ub4(0); // max array elements
    buf.write_ub8(0); // cont flags
    WriteExt::write_u8(&mut buf, 0); // OID
    buf.write_ub2(0); // version
    buf.write_ub2(TNS_CHARSET_UTF8);
    WriteExt::write_u8(&mut buf, csfrm);
    buf.write_ub4(22); // max size
    buf.write_ub4(0); // oaccolid (client field version >= 12.2)
    WriteExt::write_u8(&mut buf, 1); // nullable
    WriteExt::write_u8(&mut buf, 0); // v7 length
    buf.write_ub4(1); // name indicator
    buf.write_str_with_length(name);
    buf.write_ub4(0); // schema
    buf.write_ub4(0); // type name
    buf.write_ub2(1); // column position
    buf.write_ub4(0); // uds flags

    buf.write_ub4(0); // trailing raw bytes
    buf.write_ub4(0); // dcbflag
    buf.write_ub4(0); // dcbmdbz
    buf.write_ub4(0); // dcbmnpr
    buf.write_ub4(0); // dcbmxpr
    buf.write_ub4(0); // trailing raw bytes
    buf
}

pub fn row_header() -> Vec<u8> {
    let mut buf = Vec::new();
    WriteExt::write_u8(&mut buf, TNS_MSG_TYPE_ROW_HEADER);
    WriteExt::write_u8(&mut buf, 0); // flags
    buf.write_ub2(0);
    buf.write_ub4(0);
    buf.write_ub4(0);
    buf.write_ub2(0);
    buf.write_ub4(0); // bit vector
    buf.write_ub4(0); // rxhrid
    buf
}

pub struct ErrorBlock {
    pub cursor_id: u16,
    pub error_num: u32,
    pub row_count: u64,
    pub message: Option<String>,
    pub batch: Vec<(u16, u32, String)>,
}

impl ErrorBlock {
    pub fn success(cursor_id: u16, row_count: u64) -> Self {
        Self {
            cursor_id,
            error_num: 0,
            row_count,
            message: None,
            batch: Vec::new(),
        }
    }

    pub fn no_data_found(cursor_id: u16, row_count: u64) -> Self {
        Self {
            cursor_id,
            error_num: TNS_ERR_NO_DATA_FOUND,
            row_count,
            message: Some("ORA-01403: no data found".to_string()),
            batch: Vec::new(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        WriteExt::write_u8(&mut buf, TNS_MSG_TYPE_ERROR);
        buf.write_ub4(0); // call status
        buf.write_ub2(0); // end-to-end seq
        buf.write_ub4(0); // current row number
        buf.write_ub2(0); // error number hint
        buf.write_ub2(0);
        buf.write_ub2(0);
        buf.write_ub2(self.cursor_id);
        buf.write_ub2(0); // error position
        buf.write_zeros(6); // sql type, fatal, flags x4
        // rowid
        buf.write_ub4(0);
        buf.write_ub2(0);
        WriteExt::write_u8(&mut buf, 0);
        buf.write_ub4(0);
        buf.write_ub2(0);
        buf.write_ub4(0); // os error
        WriteExt::write_u8(&mut buf, 0); // statement number
        WriteExt::write_u8(&mut buf, 0); // call number
        buf.write_ub2(0); // padding
        buf.write_ub4(0); // success iters
        buf.write_ub4(0); // oerrdd

        // batch error codes
        buf.write_ub2(self.batch.len() as u16);
        if !self.batch.is_empty() {
            WriteExt::write_u8(&mut buf, 1); // plain array marker
            for (code, _, _) in &self.batch {
                buf.write_ub2(*code);
            }
        }
        // batch error offsets
        buf.write_ub4(self.batch.len() as u32);
        if !self.batch.is_empty() {
            WriteExt::write_u8(&mut buf, 1);
            for (_, offset, _) in &self.batch {
                buf.write_ub4(*offset);
            }
        }
        // batch error messages
        buf.write_ub2(self.batch.len() as u16);
        if !self.batch.is_empty() {
            WriteExt::write_u8(&mut buf, 0); // packed size
            for (_, _, message) in &self.batch {
                buf.write_ub2(message.len() as u16);
                buf.write_str_with_length(message);
                buf.write_u16_be(0); // end marker
            }
        }

        buf.write_ub4(self.error_num);
        buf.write_ub8(self.row_count);
        if let Some(message) = &self.message {
            buf.write_str_with_length(message);
        }
        buf
    }
}

/// Serve one single-NUMBER-column query: describe, one row, end of data.
pub async fn serve_number_query(sock: &mut TcpStream, name: &str, value: &[u8], scale: u8) {
    let (ptype, _, _) = read_packet(sock, true).await;
    assert_eq!(ptype, TNS_PACKET_TYPE_DATA);

    let mut body = describe_info(name, ORA_TYPE_NUM_NUMBER as u8, 5, scale, 0);
    body.extend_from_slice(&row_header());
    WriteExt::write_u8(&mut body, TNS_MSG_TYPE_ROW_DATA);
    body.write_bytes_with_length(value);
    body.extend_from_slice(&ErrorBlock::no_data_found(5, 1).encode());
    write_data(sock, &body).await;
}

