//! Phase-one connection establishment.
//!
//! Parses connect strings into the normalized description form, dials the
//! candidate addresses honoring LOAD_BALANCE/FAILOVER and RETRY_COUNT, and
//! runs the CONNECT/ACCEPT handshake including REDIRECT, RESEND, REFUSE and
//! server-requested TLS renegotiation.

use crate::error::{Error, Result};
use crate::protocol::buffer::ReadBuffer;
use crate::protocol::capabilities::{Capabilities, ConnectionCookie};
use crate::protocol::constants::*;
use crate::protocol::messages::ConnectMessage;
use crate::protocol::packet::Packet;
use crate::protocol::transport::{TlsParams, Transport};
use base64::Engine as _;
use log::{debug, info, warn};
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

/// Wire protocol of one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    Tcp,
    Tcps,
}

/// A single listener address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    /// HTTPS CONNECT proxy to tunnel through.
    pub proxy: Option<(String, u16)>,
}

/// An ordered group of addresses with its balancing policy.
#[derive(Debug, Clone, Default)]
pub struct AddressList {
    pub addresses: Vec<Address>,
    pub load_balance: bool,
    pub failover: bool,
}

/// Normalized form of a connect string.
#[derive(Debug, Clone)]
pub struct Description {
    pub address_lists: Vec<AddressList>,
    pub service_name: Option<String>,
    pub sid: Option<String>,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub tcp_connect_timeout: Duration,
    pub sdu: u32,
}

impl Default for Description {
    fn default() -> Self {
        Self {
            address_lists: Vec::new(),
            service_name: None,
            sid: None,
            retry_count: 0,
            retry_delay: Duration::from_secs(1),
            tcp_connect_timeout: Duration::from_secs(20),
            sdu: TNS_SDU_DEFAULT,
        }
    }
}

impl Description {
    /// Parse either the EZConnect form `host[:port][/service]` or a full
    /// `(DESCRIPTION=...)` descriptor.
    pub fn parse(connect_string: &str) -> Result<Self> {
        let trimmed = connect_string.trim();
        if trimmed.starts_with('(') {
            Self::parse_descriptor(trimmed)
        } else {
            Self::parse_easy(trimmed)
        }
    }

    fn parse_easy(connect_string: &str) -> Result<Self> {
        let (addr_part, service_name) = match connect_string.split_once('/') {
            Some((a, s)) => (a, Some(s.to_string())),
            None => (connect_string, None),
        };

        let (mut host, port) = match addr_part.rsplit_once(':') {
            Some((h, p)) => {
                let port = p.parse::<u16>().map_err(|_| Error::InvalidConnectString {
                    message: format!("invalid port: {}", p),
                })?;
                (h.to_string(), port)
            }
            None => (addr_part.to_string(), 1521),
        };

        let protocol = if let Some(rest) = host.strip_prefix("tcps://") {
            host = rest.to_string();
            Protocol::Tcps
        } else if let Some(rest) = host.strip_prefix("tcp://") {
            host = rest.to_string();
            Protocol::Tcp
        } else {
            Protocol::Tcp
        };

        if host.is_empty() {
            return Err(Error::InvalidConnectString {
                message: "empty host".to_string(),
            });
        }

        Ok(Self {
            address_lists: vec![AddressList {
                addresses: vec![Address {
                    protocol,
                    host,
                    port,
                    proxy: None,
                }],
                load_balance: false,
                failover: true,
            }],
            service_name,
            ..Default::default()
        })
    }

    fn parse_descriptor(text: &str) -> Result<Self> {
        let node = DescriptorNode::parse(text)?;
        if !node.name.eq_ignore_ascii_case("DESCRIPTION") {
            return Err(Error::InvalidConnectString {
                message: "missing DESCRIPTION".to_string(),
            });
        }
        let desc_node = &node;

        let mut description = Description::default();

        if let Some(v) = desc_node.find_value("RETRY_COUNT") {
            description.retry_count = v.parse().unwrap_or(0);
        }
        if let Some(v) = desc_node.find_value("RETRY_DELAY") {
            description.retry_delay = Duration::from_secs(v.parse().unwrap_or(1));
        }
        if let Some(v) = desc_node.find_value("TRANSPORT_CONNECT_TIMEOUT") {
            description.tcp_connect_timeout = parse_timeout(v, Duration::from_secs(20));
        }
        if let Some(v) = desc_node.find_value("SDU") {
            description.sdu = v.parse().unwrap_or(TNS_SDU_DEFAULT);
        }

        // Address lists: explicit ADDRESS_LIST groups, plus bare ADDRESS
        // entries directly under DESCRIPTION forming one implicit group.
        let mut direct = AddressList {
            failover: true,
            ..Default::default()
        };
        if let Some(v) = desc_node.find_value("LOAD_BALANCE") {
            direct.load_balance = is_on(v);
        }
        if let Some(v) = desc_node.find_value("FAILOVER") {
            direct.failover = is_on(v);
        }
        for child in &desc_node.children {
            if child.name.eq_ignore_ascii_case("ADDRESS_LIST") {
                let mut list = AddressList {
                    failover: true,
                    ..Default::default()
                };
                if let Some(v) = child.find_value("LOAD_BALANCE") {
                    list.load_balance = is_on(v);
                }
                if let Some(v) = child.find_value("FAILOVER") {
                    list.failover = is_on(v);
                }
                for addr_node in &child.children {
                    if addr_node.name.eq_ignore_ascii_case("ADDRESS") {
                        list.addresses.push(parse_address(addr_node)?);
                    }
                }
                if !list.addresses.is_empty() {
                    description.address_lists.push(list);
                }
            } else if child.name.eq_ignore_ascii_case("ADDRESS") {
                direct.addresses.push(parse_address(child)?);
            }
        }
        if !direct.addresses.is_empty() {
            description.address_lists.push(direct);
        }
        if description.address_lists.is_empty() {
            return Err(Error::InvalidConnectString {
                message: "descriptor has no ADDRESS".to_string(),
            });
        }

        if let Some(connect_data) = desc_node.find("CONNECT_DATA") {
            description.service_name = connect_data
                .find_value("SERVICE_NAME")
                .map(str::to_string);
            description.sid = connect_data.find_value("SID").map(str::to_string);
        }

        Ok(description)
    }

    /// Flattened connection candidates in attempt order. Load-balanced
    /// groups start from a random position.
    pub fn candidate_addresses(&self) -> Vec<Address> {
        let mut out = Vec::new();
        for list in &self.address_lists {
            if list.addresses.is_empty() {
                continue;
            }
            if list.load_balance && list.addresses.len() > 1 {
                let start = rand::thread_rng().gen_range(0..list.addresses.len());
                for i in 0..list.addresses.len() {
                    out.push(list.addresses[(start + i) % list.addresses.len()].clone());
                }
            } else {
                out.extend(list.addresses.iter().cloned());
            }
        }
        out
    }

    /// Key identifying the described endpoint for the cookie registry.
    pub fn cookie_key(&self) -> String {
        let service = self
            .service_name
            .as_deref()
            .or(self.sid.as_deref())
            .unwrap_or_default();
        let addr = self
            .address_lists
            .first()
            .and_then(|l| l.addresses.first())
            .map(|a| format!("{}:{}", a.host, a.port))
            .unwrap_or_default();
        format!("{}/{}", addr, service)
    }

    /// Build the connect descriptor sent to the listener. The CID block is
    /// sanitized: `(`, `)` and `=` in identity fields become `?`.
    pub fn build_connect_string(&self, address: &Address, program: &str) -> String {
        let username = sanitize_cid(&whoami::username());
        let local_hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "localhost".to_string());
        let local_hostname = sanitize_cid(&local_hostname);
        let program = sanitize_cid(program);

        let mut connection_id_bytes = [0u8; 16];
        rand::thread_rng().fill(&mut connection_id_bytes);
        let connection_id =
            base64::engine::general_purpose::STANDARD.encode(connection_id_bytes);

        let protocol = match address.protocol {
            Protocol::Tcp => "tcp",
            Protocol::Tcps => "tcps",
        };
        let connect_data = if let Some(service_name) = &self.service_name {
            format!("(SERVICE_NAME={})", service_name)
        } else if let Some(sid) = &self.sid {
            format!("(SID={})", sid)
        } else {
            String::new()
        };

        format!(
            "(DESCRIPTION=(ADDRESS=(PROTOCOL={})(HOST={})(PORT={}))(CONNECT_DATA={}(CID=(PROGRAM={})(HOST={})(USER={}))(CONNECTION_ID={})))",
            protocol,
            address.host,
            address.port,
            connect_data,
            program,
            local_hostname,
            username,
            connection_id
        )
    }
}

fn parse_address(node: &DescriptorNode) -> Result<Address> {
    let host = node
        .find_value("HOST")
        .ok_or_else(|| Error::InvalidConnectString {
            message: "ADDRESS missing HOST".to_string(),
        })?
        .to_string();
    let port = node
        .find_value("PORT")
        .unwrap_or("1521")
        .parse::<u16>()
        .map_err(|_| Error::InvalidConnectString {
            message: "invalid PORT".to_string(),
        })?;
    let protocol = match node.find_value("PROTOCOL") {
        Some(p) if p.eq_ignore_ascii_case("tcps") => Protocol::Tcps,
        _ => Protocol::Tcp,
    };
    let proxy = match (node.find_value("HTTPS_PROXY"), node.find_value("HTTPS_PROXY_PORT")) {
        (Some(host), Some(port)) => {
            let port = port.parse::<u16>().map_err(|_| Error::InvalidConnectString {
                message: "invalid HTTPS_PROXY_PORT".to_string(),
            })?;
            Some((host.to_string(), port))
        }
        (Some(host), None) => Some((host.to_string(), 80)),
        _ => None,
    };
    Ok(Address {
        protocol,
        host,
        port,
        proxy,
    })
}

fn is_on(v: &str) -> bool {
    matches!(v.to_ascii_lowercase().as_str(), "on" | "yes" | "true" | "1")
}

fn parse_timeout(v: &str, default: Duration) -> Duration {
    // Accepts seconds or the "Nms" form.
    if let Some(ms) = v.strip_suffix("ms") {
        return ms
            .trim()
            .parse()
            .map(Duration::from_millis)
            .unwrap_or(default);
    }
    v.trim().parse().map(Duration::from_secs).unwrap_or(default)
}

fn sanitize_cid(value: &str) -> String {
    value
        .chars()
        .map(|c| if matches!(c, '(' | ')' | '=') { '?' } else { c })
        .collect()
}

/// One node of a parsed `(KEY=...)` descriptor.
#[derive(Debug)]
struct DescriptorNode {
    name: String,
    value: Option<String>,
    children: Vec<DescriptorNode>,
}

impl DescriptorNode {
    fn parse(text: &str) -> Result<Self> {
        let mut chars = text.char_indices().peekable();
        Self::parse_node(&mut chars)
    }

    fn parse_node(
        chars: &mut std::iter::Peekable<std::str::CharIndices>,
    ) -> Result<Self> {
        // Expect '('
        loop {
            match chars.next() {
                Some((_, '(')) => break,
                Some((_, c)) if c.is_whitespace() => continue,
                _ => {
                    return Err(Error::InvalidConnectString {
                        message: "expected '('".to_string(),
                    })
                }
            }
        }

        // Key up to '='
        let mut name = String::new();
        loop {
            match chars.next() {
                Some((_, '=')) => break,
                Some((_, c)) => name.push(c),
                None => {
                    return Err(Error::InvalidConnectString {
                        message: "unterminated key".to_string(),
                    })
                }
            }
        }
        let name = name.trim().to_string();

        // Either nested nodes or a scalar value up to the matching ')'.
        let mut children = Vec::new();
        let mut value = String::new();
        loop {
            match chars.peek() {
                Some((_, '(')) => {
                    children.push(Self::parse_node(chars)?);
                }
                Some((_, ')')) => {
                    chars.next();
                    break;
                }
                Some((_, _)) => {
                    if let Some((_, c)) = chars.next() {
                        value.push(c);
                    }
                }
                None => {
                    return Err(Error::InvalidConnectString {
                        message: format!("unterminated value for {}", name),
                    })
                }
            }
        }

        Ok(Self {
            name,
            value: if children.is_empty() {
                Some(value.trim().to_string())
            } else {
                None
            },
            children,
        })
    }

    fn find(&self, name: &str) -> Option<&DescriptorNode> {
        if self.name.eq_ignore_ascii_case(name) {
            return Some(self);
        }
        self.children
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    fn find_value(&self, name: &str) -> Option<&str> {
        self.children
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .and_then(|c| c.value.as_deref())
            .filter(|v| !v.is_empty())
    }
}

/// Process-wide cookie registry keyed by described endpoint.
fn cookie_registry() -> &'static Mutex<HashMap<String, ConnectionCookie>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, ConnectionCookie>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Fetch the cookie cached for an endpoint, if any.
pub fn cookie_for(key: &str) -> Option<ConnectionCookie> {
    cookie_registry()
        .lock()
        .ok()
        .and_then(|map| map.get(key).cloned())
}

/// Store a cookie for an endpoint.
pub fn store_cookie(key: &str, cookie: ConnectionCookie) {
    if let Ok(mut map) = cookie_registry().lock() {
        map.insert(key.to_string(), cookie);
    }
}

/// Result of a successful phase one.
pub struct EstablishedTransport {
    pub transport: Transport,
    pub caps: Capabilities,
    /// Address the session finally landed on, after any redirects.
    pub connected_address: Address,
}

/// Run phase one: dial, CONNECT/ACCEPT, redirects, refuse retries.
pub async fn establish(
    description: &Description,
    tls: &TlsParams,
    disable_oob: bool,
) -> Result<EstablishedTransport> {
    let candidates = description.candidate_addresses();
    if candidates.is_empty() {
        return Err(Error::InvalidConnectString {
            message: "no addresses to connect to".to_string(),
        });
    }

    let mut attempts = 0u32;
    let mut last_error = None;
    for _round in 0..=description.retry_count {
        for address in &candidates {
            attempts += 1;
            match try_address(description, address, tls, disable_oob).await {
                Ok(established) => {
                    info!(
                        "connected to {}:{} after {} attempt(s)",
                        established.connected_address.host,
                        established.connected_address.port,
                        attempts
                    );
                    return Ok(established);
                }
                Err(e) if is_retryable(&e) => {
                    warn!("connect attempt to {}:{} failed: {}", address.host, address.port, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        if description.retry_count > 0 {
            tokio::time::sleep(description.retry_delay).await;
        }
    }
    Err(last_error.unwrap_or(Error::ConnectionClosed))
}

fn is_retryable(error: &Error) -> bool {
    matches!(
        error,
        Error::ConnectionRefused { .. }
            | Error::ConnectionTimeout { .. }
            | Error::ConnectionClosed
            | Error::Io(_)
    )
}

async fn try_address(
    description: &Description,
    address: &Address,
    tls: &TlsParams,
    disable_oob: bool,
) -> Result<EstablishedTransport> {
    let mut address = address.clone();
    let mut redirect_data: Option<String> = None;

    // A redirect chain longer than this means the listeners are bouncing us
    // in a loop.
    for _hop in 0..4 {
        let proxy = address
            .proxy
            .as_ref()
            .map(|(host, port)| (host.as_str(), *port));
        let mut transport = Transport::connect(
            &address.host,
            address.port,
            proxy,
            description.tcp_connect_timeout,
        )
        .await?;

        if address.protocol == Protocol::Tcps {
            transport.wrap_tls(tls).await?;
        }

        let mut caps = Capabilities::new();
        let is_redirect = redirect_data.is_some();
        let connect_string = match redirect_data.take() {
            Some(s) => s,
            None => description.build_connect_string(&address, DRIVER_NAME),
        };

        match handshake(
            &mut transport,
            description,
            &connect_string,
            &mut caps,
            is_redirect,
            disable_oob,
        )
        .await?
        {
            HandshakeOutcome::Accepted { tls_reneg } => {
                if tls_reneg {
                    transport.renegotiate_tls(tls).await?;
                }
                return Ok(EstablishedTransport {
                    transport,
                    caps,
                    connected_address: address,
                });
            }
            HandshakeOutcome::Redirect { new_connect_string } => {
                let redirected = Description::parse(&new_connect_string)?;
                let new_address = redirected
                    .candidate_addresses()
                    .into_iter()
                    .next()
                    .ok_or_else(|| Error::protocol("redirect without an address"))?;
                debug!(
                    "redirected to {}:{}",
                    new_address.host, new_address.port
                );
                transport.disconnect().await;
                address = new_address;
                redirect_data = Some(new_connect_string);
            }
        }
    }
    Err(Error::protocol("too many redirects"))
}

enum HandshakeOutcome {
    Accepted { tls_reneg: bool },
    Redirect { new_connect_string: String },
}

async fn handshake(
    transport: &mut Transport,
    description: &Description,
    connect_string: &str,
    caps: &mut Capabilities,
    is_redirect: bool,
    disable_oob: bool,
) -> Result<HandshakeOutcome> {
    let connect_bytes = connect_string.as_bytes();
    // The cooperative engine cannot receive urgent data, so OOB is never
    // advertised; the knob is accepted for parity with blocking embedders.
    let _ = disable_oob;
    let msg = ConnectMessage {
        connect_string: connect_bytes,
        sdu: description.sdu,
        enable_oob: false,
    };
    let packet_flags = if is_redirect { TNS_PACKET_FLAG_REDIRECT } else { 0 };

    let send_data_separately = !msg.connect_data_in_packet();
    transport
        .send_message(TNS_PACKET_TYPE_CONNECT, packet_flags, &msg)
        .await?;
    if send_data_separately {
        transport.send_data(connect_bytes, 0).await?;
    }

    loop {
        let response = transport.read_packet().await?;
        match response.packet_type {
            TNS_PACKET_TYPE_ACCEPT => {
                let tls_reneg =
                    response.packet_flags & TNS_PACKET_FLAG_TLS_RENEG != 0;
                handle_accept(response, transport, caps)?;
                return Ok(HandshakeOutcome::Accepted { tls_reneg });
            }
            TNS_PACKET_TYPE_REFUSE => {
                return Err(refuse_error(response, description));
            }
            TNS_PACKET_TYPE_REDIRECT => {
                let new_connect_string = parse_redirect(transport, response).await?;
                return Ok(HandshakeOutcome::Redirect { new_connect_string });
            }
            TNS_PACKET_TYPE_RESEND => {
                transport
                    .send_message(TNS_PACKET_TYPE_CONNECT, packet_flags, &msg)
                    .await?;
                if send_data_separately {
                    transport.send_data(connect_bytes, 0).await?;
                }
            }
            other => {
                return Err(Error::UnexpectedPacketType {
                    expected: TNS_PACKET_TYPE_ACCEPT,
                    actual: other,
                });
            }
        }
    }
}

fn handle_accept(
    packet: Packet,
    transport: &mut Transport,
    caps: &mut Capabilities,
) -> Result<()> {
    let mut buf = ReadBuffer::from_bytes(packet.payload);

    let protocol_version = buf.read_u16_be()?;
    if protocol_version < TNS_VERSION_MIN_ACCEPTED {
        return Err(Error::ServerVersionNotSupported {
            min_version: TNS_VERSION_MIN_ACCEPTED,
        });
    }

    let protocol_options = buf.read_u16_be()?;
    buf.skip(10)?;

    let nsi_flags = buf.read_u8()?;
    if (nsi_flags & TNS_NSI_NA_REQUIRED) != 0 {
        return Err(Error::protocol("native network encryption is not supported"));
    }

    buf.skip(9)?;

    let sdu = buf.read_u32_be()?;
    caps.sdu = sdu;
    transport.set_sdu(sdu);

    let mut flags2: u32 = 0;
    if protocol_version >= TNS_VERSION_MIN_OOB_CHECK {
        buf.skip(5)?;
        flags2 = buf.read_u32_be()?;
    }

    caps.adjust_for_protocol(protocol_version, protocol_options, flags2);
    transport.set_large_sdu(caps.use_large_sdu());

    debug!(
        "accepted: protocol version {}, sdu {}, fast auth {}",
        protocol_version, sdu, caps.supports_fast_auth
    );
    Ok(())
}

fn refuse_error(packet: Packet, description: &Description) -> Error {
    let message = String::from_utf8_lossy(&packet.payload).to_string();
    let service = description
        .service_name
        .clone()
        .or_else(|| description.sid.clone())
        .unwrap_or_default();

    if message.contains("ERR=12514") {
        return Error::InvalidServiceName {
            service_name: service,
        };
    }
    if message.contains("ERR=12505") {
        return Error::InvalidSid { sid: service };
    }
    Error::ConnectionRefused { message }
}

/// Parse a REDIRECT payload: the new connect string, optionally followed by
/// a NUL and the original data. Zero-length redirects send the data in a
/// follow-up packet.
async fn parse_redirect(transport: &mut Transport, packet: Packet) -> Result<String> {
    let mut payload = packet.payload;
    if payload.len() <= 2 {
        let follow_up = transport.read_packet().await?;
        payload = follow_up.payload;
    } else {
        payload = payload.slice(2..);
    }
    let text = String::from_utf8_lossy(&payload);
    let new_connect_string = match text.split_once('\0') {
        Some((new, _original)) => new.to_string(),
        None => text.to_string(),
    };
    if new_connect_string.is_empty() {
        return Err(Error::protocol("empty redirect payload"));
    }
    Ok(new_connect_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_easy_connect() {
        let desc = Description::parse("dbhost:1522/ORCLPDB1").unwrap();
        let addr = &desc.address_lists[0].addresses[0];
        assert_eq!(addr.host, "dbhost");
        assert_eq!(addr.port, 1522);
        assert_eq!(desc.service_name.as_deref(), Some("ORCLPDB1"));

        let desc = Description::parse("dbhost/ORCL").unwrap();
        assert_eq!(desc.address_lists[0].addresses[0].port, 1521);

        let desc = Description::parse("tcps://secure-host:2484/SVC").unwrap();
        assert_eq!(
            desc.address_lists[0].addresses[0].protocol,
            Protocol::Tcps
        );
    }

    #[test]
    fn test_parse_full_descriptor() {
        let desc = Description::parse(
            "(DESCRIPTION=(RETRY_COUNT=3)(RETRY_DELAY=2)\
             (ADDRESS_LIST=(LOAD_BALANCE=on)\
              (ADDRESS=(PROTOCOL=tcp)(HOST=node1)(PORT=1521))\
              (ADDRESS=(PROTOCOL=tcps)(HOST=node2)(PORT=2484)))\
             (CONNECT_DATA=(SERVICE_NAME=sales.example.com)))",
        )
        .unwrap();

        assert_eq!(desc.retry_count, 3);
        assert_eq!(desc.retry_delay, Duration::from_secs(2));
        assert_eq!(desc.address_lists.len(), 1);
        let list = &desc.address_lists[0];
        assert!(list.load_balance);
        assert_eq!(list.addresses.len(), 2);
        assert_eq!(list.addresses[1].protocol, Protocol::Tcps);
        assert_eq!(desc.service_name.as_deref(), Some("sales.example.com"));
    }

    #[test]
    fn test_parse_descriptor_with_proxy_and_sid() {
        let desc = Description::parse(
            "(DESCRIPTION=(ADDRESS=(PROTOCOL=tcp)(HOST=db)(PORT=1521)\
             (HTTPS_PROXY=proxy.example.com)(HTTPS_PROXY_PORT=8080))\
             (CONNECT_DATA=(SID=XE)))",
        )
        .unwrap();
        let addr = &desc.address_lists[0].addresses[0];
        assert_eq!(
            addr.proxy,
            Some(("proxy.example.com".to_string(), 8080))
        );
        assert_eq!(desc.sid.as_deref(), Some("XE"));
        assert!(desc.service_name.is_none());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Description::parse("(DESCRIPTION=(ADDRESS=(HOST=x)").is_err());
        assert!(Description::parse("(DESCRIPTION=(CONNECT_DATA=(SERVICE_NAME=s)))").is_err());
        assert!(Description::parse("host:notaport/svc").is_err());
    }

    #[test]
    fn test_candidate_addresses_failover_order() {
        let desc = Description::parse(
            "(DESCRIPTION=\
             (ADDRESS=(PROTOCOL=tcp)(HOST=a)(PORT=1521))\
             (ADDRESS=(PROTOCOL=tcp)(HOST=b)(PORT=1521))\
             (CONNECT_DATA=(SERVICE_NAME=s)))",
        )
        .unwrap();
        let candidates = desc.candidate_addresses();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].host, "a");
        assert_eq!(candidates[1].host, "b");
    }

    #[test]
    fn test_connect_string_cid_sanitized() {
        let desc = Description::parse("h/svc").unwrap();
        let addr = desc.address_lists[0].addresses[0].clone();
        let cs = desc.build_connect_string(&addr, "my(evil)=prog");
        assert!(cs.contains("(PROGRAM=my?evil??prog)"));
        assert!(cs.contains("(SERVICE_NAME=svc)"));
        assert!(cs.contains("CONNECTION_ID="));
    }

    #[test]
    fn test_cookie_registry_round_trip() {
        let key = "unit-test-host:1521/svc";
        assert!(cookie_for(key).is_none());
        let cookie = ConnectionCookie {
            protocol_version: 319,
            populated: true,
            ..Default::default()
        };
        store_cookie(key, cookie);
        let cached = cookie_for(key).unwrap();
        assert!(cached.populated);
        assert_eq!(cached.protocol_version, 319);
    }
}
