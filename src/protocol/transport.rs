//! Packet transport over TCP, optionally wrapped in TLS.
//!
//! The transport extracts whole TNS packets from the byte stream and splits
//! outbound requests into DATA packets bounded by the negotiated SDU. It also
//! dials through an HTTPS CONNECT proxy when the address carries one.

use crate::error::{Error, Result};
use crate::protocol::constants::*;
use crate::protocol::message::{write_packet_header, DataMessage, Message};
use crate::protocol::packet::{Packet, HEADER_SIZE};
use bytes::{Bytes, BytesMut};
use log::{debug, trace};
use rustls::pki_types::ServerName;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// TLS settings for `tcps` endpoints.
#[derive(Debug, Clone, Default)]
pub struct TlsParams {
    /// Skip certificate verification (`ssl_server_dn_match` disabled).
    pub danger_accept_invalid_certs: bool,
    /// Override the server name used for SNI and verification.
    pub server_name: Option<String>,
}

enum Stream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    /// Placeholder while the stream is being rewrapped.
    Detached,
}

impl Stream {
    fn as_io(&mut self) -> Result<&mut dyn AsyncStream> {
        match self {
            Stream::Plain(s) => Ok(s),
            Stream::Tls(s) => Ok(s.as_mut()),
            Stream::Detached => Err(Error::ConnectionClosed),
        }
    }
}

trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

/// Packet reader/writer for one server connection.
pub struct Transport {
    stream: Stream,
    host: String,
    port: u16,
    /// Whether packet headers use the 4-byte length form.
    use_large_sdu: bool,
    /// Negotiated maximum packet size.
    sdu: u32,
    /// Buffer for bytes of an incomplete packet.
    partial_buf: BytesMut,
}

impl Transport {
    /// Dial the endpoint, optionally tunnelling through an HTTPS proxy.
    pub async fn connect(
        host: &str,
        port: u16,
        proxy: Option<(&str, u16)>,
        timeout: Duration,
    ) -> Result<Self> {
        let (dial_host, dial_port) = proxy.unwrap_or((host, port));
        let addr = format!("{}:{}", dial_host, dial_port);

        let tcp_stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| Error::ConnectionTimeout {
                host: dial_host.to_string(),
                port: dial_port,
                timeout,
            })??;
        tcp_stream.set_nodelay(true)?;

        let mut transport = Self {
            stream: Stream::Plain(tcp_stream),
            host: host.to_string(),
            port,
            use_large_sdu: false,
            sdu: TNS_SDU_DEFAULT,
            partial_buf: BytesMut::new(),
        };

        if proxy.is_some() {
            transport.establish_proxy_tunnel().await?;
        }
        debug!("connected to {}:{}", host, port);
        Ok(transport)
    }

    /// Issue an HTTPS CONNECT request and require a 200 response.
    async fn establish_proxy_tunnel(&mut self) -> Result<()> {
        let request = format!("CONNECT {}:{} HTTP/1.0\r\n\r\n", self.host, self.port);
        let io = self.stream.as_io()?;
        io.write_all(request.as_bytes()).await?;
        io.flush().await?;

        let mut response = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let n = io.read(&mut byte).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            response.push(byte[0]);
            if response.ends_with(b"\r\n\r\n") {
                break;
            }
            if response.len() > 8192 {
                break;
            }
        }

        let text = String::from_utf8_lossy(&response);
        let ok = text.starts_with("HTTP/1.") && text[..text.len().min(16)].contains(" 200");
        if !ok {
            let status = text.lines().next().unwrap_or("").to_string();
            return Err(Error::ProxyFailure {
                host: self.host.clone(),
                port: self.port,
                message: status,
            });
        }
        Ok(())
    }

    /// Wrap the socket in TLS. Used for `tcps` endpoints after the plain
    /// connect, and again when the server requests renegotiation.
    pub async fn wrap_tls(&mut self, params: &TlsParams) -> Result<()> {
        let config = build_tls_config(params)?;
        let connector = TlsConnector::from(Arc::new(config));
        let name = params.server_name.clone().unwrap_or_else(|| self.host.clone());
        let server_name = ServerName::try_from(name.clone()).map_err(|_| Error::Tls {
            message: format!("invalid TLS server name '{}'", name),
        })?;

        let tcp = match std::mem::replace(&mut self.stream, Stream::Detached) {
            Stream::Plain(s) => s,
            Stream::Tls(s) => s.into_inner().0,
            Stream::Detached => return Err(Error::ConnectionClosed),
        };
        let tls = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| Error::Tls {
                message: e.to_string(),
            })?;
        self.stream = Stream::Tls(Box::new(tls));
        debug!("TLS established with {}:{}", self.host, self.port);
        Ok(())
    }

    /// Renegotiate TLS, as demanded by an ACCEPT packet with the TLS_RENEG
    /// flag (server-requested mTLS after the first hello).
    pub async fn renegotiate_tls(&mut self, params: &TlsParams) -> Result<()> {
        if !matches!(self.stream, Stream::Tls(_)) {
            return Err(Error::Tls {
                message: "renegotiation requested on a plain connection".to_string(),
            });
        }
        self.wrap_tls(params).await
    }

    /// Whether the connection is TLS-wrapped.
    pub fn is_tls(&self) -> bool {
        matches!(self.stream, Stream::Tls(_))
    }

    /// Set whether to use the 4-byte packet length form.
    pub fn set_large_sdu(&mut self, use_large_sdu: bool) {
        self.use_large_sdu = use_large_sdu;
    }

    /// Set the negotiated SDU.
    pub fn set_sdu(&mut self, sdu: u32) {
        self.sdu = sdu.clamp(TNS_SDU_DEFAULT, TNS_SDU_MAX);
    }

    /// The negotiated SDU.
    pub fn sdu(&self) -> u32 {
        self.sdu
    }

    /// Read one packet from the stream.
    pub async fn read_packet(&mut self) -> Result<Packet> {
        while self.partial_buf.len() < HEADER_SIZE {
            self.fill().await?;
        }

        let packet_len = if self.use_large_sdu {
            u32::from_be_bytes([
                self.partial_buf[0],
                self.partial_buf[1],
                self.partial_buf[2],
                self.partial_buf[3],
            ]) as usize
        } else {
            u16::from_be_bytes([self.partial_buf[0], self.partial_buf[1]]) as usize
        };
        if packet_len < HEADER_SIZE {
            return Err(Error::protocol(format!(
                "packet length {} below header size",
                packet_len
            )));
        }

        while self.partial_buf.len() < packet_len {
            self.fill().await?;
        }

        let packet_data = self.partial_buf.split_to(packet_len);
        let packet = Packet {
            packet_type: packet_data[4],
            packet_flags: packet_data[5],
            payload: Bytes::copy_from_slice(&packet_data[HEADER_SIZE..]),
        };
        trace!(
            "recv packet type={} flags={:#04x} len={}",
            packet.packet_type,
            packet.packet_flags,
            packet_len
        );
        Ok(packet)
    }

    async fn fill(&mut self) -> Result<()> {
        let mut buf = [0u8; 4096];
        let n = self.stream.as_io()?.read(&mut buf).await?;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }
        self.partial_buf.extend_from_slice(&buf[..n]);
        Ok(())
    }

    /// Write one pre-assembled packet.
    pub async fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        trace!(
            "send packet type={} flags={:#04x} len={}",
            packet.packet_type,
            packet.packet_flags,
            packet.total_size()
        );
        let bytes = packet.to_bytes(self.use_large_sdu);
        let io = self.stream.as_io()?;
        io.write_all(&bytes).await?;
        io.flush().await?;
        Ok(())
    }

    /// Send a message as a single packet of the given type.
    pub async fn send_message<M: Message>(
        &mut self,
        packet_type: u8,
        packet_flags: u8,
        msg: &M,
    ) -> Result<()> {
        let payload_size = msg.wire_size();
        let total_size = HEADER_SIZE + payload_size;

        let mut buf = Vec::with_capacity(total_size);
        write_packet_header(&mut buf, packet_type, packet_flags, total_size, self.use_large_sdu);
        msg.write_to(&mut buf)?;

        trace!("send packet type={} len={}", packet_type, total_size);
        let io = self.stream.as_io()?;
        io.write_all(&buf).await?;
        io.flush().await?;
        Ok(())
    }

    /// Send a DATA message, splitting the payload across packets at the SDU.
    pub async fn send_data_message<M: DataMessage>(&mut self, msg: &M) -> Result<()> {
        let mut body = Vec::with_capacity(msg.wire_size());
        msg.write_to(&mut body)?;
        self.send_data(&body, msg.data_flags()).await
    }

    /// Send raw message bytes as one or more DATA packets.
    ///
    /// Every DATA packet carries its own 2-byte data flags; continuation
    /// packets of a split request carry zero flags.
    pub async fn send_data(&mut self, body: &[u8], data_flags: u16) -> Result<()> {
        let max_chunk = self.sdu as usize - HEADER_SIZE - 2;
        let mut offset = 0;
        let mut flags = data_flags;
        loop {
            let chunk_len = (body.len() - offset).min(max_chunk);
            let total_size = HEADER_SIZE + 2 + chunk_len;
            let mut buf = Vec::with_capacity(total_size);
            write_packet_header(
                &mut buf,
                TNS_PACKET_TYPE_DATA,
                0,
                total_size,
                self.use_large_sdu,
            );
            buf.extend_from_slice(&flags.to_be_bytes());
            buf.extend_from_slice(&body[offset..offset + chunk_len]);

            trace!("send DATA packet len={} flags={:#06x}", total_size, flags);
            let io = self.stream.as_io()?;
            io.write_all(&buf).await?;
            io.flush().await?;

            offset += chunk_len;
            if offset >= body.len() {
                break;
            }
            flags = 0;
        }
        Ok(())
    }

    /// Send a marker packet of the given type.
    pub async fn send_marker(&mut self, marker_type: u8) -> Result<()> {
        let payload = Bytes::copy_from_slice(&[1, 0, marker_type]);
        let packet = Packet::new(TNS_PACKET_TYPE_MARKER, payload);
        self.write_packet(&packet).await
    }

    /// Shut down the connection. Errors are ignored; the peer may already
    /// be gone.
    pub async fn disconnect(&mut self) {
        if let Ok(io) = self.stream.as_io() {
            let _ = io.shutdown().await;
        }
        self.stream = Stream::Detached;
    }
}

fn build_tls_config(params: &TlsParams) -> Result<rustls::ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls {
            message: e.to_string(),
        })?;

    let config = if params.danger_accept_invalid_certs {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(danger::NoVerifier::new(provider)))
            .with_no_client_auth()
    } else {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(roots).with_no_client_auth()
    };
    Ok(config)
}

mod danger {
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use std::sync::Arc;

    /// Certificate verifier that accepts any chain. Selected only when the
    /// caller explicitly disables server DN matching.
    #[derive(Debug)]
    pub struct NoVerifier {
        provider: Arc<CryptoProvider>,
    }

    impl NoVerifier {
        pub fn new(provider: Arc<CryptoProvider>) -> Self {
            Self { provider }
        }
    }

    impl ServerCertVerifier for NoVerifier {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &rustls::DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            verify_tls12_signature(
                message,
                cert,
                dss,
                &self.provider.signature_verification_algorithms,
            )
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &rustls::DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            verify_tls13_signature(
                message,
                cert,
                dss,
                &self.provider.signature_verification_algorithms,
            )
        }

        fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
            self.provider
                .signature_verification_algorithms
                .supported_schemes()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, String, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr.ip().to_string(), addr.port())
    }

    #[tokio::test]
    async fn test_read_packet_legacy_header() {
        let (listener, host, port) = listener().await;
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            // 12-byte RESEND packet with legacy header
            let bytes = [0u8, 12, 0, 0, TNS_PACKET_TYPE_RESEND, 0, 0, 0, 1, 2, 3, 4];
            sock.write_all(&bytes).await.unwrap();
        });

        let mut transport = Transport::connect(&host, port, None, Duration::from_secs(5))
            .await
            .unwrap();
        let packet = transport.read_packet().await.unwrap();
        assert_eq!(packet.packet_type, TNS_PACKET_TYPE_RESEND);
        assert_eq!(packet.payload.as_ref(), &[1, 2, 3, 4]);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_read_packet_split_delivery() {
        let (listener, host, port) = listener().await;
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let bytes = [0u8, 11, 0, 0, TNS_PACKET_TYPE_DATA, 0, 0, 0, 0x12, 0x34, 9];
            sock.write_all(&bytes[..5]).await.unwrap();
            sock.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            sock.write_all(&bytes[5..]).await.unwrap();
        });

        let mut transport = Transport::connect(&host, port, None, Duration::from_secs(5))
            .await
            .unwrap();
        let packet = transport.read_packet().await.unwrap();
        assert_eq!(packet.packet_type, TNS_PACKET_TYPE_DATA);
        assert_eq!(packet.data_flags(), 0x1234);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_data_splits_at_sdu() {
        let (listener, host, port) = listener().await;
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 65536];
            loop {
                match sock.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => received.extend_from_slice(&buf[..n]),
                }
            }
            received
        });

        let mut transport = Transport::connect(&host, port, None, Duration::from_secs(5))
            .await
            .unwrap();
        // Minimum SDU; a 20000-byte body must split into three packets.
        let body = vec![0x5au8; 20000];
        transport.send_data(&body, TNS_DATA_FLAGS_END_OF_REQUEST).await.unwrap();
        transport.disconnect().await;

        let received = server.await.unwrap();
        let max_payload = TNS_SDU_DEFAULT as usize - HEADER_SIZE - 2;
        let expected_packets = body.len().div_ceil(max_payload);
        assert_eq!(expected_packets, 3);
        assert_eq!(received.len(), body.len() + expected_packets * (HEADER_SIZE + 2));

        // First packet carries the request flags, continuations carry zero.
        assert_eq!(received[4], TNS_PACKET_TYPE_DATA);
        let first_flags = u16::from_be_bytes([received[8], received[9]]);
        assert_eq!(first_flags, TNS_DATA_FLAGS_END_OF_REQUEST);
        let second_start = HEADER_SIZE + 2 + max_payload;
        let second_flags =
            u16::from_be_bytes([received[second_start + 8], received[second_start + 9]]);
        assert_eq!(second_flags, 0);
    }

    #[tokio::test]
    async fn test_proxy_tunnel_rejected() {
        let (listener, host, port) = listener().await;
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = sock.read(&mut buf).await.unwrap();
            sock.write_all(b"HTTP/1.0 403 Forbidden\r\n\r\n").await.unwrap();
        });

        let result = Transport::connect(
            "db.internal",
            1521,
            Some((host.as_str(), port)),
            Duration::from_secs(5),
        )
        .await;
        assert!(matches!(result, Err(Error::ProxyFailure { .. })));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        // RFC 5737 TEST-NET address; nothing answers there. Some systems
        // reject the route immediately instead of timing out.
        let result =
            Transport::connect("192.0.2.1", 1521, None, Duration::from_millis(50)).await;
        assert!(matches!(
            result,
            Err(Error::ConnectionTimeout { .. }) | Err(Error::Io(_))
        ));
    }
}
