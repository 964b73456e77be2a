//! Wire transport for probe exchanges
//!
//! One request primitive drives every probe attempt: dial the target
//! under the connection timeout, optionally wrap the stream in TLS
//! with certificate verification disabled, write the payload under the
//! send deadline, then read at most 1024 response bytes under the read
//! deadline. Every suspension point is bounded; on expiry the attempt
//! aborts and the probe loop moves on.

use std::net::IpAddr;
use std::sync::{Arc, OnceLock};

use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore, ServerName};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::trace;

use crate::config::ScanConfig;
use crate::error::{Result, VscanError};
use crate::probe::Protocol;
use crate::scanner::Target;

/// Maximum number of banner bytes retained from a response.
const MAX_RESPONSE_BYTES: usize = 1024;

/// Bytes received from one probe exchange and the TLS flag of the
/// connection that produced them.
#[derive(Debug)]
pub(crate) struct WireResponse {
    pub bytes: Vec<u8>,
    pub tls: bool,
}

/// Perform one request against the target. `use_tls` only applies to
/// TCP; a UDP exchange is always plaintext.
pub(crate) async fn request(
    target: &Target,
    use_tls: bool,
    payload: &[u8],
    config: &ScanConfig,
) -> Result<WireResponse> {
    trace!(target = %target, use_tls, payload_len = payload.len(), "probe request");
    match target.protocol {
        Protocol::Tcp => tcp_request(target, use_tls, payload, config).await,
        Protocol::Udp => udp_request(target, payload, config).await,
    }
}

async fn tcp_request(
    target: &Target,
    use_tls: bool,
    payload: &[u8],
    config: &ScanConfig,
) -> Result<WireResponse> {
    let stream = timeout(
        config.conn_timeout(),
        TcpStream::connect((target.host.as_str(), target.port)),
    )
    .await
    .map_err(|_| VscanError::timeout("connect", config.conn_timeout_secs))?
    .map_err(|e| VscanError::network(format!("connect {}: {}", target.address(), e)))?;

    if use_tls {
        let server_name = server_name(&target.host)?;
        let mut stream = timeout(
            config.conn_timeout(),
            tls_connector().connect(server_name, stream),
        )
        .await
        .map_err(|_| VscanError::timeout("tls handshake", config.conn_timeout_secs))?
        .map_err(|e| VscanError::network(format!("tls handshake {}: {}", target.address(), e)))?;
        exchange(&mut stream, payload, config, true).await
    } else {
        let mut stream = stream;
        exchange(&mut stream, payload, config, false).await
    }
}

async fn exchange<S>(
    stream: &mut S,
    payload: &[u8],
    config: &ScanConfig,
    tls: bool,
) -> Result<WireResponse>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if !payload.is_empty() {
        timeout(config.send_timeout(), stream.write_all(payload))
            .await
            .map_err(|_| VscanError::timeout("send", config.send_timeout_secs))?
            .map_err(|e| VscanError::network(format!("send: {}", e)))?;
    }

    let mut buffer = [0u8; MAX_RESPONSE_BYTES];
    let received = timeout(config.read_timeout(), stream.read(&mut buffer))
        .await
        .map_err(|_| VscanError::timeout("read", config.read_timeout_secs))?
        .map_err(|e| VscanError::network(format!("read: {}", e)))?;

    if received == 0 {
        return Err(VscanError::network("connection closed without data"));
    }

    Ok(WireResponse {
        bytes: buffer[..received].to_vec(),
        tls,
    })
}

async fn udp_request(target: &Target, payload: &[u8], config: &ScanConfig) -> Result<WireResponse> {
    let bind_addr = match target.host.parse::<IpAddr>() {
        Ok(IpAddr::V6(_)) => "[::]:0",
        _ => "0.0.0.0:0",
    };
    let socket = UdpSocket::bind(bind_addr)
        .await
        .map_err(|e| VscanError::network(format!("udp bind: {}", e)))?;

    timeout(
        config.conn_timeout(),
        socket.connect((target.host.as_str(), target.port)),
    )
    .await
    .map_err(|_| VscanError::timeout("connect", config.conn_timeout_secs))?
    .map_err(|e| VscanError::network(format!("connect {}: {}", target.address(), e)))?;

    if !payload.is_empty() {
        timeout(config.send_timeout(), socket.send(payload))
            .await
            .map_err(|_| VscanError::timeout("send", config.send_timeout_secs))?
            .map_err(|e| VscanError::network(format!("send: {}", e)))?;
    }

    let mut buffer = [0u8; MAX_RESPONSE_BYTES];
    let received = timeout(config.read_timeout(), socket.recv(&mut buffer))
        .await
        .map_err(|_| VscanError::timeout("read", config.read_timeout_secs))?
        .map_err(|e| VscanError::network(format!("read: {}", e)))?;

    if received == 0 {
        return Err(VscanError::network("empty datagram"));
    }

    Ok(WireResponse {
        bytes: buffer[..received].to_vec(),
        tls: false,
    })
}

/// Shared TLS client configuration with certificate verification
/// disabled.
fn tls_connector() -> TlsConnector {
    static TLS_CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();
    let config = TLS_CONFIG.get_or_init(|| {
        let mut root_store = RootCertStore::empty();
        root_store.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
            OwnedTrustAnchor::from_subject_spki_name_constraints(
                ta.subject,
                ta.spki,
                ta.name_constraints,
            )
        }));
        let mut config = ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(NoVerifier));
        Arc::new(config)
    });
    TlsConnector::from(config.clone())
}

struct NoVerifier;

impl rustls::client::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::Certificate,
        _intermediates: &[rustls::Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> std::result::Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}

fn server_name(host: &str) -> Result<ServerName> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        Ok(ServerName::IpAddress(ip))
    } else {
        ServerName::try_from(host)
            .map_err(|_| VscanError::network(format!("invalid server name {:?}", host)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn test_config() -> ScanConfig {
        ScanConfig::default()
            .with_conn_timeout(Duration::from_secs(2))
            .with_send_timeout(Duration::from_secs(2))
            .with_read_timeout(Duration::from_secs(1))
    }

    async fn banner_server(banner: &'static [u8]) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket.write_all(banner).await;
            }
        });
        port
    }

    #[tokio::test]
    async fn test_plaintext_banner_read() {
        let port = banner_server(b"SSH-2.0-OpenSSH_8.9\r\n").await;
        let target = Target::new("127.0.0.1", port, Protocol::Tcp);

        let response = request(&target, false, b"", &test_config()).await.unwrap();
        assert!(!response.tls);
        assert!(response.bytes.starts_with(b"SSH-2.0"));
    }

    #[tokio::test]
    async fn test_payload_is_written_before_read() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 64];
                if let Ok(received) = socket.read(&mut buf).await {
                    let _ = socket.write_all(&buf[..received]).await;
                }
            }
        });

        let target = Target::new("127.0.0.1", port, Protocol::Tcp);
        let response = request(&target, false, b"HELO\r\n", &test_config())
            .await
            .unwrap();
        assert_eq!(response.bytes, b"HELO\r\n".to_vec());
    }

    #[tokio::test]
    async fn test_read_deadline_expires() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            // accept and keep the connection open without writing
            let _socket = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let target = Target::new("127.0.0.1", port, Protocol::Tcp);
        let error = request(&target, false, b"", &test_config())
            .await
            .unwrap_err();
        assert!(matches!(error, VscanError::Timeout { .. }));
        assert!(error.is_recoverable());
    }

    #[tokio::test]
    async fn test_refused_connection_is_network_error() {
        // bind then drop to find a port that refuses connections
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let target = Target::new("127.0.0.1", port, Protocol::Tcp);
        let error = request(&target, false, b"", &test_config())
            .await
            .unwrap_err();
        assert!(error.is_recoverable());
    }

    #[tokio::test]
    async fn test_udp_exchange() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            if let Ok((received, peer)) = server.recv_from(&mut buf).await {
                let _ = server.send_to(&buf[..received], peer).await;
            }
        });

        let target = Target::new("127.0.0.1", port, Protocol::Udp);
        let response = request(&target, false, b"ping", &test_config())
            .await
            .unwrap();
        assert!(!response.tls);
        assert_eq!(response.bytes, b"ping".to_vec());
    }
}
