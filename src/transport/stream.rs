//! Physical addresses, TCP dialing and the TLS client handshake.

use std::fmt;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName};
use tokio_rustls::rustls::{self, ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::config::{ConnectionConfig, TlsConfig};
use crate::error::{Result, RntbdError};

/// Bidirectional byte stream a connection runs over.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

/// Type-erased stream: TLS over TCP in production, in-memory pipes in tests.
pub type BoxedStream = Box<dyn AsyncStream>;

const SCHEME: &str = "rntbd://";

/// Address of one replica: `rntbd://host:port/replica/path/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhysicalAddress {
    host: String,
    port: u16,
    path: String,
}

impl PhysicalAddress {
    pub fn new(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            path: path.into(),
        }
    }

    /// Parse `rntbd://host:port[/path]`. IPv6 hosts use brackets.
    ///
    /// # Example
    ///
    /// ```
    /// use rntbd_client::PhysicalAddress;
    ///
    /// let address = PhysicalAddress::parse("rntbd://replica-1.local:14330/apps/a/services/b/").unwrap();
    /// assert_eq!(address.host(), "replica-1.local");
    /// assert_eq!(address.port(), 14330);
    /// assert_eq!(address.path(), "/apps/a/services/b/");
    /// assert_eq!(address.pool_key(), "replica-1.local:14330");
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = |reason: &str| RntbdError::Protocol(format!("invalid address '{}': {}", text, reason));

        let rest = text
            .get(..SCHEME.len())
            .filter(|s| s.eq_ignore_ascii_case(SCHEME))
            .map(|_| &text[SCHEME.len()..])
            .ok_or_else(|| invalid("expected rntbd:// scheme"))?;

        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, ""),
        };

        let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
            let end = bracketed.find(']').ok_or_else(|| invalid("unterminated IPv6 host"))?;
            let port = bracketed[end + 1..]
                .strip_prefix(':')
                .ok_or_else(|| invalid("missing port"))?;
            (&bracketed[..end], port)
        } else {
            authority
                .rsplit_once(':')
                .ok_or_else(|| invalid("missing port"))?
        };

        if host.is_empty() {
            return Err(invalid("empty host"));
        }
        let port = port.parse().map_err(|_| invalid("bad port"))?;

        Ok(Self::new(host, port, path))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Replica path, sent with every request.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Key connections are grouped under: `host:port`.
    pub fn pool_key(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for PhysicalAddress {
    type Err = RntbdError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", SCHEME, self.pool_key(), self.path)
    }
}

/// Resolve `host:port` to the first address.
pub(crate) async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| RntbdError::Resolve(format!("{}:{}", host, port)))
}

/// Connect and apply socket options.
pub(crate) async fn connect_tcp(addr: SocketAddr, keepalive: Option<Duration>) -> Result<TcpStream> {
    let stream = TcpStream::connect(addr).await?;
    configure_socket(&stream, keepalive)?;
    Ok(stream)
}

fn configure_socket(stream: &TcpStream, keepalive: Option<Duration>) -> Result<()> {
    stream.set_nodelay(true)?;

    if let Some(interval) = keepalive {
        let socket = socket2::SockRef::from(stream);
        let keepalive = socket2::TcpKeepalive::new().with_time(interval);
        socket.set_tcp_keepalive(&keepalive)?;
    }

    Ok(())
}

/// Keep-alive interval to apply, if keep-alive is enabled.
pub(crate) fn keepalive_interval(config: &ConnectionConfig) -> Option<Duration> {
    config.keepalive.then(|| config.keepalive_interval())
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = std::fs::File::open(path).map_err(|e| {
        RntbdError::Tls(format!("failed to open CA file {}: {}", path.display(), e))
    })?;
    let mut reader = BufReader::new(file);

    let certs: Vec<_> = rustls_pemfile::certs(&mut reader)
        .filter_map(|r| r.ok())
        .collect();

    if certs.is_empty() {
        return Err(RntbdError::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }

    Ok(certs)
}

/// Build the TLS connector, pinned to TLS 1.2.
pub(crate) fn tls_connector(config: &TlsConfig) -> Result<TlsConnector> {
    let builder = ClientConfig::builder_with_protocol_versions(&[&rustls::version::TLS12]);

    let client_config = if config.accept_invalid_certificates {
        tracing::warn!("TLS certificate verification is disabled");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(InsecureVerifier))
            .with_no_client_auth()
    } else {
        let mut root_store = RootCertStore::empty();
        match &config.ca_cert_path {
            Some(path) => {
                for cert in load_certs(path)? {
                    root_store
                        .add(cert)
                        .map_err(|e| RntbdError::Tls(format!("failed to add CA cert: {}", e)))?;
                }
            }
            None => root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
        }
        builder
            .with_root_certificates(root_store)
            .with_no_client_auth()
    };

    Ok(TlsConnector::from(Arc::new(client_config)))
}

/// Run the client handshake against `server_name`.
pub(crate) async fn wrap_client<S>(
    connector: TlsConnector,
    stream: S,
    server_name: &str,
) -> Result<tokio_rustls::client::TlsStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let domain = ServerName::try_from(server_name.to_string())
        .map_err(|_| RntbdError::Tls(format!("invalid server name: {}", server_name)))?;

    connector
        .connect(domain, stream)
        .await
        .map_err(|e| RntbdError::Tls(format!("TLS handshake failed: {}", e)))
}

#[derive(Debug)]
struct InsecureVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
