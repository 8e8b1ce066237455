//! Byte transport under a session: plain TCP or TLS over TCP.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

/// A connected stream, encrypted or not.
pub enum Transport {
    /// Plain TCP stream.
    Tcp(TcpStream),
    /// TLS stream.
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Transport::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

pub mod tls {
    //! TLS client policy: which server identities are accepted.

    use std::fs::File;
    use std::io::{self, BufReader};
    use std::path::Path;
    use std::sync::Arc;

    use tokio::net::TcpStream;
    use tokio_rustls::TlsConnector;
    use tokio_rustls::client::TlsStream;
    use tokio_rustls::rustls::client::danger::{
        HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
    };
    use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use tokio_rustls::rustls::{
        self, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
    };

    use crate::types::{TransportSecurity, TrustAnchor};

    /// A ready-to-use TLS connector plus the security level it provides.
    #[derive(Clone)]
    pub struct TlsPolicy {
        connector: TlsConnector,
        security: TransportSecurity,
    }

    impl TlsPolicy {
        /// Verify the chain against `anchor` and the hostname against the intent host.
        ///
        /// Fails if a CA bundle is unreadable or holds no usable certificate.
        pub fn verified(anchor: TrustAnchor) -> io::Result<Self> {
            let roots = trust_roots(&anchor)?;

            let config = ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth();

            Ok(Self {
                connector: TlsConnector::from(Arc::new(config)),
                security: TransportSecurity::Tls(anchor),
            })
        }

        /// Accept any certificate for any name.
        pub fn insecure() -> Self {
            let config = ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerification))
                .with_no_client_auth();

            Self {
                connector: TlsConnector::from(Arc::new(config)),
                security: TransportSecurity::TlsUnverified,
            }
        }

        /// Security level of sessions opened with this policy.
        pub fn security(&self) -> &TransportSecurity {
            &self.security
        }

        /// Run the TLS handshake over an established TCP stream.
        pub async fn connect(
            &self,
            stream: TcpStream,
            host: &str,
        ) -> io::Result<TlsStream<TcpStream>> {
            let name = ServerName::try_from(host.to_string()).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("invalid server name {host:?}"),
                )
            })?;
            self.connector.connect(name, stream).await
        }
    }

    fn trust_roots(anchor: &TrustAnchor) -> io::Result<RootCertStore> {
        match anchor {
            TrustAnchor::Bundled => Ok(RootCertStore {
                roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
            }),
            TrustAnchor::CaBundle(path) => load_ca_bundle(path),
        }
    }

    fn load_ca_bundle(path: &Path) -> io::Result<RootCertStore> {
        let file = File::open(path).map_err(|e| {
            io::Error::new(e.kind(), format!("cannot read CA bundle {}: {e}", path.display()))
        })?;
        let certs = rustls_pemfile::certs(&mut BufReader::new(file))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("malformed CA bundle {}: {e}", path.display()),
                )
            })?;

        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(certs);
        if added == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "CA bundle {} contains no usable certificates ({ignored} ignored)",
                    path.display()
                ),
            ));
        }
        tracing::debug!(path = %path.display(), added, ignored, "loaded CA bundle");
        Ok(roots)
    }

    /// Describe a handshake failure caused by the server identity, if it was one.
    ///
    /// Anything else (reset, timeout, protocol garbage) returns `None` and is a
    /// transport failure.
    pub fn verification_failure(err: &io::Error) -> Option<String> {
        let inner = err.get_ref()?.downcast_ref::<rustls::Error>()?;
        match inner {
            rustls::Error::InvalidCertificate(_)
            | rustls::Error::NoCertificatesPresented
            | rustls::Error::UnsupportedNameType => Some(inner.to_string()),
            _ => None,
        }
    }

    #[derive(Debug)]
    struct NoVerification;

    impl ServerCertVerifier for NoVerification {
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
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            vec![
                SignatureScheme::ECDSA_NISTP256_SHA256,
                SignatureScheme::ECDSA_NISTP384_SHA384,
                SignatureScheme::ED25519,
                SignatureScheme::RSA_PSS_SHA256,
                SignatureScheme::RSA_PSS_SHA384,
                SignatureScheme::RSA_PSS_SHA512,
                SignatureScheme::RSA_PKCS1_SHA256,
                SignatureScheme::RSA_PKCS1_SHA384,
                SignatureScheme::RSA_PKCS1_SHA512,
            ]
        }
    }

}
