//! Common types for kvsweep-session.

use std::fmt;
use std::path::PathBuf;

use bytes::Bytes;
use serde::{Serialize, Serializer};

use crate::protocol::{Value, ValueExt};

/// Wire protocol version spoken on a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ProtocolVersion {
    /// RESP2, understood by every server and most proxies.
    Resp2,
    /// RESP3, negotiated with `HELLO 3`.
    #[default]
    Resp3,
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::Resp2 => write!(f, "RESP2"),
            ProtocolVersion::Resp3 => write!(f, "RESP3"),
        }
    }
}

/// Where the trust anchors of a verified TLS session come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TrustAnchor {
    /// The bundled Mozilla root set (`webpki-roots`).
    Bundled,
    /// A PEM bundle read from disk.
    CaBundle(PathBuf),
}

/// Transport security actually in effect on a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TransportSecurity {
    /// No encryption.
    Plaintext,
    /// TLS with chain and hostname verification.
    Tls(TrustAnchor),
    /// TLS without any verification of the server identity.
    TlsUnverified,
}

impl TransportSecurity {
    /// Returns true if traffic is encrypted.
    pub fn is_encrypted(&self) -> bool {
        !matches!(self, TransportSecurity::Plaintext)
    }
}

impl fmt::Display for TransportSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportSecurity::Plaintext => write!(f, "plaintext"),
            TransportSecurity::Tls(TrustAnchor::Bundled) => write!(f, "tls (bundled roots)"),
            TransportSecurity::Tls(TrustAnchor::CaBundle(path)) => {
                write!(f, "tls (ca bundle {})", path.display())
            }
            TransportSecurity::TlsUnverified => write!(f, "tls (UNVERIFIED)"),
        }
    }
}

/// Security-relevant condition of an established session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionWarning {
    /// The server certificate and hostname were not checked.
    TlsVerificationDisabled,
    /// The session speaks the legacy protocol.
    LegacyProtocol,
}

impl fmt::Display for SessionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionWarning::TlsVerificationDisabled => {
                write!(f, "TLS certificate verification is disabled; the server identity is not authenticated")
            }
            SessionWarning::LegacyProtocol => write!(f, "session uses the legacy RESP2 protocol"),
        }
    }
}

/// Server details reported by `HELLO`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    pub server: Option<String>,
    pub version: Option<String>,
    pub mode: Option<String>,
    pub role: Option<String>,
}

impl ServerInfo {
    /// Extract the known fields from a `HELLO` reply map.
    pub(crate) fn from_hello(entries: &[(Value, Value)]) -> Self {
        let mut info = ServerInfo::default();
        for (name, value) in entries {
            let Some(name) = name.as_text() else { continue };
            let slot = match name.as_str() {
                "server" => &mut info.server,
                "version" => &mut info.version,
                "mode" => &mut info.mode,
                "role" => &mut info.role,
                _ => continue,
            };
            *slot = value.as_text();
        }
        info
    }
}

/// A key as the store holds it: a binary-safe byte string.
///
/// Displayed as lossy UTF-8; the original bytes are what gets sent back to
/// the store.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Bytes);

impl Key {
    /// Create a key from raw bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The key as text, replacing invalid UTF-8.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({:?})", String::from_utf8_lossy(&self.0))
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self(Bytes::from(s))
    }
}

impl From<Vec<u8>> for Key {
    fn from(v: Vec<u8>) -> Self {
        Self(Bytes::from(v))
    }
}

impl From<Bytes> for Key {
    fn from(b: Bytes) -> Self {
        Self(b)
    }
}

impl PartialEq<str> for Key {
    fn eq(&self, other: &str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl PartialEq<&str> for Key {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from_utf8_lossy(&self.0))
    }
}
