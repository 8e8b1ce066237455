//! Connection intent: everything needed to reach one store instance.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::NegotiationError;
use crate::types::ProtocolVersion;

/// Default server port.
pub const DEFAULT_PORT: u16 = 6379;

/// Default limit on TCP connect plus TLS handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Username sent with `HELLO ... AUTH` when the credential has none.
pub const DEFAULT_USERNAME: &str = "default";

/// Password, optionally scoped to an ACL user.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    username: Option<String>,
    password: String,
}

impl Credential {
    /// A password for the default user.
    pub fn password(password: impl Into<String>) -> Self {
        Self {
            username: None,
            password: password.into(),
        }
    }

    /// Scope the password to an ACL user.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// The ACL username, if any.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// The password.
    pub fn secret(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// The inputs needed to reach one instance.
///
/// Built with [`ConnectionIntent::new`] and the `with_*` methods, then handed
/// by value to [`negotiate`](crate::negotiate). Nothing mutates it afterwards.
#[derive(Debug, Clone)]
pub struct ConnectionIntent {
    host: String,
    port: u16,
    db: u32,
    credential: Option<Credential>,
    use_tls: bool,
    tls_verify: bool,
    ca_bundle_path: Option<PathBuf>,
    use_legacy_protocol: bool,
    connect_timeout: Duration,
    command_timeout: Option<Duration>,
}

impl ConnectionIntent {
    /// Plaintext, unauthenticated, db 0, modern protocol.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            db: 0,
            credential: None,
            use_tls: false,
            tls_verify: true,
            ca_bundle_path: None,
            use_legacy_protocol: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: None,
        }
    }

    /// Set the database index.
    pub fn with_db(mut self, db: u32) -> Self {
        self.db = db;
        self
    }

    /// Set the credential.
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Enable or disable TLS.
    pub fn with_tls(mut self, enabled: bool) -> Self {
        self.use_tls = enabled;
        self
    }

    /// Enable or disable certificate and hostname verification.
    ///
    /// Only consulted when TLS is enabled.
    pub fn with_tls_verify(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Trust the CAs in this PEM bundle instead of the bundled roots.
    pub fn with_ca_bundle(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_bundle_path = Some(path.into());
        self
    }

    /// Request the legacy protocol at handshake time.
    pub fn with_legacy_protocol(mut self, legacy: bool) -> Self {
        self.use_legacy_protocol = legacy;
        self
    }

    /// Limit on TCP connect plus TLS handshake.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Limit on every round-trip, `None` to wait indefinitely.
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn db(&self) -> u32 {
        self.db
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn use_tls(&self) -> bool {
        self.use_tls
    }

    pub fn tls_verify(&self) -> bool {
        self.tls_verify
    }

    /// The CA bundle path, treating an empty path as absent.
    pub fn ca_bundle_path(&self) -> Option<&Path> {
        self.ca_bundle_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    pub fn use_legacy_protocol(&self) -> bool {
        self.use_legacy_protocol
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout
    }

    /// Protocol version requested at handshake time.
    pub fn requested_protocol(&self) -> ProtocolVersion {
        if self.use_legacy_protocol {
            ProtocolVersion::Resp2
        } else {
            ProtocolVersion::Resp3
        }
    }

    /// `host:port`, with IPv6 literals bracketed.
    pub fn endpoint(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Check the constraints that do not need the network.
    pub fn validate(&self) -> Result<(), NegotiationError> {
        if self.host.trim().is_empty() {
            return Err(NegotiationError::InvalidIntent("host is empty".to_string()));
        }
        if self.host.chars().any(char::is_whitespace) {
            return Err(NegotiationError::InvalidIntent(format!(
                "host {:?} contains whitespace",
                self.host
            )));
        }
        if self.port == 0 {
            return Err(NegotiationError::InvalidIntent(
                "port must be between 1 and 65535".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for ConnectionIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.endpoint(), self.db)
    }
}
