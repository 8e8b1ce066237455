//! Session negotiation and the request/response channel it produces.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

use crate::error::{CommandError, NegotiationError, ProtocolError, Result};
use crate::intent::{ConnectionIntent, DEFAULT_USERNAME};
use crate::protocol::{self, ReplyDecoder, Value, ValueExt};
use crate::transport::Transport;
use crate::transport::tls::{self, TlsPolicy};
use crate::types::{
    Key, ProtocolVersion, ServerInfo, SessionWarning, TransportSecurity, TrustAnchor,
};

/// Client name announced with `HELLO ... SETNAME`.
pub const CLIENT_NAME: &str = "kvsweep";

/// One framed request/response stream.
struct Connection {
    stream: Transport,
    decoder: ReplyDecoder,
    timeout: Option<Duration>,
    broken: bool,
}

impl Connection {
    fn new(stream: Transport, timeout: Option<Duration>) -> Self {
        Self {
            stream,
            decoder: ReplyDecoder::new(),
            timeout,
            broken: false,
        }
    }

    /// Send one command and wait for its reply.
    ///
    /// Error replies become [`CommandError::Server`]. Any fatal error marks the
    /// connection broken and every later call fails with [`CommandError::Closed`].
    async fn call<A: AsRef<[u8]>>(&mut self, args: &[A]) -> Result<Value> {
        if self.broken {
            return Err(CommandError::Closed);
        }

        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.round_trip(args)).await {
                Ok(result) => result,
                Err(_) => Err(CommandError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no reply within {limit:?}"),
                ))),
            },
            None => self.round_trip(args).await,
        };

        match result {
            Ok(value) => match protocol::server_message(&value) {
                Some(message) => Err(CommandError::Server(message)),
                None => Ok(value),
            },
            Err(e) => {
                if e.is_fatal() {
                    self.broken = true;
                }
                Err(e)
            }
        }
    }

    async fn round_trip<A: AsRef<[u8]>>(&mut self, args: &[A]) -> Result<Value> {
        let packed = protocol::pack_command(args);
        self.stream.write_all(&packed).await?;
        self.stream.flush().await?;

        loop {
            match protocol::read_value(&mut self.decoder, &mut self.stream).await? {
                Value::Push { kind, data } => {
                    trace!("Ignoring {:?} push with {} item(s)", kind, data.len());
                }
                value => return Ok(value),
            }
        }
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.broken = true;
        self.stream.shutdown().await
    }
}

/// A live, authenticated channel to one store instance.
///
/// Owned by exactly one caller and used sequentially. Once a transport error
/// occurs the session is broken for good; negotiate a new one.
pub struct Session {
    conn: Connection,
    endpoint: String,
    db: u32,
    protocol: ProtocolVersion,
    security: TransportSecurity,
    server_info: Option<ServerInfo>,
    warnings: Vec<SessionWarning>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint)
            .field("db", &self.db)
            .field("protocol", &self.protocol)
            .field("security", &self.security)
            .field("broken", &self.conn.broken)
            .finish()
    }
}

impl Session {
    /// `host:port` this session is connected to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Selected database index.
    pub fn db(&self) -> u32 {
        self.db
    }

    /// Protocol version in effect.
    pub fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }

    /// Transport security in effect.
    pub fn security(&self) -> &TransportSecurity {
        &self.security
    }

    /// Server details, when the handshake reported them.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// Security-relevant conditions of this session.
    pub fn warnings(&self) -> &[SessionWarning] {
        &self.warnings
    }

    /// Returns true if the server identity was not verified.
    pub fn is_insecure(&self) -> bool {
        self.security == TransportSecurity::TlsUnverified
    }

    /// Returns true once a transport failure has made the session unusable.
    pub fn is_broken(&self) -> bool {
        self.conn.broken
    }

    /// Liveness probe.
    pub async fn ping(&mut self) -> Result<()> {
        match self.conn.call(&["PING"]).await? {
            ref v if is_pong(v) => Ok(()),
            other => Err(unexpected("PING", &other)),
        }
    }

    /// Value of one key, `None` if absent.
    pub async fn get(&mut self, key: impl AsRef<[u8]>) -> Result<Option<Bytes>> {
        let args: [&[u8]; 2] = [b"GET", key.as_ref()];
        match self.conn.call(&args).await? {
            Value::BulkString(bytes) => Ok(Some(Bytes::from(bytes))),
            v if v.is_null() => Ok(None),
            other => Err(unexpected("GET", &other)),
        }
    }

    /// Set one key.
    pub async fn set(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        let args: [&[u8]; 3] = [b"SET", key.as_ref(), value.as_ref()];
        match self.conn.call(&args).await? {
            Value::Okay => Ok(()),
            other => Err(unexpected("SET", &other)),
        }
    }

    /// Delete one literal key. Returns false if it did not exist.
    pub async fn delete_key(&mut self, key: impl AsRef<[u8]>) -> Result<bool> {
        let args: [&[u8]; 2] = [b"DEL", key.as_ref()];
        match self.conn.call(&args).await? {
            Value::Int(n) => Ok(n > 0),
            other => Err(unexpected("DEL", &other)),
        }
    }

    /// Number of keys in the selected database.
    pub async fn dbsize(&mut self) -> Result<u64> {
        match self.conn.call(&["DBSIZE"]).await? {
            Value::Int(n) if n >= 0 => Ok(n as u64),
            other => Err(unexpected("DBSIZE", &other)),
        }
    }

    /// Remove every key in the selected database.
    pub async fn flush_db(&mut self) -> Result<()> {
        match self.conn.call(&["FLUSHDB"]).await? {
            Value::Okay => Ok(()),
            other => Err(unexpected("FLUSHDB", &other)),
        }
    }

    /// One `SCAN` step. Returns the next cursor and the keys of this step.
    pub async fn scan_page(
        &mut self,
        cursor: u64,
        pattern: &[u8],
        count: usize,
    ) -> Result<(u64, Vec<Key>)> {
        let cursor = cursor.to_string();
        let count = count.max(1).to_string();
        let args: [&[u8]; 6] = [
            b"SCAN",
            cursor.as_bytes(),
            b"MATCH",
            pattern,
            b"COUNT",
            count.as_bytes(),
        ];
        let reply = self.conn.call(&args).await?;
        parse_scan_reply(reply)
    }

    /// Release the session.
    pub async fn close(mut self) {
        if let Err(e) = self.conn.shutdown().await {
            trace!("Shutdown of {} failed: {}", self.endpoint, e);
        }
        debug!("Closed session to {}", self.endpoint);
    }
}

fn is_pong(value: &Value) -> bool {
    value
        .as_bytes()
        .is_some_and(|b| b.eq_ignore_ascii_case(b"PONG"))
}

fn unexpected(command: &str, value: &Value) -> CommandError {
    ProtocolError::UnexpectedReply(format!("{command} returned {}", value.kind())).into()
}

fn parse_scan_reply(reply: Value) -> Result<(u64, Vec<Key>)> {
    let kind = reply.kind();
    let mut items = reply
        .into_items()
        .filter(|items| items.len() == 2)
        .ok_or_else(|| {
            CommandError::from(ProtocolError::UnexpectedReply(format!(
                "SCAN returned {kind}, expected [cursor, keys]"
            )))
        })?;

    let keys = items.pop().and_then(Value::into_items).ok_or_else(|| {
        CommandError::from(ProtocolError::UnexpectedReply(
            "SCAN key list is not an array".to_string(),
        ))
    })?;
    let cursor = items
        .pop()
        .and_then(|v| v.as_text())
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| {
            CommandError::from(ProtocolError::UnexpectedReply(
                "SCAN cursor is not an unsigned integer".to_string(),
            ))
        })?;

    let keys = keys
        .into_iter()
        .map(|v| match v {
            Value::BulkString(bytes) => Ok(Key::from(bytes)),
            Value::SimpleString(s) => Ok(Key::from(s)),
            other => Err(unexpected("SCAN key", &other)),
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((cursor, keys))
}

/// Open a session for `intent`.
///
/// Validates the intent, establishes the transport (TLS when requested),
/// runs the handshake for the requested protocol, selects the database and
/// probes liveness. Nothing is retried and nothing is downgraded.
pub async fn negotiate(intent: ConnectionIntent) -> std::result::Result<Session, NegotiationError> {
    intent.validate()?;

    let tls = if intent.use_tls() {
        Some(resolve_tls(&intent)?)
    } else {
        None
    };
    let security = tls
        .as_ref()
        .map_or(TransportSecurity::Plaintext, |p| p.security().clone());
    let endpoint = intent.endpoint();
    debug!("Connecting to {} ({})", endpoint, security);

    let limit = intent.connect_timeout();
    let stream = match tokio::time::timeout(limit, open_transport(&intent, tls.as_ref())).await {
        Ok(stream) => stream?,
        Err(_) => {
            return Err(NegotiationError::Transport(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connecting to {endpoint} timed out after {limit:?}"),
            )));
        }
    };

    let mut session = Session {
        conn: Connection::new(stream, intent.command_timeout()),
        endpoint,
        db: intent.db(),
        protocol: intent.requested_protocol(),
        security,
        server_info: None,
        warnings: Vec::new(),
    };

    if session.is_insecure() {
        session.warnings.push(SessionWarning::TlsVerificationDisabled);
    }

    let result = handshake(&mut session, &intent).await;
    if let Err(e) = result {
        debug!("Negotiation with {} failed: {}", session.endpoint, e);
        session.close().await;
        return Err(e);
    }

    debug!(
        "Session ready: {} db={} protocol={} security={}",
        session.endpoint, session.db, session.protocol, session.security
    );
    Ok(session)
}

/// Negotiate a session, run `f` with it, and close it on every path.
pub async fn with_session<T, E, F>(intent: ConnectionIntent, f: F) -> std::result::Result<T, E>
where
    F: AsyncFnOnce(&mut Session) -> std::result::Result<T, E>,
    E: From<NegotiationError>,
{
    let mut session = negotiate(intent).await?;
    let result = f(&mut session).await;
    session.close().await;
    result
}

fn resolve_tls(intent: &ConnectionIntent) -> std::result::Result<TlsPolicy, NegotiationError> {
    if !intent.tls_verify() {
        warn!(
            "TLS certificate verification disabled for {}; the server identity is not authenticated",
            intent.endpoint()
        );
        return Ok(TlsPolicy::insecure());
    }

    let anchor = match intent.ca_bundle_path() {
        Some(path) => TrustAnchor::CaBundle(path.to_path_buf()),
        None => TrustAnchor::Bundled,
    };
    TlsPolicy::verified(anchor).map_err(|e| NegotiationError::InvalidIntent(e.to_string()))
}

async fn open_transport(
    intent: &ConnectionIntent,
    tls: Option<&TlsPolicy>,
) -> std::result::Result<Transport, NegotiationError> {
    let tcp = TcpStream::connect((intent.host(), intent.port())).await?;
    tcp.set_nodelay(true)?;

    let Some(policy) = tls else {
        return Ok(Transport::Tcp(tcp));
    };

    match policy.connect(tcp, intent.host()).await {
        Ok(stream) => Ok(Transport::Tls(Box::new(stream))),
        Err(e) => match tls::verification_failure(&e) {
            Some(reason) => Err(NegotiationError::TlsVerification { reason }),
            None => Err(NegotiationError::Transport(e)),
        },
    }
}

async fn handshake(
    session: &mut Session,
    intent: &ConnectionIntent,
) -> std::result::Result<(), NegotiationError> {
    let requested = intent.requested_protocol();
    match requested {
        ProtocolVersion::Resp3 => hello(session, intent).await?,
        ProtocolVersion::Resp2 => {
            warn!(
                "Using legacy RESP2 protocol for {}",
                session.endpoint
            );
            session.warnings.push(SessionWarning::LegacyProtocol);
            if let Some(credential) = intent.credential() {
                let mut args: Vec<&[u8]> = Vec::with_capacity(3);
                args.push(b"AUTH");
                if let Some(username) = credential.username() {
                    args.push(username.as_bytes());
                }
                args.push(credential.secret().as_bytes());
                match session.conn.call(&args).await {
                    Ok(Value::Okay) => {}
                    Ok(other) => {
                        return Err(NegotiationError::Authentication {
                            reason: format!("AUTH returned {}", other.kind()),
                        });
                    }
                    Err(e) => return Err(classify("AUTH", requested, e)),
                }
            }
        }
    }

    if session.db != 0 {
        let db = session.db.to_string();
        match session.conn.call(&["SELECT", db.as_str()]).await {
            Ok(_) => {}
            Err(e) => return Err(classify("SELECT", requested, e)),
        }
    }

    match session.conn.call(&["PING"]).await {
        Ok(ref v) if is_pong(v) => Ok(()),
        Ok(other) => Err(NegotiationError::ProtocolIncompatible {
            requested,
            reason: format!("PING returned {} instead of PONG", other.kind()),
        }),
        Err(e) => Err(classify("PING", requested, e)),
    }
}

async fn hello(
    session: &mut Session,
    intent: &ConnectionIntent,
) -> std::result::Result<(), NegotiationError> {
    let mut args: Vec<&[u8]> = Vec::with_capacity(7);
    args.push(b"HELLO");
    args.push(b"3");
    if let Some(credential) = intent.credential() {
        args.push(b"AUTH");
        args.push(credential.username().unwrap_or(DEFAULT_USERNAME).as_bytes());
        args.push(credential.secret().as_bytes());
    }
    args.push(b"SETNAME");
    args.push(CLIENT_NAME.as_bytes());

    match session.conn.call(&args).await {
        Ok(Value::Map(entries)) => {
            let info = ServerInfo::from_hello(&entries);
            debug!(
                "HELLO: server={:?} version={:?} mode={:?} role={:?}",
                info.server, info.version, info.mode, info.role
            );
            session.server_info = Some(info);
            Ok(())
        }
        Ok(other) => Err(NegotiationError::ProtocolIncompatible {
            requested: ProtocolVersion::Resp3,
            reason: format!("HELLO returned {} instead of a map", other.kind()),
        }),
        Err(e) => Err(classify("HELLO", ProtocolVersion::Resp3, e)),
    }
}

/// Map a failed handshake command to the negotiation taxonomy.
fn classify(
    command: &'static str,
    requested: ProtocolVersion,
    err: CommandError,
) -> NegotiationError {
    let message = match err {
        CommandError::Server(message) => message,
        CommandError::Io(e) => return NegotiationError::Transport(e),
        CommandError::Protocol(e) => {
            return NegotiationError::Transport(io::Error::new(io::ErrorKind::InvalidData, e));
        }
        CommandError::Closed => {
            return NegotiationError::Transport(io::Error::new(
                io::ErrorKind::NotConnected,
                "session closed",
            ));
        }
    };

    let code = message.split_whitespace().next().unwrap_or_default();
    let lower = message.to_ascii_lowercase();
    match code {
        "WRONGPASS" | "NOAUTH" | "NOPERM" => NegotiationError::Authentication { reason: message },
        "NOPROTO" => NegotiationError::ProtocolIncompatible {
            requested,
            reason: message,
        },
        _ if command == "HELLO" && lower.contains("unknown command") => {
            NegotiationError::ProtocolIncompatible {
                requested,
                reason: message,
            }
        }
        _ if command == "AUTH" || lower.contains("password") => {
            NegotiationError::Authentication { reason: message }
        }
        _ => NegotiationError::Rejected {
            command,
            reason: message,
        },
    }
}
