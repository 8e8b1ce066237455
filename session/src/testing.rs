//! In-process RESP server for tests, backed by `kvsweep-kv` memory stores.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::{BufMut, Bytes, BytesMut};
use kvsweep_kv::{KVStore, MemoryStore};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

use crate::protocol::{self, ReplyDecoder, Value, ValueExt};

const DATABASES: usize = 16;

/// Behaviour of a [`FakeServer`].
#[derive(Clone)]
pub struct ServerOptions {
    /// Password of the `default` user. `None` disables authentication.
    pub password: Option<String>,
    /// Additional ACL users.
    pub users: Vec<(String, String)>,
    /// Whether `HELLO` is understood.
    pub hello: bool,
    /// Command that is read but never answered.
    pub stall_on: Option<&'static str>,
    /// Reject writes like a read-only replica.
    pub readonly: bool,
    /// Serve TLS with this configuration.
    pub tls: Option<Arc<ServerConfig>>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            password: None,
            users: Vec::new(),
            hello: true,
            stall_on: None,
            readonly: false,
            tls: None,
        }
    }
}

impl ServerOptions {
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn with_user(mut self, username: &str, password: &str) -> Self {
        self.users.push((username.to_string(), password.to_string()));
        self
    }

    pub fn resp2_only(mut self) -> Self {
        self.hello = false;
        self
    }

    pub fn stall_on(mut self, command: &'static str) -> Self {
        self.stall_on = Some(command);
        self
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn with_tls(mut self, config: Arc<ServerConfig>) -> Self {
        self.tls = Some(config);
        self
    }

    fn check(&self, username: &str, password: &str) -> bool {
        if username == "default" {
            return self.password.as_deref() == Some(password);
        }
        self.users
            .iter()
            .any(|(u, p)| u == username && p == password)
    }
}

struct State {
    options: ServerOptions,
    dbs: Vec<MemoryStore>,
    log: Mutex<Vec<String>>,
}

/// A RESP server on an ephemeral localhost port.
pub struct FakeServer {
    addr: SocketAddr,
    state: Arc<State>,
    handle: JoinHandle<()>,
}

impl FakeServer {
    pub async fn start(options: ServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(State {
            options,
            dbs: (0..DATABASES).map(|_| MemoryStore::new()).collect(),
            log: Mutex::new(Vec::new()),
        });

        let accept_state = state.clone();
        let handle = tokio::spawn(async move {
            let acceptor = accept_state.options.tls.clone().map(TlsAcceptor::from);
            loop {
                let Ok((tcp, _)) = listener.accept().await else {
                    return;
                };
                let state = accept_state.clone();
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    match acceptor {
                        Some(acceptor) => {
                            if let Ok(stream) = acceptor.accept(tcp).await {
                                serve(stream, state).await;
                            }
                        }
                        None => serve(tcp, state).await,
                    }
                });
            }
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Keyspace of database `db`.
    pub fn db(&self, db: usize) -> &MemoryStore {
        &self.state.dbs[db]
    }

    /// Upper-cased names of every command received, in order.
    pub fn commands(&self) -> Vec<String> {
        self.state.log.lock().unwrap().clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.commands().iter().filter(|c| *c == command).count()
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct Client {
    authed: bool,
    resp3: bool,
    db: usize,
}

async fn serve<S: AsyncRead + AsyncWrite + Unpin>(mut stream: S, state: Arc<State>) {
    let mut client = Client {
        authed: state.options.password.is_none() && state.options.users.is_empty(),
        resp3: false,
        db: 0,
    };
    let mut decoder = ReplyDecoder::new();
    let mut out = BytesMut::with_capacity(4096);

    loop {
        let Ok(frame) = protocol::read_value(&mut decoder, &mut stream).await else {
            return;
        };

        let Some(args) = frame.into_items().and_then(|items| {
            items
                .into_iter()
                .map(|v| match v {
                    Value::BulkString(b) => Some(Bytes::from(b)),
                    _ => None,
                })
                .collect::<Option<Vec<Bytes>>>()
        }) else {
            return;
        };
        let Some(name) = args.first().map(|n| String::from_utf8_lossy(n).to_uppercase()) else {
            return;
        };
        state.log.lock().unwrap().push(name.clone());

        if state.options.stall_on == Some(name.as_str()) {
            std::future::pending::<()>().await;
        }

        let reply = execute(&state, &mut client, &name, &args[1..]);
        out.clear();
        reply.encode(&mut out);
        if stream.write_all(&out).await.is_err() || stream.flush().await.is_err() {
            return;
        }
        if name == "QUIT" {
            return;
        }
    }
}

/// What the server writes back. Encoded here rather than through the client's
/// codec so that both directions are checked against the wire format.
enum Reply {
    Simple(&'static str),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    /// RESP2 null bulk string.
    NilBulk,
    /// RESP3 null.
    Null,
    Array(Vec<Reply>),
    Map(Vec<(Reply, Reply)>),
}

impl Reply {
    fn encode(&self, buf: &mut BytesMut) {
        match self {
            Reply::Simple(s) => put_line(buf, b'+', s),
            Reply::Error(e) => put_line(buf, b'-', e),
            Reply::Integer(i) => put_line(buf, b':', &i.to_string()),
            Reply::Bulk(data) => {
                put_line(buf, b'$', &data.len().to_string());
                buf.put_slice(data);
                buf.put_slice(b"\r\n");
            }
            Reply::NilBulk => buf.put_slice(b"$-1\r\n"),
            Reply::Null => buf.put_slice(b"_\r\n"),
            Reply::Array(items) => {
                put_line(buf, b'*', &items.len().to_string());
                for item in items {
                    item.encode(buf);
                }
            }
            Reply::Map(pairs) => {
                put_line(buf, b'%', &pairs.len().to_string());
                for (k, v) in pairs {
                    k.encode(buf);
                    v.encode(buf);
                }
            }
        }
    }
}

fn put_line(buf: &mut BytesMut, tag: u8, body: &str) {
    buf.put_u8(tag);
    buf.put_slice(body.as_bytes());
    buf.put_slice(b"\r\n");
}

fn err(message: &str) -> Reply {
    Reply::Error(message.to_string())
}

fn ok() -> Reply {
    Reply::Simple("OK")
}

fn bulk(data: impl Into<Bytes>) -> Reply {
    Reply::Bulk(data.into())
}

fn text(arg: &[u8]) -> String {
    String::from_utf8_lossy(arg).into_owned()
}

fn execute(state: &State, client: &mut Client, name: &str, args: &[Bytes]) -> Reply {
    let options = &state.options;
    match name {
        "HELLO" => {
            if !options.hello {
                return err("ERR unknown command 'HELLO', with args beginning with: ");
            }
            let proto = args.first().map(|a| text(a));
            if !matches!(proto.as_deref(), Some("2" | "3")) {
                return err("NOPROTO sorry, this protocol version is not supported.");
            }
            let mut rest = args[1..].iter();
            let mut authed = client.authed;
            while let Some(option) = rest.next() {
                match text(option).to_uppercase().as_str() {
                    "AUTH" => {
                        let (Some(user), Some(pass)) = (rest.next(), rest.next()) else {
                            return err("ERR Syntax error in HELLO option 'auth'");
                        };
                        if !options.check(&text(user), &text(pass)) {
                            return err(
                                "WRONGPASS invalid username-password pair or user is disabled.",
                            );
                        }
                        authed = true;
                    }
                    "SETNAME" => {
                        rest.next();
                    }
                    other => return err(&format!("ERR Syntax error in HELLO option '{other}'")),
                }
            }
            if !authed {
                return err(
                    "NOAUTH HELLO must be called with the client already authenticated, otherwise the HELLO <proto> AUTH <user> <pass> option can be used to authenticate the client and select the RESP protocol version at the same time",
                );
            }
            client.authed = true;
            client.resp3 = proto.as_deref() == Some("3");
            Reply::Map(vec![
                (bulk("server"), bulk("redis")),
                (bulk("version"), bulk("7.2.4")),
                (bulk("proto"), Reply::Integer(if client.resp3 { 3 } else { 2 })),
                (bulk("id"), Reply::Integer(1)),
                (bulk("mode"), bulk("standalone")),
                (bulk("role"), bulk("master")),
                (bulk("modules"), Reply::Array(vec![])),
            ])
        }
        "AUTH" => {
            let (user, pass) = match args {
                [pass] => ("default".to_string(), text(pass)),
                [user, pass] => (text(user), text(pass)),
                _ => return err("ERR wrong number of arguments for 'auth' command"),
            };
            if options.password.is_none() && options.users.is_empty() {
                return err(
                    "ERR AUTH <password> called without any password configured for the default user. Are you sure your configuration is correct?",
                );
            }
            if options.check(&user, &pass) {
                client.authed = true;
                ok()
            } else {
                err("WRONGPASS invalid username-password pair or user is disabled.")
            }
        }
        "QUIT" => ok(),
        _ if !client.authed => err("NOAUTH Authentication required."),
        "PING" => Reply::Simple("PONG"),
        "SET" | "DEL" | "FLUSHDB" if options.readonly => {
            err("READONLY You can't write against a read only replica.")
        }
        "SELECT" => match args.first().and_then(|a| text(a).parse::<usize>().ok()) {
            Some(db) if db < DATABASES => {
                client.db = db;
                ok()
            }
            _ => err("ERR DB index is out of range"),
        },
        "SCAN" => scan(&state.dbs[client.db], args),
        "DEL" => {
            let store = &state.dbs[client.db];
            let removed = args
                .iter()
                .filter(|key| store.delete(key).unwrap_or(false))
                .count();
            Reply::Integer(removed as i64)
        }
        "GET" => match args.first().map(|key| state.dbs[client.db].get(key)) {
            Some(Ok(Some(value))) => bulk(value),
            Some(Ok(None)) if client.resp3 => Reply::Null,
            Some(Ok(None)) => Reply::NilBulk,
            _ => err("ERR wrong number of arguments for 'get' command"),
        },
        "SET" => match args {
            [key, value] => match state.dbs[client.db].set(key, value) {
                Ok(()) => ok(),
                Err(e) => err(&format!("ERR {e}")),
            },
            _ => err("ERR syntax error"),
        },
        "DBSIZE" => Reply::Integer(state.dbs[client.db].len().unwrap_or(0) as i64),
        "FLUSHDB" => {
            let _ = state.dbs[client.db].flush();
            ok()
        }
        other => err(&format!("ERR unknown command '{}'", other.to_lowercase())),
    }
}

fn scan(store: &MemoryStore, args: &[Bytes]) -> Reply {
    let Some(cursor) = args.first().and_then(|c| text(c).parse::<u64>().ok()) else {
        return err("ERR invalid cursor");
    };
    let mut pattern = None;
    let mut count = 10;
    let mut rest = args[1..].iter();
    while let Some(option) = rest.next() {
        match (text(option).to_uppercase().as_str(), rest.next()) {
            ("MATCH", Some(p)) => pattern = Some(p.clone()),
            ("COUNT", Some(n)) => match text(n).parse::<usize>() {
                Ok(n) if n > 0 => count = n,
                _ => return err("ERR value is not an integer or out of range"),
            },
            _ => return err("ERR syntax error"),
        }
    }

    match store.scan(cursor, pattern.as_deref(), count) {
        Ok(page) => Reply::Array(vec![
            bulk(page.cursor.to_string()),
            Reply::Array(page.keys.into_iter().map(bulk).collect()),
        ]),
        Err(e) => err(&format!("ERR {e}")),
    }
}

/// Certificates for TLS tests.
pub struct TestPki {
    /// PEM of the issuing CA.
    pub ca_pem: String,
    /// Server configuration presenting a leaf signed by the CA.
    pub server_config: Arc<ServerConfig>,
}

/// A private CA plus a server certificate for `names`.
pub fn private_ca(names: &[&str]) -> TestPki {
    use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair, KeyUsagePurpose};

    let ca_key = KeyPair::generate().unwrap();
    let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca_params
        .distinguished_name
        .push(DnType::CommonName, "kvsweep test CA");
    ca_params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    let ca = ca_params.self_signed(&ca_key).unwrap();

    let leaf_key = KeyPair::generate().unwrap();
    let leaf_params =
        CertificateParams::new(names.iter().map(|n| n.to_string()).collect::<Vec<_>>()).unwrap();
    let leaf = leaf_params.signed_by(&leaf_key, &ca, &ca_key).unwrap();

    TestPki {
        ca_pem: ca.pem(),
        server_config: server_config(leaf.der().clone(), leaf_key.serialize_der()),
    }
}

/// A server configuration presenting a self-signed certificate for `names`.
pub fn self_signed(names: &[&str]) -> Arc<ServerConfig> {
    let certified =
        rcgen::generate_simple_self_signed(names.iter().map(|n| n.to_string()).collect::<Vec<_>>())
            .unwrap();
    server_config(
        certified.cert.der().clone(),
        certified.key_pair.serialize_der(),
    )
}

fn server_config(cert: CertificateDer<'static>, key: Vec<u8>) -> Arc<ServerConfig> {
    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(
            vec![cert],
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key)),
        )
        .unwrap();
    Arc::new(config)
}

/// Keys of `store` as sorted strings.
pub fn keys_of(store: &MemoryStore) -> Vec<String> {
    let mut keys = Vec::new();
    let mut cursor = 0;
    loop {
        let page = store.scan(cursor, None, 100).unwrap();
        let done = page.is_complete();
        cursor = page.cursor;
        keys.extend(
            page.keys
                .into_iter()
                .map(|k| String::from_utf8_lossy(&k).into_owned()),
        );
        if done {
            break;
        }
    }
    keys.sort();
    keys
}

