//! Session negotiation and safe pattern-based key scanning for
//! Redis-protocol stores.
//!
//! Two pieces:
//!
//! - **Negotiation**: [`negotiate`] turns a [`ConnectionIntent`] into a live
//!   [`Session`], choosing plaintext or TLS (bundled roots, a CA bundle, or
//!   explicitly unverified), RESP3 via `HELLO` or legacy RESP2, then
//!   authenticating, selecting the database and probing with `PING`.
//!   Failures are classified as [`NegotiationError`] and never retried.
//! - **Scanning and deletion**: [`scan`] lazily walks the keyspace with
//!   `SCAN` until the cursor wraps around, [`collect_matches`] materialises a
//!   [`KeyMatchSet`], and [`delete_matches`] deletes only a set the caller
//!   has [confirmed](KeyMatchSet::confirm).
//!
//! ## Example
//!
//! ```no_run
//! use kvsweep_session::{collect_matches, delete_matches, negotiate, ConnectionIntent, ScanOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut session = negotiate(ConnectionIntent::new("localhost", 6379)).await?;
//!
//!     let matches = collect_matches(&mut session, "session:*", ScanOptions::default()).await?;
//!     for key in matches.keys() {
//!         println!("{key}");
//!     }
//!
//!     let report = delete_matches(&mut session, matches.confirm()).await;
//!     println!("deleted {}/{}", report.deleted_count, report.requested_count);
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```

mod error;
mod intent;
pub mod protocol;
mod scan;
mod session;
pub mod transport;
mod types;

pub use error::{
    CommandError, DeletionError, NegotiationError, ProtocolError, Result, ScanError,
};
pub use intent::{
    ConnectionIntent, Credential, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PORT, DEFAULT_USERNAME,
};
pub use scan::{
    CURSOR_START, ConfirmedDeletion, DEFAULT_SCAN_COUNT, DeletionReport, KeyCommands,
    KeyMatchSet, ScanOptions, collect_matches, delete_matches, scan,
};
pub use session::{CLIENT_NAME, Session, negotiate, with_session};
pub use transport::tls::TlsPolicy;
pub use types::{
    Key, ProtocolVersion, ServerInfo, SessionWarning, TransportSecurity, TrustAnchor,
};

#[cfg(test)]
mod testing;
