//! Pattern scanning and confirmed bulk deletion.
//!
//! Deletion never takes a pattern. The only way to delete is:
//!
//! 1. [`collect_matches`] enumerates the keyspace with `SCAN` into a
//!    [`KeyMatchSet`];
//! 2. the caller shows the set and calls [`KeyMatchSet::confirm`];
//! 3. [`delete_matches`] deletes exactly the confirmed keys.

use std::collections::HashSet;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::error::{CommandError, DeletionError, Result, ScanError};
use crate::session::Session;
use crate::types::Key;

/// Cursor value that starts a pass and signals its end.
pub const CURSOR_START: u64 = 0;

/// Default `COUNT` hint per `SCAN` step.
pub const DEFAULT_SCAN_COUNT: usize = 100;

/// The key commands the scanner and mutator need from a session.
#[async_trait]
pub trait KeyCommands: Send {
    /// One `SCAN cursor MATCH pattern COUNT count` step.
    async fn scan_page(
        &mut self,
        cursor: u64,
        pattern: &[u8],
        count: usize,
    ) -> Result<(u64, Vec<Key>)>;

    /// Delete one literal key. Returns false if it did not exist.
    async fn delete_key(&mut self, key: &Key) -> Result<bool>;
}

#[async_trait]
impl KeyCommands for Session {
    async fn scan_page(
        &mut self,
        cursor: u64,
        pattern: &[u8],
        count: usize,
    ) -> Result<(u64, Vec<Key>)> {
        Session::scan_page(self, cursor, pattern, count).await
    }

    async fn delete_key(&mut self, key: &Key) -> Result<bool> {
        Session::delete_key(self, key).await
    }
}

/// Tuning for one scan pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// `COUNT` hint per step. The store may return more or fewer keys.
    pub count: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            count: DEFAULT_SCAN_COUNT,
        }
    }
}

impl ScanOptions {
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count.max(1);
        self
    }
}

/// Lazily enumerate keys matching `pattern`.
///
/// Each poll that runs out of buffered keys issues one `SCAN` step. The
/// stream ends when the store hands back the start cursor. Only the current
/// step's keys are held, so a key the store reports twice during a pass is
/// yielded twice; [`collect_matches`] removes such repeats. Dropping the
/// stream abandons the pass; there is nothing to clean up server side.
pub fn scan<'a, C>(
    conn: &'a mut C,
    pattern: &'a str,
    options: ScanOptions,
) -> impl Stream<Item = std::result::Result<Key, ScanError>> + Send + 'a
where
    C: KeyCommands + ?Sized,
{
    try_stream! {
        let mut cursor = CURSOR_START;
        let mut steps = 0usize;
        let mut yielded = 0usize;

        loop {
            let (next, keys) = conn
                .scan_page(cursor, pattern.as_bytes(), options.count)
                .await
                .map_err(|source| ScanError {
                    cursor,
                    steps,
                    yielded,
                    source,
                })?;
            steps += 1;
            trace!("SCAN {} -> {} ({} key(s))", cursor, next, keys.len());

            for key in keys {
                yielded += 1;
                yield key;
            }

            if next == CURSOR_START {
                break;
            }
            cursor = next;
        }

        debug!("Scan of {:?} complete: {} key(s) in {} step(s)", pattern, yielded, steps);
    }
}

/// The keys matched by one complete scan pass.
///
/// Only [`collect_matches`] builds one, and it cannot be modified afterwards.
#[derive(Debug, PartialEq, Eq)]
pub struct KeyMatchSet {
    pattern: String,
    keys: Vec<Key>,
}

impl KeyMatchSet {
    /// Pattern that produced the set.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Matched keys in the order the store reported them.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Record the caller's confirmation that exactly these keys may be deleted.
    pub fn confirm(self) -> ConfirmedDeletion {
        ConfirmedDeletion { set: self }
    }
}

/// A [`KeyMatchSet`] the operator agreed to delete.
#[derive(Debug)]
pub struct ConfirmedDeletion {
    set: KeyMatchSet,
}

impl ConfirmedDeletion {
    /// Keys that will be deleted.
    pub fn keys(&self) -> &[Key] {
        self.set.keys()
    }
}

/// Outcome of a confirmed deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
    /// Pattern the deleted set was collected with.
    pub pattern: String,
    /// Keys in the confirmed set.
    pub requested_count: usize,
    /// Keys the store reported as removed.
    pub deleted_count: usize,
    /// Keys already gone when their deletion ran.
    pub missing_count: usize,
    /// Per-key failures.
    pub errors: Vec<DeletionError>,
}

impl DeletionReport {
    /// Returns true if every key was deleted or already gone.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Run a full scan pass and materialise its keys, each once.
pub async fn collect_matches<C>(
    conn: &mut C,
    pattern: &str,
    options: ScanOptions,
) -> std::result::Result<KeyMatchSet, ScanError>
where
    C: KeyCommands + ?Sized,
{
    let mut seen: HashSet<Key> = HashSet::new();
    let keys: Vec<Key> = scan(conn, pattern, options)
        .try_filter(|key| futures::future::ready(seen.insert(key.clone())))
        .try_collect()
        .await?;
    Ok(KeyMatchSet {
        pattern: pattern.to_string(),
        keys,
    })
}

/// Delete exactly the confirmed keys, one `DEL` per key.
///
/// A failure on one key is recorded and the rest are still attempted. Once
/// the session breaks, the remaining keys are recorded as failed without
/// touching the store.
pub async fn delete_matches<C>(conn: &mut C, confirmed: ConfirmedDeletion) -> DeletionReport
where
    C: KeyCommands + ?Sized,
{
    let KeyMatchSet { pattern, keys } = confirmed.set;
    let mut report = DeletionReport {
        pattern,
        requested_count: keys.len(),
        deleted_count: 0,
        missing_count: 0,
        errors: Vec::new(),
    };

    let mut broken = false;
    for key in keys {
        if broken {
            report.errors.push(DeletionError {
                key,
                reason: CommandError::Closed.to_string(),
            });
            continue;
        }

        match conn.delete_key(&key).await {
            Ok(true) => report.deleted_count += 1,
            Ok(false) => {
                trace!("{} already gone", key);
                report.missing_count += 1;
            }
            Err(e) => {
                warn!("Failed to delete {}: {}", key, e);
                broken = e.is_fatal();
                report.errors.push(DeletionError {
                    key,
                    reason: e.to_string(),
                });
            }
        }
    }

    debug!(
        "Deleted {}/{} key(s) for {:?} ({} missing, {} failed)",
        report.deleted_count,
        report.requested_count,
        report.pattern,
        report.missing_count,
        report.errors.len()
    );
    report
}
