//! Scan-result data model and the shared state handle read by the send loop.
//!
//! The scan collection is the only mutable state shared across tasks. It is
//! guarded by a single mutex behind [`ScanState`]: writers replace the whole
//! collection atomically via [`ScanState::set_scan_results`], and the send
//! loop takes a [`ScanState::snapshot`] under the same lock. A reader never
//! observes a partially-replaced collection.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// A single log entry reported by an edge hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Identifier of the server that produced the entry
    pub server_id: String,

    /// Numeric identifier of the entry
    pub identifier: u32,

    /// Seconds since the Unix epoch, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl LogEntry {
    /// Create a log entry without a timestamp.
    pub fn new(server_id: impl Into<String>, identifier: u32) -> Self {
        Self {
            server_id: server_id.into(),
            identifier,
            timestamp: None,
        }
    }

    /// Attach an epoch-seconds timestamp to the entry.
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// The scan outcome for one hub: the hub identity plus its log entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Identifier of the scanned hub
    pub hub_id: String,

    /// Ordered log entries collected from the hub
    pub log_entries: Vec<LogEntry>,
}

impl ScanResult {
    /// Create a scan result for the given hub.
    pub fn new(hub_id: impl Into<String>, log_entries: Vec<LogEntry>) -> Self {
        Self {
            hub_id: hub_id.into(),
            log_entries,
        }
    }
}

/// Cloneable handle to the shared scan-result collection.
///
/// Both the sender and any external updater hold clones of the same handle;
/// there are no process-wide globals. The lock is held only for the duration
/// of a replace or a snapshot copy, never across network I/O.
#[derive(Debug, Clone, Default)]
pub struct ScanState {
    inner: Arc<Mutex<Vec<ScanResult>>>,
}

impl ScanState {
    /// Create an empty scan state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scan state pre-populated with `results`.
    pub fn with_results(results: Vec<ScanResult>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(results)),
        }
    }

    /// Atomically replace the whole collection.
    ///
    /// May be called concurrently with an in-flight send; the send loop
    /// observes either the old or the new collection in full, never a mix.
    pub fn set_scan_results(&self, results: Vec<ScanResult>) {
        let mut guard = self.lock();
        *guard = results;
    }

    /// Copy the current collection under the lock.
    pub fn snapshot(&self) -> Vec<ScanResult> {
        self.lock().clone()
    }

    /// Whether the collection is currently empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of scan results currently held.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    // Replacement is a single assignment, so even a poisoned lock still
    // holds a consistent collection.
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ScanResult>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
