//! Audit Log - one record per inbound request
//!
//! Log format: JSON Lines (.jsonl), appended in arrival order.
//! A recent window is also kept in memory and every record is mirrored
//! to `tracing` on the `audit` target.
//!
//! `record` never touches the disk. Records are queued to a single writer
//! thread that owns the file, so a slow destination delays the log, not
//! the request.

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::models::AuditRecord;

// ============================================================================
// CONSTANTS
// ============================================================================

const MAX_LOG_ENTRIES: usize = 10_000; // Rotate after 10k entries
const MAX_IN_MEMORY: usize = 1_000; // Cache 1k most recent records
const MAX_PENDING: usize = 10_000; // Records queued for the writer

// ============================================================================
// SINK
// ============================================================================

/// Durable destination for audit records, driven from the writer thread
pub trait AuditSink: Send + 'static {
    fn append(&mut self, record: &AuditRecord) -> std::io::Result<()>;

    /// Human-readable destination for log lines
    fn describe(&self) -> String;
}

/// JSONL file with single-generation rotation to `<name>.jsonl.old`
pub struct JsonlSink {
    path: PathBuf,
    max_entries: usize,
    written: Option<usize>,
}

impl JsonlSink {
    pub fn new(path: PathBuf) -> Self {
        Self::with_max_entries(path, MAX_LOG_ENTRIES)
    }

    pub fn with_max_entries(path: PathBuf, max_entries: usize) -> Self {
        Self {
            path,
            max_entries: max_entries.max(1),
            written: None,
        }
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        let old_path = self.path.with_extension("jsonl.old");
        if old_path.exists() {
            std::fs::remove_file(&old_path)?;
        }
        std::fs::rename(&self.path, &old_path)?;
        self.written = Some(0);

        tracing::info!("Rotated audit log to {}", old_path.display());
        Ok(())
    }
}

impl AuditSink for JsonlSink {
    fn append(&mut self, record: &AuditRecord) -> std::io::Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Resume the count of a file left by a previous run
        let written = match self.written {
            Some(n) => n,
            None => count_lines(&self.path),
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut writer = BufWriter::new(file);
        let json = serde_json::to_string(record)?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;

        self.written = Some(written + 1);
        if written + 1 >= self.max_entries {
            if let Err(e) = self.rotate() {
                tracing::error!("Failed to rotate audit log: {}", e);
            }
        }

        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

// ============================================================================
// LOGGER
// ============================================================================

enum WriterMsg {
    Record(AuditRecord),
    Flush(oneshot::Sender<()>),
}

pub struct AuditLogger {
    writer: Option<mpsc::Sender<WriterMsg>>,
    // Held across the enqueue so queue order matches arrival order
    recent: Mutex<VecDeque<AuditRecord>>,
    degraded: Arc<AtomicBool>,
}

impl AuditLogger {
    /// `destination = None` keeps records in memory and tracing only
    pub fn new(destination: Option<PathBuf>) -> Self {
        match destination {
            Some(path) => {
                tracing::info!("Audit log destination: {}", path.display());
                Self::with_sink(JsonlSink::new(path))
            }
            None => Self::build(None, Arc::new(AtomicBool::new(false))),
        }
    }

    /// Persist records through `sink` on a dedicated writer thread
    pub fn with_sink(sink: impl AuditSink) -> Self {
        let degraded = Arc::new(AtomicBool::new(false));
        let writer = spawn_writer(Box::new(sink), degraded.clone());
        Self::build(writer, degraded)
    }

    fn build(writer: Option<mpsc::Sender<WriterMsg>>, degraded: Arc<AtomicBool>) -> Self {
        Self {
            writer,
            recent: Mutex::new(VecDeque::with_capacity(MAX_IN_MEMORY)),
            degraded,
        }
    }

    /// Append a record. Never blocks on the destination and never fails.
    pub fn record(&self, record: AuditRecord) {
        tracing::info!(
            target: "audit",
            id = %record.id,
            subject = %record.subject,
            client = %record.client_addr,
            method = %record.method,
            endpoint = %record.endpoint,
            status = record.status,
            outcome = %record.outcome,
            latency_ms = record.latency_ms,
            "request audited"
        );

        let mut recent = self.recent.lock();

        if let Some(writer) = &self.writer {
            if let Err(e) = writer.try_send(WriterMsg::Record(record.clone())) {
                if !self.degraded.swap(true, Ordering::SeqCst) {
                    let reason = match e {
                        mpsc::error::TrySendError::Full(_) => "writer backlog full",
                        mpsc::error::TrySendError::Closed(_) => "writer stopped",
                    };
                    tracing::warn!("Audit record not persisted ({}), continuing in memory only", reason);
                }
            }
        }

        recent.push_back(record);
        if recent.len() > MAX_IN_MEMORY {
            recent.pop_front();
        }
    }

    /// Wait until every record queued so far has reached the destination
    pub async fn flushed(&self) {
        let Some(writer) = &self.writer else {
            return;
        };
        let (done, wait) = oneshot::channel();
        if writer.send(WriterMsg::Flush(done)).await.is_ok() {
            let _ = wait.await;
        }
    }

    /// Up to `limit` most recent records, oldest first
    pub fn recent(&self, limit: usize) -> Vec<AuditRecord> {
        let recent = self.recent.lock();
        let start = recent.len().saturating_sub(limit);
        recent.iter().skip(start).cloned().collect()
    }

    /// Recent records for one endpoint, oldest first
    pub fn for_endpoint(&self, endpoint: &str) -> Vec<AuditRecord> {
        self.recent
            .lock()
            .iter()
            .filter(|r| r.endpoint == endpoint)
            .cloned()
            .collect()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }
}

// ============================================================================
// INTERNAL HELPERS
// ============================================================================

fn spawn_writer(
    mut sink: Box<dyn AuditSink>,
    degraded: Arc<AtomicBool>,
) -> Option<mpsc::Sender<WriterMsg>> {
    let (tx, mut rx) = mpsc::channel(MAX_PENDING);
    let flag = degraded.clone();

    let spawned = std::thread::Builder::new()
        .name("audit-writer".to_string())
        .spawn(move || {
            while let Some(msg) = rx.blocking_recv() {
                match msg {
                    WriterMsg::Record(record) => match sink.append(&record) {
                        Ok(()) => {
                            if flag.swap(false, Ordering::SeqCst) {
                                tracing::info!("Audit log destination writable again: {}", sink.describe());
                            }
                        }
                        Err(e) => {
                            if !flag.swap(true, Ordering::SeqCst) {
                                tracing::warn!(
                                    "Audit log destination {} unwritable, continuing in memory only: {}",
                                    sink.describe(),
                                    e
                                );
                            }
                        }
                    },
                    WriterMsg::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });

    match spawned {
        Ok(_) => Some(tx),
        Err(e) => {
            tracing::warn!("Failed to start audit writer, continuing in memory only: {}", e);
            degraded.store(true, Ordering::SeqCst);
            None
        }
    }
}

fn count_lines(path: &std::path::Path) -> usize {
    std::fs::File::open(path)
        .map(|f| BufReader::new(f).lines().map_while(Result::ok).count())
        .unwrap_or(0)
}

// ============================================================================
// TESTS
// ============================================================================
