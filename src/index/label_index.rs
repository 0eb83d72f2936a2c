//! Label Index
//!
//! Ties the label bitmaps, the timestamp store and the query evaluator
//! together behind one async API, and keeps the on-disk state up to date with
//! a debounced background flush.
//!
//! # Layout
//!
//! ```text
//! data_dir/
//! ├── name_dates                 timestamps (SparseLongStore)
//! └── labels/
//!     ├── name_holiday/          one SparseBitmap per label
//!     │   ├── Bits               header
//!     │   ├── 0                  page files
//!     │   └── 3
//!     └── name_^italy/
//! ```
//!
//! # Flushing
//!
//! Mutations only touch memory, record what changed and wake the flush
//! worker. The worker writes changes once the commit debounce has passed
//! since the previous write. `commit()` writes immediately; `close()` commits
//! and stops the worker. A failed background flush is logged and returned by
//! the next `commit()` or `close()`.

use crate::config::IndexConfig;
use crate::index::error::{IndexError, IndexResult};
use crate::index::IndexStats;
use crate::query::{MatchResults, QueryEvaluator};
use crate::storage::names::is_encoded_name;
use crate::storage::{filename_to_name, SparseBitmap, SparseLongStore};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, Notify, RwLock};
use tokio::task::JoinHandle;

/// Name of the timestamp store inside the data directory
pub const DATES_NAME: &str = "dates";

/// Worker re-check interval while there is nothing to flush
const IDLE_WAIT: Duration = Duration::from_secs(60);

/// Everything guarded by the index lock
struct IndexState {
    labels: HashMap<String, SparseBitmap>,
    timestamps: SparseLongStore,
    altered_labels: HashSet<String>,
    dates_changed: bool,
    last_write: Option<Instant>,
}

impl IndexState {
    fn is_dirty(&self) -> bool {
        self.dates_changed || !self.altered_labels.is_empty()
    }

    /// Bitmap for `name`, created (bound to its directory) on first use
    fn label_mut(&mut self, name: &str, labels_dir: &Path) -> IndexResult<&mut SparseBitmap> {
        if !self.labels.contains_key(name) {
            let bitmap = SparseBitmap::open(name, labels_dir)?;
            self.labels.insert(name.to_string(), bitmap);
        }
        self.altered_labels.insert(name.to_string());
        self.labels
            .get_mut(name)
            .ok_or_else(|| IndexError::InvalidLabel(name.to_string()))
    }

    fn store(&mut self) -> IndexResult<()> {
        if !self.is_dirty() {
            return Ok(());
        }

        let mut altered: Vec<String> = self.altered_labels.iter().cloned().collect();
        altered.sort();
        for name in &altered {
            if let Some(bitmap) = self.labels.get_mut(name) {
                bitmap.store()?;
            }
            self.altered_labels.remove(name);
        }

        if self.dates_changed {
            self.timestamps.store()?;
            self.dates_changed = false;
        }

        self.last_write = Some(Instant::now());
        tracing::debug!(labels = altered.len(), "Flushed label index");
        Ok(())
    }
}

/// State shared with the flush worker
struct Shared {
    state: RwLock<IndexState>,
    /// Serializes flushes from the worker and from `commit`
    flush_lock: AsyncMutex<()>,
    wake: Notify,
    stopped: AtomicBool,
    auto_commit: AtomicBool,
    debounce_ms: AtomicU64,
    /// Last background flush failure, reported by the next commit
    worker_error: Mutex<Option<String>>,
    labels_dir: PathBuf,
}

impl Shared {
    async fn flush(&self) -> IndexResult<()> {
        let _guard = self.flush_lock.lock().await;
        let mut state = self.state.write().await;
        state.store()
    }

    fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.load(Ordering::SeqCst))
    }

    fn retain_error(&self, error: &IndexError) {
        if let Ok(mut slot) = self.worker_error.lock() {
            *slot = Some(error.to_string());
        }
    }

    fn take_error(&self) -> Option<String> {
        self.worker_error.lock().ok().and_then(|mut slot| slot.take())
    }

    /// How long until a flush is due, or `None` if one is due now
    async fn flush_delay(&self) -> Option<Duration> {
        let debounce = self.debounce();
        let state = self.state.read().await;
        if !state.is_dirty() {
            return Some(IDLE_WAIT);
        }
        match state.last_write.map(|t| t.elapsed()) {
            Some(elapsed) if elapsed < debounce => Some(debounce - elapsed),
            _ => None,
        }
    }
}

async fn run_flush_worker(shared: Arc<Shared>) {
    let mut wait = IDLE_WAIT;

    loop {
        // Woken early by every change, or times out to re-check
        let _ = tokio::time::timeout(wait, shared.wake.notified()).await;

        if shared.stopped.load(Ordering::SeqCst) {
            break;
        }
        if !shared.auto_commit.load(Ordering::SeqCst) {
            wait = IDLE_WAIT;
            continue;
        }

        wait = match shared.flush_delay().await {
            Some(delay) => delay,
            None => {
                if let Err(e) = shared.flush().await {
                    tracing::error!("Background flush failed: {}", e);
                    shared.retain_error(&e);
                }
                shared.debounce().max(Duration::from_millis(1))
            }
        };
    }

    // Final flush on shutdown
    if let Err(e) = shared.flush().await {
        tracing::error!("Final flush failed: {}", e);
        shared.retain_error(&e);
    }
    tracing::debug!("Flush worker stopped");
}

fn load_labels(labels_dir: &Path) -> IndexResult<HashMap<String, SparseBitmap>> {
    let mut labels = HashMap::new();

    for entry in std::fs::read_dir(labels_dir)? {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !is_encoded_name(&file_name) {
            continue;
        }
        let name = match filename_to_name(&file_name) {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!("Skipping label directory {:?}: {}", file_name, e);
                continue;
            }
        };

        let bitmap = SparseBitmap::open(name.clone(), labels_dir)?;
        if !bitmap.is_valid() {
            tracing::warn!(label = %name, "Stored label data is invalid, starting empty");
        }
        labels.insert(name, bitmap);
    }

    Ok(labels)
}

fn check_label(label: &str) -> IndexResult<()> {
    if label.is_empty() {
        return Err(IndexError::InvalidLabel(label.to_string()));
    }
    Ok(())
}

/// Persistent label index over one data directory
pub struct LabelIndex {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    data_dir: PathBuf,
}

impl LabelIndex {
    /// Open (or create) the index described by `config`
    ///
    /// Loads every stored label and the timestamps, then starts the flush
    /// worker. Must be called from within a tokio runtime.
    pub async fn open(config: IndexConfig) -> IndexResult<Self> {
        let labels_dir = config.labels_dir();
        std::fs::create_dir_all(&labels_dir)?;

        let labels = load_labels(&labels_dir)?;
        let mut timestamps = SparseLongStore::open(DATES_NAME, &config.data_dir)?
            .with_save_block_kb(config.save_block_size_kb);
        timestamps.set_growth_rate(config.timestamp_growth_rate);

        tracing::info!(
            "Opened label index at {:?} ({} labels, {} timestamp slots)",
            config.data_dir,
            labels.len(),
            timestamps.len()
        );

        let shared = Arc::new(Shared {
            state: RwLock::new(IndexState {
                labels,
                timestamps,
                altered_labels: HashSet::new(),
                dates_changed: false,
                last_write: None,
            }),
            flush_lock: AsyncMutex::new(()),
            wake: Notify::new(),
            stopped: AtomicBool::new(false),
            auto_commit: AtomicBool::new(config.auto_commit),
            debounce_ms: AtomicU64::new(config.commit_debounce_ms),
            worker_error: Mutex::new(None),
            labels_dir,
        });

        let worker = tokio::spawn(run_flush_worker(Arc::clone(&shared)));

        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
            data_dir: config.data_dir,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    /// Take the write lock for a mutation, failing once the index is stopped
    async fn write_state(&self) -> IndexResult<tokio::sync::RwLockWriteGuard<'_, IndexState>> {
        let state = self.shared.state.write().await;
        if self.is_stopped() {
            return Err(IndexError::Stopped);
        }
        Ok(state)
    }

    /// Add `labels` to record `index`
    pub async fn set_labels<S: AsRef<str>>(&self, index: u32, labels: &[S]) -> IndexResult<()> {
        for label in labels {
            check_label(label.as_ref())?;
        }
        {
            let mut state = self.write_state().await?;
            for label in labels {
                state
                    .label_mut(label.as_ref(), &self.shared.labels_dir)?
                    .set(index, true);
            }
        }
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Add `label` to every record in `indices`
    pub async fn add_label(&self, label: &str, indices: &[u32]) -> IndexResult<()> {
        check_label(label)?;
        {
            let mut state = self.write_state().await?;
            state
                .label_mut(label, &self.shared.labels_dir)?
                .set_all(indices);
        }
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Set the timestamp of record `index`
    pub async fn set_timestamp(&self, index: u32, timestamp: i64) -> IndexResult<()> {
        {
            let mut state = self.write_state().await?;
            state.timestamps.set(index, timestamp);
            state.dates_changed = true;
        }
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Set timestamp and labels of record `index` in one step
    pub async fn set<S: AsRef<str>>(
        &self,
        index: u32,
        timestamp: i64,
        labels: &[S],
    ) -> IndexResult<()> {
        for label in labels {
            check_label(label.as_ref())?;
        }
        {
            let mut state = self.write_state().await?;
            state.timestamps.set(index, timestamp);
            state.dates_changed = true;
            for label in labels {
                state
                    .label_mut(label.as_ref(), &self.shared.labels_dir)?
                    .set(index, true);
            }
        }
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Remove `label` from every record in `indices`; unknown labels are ignored
    pub async fn remove_labels(&self, label: &str, indices: &[u32]) -> IndexResult<()> {
        {
            let mut state = self.write_state().await?;
            let Some(bitmap) = state.labels.get_mut(label) else {
                return Ok(());
            };
            bitmap.unset_all(indices);
            state.altered_labels.insert(label.to_string());
        }
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Forget records entirely: every label and the timestamp
    pub async fn clear(&self, indices: &[u32]) -> IndexResult<()> {
        {
            let mut state = self.write_state().await?;
            let state = &mut *state;
            for (name, bitmap) in state.labels.iter_mut() {
                if indices.iter().any(|&i| bitmap.is_set(i)) {
                    bitmap.unset_all(indices);
                    state.altered_labels.insert(name.clone());
                }
            }
            state.timestamps.unset(indices);
            state.dates_changed = true;
        }
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Run a query and return matching ids with per-label counts
    pub async fn find(&self, query: &str) -> IndexResult<MatchResults> {
        let state = self.shared.state.read().await;
        let results = QueryEvaluator::new(&state.labels, &state.timestamps).find(query)?;
        tracing::debug!(query, matches = results.len(), "Query evaluated");
        Ok(results)
    }

    /// First record id without a timestamp
    pub async fn first_unused_index(&self) -> u32 {
        self.shared.state.read().await.timestamps.first_unset_index()
    }

    /// Timestamp of record `index`, if it has one
    pub async fn timestamp(&self, index: u32) -> Option<i64> {
        let state = self.shared.state.read().await;
        state
            .timestamps
            .is_set(index)
            .then(|| state.timestamps.get(index))
    }

    /// Known label names, sorted
    pub async fn labels(&self) -> Vec<String> {
        let state = self.shared.state.read().await;
        let mut names: Vec<String> = state.labels.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn stats(&self) -> IndexStats {
        let state = self.shared.state.read().await;
        IndexStats {
            label_count: state.labels.len(),
            record_count: state.timestamps.all_set().count_set_bits(),
            dirty_labels: state.altered_labels.len(),
            dates_changed: state.dates_changed,
        }
    }

    /// Write all pending changes now
    ///
    /// Also reports a background flush failure that happened since the last
    /// commit, even when this write succeeded.
    pub async fn commit(&self) -> IndexResult<()> {
        let earlier = self.shared.take_error();
        self.shared.flush().await?;
        match earlier {
            Some(message) => Err(IndexError::Worker(message)),
            None => Ok(()),
        }
    }

    /// Commit, stop accepting changes and wait for the flush worker to exit
    pub async fn close(&self) -> IndexResult<()> {
        let committed = self.commit().await;

        {
            let _state = self.shared.state.write().await;
            self.shared.stopped.store(true, Ordering::SeqCst);
        }
        self.shared.wake.notify_one();

        let worker = self.worker.lock().ok().and_then(|mut slot| slot.take());
        if let Some(worker) = worker {
            worker
                .await
                .map_err(|e| IndexError::Worker(format!("Flush worker panicked: {}", e)))?;
        }

        committed?;
        if let Some(message) = self.shared.take_error() {
            return Err(IndexError::Worker(message));
        }
        tracing::info!("Closed label index at {:?}", self.data_dir);
        Ok(())
    }

    pub fn auto_commit(&self) -> bool {
        self.shared.auto_commit.load(Ordering::SeqCst)
    }

    /// Enable or disable background flushing
    pub fn set_auto_commit(&self, enabled: bool) {
        self.shared.auto_commit.store(enabled, Ordering::SeqCst);
        self.shared.wake.notify_one();
    }

    /// Commit debounce in milliseconds
    pub fn commit_debounce(&self) -> u64 {
        self.shared.debounce_ms.load(Ordering::SeqCst)
    }

    pub fn set_commit_debounce(&self, ms: u64) {
        self.shared.debounce_ms.store(ms, Ordering::SeqCst);
        self.shared.wake.notify_one();
    }
}

impl Drop for LabelIndex {
    fn drop(&mut self) {
        // The worker does a last flush when it sees the flag
        self.shared.stopped.store(true, Ordering::SeqCst);
        self.shared.wake.notify_one();
    }
}

impl std::fmt::Debug for LabelIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelIndex")
            .field("data_dir", &self.data_dir)
            .field("stopped", &self.is_stopped())
            .field("auto_commit", &self.auto_commit())
            .field("commit_debounce_ms", &self.commit_debounce())
            .finish()
    }
}
