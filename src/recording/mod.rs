//! In-memory recording: experiment metadata plus lazily loaded signal data.
//!
//! Only [`Recording::get_signal_data`] performs I/O. Everything else is a
//! metadata query.

mod signal;
mod view;

pub use signal::{LoadState, Signal};
pub use view::{SignalIter, SignalView};

use crate::error::{ConcurrentModificationError, DataError, Error, SchemaError};
use crate::formats::{FormatRegistry, SampleArray};
use crate::models::{check_signal, ChannelMap, Experiment, ExperimentHeader, Parameters, SignalKey, SignalMeta};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// One experiment's runtime object.
pub struct Recording {
    header: ExperimentHeader,
    signals: RwLock<Vec<Arc<Signal>>>,
    active_views: AtomicUsize,
    registry: Arc<FormatRegistry>,
    origin: Option<PathBuf>,
}

impl fmt::Debug for Recording {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recording")
            .field("id", &self.header.id)
            .field("signals", &self.signal_count())
            .field("origin", &self.origin)
            .finish()
    }
}

impl Recording {
    /// Wrap an experiment, loading data through `registry` on demand.
    pub fn new(experiment: Experiment, registry: Arc<FormatRegistry>) -> Self {
        Self::with_unreadable(experiment, registry, HashMap::new(), None)
    }

    /// Wrap an experiment where some signal sources are known to be missing.
    pub(crate) fn with_unreadable(
        experiment: Experiment,
        registry: Arc<FormatRegistry>,
        mut unreadable: HashMap<SignalKey, String>,
        origin: Option<PathBuf>,
    ) -> Self {
        let (header, metas) = experiment.into_parts();
        let signals = metas
            .into_iter()
            .map(|meta| match unreadable.remove(&meta.key()) {
                Some(reason) => Arc::new(Signal::unreadable(meta, reason)),
                None => Arc::new(Signal::new(meta)),
            })
            .collect();
        Self {
            header,
            signals: RwLock::new(signals),
            active_views: AtomicUsize::new(0),
            registry,
            origin,
        }
    }

    pub fn id(&self) -> &str {
        &self.header.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.header.timestamp
    }

    pub fn channel_map(&self) -> &ChannelMap {
        &self.header.channel_map
    }

    pub fn parameters(&self) -> &Parameters {
        &self.header.parameters
    }

    pub fn header(&self) -> &ExperimentHeader {
        &self.header
    }

    /// Manifest this recording was discovered from, if any.
    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    /// Snapshot of the current signal set.
    pub fn signals(&self) -> Vec<Arc<Signal>> {
        self.read_signals().clone()
    }

    pub fn signal_count(&self) -> usize {
        self.read_signals().len()
    }

    /// Distinct declared regions.
    pub fn regions(&self) -> BTreeSet<String> {
        self.read_signals()
            .iter()
            .map(|s| s.region().to_string())
            .collect()
    }

    /// Distinct declared tags.
    pub fn tags(&self) -> BTreeSet<String> {
        self.read_signals()
            .iter()
            .filter_map(|s| s.tag().map(String::from))
            .collect()
    }

    pub fn has_region(&self, region: &str) -> bool {
        self.read_signals().iter().any(|s| s.region() == region)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.read_signals().iter().any(|s| s.tag() == Some(tag))
    }

    /// Formats referenced by the signal set.
    pub fn formats(&self) -> BTreeSet<String> {
        self.read_signals()
            .iter()
            .map(|s| s.meta().format.clone())
            .collect()
    }

    /// Look up a signal by identity.
    pub fn signal(&self, key: &SignalKey) -> Option<Arc<Signal>> {
        self.read_signals().iter().find(|s| &s.key() == key).cloned()
    }

    /// Current metadata as an experiment value.
    pub fn experiment(&self) -> Experiment {
        let metas = self.read_signals().iter().map(|s| s.meta().clone()).collect();
        Experiment::from_parts(self.header.clone(), metas)
    }

    /// Materialize (or return the cached) data for `signal`.
    ///
    /// On failure the signal stays unloaded and the error propagates.
    pub fn get_signal_data(&self, signal: &Signal) -> Result<Arc<SampleArray>, DataError> {
        self.ensure_member(signal)?;
        signal.data(&self.registry)
    }

    /// Release cached data for `signal`. No-op when nothing is loaded.
    pub fn evict(&self, signal: &Signal) -> bool {
        signal.evict()
    }

    /// Release every cached array. Returns how many were released.
    pub fn evict_all(&self) -> usize {
        let released = self.read_signals().iter().filter(|s| s.evict()).count();
        if released > 0 {
            debug!("Evicted {} signal(s) from {}", released, self.id());
        }
        released
    }

    pub fn loaded_count(&self) -> usize {
        self.read_signals()
            .iter()
            .filter(|s| s.state() == LoadState::Loaded)
            .count()
    }

    /// Signals matching all given filters; `None` matches anything.
    pub fn select(&self, region: Option<&str>, tag: Option<&str>) -> SignalView<'_> {
        SignalView::new(self, region, tag)
    }

    /// Add a signal. Rejected while any [`SignalView`] is alive.
    pub fn add_signal(&self, meta: SignalMeta) -> Result<Arc<Signal>, Error> {
        let mut signals = self.signals.write().unwrap_or_else(|e| e.into_inner());
        self.check_no_views()?;
        check_signal(&self.header.channel_map, &meta)?;
        if signals.iter().any(|s| s.key() == meta.key()) {
            return Err(SchemaError::DuplicateSignal(meta.key().to_string()).into());
        }
        let signal = Arc::new(Signal::new(meta));
        signals.push(signal.clone());
        Ok(signal)
    }

    /// Remove a signal by identity. Rejected while any [`SignalView`] is alive.
    pub fn remove_signal(&self, key: &SignalKey) -> Result<Option<Arc<Signal>>, Error> {
        let mut signals = self.signals.write().unwrap_or_else(|e| e.into_inner());
        self.check_no_views()?;
        let Some(pos) = signals.iter().position(|s| &s.key() == key) else {
            return Ok(None);
        };
        if signals.len() == 1 {
            return Err(SchemaError::NoSignals.into());
        }
        Ok(Some(signals.remove(pos)))
    }

    fn check_no_views(&self) -> Result<(), ConcurrentModificationError> {
        let views = self.active_views.load(Ordering::SeqCst);
        if views > 0 {
            return Err(ConcurrentModificationError {
                recording: self.id().to_string(),
                views,
            });
        }
        Ok(())
    }

    fn ensure_member(&self, signal: &Signal) -> Result<(), DataError> {
        let member = self
            .read_signals()
            .iter()
            .any(|s| std::ptr::eq(Arc::as_ptr(s), signal));
        if member {
            Ok(())
        } else {
            Err(DataError::ForeignSignal(signal.key().to_string()))
        }
    }

    fn read_signals(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<Signal>>> {
        self.signals.read().unwrap_or_else(|e| e.into_inner())
    }
}
