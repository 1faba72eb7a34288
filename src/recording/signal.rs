//! Lazily materialized signal data.

use crate::error::DataError;
use crate::formats::{FormatRegistry, SampleArray};
use crate::models::{SignalKey, SignalMeta};
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Observable cache state of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loaded,
    Evicted,
    /// The source file was missing at discovery; loading will fail.
    Unreadable,
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadState::Unloaded => write!(f, "unloaded"),
            LoadState::Loaded => write!(f, "loaded"),
            LoadState::Evicted => write!(f, "evicted"),
            LoadState::Unreadable => write!(f, "unreadable"),
        }
    }
}

enum Cell {
    Unloaded,
    Loaded(Arc<SampleArray>),
    Evicted,
}

/// One data stream: declared metadata plus a single-flight data cell.
///
/// The cell lock is held for the whole adapter call, so concurrent callers
/// for the same signal wait for the first load and reuse its result.
/// Different signals load independently.
pub struct Signal {
    meta: SignalMeta,
    unreadable: Option<String>,
    cell: Mutex<Cell>,
    loads: AtomicUsize,
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("key", &self.key())
            .field("region", &self.meta.region)
            .field("state", &self.state())
            .finish()
    }
}

impl Signal {
    pub(crate) fn new(meta: SignalMeta) -> Self {
        Self {
            meta,
            unreadable: None,
            cell: Mutex::new(Cell::Unloaded),
            loads: AtomicUsize::new(0),
        }
    }

    /// A signal whose source could not be found; the reason surfaces on
    /// the first data access.
    pub(crate) fn unreadable(meta: SignalMeta, reason: impl Into<String>) -> Self {
        Self {
            unreadable: Some(reason.into()),
            ..Self::new(meta)
        }
    }

    pub fn meta(&self) -> &SignalMeta {
        &self.meta
    }

    pub fn key(&self) -> SignalKey {
        self.meta.key()
    }

    pub fn region(&self) -> &str {
        &self.meta.region
    }

    pub fn tag(&self) -> Option<&str> {
        self.meta.tag.as_deref()
    }

    /// Same entity: same source location and tag.
    pub fn same_entity(&self, other: &Signal) -> bool {
        self.meta.source_location == other.meta.source_location && self.meta.tag == other.meta.tag
    }

    pub fn is_unreadable(&self) -> bool {
        self.unreadable.is_some()
    }

    pub fn state(&self) -> LoadState {
        if self.unreadable.is_some() {
            return LoadState::Unreadable;
        }
        match *self.cell.lock().unwrap_or_else(|e| e.into_inner()) {
            Cell::Unloaded => LoadState::Unloaded,
            Cell::Loaded(_) => LoadState::Loaded,
            Cell::Evicted => LoadState::Evicted,
        }
    }

    /// Number of successful materializations so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Return cached data, loading it through `registry` first if needed.
    pub(crate) fn data(&self, registry: &FormatRegistry) -> Result<Arc<SampleArray>, DataError> {
        let mut cell = self.cell.lock().unwrap_or_else(|e| e.into_inner());
        if let Cell::Loaded(samples) = &*cell {
            return Ok(samples.clone());
        }

        if let Some(reason) = &self.unreadable {
            return Err(DataError::Load {
                location: self.meta.source_location.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, reason.clone()),
            });
        }

        let adapter = registry.resolve(&self.meta.format)?;
        debug!("Loading {} via `{}`", self.key(), self.meta.format);
        let samples = adapter
            .load(&self.meta.source_location, self.meta.dtype)
            .map_err(|source| DataError::Load {
                location: self.meta.source_location.clone(),
                source,
            })?;
        check_integrity(&self.meta, &samples, adapter.sample_tolerance())?;

        let samples = Arc::new(samples);
        *cell = Cell::Loaded(samples.clone());
        let n = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "Loaded {} ({} samples, load #{})",
            self.key(),
            samples.len(),
            n
        );
        Ok(samples)
    }

    /// Drop cached data. Returns whether anything was released.
    pub(crate) fn evict(&self) -> bool {
        let mut cell = self.cell.lock().unwrap_or_else(|e| e.into_inner());
        if matches!(*cell, Cell::Loaded(_)) {
            *cell = Cell::Evicted;
            debug!("Evicted {}", self.key());
            true
        } else {
            false
        }
    }
}

/// Loaded length and dtype must match the declared metadata.
fn check_integrity(meta: &SignalMeta, samples: &SampleArray, tolerance: usize) -> Result<(), DataError> {
    if samples.dtype() != meta.dtype {
        return Err(DataError::DataIntegrity {
            location: meta.source_location.clone(),
            reason: format!("declared dtype {} but adapter returned {}", meta.dtype, samples.dtype()),
        });
    }

    let expected = meta.expected_samples();
    let actual = samples.len();
    if actual.abs_diff(expected) > tolerance {
        return Err(DataError::DataIntegrity {
            location: meta.source_location.clone(),
            reason: format!(
                "expected {} samples ({}s at {}Hz, tolerance {}), got {}",
                expected, meta.duration, meta.sampling_rate, tolerance, actual
            ),
        });
    }
    Ok(())
}
