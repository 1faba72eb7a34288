//! Format adapter registry.
//!
//! Process-wide, read-mostly state keyed by format identifier. Replacing an
//! adapter never revokes data already loaded through the old one.

use super::SampleArray;
use crate::error::DataError;
use crate::models::{Dtype, SignalMeta};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock, RwLock};
use tracing::{debug, warn};

/// Loader capability supplied by a format-specific reader.
pub trait FormatAdapter: Send + Sync {
    /// Whether this adapter understands `format_id`.
    fn can_load(&self, format_id: &str) -> bool;

    /// Read the raw samples stored at `source`.
    fn load(&self, source: &Path, dtype: Dtype) -> std::io::Result<SampleArray>;

    /// Allowed difference, in samples, between the loaded length and
    /// `duration * sampling_rate`.
    fn sample_tolerance(&self) -> usize {
        1
    }
}

type LoadFn = dyn Fn(&Path, Dtype) -> std::io::Result<SampleArray> + Send + Sync;

/// Adapter backed by a closure, for readers that need no state.
pub struct FnAdapter {
    format_id: String,
    tolerance: usize,
    load: Box<LoadFn>,
}

impl FnAdapter {
    pub fn new<F>(format_id: impl Into<String>, load: F) -> Self
    where
        F: Fn(&Path, Dtype) -> std::io::Result<SampleArray> + Send + Sync + 'static,
    {
        Self {
            format_id: format_id.into(),
            tolerance: 1,
            load: Box::new(load),
        }
    }

    pub fn with_tolerance(mut self, tolerance: usize) -> Self {
        self.tolerance = tolerance;
        self
    }
}

impl FormatAdapter for FnAdapter {
    fn can_load(&self, format_id: &str) -> bool {
        self.format_id == format_id
    }

    fn load(&self, source: &Path, dtype: Dtype) -> std::io::Result<SampleArray> {
        (self.load)(source, dtype)
    }

    fn sample_tolerance(&self) -> usize {
        self.tolerance
    }
}

#[derive(Default)]
struct Entries {
    by_id: HashMap<String, Arc<dyn FormatAdapter>>,
    /// Registration order, used for `can_load` fallback.
    order: Vec<(String, Arc<dyn FormatAdapter>)>,
}

/// Maps format identifiers to loader capabilities.
#[derive(Default)]
pub struct FormatRegistry {
    entries: RwLock<Entries>,
}

impl fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatRegistry")
            .field("formats", &self.formats())
            .finish()
    }
}

impl FormatRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry, empty until adapters are registered.
    pub fn global() -> Arc<FormatRegistry> {
        static GLOBAL: OnceLock<Arc<FormatRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(FormatRegistry::new())).clone()
    }

    /// Register `adapter` under `format_id`. A later registration for the
    /// same id takes over new lookups and keeps the fallback position of
    /// the adapter it replaces.
    pub fn register(&self, format_id: impl Into<String>, adapter: Arc<dyn FormatAdapter>) {
        let format_id = format_id.into();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.by_id.contains_key(&format_id) {
            warn!("Format adapter for `{}` replaced", format_id);
        } else {
            debug!("Registered format adapter for `{}`", format_id);
        }
        entries.by_id.insert(format_id.clone(), adapter.clone());
        match entries.order.iter_mut().find(|(id, _)| *id == format_id) {
            Some(slot) => slot.1 = adapter,
            None => entries.order.push((format_id, adapter)),
        }
    }

    /// Find the adapter responsible for `format_id`: an exact registration
    /// first, then the first adapter (in registration order) that claims it.
    pub fn resolve(&self, format_id: &str) -> Result<Arc<dyn FormatAdapter>, DataError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        if let Some(adapter) = entries.by_id.get(format_id) {
            return Ok(adapter.clone());
        }
        entries
            .order
            .iter()
            .find(|(_, adapter)| adapter.can_load(format_id))
            .map(|(_, adapter)| adapter.clone())
            .ok_or_else(|| DataError::UnsupportedFormat(format_id.to_string()))
    }

    pub fn supports(&self, format_id: &str) -> bool {
        self.resolve(format_id).is_ok()
    }

    /// Load the raw samples for a signal. No integrity checks are applied here.
    pub fn load(&self, signal: &SignalMeta) -> Result<SampleArray, DataError> {
        let adapter = self.resolve(&signal.format)?;
        adapter
            .load(&signal.source_location, signal.dtype)
            .map_err(|source| DataError::Load {
                location: signal.source_location.clone(),
                source,
            })
    }

    /// Registered format identifiers, sorted.
    pub fn formats(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = entries.by_id.keys().cloned().collect();
        ids.sort();
        ids
    }
}
