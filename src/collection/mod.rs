//! Batch discovery: from a root directory and manifest(s) to an ordered
//! collection of recordings.
//!
//! Structure fails fast (malformed manifests, missing parameter files,
//! duplicate ids). Missing signal data fails lazily on first access.

pub mod manifest;

pub use manifest::{load_manifest, ManifestEntry};

use crate::config::DiscoveryConfig;
use crate::error::DiscoveryError;
use crate::formats::FormatRegistry;
use crate::recording::Recording;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Where the manifest(s) for a batch come from.
#[derive(Debug, Clone, PartialEq)]
pub enum ManifestSource {
    /// A single manifest file, relative to the root unless absolute.
    File(PathBuf),
    /// Every file called `file_name` under the root.
    Scan { file_name: String, recursive: bool },
}

/// Input to [`discover`].
#[derive(Debug, Clone)]
pub struct BatchDescription {
    pub root: PathBuf,
    pub manifest: ManifestSource,
    /// Flag signals with missing source files as unreadable.
    pub check_files: bool,
    /// Directory names skipped while scanning.
    pub excludes: Vec<String>,
}

impl BatchDescription {
    /// Batch described by one manifest file.
    pub fn manifest(root: impl Into<PathBuf>, manifest: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            manifest: ManifestSource::File(manifest.into()),
            check_files: true,
            excludes: Vec::new(),
        }
    }

    /// Batch made of every manifest named `file_name` under `root`.
    pub fn scan(root: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            manifest: ManifestSource::Scan {
                file_name: file_name.into(),
                recursive: true,
            },
            check_files: true,
            excludes: Vec::new(),
        }
    }

    /// Scan `root` using the discovery settings from a config file.
    pub fn from_config(root: impl Into<PathBuf>, config: &DiscoveryConfig) -> Self {
        Self {
            root: root.into(),
            manifest: ManifestSource::Scan {
                file_name: config.manifest_name.clone(),
                recursive: config.recursive,
            },
            check_files: config.check_files,
            excludes: config.excludes.clone(),
        }
    }

    /// Manifest paths in discovery order.
    pub fn manifest_paths(&self) -> Result<Vec<PathBuf>, DiscoveryError> {
        if !self.root.is_dir() {
            return Err(DiscoveryError::MissingRoot(self.root.clone()));
        }

        match &self.manifest {
            ManifestSource::File(path) => {
                let path = self.root.join(path);
                if !path.is_file() {
                    return Err(DiscoveryError::Read {
                        source: std::io::Error::new(std::io::ErrorKind::NotFound, "manifest not found"),
                        path,
                    });
                }
                Ok(vec![path])
            }
            ManifestSource::Scan {
                file_name,
                recursive,
            } => {
                let walker = WalkDir::new(&self.root)
                    .max_depth(if *recursive { usize::MAX } else { 1 })
                    .sort_by_file_name()
                    .into_iter()
                    .filter_entry(|entry| entry.depth() == 0 || !self.is_excluded(entry));

                let mut found = Vec::new();
                for entry in walker {
                    let entry = entry.map_err(|e| DiscoveryError::Read {
                        path: e.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone()),
                        source: e.into(),
                    })?;
                    if entry.file_type().is_file() && entry.file_name().to_str() == Some(file_name.as_str()) {
                        found.push(entry.into_path());
                    }
                }

                if found.is_empty() {
                    return Err(DiscoveryError::NoManifest {
                        root: self.root.clone(),
                        name: file_name.clone(),
                    });
                }
                Ok(found)
            }
        }
    }

    fn is_excluded(&self, entry: &walkdir::DirEntry) -> bool {
        if !entry.file_type().is_dir() {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        name.starts_with('.') || self.excludes.iter().any(|pattern| name == pattern.as_str())
    }
}

/// Ordered set of recordings for one batch.
#[derive(Debug, Default)]
pub struct Collection {
    root: PathBuf,
    recordings: Vec<Arc<Recording>>,
}

impl Collection {
    /// Build a collection from recordings constructed in code.
    pub fn from_recordings(root: impl Into<PathBuf>, recordings: Vec<Recording>) -> Self {
        Self {
            root: root.into(),
            recordings: recordings.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.recordings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recordings.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Recording>> {
        self.recordings.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Recording>> {
        self.recordings.iter()
    }

    /// Recording ids in collection order.
    pub fn ids(&self) -> Vec<&str> {
        self.recordings.iter().map(|r| r.id()).collect()
    }

    pub fn find(&self, id: &str) -> Option<&Arc<Recording>> {
        self.recordings.iter().find(|r| r.id() == id)
    }

    /// Stable reorder; the new order is what the pipeline reports in.
    pub fn sort_by_key<K: Ord>(&mut self, mut key: impl FnMut(&Recording) -> K) {
        self.recordings.sort_by_key(|r| key(r));
    }

    /// Keep only recordings matching `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&Recording) -> bool) {
        self.recordings.retain(|r| keep(r));
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Arc<Recording>;
    type IntoIter = std::slice::Iter<'a, Arc<Recording>>;

    fn into_iter(self) -> Self::IntoIter {
        self.recordings.iter()
    }
}

/// Discover every experiment in `batch`, in manifest order.
///
/// No partial collection is returned: any structural problem aborts.
pub fn discover(batch: &BatchDescription, registry: Arc<FormatRegistry>) -> Result<Collection, DiscoveryError> {
    let manifests = batch.manifest_paths()?;
    info!(
        "Parsing {} manifest(s) under {}",
        manifests.len(),
        batch.root.display()
    );

    let mut ids = HashSet::new();
    let mut recordings = Vec::new();
    for (i, path) in manifests.iter().enumerate() {
        debug!("Parsing manifest {} of {} at {}", i + 1, manifests.len(), path.display());
        for entry in load_manifest(path, batch.check_files)? {
            let id = entry.experiment.id().to_string();
            if !ids.insert(id.clone()) {
                return Err(DiscoveryError::DuplicateId(id));
            }
            let recording = Recording::with_unreadable(
                entry.experiment,
                registry.clone(),
                entry.unreadable,
                Some(path.clone()),
            );
            recordings.push(Arc::new(recording));
        }
    }

    info!("Discovered {} recording(s)", recordings.len());
    Ok(Collection {
        root: batch.root.clone(),
        recordings,
    })
}
