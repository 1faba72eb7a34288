//! Metadata schema for experiments and signals.
//!
//! These are pure value types. Validation happens at construction
//! (`SignalMeta::validate`, `Experiment::new`); nothing here performs I/O.

use crate::error::SchemaError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Declared element type of the raw samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    Uint8,
    Int16,
    Int32,
    Float32,
    Float64,
}

impl Dtype {
    /// Size of one sample in bytes.
    pub fn size_of(&self) -> usize {
        match self {
            Dtype::Uint8 => 1,
            Dtype::Int16 => 2,
            Dtype::Int32 | Dtype::Float32 => 4,
            Dtype::Float64 => 8,
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dtype::Uint8 => write!(f, "uint8"),
            Dtype::Int16 => write!(f, "int16"),
            Dtype::Int32 => write!(f, "int32"),
            Dtype::Float32 => write!(f, "float32"),
            Dtype::Float64 => write!(f, "float64"),
        }
    }
}

impl std::str::FromStr for Dtype {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uint8" | "u8" => Ok(Dtype::Uint8),
            "int16" | "i16" => Ok(Dtype::Int16),
            "int32" | "i32" => Ok(Dtype::Int32),
            "float32" | "f32" => Ok(Dtype::Float32),
            "float64" | "f64" => Ok(Dtype::Float64),
            other => Err(SchemaError::InvalidValue {
                field: "dtype",
                reason: format!("unknown dtype `{}`", other),
            }),
        }
    }
}

/// Free-form spatial descriptor: coordinates or an electrode-site id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Geometry {
    Coordinates(Vec<f64>),
    Site(String),
}

/// One channel map entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEntry {
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Geometry>,
}

impl ChannelEntry {
    pub fn new(region: impl Into<String>, location: Option<Geometry>) -> Self {
        Self {
            region: region.into(),
            location,
        }
    }
}

/// Ordered mapping from channel index to (region, location).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelMap(BTreeMap<u32, ChannelEntry>);

impl ChannelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, returning the map for chaining.
    pub fn with(mut self, channel: u32, entry: ChannelEntry) -> Self {
        self.0.insert(channel, entry);
        self
    }

    pub fn get(&self, channel: u32) -> Option<&ChannelEntry> {
        self.0.get(&channel)
    }

    pub fn contains(&self, channel: u32) -> bool {
        self.0.contains_key(&channel)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries in channel order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &ChannelEntry)> {
        self.0.iter().map(|(k, v)| (*k, v))
    }
}

impl FromIterator<(u32, ChannelEntry)> for ChannelMap {
    fn from_iter<I: IntoIterator<Item = (u32, ChannelEntry)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Opaque experiment-level configuration. Content is never validated.
pub type Parameters = BTreeMap<String, serde_json::Value>;

/// Entity identity of a signal within one experiment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalKey {
    pub source_location: PathBuf,
    pub tag: Option<String>,
}

impl fmt::Display for SignalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{} [{}]", self.source_location.display(), tag),
            None => write!(f, "{}", self.source_location.display()),
        }
    }
}

/// Declared metadata of one data stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMeta {
    /// Offset in seconds from the experiment timestamp.
    pub time: f64,
    /// Anatomical or functional region label.
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
    /// User-defined grouping label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Channel index into the experiment's channel map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<u32>,
    pub source_location: PathBuf,
    /// Format identifier resolved by the format registry.
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Hz.
    pub sampling_rate: f64,
    /// Seconds.
    pub duration: f64,
    pub dtype: Dtype,
}

impl SignalMeta {
    /// Create signal metadata with the required fields; optional ones start empty.
    pub fn new(
        region: impl Into<String>,
        source_location: impl Into<PathBuf>,
        format: impl Into<String>,
        sampling_rate: f64,
        duration: f64,
        dtype: Dtype,
    ) -> Self {
        Self {
            time: 0.0,
            region: region.into(),
            geometry: None,
            tag: None,
            channel: None,
            source_location: source_location.into(),
            format: format.into(),
            description: None,
            sampling_rate,
            duration,
            dtype,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_channel(mut self, channel: u32) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_time(mut self, time: f64) -> Self {
        self.time = time;
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Identity key: source location plus tag.
    pub fn key(&self) -> SignalKey {
        SignalKey {
            source_location: self.source_location.clone(),
            tag: self.tag.clone(),
        }
    }

    /// Number of samples implied by `duration * sampling_rate`.
    pub fn expected_samples(&self) -> usize {
        (self.duration * self.sampling_rate).round() as usize
    }

    pub fn source(&self) -> &Path {
        &self.source_location
    }

    /// Check field-level invariants that do not depend on the experiment.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.region.trim().is_empty() {
            return Err(SchemaError::MissingField("region"));
        }
        if self.format.trim().is_empty() {
            return Err(SchemaError::MissingField("format"));
        }
        if self.source_location.as_os_str().is_empty() {
            return Err(SchemaError::MissingField("source_location"));
        }
        if !self.time.is_finite() || self.time < 0.0 {
            return Err(SchemaError::InvalidValue {
                field: "time",
                reason: format!("must be a finite offset >= 0, got {}", self.time),
            });
        }
        if !self.sampling_rate.is_finite() || self.sampling_rate <= 0.0 {
            return Err(SchemaError::InvalidValue {
                field: "sampling_rate",
                reason: format!("must be positive, got {}", self.sampling_rate),
            });
        }
        if !self.duration.is_finite() || self.duration < 0.0 {
            return Err(SchemaError::InvalidValue {
                field: "duration",
                reason: format!("must be non-negative, got {}", self.duration),
            });
        }
        Ok(())
    }
}

/// One recording session's metadata bundle.
///
/// Immutable once constructed. Use [`Experiment::with_signal`] or
/// [`Experiment::without_signal`] to derive a modified copy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Experiment {
    id: String,
    timestamp: DateTime<Utc>,
    channel_map: ChannelMap,
    parameters: Parameters,
    signals: Vec<SignalMeta>,
}

impl Experiment {
    /// Build and validate an experiment.
    pub fn new(
        id: impl Into<String>,
        timestamp: DateTime<Utc>,
        channel_map: ChannelMap,
        parameters: Parameters,
        signals: Vec<SignalMeta>,
    ) -> Result<Self, SchemaError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(SchemaError::MissingField("id"));
        }
        if signals.is_empty() {
            return Err(SchemaError::NoSignals);
        }

        let mut seen = HashSet::new();
        for signal in &signals {
            check_signal(&channel_map, signal)?;
            if !seen.insert(signal.key()) {
                return Err(SchemaError::DuplicateSignal(signal.key().to_string()));
            }
        }

        Ok(Self {
            id,
            timestamp,
            channel_map,
            parameters,
            signals,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn channel_map(&self) -> &ChannelMap {
        &self.channel_map
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn signals(&self) -> &[SignalMeta] {
        &self.signals
    }

    /// Distinct regions across all signals.
    pub fn regions(&self) -> BTreeSet<&str> {
        self.signals.iter().map(|s| s.region.as_str()).collect()
    }

    /// Derive a new experiment with one more signal.
    pub fn with_signal(&self, signal: SignalMeta) -> Result<Self, SchemaError> {
        let mut signals = self.signals.clone();
        signals.push(signal);
        Self::new(
            self.id.clone(),
            self.timestamp,
            self.channel_map.clone(),
            self.parameters.clone(),
            signals,
        )
    }

    /// Derive a new experiment without the signal identified by `key`.
    pub fn without_signal(&self, key: &SignalKey) -> Result<Self, SchemaError> {
        let signals = self
            .signals
            .iter()
            .filter(|s| &s.key() != key)
            .cloned()
            .collect();
        Self::new(
            self.id.clone(),
            self.timestamp,
            self.channel_map.clone(),
            self.parameters.clone(),
            signals,
        )
    }

    /// Split into header and signals, used when a recording takes ownership.
    pub(crate) fn into_parts(self) -> (ExperimentHeader, Vec<SignalMeta>) {
        (
            ExperimentHeader {
                id: self.id,
                timestamp: self.timestamp,
                channel_map: self.channel_map,
                parameters: self.parameters,
            },
            self.signals,
        )
    }

    /// Reassemble parts that were validated when first constructed.
    pub(crate) fn from_parts(header: ExperimentHeader, signals: Vec<SignalMeta>) -> Self {
        Self {
            id: header.id,
            timestamp: header.timestamp,
            channel_map: header.channel_map,
            parameters: header.parameters,
            signals,
        }
    }
}

/// Experiment metadata without the signal set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentHeader {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub channel_map: ChannelMap,
    pub parameters: Parameters,
}

/// Validate a signal against an experiment's channel map.
pub(crate) fn check_signal(channel_map: &ChannelMap, signal: &SignalMeta) -> Result<(), SchemaError> {
    signal.validate()?;
    if let Some(channel) = signal.channel {
        if !channel_map.contains(channel) {
            return Err(SchemaError::UnknownChannel {
                signal: signal.key().to_string(),
                channel,
            });
        }
    }
    Ok(())
}
