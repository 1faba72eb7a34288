//! Batch manifest parsing.
//!
//! A manifest lists experiments, each with its timestamp, channel map,
//! parameters (inline and/or from a parameter file) and signals. TOML and
//! JSON are accepted, chosen by file extension:
//!
//! ```toml
//! [[experiment]]
//! id = "E1"
//! timestamp = "2020-03-01T12:00:00Z"
//! parameters_file = "params.toml"
//!
//! [experiment.channels]
//! "0" = { region = "CA1", location = [0.0, 0.0] }
//!
//! [[experiment.signal]]
//! region = "CA1"
//! channel = 0
//! source = "data/e1_ca1.bin"
//! format = "fmt_a"
//! sampling_rate = 1000.0
//! duration = 10.0
//! dtype = "float32"
//! ```
//!
//! Timestamps may be quoted strings or native TOML datetimes. Native TOML
//! datetimes inside parameters are stored as their string form.

use crate::error::{DiscoveryError, SchemaError};
use crate::models::{ChannelEntry, ChannelMap, Dtype, Experiment, Geometry, Parameters, SignalKey, SignalMeta};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    #[serde(default, rename = "experiment")]
    experiments: Vec<RawExperiment>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawExperiment {
    id: Option<String>,
    timestamp: Option<RawTimestamp>,
    #[serde(default)]
    channels: BTreeMap<String, ChannelEntry>,
    #[serde(default)]
    parameters: Parameters,
    parameters_file: Option<PathBuf>,
    #[serde(default, rename = "signal")]
    signals: Vec<RawSignal>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Toml(toml::value::Datetime),
    Text(String),
}

impl RawTimestamp {
    fn parse(&self) -> Result<DateTime<Utc>, SchemaError> {
        match self {
            RawTimestamp::Toml(dt) => parse_timestamp(&dt.to_string()),
            RawTimestamp::Text(s) => parse_timestamp(s),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSignal {
    region: Option<String>,
    tag: Option<String>,
    channel: Option<u32>,
    source: Option<PathBuf>,
    format: Option<String>,
    sampling_rate: Option<f64>,
    duration: Option<f64>,
    dtype: Option<String>,
    time: Option<f64>,
    geometry: Option<Geometry>,
    description: Option<String>,
}

/// One experiment read from a manifest, with the signals whose source
/// files were missing at discovery time.
#[derive(Debug)]
pub struct ManifestEntry {
    pub experiment: Experiment,
    pub unreadable: HashMap<SignalKey, String>,
}

/// Parse a manifest and validate every experiment it lists.
///
/// Signal paths are resolved relative to the manifest's directory. When
/// `check_files` is set, signals whose source is missing are flagged
/// unreadable instead of failing discovery.
pub fn load_manifest(path: &Path, check_files: bool) -> Result<Vec<ManifestEntry>, DiscoveryError> {
    let raw: RawManifest = read_structured(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    if raw.experiments.is_empty() {
        return Err(malformed(path, "manifest lists no experiments"));
    }

    raw.experiments
        .into_iter()
        .enumerate()
        .map(|(index, exp)| build_entry(path, base, index, exp, check_files))
        .collect()
}

fn build_entry(
    manifest: &Path,
    base: &Path,
    index: usize,
    raw: RawExperiment,
    check_files: bool,
) -> Result<ManifestEntry, DiscoveryError> {
    let id = raw
        .id
        .clone()
        .ok_or_else(|| malformed(manifest, format!("experiment #{} has no `id`", index + 1)))?;
    let schema_err = |source: SchemaError| DiscoveryError::Schema {
        manifest: manifest.to_path_buf(),
        id: id.clone(),
        source,
    };

    let timestamp = raw
        .timestamp
        .as_ref()
        .ok_or(SchemaError::MissingField("timestamp"))
        .and_then(RawTimestamp::parse)
        .map_err(schema_err)?;

    let mut channel_map = ChannelMap::new();
    for (key, entry) in raw.channels {
        let channel: u32 = key.trim().parse().map_err(|_| {
            malformed(manifest, format!("experiment `{}`: channel key `{}` is not an index", id, key))
        })?;
        channel_map = channel_map.with(channel, entry);
    }

    let mut parameters = Parameters::new();
    if let Some(file) = &raw.parameters_file {
        let resolved = base.join(file);
        if !resolved.exists() {
            return Err(DiscoveryError::MissingFile {
                manifest: manifest.to_path_buf(),
                missing: resolved,
            });
        }
        let from_file: Parameters = read_structured(&resolved)?;
        debug!("Read {} parameter(s) from {}", from_file.len(), resolved.display());
        parameters.extend(from_file);
    }
    // inline values override the parameter file
    parameters.extend(raw.parameters);
    parameters.values_mut().for_each(flatten_toml_datetimes);

    let mut signals = Vec::with_capacity(raw.signals.len());
    let mut unreadable = HashMap::new();
    for raw_signal in raw.signals {
        let meta = build_signal(base, raw_signal).map_err(schema_err)?;
        if check_files && is_local(&meta.source_location) && !meta.source_location.exists() {
            warn!(
                "Experiment `{}`: source {} not found, signal marked unreadable",
                id,
                meta.source_location.display()
            );
            unreadable.insert(
                meta.key(),
                format!("source file not found: {}", meta.source_location.display()),
            );
        }
        signals.push(meta);
    }

    let experiment = Experiment::new(id.clone(), timestamp, channel_map, parameters, signals)
        .map_err(schema_err)?;

    Ok(ManifestEntry {
        experiment,
        unreadable,
    })
}

fn build_signal(base: &Path, raw: RawSignal) -> Result<SignalMeta, SchemaError> {
    let region = raw.region.ok_or(SchemaError::MissingField("region"))?;
    let source = raw.source.ok_or(SchemaError::MissingField("source"))?;
    let format = raw.format.ok_or(SchemaError::MissingField("format"))?;
    let sampling_rate = raw.sampling_rate.ok_or(SchemaError::MissingField("sampling_rate"))?;
    let duration = raw.duration.ok_or(SchemaError::MissingField("duration"))?;
    let dtype: Dtype = raw.dtype.ok_or(SchemaError::MissingField("dtype"))?.parse()?;

    let source_location = if is_local(&source) { base.join(source) } else { source };

    let meta = SignalMeta {
        time: raw.time.unwrap_or(0.0),
        region,
        geometry: raw.geometry,
        tag: raw.tag,
        channel: raw.channel,
        source_location,
        format,
        description: raw.description,
        sampling_rate,
        duration,
        dtype,
    };
    meta.validate()?;
    Ok(meta)
}

/// Key under which `toml` hands datetimes to non-TOML deserializers.
const TOML_DATETIME_KEY: &str = "$__toml_private_datetime";

/// Replace `{"$__toml_private_datetime": "..."}` maps with the plain string.
fn flatten_toml_datetimes(value: &mut Value) {
    let replacement = match value {
        Value::Object(map) if map.len() == 1 => match map.get(TOML_DATETIME_KEY) {
            Some(Value::String(s)) => Some(Value::String(s.clone())),
            _ => None,
        },
        _ => None,
    };
    if let Some(replacement) = replacement {
        *value = replacement;
        return;
    }
    match value {
        Value::Object(map) => map.values_mut().for_each(flatten_toml_datetimes),
        Value::Array(items) => items.iter_mut().for_each(flatten_toml_datetimes),
        _ => {}
    }
}

/// Accepts RFC 3339, an offset-less ISO datetime or `YYYY-MM-DD HH:MM:SS`
/// (both taken as UTC), or a bare date.
fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, SchemaError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Some(naive) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(naive.and_utc());
    }
    Err(SchemaError::InvalidValue {
        field: "timestamp",
        reason: format!("cannot parse `{}`", value),
    })
}

/// URIs such as `s3://bucket/key` are left to the adapter.
fn is_local(path: &Path) -> bool {
    !path.to_string_lossy().contains("://")
}

fn read_structured<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, DiscoveryError> {
    let content = fs::read_to_string(path).map_err(|source| DiscoveryError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&content).map_err(|e| malformed(path, e.to_string())),
        Some("json") => serde_json::from_str(&content).map_err(|e| malformed(path, e.to_string())),
        _ => Err(DiscoveryError::UnsupportedManifest(path.to_path_buf())),
    }
}

fn malformed(path: &Path, reason: impl Into<String>) -> DiscoveryError {
    DiscoveryError::Malformed {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}
