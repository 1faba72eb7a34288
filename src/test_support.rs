//! Shared fixtures for unit tests.

use crate::formats::{FnAdapter, FormatRegistry, SampleArray};
use crate::models::{ChannelEntry, ChannelMap, Dtype, Experiment, Geometry, Parameters, SignalMeta};
use chrono::{TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Samples produced by the counting adapter for every source.
pub const SAMPLES: usize = 100;

/// Registry with one deterministic `fmt_a` adapter that counts its calls.
pub fn counting_registry() -> (FormatRegistry, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let registry = FormatRegistry::new();
    registry.register(
        "fmt_a",
        Arc::new(FnAdapter::new("fmt_a", move |path, _dtype| {
            counter.fetch_add(1, Ordering::SeqCst);
            let phase = path.to_string_lossy().len() as f32;
            Ok(SampleArray::Float32(
                (0..SAMPLES).map(|i| (i as f32 * 0.1 + phase).sin()).collect(),
            ))
        })),
    );
    (registry, calls)
}

/// Float32 signal sampled at 100 Hz, long enough for `n_samples`.
pub fn f32_signal(region: &str, source: &str, n_samples: usize) -> SignalMeta {
    SignalMeta::new(
        region,
        source,
        "fmt_a",
        100.0,
        n_samples as f64 / 100.0,
        Dtype::Float32,
    )
}

/// Experiment with a four-channel CA1/CA3 map.
pub fn experiment(id: &str, signals: Vec<SignalMeta>) -> Experiment {
    let channel_map: ChannelMap = (0..4u32)
        .map(|ch| {
            let region = if ch < 2 { "CA1" } else { "CA3" };
            (
                ch,
                ChannelEntry::new(region, Some(Geometry::Coordinates(vec![ch as f64, 0.0]))),
            )
        })
        .collect();
    let timestamp = Utc
        .with_ymd_and_hms(2021, 6, 1, 9, 30, 0)
        .single()
        .unwrap_or_else(Utc::now);
    Experiment::new(id, timestamp, channel_map, Parameters::new(), signals)
        .expect("test experiment must be valid")
}
