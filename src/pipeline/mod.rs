//! Batch pipeline runner.
//!
//! Fans (recording, method) tasks out over a bounded set of blocking
//! workers. Capability checks happen before any data is touched, and a
//! failing task becomes a `Failed` row instead of aborting the batch.

pub mod table;

pub use table::{BatchSummary, ResultRow, ResultTable, StatusCounts, TaskStatus};

use crate::analysis::{AnalysisMethod, AnalysisRegistry, CancelToken, MethodContext, Options};
use crate::collection::{discover, BatchDescription, Collection};
use crate::config::PipelineConfig;
use crate::error::{AnalysisError, Error, RegistryError};
use crate::formats::FormatRegistry;
use crate::recording::Recording;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinError;
use tracing::{debug, info, warn};

/// Runtime settings for one batch run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Options per method name, handed over through the method context.
    pub options: HashMap<String, Options>,
    /// Maximum number of tasks in flight.
    pub concurrency: usize,
    /// Draw a progress bar on stderr.
    pub show_progress: bool,
    /// Cooperative deadline, counted from the task's start.
    pub task_timeout: Option<Duration>,
    /// Evict a recording's data once all its tasks are done.
    pub evict_after_task: bool,
    pub cancel: CancelToken,
    /// Where method names are resolved.
    pub analyses: Arc<AnalysisRegistry>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            options: HashMap::new(),
            concurrency: 4,
            show_progress: false,
            task_timeout: None,
            evict_after_task: false,
            cancel: CancelToken::new(),
            analyses: AnalysisRegistry::global(),
        }
    }
}

impl From<&PipelineConfig> for RunConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            show_progress: config.show_progress,
            task_timeout: config.task_timeout_seconds.map(Duration::from_secs),
            evict_after_task: config.evict_after_task,
            ..Self::default()
        }
    }
}

impl RunConfig {
    pub fn with_analyses(mut self, analyses: Arc<AnalysisRegistry>) -> Self {
        self.analyses = analyses;
        self
    }

    pub fn with_options(mut self, method: impl Into<String>, options: Options) -> Self {
        self.options.insert(method.into(), options);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A runnable task that passed its capability check.
struct Task {
    index: usize,
    recording: Arc<Recording>,
    method: AnalysisMethod,
    /// Tasks of this recording not yet finished.
    remaining: Arc<AtomicUsize>,
}

/// Run every method in `methods` over every recording of `collection`.
///
/// Fails only when a method name is unknown. Per-task problems are
/// reported in the returned table.
pub async fn run(collection: &Collection, methods: &[&str], config: &RunConfig) -> Result<ResultTable, RegistryError> {
    let started_at = Utc::now();
    let start = Instant::now();

    let resolved = methods
        .iter()
        .map(|name| config.analyses.resolve(name))
        .collect::<Result<Vec<_>, _>>()?;

    info!(
        "Running {} method(s) over {} recording(s)",
        resolved.len(),
        collection.len()
    );

    let mut rows: Vec<Option<ResultRow>> = vec![None; collection.len() * resolved.len()];
    let mut tasks = Vec::new();

    for (ri, recording) in collection.iter().enumerate() {
        let remaining = Arc::new(AtomicUsize::new(0));
        for (mi, method) in resolved.iter().enumerate() {
            let index = ri * resolved.len() + mi;
            match method.requirements().check(recording) {
                Ok(()) => {
                    remaining.fetch_add(1, Ordering::SeqCst);
                    tasks.push(Task {
                        index,
                        recording: recording.clone(),
                        method: method.clone(),
                        remaining: remaining.clone(),
                    });
                }
                Err(reason) => {
                    transition(recording.id(), method.name(), TaskStatus::Pending, TaskStatus::Skipped, &reason);
                    rows[index] = Some(ResultRow::skipped(recording.id(), method.name(), reason));
                }
            }
        }
    }

    let progress = progress_bar(config.show_progress, tasks.len());

    let finished: Vec<(usize, ResultRow)> = stream::iter(tasks)
        .map(|task| {
            let progress = progress.clone();
            async move {
                let index = task.index;
                let row = run_task(task, config).await;
                if let Some(pb) = &progress {
                    pb.inc(1);
                }
                (index, row)
            }
        })
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    for (index, row) in finished {
        rows[index] = Some(row);
    }

    let table = ResultTable::new(
        resolved.iter().map(|m| m.name().to_string()).collect(),
        rows.into_iter().flatten().collect(),
        started_at,
        start.elapsed().as_secs_f64(),
    );

    let summary = table.summary();
    info!(
        "Batch finished in {:.1}s: {} succeeded, {} skipped, {} failed",
        table.duration_seconds, summary.counts.succeeded, summary.counts.skipped, summary.counts.failed
    );

    Ok(table)
}

/// Discover `batch` and run `methods` over it.
///
/// Method names are checked before discovery starts.
pub async fn run_batch(
    batch: &BatchDescription,
    formats: Arc<FormatRegistry>,
    methods: &[&str],
    config: &RunConfig,
) -> Result<ResultTable, Error> {
    for name in methods {
        config.analyses.resolve(name)?;
    }
    let collection = discover(batch, formats)?;
    Ok(run(&collection, methods, config).await?)
}

async fn run_task(task: Task, config: &RunConfig) -> ResultRow {
    let Task {
        recording,
        method,
        remaining,
        ..
    } = task;
    let id = recording.id().to_string();
    let name = method.name().to_string();

    if config.cancel.is_cancelled() {
        transition(&id, &name, TaskStatus::Pending, TaskStatus::Skipped, "cancelled");
        release(&recording, &remaining, config.evict_after_task);
        return ResultRow::skipped(&id, &name, "cancelled");
    }

    transition(&id, &name, TaskStatus::Pending, TaskStatus::Running, "");
    let ctx = MethodContext::new(config.options.get(&name).cloned().unwrap_or_default())
        .with_deadline(config.task_timeout.map(|t| Instant::now() + t))
        .with_cancel(config.cancel.clone());

    let worker = recording.clone();
    let outcome = tokio::task::spawn_blocking(move || method.call(&worker, &ctx)).await;

    let row = match outcome {
        Ok(Ok(fields)) => {
            transition(&id, &name, TaskStatus::Running, TaskStatus::Succeeded, "");
            ResultRow::succeeded(&id, &name, fields)
        }
        Ok(Err(AnalysisError::Cancelled)) => {
            transition(&id, &name, TaskStatus::Running, TaskStatus::Skipped, "cancelled");
            ResultRow::skipped(&id, &name, "cancelled")
        }
        Ok(Err(e)) => {
            transition(&id, &name, TaskStatus::Running, TaskStatus::Failed, e.kind());
            warn!("{} / {} failed: {}", id, name, e);
            ResultRow::failed(&id, &name, e.kind(), e.to_string())
        }
        Err(e) => {
            let message = panic_message(e);
            transition(&id, &name, TaskStatus::Running, TaskStatus::Failed, "panic");
            warn!("{} / {}: method panicked: {}", id, name, message);
            ResultRow::failed(&id, &name, "panic", message)
        }
    };

    release(&recording, &remaining, config.evict_after_task);
    row
}

/// Log a task state change. Illegal transitions trip a debug assertion.
fn transition(recording: &str, method: &str, from: TaskStatus, to: TaskStatus, note: &str) {
    debug_assert!(from.can_become(to), "illegal task transition {} -> {}", from, to);
    if note.is_empty() {
        debug!("{} / {}: {} -> {}", recording, method, from, to);
    } else {
        debug!("{} / {}: {} -> {} ({})", recording, method, from, to, note);
    }
}

/// Count one finished task and evict once the recording has none left.
fn release(recording: &Recording, remaining: &AtomicUsize, evict: bool) {
    if remaining.fetch_sub(1, Ordering::SeqCst) == 1 && evict {
        let evicted = recording.evict_all();
        debug!("Evicted {} signal(s) of {}", evicted, recording.id());
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "analysis method panicked".to_string()
    }
}

fn progress_bar(show: bool, len: usize) -> Option<ProgressBar> {
    if !show {
        return None;
    }
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} tasks ({eta})")
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    Some(pb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Requirements, ResultFields};
    use crate::formats::{FnAdapter, SampleArray};
    use crate::models::{ChannelEntry, ChannelMap, Dtype, Experiment, Geometry, Parameters, SignalMeta};
    use crate::test_support::{counting_registry, experiment, f32_signal};
    use serde_json::Value;

    fn collection(recordings: Vec<Recording>) -> Collection {
        Collection::from_recordings("/batch", recordings)
    }

    fn mean_of_all(rec: &Recording, _: &MethodContext) -> Result<ResultFields, AnalysisError> {
        let mut total = 0.0;
        let mut n = 0usize;
        for signal in rec.signals() {
            let data = rec.get_signal_data(&signal)?;
            total += data.to_f64_vec().iter().sum::<f64>();
            n += data.len();
        }
        let mut out = ResultFields::new();
        out.insert("mean".to_string(), Value::from(total / n.max(1) as f64));
        Ok(out)
    }

    fn pearson(a: &[f64], b: &[f64]) -> f64 {
        let n = a.len().min(b.len()) as f64;
        let ma = a.iter().sum::<f64>() / n;
        let mb = b.iter().sum::<f64>() / n;
        let (mut cov, mut va, mut vb) = (0.0, 0.0, 0.0);
        for (x, y) in a.iter().zip(b) {
            cov += (x - ma) * (y - mb);
            va += (x - ma).powi(2);
            vb += (y - mb).powi(2);
        }
        cov / (va.sqrt() * vb.sqrt())
    }

    #[tokio::test]
    async fn test_two_region_coherence_succeeds() {
        let formats = FormatRegistry::new();
        formats.register(
            "fmt_a",
            Arc::new(FnAdapter::new("fmt_a", |_, _| {
                Ok(SampleArray::Float32((0..10_000).map(|i| (i as f32 * 0.01).sin()).collect()))
            })),
        );
        let channel_map = ChannelMap::new()
            .with(0, ChannelEntry::new("CA1", Some(Geometry::Coordinates(vec![0.0, 0.0]))))
            .with(1, ChannelEntry::new("CA3", Some(Geometry::Coordinates(vec![1.0, 0.0]))));
        let s1 = SignalMeta::new("CA1", "s1.bin", "fmt_a", 1000.0, 10.0, Dtype::Float32).with_channel(0);
        let s2 = SignalMeta::new("CA3", "s2.bin", "fmt_a", 1000.0, 10.0, Dtype::Float32).with_channel(1);
        let e1 = Experiment::new("E1", Utc::now(), channel_map, Parameters::new(), vec![s1, s2]).unwrap();

        let analyses = Arc::new(AnalysisRegistry::new());
        analyses
            .register("coherence", Requirements::none().min_regions(2), |rec, _| {
                let ca1 = rec.select(Some("CA1"), None).iter().next();
                let ca3 = rec.select(Some("CA3"), None).iter().next();
                let (Some(ca1), Some(ca3)) = (ca1, ca3) else {
                    return Err(AnalysisError::failed("missing region"));
                };
                let a = rec.get_signal_data(&ca1)?.to_f64_vec();
                let b = rec.get_signal_data(&ca3)?.to_f64_vec();
                let mut out = ResultFields::new();
                out.insert("coherence".to_string(), Value::from(pearson(&a, &b)));
                Ok(out)
            })
            .unwrap();

        let batch = collection(vec![Recording::new(e1, Arc::new(formats))]);
        let config = RunConfig::default().with_analyses(analyses);
        let table = run(&batch, &["coherence"], &config).await.unwrap();

        assert_eq!(table.len(), 1);
        let row = &table.rows()[0];
        assert_eq!(row.recording, "E1");
        assert_eq!(row.method, "coherence");
        assert_eq!(row.status, TaskStatus::Succeeded);
        let value = row.fields["coherence"].as_f64().unwrap();
        assert!((value - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unmet_region_skips_without_loading() {
        let (formats, calls) = counting_registry();
        let exp = experiment("E1", vec![f32_signal("CA3", "a.bin", 100)]);
        let batch = collection(vec![Recording::new(exp, Arc::new(formats))]);

        let analyses = Arc::new(AnalysisRegistry::new());
        analyses
            .register("ca1_mean", Requirements::none().region("CA1"), mean_of_all)
            .unwrap();

        let config = RunConfig::default().with_analyses(analyses);
        let table = run(&batch, &["ca1_mean"], &config).await.unwrap();

        let row = &table.rows()[0];
        assert_eq!(row.status, TaskStatus::Skipped);
        assert_eq!(row.error.as_deref(), Some("no signal in region `CA1`"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_batch() {
        let (formats, _) = counting_registry();
        let formats = Arc::new(formats);
        let recordings = (0..4)
            .map(|i| {
                let id = format!("E{}", i);
                let exp = experiment(&id, vec![f32_signal("CA1", &format!("{}.bin", id), 100)]);
                Recording::new(exp, formats.clone())
            })
            .collect();
        let batch = collection(recordings);

        let analyses = Arc::new(AnalysisRegistry::new());
        analyses
            .register("mean", Requirements::none(), |rec, ctx| {
                if rec.id() == "E2" {
                    return Err(AnalysisError::failed("bad trace"));
                }
                mean_of_all(rec, ctx)
            })
            .unwrap();

        let config = RunConfig::default().with_analyses(analyses).with_concurrency(2);
        let table = run(&batch, &["mean"], &config).await.unwrap();

        assert_eq!(table.len(), 4);
        let ids: Vec<&str> = table.rows().iter().map(|r| r.recording.as_str()).collect();
        assert_eq!(ids, vec!["E0", "E1", "E2", "E3"]);
        let failed: Vec<&ResultRow> = table.failed().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].recording, "E2");
        assert_eq!(failed[0].error_kind.as_deref(), Some("analysis"));
        assert_eq!(table.summary().counts.succeeded, 3);
    }

    #[tokio::test]
    async fn test_row_order_is_recording_then_method() {
        let (formats, _) = counting_registry();
        let formats = Arc::new(formats);
        let batch = collection(vec![
            Recording::new(experiment("B", vec![f32_signal("CA1", "b.bin", 100)]), formats.clone()),
            Recording::new(experiment("A", vec![f32_signal("CA3", "a.bin", 100)]), formats),
        ]);

        let analyses = Arc::new(AnalysisRegistry::new());
        analyses.register("mean", Requirements::none(), mean_of_all).unwrap();
        analyses
            .register("ca1", Requirements::none().region("CA1"), mean_of_all)
            .unwrap();

        let config = RunConfig::default().with_analyses(analyses).with_concurrency(8);
        let table = run(&batch, &["mean", "ca1"], &config).await.unwrap();

        let order: Vec<(&str, &str, TaskStatus)> = table
            .rows()
            .iter()
            .map(|r| (r.recording.as_str(), r.method.as_str(), r.status))
            .collect();
        assert_eq!(
            order,
            vec![
                ("B", "mean", TaskStatus::Succeeded),
                ("B", "ca1", TaskStatus::Succeeded),
                ("A", "mean", TaskStatus::Succeeded),
                ("A", "ca1", TaskStatus::Skipped),
            ]
        );
        assert_eq!(table.methods, vec!["mean", "ca1"]);
    }

    #[tokio::test]
    async fn test_unknown_method_aborts() {
        let batch = collection(Vec::new());
        let config = RunConfig::default().with_analyses(Arc::new(AnalysisRegistry::new()));
        let err = run(&batch, &["psd"], &config).await.unwrap_err();
        assert_eq!(err, RegistryError::UnknownMethod("psd".to_string()));
    }

    #[tokio::test]
    async fn test_data_errors_become_failed_rows() {
        let (formats, _) = counting_registry();
        let unsupported = SignalMeta::new("CA1", "x.raw", "fmt_x", 100.0, 1.0, Dtype::Float32);
        let short = f32_signal("CA1", "short.bin", 500);
        let formats = Arc::new(formats);
        let batch = collection(vec![
            Recording::new(experiment("U", vec![unsupported]), formats.clone()),
            Recording::new(experiment("S", vec![short]), formats),
        ]);

        let analyses = Arc::new(AnalysisRegistry::new());
        analyses.register("mean", Requirements::none(), mean_of_all).unwrap();

        let config = RunConfig::default().with_analyses(analyses);
        let table = run(&batch, &["mean"], &config).await.unwrap();

        assert_eq!(table.get("U", "mean").unwrap().error_kind.as_deref(), Some("unsupported_format"));
        assert_eq!(table.get("S", "mean").unwrap().error_kind.as_deref(), Some("data_integrity"));
        assert_eq!(table.summary().by_error_kind.len(), 2);
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let (formats, _) = counting_registry();
        let formats = Arc::new(formats);
        let batch = collection(vec![
            Recording::new(experiment("E1", vec![f32_signal("CA1", "a.bin", 100)]), formats.clone()),
            Recording::new(experiment("E2", vec![f32_signal("CA1", "b.bin", 100)]), formats),
        ]);

        let analyses = Arc::new(AnalysisRegistry::new());
        analyses
            .register("fragile", Requirements::none(), |rec, ctx| {
                if rec.id() == "E1" {
                    panic!("index out of range");
                }
                mean_of_all(rec, ctx)
            })
            .unwrap();

        let config = RunConfig::default().with_analyses(analyses);
        let table = run(&batch, &["fragile"], &config).await.unwrap();

        let row = table.get("E1", "fragile").unwrap();
        assert_eq!(row.status, TaskStatus::Failed);
        assert_eq!(row.error_kind.as_deref(), Some("panic"));
        assert_eq!(row.error.as_deref(), Some("index out of range"));
        assert_eq!(table.get("E2", "fragile").unwrap().status, TaskStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_cancellation_skips_unstarted_tasks() {
        let (formats, _) = counting_registry();
        let formats = Arc::new(formats);
        let recordings = (0..3)
            .map(|i| {
                let id = format!("E{}", i);
                Recording::new(experiment(&id, vec![f32_signal("CA1", "a.bin", 100)]), formats.clone())
            })
            .collect();
        let batch = collection(recordings);

        let token = CancelToken::new();
        let trigger = token.clone();
        let analyses = Arc::new(AnalysisRegistry::new());
        analyses
            .register("stop_after_first", Requirements::none(), move |rec, ctx| {
                trigger.cancel();
                mean_of_all(rec, ctx)
            })
            .unwrap();

        let config = RunConfig::default()
            .with_analyses(analyses)
            .with_concurrency(1)
            .with_cancel(token);
        let table = run(&batch, &["stop_after_first"], &config).await.unwrap();

        let statuses: Vec<TaskStatus> = table.rows().iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![TaskStatus::Succeeded, TaskStatus::Skipped, TaskStatus::Skipped]
        );
        assert_eq!(table.rows()[2].error.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn test_cooperative_timeout() {
        let (formats, _) = counting_registry();
        let batch = collection(vec![Recording::new(
            experiment("E1", vec![f32_signal("CA1", "a.bin", 100)]),
            Arc::new(formats),
        )]);

        let analyses = Arc::new(AnalysisRegistry::new());
        analyses
            .register("slow", Requirements::none(), |_, ctx| loop {
                ctx.checkpoint()?;
                std::thread::sleep(Duration::from_millis(1));
            })
            .unwrap();

        let config = RunConfig::default()
            .with_analyses(analyses)
            .with_timeout(Duration::from_millis(20));
        let table = run(&batch, &["slow"], &config).await.unwrap();

        assert_eq!(table.rows()[0].error_kind.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_options_and_eviction() {
        let (formats, calls) = counting_registry();
        let recording = Recording::new(
            experiment("E1", vec![f32_signal("CA1", "a.bin", 100)]),
            Arc::new(formats),
        );
        let batch = collection(vec![recording]);

        let analyses = Arc::new(AnalysisRegistry::new());
        analyses
            .register("scaled", Requirements::none(), |rec, ctx| {
                let mut out = mean_of_all(rec, ctx)?;
                out.insert("scale".to_string(), Value::from(ctx.f64_or("scale", 1.0)));
                Ok(out)
            })
            .unwrap();
        analyses.register("mean", Requirements::none(), mean_of_all).unwrap();

        let mut options = Options::new();
        options.insert("scale".to_string(), Value::from(2.5));
        let mut config = RunConfig::default()
            .with_analyses(analyses)
            .with_options("scaled", options)
            .with_concurrency(1);
        config.evict_after_task = true;

        let table = run(&batch, &["scaled", "mean"], &config).await.unwrap();

        assert_eq!(table.get("E1", "scaled").unwrap().fields["scale"], Value::from(2.5));
        assert_eq!(batch.get(0).unwrap().loaded_count(), 0);
        // Eviction waits for the recording's last task.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "illegal task transition")]
    fn test_illegal_transition_is_caught() {
        transition("E1", "psd", TaskStatus::Succeeded, TaskStatus::Running, "");
    }

    #[test]
    fn test_runner_transitions_are_legal() {
        for (from, to) in [
            (TaskStatus::Pending, TaskStatus::Skipped),
            (TaskStatus::Pending, TaskStatus::Running),
            (TaskStatus::Running, TaskStatus::Succeeded),
            (TaskStatus::Running, TaskStatus::Skipped),
            (TaskStatus::Running, TaskStatus::Failed),
        ] {
            transition("E1", "psd", from, to, "");
        }
    }

    #[test]
    fn test_run_config_from_file_settings() {
        let file = PipelineConfig {
            concurrency: 8,
            show_progress: true,
            task_timeout_seconds: Some(30),
            evict_after_task: true,
        };
        let config = RunConfig::from(&file);
        assert_eq!(config.concurrency, 8);
        assert!(config.show_progress);
        assert_eq!(config.task_timeout, Some(Duration::from_secs(30)));
        assert!(config.evict_after_task);
        assert!(config.options.is_empty());
    }

    #[test]
    fn test_run_batch_over_fixtures() {
        let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/batch");
        let batch = BatchDescription::scan(root, "simuran.toml");

        let analyses = Arc::new(AnalysisRegistry::new());
        analyses
            .register("regions", Requirements::none(), |rec, _| {
                let mut out = ResultFields::new();
                out.insert("regions".to_string(), Value::from(rec.regions().len()));
                Ok(out)
            })
            .unwrap();
        let config = RunConfig::default().with_analyses(analyses);

        let table = tokio_test::block_on(run_batch(
            &batch,
            Arc::new(FormatRegistry::new()),
            &["regions"],
            &config,
        ))
        .unwrap();

        assert_eq!(table.recordings(), vec!["E1", "E2"]);
        assert_eq!(table.get("E1", "regions").unwrap().fields["regions"], Value::from(2));
        assert_eq!(table.get("E2", "regions").unwrap().fields["regions"], Value::from(1));
    }

    #[test]
    fn test_run_batch_rejects_unknown_method_before_discovery() {
        let batch = BatchDescription::scan("/does/not/exist", "simuran.toml");
        let config = RunConfig::default().with_analyses(Arc::new(AnalysisRegistry::new()));
        let err = tokio_test::block_on(run_batch(&batch, Arc::new(FormatRegistry::new()), &["psd"], &config))
            .unwrap_err();
        assert!(matches!(err, Error::Registry(RegistryError::UnknownMethod(_))));
    }
}
