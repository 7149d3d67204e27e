use std::fmt;
use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ConductorConfig;
use crate::session::HandleSlot;

/// One typed metric value inside a stats report.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Int(v) => write!(f, "{v}"),
            MetricValue::Float(v) => write!(f, "{v}"),
            MetricValue::Text(v) => write!(f, "{v}"),
            MetricValue::Bool(v) => write!(f, "{}", if *v { "true" } else { "false" }),
        }
    }
}

/// Standard-verbosity snapshot record, one per legacy stats report.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyStatsRecord {
    pub report_id: String,
    pub timestamp_ms: i64,
    pub values: Vec<(String, MetricValue)>,
}

/// One stats object inside a modern snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsObjectRecord {
    pub object_type: String,
    pub object_id: String,
    pub attributes: Vec<(String, MetricValue)>,
}

/// Modern attribute-bag snapshot for a whole session.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub timestamp_ms: f64,
    pub objects: Vec<StatsObjectRecord>,
}

/// Plain-text rendering for the legacy sink: one line per metric value, a
/// blank line between reports.
pub fn render_legacy(records: &[LegacyStatsRecord]) -> String {
    let mut out = String::new();
    for record in records {
        let _ = writeln!(out, "{} - Stats report id: {}\n", record.timestamp_ms, record.report_id);
        for (name, value) in &record.values {
            let _ = writeln!(out, "{name}: {value}");
        }
        out.push('\n');
    }
    out
}

/// Nested attribute dump for the modern sink, one block per stats object.
pub fn render_snapshot(snapshot: &StatsSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} --- Stats Report: \n", snapshot.timestamp_ms);
    for object in &snapshot.objects {
        let _ = writeln!(out, "- Stats for {}: {}\n", object.object_type, object.object_id);
        for (name, value) in &object.attributes {
            let _ = writeln!(out, "    {name}: {value}");
        }
        out.push('\n');
    }
    out
}

#[derive(Debug, Error)]
#[error("failed to create stats sink {path:?}: {source}")]
pub struct SinkError {
    pub path: PathBuf,
    pub source: io::Error,
}

/// Append-only text sink. Created truncated, reopened in append mode for each
/// write so one failed open never corrupts prior records.
#[derive(Debug, Clone)]
pub struct StatsSink {
    path: PathBuf,
}

impl StatsSink {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        File::create(&path).map_err(|source| SinkError {
            path: path.clone(),
            source,
        })?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one rendered block. A failed open or write is logged and the
    /// block is skipped; polling continues.
    pub fn append(&self, text: &str) {
        let opened = OpenOptions::new().append(true).open(&self.path);
        let mut file = match opened {
            Ok(file) => file,
            Err(err) => {
                warn!(target: "conductor", path = ?self.path, error = %err, "stats sink unavailable, skipping write");
                return;
            }
        };
        if let Err(err) = file.write_all(text.as_bytes()) {
            warn!(target: "conductor", path = ?self.path, error = %err, "stats sink write failed");
        }
    }
}

/// The two periodic stats loops.
///
/// The legacy loop runs on a dedicated worker thread, gated by a shared
/// liveness flag it observes within one polling interval. The modern loop is a
/// delayed continuation on the tokio runtime that re-arms itself only while a
/// session handle is present, so it dies naturally at teardown; `stop` also
/// halts a pending continuation explicitly.
pub struct StatsPoller {
    alive: Arc<AtomicBool>,
    slot: HandleSlot,
    legacy_sink: StatsSink,
    modern_sink: StatsSink,
    legacy_interval: Duration,
    modern_interval: Duration,
    legacy_worker: Option<thread::JoinHandle<()>>,
    modern_task: Option<tokio::task::JoinHandle<()>>,
}

impl StatsPoller {
    /// Truncates and recreates both sinks.
    pub fn new(slot: HandleSlot, config: &ConductorConfig) -> Result<Self, SinkError> {
        let legacy_sink = StatsSink::create(&config.legacy_stats_path)?;
        let modern_sink = StatsSink::create(&config.modern_stats_path)?;
        Ok(Self {
            alive: Arc::new(AtomicBool::new(true)),
            slot,
            legacy_sink,
            modern_sink,
            legacy_interval: config.legacy_poll_interval,
            modern_interval: config.modern_poll_interval,
            legacy_worker: None,
            modern_task: None,
        })
    }

    /// Start the fixed-interval legacy loop on its worker thread.
    pub fn start_legacy(&mut self) {
        if self.legacy_worker.is_some() {
            return;
        }
        let alive = Arc::clone(&self.alive);
        let slot = Arc::clone(&self.slot);
        let sink = self.legacy_sink.clone();
        let interval = self.legacy_interval;
        self.legacy_worker = Some(thread::spawn(move || {
            while alive.load(Ordering::Relaxed) {
                let handle = { slot.read().clone() };
                if let Some(handle) = handle {
                    let records = handle.poll_legacy_stats();
                    sink.append(&render_legacy(&records));
                }
                thread::sleep(interval);
            }
            debug!(target: "conductor", "legacy stats worker stopped");
        }));
    }

    /// Arm the modern loop for the current session. No-op while a previous
    /// continuation chain is still running.
    pub fn start_modern(&mut self) {
        if self.modern_task.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        let slot = Arc::clone(&self.slot);
        let sink = self.modern_sink.clone();
        let interval = self.modern_interval;
        self.modern_task = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let handle = { slot.read().clone() };
                let Some(handle) = handle else {
                    debug!(target: "conductor", "session gone, modern stats loop stopping");
                    break;
                };
                let snapshot = handle.poll_stats().await;
                sink.append(&render_snapshot(&snapshot));
            }
        }));
    }

    /// One-shot modern snapshot, off the signaling path.
    pub fn log_snapshot_once(&self) {
        let slot = Arc::clone(&self.slot);
        let sink = self.modern_sink.clone();
        tokio::spawn(async move {
            let handle = { slot.read().clone() };
            if let Some(handle) = handle {
                let snapshot = handle.poll_stats().await;
                sink.append(&render_snapshot(&snapshot));
            }
        });
    }

    /// Stop both loops. Blocks until the legacy worker has exited, so no poll
    /// can fire against a handle released afterwards.
    pub fn stop(&mut self) {
        self.alive.store(false, Ordering::Relaxed);
        if let Some(worker) = self.legacy_worker.take() {
            if worker.join().is_err() {
                warn!(target: "conductor", "legacy stats worker panicked");
            }
        }
        if let Some(task) = self.modern_task.take() {
            task.abort();
        }
    }

    #[cfg(test)]
    pub(crate) fn modern_running(&self) -> bool {
        self.modern_task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for StatsPoller {
    fn drop(&mut self) {
        // Same as an explicit stop: the legacy worker must not append after
        // its owner is gone, so the drop also joins it.
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::mocks::{MockEngineHandle, temp_path};
    use parking_lot::RwLock;

    fn sample_records() -> Vec<LegacyStatsRecord> {
        vec![LegacyStatsRecord {
            report_id: "ssrc_1234".to_string(),
            timestamp_ms: 17,
            values: vec![
                ("bytesSent".to_string(), MetricValue::Int(42)),
                ("jitter".to_string(), MetricValue::Float(0.5)),
                ("active".to_string(), MetricValue::Bool(true)),
                ("codec".to_string(), MetricValue::Text("opus".to_string())),
            ],
        }]
    }

    #[test]
    fn legacy_rendering_is_one_line_per_value() {
        let text = render_legacy(&sample_records());
        assert!(text.starts_with("17 - Stats report id: ssrc_1234\n"));
        assert!(text.contains("bytesSent: 42\n"));
        assert!(text.contains("jitter: 0.5\n"));
        assert!(text.contains("active: true\n"));
        assert!(text.contains("codec: opus\n"));
        assert!(text.ends_with("\n\n"));
    }

    #[test]
    fn snapshot_rendering_nests_attributes() {
        let snapshot = StatsSnapshot {
            timestamp_ms: 99.5,
            objects: vec![StatsObjectRecord {
                object_type: "inbound-rtp".to_string(),
                object_id: "IT01".to_string(),
                attributes: vec![("packetsReceived".to_string(), MetricValue::Int(7))],
            }],
        };
        let text = render_snapshot(&snapshot);
        assert!(text.starts_with("99.5 --- Stats Report: \n"));
        assert!(text.contains("- Stats for inbound-rtp: IT01\n"));
        assert!(text.contains("    packetsReceived: 7\n"));
    }

    #[test]
    fn sink_create_truncates_existing_content() {
        let path = temp_path("sink-truncate");
        std::fs::write(&path, "stale").unwrap();
        let sink = StatsSink::create(&path).unwrap();
        assert_eq!(std::fs::read_to_string(sink.path()).unwrap(), "");
        sink.append("fresh\n");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "fresh\n");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn sink_skips_write_when_file_is_gone() {
        let path = temp_path("sink-missing");
        let sink = StatsSink::create(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        // Opened in append mode without create: the write is skipped, no
        // panic, and no file reappears.
        sink.append("lost\n");
        assert!(!path.exists());
    }

    #[test]
    fn sink_create_fails_for_missing_directory() {
        let path = temp_path("no-such-dir").join("sink.txt");
        let err = StatsSink::create(&path).unwrap_err();
        assert_eq!(err.path, path);
    }

    fn short_config(tag: &str) -> ConductorConfig {
        let mut config = ConductorConfig::default();
        config.legacy_stats_path = temp_path(&format!("{tag}-legacy"));
        config.modern_stats_path = temp_path(&format!("{tag}-modern"));
        config.legacy_poll_interval = Duration::from_millis(20);
        config.modern_poll_interval = Duration::from_millis(20);
        config
    }

    #[test]
    fn legacy_loop_stops_within_one_interval() {
        let handle = MockEngineHandle::standalone();
        let slot: HandleSlot = Arc::new(RwLock::new(Some(handle)));
        let config = short_config("legacy-stop");
        let mut poller = StatsPoller::new(Arc::clone(&slot), &config).unwrap();

        poller.start_legacy();
        thread::sleep(Duration::from_millis(100));
        poller.stop();

        let after_stop = std::fs::read_to_string(&config.legacy_stats_path).unwrap();
        assert!(!after_stop.is_empty());
        thread::sleep(Duration::from_millis(100));
        let later = std::fs::read_to_string(&config.legacy_stats_path).unwrap();
        assert_eq!(after_stop, later);

        std::fs::remove_file(&config.legacy_stats_path).ok();
        std::fs::remove_file(&config.modern_stats_path).ok();
    }

    #[test]
    fn dropping_the_poller_joins_the_legacy_worker() {
        let handle = MockEngineHandle::standalone();
        let slot: HandleSlot = Arc::new(RwLock::new(Some(handle)));
        let config = short_config("legacy-drop");
        let mut poller = StatsPoller::new(Arc::clone(&slot), &config).unwrap();

        poller.start_legacy();
        thread::sleep(Duration::from_millis(100));
        drop(poller);

        let after_drop = std::fs::read_to_string(&config.legacy_stats_path).unwrap();
        assert!(!after_drop.is_empty());
        thread::sleep(Duration::from_millis(100));
        let later = std::fs::read_to_string(&config.legacy_stats_path).unwrap();
        assert_eq!(after_drop, later);

        std::fs::remove_file(&config.legacy_stats_path).ok();
        std::fs::remove_file(&config.modern_stats_path).ok();
    }

    #[test]
    fn legacy_loop_skips_polls_without_a_handle() {
        let slot: HandleSlot = Arc::new(RwLock::new(None));
        let config = short_config("legacy-idle");
        let mut poller = StatsPoller::new(Arc::clone(&slot), &config).unwrap();

        poller.start_legacy();
        thread::sleep(Duration::from_millis(80));
        poller.stop();

        assert_eq!(std::fs::read_to_string(&config.legacy_stats_path).unwrap(), "");
        std::fs::remove_file(&config.legacy_stats_path).ok();
        std::fs::remove_file(&config.modern_stats_path).ok();
    }

    #[tokio::test]
    async fn modern_loop_stops_when_handle_disappears() {
        let handle = MockEngineHandle::standalone();
        let slot: HandleSlot = Arc::new(RwLock::new(Some(handle)));
        let config = short_config("modern-stop");
        let mut poller = StatsPoller::new(Arc::clone(&slot), &config).unwrap();

        poller.start_modern();
        tokio::time::sleep(Duration::from_millis(90)).await;
        assert!(poller.modern_running());
        let mid = std::fs::read_to_string(&config.modern_stats_path).unwrap();
        assert!(!mid.is_empty());

        *slot.write() = None;
        tokio::time::sleep(Duration::from_millis(90)).await;
        assert!(!poller.modern_running());
        let after = std::fs::read_to_string(&config.modern_stats_path).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(after, std::fs::read_to_string(&config.modern_stats_path).unwrap());

        std::fs::remove_file(&config.legacy_stats_path).ok();
        std::fs::remove_file(&config.modern_stats_path).ok();
    }
}
