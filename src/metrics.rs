//! Worker-to-collector metrics side-channel (design note: "Globals and pipes").
//!
//! Workers never touch shared mutable state directly; instead they send events down an
//! `mpsc::Sender` clone, and a collector thread owned by the engine folds them into a
//! `group -> name -> value` table, which is snapshotted to disk at shutdown.

use std::{
    collections::BTreeMap,
    path::Path,
    sync::mpsc::{self, Receiver, Sender},
    thread::JoinHandle,
};

use crate::error::GridforgeError;

#[derive(Debug, Clone)]
pub struct MetricsEvent {
    pub group: String,
    pub name: String,
    pub value: String,
}

/// Cloneable handle workers use to report metrics; cheap to clone, one clone per worker task.
#[derive(Clone)]
pub struct MetricsSink {
    tx: Sender<MetricsEvent>,
}

impl MetricsSink {
    pub fn record(&self, group: impl Into<String>, name: impl Into<String>, value: impl Into<String>) {
        // The collector only disappears once `MetricsHandle::join` has run, by which point no
        // workers should still be sending; a send failure here is not actionable for a worker.
        let _ = self.tx.send(MetricsEvent { group: group.into(), name: name.into(), value: value.into() });
    }
}

/// Owned by the engine; dropping every `MetricsSink` clone lets the collector thread observe
/// channel hang-up and exit.
pub struct MetricsHandle {
    join: JoinHandle<BTreeMap<String, BTreeMap<String, String>>>,
}

impl MetricsHandle {
    /// Spawns the collector thread and returns a sink for workers plus the handle to join at
    /// shutdown.
    pub fn spawn() -> (MetricsSink, Self) {
        let (tx, rx) = mpsc::channel();
        let join = std::thread::spawn(move || collect(rx));
        (MetricsSink { tx }, Self { join })
    }

    /// Blocks until every `MetricsSink` clone has been dropped, then writes the accumulated
    /// table to `$workspace/metrics/<label>.json`.
    pub fn join_and_write(self, metrics_dir: &Path, label: &str) -> Result<(), GridforgeError> {
        let table = self.join.join().unwrap_or_default();
        crate::utils::create_parent_dir_all(&metrics_dir.join(format!("{label}.json")))?;
        let path = metrics_dir.join(format!("{label}.json"));
        let json = serde_json::to_string_pretty(&table)?;
        crate::utils::write_file(&path, &json)
    }
}

fn collect(rx: Receiver<MetricsEvent>) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut table: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    for event in rx {
        table.entry(event.group).or_default().insert(event.name, event.value);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_accumulates_events_by_group() {
        let (sink, handle) = MetricsHandle::spawn();
        sink.record("preprocess", "files", "12");
        sink.record("preprocess", "seconds", "0.4");
        sink.record("compile", "files", "8");
        drop(sink);
        let dir = tempfile::tempdir().unwrap();
        handle.join_and_write(dir.path(), "run").unwrap();
        let content = std::fs::read_to_string(dir.path().join("run.json")).unwrap();
        assert!(content.contains("preprocess"));
        assert!(content.contains("compile"));
    }
}
