use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use engine_logging::{engine_error, engine_info, engine_warn};
use harvester_core::UnitOfWork;
use harvester_engine::{AtomicFileWriter, PersistedArtifact};
use serde::{Deserialize, Serialize};

/// Outcome of the last successful run of one retailer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastRun {
    /// RFC 3339 timestamp.
    pub finished_at: String,
    pub record_count: usize,
    /// Units that failed in that run, worth a targeted rerun.
    pub failed_units: Vec<UnitOfWork>,
    pub artifacts: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RunState {
    retailers: BTreeMap<String, LastRun>,
}

impl RunState {
    pub fn last_run(&self, retailer: &str) -> Option<&LastRun> {
        self.retailers.get(retailer)
    }

    pub fn record(&mut self, retailer: &str, artifact: &PersistedArtifact, finished_at: DateTime<Utc>) {
        self.retailers.insert(
            retailer.to_string(),
            LastRun {
                finished_at: finished_at.to_rfc3339(),
                record_count: artifact.record_count,
                failed_units: artifact.failed_units.clone(),
                artifacts: artifact.paths.clone(),
            },
        );
    }
}

pub(crate) fn load_run_state(path: &Path) -> RunState {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return RunState::default();
        }
        Err(err) => {
            engine_warn!("Failed to read run state from {:?}: {}", path, err);
            return RunState::default();
        }
    };

    match ron::from_str(&content) {
        Ok(state) => {
            engine_info!("Loaded run state from {:?}", path);
            state
        }
        Err(err) => {
            engine_warn!("Failed to parse run state from {:?}: {}", path, err);
            RunState::default()
        }
    }
}

/// Best effort: a failed write is logged and the run result stands.
pub(crate) fn save_run_state(path: &Path, state: &RunState) {
    let Some(filename) = path.file_name().and_then(|name| name.to_str()) else {
        engine_error!("Run state path {:?} has no file name", path);
        return;
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let pretty = ron::ser::PrettyConfig::new();
    let content = match ron::ser::to_string_pretty(state, pretty) {
        Ok(text) => text,
        Err(err) => {
            engine_error!("Failed to serialize run state: {}", err);
            return;
        }
    };

    let writer = AtomicFileWriter::new(dir);
    if let Err(err) = writer.write(filename, content.as_bytes()) {
        engine_error!("Failed to write run state to {:?}: {}", path, err);
    }
}
