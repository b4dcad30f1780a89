//! Flattening a finished session into persisted artifacts.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use engine_logging::{engine_debug, engine_error, engine_info};
use harvester_core::{HarvestResult, HarvestSession, RawRecord, UnitOfWork, UnitRecords};
use serde_json::Value;
use thiserror::Error;

use crate::filename::artifact_filename;
use crate::{AtomicFileWriter, ExtractionStrategy, PersistError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArtifactLayout {
    /// One `<retailer>.json` array for the whole run.
    #[default]
    Merged,
    /// One `<retailer>_<unit>.json` array per successful unit.
    PerUnit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkOptions {
    pub retailer: String,
    pub layout: ArtifactLayout,
    /// Field whose first occurrence wins; records without it are kept.
    pub dedupe_key: Option<String>,
}

impl SinkOptions {
    pub fn merged(retailer: &str) -> Self {
        Self {
            retailer: retailer.to_string(),
            layout: ArtifactLayout::Merged,
            dedupe_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedArtifact {
    pub paths: Vec<PathBuf>,
    pub record_count: usize,
    pub failed_units: Vec<UnitOfWork>,
}

#[derive(Debug, Error)]
pub enum SinkError {
    /// The run completed but produced nothing; no artifact was written.
    #[error("[{retailer}] no records harvested ({failed} units failed)")]
    Empty { retailer: String, failed: usize },
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Writes the session's records and reports what was written.
///
/// Records keep completion order. Fails with [`SinkError::Empty`] without
/// touching the filesystem when no record survived.
pub fn finalize(
    session: HarvestSession,
    writer: &AtomicFileWriter,
    options: &SinkOptions,
) -> Result<PersistedArtifact, SinkError> {
    let (successes, failures) = session.into_parts();
    let failed_units: Vec<UnitOfWork> = failures.into_iter().map(|f| f.unit).collect();
    let groups = dedupe(successes, options.dedupe_key.as_deref());
    let record_count: usize = groups.iter().map(|g| g.records.len()).sum();

    if record_count == 0 {
        let err = SinkError::Empty {
            retailer: options.retailer.clone(),
            failed: failed_units.len(),
        };
        engine_error!("{}", err);
        return Err(err);
    }

    let paths = match options.layout {
        ArtifactLayout::Merged => {
            let records: Vec<&RawRecord> = groups.iter().flat_map(|g| g.records.iter()).collect();
            vec![writer.write_json(&artifact_filename(&options.retailer, None), &records)?]
        }
        ArtifactLayout::PerUnit => groups
            .iter()
            .filter(|g| !g.records.is_empty())
            .map(|g| {
                let name = artifact_filename(&options.retailer, Some(&g.unit.label()));
                writer.write_json(&name, &g.records)
            })
            .collect::<Result<Vec<_>, _>>()?,
    };

    engine_info!(
        "[{}] wrote {} records to {} artifact(s) in {}",
        options.retailer,
        record_count,
        paths.len(),
        writer.dir().display()
    );
    Ok(PersistedArtifact {
        paths,
        record_count,
        failed_units,
    })
}

/// Writes each unit's artifact as soon as the unit succeeds, so a run cut
/// short still leaves the finished categories on disk. [`finalize`] later
/// rewrites the same files with de-duplication applied.
pub struct UnitArtifactWriter {
    inner: Arc<dyn ExtractionStrategy>,
    writer: AtomicFileWriter,
    retailer: String,
}

impl UnitArtifactWriter {
    pub fn new(inner: Arc<dyn ExtractionStrategy>, writer: AtomicFileWriter, retailer: &str) -> Self {
        Self {
            inner,
            writer,
            retailer: retailer.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl ExtractionStrategy for UnitArtifactWriter {
    async fn extract(&self, unit: &UnitOfWork) -> HarvestResult {
        let result = self.inner.extract(unit).await;
        if let HarvestResult::Success(records) = &result {
            if !records.is_empty() {
                let name = artifact_filename(&self.retailer, Some(&unit.label()));
                match self.writer.write_json(&name, records) {
                    Ok(path) => engine_debug!("[{}] {}: wrote {:?}", self.retailer, unit, path),
                    // finalize writes it again from the session
                    Err(err) => engine_error!("[{}] {}: early write failed: {}", self.retailer, unit, err),
                }
            }
        }
        result
    }
}

fn dedupe(groups: Vec<UnitRecords>, key: Option<&str>) -> Vec<UnitRecords> {
    let Some(key) = key else {
        return groups;
    };
    let mut seen = HashSet::new();
    groups
        .into_iter()
        .map(|group| UnitRecords {
            unit: group.unit,
            records: group
                .records
                .into_iter()
                .filter(|record| match record.get(key).and_then(key_of) {
                    Some(id) => seen.insert(id),
                    None => true,
                })
                .collect(),
        })
        .collect()
}

fn key_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
