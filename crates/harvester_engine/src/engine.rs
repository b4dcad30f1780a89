use std::any::Any;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use engine_logging::{engine_info, engine_warn};
use futures_util::{stream, StreamExt};
use harvester_core::{update, DiagnosticContext, FailureKind, HarvestResult, HarvestSession, Msg, UnitOfWork};
use tokio::task::JoinError;
use tokio::time::Instant;

use crate::{EngineEvent, ExtractionStrategy};

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

pub struct ChannelProgressSink {
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

/// Logs a progress line every `every` completions and on the last one.
pub struct LogProgressSink {
    label: String,
    every: usize,
}

impl LogProgressSink {
    pub fn new(label: &str, every: usize) -> Self {
        Self {
            label: label.to_string(),
            every: every.max(1),
        }
    }
}

impl ProgressSink for LogProgressSink {
    fn emit(&self, event: EngineEvent) {
        if let EngineEvent::Progress { completed, total } = event {
            if completed % self.every == 0 || completed == total {
                engine_info!("[{}] {}/{} units done", self.label, completed, total);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Units in flight at once.
    pub concurrency: usize,
    /// Run-wide budget; units unfinished when it expires are cancelled.
    pub deadline: Option<Duration>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            deadline: None,
        }
    }
}

/// Runs every unit through one strategy with bounded concurrency.
///
/// Each unit runs in its own tokio task, so a panicking extraction is
/// recorded as a failure of that unit only. Results are folded into the
/// session as they complete, in completion order.
#[derive(Debug, Clone)]
pub struct HarvestEngine {
    label: String,
    settings: EngineSettings,
}

impl HarvestEngine {
    pub fn new(label: &str, settings: EngineSettings) -> Self {
        Self {
            label: label.to_string(),
            settings,
        }
    }

    pub async fn run(
        &self,
        units: Vec<UnitOfWork>,
        strategy: Arc<dyn ExtractionStrategy>,
        progress: &dyn ProgressSink,
    ) -> HarvestSession {
        let session = HarvestSession::new(units);
        let total = session.total();
        let units = session.units().to_vec();
        let deadline = self.settings.deadline.map(|budget| Instant::now() + budget);
        let concurrency = self.settings.concurrency.max(1);
        engine_info!(
            "[{}] dispatching {} units, {} at a time",
            self.label,
            total,
            concurrency
        );

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Msg>();

        let dispatch = async move {
            stream::iter(units)
                .map(|unit| {
                    let strategy = Arc::clone(&strategy);
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(Msg::UnitStarted { unit: unit.clone() });
                        let result = run_unit(strategy, &unit, deadline).await;
                        (unit, result)
                    }
                })
                .buffer_unordered(concurrency)
                .for_each(|(unit, result)| {
                    let _ = tx.send(Msg::UnitCompleted { unit, result });
                    futures_util::future::ready(())
                })
                .await;
        };

        let aggregate = async {
            let mut session = session;
            while let Some(msg) = rx.recv().await {
                match &msg {
                    Msg::UnitStarted { unit } => {
                        progress.emit(EngineEvent::UnitStarted { unit: unit.clone() });
                    }
                    Msg::UnitCompleted { unit, result } => {
                        let outcome = match result {
                            HarvestResult::Success(records) => Ok(records.len()),
                            HarvestResult::Failure(failure) => {
                                engine_warn!(
                                    "[{}] {} failed: {} ({})",
                                    self.label,
                                    unit,
                                    failure.kind,
                                    failure.context.message
                                );
                                Err(failure.kind.clone())
                            }
                        };
                        progress.emit(EngineEvent::UnitCompleted {
                            unit: unit.clone(),
                            outcome,
                        });
                    }
                }
                let finished = matches!(msg, Msg::UnitCompleted { .. });
                session = update(session, msg);
                if finished {
                    progress.emit(EngineEvent::Progress {
                        completed: session.completed(),
                        total,
                    });
                }
            }
            session
        };

        let ((), session) = tokio::join!(dispatch, aggregate);
        engine_info!(
            "[{}] harvest finished: {} records, {} of {} units failed",
            self.label,
            session.record_count(),
            session.failures().len(),
            total
        );
        session
    }
}

async fn run_unit(
    strategy: Arc<dyn ExtractionStrategy>,
    unit: &UnitOfWork,
    deadline: Option<Instant>,
) -> HarvestResult {
    if deadline.is_some_and(|at| Instant::now() >= at) {
        return cancelled(unit);
    }

    let task_unit = unit.clone();
    let mut handle = tokio::spawn(async move { strategy.extract(&task_unit).await });
    let joined = match deadline {
        Some(at) => match tokio::time::timeout_at(at, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                handle.abort();
                return cancelled(unit);
            }
        },
        None => handle.await,
    };
    joined.unwrap_or_else(|err| join_failure(unit, err))
}

fn cancelled(unit: &UnitOfWork) -> HarvestResult {
    HarvestResult::failure(
        unit,
        FailureKind::Cancelled,
        DiagnosticContext::new("run deadline expired"),
    )
}

fn join_failure(unit: &UnitOfWork, err: JoinError) -> HarvestResult {
    if !err.is_panic() {
        return cancelled(unit);
    }
    let message = panic_message(err.into_panic());
    HarvestResult::failure(
        unit,
        FailureKind::Panicked,
        DiagnosticContext::new(format!("task panicked: {message}")),
    )
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        return (*text).to_string();
    }
    if let Some(text) = payload.downcast_ref::<String>() {
        return text.clone();
    }
    "unknown panic payload".to_string()
}
