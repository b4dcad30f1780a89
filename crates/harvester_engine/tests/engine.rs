use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use harvester_core::{DiagnosticContext, FailureKind, HarvestResult, RawRecord, UnitOfWork};
use harvester_engine::{ChannelProgressSink, EngineEvent, EngineSettings, ExtractionStrategy, HarvestEngine};
use pretty_assertions::assert_eq;
use serde_json::json;

/// Page `n` yields `n` records; page 13 fails, page 66 panics, page 99 hangs.
#[derive(Default)]
struct ScriptedStrategy {
    running: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait::async_trait]
impl ExtractionStrategy for ScriptedStrategy {
    async fn extract(&self, unit: &UnitOfWork) -> HarvestResult {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let page = unit.as_page().unwrap_or_default();
        tokio::time::sleep(Duration::from_millis(u64::from(20 - page % 20))).await;
        self.running.fetch_sub(1, Ordering::SeqCst);

        match page {
            13 => HarvestResult::failure(unit, FailureKind::SchemaMismatch, DiagnosticContext::new("no products")),
            66 => panic!("extractor blew up"),
            99 => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                HarvestResult::Success(Vec::new())
            }
            n => HarvestResult::Success(
                (0..n)
                    .map(|i| json!({"page": n, "i": i}).as_object().cloned().unwrap_or_else(RawRecord::new))
                    .collect(),
            ),
        }
    }
}

fn engine(concurrency: usize, deadline: Option<Duration>) -> HarvestEngine {
    engine_logging::initialize_for_tests();
    HarvestEngine::new("test", EngineSettings { concurrency, deadline })
}

fn pages(range: std::ops::RangeInclusive<u32>) -> Vec<UnitOfWork> {
    range.map(UnitOfWork::Page).collect()
}

#[tokio::test]
async fn every_unit_is_accounted_for_once() {
    let (tx, rx) = mpsc::channel();
    let strategy = Arc::new(ScriptedStrategy::default());
    let session = engine(4, None)
        .run(pages(1..=15), strategy.clone(), &ChannelProgressSink::new(tx))
        .await;

    assert!(session.is_finished());
    assert_eq!(session.completed(), 15);
    assert_eq!(session.successes().len() + session.failures().len(), 15);
    assert_eq!(session.failures()[0].unit, UnitOfWork::Page(13));
    assert_eq!(session.record_count(), (1..=15).sum::<usize>() - 13);
    assert!(strategy.peak.load(Ordering::SeqCst) <= 4);

    let progress: Vec<usize> = rx
        .try_iter()
        .filter_map(|event| match event {
            EngineEvent::Progress { completed, total } => {
                assert_eq!(total, 15);
                Some(completed)
            }
            _ => None,
        })
        .collect();
    assert_eq!(progress, (1..=15).collect::<Vec<_>>());
}

#[tokio::test]
async fn panicking_unit_does_not_stop_siblings() {
    let (tx, _rx) = mpsc::channel();
    let session = engine(2, None)
        .run(
            vec![UnitOfWork::Page(1), UnitOfWork::Page(66), UnitOfWork::Page(2)],
            Arc::new(ScriptedStrategy::default()),
            &ChannelProgressSink::new(tx),
        )
        .await;

    assert_eq!(session.record_count(), 3);
    assert_eq!(session.failures().len(), 1);
    let failure = &session.failures()[0];
    assert_eq!(failure.unit, UnitOfWork::Page(66));
    assert_eq!(failure.kind, FailureKind::Panicked);
    assert!(failure.context.message.contains("extractor blew up"));
}

#[tokio::test]
async fn deadline_cancels_unfinished_units() {
    let (tx, rx) = mpsc::channel();
    let session = engine(1, Some(Duration::from_millis(300)))
        .run(
            vec![UnitOfWork::Page(1), UnitOfWork::Page(99), UnitOfWork::Page(2)],
            Arc::new(ScriptedStrategy::default()),
            &ChannelProgressSink::new(tx),
        )
        .await;

    assert!(session.is_finished());
    assert_eq!(session.successes().len(), 1);
    let cancelled: Vec<_> = session
        .failures()
        .iter()
        .filter(|f| f.kind == FailureKind::Cancelled)
        .map(|f| f.unit.clone())
        .collect();
    assert_eq!(cancelled, vec![UnitOfWork::Page(99), UnitOfWork::Page(2)]);

    let failed_events = rx
        .try_iter()
        .filter(|event| matches!(event, EngineEvent::UnitCompleted { outcome: Err(FailureKind::Cancelled), .. }))
        .count();
    assert_eq!(failed_events, 2);
}

#[tokio::test]
async fn duplicate_units_run_once() {
    let (tx, _rx) = mpsc::channel();
    let session = engine(3, None)
        .run(
            vec![UnitOfWork::Page(2), UnitOfWork::Page(2), UnitOfWork::Page(3)],
            Arc::new(ScriptedStrategy::default()),
            &ChannelProgressSink::new(tx),
        )
        .await;
    assert_eq!(session.total(), 2);
    assert_eq!(session.record_count(), 5);
}
