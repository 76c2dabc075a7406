//! Queue processor tests: backoff, exhaustion, redrive, and the workflow
//! handoff into the queue.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use scribe_dispatch::error::Result;
use scribe_dispatch::payload::Payload;
use scribe_dispatch::queue::memory::InMemoryQueue;
use scribe_dispatch::queue::{
    Delivery, DeliveryError, EntryStatus, QueueConfig, QueueProcessor, QueueStore,
};
use scribe_dispatch::testimony::{InMemoryTestimonyLog, TestimonyLevel, TestimonyLog};
use scribe_dispatch::workflow::{InMemoryRunStore, Phase, Workflows};

/// Succeeds only from the nth attempt onward.
struct FlakyDelivery {
    calls: AtomicU32,
    succeed_from: u32,
}

impl FlakyDelivery {
    fn new(succeed_from: u32) -> Self {
        Self {
            calls: AtomicU32::new(0),
            succeed_from,
        }
    }

    fn never() -> Self {
        Self::new(u32::MAX)
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Delivery for FlakyDelivery {
    async fn deliver(&self, _payload: &Payload) -> std::result::Result<(), DeliveryError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call >= self.succeed_from {
            Ok(())
        } else {
            Err(DeliveryError::new("downstream unavailable"))
        }
    }
}

struct Harness {
    store: Arc<InMemoryQueue>,
    delivery: Arc<FlakyDelivery>,
    testimony: Arc<InMemoryTestimonyLog>,
    processor: QueueProcessor,
}

fn harness(delivery: FlakyDelivery, config: QueueConfig) -> Harness {
    let store = Arc::new(InMemoryQueue::new());
    let delivery = Arc::new(delivery);
    let testimony = Arc::new(InMemoryTestimonyLog::new());
    let processor = QueueProcessor::new(
        Arc::clone(&store) as Arc<dyn QueueStore>,
        Arc::clone(&delivery) as Arc<dyn Delivery>,
        Arc::clone(&testimony) as Arc<dyn TestimonyLog>,
        config,
    );
    Harness {
        store,
        delivery,
        testimony,
        processor,
    }
}

#[tokio::test]
async fn first_attempt_success_settles_immediately() -> Result<()> {
    let h = harness(FlakyDelivery::new(1), QueueConfig::default());
    let entry = h
        .processor
        .enqueue(Payload::broadcast("ops", "done"), None, None)
        .await?;

    let summary = h.processor.drain_once(Utc::now()).await?;
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.succeeded, 1);

    let stored = h.store.get(&entry.id).await?.expect("stored");
    assert_eq!(stored.status, EntryStatus::Succeeded);
    assert_eq!(stored.attempts, 1);
    assert!(stored.last_error.is_none());
    Ok(())
}

#[tokio::test]
async fn failure_backs_off_exponentially() -> Result<()> {
    let h = harness(FlakyDelivery::new(3), QueueConfig::default());
    let entry = h
        .processor
        .enqueue(Payload::broadcast("ops", "done"), None, None)
        .await?;

    let now = Utc::now();
    let summary = h.processor.drain_once(now).await?;
    assert_eq!(summary.retried, 1);

    let after_first = h.store.get(&entry.id).await?.expect("stored");
    assert_eq!(after_first.status, EntryStatus::Pending);
    assert_eq!(after_first.attempts, 1);
    assert_eq!(
        after_first.last_error.as_deref(),
        Some("downstream unavailable")
    );
    let first_window = after_first.not_before.expect("backoff scheduled") - now;
    assert_eq!(first_window.num_seconds(), 2);

    // Not due yet: draining now attempts nothing.
    let idle = h.processor.drain_once(now).await?;
    assert_eq!(idle.processed, 0);

    // Second failure doubles the window.
    let later = now + chrono::Duration::seconds(3);
    h.processor.drain_once(later).await?;
    let after_second = h.store.get(&entry.id).await?.expect("stored");
    assert_eq!(after_second.attempts, 2);
    let second_window = after_second.not_before.expect("backoff scheduled") - later;
    assert_eq!(second_window.num_seconds(), 4);

    // Third attempt succeeds.
    let final_pass = h
        .processor
        .drain_once(later + chrono::Duration::seconds(5))
        .await?;
    assert_eq!(final_pass.succeeded, 1);
    let settled = h.store.get(&entry.id).await?.expect("stored");
    assert_eq!(settled.status, EntryStatus::Succeeded);
    assert_eq!(settled.attempts, 3);
    Ok(())
}

#[tokio::test]
async fn exhaustion_after_exactly_max_attempts() -> Result<()> {
    let config = QueueConfig {
        max_attempts: 3,
        backoff_base: Duration::from_millis(10),
        backoff_cap: Duration::from_secs(1),
    };
    let h = harness(FlakyDelivery::never(), config);
    let entry = h
        .processor
        .enqueue(Payload::broadcast("ops", "done"), None, None)
        .await?;

    let mut now = Utc::now();
    for _ in 0..3 {
        h.processor.drain_once(now).await?;
        now += chrono::Duration::seconds(2);
    }

    let parked = h.store.get(&entry.id).await?.expect("stored");
    assert_eq!(parked.status, EntryStatus::Failed);
    assert_eq!(parked.attempts, 3);
    assert_eq!(h.delivery.calls(), 3, "no attempts past the budget");

    // Parked entries are never picked up again.
    h.processor.drain_once(now).await?;
    assert_eq!(h.delivery.calls(), 3);

    // Exhaustion is testified, not erred.
    let testimonies = h.testimony.all().await?;
    let exhausted: Vec<_> = testimonies
        .iter()
        .filter(|t| t.level == TestimonyLevel::Error)
        .collect();
    assert_eq!(exhausted.len(), 1);
    assert!(exhausted[0].message.contains("exhausted after 3 attempts"));
    Ok(())
}

#[tokio::test]
async fn redrive_returns_a_parked_entry_to_rotation() -> Result<()> {
    let config = QueueConfig {
        max_attempts: 1,
        ..QueueConfig::default()
    };
    let h = harness(FlakyDelivery::new(2), config);
    let entry = h
        .processor
        .enqueue(Payload::broadcast("ops", "done"), None, None)
        .await?;

    h.processor.drain_once(Utc::now()).await?;
    assert_eq!(
        h.store.get(&entry.id).await?.expect("stored").status,
        EntryStatus::Failed
    );

    let redriven = h.processor.redrive(&entry.id).await?;
    assert_eq!(redriven.status, EntryStatus::Pending);
    assert_eq!(redriven.attempts, 1, "history survives the redrive");

    // The redriven attempt succeeds this time.
    let summary = h.processor.drain_once(Utc::now()).await?;
    assert_eq!(summary.succeeded, 1);
    let settled = h.store.get(&entry.id).await?.expect("stored");
    assert_eq!(settled.status, EntryStatus::Succeeded);
    assert_eq!(settled.attempts, 2);

    let redrive_notes: Vec<_> = h
        .testimony
        .all()
        .await?
        .into_iter()
        .filter(|t| t.message.contains("redriven"))
        .collect();
    assert_eq!(redrive_notes.len(), 1);
    Ok(())
}

#[tokio::test]
async fn workflow_completion_flows_through_the_queue() -> Result<()> {
    let queue_store = Arc::new(InMemoryQueue::new());
    let testimony = Arc::new(InMemoryTestimonyLog::new());
    let workflows = Workflows::new(
        Arc::new(InMemoryRunStore::new()),
        Arc::clone(&queue_store) as Arc<dyn QueueStore>,
        Arc::clone(&testimony) as Arc<dyn TestimonyLog>,
    );

    let run = workflows.start("crown-review", "Sovereign Crown").await?;
    workflows.advance(&run.id, Phase::Process, None).await?;
    workflows.advance(&run.id, Phase::Validate, None).await?;
    workflows.advance(&run.id, Phase::Complete, None).await?;

    let delivery = Arc::new(FlakyDelivery::new(1));
    let processor = QueueProcessor::new(
        Arc::clone(&queue_store) as Arc<dyn QueueStore>,
        Arc::clone(&delivery) as Arc<dyn Delivery>,
        testimony as Arc<dyn TestimonyLog>,
        QueueConfig::default(),
    );

    let summary = processor.drain_once(Utc::now()).await?;
    assert_eq!(summary.succeeded, 1, "completion notification delivered");
    assert_eq!(delivery.calls(), 1);
    assert_eq!(queue_store.depth().await?, 0);
    Ok(())
}
