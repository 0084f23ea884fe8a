//! The periodic queue processor: claims due outreach items, dispatches them
//! through the delivery collaborator, and reconciles the outcome back into
//! queue and stage state.
//!
//! One delivery attempt per claimed item per cycle. The delivery call is
//! bounded by a timeout; a timeout counts as a failed attempt so a hung
//! provider cannot wedge an item in `sending`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use dealscout_common::types::{Channel, OutreachQueueItem};
use dealscout_common::Config;

use crate::queue::OutreachQueue;
use crate::stage;
use crate::traits::{DeliveryClient, EntityStore, OutboundMessage};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ProcessorStats {
    pub users: usize,
    pub claimed: usize,
    pub sent: usize,
    pub requeued: usize,
    pub failed: usize,
    pub errors: usize,
}

impl std::fmt::Display for ProcessorStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} users, {} claimed, {} sent, {} requeued, {} failed, {} errors",
            self.users, self.claimed, self.sent, self.requeued, self.failed, self.errors
        )
    }
}

pub struct QueueProcessor {
    store: Arc<dyn EntityStore>,
    delivery: Arc<dyn DeliveryClient>,
    queue: OutreachQueue,
    /// Items claimed per user per cycle; rate limit knob.
    claim_limit: u32,
    delivery_timeout: Duration,
}

impl QueueProcessor {
    pub fn new(
        store: Arc<dyn EntityStore>,
        delivery: Arc<dyn DeliveryClient>,
        claim_limit: u32,
        delivery_timeout: Duration,
    ) -> Self {
        let queue = OutreachQueue::new(store.clone());
        Self {
            store,
            delivery,
            queue,
            claim_limit,
            delivery_timeout,
        }
    }

    pub fn from_config(
        store: Arc<dyn EntityStore>,
        delivery: Arc<dyn DeliveryClient>,
        config: &Config,
    ) -> Self {
        Self::new(
            store,
            delivery,
            config.claim_limit,
            Duration::from_secs(config.delivery_timeout_secs),
        )
    }

    /// One processing cycle across every user with due items. Per-user
    /// failures are logged and counted, never fatal to the cycle.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<ProcessorStats> {
        let mut stats = ProcessorStats::default();

        let users = self.store.users_with_due_items(now).await?;
        stats.users = users.len();
        for user_id in users {
            if let Err(e) = self.process_user(user_id, now, &mut stats).await {
                warn!(%user_id, error = %e, "queue cycle failed for user");
                stats.errors += 1;
            }
        }

        info!(%stats, "queue cycle complete");
        Ok(stats)
    }

    async fn process_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
        stats: &mut ProcessorStats,
    ) -> Result<()> {
        let items = self.queue.claim_due(user_id, self.claim_limit, now).await?;
        for item in items {
            stats.claimed += 1;
            match self.deliver(&item).await {
                Ok(()) => {
                    self.queue.mark_sent(item.id, now).await?;
                    stats.sent += 1;
                    if let Some(startup_id) = item.startup_id {
                        if let Err(e) = stage::record_contact(self.store.as_ref(), startup_id).await
                        {
                            warn!(%startup_id, error = %e, "failed to record contact transition");
                        }
                    }
                }
                Err(e) => {
                    let outcome = self
                        .queue
                        .mark_failed(item.id, &format!("{e:#}"), now)
                        .await?;
                    if outcome.is_terminal() {
                        warn!(item_id = %item.id, error = %e, "outreach item exhausted its attempts");
                        stats.failed += 1;
                    } else {
                        stats.requeued += 1;
                    }
                }
            }
        }
        Ok(())
    }

    /// Resolve the recipient address and make one bounded delivery attempt.
    async fn deliver(&self, item: &OutreachQueueItem) -> Result<()> {
        let founder = self
            .store
            .get_founder(item.founder_id)
            .await?
            .context("founder no longer exists")?;
        let recipient = match item.channel {
            Channel::Email => founder.email.clone().context("founder has no email address")?,
            Channel::Linkedin => founder
                .linkedin
                .clone()
                .unwrap_or_else(|| founder.full_name()),
        };

        let message = OutboundMessage {
            channel: item.channel,
            recipient,
            subject: item.subject.clone(),
            body: item.body.clone(),
        };
        match tokio::time::timeout(self.delivery_timeout, self.delivery.send(&message)).await {
            Ok(Ok(_receipt)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => bail!(
                "delivery timed out after {}ms",
                self.delivery_timeout.as_millis()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::EnqueueRequest;
    use crate::testing::{founder_fixture, startup_fixture, MockDelivery, MockStore};
    use chrono::Duration as ChronoDuration;
    use dealscout_common::types::{QueueStatus, Stage};

    const TIMEOUT: Duration = Duration::from_millis(200);

    fn email_request(user_id: Uuid, founder_id: Uuid, startup_id: Uuid) -> EnqueueRequest {
        EnqueueRequest {
            user_id,
            founder_id,
            startup_id: Some(startup_id),
            channel: Channel::Email,
            subject: Some("Intro".to_string()),
            body: "Hello".to_string(),
            scheduled_for: None,
            priority: None,
            max_attempts: None,
        }
    }

    struct Fixture {
        store: Arc<MockStore>,
        delivery: Arc<MockDelivery>,
        processor: QueueProcessor,
        founder_id: Uuid,
        startup_id: Uuid,
        item_id: Uuid,
    }

    async fn fixture(delivery: MockDelivery) -> Fixture {
        let user_id = Uuid::new_v4();
        let mut startup = startup_fixture(user_id);
        startup.stage = Stage::Qualified;
        let founder = founder_fixture(&startup, "Grace", "Hopper");
        let (startup_id, founder_id) = (startup.id, founder.id);

        let store = Arc::new(MockStore::new().with_startup(startup).with_founder(founder));
        let queue = OutreachQueue::new(store.clone());
        let item = queue
            .enqueue(email_request(user_id, founder_id, startup_id), Utc::now())
            .await
            .unwrap();

        let delivery = Arc::new(delivery);
        let processor = QueueProcessor::new(store.clone(), delivery.clone(), 1, TIMEOUT);
        Fixture {
            store,
            delivery,
            processor,
            founder_id,
            startup_id,
            item_id: item.id,
        }
    }

    #[tokio::test]
    async fn cycle_sends_due_item_and_records_contact() {
        let fx = fixture(MockDelivery::new()).await;
        let stats = fx.processor.run_cycle(Utc::now()).await.unwrap();

        assert_eq!(stats.users, 1);
        assert_eq!(stats.claimed, 1);
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.failed, 0);

        assert_eq!(fx.store.item_status(fx.item_id), Some(QueueStatus::Sent));
        assert_eq!(fx.store.history_count_for(fx.founder_id), 1);
        assert_eq!(fx.store.startup_stage(fx.startup_id), Some(Stage::Contacted));

        let sent = fx.delivery.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "grace.hopper@example.com");
        assert_eq!(sent[0].subject.as_deref(), Some("Intro"));
    }

    #[tokio::test]
    async fn delivery_failure_requeues_with_attempt_recorded() {
        let fx = fixture(MockDelivery::new().failing_times(1)).await;
        let now = Utc::now();
        let stats = fx.processor.run_cycle(now).await.unwrap();

        assert_eq!(stats.requeued, 1);
        assert_eq!(stats.sent, 0);
        let item = fx.store.item(fx.item_id).unwrap();
        assert_eq!(item.status, QueueStatus::Queued);
        assert_eq!(item.attempts, 1);
        assert!(item.last_error.is_some());
        assert!(item.scheduled_for > now);
        // Stage untouched on failure
        assert_eq!(fx.store.startup_stage(fx.startup_id), Some(Stage::Qualified));
    }

    #[tokio::test]
    async fn failing_item_eventually_goes_terminal() {
        let fx = fixture(MockDelivery::new().always_failing()).await;
        let mut now = Utc::now();

        for _ in 0..2 {
            let stats = fx.processor.run_cycle(now).await.unwrap();
            assert_eq!(stats.requeued, 1);
            now = fx.store.item(fx.item_id).unwrap().scheduled_for;
        }
        let stats = fx.processor.run_cycle(now).await.unwrap();
        assert_eq!(stats.failed, 1);

        let item = fx.store.item(fx.item_id).unwrap();
        assert_eq!(item.status, QueueStatus::Failed);
        assert_eq!(item.attempts, 3);
        assert_eq!(fx.store.history_count_for(fx.founder_id), 0);
    }

    #[tokio::test]
    async fn slow_delivery_times_out_and_counts_as_failure() {
        let fx = fixture(MockDelivery::new().with_delay(Duration::from_secs(5))).await;
        let stats = fx.processor.run_cycle(Utc::now()).await.unwrap();

        assert_eq!(stats.requeued, 1);
        let item = fx.store.item(fx.item_id).unwrap();
        assert_eq!(item.status, QueueStatus::Queued);
        assert!(item.last_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn claim_limit_bounds_sends_per_cycle() {
        let user_id = Uuid::new_v4();
        let startup = startup_fixture(user_id);
        let startup_id = startup.id;
        let mut store = MockStore::new();
        let mut founder_ids = Vec::new();
        for i in 0..3 {
            let founder = founder_fixture(&startup, &format!("F{i}"), "T");
            founder_ids.push(founder.id);
            store = store.with_founder(founder);
        }
        let store = Arc::new(store.with_startup(startup));
        let queue = OutreachQueue::new(store.clone());
        let now = Utc::now();
        for &fid in &founder_ids {
            queue
                .enqueue(email_request(user_id, fid, startup_id), now)
                .await
                .unwrap();
        }

        let delivery = Arc::new(MockDelivery::new());
        let processor = QueueProcessor::new(store.clone(), delivery.clone(), 1, TIMEOUT);

        let stats = processor.run_cycle(now).await.unwrap();
        assert_eq!(stats.claimed, 1);
        assert_eq!(stats.sent, 1);
        assert_eq!(delivery.sent_count(), 1);

        // Remaining items drain on later cycles
        processor.run_cycle(now).await.unwrap();
        processor.run_cycle(now).await.unwrap();
        assert_eq!(delivery.sent_count(), 3);
    }

    #[tokio::test]
    async fn each_due_user_gets_a_turn() {
        let mut store = MockStore::new();
        let now = Utc::now();
        let mut fixtures = Vec::new();
        for _ in 0..2 {
            let user_id = Uuid::new_v4();
            let startup = startup_fixture(user_id);
            let founder = founder_fixture(&startup, "Solo", "Founder");
            fixtures.push((user_id, founder.id, startup.id));
            store = store.with_startup(startup).with_founder(founder);
        }
        let store = Arc::new(store);
        let queue = OutreachQueue::new(store.clone());
        for &(user_id, founder_id, startup_id) in &fixtures {
            queue
                .enqueue(email_request(user_id, founder_id, startup_id), now)
                .await
                .unwrap();
        }

        let delivery = Arc::new(MockDelivery::new());
        let processor = QueueProcessor::new(store, delivery.clone(), 1, TIMEOUT);
        let stats = processor.run_cycle(now).await.unwrap();

        assert_eq!(stats.users, 2);
        assert_eq!(stats.sent, 2);
        assert_eq!(delivery.sent_count(), 2);
    }

    #[tokio::test]
    async fn linkedin_items_fall_back_to_full_name_recipient() {
        let user_id = Uuid::new_v4();
        let startup = startup_fixture(user_id);
        let mut founder = founder_fixture(&startup, "Grace", "Hopper");
        founder.email = None;
        founder.linkedin = None;
        let (startup_id, founder_id) = (startup.id, founder.id);

        let store = Arc::new(MockStore::new().with_startup(startup).with_founder(founder));
        let queue = OutreachQueue::new(store.clone());
        let now = Utc::now();
        let mut req = email_request(user_id, founder_id, startup_id);
        req.channel = Channel::Linkedin;
        queue.enqueue(req, now).await.unwrap();

        let delivery = Arc::new(MockDelivery::new());
        let processor = QueueProcessor::new(store, delivery.clone(), 1, TIMEOUT);
        processor.run_cycle(now).await.unwrap();

        assert_eq!(delivery.sent()[0].recipient, "Grace Hopper");
    }

    #[tokio::test]
    async fn nothing_due_is_a_quiet_cycle() {
        let fx = fixture(MockDelivery::new()).await;
        // Claim everything first so the second cycle sees an empty queue
        fx.processor.run_cycle(Utc::now()).await.unwrap();

        let stats = fx
            .processor
            .run_cycle(Utc::now() + ChronoDuration::minutes(5))
            .await
            .unwrap();
        assert_eq!(stats, ProcessorStats::default());
    }
}
