//! The outreach queue: enqueue guards, batch scheduling, claim, and the
//! post-delivery transitions.
//!
//! Transition rules enforced here, on top of the store's CAS primitives:
//! a founder holds at most one active item, email items require an email
//! address, sends record history exactly once, and recoverable failures
//! retry with exponential backoff until `max_attempts`.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use dealscout_common::template;
use dealscout_common::types::{
    Channel, MessageTemplate, OutreachQueueItem, OutreachRecord, QueueStatus, DEFAULT_MAX_ATTEMPTS,
};
use dealscout_common::DealScoutError;

use crate::traits::EntityStore;

/// Delay before the next retry after `attempts` prior failures: 30 minutes
/// doubling per attempt, capped at 24 hours.
pub fn retry_backoff(attempts: i32) -> Duration {
    let exp = attempts.clamp(0, 16) as u32;
    let delay = Duration::minutes(30) * 2_i32.pow(exp);
    let cap = Duration::hours(24);
    if delay > cap {
        cap
    } else {
        delay
    }
}

/// Parameters for a single enqueue. Unset schedule means "due now"; unset
/// priority defaults to 0.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub user_id: Uuid,
    pub founder_id: Uuid,
    pub startup_id: Option<Uuid>,
    pub channel: Channel,
    pub subject: Option<String>,
    pub body: String,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub priority: Option<i32>,
    pub max_attempts: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct SkippedFounder {
    pub founder_id: Uuid,
    pub reason: String,
}

/// Result of a batch enqueue: how many items went in, who was skipped and
/// why, and the window the sends will span.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub queued: u32,
    pub skipped: Vec<SkippedFounder>,
    pub first_send_at: Option<DateTime<Utc>>,
    pub last_send_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct OutreachQueue {
    store: Arc<dyn EntityStore>,
}

impl OutreachQueue {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Queue one outbound message for a founder.
    ///
    /// Rejected with a validation error when the founder is unknown, when
    /// the channel is email but the founder has no address, or when the
    /// founder already has an active (queued or sending) item.
    pub async fn enqueue(
        &self,
        req: EnqueueRequest,
        now: DateTime<Utc>,
    ) -> Result<OutreachQueueItem, DealScoutError> {
        let founder = self
            .store
            .get_founder(req.founder_id)
            .await?
            .ok_or_else(|| {
                DealScoutError::Validation(format!("unknown founder {}", req.founder_id))
            })?;

        if req.channel == Channel::Email && founder.email.is_none() {
            return Err(DealScoutError::Validation(format!(
                "founder {} has no email address",
                founder.full_name()
            )));
        }

        if self.store.has_active_item(req.founder_id).await? {
            return Err(DealScoutError::Validation(format!(
                "founder {} already has an active outreach item",
                founder.full_name()
            )));
        }

        let item = OutreachQueueItem {
            id: Uuid::new_v4(),
            user_id: req.user_id,
            founder_id: req.founder_id,
            startup_id: req.startup_id,
            channel: req.channel,
            subject: req.subject,
            body: req.body,
            status: QueueStatus::Queued,
            priority: req.priority.unwrap_or(0),
            scheduled_for: req.scheduled_for.unwrap_or(now),
            attempts: 0,
            max_attempts: req.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            last_error: None,
            sent_at: None,
            created_at: now,
        };
        self.store.insert_queue_item(&item).await?;

        info!(
            item_id = %item.id,
            founder_id = %item.founder_id,
            channel = %item.channel,
            scheduled_for = %item.scheduled_for,
            "queued outreach item"
        );
        Ok(item)
    }

    /// Queue a rendered message per founder, spaced `inter_delay` apart.
    ///
    /// Slot positions advance only on successful enqueue, so a skipped
    /// founder does not leave a hole in the send schedule. Founders that
    /// fail the enqueue guards are reported in the outcome, not fatal.
    pub async fn enqueue_batch(
        &self,
        user_id: Uuid,
        founder_ids: &[Uuid],
        template: &MessageTemplate,
        inter_delay: Duration,
        now: DateTime<Utc>,
    ) -> Result<BatchOutcome, DealScoutError> {
        let mut outcome = BatchOutcome::default();

        for &founder_id in founder_ids {
            let founder = match self.store.get_founder(founder_id).await? {
                Some(f) => f,
                None => {
                    outcome.skipped.push(SkippedFounder {
                        founder_id,
                        reason: "unknown founder".to_string(),
                    });
                    continue;
                }
            };
            let startup = self.store.get_startup(founder.startup_id).await?;

            let vars = template::outreach_vars(&founder, startup.as_ref());
            let subject = template
                .subject
                .as_deref()
                .map(|s| template::render(s, &vars));
            let body = template::render(&template.body, &vars);

            let slot = outcome.queued as i32;
            let scheduled_for = now + inter_delay * slot;
            let req = EnqueueRequest {
                user_id,
                founder_id,
                startup_id: Some(founder.startup_id),
                channel: template.channel,
                subject,
                body,
                scheduled_for: Some(scheduled_for),
                priority: Some(slot),
                max_attempts: None,
            };

            match self.enqueue(req, now).await {
                Ok(item) => {
                    outcome.queued += 1;
                    if outcome.first_send_at.is_none() {
                        outcome.first_send_at = Some(item.scheduled_for);
                    }
                    outcome.last_send_at = Some(item.scheduled_for);
                }
                Err(e) if e.is_validation() => {
                    outcome.skipped.push(SkippedFounder {
                        founder_id,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            %user_id,
            queued = outcome.queued,
            skipped = outcome.skipped.len(),
            "batch enqueue complete"
        );
        Ok(outcome)
    }

    /// Claim up to `limit` due items for one user, moving them to sending.
    pub async fn claim_due(
        &self,
        user_id: Uuid,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutreachQueueItem>, DealScoutError> {
        Ok(self.store.claim_due(user_id, limit, now).await?)
    }

    /// Record a successful delivery: sending -> sent plus exactly one
    /// history record. Fails with a validation error if the item is not
    /// in sending, in which case no history is written.
    pub async fn mark_sent(
        &self,
        item_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<OutreachRecord, DealScoutError> {
        let item = self
            .store
            .get_queue_item(item_id)
            .await?
            .ok_or_else(|| DealScoutError::Validation(format!("unknown queue item {item_id}")))?;

        let record = OutreachRecord {
            id: Uuid::new_v4(),
            user_id: item.user_id,
            founder_id: item.founder_id,
            startup_id: item.startup_id,
            channel: item.channel,
            subject: item.subject.clone(),
            body: item.body.clone(),
            sent_at: now,
        };

        if !self.store.complete_item(item.id, &record, now).await? {
            return Err(DealScoutError::Validation(format!(
                "queue item {} is {}, not sending",
                item.id, item.status
            )));
        }

        info!(item_id = %item.id, founder_id = %item.founder_id, "outreach sent");
        Ok(record)
    }

    /// Record a failed delivery attempt. Requeues with backoff while
    /// attempts remain, otherwise moves the item to terminal failed.
    /// Returns the status the item ended up in.
    pub async fn mark_failed(
        &self,
        item_id: Uuid,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<QueueStatus, DealScoutError> {
        let item = self
            .store
            .get_queue_item(item_id)
            .await?
            .ok_or_else(|| DealScoutError::Validation(format!("unknown queue item {item_id}")))?;
        if item.status != QueueStatus::Sending {
            return Err(DealScoutError::Validation(format!(
                "queue item {} is {}, not sending",
                item.id, item.status
            )));
        }

        if item.attempts + 1 < item.max_attempts {
            let retry_at = now + retry_backoff(item.attempts);
            if !self.store.requeue_item(item.id, error, retry_at).await? {
                return Err(DealScoutError::Validation(format!(
                    "queue item {} no longer sending",
                    item.id
                )));
            }
            warn!(
                item_id = %item.id,
                attempt = item.attempts + 1,
                retry_at = %retry_at,
                error,
                "outreach attempt failed, requeued"
            );
            Ok(QueueStatus::Queued)
        } else {
            if !self.store.fail_item(item.id, error).await? {
                return Err(DealScoutError::Validation(format!(
                    "queue item {} no longer sending",
                    item.id
                )));
            }
            warn!(item_id = %item.id, attempts = item.attempts + 1, error, "outreach failed permanently");
            Ok(QueueStatus::Failed)
        }
    }

    /// Remove an item that has not been picked up yet. Items already
    /// sending, sent, or failed cannot be cancelled.
    pub async fn cancel(&self, item_id: Uuid) -> Result<(), DealScoutError> {
        if self.store.delete_if_queued(item_id).await? {
            info!(%item_id, "outreach item cancelled");
            return Ok(());
        }
        match self.store.get_queue_item(item_id).await? {
            Some(item) => Err(DealScoutError::Validation(format!(
                "cannot cancel item in {}",
                item.status
            ))),
            None => Err(DealScoutError::Validation(format!(
                "unknown queue item {item_id}"
            ))),
        }
    }

    /// Put a terminally failed item back in the queue with a fresh attempt
    /// budget, due immediately.
    pub async fn retry(&self, item_id: Uuid, now: DateTime<Utc>) -> Result<(), DealScoutError> {
        if !self.store.reset_failed_item(item_id, now).await? {
            return Err(DealScoutError::Validation(format!(
                "queue item {item_id} is not failed"
            )));
        }
        info!(%item_id, "failed outreach item requeued");
        Ok(())
    }

    /// Purge all terminally failed items for a user. Returns how many
    /// were removed.
    pub async fn clear_failed(&self, user_id: Uuid) -> Result<u64, DealScoutError> {
        let removed = self.store.delete_failed_items(user_id).await?;
        if removed > 0 {
            info!(%user_id, removed, "cleared failed outreach items");
        }
        Ok(removed)
    }

    pub async fn history(&self, founder_id: Uuid) -> Result<Vec<OutreachRecord>, DealScoutError> {
        Ok(self.store.history_for_founder(founder_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{founder_fixture, startup_fixture, MockStore};
    use std::collections::HashSet;

    fn queue_with(store: MockStore) -> (OutreachQueue, Arc<MockStore>) {
        let store = Arc::new(store);
        (OutreachQueue::new(store.clone()), store)
    }

    fn email_request(user_id: Uuid, founder_id: Uuid) -> EnqueueRequest {
        EnqueueRequest {
            user_id,
            founder_id,
            startup_id: None,
            channel: Channel::Email,
            subject: Some("Intro".to_string()),
            body: "Hello".to_string(),
            scheduled_for: None,
            priority: None,
            max_attempts: None,
        }
    }

    fn template() -> MessageTemplate {
        MessageTemplate {
            channel: Channel::Email,
            subject: Some("Intro for {{first_name}}".to_string()),
            body: "Hi {{first_name}}, congrats on {{company}}!".to_string(),
        }
    }

    #[tokio::test]
    async fn enqueue_rejects_unknown_founder() {
        let (queue, _) = queue_with(MockStore::new());
        let err = queue
            .enqueue(email_request(Uuid::new_v4(), Uuid::new_v4()), Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn enqueue_rejects_email_channel_without_address() {
        let user_id = Uuid::new_v4();
        let startup = startup_fixture(user_id);
        let mut founder = founder_fixture(&startup, "Grace", "Hopper");
        founder.email = None;
        let founder_id = founder.id;

        let (queue, store) = queue_with(MockStore::new().with_startup(startup).with_founder(founder));
        let err = queue
            .enqueue(email_request(user_id, founder_id), Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.queue_len(), 0);
    }

    #[tokio::test]
    async fn linkedin_channel_needs_no_email() {
        let user_id = Uuid::new_v4();
        let startup = startup_fixture(user_id);
        let mut founder = founder_fixture(&startup, "Grace", "Hopper");
        founder.email = None;
        let founder_id = founder.id;

        let (queue, _) = queue_with(MockStore::new().with_startup(startup).with_founder(founder));
        let mut req = email_request(user_id, founder_id);
        req.channel = Channel::Linkedin;
        let item = queue.enqueue(req, Utc::now()).await.unwrap();
        assert_eq!(item.status, QueueStatus::Queued);
        assert_eq!(item.max_attempts, DEFAULT_MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn second_active_item_per_founder_rejected() {
        let user_id = Uuid::new_v4();
        let startup = startup_fixture(user_id);
        let founder = founder_fixture(&startup, "Grace", "Hopper");
        let founder_id = founder.id;

        let (queue, store) = queue_with(MockStore::new().with_startup(startup).with_founder(founder));
        let now = Utc::now();
        queue.enqueue(email_request(user_id, founder_id), now).await.unwrap();
        let err = queue
            .enqueue(email_request(user_id, founder_id), now)
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.active_count_for(founder_id), 1);
    }

    #[tokio::test]
    async fn terminal_item_does_not_block_new_enqueue() {
        let user_id = Uuid::new_v4();
        let startup = startup_fixture(user_id);
        let founder = founder_fixture(&startup, "Grace", "Hopper");
        let founder_id = founder.id;

        let (queue, _) = queue_with(MockStore::new().with_startup(startup).with_founder(founder));
        let now = Utc::now();
        let first = queue.enqueue(email_request(user_id, founder_id), now).await.unwrap();
        queue.claim_due(user_id, 10, now).await.unwrap();
        queue.mark_sent(first.id, now).await.unwrap();

        // Previous item is sent (terminal), so a fresh one is allowed
        queue.enqueue(email_request(user_id, founder_id), now).await.unwrap();
    }

    #[tokio::test]
    async fn batch_spaces_sends_by_inter_delay() {
        let user_id = Uuid::new_v4();
        let startup = startup_fixture(user_id);
        let mut store = MockStore::new();
        let mut founder_ids = Vec::new();
        for i in 0..5 {
            let founder = founder_fixture(&startup, &format!("F{i}"), "Test");
            founder_ids.push(founder.id);
            store = store.with_founder(founder);
        }
        let (queue, store) = queue_with(store.with_startup(startup));

        let now = Utc::now();
        let outcome = queue
            .enqueue_batch(user_id, &founder_ids, &template(), Duration::minutes(30), now)
            .await
            .unwrap();

        assert_eq!(outcome.queued, 5);
        assert!(outcome.skipped.is_empty());
        assert_eq!(outcome.first_send_at, Some(now));
        assert_eq!(
            outcome.last_send_at.unwrap() - outcome.first_send_at.unwrap(),
            Duration::minutes(120)
        );
        // Priorities follow slot order
        let mut priorities: Vec<i32> = founder_ids
            .iter()
            .filter_map(|&f| store.items_for_founder(f).pop())
            .map(|i| i.priority)
            .collect();
        priorities.sort();
        assert_eq!(priorities, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn batch_renders_template_per_founder() {
        let user_id = Uuid::new_v4();
        let startup = startup_fixture(user_id);
        let founder = founder_fixture(&startup, "Grace", "Hopper");
        let founder_id = founder.id;
        let startup_name = startup.name.clone();

        let (queue, store) = queue_with(MockStore::new().with_startup(startup).with_founder(founder));
        queue
            .enqueue_batch(user_id, &[founder_id], &template(), Duration::minutes(30), Utc::now())
            .await
            .unwrap();

        let item = store.items_for_founder(founder_id).pop().unwrap();
        assert_eq!(item.subject.as_deref(), Some("Intro for Grace"));
        assert_eq!(item.body, format!("Hi Grace, congrats on {startup_name}!"));
    }

    #[tokio::test]
    async fn batch_skips_do_not_leave_schedule_holes() {
        let user_id = Uuid::new_v4();
        let startup = startup_fixture(user_id);
        let good_a = founder_fixture(&startup, "Ada", "Lovelace");
        let mut no_email = founder_fixture(&startup, "No", "Email");
        no_email.email = None;
        let good_b = founder_fixture(&startup, "Alan", "Turing");
        let ids = vec![good_a.id, no_email.id, good_b.id];
        let good_b_id = good_b.id;

        let (queue, store) = queue_with(
            MockStore::new()
                .with_startup(startup)
                .with_founder(good_a)
                .with_founder(no_email)
                .with_founder(good_b),
        );
        let now = Utc::now();
        let outcome = queue
            .enqueue_batch(user_id, &ids, &template(), Duration::minutes(30), now)
            .await
            .unwrap();

        assert_eq!(outcome.queued, 2);
        assert_eq!(outcome.skipped.len(), 1);
        // Second successful founder takes slot 1, not slot 2
        let item = store.items_for_founder(good_b_id).pop().unwrap();
        assert_eq!(item.scheduled_for, now + Duration::minutes(30));
        assert_eq!(item.priority, 1);
        assert_eq!(outcome.last_send_at, Some(now + Duration::minutes(30)));
    }

    #[tokio::test]
    async fn claim_orders_by_priority_then_schedule_and_respects_limit() {
        let user_id = Uuid::new_v4();
        let startup = startup_fixture(user_id);
        let mut store = MockStore::new();
        let now = Utc::now();

        let mut expected = Vec::new();
        for (priority, offset_mins) in [(2, -5), (0, -3), (1, -10), (0, -8)] {
            let founder = founder_fixture(&startup, &format!("P{priority}O{offset_mins}"), "T");
            let item = OutreachQueueItem {
                id: Uuid::new_v4(),
                user_id,
                founder_id: founder.id,
                startup_id: Some(startup.id),
                channel: Channel::Email,
                subject: None,
                body: "hi".to_string(),
                status: QueueStatus::Queued,
                priority,
                scheduled_for: now + Duration::minutes(offset_mins),
                attempts: 0,
                max_attempts: DEFAULT_MAX_ATTEMPTS,
                last_error: None,
                sent_at: None,
                created_at: now,
            };
            expected.push((priority, item.scheduled_for, item.id));
            store = store.with_founder(founder).with_queue_item(item);
        }
        let (queue, store) = queue_with(store.with_startup(startup));

        expected.sort();
        let claimed = queue.claim_due(user_id, 3, now).await.unwrap();
        assert_eq!(claimed.len(), 3);
        let claimed_ids: Vec<Uuid> = claimed.iter().map(|i| i.id).collect();
        let expected_ids: Vec<Uuid> = expected.iter().take(3).map(|&(_, _, id)| id).collect();
        assert_eq!(claimed_ids, expected_ids);
        for id in &claimed_ids {
            assert_eq!(store.item_status(*id), Some(QueueStatus::Sending));
        }
    }

    #[tokio::test]
    async fn future_items_are_not_claimable() {
        let user_id = Uuid::new_v4();
        let startup = startup_fixture(user_id);
        let founder = founder_fixture(&startup, "Grace", "Hopper");
        let founder_id = founder.id;

        let (queue, _) = queue_with(MockStore::new().with_startup(startup).with_founder(founder));
        let now = Utc::now();
        let mut req = email_request(user_id, founder_id);
        req.scheduled_for = Some(now + Duration::hours(1));
        queue.enqueue(req, now).await.unwrap();

        assert!(queue.claim_due(user_id, 10, now).await.unwrap().is_empty());
        assert_eq!(
            queue
                .claim_due(user_id, 10, now + Duration::hours(2))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn concurrent_claims_never_overlap() {
        let user_id = Uuid::new_v4();
        let startup = startup_fixture(user_id);
        let mut store = MockStore::new();
        let now = Utc::now();
        for i in 0..6 {
            let founder = founder_fixture(&startup, &format!("F{i}"), "T");
            let item = OutreachQueueItem {
                id: Uuid::new_v4(),
                user_id,
                founder_id: founder.id,
                startup_id: Some(startup.id),
                channel: Channel::Email,
                subject: None,
                body: "hi".to_string(),
                status: QueueStatus::Queued,
                priority: i,
                scheduled_for: now,
                attempts: 0,
                max_attempts: DEFAULT_MAX_ATTEMPTS,
                last_error: None,
                sent_at: None,
                created_at: now,
            };
            store = store.with_founder(founder).with_queue_item(item);
        }
        let (queue, _) = queue_with(store.with_startup(startup));

        let (a, b) = tokio::join!(
            queue.claim_due(user_id, 4, now),
            queue.claim_due(user_id, 4, now)
        );
        let a = a.unwrap();
        let b = b.unwrap();

        let ids_a: HashSet<Uuid> = a.iter().map(|i| i.id).collect();
        let ids_b: HashSet<Uuid> = b.iter().map(|i| i.id).collect();
        assert!(ids_a.is_disjoint(&ids_b));
        assert_eq!(ids_a.len() + ids_b.len(), 6);
    }

    #[tokio::test]
    async fn mark_sent_writes_history_exactly_once() {
        let user_id = Uuid::new_v4();
        let startup = startup_fixture(user_id);
        let founder = founder_fixture(&startup, "Grace", "Hopper");
        let founder_id = founder.id;

        let (queue, store) = queue_with(MockStore::new().with_startup(startup).with_founder(founder));
        let now = Utc::now();
        let item = queue.enqueue(email_request(user_id, founder_id), now).await.unwrap();
        queue.claim_due(user_id, 1, now).await.unwrap();

        let record = queue.mark_sent(item.id, now).await.unwrap();
        assert_eq!(record.founder_id, founder_id);
        assert_eq!(store.item_status(item.id), Some(QueueStatus::Sent));

        let history = queue.history(founder_id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, record.id);
        assert_eq!(history[0].sent_at, now);

        // A second completion attempt is rejected and writes nothing
        let err = queue.mark_sent(item.id, now).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.history_count_for(founder_id), 1);
    }

    #[tokio::test]
    async fn mark_sent_requires_sending_state() {
        let user_id = Uuid::new_v4();
        let startup = startup_fixture(user_id);
        let founder = founder_fixture(&startup, "Grace", "Hopper");
        let founder_id = founder.id;

        let (queue, store) = queue_with(MockStore::new().with_startup(startup).with_founder(founder));
        let now = Utc::now();
        let item = queue.enqueue(email_request(user_id, founder_id), now).await.unwrap();

        // Still queued, never claimed
        let err = queue.mark_sent(item.id, now).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.history_count_for(founder_id), 0);
        assert_eq!(store.item_status(item.id), Some(QueueStatus::Queued));
    }

    #[tokio::test]
    async fn failures_requeue_with_backoff_then_go_terminal() {
        let user_id = Uuid::new_v4();
        let startup = startup_fixture(user_id);
        let founder = founder_fixture(&startup, "Grace", "Hopper");
        let founder_id = founder.id;

        let (queue, store) = queue_with(MockStore::new().with_startup(startup).with_founder(founder));
        let now = Utc::now();
        let item = queue.enqueue(email_request(user_id, founder_id), now).await.unwrap();

        // Attempt 1: requeued 30 minutes out
        queue.claim_due(user_id, 1, now).await.unwrap();
        let status = queue.mark_failed(item.id, "smtp timeout", now).await.unwrap();
        assert_eq!(status, QueueStatus::Queued);
        let after = store.item(item.id).unwrap();
        assert_eq!(after.attempts, 1);
        assert_eq!(after.scheduled_for, now + Duration::minutes(30));
        assert_eq!(after.last_error.as_deref(), Some("smtp timeout"));

        // Attempt 2: requeued an hour out
        let later = after.scheduled_for;
        queue.claim_due(user_id, 1, later).await.unwrap();
        let status = queue.mark_failed(item.id, "smtp timeout", later).await.unwrap();
        assert_eq!(status, QueueStatus::Queued);
        let after = store.item(item.id).unwrap();
        assert_eq!(after.attempts, 2);
        assert_eq!(after.scheduled_for, later + Duration::minutes(60));

        // Attempt 3: out of budget, terminal
        let later = after.scheduled_for;
        queue.claim_due(user_id, 1, later).await.unwrap();
        let status = queue.mark_failed(item.id, "smtp timeout", later).await.unwrap();
        assert_eq!(status, QueueStatus::Failed);
        let after = store.item(item.id).unwrap();
        assert_eq!(after.attempts, 3);
        assert_eq!(store.history_count_for(founder_id), 0);
    }

    #[tokio::test]
    async fn retry_resets_failed_item() {
        let user_id = Uuid::new_v4();
        let startup = startup_fixture(user_id);
        let founder = founder_fixture(&startup, "Grace", "Hopper");
        let founder_id = founder.id;

        let (queue, store) = queue_with(MockStore::new().with_startup(startup).with_founder(founder));
        let now = Utc::now();
        let mut req = email_request(user_id, founder_id);
        req.max_attempts = Some(1);
        let item = queue.enqueue(req, now).await.unwrap();
        queue.claim_due(user_id, 1, now).await.unwrap();
        queue.mark_failed(item.id, "bounced", now).await.unwrap();
        assert_eq!(store.item_status(item.id), Some(QueueStatus::Failed));

        queue.retry(item.id, now).await.unwrap();
        let after = store.item(item.id).unwrap();
        assert_eq!(after.status, QueueStatus::Queued);
        assert_eq!(after.attempts, 0);
        assert_eq!(after.last_error, None);
        assert_eq!(after.scheduled_for, now);

        // Retry only applies to failed items
        let err = queue.retry(item.id, now).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn cancel_only_removes_queued_items() {
        let user_id = Uuid::new_v4();
        let startup = startup_fixture(user_id);
        let founder = founder_fixture(&startup, "Grace", "Hopper");
        let founder_id = founder.id;

        let (queue, store) = queue_with(MockStore::new().with_startup(startup).with_founder(founder));
        let now = Utc::now();
        let item = queue.enqueue(email_request(user_id, founder_id), now).await.unwrap();
        queue.cancel(item.id).await.unwrap();
        assert_eq!(store.queue_len(), 0);

        // In-flight items stay put
        let item = queue.enqueue(email_request(user_id, founder_id), now).await.unwrap();
        queue.claim_due(user_id, 1, now).await.unwrap();
        let err = queue.cancel(item.id).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.item_status(item.id), Some(QueueStatus::Sending));
    }

    #[tokio::test]
    async fn clear_failed_removes_only_failed_items() {
        let user_id = Uuid::new_v4();
        let startup = startup_fixture(user_id);
        let failed_founder = founder_fixture(&startup, "Fay", "Led");
        let queued_founder = founder_fixture(&startup, "Que", "Ued");
        let failed_id = failed_founder.id;
        let queued_id = queued_founder.id;

        let (queue, store) = queue_with(
            MockStore::new()
                .with_startup(startup)
                .with_founder(failed_founder)
                .with_founder(queued_founder),
        );
        let now = Utc::now();
        let mut req = email_request(user_id, failed_id);
        req.max_attempts = Some(1);
        let doomed = queue.enqueue(req, now).await.unwrap();
        queue.claim_due(user_id, 1, now).await.unwrap();
        queue.mark_failed(doomed.id, "bounced", now).await.unwrap();

        let mut survivor_req = email_request(user_id, queued_id);
        survivor_req.scheduled_for = Some(now + Duration::hours(1));
        let survivor = queue.enqueue(survivor_req, now).await.unwrap();

        assert_eq!(queue.clear_failed(user_id).await.unwrap(), 1);
        assert_eq!(store.item(doomed.id), None);
        assert_eq!(store.item_status(survivor.id), Some(QueueStatus::Queued));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(retry_backoff(0), Duration::minutes(30));
        assert_eq!(retry_backoff(1), Duration::minutes(60));
        assert_eq!(retry_backoff(2), Duration::minutes(120));
        assert_eq!(retry_backoff(5), Duration::hours(16));
        assert_eq!(retry_backoff(6), Duration::hours(24));
        assert_eq!(retry_backoff(40), Duration::hours(24));
    }
}
