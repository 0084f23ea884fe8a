//! In-memory mocks for every engine collaborator. No network, no database,
//! no Docker; tests drive the real engine code against these.
//!
//! `MockStore` holds everything behind one mutex, so each trait call is
//! atomic the same way the Postgres store's statements are.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use dealscout_common::types::{
    Founder, FounderUpdate, OutreachQueueItem, OutreachRecord, QueueStatus, Stage, Startup,
    StartupUpdate,
};

use crate::traits::{
    CompanyEnrichment, DeliveryClient, DeliveryReceipt, EnrichmentClient, EntityStore,
    FounderEnrichment, OutboundMessage, RegistryClient, RegistryCompany, TemplateSource,
    VcConnection, VcDirectory,
};
use dealscout_common::types::MessageTemplate;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn startup_fixture(user_id: Uuid) -> Startup {
    let registry_number: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    Startup::new(user_id, &registry_number, "Acme Robotics")
}

/// A founder with a derivable example email, attached to the given startup.
pub fn founder_fixture(startup: &Startup, first_name: &str, last_name: &str) -> Founder {
    let mut founder = Founder::new(startup.id, startup.user_id, first_name, last_name);
    founder.email = Some(format!(
        "{}.{}@example.com",
        first_name.to_lowercase(),
        last_name.to_lowercase()
    ));
    founder
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreInner {
    startups: HashMap<Uuid, Startup>,
    founders: HashMap<Uuid, Founder>,
    queue: HashMap<Uuid, OutreachQueueItem>,
    history: Vec<OutreachRecord>,
}

#[derive(Default)]
pub struct MockStore {
    inner: Mutex<StoreInner>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_startup(self, startup: Startup) -> Self {
        self.lock().startups.insert(startup.id, startup);
        self
    }

    pub fn with_founder(self, founder: Founder) -> Self {
        self.lock().founders.insert(founder.id, founder);
        self
    }

    pub fn with_queue_item(self, item: OutreachQueueItem) -> Self {
        self.lock().queue.insert(item.id, item);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap()
    }

    // --- assertion helpers ---

    pub fn startup(&self, id: Uuid) -> Option<Startup> {
        self.lock().startups.get(&id).cloned()
    }

    pub fn startup_stage(&self, id: Uuid) -> Option<Stage> {
        self.lock().startups.get(&id).map(|s| s.stage)
    }

    pub fn startups_for(&self, user_id: Uuid) -> Vec<Startup> {
        let mut startups: Vec<Startup> = self
            .lock()
            .startups
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        startups.sort_by_key(|s| (s.created_at, s.id));
        startups
    }

    pub fn founders_for(&self, startup_id: Uuid) -> Vec<Founder> {
        let mut founders: Vec<Founder> = self
            .lock()
            .founders
            .values()
            .filter(|f| f.startup_id == startup_id)
            .cloned()
            .collect();
        founders.sort_by_key(|f| (f.created_at, f.id));
        founders
    }

    pub fn item(&self, id: Uuid) -> Option<OutreachQueueItem> {
        self.lock().queue.get(&id).cloned()
    }

    pub fn item_status(&self, id: Uuid) -> Option<QueueStatus> {
        self.lock().queue.get(&id).map(|i| i.status)
    }

    pub fn items_for_founder(&self, founder_id: Uuid) -> Vec<OutreachQueueItem> {
        self.lock()
            .queue
            .values()
            .filter(|i| i.founder_id == founder_id)
            .cloned()
            .collect()
    }

    pub fn active_count_for(&self, founder_id: Uuid) -> usize {
        self.lock()
            .queue
            .values()
            .filter(|i| i.founder_id == founder_id && i.status.is_active())
            .count()
    }

    pub fn history_count_for(&self, founder_id: Uuid) -> usize {
        self.lock()
            .history
            .iter()
            .filter(|r| r.founder_id == founder_id)
            .count()
    }

    pub fn queue_len(&self) -> usize {
        self.lock().queue.len()
    }
}

#[async_trait]
impl EntityStore for MockStore {
    async fn insert_startup(&self, startup: &Startup) -> Result<()> {
        self.lock().startups.insert(startup.id, startup.clone());
        Ok(())
    }

    async fn get_startup(&self, id: Uuid) -> Result<Option<Startup>> {
        Ok(self.lock().startups.get(&id).cloned())
    }

    async fn startup_by_registry_number(
        &self,
        user_id: Uuid,
        registry_number: &str,
    ) -> Result<Option<Startup>> {
        Ok(self
            .lock()
            .startups
            .values()
            .find(|s| s.user_id == user_id && s.registry_number == registry_number)
            .cloned())
    }

    async fn startups_for_user(&self, user_id: Uuid) -> Result<Vec<Startup>> {
        Ok(self.startups_for(user_id))
    }

    async fn startups_in_stages(&self, user_id: Uuid, stages: &[Stage]) -> Result<Vec<Startup>> {
        Ok(self
            .startups_for(user_id)
            .into_iter()
            .filter(|s| stages.contains(&s.stage))
            .collect())
    }

    async fn update_startup(&self, id: Uuid, update: StartupUpdate) -> Result<bool> {
        let mut inner = self.lock();
        match inner.startups.get_mut(&id) {
            Some(startup) => {
                update.apply_to(startup);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_stage_if(&self, id: Uuid, from: Stage, to: Stage) -> Result<bool> {
        let mut inner = self.lock();
        match inner.startups.get_mut(&id) {
            Some(startup) if startup.stage == from => {
                startup.stage = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_founder(&self, founder: &Founder) -> Result<()> {
        self.lock().founders.insert(founder.id, founder.clone());
        Ok(())
    }

    async fn get_founder(&self, id: Uuid) -> Result<Option<Founder>> {
        Ok(self.lock().founders.get(&id).cloned())
    }

    async fn founders_for_startup(&self, startup_id: Uuid) -> Result<Vec<Founder>> {
        Ok(self.founders_for(startup_id))
    }

    async fn update_founder(&self, id: Uuid, update: FounderUpdate) -> Result<bool> {
        let mut inner = self.lock();
        match inner.founders.get_mut(&id) {
            Some(founder) => {
                update.apply_to(founder);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_queue_item(&self, item: &OutreachQueueItem) -> Result<()> {
        self.lock().queue.insert(item.id, item.clone());
        Ok(())
    }

    async fn get_queue_item(&self, id: Uuid) -> Result<Option<OutreachQueueItem>> {
        Ok(self.lock().queue.get(&id).cloned())
    }

    async fn has_active_item(&self, founder_id: Uuid) -> Result<bool> {
        Ok(self.active_count_for(founder_id) > 0)
    }

    async fn claim_due(
        &self,
        user_id: Uuid,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutreachQueueItem>> {
        let mut inner = self.lock();
        let mut due: Vec<Uuid> = inner
            .queue
            .values()
            .filter(|i| {
                i.user_id == user_id && i.status == QueueStatus::Queued && i.scheduled_for <= now
            })
            .map(|i| i.id)
            .collect();
        due.sort_by_key(|id| {
            let item = &inner.queue[id];
            (item.priority, item.scheduled_for, item.id)
        });
        due.truncate(limit as usize);

        let mut claimed = Vec::with_capacity(due.len());
        for id in due {
            let item = inner.queue.get_mut(&id).unwrap();
            item.status = QueueStatus::Sending;
            claimed.push(item.clone());
        }
        Ok(claimed)
    }

    async fn users_with_due_items(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let inner = self.lock();
        let mut users: Vec<Uuid> = inner
            .queue
            .values()
            .filter(|i| i.status == QueueStatus::Queued && i.scheduled_for <= now)
            .map(|i| i.user_id)
            .collect();
        users.sort();
        users.dedup();
        Ok(users)
    }

    async fn complete_item(
        &self,
        id: Uuid,
        record: &OutreachRecord,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut inner = self.lock();
        match inner.queue.get_mut(&id) {
            Some(item) if item.status == QueueStatus::Sending => {
                item.status = QueueStatus::Sent;
                item.sent_at = Some(now);
                inner.history.push(record.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn requeue_item(&self, id: Uuid, error: &str, retry_at: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.lock();
        match inner.queue.get_mut(&id) {
            Some(item) if item.status == QueueStatus::Sending => {
                item.status = QueueStatus::Queued;
                item.attempts += 1;
                item.last_error = Some(error.to_string());
                item.scheduled_for = retry_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fail_item(&self, id: Uuid, error: &str) -> Result<bool> {
        let mut inner = self.lock();
        match inner.queue.get_mut(&id) {
            Some(item) if item.status == QueueStatus::Sending => {
                item.status = QueueStatus::Failed;
                item.attempts += 1;
                item.last_error = Some(error.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_if_queued(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.lock();
        match inner.queue.get(&id) {
            Some(item) if item.status == QueueStatus::Queued => {
                inner.queue.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reset_failed_item(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.lock();
        match inner.queue.get_mut(&id) {
            Some(item) if item.status == QueueStatus::Failed => {
                item.status = QueueStatus::Queued;
                item.attempts = 0;
                item.last_error = None;
                item.scheduled_for = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_failed_items(&self, user_id: Uuid) -> Result<u64> {
        let mut inner = self.lock();
        let before = inner.queue.len();
        inner
            .queue
            .retain(|_, i| !(i.user_id == user_id && i.status == QueueStatus::Failed));
        Ok((before - inner.queue.len()) as u64)
    }

    async fn history_for_founder(&self, founder_id: Uuid) -> Result<Vec<OutreachRecord>> {
        let inner = self.lock();
        let mut records: Vec<OutreachRecord> = inner
            .history
            .iter()
            .filter(|r| r.founder_id == founder_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| std::cmp::Reverse(r.sent_at));
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// MockRegistry
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockRegistry {
    companies: Vec<RegistryCompany>,
    fail: bool,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_company(mut self, company: RegistryCompany) -> Self {
        self.companies.push(company);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl RegistryClient for MockRegistry {
    async fn recent_incorporations(&self) -> Result<Vec<RegistryCompany>> {
        if self.fail {
            bail!("registry unavailable");
        }
        Ok(self.companies.clone())
    }
}

// ---------------------------------------------------------------------------
// MockEnrichment
// ---------------------------------------------------------------------------

/// Enrichment keyed by registry number (companies) and full name (founders).
/// Unregistered lookups return empty enrichment, the provider-found-nothing
/// case.
#[derive(Default)]
pub struct MockEnrichment {
    companies: HashMap<String, CompanyEnrichment>,
    founders: HashMap<String, FounderEnrichment>,
    failing_companies: Vec<String>,
}

impl MockEnrichment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_company(mut self, registry_number: &str, data: CompanyEnrichment) -> Self {
        self.companies.insert(registry_number.to_string(), data);
        self
    }

    pub fn on_founder(mut self, full_name: &str, data: FounderEnrichment) -> Self {
        self.founders.insert(full_name.to_string(), data);
        self
    }

    pub fn failing_company(mut self, registry_number: &str) -> Self {
        self.failing_companies.push(registry_number.to_string());
        self
    }
}

#[async_trait]
impl EnrichmentClient for MockEnrichment {
    async fn enrich_company(
        &self,
        registry_number: &str,
        _name: &str,
    ) -> Result<CompanyEnrichment> {
        if self.failing_companies.iter().any(|n| n == registry_number) {
            bail!("enrichment provider unavailable");
        }
        Ok(self
            .companies
            .get(registry_number)
            .cloned()
            .unwrap_or_default())
    }

    async fn enrich_founder(&self, full_name: &str, _company_name: &str) -> Result<FounderEnrichment> {
        Ok(self.founders.get(full_name).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// MockDelivery
// ---------------------------------------------------------------------------

#[derive(Default)]
struct DeliveryInner {
    sent: Vec<OutboundMessage>,
    failures_remaining: u32,
    always_fail: bool,
}

/// Records every accepted message; can fail the first N sends or all of
/// them, and optionally stall to exercise timeouts.
#[derive(Default)]
pub struct MockDelivery {
    inner: Mutex<DeliveryInner>,
    delay: Option<std::time::Duration>,
}

impl MockDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_times(self, n: u32) -> Self {
        self.inner.lock().unwrap().failures_remaining = n;
        self
    }

    pub fn always_failing(self) -> Self {
        self.inner.lock().unwrap().always_fail = true;
        self
    }

    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.inner.lock().unwrap().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.inner.lock().unwrap().sent.len()
    }
}

#[async_trait]
impl DeliveryClient for MockDelivery {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.always_fail {
            bail!("delivery rejected");
        }
        if inner.failures_remaining > 0 {
            inner.failures_remaining -= 1;
            bail!("delivery rejected");
        }
        inner.sent.push(message.clone());
        Ok(DeliveryReceipt {
            provider_id: Some(format!("msg-{}", inner.sent.len())),
        })
    }
}

// ---------------------------------------------------------------------------
// MockTemplates / MockVcDirectory
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockTemplates {
    template: Option<MessageTemplate>,
}

impl MockTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, template: MessageTemplate) -> Self {
        self.template = Some(template);
        self
    }
}

#[async_trait]
impl TemplateSource for MockTemplates {
    async fn default_template(&self, _user_id: Uuid) -> Result<Option<MessageTemplate>> {
        Ok(self.template.clone())
    }
}

#[derive(Default)]
pub struct MockVcDirectory {
    connections: Vec<VcConnection>,
}

impl MockVcDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connection(mut self, name: &str, sectors: Vec<String>) -> Self {
        self.connections.push(VcConnection {
            name: name.to_string(),
            sectors,
        });
        self
    }
}

#[async_trait]
impl VcDirectory for MockVcDirectory {
    async fn connections_for_user(&self, _user_id: Uuid) -> Result<Vec<VcConnection>> {
        Ok(self.connections.clone())
    }
}
