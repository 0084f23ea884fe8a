// Trait abstractions for the engine's dependencies.
//
// EntityStore covers all funnel and queue persistence. The atomicity
// contract lives here: claim_due and the queue transition methods are
// read-modify-write operations that must never let two callers move the
// same item.
// RegistryClient, EnrichmentClient, DeliveryClient, TemplateSource and
// VcDirectory are black-box external collaborators.
//
// These enable deterministic testing with the mocks in `testing`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dealscout_common::types::{
    Channel, EducationRecord, ExperienceRecord, Founder, FounderUpdate, MessageTemplate,
    OutreachQueueItem, OutreachRecord, Stage, Startup, StartupUpdate,
};

// ---------------------------------------------------------------------------
// EntityStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait EntityStore: Send + Sync {
    // --- Startups ---

    async fn insert_startup(&self, startup: &Startup) -> Result<()>;
    async fn get_startup(&self, id: Uuid) -> Result<Option<Startup>>;

    /// Identity-key lookup used for discovery dedup.
    async fn startup_by_registry_number(
        &self,
        user_id: Uuid,
        registry_number: &str,
    ) -> Result<Option<Startup>>;

    async fn startups_for_user(&self, user_id: Uuid) -> Result<Vec<Startup>>;
    async fn startups_in_stages(&self, user_id: Uuid, stages: &[Stage]) -> Result<Vec<Startup>>;

    /// Partial update; only `Set` fields change. Atomic per startup.
    async fn update_startup(&self, id: Uuid, update: StartupUpdate) -> Result<bool>;

    /// Compare-and-swap on stage: advances only when the startup is still
    /// exactly in `from`. Returns whether the swap happened.
    async fn set_stage_if(&self, id: Uuid, from: Stage, to: Stage) -> Result<bool>;

    // --- Founders ---

    async fn insert_founder(&self, founder: &Founder) -> Result<()>;
    async fn get_founder(&self, id: Uuid) -> Result<Option<Founder>>;
    async fn founders_for_startup(&self, startup_id: Uuid) -> Result<Vec<Founder>>;
    async fn update_founder(&self, id: Uuid, update: FounderUpdate) -> Result<bool>;

    // --- Outreach queue ---

    async fn insert_queue_item(&self, item: &OutreachQueueItem) -> Result<()>;
    async fn get_queue_item(&self, id: Uuid) -> Result<Option<OutreachQueueItem>>;

    /// Per-founder active-item guard: any item in queued/sending?
    async fn has_active_item(&self, founder_id: Uuid) -> Result<bool>;

    /// Atomically claim up to `limit` due items (queued, scheduled_for <= now)
    /// for one user, ordered by priority then scheduled_for, flipping them to
    /// sending. Two concurrent callers never receive overlapping sets.
    async fn claim_due(
        &self,
        user_id: Uuid,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutreachQueueItem>>;

    async fn users_with_due_items(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>>;

    /// CAS sending -> sent plus the immutable history record, atomically.
    /// False means the item was not in sending and nothing was written.
    async fn complete_item(
        &self,
        id: Uuid,
        record: &OutreachRecord,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// CAS sending -> queued with attempts+1 and a new schedule.
    async fn requeue_item(&self, id: Uuid, error: &str, retry_at: DateTime<Utc>) -> Result<bool>;

    /// CAS sending -> failed (terminal) with attempts+1.
    async fn fail_item(&self, id: Uuid, error: &str) -> Result<bool>;

    /// Delete only if still queued.
    async fn delete_if_queued(&self, id: Uuid) -> Result<bool>;

    /// CAS failed -> queued with attempts reset and immediate schedule.
    async fn reset_failed_item(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool>;

    async fn delete_failed_items(&self, user_id: Uuid) -> Result<u64>;
    async fn history_for_founder(&self, founder_id: Uuid) -> Result<Vec<OutreachRecord>>;
}

#[async_trait]
impl EntityStore for dealscout_store::PgStore {
    async fn insert_startup(&self, startup: &Startup) -> Result<()> {
        Ok(self.insert_startup(startup).await?)
    }

    async fn get_startup(&self, id: Uuid) -> Result<Option<Startup>> {
        Ok(self.get_startup(id).await?)
    }

    async fn startup_by_registry_number(
        &self,
        user_id: Uuid,
        registry_number: &str,
    ) -> Result<Option<Startup>> {
        Ok(self.startup_by_registry_number(user_id, registry_number).await?)
    }

    async fn startups_for_user(&self, user_id: Uuid) -> Result<Vec<Startup>> {
        Ok(self.startups_for_user(user_id).await?)
    }

    async fn startups_in_stages(&self, user_id: Uuid, stages: &[Stage]) -> Result<Vec<Startup>> {
        Ok(self.startups_in_stages(user_id, stages).await?)
    }

    async fn update_startup(&self, id: Uuid, update: StartupUpdate) -> Result<bool> {
        Ok(self.update_startup(id, update).await?)
    }

    async fn set_stage_if(&self, id: Uuid, from: Stage, to: Stage) -> Result<bool> {
        Ok(self.set_stage_if(id, from, to).await?)
    }

    async fn insert_founder(&self, founder: &Founder) -> Result<()> {
        Ok(self.insert_founder(founder).await?)
    }

    async fn get_founder(&self, id: Uuid) -> Result<Option<Founder>> {
        Ok(self.get_founder(id).await?)
    }

    async fn founders_for_startup(&self, startup_id: Uuid) -> Result<Vec<Founder>> {
        Ok(self.founders_for_startup(startup_id).await?)
    }

    async fn update_founder(&self, id: Uuid, update: FounderUpdate) -> Result<bool> {
        Ok(self.update_founder(id, update).await?)
    }

    async fn insert_queue_item(&self, item: &OutreachQueueItem) -> Result<()> {
        Ok(self.insert_queue_item(item).await?)
    }

    async fn get_queue_item(&self, id: Uuid) -> Result<Option<OutreachQueueItem>> {
        Ok(self.get_queue_item(id).await?)
    }

    async fn has_active_item(&self, founder_id: Uuid) -> Result<bool> {
        Ok(self.has_active_item(founder_id).await?)
    }

    async fn claim_due(
        &self,
        user_id: Uuid,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutreachQueueItem>> {
        Ok(self.claim_due(user_id, limit, now).await?)
    }

    async fn users_with_due_items(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
        Ok(self.users_with_due_items(now).await?)
    }

    async fn complete_item(
        &self,
        id: Uuid,
        record: &OutreachRecord,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self.complete_item(id, record, now).await?)
    }

    async fn requeue_item(&self, id: Uuid, error: &str, retry_at: DateTime<Utc>) -> Result<bool> {
        Ok(self.requeue_item(id, error, retry_at).await?)
    }

    async fn fail_item(&self, id: Uuid, error: &str) -> Result<bool> {
        Ok(self.fail_item(id, error).await?)
    }

    async fn delete_if_queued(&self, id: Uuid) -> Result<bool> {
        Ok(self.delete_if_queued(id).await?)
    }

    async fn reset_failed_item(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        Ok(self.reset_failed_item(id, now).await?)
    }

    async fn delete_failed_items(&self, user_id: Uuid) -> Result<u64> {
        Ok(self.delete_failed_items(user_id).await?)
    }

    async fn history_for_founder(&self, founder_id: Uuid) -> Result<Vec<OutreachRecord>> {
        Ok(self.history_for_founder(founder_id).await?)
    }
}

// ---------------------------------------------------------------------------
// Registry discovery collaborator
// ---------------------------------------------------------------------------

/// An officer record as reported by the company registry. `name` is
/// `"Last, First"` formatted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryOfficer {
    pub name: String,
    pub role: String,
    pub appointed_on: Option<NaiveDate>,
    pub nationality: Option<String>,
    pub occupation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryCompany {
    pub registry_number: String,
    pub name: String,
    pub incorporation_date: Option<NaiveDate>,
    pub status: String,
    pub company_type: String,
    pub address: Option<String>,
    pub sic_codes: Vec<String>,
    pub officers: Vec<RegistryOfficer>,
}

#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Candidate companies from the external registry. The orchestrator
    /// dedupes against known registry numbers before inserting.
    async fn recent_incorporations(&self) -> Result<Vec<RegistryCompany>>;
}

// ---------------------------------------------------------------------------
// Enrichment collaborator
// ---------------------------------------------------------------------------

/// Company-level enrichment. All fields optional; providers return partial
/// data and the orchestrator writes only what arrived.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanyEnrichment {
    pub website: Option<String>,
    pub press_count: Option<u32>,
    pub funding_round_labels: Vec<String>,
    pub funding_confirmed: Option<bool>,
    pub team_size: Option<String>,
    pub tech_footprint: Option<bool>,
    pub product_description: Option<String>,
    pub market_score: Option<u8>,
    pub announced_at: Option<DateTime<Utc>>,
    pub stealth: Option<bool>,
}

/// Founder-level enrichment; same partial-data contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FounderEnrichment {
    pub email: Option<String>,
    pub linkedin: Option<String>,
    pub education: Vec<EducationRecord>,
    pub experience: Vec<ExperienceRecord>,
    pub years_experience: Option<u32>,
    pub high_growth_roles: Option<u32>,
    pub top_tier_school: bool,
    pub advanced_degree: bool,
    pub doctorate: bool,
    pub repeat_founder: bool,
    pub technical_founder: bool,
    pub prior_exit: bool,
}

#[async_trait]
pub trait EnrichmentClient: Send + Sync {
    async fn enrich_company(&self, registry_number: &str, name: &str)
        -> Result<CompanyEnrichment>;

    async fn enrich_founder(&self, full_name: &str, company_name: &str)
        -> Result<FounderEnrichment>;
}

// ---------------------------------------------------------------------------
// Delivery collaborator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: Channel,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub provider_id: Option<String>,
}

#[async_trait]
pub trait DeliveryClient: Send + Sync {
    /// One delivery attempt. No internal retry; the queue owns all retry.
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt>;
}

// ---------------------------------------------------------------------------
// Template and VC-directory collaborators
// ---------------------------------------------------------------------------

#[async_trait]
pub trait TemplateSource: Send + Sync {
    /// The user's default outreach template, if one is configured.
    async fn default_template(&self, user_id: Uuid) -> Result<Option<MessageTemplate>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VcConnection {
    pub name: String,
    pub sectors: Vec<String>,
}

#[async_trait]
pub trait VcDirectory: Send + Sync {
    async fn connections_for_user(&self, user_id: Uuid) -> Result<Vec<VcConnection>>;
}
