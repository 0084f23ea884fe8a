//! The auto-pipeline orchestrator: one sweep moves a user's funnel forward
//! without manual action.
//!
//! A sweep runs five steps in order: discover new companies from the
//! registry, enrich discovered startups and their founders, qualify
//! researched startups, match qualified startups against VC connections,
//! and queue outreach to the founders of qualified startups. Each step
//! tolerates per-entity failures; a broken provider degrades the sweep
//! instead of aborting it.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use tracing::{info, warn};
use uuid::Uuid;

use dealscout_common::scoring;
use dealscout_common::types::{
    Founder, FounderUpdate, Patch, Stage, Startup, StartupUpdate, TeamSizeBracket,
};
use dealscout_common::Config;

use crate::queue::OutreachQueue;
use crate::stage;
use crate::traits::{
    CompanyEnrichment, EnrichmentClient, EntityStore, FounderEnrichment, RegistryClient,
    TemplateSource, VcDirectory,
};

/// Bound on any single registry or enrichment call; a hung provider is a
/// failure for this sweep, not a wedged process.
const COLLABORATOR_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

async fn bounded<T>(fut: impl Future<Output = Result<T>>, what: &str) -> Result<T> {
    match tokio::time::timeout(COLLABORATOR_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => bail!("{what} timed out"),
    }
}

#[derive(Debug, Default, Clone)]
pub struct SweepStats {
    pub discovered: usize,
    pub enriched: usize,
    pub qualified: usize,
    pub matched: usize,
    pub queued: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

impl std::fmt::Display for SweepStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} discovered, {} enriched, {} qualified, {} matched, {} queued, {} skipped, {} errors",
            self.discovered,
            self.enriched,
            self.qualified,
            self.matched,
            self.queued,
            self.skipped,
            self.errors.len()
        )
    }
}

pub struct AutoPipeline {
    store: Arc<dyn EntityStore>,
    registry: Arc<dyn RegistryClient>,
    enrichment: Arc<dyn EnrichmentClient>,
    templates: Arc<dyn TemplateSource>,
    vc: Arc<dyn VcDirectory>,
    queue: OutreachQueue,
    /// Spacing between queued sends in a batch.
    inter_delay: Duration,
}

impl AutoPipeline {
    pub fn new(
        store: Arc<dyn EntityStore>,
        registry: Arc<dyn RegistryClient>,
        enrichment: Arc<dyn EnrichmentClient>,
        templates: Arc<dyn TemplateSource>,
        vc: Arc<dyn VcDirectory>,
        inter_delay: Duration,
    ) -> Self {
        let queue = OutreachQueue::new(store.clone());
        Self {
            store,
            registry,
            enrichment,
            templates,
            vc,
            queue,
            inter_delay,
        }
    }

    pub fn from_config(
        store: Arc<dyn EntityStore>,
        registry: Arc<dyn RegistryClient>,
        enrichment: Arc<dyn EnrichmentClient>,
        templates: Arc<dyn TemplateSource>,
        vc: Arc<dyn VcDirectory>,
        config: &Config,
    ) -> Self {
        Self::new(
            store,
            registry,
            enrichment,
            templates,
            vc,
            Duration::milliseconds(config.outreach_inter_delay_ms),
        )
    }

    /// Run one full sweep for a user. Step failures are collected in the
    /// stats; only store-level failures in the sweep skeleton propagate.
    pub async fn sweep(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<SweepStats> {
        let mut stats = SweepStats::default();

        if let Err(e) = self.discover(user_id, &mut stats).await {
            warn!(%user_id, error = %e, "discovery step failed");
            stats.errors.push(format!("discovery: {e:#}"));
        }
        if let Err(e) = self.enrich(user_id, &mut stats).await {
            warn!(%user_id, error = %e, "enrichment step failed");
            stats.errors.push(format!("enrichment: {e:#}"));
        }
        if let Err(e) = self.qualify(user_id, &mut stats).await {
            warn!(%user_id, error = %e, "qualification step failed");
            stats.errors.push(format!("qualification: {e:#}"));
        }
        if let Err(e) = self.match_vcs(user_id, &mut stats).await {
            warn!(%user_id, error = %e, "matching step failed");
            stats.errors.push(format!("matching: {e:#}"));
        }
        if let Err(e) = self.queue_outreach(user_id, now, &mut stats).await {
            warn!(%user_id, error = %e, "queueing step failed");
            stats.errors.push(format!("queueing: {e:#}"));
        }

        info!(%user_id, %stats, "pipeline sweep complete");
        Ok(stats)
    }

    /// Step 1: pull recent incorporations and insert the unseen ones,
    /// with their officers as founders. Dedup is by registry number.
    async fn discover(&self, user_id: Uuid, stats: &mut SweepStats) -> Result<()> {
        let companies = bounded(self.registry.recent_incorporations(), "registry lookup").await?;
        for company in companies {
            if self
                .store
                .startup_by_registry_number(user_id, &company.registry_number)
                .await?
                .is_some()
            {
                continue;
            }

            let mut startup = Startup::new(user_id, &company.registry_number, &company.name);
            startup.sic_codes = company.sic_codes.clone();
            startup.incorporated_on = company.incorporation_date;
            self.store.insert_startup(&startup).await?;

            for officer in &company.officers {
                let (first, last) = split_officer_name(&officer.name);
                let mut founder = Founder::new(startup.id, user_id, &first, &last);
                founder.role = Some(officer.role.clone());
                self.store.insert_founder(&founder).await?;
            }

            info!(
                name = %startup.name,
                registry_number = %startup.registry_number,
                officers = company.officers.len(),
                "discovered startup"
            );
            stats.discovered += 1;
        }
        Ok(())
    }

    /// Step 2: enrich every discovered startup and its founders, score the
    /// founders, and move the startup to researching. An enrichment failure
    /// leaves the startup in discovered for the next sweep.
    async fn enrich(&self, user_id: Uuid, stats: &mut SweepStats) -> Result<()> {
        let startups = self
            .store
            .startups_in_stages(user_id, &[Stage::Discovered])
            .await?;
        for startup in startups {
            match self.enrich_startup(&startup).await {
                Ok(()) => stats.enriched += 1,
                Err(e) => {
                    warn!(name = %startup.name, error = %e, "enrichment failed");
                    stats.errors.push(format!("enrich {}: {e:#}", startup.name));
                }
            }
        }
        Ok(())
    }

    async fn enrich_startup(&self, startup: &Startup) -> Result<()> {
        let company = bounded(
            self.enrichment
                .enrich_company(&startup.registry_number, &startup.name),
            "company enrichment",
        )
        .await?;

        let founders = self.store.founders_for_startup(startup.id).await?;
        for founder in &founders {
            let data = bounded(
                self.enrichment.enrich_founder(&founder.full_name(), &startup.name),
                "founder enrichment",
            )
            .await
            .with_context(|| format!("enriching {}", founder.full_name()))?;
            let update = founder_update_from(founder, &data);
            self.store.update_founder(founder.id, update).await?;
        }

        let update = startup_update_from(startup, &company);
        self.store.update_startup(startup.id, update).await?;
        Ok(())
    }

    /// Step 3: promote startups whose founders are scored. Discovered
    /// startups are evaluated too, so scores set outside the enrichment step
    /// still count. Startups without scored founders wait for more data.
    async fn qualify(&self, user_id: Uuid, stats: &mut SweepStats) -> Result<()> {
        let startups = self
            .store
            .startups_in_stages(user_id, &[Stage::Researching, Stage::Discovered])
            .await?;
        for startup in startups {
            match stage::qualify(self.store.as_ref(), startup.id).await {
                Ok(outcome) if outcome.newly_qualified => stats.qualified += 1,
                Ok(_) => {}
                Err(e) if e.is_validation() => {
                    info!(name = %startup.name, reason = %e, "not yet qualifiable");
                    stats.skipped += 1;
                }
                Err(e) => {
                    stats.errors.push(format!("qualify {}: {e:#}", startup.name));
                }
            }
        }
        Ok(())
    }

    /// Step 4: a thin filter matching qualified startups against the user's
    /// VC connections by SIC-code / sector overlap.
    async fn match_vcs(&self, user_id: Uuid, stats: &mut SweepStats) -> Result<()> {
        let connections = self.vc.connections_for_user(user_id).await?;
        if connections.is_empty() {
            return Ok(());
        }
        let startups = self
            .store
            .startups_in_stages(user_id, &[Stage::Qualified])
            .await?;
        for startup in startups {
            let matches: Vec<&str> = connections
                .iter()
                .filter(|vc| {
                    vc.sectors
                        .iter()
                        .any(|s| startup.sic_codes.iter().any(|c| c.eq_ignore_ascii_case(s)))
                })
                .map(|vc| vc.name.as_str())
                .collect();
            if !matches.is_empty() {
                info!(name = %startup.name, vcs = ?matches, "matched VC connections");
                stats.matched += 1;
            }
        }
        Ok(())
    }

    /// Step 5: queue outreach to every founder of a qualified startup,
    /// rendered from the user's default template and spaced out by the
    /// configured delay. No template means no automatic outreach.
    async fn queue_outreach(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
        stats: &mut SweepStats,
    ) -> Result<()> {
        let Some(template) = self.templates.default_template(user_id).await? else {
            info!(%user_id, "no default template, skipping outreach step");
            return Ok(());
        };

        let startups = self
            .store
            .startups_in_stages(user_id, &[Stage::Qualified])
            .await?;
        let mut founder_ids = Vec::new();
        for startup in &startups {
            for founder in self.store.founders_for_startup(startup.id).await? {
                founder_ids.push(founder.id);
            }
        }
        if founder_ids.is_empty() {
            return Ok(());
        }

        let outcome = self
            .queue
            .enqueue_batch(user_id, &founder_ids, &template, self.inter_delay, now)
            .await?;
        stats.queued += outcome.queued as usize;
        stats.skipped += outcome.skipped.len();
        Ok(())
    }
}

/// Registry officer names arrive as "Last, First". Anything without a comma
/// is treated as a bare first name.
fn split_officer_name(name: &str) -> (String, String) {
    match name.split_once(',') {
        Some((last, first)) => (first.trim().to_string(), last.trim().to_string()),
        None => (name.trim().to_string(), String::new()),
    }
}

fn patch_opt<T: Clone>(value: &Option<T>) -> Patch<Option<T>> {
    match value {
        Some(v) => Patch::Set(Some(v.clone())),
        None => Patch::Keep,
    }
}

/// Fold founder enrichment into a partial update, recomputing the derived
/// scores from the post-update attributes.
fn founder_update_from(founder: &Founder, data: &FounderEnrichment) -> FounderUpdate {
    let mut update = FounderUpdate {
        email: patch_opt(&data.email),
        linkedin: patch_opt(&data.linkedin),
        years_experience: data.years_experience.map_or(Patch::Keep, Patch::Set),
        high_growth_roles: data.high_growth_roles.map_or(Patch::Keep, Patch::Set),
        top_tier_school: Patch::Set(data.top_tier_school),
        advanced_degree: Patch::Set(data.advanced_degree),
        doctorate: Patch::Set(data.doctorate),
        repeat_founder: Patch::Set(data.repeat_founder),
        technical_founder: Patch::Set(data.technical_founder),
        prior_exit: Patch::Set(data.prior_exit),
        ..Default::default()
    };
    if !data.education.is_empty() {
        update.education = Patch::Set(data.education.clone());
    }
    if !data.experience.is_empty() {
        update.experience = Patch::Set(data.experience.clone());
    }

    let mut preview = founder.clone();
    update.clone().apply_to(&mut preview);
    let education = scoring::education_score(&preview);
    let experience = scoring::experience_score(&preview);
    let overall = scoring::founder_overall(education, experience);
    update.education_score = Patch::Set(Some(education));
    update.experience_score = Patch::Set(Some(experience));
    update.overall_score = Patch::Set(Some(overall));
    update.tier = Patch::Set(Some(scoring::founder_tier(overall)));
    update
}

/// Fold company enrichment into a partial update, recomputing the traction
/// score and advancing the stage to researching.
fn startup_update_from(startup: &Startup, data: &CompanyEnrichment) -> StartupUpdate {
    let mut update = StartupUpdate {
        website: patch_opt(&data.website),
        press_count: data.press_count.map_or(Patch::Keep, Patch::Set),
        funding_confirmed: data.funding_confirmed.map_or(Patch::Keep, Patch::Set),
        tech_footprint: data.tech_footprint.map_or(Patch::Keep, Patch::Set),
        product_description: patch_opt(&data.product_description),
        market_score: patch_opt(&data.market_score),
        announced_at: patch_opt(&data.announced_at),
        stealth: data.stealth.map_or(Patch::Keep, Patch::Set),
        stage: Patch::Set(Stage::Researching),
        ..Default::default()
    };
    if let Some(bracket) = data
        .team_size
        .as_deref()
        .and_then(TeamSizeBracket::parse_label)
    {
        update.team_size_bracket = Patch::Set(Some(bracket));
    }
    if let Some(stage) = scoring::infer_funding_stage(&data.funding_round_labels) {
        update.funding_stage = Patch::Set(Some(stage));
    }

    let mut preview = startup.clone();
    update.clone().apply_to(&mut preview);
    update.traction_score = Patch::Set(Some(scoring::traction_score(&preview)));
    update
}
