//! Stage transitions and pipeline statistics.
//!
//! The stage field itself is permissive storage; only two transitions carry
//! logic. Qualification computes and persists the composite scores together
//! with the stage change, and the contact transition is a compare-and-swap
//! so duplicate deliveries cannot double-advance a startup.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use dealscout_common::scoring;
use dealscout_common::types::{Patch, Stage, StartupTier, StartupUpdate};
use dealscout_common::DealScoutError;

use crate::traits::EntityStore;

/// How far back an announcement still counts as recent in pipeline stats.
const RECENT_ANNOUNCEMENT_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct QualifyOutcome {
    pub overall_score: u8,
    pub team_score: u8,
    pub tier: StartupTier,
    /// False when the startup was already qualified and only its scores
    /// were recomputed.
    pub newly_qualified: bool,
}

/// Promote a startup to `qualified`, computing its team and overall scores
/// from its founders' scores in the same write as the stage change.
///
/// Only `discovered` and `researching` startups can be promoted. Calling
/// this on an already qualified startup recomputes the scores without
/// moving the stage, so repeated qualification is idempotent.
pub async fn qualify(
    store: &dyn EntityStore,
    startup_id: Uuid,
) -> Result<QualifyOutcome, DealScoutError> {
    let startup = store
        .get_startup(startup_id)
        .await?
        .ok_or_else(|| DealScoutError::Validation(format!("unknown startup {startup_id}")))?;

    let already_qualified = startup.stage == Stage::Qualified;
    if !already_qualified
        && !matches!(startup.stage, Stage::Discovered | Stage::Researching)
    {
        return Err(DealScoutError::Validation(format!(
            "startup {} is {}, cannot qualify",
            startup.name, startup.stage
        )));
    }

    let founders = store.founders_for_startup(startup_id).await?;
    let founder_overalls: Vec<u8> = founders.iter().filter_map(|f| f.overall_score).collect();
    let team = scoring::team_score(&founder_overalls).ok_or_else(|| {
        DealScoutError::Validation(format!(
            "startup {} has no scored founders",
            startup.name
        ))
    })?;
    let overall = scoring::startup_overall(team, startup.market_score);

    let update = StartupUpdate {
        stage: if already_qualified {
            Patch::Keep
        } else {
            Patch::Set(Stage::Qualified)
        },
        team_score: Patch::Set(Some(team)),
        overall_score: Patch::Set(Some(overall)),
        ..Default::default()
    };
    store.update_startup(startup_id, update).await?;

    let tier = scoring::startup_tier(overall);
    if !already_qualified {
        info!(
            %startup_id,
            name = %startup.name,
            overall,
            team,
            %tier,
            "startup qualified"
        );
    }
    Ok(QualifyOutcome {
        overall_score: overall,
        team_score: team,
        tier,
        newly_qualified: !already_qualified,
    })
}

/// Advance `qualified -> contacted` after the first successful outreach.
/// A compare-and-swap, so the transition happens at most once; returns
/// whether this call performed it.
pub async fn record_contact(
    store: &dyn EntityStore,
    startup_id: Uuid,
) -> Result<bool, DealScoutError> {
    let moved = store
        .set_stage_if(startup_id, Stage::Qualified, Stage::Contacted)
        .await?;
    if moved {
        info!(%startup_id, "startup contacted");
    }
    Ok(moved)
}

/// Directly set a startup's stage. No edge validation; callers own the
/// transition rules.
pub async fn set_stage(
    store: &dyn EntityStore,
    startup_id: Uuid,
    to: Stage,
) -> Result<(), DealScoutError> {
    let startup = store
        .get_startup(startup_id)
        .await?
        .ok_or_else(|| DealScoutError::Validation(format!("unknown startup {startup_id}")))?;
    if startup.stage.is_terminal() && !to.is_terminal() {
        warn!(%startup_id, from = %startup.stage, stage = %to, "reviving passed startup");
    }

    let updated = store
        .update_startup(
            startup_id,
            StartupUpdate {
                stage: Patch::Set(to),
                ..Default::default()
            },
        )
        .await?;
    if !updated {
        return Err(DealScoutError::Validation(format!(
            "unknown startup {startup_id}"
        )));
    }
    info!(%startup_id, stage = %to, "stage set");
    Ok(())
}

/// Aggregate funnel statistics for one user. Full scan of the user's
/// startups; O(n) over the entity set, not paginated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStats {
    pub total: usize,
    pub discovered: usize,
    pub researching: usize,
    pub qualified: usize,
    pub contacted: usize,
    pub meeting: usize,
    pub introduced: usize,
    pub passed: usize,
    pub stealth: usize,
    pub recently_announced: usize,
    /// Mean overall score across scored startups; absent when none are scored.
    pub average_score: Option<f64>,
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} startups ({} discovered, {} researching, {} qualified, {} contacted, \
             {} meeting, {} introduced, {} passed), {} stealth, {} recently announced, \
             avg score {}",
            self.total,
            self.discovered,
            self.researching,
            self.qualified,
            self.contacted,
            self.meeting,
            self.introduced,
            self.passed,
            self.stealth,
            self.recently_announced,
            self.average_score
                .map(|s| format!("{s:.1}"))
                .unwrap_or_else(|| "n/a".to_string()),
        )
    }
}

pub async fn pipeline_stats(
    store: &dyn EntityStore,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<PipelineStats, DealScoutError> {
    let startups = store.startups_for_user(user_id).await?;
    let cutoff = now - Duration::days(RECENT_ANNOUNCEMENT_DAYS);

    let mut stats = PipelineStats {
        total: startups.len(),
        ..Default::default()
    };
    let mut score_sum: u64 = 0;
    let mut scored = 0u64;

    for startup in &startups {
        match startup.stage {
            Stage::Discovered => stats.discovered += 1,
            Stage::Researching => stats.researching += 1,
            Stage::Qualified => stats.qualified += 1,
            Stage::Contacted => stats.contacted += 1,
            Stage::Meeting => stats.meeting += 1,
            Stage::Introduced => stats.introduced += 1,
            Stage::Passed => stats.passed += 1,
        }
        if startup.stealth {
            stats.stealth += 1;
        }
        if startup.announced_at.is_some_and(|at| at >= cutoff) {
            stats.recently_announced += 1;
        }
        if let Some(score) = startup.overall_score {
            score_sum += score as u64;
            scored += 1;
        }
    }
    if scored > 0 {
        stats.average_score = Some(score_sum as f64 / scored as f64);
    }
    Ok(stats)
}
