// Row shapes and domain conversions. Enum columns are stored as TEXT and
// parsed on read; a parse failure surfaces as CorruptRow rather than a panic.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use dealscout_common::types::{
    Channel, Founder, FounderTier, FundingStage, OutreachQueueItem, OutreachRecord, QueueStatus,
    Stage, Startup, TeamSizeBracket,
};

use crate::error::{Result, StoreError};

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct StartupRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub registry_number: String,
    pub name: String,
    pub stage: String,
    pub overall_score: Option<i16>,
    pub team_score: Option<i16>,
    pub market_score: Option<i16>,
    pub traction_score: Option<i16>,
    pub stealth: bool,
    pub announced_at: Option<DateTime<Utc>>,
    pub funding_stage: Option<String>,
    pub funding_confirmed: bool,
    pub website: Option<String>,
    pub press_count: i32,
    pub team_size_bracket: Option<String>,
    pub tech_footprint: bool,
    pub product_description: Option<String>,
    pub sic_codes: Vec<String>,
    pub incorporated_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<StartupRow> for Startup {
    type Error = StoreError;

    fn try_from(row: StartupRow) -> Result<Startup> {
        let stage: Stage = row
            .stage
            .parse()
            .map_err(|e: String| StoreError::CorruptRow(format!("startup {}: {e}", row.id)))?;
        let funding_stage = match row.funding_stage.as_deref() {
            Some(s) => Some(FundingStage::parse_label(s).ok_or_else(|| {
                StoreError::CorruptRow(format!("startup {}: unknown funding stage {s}", row.id))
            })?),
            None => None,
        };
        let team_size_bracket = match row.team_size_bracket.as_deref() {
            Some("small") => Some(TeamSizeBracket::Small),
            Some("medium") => Some(TeamSizeBracket::Medium),
            Some("large") => Some(TeamSizeBracket::Large),
            Some(other) => {
                return Err(StoreError::CorruptRow(format!(
                    "startup {}: unknown team size bracket {other}",
                    row.id
                )))
            }
            None => None,
        };
        Ok(Startup {
            id: row.id,
            user_id: row.user_id,
            registry_number: row.registry_number,
            name: row.name,
            stage,
            overall_score: row.overall_score.map(score_from_db),
            team_score: row.team_score.map(score_from_db),
            market_score: row.market_score.map(score_from_db),
            traction_score: row.traction_score.map(score_from_db),
            stealth: row.stealth,
            announced_at: row.announced_at,
            funding_stage,
            funding_confirmed: row.funding_confirmed,
            website: row.website,
            press_count: row.press_count.max(0) as u32,
            team_size_bracket,
            tech_footprint: row.tech_footprint,
            product_description: row.product_description,
            sic_codes: row.sic_codes,
            incorporated_on: row.incorporated_on,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FounderRow {
    pub id: Uuid,
    pub startup_id: Uuid,
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub role: Option<String>,
    pub email: Option<String>,
    pub linkedin: Option<String>,
    pub education: serde_json::Value,
    pub experience: serde_json::Value,
    pub years_experience: i32,
    pub high_growth_roles: i32,
    pub top_tier_school: bool,
    pub advanced_degree: bool,
    pub doctorate: bool,
    pub repeat_founder: bool,
    pub technical_founder: bool,
    pub prior_exit: bool,
    pub education_score: Option<i16>,
    pub experience_score: Option<i16>,
    pub overall_score: Option<i16>,
    pub tier: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<FounderRow> for Founder {
    type Error = StoreError;

    fn try_from(row: FounderRow) -> Result<Founder> {
        let tier = match row.tier.as_deref() {
            Some(t) => Some(t.parse::<FounderTier>().map_err(|e| {
                StoreError::CorruptRow(format!("founder {}: {e}", row.id))
            })?),
            None => None,
        };
        let education = serde_json::from_value(row.education)
            .map_err(|e| StoreError::CorruptRow(format!("founder {}: education: {e}", row.id)))?;
        let experience = serde_json::from_value(row.experience)
            .map_err(|e| StoreError::CorruptRow(format!("founder {}: experience: {e}", row.id)))?;
        Ok(Founder {
            id: row.id,
            startup_id: row.startup_id,
            user_id: row.user_id,
            first_name: row.first_name,
            last_name: row.last_name,
            role: row.role,
            email: row.email,
            linkedin: row.linkedin,
            education,
            experience,
            years_experience: row.years_experience.max(0) as u32,
            high_growth_roles: row.high_growth_roles.max(0) as u32,
            top_tier_school: row.top_tier_school,
            advanced_degree: row.advanced_degree,
            doctorate: row.doctorate,
            repeat_founder: row.repeat_founder,
            technical_founder: row.technical_founder,
            prior_exit: row.prior_exit,
            education_score: row.education_score.map(score_from_db),
            experience_score: row.experience_score.map(score_from_db),
            overall_score: row.overall_score.map(score_from_db),
            tier,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct QueueItemRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub founder_id: Uuid,
    pub startup_id: Option<Uuid>,
    pub channel: String,
    pub subject: Option<String>,
    pub body: String,
    pub status: String,
    pub priority: i32,
    pub scheduled_for: DateTime<Utc>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<QueueItemRow> for OutreachQueueItem {
    type Error = StoreError;

    fn try_from(row: QueueItemRow) -> Result<OutreachQueueItem> {
        let channel: Channel = row
            .channel
            .parse()
            .map_err(|e: String| StoreError::CorruptRow(format!("queue item {}: {e}", row.id)))?;
        let status: QueueStatus = row
            .status
            .parse()
            .map_err(|e: String| StoreError::CorruptRow(format!("queue item {}: {e}", row.id)))?;
        Ok(OutreachQueueItem {
            id: row.id,
            user_id: row.user_id,
            founder_id: row.founder_id,
            startup_id: row.startup_id,
            channel,
            subject: row.subject,
            body: row.body,
            status,
            priority: row.priority,
            scheduled_for: row.scheduled_for,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            last_error: row.last_error,
            sent_at: row.sent_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OutreachRecordRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub founder_id: Uuid,
    pub startup_id: Option<Uuid>,
    pub channel: String,
    pub subject: Option<String>,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

impl TryFrom<OutreachRecordRow> for OutreachRecord {
    type Error = StoreError;

    fn try_from(row: OutreachRecordRow) -> Result<OutreachRecord> {
        let channel: Channel = row
            .channel
            .parse()
            .map_err(|e: String| StoreError::CorruptRow(format!("outreach {}: {e}", row.id)))?;
        Ok(OutreachRecord {
            id: row.id,
            user_id: row.user_id,
            founder_id: row.founder_id,
            startup_id: row.startup_id,
            channel,
            subject: row.subject,
            body: row.body,
            sent_at: row.sent_at,
        })
    }
}

pub(crate) fn score_from_db(v: i16) -> u8 {
    v.clamp(0, 100) as u8
}

pub(crate) fn score_to_db(v: u8) -> i16 {
    v as i16
}

pub(crate) fn bracket_to_db(b: TeamSizeBracket) -> &'static str {
    b.as_str()
}
