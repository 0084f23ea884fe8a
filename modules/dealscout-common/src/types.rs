use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Funnel stage ---

/// A startup's position in the sourcing funnel. The ordering reflects funnel
/// progress but transitions are not required to be sequential; `Passed` is
/// terminal and reachable from any non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discovered,
    Researching,
    Qualified,
    Contacted,
    Meeting,
    Introduced,
    Passed,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Passed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Discovered => "discovered",
            Stage::Researching => "researching",
            Stage::Qualified => "qualified",
            Stage::Contacted => "contacted",
            Stage::Meeting => "meeting",
            Stage::Introduced => "introduced",
            Stage::Passed => "passed",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discovered" => Ok(Stage::Discovered),
            "researching" => Ok(Stage::Researching),
            "qualified" => Ok(Stage::Qualified),
            "contacted" => Ok(Stage::Contacted),
            "meeting" => Ok(Stage::Meeting),
            "introduced" => Ok(Stage::Introduced),
            "passed" => Ok(Stage::Passed),
            other => Err(format!("unknown stage: {other}")),
        }
    }
}

// --- Scoring enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FounderTier {
    Exceptional,
    Strong,
    Promising,
    Standard,
}

impl std::fmt::Display for FounderTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FounderTier::Exceptional => write!(f, "exceptional"),
            FounderTier::Strong => write!(f, "strong"),
            FounderTier::Promising => write!(f, "promising"),
            FounderTier::Standard => write!(f, "standard"),
        }
    }
}

impl std::str::FromStr for FounderTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exceptional" => Ok(FounderTier::Exceptional),
            "strong" => Ok(FounderTier::Strong),
            "promising" => Ok(FounderTier::Promising),
            "standard" => Ok(FounderTier::Standard),
            other => Err(format!("unknown founder tier: {other}")),
        }
    }
}

/// Display-only score bucket for a startup. Derived from thresholds on demand,
/// never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartupTier {
    A,
    B,
    C,
    D,
}

impl std::fmt::Display for StartupTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartupTier::A => write!(f, "A"),
            StartupTier::B => write!(f, "B"),
            StartupTier::C => write!(f, "C"),
            StartupTier::D => write!(f, "D"),
        }
    }
}

/// Funding stage in a fixed total order; later variants are more advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FundingStage {
    PreSeed,
    Seed,
    SeriesA,
    SeriesB,
    SeriesC,
    SeriesD,
}

impl FundingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FundingStage::PreSeed => "pre-seed",
            FundingStage::Seed => "seed",
            FundingStage::SeriesA => "series-a",
            FundingStage::SeriesB => "series-b",
            FundingStage::SeriesC => "series-c",
            FundingStage::SeriesD => "series-d",
        }
    }

    /// Parse a funding-round label as reported by enrichment providers.
    /// Tolerates spacing/underscore variants ("Series A", "pre_seed").
    pub fn parse_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '_' { '-' } else { c })
            .collect();
        match normalized.as_str() {
            "pre-seed" | "preseed" => Some(FundingStage::PreSeed),
            "seed" => Some(FundingStage::Seed),
            "series-a" | "seriesa" => Some(FundingStage::SeriesA),
            "series-b" | "seriesb" => Some(FundingStage::SeriesB),
            "series-c" | "seriesc" => Some(FundingStage::SeriesC),
            "series-d" | "seriesd" => Some(FundingStage::SeriesD),
            _ => None,
        }
    }
}

impl std::fmt::Display for FundingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Team-size bracket used by the traction score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamSizeBracket {
    /// 1-10 people.
    Small,
    /// 11-50 people.
    Medium,
    /// 51+ people.
    Large,
}

impl TeamSizeBracket {
    /// Parse a provider-reported bracket label ("1-10", "11-50", "51+", "51-200").
    pub fn parse_label(label: &str) -> Option<Self> {
        match label.trim() {
            "1-10" | "2-10" => Some(TeamSizeBracket::Small),
            "11-50" => Some(TeamSizeBracket::Medium),
            "51+" | "51-200" | "201-500" | "500+" => Some(TeamSizeBracket::Large),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TeamSizeBracket::Small => "small",
            TeamSizeBracket::Medium => "medium",
            TeamSizeBracket::Large => "large",
        }
    }
}

// --- Startup ---

/// A candidate company moving through the sourcing funnel.
/// Created on discovery from registry data; mutated by enrichment and
/// qualification; owns its founders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Startup {
    pub id: Uuid,
    pub user_id: Uuid,
    /// External registry number; identity key, unique per owner.
    pub registry_number: String,
    pub name: String,
    pub stage: Stage,

    // Scores, absent until computed
    pub overall_score: Option<u8>,
    pub team_score: Option<u8>,
    pub market_score: Option<u8>,
    pub traction_score: Option<u8>,

    pub stealth: bool,
    pub announced_at: Option<DateTime<Utc>>,

    // Funding metadata
    pub funding_stage: Option<FundingStage>,
    pub funding_confirmed: bool,

    // Enrichment-derived traction signals
    pub website: Option<String>,
    pub press_count: u32,
    pub team_size_bracket: Option<TeamSizeBracket>,
    pub tech_footprint: bool,
    pub product_description: Option<String>,

    pub sic_codes: Vec<String>,
    pub incorporated_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Startup {
    pub fn new(user_id: Uuid, registry_number: &str, name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            registry_number: registry_number.to_string(),
            name: name.to_string(),
            stage: Stage::Discovered,
            overall_score: None,
            team_score: None,
            market_score: None,
            traction_score: None,
            stealth: false,
            announced_at: None,
            funding_stage: None,
            funding_confirmed: false,
            website: None,
            press_count: 0,
            team_size_bracket: None,
            tech_footprint: false,
            product_description: None,
            sic_codes: Vec::new(),
            incorporated_on: None,
            created_at: Utc::now(),
        }
    }
}

// --- Founder ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EducationRecord {
    pub school: String,
    pub degree: Option<String>,
    pub field: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperienceRecord {
    pub company: String,
    pub title: Option<String>,
    pub years: Option<u32>,
}

/// A founder attached to exactly one startup. Identity is immutable;
/// enrichment fills in attributes and scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Founder {
    pub id: Uuid,
    pub startup_id: Uuid,
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub role: Option<String>,
    pub email: Option<String>,
    pub linkedin: Option<String>,

    // Enrichment attributes
    pub education: Vec<EducationRecord>,
    pub experience: Vec<ExperienceRecord>,
    pub years_experience: u32,
    pub high_growth_roles: u32,
    pub top_tier_school: bool,
    pub advanced_degree: bool,
    pub doctorate: bool,
    pub repeat_founder: bool,
    pub technical_founder: bool,
    pub prior_exit: bool,

    // Derived scores, absent until computed
    pub education_score: Option<u8>,
    pub experience_score: Option<u8>,
    pub overall_score: Option<u8>,
    pub tier: Option<FounderTier>,

    pub created_at: DateTime<Utc>,
}

impl Founder {
    pub fn new(startup_id: Uuid, user_id: Uuid, first_name: &str, last_name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            startup_id,
            user_id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            role: None,
            email: None,
            linkedin: None,
            education: Vec::new(),
            experience: Vec::new(),
            years_experience: 0,
            high_growth_roles: 0,
            top_tier_school: false,
            advanced_degree: false,
            doctorate: false,
            repeat_founder: false,
            technical_founder: false,
            prior_exit: false,
            education_score: None,
            experience_score: None,
            overall_score: None,
            tier: None,
            created_at: Utc::now(),
        }
    }

    pub fn full_name(&self) -> String {
        if self.last_name.is_empty() {
            self.first_name.clone()
        } else {
            format!("{} {}", self.first_name, self.last_name)
        }
    }
}

// --- Outreach queue ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Linkedin,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Linkedin => "linkedin",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Channel::Email),
            "linkedin" => Ok(Channel::Linkedin),
            other => Err(format!("unknown channel: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Queued,
    Sending,
    Sent,
    Failed,
}

impl QueueStatus {
    /// Active statuses count toward the one-item-per-founder invariant.
    pub fn is_active(&self) -> bool {
        matches!(self, QueueStatus::Queued | QueueStatus::Sending)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueStatus::Sent | QueueStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Queued => "queued",
            QueueStatus::Sending => "sending",
            QueueStatus::Sent => "sent",
            QueueStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(QueueStatus::Queued),
            "sending" => Ok(QueueStatus::Sending),
            "sent" => Ok(QueueStatus::Sent),
            "failed" => Ok(QueueStatus::Failed),
            other => Err(format!("unknown queue status: {other}")),
        }
    }
}

pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// One pending or completed outbound contact attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutreachQueueItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub founder_id: Uuid,
    pub startup_id: Option<Uuid>,
    pub channel: Channel,
    pub subject: Option<String>,
    pub body: String,
    pub status: QueueStatus,
    /// Lower sorts sooner on claim.
    pub priority: i32,
    /// Not claimable before this instant.
    pub scheduled_for: DateTime<Utc>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Immutable audit record of a successful send. Created exactly once per
/// sent item; never mutated for retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutreachRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub founder_id: Uuid,
    pub startup_id: Option<Uuid>,
    pub channel: Channel,
    pub subject: Option<String>,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

/// A reusable outbound message template with `{{field}}`/`{field}` tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub channel: Channel,
    pub subject: Option<String>,
    pub body: String,
}

// --- Partial updates ---

/// Tagged optional for partial updates: `Set` changes the field, `Keep`
/// leaves it alone. Distinct from `Option` so that clearing a nullable
/// field (`Set(None)`) is not conflated with "absent".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Patch<T> {
    #[default]
    Keep,
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Patch::Set(_))
    }

    /// Apply this patch to a target field.
    pub fn apply(self, target: &mut T) {
        if let Patch::Set(v) = self {
            *target = v;
        }
    }
}

/// Partial update for a startup; only `Set` fields are written.
#[derive(Debug, Clone, Default)]
pub struct StartupUpdate {
    pub stage: Patch<Stage>,
    pub overall_score: Patch<Option<u8>>,
    pub team_score: Patch<Option<u8>>,
    pub market_score: Patch<Option<u8>>,
    pub traction_score: Patch<Option<u8>>,
    pub stealth: Patch<bool>,
    pub announced_at: Patch<Option<DateTime<Utc>>>,
    pub funding_stage: Patch<Option<FundingStage>>,
    pub funding_confirmed: Patch<bool>,
    pub website: Patch<Option<String>>,
    pub press_count: Patch<u32>,
    pub team_size_bracket: Patch<Option<TeamSizeBracket>>,
    pub tech_footprint: Patch<bool>,
    pub product_description: Patch<Option<String>>,
}

impl StartupUpdate {
    /// Apply every `Set` field to the startup, leaving `Keep` fields as-is.
    pub fn apply_to(self, startup: &mut Startup) {
        self.stage.apply(&mut startup.stage);
        self.overall_score.apply(&mut startup.overall_score);
        self.team_score.apply(&mut startup.team_score);
        self.market_score.apply(&mut startup.market_score);
        self.traction_score.apply(&mut startup.traction_score);
        self.stealth.apply(&mut startup.stealth);
        self.announced_at.apply(&mut startup.announced_at);
        self.funding_stage.apply(&mut startup.funding_stage);
        self.funding_confirmed.apply(&mut startup.funding_confirmed);
        self.website.apply(&mut startup.website);
        self.press_count.apply(&mut startup.press_count);
        self.team_size_bracket.apply(&mut startup.team_size_bracket);
        self.tech_footprint.apply(&mut startup.tech_footprint);
        self.product_description.apply(&mut startup.product_description);
    }
}

/// Partial update for a founder; only `Set` fields are written.
#[derive(Debug, Clone, Default)]
pub struct FounderUpdate {
    pub role: Patch<Option<String>>,
    pub email: Patch<Option<String>>,
    pub linkedin: Patch<Option<String>>,
    pub education: Patch<Vec<EducationRecord>>,
    pub experience: Patch<Vec<ExperienceRecord>>,
    pub years_experience: Patch<u32>,
    pub high_growth_roles: Patch<u32>,
    pub top_tier_school: Patch<bool>,
    pub advanced_degree: Patch<bool>,
    pub doctorate: Patch<bool>,
    pub repeat_founder: Patch<bool>,
    pub technical_founder: Patch<bool>,
    pub prior_exit: Patch<bool>,
    pub education_score: Patch<Option<u8>>,
    pub experience_score: Patch<Option<u8>>,
    pub overall_score: Patch<Option<u8>>,
    pub tier: Patch<Option<FounderTier>>,
}

impl FounderUpdate {
    pub fn apply_to(self, founder: &mut Founder) {
        self.role.apply(&mut founder.role);
        self.email.apply(&mut founder.email);
        self.linkedin.apply(&mut founder.linkedin);
        self.education.apply(&mut founder.education);
        self.experience.apply(&mut founder.experience);
        self.years_experience.apply(&mut founder.years_experience);
        self.high_growth_roles.apply(&mut founder.high_growth_roles);
        self.top_tier_school.apply(&mut founder.top_tier_school);
        self.advanced_degree.apply(&mut founder.advanced_degree);
        self.doctorate.apply(&mut founder.doctorate);
        self.repeat_founder.apply(&mut founder.repeat_founder);
        self.technical_founder.apply(&mut founder.technical_founder);
        self.prior_exit.apply(&mut founder.prior_exit);
        self.education_score.apply(&mut founder.education_score);
        self.experience_score.apply(&mut founder.experience_score);
        self.overall_score.apply(&mut founder.overall_score);
        self.tier.apply(&mut founder.tier);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_keep_leaves_field_untouched() {
        let mut startup = Startup::new(Uuid::new_v4(), "12345678", "Acme");
        startup.website = Some("https://acme.example".to_string());

        let update = StartupUpdate {
            press_count: Patch::Set(4),
            ..Default::default()
        };
        update.apply_to(&mut startup);

        assert_eq!(startup.press_count, 4);
        assert_eq!(startup.website.as_deref(), Some("https://acme.example"));
    }

    #[test]
    fn patch_set_none_clears_nullable_field() {
        let mut startup = Startup::new(Uuid::new_v4(), "12345678", "Acme");
        startup.website = Some("https://acme.example".to_string());

        let update = StartupUpdate {
            website: Patch::Set(None),
            ..Default::default()
        };
        update.apply_to(&mut startup);

        assert_eq!(startup.website, None);
    }

    #[test]
    fn funding_stage_label_variants() {
        assert_eq!(FundingStage::parse_label("Series A"), Some(FundingStage::SeriesA));
        assert_eq!(FundingStage::parse_label("pre_seed"), Some(FundingStage::PreSeed));
        assert_eq!(FundingStage::parse_label("SEED"), Some(FundingStage::Seed));
        assert_eq!(FundingStage::parse_label("ipo"), None);
    }

    #[test]
    fn stage_round_trips_through_str() {
        for stage in [
            Stage::Discovered,
            Stage::Researching,
            Stage::Qualified,
            Stage::Contacted,
            Stage::Meeting,
            Stage::Introduced,
            Stage::Passed,
        ] {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), stage);
        }
    }
}
