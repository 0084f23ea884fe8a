//! Pure scoring functions over enrichment attributes.
//!
//! Every function here is deterministic and side-effect-free; scores are
//! integers in [0, 100]. The canonical composite formulas (founder overall,
//! startup overall) live here and nowhere else.

use crate::types::{Founder, FounderTier, FundingStage, Startup, StartupTier, TeamSizeBracket};

/// Education score: base credit for any recorded education, bonuses for
/// top-tier school and advanced degrees.
pub fn education_score(founder: &Founder) -> u8 {
    let mut score: u32 = 0;

    if !founder.education.is_empty() || founder.top_tier_school {
        score += 40;
    }
    if founder.top_tier_school {
        score += 30;
    }
    if founder.advanced_degree {
        score += 15;
    }
    if founder.doctorate {
        score += 15;
    }

    score.min(100) as u8
}

/// Experience score: years (capped), high-growth company exposure (capped),
/// plus repeat-founder / technical-founder / prior-exit bonuses.
pub fn experience_score(founder: &Founder) -> u8 {
    let mut score: u32 = 0;

    // 3 points per year up to 10 years
    score += founder.years_experience.min(10) * 3;
    // 15 points per high-growth role, up to two roles
    score += founder.high_growth_roles.min(2) * 15;
    if founder.repeat_founder {
        score += 20;
    }
    if founder.technical_founder {
        score += 10;
    }
    if founder.prior_exit {
        score += 15;
    }

    score.min(100) as u8
}

/// Canonical founder overall score: rounded arithmetic mean of the
/// education and experience sub-scores.
pub fn founder_overall(education: u8, experience: u8) -> u8 {
    ((education as u16 + experience as u16 + 1) / 2) as u8
}

/// Founder tier: step function of the overall score against three
/// ascending thresholds.
pub fn founder_tier(overall: u8) -> FounderTier {
    if overall >= 80 {
        FounderTier::Exceptional
    } else if overall >= 65 {
        FounderTier::Strong
    } else if overall >= 50 {
        FounderTier::Promising
    } else {
        FounderTier::Standard
    }
}

/// Startup traction score: additive point system over observable signals,
/// capped at 100.
///
/// - website present: 15
/// - press coverage: 10 at >=1 article, 20 at >=3 (tiered, not cumulative)
/// - confirmed funding: 10
/// - team size bracket: 10 / 25 / 30 (small / medium / large)
/// - detectable technology footprint: 15
/// - live product description: 10
pub fn traction_score(startup: &Startup) -> u8 {
    let mut score: u32 = 0;

    if startup.website.is_some() {
        score += 15;
    }
    if startup.press_count >= 3 {
        score += 20;
    } else if startup.press_count >= 1 {
        score += 10;
    }
    if startup.funding_confirmed {
        score += 10;
    }
    score += match startup.team_size_bracket {
        Some(TeamSizeBracket::Small) => 10,
        Some(TeamSizeBracket::Medium) => 25,
        Some(TeamSizeBracket::Large) => 30,
        None => 0,
    };
    if startup.tech_footprint {
        score += 15;
    }
    if startup
        .product_description
        .as_deref()
        .is_some_and(|d| !d.trim().is_empty())
    {
        score += 10;
    }

    score.min(100) as u8
}

/// Team score: arithmetic mean of the founders' overall scores.
/// Undefined (None) when no founder has a score.
pub fn team_score(founder_overalls: &[u8]) -> Option<u8> {
    if founder_overalls.is_empty() {
        return None;
    }
    let sum: u32 = founder_overalls.iter().map(|&s| s as u32).sum();
    let n = founder_overalls.len() as u32;
    // Rounded mean
    Some(((sum + n / 2) / n).min(100) as u8)
}

/// Canonical startup overall score: `round(0.6 * team + 0.4 * market)` when
/// a market score exists, otherwise the team score alone. This is the only
/// formula that writes `overall_score` for a startup.
pub fn startup_overall(team: u8, market: Option<u8>) -> u8 {
    match market {
        Some(m) => {
            let weighted = 0.6 * team as f64 + 0.4 * m as f64;
            (weighted.round() as u32).min(100) as u8
        }
        None => team,
    }
}

/// Startup tier for display: A >= 80, B >= 65, C >= 50, else D.
/// A read-side projection; never persisted.
pub fn startup_tier(overall: u8) -> StartupTier {
    if overall >= 80 {
        StartupTier::A
    } else if overall >= 65 {
        StartupTier::B
    } else if overall >= 50 {
        StartupTier::C
    } else {
        StartupTier::D
    }
}

/// Infer the funding stage from a set of round labels: the most advanced
/// recognized stage wins.
pub fn infer_funding_stage(labels: &[String]) -> Option<FundingStage> {
    labels
        .iter()
        .filter_map(|l| FundingStage::parse_label(l))
        .max()
}
