// Startup and founder persistence.

use uuid::Uuid;

use dealscout_common::types::{Founder, FounderUpdate, Stage, Startup, StartupUpdate};

use crate::error::Result;
use crate::rows::{bracket_to_db, score_to_db, FounderRow, StartupRow};
use crate::PgStore;

impl PgStore {
    pub async fn insert_startup(&self, s: &Startup) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO startups
                (id, user_id, registry_number, name, stage,
                 overall_score, team_score, market_score, traction_score,
                 stealth, announced_at, funding_stage, funding_confirmed,
                 website, press_count, team_size_bracket, tech_footprint,
                 product_description, sic_codes, incorporated_on, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19, $20, $21)
            "#,
        )
        .bind(s.id)
        .bind(s.user_id)
        .bind(&s.registry_number)
        .bind(&s.name)
        .bind(s.stage.as_str())
        .bind(s.overall_score.map(score_to_db))
        .bind(s.team_score.map(score_to_db))
        .bind(s.market_score.map(score_to_db))
        .bind(s.traction_score.map(score_to_db))
        .bind(s.stealth)
        .bind(s.announced_at)
        .bind(s.funding_stage.map(|f| f.as_str()))
        .bind(s.funding_confirmed)
        .bind(&s.website)
        .bind(s.press_count as i32)
        .bind(s.team_size_bracket.map(bracket_to_db))
        .bind(s.tech_footprint)
        .bind(&s.product_description)
        .bind(&s.sic_codes)
        .bind(s.incorporated_on)
        .bind(s.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_startup(&self, id: Uuid) -> Result<Option<Startup>> {
        let row = sqlx::query_as::<_, StartupRow>("SELECT * FROM startups WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.map(Startup::try_from).transpose()
    }

    pub async fn startup_by_registry_number(
        &self,
        user_id: Uuid,
        registry_number: &str,
    ) -> Result<Option<Startup>> {
        let row = sqlx::query_as::<_, StartupRow>(
            "SELECT * FROM startups WHERE user_id = $1 AND registry_number = $2",
        )
        .bind(user_id)
        .bind(registry_number)
        .fetch_optional(self.pool())
        .await?;
        row.map(Startup::try_from).transpose()
    }

    pub async fn startups_for_user(&self, user_id: Uuid) -> Result<Vec<Startup>> {
        let rows = sqlx::query_as::<_, StartupRow>(
            "SELECT * FROM startups WHERE user_id = $1 ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(Startup::try_from).collect()
    }

    pub async fn startups_in_stages(
        &self,
        user_id: Uuid,
        stages: &[Stage],
    ) -> Result<Vec<Startup>> {
        let stage_strs: Vec<&str> = stages.iter().map(|s| s.as_str()).collect();
        let rows = sqlx::query_as::<_, StartupRow>(
            r#"
            SELECT * FROM startups
            WHERE user_id = $1 AND stage = ANY($2)
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .bind(&stage_strs)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(Startup::try_from).collect()
    }

    /// Read-modify-write under row lock so a partial update never interleaves
    /// with a concurrent one.
    pub async fn update_startup(&self, id: Uuid, update: StartupUpdate) -> Result<bool> {
        let mut tx = self.pool().begin().await?;

        let row = sqlx::query_as::<_, StartupRow>("SELECT * FROM startups WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let mut startup = match row {
            Some(r) => Startup::try_from(r)?,
            None => return Ok(false),
        };
        update.apply_to(&mut startup);

        sqlx::query(
            r#"
            UPDATE startups SET
                stage = $2, overall_score = $3, team_score = $4, market_score = $5,
                traction_score = $6, stealth = $7, announced_at = $8,
                funding_stage = $9, funding_confirmed = $10, website = $11,
                press_count = $12, team_size_bracket = $13, tech_footprint = $14,
                product_description = $15
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(startup.stage.as_str())
        .bind(startup.overall_score.map(score_to_db))
        .bind(startup.team_score.map(score_to_db))
        .bind(startup.market_score.map(score_to_db))
        .bind(startup.traction_score.map(score_to_db))
        .bind(startup.stealth)
        .bind(startup.announced_at)
        .bind(startup.funding_stage.map(|f| f.as_str()))
        .bind(startup.funding_confirmed)
        .bind(&startup.website)
        .bind(startup.press_count as i32)
        .bind(startup.team_size_bracket.map(bracket_to_db))
        .bind(startup.tech_footprint)
        .bind(&startup.product_description)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Compare-and-swap on stage. Returns false when the startup was not in
    /// `from`, so concurrent paths cannot double-advance it.
    pub async fn set_stage_if(&self, id: Uuid, from: Stage, to: Stage) -> Result<bool> {
        let result = sqlx::query("UPDATE startups SET stage = $3 WHERE id = $1 AND stage = $2")
            .bind(id)
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn insert_founder(&self, f: &Founder) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO founders
                (id, startup_id, user_id, first_name, last_name, role, email,
                 linkedin, education, experience, years_experience,
                 high_growth_roles, top_tier_school, advanced_degree, doctorate,
                 repeat_founder, technical_founder, prior_exit,
                 education_score, experience_score, overall_score, tier, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)
            "#,
        )
        .bind(f.id)
        .bind(f.startup_id)
        .bind(f.user_id)
        .bind(&f.first_name)
        .bind(&f.last_name)
        .bind(&f.role)
        .bind(&f.email)
        .bind(&f.linkedin)
        .bind(serde_json::to_value(&f.education).unwrap_or_default())
        .bind(serde_json::to_value(&f.experience).unwrap_or_default())
        .bind(f.years_experience as i32)
        .bind(f.high_growth_roles as i32)
        .bind(f.top_tier_school)
        .bind(f.advanced_degree)
        .bind(f.doctorate)
        .bind(f.repeat_founder)
        .bind(f.technical_founder)
        .bind(f.prior_exit)
        .bind(f.education_score.map(score_to_db))
        .bind(f.experience_score.map(score_to_db))
        .bind(f.overall_score.map(score_to_db))
        .bind(f.tier.map(|t| t.to_string()))
        .bind(f.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_founder(&self, id: Uuid) -> Result<Option<Founder>> {
        let row = sqlx::query_as::<_, FounderRow>("SELECT * FROM founders WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.map(Founder::try_from).transpose()
    }

    pub async fn founders_for_startup(&self, startup_id: Uuid) -> Result<Vec<Founder>> {
        let rows = sqlx::query_as::<_, FounderRow>(
            "SELECT * FROM founders WHERE startup_id = $1 ORDER BY created_at ASC",
        )
        .bind(startup_id)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(Founder::try_from).collect()
    }

    pub async fn update_founder(&self, id: Uuid, update: FounderUpdate) -> Result<bool> {
        let mut tx = self.pool().begin().await?;

        let row = sqlx::query_as::<_, FounderRow>("SELECT * FROM founders WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let mut founder = match row {
            Some(r) => Founder::try_from(r)?,
            None => return Ok(false),
        };
        update.apply_to(&mut founder);

        sqlx::query(
            r#"
            UPDATE founders SET
                role = $2, email = $3, linkedin = $4, education = $5,
                experience = $6, years_experience = $7, high_growth_roles = $8,
                top_tier_school = $9, advanced_degree = $10, doctorate = $11,
                repeat_founder = $12, technical_founder = $13, prior_exit = $14,
                education_score = $15, experience_score = $16,
                overall_score = $17, tier = $18
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&founder.role)
        .bind(&founder.email)
        .bind(&founder.linkedin)
        .bind(serde_json::to_value(&founder.education).unwrap_or_default())
        .bind(serde_json::to_value(&founder.experience).unwrap_or_default())
        .bind(founder.years_experience as i32)
        .bind(founder.high_growth_roles as i32)
        .bind(founder.top_tier_school)
        .bind(founder.advanced_degree)
        .bind(founder.doctorate)
        .bind(founder.repeat_founder)
        .bind(founder.technical_founder)
        .bind(founder.prior_exit)
        .bind(founder.education_score.map(score_to_db))
        .bind(founder.experience_score.map(score_to_db))
        .bind(founder.overall_score.map(score_to_db))
        .bind(founder.tier.map(|t| t.to_string()))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}
