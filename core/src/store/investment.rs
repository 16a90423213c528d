//! Store methods for investments and their metric assessments.

use crate::{
    aggregator::{InvestmentMetrics, MetricSource},
    error::{AnalyticsError, AnalyticsResult},
    types::InvestmentId,
};
use chrono::{Datelike, NaiveDate};
use rusqlite::{params, OptionalExtension};
use std::collections::BTreeMap;

use super::{date_from_sql, date_to_sql, AnalyticsStore};

#[derive(Debug, Clone, Default)]
pub struct NewInvestment {
    pub name:              String,
    pub company_name:      Option<String>,
    pub sector:            Option<String>,
    pub industry:          Option<String>,
    pub region:            Option<String>,
    pub country:           Option<String>,
    pub investment_amount: Option<f64>,
    pub current_value:     Option<f64>,
    pub investment_date:   Option<NaiveDate>,
}

#[derive(Debug, Clone, Default)]
pub struct EsgAssessment {
    pub overall:       Option<f64>,
    pub environmental: Option<f64>,
    pub social:        Option<f64>,
    pub governance:    Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct ClimateAssessment {
    pub physical_risk:       Option<f64>,
    pub transition_risk:     Option<f64>,
    pub climate_opportunity: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct ImpactAssessment {
    pub overall_impact_score:  Option<f64>,
    pub beneficiaries_reached: Option<f64>,
    pub jobs_created:          Option<f64>,
    /// SDG number (1–17) → alignment sub-score.
    pub sdg_alignment:         BTreeMap<u8, f64>,
}

#[derive(Debug, Clone, Default)]
pub struct EmissionsReport {
    pub total_emissions:     Option<f64>,
    pub baseline_emissions:  Option<f64>,
    pub emissions_intensity: Option<f64>,
}

/// Decode the stored SDG alignment object. Keys may be "7", "sdg7" or
/// "SDG_7"; non-numeric values and goals outside 1–17 are dropped.
fn parse_sdg_alignment(investment_id: InvestmentId, text: Option<String>) -> BTreeMap<u8, f64> {
    let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
        return BTreeMap::new();
    };
    let map: serde_json::Map<String, serde_json::Value> = match serde_json::from_str(&text) {
        Ok(m) => m,
        Err(e) => {
            log::warn!("investment {investment_id}: unreadable sdg_alignment ({e})");
            return BTreeMap::new();
        }
    };
    map.into_iter()
        .filter_map(|(k, v)| {
            let digits = k.trim().to_ascii_lowercase();
            let digits = digits.trim_start_matches("sdg").trim_start_matches('_');
            let sdg: u8 = digits.parse().ok()?;
            ((1..=17).contains(&sdg)).then_some(())?;
            Some((sdg, v.as_f64()?))
        })
        .collect()
}

impl AnalyticsStore {
    // ── Investments ────────────────────────────────────────────

    pub fn insert_investment(&self, inv: &NewInvestment) -> AnalyticsResult<InvestmentId> {
        self.conn.execute(
            "INSERT INTO investment
                (name, company_name, sector, industry, region, country,
                 investment_amount, current_value, investment_date, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'active')",
            params![
                inv.name,
                inv.company_name,
                inv.sector,
                inv.industry,
                inv.region,
                inv.country,
                inv.investment_amount,
                inv.current_value,
                inv.investment_date.map(date_to_sql),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Mark an investment e.g. 'exited'; only 'active' rows are analysed.
    pub fn set_investment_status(&self, id: InvestmentId, status: &str) -> AnalyticsResult<()> {
        let changed = self.conn.execute(
            "UPDATE investment SET status = ?2 WHERE id = ?1",
            params![id, status],
        )?;
        if changed == 0 {
            return Err(AnalyticsError::InvestmentNotFound { id });
        }
        Ok(())
    }

    pub fn active_investment_count(&self) -> AnalyticsResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM investment WHERE status = 'active'",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn investment_exists(&self, id: InvestmentId) -> AnalyticsResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT id FROM investment WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    // ── Assessments ────────────────────────────────────────────

    pub fn insert_esg_score(
        &self,
        investment_id: InvestmentId,
        assessed_on:   NaiveDate,
        esg:           &EsgAssessment,
    ) -> AnalyticsResult<()> {
        self.conn.execute(
            "INSERT INTO esg_score
                (investment_id, assessment_date, overall_esg_score,
                 environmental_score, social_score, governance_score)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                investment_id,
                date_to_sql(assessed_on),
                esg.overall,
                esg.environmental,
                esg.social,
                esg.governance,
            ],
        )?;
        Ok(())
    }

    pub fn insert_climate_risk(
        &self,
        investment_id: InvestmentId,
        assessed_on:   NaiveDate,
        climate:       &ClimateAssessment,
    ) -> AnalyticsResult<()> {
        self.conn.execute(
            "INSERT INTO climate_risk
                (investment_id, assessment_date, physical_risk_score,
                 transition_risk_score, climate_opportunity_score)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                investment_id,
                date_to_sql(assessed_on),
                climate.physical_risk,
                climate.transition_risk,
                climate.climate_opportunity,
            ],
        )?;
        Ok(())
    }

    pub fn insert_social_impact(
        &self,
        investment_id: InvestmentId,
        assessed_on:   NaiveDate,
        impact:        &ImpactAssessment,
    ) -> AnalyticsResult<()> {
        let sdg_json = if impact.sdg_alignment.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&impact.sdg_alignment)?)
        };
        self.conn.execute(
            "INSERT INTO social_impact
                (investment_id, assessment_date, overall_impact_score,
                 beneficiaries_reached, jobs_created, sdg_alignment)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                investment_id,
                date_to_sql(assessed_on),
                impact.overall_impact_score,
                impact.beneficiaries_reached,
                impact.jobs_created,
                sdg_json,
            ],
        )?;
        Ok(())
    }

    pub fn insert_ghg_emissions(
        &self,
        investment_id:  InvestmentId,
        reporting_year: i32,
        report:         &EmissionsReport,
    ) -> AnalyticsResult<()> {
        self.conn.execute(
            "INSERT INTO ghg_emissions
                (investment_id, reporting_year, total_emissions,
                 baseline_emissions, emissions_intensity_revenue)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                investment_id,
                reporting_year,
                report.total_emissions,
                report.baseline_emissions,
                report.emissions_intensity,
            ],
        )?;
        Ok(())
    }
}

// ── Collaborator query ─────────────────────────────────────────

impl MetricSource for AnalyticsStore {
    fn load_metric_rows(&self, as_of: NaiveDate) -> AnalyticsResult<Vec<InvestmentMetrics>> {
        let mut stmt = self.conn.prepare(
            "SELECT i.id, i.name, i.sector, i.industry, i.region,
                    i.investment_amount, i.current_value, i.investment_date,
                    e.overall_esg_score,
                    c.physical_risk_score, c.transition_risk_score, c.climate_opportunity_score,
                    s.overall_impact_score, s.beneficiaries_reached, s.jobs_created, s.sdg_alignment,
                    g.total_emissions, g.baseline_emissions, g.emissions_intensity_revenue
             FROM investment i
             LEFT JOIN esg_score e ON e.id = (
                 SELECT id FROM esg_score
                 WHERE investment_id = i.id AND assessment_date <= ?1
                 ORDER BY assessment_date DESC, id DESC LIMIT 1)
             LEFT JOIN climate_risk c ON c.id = (
                 SELECT id FROM climate_risk
                 WHERE investment_id = i.id AND assessment_date <= ?1
                 ORDER BY assessment_date DESC, id DESC LIMIT 1)
             LEFT JOIN social_impact s ON s.id = (
                 SELECT id FROM social_impact
                 WHERE investment_id = i.id AND assessment_date <= ?1
                 ORDER BY assessment_date DESC, id DESC LIMIT 1)
             LEFT JOIN ghg_emissions g ON g.id = (
                 SELECT id FROM ghg_emissions
                 WHERE investment_id = i.id AND reporting_year <= ?2
                 ORDER BY reporting_year DESC, id DESC LIMIT 1)
             WHERE i.status = 'active'
             ORDER BY i.id",
        )?;
        let rows = stmt
            .query_map(params![date_to_sql(as_of), as_of.year()], |row| {
                let investment_id: InvestmentId = row.get(0)?;
                Ok(InvestmentMetrics {
                    investment_id,
                    name:                row.get(1)?,
                    sector:              row.get(2)?,
                    industry:            row.get(3)?,
                    region:              row.get(4)?,
                    investment_amount:   row.get(5)?,
                    current_value:       row.get(6)?,
                    investment_date:     date_from_sql(row.get(7)?),
                    esg_score:           row.get(8)?,
                    physical_risk:       row.get(9)?,
                    transition_risk:     row.get(10)?,
                    climate_opportunity: row.get(11)?,
                    impact_score:        row.get(12)?,
                    beneficiaries:       row.get(13)?,
                    jobs_created:        row.get(14)?,
                    sdg_alignment:       parse_sdg_alignment(investment_id, row.get(15)?),
                    total_emissions:     row.get(16)?,
                    baseline_emissions:  row.get(17)?,
                    emissions_intensity: row.get(18)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
