//! Deterministic demo portfolio generation.
//!
//! Seeds a store with plausible impact investments and assessments from
//! curated lists. Same seed = same portfolio, row for row.

use crate::{
    error::AnalyticsResult,
    rng::{RngBank, StreamRng, StreamSlot},
    store::{
        AnalyticsStore, ClimateAssessment, EmissionsReport, EsgAssessment, ImpactAssessment,
        NewInvestment,
    },
    types::InvestmentId,
};
use chrono::{Datelike, Duration, NaiveDate};
use std::collections::BTreeMap;

/// Sector, its industries, and the SDGs it typically serves.
struct SectorProfile {
    sector:     &'static str,
    industries: &'static [&'static str],
    sdgs:       &'static [u8],
    /// Typical (physical, transition) climate risk.
    risk:       (f64, f64),
}

const SECTORS: &[SectorProfile] = &[
    SectorProfile {
        sector:     "Energy",
        industries: &["Solar", "Wind", "Energy Storage"],
        sdgs:       &[7, 9, 13],
        risk:       (4.0, 3.0),
    },
    SectorProfile {
        sector:     "Healthcare",
        industries: &["Diagnostics", "Primary Care", "Medical Devices"],
        sdgs:       &[3, 10],
        risk:       (2.5, 2.0),
    },
    SectorProfile {
        sector:     "Financials",
        industries: &["Microfinance", "Insurance", "Digital Payments"],
        sdgs:       &[1, 5, 8],
        risk:       (2.0, 3.5),
    },
    SectorProfile {
        sector:     "Agriculture",
        industries: &["Regenerative Farming", "Food Processing"],
        sdgs:       &[2, 12, 15],
        risk:       (6.5, 4.5),
    },
    SectorProfile {
        sector:     "Real Estate",
        industries: &["Affordable Housing", "Green Buildings"],
        sdgs:       &[11, 7],
        risk:       (5.5, 5.0),
    },
];

const REGIONS: &[&str] = &["North America", "Europe", "Asia Pacific", "Latin America", "Africa"];

const NAME_PREFIXES: &[&str] = &[
    "Aurora", "Bright", "Cedar", "Delta", "Evergreen", "Horizon", "Keystone", "Meridian",
    "Northwind", "Pioneer", "Riverstone", "Summit", "Terra", "Verdant", "Zenith",
];

const NAME_SUFFIXES: &[&str] = &["Holdings", "Partners", "Group", "Ventures", "Co", "Labs"];

fn pick<'a, T>(rng: &mut StreamRng, items: &'a [T]) -> &'a T {
    &items[rng.next_u64_below(items.len() as u64) as usize]
}

/// Deterministic company name: "Prefix Industry Suffix".
pub fn company_name(rng: &mut StreamRng, industry: &str) -> String {
    format!("{} {} {}", pick(rng, NAME_PREFIXES), industry, pick(rng, NAME_SUFFIXES))
}

pub struct DemoPortfolio;

impl DemoPortfolio {
    /// Insert `count` investments with assessments dated before `as_of`.
    /// About one in eight assessments is left out so engines see the
    /// sparse data real portfolios have.
    pub fn seed(
        store: &AnalyticsStore,
        seed:  u64,
        count: usize,
        as_of: NaiveDate,
    ) -> AnalyticsResult<Vec<InvestmentId>> {
        let bank = RngBank::new(seed);
        let mut holdings = bank.for_slot(StreamSlot::DemoHoldings);
        let mut assessments = bank.for_slot(StreamSlot::DemoAssessments);
        let mut ids = Vec::with_capacity(count);

        for _ in 0..count {
            let profile = pick(&mut holdings, SECTORS);
            let industry = *pick(&mut holdings, profile.industries);
            let region = *pick(&mut holdings, REGIONS);
            let name = company_name(&mut holdings, industry);

            // Quality drives both ESG and (weakly) return.
            let quality = assessments.next_f64();
            let amount = (holdings.uniform(0.5, 5.0) * 1_000_000.0).round();
            let annual = -4.0 + 14.0 * quality + assessments.normal(0.0, 4.0);
            let years = holdings.uniform(0.5, 6.0);
            let current = (amount * (1.0 + annual / 100.0).max(0.2).powf(years)).round();
            let invested_on = as_of - Duration::days((years * 365.25) as i64);

            let id = store.insert_investment(&NewInvestment {
                name:              name.clone(),
                company_name:      Some(name),
                sector:            Some(profile.sector.to_string()),
                industry:          Some(industry.to_string()),
                region:            Some(region.to_string()),
                country:           None,
                investment_amount: Some(amount),
                current_value:     Some(current),
                investment_date:   Some(invested_on),
            })?;

            let assessed_on = as_of - Duration::days(holdings.next_u64_below(180) as i64);
            let esg = (35.0 + 55.0 * quality + assessments.normal(0.0, 5.0)).clamp(0.0, 100.0);
            if !assessments.chance(0.125) {
                store.insert_esg_score(id, assessed_on, &EsgAssessment {
                    overall:       Some(esg),
                    environmental: Some((esg + assessments.normal(0.0, 6.0)).clamp(0.0, 100.0)),
                    social:        Some((esg + assessments.normal(0.0, 6.0)).clamp(0.0, 100.0)),
                    governance:    Some((esg + assessments.normal(0.0, 6.0)).clamp(0.0, 100.0)),
                })?;
            }

            if !assessments.chance(0.125) {
                let (phys, trans) = profile.risk;
                store.insert_climate_risk(id, assessed_on, &ClimateAssessment {
                    physical_risk:       Some((phys + assessments.normal(0.0, 1.5)).clamp(0.0, 10.0)),
                    transition_risk:     Some(
                        (trans - 2.0 * quality + assessments.normal(0.0, 1.0)).clamp(0.0, 10.0),
                    ),
                    climate_opportunity: Some(assessments.uniform(2.0, 9.0)),
                })?;
            }

            if !assessments.chance(0.125) {
                let sdg_alignment: BTreeMap<u8, f64> = profile
                    .sdgs
                    .iter()
                    .map(|sdg| (*sdg, (assessments.uniform(3.0, 10.0) * 10.0).round() / 10.0))
                    .collect();
                store.insert_social_impact(id, assessed_on, &ImpactAssessment {
                    overall_impact_score:  Some(
                        (3.0 + 6.0 * quality + assessments.normal(0.0, 1.0)).clamp(0.0, 10.0),
                    ),
                    beneficiaries_reached: Some((assessments.uniform(500.0, 50_000.0)).round()),
                    jobs_created:          Some((assessments.uniform(5.0, 400.0)).round()),
                    sdg_alignment,
                })?;
            }

            if !assessments.chance(0.125) {
                let baseline = assessments.uniform(1_000.0, 20_000.0).round();
                let cut = assessments.uniform(-0.05, 0.4);
                store.insert_ghg_emissions(id, as_of.year() - 1, &EmissionsReport {
                    total_emissions:     Some((baseline * (1.0 - cut)).round()),
                    baseline_emissions:  Some(baseline),
                    emissions_intensity: Some(assessments.uniform(5.0, 250.0)),
                })?;
            }

            ids.push(id);
        }

        log::info!("demo: seeded {} investments (seed={seed})", ids.len());
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_produces_same_name() {
        let bank = RngBank::new(12345);
        let mut rng1 = bank.for_slot(StreamSlot::DemoHoldings);
        let mut rng2 = RngBank::new(12345).for_slot(StreamSlot::DemoHoldings);

        let name1 = company_name(&mut rng1, "Solar");
        let name2 = company_name(&mut rng2, "Solar");

        assert_eq!(name1, name2, "Same seed should produce same name");
    }

    #[test]
    fn generates_three_part_names() {
        let mut rng = RngBank::new(99).for_slot(StreamSlot::DemoHoldings);
        for _ in 0..50 {
            let name = company_name(&mut rng, "Wind");
            let parts: Vec<&str> = name.split_whitespace().collect();
            assert_eq!(parts.len(), 3, "Name should have exactly 3 parts: {name}");
            assert_eq!(parts[1], "Wind");
        }
    }
}
