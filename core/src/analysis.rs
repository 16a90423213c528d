//! Analysis trait.
//!
//! RULE: Every engine implements Analysis.
//! An analysis sees one PortfolioSnapshot, performs no I/O, and returns
//! a fully formed, immutable result. Persistence and logging of the
//! result belong to the engine façade in engine.rs.

use crate::{error::AnalyticsResult, snapshot::PortfolioSnapshot};

/// The contract every engine must fulfill.
pub trait Analysis {
    type Output;

    /// Unique stable name for this analysis, used in logs.
    fn name(&self) -> &'static str;

    /// Reject bad parameters before any snapshot is built.
    fn validate(&self) -> AnalyticsResult<()> {
        Ok(())
    }

    fn run(&self, snapshot: &PortfolioSnapshot) -> AnalyticsResult<Self::Output>;
}
