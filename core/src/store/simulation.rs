//! Store methods for Monte Carlo simulation runs.

use crate::{
    error::{AnalyticsError, AnalyticsResult},
    simulation::MonteCarloSimulation,
};
use rusqlite::{params, OptionalExtension};

use super::{decode_payloads, timestamp_to_sql, AnalyticsStore};

impl AnalyticsStore {
    pub fn insert_simulation(&self, sim: &MonteCarloSimulation) -> AnalyticsResult<()> {
        self.conn.execute(
            "INSERT INTO monte_carlo_simulation
                (simulation_id, simulation_name, seed, partial, created_by, created_at, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                sim.simulation_id,
                sim.simulation_name,
                sim.seed as i64,
                sim.partial,
                sim.created_by,
                timestamp_to_sql(sim.created_at),
                serde_json::to_string(sim)?,
            ],
        )?;
        Ok(())
    }

    /// Most recent simulations, newest first.
    pub fn simulations(&self, limit: usize) -> AnalyticsResult<Vec<MonteCarloSimulation>> {
        let mut stmt = self.conn.prepare(
            "SELECT payload FROM monte_carlo_simulation
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?1",
        )?;
        let payloads = stmt
            .query_map(params![limit as i64], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        decode_payloads(payloads)
    }

    pub fn simulation(&self, simulation_id: &str) -> AnalyticsResult<MonteCarloSimulation> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM monte_carlo_simulation WHERE simulation_id = ?1",
                params![simulation_id],
                |row| row.get(0),
            )
            .optional()?;
        let payload = payload.ok_or_else(|| AnalyticsError::RunNotFound {
            id: simulation_id.to_string(),
        })?;
        Ok(serde_json::from_str(&payload)?)
    }
}
