//! Portfolio analytics for ESG and impact investing: peer benchmarks,
//! impact attribution, rebalancing suggestions, cross-metric correlation
//! and Monte Carlo projections over one shared metric snapshot.

pub mod aggregator;
pub mod analysis;
pub mod attribution;
pub mod benchmark;
pub mod cancel;
pub mod config;
pub mod correlation;
pub mod demo;
pub mod engine;
pub mod error;
pub mod optimization;
pub mod request;
pub mod rng;
pub mod simulation;
pub mod snapshot;
pub mod stats;
pub mod store;
pub mod types;
