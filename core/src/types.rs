//! Shared primitive types used across the analytics engine.

/// Row id of an investment in the store.
pub type InvestmentId = i64;

/// The canonical identifier of a persisted analytics run (UUID v4 text).
pub type RunId = String;

/// Version of the request/response contract in `request.rs`.
/// Bump on any breaking change to a serialized result shape.
pub const SCHEMA_VERSION: u32 = 1;
