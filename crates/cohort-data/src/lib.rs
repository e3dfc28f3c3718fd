//! Scenario loading for the cohort state store.
//!
//! Deserializes scenario files (RON, JSON, or TOML) describing initial
//! simulation state by name, resolves the names into dense ids, and builds
//! a validated [`cohort_core::snapshot::SnapshotData`] ready to rehydrate
//! live managers.

pub mod loader;
pub mod schema;

pub use loader::{load_scenario, parse_scenario_str, resolve, Format, Scenario, ScenarioError};
