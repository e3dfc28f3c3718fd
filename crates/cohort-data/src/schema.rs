//! Serde data file structs for scenario definitions.
//!
//! These structs define the on-disk format for initial simulation state:
//! regions, resources, people, producers, materials, batches, and stages.
//! They are deserialized from RON, JSON, or TOML files and then resolved
//! into a validated snapshot by the loader.

use serde::Deserialize;
use std::collections::BTreeMap;

/// A full scenario file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScenarioData {
    /// Simulation start time. Defaults to zero.
    #[serde(default)]
    pub start_time: f64,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub person_properties: Vec<PropertyData>,
    #[serde(default)]
    pub people: Vec<PersonData>,
    #[serde(default)]
    pub balances: Vec<BalanceData>,
    #[serde(default)]
    pub producers: Vec<String>,
    #[serde(default)]
    pub materials: Vec<String>,
    #[serde(default)]
    pub batch_properties: Vec<PropertyData>,
    #[serde(default)]
    pub batches: Vec<BatchData>,
    #[serde(default)]
    pub stages: Vec<StageData>,
}

/// A property definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct PropertyData {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueTypeData,
    #[serde(default)]
    pub default: Option<ValueData>,
    #[serde(default)]
    pub immutable: bool,
    #[serde(default)]
    pub track_time: bool,
}

/// The declared type of a property.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueTypeData {
    Bool,
    Int,
    Float,
    Text,
}

/// A literal property value. Untagged so data files write plain literals.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ValueData {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// A person and their initial property values, keyed by property name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PersonData {
    #[serde(default)]
    pub properties: BTreeMap<String, ValueData>,
}

/// An initial region balance.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceData {
    pub region: String,
    pub resource: String,
    pub amount: u64,
}

/// A material batch. Owned by a producer's inventory or by a named stage;
/// the loader declares whichever fields are present and snapshot validation
/// enforces that exactly one applies.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchData {
    pub material: String,
    pub amount: f64,
    #[serde(default)]
    pub producer: Option<String>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, ValueData>,
}

/// A stage owned by a producer.
#[derive(Debug, Clone, Deserialize)]
pub struct StageData {
    pub name: String,
    pub producer: String,
    #[serde(default)]
    pub offered: bool,
}
