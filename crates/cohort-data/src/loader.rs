//! Resolution pipeline: reads scenario files, resolves name references,
//! and builds a validated snapshot.
//!
//! Provides format detection (RON/JSON/TOML), deserialization helpers, and
//! the name-to-id resolution that turns a [`ScenarioData`] into a
//! [`SnapshotData`] plus name tables for addressing entities by name.
//!
//! RON scenarios should enable the `implicit_some` extension so optional
//! fields (property defaults, batch owners) read as plain literals.

use crate::schema::*;
use cohort_core::id::*;
use cohort_core::property::PropertyDefinition;
use cohort_core::snapshot::{SnapshotBuilder, SnapshotData, SnapshotError};
use cohort_core::time::Time;
use cohort_core::value::{PropertyValue, ValueKind};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during scenario loading.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// The file has an extension we don't support.
    #[error("unsupported format for file: {0}")]
    UnsupportedFormat(PathBuf),

    /// A deserialization error occurred.
    #[error("parse error: {0}")]
    Parse(String),

    /// Two entities of the same kind share a name.
    #[error("duplicate {kind} name '{name}'")]
    DuplicateName { kind: &'static str, name: String },

    /// A name reference could not be resolved.
    #[error("unresolved {kind} reference '{name}'")]
    UnresolvedRef { kind: &'static str, name: String },

    /// The scenario's start time is not a finite number.
    #[error("start time is not finite: {0}")]
    InvalidStartTime(f64),

    /// The resolved facts failed snapshot validation.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported scenario file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, ScenarioError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(ScenarioError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Deserialize a scenario from file content in the given format.
pub fn parse_scenario_str(content: &str, format: Format) -> Result<ScenarioData, ScenarioError> {
    match format {
        Format::Ron => ron::from_str(content).map_err(|e| ScenarioError::Parse(e.to_string())),
        Format::Json => {
            serde_json::from_str(content).map_err(|e| ScenarioError::Parse(e.to_string()))
        }
        Format::Toml => toml::from_str(content).map_err(|e| ScenarioError::Parse(e.to_string())),
    }
}

// ===========================================================================
// Resolution
// ===========================================================================

/// Name tables produced by resolution, mapping scenario names to the dense
/// ids used by the live store.
#[derive(Debug, Default)]
pub struct ScenarioNames {
    pub regions: HashMap<String, RegionId>,
    pub resources: HashMap<String, ResourceId>,
    pub person_properties: HashMap<String, PersonPropertyId>,
    pub producers: HashMap<String, MaterialsProducerId>,
    pub materials: HashMap<String, MaterialId>,
    pub batch_properties: HashMap<String, BatchPropertyId>,
    pub stages: HashMap<String, StageId>,
}

/// A resolved scenario: the validated snapshot plus its name tables.
#[derive(Debug)]
pub struct Scenario {
    pub snapshot: SnapshotData,
    pub names: ScenarioNames,
}

fn value_kind(t: ValueTypeData) -> ValueKind {
    match t {
        ValueTypeData::Bool => ValueKind::Bool,
        ValueTypeData::Int => ValueKind::Int,
        ValueTypeData::Float => ValueKind::Float,
        ValueTypeData::Text => ValueKind::Text,
    }
}

fn value(v: &ValueData) -> PropertyValue {
    match v {
        ValueData::Bool(b) => PropertyValue::Bool(*b),
        ValueData::Int(i) => PropertyValue::Int(*i),
        ValueData::Float(f) => PropertyValue::Float(*f),
        ValueData::Text(s) => PropertyValue::Text(s.clone()),
    }
}

fn definition(data: &PropertyData) -> PropertyDefinition {
    let mut def = PropertyDefinition::new(value_kind(data.value_type));
    if let Some(ref default) = data.default {
        def = def.with_default(value(default));
    }
    if data.immutable {
        def = def.immutable();
    }
    if data.track_time {
        def = def.track_time();
    }
    def
}

fn intern<I: Copy>(
    map: &mut HashMap<String, I>,
    name: &str,
    id: I,
    kind: &'static str,
) -> Result<(), ScenarioError> {
    if map.insert(name.to_string(), id).is_some() {
        return Err(ScenarioError::DuplicateName {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

fn resolve_name<'a, I>(
    map: &'a HashMap<String, I>,
    name: &str,
    kind: &'static str,
) -> Result<&'a I, ScenarioError> {
    map.get(name).ok_or_else(|| ScenarioError::UnresolvedRef {
        kind,
        name: name.to_string(),
    })
}

/// Resolve a scenario into a validated snapshot. Ids are assigned densely
/// in declaration order.
pub fn resolve(data: &ScenarioData) -> Result<Scenario, ScenarioError> {
    let start_time =
        Time::new(data.start_time).ok_or(ScenarioError::InvalidStartTime(data.start_time))?;
    let mut names = ScenarioNames::default();
    let mut builder = SnapshotBuilder::new(start_time);

    for (i, name) in data.regions.iter().enumerate() {
        let region = RegionId(i as u32);
        intern(&mut names.regions, name, region, "region")?;
        builder.add_region(region);
    }
    for (i, name) in data.resources.iter().enumerate() {
        let resource = ResourceId(i as u32);
        intern(&mut names.resources, name, resource, "resource")?;
        builder.define_resource(resource);
    }
    for (i, prop) in data.person_properties.iter().enumerate() {
        let property = PersonPropertyId(i as u32);
        intern(&mut names.person_properties, &prop.name, property, "person property")?;
        builder.define_person_property(property, definition(prop));
    }
    for (i, person) in data.people.iter().enumerate() {
        let person_id = PersonId(i as u32);
        builder.add_person(person_id);
        for (prop_name, v) in &person.properties {
            let &property =
                resolve_name(&names.person_properties, prop_name, "person property")?;
            builder.set_person_property(person_id, property, value(v));
        }
    }
    for balance in &data.balances {
        let &region = resolve_name(&names.regions, &balance.region, "region")?;
        let &resource = resolve_name(&names.resources, &balance.resource, "resource")?;
        builder.set_region_balance(region, resource, balance.amount);
    }

    for (i, name) in data.producers.iter().enumerate() {
        let producer = MaterialsProducerId(i as u32);
        intern(&mut names.producers, name, producer, "producer")?;
        builder.add_producer(producer);
    }
    for (i, name) in data.materials.iter().enumerate() {
        let material = MaterialId(i as u32);
        intern(&mut names.materials, name, material, "material")?;
        builder.define_material(material);
    }
    for (i, prop) in data.batch_properties.iter().enumerate() {
        let property = BatchPropertyId(i as u32);
        intern(&mut names.batch_properties, &prop.name, property, "batch property")?;
        builder.define_batch_property(property, definition(prop));
    }
    for (i, stage) in data.stages.iter().enumerate() {
        let stage_id = StageId(i as u64);
        intern(&mut names.stages, &stage.name, stage_id, "stage")?;
        let &producer = resolve_name(&names.producers, &stage.producer, "producer")?;
        builder.add_stage(stage_id);
        builder.declare_stage_producer(stage_id, producer);
        builder.set_stage_offered(stage_id, stage.offered);
    }
    for (i, batch) in data.batches.iter().enumerate() {
        let batch_id = BatchId(i as u64);
        let &material = resolve_name(&names.materials, &batch.material, "material")?;
        builder.add_batch(batch_id, material, batch.amount);
        if let Some(ref producer_name) = batch.producer {
            let &producer = resolve_name(&names.producers, producer_name, "producer")?;
            builder.declare_batch_in_inventory(batch_id, producer);
        }
        if let Some(ref stage_name) = batch.stage {
            let &stage = resolve_name(&names.stages, stage_name, "stage")?;
            builder.declare_batch_on_stage(batch_id, stage);
        }
        for (prop_name, v) in &batch.properties {
            let &property =
                resolve_name(&names.batch_properties, prop_name, "batch property")?;
            builder.set_batch_property(batch_id, property, value(v));
        }
    }

    let snapshot = builder.build()?;
    Ok(Scenario { snapshot, names })
}

/// Read, parse, and resolve a scenario file.
pub fn load_scenario(path: &Path) -> Result<Scenario, ScenarioError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    let data = parse_scenario_str(&content, format)?;
    resolve(&data)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_core::materials::BatchLocation;
    use std::fs;

    const RON_SCENARIO: &str = r#"#![enable(implicit_some)]
    (
        regions: ["north", "south"],
        resources: ["vaccine"],
        person_properties: [
            (name: "age", type: int, default: 0),
            (name: "vaccinated", type: bool, default: false, track_time: true),
        ],
        people: [
            (properties: {"age": 34}),
            (),
        ],
        balances: [
            (region: "north", resource: "vaccine", amount: 55),
        ],
        producers: ["plant"],
        materials: ["antigen"],
        batches: [
            (material: "antigen", amount: 2.5, producer: "plant"),
            (material: "antigen", amount: 1.0, stage: "shipment"),
        ],
        stages: [
            (name: "shipment", producer: "plant", offered: true),
        ],
    )"#;

    #[test]
    fn ron_scenario_resolves() {
        let data = parse_scenario_str(RON_SCENARIO, Format::Ron).unwrap();
        let scenario = resolve(&data).unwrap();
        let snapshot = &scenario.snapshot;

        assert_eq!(snapshot.people().count(), 2);
        let north = scenario.names.regions["north"];
        let vaccine = scenario.names.resources["vaccine"];
        assert_eq!(snapshot.region_balance(north, vaccine), 55);

        let age = scenario.names.person_properties["age"];
        assert_eq!(
            snapshot.person_property_value(PersonId(0), age),
            Some(&PropertyValue::Int(34))
        );
        // Person 1 never wrote "age": resolves to the default at rehydration.
        assert_eq!(snapshot.person_property_value(PersonId(1), age), None);

        let shipment = scenario.names.stages["shipment"];
        let plant = scenario.names.producers["plant"];
        assert!(snapshot.stage_offered(shipment));
        assert_eq!(snapshot.stage_producer(shipment), Some(plant));
        assert_eq!(
            snapshot.batch_location(BatchId(0)),
            Some(BatchLocation::Inventory(plant))
        );
        assert_eq!(
            snapshot.batch_location(BatchId(1)),
            Some(BatchLocation::Staged(shipment))
        );
    }

    #[test]
    fn resolved_scenario_rehydrates_live_managers() {
        let data = parse_scenario_str(RON_SCENARIO, Format::Ron).unwrap();
        let scenario = resolve(&data).unwrap();
        let restored = scenario.snapshot.restore();

        let age = scenario.names.person_properties["age"];
        assert_eq!(
            restored.people.get_property(PersonId(0), age).unwrap(),
            PropertyValue::Int(34)
        );
        assert_eq!(
            restored.people.get_property(PersonId(1), age).unwrap(),
            PropertyValue::Int(0)
        );
        let north = scenario.names.regions["north"];
        let vaccine = scenario.names.resources["vaccine"];
        assert_eq!(restored.resources.region_balance(north, vaccine).unwrap(), 55);
    }

    #[test]
    fn toml_scenario_parses() {
        let content = r#"
            regions = ["north"]
            resources = ["vaccine"]

            [[balances]]
            region = "north"
            resource = "vaccine"
            amount = 20
        "#;
        let data = parse_scenario_str(content, Format::Toml).unwrap();
        let scenario = resolve(&data).unwrap();
        let north = scenario.names.regions["north"];
        let vaccine = scenario.names.resources["vaccine"];
        assert_eq!(scenario.snapshot.region_balance(north, vaccine), 20);
    }

    #[test]
    fn json_scenario_parses() {
        let content = r#"{
            "regions": ["north"],
            "resources": ["vaccine"],
            "balances": [
                {"region": "north", "resource": "vaccine", "amount": 7}
            ]
        }"#;
        let data = parse_scenario_str(content, Format::Json).unwrap();
        let scenario = resolve(&data).unwrap();
        let north = scenario.names.regions["north"];
        let vaccine = scenario.names.resources["vaccine"];
        assert_eq!(scenario.snapshot.region_balance(north, vaccine), 7);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let data = parse_scenario_str(
            r#"(regions: ["north", "north"])"#,
            Format::Ron,
        )
        .unwrap();
        assert!(matches!(
            resolve(&data),
            Err(ScenarioError::DuplicateName { kind: "region", .. })
        ));
    }

    #[test]
    fn unresolved_references_are_rejected() {
        let data = parse_scenario_str(
            r#"(
                regions: ["north"],
                resources: ["vaccine"],
                balances: [(region: "atlantis", resource: "vaccine", amount: 1)],
            )"#,
            Format::Ron,
        )
        .unwrap();
        assert!(matches!(
            resolve(&data),
            Err(ScenarioError::UnresolvedRef { kind: "region", .. })
        ));
    }

    #[test]
    fn contradictory_batch_ownership_fails_validation() {
        let data = parse_scenario_str(
            r#"#![enable(implicit_some)]
            (
                producers: ["plant"],
                materials: ["antigen"],
                stages: [(name: "s", producer: "plant")],
                batches: [(material: "antigen", amount: 1.0, producer: "plant", stage: "s")],
            )"#,
            Format::Ron,
        )
        .unwrap();
        assert!(matches!(
            resolve(&data),
            Err(ScenarioError::Snapshot(SnapshotError::BatchInMultipleLocations(_)))
        ));
    }

    #[test]
    fn unowned_batch_fails_validation() {
        let data = parse_scenario_str(
            r#"(
                producers: ["plant"],
                materials: ["antigen"],
                batches: [(material: "antigen", amount: 1.0)],
            )"#,
            Format::Ron,
        )
        .unwrap();
        assert!(matches!(
            resolve(&data),
            Err(ScenarioError::Snapshot(SnapshotError::BatchNotOwned(_)))
        ));
    }

    #[test]
    fn non_finite_start_time_is_rejected() {
        let data = ScenarioData {
            start_time: f64::NAN,
            ..ScenarioData::default()
        };
        assert!(matches!(
            resolve(&data),
            Err(ScenarioError::InvalidStartTime(_))
        ));
    }

    #[test]
    fn load_scenario_detects_format_from_extension() {
        let dir = std::env::temp_dir().join(format!("cohort_data_test_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("scenario.json");
        fs::write(&path, r#"{"regions": ["north"]}"#).unwrap();

        let scenario = load_scenario(&path).unwrap();
        assert_eq!(scenario.snapshot.regions().count(), 1);

        assert!(matches!(
            load_scenario(&dir.join("scenario.yaml")),
            Err(ScenarioError::UnsupportedFormat(_))
        ));
        let _ = fs::remove_dir_all(&dir);
    }
}
