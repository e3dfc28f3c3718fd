//! Validated, immutable snapshots of the full store state.
//!
//! A [`SnapshotBuilder`] accumulates declarative facts in any order,
//! including transiently contradictory ownership declarations. `build()`
//! runs a fixed validation pipeline in dependency order (ids, definitions,
//! values, ownership, counters) and returns an immutable [`SnapshotData`].
//!
//! The builder is copy-on-write: `build()` hands out a structurally shared
//! handle, and the first mutation afterwards clones the accumulated data,
//! so previously returned snapshots stay frozen.

use crate::attributes::AttributesManager;
use crate::id::*;
use crate::ledger::ResourceLedger;
use crate::materials::{BatchLocation, MaterialsManager};
use crate::people::PeopleManager;
use crate::property::{PropertyDefinition, PropertyStore};
use crate::resources::ResourceManager;
use crate::time::Time;
use crate::value::{PropertyValue, ValueKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Snapshot format version, exposed on every snapshot.
pub const SNAPSHOT_VERSION: &str = "1";

/// Whether a persisted snapshot version can be read by this build.
pub fn supported(version: &str) -> bool {
    version == SNAPSHOT_VERSION
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Validation failures raised by [`SnapshotBuilder::build`].
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("unknown person id: {0:?}")]
    UnknownPersonId(PersonId),
    #[error("unknown region id: {0:?}")]
    UnknownRegionId(RegionId),
    #[error("unknown resource id: {0:?}")]
    UnknownResourceId(ResourceId),
    #[error("unknown materials producer id: {0:?}")]
    UnknownMaterialsProducerId(MaterialsProducerId),
    #[error("unknown material id: {0:?}")]
    UnknownMaterialId(MaterialId),
    #[error("unknown batch id: {0:?}")]
    UnknownBatchId(BatchId),
    #[error("unknown stage id: {0:?}")]
    UnknownStageId(StageId),
    #[error("unknown person property id: {0:?}")]
    UnknownPersonPropertyId(PersonPropertyId),
    #[error("unknown batch property id: {0:?}")]
    UnknownBatchPropertyId(BatchPropertyId),
    #[error("unknown attribute id: {0:?}")]
    UnknownAttributeId(AttributeId),
    #[error("incompatible value: definition expects {expected:?}, got {actual:?}")]
    IncompatibleValue {
        expected: ValueKind,
        actual: ValueKind,
    },
    #[error("definition has no default and a subject was left without a value")]
    InsufficientPropertyValueAssignment,
    #[error("batch amount must be finite and non-negative: {0}")]
    InvalidBatchAmount(f64),
    #[error("batch {0:?} is declared in more than one location")]
    BatchInMultipleLocations(BatchId),
    #[error("batch {0:?} is not declared in any location")]
    BatchNotOwned(BatchId),
    #[error("stage {0:?} is assigned to more than one producer")]
    DuplicateStageAssignment(StageId),
    #[error("stage {0:?} has no owning producer")]
    StageWithoutMaterialsProducer(StageId),
    #[error("next {kind} id {next} does not exceed the declared maximum {max}")]
    NextIdTooSmall {
        kind: &'static str,
        next: u64,
        max: u64,
    },
    #[error("{kind} id space is exhausted")]
    IdSpaceExhausted { kind: &'static str },
    #[error("assignment time {time} exceeds the snapshot start time {start}")]
    AssignmentTimeExceedsSimulationStart { time: Time, start: Time },
}

// ---------------------------------------------------------------------------
// Accumulated facts
// ---------------------------------------------------------------------------

/// Material kind and amount of a declared batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct BatchFacts {
    material: MaterialId,
    amount: f64,
}

/// The flat fact maps a snapshot is made of. Ownership lives in declaration
/// lists rather than resolved maps so the builder can hold contradictory
/// facts until `build()` re-derives and checks the invariants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct SnapshotInner {
    start_time: Time,

    // -- Population --
    people: BTreeSet<PersonId>,
    person_property_definitions: BTreeMap<PersonPropertyId, PropertyDefinition>,
    person_property_values: BTreeMap<PersonId, BTreeMap<PersonPropertyId, PropertyValue>>,
    person_property_times: BTreeMap<PersonId, BTreeMap<PersonPropertyId, Time>>,

    // -- Attributes --
    attribute_definitions: BTreeMap<AttributeId, PropertyDefinition>,
    attribute_values: BTreeMap<AttributeId, PropertyValue>,
    attribute_times: BTreeMap<AttributeId, Time>,

    // -- Resources --
    regions: BTreeSet<RegionId>,
    resources: BTreeSet<ResourceId>,
    region_balances: BTreeMap<RegionId, BTreeMap<ResourceId, u64>>,
    person_balances: BTreeMap<PersonId, BTreeMap<ResourceId, u64>>,
    producer_balances: BTreeMap<MaterialsProducerId, BTreeMap<ResourceId, u64>>,

    // -- Materials --
    producers: BTreeSet<MaterialsProducerId>,
    materials: BTreeSet<MaterialId>,
    batch_property_definitions: BTreeMap<BatchPropertyId, PropertyDefinition>,
    batches: BTreeMap<BatchId, BatchFacts>,
    batch_property_values: BTreeMap<BatchId, BTreeMap<BatchPropertyId, PropertyValue>>,
    batch_property_times: BTreeMap<BatchId, BTreeMap<BatchPropertyId, Time>>,
    stages: BTreeSet<StageId>,
    stage_offers: BTreeMap<StageId, bool>,
    batch_inventory_decls: Vec<(BatchId, MaterialsProducerId)>,
    batch_stage_decls: Vec<(BatchId, StageId)>,
    stage_producer_decls: Vec<(StageId, MaterialsProducerId)>,

    // -- Next-id counters; computed at build() when unset --
    next_person: Option<u32>,
    next_person_property: Option<u32>,
    next_attribute: Option<u32>,
    next_region: Option<u32>,
    next_resource: Option<u32>,
    next_producer: Option<u32>,
    next_material: Option<u32>,
    next_batch: Option<u64>,
    next_stage: Option<u64>,
    next_batch_property: Option<u32>,
}

impl SnapshotInner {
    fn empty(start_time: Time) -> Self {
        Self {
            start_time,
            people: BTreeSet::new(),
            person_property_definitions: BTreeMap::new(),
            person_property_values: BTreeMap::new(),
            person_property_times: BTreeMap::new(),
            attribute_definitions: BTreeMap::new(),
            attribute_values: BTreeMap::new(),
            attribute_times: BTreeMap::new(),
            regions: BTreeSet::new(),
            resources: BTreeSet::new(),
            region_balances: BTreeMap::new(),
            person_balances: BTreeMap::new(),
            producer_balances: BTreeMap::new(),
            producers: BTreeSet::new(),
            materials: BTreeSet::new(),
            batch_property_definitions: BTreeMap::new(),
            batches: BTreeMap::new(),
            batch_property_values: BTreeMap::new(),
            batch_property_times: BTreeMap::new(),
            stages: BTreeSet::new(),
            stage_offers: BTreeMap::new(),
            batch_inventory_decls: Vec::new(),
            batch_stage_decls: Vec::new(),
            stage_producer_decls: Vec::new(),
            next_person: None,
            next_person_property: None,
            next_attribute: None,
            next_region: None,
            next_resource: None,
            next_producer: None,
            next_material: None,
            next_batch: None,
            next_stage: None,
            next_batch_property: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Accumulates snapshot facts and validates them into a [`SnapshotData`].
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    inner: Arc<SnapshotInner>,
}

impl SnapshotBuilder {
    pub fn new(start_time: Time) -> Self {
        Self {
            inner: Arc::new(SnapshotInner::empty(start_time)),
        }
    }

    /// Clones the shared data on the first write after a `build()`.
    fn inner_mut(&mut self) -> &mut SnapshotInner {
        Arc::make_mut(&mut self.inner)
    }

    // -- Population facts --

    pub fn add_person(&mut self, person: PersonId) -> &mut Self {
        self.inner_mut().people.insert(person);
        self
    }

    pub fn define_person_property(
        &mut self,
        property: PersonPropertyId,
        definition: PropertyDefinition,
    ) -> &mut Self {
        self.inner_mut()
            .person_property_definitions
            .insert(property, definition);
        self
    }

    pub fn set_person_property(
        &mut self,
        person: PersonId,
        property: PersonPropertyId,
        value: PropertyValue,
    ) -> &mut Self {
        self.inner_mut()
            .person_property_values
            .entry(person)
            .or_default()
            .insert(property, value);
        self
    }

    pub fn set_person_property_time(
        &mut self,
        person: PersonId,
        property: PersonPropertyId,
        time: Time,
    ) -> &mut Self {
        self.inner_mut()
            .person_property_times
            .entry(person)
            .or_default()
            .insert(property, time);
        self
    }

    // -- Attribute facts --

    pub fn define_attribute(
        &mut self,
        attribute: AttributeId,
        definition: PropertyDefinition,
    ) -> &mut Self {
        self.inner_mut()
            .attribute_definitions
            .insert(attribute, definition);
        self
    }

    pub fn set_attribute(&mut self, attribute: AttributeId, value: PropertyValue) -> &mut Self {
        self.inner_mut().attribute_values.insert(attribute, value);
        self
    }

    pub fn set_attribute_time(&mut self, attribute: AttributeId, time: Time) -> &mut Self {
        self.inner_mut().attribute_times.insert(attribute, time);
        self
    }

    // -- Resource facts --

    pub fn add_region(&mut self, region: RegionId) -> &mut Self {
        self.inner_mut().regions.insert(region);
        self
    }

    pub fn define_resource(&mut self, resource: ResourceId) -> &mut Self {
        self.inner_mut().resources.insert(resource);
        self
    }

    pub fn set_region_balance(
        &mut self,
        region: RegionId,
        resource: ResourceId,
        amount: u64,
    ) -> &mut Self {
        self.inner_mut()
            .region_balances
            .entry(region)
            .or_default()
            .insert(resource, amount);
        self
    }

    pub fn set_person_balance(
        &mut self,
        person: PersonId,
        resource: ResourceId,
        amount: u64,
    ) -> &mut Self {
        self.inner_mut()
            .person_balances
            .entry(person)
            .or_default()
            .insert(resource, amount);
        self
    }

    pub fn set_producer_balance(
        &mut self,
        producer: MaterialsProducerId,
        resource: ResourceId,
        amount: u64,
    ) -> &mut Self {
        self.inner_mut()
            .producer_balances
            .entry(producer)
            .or_default()
            .insert(resource, amount);
        self
    }

    // -- Materials facts --

    pub fn add_producer(&mut self, producer: MaterialsProducerId) -> &mut Self {
        self.inner_mut().producers.insert(producer);
        self
    }

    pub fn define_material(&mut self, material: MaterialId) -> &mut Self {
        self.inner_mut().materials.insert(material);
        self
    }

    pub fn define_batch_property(
        &mut self,
        property: BatchPropertyId,
        definition: PropertyDefinition,
    ) -> &mut Self {
        self.inner_mut()
            .batch_property_definitions
            .insert(property, definition);
        self
    }

    pub fn add_batch(&mut self, batch: BatchId, material: MaterialId, amount: f64) -> &mut Self {
        self.inner_mut()
            .batches
            .insert(batch, BatchFacts { material, amount });
        self
    }

    pub fn set_batch_property(
        &mut self,
        batch: BatchId,
        property: BatchPropertyId,
        value: PropertyValue,
    ) -> &mut Self {
        self.inner_mut()
            .batch_property_values
            .entry(batch)
            .or_default()
            .insert(property, value);
        self
    }

    pub fn set_batch_property_time(
        &mut self,
        batch: BatchId,
        property: BatchPropertyId,
        time: Time,
    ) -> &mut Self {
        self.inner_mut()
            .batch_property_times
            .entry(batch)
            .or_default()
            .insert(property, time);
        self
    }

    pub fn add_stage(&mut self, stage: StageId) -> &mut Self {
        self.inner_mut().stages.insert(stage);
        self
    }

    pub fn set_stage_offered(&mut self, stage: StageId, offered: bool) -> &mut Self {
        self.inner_mut().stage_offers.insert(stage, offered);
        self
    }

    /// Declare a batch in a producer's inventory. Declarations accumulate;
    /// exclusivity is checked at `build()`.
    pub fn declare_batch_in_inventory(
        &mut self,
        batch: BatchId,
        producer: MaterialsProducerId,
    ) -> &mut Self {
        self.inner_mut().batch_inventory_decls.push((batch, producer));
        self
    }

    /// Declare a batch on a stage. Declarations accumulate; exclusivity is
    /// checked at `build()`.
    pub fn declare_batch_on_stage(&mut self, batch: BatchId, stage: StageId) -> &mut Self {
        self.inner_mut().batch_stage_decls.push((batch, stage));
        self
    }

    /// Declare a stage's owning producer.
    pub fn declare_stage_producer(
        &mut self,
        stage: StageId,
        producer: MaterialsProducerId,
    ) -> &mut Self {
        self.inner_mut().stage_producer_decls.push((stage, producer));
        self
    }

    // -- Next-id counters --

    pub fn set_next_person_id(&mut self, next: u32) -> &mut Self {
        self.inner_mut().next_person = Some(next);
        self
    }

    pub fn set_next_batch_id(&mut self, next: u64) -> &mut Self {
        self.inner_mut().next_batch = Some(next);
        self
    }

    pub fn set_next_stage_id(&mut self, next: u64) -> &mut Self {
        self.inner_mut().next_stage = Some(next);
        self
    }

    /// Validate the accumulated facts and freeze them into a snapshot.
    ///
    /// The pipeline runs in dependency order: referenced ids, value/definition
    /// compatibility, defaultless coverage, ownership exclusivity, assignment
    /// times, next-id counters. The first violation aborts the build; the
    /// builder itself is left intact either way.
    pub fn build(&mut self) -> Result<SnapshotData, SnapshotError> {
        self.validate_ids()?;
        self.validate_values()?;
        self.validate_coverage()?;
        self.validate_ownership()?;
        self.validate_times()?;
        let counters = self.resolve_counters()?;

        // Share structurally when every counter is already materialized;
        // otherwise the snapshot gets its own copy with resolved counters,
        // leaving the builder free to accumulate further facts.
        if self.counters_resolved(&counters) {
            return Ok(SnapshotData {
                inner: Arc::clone(&self.inner),
            });
        }
        let mut inner = (*self.inner).clone();
        inner.next_person = Some(counters.person);
        inner.next_person_property = Some(counters.person_property);
        inner.next_attribute = Some(counters.attribute);
        inner.next_region = Some(counters.region);
        inner.next_resource = Some(counters.resource);
        inner.next_producer = Some(counters.producer);
        inner.next_material = Some(counters.material);
        inner.next_batch = Some(counters.batch);
        inner.next_stage = Some(counters.stage);
        inner.next_batch_property = Some(counters.batch_property);
        Ok(SnapshotData {
            inner: Arc::new(inner),
        })
    }

    fn counters_resolved(&self, counters: &ResolvedCounters) -> bool {
        let inner = &*self.inner;
        inner.next_person == Some(counters.person)
            && inner.next_person_property == Some(counters.person_property)
            && inner.next_attribute == Some(counters.attribute)
            && inner.next_region == Some(counters.region)
            && inner.next_resource == Some(counters.resource)
            && inner.next_producer == Some(counters.producer)
            && inner.next_material == Some(counters.material)
            && inner.next_batch == Some(counters.batch)
            && inner.next_stage == Some(counters.stage)
            && inner.next_batch_property == Some(counters.batch_property)
    }

    // -----------------------------------------------------------------------
    // Validation pipeline
    // -----------------------------------------------------------------------

    fn validate_ids(&self) -> Result<(), SnapshotError> {
        let inner = &*self.inner;

        for (&person, values) in &inner.person_property_values {
            if !inner.people.contains(&person) {
                return Err(SnapshotError::UnknownPersonId(person));
            }
            for &property in values.keys() {
                if !inner.person_property_definitions.contains_key(&property) {
                    return Err(SnapshotError::UnknownPersonPropertyId(property));
                }
            }
        }
        for (&person, times) in &inner.person_property_times {
            if !inner.people.contains(&person) {
                return Err(SnapshotError::UnknownPersonId(person));
            }
            for &property in times.keys() {
                if !inner.person_property_definitions.contains_key(&property) {
                    return Err(SnapshotError::UnknownPersonPropertyId(property));
                }
            }
        }
        for &attribute in inner.attribute_values.keys().chain(inner.attribute_times.keys()) {
            if !inner.attribute_definitions.contains_key(&attribute) {
                return Err(SnapshotError::UnknownAttributeId(attribute));
            }
        }

        for (&region, balances) in &inner.region_balances {
            if !inner.regions.contains(&region) {
                return Err(SnapshotError::UnknownRegionId(region));
            }
            for &resource in balances.keys() {
                if !inner.resources.contains(&resource) {
                    return Err(SnapshotError::UnknownResourceId(resource));
                }
            }
        }
        for (&person, balances) in &inner.person_balances {
            if !inner.people.contains(&person) {
                return Err(SnapshotError::UnknownPersonId(person));
            }
            for &resource in balances.keys() {
                if !inner.resources.contains(&resource) {
                    return Err(SnapshotError::UnknownResourceId(resource));
                }
            }
        }
        for (&producer, balances) in &inner.producer_balances {
            if !inner.producers.contains(&producer) {
                return Err(SnapshotError::UnknownMaterialsProducerId(producer));
            }
            for &resource in balances.keys() {
                if !inner.resources.contains(&resource) {
                    return Err(SnapshotError::UnknownResourceId(resource));
                }
            }
        }

        for facts in inner.batches.values() {
            if !inner.materials.contains(&facts.material) {
                return Err(SnapshotError::UnknownMaterialId(facts.material));
            }
        }
        for (&batch, values) in &inner.batch_property_values {
            if !inner.batches.contains_key(&batch) {
                return Err(SnapshotError::UnknownBatchId(batch));
            }
            for &property in values.keys() {
                if !inner.batch_property_definitions.contains_key(&property) {
                    return Err(SnapshotError::UnknownBatchPropertyId(property));
                }
            }
        }
        for (&batch, times) in &inner.batch_property_times {
            if !inner.batches.contains_key(&batch) {
                return Err(SnapshotError::UnknownBatchId(batch));
            }
            for &property in times.keys() {
                if !inner.batch_property_definitions.contains_key(&property) {
                    return Err(SnapshotError::UnknownBatchPropertyId(property));
                }
            }
        }
        for &stage in inner.stage_offers.keys() {
            if !inner.stages.contains(&stage) {
                return Err(SnapshotError::UnknownStageId(stage));
            }
        }
        for &(batch, producer) in &inner.batch_inventory_decls {
            if !inner.batches.contains_key(&batch) {
                return Err(SnapshotError::UnknownBatchId(batch));
            }
            if !inner.producers.contains(&producer) {
                return Err(SnapshotError::UnknownMaterialsProducerId(producer));
            }
        }
        for &(batch, stage) in &inner.batch_stage_decls {
            if !inner.batches.contains_key(&batch) {
                return Err(SnapshotError::UnknownBatchId(batch));
            }
            if !inner.stages.contains(&stage) {
                return Err(SnapshotError::UnknownStageId(stage));
            }
        }
        for &(stage, producer) in &inner.stage_producer_decls {
            if !inner.stages.contains(&stage) {
                return Err(SnapshotError::UnknownStageId(stage));
            }
            if !inner.producers.contains(&producer) {
                return Err(SnapshotError::UnknownMaterialsProducerId(producer));
            }
        }
        Ok(())
    }

    fn validate_values(&self) -> Result<(), SnapshotError> {
        let inner = &*self.inner;

        for values in inner.person_property_values.values() {
            for (property, value) in values {
                let definition = &inner.person_property_definitions[property];
                if !value.is_kind(definition.kind) {
                    return Err(SnapshotError::IncompatibleValue {
                        expected: definition.kind,
                        actual: value.kind(),
                    });
                }
            }
        }
        for (attribute, value) in &inner.attribute_values {
            let definition = &inner.attribute_definitions[attribute];
            if !value.is_kind(definition.kind) {
                return Err(SnapshotError::IncompatibleValue {
                    expected: definition.kind,
                    actual: value.kind(),
                });
            }
        }
        for values in inner.batch_property_values.values() {
            for (property, value) in values {
                let definition = &inner.batch_property_definitions[property];
                if !value.is_kind(definition.kind) {
                    return Err(SnapshotError::IncompatibleValue {
                        expected: definition.kind,
                        actual: value.kind(),
                    });
                }
            }
        }
        for facts in inner.batches.values() {
            if !facts.amount.is_finite() || facts.amount < 0.0 {
                return Err(SnapshotError::InvalidBatchAmount(facts.amount));
            }
        }
        Ok(())
    }

    fn validate_coverage(&self) -> Result<(), SnapshotError> {
        let inner = &*self.inner;

        for (property, definition) in &inner.person_property_definitions {
            if definition.default.is_some() {
                continue;
            }
            for &person in &inner.people {
                let covered = inner
                    .person_property_values
                    .get(&person)
                    .is_some_and(|v| v.contains_key(property));
                if !covered {
                    return Err(SnapshotError::InsufficientPropertyValueAssignment);
                }
            }
        }
        for (attribute, definition) in &inner.attribute_definitions {
            if definition.default.is_none() && !inner.attribute_values.contains_key(attribute) {
                return Err(SnapshotError::InsufficientPropertyValueAssignment);
            }
        }
        for (property, definition) in &inner.batch_property_definitions {
            if definition.default.is_some() {
                continue;
            }
            for &batch in inner.batches.keys() {
                let covered = inner
                    .batch_property_values
                    .get(&batch)
                    .is_some_and(|v| v.contains_key(property));
                if !covered {
                    return Err(SnapshotError::InsufficientPropertyValueAssignment);
                }
            }
        }
        Ok(())
    }

    fn validate_ownership(&self) -> Result<(), SnapshotError> {
        let inner = &*self.inner;

        for &batch in inner.batches.keys() {
            let inventory = inner
                .batch_inventory_decls
                .iter()
                .filter(|&&(b, _)| b == batch)
                .count();
            let staged = inner
                .batch_stage_decls
                .iter()
                .filter(|&&(b, _)| b == batch)
                .count();
            match inventory + staged {
                0 => return Err(SnapshotError::BatchNotOwned(batch)),
                1 => {}
                _ => return Err(SnapshotError::BatchInMultipleLocations(batch)),
            }
        }
        for &stage in &inner.stages {
            let owners = inner
                .stage_producer_decls
                .iter()
                .filter(|&&(s, _)| s == stage)
                .count();
            match owners {
                0 => return Err(SnapshotError::StageWithoutMaterialsProducer(stage)),
                1 => {}
                _ => return Err(SnapshotError::DuplicateStageAssignment(stage)),
            }
        }
        Ok(())
    }

    fn validate_times(&self) -> Result<(), SnapshotError> {
        let inner = &*self.inner;
        let start = inner.start_time;
        let times = inner
            .person_property_times
            .values()
            .flat_map(|m| m.values())
            .chain(inner.attribute_times.values())
            .chain(inner.batch_property_times.values().flat_map(|m| m.values()));
        for &time in times {
            if time > start {
                return Err(SnapshotError::AssignmentTimeExceedsSimulationStart { time, start });
            }
        }
        Ok(())
    }

    fn resolve_counters(&self) -> Result<ResolvedCounters, SnapshotError> {
        let inner = &*self.inner;
        Ok(ResolvedCounters {
            person: resolve_u32("person", inner.people.iter().map(|p| p.0), inner.next_person)?,
            person_property: resolve_u32(
                "person property",
                inner.person_property_definitions.keys().map(|p| p.0),
                inner.next_person_property,
            )?,
            attribute: resolve_u32(
                "attribute",
                inner.attribute_definitions.keys().map(|a| a.0),
                inner.next_attribute,
            )?,
            region: resolve_u32("region", inner.regions.iter().map(|r| r.0), inner.next_region)?,
            resource: resolve_u32(
                "resource",
                inner.resources.iter().map(|r| r.0),
                inner.next_resource,
            )?,
            producer: resolve_u32(
                "materials producer",
                inner.producers.iter().map(|p| p.0),
                inner.next_producer,
            )?,
            material: resolve_u32(
                "material",
                inner.materials.iter().map(|m| m.0),
                inner.next_material,
            )?,
            batch: resolve_u64("batch", inner.batches.keys().map(|b| b.0), inner.next_batch)?,
            stage: resolve_u64("stage", inner.stages.iter().map(|s| s.0), inner.next_stage)?,
            batch_property: resolve_u32(
                "batch property",
                inner.batch_property_definitions.keys().map(|p| p.0),
                inner.next_batch_property,
            )?,
        })
    }

    pub(crate) fn from_inner(inner: SnapshotInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }
}

struct ResolvedCounters {
    person: u32,
    person_property: u32,
    attribute: u32,
    region: u32,
    resource: u32,
    producer: u32,
    material: u32,
    batch: u64,
    stage: u64,
    batch_property: u32,
}

fn resolve_u32(
    kind: &'static str,
    declared: impl Iterator<Item = u32>,
    set: Option<u32>,
) -> Result<u32, SnapshotError> {
    let max = declared.max();
    match (set, max) {
        (Some(next), Some(max)) if next <= max => Err(SnapshotError::NextIdTooSmall {
            kind,
            next: next as u64,
            max: max as u64,
        }),
        (Some(next), _) => Ok(next),
        (None, Some(max)) => max
            .checked_add(1)
            .ok_or(SnapshotError::IdSpaceExhausted { kind }),
        (None, None) => Ok(0),
    }
}

fn resolve_u64(
    kind: &'static str,
    declared: impl Iterator<Item = u64>,
    set: Option<u64>,
) -> Result<u64, SnapshotError> {
    let max = declared.max();
    match (set, max) {
        (Some(next), Some(max)) if next <= max => {
            Err(SnapshotError::NextIdTooSmall { kind, next, max })
        }
        (Some(next), _) => Ok(next),
        (None, Some(max)) => max
            .checked_add(1)
            .ok_or(SnapshotError::IdSpaceExhausted { kind }),
        (None, None) => Ok(0),
    }
}

// ---------------------------------------------------------------------------
// Snapshot data
// ---------------------------------------------------------------------------

/// An immutable, validated snapshot. Cheap to clone; shares its data with
/// the builder that produced it until the builder is written to again.
#[derive(Debug, Clone)]
pub struct SnapshotData {
    inner: Arc<SnapshotInner>,
}

impl PartialEq for SnapshotData {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl SnapshotData {
    /// Open a builder sharing this snapshot's data structurally. The first
    /// mutation clones; this snapshot is never affected.
    pub fn to_builder(&self) -> SnapshotBuilder {
        SnapshotBuilder {
            inner: Arc::clone(&self.inner),
        }
    }

    /// The snapshot format version.
    pub fn version(&self) -> &'static str {
        SNAPSHOT_VERSION
    }

    pub fn start_time(&self) -> Time {
        self.inner.start_time
    }

    // -- Population --

    pub fn people(&self) -> impl Iterator<Item = PersonId> + '_ {
        self.inner.people.iter().copied()
    }

    pub fn contains_person(&self, person: PersonId) -> bool {
        self.inner.people.contains(&person)
    }

    pub fn person_property_definitions(
        &self,
    ) -> impl Iterator<Item = (PersonPropertyId, &PropertyDefinition)> {
        self.inner
            .person_property_definitions
            .iter()
            .map(|(&k, d)| (k, d))
    }

    /// Explicitly written value, if any. Unwritten properties resolve to the
    /// definition default at rehydration, same as in the live store.
    pub fn person_property_value(
        &self,
        person: PersonId,
        property: PersonPropertyId,
    ) -> Option<&PropertyValue> {
        self.inner.person_property_values.get(&person)?.get(&property)
    }

    // -- Attributes --

    pub fn attribute_definitions(&self) -> impl Iterator<Item = (AttributeId, &PropertyDefinition)> {
        self.inner.attribute_definitions.iter().map(|(&k, d)| (k, d))
    }

    pub fn attribute_value(&self, attribute: AttributeId) -> Option<&PropertyValue> {
        self.inner.attribute_values.get(&attribute)
    }

    // -- Resources --

    pub fn regions(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.inner.regions.iter().copied()
    }

    pub fn resources(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.inner.resources.iter().copied()
    }

    pub fn region_balance(&self, region: RegionId, resource: ResourceId) -> u64 {
        self.inner
            .region_balances
            .get(&region)
            .and_then(|b| b.get(&resource))
            .copied()
            .unwrap_or(0)
    }

    pub fn person_balance(&self, person: PersonId, resource: ResourceId) -> u64 {
        self.inner
            .person_balances
            .get(&person)
            .and_then(|b| b.get(&resource))
            .copied()
            .unwrap_or(0)
    }

    pub fn producer_balance(&self, producer: MaterialsProducerId, resource: ResourceId) -> u64 {
        self.inner
            .producer_balances
            .get(&producer)
            .and_then(|b| b.get(&resource))
            .copied()
            .unwrap_or(0)
    }

    // -- Materials --

    pub fn producers(&self) -> impl Iterator<Item = MaterialsProducerId> + '_ {
        self.inner.producers.iter().copied()
    }

    pub fn materials(&self) -> impl Iterator<Item = MaterialId> + '_ {
        self.inner.materials.iter().copied()
    }

    pub fn batches(&self) -> impl Iterator<Item = BatchId> + '_ {
        self.inner.batches.keys().copied()
    }

    pub fn batch_material(&self, batch: BatchId) -> Option<MaterialId> {
        self.inner.batches.get(&batch).map(|f| f.material)
    }

    pub fn batch_amount(&self, batch: BatchId) -> Option<f64> {
        self.inner.batches.get(&batch).map(|f| f.amount)
    }

    /// Resolved location of a batch. Always present in a validated snapshot.
    pub fn batch_location(&self, batch: BatchId) -> Option<BatchLocation> {
        if let Some(&(_, stage)) = self
            .inner
            .batch_stage_decls
            .iter()
            .find(|&&(b, _)| b == batch)
        {
            return Some(BatchLocation::Staged(stage));
        }
        self.inner
            .batch_inventory_decls
            .iter()
            .find(|&&(b, _)| b == batch)
            .map(|&(_, producer)| BatchLocation::Inventory(producer))
    }

    pub fn stages(&self) -> impl Iterator<Item = StageId> + '_ {
        self.inner.stages.iter().copied()
    }

    pub fn stage_offered(&self, stage: StageId) -> bool {
        self.inner.stage_offers.get(&stage).copied().unwrap_or(false)
    }

    /// Resolved owner of a stage. Always present in a validated snapshot.
    pub fn stage_producer(&self, stage: StageId) -> Option<MaterialsProducerId> {
        self.inner
            .stage_producer_decls
            .iter()
            .find(|&&(s, _)| s == stage)
            .map(|&(_, producer)| producer)
    }

    // -- Counters (always resolved after build) --

    pub fn next_person_id(&self) -> u32 {
        self.inner.next_person.unwrap_or(0)
    }

    pub fn next_batch_id(&self) -> u64 {
        self.inner.next_batch.unwrap_or(0)
    }

    pub fn next_stage_id(&self) -> u64 {
        self.inner.next_stage.unwrap_or(0)
    }

    /// Rebuild live managers from this snapshot. Re-snapshotting the result
    /// at the same time reproduces an equal snapshot.
    pub fn restore(&self) -> RestoredState {
        let inner = &*self.inner;
        let start = inner.start_time;

        // People.
        let mut person_props: PropertyStore<PersonPropertyId, PersonId> = PropertyStore::new(start);
        for (&property, definition) in &inner.person_property_definitions {
            person_props.restore_definition(property, definition.clone());
        }
        for (&person, values) in &inner.person_property_values {
            for (&property, value) in values {
                person_props.restore_value(person, property, value.clone());
            }
        }
        for (&person, times) in &inner.person_property_times {
            for (&property, &time) in times {
                person_props.restore_time(person, property, time);
            }
        }
        let people = PeopleManager::restore(
            inner.people.clone(),
            person_props,
            inner.next_person.unwrap_or(0),
            inner.next_person_property.unwrap_or(0),
        );

        // Attributes.
        let mut attribute_store: PropertyStore<AttributeId, ()> = PropertyStore::new(start);
        for (&attribute, definition) in &inner.attribute_definitions {
            attribute_store.restore_definition(attribute, definition.clone());
        }
        for (&attribute, value) in &inner.attribute_values {
            attribute_store.restore_value((), attribute, value.clone());
        }
        for (&attribute, &time) in &inner.attribute_times {
            attribute_store.restore_time((), attribute, time);
        }
        let attributes =
            AttributesManager::restore(attribute_store, inner.next_attribute.unwrap_or(0));

        // Resources.
        let mut region_ledger = ResourceLedger::new();
        for (&region, balances) in &inner.region_balances {
            for (&resource, &amount) in balances {
                region_ledger.restore_balance(region, resource, amount);
            }
        }
        let mut person_ledger = ResourceLedger::new();
        for (&person, balances) in &inner.person_balances {
            for (&resource, &amount) in balances {
                person_ledger.restore_balance(person, resource, amount);
            }
        }
        let mut producer_ledger = ResourceLedger::new();
        for (&producer, balances) in &inner.producer_balances {
            for (&resource, &amount) in balances {
                producer_ledger.restore_balance(producer, resource, amount);
            }
        }
        let resources = ResourceManager::restore(
            inner.regions.clone(),
            inner.resources.clone(),
            region_ledger,
            person_ledger,
            producer_ledger,
            inner.next_region.unwrap_or(0),
            inner.next_resource.unwrap_or(0),
        );

        // Materials.
        let mut batch_props: PropertyStore<BatchPropertyId, BatchId> = PropertyStore::new(start);
        for (&property, definition) in &inner.batch_property_definitions {
            batch_props.restore_definition(property, definition.clone());
        }
        for (&batch, values) in &inner.batch_property_values {
            for (&property, value) in values {
                batch_props.restore_value(batch, property, value.clone());
            }
        }
        for (&batch, times) in &inner.batch_property_times {
            for (&property, &time) in times {
                batch_props.restore_time(batch, property, time);
            }
        }
        let batches: Vec<(BatchId, MaterialId, f64, BatchLocation)> = inner
            .batches
            .iter()
            .filter_map(|(&batch, facts)| {
                self.batch_location(batch)
                    .map(|location| (batch, facts.material, facts.amount, location))
            })
            .collect();
        let stages: Vec<(StageId, MaterialsProducerId, bool)> = inner
            .stages
            .iter()
            .filter_map(|&stage| {
                self.stage_producer(stage)
                    .map(|producer| (stage, producer, self.stage_offered(stage)))
            })
            .collect();
        let materials = MaterialsManager::restore(
            inner.producers.clone(),
            inner.materials.clone(),
            batches,
            stages,
            batch_props,
            (
                inner.next_producer.unwrap_or(0),
                inner.next_material.unwrap_or(0),
                inner.next_batch.unwrap_or(0),
                inner.next_stage.unwrap_or(0),
                inner.next_batch_property.unwrap_or(0),
            ),
        );

        RestoredState {
            people,
            attributes,
            resources,
            materials,
        }
    }

    pub(crate) fn inner(&self) -> &SnapshotInner {
        &self.inner
    }
}

/// Live managers rebuilt from a snapshot.
#[derive(Debug)]
pub struct RestoredState {
    pub people: PeopleManager,
    pub attributes: AttributesManager,
    pub resources: ResourceManager,
    pub materials: MaterialsManager,
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

/// Materialize the live managers into a validated snapshot taken at `now`.
pub fn capture(
    people: &PeopleManager,
    attributes: &AttributesManager,
    resources: &ResourceManager,
    materials: &MaterialsManager,
    now: Time,
) -> Result<SnapshotData, SnapshotError> {
    let mut builder = SnapshotBuilder::new(now);

    for person in people.people() {
        builder.add_person(person);
    }
    for (property, definition) in people.properties().definitions() {
        builder.define_person_property(property, definition.clone());
    }
    for (person, property, value) in people.properties().values() {
        builder.set_person_property(person, property, value.clone());
    }
    for (person, property, time) in people.properties().times() {
        builder.set_person_property_time(person, property, time);
    }

    for (attribute, definition) in attributes.store().definitions() {
        builder.define_attribute(attribute, definition.clone());
    }
    for ((), attribute, value) in attributes.store().values() {
        builder.set_attribute(attribute, value.clone());
    }
    for ((), attribute, time) in attributes.store().times() {
        builder.set_attribute_time(attribute, time);
    }

    for region in resources.regions() {
        builder.add_region(region);
    }
    for resource in resources.resources() {
        builder.define_resource(resource);
    }
    for (region, resource, amount) in resources.region_ledger().balances() {
        builder.set_region_balance(region, resource, amount);
    }
    for (person, resource, amount) in resources.person_ledger().balances() {
        builder.set_person_balance(person, resource, amount);
    }
    for (producer, resource, amount) in resources.producer_ledger().balances() {
        builder.set_producer_balance(producer, resource, amount);
    }

    for producer in materials.producers() {
        builder.add_producer(producer);
    }
    for material in materials.materials() {
        builder.define_material(material);
    }
    for (property, definition) in materials.batch_properties().definitions() {
        builder.define_batch_property(property, definition.clone());
    }
    for (batch, material, amount, location) in materials.batch_entries() {
        builder.add_batch(batch, material, amount);
        match location {
            BatchLocation::Inventory(producer) => {
                builder.declare_batch_in_inventory(batch, producer);
            }
            BatchLocation::Staged(stage) => {
                builder.declare_batch_on_stage(batch, stage);
            }
        }
    }
    for (batch, property, value) in materials.batch_properties().values() {
        builder.set_batch_property(batch, property, value.clone());
    }
    for (batch, property, time) in materials.batch_properties().times() {
        builder.set_batch_property_time(batch, property, time);
    }
    for (stage, producer, offered) in materials.stage_entries() {
        builder.add_stage(stage);
        builder.declare_stage_producer(stage, producer);
        builder.set_stage_offered(stage, offered);
    }

    let (next_producer, next_material, next_batch, next_stage, next_batch_property) =
        materials.counters();
    {
        let inner = builder.inner_mut();
        inner.next_producer = Some(next_producer);
        inner.next_material = Some(next_material);
        inner.next_batch = Some(next_batch);
        inner.next_stage = Some(next_stage);
        inner.next_batch_property = Some(next_batch_property);
        let (next_person, next_person_property) = people.counters();
        inner.next_person = Some(next_person);
        inner.next_person_property = Some(next_person_property);
        inner.next_attribute = Some(attributes.next_id());
        let (next_region, next_resource) = resources.counters();
        inner.next_region = Some(next_region);
        inner.next_resource = Some(next_resource);
    }

    builder.build()
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventBus;
    use crate::value::ValueKind;

    fn t(v: f64) -> Time {
        Time::new(v).unwrap()
    }

    #[test]
    fn empty_builder_builds() {
        let snapshot = SnapshotBuilder::new(Time::START).build().unwrap();
        assert_eq!(snapshot.people().count(), 0);
        assert_eq!(snapshot.next_batch_id(), 0);
        assert_eq!(snapshot.version(), SNAPSHOT_VERSION);
    }

    #[test]
    fn empty_round_trip_is_idempotent() {
        let snapshot = SnapshotBuilder::new(Time::START).build().unwrap();
        let again = snapshot.to_builder().build().unwrap();
        assert_eq!(snapshot, again);
    }

    #[test]
    fn builder_mutation_after_build_does_not_leak_into_snapshot() {
        let mut builder = SnapshotBuilder::new(Time::START);
        builder.add_region(RegionId(0));
        let snapshot = builder.build().unwrap();

        builder.add_region(RegionId(1));
        assert_eq!(snapshot.regions().count(), 1);
        assert_eq!(builder.build().unwrap().regions().count(), 2);
        // The first snapshot is still untouched.
        assert_eq!(snapshot.regions().count(), 1);
    }

    #[test]
    fn unknown_ids_fail_in_dependency_order() {
        let mut builder = SnapshotBuilder::new(Time::START);
        builder.set_region_balance(RegionId(0), ResourceId(0), 5);
        assert!(matches!(
            builder.build(),
            Err(SnapshotError::UnknownRegionId(_))
        ));

        builder.add_region(RegionId(0));
        assert!(matches!(
            builder.build(),
            Err(SnapshotError::UnknownResourceId(_))
        ));

        builder.define_resource(ResourceId(0));
        builder.build().unwrap();
    }

    #[test]
    fn value_kind_mismatch_fails() {
        let mut builder = SnapshotBuilder::new(Time::START);
        builder
            .add_person(PersonId(0))
            .define_person_property(
                PersonPropertyId(0),
                PropertyDefinition::new(ValueKind::Int).with_default(PropertyValue::Int(0)),
            )
            .set_person_property(PersonId(0), PersonPropertyId(0), PropertyValue::Bool(true));
        assert!(matches!(
            builder.build(),
            Err(SnapshotError::IncompatibleValue { .. })
        ));
    }

    #[test]
    fn defaultless_coverage_is_enforced() {
        let mut builder = SnapshotBuilder::new(Time::START);
        builder
            .add_person(PersonId(0))
            .add_person(PersonId(1))
            .define_person_property(PersonPropertyId(0), PropertyDefinition::new(ValueKind::Int))
            .set_person_property(PersonId(0), PersonPropertyId(0), PropertyValue::Int(1));
        assert!(matches!(
            builder.build(),
            Err(SnapshotError::InsufficientPropertyValueAssignment)
        ));

        builder.set_person_property(PersonId(1), PersonPropertyId(0), PropertyValue::Int(2));
        let snapshot = builder.build().unwrap();
        // The completed fact set survives a rebuild unchanged.
        assert_eq!(snapshot.to_builder().build().unwrap(), snapshot);
    }

    #[test]
    fn batch_in_both_locations_fails() {
        let mut builder = SnapshotBuilder::new(Time::START);
        builder
            .add_producer(MaterialsProducerId(0))
            .define_material(MaterialId(0))
            .add_batch(BatchId(0), MaterialId(0), 1.0)
            .add_stage(StageId(0))
            .declare_stage_producer(StageId(0), MaterialsProducerId(0))
            .declare_batch_in_inventory(BatchId(0), MaterialsProducerId(0))
            .declare_batch_on_stage(BatchId(0), StageId(0));
        assert!(matches!(
            builder.build(),
            Err(SnapshotError::BatchInMultipleLocations(_))
        ));
    }

    #[test]
    fn unowned_batch_fails() {
        let mut builder = SnapshotBuilder::new(Time::START);
        builder
            .add_producer(MaterialsProducerId(0))
            .define_material(MaterialId(0))
            .add_batch(BatchId(0), MaterialId(0), 1.0);
        assert!(matches!(builder.build(), Err(SnapshotError::BatchNotOwned(_))));
    }

    #[test]
    fn stage_owner_declarations_must_be_exactly_one() {
        let mut builder = SnapshotBuilder::new(Time::START);
        builder.add_producer(MaterialsProducerId(0)).add_stage(StageId(0));
        assert!(matches!(
            builder.build(),
            Err(SnapshotError::StageWithoutMaterialsProducer(_))
        ));

        builder
            .declare_stage_producer(StageId(0), MaterialsProducerId(0))
            .declare_stage_producer(StageId(0), MaterialsProducerId(0));
        assert!(matches!(
            builder.build(),
            Err(SnapshotError::DuplicateStageAssignment(_))
        ));
    }

    #[test]
    fn invalid_batch_amount_fails() {
        let mut builder = SnapshotBuilder::new(Time::START);
        builder
            .add_producer(MaterialsProducerId(0))
            .define_material(MaterialId(0))
            .add_batch(BatchId(0), MaterialId(0), f64::NAN)
            .declare_batch_in_inventory(BatchId(0), MaterialsProducerId(0));
        assert!(matches!(
            builder.build(),
            Err(SnapshotError::InvalidBatchAmount(_))
        ));
    }

    #[test]
    fn next_id_counters_are_computed_or_checked() {
        let mut builder = SnapshotBuilder::new(Time::START);
        builder
            .add_producer(MaterialsProducerId(0))
            .define_material(MaterialId(0))
            .add_batch(BatchId(4), MaterialId(0), 1.0)
            .declare_batch_in_inventory(BatchId(4), MaterialsProducerId(0));
        // Unset: computed as max + 1.
        assert_eq!(builder.build().unwrap().next_batch_id(), 5);

        builder.set_next_batch_id(4);
        assert!(matches!(
            builder.build(),
            Err(SnapshotError::NextIdTooSmall { .. })
        ));

        builder.set_next_batch_id(10);
        assert_eq!(builder.build().unwrap().next_batch_id(), 10);
    }

    #[test]
    fn id_at_type_maximum_cannot_compute_a_successor() {
        let mut builder = SnapshotBuilder::new(Time::START);
        builder.add_region(RegionId(u32::MAX));
        assert!(matches!(
            builder.build(),
            Err(SnapshotError::IdSpaceExhausted { kind: "region" })
        ));

        let mut builder = SnapshotBuilder::new(Time::START);
        builder
            .add_producer(MaterialsProducerId(0))
            .define_material(MaterialId(0))
            .add_batch(BatchId(u64::MAX), MaterialId(0), 1.0)
            .declare_batch_in_inventory(BatchId(u64::MAX), MaterialsProducerId(0));
        assert!(matches!(
            builder.build(),
            Err(SnapshotError::IdSpaceExhausted { kind: "batch" })
        ));
    }

    #[test]
    fn assignment_time_after_start_fails() {
        let mut builder = SnapshotBuilder::new(t(1.0));
        builder
            .add_person(PersonId(0))
            .define_person_property(
                PersonPropertyId(0),
                PropertyDefinition::new(ValueKind::Int)
                    .with_default(PropertyValue::Int(0))
                    .track_time(),
            )
            .set_person_property(PersonId(0), PersonPropertyId(0), PropertyValue::Int(1))
            .set_person_property_time(PersonId(0), PersonPropertyId(0), t(2.0));
        assert!(matches!(
            builder.build(),
            Err(SnapshotError::AssignmentTimeExceedsSimulationStart { .. })
        ));
    }

    #[test]
    fn capture_restore_recapture_reproduces_equal_snapshot() {
        let mut bus = EventBus::new();
        let mut people = PeopleManager::new(Time::START);
        let mut attributes = AttributesManager::new(Time::START);
        let mut resources = ResourceManager::new();
        let mut materials = MaterialsManager::new(Time::START);

        let prop = people
            .define_property(
                PropertyDefinition::new(ValueKind::Int)
                    .with_default(PropertyValue::Int(0))
                    .track_time(),
                &mut bus,
                Time::START,
            )
            .unwrap();
        let p0 = people.add_person(&[], &mut bus, Time::START).unwrap();
        let _p1 = people.add_person(&[], &mut bus, Time::START).unwrap();
        people
            .set_property(p0, prop, PropertyValue::Int(41), &mut bus, t(2.0))
            .unwrap();

        attributes
            .define_attribute(
                PropertyDefinition::new(ValueKind::Float).with_default(PropertyValue::Float(0.1)),
                None,
                &mut bus,
                Time::START,
            )
            .unwrap();

        let r1 = resources.add_region(&mut bus, Time::START);
        let r2 = resources.add_region(&mut bus, Time::START);
        let x = resources.define_resource(&mut bus, Time::START);
        resources.add_to_region(r1, x, 55, &mut bus, t(1.0)).unwrap();
        resources
            .transfer_between_regions(x, r1, r2, 20, &mut bus, t(2.0))
            .unwrap();
        resources
            .transfer_to_person(x, r2, p0, 5, &people, &mut bus, t(3.0))
            .unwrap();

        let producer = materials.add_producer(&mut bus, Time::START);
        let wood = materials.define_material();
        let batch = materials
            .create_batch(producer, wood, 2.5, &[], &mut bus, t(1.0))
            .unwrap();
        let stage = materials.create_stage(producer, &mut bus, t(1.0)).unwrap();
        materials.move_to_stage(batch, stage, &mut bus, t(2.0)).unwrap();
        materials.set_offer(stage, true, &mut bus, t(3.0)).unwrap();

        let snapshot = capture(&people, &attributes, &resources, &materials, t(4.0)).unwrap();

        // Round trip through a fresh builder.
        assert_eq!(snapshot.to_builder().build().unwrap(), snapshot);

        // Rehydrate and re-capture.
        let restored = snapshot.restore();
        let again = capture(
            &restored.people,
            &restored.attributes,
            &restored.resources,
            &restored.materials,
            t(4.0),
        )
        .unwrap();
        assert_eq!(again, snapshot);

        // Spot-check restored state.
        assert_eq!(
            restored.people.get_property(p0, prop).unwrap(),
            PropertyValue::Int(41)
        );
        assert_eq!(restored.people.property_time(p0, prop).unwrap(), t(2.0));
        assert_eq!(restored.resources.region_balance(r1, x).unwrap(), 35);
        assert_eq!(
            restored.resources.person_balance(p0, x, &restored.people).unwrap(),
            5
        );
        assert_eq!(
            restored.materials.batch_location(batch).unwrap(),
            BatchLocation::Staged(stage)
        );
        assert!(restored.materials.is_offered(stage).unwrap());
    }

    #[test]
    fn restored_managers_continue_id_sequences() {
        let mut bus = EventBus::new();
        let mut people = PeopleManager::new(Time::START);
        let attributes = AttributesManager::new(Time::START);
        let resources = ResourceManager::new();
        let mut materials = MaterialsManager::new(Time::START);

        people.add_person(&[], &mut bus, Time::START).unwrap();
        let producer = materials.add_producer(&mut bus, Time::START);
        let wood = materials.define_material();
        materials
            .create_batch(producer, wood, 1.0, &[], &mut bus, Time::START)
            .unwrap();

        let snapshot = capture(&people, &attributes, &resources, &materials, t(1.0)).unwrap();
        let mut restored = snapshot.restore();

        let next_person = restored.people.add_person(&[], &mut bus, t(1.0)).unwrap();
        assert_eq!(next_person, PersonId(1));
        let next_batch = restored
            .materials
            .create_batch(producer, wood, 1.0, &[], &mut bus, t(1.0))
            .unwrap();
        assert_eq!(next_batch, BatchId(1));
    }
}
