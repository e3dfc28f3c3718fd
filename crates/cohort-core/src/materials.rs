//! Materials producers, batches, and stages.
//!
//! A batch is always owned by exactly one location: a producer's inventory
//! or a stage. `move_to_stage` and `move_to_inventory` are the only
//! transitions and each atomically clears the prior location. A stage is
//! owned by a single producer; an offered stage (and the batches on it) is
//! frozen until the offer is rescinded or the stage is transferred to
//! another producer.

use crate::event::{ChangeEvent, EventBus};
use crate::id::{BatchId, BatchPropertyId, MaterialId, MaterialsProducerId, StageId};
use crate::property::{PropertyDefinition, PropertyError, PropertyStore};
use crate::time::Time;
use crate::value::PropertyValue;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Errors from materials operations.
#[derive(Debug, thiserror::Error)]
pub enum MaterialsError {
    #[error("unknown materials producer: {0:?}")]
    UnknownMaterialsProducer(MaterialsProducerId),
    #[error("unknown material: {0:?}")]
    UnknownMaterial(MaterialId),
    #[error("unknown batch: {0:?}")]
    UnknownBatch(BatchId),
    #[error("unknown stage: {0:?}")]
    UnknownStage(StageId),
    #[error("batch amount must be finite and non-negative: {0}")]
    InvalidBatchAmount(f64),
    #[error("batch {0:?} is already on a stage")]
    BatchAlreadyStaged(BatchId),
    #[error("batch {0:?} is not on a stage")]
    BatchNotStaged(BatchId),
    #[error("batch {batch:?} belongs to {owner:?}, not {requested:?}")]
    BatchOwnerMismatch {
        batch: BatchId,
        owner: MaterialsProducerId,
        requested: MaterialsProducerId,
    },
    #[error("stage {0:?} is offered and cannot be altered")]
    OfferedStageUnalterable(StageId),
    #[error("stage {0:?} is not offered")]
    StageNotOffered(StageId),
    #[error("stage transfer source and destination producer are the same")]
    ReflexiveStageTransfer,
    #[error(transparent)]
    Property(#[from] PropertyError),
}

/// Where a batch currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchLocation {
    Inventory(MaterialsProducerId),
    Staged(StageId),
}

#[derive(Debug, Clone)]
struct BatchRecord {
    material: MaterialId,
    amount: f64,
    location: BatchLocation,
}

#[derive(Debug, Clone)]
struct StageRecord {
    producer: MaterialsProducerId,
    offered: bool,
    batches: BTreeSet<BatchId>,
}

/// Manager for producers, materials, batches, and stages.
#[derive(Debug)]
pub struct MaterialsManager {
    next_producer: u32,
    producers: BTreeSet<MaterialsProducerId>,
    next_material: u32,
    materials: BTreeSet<MaterialId>,
    next_batch: u64,
    batches: BTreeMap<BatchId, BatchRecord>,
    next_stage: u64,
    stages: BTreeMap<StageId, StageRecord>,
    next_batch_property: u32,
    batch_properties: PropertyStore<BatchPropertyId, BatchId>,
}

impl MaterialsManager {
    pub fn new(start_time: Time) -> Self {
        Self {
            next_producer: 0,
            producers: BTreeSet::new(),
            next_material: 0,
            materials: BTreeSet::new(),
            next_batch: 0,
            batches: BTreeMap::new(),
            next_stage: 0,
            stages: BTreeMap::new(),
            next_batch_property: 0,
            batch_properties: PropertyStore::new(start_time),
        }
    }

    // -----------------------------------------------------------------------
    // Vocabulary
    // -----------------------------------------------------------------------

    /// Register a materials producer. Returns its dense id.
    pub fn add_producer(&mut self, bus: &mut EventBus, now: Time) -> MaterialsProducerId {
        let producer = MaterialsProducerId(self.next_producer);
        self.next_producer += 1;
        self.producers.insert(producer);
        bus.publish(&ChangeEvent::ProducerAdded { producer, time: now });
        producer
    }

    /// Register a material kind. Returns its dense id.
    pub fn define_material(&mut self) -> MaterialId {
        let material = MaterialId(self.next_material);
        self.next_material += 1;
        self.materials.insert(material);
        material
    }

    /// Define a batch property. The catalog is global: every batch carries
    /// the same property keys regardless of material kind.
    pub fn define_batch_property(
        &mut self,
        definition: PropertyDefinition,
        bus: &mut EventBus,
        now: Time,
    ) -> Result<BatchPropertyId, MaterialsError> {
        if definition.default.is_none() && !self.batches.is_empty() {
            return Err(PropertyError::InsufficientValueAssignment.into());
        }
        let property = BatchPropertyId(self.next_batch_property);
        self.batch_properties.define(property, definition)?;
        self.next_batch_property += 1;
        bus.publish(&ChangeEvent::BatchPropertyDefined { property, time: now });
        Ok(property)
    }

    pub fn contains_producer(&self, producer: MaterialsProducerId) -> bool {
        self.producers.contains(&producer)
    }

    pub fn contains_material(&self, material: MaterialId) -> bool {
        self.materials.contains(&material)
    }

    pub fn contains_batch(&self, batch: BatchId) -> bool {
        self.batches.contains_key(&batch)
    }

    pub fn contains_stage(&self, stage: StageId) -> bool {
        self.stages.contains_key(&stage)
    }

    /// Iterate registered producers in id order.
    pub fn producers(&self) -> impl Iterator<Item = MaterialsProducerId> + '_ {
        self.producers.iter().copied()
    }

    fn check_producer(&self, producer: MaterialsProducerId) -> Result<(), MaterialsError> {
        if !self.producers.contains(&producer) {
            return Err(MaterialsError::UnknownMaterialsProducer(producer));
        }
        Ok(())
    }

    fn batch_record(&self, batch: BatchId) -> Result<&BatchRecord, MaterialsError> {
        self.batches.get(&batch).ok_or(MaterialsError::UnknownBatch(batch))
    }

    fn stage_record(&self, stage: StageId) -> Result<&StageRecord, MaterialsError> {
        self.stages.get(&stage).ok_or(MaterialsError::UnknownStage(stage))
    }

    // -----------------------------------------------------------------------
    // Batches
    // -----------------------------------------------------------------------

    /// Create a batch in a producer's inventory.
    ///
    /// Every defined batch property without a default must receive an
    /// initial value, otherwise the call fails and no batch is created.
    pub fn create_batch(
        &mut self,
        producer: MaterialsProducerId,
        material: MaterialId,
        amount: f64,
        initial: &[(BatchPropertyId, PropertyValue)],
        bus: &mut EventBus,
        now: Time,
    ) -> Result<BatchId, MaterialsError> {
        self.check_producer(producer)?;
        if !self.materials.contains(&material) {
            return Err(MaterialsError::UnknownMaterial(material));
        }
        if !amount.is_finite() || amount < 0.0 {
            return Err(MaterialsError::InvalidBatchAmount(amount));
        }
        for &(property, ref value) in initial {
            let definition = self
                .batch_properties
                .definition(property)
                .ok_or(PropertyError::UnknownProperty)?;
            if !value.is_kind(definition.kind) {
                return Err(PropertyError::IncompatibleValue {
                    expected: definition.kind,
                    actual: value.kind(),
                }
                .into());
            }
        }
        let required: Vec<BatchPropertyId> = self.batch_properties.keys_without_default().collect();
        for property in required {
            if !initial.iter().any(|&(p, _)| p == property) {
                return Err(PropertyError::InsufficientValueAssignment.into());
            }
        }

        let batch = BatchId(self.next_batch);
        self.next_batch += 1;
        self.batches.insert(
            batch,
            BatchRecord {
                material,
                amount,
                location: BatchLocation::Inventory(producer),
            },
        );
        for (property, value) in initial {
            self.batch_properties
                .assign_initial(batch, *property, value.clone(), now)?;
        }
        bus.publish(&ChangeEvent::BatchCreated { batch, producer, time: now });
        Ok(batch)
    }

    /// Destroy a batch. The batch must sit in an inventory; staged batches
    /// must be moved back first.
    pub fn remove_batch(
        &mut self,
        batch: BatchId,
        bus: &mut EventBus,
        now: Time,
    ) -> Result<(), MaterialsError> {
        let record = self.batch_record(batch)?;
        if let BatchLocation::Staged(_) = record.location {
            return Err(MaterialsError::BatchAlreadyStaged(batch));
        }
        self.batches.remove(&batch);
        self.batch_properties.purge_subject(batch);
        bus.publish(&ChangeEvent::BatchRemoved { batch, time: now });
        Ok(())
    }

    pub fn batch_material(&self, batch: BatchId) -> Result<MaterialId, MaterialsError> {
        Ok(self.batch_record(batch)?.material)
    }

    pub fn batch_amount(&self, batch: BatchId) -> Result<f64, MaterialsError> {
        Ok(self.batch_record(batch)?.amount)
    }

    pub fn batch_location(&self, batch: BatchId) -> Result<BatchLocation, MaterialsError> {
        Ok(self.batch_record(batch)?.location)
    }

    /// The producer that ultimately holds a batch: the inventory owner, or
    /// the owner of the stage the batch sits on.
    pub fn batch_producer(&self, batch: BatchId) -> Result<MaterialsProducerId, MaterialsError> {
        match self.batch_record(batch)?.location {
            BatchLocation::Inventory(producer) => Ok(producer),
            BatchLocation::Staged(stage) => Ok(self.stage_record(stage)?.producer),
        }
    }

    /// Current batch property value (the default if never written).
    pub fn get_batch_property(
        &self,
        batch: BatchId,
        property: BatchPropertyId,
    ) -> Result<PropertyValue, MaterialsError> {
        self.batch_record(batch)?;
        Ok(self.batch_properties.get(batch, property)?)
    }

    /// Write a batch property value and publish the previous/current change.
    /// Fails when the batch sits on an offered stage.
    pub fn set_batch_property(
        &mut self,
        batch: BatchId,
        property: BatchPropertyId,
        value: PropertyValue,
        bus: &mut EventBus,
        now: Time,
    ) -> Result<(), MaterialsError> {
        let record = self.batch_record(batch)?;
        if let BatchLocation::Staged(stage) = record.location
            && self.stage_record(stage)?.offered
        {
            return Err(MaterialsError::OfferedStageUnalterable(stage));
        }
        let previous = self.batch_properties.set(batch, property, value.clone(), now)?;
        bus.publish(&ChangeEvent::BatchPropertyChanged {
            batch,
            property,
            previous,
            current: value,
            time: now,
        });
        Ok(())
    }

    /// Last write time of a tracked batch property.
    pub fn batch_property_time(
        &self,
        batch: BatchId,
        property: BatchPropertyId,
    ) -> Result<Time, MaterialsError> {
        self.batch_record(batch)?;
        Ok(self.batch_properties.assignment_time(batch, property)?)
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    /// Create an unoffered stage owned by a producer.
    pub fn create_stage(
        &mut self,
        producer: MaterialsProducerId,
        bus: &mut EventBus,
        now: Time,
    ) -> Result<StageId, MaterialsError> {
        self.check_producer(producer)?;
        let stage = StageId(self.next_stage);
        self.next_stage += 1;
        self.stages.insert(
            stage,
            StageRecord {
                producer,
                offered: false,
                batches: BTreeSet::new(),
            },
        );
        bus.publish(&ChangeEvent::StageCreated { stage, producer, time: now });
        Ok(stage)
    }

    pub fn stage_producer(&self, stage: StageId) -> Result<MaterialsProducerId, MaterialsError> {
        Ok(self.stage_record(stage)?.producer)
    }

    pub fn is_offered(&self, stage: StageId) -> Result<bool, MaterialsError> {
        Ok(self.stage_record(stage)?.offered)
    }

    /// Iterate the batches currently on a stage, in id order.
    pub fn stage_batches(
        &self,
        stage: StageId,
    ) -> Result<impl Iterator<Item = BatchId> + '_, MaterialsError> {
        Ok(self.stage_record(stage)?.batches.iter().copied())
    }

    /// Move an inventoried batch onto a stage owned by the same producer.
    pub fn move_to_stage(
        &mut self,
        batch: BatchId,
        stage: StageId,
        bus: &mut EventBus,
        now: Time,
    ) -> Result<(), MaterialsError> {
        let record = self.batch_record(batch)?;
        let owner = match record.location {
            BatchLocation::Inventory(producer) => producer,
            BatchLocation::Staged(_) => return Err(MaterialsError::BatchAlreadyStaged(batch)),
        };
        let target = self.stage_record(stage)?;
        if target.offered {
            return Err(MaterialsError::OfferedStageUnalterable(stage));
        }
        if target.producer != owner {
            return Err(MaterialsError::BatchOwnerMismatch {
                batch,
                owner,
                requested: target.producer,
            });
        }

        let previous = BatchLocation::Inventory(owner);
        let current = BatchLocation::Staged(stage);
        if let Some(r) = self.batches.get_mut(&batch) {
            r.location = current;
        }
        if let Some(r) = self.stages.get_mut(&stage) {
            r.batches.insert(batch);
        }
        bus.publish(&ChangeEvent::BatchMoved { batch, previous, current, time: now });
        Ok(())
    }

    /// Move a staged batch back to its producer's inventory. `producer` must
    /// name the stage's owner; the call is explicit so callers cannot move a
    /// batch into an inventory it never belonged to.
    pub fn move_to_inventory(
        &mut self,
        batch: BatchId,
        producer: MaterialsProducerId,
        bus: &mut EventBus,
        now: Time,
    ) -> Result<(), MaterialsError> {
        self.check_producer(producer)?;
        let record = self.batch_record(batch)?;
        let stage = match record.location {
            BatchLocation::Staged(stage) => stage,
            BatchLocation::Inventory(_) => return Err(MaterialsError::BatchNotStaged(batch)),
        };
        let stage_record = self.stage_record(stage)?;
        if stage_record.offered {
            return Err(MaterialsError::OfferedStageUnalterable(stage));
        }
        if stage_record.producer != producer {
            return Err(MaterialsError::BatchOwnerMismatch {
                batch,
                owner: stage_record.producer,
                requested: producer,
            });
        }

        let previous = BatchLocation::Staged(stage);
        let current = BatchLocation::Inventory(producer);
        if let Some(r) = self.batches.get_mut(&batch) {
            r.location = current;
        }
        if let Some(r) = self.stages.get_mut(&stage) {
            r.batches.remove(&batch);
        }
        bus.publish(&ChangeEvent::BatchMoved { batch, previous, current, time: now });
        Ok(())
    }

    /// Offer or rescind a stage. A no-op write still publishes the change.
    pub fn set_offer(
        &mut self,
        stage: StageId,
        offered: bool,
        bus: &mut EventBus,
        now: Time,
    ) -> Result<(), MaterialsError> {
        let previous = self.stage_record(stage)?.offered;
        if let Some(record) = self.stages.get_mut(&stage) {
            record.offered = offered;
        }
        bus.publish(&ChangeEvent::StageOfferChanged {
            stage,
            previous,
            current: offered,
            time: now,
        });
        Ok(())
    }

    /// Transfer an offered stage (and every batch on it) to another
    /// producer. The offer is rescinded as part of the transfer.
    pub fn transfer_offered_stage(
        &mut self,
        stage: StageId,
        to: MaterialsProducerId,
        bus: &mut EventBus,
        now: Time,
    ) -> Result<(), MaterialsError> {
        self.check_producer(to)?;
        let record = self.stage_record(stage)?;
        if !record.offered {
            return Err(MaterialsError::StageNotOffered(stage));
        }
        let from = record.producer;
        if from == to {
            return Err(MaterialsError::ReflexiveStageTransfer);
        }

        if let Some(record) = self.stages.get_mut(&stage) {
            record.producer = to;
            record.offered = false;
        }
        bus.publish(&ChangeEvent::StageTransferred {
            stage,
            previous: from,
            current: to,
            time: now,
        });
        bus.publish(&ChangeEvent::StageOfferChanged {
            stage,
            previous: true,
            current: false,
            time: now,
        });
        Ok(())
    }

    /// Destroy a stage. Batches on it are destroyed when `destroy_batches`
    /// is set, otherwise returned to the owning producer's inventory. An
    /// offered stage cannot be removed.
    pub fn remove_stage(
        &mut self,
        stage: StageId,
        destroy_batches: bool,
        bus: &mut EventBus,
        now: Time,
    ) -> Result<(), MaterialsError> {
        let record = self.stage_record(stage)?;
        if record.offered {
            return Err(MaterialsError::OfferedStageUnalterable(stage));
        }
        let producer = record.producer;
        let staged: Vec<BatchId> = record.batches.iter().copied().collect();

        for batch in staged {
            if destroy_batches {
                self.batches.remove(&batch);
                self.batch_properties.purge_subject(batch);
                bus.publish(&ChangeEvent::BatchRemoved { batch, time: now });
            } else {
                let previous = BatchLocation::Staged(stage);
                let current = BatchLocation::Inventory(producer);
                if let Some(r) = self.batches.get_mut(&batch) {
                    r.location = current;
                }
                bus.publish(&ChangeEvent::BatchMoved { batch, previous, current, time: now });
            }
        }
        self.stages.remove(&stage);
        bus.publish(&ChangeEvent::StageRemoved { stage, time: now });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Snapshot hooks
    // -----------------------------------------------------------------------

    pub(crate) fn materials(&self) -> impl Iterator<Item = MaterialId> + '_ {
        self.materials.iter().copied()
    }

    pub(crate) fn batch_entries(
        &self,
    ) -> impl Iterator<Item = (BatchId, MaterialId, f64, BatchLocation)> + '_ {
        self.batches
            .iter()
            .map(|(&id, r)| (id, r.material, r.amount, r.location))
    }

    pub(crate) fn stage_entries(
        &self,
    ) -> impl Iterator<Item = (StageId, MaterialsProducerId, bool)> + '_ {
        self.stages.iter().map(|(&id, r)| (id, r.producer, r.offered))
    }

    pub(crate) fn batch_properties(&self) -> &PropertyStore<BatchPropertyId, BatchId> {
        &self.batch_properties
    }

    pub(crate) fn counters(&self) -> (u32, u32, u64, u64, u32) {
        (
            self.next_producer,
            self.next_material,
            self.next_batch,
            self.next_stage,
            self.next_batch_property,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        producers: BTreeSet<MaterialsProducerId>,
        materials: BTreeSet<MaterialId>,
        batches: Vec<(BatchId, MaterialId, f64, BatchLocation)>,
        stages: Vec<(StageId, MaterialsProducerId, bool)>,
        batch_properties: PropertyStore<BatchPropertyId, BatchId>,
        counters: (u32, u32, u64, u64, u32),
    ) -> Self {
        let mut stage_map: BTreeMap<StageId, StageRecord> = stages
            .into_iter()
            .map(|(id, producer, offered)| {
                (id, StageRecord { producer, offered, batches: BTreeSet::new() })
            })
            .collect();
        let mut batch_map = BTreeMap::new();
        for (id, material, amount, location) in batches {
            if let BatchLocation::Staged(stage) = location
                && let Some(record) = stage_map.get_mut(&stage)
            {
                record.batches.insert(id);
            }
            batch_map.insert(id, BatchRecord { material, amount, location });
        }
        Self {
            next_producer: counters.0,
            producers,
            next_material: counters.1,
            materials,
            next_batch: counters.2,
            batches: batch_map,
            next_stage: counters.3,
            stages: stage_map,
            next_batch_property: counters.4,
            batch_properties,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
