//! Simulation-wide attributes: typed values with no per-entity subject.
//!
//! A thin specialization of [`PropertyStore`] over the unit subject. Used
//! for run-level knobs and policy state shared by every plugin.

use crate::event::{ChangeEvent, EventBus};
use crate::id::AttributeId;
use crate::property::{PropertyDefinition, PropertyError, PropertyStore};
use crate::time::Time;
use crate::value::PropertyValue;

/// Errors from attribute operations.
#[derive(Debug, thiserror::Error)]
pub enum AttributeError {
    #[error("unknown attribute: {0:?}")]
    UnknownAttribute(AttributeId),
    #[error(transparent)]
    Property(#[from] PropertyError),
}

/// Manager for global attributes.
#[derive(Debug)]
pub struct AttributesManager {
    next_attribute: u32,
    store: PropertyStore<AttributeId, ()>,
}

impl AttributesManager {
    pub fn new(start_time: Time) -> Self {
        Self {
            next_attribute: 0,
            store: PropertyStore::new(start_time),
        }
    }

    /// Define an attribute. Attributes with no default must be assigned an
    /// initial value in the same call.
    pub fn define_attribute(
        &mut self,
        definition: PropertyDefinition,
        initial: Option<PropertyValue>,
        bus: &mut EventBus,
        now: Time,
    ) -> Result<AttributeId, AttributeError> {
        if definition.default.is_none() && initial.is_none() {
            return Err(PropertyError::InsufficientValueAssignment.into());
        }
        // Validate the initial value before defining so a failed call leaves
        // no trace in the store.
        if let Some(ref value) = initial
            && !value.is_kind(definition.kind)
        {
            return Err(PropertyError::IncompatibleValue {
                expected: definition.kind,
                actual: value.kind(),
            }
            .into());
        }
        let attribute = AttributeId(self.next_attribute);
        self.store.define(attribute, definition)?;
        self.next_attribute += 1;
        if let Some(value) = initial {
            self.store.assign_initial((), attribute, value, now)?;
        }
        bus.publish(&ChangeEvent::AttributeDefined { attribute, time: now });
        Ok(attribute)
    }

    /// Whether an attribute has been defined.
    pub fn is_defined(&self, attribute: AttributeId) -> bool {
        self.store.is_defined(attribute)
    }

    /// The definition for an attribute, if any.
    pub fn definition(&self, attribute: AttributeId) -> Option<&PropertyDefinition> {
        self.store.definition(attribute)
    }

    /// Current value (the default if never written).
    pub fn get(&self, attribute: AttributeId) -> Result<PropertyValue, AttributeError> {
        if !self.store.is_defined(attribute) {
            return Err(AttributeError::UnknownAttribute(attribute));
        }
        Ok(self.store.get((), attribute)?)
    }

    /// Write a value and publish the previous/current change.
    pub fn set(
        &mut self,
        attribute: AttributeId,
        value: PropertyValue,
        bus: &mut EventBus,
        now: Time,
    ) -> Result<(), AttributeError> {
        if !self.store.is_defined(attribute) {
            return Err(AttributeError::UnknownAttribute(attribute));
        }
        let previous = self.store.set((), attribute, value.clone(), now)?;
        bus.publish(&ChangeEvent::AttributeChanged {
            attribute,
            previous,
            current: value,
            time: now,
        });
        Ok(())
    }

    /// Last write time of a tracked attribute.
    pub fn assignment_time(&self, attribute: AttributeId) -> Result<Time, AttributeError> {
        if !self.store.is_defined(attribute) {
            return Err(AttributeError::UnknownAttribute(attribute));
        }
        Ok(self.store.assignment_time((), attribute)?)
    }

    pub(crate) fn store(&self) -> &PropertyStore<AttributeId, ()> {
        &self.store
    }

    pub(crate) fn next_id(&self) -> u32 {
        self.next_attribute
    }

    pub(crate) fn restore(store: PropertyStore<AttributeId, ()>, next_attribute: u32) -> Self {
        Self {
            next_attribute,
            store,
        }
    }
}
