//! Person identity and person-property management.
//!
//! Owns the dense person id space and the person property store. Every
//! externally visible mutation publishes a [`ChangeEvent`] before returning.
//!
//! Person removal is deferred: `remove_person` validates and announces the
//! removal synchronously, but the stored values are purged only when
//! `apply_removals` runs at the next scheduling boundary. Callbacks already
//! queued for the same instant therefore still observe pre-removal state.

use crate::event::{ChangeEvent, EventBus};
use crate::id::{PersonId, PersonPropertyId};
use crate::property::{PropertyDefinition, PropertyError, PropertyStore};
use crate::time::Time;
use crate::value::PropertyValue;
use std::collections::{BTreeSet, HashMap};

/// Errors from person and person-property operations.
#[derive(Debug, thiserror::Error)]
pub enum PeopleError {
    #[error("unknown person: {0:?}")]
    UnknownPerson(PersonId),
    #[error("person already removed: {0:?}")]
    PersonAlreadyRemoved(PersonId),
    #[error(transparent)]
    Property(#[from] PropertyError),
}

/// Manager for the population and its typed properties.
#[derive(Debug)]
pub struct PeopleManager {
    next_person: u32,
    people: BTreeSet<PersonId>,
    pending_removals: Vec<PersonId>,
    next_property: u32,
    properties: PropertyStore<PersonPropertyId, PersonId>,
}

impl PeopleManager {
    /// Create an empty population. `start_time` is reported as the
    /// assignment time of tracked properties that were never written.
    pub fn new(start_time: Time) -> Self {
        Self {
            next_person: 0,
            people: BTreeSet::new(),
            pending_removals: Vec::new(),
            next_property: 0,
            properties: PropertyStore::new(start_time),
        }
    }

    /// Number of people currently present (including those pending removal).
    pub fn population(&self) -> usize {
        self.people.len()
    }

    /// Whether a person is present. People pending removal remain present
    /// until `apply_removals` runs.
    pub fn contains(&self, person: PersonId) -> bool {
        self.people.contains(&person)
    }

    /// Iterate all present people in id order.
    pub fn people(&self) -> impl Iterator<Item = PersonId> + '_ {
        self.people.iter().copied()
    }

    /// Add a person with explicit initial property values.
    ///
    /// Every defined property without a default must receive an initial
    /// value, otherwise the call fails with `InsufficientValueAssignment`
    /// and no person is created.
    pub fn add_person(
        &mut self,
        initial: &[(PersonPropertyId, PropertyValue)],
        bus: &mut EventBus,
        now: Time,
    ) -> Result<PersonId, PeopleError> {
        // Validate everything before any write.
        for &(property, ref value) in initial {
            let definition = self
                .properties
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
        let required: Vec<PersonPropertyId> = self.properties.keys_without_default().collect();
        for property in required {
            if !initial.iter().any(|&(p, _)| p == property) {
                return Err(PropertyError::InsufficientValueAssignment.into());
            }
        }

        let person = PersonId(self.next_person);
        self.next_person += 1;
        self.people.insert(person);
        for (property, value) in initial {
            self.properties
                .assign_initial(person, *property, value.clone(), now)?;
        }
        bus.publish(&ChangeEvent::PersonAdded { person, time: now });
        Ok(person)
    }

    /// Define a property. Fails with `InsufficientValueAssignment` when the
    /// definition has no default and people already exist; use
    /// `define_property_with_values` in that case.
    pub fn define_property(
        &mut self,
        definition: PropertyDefinition,
        bus: &mut EventBus,
        now: Time,
    ) -> Result<PersonPropertyId, PeopleError> {
        if definition.default.is_none() && !self.people.is_empty() {
            return Err(PropertyError::InsufficientValueAssignment.into());
        }
        let property = PersonPropertyId(self.next_property);
        self.properties.define(property, definition)?;
        self.next_property += 1;
        bus.publish(&ChangeEvent::PersonPropertyDefined { property, time: now });
        Ok(property)
    }

    /// Define a property and assign explicit values in the same operation.
    /// Required when the definition has no default: every present person
    /// must receive a value.
    pub fn define_property_with_values(
        &mut self,
        definition: PropertyDefinition,
        values: &HashMap<PersonId, PropertyValue>,
        bus: &mut EventBus,
        now: Time,
    ) -> Result<PersonPropertyId, PeopleError> {
        for &person in values.keys() {
            if !self.people.contains(&person) {
                return Err(PeopleError::UnknownPerson(person));
            }
        }
        let property = PersonPropertyId(self.next_property);
        self.properties.define_with_values(
            property,
            definition,
            values,
            self.people.iter().copied(),
            now,
        )?;
        self.next_property += 1;
        bus.publish(&ChangeEvent::PersonPropertyDefined { property, time: now });
        Ok(property)
    }

    /// The definition registered for a property, if any.
    pub fn property_definition(&self, property: PersonPropertyId) -> Option<&PropertyDefinition> {
        self.properties.definition(property)
    }

    /// Current property value for a person (the default if never written).
    pub fn get_property(
        &self,
        person: PersonId,
        property: PersonPropertyId,
    ) -> Result<PropertyValue, PeopleError> {
        if !self.people.contains(&person) {
            return Err(PeopleError::UnknownPerson(person));
        }
        Ok(self.properties.get(person, property)?)
    }

    /// Write a property value and publish the previous/current change.
    pub fn set_property(
        &mut self,
        person: PersonId,
        property: PersonPropertyId,
        value: PropertyValue,
        bus: &mut EventBus,
        now: Time,
    ) -> Result<(), PeopleError> {
        if !self.people.contains(&person) {
            return Err(PeopleError::UnknownPerson(person));
        }
        let previous = self.properties.set(person, property, value.clone(), now)?;
        bus.publish(&ChangeEvent::PersonPropertyChanged {
            person,
            property,
            previous,
            current: value,
            time: now,
        });
        Ok(())
    }

    /// Last write time of a tracked property for a person.
    pub fn property_time(
        &self,
        person: PersonId,
        property: PersonPropertyId,
    ) -> Result<Time, PeopleError> {
        if !self.people.contains(&person) {
            return Err(PeopleError::UnknownPerson(person));
        }
        Ok(self.properties.assignment_time(person, property)?)
    }

    /// Announce a person's removal. The removal event is published
    /// immediately; the purge of stored state is deferred to
    /// `apply_removals`, which the wiring layer schedules at the current
    /// time so same-instant callbacks still see pre-removal state.
    pub fn remove_person(
        &mut self,
        person: PersonId,
        bus: &mut EventBus,
        now: Time,
    ) -> Result<(), PeopleError> {
        if !self.people.contains(&person) {
            return Err(PeopleError::UnknownPerson(person));
        }
        if self.pending_removals.contains(&person) {
            return Err(PeopleError::PersonAlreadyRemoved(person));
        }
        self.pending_removals.push(person);
        bus.publish(&ChangeEvent::PersonRemoved { person, time: now });
        Ok(())
    }

    /// Number of removals announced but not yet purged.
    pub fn pending_removal_count(&self) -> usize {
        self.pending_removals.len()
    }

    /// Purge every pending removal: drop the person and all stored property
    /// values and times. Returns the number of people purged. Person ids
    /// are never reused.
    pub fn apply_removals(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending_removals);
        let count = pending.len();
        for person in pending {
            self.people.remove(&person);
            self.properties.purge_subject(person);
        }
        count
    }

    pub(crate) fn properties(&self) -> &PropertyStore<PersonPropertyId, PersonId> {
        &self.properties
    }

    pub(crate) fn counters(&self) -> (u32, u32) {
        (self.next_person, self.next_property)
    }

    pub(crate) fn restore(
        people: BTreeSet<PersonId>,
        properties: PropertyStore<PersonPropertyId, PersonId>,
        next_person: u32,
        next_property: u32,
    ) -> Self {
        Self {
            next_person,
            people,
            pending_removals: Vec::new(),
            next_property,
            properties,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn t(v: f64) -> Time {
        Time::new(v).unwrap()
    }

    fn int_default(default: i64) -> PropertyDefinition {
        PropertyDefinition::new(ValueKind::Int).with_default(PropertyValue::Int(default))
    }

    #[test]
    fn add_person_emits_event() {
        let mut bus = EventBus::new();
        let mut people = PeopleManager::new(Time::START);
        let person = people.add_person(&[], &mut bus, Time::START).unwrap();
        assert_eq!(person, PersonId(0));
        assert_eq!(people.population(), 1);
        assert_eq!(bus.published_count(crate::event::EventKind::PersonAdded), 1);
    }

    #[test]
    fn person_ids_are_dense_and_increasing() {
        let mut bus = EventBus::new();
        let mut people = PeopleManager::new(Time::START);
        let a = people.add_person(&[], &mut bus, Time::START).unwrap();
        let b = people.add_person(&[], &mut bus, Time::START).unwrap();
        assert_eq!(a, PersonId(0));
        assert_eq!(b, PersonId(1));
    }

    #[test]
    fn property_default_read_without_write() {
        let mut bus = EventBus::new();
        let mut people = PeopleManager::new(Time::START);
        let prop = people
            .define_property(int_default(0), &mut bus, Time::START)
            .unwrap();
        let p7 = people.add_person(&[], &mut bus, Time::START).unwrap();
        let p8 = people.add_person(&[], &mut bus, Time::START).unwrap();

        people
            .set_property(p7, prop, PropertyValue::Int(5), &mut bus, t(1.0))
            .unwrap();
        assert_eq!(people.get_property(p7, prop).unwrap(), PropertyValue::Int(5));
        // Never written: reads the default.
        assert_eq!(people.get_property(p8, prop).unwrap(), PropertyValue::Int(0));
    }

    #[test]
    fn set_property_publishes_previous_and_current() {
        let mut bus = EventBus::new();
        let mut people = PeopleManager::new(Time::START);
        let prop = people
            .define_property(int_default(3), &mut bus, Time::START)
            .unwrap();
        let person = people.add_person(&[], &mut bus, Time::START).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        bus.subscribe(
            crate::event::EventKind::PersonPropertyChanged,
            Box::new(move |e| sink.borrow_mut().push(e.clone())),
        );

        people
            .set_property(person, prop, PropertyValue::Int(9), &mut bus, t(2.0))
            .unwrap();
        let events = seen.borrow();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0],
            ChangeEvent::PersonPropertyChanged {
                person,
                property: prop,
                previous: PropertyValue::Int(3),
                current: PropertyValue::Int(9),
                time: t(2.0),
            }
        );
    }

    #[test]
    fn define_without_default_on_populated_store_requires_values() {
        let mut bus = EventBus::new();
        let mut people = PeopleManager::new(Time::START);
        people.add_person(&[], &mut bus, Time::START).unwrap();

        let result = people.define_property(
            PropertyDefinition::new(ValueKind::Int),
            &mut bus,
            Time::START,
        );
        assert!(matches!(
            result,
            Err(PeopleError::Property(PropertyError::InsufficientValueAssignment))
        ));

        // Supplying all people succeeds.
        let mut values = HashMap::new();
        values.insert(PersonId(0), PropertyValue::Int(41));
        people
            .define_property_with_values(
                PropertyDefinition::new(ValueKind::Int),
                &values,
                &mut bus,
                Time::START,
            )
            .unwrap();
    }

    #[test]
    fn add_person_must_cover_defaultless_properties() {
        let mut bus = EventBus::new();
        let mut people = PeopleManager::new(Time::START);
        let prop = people
            .define_property(PropertyDefinition::new(ValueKind::Int), &mut bus, Time::START)
            .unwrap();

        let result = people.add_person(&[], &mut bus, Time::START);
        assert!(matches!(
            result,
            Err(PeopleError::Property(PropertyError::InsufficientValueAssignment))
        ));
        assert_eq!(people.population(), 0);

        let person = people
            .add_person(&[(prop, PropertyValue::Int(12))], &mut bus, Time::START)
            .unwrap();
        assert_eq!(people.get_property(person, prop).unwrap(), PropertyValue::Int(12));
    }

    #[test]
    fn property_time_tracks_last_write() {
        let mut bus = EventBus::new();
        let mut people = PeopleManager::new(Time::START);
        let prop = people
            .define_property(int_default(0).track_time(), &mut bus, Time::START)
            .unwrap();
        let person = people.add_person(&[], &mut bus, Time::START).unwrap();

        assert_eq!(people.property_time(person, prop).unwrap(), Time::START);
        people
            .set_property(person, prop, PropertyValue::Int(1), &mut bus, t(4.0))
            .unwrap();
        assert_eq!(people.property_time(person, prop).unwrap(), t(4.0));
    }

    #[test]
    fn removal_is_deferred_until_applied() {
        let mut bus = EventBus::new();
        let mut people = PeopleManager::new(Time::START);
        let prop = people
            .define_property(int_default(0), &mut bus, Time::START)
            .unwrap();
        let person = people.add_person(&[], &mut bus, Time::START).unwrap();
        people
            .set_property(person, prop, PropertyValue::Int(7), &mut bus, t(1.0))
            .unwrap();

        people.remove_person(person, &mut bus, t(2.0)).unwrap();
        // Pre-purge: still readable with pre-removal state.
        assert!(people.contains(person));
        assert_eq!(people.get_property(person, prop).unwrap(), PropertyValue::Int(7));

        assert_eq!(people.apply_removals(), 1);
        assert!(!people.contains(person));
        assert!(matches!(
            people.get_property(person, prop),
            Err(PeopleError::UnknownPerson(_))
        ));
    }

    #[test]
    fn double_removal_fails() {
        let mut bus = EventBus::new();
        let mut people = PeopleManager::new(Time::START);
        let person = people.add_person(&[], &mut bus, Time::START).unwrap();
        people.remove_person(person, &mut bus, t(1.0)).unwrap();
        assert!(matches!(
            people.remove_person(person, &mut bus, t(1.0)),
            Err(PeopleError::PersonAlreadyRemoved(_))
        ));
    }

    #[test]
    fn removed_person_id_is_not_reused() {
        let mut bus = EventBus::new();
        let mut people = PeopleManager::new(Time::START);
        let a = people.add_person(&[], &mut bus, Time::START).unwrap();
        people.remove_person(a, &mut bus, t(1.0)).unwrap();
        people.apply_removals();
        let b = people.add_person(&[], &mut bus, t(2.0)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn unknown_person_fails() {
        let mut bus = EventBus::new();
        let mut people = PeopleManager::new(Time::START);
        let prop = people
            .define_property(int_default(0), &mut bus, Time::START)
            .unwrap();
        assert!(matches!(
            people.get_property(PersonId(99), prop),
            Err(PeopleError::UnknownPerson(_))
        ));
        assert!(matches!(
            people.set_property(PersonId(99), prop, PropertyValue::Int(0), &mut bus, t(1.0)),
            Err(PeopleError::UnknownPerson(_))
        ));
    }
}
