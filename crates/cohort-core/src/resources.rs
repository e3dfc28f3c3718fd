//! Resource management across regions, people, and materials producers.
//!
//! A two-tier ledger: regions hold the primary pools, and people receive
//! resource only out of a region's pool (and return it the same way).
//! Producers exchange resource with regions when their converted output is
//! distributed. All movement goes through the atomic transfer primitive of
//! [`ResourceLedger`], so no intermediate inconsistent state is observable
//! and a failed transfer leaves every balance untouched.

use crate::event::{ChangeEvent, EventBus, EventFilter};
use crate::id::{MaterialsProducerId, PersonId, RegionId, ResourceId, SubjectId};
use crate::ledger::{LedgerError, ResourceLedger};
use crate::materials::MaterialsManager;
use crate::people::PeopleManager;
use crate::time::Time;
use std::collections::BTreeSet;

/// Errors from resource operations.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("unknown region: {0:?}")]
    UnknownRegion(RegionId),
    #[error("unknown resource: {0:?}")]
    UnknownResource(ResourceId),
    #[error("unknown person: {0:?}")]
    UnknownPerson(PersonId),
    #[error("unknown materials producer: {0:?}")]
    UnknownMaterialsProducer(MaterialsProducerId),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Manager for resource kinds, regions, and the three balance ledgers.
#[derive(Debug)]
pub struct ResourceManager {
    next_region: u32,
    regions: BTreeSet<RegionId>,
    next_resource: u32,
    resources: BTreeSet<ResourceId>,
    region_ledger: ResourceLedger<RegionId>,
    person_ledger: ResourceLedger<PersonId>,
    producer_ledger: ResourceLedger<MaterialsProducerId>,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self {
            next_region: 0,
            regions: BTreeSet::new(),
            next_resource: 0,
            resources: BTreeSet::new(),
            region_ledger: ResourceLedger::new(),
            person_ledger: ResourceLedger::new(),
            producer_ledger: ResourceLedger::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Vocabulary
    // -----------------------------------------------------------------------

    /// Register a region. Returns its dense id.
    pub fn add_region(&mut self, bus: &mut EventBus, now: Time) -> RegionId {
        let region = RegionId(self.next_region);
        self.next_region += 1;
        self.regions.insert(region);
        bus.publish(&ChangeEvent::RegionAdded { region, time: now });
        region
    }

    /// Register a resource kind. Returns its dense id.
    pub fn define_resource(&mut self, bus: &mut EventBus, now: Time) -> ResourceId {
        let resource = ResourceId(self.next_resource);
        self.next_resource += 1;
        self.resources.insert(resource);
        bus.publish(&ChangeEvent::ResourceDefined { resource, time: now });
        resource
    }

    pub fn contains_region(&self, region: RegionId) -> bool {
        self.regions.contains(&region)
    }

    pub fn contains_resource(&self, resource: ResourceId) -> bool {
        self.resources.contains(&resource)
    }

    /// Iterate registered regions in id order.
    pub fn regions(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.regions.iter().copied()
    }

    /// Iterate registered resource kinds in id order.
    pub fn resources(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.resources.iter().copied()
    }

    fn check_region(&self, region: RegionId) -> Result<(), ResourceError> {
        if !self.regions.contains(&region) {
            return Err(ResourceError::UnknownRegion(region));
        }
        Ok(())
    }

    fn check_resource(&self, resource: ResourceId) -> Result<(), ResourceError> {
        if !self.resources.contains(&resource) {
            return Err(ResourceError::UnknownResource(resource));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Balances
    // -----------------------------------------------------------------------

    pub fn region_balance(&self, region: RegionId, resource: ResourceId) -> Result<u64, ResourceError> {
        self.check_region(region)?;
        self.check_resource(resource)?;
        Ok(self.region_ledger.balance(region, resource))
    }

    pub fn person_balance(
        &self,
        person: PersonId,
        resource: ResourceId,
        people: &PeopleManager,
    ) -> Result<u64, ResourceError> {
        self.check_resource(resource)?;
        if !people.contains(person) {
            return Err(ResourceError::UnknownPerson(person));
        }
        Ok(self.person_ledger.balance(person, resource))
    }

    pub fn producer_balance(
        &self,
        producer: MaterialsProducerId,
        resource: ResourceId,
        materials: &MaterialsManager,
    ) -> Result<u64, ResourceError> {
        self.check_resource(resource)?;
        if !materials.contains_producer(producer) {
            return Err(ResourceError::UnknownMaterialsProducer(producer));
        }
        Ok(self.producer_ledger.balance(producer, resource))
    }

    /// Sum of one resource across all ledgers. Changes only through external
    /// add/remove, never through transfers.
    pub fn total_in_system(&self, resource: ResourceId) -> u128 {
        self.region_ledger.total(resource)
            + self.person_ledger.total(resource)
            + self.producer_ledger.total(resource)
    }

    // -----------------------------------------------------------------------
    // External supply and demand (region tier)
    // -----------------------------------------------------------------------

    /// Add resource to a region's pool from outside the system.
    pub fn add_to_region(
        &mut self,
        region: RegionId,
        resource: ResourceId,
        amount: u64,
        bus: &mut EventBus,
        now: Time,
    ) -> Result<(), ResourceError> {
        self.check_region(region)?;
        self.check_resource(resource)?;
        let change = self.region_ledger.add(region, resource, amount)?;
        bus.publish(&ChangeEvent::ResourceChanged {
            subject: SubjectId::Region(region),
            resource,
            previous: change.previous,
            current: change.current,
            time: now,
        });
        Ok(())
    }

    /// Remove resource from a region's pool out of the system.
    pub fn remove_from_region(
        &mut self,
        region: RegionId,
        resource: ResourceId,
        amount: u64,
        bus: &mut EventBus,
        now: Time,
    ) -> Result<(), ResourceError> {
        self.check_region(region)?;
        self.check_resource(resource)?;
        let change = self.region_ledger.remove(region, resource, amount)?;
        bus.publish(&ChangeEvent::ResourceChanged {
            subject: SubjectId::Region(region),
            resource,
            previous: change.previous,
            current: change.current,
            time: now,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transfers
    // -----------------------------------------------------------------------

    /// Move resource between two region pools atomically.
    pub fn transfer_between_regions(
        &mut self,
        resource: ResourceId,
        from: RegionId,
        to: RegionId,
        amount: u64,
        bus: &mut EventBus,
        now: Time,
    ) -> Result<(), ResourceError> {
        self.check_region(from)?;
        self.check_region(to)?;
        self.check_resource(resource)?;
        let change = self.region_ledger.transfer(resource, from, to, amount)?;
        bus.publish(&ChangeEvent::ResourceChanged {
            subject: SubjectId::Region(from),
            resource,
            previous: change.from.previous,
            current: change.from.current,
            time: now,
        });
        bus.publish(&ChangeEvent::ResourceChanged {
            subject: SubjectId::Region(to),
            resource,
            previous: change.to.previous,
            current: change.to.current,
            time: now,
        });
        Ok(())
    }

    /// Move resource from a region's pool to a person. The destination
    /// capacity is checked before the source is debited, so failure leaves
    /// both balances untouched.
    pub fn transfer_to_person(
        &mut self,
        resource: ResourceId,
        region: RegionId,
        person: PersonId,
        amount: u64,
        people: &PeopleManager,
        bus: &mut EventBus,
        now: Time,
    ) -> Result<(), ResourceError> {
        self.check_region(region)?;
        self.check_resource(resource)?;
        if !people.contains(person) {
            return Err(ResourceError::UnknownPerson(person));
        }
        self.person_ledger.can_add(person, resource, amount)?;
        let from = self.region_ledger.remove(region, resource, amount)?;
        let to = self.person_ledger.add(person, resource, amount)?;
        bus.publish(&ChangeEvent::ResourceChanged {
            subject: SubjectId::Region(region),
            resource,
            previous: from.previous,
            current: from.current,
            time: now,
        });
        bus.publish(&ChangeEvent::ResourceChanged {
            subject: SubjectId::Person(person),
            resource,
            previous: to.previous,
            current: to.current,
            time: now,
        });
        Ok(())
    }

    /// Return resource from a person to a region's pool.
    pub fn transfer_from_person(
        &mut self,
        resource: ResourceId,
        person: PersonId,
        region: RegionId,
        amount: u64,
        people: &PeopleManager,
        bus: &mut EventBus,
        now: Time,
    ) -> Result<(), ResourceError> {
        self.check_region(region)?;
        self.check_resource(resource)?;
        if !people.contains(person) {
            return Err(ResourceError::UnknownPerson(person));
        }
        self.region_ledger.can_add(region, resource, amount)?;
        let from = self.person_ledger.remove(person, resource, amount)?;
        let to = self.region_ledger.add(region, resource, amount)?;
        bus.publish(&ChangeEvent::ResourceChanged {
            subject: SubjectId::Person(person),
            resource,
            previous: from.previous,
            current: from.current,
            time: now,
        });
        bus.publish(&ChangeEvent::ResourceChanged {
            subject: SubjectId::Region(region),
            resource,
            previous: to.previous,
            current: to.current,
            time: now,
        });
        Ok(())
    }

    /// Move resource from a region's pool into a producer's stock.
    pub fn transfer_to_producer(
        &mut self,
        resource: ResourceId,
        region: RegionId,
        producer: MaterialsProducerId,
        amount: u64,
        materials: &MaterialsManager,
        bus: &mut EventBus,
        now: Time,
    ) -> Result<(), ResourceError> {
        self.check_region(region)?;
        self.check_resource(resource)?;
        if !materials.contains_producer(producer) {
            return Err(ResourceError::UnknownMaterialsProducer(producer));
        }
        self.producer_ledger.can_add(producer, resource, amount)?;
        let from = self.region_ledger.remove(region, resource, amount)?;
        let to = self.producer_ledger.add(producer, resource, amount)?;
        bus.publish(&ChangeEvent::ResourceChanged {
            subject: SubjectId::Region(region),
            resource,
            previous: from.previous,
            current: from.current,
            time: now,
        });
        bus.publish(&ChangeEvent::ResourceChanged {
            subject: SubjectId::MaterialsProducer(producer),
            resource,
            previous: to.previous,
            current: to.current,
            time: now,
        });
        Ok(())
    }

    /// Move resource from a producer's stock to a region's pool.
    pub fn transfer_from_producer(
        &mut self,
        resource: ResourceId,
        producer: MaterialsProducerId,
        region: RegionId,
        amount: u64,
        materials: &MaterialsManager,
        bus: &mut EventBus,
        now: Time,
    ) -> Result<(), ResourceError> {
        self.check_region(region)?;
        self.check_resource(resource)?;
        if !materials.contains_producer(producer) {
            return Err(ResourceError::UnknownMaterialsProducer(producer));
        }
        self.region_ledger.can_add(region, resource, amount)?;
        let from = self.producer_ledger.remove(producer, resource, amount)?;
        let to = self.region_ledger.add(region, resource, amount)?;
        bus.publish(&ChangeEvent::ResourceChanged {
            subject: SubjectId::MaterialsProducer(producer),
            resource,
            previous: from.previous,
            current: from.current,
            time: now,
        });
        bus.publish(&ChangeEvent::ResourceChanged {
            subject: SubjectId::Region(region),
            resource,
            previous: to.previous,
            current: to.current,
            time: now,
        });
        Ok(())
    }

    /// Credit a producer's stock from outside the system (typically the
    /// output of converting a stage into resource).
    pub fn add_to_producer(
        &mut self,
        producer: MaterialsProducerId,
        resource: ResourceId,
        amount: u64,
        materials: &MaterialsManager,
        bus: &mut EventBus,
        now: Time,
    ) -> Result<(), ResourceError> {
        self.check_resource(resource)?;
        if !materials.contains_producer(producer) {
            return Err(ResourceError::UnknownMaterialsProducer(producer));
        }
        let change = self.producer_ledger.add(producer, resource, amount)?;
        bus.publish(&ChangeEvent::ResourceChanged {
            subject: SubjectId::MaterialsProducer(producer),
            resource,
            previous: change.previous,
            current: change.current,
            time: now,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Pre-built event filters
    // -----------------------------------------------------------------------

    /// Filter matching every resource-change event.
    pub fn filter_all_resources() -> EventFilter {
        Box::new(|event| matches!(event, ChangeEvent::ResourceChanged { .. }))
    }

    /// Filter matching resource changes for one resource kind.
    pub fn filter_for_resource(&self, resource: ResourceId) -> Result<EventFilter, ResourceError> {
        self.check_resource(resource)?;
        Ok(Box::new(move |event| {
            matches!(event, ChangeEvent::ResourceChanged { resource: r, .. } if *r == resource)
        }))
    }

    /// Filter matching resource changes for one subject.
    pub fn filter_for_subject(
        &self,
        subject: SubjectId,
        people: &PeopleManager,
        materials: &MaterialsManager,
    ) -> Result<EventFilter, ResourceError> {
        self.check_subject(subject, people, materials)?;
        Ok(Box::new(move |event| {
            matches!(event, ChangeEvent::ResourceChanged { subject: s, .. } if *s == subject)
        }))
    }

    /// Filter matching resource changes for one resource on one subject.
    pub fn filter_for_resource_and_subject(
        &self,
        resource: ResourceId,
        subject: SubjectId,
        people: &PeopleManager,
        materials: &MaterialsManager,
    ) -> Result<EventFilter, ResourceError> {
        self.check_resource(resource)?;
        self.check_subject(subject, people, materials)?;
        Ok(Box::new(move |event| {
            matches!(
                event,
                ChangeEvent::ResourceChanged { subject: s, resource: r, .. }
                    if *s == subject && *r == resource
            )
        }))
    }

    fn check_subject(
        &self,
        subject: SubjectId,
        people: &PeopleManager,
        materials: &MaterialsManager,
    ) -> Result<(), ResourceError> {
        match subject {
            SubjectId::Region(region) => self.check_region(region),
            SubjectId::Person(person) => {
                if !people.contains(person) {
                    return Err(ResourceError::UnknownPerson(person));
                }
                Ok(())
            }
            SubjectId::MaterialsProducer(producer) => {
                if !materials.contains_producer(producer) {
                    return Err(ResourceError::UnknownMaterialsProducer(producer));
                }
                Ok(())
            }
        }
    }

    /// Drop a removed person's balances. Called from the deferred purge.
    pub fn purge_person(&mut self, person: PersonId) {
        self.person_ledger.purge_subject(person);
    }

    pub(crate) fn region_ledger(&self) -> &ResourceLedger<RegionId> {
        &self.region_ledger
    }

    pub(crate) fn person_ledger(&self) -> &ResourceLedger<PersonId> {
        &self.person_ledger
    }

    pub(crate) fn producer_ledger(&self) -> &ResourceLedger<MaterialsProducerId> {
        &self.producer_ledger
    }

    pub(crate) fn counters(&self) -> (u32, u32) {
        (self.next_region, self.next_resource)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        regions: BTreeSet<RegionId>,
        resources: BTreeSet<ResourceId>,
        region_ledger: ResourceLedger<RegionId>,
        person_ledger: ResourceLedger<PersonId>,
        producer_ledger: ResourceLedger<MaterialsProducerId>,
        next_region: u32,
        next_resource: u32,
    ) -> Self {
        Self {
            next_region,
            regions,
            next_resource,
            resources,
            region_ledger,
            person_ledger,
            producer_ledger,
        }
    }
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn t(v: f64) -> Time {
        Time::new(v).unwrap()
    }

    fn setup() -> (ResourceManager, EventBus, RegionId, RegionId, ResourceId) {
        let mut bus = EventBus::new();
        let mut resources = ResourceManager::new();
        let r1 = resources.add_region(&mut bus, Time::START);
        let r2 = resources.add_region(&mut bus, Time::START);
        let x = resources.define_resource(&mut bus, Time::START);
        (resources, bus, r1, r2, x)
    }

    #[test]
    fn region_scenario() {
        let (mut resources, mut bus, r1, r2, x) = setup();

        resources.add_to_region(r1, x, 55, &mut bus, t(1.0)).unwrap();
        resources
            .transfer_between_regions(x, r1, r2, 20, &mut bus, t(2.0))
            .unwrap();
        assert_eq!(resources.region_balance(r1, x).unwrap(), 35);
        assert_eq!(resources.region_balance(r2, x).unwrap(), 20);

        // Oversized transfer fails and leaves balances unchanged.
        let result = resources.transfer_between_regions(x, r1, r2, 9999, &mut bus, t(3.0));
        assert!(matches!(
            result,
            Err(ResourceError::Ledger(LedgerError::InsufficientBalance { .. }))
        ));
        assert_eq!(resources.region_balance(r1, x).unwrap(), 35);
        assert_eq!(resources.region_balance(r2, x).unwrap(), 20);
    }

    #[test]
    fn transfer_emits_event_per_endpoint() {
        let (mut resources, mut bus, r1, r2, x) = setup();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        bus.subscribe(
            EventKind::ResourceChanged,
            Box::new(move |e| sink.borrow_mut().push(e.clone())),
        );

        resources.add_to_region(r1, x, 10, &mut bus, t(1.0)).unwrap();
        resources
            .transfer_between_regions(x, r1, r2, 4, &mut bus, t(2.0))
            .unwrap();

        let events = seen.borrow();
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[1],
            ChangeEvent::ResourceChanged {
                subject: SubjectId::Region(r1),
                resource: x,
                previous: 10,
                current: 6,
                time: t(2.0),
            }
        );
        assert_eq!(
            events[2],
            ChangeEvent::ResourceChanged {
                subject: SubjectId::Region(r2),
                resource: x,
                previous: 0,
                current: 4,
                time: t(2.0),
            }
        );
    }

    #[test]
    fn two_tier_person_transfer() {
        let (mut resources, mut bus, r1, _r2, x) = setup();
        let mut people = PeopleManager::new(Time::START);
        let person = people.add_person(&[], &mut bus, Time::START).unwrap();

        resources.add_to_region(r1, x, 30, &mut bus, t(1.0)).unwrap();
        resources
            .transfer_to_person(x, r1, person, 12, &people, &mut bus, t(2.0))
            .unwrap();
        assert_eq!(resources.region_balance(r1, x).unwrap(), 18);
        assert_eq!(resources.person_balance(person, x, &people).unwrap(), 12);

        resources
            .transfer_from_person(x, person, r1, 5, &people, &mut bus, t(3.0))
            .unwrap();
        assert_eq!(resources.region_balance(r1, x).unwrap(), 23);
        assert_eq!(resources.person_balance(person, x, &people).unwrap(), 7);
    }

    #[test]
    fn balance_reads_require_known_subjects() {
        let (resources, _bus, _r1, _r2, x) = setup();
        let people = PeopleManager::new(Time::START);
        let materials = MaterialsManager::new(Time::START);
        assert!(matches!(
            resources.person_balance(PersonId(5), x, &people),
            Err(ResourceError::UnknownPerson(_))
        ));
        assert!(matches!(
            resources.producer_balance(MaterialsProducerId(5), x, &materials),
            Err(ResourceError::UnknownMaterialsProducer(_))
        ));
    }

    #[test]
    fn person_transfer_requires_known_person() {
        let (mut resources, mut bus, r1, _r2, x) = setup();
        let people = PeopleManager::new(Time::START);
        resources.add_to_region(r1, x, 30, &mut bus, t(1.0)).unwrap();
        let result =
            resources.transfer_to_person(x, r1, PersonId(5), 1, &people, &mut bus, t(2.0));
        assert!(matches!(result, Err(ResourceError::UnknownPerson(_))));
        assert_eq!(resources.region_balance(r1, x).unwrap(), 30);
    }

    #[test]
    fn unknown_ids_fail() {
        let (mut resources, mut bus, r1, _r2, x) = setup();
        assert!(matches!(
            resources.add_to_region(RegionId(99), x, 1, &mut bus, t(1.0)),
            Err(ResourceError::UnknownRegion(_))
        ));
        assert!(matches!(
            resources.add_to_region(r1, ResourceId(99), 1, &mut bus, t(1.0)),
            Err(ResourceError::UnknownResource(_))
        ));
    }

    #[test]
    fn conservation_across_tiers() {
        let (mut resources, mut bus, r1, r2, x) = setup();
        let mut people = PeopleManager::new(Time::START);
        let person = people.add_person(&[], &mut bus, Time::START).unwrap();

        resources.add_to_region(r1, x, 100, &mut bus, t(1.0)).unwrap();
        let before = resources.total_in_system(x);
        resources
            .transfer_between_regions(x, r1, r2, 40, &mut bus, t(2.0))
            .unwrap();
        resources
            .transfer_to_person(x, r2, person, 15, &people, &mut bus, t(3.0))
            .unwrap();
        assert_eq!(resources.total_in_system(x), before);

        resources.remove_from_region(r1, x, 10, &mut bus, t(4.0)).unwrap();
        assert_eq!(resources.total_in_system(x), before - 10);
    }

    #[test]
    fn producer_transfers_round_trip_through_region() {
        let (mut resources, mut bus, r1, _r2, x) = setup();
        let mut materials = MaterialsManager::new(Time::START);
        let producer = materials.add_producer(&mut bus, Time::START);

        resources.add_to_region(r1, x, 50, &mut bus, t(1.0)).unwrap();
        resources
            .transfer_to_producer(x, r1, producer, 20, &materials, &mut bus, t(2.0))
            .unwrap();
        assert_eq!(resources.region_balance(r1, x).unwrap(), 30);
        assert_eq!(resources.producer_balance(producer, x, &materials).unwrap(), 20);

        resources
            .transfer_from_producer(x, producer, r1, 8, &materials, &mut bus, t(3.0))
            .unwrap();
        assert_eq!(resources.region_balance(r1, x).unwrap(), 38);
        assert_eq!(resources.producer_balance(producer, x, &materials).unwrap(), 12);
        assert_eq!(resources.total_in_system(x), 50);
    }

    #[test]
    fn filters_route_narrowly() {
        let (mut resources, mut bus, r1, r2, x) = setup();
        let y = resources.define_resource(&mut bus, Time::START);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let filter = resources.filter_for_resource(y).unwrap();
        bus.subscribe_filtered(
            EventKind::ResourceChanged,
            crate::event::SubscriberPriority::Normal,
            Some(filter),
            Box::new(move |e| sink.borrow_mut().push(e.clone())),
        );

        resources.add_to_region(r1, x, 5, &mut bus, t(1.0)).unwrap();
        resources.add_to_region(r2, y, 7, &mut bus, t(1.0)).unwrap();
        assert_eq!(seen.borrow().len(), 1);
        assert!(matches!(
            seen.borrow()[0],
            ChangeEvent::ResourceChanged { current: 7, .. }
        ));
    }

    #[test]
    fn filter_for_unknown_resource_fails() {
        let (resources, _bus, _r1, _r2, _x) = setup();
        assert!(matches!(
            resources.filter_for_resource(ResourceId(99)),
            Err(ResourceError::UnknownResource(_))
        ));
    }
}
