//! Shared test helpers for integration tests.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests and integration tests (via the `test-utils`
//! feature).

use crate::attributes::AttributesManager;
use crate::event::EventBus;
use crate::id::{RegionId, ResourceId};
use crate::materials::MaterialsManager;
use crate::people::PeopleManager;
use crate::resources::ResourceManager;
use crate::time::Time;

// ===========================================================================
// Time helper
// ===========================================================================

pub fn time(v: f64) -> Time {
    Time::new(v).expect("finite test time")
}

// ===========================================================================
// World fixture
// ===========================================================================

/// The full manager set wired to one event bus, starting empty at time zero.
pub struct TestWorld {
    pub bus: EventBus,
    pub people: PeopleManager,
    pub attributes: AttributesManager,
    pub resources: ResourceManager,
    pub materials: MaterialsManager,
}

impl TestWorld {
    pub fn new() -> Self {
        Self {
            bus: EventBus::new(),
            people: PeopleManager::new(Time::START),
            attributes: AttributesManager::new(Time::START),
            resources: ResourceManager::new(),
            materials: MaterialsManager::new(Time::START),
        }
    }

    /// A world with `regions` regions and `resources` resource kinds already
    /// defined, returned in declaration order.
    pub fn with_vocabulary(regions: usize, resources: usize) -> (Self, Vec<RegionId>, Vec<ResourceId>) {
        let mut world = Self::new();
        let region_ids = (0..regions)
            .map(|_| world.resources.add_region(&mut world.bus, Time::START))
            .collect();
        let resource_ids = (0..resources)
            .map(|_| world.resources.define_resource(&mut world.bus, Time::START))
            .collect();
        (world, region_ids, resource_ids)
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}
