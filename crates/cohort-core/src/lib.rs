//! Cohort Core -- entity-scoped state for discrete-event population
//! simulations.
//!
//! This crate provides the shared state store a simulation's plugins build
//! on: typed property stores, a non-negative resource ledger with atomic
//! transfers, batch/stage ownership tracking, synchronous change
//! notification, and validated copy-on-write snapshots.
//!
//! # Managers
//!
//! State is partitioned into four managers, each exclusively owning its
//! maps. Cross-manager reads go through the public getter API only:
//!
//! - [`people::PeopleManager`] -- the population and person properties.
//! - [`attributes::AttributesManager`] -- simulation-wide typed values.
//! - [`resources::ResourceManager`] -- region/person/producer resource
//!   balances with two-tier atomic transfers.
//! - [`materials::MaterialsManager`] -- producers, material batches, and
//!   stages, with exclusive batch ownership.
//!
//! # Execution model
//!
//! Single-threaded and deterministic: the scheduler (see
//! [`time::PlanQueue`]) runs one mutating callback at a time, every
//! operation receives the current [`time::Time`] explicitly, and every
//! mutation publishes a [`event::ChangeEvent`] in-line before returning.
//! Person removal is deferred to the next scheduling boundary so
//! same-instant callbacks still observe pre-removal state.
//!
//! # Snapshots
//!
//! [`snapshot::capture`] materializes the managers into an immutable,
//! validated [`snapshot::SnapshotData`]; [`snapshot::SnapshotData::restore`]
//! rebuilds live managers from one. [`serialize`] persists snapshots as
//! versioned bitcode with decode-time revalidation.

pub mod attributes;
pub mod event;
pub mod id;
pub mod ledger;
pub mod materials;
pub mod people;
pub mod property;
pub mod resources;
pub mod serialize;
pub mod snapshot;
pub mod time;
pub mod value;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
