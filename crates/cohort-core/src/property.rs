//! Property definitions and the typed, time-tracked value store.
//!
//! A [`PropertyStore`] holds per-subject values for a catalog of defined
//! properties. Values are lazily defaulted: an unwritten property reads as
//! the definition's default, so memory stays proportional to actual writes
//! rather than population size. Definitions without a default require an
//! explicit value for every current subject, enforced at definition time and
//! at subject creation by the owning manager.

use crate::time::Time;
use crate::value::{PropertyValue, ValueKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;

// ---------------------------------------------------------------------------
// Definition
// ---------------------------------------------------------------------------

/// The type/mutability/default/time-tracking contract for a property key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    /// The value kind every assignment must match.
    pub kind: ValueKind,
    /// Whether the property may be written after its initial assignment.
    pub mutable: bool,
    /// Value subjects read before any explicit write. When absent, every
    /// subject must be explicitly assigned before the store is valid.
    pub default: Option<PropertyValue>,
    /// Whether last-write times are recorded.
    pub time_tracked: bool,
}

impl PropertyDefinition {
    /// A mutable, untracked definition with no default.
    pub fn new(kind: ValueKind) -> Self {
        Self {
            kind,
            mutable: true,
            default: None,
            time_tracked: false,
        }
    }

    /// Set the default value. The kind is checked when the definition is
    /// registered with a store.
    pub fn with_default(mut self, default: PropertyValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Mark the property immutable after initial assignment.
    pub fn immutable(mut self) -> Self {
        self.mutable = false;
        self
    }

    /// Record the time of every write.
    pub fn track_time(mut self) -> Self {
        self.time_tracked = true;
        self
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from property definition and value access.
#[derive(Debug, thiserror::Error)]
pub enum PropertyError {
    #[error("property is already defined")]
    DuplicateDefinition,
    #[error("property is not defined")]
    UnknownProperty,
    #[error("property is immutable")]
    ImmutableValue,
    #[error("incompatible value: definition expects {expected:?}, got {actual:?}")]
    IncompatibleValue {
        expected: ValueKind,
        actual: ValueKind,
    },
    #[error("definition has no default and a subject was left without a value")]
    InsufficientValueAssignment,
    #[error("no value assigned and the definition has no default")]
    ValueNotAssigned,
    #[error("property does not track assignment times")]
    TimeNotTracked,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Per-subject current values for a catalog of property definitions.
///
/// Generic over the property key type `P` and the subject id type `S`; the
/// domain managers instantiate it with their concrete vocabularies (person
/// properties on persons, batch properties on batches, attributes on `()`).
/// Subject existence is the owning manager's concern; the store only knows
/// about subjects that have been written.
#[derive(Debug, Clone)]
pub struct PropertyStore<P, S> {
    definitions: HashMap<P, PropertyDefinition>,
    values: HashMap<(S, P), PropertyValue>,
    times: HashMap<(S, P), Time>,
    /// Time reported for unwritten tracked properties. Unwritten and
    /// written-to-default are indistinguishable by design.
    default_time: Time,
}

impl<P, S> PropertyStore<P, S>
where
    P: Copy + Eq + Hash,
    S: Copy + Eq + Hash,
{
    /// Create an empty store. `default_time` is reported as the assignment
    /// time of tracked properties that have never been written, normally the
    /// simulation start time.
    pub fn new(default_time: Time) -> Self {
        Self {
            definitions: HashMap::new(),
            values: HashMap::new(),
            times: HashMap::new(),
            default_time,
        }
    }

    /// Register a definition. Fails with `DuplicateDefinition` if the key is
    /// taken, or `IncompatibleValue` if the default does not match the kind.
    pub fn define(&mut self, key: P, definition: PropertyDefinition) -> Result<(), PropertyError> {
        if self.definitions.contains_key(&key) {
            return Err(PropertyError::DuplicateDefinition);
        }
        if let Some(ref default) = definition.default
            && !default.is_kind(definition.kind)
        {
            return Err(PropertyError::IncompatibleValue {
                expected: definition.kind,
                actual: default.kind(),
            });
        }
        self.definitions.insert(key, definition);
        Ok(())
    }

    /// Register a definition together with explicit per-subject values.
    ///
    /// When the definition has no default, `subjects` enumerates every
    /// current subject and each must appear in `values`, otherwise the call
    /// fails with `InsufficientValueAssignment` and nothing is stored.
    pub fn define_with_values(
        &mut self,
        key: P,
        definition: PropertyDefinition,
        values: &HashMap<S, PropertyValue>,
        subjects: impl IntoIterator<Item = S>,
        now: Time,
    ) -> Result<(), PropertyError> {
        if self.definitions.contains_key(&key) {
            return Err(PropertyError::DuplicateDefinition);
        }
        if let Some(ref default) = definition.default
            && !default.is_kind(definition.kind)
        {
            return Err(PropertyError::IncompatibleValue {
                expected: definition.kind,
                actual: default.kind(),
            });
        }
        for value in values.values() {
            if !value.is_kind(definition.kind) {
                return Err(PropertyError::IncompatibleValue {
                    expected: definition.kind,
                    actual: value.kind(),
                });
            }
        }
        if definition.default.is_none() {
            for subject in subjects {
                if !values.contains_key(&subject) {
                    return Err(PropertyError::InsufficientValueAssignment);
                }
            }
        }

        let time_tracked = definition.time_tracked;
        self.definitions.insert(key, definition);
        for (&subject, value) in values {
            self.values.insert((subject, key), value.clone());
            if time_tracked {
                self.times.insert((subject, key), now);
            }
        }
        Ok(())
    }

    /// Whether a definition exists for the key.
    pub fn is_defined(&self, key: P) -> bool {
        self.definitions.contains_key(&key)
    }

    /// The definition for a key.
    pub fn definition(&self, key: P) -> Option<&PropertyDefinition> {
        self.definitions.get(&key)
    }

    /// Current value for a subject: the written value, or the definition's
    /// default if never written.
    pub fn get(&self, subject: S, key: P) -> Result<PropertyValue, PropertyError> {
        let definition = self
            .definitions
            .get(&key)
            .ok_or(PropertyError::UnknownProperty)?;
        if let Some(value) = self.values.get(&(subject, key)) {
            return Ok(value.clone());
        }
        definition
            .default
            .clone()
            .ok_or(PropertyError::ValueNotAssigned)
    }

    /// Write a value, returning the previous value (which may be the
    /// default). Validates kind and mutability before any write.
    pub fn set(
        &mut self,
        subject: S,
        key: P,
        value: PropertyValue,
        now: Time,
    ) -> Result<PropertyValue, PropertyError> {
        let definition = self
            .definitions
            .get(&key)
            .ok_or(PropertyError::UnknownProperty)?;
        if !definition.mutable {
            return Err(PropertyError::ImmutableValue);
        }
        if !value.is_kind(definition.kind) {
            return Err(PropertyError::IncompatibleValue {
                expected: definition.kind,
                actual: value.kind(),
            });
        }
        let time_tracked = definition.time_tracked;
        // Resolve the previous value before writing so a failed lookup
        // leaves the store untouched.
        let previous = match self.values.get(&(subject, key)) {
            Some(previous) => previous.clone(),
            None => definition
                .default
                .clone()
                .ok_or(PropertyError::ValueNotAssigned)?,
        };
        self.values.insert((subject, key), value);
        if time_tracked {
            self.times.insert((subject, key), now);
        }
        Ok(previous)
    }

    /// Assign an initial value for a newly created subject. Bypasses the
    /// mutability check (initial assignment is not a mutation) but keeps the
    /// kind check.
    pub fn assign_initial(
        &mut self,
        subject: S,
        key: P,
        value: PropertyValue,
        now: Time,
    ) -> Result<(), PropertyError> {
        let definition = self
            .definitions
            .get(&key)
            .ok_or(PropertyError::UnknownProperty)?;
        if !value.is_kind(definition.kind) {
            return Err(PropertyError::IncompatibleValue {
                expected: definition.kind,
                actual: value.kind(),
            });
        }
        let time_tracked = definition.time_tracked;
        self.values.insert((subject, key), value);
        if time_tracked {
            self.times.insert((subject, key), now);
        }
        Ok(())
    }

    /// The last write time for a tracked property. Unwritten properties
    /// report the store's default time.
    pub fn assignment_time(&self, subject: S, key: P) -> Result<Time, PropertyError> {
        let definition = self
            .definitions
            .get(&key)
            .ok_or(PropertyError::UnknownProperty)?;
        if !definition.time_tracked {
            return Err(PropertyError::TimeNotTracked);
        }
        Ok(self
            .times
            .get(&(subject, key))
            .copied()
            .unwrap_or(self.default_time))
    }

    /// Keys of definitions that have no default value.
    pub fn keys_without_default(&self) -> impl Iterator<Item = P> + '_ {
        self.definitions
            .iter()
            .filter(|(_, d)| d.default.is_none())
            .map(|(&k, _)| k)
    }

    /// Drop all values and times stored for a subject.
    pub fn purge_subject(&mut self, subject: S) {
        self.values.retain(|&(s, _), _| s != subject);
        self.times.retain(|&(s, _), _| s != subject);
    }

    /// Iterate all definitions.
    pub fn definitions(&self) -> impl Iterator<Item = (P, &PropertyDefinition)> {
        self.definitions.iter().map(|(&k, d)| (k, d))
    }

    /// Iterate all explicitly written values.
    pub fn values(&self) -> impl Iterator<Item = (S, P, &PropertyValue)> {
        self.values.iter().map(|(&(s, p), v)| (s, p, v))
    }

    /// Iterate all recorded write times.
    pub fn times(&self) -> impl Iterator<Item = (S, P, Time)> {
        self.times.iter().map(|(&(s, p), &t)| (s, p, t))
    }

    /// Restore a definition when rehydrating from a snapshot. The snapshot
    /// validator has already checked it.
    pub(crate) fn restore_definition(&mut self, key: P, definition: PropertyDefinition) {
        self.definitions.insert(key, definition);
    }

    /// Restore a written value when rehydrating from a snapshot.
    pub(crate) fn restore_value(&mut self, subject: S, key: P, value: PropertyValue) {
        self.values.insert((subject, key), value);
    }

    /// Restore a write time when rehydrating from a snapshot.
    pub(crate) fn restore_time(&mut self, subject: S, key: P, time: Time) {
        self.times.insert((subject, key), time);
    }
}
