use serde::{Deserialize, Serialize};

/// Identifies a person in the population. Densely packed, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PersonId(pub u32);

/// Identifies a region. Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionId(pub u32);

/// Identifies a materials producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MaterialsProducerId(pub u32);

/// Identifies a resource kind in the resource ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub u32);

/// Identifies a material kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MaterialId(pub u32);

/// Identifies a batch of material. Batch ids count up for the life of the
/// simulation and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BatchId(pub u64);

/// Identifies a stage (a grouping of batches offered for transfer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StageId(pub u64);

/// Identifies a property defined on persons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PersonPropertyId(pub u32);

/// Identifies a property defined on batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BatchPropertyId(pub u32);

/// Identifies a global attribute (a simulation-wide value with no subject).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttributeId(pub u32);

/// A subject that can hold resource balances. Used where cross-kind behavior
/// is needed (events, filters); per-kind code uses the concrete id types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SubjectId {
    Person(PersonId),
    Region(RegionId),
    MaterialsProducer(MaterialsProducerId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_copy_and_comparable() {
        let a = PersonId(3);
        let b = a;
        assert_eq!(a, b);
        assert_ne!(a, PersonId(4));
        assert!(BatchId(1) < BatchId(2));
    }

    #[test]
    fn ids_are_hashable() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(ResourceId(0), "vaccine");
        map.insert(ResourceId(1), "test_kit");
        assert_eq!(map[&ResourceId(0)], "vaccine");
    }

    #[test]
    fn subject_id_distinguishes_kinds() {
        let p = SubjectId::Person(PersonId(0));
        let r = SubjectId::Region(RegionId(0));
        assert_ne!(p, r);
        assert_eq!(p, SubjectId::Person(PersonId(0)));
    }
}
