//! Binary persistence for snapshots.
//!
//! Snapshots are written as a bitcode-encoded envelope carrying a magic
//! number and a format version ahead of the fact maps. Decoding re-runs the
//! full snapshot validation pipeline, so bytes from an untrusted file can
//! never rehydrate a store that violates the invariants.

use crate::snapshot::{SnapshotBuilder, SnapshotData, SnapshotError};
use serde::{Deserialize, Serialize};

/// Identifies a persisted snapshot file.
const SNAPSHOT_MAGIC: u32 = 0x434F_4831; // "COH1"

/// Current binary format version.
const FORMAT_VERSION: u16 = 1;

/// Errors from snapshot persistence.
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("not a snapshot file (bad magic number {0:#010x})")]
    BadMagic(u32),
    #[error("unsupported snapshot format version {0}")]
    UnsupportedVersion(u16),
    #[error("codec failure: {0}")]
    Codec(#[from] bitcode::Error),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

#[derive(Serialize, Deserialize)]
struct SnapshotEnvelope {
    magic: u32,
    version: u16,
    inner: crate::snapshot::SnapshotInner,
}

/// Whether a persisted format version can be decoded by this build.
pub fn format_supported(version: u16) -> bool {
    version == FORMAT_VERSION
}

/// Encode a snapshot for persistence.
pub fn encode(snapshot: &SnapshotData) -> Result<Vec<u8>, SerializeError> {
    let envelope = SnapshotEnvelope {
        magic: SNAPSHOT_MAGIC,
        version: FORMAT_VERSION,
        inner: snapshot.inner().clone(),
    };
    Ok(bitcode::serialize(&envelope)?)
}

/// Decode a persisted snapshot, re-validating every invariant.
pub fn decode(bytes: &[u8]) -> Result<SnapshotData, SerializeError> {
    let envelope: SnapshotEnvelope = bitcode::deserialize(bytes)?;
    if envelope.magic != SNAPSHOT_MAGIC {
        return Err(SerializeError::BadMagic(envelope.magic));
    }
    if !format_supported(envelope.version) {
        return Err(SerializeError::UnsupportedVersion(envelope.version));
    }
    Ok(SnapshotBuilder::from_inner(envelope.inner).build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{RegionId, ResourceId};
    use crate::snapshot::SnapshotBuilder;
    use crate::time::Time;

    fn sample() -> SnapshotData {
        let mut builder = SnapshotBuilder::new(Time::START);
        builder
            .add_region(RegionId(0))
            .add_region(RegionId(1))
            .define_resource(ResourceId(0))
            .set_region_balance(RegionId(0), ResourceId(0), 35)
            .set_region_balance(RegionId(1), ResourceId(0), 20);
        builder.build().unwrap()
    }

    #[test]
    fn encode_decode_round_trip() {
        let snapshot = sample();
        let bytes = encode(&snapshot).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, snapshot);
        assert_eq!(decoded.region_balance(RegionId(0), ResourceId(0)), 35);
    }

    #[test]
    fn empty_snapshot_round_trips() {
        let snapshot = SnapshotBuilder::new(Time::START).build().unwrap();
        let decoded = decode(&encode(&snapshot).unwrap()).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let snapshot = sample();
        let envelope = SnapshotEnvelope {
            magic: 0xDEAD_BEEF,
            version: FORMAT_VERSION,
            inner: snapshot.inner().clone(),
        };
        let bytes = bitcode::serialize(&envelope).unwrap();
        assert!(matches!(decode(&bytes), Err(SerializeError::BadMagic(_))));
    }

    #[test]
    fn future_version_is_rejected() {
        let snapshot = sample();
        let envelope = SnapshotEnvelope {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION + 1,
            inner: snapshot.inner().clone(),
        };
        let bytes = bitcode::serialize(&envelope).unwrap();
        assert!(matches!(
            decode(&bytes),
            Err(SerializeError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn garbage_bytes_fail_in_codec() {
        assert!(matches!(
            decode(&[0x00, 0x01, 0x02]),
            Err(SerializeError::Codec(_))
        ));
    }
}
