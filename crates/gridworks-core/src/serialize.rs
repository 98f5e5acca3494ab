//! Binary and JSON snapshots of the world.
//!
//! Binary snapshots are `bitcode` with a magic and version header. The
//! `json` feature adds a readable form of the bare world.
//!
//! Every load runs the consistency check; a snapshot that decodes but
//! describes an impossible world is rejected with
//! [`DeserializeError::Invalid`], never repaired.

use crate::engine::Engine;
use crate::fixed::Ticks;
use crate::rng::SimRng;
use crate::validation::{check_world, Violation};
use crate::world::World;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// First field of every binary snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0x6772_0001;

/// Bumped whenever the encoded layout of [`World`] changes.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("cannot encode snapshot: {0}")]
    Encode(String),
    #[cfg(feature = "json")]
    #[error("cannot encode world as json: {0}")]
    Json(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("not a world snapshot (magic 0x{0:08X})")]
    BadMagic(u32),
    /// Only [`FORMAT_VERSION`] is readable.
    #[error("snapshot format {found} cannot be read, expected {FORMAT_VERSION}")]
    Version { found: u32 },
    #[error("cannot decode snapshot: {0}")]
    Decode(String),
    #[cfg(feature = "json")]
    #[error("cannot decode json world: {0}")]
    Json(String),
    #[error("snapshot describes an inconsistent world: {}", join_violations(.0))]
    Invalid(Vec<Violation>),
}

fn join_violations(violations: &[Violation]) -> String {
    let parts: Vec<String> = violations.iter().map(ToString::to_string).collect();
    parts.join("; ")
}

/// Identifies a snapshot before its payload is trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// World tick when the snapshot was taken.
    pub tick: Ticks,
}

impl SnapshotHeader {
    pub fn new(tick: Ticks) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            tick,
        }
    }

    pub fn validate(&self) -> Result<(), DeserializeError> {
        match (self.magic, self.version) {
            (SNAPSHOT_MAGIC, FORMAT_VERSION) => Ok(()),
            (SNAPSHOT_MAGIC, found) => Err(DeserializeError::Version { found }),
            (magic, _) => Err(DeserializeError::BadMagic(magic)),
        }
    }
}

/// On-disk layout. Engine snapshots also carry the random source and the
/// pause flag; world snapshots leave `rng` empty.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    header: SnapshotHeader,
    world: World,
    rng: Option<SimRng>,
    paused: bool,
}

impl Snapshot {
    fn of_world(world: &World) -> Self {
        Self {
            header: SnapshotHeader::new(world.tick),
            world: world.clone(),
            rng: None,
            paused: false,
        }
    }

    fn encode(&self) -> Result<Vec<u8>, SerializeError> {
        bitcode::serialize(self).map_err(|e| SerializeError::Encode(e.to_string()))
    }

    fn decode(data: &[u8]) -> Result<Self, DeserializeError> {
        bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))
    }

    /// Decode, then reject a bad header or an inconsistent world.
    fn load(data: &[u8]) -> Result<Self, DeserializeError> {
        let snapshot = Self::decode(data)?;
        snapshot.header.validate().inspect_err(|e| {
            warn!(error = %e, "snapshot header rejected");
        })?;
        check(&snapshot.world)?;
        Ok(snapshot)
    }
}

/// The header of a snapshot, unvalidated.
///
/// bitcode cannot decode a prefix, so this decodes the whole snapshot.
pub fn read_snapshot_header(data: &[u8]) -> Result<SnapshotHeader, DeserializeError> {
    Snapshot::decode(data).map(|snapshot| snapshot.header)
}

fn check(world: &World) -> Result<(), DeserializeError> {
    let violations = check_world(world);
    if violations.is_empty() {
        return Ok(());
    }
    warn!(count = violations.len(), tick = world.tick, "snapshot world rejected");
    Err(DeserializeError::Invalid(violations))
}

// ---------------------------------------------------------------------------
// World snapshots
// ---------------------------------------------------------------------------

/// Serialize a bare world.
pub fn serialize_world(world: &World) -> Result<Vec<u8>, SerializeError> {
    Snapshot::of_world(world).encode()
}

/// Deserialize a world written by [`serialize_world`] or
/// [`Engine::serialize`].
pub fn deserialize_world(data: &[u8]) -> Result<World, DeserializeError> {
    Snapshot::load(data).map(|snapshot| snapshot.world)
}

#[cfg(feature = "json")]
pub fn world_to_json(world: &World) -> Result<String, SerializeError> {
    serde_json::to_string(world).map_err(|e| SerializeError::Json(e.to_string()))
}

/// Parse a JSON world and run the consistency check on it.
#[cfg(feature = "json")]
pub fn world_from_json(json: &str) -> Result<World, DeserializeError> {
    let world: World = serde_json::from_str(json).map_err(|e| {
        warn!(error = %e, "json world rejected");
        DeserializeError::Json(e.to_string())
    })?;
    check(&world)?;
    Ok(world)
}

// ---------------------------------------------------------------------------
// Engine snapshots
// ---------------------------------------------------------------------------

impl Engine {
    /// Serialize the world together with the random source and pause
    /// state. Pending commands and listeners are not saved.
    pub fn serialize(&self) -> Result<Vec<u8>, SerializeError> {
        let snapshot = Snapshot {
            rng: Some(self.rng.clone()),
            paused: self.paused,
            ..Snapshot::of_world(&self.world)
        };
        snapshot.encode()
    }

    /// Restore an engine. A world-only snapshot resumes with
    /// `fallback_seed`.
    pub fn deserialize(data: &[u8], fallback_seed: u64) -> Result<Self, DeserializeError> {
        let snapshot = Snapshot::load(data)?;
        let rng = snapshot.rng.unwrap_or_else(|| SimRng::new(fallback_seed));
        let mut engine = Engine::with_rng(snapshot.world, rng);
        engine.paused = snapshot.paused;
        Ok(engine)
    }
}
