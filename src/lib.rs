//! Arena tank combat - collision and combat resolution core.
//!
//! A deterministic, fixed-timestep ECS simulation of an arena shooter:
//! height-field terrain collision, probe-based sliding movement, bouncing
//! projectiles and event-driven damage/combo scoring. Uses `bevy_ecs` for
//! the entity-component-system architecture; presentation layers consume
//! serialized snapshots and never see the world directly.

pub mod api;
pub mod collision;
pub mod components;
pub mod events;
pub mod level;
pub mod systems;
pub mod terrain;
pub mod world;

pub use api::{ArenaConfig, ArenaWorld};
pub use collision::{CollisionDirectory, CollisionEntry, CollisionShape, Layer};
pub use components::*;
pub use events::{Event, EventBus, EventCtx, EventKind, FrameEffects, ShotSnapshot};
pub use level::{parse_level, EnemySpawn, LevelData, LevelError, LEVEL_SIZE};
pub use systems::*;
pub use terrain::{HeightField, TerrainHandle, OUT_OF_RANGE_HEIGHT};
pub use world::Snapshot;
