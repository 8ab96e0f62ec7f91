//! Entity collision directory and collision layers.
//!
//! The directory is a registry of live entities, each tagged with a
//! simplified collision shape and a layer bitmask. It answers point and
//! sphere queries filtered by layer, delegating terrain checks to the
//! height field. Entries cache the last-known position; the cache is
//! advisory and refreshed once per frame - the entity itself remains the
//! source of truth.

use crate::components::{Health, Position, Projectile};
use crate::terrain::TerrainHandle;
use bevy_ecs::prelude::*;
use std::collections::HashMap;
use std::ops::{BitAnd, BitOr, BitOrAssign};

// ============================================================================
// COLLISION LAYERS
// ============================================================================

/// Collision layer bitmask. A query matches an entry when the bitwise AND of
/// query mask and entry layer is non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Layer(pub u32);

impl Layer {
    pub const NONE: Layer = Layer(0);
    pub const LEVEL: Layer = Layer(1 << 0);
    pub const PLAYER_UNITS: Layer = Layer(1 << 1);
    pub const ENEMY_UNITS: Layer = Layer(1 << 2);
    pub const PROJECTILES: Layer = Layer(1 << 3);
    pub const PICKUPS: Layer = Layer(1 << 4);
    pub const ALL_UNITS: Layer = Layer(Self::PLAYER_UNITS.0 | Self::ENEMY_UNITS.0);
    pub const ALL: Layer = Layer(u32::MAX);

    pub fn intersects(&self, other: Layer) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for Layer {
    type Output = Layer;
    fn bitor(self, rhs: Layer) -> Layer {
        Layer(self.0 | rhs.0)
    }
}

impl BitOrAssign for Layer {
    fn bitor_assign(&mut self, rhs: Layer) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Layer {
    type Output = Layer;
    fn bitand(self, rhs: Layer) -> Layer {
        Layer(self.0 & rhs.0)
    }
}

// ============================================================================
// SHAPES
// ============================================================================

/// Vertical half-extent of the containment band for unit-shaped entries.
const UNIT_BAND: f32 = 1.0;

/// Tolerance for point-vs-point containment.
const POINT_EPSILON: f32 = 1e-3;

/// Simplified collision shape registered with the directory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CollisionShape {
    Point,
    Sphere { radius: f32 },
    /// Tank body: horizontal radius threshold plus a small vertical band,
    /// rather than a true sphere.
    Unit { radius: f32 },
}

impl CollisionShape {
    pub fn radius(&self) -> f32 {
        match self {
            CollisionShape::Point => 0.0,
            CollisionShape::Sphere { radius } | CollisionShape::Unit { radius } => *radius,
        }
    }

    /// Whether a query point at `(x, y, z)` falls inside this shape centered
    /// at `(cx, cy, cz)`.
    fn contains(&self, cx: f32, cy: f32, cz: f32, x: f32, y: f32, z: f32) -> bool {
        let dx = x - cx;
        let dy = y - cy;
        let dz = z - cz;
        match self {
            CollisionShape::Point => dx.abs() < POINT_EPSILON
                && dy.abs() < POINT_EPSILON
                && dz.abs() < POINT_EPSILON,
            CollisionShape::Sphere { radius } => dx * dx + dy * dy + dz * dz < radius * radius,
            CollisionShape::Unit { radius } => {
                dx * dx + dz * dz < radius * radius && dy.abs() <= UNIT_BAND
            }
        }
    }
}

// ============================================================================
// DIRECTORY
// ============================================================================

/// One registered entity. At most one entry exists per entity.
#[derive(Debug, Clone)]
pub struct CollisionEntry {
    pub entity: Entity,
    pub shape: CollisionShape,
    pub layer: Layer,
    /// Last-known position, refreshed each frame. May be stale between
    /// frames; acceptable because queries are advisory.
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub alive: bool,
}

/// Registry of collidable entities. Entries are kept in registration order
/// so linear scans (and "first match wins" semantics) are deterministic.
#[derive(Resource, Debug, Default)]
pub struct CollisionDirectory {
    entries: Vec<CollisionEntry>,
    index: HashMap<Entity, usize>,
}

impl CollisionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity. Re-registering replaces the existing entry in
    /// place, so there is never more than one entry per entity.
    pub fn register(&mut self, entity: Entity, shape: CollisionShape, layer: Layer) {
        match self.index.get(&entity) {
            Some(&i) => {
                self.entries[i].shape = shape;
                self.entries[i].layer = layer;
            }
            None => {
                self.index.insert(entity, self.entries.len());
                self.entries.push(CollisionEntry {
                    entity,
                    shape,
                    layer,
                    x: 0.0,
                    y: 0.0,
                    z: 0.0,
                    alive: true,
                });
            }
        }
    }

    /// Remove an entity's entry. Removing twice is a no-op.
    pub fn unregister(&mut self, entity: Entity) {
        if let Some(i) = self.index.remove(&entity) {
            self.entries.remove(i);
            for slot in self.index.values_mut() {
                if *slot > i {
                    *slot -= 1;
                }
            }
        }
    }

    /// Replace the shape of an already-registered entity.
    pub fn update_shape(&mut self, entity: Entity, shape: CollisionShape) {
        if let Some(&i) = self.index.get(&entity) {
            self.entries[i].shape = shape;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.index.contains_key(&entity)
    }

    /// True if the point hits level geometry (when the mask includes LEVEL)
    /// or any matching registered entry. Read-only on directory state.
    pub fn check_point(
        &self,
        terrain: &TerrainHandle,
        x: f32,
        y: f32,
        z: f32,
        mask: Layer,
        exclude: Option<Entity>,
    ) -> bool {
        if mask.intersects(Layer::LEVEL) && terrain.is_solid_at(x, y, z) {
            return true;
        }
        self.entries.iter().any(|e| {
            e.alive
                && e.layer.intersects(mask)
                && Some(e.entity) != exclude
                && e.shape.contains(e.x, e.y, e.z, x, y, z)
        })
    }

    /// All alive, matching, non-excluded entries whose shape radius plus the
    /// query radius exceeds the center distance. Registration order.
    pub fn check_sphere(
        &self,
        x: f32,
        y: f32,
        z: f32,
        radius: f32,
        mask: Layer,
        exclude: Option<Entity>,
    ) -> Vec<Entity> {
        self.entries
            .iter()
            .filter(|e| {
                if !e.alive || !e.layer.intersects(mask) || Some(e.entity) == exclude {
                    return false;
                }
                let dx = e.x - x;
                let dy = e.y - y;
                let dz = e.z - z;
                let dist = (dx * dx + dy * dy + dz * dz).sqrt();
                dist < e.shape.radius() + radius
            })
            .map(|e| e.entity)
            .collect()
    }
}

/// Per-frame cache refresh: copy live positions into the directory and mark
/// entries whose entity died or despawned as not alive. Runs before any
/// resolver pass queries the directory.
pub fn refresh_directory(world: &mut World) {
    world.resource_scope(|world, mut dir: Mut<CollisionDirectory>| {
        for entry in dir.entries.iter_mut() {
            match world.get::<Position>(entry.entity) {
                Some(pos) => {
                    entry.x = pos.x;
                    entry.y = pos.y;
                    entry.z = pos.z;
                    let health_alive = world
                        .get::<Health>(entry.entity)
                        .map(|h| h.is_alive())
                        .unwrap_or(true);
                    let shot_alive = world
                        .get::<Projectile>(entry.entity)
                        .map(|p| p.is_flying())
                        .unwrap_or(true);
                    entry.alive = health_alive && shot_alive;
                }
                None => entry.alive = false,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::HeightField;

    fn flat_terrain() -> TerrainHandle {
        TerrainHandle::new(HeightField::new(32, 32))
    }

    #[test]
    fn test_layer_masks() {
        assert!(Layer::ALL_UNITS.intersects(Layer::PLAYER_UNITS));
        assert!(Layer::ALL_UNITS.intersects(Layer::ENEMY_UNITS));
        assert!(!Layer::ALL_UNITS.intersects(Layer::PROJECTILES));
        assert!(Layer::ALL.intersects(Layer::PICKUPS));
        assert!(!Layer::NONE.intersects(Layer::ALL));
        assert_eq!(Layer::PLAYER_UNITS | Layer::ENEMY_UNITS, Layer::ALL_UNITS);
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut dir = CollisionDirectory::new();
        let e = Entity::from_raw(1);
        dir.register(e, CollisionShape::Unit { radius: 1.0 }, Layer::PLAYER_UNITS);
        dir.register(e, CollisionShape::Sphere { radius: 2.0 }, Layer::PLAYER_UNITS);
        assert_eq!(dir.len(), 1);

        dir.unregister(e);
        assert_eq!(dir.len(), 0);
        dir.unregister(e);
        assert_eq!(dir.len(), 0);
    }

    #[test]
    fn test_unregister_keeps_index_consistent() {
        let mut dir = CollisionDirectory::new();
        let a = Entity::from_raw(1);
        let b = Entity::from_raw(2);
        let c = Entity::from_raw(3);
        for e in [a, b, c] {
            dir.register(e, CollisionShape::Point, Layer::PROJECTILES);
        }
        dir.unregister(a);
        assert!(!dir.contains(a));
        assert!(dir.contains(b));
        assert!(dir.contains(c));
        dir.update_shape(c, CollisionShape::Sphere { radius: 4.0 });
        assert_eq!(dir.len(), 2);
    }

    #[test]
    fn test_check_point_level_delegation() {
        let dir = CollisionDirectory::new();
        let terrain = flat_terrain();
        // Outside the grid: fail-closed solid.
        assert!(dir.check_point(&terrain, -5.0, 0.0, 2.0, Layer::LEVEL, None));
        // Inside flat grid at y=0.5: clear.
        assert!(!dir.check_point(&terrain, 2.0, 0.5, 2.0, Layer::LEVEL, None));
        // Without LEVEL in the mask the terrain is not consulted.
        assert!(!dir.check_point(&terrain, -5.0, 0.0, 2.0, Layer::ALL_UNITS, None));
    }

    #[test]
    fn test_check_point_unit_band() {
        let mut dir = CollisionDirectory::new();
        let terrain = flat_terrain();
        let e = Entity::from_raw(1);
        dir.register(e, CollisionShape::Unit { radius: 1.0 }, Layer::ENEMY_UNITS);
        dir.entries[0].x = 10.0;
        dir.entries[0].y = 0.0;
        dir.entries[0].z = 10.0;

        let mask = Layer::ALL_UNITS;
        assert!(dir.check_point(&terrain, 10.5, 0.5, 10.0, mask, None));
        // Outside the vertical band.
        assert!(!dir.check_point(&terrain, 10.5, 3.0, 10.0, mask, None));
        // Outside the horizontal radius.
        assert!(!dir.check_point(&terrain, 12.0, 0.0, 10.0, mask, None));
        // Excluded entity never matches.
        assert!(!dir.check_point(&terrain, 10.5, 0.5, 10.0, mask, Some(e)));
    }

    #[test]
    fn test_check_sphere_radius_sum_and_order() {
        let mut dir = CollisionDirectory::new();
        let a = Entity::from_raw(1);
        let b = Entity::from_raw(2);
        let far = Entity::from_raw(3);
        dir.register(a, CollisionShape::Unit { radius: 1.0 }, Layer::PLAYER_UNITS);
        dir.register(b, CollisionShape::Unit { radius: 1.0 }, Layer::ENEMY_UNITS);
        dir.register(far, CollisionShape::Unit { radius: 1.0 }, Layer::ENEMY_UNITS);
        dir.entries[0].x = 5.0;
        dir.entries[1].x = 6.0;
        dir.entries[2].x = 30.0;

        let hits = dir.check_sphere(5.0, 0.0, 0.0, 0.5, Layer::ALL_UNITS, None);
        // Registration order, far entity not reached by radius sum.
        assert_eq!(hits, vec![a, b]);

        let hits = dir.check_sphere(5.0, 0.0, 0.0, 0.5, Layer::ENEMY_UNITS, None);
        assert_eq!(hits, vec![b]);

        let hits = dir.check_sphere(5.0, 0.0, 0.0, 0.5, Layer::ALL_UNITS, Some(a));
        assert_eq!(hits, vec![b]);
    }

    #[test]
    fn test_refresh_tracks_positions_and_death() {
        let mut world = World::new();
        world.insert_resource(CollisionDirectory::new());

        let alive = world
            .spawn((Position::new(1.0, 0.0, 2.0), Health::new(100.0)))
            .id();
        let dead = world
            .spawn((Position::new(3.0, 0.0, 4.0), Health { current: 0.0, max: 100.0 }))
            .id();

        {
            let mut dir = world.resource_mut::<CollisionDirectory>();
            dir.register(alive, CollisionShape::Unit { radius: 1.0 }, Layer::PLAYER_UNITS);
            dir.register(dead, CollisionShape::Unit { radius: 1.0 }, Layer::ENEMY_UNITS);
        }

        refresh_directory(&mut world);

        let dir = world.resource::<CollisionDirectory>();
        let hits = dir.check_sphere(1.0, 0.0, 2.0, 0.5, Layer::ALL_UNITS, None);
        assert_eq!(hits, vec![alive]);
        // Dead entry is filtered out even though it overlaps.
        let hits = dir.check_sphere(3.0, 0.0, 4.0, 0.5, Layer::ALL_UNITS, None);
        assert!(hits.is_empty());
    }
}
