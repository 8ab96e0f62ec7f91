//! ECS Components for the arena combat simulation.
//!
//! Components are pure data containers attached to entities.
//! All game logic lives in the resolver passes that query these components.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

// ============================================================================
// SPATIAL COMPONENTS
// ============================================================================

/// 3D position in the arena (x = east/west, y = up, z = north/south).
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Full 3D distance to another position.
    pub fn distance_to(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Ground-plane distance, ignoring height.
    pub fn horizontal_distance_to(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Heading angle in radians. The forward direction is
/// `(sin(heading), cos(heading))` on the ground plane.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Heading(pub f32);

impl Heading {
    /// Unit forward vector (dx, dz) on the ground plane.
    pub fn dir(&self) -> (f32, f32) {
        (self.0.sin(), self.0.cos())
    }

    /// Unit vector perpendicular to the forward direction.
    pub fn perp(&self) -> (f32, f32) {
        (self.0.cos(), -self.0.sin())
    }
}

// ============================================================================
// IDENTITY COMPONENTS
// ============================================================================

/// Which side a unit fights for. Determines collision layer and whether
/// the combo scoring machinery applies to its kills.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Player,
    Enemy,
}

impl Default for Side {
    fn default() -> Self {
        Self::Player
    }
}

/// Index into the score board. Every unit gets a slot at spawn time;
/// slots outlive the unit for the rest of the session.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScoreSlot(pub usize);

// ============================================================================
// COMBAT COMPONENTS
// ============================================================================

/// Health of a unit.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Health {
    pub current: f32,
    pub max: f32,
}

impl Health {
    pub fn new(max: f32) -> Self {
        Self { current: max, max }
    }

    pub fn is_alive(&self) -> bool {
        self.current > 0.0
    }

    pub fn damage(&mut self, amount: f32) {
        self.current = (self.current - amount).max(0.0);
    }

    /// Heal, never exceeding the normal maximum.
    pub fn heal(&mut self, amount: f32) {
        self.current = (self.current + amount).min(self.max);
    }

    /// Heal up to `cap_multiplier * max`. Self-healing is allowed to
    /// over-charge past the normal maximum as a reward mechanic.
    pub fn heal_over(&mut self, amount: f32, cap_multiplier: f32) {
        self.current = (self.current + amount).min(self.max * cap_multiplier);
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new(100.0)
    }
}

/// Action resource drained by movement.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Energy {
    pub current: f32,
    pub max: f32,
}

impl Energy {
    pub fn new(max: f32) -> Self {
        Self { current: max, max }
    }

    pub fn drain(&mut self, amount: f32) {
        self.current = (self.current - amount).max(0.0);
    }
}

impl Default for Energy {
    fn default() -> Self {
        Self::new(100.0)
    }
}

/// Static per-tank tuning values.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TankStats {
    /// Collision radius; also sizes the movement probe square.
    pub radius: f32,
    /// Base movement speed in units per second.
    pub move_speed: f32,
    /// Energy drained per unit of displacement per second.
    pub move_cost: f32,
}

impl Default for TankStats {
    fn default() -> Self {
        Self {
            radius: 0.8,
            move_speed: 6.0,
            move_cost: 0.5,
        }
    }
}

// ============================================================================
// PROJECTILE ARCHETYPES
// ============================================================================

/// Projectile archetype. Tanks carry a (primary, secondary) pair; pickups
/// mutate it, and the pair selects ballistic stats and bounce behavior.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShotType {
    Standard,
    Rapid,
    Heavy,
    Spread,
    Mine,
    Fork,
    Chain,
    Heal,
}

impl Default for ShotType {
    fn default() -> Self {
        Self::Standard
    }
}

/// The archetype pair a tank is currently armed with.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Armed {
    pub primary: ShotType,
    pub secondary: ShotType,
}

impl Armed {
    pub fn new(primary: ShotType, secondary: ShotType) -> Self {
        Self { primary, secondary }
    }
}

/// Lifecycle state of a projectile. Terminal outcomes are resolved within
/// the same frame they are detected and collapse to `Dead`; dead projectiles
/// are swept from the world on the next cleanup pass.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectileState {
    Flying,
    Dead,
}

/// A projectile in flight. Not serialized directly; snapshots carry their
/// own projectile view.
#[derive(Component, Debug, Clone, Copy)]
pub struct Projectile {
    /// The unit that fired this projectile.
    pub owner: Entity,
    /// Score slot of the owner, if it had one at fire time.
    pub owner_slot: Option<usize>,
    /// Side of the owner at fire time.
    pub owner_side: Side,
    pub primary: ShotType,
    pub secondary: ShotType,
    /// Elapsed flight time in seconds.
    pub age: f32,
    /// Lifetime cap; exceeding it times the projectile out.
    pub max_age: f32,
    pub bounces: u32,
    pub max_bounces: u32,
    /// Damage applied on entity hit. Only escalates through bounce rules.
    pub power: f32,
    pub speed: f32,
    /// Continuous heading drift in radians per second.
    pub spin: f32,
    pub state: ProjectileState,
}

impl Projectile {
    pub fn is_flying(&self) -> bool {
        self.state == ProjectileState::Flying
    }
}

// ============================================================================
// MOVEMENT COMPONENTS
// ============================================================================

/// Commanded ground displacement for the current frame. Set by the client,
/// consumed (and cleared) by the movement resolver.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MoveIntent {
    pub dx: f32,
    pub dz: f32,
}

impl MoveIntent {
    pub fn is_zero(&self) -> bool {
        self.dx == 0.0 && self.dz == 0.0
    }

    pub fn magnitude(&self) -> f32 {
        (self.dx * self.dx + self.dz * self.dz).sqrt()
    }
}

/// Timer driving periodic tread-mark effects while a tank is moving.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TreadTimer {
    pub elapsed: f32,
}

// ============================================================================
// PICKUPS
// ============================================================================

/// A collectible that rearms the collecting tank with a new archetype pair.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pickup {
    pub primary: ShotType,
    pub secondary: ShotType,
}

// ============================================================================
// BUNDLE HELPERS
// ============================================================================

/// Bundle for spawning a complete tank entity.
#[derive(Bundle)]
pub struct TankBundle {
    pub side: Side,
    pub slot: ScoreSlot,
    pub position: Position,
    pub heading: Heading,
    pub health: Health,
    pub energy: Energy,
    pub stats: TankStats,
    pub armed: Armed,
    pub intent: MoveIntent,
    pub treads: TreadTimer,
}

impl TankBundle {
    pub fn new(side: Side, slot: usize, x: f32, y: f32, z: f32) -> Self {
        Self {
            side,
            slot: ScoreSlot(slot),
            position: Position::new(x, y, z),
            heading: Heading::default(),
            health: Health::default(),
            energy: Energy::default(),
            stats: TankStats::default(),
            armed: Armed::default(),
            intent: MoveIntent::default(),
            treads: TreadTimer::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heal_over_allows_overcharge() {
        let mut health = Health::new(100.0);
        health.damage(10.0);
        health.heal_over(500.0, 2.0);
        assert_eq!(health.current, 200.0);
    }

    #[test]
    fn test_heal_caps_at_max() {
        let mut health = Health::new(100.0);
        health.damage(10.0);
        health.heal(500.0);
        assert_eq!(health.current, 100.0);
    }

    #[test]
    fn test_damage_floors_at_zero() {
        let mut health = Health::new(50.0);
        health.damage(75.0);
        assert_eq!(health.current, 0.0);
        assert!(!health.is_alive());
    }

    #[test]
    fn test_heading_mirror_identities() {
        use std::f32::consts::PI;
        let h = Heading(0.7);
        let (dx, dz) = h.dir();
        // Negated heading mirrors the x component.
        let (mx, mz) = Heading(-h.0).dir();
        assert!((mx + dx).abs() < 1e-6);
        assert!((mz - dz).abs() < 1e-6);
        // PI - heading mirrors the z component.
        let (px, pz) = Heading(PI - h.0).dir();
        assert!((px - dx).abs() < 1e-6);
        assert!((pz + dz).abs() < 1e-6);
    }
}
