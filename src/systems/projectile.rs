//! Projectile trajectory and bounce state machine.
//!
//! Each flying projectile integrates forward once per tick, then runs a
//! fixed detection ladder: level geometry, unit bodies at the new position,
//! unit bodies at the half-step midpoint, world bounds, lifetime. Outcomes
//! are detected while scanning a snapshot and applied afterwards; reactions
//! (damage, scoring) travel through the deferred event queue.

use crate::collision::{CollisionDirectory, CollisionShape, Layer};
use crate::components::*;
use crate::events::{
    EffectKind, Event, EventBus, ImpactAxis, ShotSnapshot, SoundKind,
};
use crate::systems::movement::DeltaTime;
use bevy_ecs::prelude::*;

/// Interaction radius for projectile-vs-unit sphere tests.
pub const HIT_RADIUS: f32 = 0.5;
/// Seconds before a projectile may collide with its own owner.
pub const SELF_HIT_GRACE: f32 = 0.5;
/// Muzzle distance in front of the firing tank.
const MUZZLE_OFFSET: f32 = 1.2;
/// Projectiles fly at hull height above the owner's feet.
const MUZZLE_HEIGHT: f32 = 0.5;
/// Flat power gain when a chain shot passes through a target.
pub const CHAIN_POWER_BONUS: f32 = 2.0;

// ============================================================================
// ARCHETYPE TABLE
// ============================================================================

/// Ballistic stats for a primary archetype. The secondary half of the pair
/// only influences bounce spawning, see [`bounce_spawn`].
#[derive(Debug, Clone, Copy)]
pub struct ArchetypeSpec {
    pub speed: f32,
    pub spin: f32,
    pub max_age: f32,
    pub max_bounces: u32,
    pub power: f32,
    /// One-time power multiplier applied on the first bounce.
    pub first_bounce_mult: f32,
}

impl ArchetypeSpec {
    pub fn of(primary: ShotType) -> Self {
        match primary {
            ShotType::Standard => Self {
                speed: 14.0,
                spin: 0.0,
                max_age: 20.0,
                max_bounces: 2,
                power: 10.0,
                first_bounce_mult: 1.5,
            },
            ShotType::Rapid => Self {
                speed: 20.0,
                spin: 0.0,
                max_age: 10.0,
                max_bounces: 1,
                power: 6.0,
                first_bounce_mult: 1.25,
            },
            ShotType::Heavy => Self {
                speed: 9.0,
                spin: 0.0,
                max_age: 25.0,
                max_bounces: 3,
                power: 20.0,
                first_bounce_mult: 2.0,
            },
            ShotType::Spread => Self {
                speed: 12.0,
                spin: 0.0,
                max_age: 12.0,
                max_bounces: 1,
                power: 7.0,
                first_bounce_mult: 1.5,
            },
            ShotType::Mine => Self {
                speed: 6.0,
                spin: 2.5,
                max_age: 30.0,
                max_bounces: 2,
                power: 15.0,
                first_bounce_mult: 1.0,
            },
            ShotType::Fork => Self {
                speed: 13.0,
                spin: 0.0,
                max_age: 15.0,
                max_bounces: 2,
                power: 9.0,
                first_bounce_mult: 1.5,
            },
            ShotType::Chain => Self {
                speed: 16.0,
                spin: 0.8,
                max_age: 18.0,
                max_bounces: 4,
                power: 8.0,
                first_bounce_mult: 1.25,
            },
            ShotType::Heal => Self {
                speed: 12.0,
                spin: 0.0,
                max_age: 15.0,
                max_bounces: 1,
                power: 12.0,
                first_bounce_mult: 1.0,
            },
        }
    }
}

/// First-bounce power multiplier keyed by the full archetype pair. A few
/// pairs override the primary's baseline; everything else falls through to
/// `ArchetypeSpec::of(primary)`.
pub fn first_bounce_mult(primary: ShotType, secondary: ShotType) -> f32 {
    match (primary, secondary) {
        (ShotType::Standard, ShotType::Heavy) => 1.75,
        (ShotType::Rapid, ShotType::Rapid) => 1.5,
        (ShotType::Heavy, ShotType::Chain) => 2.25,
        _ => ArchetypeSpec::of(primary).first_bounce_mult,
    }
}

/// Volley pattern spawned when a bounce-spawning archetype pair strikes
/// level geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BounceSpawn {
    /// `count` shots fanned across `spread` radians around the rebound
    /// heading.
    Fan { count: u32, spread: f32 },
    /// `count` slow shots evenly distributed around the impact point.
    Cluster { count: u32 },
    /// `count` shots split symmetrically off the rebound heading.
    Fork { count: u32 },
}

/// Bounce-spawn table keyed by the full archetype pair. A pair absent from
/// the table spawns nothing. Each qualifying bounce issues exactly one
/// volley.
pub fn bounce_spawn(primary: ShotType, secondary: ShotType) -> Option<BounceSpawn> {
    match (primary, secondary) {
        (ShotType::Spread, ShotType::Spread) => Some(BounceSpawn::Fan {
            count: 5,
            spread: 0.6,
        }),
        (ShotType::Spread, _) => Some(BounceSpawn::Fan {
            count: 3,
            spread: 0.35,
        }),
        (ShotType::Mine, _) => Some(BounceSpawn::Cluster { count: 2 }),
        (ShotType::Fork, _) | (_, ShotType::Fork) => Some(BounceSpawn::Fork { count: 2 }),
        _ => None,
    }
}

// ============================================================================
// FIRING
// ============================================================================

/// Spawn a projectile from a unit's current position and heading, register
/// it in the collision directory, and return its entity. Non-finite shooter
/// state is rejected before any entity is constructed.
pub fn fire_projectile(world: &mut World, shooter: Entity) -> Option<Entity> {
    let (pos, heading, armed, side, slot) = {
        let pos = *world.get::<Position>(shooter)?;
        let heading = *world.get::<Heading>(shooter)?;
        let armed = *world.get::<Armed>(shooter)?;
        let side = *world.get::<Side>(shooter)?;
        let slot = world.get::<ScoreSlot>(shooter).map(|s| s.0);
        (pos, heading, armed, side, slot)
    };
    if let Some(health) = world.get::<Health>(shooter) {
        if !health.is_alive() {
            return None;
        }
    }
    if !pos.is_finite() || !heading.0.is_finite() {
        log::warn!(
            "rejecting fire from {:?}: non-finite position or heading",
            shooter
        );
        return None;
    }

    let spec = ArchetypeSpec::of(armed.primary);
    let (fx, fz) = heading.dir();
    let projectile = Projectile {
        owner: shooter,
        owner_slot: slot,
        owner_side: side,
        primary: armed.primary,
        secondary: armed.secondary,
        age: 0.0,
        max_age: spec.max_age,
        bounces: 0,
        max_bounces: spec.max_bounces,
        power: spec.power,
        speed: spec.speed,
        spin: spec.spin,
        state: ProjectileState::Flying,
    };
    let entity = world
        .spawn((
            projectile,
            Position::new(
                pos.x + fx * MUZZLE_OFFSET,
                pos.y + MUZZLE_HEIGHT,
                pos.z + fz * MUZZLE_OFFSET,
            ),
            heading,
        ))
        .id();

    let mut dir = world.resource_mut::<CollisionDirectory>();
    dir.register(
        entity,
        CollisionShape::Sphere { radius: HIT_RADIUS },
        Layer::PROJECTILES,
    );
    Some(entity)
}

// ============================================================================
// PER-TICK STATE MACHINE
// ============================================================================

struct ShotUpdate {
    entity: Entity,
    pos: Position,
    heading: Heading,
    proj: Projectile,
}

struct VolleyShot {
    proj: Projectile,
    pos: Position,
    heading: Heading,
}

/// Advance every flying projectile one tick and resolve collision outcomes.
pub fn projectile_system(world: &mut World, bus: &mut EventBus) {
    let dt = world.resource::<DeltaTime>().0;

    let shots: Vec<(Entity, Projectile, Position, Heading)> = {
        let mut query = world.query::<(Entity, &Projectile, &Position, &Heading)>();
        query
            .iter(world)
            .filter(|(_, proj, _, _)| proj.is_flying())
            .map(|(entity, proj, pos, heading)| (entity, *proj, *pos, *heading))
            .collect()
    };

    let mut updates: Vec<ShotUpdate> = Vec::with_capacity(shots.len());
    let mut volleys: Vec<VolleyShot> = Vec::new();

    for (entity, mut proj, old_pos, old_heading) in shots {
        let mut heading = Heading(old_heading.0 + proj.spin * dt);
        let (fx, fz) = heading.dir();
        let step = proj.speed * dt;
        let mut pos = Position::new(
            old_pos.x + fx * step,
            old_pos.y,
            old_pos.z + fz * step,
        );
        proj.age += dt;

        let snapshot = ShotSnapshot {
            owner: proj.owner,
            owner_slot: proj.owner_slot,
            owner_side: proj.owner_side,
            primary: proj.primary,
            secondary: proj.secondary,
            power: proj.power,
            age: proj.age,
            bounces: proj.bounces,
            x: pos.x,
            y: pos.y,
            z: pos.z,
        };

        // 1. Level geometry takes priority over soft bodies. Out-of-rect
        // points read as solid under the fail-closed terrain rule, so the
        // bounds test owns them instead.
        let in_bounds = bus.query_bounds(world, pos.x, pos.z);
        if in_bounds && bus.query_point(world, pos.x, pos.y, pos.z, Layer::LEVEL, None) {
            let axis = classify_impact(bus, world, &old_pos, &pos);
            // Revert this frame's displacement. Impact outcomes report the
            // surface position, not the point inside the wall.
            pos = old_pos;
            let snapshot = ShotSnapshot {
                x: pos.x,
                y: pos.y,
                z: pos.z,
                ..snapshot
            };

            if proj.bounces < proj.max_bounces {
                heading = mirror_heading(heading, axis);
                if proj.bounces == 0 {
                    proj.power *= first_bounce_mult(proj.primary, proj.secondary);
                }
                if let Some(pattern) = bounce_spawn(proj.primary, proj.secondary) {
                    volleys.extend(build_volley(pattern, &proj, &pos, heading));
                }
                proj.bounces += 1;
                bus.post(Event::LevelCollision {
                    shot: snapshot,
                    axis,
                    final_bounce: false,
                });
                bus.post(Event::Sound {
                    kind: SoundKind::Bounce,
                });
            } else {
                proj.state = ProjectileState::Dead;
                bus.post(Event::LevelCollision {
                    shot: snapshot,
                    axis,
                    final_bounce: true,
                });
                bus.post(Event::VisualEffect {
                    kind: EffectKind::Ricochet { axis },
                    x: snapshot.x,
                    y: snapshot.y,
                    z: snapshot.z,
                });
                bus.post(Event::Sound {
                    kind: SoundKind::Impact,
                });
            }
            updates.push(ShotUpdate {
                entity,
                pos,
                heading,
                proj,
            });
            continue;
        }

        // 2-3. Unit bodies at the new position, then at the half-step
        // midpoint to catch tunneling. First qualifying match wins.
        let target = find_target(bus, world, &proj, pos.x, pos.y, pos.z).or_else(|| {
            let mx = (old_pos.x + pos.x) * 0.5;
            let mz = (old_pos.z + pos.z) * 0.5;
            find_target(bus, world, &proj, mx, pos.y, mz)
        });
        if let Some(target) = target {
            bus.post(Event::EntityCollision {
                target,
                shot: snapshot,
            });
            if proj.primary == ShotType::Chain {
                // Chain shots pass through and keep flying, harder.
                proj.power += CHAIN_POWER_BONUS;
            } else {
                proj.state = ProjectileState::Dead;
                bus.post(Event::VisualEffect {
                    kind: EffectKind::Explosion,
                    x: snapshot.x,
                    y: snapshot.y,
                    z: snapshot.z,
                });
                bus.post(Event::Sound {
                    kind: SoundKind::Explosion,
                });
            }
            updates.push(ShotUpdate {
                entity,
                pos,
                heading,
                proj,
            });
            continue;
        }

        // 4. World bounds.
        if !in_bounds {
            proj.state = ProjectileState::Dead;
            bus.post(Event::OutOfBounds { shot: snapshot });
        // 5. Lifetime.
        } else if proj.age > proj.max_age {
            proj.state = ProjectileState::Dead;
            bus.post(Event::Timeout { shot: snapshot });
        }

        updates.push(ShotUpdate {
            entity,
            pos,
            heading,
            proj,
        });
    }

    // Apply phase: write back integrated state, then spawn bounce volleys.
    for update in updates {
        if let Some(mut pos) = world.get_mut::<Position>(update.entity) {
            *pos = update.pos;
        }
        if let Some(mut heading) = world.get_mut::<Heading>(update.entity) {
            *heading = update.heading;
        }
        if let Some(mut proj) = world.get_mut::<Projectile>(update.entity) {
            *proj = update.proj;
        }
    }
    world.resource_scope(|world, mut dir: Mut<CollisionDirectory>| {
        for shot in volleys {
            let entity = world.spawn((shot.proj, shot.pos, shot.heading)).id();
            dir.register(
                entity,
                CollisionShape::Sphere { radius: HIT_RADIUS },
                Layer::PROJECTILES,
            );
        }
    });
}

/// First unit the projectile may legally hit at the given point, in
/// directory registration order. Hits against the owner only count past the
/// grace period.
fn find_target(
    bus: &mut EventBus,
    world: &mut World,
    proj: &Projectile,
    x: f32,
    y: f32,
    z: f32,
) -> Option<Entity> {
    bus.query_sphere(world, x, y, z, HIT_RADIUS, Layer::ALL_UNITS, None)
        .into_iter()
        .find(|&hit| hit != proj.owner || proj.age > SELF_HIT_GRACE)
}

/// Single-axis isolation against the terrain, mirroring the movement
/// resolver's classification. The full reversal is reserved for impacts
/// blocked on both axes; a pure corner clip (neither axis collides alone)
/// is attributed to one face by a terrain probe, so the shot deflects
/// instead of coming straight back.
fn classify_impact(
    bus: &mut EventBus,
    world: &mut World,
    old: &Position,
    new: &Position,
) -> ImpactAxis {
    let x_hit = bus.query_point(world, new.x, new.y, old.z, Layer::LEVEL, None);
    let z_hit = bus.query_point(world, old.x, new.y, new.z, Layer::LEVEL, None);
    match (x_hit, z_hit) {
        (true, false) => ImpactAxis::X,
        (false, true) => ImpactAxis::Z,
        (true, true) => ImpactAxis::Corner,
        (false, false) => {
            let mid_z = (old.z + new.z) * 0.5;
            if bus.query_point(world, new.x, new.y, mid_z, Layer::LEVEL, None) {
                ImpactAxis::X
            } else {
                ImpactAxis::Z
            }
        }
    }
}

fn mirror_heading(heading: Heading, axis: ImpactAxis) -> Heading {
    use std::f32::consts::PI;
    match axis {
        ImpactAxis::X => Heading(-heading.0),
        ImpactAxis::Z => Heading(PI - heading.0),
        ImpactAxis::Corner => Heading(heading.0 + PI),
    }
}

fn build_volley(
    pattern: BounceSpawn,
    parent: &Projectile,
    pos: &Position,
    heading: Heading,
) -> Vec<VolleyShot> {
    use std::f32::consts::PI;

    let child_type = parent.secondary;
    let spec = ArchetypeSpec::of(child_type);
    let headings: Vec<f32> = match pattern {
        BounceSpawn::Fan { count, spread } => (0..count)
            .map(|i| {
                let t = if count > 1 {
                    i as f32 / (count - 1) as f32
                } else {
                    0.5
                };
                heading.0 - spread + 2.0 * spread * t
            })
            .collect(),
        BounceSpawn::Cluster { count } => (0..count)
            .map(|i| heading.0 + i as f32 * 2.0 * PI / count as f32)
            .collect(),
        BounceSpawn::Fork { count } => (0..count)
            .map(|i| {
                let side = if i % 2 == 0 { 1.0 } else { -1.0 };
                heading.0 + side * PI / 4.0 * (1 + i / 2) as f32
            })
            .collect(),
    };

    headings
        .into_iter()
        .map(|angle| VolleyShot {
            proj: Projectile {
                owner: parent.owner,
                owner_slot: parent.owner_slot,
                owner_side: parent.owner_side,
                primary: child_type,
                secondary: child_type,
                age: 0.0,
                max_age: spec.max_age,
                // Children never re-spawn, keeping volley growth bounded.
                bounces: spec.max_bounces,
                max_bounces: spec.max_bounces,
                power: spec.power,
                speed: spec.speed,
                spin: spec.spin,
                state: ProjectileState::Flying,
            },
            pos: *pos,
            heading: Heading(angle),
        })
        .collect()
}
