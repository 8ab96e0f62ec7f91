//! Movement resolver - probe-based sliding collision response for tanks.
//!
//! Each tank carries five collision probes: the four corners of the square
//! inscribed by its collision radius, in fixed scan order, plus its center.
//! A commanded displacement is applied provisionally; if any probe lands in
//! solid terrain the displacement is decomposed per axis, the obstructing
//! axis is reverted, and half of the surviving axis is kept so the tank
//! slides along walls instead of stopping dead.

use crate::collision::Layer;
use crate::components::*;
use crate::events::{EffectKind, Event, EventBus};
use crate::terrain::TerrainHandle;
use bevy_ecs::prelude::*;

/// Resource containing the delta time for the current tick.
#[derive(Resource, Default)]
pub struct DeltaTime(pub f32);

/// Probes sample slightly above the hull base so a tank standing exactly on
/// its own cell does not collide with it.
const PROBE_LIFT: f32 = 0.1;

/// Seconds between tread-mark emissions while moving.
const TREAD_PERIOD: f32 = 0.25;
/// Tread marks appear behind the hull, offset to both tracks.
const TREAD_BACK_OFFSET: f32 = 0.8;
const TREAD_SIDE_OFFSET: f32 = 0.35;

/// Displacements below this are treated as standing still.
const MIN_MOVE: f32 = 1e-4;

/// The five probe offsets for a given collision radius, in scan order:
/// four inscribed-square corners, then the center.
pub fn probe_offsets(radius: f32) -> [(f32, f32); 5] {
    let k = radius * std::f32::consts::FRAC_1_SQRT_2;
    [(-k, -k), (k, -k), (-k, k), (k, k), (0.0, 0.0)]
}

/// Index of the first probe (in scan order) that lands in solid terrain at
/// the given hull position, or `None` if all probes are clear.
fn first_blocked_probe(
    bus: &mut EventBus,
    world: &mut World,
    x: f32,
    y: f32,
    z: f32,
    offsets: &[(f32, f32); 5],
) -> Option<usize> {
    offsets.iter().position(|&(ox, oz)| {
        bus.query_point(world, x + ox, y, z + oz, Layer::LEVEL, None)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockedAxis {
    X,
    Z,
}

struct Mover {
    entity: Entity,
    pos: Position,
    heading: Heading,
    radius: f32,
    move_cost: f32,
    dx: f32,
    dz: f32,
    treads_elapsed: f32,
}

/// Resolve every tank's commanded displacement against the terrain, emit
/// the dust and tread-mark effect requests, and drain movement energy.
pub fn movement_system(world: &mut World, bus: &mut EventBus) {
    let dt = world.resource::<DeltaTime>().0;
    let terrain = world.resource::<TerrainHandle>().clone();

    // Gather phase: snapshot movers so the resolve loop can hold the world
    // mutably for bus queries.
    let movers: Vec<Mover> = {
        let mut query = world.query::<(
            Entity,
            &Position,
            &Heading,
            &TankStats,
            &MoveIntent,
            &TreadTimer,
            &Health,
        )>();
        query
            .iter(world)
            .filter(|(_, _, _, _, _, _, health)| health.is_alive())
            .map(|(entity, pos, heading, stats, intent, treads, _)| Mover {
                entity,
                pos: *pos,
                heading: *heading,
                radius: stats.radius,
                move_cost: stats.move_cost,
                dx: intent.dx,
                dz: intent.dz,
                treads_elapsed: treads.elapsed,
            })
            .collect()
    };

    for mover in movers {
        let Mover {
            entity,
            pos,
            heading,
            radius,
            move_cost,
            dx,
            dz,
            mut treads_elapsed,
        } = mover;

        let mut fdx = 0.0;
        let mut fdz = 0.0;
        if dx.abs() > MIN_MOVE || dz.abs() > MIN_MOVE {
            let (rdx, rdz) = resolve_slide(bus, world, entity, &pos, radius, dx, dz);
            fdx = rdx;
            fdz = rdz;
        }

        let new_x = pos.x + fdx;
        let new_z = pos.z + fdz;
        let new_y = terrain.surface_height(new_x, pos.y, new_z);
        let applied = (fdx * fdx + fdz * fdz).sqrt();

        // Tread marks while grounded and actively moving.
        let moving = applied > MIN_MOVE;
        if moving {
            treads_elapsed += dt;
            if treads_elapsed >= TREAD_PERIOD {
                treads_elapsed = 0.0;
                let (fx, fz) = heading.dir();
                let (px, pz) = heading.perp();
                for side in [-1.0, 1.0] {
                    bus.post(Event::VisualEffect {
                        kind: EffectKind::TreadMark,
                        x: new_x - fx * TREAD_BACK_OFFSET + px * TREAD_SIDE_OFFSET * side,
                        y: new_y,
                        z: new_z - fz * TREAD_BACK_OFFSET + pz * TREAD_SIDE_OFFSET * side,
                    });
                }
            }
        } else {
            treads_elapsed = 0.0;
        }

        if let Some(mut p) = world.get_mut::<Position>(entity) {
            p.x = new_x;
            p.y = new_y;
            p.z = new_z;
        }
        if let Some(mut energy) = world.get_mut::<Energy>(entity) {
            energy.drain(applied * move_cost * dt);
        }
        if let Some(mut treads) = world.get_mut::<TreadTimer>(entity) {
            treads.elapsed = treads_elapsed;
        }
        if let Some(mut intent) = world.get_mut::<MoveIntent>(entity) {
            *intent = MoveIntent::default();
        }
    }
}

/// The sliding algorithm. Returns the displacement that survived collision
/// resolution; emits a dust effect at the first colliding probe when the
/// full move was rejected.
fn resolve_slide(
    bus: &mut EventBus,
    world: &mut World,
    _entity: Entity,
    pos: &Position,
    radius: f32,
    dx: f32,
    dz: f32,
) -> (f32, f32) {
    let offsets = probe_offsets(radius);
    let y = pos.y + PROBE_LIFT;

    // Provisional full move.
    let Some(hit_probe) = first_blocked_probe(bus, world, pos.x + dx, y, pos.z + dz, &offsets)
    else {
        return (dx, dz);
    };

    // Dust at the colliding probe's world position.
    let (ox, oz) = offsets[hit_probe];
    bus.post(Event::VisualEffect {
        kind: EffectKind::Dust,
        x: pos.x + dx + ox,
        y: pos.y,
        z: pos.z + dz + oz,
    });

    // Single-axis isolation: which component causes the obstruction?
    let x_hit = first_blocked_probe(bus, world, pos.x + dx, y, pos.z, &offsets);
    let z_hit = first_blocked_probe(bus, world, pos.x, y, pos.z + dz, &offsets);

    let blocked = match (x_hit, z_hit) {
        (Some(_), None) => BlockedAxis::X,
        (None, Some(_)) => BlockedAxis::Z,
        // Both axes collide in isolation: restore the one whose obstruction
        // was detected first in probe scan order.
        (Some(xi), Some(zi)) => {
            if xi <= zi {
                BlockedAxis::X
            } else {
                BlockedAxis::Z
            }
        }
        // Pure corner clip: neither axis collides alone. Blame the axis the
        // terrain probe at the impact corner points at.
        (None, None) => {
            if bus.query_point(world, pos.x + dx + ox, y, pos.z + oz, Layer::LEVEL, None) {
                BlockedAxis::X
            } else {
                BlockedAxis::Z
            }
        }
    };

    // Revert the blocked axis, keep half of the survivor, and re-validate;
    // a still-colliding half move reverts entirely.
    let (cand_dx, cand_dz) = match blocked {
        BlockedAxis::X => (0.0, dz * 0.5),
        BlockedAxis::Z => (dx * 0.5, 0.0),
    };
    if first_blocked_probe(bus, world, pos.x + cand_dx, y, pos.z + cand_dz, &offsets).is_none() {
        (cand_dx, cand_dz)
    } else {
        (0.0, 0.0)
    }
}
