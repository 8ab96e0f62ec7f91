//! Pickup collection: tanks driving over a pickup swap to its archetype
//! pair.

use crate::collision::{CollisionDirectory, Layer};
use crate::components::{Armed, Health, Pickup, Position, TankStats};
use crate::events::{EffectKind, Event, EventBus, SoundKind};
use bevy_ecs::prelude::*;
use std::collections::HashSet;

/// Collection distance around the tank hull.
const COLLECT_MARGIN: f32 = 0.4;

pub fn pickup_system(world: &mut World, bus: &mut EventBus) {
    let collectors: Vec<(Entity, Position, f32)> = {
        let mut query = world.query::<(Entity, &Position, &TankStats, &Health)>();
        query
            .iter(world)
            .filter(|(_, _, _, health)| health.is_alive())
            .map(|(entity, pos, stats, _)| (entity, *pos, stats.radius))
            .collect()
    };

    // First collector in scan order claims a pickup; a pickup is consumed
    // at most once per tick.
    let mut claimed: HashSet<Entity> = HashSet::new();
    let mut collections: Vec<(Entity, Entity)> = Vec::new();
    for (collector, pos, radius) in collectors {
        let hits = bus.query_sphere(
            world,
            pos.x,
            pos.y,
            pos.z,
            radius + COLLECT_MARGIN,
            Layer::PICKUPS,
            None,
        );
        if let Some(&pickup) = hits.iter().find(|p| !claimed.contains(p)) {
            claimed.insert(pickup);
            collections.push((collector, pickup));
        }
    }

    for (collector, pickup_entity) in collections {
        let Some(pickup) = world.get::<Pickup>(pickup_entity).copied() else {
            continue;
        };
        if let Some(mut armed) = world.get_mut::<Armed>(collector) {
            armed.primary = pickup.primary;
            armed.secondary = pickup.secondary;
        }
        let at = world
            .get::<Position>(pickup_entity)
            .copied()
            .unwrap_or_default();
        world.despawn(pickup_entity);
        world
            .resource_mut::<CollisionDirectory>()
            .unregister(pickup_entity);
        bus.post(Event::VisualEffect {
            kind: EffectKind::PickupFlash,
            x: at.x,
            y: at.y,
            z: at.z,
        });
        bus.post(Event::Sound {
            kind: SoundKind::Pickup,
        });
    }
}
