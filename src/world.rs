//! Presentation snapshot: a serializable view of the arena assembled once
//! per client frame. The snapshot drains the frame's accumulated effect,
//! sound and damage notifications, so each is reported exactly once.

use crate::components::*;
use crate::events::{EffectKind, FrameEffects, SoundKind};
use crate::systems::score::{PlayerScore, ScoreBoard};
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TankSnapshot {
    pub id: u64,
    pub side: Side,
    pub slot: usize,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub heading: f32,
    pub health: f32,
    pub max_health: f32,
    pub energy: f32,
    pub primary: ShotType,
    pub secondary: ShotType,
    pub alive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectileSnapshot {
    pub id: u64,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub heading: f32,
    pub primary: ShotType,
    pub power: f32,
    pub bounces: u32,
    pub owner_slot: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickupSnapshot {
    pub id: u64,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub primary: ShotType,
    pub secondary: ShotType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectSnapshot {
    pub kind: EffectKind,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DamageSnapshot {
    pub target: u64,
    pub health: f32,
    pub lethal: bool,
}

/// Full per-frame view handed to rendering/audio/HUD collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,
    pub time: f32,
    pub tanks: Vec<TankSnapshot>,
    pub projectiles: Vec<ProjectileSnapshot>,
    pub pickups: Vec<PickupSnapshot>,
    pub scores: Vec<PlayerScore>,
    pub effects: Vec<EffectSnapshot>,
    pub sounds: Vec<SoundKind>,
    pub damage: Vec<DamageSnapshot>,
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Assemble a snapshot and drain the frame's notification buffers.
pub fn build_snapshot(world: &mut World, tick: u64, time: f32) -> Snapshot {
    let tanks: Vec<TankSnapshot> = {
        let mut query = world.query::<(
            Entity,
            &Side,
            &ScoreSlot,
            &Position,
            &Heading,
            &Health,
            &Energy,
            &Armed,
        )>();
        query
            .iter(world)
            .map(
                |(entity, side, slot, pos, heading, health, energy, armed)| TankSnapshot {
                    id: entity.to_bits(),
                    side: *side,
                    slot: slot.0,
                    x: pos.x,
                    y: pos.y,
                    z: pos.z,
                    heading: heading.0,
                    health: health.current,
                    max_health: health.max,
                    energy: energy.current,
                    primary: armed.primary,
                    secondary: armed.secondary,
                    alive: health.is_alive(),
                },
            )
            .collect()
    };

    let projectiles: Vec<ProjectileSnapshot> = {
        let mut query = world.query::<(Entity, &Projectile, &Position, &Heading)>();
        query
            .iter(world)
            .filter(|(_, proj, _, _)| proj.is_flying())
            .map(|(entity, proj, pos, heading)| ProjectileSnapshot {
                id: entity.to_bits(),
                x: pos.x,
                y: pos.y,
                z: pos.z,
                heading: heading.0,
                primary: proj.primary,
                power: proj.power,
                bounces: proj.bounces,
                owner_slot: proj.owner_slot,
            })
            .collect()
    };

    let pickups: Vec<PickupSnapshot> = {
        let mut query = world.query::<(Entity, &Pickup, &Position)>();
        query
            .iter(world)
            .map(|(entity, pickup, pos)| PickupSnapshot {
                id: entity.to_bits(),
                x: pos.x,
                y: pos.y,
                z: pos.z,
                primary: pickup.primary,
                secondary: pickup.secondary,
            })
            .collect()
    };

    let scores: Vec<PlayerScore> = {
        let board = world.resource::<ScoreBoard>();
        (0..board.len()).filter_map(|i| board.get(i).copied()).collect()
    };

    let mut frame = world.resource_mut::<FrameEffects>();
    let effects = frame
        .effects
        .iter()
        .map(|&(kind, x, y, z)| EffectSnapshot { kind, x, y, z })
        .collect();
    let sounds = frame.sounds.clone();
    let damage = frame
        .damage
        .iter()
        .map(|&(target, health, lethal)| DamageSnapshot {
            target: target.to_bits(),
            health,
            lethal,
        })
        .collect();
    frame.clear();

    Snapshot {
        tick,
        time,
        tanks,
        projectiles,
        pickups,
        scores,
        effects,
        sounds,
        damage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_drains_frame_effects() {
        let mut world = World::new();
        world.insert_resource(ScoreBoard::new());
        let mut frame = FrameEffects::default();
        frame.effects.push((EffectKind::Explosion, 1.0, 0.0, 2.0));
        frame.sounds.push(SoundKind::Explosion);
        world.insert_resource(frame);

        let snap = build_snapshot(&mut world, 7, 0.7);
        assert_eq!(snap.tick, 7);
        assert_eq!(snap.effects.len(), 1);
        assert_eq!(snap.sounds.len(), 1);

        let snap = build_snapshot(&mut world, 8, 0.8);
        assert!(snap.effects.is_empty());
        assert!(snap.sounds.is_empty());
    }

    #[test]
    fn test_snapshot_serializes_to_json() {
        let mut world = World::new();
        world.insert_resource(ScoreBoard::new());
        world.insert_resource(FrameEffects::default());
        world.spawn(TankBundle::new(Side::Player, 0, 3.0, 0.0, 4.0));

        let snap = build_snapshot(&mut world, 1, 0.1);
        let json = snap.to_json().unwrap();
        assert!(json.contains("\"tanks\""));
        assert!(json.contains("\"Player\""));

        let parsed: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.tanks.len(), 1);
    }
}
