//! Arena facade: owns the ECS world, the event bus and the fixed-timestep
//! loop, and exposes the surface a client (renderer, net layer, bot driver)
//! talks to.

use crate::collision::{refresh_directory, CollisionDirectory, CollisionShape, Layer};
use crate::components::*;
use crate::events::{
    register_presentation_handlers, register_query_handlers, EventBus, FrameEffects,
};
use crate::level::{parse_level, EnemySpawn, LevelError};
use crate::systems::{
    combat, combo_decay_system, fire_projectile, movement_system, pickup_system,
    projectile_system, DeltaTime, ScoreBoard,
};
use crate::terrain::TerrainHandle;
use crate::world::{build_snapshot, Snapshot};
use bevy_ecs::prelude::*;

/// Session-level tuning knobs.
#[derive(Resource, Debug, Clone)]
pub struct ArenaConfig {
    /// Competitive play: every cross-unit hit damages. Co-op play heals
    /// player-on-player hits instead.
    pub competitive: bool,
    /// Seconds per simulation tick.
    pub fixed_timestep: f32,
    /// Cap on ticks consumed by a single `step` call, bounding catch-up
    /// work after a stall.
    pub max_ticks_per_step: u32,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            competitive: true,
            fixed_timestep: 1.0 / 60.0,
            max_ticks_per_step: 8,
        }
    }
}

/// Archetype pairs granted by pickups, rotated per spawn marker so level
/// authors get variety without encoding it in the file format.
const PICKUP_ROTATION: [(ShotType, ShotType); 5] = [
    (ShotType::Heavy, ShotType::Spread),
    (ShotType::Rapid, ShotType::Standard),
    (ShotType::Chain, ShotType::Fork),
    (ShotType::Mine, ShotType::Mine),
    (ShotType::Heal, ShotType::Standard),
];

/// The simulation core. Construct once, load a level, drive with `step`,
/// read back with `snapshot`.
pub struct ArenaWorld {
    world: World,
    bus: EventBus,
    tick: u64,
    time: f32,
    accumulator: f32,
    player_spawns: Vec<(f32, f32)>,
}

impl ArenaWorld {
    pub fn new(config: ArenaConfig) -> Self {
        let mut world = World::new();
        world.insert_resource(DeltaTime(config.fixed_timestep));
        world.insert_resource(TerrainHandle::default());
        world.insert_resource(CollisionDirectory::new());
        world.insert_resource(ScoreBoard::new());
        world.insert_resource(FrameEffects::default());
        world.insert_resource(config);

        let mut bus = EventBus::new();
        register_query_handlers(&mut bus);
        combat::register_handlers(&mut bus);
        register_presentation_handlers(&mut bus);

        Self {
            world,
            bus,
            tick: 0,
            time: 0.0,
            accumulator: 0.0,
            player_spawns: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Level lifecycle
    // ------------------------------------------------------------------

    /// Parse and install a level. On failure the previously loaded terrain
    /// and entities remain untouched.
    pub fn load_level(&mut self, text: &str) -> Result<(), LevelError> {
        let data = match parse_level(text) {
            Ok(data) => data,
            Err(err) => {
                log::warn!("level load rejected: {err}");
                return Err(err);
            }
        };

        self.world.resource::<TerrainHandle>().replace(data.field);
        self.player_spawns = data.player_spawns;
        for spawn in &data.enemy_spawns {
            self.spawn_enemy(spawn);
        }
        for (i, &(x, z)) in data.pickups.iter().enumerate() {
            let (primary, secondary) = PICKUP_ROTATION[i % PICKUP_ROTATION.len()];
            self.spawn_pickup(x, z, primary, secondary);
        }
        log::info!(
            "level loaded: {} player spawns, {} enemies, {} pickups",
            self.player_spawns.len(),
            data.enemy_spawns.len(),
            data.pickups.len()
        );
        Ok(())
    }

    pub fn player_spawns(&self) -> &[(f32, f32)] {
        &self.player_spawns
    }

    // ------------------------------------------------------------------
    // Spawning
    // ------------------------------------------------------------------

    pub fn spawn_player(&mut self, x: f32, z: f32) -> Entity {
        self.spawn_tank(Side::Player, x, z, Armed::default())
    }

    pub fn spawn_enemy(&mut self, spawn: &EnemySpawn) -> Entity {
        self.spawn_tank(
            Side::Enemy,
            spawn.x,
            spawn.z,
            Armed::new(spawn.primary, spawn.secondary),
        )
    }

    fn spawn_tank(&mut self, side: Side, x: f32, z: f32, armed: Armed) -> Entity {
        let slot = self.world.resource_mut::<ScoreBoard>().allocate_slot();
        let y = self.world.resource::<TerrainHandle>().surface_height(x, 0.0, z);
        let mut bundle = TankBundle::new(side, slot, x, y, z);
        bundle.armed = armed;
        let radius = bundle.stats.radius;
        let entity = self.world.spawn(bundle).id();
        let layer = match side {
            Side::Player => Layer::PLAYER_UNITS,
            Side::Enemy => Layer::ENEMY_UNITS,
        };
        self.world.resource_mut::<CollisionDirectory>().register(
            entity,
            CollisionShape::Unit { radius },
            layer,
        );
        entity
    }

    pub fn spawn_pickup(
        &mut self,
        x: f32,
        z: f32,
        primary: ShotType,
        secondary: ShotType,
    ) -> Entity {
        let y = self.world.resource::<TerrainHandle>().surface_height(x, 0.0, z);
        let entity = self
            .world
            .spawn((Pickup { primary, secondary }, Position::new(x, y, z)))
            .id();
        self.world.resource_mut::<CollisionDirectory>().register(
            entity,
            CollisionShape::Sphere { radius: 0.5 },
            Layer::PICKUPS,
        );
        entity
    }

    // ------------------------------------------------------------------
    // Client commands
    // ------------------------------------------------------------------

    /// Command a ground displacement for the next tick.
    pub fn set_move_intent(&mut self, entity: Entity, dx: f32, dz: f32) {
        if let Some(mut intent) = self.world.get_mut::<MoveIntent>(entity) {
            intent.dx = dx;
            intent.dz = dz;
        }
    }

    pub fn set_heading(&mut self, entity: Entity, heading: f32) {
        if let Some(mut h) = self.world.get_mut::<Heading>(entity) {
            h.0 = heading;
        }
    }

    pub fn fire(&mut self, entity: Entity) -> Option<Entity> {
        fire_projectile(&mut self.world, entity)
    }

    // ------------------------------------------------------------------
    // Stepping
    // ------------------------------------------------------------------

    /// Advance by wall-clock `dt`, running as many fixed ticks as have
    /// accumulated (bounded by the configured cap).
    pub fn step(&mut self, dt: f32) {
        let config = self.world.resource::<ArenaConfig>().clone();
        self.accumulator += dt;
        let mut ticks = 0;
        while self.accumulator >= config.fixed_timestep && ticks < config.max_ticks_per_step {
            self.fixed_update(config.fixed_timestep);
            self.accumulator -= config.fixed_timestep;
            ticks += 1;
        }
        if ticks == config.max_ticks_per_step && self.accumulator >= config.fixed_timestep {
            log::debug!("dropping {:.3}s of accumulated time", self.accumulator);
            self.accumulator = 0.0;
        }
    }

    /// One simulation tick: refresh the directory, run the resolver passes,
    /// drain the deferred queue, then sweep dead projectiles.
    fn fixed_update(&mut self, dt: f32) {
        self.world.resource_mut::<DeltaTime>().0 = dt;

        refresh_directory(&mut self.world);
        pickup_system(&mut self.world, &mut self.bus);
        movement_system(&mut self.world, &mut self.bus);
        projectile_system(&mut self.world, &mut self.bus);
        self.bus.process_queued(&mut self.world);
        combo_decay_system(&mut self.world);
        self.sweep();

        self.tick += 1;
        self.time += dt;
    }

    /// Despawn projectiles that resolved a terminal outcome this tick.
    fn sweep(&mut self) {
        let dead: Vec<Entity> = {
            let mut query = self.world.query::<(Entity, &Projectile)>();
            query
                .iter(&self.world)
                .filter(|(_, proj)| !proj.is_flying())
                .map(|(entity, _)| entity)
                .collect()
        };
        for entity in dead {
            self.world.despawn(entity);
            self.world
                .resource_mut::<CollisionDirectory>()
                .unregister(entity);
        }
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn snapshot(&mut self) -> Snapshot {
        build_snapshot(&mut self.world, self.tick, self.time)
    }

    pub fn snapshot_json(&mut self) -> Result<String, serde_json::Error> {
        self.snapshot().to_json()
    }

    /// Direct world access for tests and embedding hosts.
    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}

impl Default for ArenaWorld {
    fn default() -> Self {
        Self::new(ArenaConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::LEVEL_SIZE;

    /// Flat 128x128 level text, with `edit` applied to the mutable line
    /// grid before assembly. Even indices are glyph rows, odd are heights.
    fn level_text(edit: impl FnOnce(&mut Vec<Vec<char>>)) -> String {
        let mut lines: Vec<Vec<char>> = (0..LEVEL_SIZE * 2)
            .map(|i| {
                let fill = if i % 2 == 0 { '.' } else { '0' };
                vec![fill; LEVEL_SIZE]
            })
            .collect();
        edit(&mut lines);
        lines
            .into_iter()
            .map(|l| l.into_iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_load_level_spawns_markers() {
        let mut arena = ArenaWorld::default();
        let text = level_text(|lines| {
            lines[20][10] = 'S';
            lines[40][30] = 'E';
            lines[60][50] = 'p';
        });
        arena.load_level(&text).unwrap();

        assert_eq!(arena.player_spawns().len(), 1);
        let snap = arena.snapshot();
        assert_eq!(snap.tanks.len(), 1);
        assert_eq!(snap.tanks[0].side, Side::Enemy);
        assert_eq!(snap.pickups.len(), 1);
    }

    #[test]
    fn test_bad_level_keeps_prior_terrain() {
        let mut arena = ArenaWorld::default();
        let text = level_text(|lines| {
            lines[21][10] = '5';
        });
        arena.load_level(&text).unwrap();
        let height_before = arena.world.resource::<TerrainHandle>().height(10.5, 10.5);
        assert_eq!(height_before, 5);

        assert!(arena.load_level("not a level").is_err());
        let height_after = arena.world.resource::<TerrainHandle>().height(10.5, 10.5);
        assert_eq!(height_after, 5);
    }

    #[test]
    fn test_fixed_timestep_accumulation() {
        let mut arena = ArenaWorld::new(ArenaConfig {
            fixed_timestep: 0.25,
            ..ArenaConfig::default()
        });
        arena.load_level(&level_text(|_| {})).unwrap();

        arena.step(0.875);
        assert_eq!(arena.tick(), 3);
        arena.step(0.125);
        assert_eq!(arena.tick(), 4);
    }

    #[test]
    fn test_catch_up_is_bounded() {
        let mut arena = ArenaWorld::new(ArenaConfig {
            fixed_timestep: 0.01,
            max_ticks_per_step: 4,
            ..ArenaConfig::default()
        });
        arena.load_level(&level_text(|_| {})).unwrap();

        arena.step(1.0);
        assert_eq!(arena.tick(), 4);
    }

    #[test]
    fn test_player_moves_when_commanded() {
        let mut arena = ArenaWorld::default();
        arena.load_level(&level_text(|_| {})).unwrap();
        let player = arena.spawn_player(20.0, 20.0);

        arena.set_move_intent(player, 0.5, 0.0);
        arena.step(1.0 / 60.0);

        let pos = arena.world().get::<Position>(player).unwrap();
        assert!((pos.x - 20.5).abs() < 1e-4);
    }

    #[test]
    fn test_shot_damages_enemy_and_reports_in_snapshot() {
        let mut arena = ArenaWorld::default();
        arena.load_level(&level_text(|_| {})).unwrap();
        let player = arena.spawn_player(20.0, 20.0);
        let enemy = arena.spawn_enemy(&EnemySpawn {
            x: 20.0,
            z: 26.0,
            primary: ShotType::Standard,
            secondary: ShotType::Standard,
        });

        // Heading 0 faces +z, straight at the enemy.
        arena.set_heading(player, 0.0);
        arena.fire(player).unwrap();
        for _ in 0..120 {
            arena.step(1.0 / 60.0);
            if arena.world().get::<Health>(enemy).unwrap().current < 100.0 {
                break;
            }
        }

        let health = arena.world().get::<Health>(enemy).unwrap().current;
        assert!(health < 100.0, "enemy was never hit");

        // The damage notification reaches the presentation sink one queue
        // generation after the hit.
        arena.step(1.0 / 60.0);

        // The impact left no live projectile behind.
        let snap = arena.snapshot();
        assert!(snap.projectiles.is_empty());
        assert!(snap.damage.iter().any(|d| d.target == enemy.to_bits()));
    }

    #[test]
    fn test_pickup_collection_rearms_player() {
        let mut arena = ArenaWorld::default();
        arena.load_level(&level_text(|_| {})).unwrap();
        let player = arena.spawn_player(20.0, 20.0);
        arena.spawn_pickup(20.5, 20.0, ShotType::Heavy, ShotType::Spread);

        arena.step(1.0 / 60.0);

        let armed = arena.world().get::<Armed>(player).unwrap();
        assert_eq!(armed.primary, ShotType::Heavy);
    }

    #[test]
    fn test_snapshot_json_round_trip() {
        let mut arena = ArenaWorld::default();
        arena.load_level(&level_text(|_| {})).unwrap();
        arena.spawn_player(5.0, 5.0);
        arena.step(1.0 / 60.0);

        let json = arena.snapshot_json().unwrap();
        let parsed: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.tanks.len(), 1);
    }
}
