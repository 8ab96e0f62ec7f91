//! Event bus: synchronous queries and deferred notifications.
//!
//! Two delivery modes share one closed event type:
//!
//! - `publish` dispatches immediately and passes the event mutably, so
//!   request/response-style collision queries can be filled in by their
//!   subscribers;
//! - `post` + `process_queued` defer side-effecting notifications collected
//!   during a scan until after it completes. `process_queued` swaps the queue
//!   before dispatching, so events posted by handlers land in the next
//!   generation and reaction depth is bounded to one generation per call.
//!
//! Dispatch is keyed by a closed discriminant instead of runtime type
//! identity. Subscribers are process-lifetime; there is no unsubscribe.

use crate::collision::{CollisionDirectory, Layer};
use crate::components::{Side, ShotType};
use crate::terrain::TerrainHandle;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// EVENT PAYLOADS
// ============================================================================

/// Which wall axis a projectile struck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImpactAxis {
    X,
    Z,
    Corner,
}

/// Visual-effect request kinds. Fire-and-forget: the core emits them, a
/// presentation layer consumes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectKind {
    Dust,
    TreadMark,
    Ricochet { axis: ImpactAxis },
    Explosion,
    Heal,
    PickupFlash,
    BonusStreak,
    BonusLongShot,
    BonusBounceKill,
}

/// Sound-channel request kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoundKind {
    Bounce,
    Impact,
    Explosion,
    Pickup,
    Heal,
    Bonus,
}

/// Immutable snapshot of a projectile at the moment a collision outcome was
/// detected. Carried by notifications because the projectile itself may be
/// dead by the time handlers run.
#[derive(Debug, Clone, Copy)]
pub struct ShotSnapshot {
    pub owner: Entity,
    pub owner_slot: Option<usize>,
    pub owner_side: Side,
    pub primary: ShotType,
    pub secondary: ShotType,
    pub power: f32,
    pub age: f32,
    pub bounces: u32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Point-solidity query. `hit` is the mutable result field.
#[derive(Debug, Clone)]
pub struct PointQuery {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub mask: Layer,
    pub exclude: Option<Entity>,
    pub hit: bool,
}

/// Sphere-overlap query. `hits` is the mutable result field, in directory
/// registration order.
#[derive(Debug, Clone)]
pub struct SphereQuery {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub radius: f32,
    pub mask: Layer,
    pub exclude: Option<Entity>,
    pub hits: Vec<Entity>,
}

/// Playable-rectangle query. `inside` is the mutable result field.
#[derive(Debug, Clone)]
pub struct BoundsQuery {
    pub x: f32,
    pub z: f32,
    pub inside: bool,
}

/// Closed event union. Query variants are filled during synchronous publish;
/// notification variants travel through the deferred queue.
#[derive(Debug, Clone)]
pub enum Event {
    PointQuery(PointQuery),
    SphereQuery(SphereQuery),
    BoundsQuery(BoundsQuery),
    EntityCollision {
        target: Entity,
        shot: ShotSnapshot,
    },
    LevelCollision {
        shot: ShotSnapshot,
        axis: ImpactAxis,
        final_bounce: bool,
    },
    OutOfBounds {
        shot: ShotSnapshot,
    },
    Timeout {
        shot: ShotSnapshot,
    },
    DamageApplied {
        target: Entity,
        health: f32,
        lethal: bool,
    },
    VisualEffect {
        kind: EffectKind,
        x: f32,
        y: f32,
        z: f32,
    },
    Sound {
        kind: SoundKind,
    },
}

/// Dispatch-table key for [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PointQuery,
    SphereQuery,
    BoundsQuery,
    EntityCollision,
    LevelCollision,
    OutOfBounds,
    Timeout,
    DamageApplied,
    VisualEffect,
    Sound,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::PointQuery(_) => EventKind::PointQuery,
            Event::SphereQuery(_) => EventKind::SphereQuery,
            Event::BoundsQuery(_) => EventKind::BoundsQuery,
            Event::EntityCollision { .. } => EventKind::EntityCollision,
            Event::LevelCollision { .. } => EventKind::LevelCollision,
            Event::OutOfBounds { .. } => EventKind::OutOfBounds,
            Event::Timeout { .. } => EventKind::Timeout,
            Event::DamageApplied { .. } => EventKind::DamageApplied,
            Event::VisualEffect { .. } => EventKind::VisualEffect,
            Event::Sound { .. } => EventKind::Sound,
        }
    }
}

// ============================================================================
// BUS
// ============================================================================

/// Handler context: world access plus a post buffer. Handlers never touch
/// the bus directly, so dispatch cannot alias the queue.
pub struct EventCtx<'w> {
    pub world: &'w mut World,
    posted: Vec<Event>,
}

impl<'w> EventCtx<'w> {
    /// Defer an event to the next queue generation.
    pub fn post(&mut self, event: Event) {
        self.posted.push(event);
    }
}

pub type Handler = Box<dyn FnMut(&mut Event, &mut EventCtx)>;

/// Publish/subscribe bus with synchronous and deferred delivery.
#[derive(Default)]
pub struct EventBus {
    handlers: HashMap<EventKind, Vec<Handler>>,
    queue: Vec<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind. Handlers for the same kind run
    /// in subscription order.
    pub fn subscribe(&mut self, kind: EventKind, handler: Handler) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    /// Invoke all handlers for the event immediately, passing it mutably so
    /// query results can be written back.
    pub fn publish(&mut self, event: &mut Event, world: &mut World) {
        self.dispatch(event, world);
    }

    /// Queue an event for deferred delivery. FIFO across posts.
    pub fn post(&mut self, event: Event) {
        self.queue.push(event);
    }

    /// Number of events waiting in the current generation.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Drain exactly one queue generation, dispatching each event in
    /// insertion order. Events posted by handlers during dispatch wait for
    /// the next call.
    pub fn process_queued(&mut self, world: &mut World) {
        let generation = std::mem::take(&mut self.queue);
        for mut event in generation {
            self.dispatch(&mut event, world);
        }
    }

    fn dispatch(&mut self, event: &mut Event, world: &mut World) {
        let kind = event.kind();
        // Handlers are taken out for the duration of the call; subscribing
        // from inside a handler is not supported.
        let Some(mut handlers) = self.handlers.remove(&kind) else {
            return;
        };
        let mut ctx = EventCtx {
            world,
            posted: Vec::new(),
        };
        for handler in handlers.iter_mut() {
            handler(event, &mut ctx);
        }
        let posted = ctx.posted;
        self.handlers.insert(kind, handlers);
        self.queue.extend(posted);
    }

    // ------------------------------------------------------------------
    // Query convenience wrappers used by the resolver passes.
    // ------------------------------------------------------------------

    /// Synchronous point-solidity query.
    pub fn query_point(
        &mut self,
        world: &mut World,
        x: f32,
        y: f32,
        z: f32,
        mask: Layer,
        exclude: Option<Entity>,
    ) -> bool {
        let mut event = Event::PointQuery(PointQuery {
            x,
            y,
            z,
            mask,
            exclude,
            hit: false,
        });
        self.publish(&mut event, world);
        matches!(event, Event::PointQuery(PointQuery { hit: true, .. }))
    }

    /// Synchronous sphere-overlap query.
    pub fn query_sphere(
        &mut self,
        world: &mut World,
        x: f32,
        y: f32,
        z: f32,
        radius: f32,
        mask: Layer,
        exclude: Option<Entity>,
    ) -> Vec<Entity> {
        let mut event = Event::SphereQuery(SphereQuery {
            x,
            y,
            z,
            radius,
            mask,
            exclude,
            hits: Vec::new(),
        });
        self.publish(&mut event, world);
        match event {
            Event::SphereQuery(q) => q.hits,
            _ => Vec::new(),
        }
    }

    /// Synchronous playable-bounds query.
    pub fn query_bounds(&mut self, world: &mut World, x: f32, z: f32) -> bool {
        let mut event = Event::BoundsQuery(BoundsQuery {
            x,
            z,
            inside: false,
        });
        self.publish(&mut event, world);
        matches!(event, Event::BoundsQuery(BoundsQuery { inside: true, .. }))
    }
}

/// Subscribe the collision directory and height field as responders for the
/// query-style events. Called once when the arena is constructed.
pub fn register_query_handlers(bus: &mut EventBus) {
    bus.subscribe(
        EventKind::PointQuery,
        Box::new(|event, ctx| {
            if let Event::PointQuery(q) = event {
                let terrain = ctx.world.resource::<TerrainHandle>().clone();
                let dir = ctx.world.resource::<CollisionDirectory>();
                q.hit = dir.check_point(&terrain, q.x, q.y, q.z, q.mask, q.exclude);
            }
        }),
    );
    bus.subscribe(
        EventKind::SphereQuery,
        Box::new(|event, ctx| {
            if let Event::SphereQuery(q) = event {
                let dir = ctx.world.resource::<CollisionDirectory>();
                q.hits = dir.check_sphere(q.x, q.y, q.z, q.radius, q.mask, q.exclude);
            }
        }),
    );
    bus.subscribe(
        EventKind::BoundsQuery,
        Box::new(|event, ctx| {
            if let Event::BoundsQuery(q) = event {
                let terrain = ctx.world.resource::<TerrainHandle>();
                q.inside = terrain.in_bounds(q.x, q.z);
            }
        }),
    );
}

// ============================================================================
// PRESENTATION SINK
// ============================================================================

/// Effects, sounds and damage notifications accumulated over a frame for the
/// presentation layer, drained into each snapshot.
#[derive(Resource, Debug, Default)]
pub struct FrameEffects {
    pub effects: Vec<(EffectKind, f32, f32, f32)>,
    pub sounds: Vec<SoundKind>,
    pub damage: Vec<(Entity, f32, bool)>,
}

impl FrameEffects {
    pub fn clear(&mut self) {
        self.effects.clear();
        self.sounds.clear();
        self.damage.clear();
    }
}

/// Subscribe the presentation sink: visual effects, sounds and damage
/// notifications are copied into [`FrameEffects`].
pub fn register_presentation_handlers(bus: &mut EventBus) {
    bus.subscribe(
        EventKind::VisualEffect,
        Box::new(|event, ctx| {
            if let Event::VisualEffect { kind, x, y, z } = *event {
                ctx.world
                    .resource_mut::<FrameEffects>()
                    .effects
                    .push((kind, x, y, z));
            }
        }),
    );
    bus.subscribe(
        EventKind::Sound,
        Box::new(|event, ctx| {
            if let Event::Sound { kind } = *event {
                ctx.world.resource_mut::<FrameEffects>().sounds.push(kind);
            }
        }),
    );
    bus.subscribe(
        EventKind::DamageApplied,
        Box::new(|event, ctx| {
            if let Event::DamageApplied {
                target,
                health,
                lethal,
            } = *event
            {
                ctx.world
                    .resource_mut::<FrameEffects>()
                    .damage
                    .push((target, health, lethal));
            }
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_publish_fills_query_results() {
        let mut world = World::new();
        let mut bus = EventBus::new();
        bus.subscribe(
            EventKind::BoundsQuery,
            Box::new(|event, _ctx| {
                if let Event::BoundsQuery(q) = event {
                    q.inside = q.x >= 0.0 && q.z >= 0.0;
                }
            }),
        );

        assert!(bus.query_bounds(&mut world, 1.0, 1.0));
        assert!(!bus.query_bounds(&mut world, -1.0, 1.0));
    }

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let mut world = World::new();
        let mut bus = EventBus::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        for tag in [1, 2, 3] {
            let order = Rc::clone(&order);
            bus.subscribe(
                EventKind::Sound,
                Box::new(move |_, _| order.borrow_mut().push(tag)),
            );
        }

        bus.post(Event::Sound {
            kind: SoundKind::Bounce,
        });
        bus.process_queued(&mut world);
        assert_eq!(*order.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn test_process_queued_delivers_one_generation() {
        let mut world = World::new();
        let mut bus = EventBus::new();
        let delivered = Rc::new(RefCell::new(0u32));

        {
            let delivered = Rc::clone(&delivered);
            bus.subscribe(
                EventKind::Sound,
                Box::new(move |_, ctx| {
                    let mut count = delivered.borrow_mut();
                    *count += 1;
                    // First two deliveries post a follow-up event each.
                    if *count <= 2 {
                        ctx.post(Event::Sound {
                            kind: SoundKind::Bonus,
                        });
                    }
                }),
            );
        }

        for _ in 0..5 {
            bus.post(Event::Sound {
                kind: SoundKind::Impact,
            });
        }

        bus.process_queued(&mut world);
        // Exactly the five pre-posted events were delivered this call.
        assert_eq!(*delivered.borrow(), 5);
        assert_eq!(bus.pending(), 2);

        bus.process_queued(&mut world);
        assert_eq!(*delivered.borrow(), 7);
        assert_eq!(bus.pending(), 0);
    }

    #[test]
    fn test_presentation_sink_collects_effects() {
        let mut world = World::new();
        world.insert_resource(FrameEffects::default());
        let mut bus = EventBus::new();
        register_presentation_handlers(&mut bus);

        bus.post(Event::VisualEffect {
            kind: EffectKind::Dust,
            x: 1.0,
            y: 0.0,
            z: 2.0,
        });
        bus.post(Event::Sound {
            kind: SoundKind::Pickup,
        });
        bus.process_queued(&mut world);

        let sink = world.resource::<FrameEffects>();
        assert_eq!(sink.effects.len(), 1);
        assert_eq!(sink.effects[0].0, EffectKind::Dust);
        assert_eq!(sink.sounds, vec![SoundKind::Pickup]);
    }
}
