//! Combat resolver: damage, healing and combo scoring.
//!
//! Pure event-driven: subscribes to the collision-outcome notifications and
//! never scans entities itself. Damage results and bonus effects are posted
//! back through the queue, so presentation consumers see them one generation
//! after the hit that caused them.

use crate::api::ArenaConfig;
use crate::components::{Health, Position, Side};
use bevy_ecs::entity::Entity;
use crate::events::{
    EffectKind, Event, EventBus, EventCtx, EventKind, ShotSnapshot, SoundKind,
};
use crate::systems::projectile::SELF_HIT_GRACE;
use crate::systems::score::ScoreBoard;

/// Combo contribution per streak step on a kill.
const STREAK_COMBO_SCALE: f32 = 2.0;
/// Streak length that must be exceeded for the streak bonus.
const STREAK_BONUS_THRESHOLD: u32 = 9;
const STREAK_BONUS: f32 = 30.0;
/// Kill distance that must be exceeded for the long-shot bonus.
const LONG_SHOT_DISTANCE: f32 = 20.0;
const LONG_SHOT_BONUS: f32 = 25.0;
/// A bounced shot younger than this on impact earns the trick-shot bonus.
const BOUNCE_KILL_MAX_AGE: f32 = 10.0;
const BOUNCE_KILL_BONUS: f32 = 25.0;
/// Base for the diminishing per-kill bonus.
const KILL_BONUS_BASE: f32 = 100.0;

/// Subscribe the combat handlers. Called once at arena construction.
pub fn register_handlers(bus: &mut EventBus) {
    bus.subscribe(
        EventKind::EntityCollision,
        Box::new(|event, ctx| {
            if let Event::EntityCollision { target, shot } = event {
                let target = *target;
                let shot = *shot;
                resolve_entity_hit(ctx, target, &shot);
            }
        }),
    );

    bus.subscribe(
        EventKind::LevelCollision,
        Box::new(|event, ctx| {
            if let Event::LevelCollision {
                shot, final_bounce, ..
            } = event
            {
                // A shot that dies against the level without ever connecting
                // breaks a non-player owner's streak.
                if *final_bounce && shot.owner_side != Side::Player {
                    reset_owner_streak(ctx, shot.owner_slot);
                }
            }
        }),
    );

    bus.subscribe(
        EventKind::OutOfBounds,
        Box::new(|event, ctx| {
            if let Event::OutOfBounds { shot } = event {
                whiff(ctx, shot);
            }
        }),
    );

    bus.subscribe(
        EventKind::Timeout,
        Box::new(|event, ctx| {
            if let Event::Timeout { shot } = event {
                whiff(ctx, shot);
            }
        }),
    );
}

/// Player-owned shots that expire without hitting anything reset the
/// player's streak.
fn whiff(ctx: &mut EventCtx, shot: &ShotSnapshot) {
    if shot.owner_side == Side::Player {
        reset_owner_streak(ctx, shot.owner_slot);
    }
}

fn reset_owner_streak(ctx: &mut EventCtx, slot: Option<usize>) {
    if let Some(slot) = slot {
        ctx.world.resource_mut::<ScoreBoard>().reset_streak(slot);
    }
}

fn resolve_entity_hit(ctx: &mut EventCtx, target: Entity, shot: &ShotSnapshot) {
    // Deliberate self-targeting heals, with an over-heal allowance to double
    // the normal maximum.
    if target == shot.owner && shot.age > SELF_HIT_GRACE {
        if let Some(mut health) = ctx.world.get_mut::<Health>(target) {
            health.heal_over(shot.power * 0.5, 2.0);
        }
        ctx.post(Event::VisualEffect {
            kind: EffectKind::Heal,
            x: shot.x,
            y: shot.y,
            z: shot.z,
        });
        ctx.post(Event::Sound {
            kind: SoundKind::Heal,
        });
        return;
    }

    let competitive = ctx
        .world
        .get_resource::<ArenaConfig>()
        .map(|c| c.competitive)
        .unwrap_or(true);
    let target_side = ctx.world.get::<Side>(target).copied();

    // Friendly fire heals in co-op play.
    if !competitive
        && shot.owner_side == Side::Player
        && target_side == Some(Side::Player)
    {
        if let Some(mut health) = ctx.world.get_mut::<Health>(target) {
            health.heal(shot.power);
        }
        ctx.post(Event::VisualEffect {
            kind: EffectKind::Heal,
            x: shot.x,
            y: shot.y,
            z: shot.z,
        });
        ctx.post(Event::Sound {
            kind: SoundKind::Heal,
        });
        return;
    }

    let Some(mut health) = ctx.world.get_mut::<Health>(target) else {
        return;
    };
    health.damage(shot.power);
    let remaining = health.current;
    let lethal = !health.is_alive();
    ctx.post(Event::DamageApplied {
        target,
        health: remaining,
        lethal,
    });

    if lethal && shot.owner_side == Side::Player {
        score_kill(ctx, shot);
    }
}

/// Streak, bonus and combo bookkeeping for a lethal player kill.
fn score_kill(ctx: &mut EventCtx, shot: &ShotSnapshot) {
    let Some(slot) = shot.owner_slot else {
        return;
    };

    // Kill distance is measured from the owner's current position to the
    // impact point; an owner that died in the meantime forfeits the bonus.
    let kill_distance = ctx
        .world
        .get::<Position>(shot.owner)
        .map(|pos| pos.distance_to(&Position::new(shot.x, shot.y, shot.z)));

    let mut bonus_effects: Vec<EffectKind> = Vec::new();
    {
        let mut board = ctx.world.resource_mut::<ScoreBoard>();
        let Some(score) = board.get_mut(slot) else {
            return;
        };

        score.streak += 1;
        score.add_combo(STREAK_COMBO_SCALE * score.streak as f32);

        // The three bonus conditions are independent; any subset may fire
        // on the same kill.
        if score.streak > STREAK_BONUS_THRESHOLD {
            score.add_combo(STREAK_BONUS);
            bonus_effects.push(EffectKind::BonusStreak);
        }
        if kill_distance.is_some_and(|d| d > LONG_SHOT_DISTANCE) {
            score.add_combo(LONG_SHOT_BONUS);
            bonus_effects.push(EffectKind::BonusLongShot);
        }
        if shot.bounces >= 1 && shot.age < BOUNCE_KILL_MAX_AGE {
            score.add_combo(BOUNCE_KILL_BONUS);
            bonus_effects.push(EffectKind::BonusBounceKill);
        }

        // Flat kill bonus, diminishing as the combo grows.
        let kill_bonus = KILL_BONUS_BASE / (score.combo / 10.0 + 1.0);
        score.add_combo(kill_bonus);

        score.charge_special();
        score.combo_kills += 1;
    }

    for kind in bonus_effects {
        ctx.post(Event::VisualEffect {
            kind,
            x: shot.x,
            y: shot.y,
            z: shot.z,
        });
        ctx.post(Event::Sound {
            kind: SoundKind::Bonus,
        });
    }
}
