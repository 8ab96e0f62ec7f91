//! Combo and streak scoring state.
//!
//! Every unit is allocated a score slot at spawn so streak penalties can
//! apply to any projectile owner; the combo machinery on top of it only
//! feeds player slots.

use crate::systems::movement::DeltaTime;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Combo points drained per second.
const COMBO_DECAY_RATE: f32 = 4.0;
/// Special-ability charge cap.
const SPECIAL_CHARGE_MAX: f32 = 100.0;

/// Per-slot scoring state.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PlayerScore {
    /// Decaying score accumulator.
    pub combo: f32,
    /// Consecutive kills without a whiff.
    pub streak: u32,
    /// Lifetime kills landed while the combo machinery was active.
    pub combo_kills: u32,
    /// Special-ability charge, raised by combo peaks.
    pub special_charge: f32,
}

impl PlayerScore {
    pub fn add_combo(&mut self, amount: f32) {
        self.combo += amount;
    }

    /// Raise the charge to the current combo if that is higher, capped.
    pub fn charge_special(&mut self) {
        self.special_charge = self
            .special_charge
            .max(self.combo)
            .min(SPECIAL_CHARGE_MAX);
    }
}

/// Index-addressed score storage. Slots are allocated at unit spawn and
/// outlive the unit for the rest of the session.
#[derive(Resource, Debug, Default)]
pub struct ScoreBoard {
    scores: Vec<PlayerScore>,
}

impl ScoreBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh slot and return its index.
    pub fn allocate_slot(&mut self) -> usize {
        self.scores.push(PlayerScore::default());
        self.scores.len() - 1
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn get(&self, slot: usize) -> Option<&PlayerScore> {
        self.scores.get(slot)
    }

    /// Bounds-checked mutable access. An out-of-range slot is logged and
    /// yields `None` so callers degrade to a no-op.
    pub fn get_mut(&mut self, slot: usize) -> Option<&mut PlayerScore> {
        if slot >= self.scores.len() {
            log::warn!(
                "score slot {} out of range (have {})",
                slot,
                self.scores.len()
            );
            return None;
        }
        self.scores.get_mut(slot)
    }

    /// Whiff penalty: zero the slot's kill streak.
    pub fn reset_streak(&mut self, slot: usize) {
        if let Some(score) = self.get_mut(slot) {
            score.streak = 0;
        }
    }
}

/// Linear combo decay toward exactly zero, never below.
pub fn combo_decay_system(world: &mut World) {
    let dt = world.resource::<DeltaTime>().0;
    let mut board = world.resource_mut::<ScoreBoard>();
    for score in board.scores.iter_mut() {
        score.combo = (score.combo - COMBO_DECAY_RATE * dt).max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decay_is_monotonic_and_stops_at_zero() {
        let mut world = World::new();
        world.insert_resource(DeltaTime(0.1));
        let mut board = ScoreBoard::new();
        let slot = board.allocate_slot();
        board.get_mut(slot).unwrap().combo = 3.0;
        world.insert_resource(board);

        let mut previous = 3.0;
        for _ in 0..20 {
            combo_decay_system(&mut world);
            let combo = world.resource::<ScoreBoard>().get(slot).unwrap().combo;
            assert!(combo <= previous);
            assert!(combo >= 0.0);
            previous = combo;
        }
        assert_eq!(previous, 0.0);

        // Stays at exactly zero once drained.
        combo_decay_system(&mut world);
        assert_eq!(world.resource::<ScoreBoard>().get(slot).unwrap().combo, 0.0);
    }

    #[test]
    fn test_out_of_range_slot_is_a_noop() {
        let mut board = ScoreBoard::new();
        board.allocate_slot();
        assert!(board.get_mut(5).is_none());
        board.reset_streak(5);
        assert_eq!(board.len(), 1);
    }

    #[test]
    fn test_special_charge_tracks_combo_peak() {
        let mut score = PlayerScore::default();
        score.add_combo(40.0);
        score.charge_special();
        assert_eq!(score.special_charge, 40.0);

        // Lower combo never drops the charge.
        score.combo = 10.0;
        score.charge_special();
        assert_eq!(score.special_charge, 40.0);

        // Capped.
        score.combo = 500.0;
        score.charge_special();
        assert_eq!(score.special_charge, 100.0);
    }
}
