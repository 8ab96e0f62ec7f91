//! Resolver passes. Each is an exclusive function over the world plus the
//! event bus, called in a fixed order by the arena facade every tick.

pub mod combat;
pub mod movement;
pub mod pickup;
pub mod projectile;
pub mod score;

pub use movement::{movement_system, DeltaTime};
pub use pickup::pickup_system;
pub use projectile::{fire_projectile, projectile_system};
pub use score::{combo_decay_system, PlayerScore, ScoreBoard};
