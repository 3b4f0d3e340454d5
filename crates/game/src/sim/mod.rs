mod entity;
mod world;

pub use entity::{Entity, MOVE_SPEED, Pose, TURN_RATE};
pub use world::World;
