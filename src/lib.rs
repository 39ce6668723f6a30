//! kartclip: fixed-point movement and collision core for a kart racer
//! (blockmap queries, position checks, stepped moves, wall slides, bounces,
//! sector crushing and chase-camera clipping)

pub mod fixed;
pub mod types;
pub mod map;
pub mod blockmap;
pub mod entity;
pub mod secnode;
pub mod api;
pub mod world;
pub mod narrowphase;
pub mod interaction;
pub mod traverse;
pub mod movement;
pub mod deflect;
pub mod crush;
pub mod camera;

#[cfg(test)]
mod test_level;

pub use crate::types::*;
pub use crate::api::*;
pub use crate::fixed::{Angle, Fixed, FRACUNIT};
pub use crate::map::{Line, Map, MapError, Polyobject, Sector};
pub use crate::entity::{Entity, EntityInfo, PlayerState};
pub use crate::world::World;
pub use crate::narrowphase::PositionCheck;
pub use crate::movement::MoveReport;
pub use crate::camera::{Camera, CameraCheck};
