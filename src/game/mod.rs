//! Vehicle simulation: terrain, cars, projectiles and the tick loop

pub mod body;
pub mod car;
pub mod combat;
pub mod particles;
pub mod projectile;
pub mod scene;
pub mod snapshot;
pub mod terrain;
pub mod turret;
pub mod wheel;

pub use car::{AliveState, Car, CarInput};
pub use scene::{Authority, Scene, SceneEvent};
pub use snapshot::PlayerState;
pub use terrain::Terrain;
