//! Simulation tuning values
//!
//! Every section deserializes with defaults so a JSON file only needs the
//! values it overrides.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Terrain generation style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerrainMode {
    /// Interior at height zero
    Flat,
    /// Rolling value-noise hills
    Hills,
    /// Hills flattened toward the map center
    Valley,
}

impl Default for TerrainMode {
    fn default() -> Self {
        Self::Hills
    }
}

impl TerrainMode {
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Flat => 0,
            Self::Hills => 1,
            Self::Valley => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Flat),
            1 => Some(Self::Hills),
            2 => Some(Self::Valley),
            _ => None,
        }
    }
}

/// Top-level simulation config
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub physics: PhysicsConfig,
    pub vehicle: VehicleConfig,
    pub weapons: WeaponsConfig,
    pub terrain: TerrainConfig,
    pub capacity: CapacityConfig,
}

impl SimConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Reject values the simulation cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if !(self.physics.fixed_dt > 0.0) {
            return invalid("physics.fixed_dt must be positive");
        }
        if !(self.physics.max_substep > 0.0) {
            return invalid("physics.max_substep must be positive");
        }
        if !(0.0..=1.0).contains(&self.physics.sync_factor) {
            return invalid("physics.sync_factor must be within [0, 1]");
        }
        if self.physics.snapshot_interval == 0 {
            return invalid("physics.snapshot_interval must be at least 1");
        }
        if !(self.vehicle.mass > 0.0) || !(self.vehicle.inertia_radius > 0.0) {
            return invalid("vehicle.mass and vehicle.inertia_radius must be positive");
        }
        for wheel in [&self.vehicle.front_wheels, &self.vehicle.rear_wheels] {
            if !(wheel.radius > 0.0) || !(wheel.stiffness > 0.0) || !(wheel.mass > 0.0) {
                return invalid("wheel radius, stiffness and mass must be positive");
            }
        }
        if self.terrain.resolution < 3 {
            return invalid("terrain.resolution must be at least 3");
        }
        if !(self.terrain.size > 0.0) || !(self.terrain.bucket_size > 0.0) {
            return invalid("terrain.size and terrain.bucket_size must be positive");
        }
        if self.capacity.cars == 0 || self.capacity.cars > u8::MAX as usize {
            return invalid("capacity.cars must be within 1..=255");
        }
        if self.capacity.projectiles == 0 {
            return invalid("capacity.projectiles must be positive");
        }
        Ok(())
    }
}

/// Timestep, reconciliation and session pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Seconds per tick
    pub fixed_dt: f32,
    /// Largest step integrated in one go; larger steps are halved
    pub max_substep: f32,
    /// Upper bound on halving rounds for a single step
    pub max_halvings: u32,
    /// Gravity acceleration (m/s^2, pointing down)
    pub gravity: f32,
    /// Blend factor applied per received snapshot
    pub sync_factor: f32,
    /// Ticks between player-state broadcasts
    pub snapshot_interval: u32,
    /// Seconds per match before stats reset
    pub match_duration: f32,
    /// Seconds of silence before a peer is dropped
    pub peer_timeout: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 50.0,
            max_substep: 1.0 / 30.0,
            max_halvings: 8,
            gravity: 9.81,
            sync_factor: 0.3,
            snapshot_interval: 2,
            match_duration: 600.0,
            peer_timeout: 10.0,
        }
    }
}

/// Per-axle suspension and tire parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelConfig {
    /// Connection point of the left wheel in body space; the right wheel
    /// mirrors x
    pub connection: Vec3,
    pub radius: f32,
    /// Coefficient of the squared spring term
    pub stiffness: f32,
    /// Damping against contact-point normal velocity (N*s/m)
    pub damping: f32,
    /// Suspension offset limit in either direction (m)
    pub travel: f32,
    /// Unsprung mass driving the free suspension motion
    pub mass: f32,
    /// Damping of the free (ungrounded) suspension motion (1/s)
    pub free_damping: f32,
    /// Base tire friction coefficient
    pub tire_friction: f32,
    /// Spin decay toward zero (1/s)
    pub rolling_resistance: f32,
    /// Wheel moment of inertia for spin
    pub inertia: f32,
    /// Drive torque at full engine power (0 disables driving)
    pub engine_torque: f32,
    /// Hand-brake locking torque
    pub brake_torque: f32,
    /// Whether this axle follows the steering angle
    pub steers: bool,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            connection: Vec3::new(-0.95, -0.35, 1.45),
            radius: 0.45,
            stiffness: 92_000.0,
            damping: 4_500.0,
            travel: 0.4,
            mass: 25.0,
            free_damping: 8.0,
            tire_friction: 1.1,
            rolling_resistance: 0.5,
            inertia: 4.0,
            engine_torque: 900.0,
            brake_torque: 2_500.0,
            steers: true,
        }
    }
}

impl WheelConfig {
    pub fn rear_default() -> Self {
        Self {
            connection: Vec3::new(-0.95, -0.35, -1.45),
            steers: false,
            ..Self::default()
        }
    }
}

/// Turret aiming limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurretConfig {
    /// Pivot in body space
    pub connection: Vec3,
    pub min_yaw: f32,
    pub max_yaw: f32,
    pub min_pitch: f32,
    pub max_pitch: f32,
    /// Max angular speed for both axes (rad/s)
    pub rotation_speed: f32,
    /// Distance from pivot to muzzle
    pub barrel_length: f32,
    /// How far the aim trace reaches
    pub aim_range: f32,
}

impl Default for TurretConfig {
    fn default() -> Self {
        Self {
            connection: Vec3::new(0.0, 0.6, 0.3),
            min_yaw: -std::f32::consts::PI,
            max_yaw: std::f32::consts::PI,
            min_pitch: -0.2,
            max_pitch: 0.6,
            rotation_speed: 3.0,
            barrel_length: 1.5,
            aim_range: 400.0,
        }
    }
}

impl TurretConfig {
    pub fn cannon_default() -> Self {
        Self {
            connection: Vec3::new(0.0, 0.55, -0.3),
            min_yaw: -0.5,
            max_yaw: 0.5,
            min_pitch: -0.1,
            max_pitch: 0.35,
            rotation_speed: 1.2,
            barrel_length: 2.5,
            aim_range: 400.0,
        }
    }
}

/// Sphere in body or object space
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SphereSpec {
    pub offset: Vec3,
    pub radius: f32,
}

impl SphereSpec {
    pub const fn new(offset: Vec3, radius: f32) -> Self {
        Self { offset, radius }
    }
}

/// Vehicle body, drivetrain and lifecycle parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub mass: f32,
    /// Radius of the sphere used for the scalar moment of inertia
    pub inertia_radius: f32,
    pub max_speed: f32,
    pub max_angular_speed: f32,
    /// Engine power change per second toward the throttle target
    pub engine_rate: f32,
    pub max_steering: f32,
    /// Steering change per second toward the input target
    pub steering_rate: f32,
    /// Fraction of steering kept at max speed
    pub high_speed_steering: f32,
    /// Quadratic drag along the body up axis
    pub drag: f32,
    /// Upward thrust at full thrust input (N)
    pub thrust: f32,
    pub align_strength: f32,
    /// Tilt below which no alignment moment is applied (rad)
    pub align_dead_zone: f32,
    pub angular_damping: f32,
    /// Body spheres tested against objects and other cars
    pub collision_spheres: Vec<SphereSpec>,
    /// Body points tested against the heightfield
    pub surface_points: Vec<Vec3>,
    /// Box used for projectile hits (half extents, body space)
    pub hit_box: Vec3,
    pub body_friction: f32,
    /// Scale on the `mass / dt * depth^2` penalty force
    pub collision_stiffness: f32,
    pub max_collision_force: f32,
    pub max_health: i32,
    pub countdown_time: f32,
    /// Seconds a wreck stays visible before it is hidden
    pub wreck_time: f32,
    /// Seconds from death to respawn
    pub death_timeout: f32,
    pub front_wheels: WheelConfig,
    pub rear_wheels: WheelConfig,
    pub gun: TurretConfig,
    pub cannon: TurretConfig,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        let bottom = -0.45;
        let top = 0.5;
        Self {
            mass: 1500.0,
            inertia_radius: 2.0,
            max_speed: 60.0,
            max_angular_speed: 8.0,
            engine_rate: 2.5,
            max_steering: 0.6,
            steering_rate: 2.0,
            high_speed_steering: 0.35,
            drag: 0.6,
            thrust: 25_000.0,
            align_strength: 30_000.0,
            align_dead_zone: 0.15,
            angular_damping: 1_500.0,
            collision_spheres: vec![
                SphereSpec::new(Vec3::new(0.0, 0.1, 1.1), 1.1),
                SphereSpec::new(Vec3::new(0.0, 0.1, -1.1), 1.1),
            ],
            surface_points: vec![
                Vec3::new(-1.0, bottom, 2.1),
                Vec3::new(1.0, bottom, 2.1),
                Vec3::new(-1.0, bottom, -2.1),
                Vec3::new(1.0, bottom, -2.1),
                Vec3::new(-1.0, top, 2.1),
                Vec3::new(1.0, top, 2.1),
                Vec3::new(-1.0, top, -2.1),
                Vec3::new(1.0, top, -2.1),
                Vec3::new(0.0, top + 0.5, 0.0),
            ],
            hit_box: Vec3::new(1.1, 0.8, 2.2),
            body_friction: 0.6,
            collision_stiffness: 1.0,
            max_collision_force: 200_000.0,
            max_health: 100,
            countdown_time: 3.0,
            wreck_time: 3.0,
            death_timeout: 5.0,
            front_wheels: WheelConfig::default(),
            rear_wheels: WheelConfig::rear_default(),
            gun: TurretConfig::default(),
            cannon: TurretConfig::cannon_default(),
        }
    }
}

impl VehicleConfig {
    /// Scalar moment of inertia of the equivalent solid sphere
    pub fn inertia(&self) -> f32 {
        0.4 * self.mass * self.inertia_radius * self.inertia_radius
    }

    /// Height of the body origin above flat ground when the suspension
    /// carries the full weight at rest.
    pub fn rest_height(&self, gravity: f32) -> f32 {
        let load = self.mass * gravity / 4.0;
        let axle = |w: &WheelConfig| {
            let compression = (load / w.stiffness).sqrt().min(w.travel);
            w.radius - w.connection.y - compression
        };
        0.5 * (axle(&self.front_wheels) + axle(&self.rear_wheels))
    }

    /// Radius of a sphere around the body origin enclosing all collision spheres
    pub fn bounding_radius(&self) -> f32 {
        self.collision_spheres
            .iter()
            .map(|s| s.offset.length() + s.radius)
            .fold(0.0, f32::max)
    }
}

/// One weapon type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaponConfig {
    /// Seconds between shots
    pub fire_interval: f32,
    pub speed: f32,
    pub damage: i32,
    pub lifetime: f32,
    pub size: f32,
    pub gravity_scale: f32,
    /// Velocity decay per second
    pub drag: f32,
}

impl Default for WeaponConfig {
    fn default() -> Self {
        Self {
            fire_interval: 0.1,
            speed: 250.0,
            damage: 4,
            lifetime: 2.0,
            size: 0.1,
            gravity_scale: 0.2,
            drag: 0.05,
        }
    }
}

/// Gun and cannon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaponsConfig {
    pub bullet: WeaponConfig,
    pub shell: WeaponConfig,
}

impl Default for WeaponsConfig {
    fn default() -> Self {
        Self {
            bullet: WeaponConfig::default(),
            shell: WeaponConfig {
                fire_interval: 1.5,
                speed: 120.0,
                damage: 35,
                lifetime: 6.0,
                size: 0.3,
                gravity_scale: 1.0,
                drag: 0.01,
            },
        }
    }
}

/// Collision shape and spawn weight of one static object type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectShape {
    /// Relative weight in the placement die roll
    pub weight: f32,
    /// Spheres relative to the object's ground position
    pub spheres: Vec<SphereSpec>,
}

impl ObjectShape {
    /// Horizontal radius used for placement spacing and bucket indexing
    pub fn footprint(&self) -> f32 {
        self.spheres
            .iter()
            .map(|s| (s.offset.x * s.offset.x + s.offset.z * s.offset.z).sqrt() + s.radius)
            .fold(0.0, f32::max)
    }
}

/// Heightfield and static object generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// World extent on both axes, centered on the origin
    pub size: f32,
    /// Height samples per side
    pub resolution: usize,
    pub height_scale: f32,
    pub mode: TerrainMode,
    /// Multiplier on the base count of one object per 1000 m^2
    pub object_density: f32,
    pub bucket_size: f32,
    pub rock: ObjectShape,
    pub pine: ObjectShape,
    pub oak: ObjectShape,
    /// Keep objects this far from the border walls
    pub border_margin: f32,
    /// Placement attempts allowed per requested object
    pub placement_attempts: usize,
    /// Attempts to find a clear respawn point
    pub spawn_attempts: usize,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            size: 300.0,
            resolution: 129,
            height_scale: 20.0,
            mode: TerrainMode::Hills,
            object_density: 1.0,
            bucket_size: 12.0,
            rock: ObjectShape {
                weight: 0.2,
                spheres: vec![SphereSpec::new(Vec3::new(0.0, 0.4, 0.0), 1.6)],
            },
            pine: ObjectShape {
                weight: 0.5,
                spheres: vec![
                    SphereSpec::new(Vec3::new(0.0, 1.5, 0.0), 0.6),
                    SphereSpec::new(Vec3::new(0.0, 3.5, 0.0), 1.4),
                ],
            },
            oak: ObjectShape {
                weight: 0.3,
                spheres: vec![
                    SphereSpec::new(Vec3::new(0.0, 1.2, 0.0), 0.7),
                    SphereSpec::new(Vec3::new(0.0, 3.2, 0.0), 2.0),
                ],
            },
            border_margin: 12.0,
            placement_attempts: 30,
            spawn_attempts: 64,
        }
    }
}

/// Pool sizes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    pub cars: usize,
    pub projectiles: usize,
    pub particles: usize,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            cars: 8,
            projectiles: 512,
            particles: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SimConfig::from_json(r#"{ "terrain": { "size": 200.0, "mode": "flat" } }"#)
            .unwrap();
        assert_eq!(config.terrain.size, 200.0);
        assert_eq!(config.terrain.mode, TerrainMode::Flat);
        assert_eq!(config.terrain.resolution, 129);
        assert_eq!(config.vehicle.mass, 1500.0);
    }

    #[test]
    fn test_rejects_zero_dt() {
        let mut config = SimConfig::default();
        config.physics.fixed_dt = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rest_height_leaves_body_clear_of_ground() {
        let vehicle = VehicleConfig::default();
        let rest = vehicle.rest_height(9.81);
        assert!((rest - 0.6).abs() < 0.01, "rest height {}", rest);
        let lowest = vehicle
            .surface_points
            .iter()
            .map(|p| p.y)
            .fold(f32::INFINITY, f32::min);
        assert!(rest + lowest > 0.05);
    }

    #[test]
    fn test_terrain_mode_byte_round_trip() {
        for mode in [TerrainMode::Flat, TerrainMode::Hills, TerrainMode::Valley] {
            assert_eq!(TerrainMode::from_u8(mode.to_u8()), Some(mode));
        }
        assert_eq!(TerrainMode::from_u8(9), None);
    }
}
