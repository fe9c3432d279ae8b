//! Suspension and tire model for one wheel
//!
//! The suspension offset is positive when compressed. The spring force is
//! `offset^2 * stiffness`, signed against the offset, so the wheel stiffens
//! sharply toward full compression.

use glam::{Quat, Vec3};

use crate::config::WheelConfig;
use crate::util::math::{clamp_length, range_map, signed_square};

use super::body::RigidBody;
use super::terrain::Terrain;

/// Per-tick inputs shared by all four wheels of a car
#[derive(Debug, Clone, Copy)]
pub struct WheelDrive {
    pub steering: f32,
    /// Body mass carried by this wheel
    pub shared_mass: f32,
    /// Signed engine power in [-1, 1]
    pub engine_power: f32,
    pub handbrake: bool,
    pub max_speed: f32,
    pub gravity: f32,
}

/// Force a grounded wheel applies to its body
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelForce {
    pub force: Vec3,
    /// World-space application point
    pub point: Vec3,
}

#[derive(Debug, Clone)]
pub struct Wheel {
    config: WheelConfig,
    /// Body-space connection point
    pub connection: Vec3,
    pub suspension_offset: f32,
    pub suspension_speed: f32,
    /// Angular speed about the axle (rad/s), positive rolls forward
    pub spin_speed: f32,
    /// Accumulated roll angle, for rendering
    pub roll: f32,
    pub grounded: bool,
    last_friction: Vec3,
}

impl Wheel {
    /// `mirror` flips the configured connection to the right side
    pub fn new(config: &WheelConfig, mirror: bool) -> Self {
        let mut connection = config.connection;
        if mirror {
            connection.x = -connection.x;
        }
        Self {
            config: config.clone(),
            connection,
            suspension_offset: 0.0,
            suspension_speed: 0.0,
            spin_speed: 0.0,
            roll: 0.0,
            grounded: false,
            last_friction: Vec3::ZERO,
        }
    }

    pub fn radius(&self) -> f32 {
        self.config.radius
    }

    pub fn steers(&self) -> bool {
        self.config.steers
    }

    pub fn reset(&mut self) {
        self.suspension_offset = 0.0;
        self.suspension_speed = 0.0;
        self.spin_speed = 0.0;
        self.grounded = false;
        self.last_friction = Vec3::ZERO;
    }

    /// World orientation of the wheel including steering
    pub fn orientation(&self, body: &RigidBody, steering: f32) -> Quat {
        if self.config.steers {
            body.rotation * Quat::from_rotation_y(steering)
        } else {
            body.rotation
        }
    }

    /// World position of the wheel hub
    pub fn hub(&self, body: &RigidBody) -> Vec3 {
        body.to_world(self.connection) + body.up() * self.suspension_offset
    }

    /// Run one step. Returns the force on the body when the wheel touches
    /// the ground.
    pub fn update(
        &mut self,
        dt: f32,
        body: &RigidBody,
        drive: &WheelDrive,
        terrain: &Terrain,
    ) -> Option<WheelForce> {
        let cfg = &self.config;
        let connection = body.to_world(self.connection);
        let up = body.up();
        let forward = self.orientation(body, drive.steering) * Vec3::Z;
        let start_offset = self.suspension_offset;

        // Free spring motion of the unsprung mass
        let spring = -signed_square(self.suspension_offset) * cfg.stiffness;
        self.suspension_speed += spring / cfg.mass * dt;
        self.suspension_speed *= (1.0 - cfg.free_damping * dt).max(0.0);
        self.suspension_offset =
            (self.suspension_offset + self.suspension_speed * dt).clamp(-cfg.travel, cfg.travel);

        let max_spin = if drive.handbrake {
            0.0
        } else {
            drive.max_speed / cfg.radius
        };
        self.spin_speed += drive.engine_power * cfg.engine_torque / cfg.inertia * dt;
        self.spin_speed *= (1.0 - cfg.rolling_resistance * dt).max(0.0);
        self.spin_speed = self.spin_speed.clamp(-max_spin, max_spin);

        let bottom = connection + up * (self.suspension_offset - cfg.radius);
        let (ground, normal) = terrain.height_at(bottom.x, bottom.z);
        let penetration = ground - bottom.y;
        self.grounded = penetration > 0.0;

        let result = if self.grounded {
            let up_y = up.y.max(0.1);
            self.suspension_offset =
                (self.suspension_offset + penetration / up_y).clamp(-cfg.travel, cfg.travel);
            self.suspension_speed = (self.suspension_offset - start_offset) / dt;

            let contact = connection + up * (self.suspension_offset - cfg.radius);
            let point_velocity = body.point_velocity(connection);

            let spring_force = signed_square(self.suspension_offset) * cfg.stiffness;
            let damping_force = -cfg.damping * point_velocity.dot(normal);
            let normal_force = (spring_force + damping_force).max(0.0);

            // Contact velocity one tick ahead, with the rolling surface
            // speed of the tire removed
            let predicted = point_velocity + Vec3::NEG_Y * drive.gravity * dt
                - forward * self.spin_speed * cfg.radius;
            let tangential = predicted - normal * predicted.dot(normal);
            let slip = tangential.length();
            let mu = cfg.tire_friction + range_map(slip, 5.0, 30.0, 0.0, -0.3);
            let friction = clamp_length(
                -tangential * drive.shared_mass / dt,
                spring_force.max(0.0) * mu,
            );
            let friction = (friction + self.last_friction) * 0.5;
            self.last_friction = friction;

            self.spin_speed -= friction.dot(forward) * cfg.radius / cfg.inertia * dt;
            if drive.handbrake {
                let lock = cfg.brake_torque / cfg.inertia * dt;
                self.spin_speed -= self.spin_speed.clamp(-lock, lock);
            }

            Some(WheelForce {
                force: normal * normal_force + friction,
                point: contact,
            })
        } else {
            self.last_friction = Vec3::ZERO;
            None
        };

        self.roll = (self.roll + self.spin_speed * dt) % std::f32::consts::TAU;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TerrainConfig, TerrainMode, VehicleConfig};

    fn flat_terrain() -> Terrain {
        let config = TerrainConfig {
            size: 100.0,
            resolution: 33,
            mode: TerrainMode::Flat,
            object_density: 0.0,
            ..TerrainConfig::default()
        };
        Terrain::generate(&config, 0)
    }

    fn drive(handbrake: bool) -> WheelDrive {
        WheelDrive {
            steering: 0.0,
            shared_mass: 375.0,
            engine_power: 0.0,
            handbrake,
            max_speed: 60.0,
            gravity: 9.81,
        }
    }

    #[test]
    fn test_airborne_wheel_applies_no_force() {
        let terrain = flat_terrain();
        let mut body = RigidBody::new(1500.0, 2400.0);
        body.place(Vec3::new(0.0, 10.0, 0.0), Quat::IDENTITY);
        let mut wheel = Wheel::new(&VehicleConfig::default().front_wheels, false);
        assert!(wheel.update(0.02, &body, &drive(false), &terrain).is_none());
        assert!(!wheel.grounded);
    }

    #[test]
    fn test_free_spring_grows_with_square_of_offset() {
        let terrain = flat_terrain();
        let mut body = RigidBody::new(1500.0, 2400.0);
        body.place(Vec3::new(0.0, 10.0, 0.0), Quat::IDENTITY);
        let config = VehicleConfig::default().front_wheels;

        let kick = |offset: f32| {
            let mut wheel = Wheel::new(&config, false);
            wheel.suspension_offset = offset;
            wheel.suspension_speed = 0.0;
            wheel.update(0.02, &body, &drive(false), &terrain);
            wheel.suspension_speed
        };

        let small = kick(0.05);
        assert!(small < 0.0);
        assert!((kick(-0.05) + small).abs() < 1e-6);
        assert!((kick(0.1) / small - 4.0).abs() < 1e-3);
    }

    #[test]
    fn test_suspension_converges_at_rest() {
        let terrain = flat_terrain();
        let vehicle = VehicleConfig::default();
        let mut body = RigidBody::new(vehicle.mass, vehicle.inertia());
        body.place(
            Vec3::new(0.0, vehicle.rest_height(9.81), 0.0),
            Quat::IDENTITY,
        );
        let mut wheel = Wheel::new(&vehicle.front_wheels, false);

        let mut last = None;
        for _ in 0..2000 {
            last = wheel.update(0.02, &body, &drive(false), &terrain);
            assert!(wheel.suspension_offset.abs() <= vehicle.front_wheels.travel);
            assert!(wheel.suspension_speed.is_finite());
        }

        let force = last.expect("wheel stays grounded");
        let load = vehicle.mass * 9.81 / 4.0;
        assert!((force.force.y - load).abs() / load < 0.02);
        assert!(wheel.suspension_speed.abs() < 1e-3);
        assert!(force.force.x.abs() < 1e-3 && force.force.z.abs() < 1e-3);
    }

    #[test]
    fn test_handbrake_locks_spin() {
        let terrain = flat_terrain();
        let mut body = RigidBody::new(1500.0, 2400.0);
        body.place(Vec3::new(0.0, 10.0, 0.0), Quat::IDENTITY);
        let mut wheel = Wheel::new(&VehicleConfig::default().rear_wheels, false);
        wheel.spin_speed = 40.0;
        wheel.update(0.02, &body, &drive(true), &terrain);
        assert_eq!(wheel.spin_speed, 0.0);
    }

    #[test]
    fn test_engine_spins_free_wheel() {
        let terrain = flat_terrain();
        let mut body = RigidBody::new(1500.0, 2400.0);
        body.place(Vec3::new(0.0, 10.0, 0.0), Quat::IDENTITY);
        let mut wheel = Wheel::new(&VehicleConfig::default().front_wheels, true);
        assert!(wheel.connection.x > 0.0);
        let mut d = drive(false);
        d.engine_power = 1.0;
        for _ in 0..50 {
            wheel.update(0.02, &body, &d, &terrain);
        }
        assert!(wheel.spin_speed > 0.0);
        assert!(wheel.spin_speed <= 60.0 / wheel.radius() + 1e-3);
    }
}
