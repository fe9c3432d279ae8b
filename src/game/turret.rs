//! Yaw/pitch aim tracking for a vehicle-mounted weapon

use std::f32::consts::{PI, TAU};

use glam::{Quat, Vec3};

use crate::config::TurretConfig;
use crate::util::math::approach;

use super::body::RigidBody;

#[derive(Debug, Clone)]
pub struct Turret {
    config: TurretConfig,
    pub yaw: f32,
    pub pitch: f32,
    /// World point the driver wants to hit
    pub target: Vec3,
    /// World point the barrel currently points at, refreshed by the scene
    pub aim_point: Vec3,
    pub position: Vec3,
    pub rotation: Quat,
    pub last_position: Vec3,
    pub last_rotation: Quat,
}

impl Turret {
    pub fn new(config: &TurretConfig) -> Self {
        Self {
            config: config.clone(),
            yaw: 0.0,
            pitch: 0.0,
            target: Vec3::ZERO,
            aim_point: Vec3::ZERO,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            last_position: Vec3::ZERO,
            last_rotation: Quat::IDENTITY,
        }
    }

    pub fn config(&self) -> &TurretConfig {
        &self.config
    }

    pub fn reset(&mut self, body: &RigidBody) {
        self.yaw = 0.0;
        self.pitch = 0.0;
        self.attach(body);
        self.target = self.muzzle() + self.direction() * self.config.aim_range;
        self.aim_point = self.target;
        self.store_last();
    }

    pub fn store_last(&mut self) {
        self.last_position = self.position;
        self.last_rotation = self.rotation;
    }

    /// Barrel direction in world space
    pub fn direction(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }

    pub fn muzzle(&self) -> Vec3 {
        self.position + self.direction() * self.config.barrel_length
    }

    /// Turn toward `target` at the configured rate, then clamp to limits.
    /// A target outside the limits is never reached.
    pub fn update(&mut self, dt: f32, body: &RigidBody) {
        let pivot = body.to_world(self.config.connection);
        let local = body.rotation.inverse() * (self.target - pivot);
        let horizontal = (local.x * local.x + local.z * local.z).sqrt();
        let step = self.config.rotation_speed * dt;

        if local.length_squared() > 1.0e-6 {
            let wanted_yaw = local.x.atan2(local.z);
            let wanted_pitch = local.y.atan2(horizontal);
            let yaw_delta = wrap_angle(wanted_yaw - self.yaw);
            self.yaw = wrap_angle(self.yaw + approach(0.0, yaw_delta, step));
            self.pitch = approach(self.pitch, wanted_pitch, step);
        }
        self.clamp_angles();
        self.attach(body);
    }

    /// Blend yaw and pitch toward a received snapshot
    pub fn sync_state(&mut self, yaw: f32, pitch: f32, factor: f32, body: &RigidBody) {
        self.yaw = wrap_angle(self.yaw + wrap_angle(yaw - self.yaw) * factor);
        self.pitch += (pitch - self.pitch) * factor;
        self.clamp_angles();
        self.attach(body);
    }

    fn clamp_angles(&mut self) {
        self.yaw = self.yaw.clamp(self.config.min_yaw, self.config.max_yaw);
        self.pitch = self.pitch.clamp(self.config.min_pitch, self.config.max_pitch);
    }

    fn attach(&mut self, body: &RigidBody) {
        self.position = body.to_world(self.config.connection);
        self.rotation =
            body.rotation * Quat::from_rotation_y(self.yaw) * Quat::from_rotation_x(-self.pitch);
    }
}

/// Map an angle into [-PI, PI)
fn wrap_angle(angle: f32) -> f32 {
    (angle + PI).rem_euclid(TAU) - PI
}
