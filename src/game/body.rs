//! Rigid body state and semi-implicit Euler integration

use glam::{Quat, Vec3};

use crate::util::math::{clamp_length, finite_or_zero, snap_small, SNAP_EPSILON};

/// Position, orientation and the forces accumulated for the current tick
#[derive(Debug, Clone, PartialEq)]
pub struct RigidBody {
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub force: Vec3,
    pub moment: Vec3,
    pub mass: f32,
    /// Scalar moment of inertia
    pub inertia: f32,
    /// Transform at the start of the current tick, for render interpolation
    pub last_position: Vec3,
    pub last_rotation: Quat,
}

impl RigidBody {
    pub fn new(mass: f32, inertia: f32) -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            force: Vec3::ZERO,
            moment: Vec3::ZERO,
            mass,
            inertia,
            last_position: Vec3::ZERO,
            last_rotation: Quat::IDENTITY,
        }
    }

    /// Teleport, clearing all motion
    pub fn place(&mut self, position: Vec3, rotation: Quat) {
        self.position = position;
        self.rotation = rotation.normalize();
        self.velocity = Vec3::ZERO;
        self.angular_velocity = Vec3::ZERO;
        self.reset_forces();
        self.store_last();
    }

    pub fn reset_forces(&mut self) {
        self.force = Vec3::ZERO;
        self.moment = Vec3::ZERO;
    }

    pub fn store_last(&mut self) {
        self.last_position = self.position;
        self.last_rotation = self.rotation;
    }

    pub fn add_force(&mut self, force: Vec3) {
        self.force += force;
    }

    /// Apply `force` at world `point`, adding the induced moment
    pub fn add_force_at(&mut self, force: Vec3, point: Vec3) {
        self.force += force;
        self.moment += (point - self.position).cross(force);
    }

    pub fn add_moment(&mut self, moment: Vec3) {
        self.moment += moment;
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    /// Body-space point to world space
    pub fn to_world(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation * local
    }

    /// Velocity of the body material at world `point`
    pub fn point_velocity(&self, point: Vec3) -> Vec3 {
        self.velocity + self.angular_velocity.cross(point - self.position)
    }

    /// Advance one step. Velocities are updated first and the new values
    /// move the transform, which is renormalized afterwards.
    pub fn integrate(&mut self, dt: f32, max_speed: f32, max_angular_speed: f32) {
        let force = snap_small(finite_or_zero(self.force), SNAP_EPSILON);
        let moment = snap_small(finite_or_zero(self.moment), SNAP_EPSILON);

        let velocity = self.velocity + force / self.mass * dt;
        self.velocity = snap_small(
            clamp_length(finite_or_zero(velocity), max_speed),
            SNAP_EPSILON,
        );
        let angular = self.angular_velocity + moment / self.inertia * dt;
        self.angular_velocity = snap_small(
            clamp_length(finite_or_zero(angular), max_angular_speed),
            SNAP_EPSILON,
        );

        self.position += self.velocity * dt;

        let spin = self.angular_velocity * dt;
        let angle = spin.length();
        if angle > 0.0 {
            self.rotation = Quat::from_axis_angle(spin / angle, angle) * self.rotation;
        }
        self.rotation = self.rotation.normalize();
    }

    /// Transform between the last stored tick and now, `alpha` in [0, 1]
    pub fn interpolated(&self, alpha: f32) -> (Vec3, Quat) {
        let alpha = alpha.clamp(0.0, 1.0);
        (
            self.last_position.lerp(self.position, alpha),
            self.last_rotation.slerp(self.rotation, alpha),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_fall_is_semi_implicit() {
        let mut body = RigidBody::new(2.0, 1.0);
        body.add_force(Vec3::new(0.0, -20.0, 0.0));
        body.integrate(0.5, 100.0, 10.0);
        assert_eq!(body.velocity, Vec3::new(0.0, -5.0, 0.0));
        assert_eq!(body.position, Vec3::new(0.0, -2.5, 0.0));
    }

    #[test]
    fn test_speed_is_clamped() {
        let mut body = RigidBody::new(1.0, 1.0);
        body.add_force(Vec3::new(1.0e6, 0.0, 0.0));
        body.add_moment(Vec3::new(0.0, 1.0e6, 0.0));
        body.integrate(0.1, 30.0, 5.0);
        assert!((body.velocity.length() - 30.0).abs() < 1e-3);
        assert!((body.angular_velocity.length() - 5.0).abs() < 1e-3);
    }

    #[test]
    fn test_tiny_motion_snaps_to_zero() {
        let mut body = RigidBody::new(1.0, 1.0);
        body.velocity = Vec3::new(1.0e-6, 2.0, -3.0e-5);
        body.integrate(0.02, 100.0, 10.0);
        assert_eq!(body.velocity.x, 0.0);
        assert_eq!(body.velocity.z, 0.0);
        assert_eq!(body.velocity.y, 2.0);
    }

    #[test]
    fn test_off_center_force_spins_body() {
        let mut body = RigidBody::new(1.0, 1.0);
        body.add_force_at(Vec3::new(0.0, 0.0, 1.0), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(body.moment, Vec3::new(0.0, -1.0, 0.0));
    }

    #[test]
    fn test_rotation_stays_normalized() {
        let mut body = RigidBody::new(1.0, 1.0);
        body.angular_velocity = Vec3::new(3.0, 1.0, -2.0);
        for _ in 0..1000 {
            body.integrate(0.02, 100.0, 10.0);
        }
        assert!((body.rotation.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_non_finite_force_is_ignored() {
        let mut body = RigidBody::new(1.0, 1.0);
        body.add_force(Vec3::new(f32::NAN, 0.0, 0.0));
        body.integrate(0.02, 100.0, 10.0);
        assert!(body.position.is_finite());
        assert_eq!(body.velocity, Vec3::ZERO);
    }
}
