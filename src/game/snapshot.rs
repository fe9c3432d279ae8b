//! Wire snapshot of a car and blend-based reconciliation

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::car::{AliveState, Car, WHEEL_COUNT};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WheelState {
    pub suspension_offset: f32,
    pub suspension_speed: f32,
    pub spin_speed: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TurretState {
    pub yaw: f32,
    pub pitch: f32,
}

/// The only form of car state sent over the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub slot: u8,
    pub tick: u32,
    pub health: i32,
    pub alive: AliveState,
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub steering: f32,
    pub wheels: [WheelState; WHEEL_COUNT],
    /// Gun, then cannon
    pub turrets: [TurretState; 2],
}

impl PlayerState {
    pub fn capture(slot: u8, tick: u32, car: &Car) -> Self {
        Self {
            slot,
            tick,
            health: car.health,
            alive: car.alive_state(),
            position: car.body.position,
            rotation: car.body.rotation,
            velocity: car.body.velocity,
            angular_velocity: car.body.angular_velocity,
            steering: car.steering,
            wheels: std::array::from_fn(|i| WheelState {
                suspension_offset: car.wheels[i].suspension_offset,
                suspension_speed: car.wheels[i].suspension_speed,
                spin_speed: car.wheels[i].spin_speed,
            }),
            turrets: [
                TurretState {
                    yaw: car.gun.yaw,
                    pitch: car.gun.pitch,
                },
                TurretState {
                    yaw: car.cannon.yaw,
                    pitch: car.cannon.pitch,
                },
            ],
        }
    }

    /// Blend `car` toward this snapshot by `factor`; 1 copies it exactly.
    /// Health and alive state are taken as-is.
    pub fn apply(&self, car: &mut Car, factor: f32) {
        let f = factor.clamp(0.0, 1.0);
        let body = &mut car.body;
        body.position = body.position.lerp(self.position, f);
        body.rotation = body.rotation.slerp(self.rotation, f).normalize();
        body.velocity = body.velocity.lerp(self.velocity, f);
        body.angular_velocity = body.angular_velocity.lerp(self.angular_velocity, f);
        car.steering += (self.steering - car.steering) * f;

        for (wheel, state) in car.wheels.iter_mut().zip(&self.wheels) {
            wheel.suspension_offset += (state.suspension_offset - wheel.suspension_offset) * f;
            wheel.suspension_speed += (state.suspension_speed - wheel.suspension_speed) * f;
            wheel.spin_speed += (state.spin_speed - wheel.spin_speed) * f;
        }

        car.gun
            .sync_state(self.turrets[0].yaw, self.turrets[0].pitch, f, &car.body);
        car.cannon
            .sync_state(self.turrets[1].yaw, self.turrets[1].pitch, f, &car.body);

        car.health = self.health;
        car.set_alive_state(self.alive);
    }
}

/// Decides on which ticks player states go out
pub struct SnapshotSchedule {
    ticks_since_snapshot: u32,
    interval: u32,
}

impl SnapshotSchedule {
    pub fn new(interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            interval: interval.max(1),
        }
    }

    /// Count a tick; true when a snapshot is due
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Make the next check send, e.g. after a respawn
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.interval;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VehicleConfig;

    #[test]
    fn test_schedule_interval_and_force() {
        let mut schedule = SnapshotSchedule::new(3);
        let sent: Vec<bool> = (0..6).map(|_| schedule.should_send()).collect();
        assert_eq!(sent, vec![false, false, true, false, false, true]);
        schedule.force_next();
        assert!(schedule.should_send());
    }

    #[test]
    fn test_partial_blend_moves_part_way() {
        let vehicle = VehicleConfig::default();
        let mut source = Car::new(1, "a", &vehicle);
        source.spawn(Vec3::new(10.0, 2.0, 0.0), 0.0, &vehicle);
        let state = PlayerState::capture(0, 1, &source);

        let mut target = Car::new(1, "a", &vehicle);
        target.spawn(Vec3::ZERO, 0.0, &vehicle);
        state.apply(&mut target, 0.25);
        assert!((target.body.position.x - 2.5).abs() < 1e-5);
        assert!((target.body.position.y - 0.5).abs() < 1e-5);
    }
}
