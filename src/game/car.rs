//! Armed vehicle: rigid body, four wheels, gun and cannon turrets

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::config::{VehicleConfig, WeaponsConfig};
use crate::geom::{Aabb, Contact, Ray, RayHit, Sphere};
use crate::util::math::{approach, clamp_length, range_map, signed_square};
use crate::util::pool::Handle;

use super::body::RigidBody;
use super::projectile::ProjectileKind;
use super::terrain::Terrain;
use super::turret::Turret;
use super::wheel::{Wheel, WheelDrive};

/// Wheel order: front left, front right, rear left, rear right
pub const WHEEL_COUNT: usize = 4;

/// Lifecycle of a car slot. Travels as its one-byte code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AliveState {
    /// Just spawned: simulated, ignores controls, cannot be damaged
    #[default]
    Countdown,
    Alive,
    /// Wreck still simulated
    Dead,
    /// Wreck removed from physics and hit tests until respawn
    Hidden,
}

impl AliveState {
    pub fn to_u8(self) -> u8 {
        match self {
            AliveState::Countdown => 0,
            AliveState::Alive => 1,
            AliveState::Dead => 2,
            AliveState::Hidden => 3,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(AliveState::Countdown),
            1 => Some(AliveState::Alive),
            2 => Some(AliveState::Dead),
            3 => Some(AliveState::Hidden),
            _ => None,
        }
    }

    pub fn is_simulated(self) -> bool {
        self != AliveState::Hidden
    }
}

impl From<AliveState> for u8 {
    fn from(state: AliveState) -> u8 {
        state.to_u8()
    }
}

impl TryFrom<u8> for AliveState {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        AliveState::from_u8(value).ok_or_else(|| format!("invalid alive state {value}"))
    }
}

/// Driver controls for one tick
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CarInput {
    /// -1 (left) to 1 (right)
    pub steering: f32,
    /// -1 (reverse) to 1 (forward)
    pub accel: f32,
    /// 0 to 1
    pub thrust: f32,
    /// World point the turrets track
    pub aim: Vec3,
    pub fire_gun: bool,
    pub fire_cannon: bool,
    pub handbrake: bool,
}

impl CarInput {
    /// Clamp axes to their valid ranges and drop non-finite values
    pub fn sanitized(self) -> Self {
        let axis = |v: f32, lo: f32| if v.is_finite() { v.clamp(lo, 1.0) } else { 0.0 };
        Self {
            steering: axis(self.steering, -1.0),
            accel: axis(self.accel, -1.0),
            thrust: axis(self.thrust, 0.0),
            aim: if self.aim.is_finite() { self.aim } else { Vec3::ZERO },
            ..self
        }
    }
}

/// Collision spheres another car exposes for this tick
#[derive(Debug, Clone)]
pub struct CarCollider {
    pub handle: Handle,
    pub spheres: Vec<Sphere>,
}

/// Shared, read-only world data a car needs to step
pub struct CarEnv<'a> {
    pub terrain: &'a Terrain,
    pub vehicle: &'a VehicleConfig,
    pub gravity: f32,
    /// Colliders of every simulated car, possibly including this one
    pub colliders: &'a [CarCollider],
}

/// Lifecycle change produced by [`Car::advance_lifecycle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Activated,
    Hidden,
    RespawnDue,
}

#[derive(Debug, Clone)]
pub struct Car {
    /// Stable player id
    pub guid: u64,
    pub name: String,
    pub body: RigidBody,
    pub health: i32,
    state: AliveState,
    /// Seconds since the last spawn or death
    timer: f32,
    /// Signed, in [-1, 1]
    pub engine_power: f32,
    pub steering: f32,
    pub input: CarInput,
    pub wheels: [Wheel; WHEEL_COUNT],
    pub gun: Turret,
    pub cannon: Turret,
    gun_cooldown: f32,
    cannon_cooldown: f32,
    /// Contacts resolved in the last step
    pub contact_count: usize,
}

impl Car {
    pub fn new(guid: u64, name: impl Into<String>, vehicle: &VehicleConfig) -> Self {
        let mut car = Self {
            guid,
            name: name.into(),
            body: RigidBody::new(vehicle.mass, vehicle.inertia()),
            health: vehicle.max_health,
            state: AliveState::Countdown,
            timer: 0.0,
            engine_power: 0.0,
            steering: 0.0,
            input: CarInput::default(),
            wheels: [
                Wheel::new(&vehicle.front_wheels, false),
                Wheel::new(&vehicle.front_wheels, true),
                Wheel::new(&vehicle.rear_wheels, false),
                Wheel::new(&vehicle.rear_wheels, true),
            ],
            gun: Turret::new(&vehicle.gun),
            cannon: Turret::new(&vehicle.cannon),
            gun_cooldown: 0.0,
            cannon_cooldown: 0.0,
            contact_count: 0,
        };
        car.spawn(Vec3::ZERO, 0.0, vehicle);
        car
    }

    pub fn alive_state(&self) -> AliveState {
        self.state
    }

    /// Overwrite the alive state, as received from the authority
    pub fn set_alive_state(&mut self, state: AliveState) {
        if state != self.state {
            if matches!(state, AliveState::Countdown | AliveState::Dead)
                || (state == AliveState::Alive && self.state != AliveState::Countdown)
            {
                self.timer = 0.0;
            }
            self.state = state;
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state == AliveState::Alive
    }

    /// Only alive cars take damage
    pub fn is_vulnerable(&self) -> bool {
        self.state == AliveState::Alive
    }

    /// Reset to full health at `position` facing `yaw`, entering countdown
    pub fn spawn(&mut self, position: Vec3, yaw: f32, vehicle: &VehicleConfig) {
        self.body.place(position, Quat::from_rotation_y(yaw));
        self.health = vehicle.max_health;
        self.state = AliveState::Countdown;
        self.timer = 0.0;
        self.engine_power = 0.0;
        self.steering = 0.0;
        self.gun_cooldown = 0.0;
        self.cannon_cooldown = 0.0;
        for wheel in &mut self.wheels {
            wheel.reset();
        }
        self.gun.reset(&self.body);
        self.cannon.reset(&self.body);
        self.input.aim = self.gun.target;
    }

    /// Health reached zero
    pub fn kill(&mut self) {
        self.health = 0;
        self.state = AliveState::Dead;
        self.timer = 0.0;
    }

    /// Timeout-driven transitions; only the authority calls this
    pub fn advance_lifecycle(&mut self, dt: f32, vehicle: &VehicleConfig) -> Option<LifecycleEvent> {
        self.timer += dt;
        match self.state {
            AliveState::Countdown if self.timer >= vehicle.countdown_time => {
                self.state = AliveState::Alive;
                self.timer = 0.0;
                Some(LifecycleEvent::Activated)
            }
            AliveState::Dead | AliveState::Hidden if self.timer >= vehicle.death_timeout => {
                Some(LifecycleEvent::RespawnDue)
            }
            AliveState::Dead if self.timer >= vehicle.wreck_time => {
                self.state = AliveState::Hidden;
                Some(LifecycleEvent::Hidden)
            }
            _ => None,
        }
    }

    pub fn store_last(&mut self) {
        self.body.store_last();
        self.gun.store_last();
        self.cannon.store_last();
    }

    /// Render transform between the previous and current tick
    pub fn interpolated_transform(&self, alpha: f32) -> (Vec3, Quat) {
        self.body.interpolated(alpha)
    }

    /// Body collision spheres in world space
    pub fn collider(&self, handle: Handle, vehicle: &VehicleConfig) -> CarCollider {
        CarCollider {
            handle,
            spheres: vehicle
                .collision_spheres
                .iter()
                .map(|s| Sphere::new(self.body.to_world(s.offset), s.radius))
                .collect(),
        }
    }

    /// Ray test against the body hit box
    pub fn intersect_ray(&self, ray: &Ray, max_distance: f32, vehicle: &VehicleConfig) -> Option<RayHit> {
        let inverse = self.body.rotation.inverse();
        let local = Ray {
            origin: inverse * (ray.origin - self.body.position),
            direction: inverse * ray.direction,
        };
        let hit = Aabb::from_center_half_extents(Vec3::ZERO, vehicle.hit_box)
            .intersect_ray(&local, max_distance)?;
        Some(RayHit {
            distance: hit.distance,
            point: ray.at(hit.distance),
            normal: self.body.rotation * hit.normal,
        })
    }

    /// Step the car once
    pub fn update(&mut self, dt: f32, handle: Handle, env: &CarEnv) {
        if !self.state.is_simulated() {
            return;
        }
        let vehicle = env.vehicle;
        let input = if self.is_alive() {
            self.input
        } else {
            CarInput {
                aim: self.input.aim,
                ..CarInput::default()
            }
        };

        self.body.reset_forces();
        self.body.add_force(Vec3::NEG_Y * env.gravity * self.body.mass);

        let up = self.body.up();
        let up_speed = self.body.velocity.dot(up);
        self.body.add_force(-up * signed_square(up_speed) * vehicle.drag);
        self.body.add_force(up * input.thrust * vehicle.thrust);
        self.apply_alignment(vehicle);

        self.engine_power = approach(
            self.engine_power,
            input.accel,
            vehicle.engine_rate * dt,
        );
        let speed_factor = range_map(
            self.body.velocity.length(),
            0.0,
            vehicle.max_speed,
            1.0,
            vehicle.high_speed_steering,
        );
        self.steering = approach(
            self.steering,
            input.steering * vehicle.max_steering * speed_factor,
            vehicle.steering_rate * dt,
        );

        let drive = WheelDrive {
            steering: self.steering,
            shared_mass: self.body.mass / WHEEL_COUNT as f32,
            engine_power: self.engine_power,
            handbrake: input.handbrake,
            max_speed: vehicle.max_speed,
            gravity: env.gravity,
        };
        for wheel in &mut self.wheels {
            if let Some(applied) = wheel.update(dt, &self.body, &drive, env.terrain) {
                self.body.add_force_at(applied.force, applied.point);
            }
        }

        self.update_collisions(dt, handle, env);
        self.body
            .integrate(dt, vehicle.max_speed, vehicle.max_angular_speed);

        self.gun.target = input.aim;
        self.cannon.target = input.aim;
        self.gun.update(dt, &self.body);
        self.cannon.update(dt, &self.body);
    }

    /// Quadratic restoring moment toward world up past a dead zone, plus
    /// angular damping
    fn apply_alignment(&mut self, vehicle: &VehicleConfig) {
        let up = self.body.up();
        let tilt = up.dot(Vec3::Y).clamp(-1.0, 1.0).acos();
        if tilt > vehicle.align_dead_zone {
            let axis = up
                .cross(Vec3::Y)
                .try_normalize()
                .unwrap_or_else(|| self.body.forward());
            self.body.add_moment(axis * tilt * tilt * vehicle.align_strength);
        }
        self.body
            .add_moment(-self.body.angular_velocity * vehicle.angular_damping);
    }

    fn gather_contacts(&self, handle: Handle, env: &CarEnv) -> Vec<Contact> {
        let mut contacts = Vec::new();
        let own = self.collider(handle, env.vehicle);

        for sphere in &own.spheres {
            if let Some(contact) = env.terrain.collide_sphere_with_objects(sphere) {
                contacts.push(contact);
            }
            for other in env.colliders.iter().filter(|c| c.handle != handle) {
                contacts.extend(other.spheres.iter().filter_map(|s| sphere.contact(s)));
            }
        }

        for local in &env.vehicle.surface_points {
            let point = self.body.to_world(*local);
            let (height, normal) = env.terrain.height_at(point.x, point.z);
            let depth = height - point.y;
            if depth > 0.0 {
                contacts.push(Contact {
                    point,
                    normal,
                    penetration: depth * normal.y,
                });
            }
        }
        contacts
    }

    /// Penalty forces, capped friction and normal velocity bleed, each
    /// divided by the number of contacts
    fn update_collisions(&mut self, dt: f32, handle: Handle, env: &CarEnv) {
        let contacts = self.gather_contacts(handle, env);
        self.contact_count = contacts.len();
        if contacts.is_empty() {
            return;
        }

        let vehicle = env.vehicle;
        let share = 1.0 / contacts.len() as f32;
        let mass = self.body.mass;

        for contact in &contacts {
            let normal_force = (mass / dt
                * contact.penetration
                * contact.penetration
                * vehicle.collision_stiffness)
                .min(vehicle.max_collision_force);

            let point_velocity = self.body.point_velocity(contact.point);
            let tangential =
                point_velocity - contact.normal * point_velocity.dot(contact.normal);
            let friction = clamp_length(
                -tangential * mass / dt,
                normal_force * vehicle.body_friction,
            );

            self.body.add_force_at(
                (contact.normal * normal_force + friction) * share,
                contact.point,
            );

            let inward = self.body.velocity.dot(contact.normal);
            if inward < 0.0 {
                self.body.velocity -= contact.normal * inward * share;
            }
        }
    }

    /// Tick weapon cooldowns and report which weapons fire this step
    pub fn take_shots(&mut self, dt: f32, weapons: &WeaponsConfig) -> Vec<ProjectileKind> {
        self.gun_cooldown = (self.gun_cooldown - dt).max(0.0);
        self.cannon_cooldown = (self.cannon_cooldown - dt).max(0.0);
        if !self.is_alive() {
            return Vec::new();
        }

        let mut shots = Vec::new();
        if self.input.fire_gun && self.gun_cooldown <= 0.0 {
            self.gun_cooldown = weapons.bullet.fire_interval;
            shots.push(ProjectileKind::Bullet);
        }
        if self.input.fire_cannon && self.cannon_cooldown <= 0.0 {
            self.cannon_cooldown = weapons.shell.fire_interval;
            shots.push(ProjectileKind::Shell);
        }
        shots
    }

    pub fn turret(&self, kind: ProjectileKind) -> &Turret {
        match kind {
            ProjectileKind::Bullet => &self.gun,
            ProjectileKind::Shell => &self.cannon,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TerrainConfig, TerrainMode};
    use crate::util::pool::Pool;

    fn flat() -> Terrain {
        Terrain::generate(
            &TerrainConfig {
                size: 100.0,
                resolution: 33,
                mode: TerrainMode::Flat,
                object_density: 0.0,
                ..TerrainConfig::default()
            },
            0,
        )
    }

    fn handle() -> Handle {
        let mut pool = Pool::with_capacity(1);
        pool.try_add(()).unwrap()
    }

    #[test]
    fn test_lifecycle_timeouts() {
        let vehicle = VehicleConfig::default();
        let mut car = Car::new(1, "a", &vehicle);
        assert_eq!(car.alive_state(), AliveState::Countdown);
        assert!(!car.is_vulnerable());

        let mut events = Vec::new();
        for _ in 0..200 {
            events.extend(car.advance_lifecycle(0.02, &vehicle));
        }
        assert_eq!(events, vec![LifecycleEvent::Activated]);
        assert!(car.is_alive());

        car.kill();
        events.clear();
        for _ in 0..((vehicle.death_timeout / 0.02) as usize + 2) {
            if let Some(event) = car.advance_lifecycle(0.02, &vehicle) {
                events.push(event);
                if event == LifecycleEvent::RespawnDue {
                    break;
                }
            }
        }
        assert_eq!(
            events,
            vec![LifecycleEvent::Hidden, LifecycleEvent::RespawnDue]
        );
        assert_eq!(car.alive_state(), AliveState::Hidden);
    }

    #[test]
    fn test_alive_state_byte_round_trip() {
        for state in [
            AliveState::Countdown,
            AliveState::Alive,
            AliveState::Dead,
            AliveState::Hidden,
        ] {
            assert_eq!(AliveState::from_u8(state.to_u8()), Some(state));
        }
        assert_eq!(AliveState::from_u8(4), None);
    }

    #[test]
    fn test_countdown_ignores_controls() {
        let vehicle = VehicleConfig::default();
        let terrain = flat();
        let mut car = Car::new(1, "a", &vehicle);
        car.spawn(Vec3::new(0.0, vehicle.rest_height(9.81), 0.0), 0.0, &vehicle);
        car.input.accel = 1.0;
        car.input.fire_gun = true;
        let env = CarEnv {
            terrain: &terrain,
            vehicle: &vehicle,
            gravity: 9.81,
            colliders: &[],
        };
        for _ in 0..25 {
            car.update(0.02, handle(), &env);
        }
        assert_eq!(car.engine_power, 0.0);
        assert!(car.take_shots(0.02, &WeaponsConfig::default()).is_empty());
    }

    #[test]
    fn test_alive_car_drives_forward() {
        let vehicle = VehicleConfig::default();
        let terrain = flat();
        let mut car = Car::new(1, "a", &vehicle);
        car.spawn(Vec3::new(0.0, vehicle.rest_height(9.81), 0.0), 0.0, &vehicle);
        car.set_alive_state(AliveState::Alive);
        car.input.accel = 1.0;
        let env = CarEnv {
            terrain: &terrain,
            vehicle: &vehicle,
            gravity: 9.81,
            colliders: &[],
        };
        let h = handle();
        for _ in 0..100 {
            car.update(0.02, h, &env);
        }
        assert!(car.body.position.z > 1.0);
        assert!(car.body.velocity.z > 1.0);
        assert!(car.body.position.y > 0.3 && car.body.position.y < 1.0);
    }

    #[test]
    fn test_hit_box_ray() {
        let vehicle = VehicleConfig::default();
        let mut car = Car::new(1, "a", &vehicle);
        car.spawn(Vec3::new(10.0, 1.0, 0.0), std::f32::consts::FRAC_PI_2, &vehicle);
        let ray = Ray::new(Vec3::new(0.0, 1.0, 0.0), Vec3::X).unwrap();
        let hit = car.intersect_ray(&ray, 50.0, &vehicle).unwrap();
        // Rotated a quarter turn, the long axis lies along x
        assert!((hit.distance - (10.0 - vehicle.hit_box.z)).abs() < 1e-3);
        assert!(hit.normal.x < -0.99);
    }

    #[test]
    fn test_weapon_cooldown() {
        let vehicle = VehicleConfig::default();
        let weapons = WeaponsConfig::default();
        let mut car = Car::new(1, "a", &vehicle);
        car.set_alive_state(AliveState::Alive);
        car.input.fire_gun = true;
        let fired: usize = (0..50).map(|_| car.take_shots(0.02, &weapons).len()).sum();
        // One second at a 0.1 s interval
        assert!((9..=11).contains(&fired));
    }
}
