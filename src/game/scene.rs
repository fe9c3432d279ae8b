//! Fixed-tick world simulation
//!
//! Per tick: fire weapons, move projectiles and collect their hits, apply
//! the hits per car in key order, step every car, refresh turret aim
//! points. The authority additionally runs lifecycle timeouts and respawns.

use glam::{Quat, Vec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::config::{SimConfig, TerrainMode, VehicleConfig};
use crate::geom::{Ray, RayHit, Sphere};
use crate::util::pool::{Handle, Pool};
use crate::util::time::split_step;

use super::car::{Car, CarCollider, CarEnv, CarInput, LifecycleEvent};
use super::combat::{hit_key, resolve_hits, HitLedger, HitRecord, KillRecord};
use super::particles::ParticleSystem;
use super::projectile::{Projectile, ProjectileKind};
use super::terrain::{Terrain, TerrainSurface};
use super::turret::Turret;

/// Extra height above rest when dropping a respawned car
const SPAWN_DROP: f32 = 0.5;
const EXPLOSION_PARTICLES: usize = 12;
const EXPLOSION_SPEED: f32 = 6.0;

/// Which side of the connection owns this scene
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    /// Applies damage and runs lifecycle timeouts
    Server,
    /// Predicts and spawns cosmetic effects; health comes from the server
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTarget {
    Terrain(TerrainSurface),
    Car(Handle),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldHit {
    pub hit: RayHit,
    pub target: HitTarget,
}

/// Things that happened during an update, drained by the owner
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    Fired {
        shooter: u64,
        kind: ProjectileKind,
    },
    Hit {
        tick: u32,
        victim: u64,
        attacker: u64,
        damage: i32,
    },
    Kill(KillRecord),
    Explosion {
        position: Vec3,
        kind: ProjectileKind,
    },
    Activated {
        car: Handle,
    },
    Respawned {
        car: Handle,
        guid: u64,
        /// False when the spawn search gave up and may overlap
        clear: bool,
    },
}

/// Nearest hit among terrain and simulated cars, skipping `exclude`
pub fn trace_world(
    terrain: &Terrain,
    cars: &Pool<Car>,
    vehicle: &VehicleConfig,
    ray: &Ray,
    max_distance: f32,
    exclude: Option<Handle>,
) -> Option<WorldHit> {
    let mut best = terrain.trace_ray(ray, max_distance).map(|t| WorldHit {
        hit: t.hit,
        target: HitTarget::Terrain(t.surface),
    });

    for (handle, car) in cars.iter() {
        if Some(handle) == exclude || !car.alive_state().is_simulated() {
            continue;
        }
        let limit = best.map_or(max_distance, |b| b.hit.distance);
        if let Some(hit) = car.intersect_ray(ray, limit, vehicle) {
            best = Some(WorldHit {
                hit,
                target: HitTarget::Car(handle),
            });
        }
    }
    best
}

pub struct Scene {
    config: SimConfig,
    authority: Authority,
    terrain: Terrain,
    cars: Pool<Car>,
    projectiles: Pool<Projectile>,
    particles: ParticleSystem,
    ledger: HitLedger,
    events: Vec<SceneEvent>,
    tick: u32,
    rng: ChaCha8Rng,
}

impl Scene {
    pub fn new(config: SimConfig, authority: Authority, terrain_seed: u64) -> Self {
        let terrain = Terrain::generate(&config.terrain, terrain_seed);
        Self {
            cars: Pool::with_capacity(config.capacity.cars),
            projectiles: Pool::with_capacity(config.capacity.projectiles),
            particles: ParticleSystem::new(config.capacity.particles),
            ledger: HitLedger::new(),
            events: Vec::new(),
            tick: 0,
            rng: ChaCha8Rng::seed_from_u64(terrain_seed.rotate_left(17) ^ 0x5eed),
            config,
            authority,
            terrain,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn authority(&self) -> Authority {
        self.authority
    }

    pub fn terrain(&self) -> &Terrain {
        &self.terrain
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    /// Adopt the authority's tick counter
    pub fn set_tick(&mut self, tick: u32) {
        self.tick = tick;
    }

    pub fn cars(&self) -> &Pool<Car> {
        &self.cars
    }

    pub fn car(&self, handle: Handle) -> Option<&Car> {
        self.cars.get(handle)
    }

    pub fn car_mut(&mut self, handle: Handle) -> Option<&mut Car> {
        self.cars.get_mut(handle)
    }

    pub fn find_car(&self, guid: u64) -> Option<Handle> {
        self.cars
            .iter()
            .find(|(_, car)| car.guid == guid)
            .map(|(handle, _)| handle)
    }

    pub fn projectiles(&self) -> impl Iterator<Item = &Projectile> {
        self.projectiles.iter().map(|(_, p)| p)
    }

    pub fn projectile_count(&self) -> usize {
        self.projectiles.len()
    }

    pub fn particles(&self) -> &ParticleSystem {
        &self.particles
    }

    pub fn drain_events(&mut self) -> Vec<SceneEvent> {
        std::mem::take(&mut self.events)
    }

    /// Add a car at a fresh spawn point. `None` when every slot is taken.
    pub fn add_car(&mut self, guid: u64, name: &str) -> Option<Handle> {
        let car = Car::new(guid, name, &self.config.vehicle);
        let Some(handle) = self.cars.try_add(car) else {
            warn!(guid, capacity = self.cars.capacity(), "Car pool exhausted");
            return None;
        };
        self.respawn(handle);
        Some(handle)
    }

    pub fn remove_car(&mut self, handle: Handle) -> Option<Car> {
        self.cars.remove(handle)
    }

    /// Teleport a car, clearing its motion
    pub fn place_car(&mut self, handle: Handle, position: Vec3, rotation: Quat) {
        if let Some(car) = self.cars.get_mut(handle) {
            car.body.place(position, rotation);
            car.gun.reset(&car.body);
            car.cannon.reset(&car.body);
        }
    }

    pub fn set_input(&mut self, handle: Handle, input: CarInput) {
        if let Some(car) = self.cars.get_mut(handle) {
            car.input = input.sanitized();
        }
    }

    /// Nearest hit for a ray through the world
    pub fn trace_ray(&self, ray: &Ray, max_distance: f32, exclude: Option<Handle>) -> Option<WorldHit> {
        trace_world(
            &self.terrain,
            &self.cars,
            &self.config.vehicle,
            ray,
            max_distance,
            exclude,
        )
    }

    /// Build new terrain and respawn every car
    pub fn regenerate_terrain(&mut self, seed: u64, mode: TerrainMode) {
        self.config.terrain.mode = mode;
        self.terrain = Terrain::generate(&self.config.terrain, seed);
        self.projectiles.clear();
        self.particles.clear();
        self.respawn_all();
        info!(seed, ?mode, "Terrain regenerated");
    }

    pub fn respawn_all(&mut self) {
        let handles: Vec<Handle> = self.cars.iter().map(|(h, _)| h).collect();
        for handle in handles {
            self.respawn(handle);
        }
    }

    /// Move a car to a clear spot with full health, in countdown
    pub fn respawn(&mut self, handle: Handle) {
        let vehicle = &self.config.vehicle;
        let radius = vehicle.bounding_radius();
        let occupied: Vec<Sphere> = self
            .cars
            .iter()
            .filter(|(h, car)| *h != handle && car.alive_state().is_simulated())
            .map(|(_, car)| Sphere::new(car.body.position, radius))
            .collect();

        let spawn = self
            .terrain
            .find_spawn_point(&mut self.rng, radius, &occupied);
        let yaw = self.rng.gen_range(-std::f32::consts::PI..std::f32::consts::PI);
        let height = vehicle.rest_height(self.config.physics.gravity) + SPAWN_DROP;

        if let Some(car) = self.cars.get_mut(handle) {
            car.spawn(spawn.position + Vec3::Y * height, yaw, vehicle);
            debug!(guid = car.guid, clear = spawn.clear, "Car respawned");
            self.events.push(SceneEvent::Respawned {
                car: handle,
                guid: car.guid,
                clear: spawn.clear,
            });
        }
    }

    /// Damage reported by the authority
    pub fn apply_remote_hit(&mut self, victim: u64, damage: i32) {
        if let Some(car) = self.find_car(victim).and_then(|h| self.cars.get_mut(h)) {
            car.health = (car.health - damage).max(0);
        }
    }

    /// Kill reported by the authority
    pub fn apply_remote_kill(&mut self, victim: u64) {
        if let Some(car) = self.find_car(victim).and_then(|h| self.cars.get_mut(h)) {
            car.kill();
        }
    }

    /// Advance one tick of `dt` seconds, split into sub-steps when `dt`
    /// exceeds the configured maximum
    pub fn update(&mut self, dt: f32) {
        let physics = &self.config.physics;
        let (count, sub_dt) = split_step(dt, physics.max_substep, physics.max_halvings);
        if count == 0 {
            return;
        }

        self.tick = self.tick.wrapping_add(1);
        for (_, car) in self.cars.iter_mut() {
            car.store_last();
        }
        for step in 0..count {
            self.step(sub_dt, step, count);
        }
        if self.authority == Authority::Server {
            self.advance_lifecycles(dt);
        }
    }

    fn step(&mut self, dt: f32, step: u32, steps: u32) {
        self.fire_weapons(dt);
        self.update_projectiles(dt, step, steps);
        self.apply_hits();
        self.update_cars(dt);
        self.update_aim_points();
        if self.authority == Authority::Client {
            self.particles
                .update(dt, self.config.physics.gravity, &self.terrain);
        }
    }

    /// Fire a projectile for `owner`, inheriting its velocity. `None` when
    /// the owner is gone or the projectile pool is full.
    pub fn launch(
        &mut self,
        owner: Handle,
        kind: ProjectileKind,
        origin: Vec3,
        direction: Vec3,
    ) -> Option<Handle> {
        let car = self.cars.get(owner)?;
        let guid = car.guid;
        let projectile = Projectile::new(
            kind,
            kind.weapon(&self.config.weapons),
            origin,
            direction,
            car.body.velocity,
            owner,
            guid,
        );
        let Some(handle) = self.projectiles.try_add(projectile) else {
            debug!(guid, "Projectile pool full, shot dropped");
            return None;
        };
        self.events.push(SceneEvent::Fired { shooter: guid, kind });
        Some(handle)
    }

    fn fire_weapons(&mut self, dt: f32) {
        let weapons = &self.config.weapons;
        let mut shots = Vec::new();
        for (handle, car) in self.cars.iter_mut() {
            for kind in car.take_shots(dt, weapons) {
                let turret = car.turret(kind);
                shots.push((handle, kind, turret.muzzle(), turret.direction()));
            }
        }
        for (owner, kind, origin, direction) in shots {
            self.launch(owner, kind, origin, direction);
        }
    }

    fn update_projectiles(&mut self, dt: f32, step: u32, steps: u32) {
        let gravity = self.config.physics.gravity;
        let floor = self.terrain.bounds().min.y - 10.0;
        let mut impacts = Vec::new();
        let mut expired = Vec::new();

        for (handle, projectile) in self.projectiles.iter_mut() {
            let (from, to) = projectile.advance(dt, gravity);
            let length = from.distance(to);
            let hit = Ray::new(from, to - from).and_then(|ray| {
                trace_world(
                    &self.terrain,
                    &self.cars,
                    &self.config.vehicle,
                    &ray,
                    length,
                    Some(projectile.owner),
                )
            });

            if let Some(hit) = hit {
                let fraction = (step as f32 + hit.hit.distance / length) / steps as f32;
                impacts.push((handle, hit, fraction));
            } else if projectile.expired() || to.y < floor {
                expired.push(handle);
            }
        }

        for handle in expired {
            self.projectiles.remove(handle);
        }

        for (handle, hit, fraction) in impacts {
            let Some(projectile) = self.projectiles.remove(handle) else {
                continue;
            };
            self.explode(hit.hit.point, projectile.kind);

            let HitTarget::Car(target) = hit.target else {
                continue;
            };
            if self.authority == Authority::Server
                && self.cars.get(target).is_some_and(|c| c.is_vulnerable())
            {
                self.ledger.record(
                    target,
                    HitRecord {
                        key: hit_key(self.tick, fraction),
                        tick: self.tick,
                        attacker: projectile.owner_guid,
                        damage: projectile.damage,
                    },
                );
            }
        }
    }

    fn explode(&mut self, position: Vec3, kind: ProjectileKind) {
        if self.authority == Authority::Client {
            let scale = match kind {
                ProjectileKind::Bullet => 1,
                ProjectileKind::Shell => 3,
            };
            self.particles.spawn_explosion(
                &mut self.rng,
                position,
                EXPLOSION_PARTICLES * scale,
                EXPLOSION_SPEED,
            );
        }
        self.events.push(SceneEvent::Explosion { position, kind });
    }

    fn apply_hits(&mut self) {
        for (target, hits) in self.ledger.drain_by_target() {
            let Some(car) = self.cars.get_mut(target) else {
                continue;
            };
            if !car.is_vulnerable() {
                continue;
            }

            let outcome = resolve_hits(car.health, &hits);
            car.health = outcome.health;
            for hit in &outcome.applied {
                self.events.push(SceneEvent::Hit {
                    tick: hit.tick,
                    victim: car.guid,
                    attacker: hit.attacker,
                    damage: hit.damage,
                });
            }
            if let Some(killer) = outcome.killer {
                car.kill();
                info!(tick = self.tick, victim = car.guid, killer, "Car destroyed");
                self.events.push(SceneEvent::Kill(KillRecord {
                    tick: self.tick,
                    victim: car.guid,
                    killer,
                }));
            }
        }
    }

    fn update_cars(&mut self, dt: f32) {
        let vehicle = &self.config.vehicle;
        let colliders: Vec<CarCollider> = self
            .cars
            .iter()
            .filter(|(_, car)| car.alive_state().is_simulated())
            .map(|(handle, car)| car.collider(handle, vehicle))
            .collect();

        let env = CarEnv {
            terrain: &self.terrain,
            vehicle,
            gravity: self.config.physics.gravity,
            colliders: &colliders,
        };
        for (handle, car) in self.cars.iter_mut() {
            car.update(dt, handle, &env);
        }
    }

    /// Trace each turret's barrel to find what it currently points at
    fn update_aim_points(&mut self) {
        let mut aims = Vec::with_capacity(self.cars.len());
        for (handle, car) in self.cars.iter() {
            if !car.alive_state().is_simulated() {
                continue;
            }
            let trace = |turret: &Turret| {
                let range = turret.config().aim_range;
                Ray::new(turret.muzzle(), turret.direction())
                    .map(|ray| {
                        self.trace_ray(&ray, range, Some(handle))
                            .map_or_else(|| ray.at(range), |hit| hit.hit.point)
                    })
                    .unwrap_or(turret.muzzle())
            };
            aims.push((handle, trace(&car.gun), trace(&car.cannon)));
        }

        for (handle, gun, cannon) in aims {
            if let Some(car) = self.cars.get_mut(handle) {
                car.gun.aim_point = gun;
                car.cannon.aim_point = cannon;
            }
        }
    }

    fn advance_lifecycles(&mut self, dt: f32) {
        let vehicle = &self.config.vehicle;
        let mut due = Vec::new();
        for (handle, car) in self.cars.iter_mut() {
            match car.advance_lifecycle(dt, vehicle) {
                Some(LifecycleEvent::Activated) => {
                    self.events.push(SceneEvent::Activated { car: handle });
                }
                Some(LifecycleEvent::Hidden) => {
                    debug!(guid = car.guid, "Wreck hidden");
                }
                Some(LifecycleEvent::RespawnDue) => due.push(handle),
                None => {}
            }
        }
        for handle in due {
            self.respawn(handle);
        }
    }
}
