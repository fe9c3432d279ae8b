//! Cosmetic explosion particles, never read by the simulation

use glam::Vec3;
use rand::Rng;

use crate::util::pool::Pool;

use super::terrain::Terrain;

const BOUNCE: f32 = 0.3;

#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub position: Vec3,
    pub velocity: Vec3,
    pub age: f32,
    pub lifetime: f32,
    pub size: f32,
}

pub struct ParticleSystem {
    pool: Pool<Particle>,
}

impl ParticleSystem {
    pub fn new(capacity: usize) -> Self {
        Self {
            pool: Pool::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Particle> {
        self.pool.iter().map(|(_, p)| p)
    }

    pub fn clear(&mut self) {
        self.pool.clear();
    }

    /// Spawn up to `count` particles flying out of `center`. Stops quietly
    /// when the pool is full.
    pub fn spawn_explosion(&mut self, rng: &mut impl Rng, center: Vec3, count: usize, speed: f32) {
        for _ in 0..count {
            let direction = Vec3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(0.2..1.0),
                rng.gen_range(-1.0..1.0),
            )
            .normalize_or_zero();
            let particle = Particle {
                position: center,
                velocity: direction * speed * rng.gen_range(0.3..1.0),
                age: 0.0,
                lifetime: rng.gen_range(0.4..1.2),
                size: rng.gen_range(0.1..0.4),
            };
            if self.pool.try_add(particle).is_none() {
                break;
            }
        }
    }

    pub fn update(&mut self, dt: f32, gravity: f32, terrain: &Terrain) {
        self.pool.retain(|_, p| {
            p.age += dt;
            p.velocity.y -= gravity * dt;
            p.position += p.velocity * dt;
            let (ground, _) = terrain.height_at(p.position.x, p.position.z);
            if p.position.y < ground {
                p.position.y = ground;
                p.velocity.y = -p.velocity.y * BOUNCE;
            }
            p.age < p.lifetime
        });
    }
}
