//! Bullets and shells

use glam::Vec3;

use crate::config::{WeaponConfig, WeaponsConfig};
use crate::util::pool::Handle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectileKind {
    /// Fired by the gun turret
    Bullet,
    /// Fired by the cannon turret
    Shell,
}

impl ProjectileKind {
    pub fn weapon(self, weapons: &WeaponsConfig) -> &WeaponConfig {
        match self {
            ProjectileKind::Bullet => &weapons.bullet,
            ProjectileKind::Shell => &weapons.shell,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Projectile {
    pub kind: ProjectileKind,
    pub position: Vec3,
    pub velocity: Vec3,
    pub gravity_scale: f32,
    /// Seconds left before the projectile expires
    pub lifetime: f32,
    pub size: f32,
    pub damage: i32,
    drag: f32,
    /// Stable id of the player who fired
    pub owner_guid: u64,
    /// Car that fired, excluded from hit tests while it still exists
    pub owner: Handle,
}

impl Projectile {
    pub fn new(
        kind: ProjectileKind,
        weapon: &WeaponConfig,
        origin: Vec3,
        direction: Vec3,
        inherited_velocity: Vec3,
        owner: Handle,
        owner_guid: u64,
    ) -> Self {
        Self {
            kind,
            position: origin,
            velocity: direction.normalize_or_zero() * weapon.speed + inherited_velocity,
            gravity_scale: weapon.gravity_scale,
            lifetime: weapon.lifetime,
            size: weapon.size,
            damage: weapon.damage,
            drag: weapon.drag,
            owner_guid,
            owner,
        }
    }

    pub fn expired(&self) -> bool {
        self.lifetime <= 0.0
    }

    /// Integrate one step and return the swept segment `(from, to)`
    pub fn advance(&mut self, dt: f32, gravity: f32) -> (Vec3, Vec3) {
        let from = self.position;
        self.velocity *= (1.0 - self.drag * dt).max(0.0);
        self.velocity.y -= gravity * self.gravity_scale * dt;
        self.position += self.velocity * dt;
        self.lifetime -= dt;
        (from, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::pool::Pool;

    #[test]
    fn test_advance_sweeps_and_expires() {
        let mut pool: Pool<()> = Pool::with_capacity(1);
        let owner = pool.try_add(()).unwrap();
        let weapons = WeaponsConfig::default();
        let weapon = ProjectileKind::Shell.weapon(&weapons);
        let mut shell = Projectile::new(
            ProjectileKind::Shell,
            weapon,
            Vec3::new(0.0, 5.0, 0.0),
            Vec3::Z,
            Vec3::ZERO,
            owner,
            7,
        );

        let (from, to) = shell.advance(0.1, 9.81);
        assert_eq!(from, Vec3::new(0.0, 5.0, 0.0));
        assert!(to.z > 11.0 && to.y < 5.0);

        let steps = (weapon.lifetime / 0.1).ceil() as usize;
        for _ in 0..steps {
            shell.advance(0.1, 9.81);
        }
        assert!(shell.expired());
    }
}
