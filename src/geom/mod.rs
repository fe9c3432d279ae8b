//! Spatial primitives and intersection tests
//!
//! Degenerate input (zero-length directions, rays parallel to a plane)
//! reports "no intersection" instead of producing NaN.

pub mod grid_walker;

pub use grid_walker::{GridCell, GridWalker};

use glam::Vec3;

/// Determinant / length threshold below which a test is considered degenerate
pub const GEOM_EPSILON: f32 = 1.0e-9;

/// Barycentric slack so rays through shared triangle edges never slip
/// between neighbours
const EDGE_TOLERANCE: f32 = 1.0e-5;

/// Half-line with a unit direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// Build a ray, normalizing `direction`. Returns `None` for a zero direction.
    pub fn new(origin: Vec3, direction: Vec3) -> Option<Self> {
        let length = direction.length();
        if !(length > GEOM_EPSILON) || !origin.is_finite() {
            return None;
        }
        Some(Self {
            origin,
            direction: direction / length,
        })
    }

    pub fn at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }
}

/// Result of a ray query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Distance from the ray origin
    pub distance: f32,
    pub point: Vec3,
    /// Surface normal facing the ray
    pub normal: Vec3,
}

/// Penetration contact between two volumes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub point: Vec3,
    /// Direction that pushes the queried volume out of the other
    pub normal: Vec3,
    pub penetration: f32,
}

impl Contact {
    /// Arithmetic mean of several contacts. Normals are averaged then
    /// renormalized; the result keeps the mean penetration.
    pub fn average(contacts: &[Contact]) -> Option<Contact> {
        if contacts.is_empty() {
            return None;
        }
        let n = contacts.len() as f32;
        let point = contacts.iter().map(|c| c.point).sum::<Vec3>() / n;
        let normal = contacts.iter().map(|c| c.normal).sum::<Vec3>() / n;
        let penetration = contacts.iter().map(|c| c.penetration).sum::<f32>() / n;
        Some(Contact {
            point,
            normal: normal.try_normalize().unwrap_or(Vec3::Y),
            penetration,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    pub fn contains(&self, point: Vec3) -> bool {
        self.center.distance_squared(point) <= self.radius * self.radius
    }

    pub fn overlaps(&self, other: &Sphere) -> bool {
        let r = self.radius + other.radius;
        self.center.distance_squared(other.center) < r * r
    }

    /// First intersection within `max_distance`. A ray starting inside the
    /// sphere hits at distance zero.
    pub fn intersect_ray(&self, ray: &Ray, max_distance: f32) -> Option<RayHit> {
        let oc = ray.origin - self.center;
        let c = oc.length_squared() - self.radius * self.radius;
        if c <= 0.0 {
            return Some(RayHit {
                distance: 0.0,
                point: ray.origin,
                normal: -ray.direction,
            });
        }

        let b = oc.dot(ray.direction);
        if b > 0.0 {
            return None;
        }
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }

        let t = -b - discriminant.sqrt();
        if t < 0.0 || t > max_distance {
            return None;
        }
        let point = ray.at(t);
        Some(RayHit {
            distance: t,
            point,
            normal: (point - self.center).try_normalize().unwrap_or(-ray.direction),
        })
    }

    /// Contact pushing `self` out of `other`
    pub fn contact(&self, other: &Sphere) -> Option<Contact> {
        let delta = self.center - other.center;
        let distance = delta.length();
        let penetration = self.radius + other.radius - distance;
        if penetration <= 0.0 {
            return None;
        }
        let normal = if distance > GEOM_EPSILON {
            delta / distance
        } else {
            Vec3::Y
        };
        Some(Contact {
            point: other.center + normal * other.radius,
            normal,
            penetration,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub a: Vec3,
    pub b: Vec3,
    pub c: Vec3,
}

impl Triangle {
    pub fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self { a, b, c }
    }

    /// Unit normal following the `a -> b -> c` winding
    pub fn normal(&self) -> Vec3 {
        (self.b - self.a)
            .cross(self.c - self.a)
            .try_normalize()
            .unwrap_or(Vec3::Y)
    }

    /// Moller-Trumbore intersection. The returned normal faces the ray.
    pub fn intersect_ray(&self, ray: &Ray, max_distance: f32) -> Option<RayHit> {
        let edge1 = self.b - self.a;
        let edge2 = self.c - self.a;
        let p = ray.direction.cross(edge2);
        let det = edge1.dot(p);
        if det.abs() < GEOM_EPSILON {
            return None;
        }

        let inv_det = 1.0 / det;
        let s = ray.origin - self.a;
        let u = s.dot(p) * inv_det;
        if !(-EDGE_TOLERANCE..=1.0 + EDGE_TOLERANCE).contains(&u) {
            return None;
        }

        let q = s.cross(edge1);
        let v = ray.direction.dot(q) * inv_det;
        if v < -EDGE_TOLERANCE || u + v > 1.0 + EDGE_TOLERANCE {
            return None;
        }

        let t = edge2.dot(q) * inv_det;
        if t < 0.0 || t > max_distance {
            return None;
        }

        let mut normal = self.normal();
        if normal.dot(ray.direction) > 0.0 {
            normal = -normal;
        }
        Some(RayHit {
            distance: t,
            point: ray.at(t),
            normal,
        })
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn from_center_half_extents(center: Vec3, half: Vec3) -> Self {
        Self::new(center - half, center + half)
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    /// Slab-method intersection. A ray starting inside hits at distance zero.
    pub fn intersect_ray(&self, ray: &Ray, max_distance: f32) -> Option<RayHit> {
        let mut t_min = 0.0f32;
        let mut t_max = max_distance;
        let mut normal = -ray.direction;

        for axis in 0..3 {
            let origin = ray.origin[axis];
            let dir = ray.direction[axis];
            let (lo, hi) = (self.min[axis], self.max[axis]);

            if dir.abs() < GEOM_EPSILON {
                if origin < lo || origin > hi {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / dir;
            let mut t1 = (lo - origin) * inv;
            let mut t2 = (hi - origin) * inv;
            let mut face = Vec3::ZERO;
            face[axis] = -1.0;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
                face[axis] = 1.0;
            }
            if t1 > t_min {
                t_min = t1;
                normal = face;
            }
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }

        Some(RayHit {
            distance: t_min,
            point: ray.at(t_min),
            normal,
        })
    }
}
