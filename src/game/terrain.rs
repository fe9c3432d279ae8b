//! Procedural heightfield with scattered static collision objects
//!
//! Heights are fractal Perlin noise stored normalized to `[0, 1]` and
//! scaled by the configured height on read. Objects are indexed into a coarse bucket grid; every
//! bucket lists each object whose XZ footprint square overlaps it.

use glam::{Vec2, Vec3};
use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use crate::config::{ObjectShape, TerrainConfig, TerrainMode};
use crate::geom::{Aabb, Contact, GridWalker, Ray, RayHit, Sphere, Triangle};

/// Buckets still visited after the first object hit, in case a nearer
/// object sits in a neighbouring bucket
pub const OVERWALK_BUCKETS: usize = 3;

/// Static object types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Rock,
    Pine,
    Oak,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 3] = [ObjectKind::Rock, ObjectKind::Pine, ObjectKind::Oak];

    fn shape(self, config: &TerrainConfig) -> &ObjectShape {
        match self {
            ObjectKind::Rock => &config.rock,
            ObjectKind::Pine => &config.pine,
            ObjectKind::Oak => &config.oak,
        }
    }
}

/// Placed static object
#[derive(Debug, Clone)]
pub struct TerrainObject {
    pub kind: ObjectKind,
    /// Ground position the shape is anchored at
    pub position: Vec3,
    /// Collision spheres in world space
    pub spheres: Vec<Sphere>,
    /// Horizontal radius around `position`
    pub footprint: f32,
}

impl TerrainObject {
    fn overlaps_xz(&self, center: Vec3, radius: f32) -> bool {
        let d = Vec2::new(self.position.x - center.x, self.position.z - center.z);
        let r = self.footprint + radius;
        d.length_squared() < r * r
    }
}

/// What a terrain ray query hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerrainSurface {
    Ground,
    /// Index into [`Terrain::objects`]
    Object(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainHit {
    pub hit: RayHit,
    pub surface: TerrainSurface,
}

/// Result of a respawn search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnPoint {
    /// Ground position
    pub position: Vec3,
    /// False when the attempt budget ran out and the point may overlap
    pub clear: bool,
}

#[derive(Debug, Clone)]
pub struct Terrain {
    config: TerrainConfig,
    seed: u64,
    resolution: usize,
    cell_size: f32,
    half_size: f32,
    heights: Vec<f32>,
    objects: Vec<TerrainObject>,
    buckets: Vec<Vec<u32>>,
    bucket_dims: usize,
    bucket_size: f32,
}

impl Terrain {
    /// Generate terrain deterministically from `(config, seed)`
    pub fn generate(config: &TerrainConfig, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let resolution = config.resolution.max(3);
        let size = config.size.max(1.0);
        let bucket_dims = ((size / config.bucket_size.max(0.1)).ceil() as usize).max(1);

        let mut terrain = Self {
            config: config.clone(),
            seed,
            resolution,
            cell_size: size / (resolution - 1) as f32,
            half_size: size * 0.5,
            heights: generate_heights(config.mode, resolution, &mut rng),
            objects: Vec::new(),
            buckets: vec![Vec::new(); bucket_dims * bucket_dims],
            bucket_dims,
            bucket_size: size / bucket_dims as f32,
        };

        let attempts = terrain.scatter_objects(&mut rng);
        debug!(
            seed,
            mode = ?config.mode,
            objects = terrain.objects.len(),
            attempts,
            "Generated terrain"
        );
        terrain
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn mode(&self) -> TerrainMode {
        self.config.mode
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    pub fn half_size(&self) -> f32 {
        self.half_size
    }

    /// Height of the border walls
    pub fn max_height(&self) -> f32 {
        self.config.height_scale
    }

    /// World box enclosing the heightfield
    pub fn bounds(&self) -> Aabb {
        Aabb::new(
            Vec3::new(-self.half_size, 0.0, -self.half_size),
            Vec3::new(self.half_size, self.max_height(), self.half_size),
        )
    }

    pub fn objects(&self) -> &[TerrainObject] {
        &self.objects
    }

    pub fn contains_xz(&self, x: f32, z: f32) -> bool {
        x.abs() <= self.half_size && z.abs() <= self.half_size
    }

    fn raw(&self, ix: usize, iz: usize) -> f32 {
        self.heights[iz * self.resolution + ix] * self.config.height_scale
    }

    fn vertex(&self, ix: usize, iz: usize) -> Vec3 {
        Vec3::new(
            -self.half_size + ix as f32 * self.cell_size,
            self.raw(ix, iz),
            -self.half_size + iz as f32 * self.cell_size,
        )
    }

    /// The two triangles of cell `(ix, iz)`. The first covers `dx > dy`.
    fn cell_triangles(&self, ix: usize, iz: usize) -> [Triangle; 2] {
        let v00 = self.vertex(ix, iz);
        let v10 = self.vertex(ix + 1, iz);
        let v01 = self.vertex(ix, iz + 1);
        let v11 = self.vertex(ix + 1, iz + 1);
        [Triangle::new(v00, v10, v11), Triangle::new(v00, v11, v01)]
    }

    /// Surface height and normal at world `(x, z)`. Positions outside the
    /// map read the nearest border value.
    pub fn height_at(&self, x: f32, z: f32) -> (f32, Vec3) {
        let max_index = (self.resolution - 1) as f32;
        let fx = ((x + self.half_size) / self.cell_size).clamp(0.0, max_index);
        let fz = ((z + self.half_size) / self.cell_size).clamp(0.0, max_index);
        let ix = (fx.floor() as usize).min(self.resolution - 2);
        let iz = (fz.floor() as usize).min(self.resolution - 2);
        let dx = fx - ix as f32;
        let dy = fz - iz as f32;

        let h00 = self.raw(ix, iz);
        let h10 = self.raw(ix + 1, iz);
        let h01 = self.raw(ix, iz + 1);
        let h11 = self.raw(ix + 1, iz + 1);

        // Both triangles share the h00-h11 diagonal, so the surface stays
        // continuous across it. dx == dy takes the second triangle.
        let (height, slope_x, slope_z) = if dx > dy {
            (
                h00 + (h10 - h00) * dx + (h11 - h10) * dy,
                h10 - h00,
                h11 - h10,
            )
        } else {
            (
                h00 + (h11 - h01) * dx + (h01 - h00) * dy,
                h11 - h01,
                h01 - h00,
            )
        };

        let normal = Vec3::new(-slope_x / self.cell_size, 1.0, -slope_z / self.cell_size)
            .try_normalize()
            .unwrap_or(Vec3::Y);
        (height, normal)
    }

    /// Nearest hit among the heightfield and the static objects
    pub fn trace_ray(&self, ray: &Ray, max_distance: f32) -> Option<TerrainHit> {
        let ground = self.trace_heightfield(ray, max_distance).map(|hit| TerrainHit {
            hit,
            surface: TerrainSurface::Ground,
        });
        let limit = ground.map_or(max_distance, |g| g.hit.distance);
        let object = self
            .trace_objects(ray, limit)
            .map(|(hit, index)| TerrainHit {
                hit,
                surface: TerrainSurface::Object(index),
            });

        match (ground, object) {
            (Some(g), Some(o)) if o.hit.distance < g.hit.distance => Some(o),
            (Some(g), _) => Some(g),
            (None, o) => o,
        }
    }

    /// First heightfield intersection along the ray
    pub fn trace_heightfield(&self, ray: &Ray, max_distance: f32) -> Option<RayHit> {
        let cells = self.resolution - 1;
        let walker = GridWalker::new(
            Vec2::new(ray.origin.x, ray.origin.z),
            Vec2::new(ray.direction.x, ray.direction.z),
            max_distance,
            Vec2::splat(-self.half_size),
            self.cell_size,
            (cells, cells),
        );

        for cell in walker {
            let y_enter = ray.origin.y + ray.direction.y * cell.t_enter;
            let y_exit = ray.origin.y + ray.direction.y * cell.t_exit;
            let corners = [
                self.raw(cell.x, cell.z),
                self.raw(cell.x + 1, cell.z),
                self.raw(cell.x, cell.z + 1),
                self.raw(cell.x + 1, cell.z + 1),
            ];
            let lo = corners.iter().copied().fold(f32::INFINITY, f32::min);
            let hi = corners.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            if y_enter.min(y_exit) > hi + 1e-3 || y_enter.max(y_exit) < lo - 1e-3 {
                continue;
            }

            let nearest = self
                .cell_triangles(cell.x, cell.z)
                .iter()
                .filter_map(|tri| tri.intersect_ray(ray, max_distance))
                .min_by(|a, b| a.distance.total_cmp(&b.distance));
            if nearest.is_some() {
                return nearest;
            }
        }
        None
    }

    /// Nearest static object along the ray, with its index.
    ///
    /// After the first candidate, only [`OVERWALK_BUCKETS`] more buckets are
    /// checked, so a nearer object further along can in rare cases be missed.
    pub fn trace_objects(&self, ray: &Ray, max_distance: f32) -> Option<(RayHit, usize)> {
        let walker = GridWalker::new(
            Vec2::new(ray.origin.x, ray.origin.z),
            Vec2::new(ray.direction.x, ray.direction.z),
            max_distance,
            Vec2::splat(-self.half_size),
            self.bucket_size,
            (self.bucket_dims, self.bucket_dims),
        );

        let mut best: Option<(RayHit, usize)> = None;
        let mut overwalk = 0;
        for cell in walker {
            if best.is_some() {
                if overwalk >= OVERWALK_BUCKETS {
                    break;
                }
                overwalk += 1;
            }

            for &index in &self.buckets[cell.z * self.bucket_dims + cell.x] {
                let index = index as usize;
                let limit = best.map_or(max_distance, |(hit, _)| hit.distance);
                let hit = self.objects[index]
                    .spheres
                    .iter()
                    .filter_map(|s| s.intersect_ray(ray, limit))
                    .min_by(|a, b| a.distance.total_cmp(&b.distance));
                if let Some(hit) = hit {
                    best = Some((hit, index));
                }
            }
        }
        best
    }

    /// Indices of objects in buckets overlapping the XZ square around
    /// `center`, each listed once
    fn objects_near(&self, center: Vec3, radius: f32) -> Vec<u32> {
        let (x0, x1) = self.bucket_span(center.x, radius);
        let (z0, z1) = self.bucket_span(center.z, radius);
        let mut found = Vec::new();
        for bz in z0..=z1 {
            for bx in x0..=x1 {
                found.extend_from_slice(&self.buckets[bz * self.bucket_dims + bx]);
            }
        }
        found.sort_unstable();
        found.dedup();
        found
    }

    fn bucket_span(&self, coord: f32, radius: f32) -> (usize, usize) {
        let last = self.bucket_dims as f32 - 1.0;
        let lo = ((coord - radius + self.half_size) / self.bucket_size)
            .floor()
            .clamp(0.0, last);
        let hi = ((coord + radius + self.half_size) / self.bucket_size)
            .floor()
            .clamp(0.0, last);
        (lo as usize, hi as usize)
    }

    /// Mean of every contact between `sphere` and nearby object spheres
    pub fn collide_sphere_with_objects(&self, sphere: &Sphere) -> Option<Contact> {
        let mut contacts = Vec::new();
        for index in self.objects_near(sphere.center, sphere.radius) {
            let object = &self.objects[index as usize];
            if !object.overlaps_xz(sphere.center, sphere.radius) {
                continue;
            }
            contacts.extend(object.spheres.iter().filter_map(|s| sphere.contact(s)));
        }
        Contact::average(&contacts)
    }

    /// True if a vertical cylinder of `radius` at `center` touches any object
    pub fn overlaps_objects(&self, center: Vec3, radius: f32) -> bool {
        self.objects_near(center, radius)
            .into_iter()
            .any(|i| self.objects[i as usize].overlaps_xz(center, radius))
    }

    /// Rejection-sample a ground position whose `radius` clears every static
    /// object and every sphere in `occupied`.
    pub fn find_spawn_point(
        &self,
        rng: &mut impl Rng,
        radius: f32,
        occupied: &[Sphere],
    ) -> SpawnPoint {
        let limit = (self.half_size - self.config.border_margin - radius).max(0.0);
        let mut candidate = Vec3::ZERO;

        for _ in 0..self.config.spawn_attempts.max(1) {
            let x = sample_symmetric(rng, limit);
            let z = sample_symmetric(rng, limit);
            candidate = Vec3::new(x, self.height_at(x, z).0, z);

            let blocked_by_car = occupied.iter().any(|s| {
                let d = Vec2::new(s.center.x - x, s.center.z - z);
                d.length() < s.radius + radius
            });
            if !blocked_by_car && !self.overlaps_objects(candidate, radius) {
                return SpawnPoint {
                    position: candidate,
                    clear: true,
                };
            }
        }

        warn!(
            attempts = self.config.spawn_attempts,
            "No clear spawn point found, accepting overlap"
        );
        SpawnPoint {
            position: candidate,
            clear: false,
        }
    }

    /// Place objects by rejection sampling. Returns the attempts spent.
    fn scatter_objects(&mut self, rng: &mut ChaCha8Rng) -> usize {
        let area = self.config.size * self.config.size;
        let wanted = ((area / 1000.0) * self.config.object_density.max(0.0)) as usize;
        let budget = wanted * self.config.placement_attempts.max(1);

        let total_weight: f32 = ObjectKind::ALL
            .iter()
            .map(|k| k.shape(&self.config).weight.max(0.0))
            .sum();
        if wanted == 0 || total_weight <= 0.0 {
            return 0;
        }

        let mut attempts = 0;
        while self.objects.len() < wanted && attempts < budget {
            attempts += 1;

            let kind = roll_kind(rng, &self.config, total_weight);
            let shape = kind.shape(&self.config);
            let footprint = shape.footprint();
            let limit = self.half_size - self.config.border_margin - footprint;
            if limit <= 0.0 {
                continue;
            }

            let x = sample_symmetric(rng, limit);
            let z = sample_symmetric(rng, limit);
            let crowded = self.objects.iter().any(|o| {
                let d = Vec2::new(o.position.x - x, o.position.z - z);
                d.length() < footprint + o.footprint
            });
            if crowded {
                continue;
            }

            let position = Vec3::new(x, self.height_at(x, z).0, z);
            let spheres = shape
                .spheres
                .iter()
                .map(|s| Sphere::new(position + s.offset, s.radius))
                .collect();
            self.insert_object(TerrainObject {
                kind,
                position,
                spheres,
                footprint,
            });
        }
        attempts
    }

    fn insert_object(&mut self, object: TerrainObject) {
        let index = self.objects.len() as u32;
        let (x0, x1) = self.bucket_span(object.position.x, object.footprint);
        let (z0, z1) = self.bucket_span(object.position.z, object.footprint);
        for bz in z0..=z1 {
            for bx in x0..=x1 {
                self.buckets[bz * self.bucket_dims + bx].push(index);
            }
        }
        self.objects.push(object);
    }
}

fn sample_symmetric(rng: &mut impl Rng, limit: f32) -> f32 {
    if limit > 0.0 {
        rng.gen_range(-limit..limit)
    } else {
        0.0
    }
}

fn roll_kind(rng: &mut impl Rng, config: &TerrainConfig, total_weight: f32) -> ObjectKind {
    let mut roll = rng.gen_range(0.0..total_weight);
    for kind in ObjectKind::ALL {
        let weight = kind.shape(config).weight.max(0.0);
        if roll < weight {
            return kind;
        }
        roll -= weight;
    }
    ObjectKind::Oak
}

/// Normalized heights with the border pinned to 1.0
fn generate_heights(mode: TerrainMode, resolution: usize, rng: &mut impl Rng) -> Vec<f32> {
    let mut heights = match mode {
        TerrainMode::Flat => vec![0.0; resolution * resolution],
        TerrainMode::Hills => fbm_heights(resolution, rng.gen()),
        TerrainMode::Valley => {
            let mut h = fbm_heights(resolution, rng.gen());
            let center = (resolution - 1) as f32 * 0.5;
            for iz in 0..resolution {
                for ix in 0..resolution {
                    let dx = (ix as f32 - center) / center;
                    let dz = (iz as f32 - center) / center;
                    let d = (dx * dx + dz * dz).sqrt();
                    h[iz * resolution + ix] *= smoothstep(0.15, 0.8, d);
                }
            }
            h
        }
    };

    let last = resolution - 1;
    for i in 0..resolution {
        heights[i] = 1.0;
        heights[last * resolution + i] = 1.0;
        heights[i * resolution] = 1.0;
        heights[i * resolution + last] = 1.0;
    }
    heights
}

/// Lattice cells across the map at the base octave
const NOISE_FREQUENCY: f64 = 4.0;
const NOISE_OCTAVES: usize = 4;
const NOISE_PERSISTENCE: f64 = 0.45;

/// Four octaves of Perlin fBm over the unit square, rescaled to [0, 1]
fn fbm_heights(resolution: usize, seed: u32) -> Vec<f32> {
    let fbm = Fbm::<Perlin>::new(seed)
        .set_octaves(NOISE_OCTAVES)
        .set_frequency(NOISE_FREQUENCY)
        .set_persistence(NOISE_PERSISTENCE);

    let last = (resolution - 1) as f64;
    let mut heights = Vec::with_capacity(resolution * resolution);
    for iz in 0..resolution {
        for ix in 0..resolution {
            heights.push(fbm.get([ix as f64 / last, iz as f64 / last]) as f32);
        }
    }

    let lo = heights.iter().copied().fold(f32::INFINITY, f32::min);
    let hi = heights.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let span = (hi - lo).max(f32::EPSILON);
    for h in &mut heights {
        *h = (*h - lo) / span;
    }
    heights
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(mode: TerrainMode) -> TerrainConfig {
        TerrainConfig {
            size: 120.0,
            resolution: 49,
            mode,
            ..TerrainConfig::default()
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let config = small_config(TerrainMode::Hills);
        let a = Terrain::generate(&config, 42);
        let b = Terrain::generate(&config, 42);
        assert_eq!(a.heights, b.heights);
        assert_eq!(a.objects.len(), b.objects.len());
        assert_eq!(a.height_at(3.3, -7.1), b.height_at(3.3, -7.1));
    }

    #[test]
    fn test_border_is_pinned_to_max() {
        let terrain = Terrain::generate(&small_config(TerrainMode::Hills), 7);
        let edge = terrain.half_size();
        assert!((terrain.height_at(-edge, 0.0).0 - terrain.max_height()).abs() < 1e-4);
        assert!((terrain.height_at(edge, 13.0).0 - terrain.max_height()).abs() < 1e-4);
        assert!((terrain.height_at(0.0, edge).0 - terrain.max_height()).abs() < 1e-4);
    }

    #[test]
    fn test_flat_interior_has_up_normal() {
        let terrain = Terrain::generate(&small_config(TerrainMode::Flat), 1);
        let (h, n) = terrain.height_at(1.7, -2.2);
        assert_eq!(h, 0.0);
        assert!((n - Vec3::Y).length() < 1e-6);
    }

    #[test]
    fn test_height_is_continuous_across_cell_and_diagonal() {
        let terrain = Terrain::generate(&small_config(TerrainMode::Hills), 99);
        let max_slope = terrain.max_height() / terrain.cell_size * 2.0;
        let step = terrain.cell_size / 200.0;
        let mut previous = terrain.height_at(-10.0, -10.0).0;
        for i in 1..2000 {
            let t = i as f32 * step;
            let h = terrain.height_at(-10.0 + t, -10.0 + t * 0.73).0;
            assert!((h - previous).abs() <= max_slope * step * 1.5 + 1e-4);
            previous = h;
        }
    }

    #[test]
    fn test_objects_are_indexed_in_every_overlapping_bucket() {
        let terrain = Terrain::generate(&small_config(TerrainMode::Hills), 5);
        assert!(!terrain.objects().is_empty());
        for (index, object) in terrain.objects().iter().enumerate() {
            let (x0, x1) = terrain.bucket_span(object.position.x, object.footprint);
            let (z0, z1) = terrain.bucket_span(object.position.z, object.footprint);
            for bz in z0..=z1 {
                for bx in x0..=x1 {
                    assert!(terrain.buckets[bz * terrain.bucket_dims + bx].contains(&(index as u32)));
                }
            }
        }
    }

    #[test]
    fn test_objects_do_not_overlap_each_other() {
        let terrain = Terrain::generate(&small_config(TerrainMode::Hills), 11);
        let objects = terrain.objects();
        for (i, a) in objects.iter().enumerate() {
            for b in &objects[i + 1..] {
                let d = Vec2::new(a.position.x - b.position.x, a.position.z - b.position.z);
                assert!(d.length() >= a.footprint + b.footprint - 1e-4);
            }
        }
    }

    #[test]
    fn test_trace_ray_hits_object_before_ground() {
        let terrain = Terrain::generate(&small_config(TerrainMode::Flat), 3);
        let object = terrain.objects().first().expect("objects generated");
        let target = object.spheres[0].center;
        let origin = target + Vec3::new(0.0, 30.0, 0.0);
        let ray = Ray::new(origin, Vec3::NEG_Y).unwrap();
        let hit = terrain.trace_ray(&ray, 100.0).unwrap();
        assert!(matches!(hit.surface, TerrainSurface::Object(_)));
        assert!(hit.hit.point.y > 0.0);
    }

    #[test]
    fn test_collide_sphere_with_objects() {
        let terrain = Terrain::generate(&small_config(TerrainMode::Flat), 3);
        let object = &terrain.objects()[0];
        let ball = Sphere::new(object.spheres[0].center + Vec3::new(0.3, 0.0, 0.0), 0.5);
        let contact = terrain.collide_sphere_with_objects(&ball).unwrap();
        assert!(contact.penetration > 0.0);
        assert!(contact.normal.x > 0.0);

        let far = Sphere::new(Vec3::new(0.0, 500.0, 0.0), 0.5);
        assert!(terrain.collide_sphere_with_objects(&far).is_none());
    }

    #[test]
    fn test_find_spawn_point_avoids_objects() {
        let terrain = Terrain::generate(&small_config(TerrainMode::Hills), 21);
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        for _ in 0..50 {
            let spawn = terrain.find_spawn_point(&mut rng, 2.5, &[]);
            if spawn.clear {
                assert!(!terrain.overlaps_objects(spawn.position, 2.5));
            }
        }
    }

    #[test]
    fn test_noise_heights_fill_unit_range() {
        let a = fbm_heights(33, 17);
        let b = fbm_heights(33, 18);
        let lo = a.iter().copied().fold(f32::INFINITY, f32::min);
        let hi = a.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        assert_eq!(lo, 0.0);
        assert!((hi - 1.0).abs() < 1e-6);
        assert_eq!(a, fbm_heights(33, 17));
        assert_ne!(a, b);
    }

    /// Flat map with 2 m buckets and only the given objects
    fn terrain_with_spheres(objects: &[(Vec3, f32, f32)]) -> Terrain {
        let config = TerrainConfig {
            size: 120.0,
            resolution: 49,
            mode: TerrainMode::Flat,
            object_density: 0.0,
            bucket_size: 2.0,
            ..TerrainConfig::default()
        };
        let mut terrain = Terrain::generate(&config, 1);
        assert!(terrain.objects().is_empty());
        for &(center, radius, footprint) in objects {
            terrain.insert_object(TerrainObject {
                kind: ObjectKind::Rock,
                position: Vec3::new(center.x, 0.0, center.z),
                spheres: vec![Sphere::new(center, radius)],
                footprint,
            });
        }
        terrain
    }

    fn ray_along_x() -> Ray {
        Ray::new(Vec3::new(-50.0, 1.0, 0.5), Vec3::X).unwrap()
    }

    #[test]
    fn test_nearer_object_in_a_following_bucket_wins() {
        // The wide footprint makes the far rock a candidate from x = 5 on;
        // the near rock sits two buckets later
        let terrain = terrain_with_spheres(&[
            (Vec3::new(30.0, 1.0, 0.0), 1.0, 25.0),
            (Vec3::new(10.0, 1.0, 0.0), 1.0, 1.0),
        ]);
        let (hit, index) = terrain.trace_objects(&ray_along_x(), 200.0).unwrap();
        assert_eq!(index, 1);
        assert!((hit.point.x - (10.0 - 0.75f32.sqrt())).abs() < 1e-3);
    }

    #[test]
    fn test_search_stops_after_overwalk_buckets() {
        // Near rock lies well past the buckets visited after the first
        // candidate, so the far one is reported
        let terrain = terrain_with_spheres(&[
            (Vec3::new(30.0, 1.0, 0.0), 1.0, 25.0),
            (Vec3::new(20.0, 1.0, 0.0), 1.0, 1.0),
        ]);
        let (hit, index) = terrain.trace_objects(&ray_along_x(), 200.0).unwrap();
        assert_eq!(index, 0);
        assert!(hit.distance > 70.0);

        // Without the far candidate the near rock is found
        let alone = terrain_with_spheres(&[(Vec3::new(20.0, 1.0, 0.0), 1.0, 1.0)]);
        let (hit, index) = alone.trace_objects(&ray_along_x(), 200.0).unwrap();
        assert_eq!(index, 0);
        assert!(hit.distance < 70.0);
    }

    #[test]
    fn test_object_across_bucket_edge_is_found_from_either_side() {
        // Straddles the x = 0 bucket boundary
        let terrain = terrain_with_spheres(&[(Vec3::new(0.0, 1.0, 0.0), 1.5, 1.5)]);
        let from_west = terrain.trace_objects(&ray_along_x(), 200.0).unwrap();
        let east = Ray::new(Vec3::new(50.0, 1.0, 0.5), Vec3::NEG_X).unwrap();
        let from_east = terrain.trace_objects(&east, 200.0).unwrap();
        assert!(from_west.0.point.x < 0.0);
        assert!(from_east.0.point.x > 0.0);
        assert!(terrain.trace_objects(&ray_along_x(), 40.0).is_none());
    }

    #[test]
    fn test_valley_center_is_low() {
        let terrain = Terrain::generate(&small_config(TerrainMode::Valley), 4);
        assert!(terrain.height_at(0.0, 0.0).0 < 1e-3);
    }
}
