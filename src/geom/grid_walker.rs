//! 2D digital differential analyzer over a uniform grid
//!
//! Visits, in order, every cell of an `nx * nz` grid that a ray's XZ
//! projection passes through. Used both for heightfield ray tracing and
//! for walking the object buckets.

use glam::Vec2;

use super::GEOM_EPSILON;

/// One visited cell and the ray parameter range spent inside it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCell {
    pub x: usize,
    pub z: usize,
    pub t_enter: f32,
    pub t_exit: f32,
}

#[derive(Debug, Clone)]
pub struct GridWalker {
    cell: (i64, i64),
    step: (i64, i64),
    t_next: Vec2,
    t_delta: Vec2,
    t: f32,
    t_end: f32,
    dims: (i64, i64),
    remaining: usize,
    done: bool,
}

impl GridWalker {
    /// `origin` and `direction` are the XZ components of the ray; the ray
    /// parameter `t` is measured in units of the full ray direction, so a
    /// unit 3D direction yields distances. `grid_origin` is the min corner.
    pub fn new(
        origin: Vec2,
        direction: Vec2,
        max_t: f32,
        grid_origin: Vec2,
        cell_size: f32,
        dims: (usize, usize),
    ) -> Self {
        let mut walker = Self {
            cell: (0, 0),
            step: (0, 0),
            t_next: Vec2::splat(f32::INFINITY),
            t_delta: Vec2::splat(f32::INFINITY),
            t: 0.0,
            t_end: 0.0,
            dims: (dims.0 as i64, dims.1 as i64),
            remaining: dims.0 + dims.1 + 2,
            done: true,
        };

        if dims.0 == 0 || dims.1 == 0 || !(cell_size > 0.0) || !(max_t >= 0.0) {
            return walker;
        }

        let grid_max = grid_origin + Vec2::new(dims.0 as f32, dims.1 as f32) * cell_size;
        let Some((t_start, t_end)) = clip(origin, direction, max_t, grid_origin, grid_max) else {
            return walker;
        };

        let start = origin + direction * t_start;
        let local = (start - grid_origin) / cell_size;
        let cx = (local.x.floor() as i64).clamp(0, walker.dims.0 - 1);
        let cz = (local.y.floor() as i64).clamp(0, walker.dims.1 - 1);

        let axis = |o: f32, d: f32, c: i64, g: f32| -> (i64, f32, f32) {
            if d > GEOM_EPSILON {
                let boundary = g + (c + 1) as f32 * cell_size;
                (1, (boundary - o) / d, cell_size / d)
            } else if d < -GEOM_EPSILON {
                let boundary = g + c as f32 * cell_size;
                (-1, (boundary - o) / d, cell_size / -d)
            } else {
                (0, f32::INFINITY, f32::INFINITY)
            }
        };
        let (sx, nx, dx) = axis(origin.x, direction.x, cx, grid_origin.x);
        let (sz, nz, dz) = axis(origin.y, direction.y, cz, grid_origin.y);

        walker.cell = (cx, cz);
        walker.step = (sx, sz);
        walker.t_next = Vec2::new(nx, nz);
        walker.t_delta = Vec2::new(dx, dz);
        walker.t = t_start;
        walker.t_end = t_end;
        walker.done = false;
        walker
    }
}

/// Parameter range of the ray inside the rectangle, intersected with `[0, max_t]`
fn clip(origin: Vec2, direction: Vec2, max_t: f32, min: Vec2, max: Vec2) -> Option<(f32, f32)> {
    let mut t0 = 0.0f32;
    let mut t1 = max_t;
    for axis in 0..2 {
        let (o, d) = (origin[axis], direction[axis]);
        if d.abs() < GEOM_EPSILON {
            if o < min[axis] || o > max[axis] {
                return None;
            }
            continue;
        }
        let mut a = (min[axis] - o) / d;
        let mut b = (max[axis] - o) / d;
        if a > b {
            std::mem::swap(&mut a, &mut b);
        }
        t0 = t0.max(a);
        t1 = t1.min(b);
        if t0 > t1 {
            return None;
        }
    }
    Some((t0, t1))
}

impl Iterator for GridWalker {
    type Item = GridCell;

    fn next(&mut self) -> Option<GridCell> {
        if self.done {
            return None;
        }

        let t_exit = self.t_next.x.min(self.t_next.y).min(self.t_end);
        let cell = GridCell {
            x: self.cell.0 as usize,
            z: self.cell.1 as usize,
            t_enter: self.t,
            t_exit,
        };

        self.remaining = self.remaining.saturating_sub(1);
        if t_exit >= self.t_end || self.remaining == 0 {
            self.done = true;
            return Some(cell);
        }

        if self.t_next.x < self.t_next.y {
            self.cell.0 += self.step.0;
            self.t = self.t_next.x;
            self.t_next.x += self.t_delta.x;
        } else {
            self.cell.1 += self.step.1;
            self.t = self.t_next.y;
            self.t_next.y += self.t_delta.y;
        }

        if self.cell.0 < 0 || self.cell.1 < 0 || self.cell.0 >= self.dims.0 || self.cell.1 >= self.dims.1 {
            self.done = true;
        }

        Some(cell)
    }
}
