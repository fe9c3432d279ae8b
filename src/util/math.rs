//! Small scalar and vector helpers used by the physics code

use glam::Vec3;

/// Components with magnitude below this are treated as rounding noise
pub const SNAP_EPSILON: f32 = 1.0e-4;

/// Linearly map `value` from `[in_min, in_max]` onto `[out_min, out_max]`,
/// clamping to the output range.
pub fn range_map(value: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    let span = in_max - in_min;
    if span.abs() < f32::EPSILON {
        return out_min;
    }
    let t = ((value - in_min) / span).clamp(0.0, 1.0);
    out_min + (out_max - out_min) * t
}

/// `x * |x|`: a square that keeps the sign of its input
pub fn signed_square(x: f32) -> f32 {
    x * x.abs()
}

/// Move `current` toward `target` by at most `max_delta`
pub fn approach(current: f32, target: f32, max_delta: f32) -> f32 {
    let delta = target - current;
    if delta.abs() <= max_delta {
        target
    } else {
        current + max_delta.copysign(delta)
    }
}

/// Zero out components smaller than `epsilon`
pub fn snap_small(v: Vec3, epsilon: f32) -> Vec3 {
    Vec3::new(
        if v.x.abs() < epsilon { 0.0 } else { v.x },
        if v.y.abs() < epsilon { 0.0 } else { v.y },
        if v.z.abs() < epsilon { 0.0 } else { v.z },
    )
}

/// Scale `v` down so its length does not exceed `max_length`
pub fn clamp_length(v: Vec3, max_length: f32) -> Vec3 {
    let length_sq = v.length_squared();
    if length_sq > max_length * max_length && length_sq > 0.0 {
        v * (max_length / length_sq.sqrt())
    } else {
        v
    }
}

/// Replace non-finite vectors with zero
pub fn finite_or_zero(v: Vec3) -> Vec3 {
    if v.is_finite() {
        v
    } else {
        Vec3::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_map_clamps() {
        assert_eq!(range_map(0.0, 5.0, 30.0, 0.0, -0.3), 0.0);
        assert_eq!(range_map(100.0, 5.0, 30.0, 0.0, -0.3), -0.3);
        assert!((range_map(17.5, 5.0, 30.0, 0.0, -0.3) + 0.15).abs() < 1e-6);
    }

    #[test]
    fn test_signed_square() {
        assert_eq!(signed_square(-3.0), -9.0);
        assert_eq!(signed_square(2.0), 4.0);
    }

    #[test]
    fn test_approach() {
        assert_eq!(approach(0.0, 1.0, 0.25), 0.25);
        assert_eq!(approach(0.0, -1.0, 0.25), -0.25);
        assert_eq!(approach(0.9, 1.0, 0.25), 1.0);
    }

    #[test]
    fn test_snap_small() {
        let v = snap_small(Vec3::new(1.0e-6, 2.0, -1.0e-5), SNAP_EPSILON);
        assert_eq!(v, Vec3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn test_clamp_length() {
        let v = clamp_length(Vec3::new(30.0, 40.0, 0.0), 5.0);
        assert!((v.length() - 5.0).abs() < 1e-5);
        assert_eq!(clamp_length(Vec3::X, 5.0), Vec3::X);
    }
}
