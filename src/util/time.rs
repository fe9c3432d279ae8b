//! Time utilities for game simulation

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Split an oversized step into equal halves until every sub-step is at
/// most `max_step`. Returns `(count, sub_dt)`.
///
/// Halving stops after `max_halvings` rounds, so a huge stall still yields
/// a bounded amount of work.
pub fn split_step(dt: f32, max_step: f32, max_halvings: u32) -> (u32, f32) {
    if dt <= 0.0 || max_step <= 0.0 {
        return (0, 0.0);
    }

    let mut count = 1u32;
    let mut sub_dt = dt;
    let mut rounds = 0;
    while sub_dt > max_step && rounds < max_halvings {
        count *= 2;
        sub_dt *= 0.5;
        rounds += 1;
    }

    (count, sub_dt)
}

/// Fixed-timestep accumulator.
///
/// Real elapsed time goes in, whole ticks come out. Leftover time stays
/// in the accumulator for the next call rather than being dropped.
#[derive(Debug, Clone)]
pub struct FixedStep {
    dt: f32,
    accumulator: f32,
}

impl FixedStep {
    pub fn new(dt: f32) -> Self {
        Self {
            dt,
            accumulator: 0.0,
        }
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    /// Add elapsed real time and return how many fixed ticks are due
    pub fn advance(&mut self, elapsed: f32) -> u32 {
        if self.dt <= 0.0 {
            return 0;
        }
        self.accumulator += elapsed.max(0.0);

        let mut ticks = 0;
        while self.accumulator >= self.dt {
            self.accumulator -= self.dt;
            ticks += 1;
        }
        ticks
    }

    /// Fraction of a tick left over, for render-side interpolation only
    pub fn alpha(&self) -> f32 {
        if self.dt <= 0.0 {
            return 0.0;
        }
        (self.accumulator / self.dt).clamp(0.0, 1.0)
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_step_within_limit() {
        assert_eq!(split_step(0.02, 0.03, 8), (1, 0.02));
    }

    #[test]
    fn test_split_step_halves_until_small() {
        let (count, sub) = split_step(0.1, 0.03, 8);
        assert_eq!(count, 4);
        assert!((sub - 0.025).abs() < 1e-6);
        assert!((sub * count as f32 - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_split_step_is_bounded() {
        let (count, _) = split_step(1.0e6, 1.0e-3, 5);
        assert_eq!(count, 32);
    }

    #[test]
    fn test_split_step_zero_dt() {
        assert_eq!(split_step(0.0, 0.03, 8), (0, 0.0));
    }

    #[test]
    fn test_fixed_step_carries_remainder() {
        let mut step = FixedStep::new(0.02);
        assert_eq!(step.advance(0.05), 2);
        assert!((step.alpha() - 0.5).abs() < 1e-3);
        assert_eq!(step.advance(0.011), 1);
        assert!(step.alpha() < 0.1);
    }

    #[test]
    fn test_fixed_step_ignores_negative_time() {
        let mut step = FixedStep::new(0.02);
        assert_eq!(step.advance(-1.0), 0);
        assert_eq!(step.alpha(), 0.0);
    }
}
