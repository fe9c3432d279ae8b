//! Hit and kill bookkeeping
//!
//! Hits gathered during a tick are applied per target in order of their
//! key. The first hit that brings health to zero decides the killer; later
//! hits on the same target that tick are dropped.

use crate::util::pool::Handle;

/// Sub-tick resolution of hit keys
pub const HIT_KEY_SCALE: u64 = 100;

/// Ordering key for a hit `fraction` of the way along the tick's sweep
pub fn hit_key(tick: u32, fraction: f32) -> u64 {
    let sub = (fraction.clamp(0.0, 1.0) * HIT_KEY_SCALE as f32).round() as u64;
    tick as u64 * HIT_KEY_SCALE + sub
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitRecord {
    pub key: u64,
    pub tick: u32,
    /// Stable id of the attacking player
    pub attacker: u64,
    pub damage: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KillRecord {
    pub tick: u32,
    pub victim: u64,
    pub killer: u64,
}

/// Result of applying one target's hits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitOutcome {
    pub health: i32,
    /// Hits that took effect, in application order
    pub applied: Vec<HitRecord>,
    /// Attacker of the lethal hit
    pub killer: Option<u64>,
}

/// Apply `hits` to `health` in key order, stopping at the first lethal hit
pub fn resolve_hits(health: i32, hits: &[HitRecord]) -> HitOutcome {
    let mut ordered = hits.to_vec();
    ordered.sort_by_key(|h| h.key);

    let mut outcome = HitOutcome {
        health,
        applied: Vec::with_capacity(ordered.len()),
        killer: None,
    };
    for hit in ordered {
        outcome.health = (outcome.health - hit.damage).max(0);
        outcome.applied.push(hit);
        if outcome.health == 0 {
            outcome.killer = Some(hit.attacker);
            break;
        }
    }
    outcome
}

/// Hits collected during one tick, grouped by target car
#[derive(Debug, Default)]
pub struct HitLedger {
    pending: Vec<(Handle, HitRecord)>,
}

impl HitLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, target: Handle, hit: HitRecord) {
        self.pending.push((target, hit));
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drain pending hits as `(target, hits)` groups, targets in slot order
    pub fn drain_by_target(&mut self) -> Vec<(Handle, Vec<HitRecord>)> {
        let mut pending = std::mem::take(&mut self.pending);
        pending.sort_by_key(|(target, hit)| (*target, hit.key));

        let mut groups: Vec<(Handle, Vec<HitRecord>)> = Vec::new();
        for (target, hit) in pending {
            match groups.last_mut() {
                Some((last, hits)) if *last == target => hits.push(hit),
                _ => groups.push((target, vec![hit])),
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::pool::Pool;

    fn hit(tick: u32, fraction: f32, attacker: u64, damage: i32) -> HitRecord {
        HitRecord {
            key: hit_key(tick, fraction),
            tick,
            attacker,
            damage,
        }
    }

    #[test]
    fn test_hit_key_orders_within_tick() {
        assert!(hit_key(10, 0.2) < hit_key(10, 0.7));
        assert!(hit_key(10, 1.0) <= hit_key(11, 0.0));
        assert_eq!(hit_key(3, 0.5), 350);
    }

    #[test]
    fn test_earlier_lethal_hit_wins() {
        // Recorded out of order; the nearer hit lands first
        let hits = [hit(5, 0.8, 2, 30), hit(5, 0.3, 1, 30)];
        let outcome = resolve_hits(30, &hits);
        assert_eq!(outcome.killer, Some(1));
        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(outcome.health, 0);
    }

    #[test]
    fn test_non_lethal_hits_all_apply() {
        let hits = [hit(5, 0.1, 1, 10), hit(5, 0.9, 2, 10)];
        let outcome = resolve_hits(100, &hits);
        assert_eq!(outcome.health, 80);
        assert_eq!(outcome.killer, None);
        assert_eq!(outcome.applied.len(), 2);
    }

    #[test]
    fn test_exact_zero_credits_crossing_hit() {
        let hits = [hit(7, 0.1, 1, 20), hit(7, 0.4, 2, 30), hit(7, 0.6, 3, 50)];
        let outcome = resolve_hits(50, &hits);
        assert_eq!(outcome.killer, Some(2));
        assert_eq!(outcome.applied.len(), 2);
    }

    #[test]
    fn test_ledger_groups_by_target() {
        let mut pool = Pool::with_capacity(2);
        let a = pool.try_add(()).unwrap();
        let b = pool.try_add(()).unwrap();

        let mut ledger = HitLedger::new();
        ledger.record(b, hit(1, 0.5, 9, 1));
        ledger.record(a, hit(1, 0.9, 9, 1));
        ledger.record(a, hit(1, 0.1, 8, 1));
        let groups = ledger.drain_by_target();

        assert!(ledger.is_empty());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, a);
        assert_eq!(groups[0].1[0].attacker, 8);
        assert_eq!(groups[1].0, b);
    }
}
