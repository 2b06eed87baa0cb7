//! Newton step damping.

use crate::THERMAL_VOLTAGE;

use super::options::DampingPolicy;

/// Reduced indices of a voltage-locked node pair (`None` is ground).
pub type LockedPair = (Option<usize>, Option<usize>);

fn delta_at(delta: &[f64], index: Option<usize>) -> f64 {
    index.map_or(0.0, |i| delta[i])
}

/// Damping factor for the Newton update `delta` at `iteration` (1-based).
///
/// Starts from the early factor during the first
/// `policy.early_iterations` iterations and from 1 afterwards, then
/// shrinks until no locked pair moves by more than
/// `policy.locked_multiple` thermal voltages. The result lies in (0, 1].
pub fn damping_factor(
    policy: &DampingPolicy,
    iteration: usize,
    delta: &[f64],
    locked: &[LockedPair],
) -> f64 {
    let mut factor = if iteration <= policy.early_iterations {
        policy.early_factor
    } else {
        1.0
    };

    let limit = policy.locked_multiple * THERMAL_VOLTAGE;
    for &(p, n) in locked {
        let step = (delta_at(delta, p) - delta_at(delta, n)).abs();
        if step * factor > limit {
            factor = limit / step;
        }
    }

    factor.min(1.0)
}
