use rand::Rng;

use crate::error::PlanError;
use crate::models::{Plan, Segment};
use crate::planner::config::PlannerConfig;

/// Randomly split `total_minutes` across `machines`.
///
/// The result always sums to `total_minutes` and every segment is at least
/// `config.min_segment_minutes`. Segment order is the execution order and
/// need not follow the input order.
pub fn plan_session<S, R>(
    total_minutes: u32,
    machines: &[S],
    config: &PlannerConfig,
    rng: &mut R,
) -> Result<Plan, PlanError>
where
    S: AsRef<str>,
    R: Rng + ?Sized,
{
    if machines.is_empty() {
        return Err(PlanError::NoMachines);
    }

    let minimum = config.minimum_total(machines.len());
    if total_minutes < minimum {
        return Err(PlanError::TotalTooShort {
            total: total_minutes,
            machines: machines.len(),
            minimum,
        });
    }

    let segments = match machines {
        [only] => vec![Segment::new(only.as_ref(), total_minutes)],
        [a, b] => two_way_split(total_minutes, a.as_ref(), b.as_ref(), config, rng),
        _ => proportional_split(total_minutes, machines, config, rng),
    };

    Ok(Plan::new(segments))
}

fn two_way_split<R: Rng + ?Sized>(
    total: u32,
    a: &str,
    b: &str,
    config: &PlannerConfig,
    rng: &mut R,
) -> Vec<Segment> {
    let floor = config.min_segment_minutes;
    let share_floor = (total as f64 * config.two_way_min_share).floor() as u32;
    let min_each = floor.max(share_floor);
    let max_each = total.saturating_sub(min_each);
    let (lo, hi) = (min_each.min(max_each), min_each.max(max_each));

    let first = rng.gen_range(lo..=hi).clamp(floor, total - floor);
    let second = total - first;

    let (first_machine, second_machine) = if rng.gen_bool(0.5) { (a, b) } else { (b, a) };
    vec![
        Segment::new(first_machine, first),
        Segment::new(second_machine, second),
    ]
}

fn proportional_split<S, R>(
    total: u32,
    machines: &[S],
    config: &PlannerConfig,
    rng: &mut R,
) -> Vec<Segment>
where
    S: AsRef<str>,
    R: Rng + ?Sized,
{
    let floor = config.min_segment_minutes;
    let weights: Vec<f64> = machines.iter().map(|_| rng.gen::<f64>()).collect();
    let weight_sum: f64 = weights.iter().sum();

    let mut minutes: Vec<u32> = weights
        .iter()
        .map(|w| {
            let share = if weight_sum > 0.0 {
                w / weight_sum
            } else {
                1.0 / machines.len() as f64
            };
            ((share * total as f64).round() as u32).max(floor)
        })
        .collect();

    let assigned: i64 = minutes.iter().map(|&m| i64::from(m)).sum();
    apply_residual(&mut minutes, i64::from(total) - assigned, floor);

    machines
        .iter()
        .zip(minutes)
        .map(|(machine, m)| Segment::new(machine.as_ref(), m))
        .collect()
}

/// Rounding drift lands on the first segment. A deficit the first segment
/// cannot absorb without dropping under `floor` is taken from whichever
/// segments have the most headroom.
fn apply_residual(minutes: &mut [u32], residual: i64, floor: u32) {
    if residual >= 0 {
        minutes[0] += residual as u32;
        return;
    }

    let mut deficit = residual.unsigned_abs() as u32;
    let take = deficit.min(minutes[0] - floor);
    minutes[0] -= take;
    deficit -= take;

    while deficit > 0 {
        let Some((idx, headroom)) = minutes
            .iter()
            .map(|&m| m - floor)
            .enumerate()
            .max_by_key(|&(_, headroom)| headroom)
        else {
            break;
        };
        if headroom == 0 {
            break;
        }
        let take = deficit.min(headroom);
        minutes[idx] -= take;
        deficit -= take;
    }
}
