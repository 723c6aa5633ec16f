//! Best-effort routing for cells the flood never reached
//!
//! Such cells sit in valid regions completely cut off from every seed, which
//! only happens when draining into nodata is disabled. They get routed onto
//! already-resolved neighbors, so no cycle can form:
//!
//! 1. steepest strictly lower resolved neighbor
//! 2. non-ascending resolved neighbor carrying the most upstream cells so far
//! 3. any resolved neighbor
//!
//! Candidates are scanned in D8 code order and ties keep the lowest code.
//! Cells are swept in ascending (elevation, index) order; when a sweep makes
//! no progress the lowest unresolved cell becomes an explicit sink. A cell
//! routed uphill is raised to its target's level so paths stay
//! non-increasing. The outcome is reproducible but not globally optimal.

use catchflow_core::raster::d8;

/// Route `cells` and return how many received a downstream neighbor.
///
/// `direction` entries for `cells` are overwritten. `filled` may be raised.
pub(crate) fn repair_residuals(
    cells: &[usize],
    filled: &mut [f64],
    direction: &mut [u8],
    valid: &[bool],
    rows: usize,
    cols: usize,
) -> usize {
    let n = rows * cols;
    let mut resolved: Vec<bool> = (0..n).map(|i| valid[i]).collect();
    for &idx in cells {
        resolved[idx] = false;
        direction[idx] = d8::NONE;
    }

    let mut pending = cells.to_vec();
    pending.sort_by(|&a, &b| filled[a].total_cmp(&filled[b]).then(a.cmp(&b)));

    // Upstream cell counts accumulated while routing
    let mut carried = vec![1u32; n];
    let mut routed = 0;

    while !pending.is_empty() {
        let before = pending.len();
        pending.retain(|&idx| {
            let Some(dir) = choose_target(idx, filled, &resolved, &carried, rows, cols) else {
                return true;
            };
            let Some((tr, tc)) = d8::step(idx / cols, idx % cols, dir, rows, cols) else {
                return true;
            };
            let target = tr * cols + tc;

            direction[idx] = dir;
            resolved[idx] = true;
            if filled[idx] < filled[target] {
                filled[idx] = filled[target];
            }

            let mut cur = target;
            loop {
                carried[cur] += carried[idx];
                match d8::step(cur / cols, cur % cols, direction[cur], rows, cols) {
                    Some((r, c)) => cur = r * cols + c,
                    None => break,
                }
            }
            routed += 1;
            false
        });

        if pending.len() == before {
            // Nothing resolved nearby: the lowest remaining cell is a sink
            let sink = pending.remove(0);
            resolved[sink] = true;
        }
    }

    routed
}

fn choose_target(
    idx: usize,
    filled: &[f64],
    resolved: &[bool],
    carried: &[u32],
    rows: usize,
    cols: usize,
) -> Option<u8> {
    let (row, col) = (idx / cols, idx % cols);
    let center = filled[idx];
    let candidates: Vec<(u8, usize)> = d8::neighbors(row, col, rows, cols)
        .map(|(dir, r, c)| (dir, r * cols + c))
        .filter(|&(_, nidx)| resolved[nidx])
        .collect();

    let mut steepest = None;
    let mut best_drop = 0.0;
    for &(dir, nidx) in &candidates {
        let drop = (center - filled[nidx]) / d8::DISTANCES[(dir - 1) as usize];
        if drop > best_drop {
            best_drop = drop;
            steepest = Some(dir);
        }
    }
    if steepest.is_some() {
        return steepest;
    }

    let mut busiest: Option<(u8, u32)> = None;
    for &(dir, nidx) in &candidates {
        if filled[nidx] <= center && busiest.map_or(true, |(_, best)| carried[nidx] > best) {
            busiest = Some((dir, carried[nidx]));
        }
    }
    if let Some((dir, _)) = busiest {
        return Some(dir);
    }

    candidates.first().map(|&(dir, _)| dir)
}
