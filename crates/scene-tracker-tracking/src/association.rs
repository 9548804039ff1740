//! Data association: distance metrics and one-to-one assignment.
//!
//! The associator is pure and stateless: given track snapshots, detections,
//! a distance metric, and a gating threshold, it produces a minimum-total-
//! cost one-to-one assignment plus the unassigned indices on both sides.
//! It holds no locks and touches no shared state, so it is safe to evaluate
//! concurrently over per-camera detection slices.

use scene_tracker_core::Detection;

use crate::track::TrackSnapshot;

/// Sentinel cost for gated-out pairs. Large enough to never beat a real
/// distance, small enough that sums of a few of them cannot overflow.
const GATED: f64 = 1e30;

// ---------------------------------------------------------------------------
// DistanceType
// ---------------------------------------------------------------------------

/// Distance metric used to score a (track, detection) pair.
///
/// A tagged variant rather than a trait object: the set of metrics is
/// closed and dispatch happens in the innermost loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceType {
    /// 3-D Euclidean distance between the predicted track position and the
    /// detection's world position.
    Euclidean,
    /// Euclidean distance, but pairs whose most probable class differs are
    /// ineligible.
    MultiClassEuclidean,
}

impl DistanceType {
    /// Distance between a predicted track state and a detection.
    ///
    /// Returns `f64::INFINITY` for ineligible pairs.
    pub fn distance(&self, track: &TrackSnapshot, detection: &Detection) -> f64 {
        match self {
            Self::Euclidean => euclidean(track.position, detection.world.position),
            Self::MultiClassEuclidean => {
                if track.classification.argmax() != detection.classification.argmax() {
                    f64::INFINITY
                } else {
                    euclidean(track.position, detection.world.position)
                }
            }
        }
    }
}

fn euclidean(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

// ---------------------------------------------------------------------------
// AssociationOutcome
// ---------------------------------------------------------------------------

/// Result of one association round.
///
/// Each track index and each detection index appears in at most one
/// assignment pair; the unassigned vectors carry everything else, in
/// ascending index order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociationOutcome {
    /// Matched (track_index, detection_index) pairs
    pub assignments: Vec<(usize, usize)>,
    /// Track indices not present in any assignment
    pub unassigned_tracks: Vec<usize>,
    /// Detection indices not present in any assignment
    pub unassigned_detections: Vec<usize>,
}

/// Match tracks to detections with a minimum-total-cost one-to-one
/// assignment, gated by `distance_threshold`.
///
/// Pairs with distance greater than the threshold are ineligible. Ties are
/// broken deterministically toward the lower track index, then the lower
/// detection index. Either side may be empty.
pub fn associate(
    tracks: &[TrackSnapshot],
    detections: &[Detection],
    distance_type: DistanceType,
    distance_threshold: f64,
) -> AssociationOutcome {
    let n_tracks = tracks.len();
    let n_dets = detections.len();

    if n_tracks == 0 || n_dets == 0 {
        return AssociationOutcome {
            assignments: Vec::new(),
            unassigned_tracks: (0..n_tracks).collect(),
            unassigned_detections: (0..n_dets).collect(),
        };
    }

    // Gated cost matrix [track][detection].
    let mut costs = vec![vec![GATED; n_dets]; n_tracks];
    for (ti, track) in tracks.iter().enumerate() {
        for (di, det) in detections.iter().enumerate() {
            let d = distance_type.distance(track, det);
            if d.is_finite() && d <= distance_threshold {
                costs[ti][di] = d;
            }
        }
    }

    let assignment = hungarian_min_cost(&costs, n_tracks, n_dets);

    let mut assignments = Vec::new();
    let mut det_assigned = vec![false; n_dets];
    for (ti, slot) in assignment.iter().enumerate() {
        if let Some(di) = slot {
            // Matches through the sentinel are not real assignments.
            if costs[ti][*di] < GATED {
                assignments.push((ti, *di));
                det_assigned[*di] = true;
            }
        }
    }

    let assigned_tracks: Vec<bool> = {
        let mut v = vec![false; n_tracks];
        for (ti, _) in &assignments {
            v[*ti] = true;
        }
        v
    };

    AssociationOutcome {
        unassigned_tracks: (0..n_tracks).filter(|t| !assigned_tracks[*t]).collect(),
        unassigned_detections: (0..n_dets).filter(|d| !det_assigned[*d]).collect(),
        assignments,
    }
}

// ---------------------------------------------------------------------------
// Hungarian algorithm
// ---------------------------------------------------------------------------

/// Minimum-cost one-to-one assignment (Kuhn–Munkres with potentials,
/// shortest augmenting paths).
///
/// Rows are tracks, columns are detections. Gated pairs carry the sentinel
/// cost, so the optimum avoids them whenever a feasible alternative exists;
/// the caller filters sentinel matches out.
///
/// Returns, per row, the matched column or `None`. Rows are processed in
/// ascending order and columns scanned in ascending order, which breaks
/// cost ties toward lower indices.
///
/// Complexity: O(rows² · cols).
fn hungarian_min_cost(costs: &[Vec<f64>], n_rows: usize, n_cols: usize) -> Vec<Option<usize>> {
    // Potentials and matching use 1-based columns; column 0 is the virtual
    // start of each augmenting path.
    let mut row_potential = vec![0.0f64; n_rows + 1];
    let mut col_potential = vec![0.0f64; n_cols + 1];
    // matched_row[col] = row currently matched to `col` (0 = unmatched)
    let mut matched_row = vec![0usize; n_cols + 1];
    // way[col] = previous column on the alternating path
    let mut way = vec![0usize; n_cols + 1];

    for row in 1..=n_rows {
        matched_row[0] = row;
        let mut j0 = 0usize;
        let mut min_cost = vec![f64::INFINITY; n_cols + 1];
        let mut used = vec![false; n_cols + 1];

        loop {
            used[j0] = true;
            let i0 = matched_row[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;

            for j in 1..=n_cols {
                if used[j] {
                    continue;
                }
                let cur = costs[i0 - 1][j - 1] - row_potential[i0] - col_potential[j];
                if cur < min_cost[j] {
                    min_cost[j] = cur;
                    way[j] = j0;
                }
                if min_cost[j] < delta {
                    delta = min_cost[j];
                    j1 = j;
                }
            }

            if j1 == 0 {
                // No reachable column: the row stays unmatched (possible
                // when rows outnumber columns).
                break;
            }

            for j in 0..=n_cols {
                if used[j] {
                    row_potential[matched_row[j]] += delta;
                    col_potential[j] -= delta;
                } else {
                    min_cost[j] -= delta;
                }
            }

            j0 = j1;
            if matched_row[j0] == 0 {
                // Augment along the alternating path back to the start.
                loop {
                    let j_prev = way[j0];
                    matched_row[j0] = matched_row[j_prev];
                    j0 = j_prev;
                    if j0 == 0 {
                        break;
                    }
                }
                break;
            }
        }
    }

    let mut assignment = vec![None; n_rows];
    for col in 1..=n_cols {
        let row = matched_row[col];
        if row != 0 {
            assignment[row - 1] = Some(col - 1);
        }
    }
    assignment
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
