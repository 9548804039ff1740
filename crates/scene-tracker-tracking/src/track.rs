//! Track records and lifecycle states.
//!
//! A [`Track`] is the manager-owned belief about one physical object. The
//! manager is the sole owner; everything else sees [`TrackSnapshot`] value
//! copies, so consumers never alias manager-owned state.

use scene_tracker_core::{Classification, Detection};

use crate::kalman::KalmanState;

// ---------------------------------------------------------------------------
// TrackId
// ---------------------------------------------------------------------------

/// Stable identifier for a single track.
///
/// Allocated monotonically by the track manager; ids are never reused for
/// the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(pub u64);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// TrackStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a track.
///
/// Tentative → Reliable → Unreliable → Suspended → Deleted. A matched
/// measurement promotes a demoted track straight back to Reliable; a
/// Tentative track that runs out of evidence is deleted without passing
/// through the demotion tiers. Transitions are evaluated once per tick,
/// at correction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackStatus {
    /// Newly created; awaiting enough hits for promotion.
    Tentative,
    /// Confirmed track; first claim on high-score evidence.
    Reliable,
    /// Recently starved of measurements; still competes for evidence.
    Unreliable,
    /// Long-starved; retained for late re-acquisition only.
    Suspended,
    /// Terminal state; removed from the manager at the end of the tick.
    Deleted,
}

// ---------------------------------------------------------------------------
// Measurement
// ---------------------------------------------------------------------------

/// The fields of a detection a track actually consumes, copied out of the
/// tick-owned [`Detection`] by `set_measurement`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Measurement {
    pub position: [f64; 3],
    pub size: [f64; 3],
    pub rotation: [f64; 4],
    pub classification: Classification,
}

impl Measurement {
    pub(crate) fn from_detection(detection: &Detection) -> Self {
        Self {
            position: detection.world.position,
            size: detection.world.size,
            rotation: detection.world.rotation,
            classification: detection.classification.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Track
// ---------------------------------------------------------------------------

/// Manager-owned track state.
#[derive(Debug, Clone)]
pub(crate) struct Track {
    pub id: TrackId,
    pub kalman: KalmanState,
    pub classification: Classification,
    /// Smoothed object extents [l, w, h]
    pub size: [f64; 3],
    /// Last observed orientation quaternion [x, y, z, w]
    pub rotation: [f64; 4],
    pub status: TrackStatus,
    pub hit_count: u64,
    pub miss_count: u64,
    /// Misses since the last hit or status transition
    pub consecutive_misses: u32,
    pub created_ts: f64,
    pub last_update_ts: f64,
    /// At most one queued measurement between predict and correct
    pub pending: Option<Measurement>,
}

impl Track {
    pub(crate) fn from_detection(
        id: TrackId,
        detection: &Detection,
        timestamp: f64,
        process_noise_var: f64,
        obs_noise_var: f64,
    ) -> Self {
        Self {
            id,
            kalman: KalmanState::new(
                detection.world.position,
                process_noise_var,
                obs_noise_var,
            ),
            classification: detection.classification.clone(),
            size: detection.world.size,
            rotation: detection.world.rotation,
            status: TrackStatus::Tentative,
            hit_count: 1,
            miss_count: 0,
            consecutive_misses: 0,
            created_ts: timestamp,
            last_update_ts: timestamp,
            pending: None,
        }
    }

    pub(crate) fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            id: self.id,
            status: self.status,
            position: self.kalman.position(),
            velocity: self.kalman.velocity(),
            size: self.size,
            rotation: self.rotation,
            classification: self.classification.clone(),
            hit_count: self.hit_count,
            miss_count: self.miss_count,
            consecutive_misses: self.consecutive_misses,
            created_ts: self.created_ts,
            last_update_ts: self.last_update_ts,
        }
    }
}

// ---------------------------------------------------------------------------
// TrackSnapshot
// ---------------------------------------------------------------------------

/// Read-only value copy of a track's public state.
///
/// Position and velocity reflect the filter estimate at the time the
/// snapshot was taken (after `predict`, this is the predicted state the
/// associator should gate against).
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSnapshot {
    /// Stable track identifier
    pub id: TrackId,
    /// Lifecycle state at snapshot time
    pub status: TrackStatus,
    /// Estimated position [x, y, z] in metres
    pub position: [f64; 3],
    /// Estimated velocity [vx, vy, vz] in m/s
    pub velocity: [f64; 3],
    /// Smoothed extents [l, w, h] in metres
    pub size: [f64; 3],
    /// Orientation quaternion [x, y, z, w]
    pub rotation: [f64; 4],
    /// Running class-probability estimate
    pub classification: Classification,
    /// Total matched measurements over the track's lifetime
    pub hit_count: u64,
    /// Total missed ticks over the track's lifetime
    pub miss_count: u64,
    /// Misses since the last hit or status transition
    pub consecutive_misses: u32,
    /// Tick timestamp at creation (seconds)
    pub created_ts: f64,
    /// Tick timestamp of the last applied measurement (seconds)
    pub last_update_ts: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene_tracker_core::{Detection, WorldState};

    fn detection_at(pos: [f64; 3]) -> Detection {
        Detection {
            world: WorldState::at_position(pos),
            classification: Classification::new(vec![0.9, 0.1]),
            ..Detection::default()
        }
    }

    #[test]
    fn test_track_from_detection_starts_tentative() {
        let det = detection_at([1.0, 2.0, 0.0]);
        let track = Track::from_detection(TrackId(7), &det, 42.0, 0.01, 2.25);

        assert_eq!(track.status, TrackStatus::Tentative);
        assert_eq!(track.hit_count, 1);
        assert_eq!(track.consecutive_misses, 0);
        assert!(track.pending.is_none());
        assert!((track.created_ts - 42.0).abs() < f64::EPSILON);
        assert_eq!(track.kalman.position(), [1.0, 2.0, 0.0]);
    }

    #[test]
    fn test_snapshot_is_a_value_copy() {
        let det = detection_at([0.0, 0.0, 0.0]);
        let mut track = Track::from_detection(TrackId(1), &det, 0.0, 0.01, 2.25);

        let snap = track.snapshot();
        track.hit_count = 99;
        track.kalman.predict(10.0);

        // The snapshot is unaffected by later mutation of the track.
        assert_eq!(snap.hit_count, 1);
        assert_eq!(snap.position, [0.0, 0.0, 0.0]);
    }
}
