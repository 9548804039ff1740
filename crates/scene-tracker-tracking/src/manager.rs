//! Track ownership, prediction/correction, and lifecycle transitions.
//!
//! The [`TrackManager`] is the sole owner of all tracks. Callers interact
//! through opaque [`TrackId`]s and [`TrackSnapshot`] value copies; between
//! `predict` and `correct` each track holds at most one pending
//! measurement, and after `correct` no pending measurement remains.

use tracing::{debug, warn};

use scene_tracker_core::Detection;

use crate::track::{Measurement, Track, TrackId, TrackSnapshot, TrackStatus};

/// Weight of a new observation when blending sizes and class probabilities.
const MEASUREMENT_BLEND_ALPHA: f64 = 0.3;

// ---------------------------------------------------------------------------
// TrackManagerConfig
// ---------------------------------------------------------------------------

/// Configuration for track lifecycle and filter behaviour.
///
/// Lifecycle windows are expressed in seconds and converted to tick counts
/// with the reference frame rate: each threshold is
/// `max(1, round(window × frame_rate))`.
#[derive(Debug, Clone)]
pub struct TrackManagerConfig {
    /// Reference tick rate (ticks per second) used to derive counts
    pub frame_rate: f64,
    /// Seconds of consecutive hits before Tentative → Reliable (default 0.2)
    pub max_unreliable_time: f64,
    /// Seconds without measurements before Reliable → Unreliable (default 0.3)
    pub non_measurement_time_dynamic: f64,
    /// Further seconds without measurements before Unreliable → Suspended
    /// (default 1.0)
    pub non_measurement_time_static: f64,
    /// Further seconds without measurements before Suspended → Deleted
    /// (default 10.0)
    pub suspended_timeout_secs: f64,
    /// Kalman process noise variance σ²_a in (m/s²)² (default 0.01)
    pub process_noise_var: f64,
    /// Kalman measurement noise variance σ²_obs in m² (default 2.25)
    pub obs_noise_var: f64,
}

impl Default for TrackManagerConfig {
    fn default() -> Self {
        Self {
            frame_rate: 30.0,
            max_unreliable_time: 0.2,
            non_measurement_time_dynamic: 0.3,
            non_measurement_time_static: 1.0,
            suspended_timeout_secs: 10.0,
            process_noise_var: 0.01,
            obs_noise_var: 2.25,
        }
    }
}

/// Tick-count thresholds derived from a [`TrackManagerConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Thresholds {
    /// Total hits to promote Tentative → Reliable
    reliable_hits: u64,
    /// Consecutive misses to demote Reliable → Unreliable
    /// (also deletes a Tentative track)
    demote_misses: u32,
    /// Further consecutive misses to move Unreliable → Suspended
    suspend_misses: u32,
    /// Further consecutive misses to move Suspended → Deleted
    delete_misses: u32,
}

impl Thresholds {
    fn derive(config: &TrackManagerConfig) -> Self {
        let count = |window: f64| -> u32 {
            let ticks = (window * config.frame_rate).round();
            if ticks < 1.0 {
                1
            } else {
                ticks as u32
            }
        };
        Self {
            reliable_hits: u64::from(count(config.max_unreliable_time)),
            demote_misses: count(config.non_measurement_time_dynamic),
            suspend_misses: count(config.non_measurement_time_static),
            delete_misses: count(config.suspended_timeout_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// TrackManager
// ---------------------------------------------------------------------------

/// Owner of all tracks; runs the predict/correct cycle and the lifecycle
/// state machine.
///
/// Not safe for concurrent mutation: the caller serializes all access
/// (one logical tracker worker per manager).
pub struct TrackManager {
    tracks: Vec<Track>,
    config: TrackManagerConfig,
    thresholds: Thresholds,
    next_id: u64,
    /// Timestamp the filter states were last predicted to, in seconds.
    /// `None` until the first predict.
    clock: Option<f64>,
}

impl TrackManager {
    /// Create a manager with the provided configuration.
    pub fn new(config: TrackManagerConfig) -> Self {
        let thresholds = Thresholds::derive(&config);
        Self {
            tracks: Vec::new(),
            config,
            thresholds,
            next_id: 1,
            clock: None,
        }
    }

    /// Create a manager with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(TrackManagerConfig::default())
    }

    /// Recompute the lifecycle tick thresholds for a new reference frame
    /// rate, keeping the configured time windows.
    pub fn update_tracker_config(&mut self, frame_rate: f64) {
        if frame_rate <= 0.0 {
            warn!(frame_rate, "Ignoring non-positive frame rate");
            return;
        }
        self.config.frame_rate = frame_rate;
        self.thresholds = Thresholds::derive(&self.config);
        debug!(
            frame_rate,
            reliable_hits = self.thresholds.reliable_hits,
            demote_misses = self.thresholds.demote_misses,
            suspend_misses = self.thresholds.suspend_misses,
            delete_misses = self.thresholds.delete_misses,
            "Tracker thresholds recomputed"
        );
    }

    /// Advance every track's filter by `dt` seconds.
    ///
    /// Negative `dt` is clamped to zero and logged; status is unchanged.
    pub fn predict(&mut self, dt: f64) {
        let dt = if dt < 0.0 {
            warn!(dt, "Non-positive prediction interval clamped to 0");
            0.0
        } else {
            dt
        };
        for track in &mut self.tracks {
            track.kalman.predict(dt);
        }
        self.clock = Some(self.clock.unwrap_or(0.0) + dt);
    }

    /// Advance every track's filter to the absolute `timestamp` (seconds).
    ///
    /// The interval is the difference to the previous predict target; the
    /// first call establishes the clock without advancing state.
    pub fn predict_to(&mut self, timestamp: f64) {
        match self.clock {
            Some(previous) => {
                let dt = timestamp - previous;
                if dt < 0.0 {
                    warn!(
                        dt,
                        timestamp, "Timestamp regression, prediction interval clamped to 0"
                    );
                }
                for track in &mut self.tracks {
                    track.kalman.predict(dt.max(0.0));
                }
            }
            None => {
                // First tick: nothing to advance from.
            }
        }
        self.clock = Some(timestamp);
    }

    /// Attach a pending measurement to the named track.
    ///
    /// Unknown ids fail silently (the track may have been deleted this
    /// tick). Overwriting an existing pending measurement is a caller bug:
    /// `correct` must run between two `set_measurement` calls for the same
    /// track, and this asserts rather than corrupt the filter state.
    pub fn set_measurement(&mut self, id: TrackId, detection: &Detection) {
        let Some(track) = self.tracks.iter_mut().find(|t| t.id == id) else {
            return;
        };
        if track.status == TrackStatus::Deleted {
            return;
        }
        assert!(
            track.pending.is_none(),
            "track {id} already has a pending measurement this tick"
        );
        track.pending = Some(Measurement::from_detection(detection));
    }

    /// Apply pending measurements and run the lifecycle state machine.
    ///
    /// Every track with a pending measurement gets a filter update, a hit,
    /// and a cleared miss streak; every other track takes a miss. Status
    /// transitions are then evaluated, and tracks that reached `Deleted`
    /// are garbage-collected. After this call no track holds a pending
    /// measurement.
    pub fn correct(&mut self) {
        let now = self.clock.unwrap_or(0.0);
        let thresholds = self.thresholds;

        for track in &mut self.tracks {
            match track.pending.take() {
                Some(measurement) => Self::apply_hit(track, measurement, now, thresholds),
                None => Self::apply_miss(track, thresholds),
            }
        }

        self.tracks.retain(|t| {
            if t.status == TrackStatus::Deleted {
                debug!(track_id = %t.id, hits = t.hit_count, "Track deleted");
                false
            } else {
                true
            }
        });
    }

    fn apply_hit(track: &mut Track, measurement: Measurement, now: f64, thresholds: Thresholds) {
        track.kalman.update(measurement.position);
        for (s, m) in track.size.iter_mut().zip(measurement.size.iter()) {
            *s = *s * (1.0 - MEASUREMENT_BLEND_ALPHA) + *m * MEASUREMENT_BLEND_ALPHA;
        }
        track.rotation = measurement.rotation;
        track
            .classification
            .blend(&measurement.classification, MEASUREMENT_BLEND_ALPHA);

        track.hit_count += 1;
        track.consecutive_misses = 0;
        track.last_update_ts = now;

        match track.status {
            TrackStatus::Tentative => {
                if track.hit_count >= thresholds.reliable_hits {
                    track.status = TrackStatus::Reliable;
                    debug!(track_id = %track.id, hits = track.hit_count, "Track promoted to Reliable");
                }
            }
            TrackStatus::Unreliable | TrackStatus::Suspended => {
                track.status = TrackStatus::Reliable;
                debug!(track_id = %track.id, "Track recovered to Reliable");
            }
            TrackStatus::Reliable | TrackStatus::Deleted => {}
        }
    }

    fn apply_miss(track: &mut Track, thresholds: Thresholds) {
        track.miss_count += 1;
        track.consecutive_misses += 1;

        match track.status {
            TrackStatus::Tentative => {
                if track.consecutive_misses >= thresholds.demote_misses {
                    track.status = TrackStatus::Deleted;
                }
            }
            TrackStatus::Reliable => {
                if track.consecutive_misses >= thresholds.demote_misses {
                    track.status = TrackStatus::Unreliable;
                    track.consecutive_misses = 0;
                    debug!(track_id = %track.id, "Track demoted to Unreliable");
                }
            }
            TrackStatus::Unreliable => {
                if track.consecutive_misses >= thresholds.suspend_misses {
                    track.status = TrackStatus::Suspended;
                    track.consecutive_misses = 0;
                    debug!(track_id = %track.id, "Track suspended");
                }
            }
            TrackStatus::Suspended => {
                if track.consecutive_misses >= thresholds.delete_misses {
                    track.status = TrackStatus::Deleted;
                }
            }
            TrackStatus::Deleted => {}
        }
    }

    /// Create a new Tentative track from an unassigned detection.
    ///
    /// Allocates a fresh id (ids are never reused) and initializes the
    /// filter from the detection's world state. Returns the new id.
    pub fn create_track(&mut self, detection: &Detection, timestamp: f64) -> TrackId {
        let id = TrackId(self.next_id);
        self.next_id += 1;
        self.tracks.push(Track::from_detection(
            id,
            detection,
            timestamp,
            self.config.process_noise_var,
            self.config.obs_noise_var,
        ));
        debug!(track_id = %id, "Track created");
        id
    }

    /// Explicitly remove a track regardless of its lifecycle state.
    pub fn purge_track(&mut self, id: TrackId) {
        self.tracks.retain(|t| t.id != id);
    }

    /// Snapshots of all Reliable tracks.
    pub fn get_reliable_tracks(&self) -> Vec<TrackSnapshot> {
        self.snapshots_with_status(TrackStatus::Reliable)
    }

    /// Snapshots of all Unreliable tracks.
    pub fn get_unreliable_tracks(&self) -> Vec<TrackSnapshot> {
        self.snapshots_with_status(TrackStatus::Unreliable)
    }

    /// Snapshots of all Tentative tracks.
    pub fn get_tentative_tracks(&self) -> Vec<TrackSnapshot> {
        self.snapshots_with_status(TrackStatus::Tentative)
    }

    /// Snapshots of all Suspended tracks.
    pub fn get_suspended_tracks(&self) -> Vec<TrackSnapshot> {
        self.snapshots_with_status(TrackStatus::Suspended)
    }

    /// Snapshots of every live track, in creation order.
    pub fn get_tracks(&self) -> Vec<TrackSnapshot> {
        self.tracks.iter().map(Track::snapshot).collect()
    }

    /// Snapshot of one track by id.
    pub fn get_track(&self, id: TrackId) -> Option<TrackSnapshot> {
        self.tracks.iter().find(|t| t.id == id).map(Track::snapshot)
    }

    /// Number of live tracks.
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn snapshots_with_status(&self, status: TrackStatus) -> Vec<TrackSnapshot> {
        self.tracks
            .iter()
            .filter(|t| t.status == status)
            .map(Track::snapshot)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
