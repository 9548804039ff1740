//! Multiple-object tracker: one predict/associate/correct tick.
//!
//! Orchestrates the track manager and the data associator. Each tick:
//!
//! 1. Partition detections by score against the score threshold
//! 2. Predict all tracks forward to the tick timestamp
//! 3. Cascade association over the reliability tiers: reliable tracks claim
//!    high-score evidence first, then low-score evidence; unreliable and
//!    suspended tracks compete for what remains
//! 4. Correct, running the lifecycle state machine
//! 5. Seed new tentative tracks from unassigned high-score detections
//!
//! The batched variant consumes per-camera detection lists: association is
//! evaluated per camera in parallel (it is a pure function over immutable
//! snapshots), the measurement merge is sequential and first-camera-wins,
//! and the new-track pass walks cameras in reverse order, deduplicating
//! against tracks created earlier in the same pass.

use scene_tracker_core::Detection;

use crate::association::{associate, AssociationOutcome, DistanceType};
use crate::manager::{TrackManager, TrackManagerConfig};
use crate::track::{TrackId, TrackSnapshot};

/// Keep only the elements whose indices appear in `keep` (ascending).
fn filter_by_index<T: Clone>(elements: &[T], keep: &[usize]) -> Vec<T> {
    keep.iter().map(|&i| elements[i].clone()).collect()
}

/// Partition detections into (high, low) score halves.
///
/// Ordering within each partition follows the input order.
fn split_by_threshold(detections: Vec<Detection>, score_threshold: f64) -> (Vec<Detection>, Vec<Detection>) {
    let mut high = Vec::with_capacity(detections.len());
    let mut low = Vec::new();
    for det in detections {
        if det.score() >= score_threshold {
            high.push(det);
        } else {
            low.push(det);
        }
    }
    (high, low)
}

// ---------------------------------------------------------------------------
// MultipleObjectTracker
// ---------------------------------------------------------------------------

/// Tracker for one stream of detection ticks sharing a world frame.
///
/// Not safe for concurrent mutation; the owning worker serializes ticks.
pub struct MultipleObjectTracker {
    manager: TrackManager,
    distance_type: DistanceType,
    distance_threshold: f64,
    last_timestamp: Option<f64>,
}

impl Default for MultipleObjectTracker {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl MultipleObjectTracker {
    /// Default distance threshold in metres.
    pub const DEFAULT_DISTANCE_THRESHOLD: f64 = 5.0;
    /// Default score threshold for the high/low partition.
    pub const DEFAULT_SCORE_THRESHOLD: f64 = 0.5;

    /// Create a tracker with the given manager configuration and the
    /// default multi-class metric.
    pub fn new(config: TrackManagerConfig) -> Self {
        Self {
            manager: TrackManager::new(config),
            distance_type: DistanceType::MultiClassEuclidean,
            distance_threshold: Self::DEFAULT_DISTANCE_THRESHOLD,
            last_timestamp: None,
        }
    }

    /// Create a tracker with an explicit metric and threshold.
    pub fn with_metric(
        config: TrackManagerConfig,
        distance_type: DistanceType,
        distance_threshold: f64,
    ) -> Self {
        Self {
            manager: TrackManager::new(config),
            distance_type,
            distance_threshold,
            last_timestamp: None,
        }
    }

    /// Create a tracker with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(TrackManagerConfig::default())
    }

    /// One tracking tick over a single detection list.
    pub fn track(&mut self, detections: Vec<Detection>, timestamp: f64, score_threshold: f64) {
        self.track_with(
            detections,
            timestamp,
            self.distance_type,
            self.distance_threshold,
            score_threshold,
        );
    }

    /// One tracking tick with explicit metric parameters.
    pub fn track_with(
        &mut self,
        detections: Vec<Detection>,
        timestamp: f64,
        distance_type: DistanceType,
        distance_threshold: f64,
        score_threshold: f64,
    ) {
        if detections.is_empty() {
            self.manager.predict_to(timestamp);
            self.manager.correct();
            self.last_timestamp = Some(timestamp);
            return;
        }

        let (mut high, mut low) = split_by_threshold(detections, score_threshold);

        // 1. Predict
        self.manager.predict_to(timestamp);

        // 2. Associate with the reliable tracks first: high-score evidence,
        //    then low-score evidence for the survivors.
        let tracks = self.manager.get_reliable_tracks();
        let tracks = self.match_and_assign(tracks, &mut high, distance_type, distance_threshold);
        self.match_and_assign(tracks, &mut low, distance_type, distance_threshold);

        // 3.1 Remaining high-score evidence goes to unreliable tracks
        //     (demoted first, then tentative), then suspended tracks.
        //     Low-score leftovers only ever maintain reliable tracks.
        let mut unreliable = self.manager.get_unreliable_tracks();
        unreliable.extend(self.manager.get_tentative_tracks());
        self.match_and_assign(unreliable, &mut high, distance_type, distance_threshold);

        let suspended = self.manager.get_suspended_tracks();
        self.match_and_assign(suspended, &mut high, distance_type, distance_threshold);

        // 3.2 Correct measurements
        self.manager.correct();

        // 4. Unassigned high-score detections seed new tracks.
        for det in &high {
            self.manager.create_track(det, timestamp);
        }

        self.last_timestamp = Some(timestamp);
    }

    /// One tracking tick over per-camera detection lists.
    pub fn track_batched(
        &mut self,
        detections_per_camera: Vec<Vec<Detection>>,
        timestamp: f64,
        score_threshold: f64,
    ) {
        self.track_batched_with(
            detections_per_camera,
            timestamp,
            self.distance_type,
            self.distance_threshold,
            score_threshold,
        );
    }

    /// Batched tick with explicit metric parameters.
    pub fn track_batched_with(
        &mut self,
        detections_per_camera: Vec<Vec<Detection>>,
        timestamp: f64,
        distance_type: DistanceType,
        distance_threshold: f64,
        score_threshold: f64,
    ) {
        if detections_per_camera.is_empty() {
            self.manager.predict_to(timestamp);
            self.manager.correct();
            self.last_timestamp = Some(timestamp);
            return;
        }

        let mut high_per_camera = Vec::with_capacity(detections_per_camera.len());
        let mut low_per_camera = Vec::with_capacity(detections_per_camera.len());
        for objects in detections_per_camera {
            let (high, low) = split_by_threshold(objects, score_threshold);
            high_per_camera.push(high);
            low_per_camera.push(low);
        }

        // 1. Predict
        self.manager.predict_to(timestamp);

        // 2. Reliable tracks claim high-score evidence across all cameras,
        //    then low-score evidence.
        let tracks = self.manager.get_reliable_tracks();
        let tracks = self.match_and_assign_batched(
            tracks,
            &mut high_per_camera,
            distance_type,
            distance_threshold,
        );
        self.match_and_assign_batched(
            tracks,
            &mut low_per_camera,
            distance_type,
            distance_threshold,
        );

        // 3.1 Unreliable tracks (demoted first, then tentative), then
        //     suspended tracks compete for the remaining high-score
        //     evidence.
        let mut unreliable = self.manager.get_unreliable_tracks();
        unreliable.extend(self.manager.get_tentative_tracks());
        self.match_and_assign_batched(
            unreliable,
            &mut high_per_camera,
            distance_type,
            distance_threshold,
        );
        let suspended = self.manager.get_suspended_tracks();
        self.match_and_assign_batched(
            suspended,
            &mut high_per_camera,
            distance_type,
            distance_threshold,
        );

        // 3.2 Correct measurements
        self.manager.correct();

        // 4. New tracks, walking cameras in reverse order so the latest
        //    camera's evidence seeds first. Each camera's leftovers are
        //    first matched against tracks created earlier in this pass so
        //    one physical object seen by several cameras births one track;
        //    matched detections are dropped, not attached.
        let mut new_tracks: Vec<TrackSnapshot> = Vec::new();
        for camera_objects in high_per_camera.iter().rev() {
            let mut remaining: Vec<Detection> = camera_objects.clone();
            if !new_tracks.is_empty() {
                let outcome = associate(&new_tracks, &remaining, distance_type, distance_threshold);
                remaining = filter_by_index(&remaining, &outcome.unassigned_detections);
            }
            for det in &remaining {
                let id = self.manager.create_track(det, timestamp);
                if let Some(snapshot) = self.manager.get_track(id) {
                    new_tracks.push(snapshot);
                }
            }
        }

        self.last_timestamp = Some(timestamp);
    }

    /// Timestamp of the last completed tick, if any.
    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }

    /// Snapshots of all Reliable tracks.
    pub fn get_reliable_tracks(&self) -> Vec<TrackSnapshot> {
        self.manager.get_reliable_tracks()
    }

    /// Snapshots of every live track.
    pub fn get_tracks(&self) -> Vec<TrackSnapshot> {
        self.manager.get_tracks()
    }

    /// Snapshot of one track by id.
    pub fn get_track(&self, id: TrackId) -> Option<TrackSnapshot> {
        self.manager.get_track(id)
    }

    /// Recompute the frame-rate-derived lifecycle thresholds.
    pub fn update_tracker_config(&mut self, frame_rate: f64) {
        self.manager.update_tracker_config(frame_rate);
    }

    /// Match one tier of tracks against a detection pool, attach the
    /// matched measurements, drop assigned detections from the pool, and
    /// return the still-unassigned tracks.
    fn match_and_assign(
        &mut self,
        tracks: Vec<TrackSnapshot>,
        objects: &mut Vec<Detection>,
        distance_type: DistanceType,
        distance_threshold: f64,
    ) -> Vec<TrackSnapshot> {
        let outcome = associate(&tracks, objects, distance_type, distance_threshold);

        for (ti, di) in &outcome.assignments {
            self.manager.set_measurement(tracks[*ti].id, &objects[*di]);
        }

        *objects = filter_by_index(objects, &outcome.unassigned_detections);
        filter_by_index(&tracks, &outcome.unassigned_tracks)
    }

    /// Batched tier matching: per-camera association in parallel, then a
    /// sequential merge in camera order. The first camera to claim a track
    /// wins; a losing camera's detection returns to that camera's pool.
    fn match_and_assign_batched(
        &mut self,
        tracks: Vec<TrackSnapshot>,
        objects_per_camera: &mut [Vec<Detection>],
        distance_type: DistanceType,
        distance_threshold: f64,
    ) -> Vec<TrackSnapshot> {
        let num_cameras = objects_per_camera.len();
        if num_cameras == 0 || tracks.is_empty() {
            return tracks;
        }

        // Matching phase: pure per-camera association over immutable
        // snapshots, evaluated concurrently.
        let outcomes: Vec<AssociationOutcome> = if num_cameras == 1 {
            vec![associate(
                &tracks,
                &objects_per_camera[0],
                distance_type,
                distance_threshold,
            )]
        } else {
            std::thread::scope(|scope| {
                let tracks = &tracks;
                let handles: Vec<_> = objects_per_camera
                    .iter()
                    .map(|objects| {
                        scope.spawn(move || {
                            associate(tracks, objects, distance_type, distance_threshold)
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().expect("association worker panicked")).collect()
            })
        };

        // Sequential merge phase, deterministic in camera order.
        let mut track_assigned = vec![false; tracks.len()];
        for (cam_idx, outcome) in outcomes.iter().enumerate() {
            let mut keep = outcome.unassigned_detections.clone();
            for (ti, di) in &outcome.assignments {
                if track_assigned[*ti] {
                    // Another camera already claimed this track; the
                    // detection returns to this camera's pool.
                    keep.push(*di);
                } else {
                    track_assigned[*ti] = true;
                    self.manager
                        .set_measurement(tracks[*ti].id, &objects_per_camera[cam_idx][*di]);
                }
            }
            keep.sort_unstable();
            let remaining = filter_by_index(&objects_per_camera[cam_idx], &keep);
            objects_per_camera[cam_idx] = remaining;
        }

        tracks
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !track_assigned[*i])
            .map(|(_, t)| t)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::TrackStatus;
    use scene_tracker_core::{Classification, WorldState};

    /// 1 tick/s; promotion after 3 hits, demotion after 2 misses.
    fn test_tracker() -> MultipleObjectTracker {
        MultipleObjectTracker::new(TrackManagerConfig {
            frame_rate: 1.0,
            max_unreliable_time: 3.0,
            non_measurement_time_dynamic: 2.0,
            non_measurement_time_static: 3.0,
            suspended_timeout_secs: 5.0,
            ..TrackManagerConfig::default()
        })
    }

    fn detection(pos: [f64; 3], score: f64) -> Detection {
        Detection {
            world: WorldState::at_position(pos),
            classification: Classification::new(vec![score, (1.0 - score) / 2.0]),
            ..Detection::default()
        }
    }

    #[test]
    fn test_single_detection_births_one_track() {
        let mut tracker = test_tracker();
        tracker.track(vec![detection([1.0, 2.0, 0.0], 0.9)], 0.0, 0.5);

        let tracks = tracker.get_tracks();
        assert_eq!(tracks.len(), 1);
        let t = &tracks[0];
        assert_eq!(t.status, TrackStatus::Tentative);
        assert_eq!(t.hit_count, 1);
        assert!((t.position[0] - 1.0).abs() < 0.5, "px={}", t.position[0]);
        assert!((t.position[1] - 2.0).abs() < 0.5, "py={}", t.position[1]);
    }

    #[test]
    fn test_continuity_promotes_to_reliable() {
        let mut tracker = test_tracker();
        for step in 0..4 {
            tracker.track(vec![detection([1.0, 2.0, 0.0], 0.9)], step as f64, 0.5);
        }
        let tracks = tracker.get_tracks();
        assert_eq!(tracks.len(), 1, "repeated sightings must not fork tracks");
        assert_eq!(tracks[0].status, TrackStatus::Reliable);
    }

    #[test]
    fn test_miss_then_recover() {
        let mut tracker = test_tracker();
        tracker.track(vec![detection([0.0; 3], 0.9)], 0.0, 0.5);
        tracker.track(vec![], 1.0, 0.5);
        tracker.track(vec![detection([0.0; 3], 0.9)], 2.0, 0.5);

        let tracks = tracker.get_tracks();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].hit_count, 2);
        assert_eq!(tracks[0].consecutive_misses, 0);
        assert_eq!(
            tracks[0].status,
            TrackStatus::Tentative,
            "2 hits are below the promotion threshold of 3"
        );
    }

    #[test]
    fn test_low_score_detection_creates_no_track() {
        let mut tracker = test_tracker();
        tracker.track(vec![detection([0.0; 3], 0.3)], 0.0, 0.5);
        assert_eq!(tracker.get_tracks().len(), 0);
    }

    #[test]
    fn test_low_score_maintains_reliable_track() {
        let mut tracker = test_tracker();
        // Promote a track with three high-score sightings.
        for step in 0..3 {
            tracker.track(vec![detection([0.0; 3], 0.9)], step as f64, 0.5);
        }
        assert_eq!(tracker.get_reliable_tracks().len(), 1);

        // Low-score evidence keeps it alive without seeding a second track.
        for step in 3..8 {
            tracker.track(vec![detection([0.0; 3], 0.3)], step as f64, 0.5);
        }
        let tracks = tracker.get_tracks();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].status, TrackStatus::Reliable);
        assert_eq!(tracks[0].consecutive_misses, 0);
    }

    #[test]
    fn test_empty_tick_advances_clock_and_misses() {
        let mut tracker = test_tracker();
        tracker.track(vec![detection([0.0; 3], 0.9)], 0.0, 0.5);
        tracker.track(vec![], 1.0, 0.5);
        assert_eq!(tracker.last_timestamp(), Some(1.0));
        assert_eq!(tracker.get_tracks()[0].consecutive_misses, 1);
    }

    #[test]
    fn test_two_objects_keep_distinct_tracks() {
        let mut tracker = test_tracker();
        for step in 0..5 {
            let t = step as f64;
            tracker.track(
                vec![
                    detection([0.0, 0.0, 0.0], 0.9),
                    detection([20.0, 0.0, 0.0], 0.9),
                ],
                t,
                0.5,
            );
        }
        let tracks = tracker.get_tracks();
        assert_eq!(tracks.len(), 2);
        assert!(tracks.iter().all(|t| t.status == TrackStatus::Reliable));
    }

    #[test]
    fn test_batched_dedup_creates_single_track() {
        let mut tracker = test_tracker();
        // Two cameras observe the same world-space object.
        tracker.track_batched(
            vec![
                vec![detection([3.0, 1.0, 0.0], 0.9)],
                vec![detection([3.2, 1.1, 0.0], 0.9)],
            ],
            0.0,
            0.5,
        );
        assert_eq!(
            tracker.get_tracks().len(),
            1,
            "cross-camera first sightings must deduplicate"
        );
    }

    #[test]
    fn test_batched_reverse_order_prefers_last_camera() {
        let mut tracker = test_tracker();
        tracker.track_batched(
            vec![
                vec![detection([3.0, 0.0, 0.0], 0.9)],
                vec![detection([3.5, 0.0, 0.0], 0.9)],
            ],
            0.0,
            0.5,
        );
        let tracks = tracker.get_tracks();
        assert_eq!(tracks.len(), 1);
        // The last camera's view seeds the track; the earlier camera's
        // detection deduplicates against it.
        assert!(
            (tracks[0].position[0] - 3.5).abs() < 1e-9,
            "px={}",
            tracks[0].position[0]
        );
    }

    #[test]
    fn test_batched_distinct_objects_both_birth() {
        let mut tracker = test_tracker();
        tracker.track_batched(
            vec![
                vec![detection([0.0, 0.0, 0.0], 0.9)],
                vec![detection([50.0, 0.0, 0.0], 0.9)],
            ],
            0.0,
            0.5,
        );
        assert_eq!(tracker.get_tracks().len(), 2);
    }

    #[test]
    fn test_batched_first_camera_wins_track_claim() {
        let mut tracker = test_tracker();
        // Establish one reliable track at the origin.
        for step in 0..3 {
            tracker.track(vec![detection([0.0; 3], 0.9)], step as f64, 0.5);
        }
        let id = tracker.get_reliable_tracks()[0].id;

        // Camera 0 sees it at x=0.2, camera 1 at x=0.4. Camera 0's
        // measurement must win; camera 1's detection re-enters the pool and
        // seeds a new tentative track.
        tracker.track_batched(
            vec![
                vec![detection([0.2, 0.0, 0.0], 0.9)],
                vec![detection([0.4, 0.0, 0.0], 0.9)],
            ],
            3.0,
            0.5,
        );

        let updated = tracker.get_track(id).expect("track must survive");
        assert_eq!(updated.hit_count, 4, "camera 0's measurement applied");
        assert_eq!(
            tracker.get_tracks().len(),
            2,
            "camera 1's losing detection seeds a tentative track"
        );
    }

    #[test]
    fn test_batched_empty_input_is_a_miss_tick() {
        let mut tracker = test_tracker();
        tracker.track(vec![detection([0.0; 3], 0.9)], 0.0, 0.5);
        tracker.track_batched(vec![], 1.0, 0.5);
        assert_eq!(tracker.get_tracks()[0].consecutive_misses, 1);
        assert_eq!(tracker.last_timestamp(), Some(1.0));
    }

    #[test]
    fn test_batched_matches_reliable_tracks_across_cameras() {
        let mut tracker = test_tracker();
        for step in 0..3 {
            let t = step as f64;
            tracker.track(
                vec![
                    detection([0.0, 0.0, 0.0], 0.9),
                    detection([20.0, 0.0, 0.0], 0.9),
                ],
                t,
                0.5,
            );
        }
        assert_eq!(tracker.get_reliable_tracks().len(), 2);

        // Each camera sees one of the two objects.
        tracker.track_batched(
            vec![
                vec![detection([0.3, 0.0, 0.0], 0.9)],
                vec![detection([20.3, 0.0, 0.0], 0.9)],
            ],
            3.0,
            0.5,
        );
        let tracks = tracker.get_tracks();
        assert_eq!(tracks.len(), 2, "no spurious births");
        assert!(tracks.iter().all(|t| t.consecutive_misses == 0));
    }
}
