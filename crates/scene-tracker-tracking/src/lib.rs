//! # Scene Tracker Tracking
//!
//! The multi-object tracker core: Kalman-filtered track state, data
//! association, lifecycle management, and the per-tick orchestration that
//! binds them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                MultipleObjectTracker                  │
//! │  score split → predict → cascaded associate → correct │
//! ├──────────────┬──────────────────┬────────────────────┤
//! │ TrackManager │  associate(...)  │    KalmanState     │
//! │  (lifecycle) │  (pure, gated,   │ (constant-velocity │
//! │              │   min-cost)      │   3-D filter)      │
//! └──────────────┴──────────────────┴────────────────────┘
//! ```
//!
//! The [`TrackManager`] is the sole owner of track state; all views are
//! value snapshots. [`associate`] is pure and thread-safe, which is what
//! permits the per-camera parallel matching inside a batched tick.
//!
//! ## Example
//!
//! ```rust
//! use scene_tracker_core::{Classification, Detection, WorldState};
//! use scene_tracker_tracking::MultipleObjectTracker;
//!
//! let mut tracker = MultipleObjectTracker::with_defaults();
//! let detection = Detection {
//!     world: WorldState::at_position([1.0, 2.0, 0.0]),
//!     classification: Classification::new(vec![0.9, 0.1]),
//!     ..Detection::default()
//! };
//! tracker.track(vec![detection], 0.0, 0.5);
//! assert_eq!(tracker.get_tracks().len(), 1);
//! ```

#![warn(missing_docs)]

pub mod association;
pub mod kalman;
pub mod manager;
pub mod track;
pub mod tracker;

pub use association::{associate, AssociationOutcome, DistanceType};
pub use kalman::KalmanState;
pub use manager::{TrackManager, TrackManagerConfig};
pub use track::{TrackId, TrackSnapshot, TrackStatus};
pub use tracker::MultipleObjectTracker;
