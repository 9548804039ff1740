//! Core data types for the scene tracker.
//!
//! This module defines the fundamental structures shared by the tracking
//! core and the service layer.
//!
//! # Type Categories
//!
//! - **Observation types**: [`Detection`], [`BoundingBox`], [`WorldState`],
//!   [`Classification`]
//! - **Topology types**: [`Scene`], [`Camera`], [`Intrinsics`],
//!   [`Distortion`], [`Extrinsics`]
//!
//! All numeric fields are double precision; world quantities are expressed
//! in the scene coordinate frame. Detections are assumed to be projected
//! into the scene frame *before* they reach the tracker.

use serde::{Deserialize, Serialize};

// =============================================================================
// Observation Types
// =============================================================================

/// Axis-aligned pixel-space bounding box of a detection.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge in pixels
    pub x: f64,
    /// Top edge in pixels
    pub y: f64,
    /// Width in pixels
    pub width: f64,
    /// Height in pixels
    pub height: f64,
}

impl BoundingBox {
    /// Creates a bounding box from its corner and extents.
    #[must_use]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Probability vector over the known object categories.
///
/// The maximum component is the *detection score* used for the
/// high/low-score partition during a tracking tick.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Classification(pub Vec<f64>);

impl Classification {
    /// Creates a classification from raw probabilities.
    #[must_use]
    pub fn new(probabilities: Vec<f64>) -> Self {
        Self(probabilities)
    }

    /// A single-class classification with the given confidence at `index`
    /// out of `num_classes` components.
    #[must_use]
    pub fn single(index: usize, confidence: f64, num_classes: usize) -> Self {
        let mut probs = vec![0.0; num_classes];
        if index < num_classes {
            probs[index] = confidence;
        }
        Self(probs)
    }

    /// The detection score: the largest probability component, 0.0 if empty.
    #[must_use]
    pub fn score(&self) -> f64 {
        self.0.iter().copied().fold(0.0, f64::max)
    }

    /// Index of the most probable class, `None` for an empty vector.
    #[must_use]
    pub fn argmax(&self) -> Option<usize> {
        if self.0.is_empty() {
            return None;
        }
        let mut best = 0;
        for (i, p) in self.0.iter().enumerate() {
            if *p > self.0[best] {
                best = i;
            }
        }
        Some(best)
    }

    /// Blends another probability vector into this one with weight `alpha`
    /// on the new observation, renormalizing so the result sums to 1.
    ///
    /// Mismatched lengths replace the estimate outright.
    pub fn blend(&mut self, other: &Classification, alpha: f64) {
        if self.0.len() != other.0.len() {
            self.0 = other.0.clone();
            return;
        }
        for (c, o) in self.0.iter_mut().zip(other.0.iter()) {
            *c = *c * (1.0 - alpha) + *o * alpha;
        }
        let sum: f64 = self.0.iter().sum();
        if sum > 0.0 {
            for c in &mut self.0 {
                *c /= sum;
            }
        }
    }
}

/// Kinematic state of an object in the scene coordinate frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    /// Position [x, y, z] in metres
    pub position: [f64; 3],
    /// Velocity [vx, vy, vz] in metres per second
    pub velocity: [f64; 3],
    /// Extents [length, width, height] in metres
    pub size: [f64; 3],
    /// Orientation quaternion [x, y, z, w]
    pub rotation: [f64; 4],
}

impl Default for WorldState {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            velocity: [0.0; 3],
            size: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl WorldState {
    /// Creates a stationary state at `position` with identity rotation.
    #[must_use]
    pub fn at_position(position: [f64; 3]) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }
}

/// A single observation produced by one camera at one timestamp.
///
/// Ownership: a detection belongs to the tracking tick that received it.
/// Attaching it to a track copies the relevant fields into the track's
/// pending measurement; the original is dropped with the tick.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Detection {
    /// Detector-assigned identifier, used only for logging
    pub id: Option<i64>,
    /// Pixel-space bounding box
    pub bounding_box_px: BoundingBox,
    /// Class-probability vector; max component is the detection score
    pub classification: Classification,
    /// World-frame state, already projected into the scene frame
    pub world: WorldState,
}

impl Detection {
    /// The detection score (maximum class probability).
    #[must_use]
    pub fn score(&self) -> f64 {
        self.classification.score()
    }
}

// =============================================================================
// Topology Types
// =============================================================================

/// Pinhole camera intrinsics with a Brown–Conrady distortion model.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Intrinsics {
    /// Focal length x in pixels
    #[serde(default)]
    pub fx: f64,
    /// Focal length y in pixels
    #[serde(default)]
    pub fy: f64,
    /// Principal point x in pixels
    #[serde(default)]
    pub cx: f64,
    /// Principal point y in pixels
    #[serde(default)]
    pub cy: f64,
    /// Lens distortion coefficients
    #[serde(default)]
    pub distortion: Distortion,
}

/// Radial (k1, k2) and tangential (p1, p2) distortion coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Distortion {
    /// First radial coefficient
    #[serde(default)]
    pub k1: f64,
    /// Second radial coefficient
    #[serde(default)]
    pub k2: f64,
    /// First tangential coefficient
    #[serde(default)]
    pub p1: f64,
    /// Second tangential coefficient
    #[serde(default)]
    pub p2: f64,
}

/// Camera pose within the scene frame.
///
/// Rotation is XYZ Euler angles in degrees, matching the scene file format.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extrinsics {
    /// Translation [x, y, z] in metres
    pub translation: [f64; 3],
    /// Rotation [rx, ry, rz] as XYZ Euler angles in degrees
    pub rotation: [f64; 3],
    /// Per-axis scale [sx, sy, sz]
    pub scale: [f64; 3],
}

impl Default for Extrinsics {
    fn default() -> Self {
        Self {
            translation: [0.0; 3],
            rotation: [0.0; 3],
            scale: [1.0; 3],
        }
    }
}

/// A calibrated camera registered to a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Unique camera identifier, also the ingress topic suffix
    pub uid: String,
    /// Human-readable camera name
    pub name: String,
    /// Camera intrinsics (optional in scene files, defaulting to zero)
    #[serde(default)]
    pub intrinsics: Intrinsics,
    /// Camera pose in the scene frame
    pub extrinsics: Extrinsics,
}

/// A scene: a shared world coordinate frame observed by a set of cameras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Unique scene identifier, also the egress topic segment
    pub uid: String,
    /// Human-readable scene name
    pub name: String,
    /// Cameras observing this scene, in configuration order
    pub cameras: Vec<Camera>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_score_and_argmax() {
        let c = Classification::new(vec![0.1, 0.7, 0.2]);
        assert!((c.score() - 0.7).abs() < f64::EPSILON);
        assert_eq!(c.argmax(), Some(1));

        let empty = Classification::default();
        assert_eq!(empty.argmax(), None);
        assert!(empty.score().abs() < f64::EPSILON);
    }

    #[test]
    fn test_classification_single() {
        let c = Classification::single(2, 0.9, 4);
        assert_eq!(c.argmax(), Some(2));
        assert!((c.score() - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_classification_blend_renormalizes() {
        let mut c = Classification::new(vec![1.0, 0.0]);
        c.blend(&Classification::new(vec![0.0, 1.0]), 0.3);
        let sum: f64 = c.0.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12, "blend must renormalize, sum={sum}");
        assert_eq!(c.argmax(), Some(0), "old class still dominates at alpha=0.3");
    }

    #[test]
    fn test_classification_blend_length_mismatch_replaces() {
        let mut c = Classification::new(vec![0.5, 0.5]);
        c.blend(&Classification::new(vec![0.2, 0.3, 0.5]), 0.3);
        assert_eq!(c.0.len(), 3);
    }

    #[test]
    fn test_world_state_default_rotation_is_identity() {
        let w = WorldState::default();
        assert_eq!(w.rotation, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_detection_score_delegates() {
        let det = Detection {
            classification: Classification::new(vec![0.3, 0.6]),
            ..Detection::default()
        };
        assert!((det.score() - 0.6).abs() < f64::EPSILON);
    }
}
