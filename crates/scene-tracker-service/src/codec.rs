//! Message codec: schema-validated parse of camera payloads, typed build
//! of scene payloads.
//!
//! Timestamps are carried as strings end-to-end: the inbound `timestamp`
//! field is copied into the outbound scene message byte-for-byte, so
//! parsing and republishing never reformats it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use scene_tracker_core::{BoundingBox, Classification, Detection, Scene, TrackerError, WorldState};
use scene_tracker_tracking::TrackSnapshot;

use crate::schema::Schema;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

fn default_confidence() -> f64 {
    1.0
}

/// One detection as it appears on the wire.
///
/// `bounding_box_px` is the only required field; world-frame fields are
/// optional because upstream projection may be partial. Absent world
/// fields default to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireDetection {
    /// Detector-assigned identifier (telemetry only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Pixel-space bounding box
    pub bounding_box_px: BoundingBox,
    /// Detector confidence in [0, 1]; the detection score when no full
    /// probability vector is supplied
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// World-frame position [x, y, z], already projected into the scene
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<[f64; 3]>,
    /// World-frame velocity [vx, vy, vz]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<[f64; 3]>,
    /// World-frame extents [l, w, h]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<[f64; 3]>,
    /// Orientation quaternion [x, y, z, w]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<[f64; 4]>,
    /// Full class-probability vector, when the detector emits one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_probabilities: Option<Vec<f64>>,
}

impl WireDetection {
    /// Convert to the tracker's detection type.
    pub fn to_detection(&self) -> Detection {
        let classification = match &self.category_probabilities {
            Some(probs) => Classification::new(probs.clone()),
            None => Classification::new(vec![self.confidence]),
        };
        Detection {
            id: self.id,
            bounding_box_px: self.bounding_box_px,
            classification,
            world: WorldState {
                position: self.translation.unwrap_or_default(),
                velocity: self.velocity.unwrap_or_default(),
                size: self.size.unwrap_or_default(),
                rotation: self.rotation.unwrap_or([0.0, 0.0, 0.0, 1.0]),
            },
        }
    }
}

/// Inbound per-camera message.
///
/// Detections are grouped by category; `BTreeMap` keeps the per-category
/// fan-out deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraMessage {
    /// Camera identifier (should match the topic suffix)
    pub id: String,
    /// RFC 3339 capture timestamp, passed through verbatim
    pub timestamp: String,
    /// Detections per category
    pub objects: BTreeMap<String, Vec<WireDetection>>,
}

/// One track in an outbound scene message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    /// Track identifier
    pub id: String,
    /// Object category
    pub category: String,
    /// Position [x, y, z] in the scene frame
    pub translation: [f64; 3],
    /// Velocity [vx, vy, vz]
    pub velocity: [f64; 3],
    /// Extents [l, w, h]
    pub size: [f64; 3],
    /// Orientation quaternion [x, y, z, w]
    pub rotation: [f64; 4],
}

/// Outbound per-scene message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneMessage {
    /// Scene uid
    pub id: String,
    /// Scene display name
    pub name: String,
    /// Timestamp copied from the triggering camera message
    pub timestamp: String,
    /// Aggregated tracks for one category
    pub objects: Vec<SceneObject>,
}

impl SceneMessage {
    /// Build a scene message from track snapshots for one category.
    pub fn from_tracks(
        scene: &Scene,
        timestamp: &str,
        category: &str,
        tracks: &[TrackSnapshot],
    ) -> Self {
        Self {
            id: scene.uid.clone(),
            name: scene.name.clone(),
            timestamp: timestamp.to_string(),
            objects: tracks
                .iter()
                .map(|t| SceneObject {
                    id: t.id.to_string(),
                    category: category.to_string(),
                    translation: t.position,
                    velocity: t.velocity,
                    size: t.size,
                    rotation: t.rotation,
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Embedded message schemas
// ---------------------------------------------------------------------------

fn camera_schema() -> Value {
    json!({
        "type": "object",
        "required": ["id", "timestamp", "objects"],
        "properties": {
            "id": {"type": "string"},
            "timestamp": {"type": "string"},
            "objects": {"type": "object"}
        }
    })
}

fn scene_schema() -> Value {
    json!({
        "type": "object",
        "required": ["id", "name", "timestamp", "objects"],
        "properties": {
            "id": {"type": "string"},
            "name": {"type": "string"},
            "timestamp": {"type": "string"},
            "objects": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["id", "category", "translation", "velocity", "size", "rotation"],
                    "properties": {
                        "id": {"type": "string"},
                        "category": {"type": "string"},
                        "translation": {"type": "array", "minItems": 3, "maxItems": 3, "items": {"type": "number"}},
                        "velocity": {"type": "array", "minItems": 3, "maxItems": 3, "items": {"type": "number"}},
                        "size": {"type": "array", "minItems": 3, "maxItems": 3, "items": {"type": "number"}},
                        "rotation": {"type": "array", "minItems": 4, "maxItems": 4, "items": {"type": "number"}}
                    }
                }
            }
        }
    })
}

// ---------------------------------------------------------------------------
// MessageCodec
// ---------------------------------------------------------------------------

/// Parses inbound camera messages and encodes outbound scene messages,
/// optionally validating both against the message schemas.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    camera_schema: Option<Schema>,
    scene_schema: Option<Schema>,
}

impl MessageCodec {
    /// Create a codec. With `schema_validation` off, messages are only
    /// structurally checked by deserialization.
    pub fn new(schema_validation: bool) -> Self {
        if schema_validation {
            Self {
                // The embedded schemas are static objects; construction
                // cannot fail.
                camera_schema: Schema::new(camera_schema()).ok(),
                scene_schema: Schema::new(scene_schema()).ok(),
            }
        } else {
            Self {
                camera_schema: None,
                scene_schema: None,
            }
        }
    }

    /// Whether schema validation is active.
    pub fn validating(&self) -> bool {
        self.camera_schema.is_some()
    }

    /// Parse and validate an inbound camera payload.
    pub fn parse_camera_message(&self, payload: &str) -> Result<CameraMessage, TrackerError> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| TrackerError::parse(format!("invalid JSON: {e}")))?;

        if let Some(schema) = &self.camera_schema {
            schema.validate(&value)?;
        }

        serde_json::from_value(value)
            .map_err(|e| TrackerError::parse(format!("invalid camera message: {e}")))
    }

    /// Encode an outbound scene message, validating it when enabled.
    pub fn encode_scene_message(&self, message: &SceneMessage) -> Result<String, TrackerError> {
        if let Some(schema) = &self.scene_schema {
            let value = serde_json::to_value(message)
                .map_err(|e| TrackerError::parse(format!("scene message serialization: {e}")))?;
            schema.validate(&value)?;
            return serde_json::to_string(&value)
                .map_err(|e| TrackerError::parse(format!("scene message serialization: {e}")));
        }
        serde_json::to_string(message)
            .map_err(|e| TrackerError::parse(format!("scene message serialization: {e}")))
    }
}

/// Parse an RFC 3339 timestamp into epoch seconds.
///
/// The string itself is still republished verbatim; this value only drives
/// the tracker's prediction interval.
pub fn timestamp_epoch_seconds(timestamp: &str) -> Result<f64, TrackerError> {
    let parsed = chrono::DateTime::parse_from_rfc3339(timestamp)
        .map_err(|e| TrackerError::parse(format!("invalid timestamp '{timestamp}': {e}")))?;
    let nanos = parsed.timestamp_subsec_nanos();
    Ok(parsed.timestamp() as f64 + f64::from(nanos) / 1e9)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
