//! # Scene Tracker Core
//!
//! Shared domain types for the multi-camera object-tracking service.
//!
//! This crate defines the vocabulary the other crates speak:
//!
//! - **Detections**: per-camera observations with a pixel bounding box,
//!   a class-probability vector, and a world-frame kinematic state
//! - **Scenes and cameras**: the static topology the service routes over,
//!   including camera calibration records
//! - **Errors**: the unified [`TrackerError`] covering configuration,
//!   parsing, routing, and bus failure kinds
//!
//! The tracking math lives in `scene-tracker-tracking`; the message bus,
//! codec, and service wiring live in `scene-tracker-service`.

#![warn(missing_docs)]

pub mod error;
pub mod types;

pub use error::{TrackerError, TrackerResult};
pub use types::{
    BoundingBox, Camera, Classification, Detection, Distortion, Extrinsics, Intrinsics, Scene,
    WorldState,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
