//! # Scene Tracker Service
//!
//! The service layer around the multi-object tracker core: message bus
//! abstraction, schema-validated codec, camera-to-scene routing, service
//! configuration, and the healthcheck surface.
//!
//! ## Data flow
//!
//! ```text
//! bus → MessageHandler → codec (validate, decode)
//!                      → SceneRegistry (route camera → scene)
//!                      → MultipleObjectTracker (per scene+category tick)
//!                      → codec (encode) → bus
//! ```
//!
//! The physical broker transport is intentionally outside this crate: the
//! [`bus::ManagedBusClient`] implements the full client-side contract over
//! the abstract [`bus::BusTransport`], and the in-process
//! [`bus::LoopbackBroker`] backs tests and local wiring.

#![warn(missing_docs)]

pub mod bus;
pub mod cli;
pub mod codec;
pub mod config;
pub mod handler;
pub mod health;
pub mod registry;
pub mod scenes;
pub mod schema;
pub mod topic;

pub use bus::{BusClient, CallbackGuard, ManagedBusClient};
pub use codec::{CameraMessage, MessageCodec, SceneMessage};
pub use config::{load_config, ServiceConfig};
pub use handler::{MessageHandler, TrackingParams};
pub use registry::SceneRegistry;
pub use scenes::{load_scenes, SceneSource, ScenesConfig};
pub use topic::is_valid_topic_segment;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
