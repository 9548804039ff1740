//! Message handler: bus events in, scene track streams out.
//!
//! Binds the scene registry, the message codec, and the per-scene trackers
//! to the bus client. Inbound camera messages are decoded, routed to their
//! scene, fed through the multi-object tracker for their category, and the
//! resulting reliable tracks are republished on the scene topic.
//!
//! Concurrency: callbacks arrive on transport-owned threads. The counters
//! are atomics; the category allowlist uses a short mutex-guarded
//! test-and-insert; tracker mutation is serialized behind its own lock,
//! and encoding/publication happen outside every lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use scene_tracker_core::Scene;
use scene_tracker_tracking::{
    DistanceType, MultipleObjectTracker, TrackManagerConfig, TrackSnapshot,
};

use crate::bus::BusClient;
use crate::codec::{timestamp_epoch_seconds, CameraMessage, MessageCodec, SceneMessage};
use crate::registry::SceneRegistry;
use crate::topic::{camera_topic, extract_camera_id, is_valid_topic_segment, scene_topic};

// ---------------------------------------------------------------------------
// TrackingParams
// ---------------------------------------------------------------------------

/// Tracker parameters shared by every per-scene tracker instance.
#[derive(Debug, Clone)]
pub struct TrackingParams {
    /// Distance metric for data association
    pub distance_type: DistanceType,
    /// Gating threshold in metres
    pub distance_threshold: f64,
    /// High/low detection score partition threshold
    pub score_threshold: f64,
    /// Lifecycle and filter configuration
    pub manager_config: TrackManagerConfig,
}

impl Default for TrackingParams {
    fn default() -> Self {
        Self {
            distance_type: DistanceType::MultiClassEuclidean,
            distance_threshold: MultipleObjectTracker::DEFAULT_DISTANCE_THRESHOLD,
            score_threshold: MultipleObjectTracker::DEFAULT_SCORE_THRESHOLD,
            manager_config: TrackManagerConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// MessageHandler
// ---------------------------------------------------------------------------

/// Routes camera detections through the tracker and publishes per-scene
/// track streams.
pub struct MessageHandler {
    bus: Arc<dyn BusClient>,
    registry: Arc<SceneRegistry>,
    codec: MessageCodec,
    params: TrackingParams,
    /// One tracker per (scene uid, category), created on first sight.
    trackers: Mutex<HashMap<(String, String), MultipleObjectTracker>>,
    /// Category → validation verdict, cached on first sight.
    validated_categories: Mutex<HashMap<String, bool>>,
    received: AtomicU64,
    published: AtomicU64,
    rejected: AtomicU64,
}

impl MessageHandler {
    /// Create a handler over a bus client and an immutable registry.
    pub fn new(
        bus: Arc<dyn BusClient>,
        registry: Arc<SceneRegistry>,
        schema_validation: bool,
        params: TrackingParams,
    ) -> Self {
        if schema_validation {
            info!("Schema validation enabled for bus messages");
        } else {
            info!("Schema validation disabled for bus messages");
        }
        Self {
            bus,
            registry,
            codec: MessageCodec::new(schema_validation),
            params,
            trackers: Mutex::new(HashMap::new()),
            validated_categories: Mutex::new(HashMap::new()),
            received: AtomicU64::new(0),
            published: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Install the bus callback and subscribe to every registered camera.
    ///
    /// Camera ids that fail the topic-segment predicate are logged and
    /// skipped; no subscription is created for them.
    pub fn start(self: &Arc<Self>) {
        let handler = Arc::clone(self);
        self.bus.set_message_callback(Some(Arc::new(move |topic, payload| {
            handler.handle_camera_message(topic, payload);
        })));

        let camera_ids = self.registry.get_all_camera_ids();
        if camera_ids.is_empty() {
            warn!("No cameras registered, not subscribing to any topics");
            return;
        }

        let mut subscribed = 0usize;
        for camera_id in &camera_ids {
            if !is_valid_topic_segment(camera_id) {
                warn!(
                    camera_id,
                    error.kind = "validation_error",
                    "Camera id contains invalid topic characters, skipping subscription"
                );
                continue;
            }
            self.bus.subscribe(&camera_topic(camera_id));
            subscribed += 1;
        }
        info!(cameras = subscribed, "Queued camera subscriptions");
    }

    /// Unsubscribe, detach the callback, and log the counter summary.
    pub fn stop(&self) {
        let (received, published, rejected) = self.counters();
        info!(received, published, rejected, "Message handler stopping");

        for camera_id in self.registry.get_all_camera_ids() {
            if !is_valid_topic_segment(&camera_id) {
                continue;
            }
            self.bus.unsubscribe(&camera_topic(&camera_id));
        }
        self.bus.set_message_callback(None);
    }

    /// Counter snapshot: `(received, published, rejected)`.
    pub fn counters(&self) -> (u64, u64, u64) {
        (
            self.received.load(Ordering::Relaxed),
            self.published.load(Ordering::Relaxed),
            self.rejected.load(Ordering::Relaxed),
        )
    }

    /// Process one inbound camera payload.
    fn handle_camera_message(&self, topic: &str, payload: &str) {
        self.received.fetch_add(1, Ordering::Relaxed);

        let Some(camera_id) = extract_camera_id(topic) else {
            warn!(topic, "Failed to extract camera id from topic");
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return;
        };

        debug!(camera_id, "Received detection message");

        let message = match self.codec.parse_camera_message(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    camera_id,
                    error.kind = e.kind(),
                    error.message = %e,
                    "Failed to parse camera message"
                );
                self.rejected.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let Some(scene) = self.registry.find_scene_for_camera(camera_id) else {
            warn!(
                camera_id,
                error.kind = "routing_error",
                "Unknown camera not registered to any scene, dropping message"
            );
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let tick_ts = match timestamp_epoch_seconds(&message.timestamp) {
            Ok(ts) => ts,
            Err(e) => {
                warn!(
                    camera_id,
                    error.kind = e.kind(),
                    error.message = %e,
                    "Camera message carries an unparseable timestamp"
                );
                self.rejected.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        for (category, detections) in &message.objects {
            if !self.category_allowed(scene, category) {
                continue;
            }

            let tracks = self.run_tick(scene, category, &message, tick_ts);

            let scene_message =
                SceneMessage::from_tracks(scene, &message.timestamp, category, &tracks);
            let encoded = match self.codec.encode_scene_message(&scene_message) {
                Ok(encoded) => encoded,
                Err(e) => {
                    warn!(
                        scene_id = %scene.uid,
                        category,
                        error.message = %e,
                        "Failed to encode scene message"
                    );
                    continue;
                }
            };

            let output_topic = scene_topic(&scene.uid, category);
            self.bus.publish(&output_topic, &encoded);
            self.published.fetch_add(1, Ordering::Relaxed);

            debug!(
                scene_id = %scene.uid,
                category,
                tracks = tracks.len(),
                detections = detections.len(),
                "Published scene tracks"
            );
        }
    }

    /// Validate a category on first sight; the verdict is cached so the
    /// critical section stays a single map probe afterwards.
    fn category_allowed(&self, scene: &Scene, category: &str) -> bool {
        let (allowed, first_sight) = {
            let mut cache = self.validated_categories.lock();
            match cache.get(category) {
                Some(&verdict) => (verdict, false),
                None => {
                    let verdict = is_valid_topic_segment(category);
                    cache.insert(category.to_string(), verdict);
                    (verdict, true)
                }
            }
        };

        if !allowed && first_sight {
            warn!(
                scene_id = %scene.uid,
                category,
                error.kind = "validation_error",
                "Category contains invalid topic characters, skipping"
            );
        }
        allowed
    }

    /// One tracking tick for (scene, category); returns the reliable
    /// tracks to publish. Tracker mutation is serialized behind the lock;
    /// the returned snapshots are value copies.
    fn run_tick(
        &self,
        scene: &Scene,
        category: &str,
        message: &CameraMessage,
        tick_ts: f64,
    ) -> Vec<TrackSnapshot> {
        let detections = message.objects[category]
            .iter()
            .map(|wire| wire.to_detection())
            .collect();

        let mut trackers = self.trackers.lock();
        let tracker = trackers
            .entry((scene.uid.clone(), category.to_string()))
            .or_insert_with(|| {
                MultipleObjectTracker::with_metric(
                    self.params.manager_config.clone(),
                    self.params.distance_type,
                    self.params.distance_threshold,
                )
            });
        tracker.track(detections, tick_ts, self.params.score_threshold);
        tracker.get_reliable_tracks()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{LoopbackBroker, LoopbackTransport, ManagedBusClient, DEFAULT_DRAIN_TIMEOUT};
    use scene_tracker_core::{Camera, Extrinsics};
    use serde_json::{json, Value};

    fn scene_fixture() -> Vec<Scene> {
        let camera = |uid: &str| Camera {
            uid: uid.into(),
            name: format!("Camera {uid}"),
            intrinsics: Default::default(),
            extrinsics: Extrinsics::default(),
        };
        vec![Scene {
            uid: "scene-1".into(),
            name: "Lobby".into(),
            cameras: vec![camera("cam-1"), camera("cam-2"), camera("bad/cam")],
        }]
    }

    struct Fixture {
        handler: Arc<MessageHandler>,
        probe: ManagedBusClient<LoopbackTransport>,
        outbound: Arc<Mutex<Vec<(String, String)>>>,
    }

    /// Tracker config promoting after 2 hits so tests publish quickly.
    fn fast_params() -> TrackingParams {
        TrackingParams {
            manager_config: TrackManagerConfig {
                frame_rate: 1.0,
                max_unreliable_time: 2.0,
                non_measurement_time_dynamic: 2.0,
                ..TrackManagerConfig::default()
            },
            ..TrackingParams::default()
        }
    }

    fn fixture(broker: &LoopbackBroker, schema_validation: bool) -> Fixture {
        let bus = Arc::new(ManagedBusClient::new(broker.transport()));
        bus.connect().unwrap();

        let mut registry = SceneRegistry::new();
        registry.register_scenes(scene_fixture()).unwrap();

        let handler = Arc::new(MessageHandler::new(
            bus,
            Arc::new(registry),
            schema_validation,
            fast_params(),
        ));
        handler.start();

        let probe = ManagedBusClient::new(broker.transport());
        probe.connect().unwrap();
        let outbound: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&outbound);
        probe.set_message_callback(Some(Arc::new(move |topic, payload| {
            sink.lock().push((topic.to_string(), payload.to_string()));
        })));
        probe.subscribe("scenescape/data/scene/scene-1/person");
        probe.subscribe("scenescape/data/scene/scene-1/vehicle");

        Fixture {
            handler,
            probe,
            outbound,
        }
    }

    fn camera_payload(timestamp: &str, x: f64) -> String {
        json!({
            "id": "cam-1",
            "timestamp": timestamp,
            "objects": {
                "person": [{
                    "bounding_box_px": {"x": 10.0, "y": 10.0, "width": 30.0, "height": 60.0},
                    "confidence": 0.9,
                    "translation": [x, 2.0, 0.0]
                }]
            }
        })
        .to_string()
    }

    #[test]
    fn test_message_flow_end_to_end() {
        let broker = LoopbackBroker::new();
        let fx = fixture(&broker, true);

        let publisher = ManagedBusClient::new(broker.transport());
        publisher.connect().unwrap();

        publisher.publish(
            "scenescape/data/camera/cam-1",
            &camera_payload("2026-03-01T12:00:00Z", 1.0),
        );
        publisher.publish(
            "scenescape/data/camera/cam-1",
            &camera_payload("2026-03-01T12:00:01Z", 1.1),
        );

        let outbound = fx.outbound.lock();
        assert_eq!(outbound.len(), 2, "one publish per inbound message");
        assert_eq!(outbound[0].0, "scenescape/data/scene/scene-1/person");

        // The second tick promotes the track; its snapshot is published.
        let second: Value = serde_json::from_str(&outbound[1].1).unwrap();
        assert_eq!(second["id"], "scene-1");
        assert_eq!(second["name"], "Lobby");
        assert_eq!(second["timestamp"], "2026-03-01T12:00:01Z");
        let objects = second["objects"].as_array().unwrap();
        assert_eq!(objects.len(), 1, "track reliable after 2 hits");
        assert_eq!(objects[0]["category"], "person");

        let (received, published, rejected) = fx.handler.counters();
        assert_eq!((received, published, rejected), (2, 2, 0));
    }

    #[test]
    fn test_invalid_payload_counts_rejected() {
        let broker = LoopbackBroker::new();
        let fx = fixture(&broker, true);

        let publisher = ManagedBusClient::new(broker.transport());
        publisher.connect().unwrap();

        publisher.publish("scenescape/data/camera/cam-1", "{ not json");
        publisher.publish("scenescape/data/camera/cam-1", r#"{"id": "cam-1"}"#);
        // Bad timestamp parses structurally but cannot drive the tracker.
        publisher.publish(
            "scenescape/data/camera/cam-1",
            &camera_payload("not-a-timestamp", 0.0),
        );

        let (received, published, rejected) = fx.handler.counters();
        assert_eq!(received, 3);
        assert_eq!(published, 0);
        assert_eq!(rejected, 3);
        assert!(fx.outbound.lock().is_empty());
    }

    #[test]
    fn test_unknown_camera_is_dropped() {
        let broker = LoopbackBroker::new();
        let fx = fixture(&broker, true);

        let publisher = ManagedBusClient::new(broker.transport());
        publisher.connect().unwrap();

        // The handler never subscribed to unknown cameras; deliver to the
        // handler's callback path by publishing on a registered topic with
        // a mismatched suffix scenario instead: subscribe covers cam-1 and
        // cam-2 only, so use the registry-unknown id through cam-2's topic.
        fx.handler
            .handle_camera_message("scenescape/data/camera/ghost", &camera_payload("2026-03-01T12:00:00Z", 0.0));

        let (received, _, rejected) = fx.handler.counters();
        assert_eq!((received, rejected), (1, 1));
        assert!(fx.outbound.lock().is_empty());
        drop(fx.probe);
    }

    #[test]
    fn test_invalid_category_is_skipped() {
        let broker = LoopbackBroker::new();
        let fx = fixture(&broker, true);

        let payload = json!({
            "id": "cam-1",
            "timestamp": "2026-03-01T12:00:00Z",
            "objects": {
                "bad/category": [{
                    "bounding_box_px": {"x": 0.0, "y": 0.0, "width": 1.0, "height": 1.0},
                    "translation": [0.0, 0.0, 0.0]
                }],
                "person": [{
                    "bounding_box_px": {"x": 0.0, "y": 0.0, "width": 1.0, "height": 1.0},
                    "confidence": 0.9,
                    "translation": [0.0, 0.0, 0.0]
                }]
            }
        })
        .to_string();

        fx.handler
            .handle_camera_message("scenescape/data/camera/cam-1", &payload);

        let (received, published, _) = fx.handler.counters();
        assert_eq!(received, 1, "received counts once despite fan-out");
        assert_eq!(published, 1, "only the valid category publishes");
        let outbound = fx.outbound.lock();
        assert_eq!(outbound.len(), 1);
        assert!(outbound[0].0.ends_with("/person"));
    }

    #[test]
    fn test_topic_prefix_mismatch_is_rejected() {
        let broker = LoopbackBroker::new();
        let fx = fixture(&broker, true);

        fx.handler
            .handle_camera_message("other/data/camera/cam-1", "{}");
        let (received, _, rejected) = fx.handler.counters();
        assert_eq!((received, rejected), (1, 1));
    }

    #[test]
    fn test_invalid_camera_id_not_subscribed() {
        // "bad/cam" is registered but fails topic validation: messages on
        // its topic never reach the handler because no subscription exists.
        let broker = LoopbackBroker::new();
        let fx = fixture(&broker, true);

        let publisher = ManagedBusClient::new(broker.transport());
        publisher.connect().unwrap();
        publisher.publish(
            "scenescape/data/camera/bad/cam",
            &camera_payload("2026-03-01T12:00:00Z", 0.0),
        );

        let (received, _, _) = fx.handler.counters();
        assert_eq!(received, 0);
    }

    #[test]
    fn test_stop_unsubscribes_and_detaches() {
        let broker = LoopbackBroker::new();
        let fx = fixture(&broker, true);

        let publisher = ManagedBusClient::new(broker.transport());
        publisher.connect().unwrap();

        fx.handler.stop();
        publisher.publish(
            "scenescape/data/camera/cam-1",
            &camera_payload("2026-03-01T12:00:00Z", 0.0),
        );

        let (received, _, _) = fx.handler.counters();
        assert_eq!(received, 0, "no delivery after stop");
        fx.handler.bus.disconnect(DEFAULT_DRAIN_TIMEOUT);
    }

    #[test]
    fn test_per_scene_trackers_are_isolated_by_category() {
        let broker = LoopbackBroker::new();
        let fx = fixture(&broker, true);

        let payload = json!({
            "id": "cam-1",
            "timestamp": "2026-03-01T12:00:00Z",
            "objects": {
                "person": [{
                    "bounding_box_px": {"x": 0.0, "y": 0.0, "width": 1.0, "height": 1.0},
                    "confidence": 0.9,
                    "translation": [0.0, 0.0, 0.0]
                }],
                "vehicle": [{
                    "bounding_box_px": {"x": 0.0, "y": 0.0, "width": 1.0, "height": 1.0},
                    "confidence": 0.9,
                    "translation": [0.0, 0.0, 0.0]
                }]
            }
        })
        .to_string();

        fx.handler
            .handle_camera_message("scenescape/data/camera/cam-1", &payload);

        assert_eq!(fx.handler.trackers.lock().len(), 2);
        let (_, published, _) = fx.handler.counters();
        assert_eq!(published, 2, "one publish per category");
    }
}
