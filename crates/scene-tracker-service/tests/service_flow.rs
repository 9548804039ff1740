//! End-to-end service flow over the in-process bus: configuration and
//! scene files on disk, registry routing, tracker ticks, and scene
//! publication.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

use scene_tracker_service::bus::{BusClient, LoopbackBroker, LoopbackTransport, ManagedBusClient};
use scene_tracker_service::config::load_config;
use scene_tracker_service::handler::{MessageHandler, TrackingParams};
use scene_tracker_service::registry::SceneRegistry;
use scene_tracker_service::scenes::load_scenes;
use scene_tracker_tracking::TrackManagerConfig;

fn write_fixture_files(dir: &std::path::Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let scenes = json!([
        {
            "uid": "floor-1",
            "name": "Floor One",
            "cameras": [
                {
                    "uid": "cam-a",
                    "name": "North",
                    "extrinsics": {
                        "translation": [0.0, 0.0, 3.0],
                        "rotation": [0.0, 0.0, 0.0],
                        "scale": [1.0, 1.0, 1.0]
                    }
                },
                {
                    "uid": "cam-b",
                    "name": "South",
                    "extrinsics": {
                        "translation": [10.0, 0.0, 3.0],
                        "rotation": [0.0, 0.0, 180.0],
                        "scale": [1.0, 1.0, 1.0]
                    }
                }
            ]
        }
    ]);
    std::fs::write(dir.join("scenes.json"), scenes.to_string()).unwrap();

    let config = json!({
        "observability": {"logging": {"level": "info"}},
        "infrastructure": {"tracker": {"healthcheck": {"port": 8080}}},
        "bus": {"host": "localhost", "port": 1883, "insecure": true},
        "scenes": {"source": "file", "file_path": "scenes.json"},
        "schema_validation": true
    });
    let config_path = dir.join("config.json");
    std::fs::write(&config_path, config.to_string()).unwrap();

    let schema = json!({
        "type": "object",
        "required": ["bus", "scenes"],
        "properties": {
            "bus": {"type": "object", "required": ["host", "port"]},
            "scenes": {"type": "object", "required": ["source"]}
        }
    });
    let schema_path = dir.join("config.schema.json");
    std::fs::write(&schema_path, schema.to_string()).unwrap();

    (config_path, schema_path)
}

fn camera_payload(camera: &str, timestamp: &str, x: f64) -> String {
    json!({
        "id": camera,
        "timestamp": timestamp,
        "objects": {
            "person": [{
                "bounding_box_px": {"x": 100.0, "y": 80.0, "width": 40.0, "height": 90.0},
                "confidence": 0.92,
                "translation": [x, 1.5, 0.0],
                "size": [0.5, 0.5, 1.75]
            }]
        }
    })
    .to_string()
}

fn probe(
    broker: &LoopbackBroker,
    topic: &str,
) -> (
    ManagedBusClient<LoopbackTransport>,
    Arc<Mutex<Vec<(String, String)>>>,
) {
    let client = ManagedBusClient::new(broker.transport());
    client.connect().unwrap();
    let received: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    client.set_message_callback(Some(Arc::new(move |topic, payload| {
        sink.lock().push((topic.to_string(), payload.to_string()));
    })));
    client.subscribe(topic);
    (client, received)
}

#[test]
fn service_flow_from_config_to_published_tracks() {
    let dir = tempfile::tempdir().unwrap();
    let (config_path, schema_path) = write_fixture_files(dir.path());

    let config = load_config(&config_path, &schema_path).unwrap();
    let scenes = load_scenes(&config.scenes, &config.config_dir).unwrap();
    let mut registry = SceneRegistry::new();
    registry.register_scenes(scenes).unwrap();
    let registry = Arc::new(registry);
    assert_eq!(registry.camera_count(), 2);

    let broker = LoopbackBroker::new();
    let bus = Arc::new(ManagedBusClient::new(broker.transport()));
    bus.connect().unwrap();

    // Promote after 2 hits so the third message definitely carries tracks.
    let params = TrackingParams {
        manager_config: TrackManagerConfig {
            frame_rate: 1.0,
            max_unreliable_time: 2.0,
            non_measurement_time_dynamic: 2.0,
            ..TrackManagerConfig::default()
        },
        ..TrackingParams::default()
    };
    let handler = Arc::new(MessageHandler::new(
        Arc::clone(&bus) as Arc<dyn BusClient>,
        Arc::clone(&registry),
        config.schema_validation,
        params,
    ));
    handler.start();

    let (_probe_client, received) = probe(&broker, "scenescape/data/scene/floor-1/person");

    let publisher = ManagedBusClient::new(broker.transport());
    publisher.connect().unwrap();

    // The same person is seen by both cameras across three ticks.
    publisher.publish(
        "scenescape/data/camera/cam-a",
        &camera_payload("cam-a", "2026-03-01T09:00:00.000Z", 4.0),
    );
    publisher.publish(
        "scenescape/data/camera/cam-b",
        &camera_payload("cam-b", "2026-03-01T09:00:00.100Z", 4.05),
    );
    publisher.publish(
        "scenescape/data/camera/cam-a",
        &camera_payload("cam-a", "2026-03-01T09:00:01.000Z", 4.1),
    );

    let received = received.lock();
    assert_eq!(received.len(), 3, "every inbound message fans out one publish");

    // Both cameras route into the same scene tracker: the second message
    // already promotes the track, and no duplicate is ever created.
    let last: Value = serde_json::from_str(&received[2].1).unwrap();
    assert_eq!(last["id"], "floor-1");
    assert_eq!(last["name"], "Floor One");
    assert_eq!(last["timestamp"], "2026-03-01T09:00:01.000Z");

    let objects = last["objects"].as_array().unwrap();
    assert_eq!(objects.len(), 1, "one physical object, one track");
    let object = &objects[0];
    assert_eq!(object["category"], "person");
    let px = object["translation"][0].as_f64().unwrap();
    assert!((px - 4.0).abs() < 1.0, "track position near the object, px={px}");
    assert_eq!(object["rotation"].as_array().unwrap().len(), 4);

    let (received_count, published_count, rejected_count) = handler.counters();
    assert_eq!(received_count, 3);
    assert_eq!(published_count, 3);
    assert_eq!(rejected_count, 0);

    // Track ids are stable across ticks once assigned.
    let second: Value = serde_json::from_str(&received[1].1).unwrap();
    assert_eq!(
        second["objects"][0]["id"], object["id"],
        "the track keeps its id across ticks"
    );

    handler.stop();
}

#[test]
fn rejected_messages_never_reach_the_scene_topic() {
    let dir = tempfile::tempdir().unwrap();
    let (config_path, schema_path) = write_fixture_files(dir.path());

    let config = load_config(&config_path, &schema_path).unwrap();
    let scenes = load_scenes(&config.scenes, &config.config_dir).unwrap();
    let mut registry = SceneRegistry::new();
    registry.register_scenes(scenes).unwrap();

    let broker = LoopbackBroker::new();
    let bus = Arc::new(ManagedBusClient::new(broker.transport()));
    bus.connect().unwrap();

    let handler = Arc::new(MessageHandler::new(
        Arc::clone(&bus) as Arc<dyn BusClient>,
        Arc::new(registry),
        true,
        TrackingParams::default(),
    ));
    handler.start();

    let (_probe_client, received) = probe(&broker, "scenescape/data/scene/floor-1/person");
    let publisher = ManagedBusClient::new(broker.transport());
    publisher.connect().unwrap();

    publisher.publish("scenescape/data/camera/cam-a", "not json at all");
    publisher.publish(
        "scenescape/data/camera/cam-a",
        &json!({"id": "cam-a", "objects": {}}).to_string(),
    );

    assert!(received.lock().is_empty());
    let (r, p, rej) = handler.counters();
    assert_eq!((r, p, rej), (2, 0, 2));
}
