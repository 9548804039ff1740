//! Camera-to-scene registry.
//!
//! Built once at startup from the loaded scene configuration and immutable
//! afterwards, which is what lets the message handler read it from
//! concurrent bus callbacks without locking.

use std::collections::HashMap;

use scene_tracker_core::{Camera, Scene, TrackerError};

/// Registry mapping cameras to the scene that owns them.
///
/// Lookups are O(1) average through two hash indexes: camera id → scene
/// index and camera id → camera index within that scene. Each camera may
/// belong to at most one scene; violations fail registration with
/// [`TrackerError::DuplicateCamera`] and leave the registry in its
/// pre-call state.
#[derive(Debug, Default)]
pub struct SceneRegistry {
    scenes: Vec<Scene>,
    camera_to_scene: HashMap<String, usize>,
    camera_to_camera: HashMap<String, usize>,
}

impl SceneRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register scenes and build the camera indexes.
    ///
    /// Replaces any previous registration on success. On a duplicate
    /// camera the error names the camera and both offending scenes and the
    /// registry keeps its previous contents.
    pub fn register_scenes(&mut self, scenes: Vec<Scene>) -> Result<(), TrackerError> {
        let mut camera_to_scene = HashMap::new();
        let mut camera_to_camera = HashMap::new();

        for (scene_idx, scene) in scenes.iter().enumerate() {
            for (cam_idx, camera) in scene.cameras.iter().enumerate() {
                if let Some(&existing_idx) = camera_to_scene.get(&camera.uid) {
                    let existing: &Scene = &scenes[existing_idx];
                    return Err(TrackerError::DuplicateCamera {
                        camera_id: camera.uid.clone(),
                        scene_a: existing.name.clone(),
                        scene_b: scene.name.clone(),
                    });
                }
                camera_to_scene.insert(camera.uid.clone(), scene_idx);
                camera_to_camera.insert(camera.uid.clone(), cam_idx);
            }
        }

        self.scenes = scenes;
        self.camera_to_scene = camera_to_scene;
        self.camera_to_camera = camera_to_camera;
        Ok(())
    }

    /// The scene a camera belongs to, if the camera is registered.
    pub fn find_scene_for_camera(&self, camera_id: &str) -> Option<&Scene> {
        self.camera_to_scene
            .get(camera_id)
            .map(|&idx| &self.scenes[idx])
    }

    /// A specific camera record by id.
    pub fn find_camera(&self, camera_id: &str) -> Option<&Camera> {
        let scene_idx = *self.camera_to_scene.get(camera_id)?;
        let cam_idx = *self.camera_to_camera.get(camera_id)?;
        Some(&self.scenes[scene_idx].cameras[cam_idx])
    }

    /// All registered scenes.
    pub fn get_all_scenes(&self) -> &[Scene] {
        &self.scenes
    }

    /// All registered camera ids, in scene and camera declaration order.
    pub fn get_all_camera_ids(&self) -> Vec<String> {
        self.scenes
            .iter()
            .flat_map(|s| s.cameras.iter().map(|c| c.uid.clone()))
            .collect()
    }

    /// Camera ids belonging to one scene (empty if the scene is unknown).
    pub fn get_camera_ids_for_scene(&self, scene_id: &str) -> Vec<String> {
        self.scenes
            .iter()
            .find(|s| s.uid == scene_id)
            .map(|s| s.cameras.iter().map(|c| c.uid.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of registered scenes.
    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    /// Number of registered cameras across all scenes.
    pub fn camera_count(&self) -> usize {
        self.camera_to_scene.len()
    }

    /// Whether the registry holds no scenes.
    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}
