//! Scene topology loading.
//!
//! Scenes come from one of two sources: a JSON file on disk, or the
//! manager REST API. Both sit behind [`load_scenes`]; the API variant is
//! declared but not yet implemented and fails cleanly.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use scene_tracker_core::{Scene, TrackerError};

/// Where scene definitions come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneSource {
    /// JSON file on disk (`scenes.file_path`)
    File,
    /// Manager REST API (not yet implemented)
    Api,
}

/// Scene source configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenesConfig {
    /// Selected source
    pub source: SceneSource,
    /// Path to the scene file, required when `source` is `file`.
    /// Relative paths resolve against the config file's directory.
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

/// Load scenes from the configured source.
///
/// `config_dir` anchors relative scene file paths.
pub fn load_scenes(config: &ScenesConfig, config_dir: &Path) -> Result<Vec<Scene>, TrackerError> {
    match config.source {
        SceneSource::File => {
            let file_path = config.file_path.as_ref().ok_or_else(|| {
                TrackerError::config(
                    "missing required config: scenes.file_path (required when scenes.source='file')",
                )
            })?;
            let resolved = if file_path.is_absolute() {
                file_path.clone()
            } else {
                config_dir.join(file_path)
            };
            load_scene_file(&resolved)
        }
        SceneSource::Api => Err(TrackerError::config(
            "API scene loading is not yet implemented",
        )),
    }
}

/// Parse a scene file: a JSON array of scenes with their cameras.
fn load_scene_file(path: &Path) -> Result<Vec<Scene>, TrackerError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        TrackerError::config(format!("failed to open scene file {}: {e}", path.display()))
    })?;

    let scenes: Vec<Scene> = serde_json::from_str(&text).map_err(|e| {
        TrackerError::config(format!(
            "failed to parse scene file {}: {e}",
            path.display()
        ))
    })?;

    for scene in &scenes {
        if scene.uid.is_empty() {
            return Err(TrackerError::config("scene uid must not be empty"));
        }
        for camera in &scene.cameras {
            if camera.uid.is_empty() {
                return Err(TrackerError::config(format!(
                    "camera uid must not be empty in scene '{}'",
                    scene.uid
                )));
            }
        }
    }

    info!(
        scenes = scenes.len(),
        cameras = scenes.iter().map(|s| s.cameras.len()).sum::<usize>(),
        path = %path.display(),
        "Loaded scene file"
    );
    Ok(scenes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SCENE_JSON: &str = r#"[
        {
            "uid": "scene-1",
            "name": "Lobby",
            "cameras": [
                {
                    "uid": "cam-1",
                    "name": "Entrance",
                    "intrinsics": {
                        "fx": 905.0, "fy": 905.0, "cx": 640.0, "cy": 360.0,
                        "distortion": {"k1": 0.1, "k2": -0.05, "p1": 0.0, "p2": 0.0}
                    },
                    "extrinsics": {
                        "translation": [1.0, 2.0, 3.0],
                        "rotation": [0.0, 0.0, 90.0],
                        "scale": [1.0, 1.0, 1.0]
                    }
                },
                {
                    "uid": "cam-2",
                    "name": "Exit",
                    "extrinsics": {
                        "translation": [0.0, 0.0, 2.5],
                        "rotation": [0.0, 45.0, 0.0],
                        "scale": [1.0, 1.0, 1.0]
                    }
                }
            ]
        }
    ]"#;

    fn write_scene_file(dir: &Path) -> PathBuf {
        let path = dir.join("scenes.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(SCENE_JSON.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_scene_file() {
        let dir = tempfile::tempdir().unwrap();
        write_scene_file(dir.path());

        let config = ScenesConfig {
            source: SceneSource::File,
            file_path: Some("scenes.json".into()),
        };
        let scenes = load_scenes(&config, dir.path()).unwrap();

        assert_eq!(scenes.len(), 1);
        let scene = &scenes[0];
        assert_eq!(scene.uid, "scene-1");
        assert_eq!(scene.cameras.len(), 2);

        let cam = &scene.cameras[0];
        assert!((cam.intrinsics.fx - 905.0).abs() < f64::EPSILON);
        assert!((cam.intrinsics.distortion.k1 - 0.1).abs() < f64::EPSILON);
        assert_eq!(cam.extrinsics.rotation, [0.0, 0.0, 90.0]);

        // Intrinsics are optional and default to zero.
        let cam2 = &scene.cameras[1];
        assert!(cam2.intrinsics.fx.abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_file_path_is_config_error() {
        let config = ScenesConfig {
            source: SceneSource::File,
            file_path: None,
        };
        let err = load_scenes(&config, Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("file_path"), "{err}");
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScenesConfig {
            source: SceneSource::File,
            file_path: Some("does-not-exist.json".into()),
        };
        assert!(load_scenes(&config, dir.path()).is_err());
    }

    #[test]
    fn test_extrinsics_are_required() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenes.json");
        std::fs::write(
            &path,
            r#"[{"uid": "s", "name": "S", "cameras": [{"uid": "c", "name": "C"}]}]"#,
        )
        .unwrap();

        let config = ScenesConfig {
            source: SceneSource::File,
            file_path: Some(path),
        };
        assert!(load_scenes(&config, dir.path()).is_err());
    }

    #[test]
    fn test_api_source_fails_cleanly() {
        let config = ScenesConfig {
            source: SceneSource::Api,
            file_path: None,
        };
        let err = load_scenes(&config, Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("not yet implemented"), "{err}");
    }
}
