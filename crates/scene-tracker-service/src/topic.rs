//! Bus topic construction and validation.
//!
//! Topic segments are user-controlled strings (camera uids, scene uids,
//! object categories) that end up inside bus topic paths. The transport
//! reserves `/`, `+`, `#`, and `$`, and NUL or control characters corrupt
//! the wire format, so segments are validated with a strict allowlist
//! before any subscribe or publish.

/// Topic prefix for inbound per-camera detections.
pub const TOPIC_CAMERA_PREFIX: &str = "scenescape/data/camera/";

/// Topic prefix for outbound per-scene track streams.
pub const TOPIC_SCENE_PREFIX: &str = "scenescape/data/scene/";

/// Validate that a string is safe for use as a bus topic segment.
///
/// Allowlist: ASCII alphanumerics, hyphen, underscore, dot. Everything
/// else (separators, wildcards, `$`, whitespace, NUL, control characters,
/// non-ASCII) is refused, as is the empty string.
///
/// Validation happens at subscription and first-publish time, not per
/// message.
pub fn is_valid_topic_segment(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }
    segment
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
}

/// Ingress topic for one camera: `scenescape/data/camera/{camera_id}`.
pub fn camera_topic(camera_id: &str) -> String {
    format!("{TOPIC_CAMERA_PREFIX}{camera_id}")
}

/// Egress topic for one scene and category:
/// `scenescape/data/scene/{scene_uid}/{category}`.
pub fn scene_topic(scene_uid: &str, category: &str) -> String {
    format!("{TOPIC_SCENE_PREFIX}{scene_uid}/{category}")
}

/// Extract the camera id suffix from an ingress topic.
///
/// Returns `None` when the prefix does not match or the suffix is empty.
pub fn extract_camera_id(topic: &str) -> Option<&str> {
    let suffix = topic.strip_prefix(TOPIC_CAMERA_PREFIX)?;
    if suffix.is_empty() {
        None
    } else {
        Some(suffix)
    }
}
