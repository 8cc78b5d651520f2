//! Wire types for the render engine's JSON endpoints.
//!
//! The engine exposes two endpoints: one that mixes an audio track and one
//! that paces the slideshow by a fixed transition time. Request field names
//! (including `transicion_segundos`) follow the engine's contract verbatim.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::job::{Job, RenderOutput};
use crate::stager::StagedAssets;

/// Engine-independent description of one render call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub images_path: String,
    pub audio_path: Option<String>,
    pub output_path: String,
    pub format: String,
    pub transition_seconds: u32,
}

impl RenderRequest {
    pub fn for_job(job: &Job, assets: &StagedAssets) -> Self {
        Self {
            images_path: assets.images_dir.to_string_lossy().into_owned(),
            audio_path: assets
                .audio_file
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            output_path: assets.output_dir.to_string_lossy().into_owned(),
            format: job.format.clone(),
            transition_seconds: job.transition_seconds,
        }
    }

    pub fn has_audio(&self) -> bool {
        self.audio_path.is_some()
    }
}

/// Body for the with-audio endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WithAudioBody {
    pub images_path: String,
    pub audio_path: String,
    pub video_path: String,
    pub format: String,
}

/// Body for the without-audio endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WithoutAudioBody {
    pub images_path: String,
    pub video_path: String,
    pub format: String,
    pub transicion_segundos: u32,
}

/// Response envelope returned by both endpoints.
///
/// Every field is optional here so that a contract violation surfaces as a
/// typed `InvalidResponse` instead of a generic decode error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub video_path: Option<String>,
    #[serde(default)]
    pub metadata: Option<EngineMetadata>,
}

/// `full_path` and `duration` are checked by the client. Every other field
/// is informational and decodes to `None` when it is null or of the wrong type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineMetadata {
    #[serde(default, deserialize_with = "lenient")]
    pub filename: Option<String>,
    #[serde(default)]
    pub full_path: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub images_used: Option<u32>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub audio_file: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub resolution: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub fps: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    pub file_size_mb: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub image_order: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient")]
    pub duration_per_image: Option<f64>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// A validated successful render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderResult {
    pub filename: String,
    pub full_path: String,
    pub duration_seconds: f64,
    pub images_used: Option<u32>,
    pub resolution: Option<String>,
    pub fps: Option<u32>,
}

impl RenderResult {
    pub fn into_output(self) -> RenderOutput {
        RenderOutput {
            output_path: self.full_path,
            output_filename: self.filename,
            duration_seconds: self.duration_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn without_audio_body_uses_engine_field_names() {
        let body = WithoutAudioBody {
            images_path: "/d/1/images".into(),
            video_path: "/d/1/output".into(),
            format: "mp4".into(),
            transicion_segundos: 5,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["transicion_segundos"], 5);
        assert_eq!(json["video_path"], "/d/1/output");
        assert!(json.get("audio_path").is_none());
    }

    #[test]
    fn engine_response_deserialize_from_engine_format() {
        let raw = r#"{
            "status": "success",
            "video_path": "/d/1/output/video.mp4",
            "metadata": {
                "filename": "video.mp4",
                "full_path": "/d/1/output/video.mp4",
                "created_at": "2026-01-01T00:00:00",
                "images_used": 3,
                "duration": 15.0,
                "audio_file": null,
                "resolution": "1920x1080",
                "fps": 30,
                "file_size_mb": 2.5,
                "image_order": ["image_000.jpg", "image_001.jpg", "image_002.jpg"],
                "duration_per_image": 5.0
            }
        }"#;
        let resp: EngineResponse = serde_json::from_str(raw).unwrap();
        let meta = resp.metadata.unwrap();
        assert_eq!(meta.duration, Some(15.0));
        assert_eq!(meta.image_order.map(|o| o.len()), Some(3));
        assert_eq!(meta.fps, Some(30));
        assert!(meta.audio_file.is_none());
    }

    #[test]
    fn optional_metadata_tolerates_null_and_wrong_types() {
        let raw = r#"{
            "metadata": {
                "full_path": "/d/1/output/video.mp4",
                "duration": 15.0,
                "images_used": "3",
                "fps": 29.97,
                "resolution": null,
                "image_order": null,
                "file_size_mb": "big"
            }
        }"#;
        let meta = serde_json::from_str::<EngineResponse>(raw)
            .unwrap()
            .metadata
            .unwrap();
        assert_eq!(meta.duration, Some(15.0));
        assert!(meta.image_order.is_none());
        assert!(meta.images_used.is_none());
        assert!(meta.fps.is_none());
        assert!(meta.resolution.is_none());
        assert!(meta.file_size_mb.is_none());
    }

    #[test]
    fn engine_response_tolerates_missing_metadata() {
        let resp: EngineResponse = serde_json::from_str(r#"{"status":"error"}"#).unwrap();
        assert!(resp.metadata.is_none());
    }
}
