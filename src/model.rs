//! Model descriptor.
//!
//! A [`ModelBundle`] is constructed before the controller exists and is
//! read-only afterwards. It carries paths, never model bytes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("failed to read model descriptor")]
    Io(#[from] std::io::Error),

    #[error("failed to parse model descriptor")]
    Parse(#[from] serde_json::Error),

    #[error("model descriptor has no name")]
    MissingName,

    #[error("model descriptor has an empty label list")]
    NoLabels,
}

/// Immutable description of a deployable model: where its artifacts live and
/// what its output indices mean.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundle {
    pub name: String,

    /// Version label supplied with the bundle. The authoritative version is
    /// whatever the loaded session reports.
    #[serde(default)]
    pub version: Option<String>,

    /// Path to the trained model file handed to the engine.
    pub model_file: PathBuf,

    /// Ordered label list; index i names output score i.
    pub labels: Vec<String>,

    /// Raw native-endian f32 mean image. May not exist on disk.
    pub mean_image: PathBuf,

    /// Sample images offered for classification.
    #[serde(default)]
    pub sample_images: Vec<PathBuf>,
}

impl ModelBundle {
    /// Loads and validates a JSON descriptor.
    pub fn from_json_file(path: &Path) -> Result<Self, ModelError> {
        let raw = std::fs::read_to_string(path)?;
        let bundle: Self = serde_json::from_str(&raw)?;
        bundle.validate()?;
        Ok(bundle)
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.name.trim().is_empty() {
            return Err(ModelError::MissingName);
        }
        if self.labels.is_empty() {
            return Err(ModelError::NoLabels);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor_json() -> &'static str {
        r#"{
            "name": "alexnet",
            "version": "1.0",
            "model_file": "/models/alexnet/model.bin",
            "labels": ["cat", "dog"],
            "mean_image": "/models/alexnet/mean.bin",
            "sample_images": ["/models/alexnet/samples/a.jpg"]
        }"#
    }

    #[test]
    fn parses_full_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, descriptor_json()).unwrap();

        let bundle = ModelBundle::from_json_file(&path).unwrap();

        assert_eq!(bundle.name, "alexnet");
        assert_eq!(bundle.version.as_deref(), Some("1.0"));
        assert_eq!(bundle.labels, vec!["cat", "dog"]);
        assert_eq!(bundle.sample_images.len(), 1);
    }

    #[test]
    fn version_and_samples_are_optional() {
        let bundle: ModelBundle = serde_json::from_str(
            r#"{
                "name": "m",
                "model_file": "/m/model.bin",
                "labels": ["a"],
                "mean_image": "/m/mean.bin"
            }"#,
        )
        .unwrap();

        assert!(bundle.version.is_none());
        assert!(bundle.sample_images.is_empty());
    }

    #[test]
    fn empty_labels_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(
            &path,
            r#"{"name": "m", "model_file": "/m", "labels": [], "mean_image": "/m/mean.bin"}"#,
        )
        .unwrap();

        assert!(matches!(
            ModelBundle::from_json_file(&path),
            Err(ModelError::NoLabels)
        ));
    }

    #[test]
    fn blank_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(
            &path,
            r#"{"name": "  ", "model_file": "/m", "labels": ["a"], "mean_image": "/m/mean.bin"}"#,
        )
        .unwrap();

        assert!(matches!(
            ModelBundle::from_json_file(&path),
            Err(ModelError::MissingName)
        ));
    }
}
