//! Model Loader - Artifact -> Model Handle
//!
//! Loading is a startup precondition: every failure here is fatal and the
//! scoring loop must not start.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::inference::{Classifier, ModelHandle, ModelMetadata};
use super::isolation_forest::IsolationForest;
use crate::logic::features::{FeatureSchema, SchemaError};

#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("model artifact not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read model artifact {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("model artifact could not be deserialized: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("unsupported model type '{0}'")]
    UnsupportedModel(String),

    #[error("model artifact does not declare its feature schema (feature_names)")]
    MissingSchema,

    #[error("invalid feature schema: {0}")]
    Schema(#[from] SchemaError),

    #[error("malformed model: {0}")]
    Malformed(String),
}

/// On-disk artifact. `feature_names` and `estimator` are optional here so
/// their absence is reported precisely instead of as a generic parse error.
#[derive(Debug, Deserialize)]
struct ModelArtifact {
    model_type: String,
    #[serde(default)]
    feature_names: Option<Vec<String>>,
    #[serde(default)]
    estimator: Option<serde_json::Value>,
}

/// Load a model artifact from disk, optionally verifying its SHA-256 first
pub fn load_model(path: &Path, expected_sha256: Option<&str>) -> Result<ModelHandle, ModelLoadError> {
    tracing::info!("Loading model artifact from: {}", path.display());

    if !path.exists() {
        return Err(ModelLoadError::NotFound(path.to_path_buf()));
    }

    let bytes = std::fs::read(path).map_err(|source| ModelLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    load_model_from_bytes(&bytes, &path.display().to_string(), expected_sha256)
}

/// Load a model artifact already in memory
pub fn load_model_from_bytes(
    bytes: &[u8],
    source: &str,
    expected_sha256: Option<&str>,
) -> Result<ModelHandle, ModelLoadError> {
    let actual = hex::encode(Sha256::digest(bytes));
    if let Some(expected) = expected_sha256 {
        if !expected.eq_ignore_ascii_case(&actual) {
            return Err(ModelLoadError::ChecksumMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
    }

    let artifact: ModelArtifact = serde_json::from_slice(bytes)?;

    let names = artifact.feature_names.ok_or(ModelLoadError::MissingSchema)?;
    let schema = FeatureSchema::new(names)?;

    let estimator = artifact
        .estimator
        .ok_or_else(|| ModelLoadError::Malformed("artifact has no estimator".to_string()))?;

    let classifier: Box<dyn Classifier> = match artifact.model_type.as_str() {
        "isolation_forest" => {
            let forest: IsolationForest = serde_json::from_value(estimator)?;
            forest
                .validate(schema.len())
                .map_err(ModelLoadError::Malformed)?;
            Box::new(forest)
        }
        other => return Err(ModelLoadError::UnsupportedModel(other.to_string())),
    };

    let metadata = ModelMetadata {
        source: source.to_string(),
        model_type: artifact.model_type,
        sha256: actual,
        feature_count: schema.len(),
        loaded_at: Utc::now(),
    };

    let info = schema.info();
    tracing::info!(
        model_type = %metadata.model_type,
        sha256 = %metadata.sha256,
        fingerprint = %info.fingerprint,
        "Model '{}' loaded with {} features ({} devices)",
        source,
        info.feature_count,
        info.device_count
    );
    tracing::debug!("Feature schema: {:?}", schema.names());

    Ok(ModelHandle::new(schema, classifier, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const ARTIFACT: &str = r#"{
        "model_type": "isolation_forest",
        "feature_names": ["temperature", "humidity", "hour", "device_id_A1"],
        "estimator": {
            "max_samples": 201,
            "trees": [{
                "children_left": [1, -1, -1],
                "children_right": [2, -1, -1],
                "feature": [0, -2, -2],
                "threshold": [30.0, -2.0, -2.0],
                "n_node_samples": [201, 200, 1]
            }]
        }
    }"#;

    fn write_artifact(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_valid_artifact() {
        let file = write_artifact(ARTIFACT);
        let model = load_model(file.path(), None).unwrap();

        assert_eq!(model.schema().len(), 4);
        assert_eq!(model.schema().index_of("device_id_A1"), Some(3));
        assert_eq!(model.metadata().model_type, "isolation_forest");
        assert_eq!(model.metadata().sha256.len(), 64);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.bin");
        assert!(matches!(
            load_model(&path, None),
            Err(ModelLoadError::NotFound(p)) if p == path
        ));
    }

    #[test]
    fn test_garbage_is_deserialize_error() {
        let file = write_artifact("\u{0}\u{1}not json");
        assert!(matches!(
            load_model(file.path(), None),
            Err(ModelLoadError::Deserialize(_))
        ));
    }

    #[test]
    fn test_missing_feature_names() {
        let artifact = ARTIFACT.replace(
            r#""feature_names": ["temperature", "humidity", "hour", "device_id_A1"],"#,
            "",
        );
        assert!(matches!(
            load_model_from_bytes(artifact.as_bytes(), "<test>", None),
            Err(ModelLoadError::MissingSchema)
        ));
    }

    #[test]
    fn test_null_feature_names() {
        let artifact = ARTIFACT.replace(
            r#"["temperature", "humidity", "hour", "device_id_A1"]"#,
            "null",
        );
        assert!(matches!(
            load_model_from_bytes(artifact.as_bytes(), "<test>", None),
            Err(ModelLoadError::MissingSchema)
        ));
    }

    #[test]
    fn test_duplicate_feature_names() {
        let artifact = ARTIFACT.replace(r#""hour""#, r#""humidity""#);
        assert!(matches!(
            load_model_from_bytes(artifact.as_bytes(), "<test>", None),
            Err(ModelLoadError::Schema(SchemaError::Duplicate { .. }))
        ));
    }

    #[test]
    fn test_unsupported_model_type() {
        let artifact = ARTIFACT.replace("isolation_forest", "one_class_svm");
        assert!(matches!(
            load_model_from_bytes(artifact.as_bytes(), "<test>", None),
            Err(ModelLoadError::UnsupportedModel(t)) if t == "one_class_svm"
        ));
    }

    #[test]
    fn test_tree_referencing_unknown_feature_is_malformed() {
        let artifact = ARTIFACT.replace(r#""feature": [0, -2, -2]"#, r#""feature": [9, -2, -2]"#);
        assert!(matches!(
            load_model_from_bytes(artifact.as_bytes(), "<test>", None),
            Err(ModelLoadError::Malformed(_))
        ));
    }

    #[test]
    fn test_checksum_verified() {
        let digest = hex::encode(Sha256::digest(ARTIFACT.as_bytes()));
        assert!(load_model_from_bytes(ARTIFACT.as_bytes(), "<test>", Some(&digest)).is_ok());
        assert!(
            load_model_from_bytes(ARTIFACT.as_bytes(), "<test>", Some(&digest.to_uppercase()))
                .is_ok()
        );

        let wrong = "0".repeat(64);
        assert!(matches!(
            load_model_from_bytes(ARTIFACT.as_bytes(), "<test>", Some(&wrong)),
            Err(ModelLoadError::ChecksumMismatch { .. })
        ));
    }
}
