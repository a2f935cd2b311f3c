//! Model artifact loading and inference.
//!
//! Price models are trained offline and exported as JSON artifacts
//! (feature names, coefficients, intercept). At startup the predictor
//! loads the point artifact and, independently, the p10/p90 quantile
//! artifacts; a missing or unreadable artifact selects the statistical
//! fallback strategy for the lifetime of the instance.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// A loaded, queryable model: one feature vector in, one scalar out.
#[cfg_attr(test, mockall::automock)]
pub trait InferenceSession: Send + Sync {
    fn run(&self, features: &[f64]) -> Result<f64>;
}

/// On-disk artifact produced by the training pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model_id: String,
    pub version: String,
    pub feature_names: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

/// Linear inference session backed by a [`ModelArtifact`].
#[derive(Debug, Clone)]
pub struct LinearSession {
    artifact: ModelArtifact,
}

impl LinearSession {
    pub fn new(artifact: ModelArtifact) -> Self {
        Self { artifact }
    }

    pub fn n_features(&self) -> usize {
        self.artifact.coefficients.len()
    }
}

impl InferenceSession for LinearSession {
    fn run(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.artifact.coefficients.len() {
            anyhow::bail!(
                "feature count mismatch: expected {}, got {}",
                self.artifact.coefficients.len(),
                features.len()
            );
        }
        let dot: f64 = features
            .iter()
            .zip(self.artifact.coefficients.iter())
            .map(|(f, c)| f * c)
            .sum();
        Ok(dot + self.artifact.intercept)
    }
}

/// Load a model artifact from disk into a runnable session.
pub fn load_session(path: &Path) -> Result<Box<dyn InferenceSession>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading model artifact {}", path.display()))?;
    let artifact: ModelArtifact = serde_json::from_str(&raw)
        .with_context(|| format!("parsing model artifact {}", path.display()))?;
    if artifact.coefficients.is_empty() {
        anyhow::bail!("model artifact {} has no coefficients", path.display());
    }
    Ok(Box::new(LinearSession::new(artifact)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn artifact(coefficients: Vec<f64>, intercept: f64) -> ModelArtifact {
        ModelArtifact {
            model_id: "price_predictor".to_string(),
            version: "2.0".to_string(),
            feature_names: (0..coefficients.len()).map(|i| format!("f{i}")).collect(),
            coefficients,
            intercept,
        }
    }

    #[test]
    fn test_linear_session_dot_product() {
        let session = LinearSession::new(artifact(vec![1.0, 2.0, 3.0], 0.5));
        let out = session.run(&[1.0, 1.0, 1.0]).unwrap();
        assert!((out - 6.5).abs() < 1e-9);
    }

    #[test]
    fn test_feature_count_mismatch_is_error() {
        let session = LinearSession::new(artifact(vec![1.0, 2.0], 0.0));
        assert!(session.run(&[1.0]).is_err());
    }

    #[test]
    fn test_load_session_roundtrip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = serde_json::to_string(&artifact(vec![0.0; 11], 42.0)).unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let session = load_session(file.path()).unwrap();
        let out = session.run(&[1.0; 11]).unwrap();
        assert!((out - 42.0).abs() < 1e-9);
    }

    #[test]
    fn test_load_session_missing_file_is_error() {
        assert!(load_session(Path::new("/nonexistent/model.json")).is_err());
    }

    #[test]
    fn test_load_session_garbage_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not json at all").unwrap();
        assert!(load_session(file.path()).is_err());
    }

    #[test]
    fn test_load_session_empty_coefficients_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = serde_json::to_string(&artifact(vec![], 1.0)).unwrap();
        file.write_all(json.as_bytes()).unwrap();
        assert!(load_session(file.path()).is_err());
    }
}
