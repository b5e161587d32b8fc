//! Latent style conditioning
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vr_infer::{LatentCode, StyleCondition};
//!
//! let style = StyleCondition::new(LatentCode::Paired(coarse, fine)).with_qpm_change(0.2);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{VrError, VrResult};

/// Latent code fed to a sequence model
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatentCode {
    /// No perturbation
    #[default]
    Zero,
    /// One vector for the whole score
    Single(Vec<f32>),
    /// `(coarse, fine)` codes for hierarchical generation
    Paired(Vec<f32>, Vec<f32>),
}

impl LatentCode {
    /// Split into `(coarse, fine)` codes for a hierarchical render
    pub fn split_hierarchical(&self) -> (LatentCode, LatentCode) {
        match self {
            LatentCode::Paired(coarse, fine) => (
                LatentCode::Single(coarse.clone()),
                LatentCode::Single(fine.clone()),
            ),
            other => (LatentCode::Zero, other.clone()),
        }
    }

    /// Single-model form: a pair keeps only its first element
    pub fn flatten(&self) -> LatentCode {
        match self {
            LatentCode::Paired(first, _) => LatentCode::Single(first.clone()),
            other => other.clone(),
        }
    }

    /// Materialize as a `[1, latent_size]` vector (`Zero` becomes zeros)
    pub fn to_vector(&self, latent_size: usize) -> Vec<f32> {
        match self {
            LatentCode::Zero => vec![0.0; latent_size],
            LatentCode::Single(z) => z.clone(),
            LatentCode::Paired(first, _) => first.clone(),
        }
    }

    /// Check the code against a model's latent dimensionality
    ///
    /// Models without a latent input only accept `Zero`.
    pub fn check(&self, model: &str, latent_size: Option<usize>) -> VrResult<()> {
        let got = match self {
            LatentCode::Zero => return Ok(()),
            LatentCode::Single(z) => z.len(),
            LatentCode::Paired(..) => {
                return Err(VrError::InvalidConfig(format!(
                    "model '{}' takes a single latent code, not a pair",
                    model
                )));
            }
        };

        match latent_size {
            Some(expected) if expected == got => Ok(()),
            Some(expected) => Err(VrError::LatentSizeMismatch {
                model: model.to_string(),
                expected,
                got,
            }),
            None => Err(VrError::LatentSizeMismatch {
                model: model.to_string(),
                expected: 0,
                got,
            }),
        }
    }
}

/// Style request for one render: latent code plus optional tempo offset
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StyleCondition {
    #[serde(default)]
    pub latent: LatentCode,
    /// Added to the tempo-primo input column before inference
    #[serde(default)]
    pub qpm_change: Option<f32>,
    /// Free-form label carried to the output (e.g. a composer key)
    #[serde(default)]
    pub label: Option<String>,
}

impl StyleCondition {
    pub fn new(latent: LatentCode) -> Self {
        Self {
            latent,
            qpm_change: None,
            label: None,
        }
    }

    pub fn with_qpm_change(mut self, qpm_change: f32) -> Self {
        self.qpm_change = Some(qpm_change);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Posterior statistics a model reports per window
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LatentState {
    pub mu: Vec<f32>,
    pub var: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_paired() {
        let z = LatentCode::Paired(vec![1.0], vec![2.0, 3.0]);
        let (coarse, fine) = z.split_hierarchical();
        assert_eq!(coarse, LatentCode::Single(vec![1.0]));
        assert_eq!(fine, LatentCode::Single(vec![2.0, 3.0]));
    }

    #[test]
    fn test_split_single() {
        let z = LatentCode::Single(vec![0.5]);
        let (coarse, fine) = z.split_hierarchical();
        assert_eq!(coarse, LatentCode::Zero);
        assert_eq!(fine, z);

        let (coarse, fine) = LatentCode::Zero.split_hierarchical();
        assert_eq!(coarse, LatentCode::Zero);
        assert_eq!(fine, LatentCode::Zero);
    }

    #[test]
    fn test_flatten() {
        let z = LatentCode::Paired(vec![1.0], vec![2.0]);
        assert_eq!(z.flatten(), LatentCode::Single(vec![1.0]));
        assert_eq!(LatentCode::Zero.flatten(), LatentCode::Zero);
    }

    #[test]
    fn test_check_sizes() {
        assert!(LatentCode::Zero.check("trill", None).is_ok());
        assert!(LatentCode::Single(vec![0.0; 4]).check("main", Some(4)).is_ok());

        let err = LatentCode::Single(vec![0.0; 3]).check("main", Some(4)).unwrap_err();
        assert!(err.is_configuration());

        let err = LatentCode::Single(vec![0.0]).check("trill", None).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_style_json() {
        let style: StyleCondition =
            serde_json::from_str(r#"{"latent": {"single": [0.1, 0.2]}, "qpm_change": -0.3}"#).unwrap();
        assert_eq!(style.latent, LatentCode::Single(vec![0.1, 0.2]));
        assert_eq!(style.qpm_change, Some(-0.3));
        assert!(style.label.is_none());
    }
}
