//! Score-side inputs
//!
//! The feature extractor (outside this crate) turns a symbolic score into three
//! note-aligned tables: the per-note feature matrix, the relationship edges and
//! the note locations. [`ScoreInput`] bundles them and checks that they line up.

use std::path::Path;

use ndarray::{Array2, Array3, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{VrError, VrResult};
use crate::graph::Edge;

/// Where a note sits in the score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NoteLocation {
    /// Beat index
    pub beat: usize,
    /// Measure index
    pub measure: usize,
    /// Section index
    #[serde(default)]
    pub section: usize,
    /// Voice number
    #[serde(default)]
    pub voice: usize,
}

impl NoteLocation {
    pub fn new(beat: usize, measure: usize, section: usize, voice: usize) -> Self {
        Self {
            beat,
            measure,
            section,
            voice,
        }
    }
}

/// Per-note score feature table, one row per note in score order
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreFeatures {
    rows: Array2<f32>,
}

impl ScoreFeatures {
    pub fn new(rows: Array2<f32>) -> Self {
        Self { rows }
    }

    /// Build from row vectors; every row must have the same width
    pub fn from_rows(rows: &[Vec<f32>]) -> VrResult<Self> {
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut flat = Vec::with_capacity(rows.len() * width);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(VrError::InvalidInputShape {
                    expected: format!("{} features per note", width),
                    got: format!("{} features at note {}", row.len(), i),
                });
            }
            flat.extend_from_slice(row);
        }
        Ok(Self {
            rows: Array2::from_shape_vec((rows.len(), width), flat)?,
        })
    }

    pub fn num_notes(&self) -> usize {
        self.rows.nrows()
    }

    pub fn feature_dim(&self) -> usize {
        self.rows.ncols()
    }

    pub fn rows(&self) -> &Array2<f32> {
        &self.rows
    }

    /// Batched view `[1, num_notes, feature_dim]`, optionally shifting one column
    pub fn to_batch(&self, offset: Option<(usize, f32)>) -> VrResult<Array3<f32>> {
        let mut batch = self.rows.clone();
        if let Some((column, delta)) = offset {
            if column >= batch.ncols() {
                return Err(VrError::InvalidConfig(format!(
                    "tempo column {} outside {} input features",
                    column,
                    batch.ncols()
                )));
            }
            batch.column_mut(column).mapv_inplace(|v| v + delta);
        }
        Ok(batch.insert_axis(Axis(0)))
    }
}

/// On-disk form of an extracted score
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScoreInputFile {
    features: Vec<Vec<f32>>,
    #[serde(default)]
    edges: Vec<Edge>,
    note_locations: Vec<NoteLocation>,
}

/// Everything the pipeline needs from the extractor for one score
#[derive(Debug, Clone)]
pub struct ScoreInput {
    pub features: ScoreFeatures,
    pub edges: Vec<Edge>,
    pub note_locations: Vec<NoteLocation>,
}

impl ScoreInput {
    /// Bundle extractor outputs; tables must be note-aligned
    pub fn new(
        features: ScoreFeatures,
        edges: Vec<Edge>,
        note_locations: Vec<NoteLocation>,
    ) -> VrResult<Self> {
        if features.num_notes() != note_locations.len() {
            return Err(VrError::RowCountMismatch {
                what: "note locations",
                expected: features.num_notes(),
                got: note_locations.len(),
            });
        }
        Ok(Self {
            features,
            edges,
            note_locations,
        })
    }

    pub fn num_notes(&self) -> usize {
        self.features.num_notes()
    }

    /// Parse a pre-extracted score (`features`, `edges`, `note_locations`)
    pub fn from_json(json: &str) -> VrResult<Self> {
        let file: ScoreInputFile = serde_json::from_str(json)?;
        let features = ScoreFeatures::from_rows(&file.features)?;
        Self::new(features, file.edges, file.note_locations)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> VrResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn measure_numbers(&self) -> Vec<usize> {
        self.note_locations.iter().map(|l| l.measure).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ragged_rows_rejected() {
        let err = ScoreFeatures::from_rows(&[vec![0.0, 1.0], vec![0.0]]).unwrap_err();
        assert!(err.is_shape());
    }

    #[test]
    fn test_qpm_offset_touches_one_column() {
        let features = ScoreFeatures::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let batch = features.to_batch(Some((1, 0.5))).unwrap();

        assert_eq!(batch.shape(), &[1, 2, 2]);
        assert_eq!(batch[[0, 0, 0]], 1.0);
        assert_eq!(batch[[0, 0, 1]], 2.5);
        assert_eq!(batch[[0, 1, 1]], 4.5);
        // Caller's table is untouched
        assert_eq!(features.rows()[[0, 1]], 2.0);
    }

    #[test]
    fn test_misaligned_locations() {
        let features = ScoreFeatures::from_rows(&[vec![0.0], vec![0.0]]).unwrap();
        let err = ScoreInput::new(features, vec![], vec![NoteLocation::default()]).unwrap_err();
        assert!(matches!(err, VrError::RowCountMismatch { expected: 2, got: 1, .. }));
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "features": [[0.1, 0.2], [0.3, 0.4]],
            "edges": [{"from": 0, "to": 1, "relation": "forward"}],
            "note_locations": [
                {"beat": 0, "measure": 0},
                {"beat": 1, "measure": 0, "section": 0, "voice": 1}
            ]
        }"#;
        let score = ScoreInput::from_json(json).unwrap();
        assert_eq!(score.num_notes(), 2);
        assert_eq!(score.edges.len(), 1);
        assert_eq!(score.note_locations[1].voice, 1);
    }
}
