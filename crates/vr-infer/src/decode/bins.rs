//! Bin declassification for cross-entropy-trained models

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{VrError, VrResult};

/// Ordered bin boundaries per discretized feature
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BinTable {
    pub boundaries: Vec<Vec<f32>>,
}

impl BinTable {
    /// Build and validate; every feature needs at least one bin
    pub fn new(boundaries: Vec<Vec<f32>>) -> VrResult<Self> {
        let table = Self { boundaries };
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> VrResult<()> {
        for (feature, bounds) in self.boundaries.iter().enumerate() {
            if bounds.len() < 2 {
                return Err(VrError::BinTableMismatch {
                    reason: format!(
                        "feature {} has {} boundaries, need at least 2",
                        feature,
                        bounds.len()
                    ),
                });
            }
        }
        Ok(())
    }

    pub fn num_features(&self) -> usize {
        self.boundaries.len()
    }

    /// Number of bins of `feature`
    pub fn bin_count(&self, feature: usize) -> usize {
        self.boundaries
            .get(feature)
            .map(|b| b.len().saturating_sub(1))
            .unwrap_or(0)
    }

    /// Total logit width across all features
    pub fn total_bins(&self) -> usize {
        (0..self.num_features()).map(|f| self.bin_count(f)).sum()
    }

    /// Raw prediction width: all logit blocks plus one pass-through column
    pub fn raw_width(&self) -> usize {
        self.total_bins() + 1
    }

    /// Midpoint of bin `class` of `feature`
    pub fn midpoint(&self, feature: usize, class: usize) -> Option<f32> {
        let bounds = self.boundaries.get(feature)?;
        let lower = *bounds.get(class)?;
        let upper = *bounds.get(class + 1)?;
        Some((lower + upper) / 2.0)
    }

    /// Decode `[notes, raw_width]` logits to `[notes, features + 1]` values
    ///
    /// Each feature's value is the midpoint of its argmax bin. The last raw
    /// column is copied unchanged into the last output column.
    pub fn declassify(&self, logits: ArrayView2<'_, f32>) -> VrResult<Array2<f32>> {
        self.validate()?;
        if logits.ncols() != self.raw_width() {
            return Err(VrError::BinTableMismatch {
                reason: format!(
                    "{} features with {} bins need {} columns, prediction has {}",
                    self.num_features(),
                    self.total_bins(),
                    self.raw_width(),
                    logits.ncols()
                ),
            });
        }

        let num_features = self.num_features();
        let mut values = Array2::<f32>::zeros((logits.nrows(), num_features + 1));

        for (note, row) in logits.outer_iter().enumerate() {
            let mut block_start = 0;
            for feature in 0..num_features {
                let width = self.bin_count(feature);
                let block = row.slice(ndarray::s![block_start..block_start + width]);
                let class = argmax(block);
                values[[note, feature]] = self.midpoint(feature, class).ok_or_else(|| {
                    VrError::BinTableMismatch {
                        reason: format!("no bin {} for feature {}", class, feature),
                    }
                })?;
                block_start += width;
            }
            values[[note, num_features]] = row[row.len() - 1];
        }

        Ok(values)
    }
}

/// Index of the largest value; the first one wins ties
fn argmax(values: ArrayView1<'_, f32>) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array1};

    fn table() -> BinTable {
        BinTable::new(vec![
            vec![0.0, 1.0, 2.0, 4.0],
            vec![-1.0, 1.0],
            vec![10.0, 20.0, 40.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_widths() {
        let t = table();
        assert_eq!(t.bin_count(0), 3);
        assert_eq!(t.bin_count(1), 1);
        assert_eq!(t.total_bins(), 6);
        assert_eq!(t.raw_width(), 7);
    }

    #[test]
    fn test_one_hot_decodes_to_midpoint() {
        let t = table();
        for k in 0..t.bin_count(0) {
            let mut logits = Array2::<f32>::zeros((1, 7));
            logits[[0, k]] = 1.0;
            logits[[0, 6]] = 0.75;
            let decoded = t.declassify(logits.view()).unwrap();

            let expected = (t.boundaries[0][k] + t.boundaries[0][k + 1]) / 2.0;
            assert_relative_eq!(decoded[[0, 0]], expected);
            assert_relative_eq!(decoded[[0, 3]], 0.75);
        }
        for k in 0..t.bin_count(2) {
            let mut logits = Array2::<f32>::zeros((1, 7));
            logits[[0, 4 + k]] = 5.0;
            let decoded = t.declassify(logits.view()).unwrap();
            assert_relative_eq!(decoded[[0, 2]], t.midpoint(2, k).unwrap());
        }
    }

    #[test]
    fn test_multiple_notes() {
        let t = table();
        let logits = array![
            [0.1, 0.9, 0.0, 3.0, 0.0, 0.2, 1.0],
            [2.0, 0.0, 0.0, 3.0, 0.9, 0.1, 0.0],
        ];
        let decoded = t.declassify(logits.view()).unwrap();

        assert_eq!(decoded.shape(), &[2, 4]);
        assert_relative_eq!(decoded[[0, 0]], 1.5);
        assert_relative_eq!(decoded[[0, 1]], 0.0);
        assert_relative_eq!(decoded[[0, 2]], 30.0);
        assert_relative_eq!(decoded[[0, 3]], 1.0);
        assert_relative_eq!(decoded[[1, 0]], 0.5);
        assert_relative_eq!(decoded[[1, 2]], 15.0);
    }

    #[test]
    fn test_width_mismatch_is_config_error() {
        let t = table();
        let logits = Array2::<f32>::zeros((2, 6));
        let err = t.declassify(logits.view()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_degenerate_feature_rejected() {
        assert!(BinTable::new(vec![vec![0.0]]).unwrap_err().is_configuration());
    }

    #[test]
    fn test_argmax_first_wins() {
        let v = Array1::from(vec![1.0f32, 3.0, 3.0, 2.0]);
        assert_eq!(argmax(v.view()), 1);
    }
}
