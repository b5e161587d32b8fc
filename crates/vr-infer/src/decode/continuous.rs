//! Standardization inverse for MSE-trained models

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{VrError, VrResult};

/// Standard deviations below this are treated as 1
pub const STD_FLOOR: f32 = 1e-4;

/// Per-feature means and standard deviations, indexed `[group][feature]`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizationStats {
    pub means: Vec<Vec<f32>>,
    pub stds: Vec<Vec<f32>>,
}

impl NormalizationStats {
    pub fn new(means: Vec<Vec<f32>>, stds: Vec<Vec<f32>>) -> Self {
        Self { means, stds }
    }

    /// Mean 0, std 1 for `features` columns in each of `groups` groups
    pub fn identity(groups: usize, features: usize) -> Self {
        Self {
            means: vec![vec![0.0; features]; groups],
            stds: vec![vec![1.0; features]; groups],
        }
    }
}

/// Which stats column each prediction column is standardized with
///
/// The first `direct` columns use their own index; the next `shifted`
/// columns use `column + shift`; anything after is left as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuousLayout {
    /// Stats group holding the output features
    pub group: usize,
    pub direct: usize,
    pub shifted: usize,
    pub shift: usize,
}

impl Default for ContinuousLayout {
    fn default() -> Self {
        Self {
            group: 1,
            direct: 11,
            shifted: 4,
            shift: 4,
        }
    }
}

impl ContinuousLayout {
    /// Stats index for `column`, `None` for pass-through columns
    pub fn stats_index(&self, column: usize) -> Option<usize> {
        if column < self.direct {
            Some(column)
        } else if column < self.direct + self.shifted {
            Some(column + self.shift)
        } else {
            None
        }
    }

    /// Full column → stats index map for `width` columns
    pub fn column_map(&self, width: usize) -> Vec<Option<usize>> {
        (0..width).map(|c| self.stats_index(c)).collect()
    }
}

/// Private, clamped copy of the normalization stats
#[derive(Debug, Clone)]
pub struct Denormalizer {
    stats: NormalizationStats,
    clamped: Vec<(usize, usize)>,
}

impl Denormalizer {
    /// Copy `stats`, replacing any std below [`STD_FLOOR`] by 1
    pub fn new(stats: &NormalizationStats) -> Self {
        let mut stats = stats.clone();
        let mut clamped = Vec::new();

        for (g, group) in stats.stds.iter_mut().enumerate() {
            for (i, std) in group.iter_mut().enumerate() {
                if *std < STD_FLOOR {
                    clamped.push((g, i));
                    *std = 1.0;
                }
            }
        }

        if !clamped.is_empty() {
            log::warn!(
                "Clamped {} degenerate standard deviation(s) to 1: {:?}",
                clamped.len(),
                clamped
            );
        }

        Self { stats, clamped }
    }

    /// `(group, feature)` entries that were clamped
    pub fn clamped(&self) -> &[(usize, usize)] {
        &self.clamped
    }

    /// `(mean, std)` after clamping
    pub fn params(&self, group: usize, index: usize) -> VrResult<(f32, f32)> {
        let means = self.stats.means.get(group);
        let stds = self.stats.stds.get(group);
        match (means.and_then(|m| m.get(index)), stds.and_then(|s| s.get(index))) {
            (Some(&mean), Some(&std)) => Ok((mean, std)),
            _ => Err(VrError::StatsTooShort {
                group,
                index,
                len: means
                    .map(|m| m.len())
                    .unwrap_or(0)
                    .min(stds.map(|s| s.len()).unwrap_or(0)),
            }),
        }
    }

    /// `raw * std + mean` per mapped column
    pub fn decode(&self, raw: ArrayView2<'_, f32>, layout: &ContinuousLayout) -> VrResult<Array2<f32>> {
        self.apply(raw, layout, |v, mean, std| v * std + mean)
    }

    /// `(value - mean) / std` per mapped column
    pub fn encode(&self, values: ArrayView2<'_, f32>, layout: &ContinuousLayout) -> VrResult<Array2<f32>> {
        self.apply(values, layout, |v, mean, std| (v - mean) / std)
    }

    fn apply(
        &self,
        values: ArrayView2<'_, f32>,
        layout: &ContinuousLayout,
        f: impl Fn(f32, f32, f32) -> f32,
    ) -> VrResult<Array2<f32>> {
        let mut out = values.to_owned();
        for (column, index) in layout.column_map(values.ncols()).into_iter().enumerate() {
            let Some(index) = index else { continue };
            let (mean, std) = self.params(layout.group, index)?;
            out.column_mut(column).mapv_inplace(|v| f(v, mean, std));
        }
        Ok(out)
    }
}
