//! Output decoding
//!
//! Maps raw model predictions back to physical performance values:
//! - MSE models: inverse standardization with clamped stds
//! - Cross-entropy models: argmax bin → bin midpoint
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vr_infer::decode::{LossType, OutputDecoder};
//!
//! let decoder = OutputDecoder::new(LossType::Mse, &stats, &bins, layout);
//! let values = decoder.decode(prediction.view())?;
//! ```

mod bins;
mod continuous;

pub use bins::BinTable;
pub use continuous::{ContinuousLayout, Denormalizer, NormalizationStats, STD_FLOOR};

use ndarray::{Array2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{VrError, VrResult};

/// Training loss of the model, which fixes how its outputs are decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LossType {
    /// Standardized continuous outputs
    #[default]
    #[serde(rename = "MSE", alias = "mse")]
    Mse,
    /// Per-feature bin logits
    #[serde(rename = "CE", alias = "ce")]
    CrossEntropy,
}

/// Decoder for one loss type, holding its own clamped copy of the stats
#[derive(Debug, Clone)]
pub enum OutputDecoder<'a> {
    Continuous {
        denormalizer: Denormalizer,
        layout: ContinuousLayout,
    },
    Classification {
        bins: &'a BinTable,
    },
}

impl<'a> OutputDecoder<'a> {
    pub fn new(
        loss: LossType,
        stats: &NormalizationStats,
        bins: &'a BinTable,
        layout: ContinuousLayout,
    ) -> Self {
        match loss {
            LossType::Mse => OutputDecoder::Continuous {
                denormalizer: Denormalizer::new(stats),
                layout,
            },
            LossType::CrossEntropy => OutputDecoder::Classification { bins },
        }
    }

    /// Width of decoded rows for a raw prediction of `raw_width` columns
    pub fn decoded_width(&self, raw_width: usize) -> usize {
        match self {
            OutputDecoder::Continuous { .. } => raw_width,
            OutputDecoder::Classification { bins } => bins.num_features() + 1,
        }
    }

    /// Decode a `[1, notes, raw_width]` prediction into `[notes, width]` values
    pub fn decode(&self, prediction: ArrayView3<'_, f32>) -> VrResult<Array2<f32>> {
        if prediction.shape()[0] != 1 {
            return Err(VrError::InvalidInputShape {
                expected: "[1, notes, features]".into(),
                got: format!("{:?}", prediction.shape()),
            });
        }
        let raw = prediction.index_axis(Axis(0), 0);

        match self {
            OutputDecoder::Continuous { denormalizer, layout } => denormalizer.decode(raw, layout),
            OutputDecoder::Classification { bins } => bins.declassify(raw),
        }
    }
}
