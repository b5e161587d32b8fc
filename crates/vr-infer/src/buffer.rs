//! Sequence tensors for model calls
//!
//! All model-facing tensors are `[batch = 1, notes, features]`.

use ndarray::{concatenate, Array3, ArrayView3, Axis};

use crate::error::{VrError, VrResult};

/// Zero output seed `[1, num_notes, dim]` for a model with no prior prediction
pub fn zero_output(num_notes: usize, dim: usize) -> Array3<f32> {
    Array3::zeros((1, num_notes, dim))
}

/// Check a tensor is exactly `[1, notes, features]`
pub fn expect_shape(
    tensor: &ArrayView3<'_, f32>,
    notes: usize,
    features: usize,
    input: bool,
) -> VrResult<()> {
    let shape = tensor.shape();
    if shape == [1, notes, features] {
        return Ok(());
    }

    let expected = format!("[1, {}, {}]", notes, features);
    let got = format!("{:?}", shape);
    if input {
        Err(VrError::InvalidInputShape { expected, got })
    } else {
        Err(VrError::InvalidOutputShape { expected, got })
    }
}

/// Concatenate `[1, N, a]` and `[1, N, b]` into `[1, N, a + b]`
pub fn concat_features(left: &ArrayView3<'_, f32>, right: &ArrayView3<'_, f32>) -> VrResult<Array3<f32>> {
    if left.shape()[..2] != right.shape()[..2] {
        return Err(VrError::InvalidInputShape {
            expected: format!("[{}, {}, _]", left.shape()[0], left.shape()[1]),
            got: format!("{:?}", right.shape()),
        });
    }
    Ok(concatenate(Axis(2), &[left.view(), right.view()])?)
}

/// Concatenate window outputs along the note axis
pub fn concat_notes(parts: &[Array3<f32>]) -> VrResult<Array3<f32>> {
    let views: Vec<ArrayView3<'_, f32>> = parts.iter().map(|p| p.view()).collect();
    if views.is_empty() {
        return Err(VrError::InferenceFailed {
            reason: "No output from model".into(),
        });
    }
    Ok(concatenate(Axis(1), &views)?)
}
