//! Sequence model boundary
//!
//! The network itself lives outside this crate. Anything that can map a window
//! of note features to per-note performance parameters implements
//! [`SequenceModel`]; [`crate::runner::run_model_in_steps`] drives it.

use ndarray::{Array3, ArrayView3};

use crate::error::VrResult;
use crate::graph::NoteGraph;
use crate::latent::{LatentCode, LatentState};
use crate::score::NoteLocation;

/// One window handed to a model
#[derive(Debug, Clone, Copy)]
pub struct ModelStep<'a> {
    /// `[1, n, input_size]`
    pub input: ArrayView3<'a, f32>,
    /// `[1, n, output_size]`, zeros unless a prior prediction exists
    pub output_seed: ArrayView3<'a, f32>,
    /// Adjacency restricted to the window
    pub graph: Option<&'a NoteGraph>,
    /// Locations for the whole score; the window starts at `start`
    pub note_locations: &'a [NoteLocation],
    pub start: usize,
    pub latent: &'a LatentCode,
}

impl ModelStep<'_> {
    pub fn num_notes(&self) -> usize {
        self.input.shape()[1]
    }

    /// Locations of the notes inside this window
    pub fn window_locations(&self) -> &[NoteLocation] {
        let end = (self.start + self.num_notes()).min(self.note_locations.len());
        &self.note_locations[self.start.min(end)..end]
    }
}

/// Model output for one window
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// `[1, rows, output_size]`; rows is `n` for note-level models
    pub prediction: Array3<f32>,
    pub state: LatentState,
}

/// Pretrained sequence model (main, hierarchical coarse, or trill)
pub trait SequenceModel: Send + Sync {
    /// Model name/version
    fn name(&self) -> &str;

    /// Input feature dimensionality
    fn input_size(&self) -> usize;

    /// Output feature dimensionality
    fn output_size(&self) -> usize;

    /// Latent dimensionality, `None` if the model takes no latent code
    fn latent_size(&self) -> Option<usize>;

    /// Run the model over one window
    fn forward(&self, step: ModelStep<'_>) -> VrResult<StepOutput>;
}
