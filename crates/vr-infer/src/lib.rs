//! # Virtuoso Render: performance inference
//!
//! Turns extracted score features into expressive performance parameters:
//! - Note relationship graph (onset, voice, slur, ...)
//! - Direct or hierarchical (measure/section → note) prediction
//! - Trill prediction conditioned on the main prediction
//! - Decoding of standardized or binned outputs to physical values
//!
//! ## Architecture
//!
//! Models sit behind the [`SequenceModel`] trait. [`OnnxSequenceModel`] runs
//! exported networks with `tract`; tests plug in stubs. Normalization stats,
//! bin tables and the render configuration live in a [`RenderContext`] that is
//! loaded once and borrowed by every render.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vr_infer::{ModelSet, PerformanceRenderer, RenderContext, ScoreInput, StyleCondition};
//!
//! let context = RenderContext::load("assets/")?;
//! let renderer = PerformanceRenderer::new(&context, ModelSet { main: &main, trill: &trill, coarse: None })?;
//! let features = renderer.render(&ScoreInput::load("score.json")?, &StyleCondition::default())?;
//! ```

pub mod decode;
pub mod graph;
pub mod hierarchy;
pub mod runner;

mod buffer;
mod config;
mod error;
mod features;
mod inference;
mod latent;
mod model;
mod pipeline;
mod score;

pub use buffer::{concat_features, zero_output};
pub use config::{RenderConfig, RenderContext};
pub use decode::{BinTable, ContinuousLayout, LossType, NormalizationStats, OutputDecoder};
pub use error::{VrError, VrResult};
pub use features::{FeatureSchema, JsonFeatureSink, NotePerformance, PerformanceSink, assemble};
pub use graph::{Edge, NoteGraph, Relation};
pub use hierarchy::{HierarchyLevel, span_to_notes};
pub use inference::{ExecutionProvider, InferenceConfig, InferenceEngine, ModelSpec, OnnxSequenceModel};
pub use latent::{LatentCode, LatentState, StyleCondition};
pub use model::{ModelStep, SequenceModel, StepOutput};
pub use pipeline::{ModelSet, PerformanceRenderer, RawPerformance};
pub use runner::{Slicing, run_model_in_steps};
pub use score::{NoteLocation, ScoreFeatures, ScoreInput};

/// Model registry paths
pub mod models {
    /// Note-level performance model
    pub const MAIN: &str = "models/virtuoso_main.onnx";

    /// Measure/section-level coarse model
    pub const COARSE: &str = "models/virtuoso_coarse.onnx";

    /// Trill model
    pub const TRILL: &str = "models/virtuoso_trill.onnx";
}

/// Output widths of the standard model set
pub mod dims {
    /// Main model output (tempo, dynamics, articulation, pedals)
    pub const MAIN_OUTPUT: usize = 11;

    /// Trill model output
    pub const TRILL_OUTPUT: usize = 5;

    /// Combined prediction width
    pub const COMBINED_OUTPUT: usize = MAIN_OUTPUT + TRILL_OUTPUT;
}
