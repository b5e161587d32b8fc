//! ONNX inference backend
//!
//! Runs exported performance models with tract (pure Rust). An exported model
//! takes, in order:
//! - `x`: `[1, notes, input_size]` score features
//! - `y`: `[1, notes, output_size]` output seed
//! - `graph`: `[relations, notes, notes]` adjacency (graph models only)
//! - `z`: `[1, latent_size]` latent code (latent models only)
//!
//! and returns the prediction, optionally followed by the posterior `mu` and
//! `var`.

use std::path::Path;

use ndarray::{Array2, Array3, ArrayD, Ix3};
use serde::{Deserialize, Serialize};

use crate::error::{VrError, VrResult};
use crate::graph::{NoteGraph, Relation};
use crate::latent::LatentState;
use crate::model::{ModelStep, SequenceModel, StepOutput};

/// Execution provider for inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionProvider {
    /// CPU execution using Tract (pure Rust)
    Cpu,
}

/// Configuration for inference engine
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub provider: ExecutionProvider,
    /// Number of threads for CPU execution
    pub num_threads: usize,
    /// Run tract's graph optimizer on load
    pub optimize_graph: bool,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            provider: ExecutionProvider::Cpu,
            num_threads: num_cpus::get(),
            optimize_graph: true,
        }
    }
}

type TractPlan = tract_onnx::prelude::SimplePlan<
    tract_onnx::prelude::TypedFact,
    Box<dyn tract_onnx::prelude::TypedOp>,
    tract_onnx::prelude::Graph<tract_onnx::prelude::TypedFact, Box<dyn tract_onnx::prelude::TypedOp>>,
>;

/// Tract-backed ONNX runner
pub struct InferenceEngine {
    plan: TractPlan,
    config: InferenceConfig,
}

impl InferenceEngine {
    /// Load and prepare an ONNX model
    pub fn new<P: AsRef<Path>>(model_path: P, config: InferenceConfig) -> VrResult<Self> {
        use tract_onnx::prelude::*;

        let path = model_path.as_ref();
        if !path.exists() {
            return Err(VrError::ModelNotFound {
                path: path.display().to_string(),
            });
        }

        log::info!(
            "Using execution provider: {:?} for model {}",
            config.provider,
            path.display()
        );

        let model = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(|e| VrError::ModelLoadFailed { reason: e.to_string() })?;

        let typed = if config.optimize_graph {
            model.into_optimized()
        } else {
            model.into_typed()
        }
        .map_err(|e| VrError::TractError(e.to_string()))?;

        let plan = typed
            .into_runnable()
            .map_err(|e| VrError::TractError(e.to_string()))?;

        Ok(Self { plan, config })
    }

    /// Run inference with f32 input/output
    pub fn run_f32(&self, inputs: Vec<ArrayD<f32>>) -> VrResult<Vec<ArrayD<f32>>> {
        use tract_onnx::prelude::*;

        let tract_inputs: TVec<TValue> = inputs
            .into_iter()
            .map(|arr| {
                let tensor: Tensor = arr.into();
                tensor.into()
            })
            .collect();

        let outputs = self
            .plan
            .run(tract_inputs)
            .map_err(|e| VrError::TractError(e.to_string()))?;

        let mut result = Vec::with_capacity(outputs.len());
        for output in outputs.iter() {
            let view = output
                .to_array_view::<f32>()
                .map_err(|e| VrError::TractError(e.to_string()))?;
            result.push(view.to_owned().into_dyn());
        }

        Ok(result)
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }
}

/// Static description of an exported performance model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub input_size: usize,
    pub output_size: usize,
    /// `None` if the export has no `z` input
    pub latent_size: Option<usize>,
    /// Whether the export has a `graph` input
    #[serde(default = "default_true")]
    pub uses_graph: bool,
}

fn default_true() -> bool {
    true
}

/// [`SequenceModel`] backed by an ONNX export
pub struct OnnxSequenceModel {
    spec: ModelSpec,
    engine: InferenceEngine,
}

impl OnnxSequenceModel {
    pub fn load<P: AsRef<Path>>(path: P, spec: ModelSpec, config: InferenceConfig) -> VrResult<Self> {
        let engine = InferenceEngine::new(path, config)?;
        log::info!(
            "Loaded performance model '{}' ({} -> {}, latent {:?})",
            spec.name,
            spec.input_size,
            spec.output_size,
            spec.latent_size
        );
        Ok(Self { spec, engine })
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn graph_input(&self, graph: Option<&NoteGraph>, num_notes: usize) -> ArrayD<f32> {
        match graph {
            Some(g) => g.adjacency().clone().into_dyn(),
            None => Array3::<f32>::zeros((Relation::COUNT, num_notes, num_notes)).into_dyn(),
        }
    }
}

impl SequenceModel for OnnxSequenceModel {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn input_size(&self) -> usize {
        self.spec.input_size
    }

    fn output_size(&self) -> usize {
        self.spec.output_size
    }

    fn latent_size(&self) -> Option<usize> {
        self.spec.latent_size
    }

    fn forward(&self, step: ModelStep<'_>) -> VrResult<StepOutput> {
        let num_notes = step.num_notes();
        let mut inputs = vec![step.input.to_owned().into_dyn(), step.output_seed.to_owned().into_dyn()];
        if self.spec.uses_graph {
            inputs.push(self.graph_input(step.graph, num_notes));
        }
        if let Some(latent_size) = self.spec.latent_size {
            let z = step.latent.to_vector(latent_size);
            inputs.push(Array2::from_shape_vec((1, latent_size), z)?.into_dyn());
        }

        let mut outputs = self.engine.run_f32(inputs)?.into_iter();

        let prediction = outputs
            .next()
            .ok_or_else(|| VrError::InferenceFailed {
                reason: "No output from model".into(),
            })?
            .into_dimensionality::<Ix3>()
            .map_err(|e| VrError::InvalidOutputShape {
                expected: "[1, notes, features]".into(),
                got: e.to_string(),
            })?;

        let flat = |arr: Option<ArrayD<f32>>| -> Vec<f32> {
            arr.map(|a| a.iter().copied().collect()).unwrap_or_default()
        };
        let state = LatentState {
            mu: flat(outputs.next()),
            var: flat(outputs.next()),
        };

        Ok(StepOutput { prediction, state })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model() {
        let err = InferenceEngine::new("models/does_not_exist.onnx", InferenceConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, VrError::ModelNotFound { .. }));
    }

    #[test]
    fn test_spec_json() {
        let spec: ModelSpec = serde_json::from_str(
            r#"{"name": "trill", "input_size": 89, "output_size": 5, "latent_size": null}"#,
        )
        .unwrap();
        assert!(spec.uses_graph);
        assert_eq!(spec.latent_size, None);
    }
}
