//! Stepwise model runner
//!
//! Long scores are fed to the model in windows that end on measure
//! boundaries, then the window predictions are stitched back together along
//! the note axis. Windows never overlap.

use ndarray::{s, Array3, ArrayView3};
use serde::{Deserialize, Serialize};

use crate::buffer::{concat_notes, expect_shape};
use crate::error::{VrError, VrResult};
use crate::graph::NoteGraph;
use crate::latent::{LatentCode, LatentState};
use crate::model::{ModelStep, SequenceModel};
use crate::score::NoteLocation;

/// How the note sequence is split into model windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slicing {
    /// One window over the whole score
    Whole,
    /// Windows of at most `steps` notes, cut at measure boundaries
    ByMeasure { steps: usize },
}

impl Default for Slicing {
    fn default() -> Self {
        Slicing::ByMeasure { steps: 3000 }
    }
}

impl Slicing {
    /// `(start, end)` note ranges covering `0..num_notes` in order
    ///
    /// A single measure longer than `steps` stays in one window.
    pub fn windows(&self, measures: &[usize]) -> Vec<(usize, usize)> {
        let num_notes = measures.len();
        let steps = match *self {
            Slicing::Whole => return vec![(0, num_notes)],
            Slicing::ByMeasure { steps } => steps.max(1),
        };

        let mut windows = Vec::new();
        let mut start = 0;
        while start < num_notes {
            if num_notes - start <= steps {
                windows.push((start, num_notes));
                break;
            }

            // Back up to the first note of the measure that would be split
            let mut end = start + steps;
            while end > start && measures[end - 1] == measures[end] {
                end -= 1;
            }
            if end == start {
                end = start + steps;
                while end < num_notes && measures[end] == measures[start] {
                    end += 1;
                }
            }

            windows.push((start, end));
            start = end;
        }
        windows
    }
}

/// Run `model` over the whole sequence, window by window
///
/// `input` must be `[1, N, model.input_size()]` and `output_seed`
/// `[1, N, model.output_size()]`. Returns the stitched prediction and the
/// per-window latent state, which is only meaningful for this call.
pub fn run_model_in_steps(
    model: &dyn SequenceModel,
    input: ArrayView3<'_, f32>,
    output_seed: ArrayView3<'_, f32>,
    graph: Option<&NoteGraph>,
    note_locations: &[NoteLocation],
    latent: &LatentCode,
    slicing: Slicing,
) -> VrResult<(Array3<f32>, Vec<LatentState>)> {
    let num_notes = input.shape().get(1).copied().unwrap_or(0);
    expect_shape(&input, num_notes, model.input_size(), true)?;
    expect_shape(&output_seed, num_notes, model.output_size(), true)?;
    if note_locations.len() != num_notes {
        return Err(VrError::RowCountMismatch {
            what: "note locations",
            expected: num_notes,
            got: note_locations.len(),
        });
    }
    if let Some(graph) = graph {
        if graph.num_notes() != num_notes {
            return Err(VrError::RowCountMismatch {
                what: "graph nodes",
                expected: num_notes,
                got: graph.num_notes(),
            });
        }
    }
    latent.check(model.name(), model.latent_size())?;

    let measures: Vec<usize> = note_locations.iter().map(|l| l.measure).collect();
    let windows = slicing.windows(&measures);

    log::debug!(
        "Running '{}' over {} notes in {} window(s)",
        model.name(),
        num_notes,
        windows.len()
    );

    let mut outputs = Vec::with_capacity(windows.len());
    let mut states = Vec::with_capacity(windows.len());

    for (start, end) in windows {
        let window_graph = graph.map(|g| g.window(start, end));
        let step = ModelStep {
            input: input.slice(s![.., start..end, ..]),
            output_seed: output_seed.slice(s![.., start..end, ..]),
            graph: window_graph.as_ref(),
            note_locations,
            start,
            latent,
        };

        let out = model.forward(step)?;
        let shape = out.prediction.shape();
        if shape[0] != 1 || shape[2] != model.output_size() {
            return Err(VrError::InvalidOutputShape {
                expected: format!("[1, _, {}] from '{}'", model.output_size(), model.name()),
                got: format!("{:?}", shape),
            });
        }

        outputs.push(out.prediction);
        states.push(out.state);
    }

    if outputs.is_empty() {
        return Ok((Array3::zeros((1, 0, model.output_size())), states));
    }

    Ok((concat_notes(&outputs)?, states))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::zero_output;
    use crate::model::StepOutput;
    use std::sync::Mutex;

    /// Echoes the window start into every output cell and records windows
    struct WindowProbe {
        calls: Mutex<Vec<(usize, usize)>>,
    }

    impl SequenceModel for WindowProbe {
        fn name(&self) -> &str {
            "probe"
        }
        fn input_size(&self) -> usize {
            2
        }
        fn output_size(&self) -> usize {
            3
        }
        fn latent_size(&self) -> Option<usize> {
            Some(1)
        }
        fn forward(&self, step: ModelStep<'_>) -> VrResult<StepOutput> {
            let n = step.num_notes();
            self.calls.lock().unwrap().push((step.start, n));
            assert_eq!(step.graph.map(|g| g.num_notes()), Some(n));
            Ok(StepOutput {
                prediction: Array3::from_elem((1, n, 3), step.start as f32),
                state: LatentState::default(),
            })
        }
    }

    fn locations(measures: &[usize]) -> Vec<NoteLocation> {
        measures
            .iter()
            .map(|&m| NoteLocation::new(0, m, 0, 0))
            .collect()
    }

    #[test]
    fn test_windows_cut_at_measures() {
        let measures = [0, 0, 1, 1, 1, 2, 2, 3];
        let windows = Slicing::ByMeasure { steps: 4 }.windows(&measures);
        assert_eq!(windows, vec![(0, 2), (2, 5), (5, 8)]);
    }

    #[test]
    fn test_windows_cover_all_notes() {
        let measures: Vec<usize> = (0..100).map(|i| i / 3).collect();
        let windows = Slicing::ByMeasure { steps: 10 }.windows(&measures);

        assert_eq!(windows.first().map(|w| w.0), Some(0));
        assert_eq!(windows.last().map(|w| w.1), Some(100));
        for pair in windows.windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
            assert_ne!(measures[pair[1].0 - 1], measures[pair[1].0]);
        }
    }

    #[test]
    fn test_long_measure_kept_whole() {
        let measures = [0, 0, 0, 0, 0, 1];
        let windows = Slicing::ByMeasure { steps: 2 }.windows(&measures);
        assert_eq!(windows, vec![(0, 5), (5, 6)]);
    }

    #[test]
    fn test_whole_and_empty() {
        assert_eq!(Slicing::Whole.windows(&[0, 1, 2]), vec![(0, 3)]);
        assert!(Slicing::ByMeasure { steps: 4 }.windows(&[]).is_empty());
    }

    #[test]
    fn test_run_stitches_windows() {
        let model = WindowProbe {
            calls: Mutex::new(Vec::new()),
        };
        let locs = locations(&[0, 0, 1, 1, 2]);
        let input = zero_output(5, 2);
        let seed = zero_output(5, 3);
        let graph = NoteGraph::from_edges(&[], 5).unwrap();

        let (pred, states) = run_model_in_steps(
            &model,
            input.view(),
            seed.view(),
            Some(&graph),
            &locs,
            &LatentCode::Zero,
            Slicing::ByMeasure { steps: 2 },
        )
        .unwrap();

        assert_eq!(pred.shape(), &[1, 5, 3]);
        assert_eq!(states.len(), 3);
        assert_eq!(*model.calls.lock().unwrap(), vec![(0, 2), (2, 2), (4, 1)]);
        assert_eq!(pred[[0, 3, 0]], 2.0);
        assert_eq!(pred[[0, 4, 2]], 4.0);
    }

    #[test]
    fn test_run_rejects_bad_seed() {
        let model = WindowProbe {
            calls: Mutex::new(Vec::new()),
        };
        let locs = locations(&[0, 0]);
        let input = zero_output(2, 2);
        let seed = zero_output(2, 4);

        let err = run_model_in_steps(
            &model,
            input.view(),
            seed.view(),
            None,
            &locs,
            &LatentCode::Zero,
            Slicing::Whole,
        )
        .unwrap_err();
        assert!(err.is_shape());
        assert!(model.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_run_rejects_latent_size() {
        let model = WindowProbe {
            calls: Mutex::new(Vec::new()),
        };
        let locs = locations(&[0]);
        let input = zero_output(1, 2);
        let seed = zero_output(1, 3);

        let err = run_model_in_steps(
            &model,
            input.view(),
            seed.view(),
            None,
            &locs,
            &LatentCode::Single(vec![0.0, 0.0]),
            Slicing::Whole,
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }
}
