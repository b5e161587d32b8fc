//! Score → performance features
//!
//! One call renders one score end to end:
//! 1. build the note graph
//! 2. main prediction, either directly or coarse pass → span → fine pass
//! 3. trill prediction conditioned on input + main prediction
//! 4. decode and attach note locations
//!
//! Any failure aborts the score; nothing partial is returned.

use ndarray::{Array2, Array3, ArrayView3};

use crate::buffer::{concat_features, expect_shape, zero_output};
use crate::config::RenderContext;
use crate::decode::OutputDecoder;
use crate::error::{VrError, VrResult};
use crate::features::{assemble, NotePerformance, PerformanceSink};
use crate::graph::NoteGraph;
use crate::hierarchy::{span_to_notes, HierarchyLevel};
use crate::latent::{LatentCode, StyleCondition};
use crate::model::SequenceModel;
use crate::runner::run_model_in_steps;
use crate::score::{NoteLocation, ScoreInput};

/// Models used by a render
#[derive(Clone, Copy)]
pub struct ModelSet<'a> {
    /// Note-level model (the fine model in hierarchical mode)
    pub main: &'a dyn SequenceModel,
    /// Ornamentation model
    pub trill: &'a dyn SequenceModel,
    /// Coarse model, required when the config enables a hierarchy
    pub coarse: Option<&'a dyn SequenceModel>,
}

/// Raw tensors of one render, before decoding
#[derive(Debug, Clone)]
pub struct RawPerformance {
    /// `[1, N, main_out + trill_out]`
    pub prediction: Array3<f32>,
    /// Width of the main prediction inside `prediction`
    pub main_width: usize,
}

/// Inference pipeline bound to shared assets and models
pub struct PerformanceRenderer<'a> {
    context: &'a RenderContext,
    models: ModelSet<'a>,
}

impl<'a> PerformanceRenderer<'a> {
    /// Check model dimensions against each other and the config
    pub fn new(context: &'a RenderContext, models: ModelSet<'a>) -> VrResult<Self> {
        let main_input = match (context.config.hierarchy, models.coarse) {
            (Some(_), Some(coarse)) => {
                let expected = coarse.input_size() + coarse.output_size();
                if models.main.input_size() != expected {
                    return Err(VrError::ModelDimensionMismatch {
                        model: models.main.name().to_string(),
                        what: "input size (score + coarse output)",
                        expected,
                        got: models.main.input_size(),
                    });
                }
                coarse.input_size()
            }
            (Some(level), None) => {
                return Err(VrError::InvalidConfig(format!(
                    "{:?} hierarchy requires a coarse model",
                    level
                )));
            }
            (None, _) => models.main.input_size(),
        };

        let expected = main_input + models.main.output_size();
        if models.trill.input_size() != expected {
            return Err(VrError::ModelDimensionMismatch {
                model: models.trill.name().to_string(),
                what: "input size (score + main output)",
                expected,
                got: models.trill.input_size(),
            });
        }

        Ok(Self { context, models })
    }

    /// Feature width expected from the score extractor
    pub fn input_size(&self) -> usize {
        match (self.context.config.hierarchy, self.models.coarse) {
            (Some(_), Some(coarse)) => coarse.input_size(),
            _ => self.models.main.input_size(),
        }
    }

    /// Render a score to decoded per-note performance features
    pub fn render(&self, score: &ScoreInput, style: &StyleCondition) -> VrResult<Vec<NotePerformance>> {
        let raw = self.predict(score, style)?;
        self.decode(&raw, &score.note_locations)
    }

    /// Render and hand the result to `sink`
    pub fn render_into(
        &self,
        score: &ScoreInput,
        style: &StyleCondition,
        sink: &mut dyn PerformanceSink,
    ) -> VrResult<usize> {
        let features = self.render(score, style)?;
        sink.accept(&features)?;
        Ok(features.len())
    }

    /// Run all model passes and return the combined raw prediction
    pub fn predict(&self, score: &ScoreInput, style: &StyleCondition) -> VrResult<RawPerformance> {
        let config = &self.context.config;
        let num_notes = score.num_notes();
        let _span = tracing::info_span!("render", notes = num_notes, label = ?style.label).entered();

        if score.features.feature_dim() != self.input_size() {
            return Err(VrError::ModelDimensionMismatch {
                model: self.models.main.name().to_string(),
                what: "score feature width",
                expected: self.input_size(),
                got: score.features.feature_dim(),
            });
        }
        if score.note_locations.len() != num_notes {
            return Err(VrError::RowCountMismatch {
                what: "note locations",
                expected: num_notes,
                got: score.note_locations.len(),
            });
        }

        let offset = style.qpm_change.map(|delta| (config.qpm_primo_index, delta));
        let input = score.features.to_batch(offset)?;
        let graph = NoteGraph::from_edges(&score.edges, num_notes)?;

        log::info!(
            "Rendering {} notes ({} edges, hierarchy {:?})",
            num_notes,
            score.edges.len(),
            config.hierarchy
        );

        let main = match (config.hierarchy, self.models.coarse) {
            (Some(level), Some(coarse)) => {
                self.hierarchical_pass(coarse, level, &input, &graph, &score.note_locations, &style.latent)?
            }
            _ => {
                let latent = style.latent.flatten();
                self.note_pass(self.models.main, input.view(), &graph, &score.note_locations, &latent)?
            }
        };

        // The trill model sees the score features, not the coarse-augmented input
        let trill = self.trill_pass(&input, &main, &graph, &score.note_locations)?;

        let prediction = concat_features(&main.view(), &trill.view())?;
        Ok(RawPerformance {
            main_width: main.shape()[2],
            prediction,
        })
    }

    /// Decode a raw prediction and attach note locations
    pub fn decode(&self, raw: &RawPerformance, note_locations: &[NoteLocation]) -> VrResult<Vec<NotePerformance>> {
        let config = &self.context.config;
        let decoder = OutputDecoder::new(
            config.loss_type,
            &self.context.stats,
            &self.context.bins,
            config.continuous_layout,
        );
        let decoded: Array2<f32> = decoder.decode(raw.prediction.view())?;
        assemble(decoded.view(), note_locations, &config.schema)
    }

    /// Coarse pass, span to notes, then the fine pass on `[input | spanned]`
    fn hierarchical_pass(
        &self,
        coarse: &dyn SequenceModel,
        level: HierarchyLevel,
        input: &Array3<f32>,
        graph: &NoteGraph,
        note_locations: &[NoteLocation],
        latent: &LatentCode,
    ) -> VrResult<Array3<f32>> {
        let num_notes = note_locations.len();
        let (coarse_z, fine_z) = latent.split_hierarchical();

        let coarse_pred = {
            let _span = tracing::debug_span!("coarse_pass", model = coarse.name()).entered();
            let seed = zero_output(num_notes, coarse.output_size());
            let (pred, _) = run_model_in_steps(
                coarse,
                input.view(),
                seed.view(),
                Some(graph),
                note_locations,
                &coarse_z,
                self.context.config.coarse_slicing(),
            )?;
            pred
        };

        let hierarchy = level.indices(note_locations);
        let spanned = span_to_notes(coarse_pred.view(), &hierarchy, num_notes)?;
        expect_shape(&spanned.view(), num_notes, coarse.output_size(), false)?;
        log::debug!(
            "Spanned {} {:?} rows onto {} notes",
            coarse_pred.shape()[1],
            level,
            num_notes
        );

        let fine_input = concat_features(&input.view(), &spanned.view())?;
        self.note_pass(self.models.main, fine_input.view(), graph, note_locations, &fine_z)
    }

    /// Trill model on `[input | main]` with no latent code
    fn trill_pass(
        &self,
        input: &Array3<f32>,
        main: &Array3<f32>,
        graph: &NoteGraph,
        note_locations: &[NoteLocation],
    ) -> VrResult<Array3<f32>> {
        let _span = tracing::debug_span!("trill_pass", model = self.models.trill.name()).entered();
        let trill_input = concat_features(&input.view(), &main.view())?;
        self.note_pass(self.models.trill, trill_input.view(), graph, note_locations, &LatentCode::Zero)
    }

    /// Note-level model run; the result must have exactly one row per note
    fn note_pass(
        &self,
        model: &dyn SequenceModel,
        input: ArrayView3<'_, f32>,
        graph: &NoteGraph,
        note_locations: &[NoteLocation],
        latent: &LatentCode,
    ) -> VrResult<Array3<f32>> {
        let num_notes = note_locations.len();
        let seed = zero_output(num_notes, model.output_size());
        let (pred, states) = run_model_in_steps(
            model,
            input,
            seed.view(),
            Some(graph),
            note_locations,
            latent,
            self.context.config.slicing,
        )?;
        expect_shape(&pred.view(), num_notes, model.output_size(), false)?;
        log::debug!("'{}' predicted {} notes in {} window(s)", model.name(), num_notes, states.len());
        Ok(pred)
    }
}
