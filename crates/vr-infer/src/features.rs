//! Decoded performance features
//!
//! Joins decoded prediction rows with note locations and hands them to the
//! renderer. No values are changed here.

use std::io::Write;

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::error::{VrError, VrResult};
use crate::score::NoteLocation;

/// Ordered names of the decoded columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub names: Vec<String>,
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::from_names(&[
            "qpm",
            "velocity",
            "xml_deviation",
            "articulation",
            "pedal_refresh_time",
            "pedal_cut_time",
            "pedal_at_start",
            "pedal_at_end",
            "soft_pedal",
            "pedal_refresh",
            "pedal_cut",
            "num_trill",
            "trill_last_note_velocity",
            "trill_first_note_ratio",
            "trill_last_note_ratio",
            "up_trill",
        ])
    }
}

impl FeatureSchema {
    pub fn from_names(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// Derived feature names and the column they read from
const ALIASES: &[(&str, &str)] = &[
    ("beat_tempo", "qpm"),
    ("measure_tempo", "qpm"),
    ("beat_dynamics", "velocity"),
    ("measure_dynamics", "velocity"),
];

/// Performance features of one note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotePerformance {
    pub index: usize,
    pub location: NoteLocation,
    /// `(name, value)` in schema order
    pub values: Vec<(String, f32)>,
}

impl NotePerformance {
    /// Value by name; tempo/dynamics aliases resolve to `qpm`/`velocity`
    pub fn get(&self, name: &str) -> Option<f32> {
        let name = ALIASES
            .iter()
            .find(|(alias, _)| *alias == name)
            .map(|(_, target)| *target)
            .unwrap_or(name);
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn width(&self) -> usize {
        self.values.len()
    }
}

/// Join decoded rows with their note locations, preserving note order
pub fn assemble(
    decoded: ArrayView2<'_, f32>,
    note_locations: &[NoteLocation],
    schema: &FeatureSchema,
) -> VrResult<Vec<NotePerformance>> {
    if decoded.nrows() != note_locations.len() {
        return Err(VrError::RowCountMismatch {
            what: "decoded rows",
            expected: note_locations.len(),
            got: decoded.nrows(),
        });
    }
    if decoded.ncols() != schema.len() {
        return Err(VrError::SchemaMismatch {
            schema: schema.len(),
            decoded: decoded.ncols(),
        });
    }

    Ok(decoded
        .outer_iter()
        .zip(note_locations)
        .enumerate()
        .map(|(index, (row, location))| NotePerformance {
            index,
            location: *location,
            values: schema
                .names
                .iter()
                .cloned()
                .zip(row.iter().copied())
                .collect(),
        })
        .collect())
}

/// Renderer collaborator receiving the finished features
pub trait PerformanceSink {
    fn accept(&mut self, features: &[NotePerformance]) -> VrResult<()>;
}

/// Writes features as a JSON array
pub struct JsonFeatureSink<W: Write> {
    writer: W,
    pretty: bool,
}

impl<W: Write> JsonFeatureSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            pretty: false,
        }
    }

    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> PerformanceSink for JsonFeatureSink<W> {
    fn accept(&mut self, features: &[NotePerformance]) -> VrResult<()> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.writer, features)?;
        } else {
            serde_json::to_writer(&mut self.writer, features)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn locations(n: usize) -> Vec<NoteLocation> {
        (0..n).map(|i| NoteLocation::new(i, i / 2, 0, 1)).collect()
    }

    #[test]
    fn test_assemble_preserves_order() {
        let schema = FeatureSchema::from_names(&["qpm", "velocity"]);
        let decoded = array![[1.0f32, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let notes = assemble(decoded.view(), &locations(3), &schema).unwrap();

        assert_eq!(notes.len(), 3);
        assert_eq!(notes[2].index, 2);
        assert_eq!(notes[2].location.measure, 1);
        assert_eq!(notes[1].get("velocity"), Some(4.0));
        assert_eq!(notes[1].get("beat_tempo"), Some(3.0));
        assert_eq!(notes[0].get("measure_dynamics"), Some(2.0));
        assert_eq!(notes[0].get("missing"), None);
    }

    #[test]
    fn test_assemble_mismatches() {
        let schema = FeatureSchema::from_names(&["qpm"]);
        let decoded = array![[1.0f32, 2.0]];
        let err = assemble(decoded.view(), &locations(1), &schema).unwrap_err();
        assert!(err.is_configuration());

        let decoded = array![[1.0f32]];
        let err = assemble(decoded.view(), &locations(2), &schema).unwrap_err();
        assert!(err.is_shape());
    }

    #[test]
    fn test_default_schema() {
        let schema = FeatureSchema::default();
        assert_eq!(schema.len(), 16);
        assert_eq!(schema.position("num_trill"), Some(11));
        assert_eq!(schema.position("up_trill"), Some(15));
    }

    #[test]
    fn test_json_sink() {
        let schema = FeatureSchema::from_names(&["qpm"]);
        let decoded = array![[0.5f32]];
        let notes = assemble(decoded.view(), &locations(1), &schema).unwrap();

        let mut sink = JsonFeatureSink::new(Vec::new());
        sink.accept(&notes).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();

        let parsed: Vec<NotePerformance> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, notes);
    }
}
