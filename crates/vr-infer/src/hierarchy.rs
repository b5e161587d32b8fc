//! Coarse-to-fine hierarchy helpers
//!
//! A hierarchical render first predicts one row per hierarchy unit (measure
//! or section) and then spans those rows down to the notes of each unit.

use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};

use crate::error::{VrError, VrResult};
use crate::score::NoteLocation;

/// Granularity of the coarse pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyLevel {
    #[default]
    Measure,
    Section,
}

impl HierarchyLevel {
    /// Pick the level from a model code such as `han_measure_note`
    pub fn from_code(code: &str) -> Self {
        if code.contains("measure") {
            HierarchyLevel::Measure
        } else {
            HierarchyLevel::Section
        }
    }

    /// Hierarchy unit of every note
    pub fn indices(&self, note_locations: &[NoteLocation]) -> Vec<usize> {
        note_locations
            .iter()
            .map(|l| match self {
                HierarchyLevel::Measure => l.measure,
                HierarchyLevel::Section => l.section,
            })
            .collect()
    }
}

/// Broadcast coarse rows to notes
///
/// `coarse` is `[1, units, dim]`; note `i` receives the row of unit
/// `hierarchy[i] - hierarchy[0]`, so the first note's unit is row 0. The
/// result is always `[1, num_notes, dim]`. A note whose unit has no coarse row
/// (including one that precedes the first note's unit) is a shape error.
pub fn span_to_notes(
    coarse: ArrayView3<'_, f32>,
    hierarchy: &[usize],
    num_notes: usize,
) -> VrResult<Array3<f32>> {
    if hierarchy.len() != num_notes {
        return Err(VrError::RowCountMismatch {
            what: "hierarchy indices",
            expected: num_notes,
            got: hierarchy.len(),
        });
    }
    if coarse.shape()[0] != 1 {
        return Err(VrError::InvalidInputShape {
            expected: "[1, units, dim]".into(),
            got: format!("{:?}", coarse.shape()),
        });
    }

    let units = coarse.shape()[1];
    let dim = coarse.shape()[2];
    let first = hierarchy.first().copied().unwrap_or(0);
    let mut spanned = Array3::<f32>::zeros((1, num_notes, dim));

    for (note, &unit) in hierarchy.iter().enumerate() {
        let row = unit
            .checked_sub(first)
            .filter(|&r| r < units)
            .ok_or(VrError::SpanOutOfRange {
                note,
                unit,
                available: units,
            })?;

        for f in 0..dim {
            spanned[[0, note, f]] = coarse[[0, row, f]];
        }
    }

    Ok(spanned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coarse(units: usize, dim: usize) -> Array3<f32> {
        Array3::from_shape_fn((1, units, dim), |(_, u, f)| (u * 10 + f) as f32)
    }

    #[test]
    fn test_span_each_note_gets_its_unit() {
        let c = coarse(3, 2);
        let hierarchy = [0, 0, 1, 2, 2, 2];
        let spanned = span_to_notes(c.view(), &hierarchy, 6).unwrap();

        assert_eq!(spanned.shape(), &[1, 6, 2]);
        for (note, &unit) in hierarchy.iter().enumerate() {
            assert_eq!(spanned[[0, note, 0]], (unit * 10) as f32);
            assert_eq!(spanned[[0, note, 1]], (unit * 10 + 1) as f32);
        }
    }

    #[test]
    fn test_span_relative_to_first_unit() {
        let c = coarse(2, 1);
        let spanned = span_to_notes(c.view(), &[4, 5, 5], 3).unwrap();
        assert_eq!(spanned[[0, 0, 0]], 0.0);
        assert_eq!(spanned[[0, 2, 0]], 10.0);
    }

    #[test]
    fn test_span_past_coarse_length_fails() {
        let c = coarse(2, 1);
        let err = span_to_notes(c.view(), &[0, 1, 2], 3).unwrap_err();
        assert!(err.is_shape());
        assert!(matches!(err, VrError::SpanOutOfRange { note: 2, unit: 2, available: 2 }));
    }

    #[test]
    fn test_span_length_mismatch() {
        let c = coarse(2, 1);
        assert!(span_to_notes(c.view(), &[0, 1], 3).unwrap_err().is_shape());
    }

    #[test]
    fn test_level_from_code() {
        assert_eq!(HierarchyLevel::from_code("han_measure"), HierarchyLevel::Measure);
        assert_eq!(HierarchyLevel::from_code("han_section"), HierarchyLevel::Section);

        let locs = [NoteLocation::new(0, 3, 1, 0), NoteLocation::new(1, 4, 1, 0)];
        assert_eq!(HierarchyLevel::Measure.indices(&locs), vec![3, 4]);
        assert_eq!(HierarchyLevel::Section.indices(&locs), vec![1, 1]);
    }
}
