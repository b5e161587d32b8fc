//! Note relationship graph
//!
//! Edges from the score extractor become a dense typed adjacency tensor
//! `[relations, notes, notes]`. Symmetric relations fill both directions,
//! directed ones only `from -> to`.

use ndarray::{s, Array3};
use serde::{Deserialize, Serialize};

use crate::error::{VrError, VrResult};

/// Musical relation between two notes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Notes sounding at the same onset
    Onset,
    /// Next onset in time
    Forward,
    /// Sustained note over following onsets
    Melisma,
    /// Next onset after a rest
    Rest,
    /// Next note in the same voice
    Voice,
    /// Under the same slur
    Slur,
    /// Within the same beat
    Beat,
    /// Last note before a section/phrase boundary to the first after it
    Boundary,
    /// Closest note in a different voice
    Closest,
}

impl Relation {
    /// All relations, in channel order
    pub fn all() -> &'static [Relation] {
        &[
            Relation::Onset,
            Relation::Forward,
            Relation::Melisma,
            Relation::Rest,
            Relation::Voice,
            Relation::Slur,
            Relation::Beat,
            Relation::Boundary,
            Relation::Closest,
        ]
    }

    pub const COUNT: usize = 9;

    /// Channel index in the adjacency tensor
    pub fn channel(&self) -> usize {
        match self {
            Relation::Onset => 0,
            Relation::Forward => 1,
            Relation::Melisma => 2,
            Relation::Rest => 3,
            Relation::Voice => 4,
            Relation::Slur => 5,
            Relation::Beat => 6,
            Relation::Boundary => 7,
            Relation::Closest => 8,
        }
    }

    /// Whether `a ~ b` implies `b ~ a`
    pub fn is_symmetric(&self) -> bool {
        matches!(self, Relation::Onset | Relation::Slur | Relation::Beat)
    }
}

/// One relationship edge between two notes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: i64,
    pub to: i64,
    pub relation: Relation,
}

impl Edge {
    pub fn new(from: i64, to: i64, relation: Relation) -> Self {
        Self { from, to, relation }
    }
}

/// Dense typed adjacency `[Relation::COUNT, N, N]`
#[derive(Debug, Clone, PartialEq)]
pub struct NoteGraph {
    adjacency: Array3<f32>,
}

impl NoteGraph {
    /// Build the adjacency tensor for `num_notes` notes
    ///
    /// Any endpoint outside `0..num_notes` fails the whole build.
    pub fn from_edges(edges: &[Edge], num_notes: usize) -> VrResult<Self> {
        let mut adjacency = Array3::<f32>::zeros((Relation::COUNT, num_notes, num_notes));

        for edge in edges {
            let (from, to) = match (Self::index(edge.from, num_notes), Self::index(edge.to, num_notes)) {
                (Some(from), Some(to)) => (from, to),
                _ => {
                    return Err(VrError::EdgeOutOfRange {
                        from: edge.from,
                        to: edge.to,
                        num_notes,
                    });
                }
            };

            let channel = edge.relation.channel();
            adjacency[[channel, from, to]] = 1.0;
            if edge.relation.is_symmetric() {
                adjacency[[channel, to, from]] = 1.0;
            }
        }

        log::debug!(
            "Built note graph: {} notes, {} edges",
            num_notes,
            edges.len()
        );

        Ok(Self { adjacency })
    }

    fn index(value: i64, num_notes: usize) -> Option<usize> {
        usize::try_from(value).ok().filter(|&i| i < num_notes)
    }

    pub fn num_notes(&self) -> usize {
        self.adjacency.shape()[1]
    }

    pub fn adjacency(&self) -> &Array3<f32> {
        &self.adjacency
    }

    pub fn has_edge(&self, relation: Relation, from: usize, to: usize) -> bool {
        self.adjacency
            .get([relation.channel(), from, to])
            .is_some_and(|&v| v != 0.0)
    }

    /// Number of set entries across all relations
    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().filter(|&&v| v != 0.0).count()
    }

    /// Sub-graph over notes `start..end`; edges leaving the window are dropped
    pub fn window(&self, start: usize, end: usize) -> NoteGraph {
        let end = end.min(self.num_notes());
        let start = start.min(end);
        NoteGraph {
            adjacency: self.adjacency.slice(s![.., start..end, start..end]).to_owned(),
        }
    }
}
