//! Render configuration and process-wide assets

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::decode::{BinTable, ContinuousLayout, LossType, NormalizationStats};
use crate::error::{VrError, VrResult};
use crate::features::FeatureSchema;
use crate::hierarchy::HierarchyLevel;
use crate::runner::Slicing;

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Coarse pass granularity; `None` renders with the main model only
    pub hierarchy: Option<HierarchyLevel>,

    /// Decoding scheme for the combined prediction
    pub loss_type: LossType,

    /// Windowing for note-level passes
    pub slicing: Slicing,

    /// Input column shifted by `StyleCondition::qpm_change`
    pub qpm_primo_index: usize,

    /// Column map for continuous decoding
    pub continuous_layout: ContinuousLayout,

    /// Names of the decoded columns
    pub schema: FeatureSchema,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            hierarchy: None,
            loss_type: LossType::Mse,
            slicing: Slicing::default(),
            qpm_primo_index: 0,
            continuous_layout: ContinuousLayout::default(),
            schema: FeatureSchema::default(),
        }
    }
}

impl RenderConfig {
    /// Hierarchical attention setup (measure-level coarse pass)
    pub fn hierarchical(level: HierarchyLevel) -> Self {
        Self {
            hierarchy: Some(level),
            ..Default::default()
        }
    }

    /// Configuration for bin-classification models
    pub fn classification() -> Self {
        Self {
            loss_type: LossType::CrossEntropy,
            ..Default::default()
        }
    }

    pub fn with_slicing(mut self, slicing: Slicing) -> Self {
        self.slicing = slicing;
        self
    }

    /// Slicing for the coarse pass; section units may straddle measure cuts
    pub fn coarse_slicing(&self) -> Slicing {
        match self.hierarchy {
            Some(HierarchyLevel::Section) => Slicing::Whole,
            _ => self.slicing,
        }
    }

    pub fn validate(&self) -> VrResult<()> {
        if let Slicing::ByMeasure { steps: 0 } = self.slicing {
            return Err(VrError::InvalidConfig("slicing window must hold at least one note".into()));
        }
        if self.schema.is_empty() {
            return Err(VrError::InvalidConfig("feature schema is empty".into()));
        }
        Ok(())
    }
}

/// Configuration plus normalization and bin tables, loaded once and shared
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub config: RenderConfig,
    pub stats: NormalizationStats,
    pub bins: BinTable,
}

impl RenderContext {
    pub const CONFIG_FILE: &'static str = "render.json";
    pub const STATS_FILE: &'static str = "stats.json";
    pub const BINS_FILE: &'static str = "bins.json";

    pub fn new(config: RenderConfig, stats: NormalizationStats, bins: BinTable) -> VrResult<Self> {
        config.validate()?;
        if config.loss_type == LossType::CrossEntropy {
            bins.validate()?;
        }
        Ok(Self { config, stats, bins })
    }

    /// Load `render.json`, `stats.json` and `bins.json` from `dir`
    ///
    /// A missing `render.json` falls back to the default configuration; a
    /// missing `bins.json` is only accepted for MSE models.
    pub fn load<P: AsRef<Path>>(dir: P) -> VrResult<Self> {
        let dir = dir.as_ref();

        let config_path = dir.join(Self::CONFIG_FILE);
        let config: RenderConfig = if config_path.exists() {
            read_json(&config_path)?
        } else {
            log::info!("No {} in {}, using defaults", Self::CONFIG_FILE, dir.display());
            RenderConfig::default()
        };

        let stats: NormalizationStats = read_json(&dir.join(Self::STATS_FILE))?;

        let bins_path = dir.join(Self::BINS_FILE);
        let bins: BinTable = if bins_path.exists() || config.loss_type == LossType::CrossEntropy {
            read_json(&bins_path)?
        } else {
            BinTable::default()
        };

        log::info!(
            "Loaded render context from {}: loss {:?}, hierarchy {:?}, {} stat groups, {} binned features",
            dir.display(),
            config.loss_type,
            config.hierarchy,
            stats.means.len(),
            bins.num_features()
        );

        Self::new(config, stats, bins)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> VrResult<T> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RenderConfig::default();
        assert!(config.hierarchy.is_none());
        assert_eq!(config.loss_type, LossType::Mse);
        assert_eq!(config.schema.len(), 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config: RenderConfig =
            serde_json::from_str(r#"{"hierarchy": "section", "loss_type": "CE", "slicing": "whole"}"#).unwrap();
        assert_eq!(config.hierarchy, Some(HierarchyLevel::Section));
        assert_eq!(config.loss_type, LossType::CrossEntropy);
        assert_eq!(config.slicing, Slicing::Whole);
        assert_eq!(config.continuous_layout, ContinuousLayout::default());
    }

    #[test]
    fn test_section_coarse_pass_unsliced() {
        let config = RenderConfig::hierarchical(HierarchyLevel::Section);
        assert_eq!(config.coarse_slicing(), Slicing::Whole);
        let config = RenderConfig::hierarchical(HierarchyLevel::Measure);
        assert_eq!(config.coarse_slicing(), config.slicing);
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = RenderConfig::default().with_slicing(Slicing::ByMeasure { steps: 0 });
        assert!(config.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn test_load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(RenderContext::STATS_FILE),
            r#"{"means": [[0.0], [1.0]], "stds": [[1.0], [2.0]]}"#,
        )
        .unwrap();

        let ctx = RenderContext::load(dir.path()).unwrap();
        assert_eq!(ctx.config, RenderConfig::default());
        assert_eq!(ctx.stats.stds[1][0], 2.0);
        assert_eq!(ctx.bins.num_features(), 0);
    }

    #[test]
    fn test_load_ce_requires_bins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(RenderContext::CONFIG_FILE), r#"{"loss_type": "CE"}"#).unwrap();
        std::fs::write(
            dir.path().join(RenderContext::STATS_FILE),
            r#"{"means": [], "stds": []}"#,
        )
        .unwrap();

        let err = RenderContext::load(dir.path()).unwrap_err();
        assert!(matches!(err, VrError::IoError(_)));
    }
}
