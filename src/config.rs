//! Check configuration
//!
//! Every knob of a check lives in [`CheckConfig`]. The defaults reproduce the
//! stock article-list check: two documents, a 768px breakpoint pair, the
//! article thumbnail masked, and a 5% pixelmatch tolerance. A JSON file may
//! override any subset of fields.

use crate::{CompareOptions, Error, MaskStyle, Result, SurfaceConfig, ThresholdType, ViewportCase};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for a visual regression check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// Checked-in baseline document
    pub expected: PathBuf,
    /// Freshly generated document under test
    pub actual: PathBuf,
    /// Where captures and diff images are written
    pub snapshots_dir: PathBuf,
    /// Selector of the element whose bounding box is captured
    pub target_selector: String,
    /// Selector of volatile elements to mask, if any
    pub mask_selector: Option<String>,
    pub mask_style: MaskStyle,
    /// Delay after the baseline navigation before masking and capture
    pub settle_ms: u64,
    /// Navigation / protocol timeout handed to each surface
    pub timeout_ms: u64,
    pub cases: Vec<ViewportCase>,
    pub compare: CompareOptions,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            expected: PathBuf::from("tests/expected/top.html"),
            actual: PathBuf::from("docs/top.html"),
            snapshots_dir: PathBuf::from("tests/snapshots"),
            target_selector: r#"[data-test="article-list"]"#.to_string(),
            mask_selector: Some("[src$='article_thumbnail.png']".to_string()),
            mask_style: MaskStyle::default(),
            settle_ms: 100,
            timeout_ms: 30000,
            cases: ViewportCase::breakpoint_pair(),
            compare: CompareOptions::default(),
        }
    }
}

impl CheckConfig {
    /// Load a configuration from a JSON file; missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::env(path, e))?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| Error::ConfigError(format!("Malformed config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot produce a meaningful check.
    pub fn validate(&self) -> Result<()> {
        if self.target_selector.trim().is_empty() {
            return Err(Error::ConfigError("target_selector must not be empty".into()));
        }
        if let Some(sel) = &self.mask_selector {
            if sel.trim().is_empty() {
                return Err(Error::ConfigError("mask_selector must not be empty when set".into()));
            }
        }
        if self.mask_style.filter.trim().is_empty() {
            return Err(Error::ConfigError("mask_style must not be empty".into()));
        }
        if self.cases.is_empty() {
            return Err(Error::ConfigError("at least one viewport case is required".into()));
        }

        let mut names = HashSet::new();
        for case in &self.cases {
            if case.name.trim().is_empty() {
                return Err(Error::ConfigError("viewport case names must not be empty".into()));
            }
            if !names.insert(case.name.as_str()) {
                return Err(Error::ConfigError(format!("duplicate viewport case `{}`", case.name)));
            }
            if case.viewport.width == 0 || case.viewport.height == 0 {
                return Err(Error::ConfigError(format!(
                    "viewport case `{}` has a zero dimension",
                    case.name
                )));
            }
        }

        let cmp = &self.compare;
        if !cmp.failure_threshold.is_finite() || cmp.failure_threshold < 0.0 {
            return Err(Error::ConfigError(format!(
                "failure_threshold must be a non-negative number, got {}",
                cmp.failure_threshold
            )));
        }
        if cmp.failure_threshold_type == ThresholdType::Percent && cmp.failure_threshold > 1.0 {
            return Err(Error::ConfigError(format!(
                "percent failure_threshold is a ratio in 0.0-1.0, got {}",
                cmp.failure_threshold
            )));
        }
        if !(0.0..=1.0).contains(&cmp.pixel_threshold) {
            return Err(Error::ConfigError(format!(
                "pixel_threshold must be in 0.0-1.0, got {}",
                cmp.pixel_threshold
            )));
        }
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Surface configuration for one case
    pub fn surface_config(&self, case: &ViewportCase) -> SurfaceConfig {
        SurfaceConfig {
            viewport: case.viewport,
            timeout_ms: self.timeout_ms,
        }
    }
}
