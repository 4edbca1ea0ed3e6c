//! RFox Visual
//!
//! Region-masked visual regression checks on top of a headless browser.
//! Two HTML documents (a checked-in baseline and a freshly generated one) are
//! rendered at a set of viewports, a target element is clipped out of each,
//! volatile content is masked, and the two captures are compared pixel by
//! pixel against a failure threshold.
//!
//! # Features
//!
//! - **CDP Backend** (default): drives headless Chrome through the DevTools Protocol
//! - **Pluggable surfaces**: every step talks to a [`Surface`], so checks can run
//!   against any backend that can navigate, evaluate script and capture a clip
//! - **Pixelmatch / SSIM comparison** with size alignment and diff artifacts
//!
//! # Example
//!
//! ```no_run
//! use rfvisual::{check, CheckConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CheckConfig {
//!     expected: "tests/expected/top.html".into(),
//!     actual: "docs/top.html".into(),
//!     ..Default::default()
//! };
//!
//! let report = check::run_suite(&config, rfvisual::new_surface)?;
//! for (name, outcome) in &report.cases {
//!     println!("{}: {}", name, if outcome.is_ok() { "pass" } else { "FAIL" });
//! }
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Error, Result};

pub mod check;
pub mod clip;
pub mod compare;
pub mod config;
pub mod mask;
pub mod snapshot;

pub use check::{CaseReport, SuiteReport};
pub use clip::ClipRect;
pub use compare::{CompareOptions, Comparison, ComparisonMethod, ThresholdType};
pub use config::CheckConfig;
pub use mask::MaskStyle;
pub use snapshot::{Capture, SnapshotDir};

#[cfg(feature = "cdp")]
pub mod cdp;

// Concurrent suite runner (one worker thread per viewport case)
pub mod async_api;

/// Viewport dimensions in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 768,
            height: 100,
        }
    }
}

/// One viewport configuration run through the check state machine.
///
/// `name` keys the files written for the case (`{name}_expected.png`,
/// `{name}_actual.png`, `{name}_expected-diff.png`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewportCase {
    pub name: String,
    pub viewport: Viewport,
}

impl ViewportCase {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            viewport: Viewport { width, height },
        }
    }

    /// The pair of cases straddling the 768px layout breakpoint.
    pub fn breakpoint_pair() -> Vec<Self> {
        vec![Self::new("large", 768, 100), Self::new("small", 767, 100)]
    }
}

/// Configuration used to launch a rendering surface for a single case
#[derive(Debug, Clone)]
pub struct SurfaceConfig {
    /// Viewport the surface renders at
    pub viewport: Viewport,
    /// Timeout for navigation and protocol calls in milliseconds
    pub timeout_ms: u64,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            timeout_ms: 30000,
        }
    }
}

/// A live rendering surface (one browser page) owned by a single case.
pub trait Surface {
    /// Viewport this surface renders at
    fn viewport(&self) -> Viewport;

    /// Navigate to a URL and wait for the load to complete
    fn navigate(&mut self, url: &str) -> Result<()>;

    /// Evaluate JavaScript in the page's global context and return its value
    fn evaluate(&mut self, script: &str) -> Result<serde_json::Value>;

    /// Capture a PNG of the given page-coordinate rectangle
    fn capture_png(&mut self, clip: &ClipRect) -> Result<Vec<u8>>;

    /// Close the surface and release its resources
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// Launch a rendering surface with the default backend
#[cfg(feature = "cdp")]
pub fn new_surface(config: &SurfaceConfig) -> Result<cdp::CdpSurface> {
    cdp::CdpSurface::launch(config)
}
