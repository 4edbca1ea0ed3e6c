//! Region clipping: resolve the target element's bounding box in the live page

use crate::{Error, Result, Surface};
use log::debug;
use serde::{Deserialize, Serialize};

/// A clip rectangle in page coordinates (CSS pixels)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ClipRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Whether the rectangle covers no pixels
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Build the script that reports the bounding box of the first element
/// matching `selector`.
///
/// The page answers `[top, left, width, height]`, or `null` when nothing
/// matches. The selector is embedded as a JSON string literal.
pub fn bounding_box_script(selector: &str) -> String {
    let literal = serde_json::Value::String(selector.to_string()).to_string();
    format!(
        "(function(){{const el=document.querySelector({});if(!el)return null;const r=el.getBoundingClientRect();return [r.top,r.left,r.width,r.height];}})()",
        literal
    )
}

/// Turn the page's answer to [`bounding_box_script`] into a [`ClipRect`].
pub fn parse_bounding_box(selector: &str, value: &serde_json::Value) -> Result<ClipRect> {
    if value.is_null() {
        return Err(Error::TargetNotFound(selector.to_string()));
    }

    let parts = value
        .as_array()
        .filter(|a| a.len() == 4)
        .ok_or_else(|| Error::ScriptError(format!("Unexpected bounding box value: {}", value)))?;

    let mut nums = [0f64; 4];
    for (slot, v) in nums.iter_mut().zip(parts) {
        *slot = v
            .as_f64()
            .filter(|n| n.is_finite())
            .ok_or_else(|| Error::ScriptError(format!("Non-numeric bounding box value: {}", value)))?;
    }
    let [top, left, width, height] = nums;

    if width < 0.0 || height < 0.0 {
        return Err(Error::ScriptError(format!(
            "Negative bounding box for `{}`: {}x{}",
            selector, width, height
        )));
    }

    Ok(ClipRect::new(left, top, width, height))
}

/// Resolve the current bounding box of the element matched by `selector`.
///
/// Fails with [`Error::TargetNotFound`] when nothing matches, and with
/// [`Error::CaptureError`] when the element has no area to capture.
pub fn clip_target<S: Surface + ?Sized>(surface: &mut S, selector: &str) -> Result<ClipRect> {
    let value = surface.evaluate(&bounding_box_script(selector))?;
    let clip = parse_bounding_box(selector, &value)?;
    if clip.is_empty() {
        return Err(Error::CaptureError(format!(
            "Target `{}` has an empty bounding box ({}x{})",
            selector, clip.width, clip.height
        )));
    }
    debug!("clip for `{}`: {:?}", selector, clip);
    Ok(clip)
}
