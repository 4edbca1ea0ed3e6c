//! Content masking: neutralize volatile elements before capture

use crate::{Error, Result, Surface};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Visual override applied to masked elements.
///
/// The value is assigned to `element.style.filter`, so any CSS filter works.
/// The default, `brightness(0)`, paints every opaque pixel black regardless
/// of the element's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaskStyle {
    pub filter: String,
}

impl Default for MaskStyle {
    fn default() -> Self {
        Self {
            filter: "brightness(0)".to_string(),
        }
    }
}

/// Build the script that applies `style` to every element matching
/// `selector` and returns how many elements were touched.
pub fn mask_script(selector: &str, style: &MaskStyle) -> String {
    let sel = serde_json::Value::String(selector.to_string()).to_string();
    let filter = serde_json::Value::String(style.filter.clone()).to_string();
    format!(
        "(function(){{const els=document.querySelectorAll({});els.forEach(function(el){{el.style.filter={};}});return els.length;}})()",
        sel, filter
    )
}

/// Apply `style` to every element matching `selector` in the current page.
///
/// Idempotent; the override lives only until the next navigation. Matching
/// nothing is not an error, but a script that does not report a match count
/// (an invalid selector, say) fails with [`Error::ScriptError`].
pub fn apply_mask<S: Surface + ?Sized>(surface: &mut S, selector: &str, style: &MaskStyle) -> Result<()> {
    let value = surface.evaluate(&mask_script(selector, style))?;
    match value.as_u64() {
        Some(0) => warn!("mask selector `{}` matched no elements", selector),
        Some(n) => debug!("masked {} element(s) for `{}`", n, selector),
        None => {
            return Err(Error::ScriptError(format!(
                "mask script for `{}` returned {} instead of a match count",
                selector, value
            )))
        }
    }
    Ok(())
}
