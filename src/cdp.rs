//! Chrome DevTools Protocol surface (uses the `headless_chrome` crate)

use crate::{ClipRect, Error, Result, Surface, SurfaceConfig, Viewport};
use base64::Engine as _;
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions};
use log::debug;
use std::sync::Arc;
use std::time::Duration;

/// A headless Chrome instance with a single tab, sized to one viewport.
///
/// Each case launches its own surface so no page state leaks between cases.
pub struct CdpSurface {
    browser: Browser,
    tab: Arc<Tab>,
    viewport: Viewport,
}

impl CdpSurface {
    pub fn launch(config: &SurfaceConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);

        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .window_size(Some((config.viewport.width, config.viewport.height)))
            .idle_browser_timeout(timeout)
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::InitializationError(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::InitializationError(format!("Failed to create tab: {}", e)))?;
        tab.set_default_timeout(timeout);

        debug!(
            "launched headless Chrome at {}x{}",
            config.viewport.width, config.viewport.height
        );

        Ok(Self {
            browser,
            tab,
            viewport: config.viewport,
        })
    }
}

/// Wrap `script` so the page always answers with a JSON string.
///
/// CDP hands objects back by reference and drops exception details, so the
/// result is serialized in the page as `{"ok": value}` or `{"error": message}`.
fn envelope_script(script: &str) -> String {
    format!(
        "(function(){{try{{return JSON.stringify({{ok:({})}});}}catch(e){{return JSON.stringify({{error:String(e)}});}}}})()",
        script
    )
}

/// Decode the page's answer to [`envelope_script`].
fn open_envelope(json: &str) -> Result<serde_json::Value> {
    let mut answer: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)
        .map_err(|e| Error::ScriptError(format!("Unparseable script result {:?}: {}", json, e)))?;

    if let Some(err) = answer.remove("error") {
        return Err(Error::ScriptError(match err {
            serde_json::Value::String(msg) => msg,
            other => other.to_string(),
        }));
    }
    // `undefined` results are dropped by JSON.stringify
    Ok(answer.remove("ok").unwrap_or(serde_json::Value::Null))
}

impl Surface for CdpSurface {
    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn navigate(&mut self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .map_err(|e| Error::LoadError(format!("Navigation to {} failed: {}", url, e)))?;

        self.tab
            .wait_until_navigated()
            .map_err(|e| Error::LoadError(format!("Wait for navigation to {} failed: {}", url, e)))?;

        Ok(())
    }

    fn evaluate(&mut self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .tab
            .evaluate(&envelope_script(script), false)
            .map_err(|e| Error::ScriptError(format!("Evaluation failed: {}", e)))?;

        match result.value {
            Some(serde_json::Value::String(json)) => open_envelope(&json),
            // The envelope itself failed to run (syntax error, CSP, ...)
            _ => Err(Error::ScriptError(format!(
                "Script did not complete: {}",
                result.description.unwrap_or_else(|| "no result".to_string())
            ))),
        }
    }

    fn capture_png(&mut self, clip: &ClipRect) -> Result<Vec<u8>> {
        let viewport = Page::Viewport {
            x: clip.x,
            y: clip.y,
            width: clip.width,
            height: clip.height,
            scale: 1.0,
        };

        // Targets may extend below the window; capture the clip from the full page.
        let shot = self
            .tab
            .call_method(Page::CaptureScreenshot {
                format: Some(Page::CaptureScreenshotFormatOption::Png),
                clip: Some(viewport),
                from_surface: Some(true),
                capture_beyond_viewport: Some(true),
                quality: None,
                optimize_for_speed: None,
            })
            .map_err(|e| Error::CaptureError(format!("Screenshot failed: {}", e)))?;

        base64::engine::general_purpose::STANDARD
            .decode(shot.data)
            .map_err(|e| Error::CaptureError(format!("Screenshot data is not base64: {}", e)))
    }

    fn close(self) -> Result<()> {
        // Drop the tab before the browser so the child process exits promptly.
        drop(self.tab);
        drop(self.browser);
        Ok(())
    }
}
