//! In-memory rendering surface for driving checks without a browser.
//!
//! A document is a layout function from viewport to a list of filled boxes.
//! The surface understands the two scripts the crate sends (bounding box and
//! mask) by pulling the selector and filter literals back out of them.

#![allow(dead_code)]

use image::{imageops, Rgba, RgbaImage};
use rfvisual::{check, compare, ClipRect, Error, Result, Surface, SurfaceConfig, Viewport};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const WHITE: [u8; 4] = [255, 255, 255, 255];

pub const TARGET: &str = r#"[data-test="article-list"]"#;
pub const THUMBNAIL: &str = "[src$='article_thumbnail.png']";

#[derive(Debug, Clone)]
pub struct Element {
    pub selectors: Vec<String>,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub color: [u8; 4],
    pub filter: Option<String>,
}

impl Element {
    pub fn new(selector: &str, x: u32, y: u32, width: u32, height: u32, color: [u8; 4]) -> Self {
        Self {
            selectors: vec![selector.to_string()],
            x,
            y,
            width,
            height,
            color,
            filter: None,
        }
    }

    fn matches(&self, selector: &str) -> bool {
        self.selectors.iter().any(|s| s == selector)
    }
}

/// Elements in paint order over a white page
pub type Layout = fn(Viewport) -> Vec<Element>;

pub type Journal = Arc<Mutex<Vec<String>>>;

pub struct SceneSurface {
    viewport: Viewport,
    documents: HashMap<String, Layout>,
    page: Option<Vec<Element>>,
    journal: Journal,
}

impl SceneSurface {
    pub fn new(viewport: Viewport, documents: HashMap<String, Layout>, journal: Journal) -> Self {
        Self {
            viewport,
            documents,
            page: None,
            journal,
        }
    }

    fn log(&self, entry: String) {
        self.journal.lock().unwrap().push(entry);
    }

    fn page_mut(&mut self) -> Result<&mut Vec<Element>> {
        self.page
            .as_mut()
            .ok_or_else(|| Error::ScriptError("no document loaded".into()))
    }

    fn render(&self) -> RgbaImage {
        let elements = self.page.as_deref().unwrap_or(&[]);
        let width = elements
            .iter()
            .map(|e| e.x + e.width)
            .max()
            .unwrap_or(0)
            .max(self.viewport.width);
        let height = elements
            .iter()
            .map(|e| e.y + e.height)
            .max()
            .unwrap_or(0)
            .max(self.viewport.height);

        let mut canvas = RgbaImage::from_pixel(width, height, Rgba(WHITE));
        for el in elements {
            let color = match el.filter.as_deref() {
                Some("brightness(0)") => [0, 0, 0, el.color[3]],
                _ => el.color,
            };
            for y in el.y..el.y + el.height {
                for x in el.x..el.x + el.width {
                    canvas.put_pixel(x, y, Rgba(color));
                }
            }
        }
        canvas
    }
}

/// First JSON string literal following `marker` in `script`
fn literal_after(script: &str, marker: &str) -> Option<String> {
    let start = script.find(marker)? + marker.len();
    serde_json::Deserializer::from_str(&script[start..])
        .into_iter::<String>()
        .next()?
        .ok()
}

/// Rough stand-in for the browser's selector parser: brackets must balance.
fn check_selector(selector: &str) -> Result<()> {
    let open = selector.matches('[').count();
    let close = selector.matches(']').count();
    if selector.is_empty() || open != close {
        return Err(Error::ScriptError(format!(
            "SyntaxError: '{}' is not a valid selector.",
            selector
        )));
    }
    Ok(())
}

impl Surface for SceneSurface {
    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn navigate(&mut self, url: &str) -> Result<()> {
        let layout = self
            .documents
            .get(url)
            .ok_or_else(|| Error::LoadError(format!("no such document {}", url)))?;
        self.page = Some(layout(self.viewport));
        self.log(format!("navigate {}", url.rsplit('/').next().unwrap_or(url)));
        Ok(())
    }

    fn evaluate(&mut self, script: &str) -> Result<serde_json::Value> {
        if let Some(selector) = literal_after(script, "querySelectorAll(") {
            self.log(format!("mask {}", selector));
            check_selector(&selector)?;
            let filter = literal_after(script, "style.filter=")
                .ok_or_else(|| Error::ScriptError("unsupported script".into()))?;
            let mut count = 0;
            for el in self.page_mut()?.iter_mut().filter(|e| e.matches(&selector)) {
                el.filter = Some(filter.clone());
                count += 1;
            }
            return Ok(serde_json::json!(count));
        }

        if let Some(selector) = literal_after(script, "querySelector(") {
            self.log(format!("clip {}", selector));
            check_selector(&selector)?;
            let hit = self
                .page_mut()?
                .iter()
                .find(|e| e.matches(&selector))
                .map(|e| serde_json::json!([e.y, e.x, e.width, e.height]));
            return Ok(hit.unwrap_or(serde_json::Value::Null));
        }

        Err(Error::ScriptError(format!("unsupported script: {}", script)))
    }

    fn capture_png(&mut self, clip: &ClipRect) -> Result<Vec<u8>> {
        self.log("capture".to_string());
        let page = self.render();
        let cropped = imageops::crop_imm(
            &page,
            clip.x as u32,
            clip.y as u32,
            clip.width as u32,
            clip.height as u32,
        )
        .to_image();
        compare::encode_png(&cropped)
    }

    fn close(self) -> Result<()> {
        self.log("close".to_string());
        Ok(())
    }
}

/// Test documents on disk (so `file://` URLs resolve) plus their layouts.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub documents: HashMap<String, Layout>,
    pub journal: Journal,
}

impl Fixture {
    pub fn new(expected: Layout, actual: Layout) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut documents = HashMap::new();
        for (name, layout) in [("expected.html", expected), ("actual.html", actual)] {
            let path = dir.path().join(name);
            std::fs::write(&path, "<!doctype html><html><body></body></html>").unwrap();
            documents.insert(check::document_url(&path).unwrap(), layout);
        }
        Self {
            dir,
            documents,
            journal: Journal::default(),
        }
    }

    pub fn config(&self) -> rfvisual::CheckConfig {
        rfvisual::CheckConfig {
            expected: self.dir.path().join("expected.html"),
            actual: self.dir.path().join("actual.html"),
            snapshots_dir: self.snapshots(),
            settle_ms: 0,
            ..Default::default()
        }
    }

    pub fn snapshots(&self) -> std::path::PathBuf {
        self.dir.path().join("snapshots")
    }

    pub fn surface(&self, viewport: Viewport) -> SceneSurface {
        SceneSurface::new(viewport, self.documents.clone(), self.journal.clone())
    }

    pub fn launcher(&self) -> impl FnMut(&SurfaceConfig) -> Result<SceneSurface> + '_ {
        move |cfg: &SurfaceConfig| Ok(self.surface(cfg.viewport))
    }

    /// Launcher that owns its documents, for runners that move it across threads
    pub fn owned_launcher(&self) -> impl Fn(&SurfaceConfig) -> Result<SceneSurface> + Clone + Send + 'static {
        let documents = self.documents.clone();
        let journal = self.journal.clone();
        move |cfg: &SurfaceConfig| Ok(SceneSurface::new(cfg.viewport, documents.clone(), journal.clone()))
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    pub fn snapshot_exists(&self, name: &str) -> bool {
        exists(&self.snapshots().join(format!("{}.png", name)))
    }
}

fn exists(path: &Path) -> bool {
    path.is_file()
}

/// The stock article list: a light grey list box holding a thumbnail and
/// two dark text bars. Below 768px the list spans the full width.
pub fn article_list(viewport: Viewport, thumb: [u8; 4], text: [u8; 4]) -> Vec<Element> {
    let width = if viewport.width >= 768 { 300 } else { viewport.width - 20 };
    vec![
        Element::new(TARGET, 10, 20, width, 80, [240, 240, 240, 255]),
        Element::new(THUMBNAIL, 20, 30, 60, 60, thumb),
        Element::new("h2", 90, 35, 150, 10, text),
        Element::new("p", 90, 60, 120, 8, text),
    ]
}

pub fn baseline(viewport: Viewport) -> Vec<Element> {
    article_list(viewport, [200, 40, 40, 255], [30, 30, 30, 255])
}

pub fn new_thumbnail(viewport: Viewport) -> Vec<Element> {
    article_list(viewport, [40, 40, 200, 255], [30, 30, 30, 255])
}

pub fn restyled_list(viewport: Viewport) -> Vec<Element> {
    let mut els = baseline(viewport);
    els[0].color = [250, 200, 120, 255];
    els
}
