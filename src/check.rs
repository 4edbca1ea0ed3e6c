//! The check state machine
//!
//! A case walks a fixed sequence on its own surface:
//! navigate(expected) -> settle -> mask -> capture(expected) ->
//! navigate(actual) -> mask -> capture(actual) -> compare -> report.
//! The first failing step aborts the case; other cases are unaffected.

use crate::clip::{clip_target, ClipRect};
use crate::mask::apply_mask;
use crate::{compare, CheckConfig, Capture, Error, Result, SnapshotDir, Surface, SurfaceConfig, Viewport, ViewportCase};
use log::{debug, info, warn};
use std::path::Path;

/// Summary of a passing case
#[derive(Debug, Clone)]
pub struct CaseReport {
    pub name: String,
    pub viewport: Viewport,
    pub expected_clip: ClipRect,
    pub actual_clip: ClipRect,
    pub expected: Capture,
    pub actual: Capture,
    pub diff_pixels: u64,
    pub diff_ratio: f64,
    pub size_mismatch: bool,
}

/// Per-case outcomes of a suite, in configuration order
#[derive(Debug)]
pub struct SuiteReport {
    pub cases: Vec<(String, Result<CaseReport>)>,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        self.cases.iter().all(|(_, r)| r.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.cases
            .iter()
            .filter_map(|(name, r)| r.as_ref().err().map(|e| (name.as_str(), e)))
    }
}

/// `file://` URL for a local document
pub fn document_url(path: &Path) -> Result<String> {
    let abs = path
        .canonicalize()
        .map_err(|e| Error::LoadError(format!("{}: {}", path.display(), e)))?;
    url::Url::from_file_path(&abs)
        .map(|u| u.to_string())
        .map_err(|_| Error::LoadError(format!("Cannot build file URL for {}", abs.display())))
}

fn mask_and_capture<S: Surface + ?Sized>(
    surface: &mut S,
    config: &CheckConfig,
    snapshots: &SnapshotDir,
    name: &str,
) -> Result<(ClipRect, Capture)> {
    if let Some(selector) = &config.mask_selector {
        apply_mask(surface, selector, &config.mask_style)?;
    }
    let clip = clip_target(surface, &config.target_selector)?;
    let png = surface.capture_png(&clip)?;
    let capture = snapshots.write_capture(name, png)?;
    Ok((clip, capture))
}

/// Run one case on an already launched surface.
pub fn run_case<S: Surface + ?Sized>(
    surface: &mut S,
    config: &CheckConfig,
    case: &ViewportCase,
    snapshots: &SnapshotDir,
) -> Result<CaseReport> {
    let expected_url = document_url(&config.expected)?;
    let actual_url = document_url(&config.actual)?;
    let baseline_id = format!("{}_expected", case.name);

    debug!("[{}] loading baseline {}", case.name, expected_url);
    surface.navigate(&expected_url)?;
    std::thread::sleep(config.settle_delay());
    let (expected_clip, expected) = mask_and_capture(surface, config, snapshots, &baseline_id)?;

    debug!("[{}] loading actual {}", case.name, actual_url);
    surface.navigate(&actual_url)?;
    let (actual_clip, actual) = mask_and_capture(surface, config, snapshots, &format!("{}_actual", case.name))?;

    let cmp = compare::compare_png(&expected.png, &actual.png, &config.compare)?;
    debug!(
        "[{}] {} of {} pixels differ ({:.4})",
        case.name, cmp.diff_pixels, cmp.total_pixels, cmp.diff_ratio
    );

    if !cmp.pass {
        let diff_path = match cmp.diff_png()? {
            Some(png) => Some(snapshots.write_png(&format!("{}-diff", baseline_id), &png)?),
            None => None,
        };
        return Err(Error::ImageMismatch {
            case: case.name.clone(),
            diff_pixels: cmp.diff_pixels,
            ratio: cmp.diff_ratio,
            threshold: config.compare.failure_threshold,
            diff_path,
        });
    }

    Ok(CaseReport {
        name: case.name.clone(),
        viewport: case.viewport,
        expected_clip,
        actual_clip,
        expected,
        actual,
        diff_pixels: cmp.diff_pixels,
        diff_ratio: cmp.diff_ratio,
        size_mismatch: cmp.size_mismatch,
    })
}

/// Launch a surface for `case`, run it, and close the surface again.
pub fn run_isolated_case<S, F>(
    config: &CheckConfig,
    case: &ViewportCase,
    snapshots: &SnapshotDir,
    launch: F,
) -> Result<CaseReport>
where
    S: Surface,
    F: FnOnce(&SurfaceConfig) -> Result<S>,
{
    let mut surface = launch(&config.surface_config(case))?;
    let outcome = run_case(&mut surface, config, case, snapshots);
    if let Err(e) = surface.close() {
        warn!("[{}] failed to close surface: {}", case.name, e);
    }

    match &outcome {
        Ok(r) => info!("[{}] pass ({:.4} difference)", case.name, r.diff_ratio),
        Err(e) => info!("[{}] FAIL: {}", case.name, e),
    }
    outcome
}

/// Run every configured case sequentially, each on a fresh surface.
///
/// Fails up front only for an invalid configuration or an unusable snapshot
/// directory; case failures are collected in the report.
pub fn run_suite<S, F>(config: &CheckConfig, mut launch: F) -> Result<SuiteReport>
where
    S: Surface,
    F: FnMut(&SurfaceConfig) -> Result<S>,
{
    config.validate()?;
    let snapshots = SnapshotDir::create(&config.snapshots_dir)?;

    let cases = config
        .cases
        .iter()
        .map(|case| {
            let outcome = run_isolated_case(config, case, &snapshots, &mut launch);
            (case.name.clone(), outcome)
        })
        .collect();

    Ok(SuiteReport { cases })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_url_is_file_scheme() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = tmp.path().join("top.html");
        std::fs::write(&doc, "<html></html>").unwrap();
        let url = document_url(&doc).unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("/top.html"));
    }

    #[test]
    fn missing_document_is_load_error() {
        let err = document_url(Path::new("/definitely/not/here.html")).unwrap_err();
        assert!(matches!(err, Error::LoadError(_)));
    }

    #[test]
    fn suite_report_failures() {
        let report = SuiteReport {
            cases: vec![
                ("large".into(), Err(Error::TargetNotFound("#x".into()))),
                ("small".into(), Err(Error::LoadError("gone".into()))),
            ],
        };
        assert!(!report.passed());
        let names: Vec<_> = report.failures().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["large", "small"]);
    }
}
