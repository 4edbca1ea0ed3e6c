use anyhow::Context;
use clap::Parser;
use rfvisual::{check, CheckConfig, SuiteReport};
use std::path::PathBuf;

/// Compare a generated HTML document against its baseline at each configured viewport.
#[derive(Parser, Debug)]
#[command(name = "rfvisual", version)]
struct Args {
    /// JSON configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Baseline document
    #[arg(long)]
    expected: Option<PathBuf>,

    /// Document under test
    #[arg(long)]
    actual: Option<PathBuf>,

    /// Directory for captures and diff images
    #[arg(long)]
    snapshots: Option<PathBuf>,

    /// Selector of the element to capture
    #[arg(long)]
    target: Option<String>,

    /// Selector of elements to mask before capture
    #[arg(long, conflicts_with = "no_mask")]
    mask: Option<String>,

    /// Disable masking entirely
    #[arg(long)]
    no_mask: bool,

    /// Failure threshold (ratio or pixel count, per the configured unit)
    #[arg(long)]
    threshold: Option<f64>,

    /// Run viewport cases concurrently, one browser each
    #[arg(long)]
    concurrent: bool,
}

impl Args {
    fn into_config(self) -> anyhow::Result<(CheckConfig, bool)> {
        let mut config = match &self.config {
            Some(path) => CheckConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => CheckConfig::default(),
        };

        if let Some(p) = self.expected {
            config.expected = p;
        }
        if let Some(p) = self.actual {
            config.actual = p;
        }
        if let Some(p) = self.snapshots {
            config.snapshots_dir = p;
        }
        if let Some(t) = self.target {
            config.target_selector = t;
        }
        if self.no_mask {
            config.mask_selector = None;
        } else if let Some(m) = self.mask {
            config.mask_selector = Some(m);
        }
        if let Some(t) = self.threshold {
            config.compare.failure_threshold = t;
        }

        config.validate()?;
        Ok((config, self.concurrent))
    }
}

fn print_report(report: &SuiteReport) {
    for (name, outcome) in &report.cases {
        match outcome {
            Ok(r) => println!(
                "PASS {} ({}x{}): {:.4}% of pixels differ",
                name,
                r.viewport.width,
                r.viewport.height,
                r.diff_ratio * 100.0
            ),
            Err(e) => println!("FAIL {}: {}", name, e),
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (config, concurrent) = Args::parse().into_config()?;

    let report = if concurrent {
        let rt = tokio::runtime::Runtime::new().context("starting async runtime")?;
        rt.block_on(rfvisual::async_api::run_suite_concurrent(&config, rfvisual::new_surface))?
    } else {
        check::run_suite(&config, rfvisual::new_surface)?
    };

    print_report(&report);
    if !report.passed() {
        std::process::exit(1);
    }
    Ok(())
}
