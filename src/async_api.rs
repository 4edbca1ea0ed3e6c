//! Concurrent suite runner.
//!
//! Every viewport case gets a dedicated worker thread that launches and owns
//! its own surface, so no surface ever crosses a thread boundary. Results
//! come back to the async caller over oneshot channels.

use crate::check::{run_isolated_case, CaseReport, SuiteReport};
use crate::{CheckConfig, Error, Result, SnapshotDir, Surface, SurfaceConfig};
use futures::future::join_all;
use log::debug;
use std::thread;
use tokio::sync::oneshot;

/// Run all configured cases concurrently, one surface per case.
///
/// `launch` is called on each worker thread. The snapshot directory is
/// created before any worker starts. Case outcomes are reported in
/// configuration order.
pub async fn run_suite_concurrent<S, F>(config: &CheckConfig, launch: F) -> Result<SuiteReport>
where
    S: Surface,
    F: Fn(&SurfaceConfig) -> Result<S> + Clone + Send + 'static,
{
    config.validate()?;
    let snapshots = SnapshotDir::create(&config.snapshots_dir)?;

    let pending = config.cases.iter().map(|case| {
        let (tx, rx) = oneshot::channel::<Result<CaseReport>>();
        let config = config.clone();
        let case = case.clone();
        let snapshots = snapshots.clone();
        let launch = launch.clone();

        debug!("[{}] spawning worker", case.name);
        let spawned = thread::Builder::new()
            .name(format!("rfvisual-{}", case.name))
            .spawn(move || {
                let res = run_isolated_case(&config, &case, &snapshots, launch);
                // Receiver may be gone if the caller was dropped
                let _ = tx.send(res);
            });

        async move {
            spawned.map_err(|e| Error::Other(format!("Failed to spawn worker: {}", e)))?;
            rx.await
                .map_err(|e| Error::Other(format!("Worker canceled: {}", e)))?
        }
    });

    let outcomes = join_all(pending).await;

    let cases = config
        .cases
        .iter()
        .map(|c| c.name.clone())
        .zip(outcomes)
        .collect();

    Ok(SuiteReport { cases })
}
