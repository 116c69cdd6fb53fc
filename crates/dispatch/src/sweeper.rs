//! Background timeout sweep: a single supervised loop that logs a failure
//! and tries again on the next tick rather than crashing the process. The
//! sweep must never run concurrently with itself, which a single
//! `tokio::spawn`'d task already guarantees.

use std::{sync::Arc, time::Duration};

use tokio::time;

use crate::{map_adapter::MapAdapter, orchestrator::RequestOrchestrator, store::Store};

/// How often the sweep fires. The spec pins the pending/confirm timeouts
/// themselves but leaves the poll interval to the deployer; ten seconds
/// keeps a blown deadline from sitting unnoticed for long without hammering
/// the store.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Runs the sweep loop until the process exits. Intended to be
/// `tokio::spawn`'d once alongside the gateway's accept loop, sharing the
/// same orchestrator instance as every connection handler.
pub async fn run<S, M>(orchestrator: Arc<RequestOrchestrator<S, M>>, interval: Duration)
where
    S: Store,
    M: MapAdapter + 'static,
{
    let mut ticker = time::interval(interval);
    loop {
        ticker.tick().await;

        let pending_swept = orchestrator.sweep_stale_pending().await;
        let confirm_swept = orchestrator.sweep_stale_confirm().await;
        if pending_swept > 0 || confirm_swept > 0 {
            log::info!("sweep: {pending_swept} pending timeout(s), {confirm_swept} confirm timeout(s)");
        }
    }
}
