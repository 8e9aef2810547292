use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::job::TracingJobContext;
use crate::reconcile::{Reconciler, RunSummary};
use crate::source_client::SourceClient;
use crate::store_client::StoreClient;

pub const JOB_NAME: &str = "Update Github pinned projects";

/// Runs a single reconciliation with a fresh job context.
pub async fn run_once(
    source: &dyn SourceClient,
    store: &dyn StoreClient,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let ctx = TracingJobContext::new(JOB_NAME, cancel);
    let started = Utc::now();

    let summary = Reconciler::new(source, store).run(&ctx).await?;

    let elapsed = Utc::now() - started;
    tracing::info!(
        elapsed_ms = elapsed.num_milliseconds(),
        items = summary.items,
        created = summary.created,
        updated = summary.updated,
        deleted = summary.deleted,
        failed = summary.failed,
        cancelled = summary.cancelled,
        "[reconcile] Done"
    );
    Ok(summary)
}

/// Clears the single-run flag when the run ends, including by panic.
struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Triggers a run every `interval` until `cancel` fires. A trigger that
/// arrives while a run is still going is dropped.
pub async fn reconcile_loop(
    source: Arc<dyn SourceClient>,
    store: Arc<dyn StoreClient>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let (tx, mut rx) = mpsc::channel::<()>(1);
    let is_reconciling = Arc::new(AtomicBool::new(false));

    let trigger_cancel = cancel.clone();
    tokio::spawn(async move {
        tracing::info!("Starting periodic reconcile every {} seconds", interval.as_secs());

        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = trigger_cancel.cancelled() => break,
                _ = ticker.tick() => {
                    tracing::debug!("Triggering periodic reconcile");
                    if tx.try_send(()).is_err() {
                        tracing::debug!("[reconcile] Trigger already pending");
                    }
                }
            }
        }
    });

    let mut in_flight = None;

    loop {
        let trigger = tokio::select! {
            _ = cancel.cancelled() => None,
            msg = rx.recv() => msg,
        };
        if trigger.is_none() {
            break;
        }

        if is_reconciling
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("[reconcile] Already running, dropped request");
            continue;
        }

        tracing::debug!("[reconcile] Begin");
        let source = Arc::clone(&source);
        let store = Arc::clone(&store);
        let guard = RunGuard(Arc::clone(&is_reconciling));
        let run_cancel = cancel.child_token();

        in_flight = Some(tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = run_once(source.as_ref(), store.as_ref(), run_cancel).await {
                tracing::error!("[reconcile] Error: {:#}", e);
            }
        }));
    }

    if let Some(handle) = in_flight {
        tracing::info!("Waiting for the running reconcile to stop");
        if let Err(e) = handle.await {
            tracing::error!("[reconcile] Task failed: {}", e);
        }
    }
}
