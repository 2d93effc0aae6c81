use escrow_engine::{ReconciliationApi, SqliteDatabase};
use log::*;
use tokio::{task::JoinHandle, time::MissedTickBehavior};

/// Starts the reconciliation worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// A pass that overruns the interval delays the next one rather than stacking passes on top of each other.
pub fn start_reconciliation_worker(
    api: ReconciliationApi<SqliteDatabase>,
    interval: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("🕰️ Reconciliation worker started. Running every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            info!("🕰️ Running reconciliation job");
            match api.reconcile_once().await {
                Ok(report) => {
                    if !report.failed.is_empty() {
                        warn!("🕰️ {} orders could not be reconciled and will be retried", report.failed.len());
                        debug!("🕰️ Failures: {}", failure_list(&report.failed));
                    }
                    if !report.escalated.is_empty() {
                        let ids = report.escalated.iter().map(|id| id.to_string()).collect::<Vec<String>>();
                        warn!("🕰️ {} orders need attention: {}", ids.len(), ids.join(", "));
                    }
                },
                Err(e) => {
                    error!("🕰️ Error running reconciliation job: {e}");
                },
            }
        }
    })
}

fn failure_list(failures: &[escrow_engine::order_objects::ReconcileFailure]) -> String {
    failures.iter().map(|f| format!("[{}] {}", f.transaction_id, f.reason)).collect::<Vec<String>>().join(", ")
}
