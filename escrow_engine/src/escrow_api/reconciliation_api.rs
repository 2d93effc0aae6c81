use std::{
    collections::{HashSet, VecDeque},
    fmt::Debug,
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use log::*;
use tokio::sync::Mutex;

use crate::{
    db_types::{NewStatusEvent, StatusStream, TransactionId},
    escrow_api::{
        config_api::ConfigApi,
        order_objects::{OrderSnapshot, ReconcileFailure, ReconcileReport},
    },
    events::{EventProducers, OrderEscalatedEvent, StatusChangedEvent},
    policy::EscrowPolicy,
    traits::{AppendGuard, AppendOutcome, ConfigStorage, DisputeManagement, EscrowDatabase, EscrowError},
};

/// The `source` recorded on events written by the scheduler.
pub const RECONCILIATION_SOURCE: &str = "reconciliation";

#[derive(Debug, Clone, Copy)]
pub struct ReconcileOptions {
    /// Number of open orders fetched per page
    pub batch_size: u32,
    /// Time budget for reconciling a single order
    pub row_timeout: Duration,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self { batch_size: 100, row_timeout: Duration::from_secs(5) }
    }
}

enum RowOutcome {
    Appended,
    Ignored,
    Unchanged,
}

/// Re-projects every open order and persists the time-derived `stuck` transitions the projector detects.
///
/// Clones share the retry queue, so a single instance should be driven by one worker.
#[derive(Clone)]
pub struct ReconciliationApi<B> {
    db: B,
    config: ConfigApi<B>,
    producers: EventProducers,
    options: ReconcileOptions,
    retry_queue: Arc<Mutex<VecDeque<TransactionId>>>,
    escalations_published: Arc<Mutex<HashSet<TransactionId>>>,
}

impl<B> Debug for ReconciliationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationApi({:?})", self.options)
    }
}

impl<B> ReconciliationApi<B> {
    pub fn new(db: B, config: ConfigApi<B>, producers: EventProducers, options: ReconcileOptions) -> Self {
        Self {
            db,
            config,
            producers,
            options,
            retry_queue: Arc::new(Mutex::new(VecDeque::new())),
            escalations_published: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn options(&self) -> ReconcileOptions {
        self.options
    }

    pub async fn pending_retries(&self) -> Vec<TransactionId> {
        self.retry_queue.lock().await.iter().copied().collect()
    }
}

impl<B> ReconciliationApi<B>
where B: EscrowDatabase + DisputeManagement + ConfigStorage
{
    pub async fn reconcile_once(&self) -> Result<ReconcileReport, EscrowError> {
        self.reconcile_once_at(Utc::now()).await
    }

    /// Runs a single reconciliation pass as of `now`.
    ///
    /// Orders left in the retry queue by the previous pass are processed first. Every open order is then visited once,
    /// page by page. Failures and timeouts are recorded in the report and queued for the next pass; they never abort
    /// the pass. Only a failure to read the configuration or to list open orders is returned as an error.
    pub async fn reconcile_once_at(&self, now: DateTime<Utc>) -> Result<ReconcileReport, EscrowError> {
        let policy = self.config.policy().await?;
        let mut report = ReconcileReport::new(now);
        let mut visited = HashSet::new();

        let retries: Vec<TransactionId> = self.retry_queue.lock().await.drain(..).collect();
        for id in retries {
            if visited.insert(id) {
                report.retried += 1;
                self.reconcile_row(&id, &policy, now, &mut report).await;
            }
        }

        let mut after: Option<TransactionId> = None;
        loop {
            let page = self.db.fetch_open_transaction_ids(after, self.options.batch_size).await?;
            let Some(last) = page.last() else { break };
            after = Some(*last);
            let is_last_page = page.len() < self.options.batch_size as usize;
            for id in page {
                if visited.insert(id) {
                    self.reconcile_row(&id, &policy, now, &mut report).await;
                }
            }
            if is_last_page {
                break;
            }
        }

        if !report.failed.is_empty() {
            let mut queue = self.retry_queue.lock().await;
            queue.extend(report.failed.iter().map(|f| f.transaction_id));
        }
        self.forget_settled_escalations(&report).await;
        info!(
            "🕰️ Reconciliation pass complete. Scanned {}, appended {}, ignored {}, unchanged {}, failed {}, \
             escalated {}",
            report.scanned,
            report.appended,
            report.ignored,
            report.unchanged,
            report.failed.len(),
            report.escalated.len()
        );
        Ok(report)
    }

    async fn reconcile_row(
        &self,
        id: &TransactionId,
        policy: &EscrowPolicy,
        now: DateTime<Utc>,
        report: &mut ReconcileReport,
    ) {
        report.scanned += 1;
        let step = tokio::time::timeout(self.options.row_timeout, self.reconcile_transaction(id, policy, now)).await;
        let result = match step {
            Ok(result) => result,
            Err(_) => Err(EscrowError::DatabaseError(format!(
                "Reconciliation timed out after {}ms",
                self.options.row_timeout.as_millis()
            ))),
        };
        match result {
            Ok((outcome, escalated)) => {
                match outcome {
                    RowOutcome::Appended => report.appended += 1,
                    RowOutcome::Ignored => report.ignored += 1,
                    RowOutcome::Unchanged => report.unchanged += 1,
                }
                if escalated {
                    report.escalated.push(*id);
                }
            },
            Err(e) => {
                warn!("🕰️ Could not reconcile order {id}. It will be retried on the next pass. {e}");
                report.failed.push(ReconcileFailure { transaction_id: *id, reason: e.to_string() });
            },
        }
    }

    async fn reconcile_transaction(
        &self,
        id: &TransactionId,
        policy: &EscrowPolicy,
        now: DateTime<Utc>,
    ) -> Result<(RowOutcome, bool), EscrowError> {
        let snapshot = OrderSnapshot::load(&self.db, id, policy, now).await?;
        if snapshot.transaction.is_deleted() {
            return Ok((RowOutcome::Unchanged, false));
        }
        let projection = &snapshot.projection;
        let outcome = match projection.overdue_event() {
            Some(status) => {
                let guard = match status.stream() {
                    StatusStream::Payment => AppendGuard::Payment,
                    StatusStream::Shipping => AppendGuard::Shipping,
                    StatusStream::Chain => AppendGuard::Chain,
                };
                let event =
                    NewStatusEvent::new(*id, status, projection.updated_at).with_source(RECONCILIATION_SOURCE);
                match self.db.append_status_event(event, guard).await? {
                    AppendOutcome::Appended { event } => {
                        info!("🕰️ Order {id} is overdue. Recorded {} as of {}", event.status, event.created_at);
                        self.producers.publish_status_changed(StatusChangedEvent { event }).await;
                        RowOutcome::Appended
                    },
                    AppendOutcome::Ignored { reason } => {
                        let stale = EscrowError::StaleWrite(format!("Order {id} changed during reconciliation"));
                        debug!("🕰️ {stale}: {reason}");
                        RowOutcome::Ignored
                    },
                }
            },
            None => RowOutcome::Unchanged,
        };
        let escalated = projection.is_escalated(policy, now);
        if escalated {
            self.escalate(&snapshot, now).await;
        }
        Ok((outcome, escalated))
    }

    /// Keeps only the escalations that are still current. Orders that recovered, or that left the open set, may be
    /// escalated again if they get stuck later. Failed rows keep their entry until they are read successfully.
    async fn forget_settled_escalations(&self, report: &ReconcileReport) {
        let mut published = self.escalations_published.lock().await;
        let before = published.len();
        published.retain(|id| {
            report.escalated.contains(id) || report.failed.iter().any(|f| &f.transaction_id == id)
        });
        if published.len() < before {
            debug!("🕰️ {} orders are no longer escalated", before - published.len());
        }
    }

    /// The number of orders whose escalation has been published and is still current.
    pub async fn published_escalations(&self) -> usize {
        self.escalations_published.lock().await.len()
    }

    async fn escalate(&self, snapshot: &OrderSnapshot, now: DateTime<Utc>) {
        let id = snapshot.transaction.id;
        let stuck_since = snapshot.projection.stuck_since().unwrap_or(now);
        warn!("🕰️ Order {id} has been stuck since {stuck_since} and needs attention");
        let first_time = self.escalations_published.lock().await.insert(id);
        if first_time {
            let projection = snapshot.projection.clone();
            let event = OrderEscalatedEvent { transaction_id: id, stuck_since, projection };
            self.producers.publish_order_escalated(event).await;
        }
    }
}
