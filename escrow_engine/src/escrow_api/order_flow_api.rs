use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::{
        Amount,
        ChainStatus,
        EvmTransaction,
        NewOrder,
        NewStatusEvent,
        PaymentStatus,
        ShippingStatus,
        StatusEvent,
        Transaction,
        TransactionId,
    },
    escrow_api::{
        config_api::ConfigApi,
        order_objects::{OrderSnapshot, OrderStatusReport},
    },
    events::{EventProducers, OrderCreatedEvent, StatusChangedEvent},
    projector::qualifies_as_completed,
    traits::{
        AppendGuard,
        AppendOutcome,
        ConfigStorage,
        CreatedOrder,
        DisputeManagement,
        EscrowDatabase,
        EscrowError,
        SettlementManagement,
    },
};

/// The most orders a single status listing returns.
pub const MAX_STATUS_LISTING: u32 = 100;

/// `OrderFlowApi` is the primary API for the order lifecycle: creating orders, and recording the deposit, shipping and
/// chain observations that feed the event log.
///
/// Methods ending in `_at` take an explicit timestamp. The plain variants use the current time.
pub struct OrderFlowApi<B> {
    db: B,
    config: ConfigApi<B>,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, config: ConfigApi<B>, producers: EventProducers) -> Self {
        Self { db, config, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> OrderFlowApi<B>
where B: EscrowDatabase + DisputeManagement + SettlementManagement + ConfigStorage
{
    /// Creates the order, its funding record and its initial `pending` payment event atomically.
    ///
    /// The escrow address is not known yet; the returned order reports it as pending.
    pub async fn create_order(&self, order: NewOrder) -> Result<CreatedOrder, EscrowError> {
        if !order.required_amount.is_positive() {
            return Err(EscrowError::OutOfDomain(format!(
                "Required amount must be positive, not {}",
                order.required_amount
            )));
        }
        if order.currency.trim().is_empty() {
            return Err(EscrowError::OutOfDomain("An order must have a currency".to_string()));
        }
        let created = self.db.insert_order(order).await?;
        debug!(
            "🔄️📦️ Order {} created for {} {}. Escrow address pending.",
            created.id(),
            created.evm_transaction.required_amount,
            created.evm_transaction.currency
        );
        self.producers.publish_order_created(OrderCreatedEvent { order: created.clone() }).await;
        self.producers.publish_status_changed(StatusChangedEvent { event: created.initial_event.clone() }).await;
        Ok(created)
    }

    /// Records the escrow address once an external collaborator has assigned one. The address is write-once.
    pub async fn assign_escrow_address(
        &self,
        id: &TransactionId,
        address: &str,
    ) -> Result<EvmTransaction, EscrowError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(EscrowError::OutOfDomain("Escrow address cannot be empty".to_string()));
        }
        self.live_transaction(id).await?;
        let evm = self.db.assign_escrow_address(id, address, Utc::now()).await?;
        debug!("🔄️🏦️ Order {id} escrow address is {address}");
        Ok(evm)
    }

    pub async fn record_deposit_observed(
        &self,
        id: &TransactionId,
        observed: Amount,
        source: &str,
    ) -> Result<AppendOutcome, EscrowError> {
        self.record_deposit_observed_at(id, observed, source, Utc::now()).await
    }

    /// Records a deposit seen on-chain. A deposit within `completion_tolerance` of the required amount completes the
    /// payment; anything else is recorded as `pending` with the observed amount.
    pub async fn record_deposit_observed_at(
        &self,
        id: &TransactionId,
        observed: Amount,
        source: &str,
        at: DateTime<Utc>,
    ) -> Result<AppendOutcome, EscrowError> {
        if observed < Amount::ZERO {
            return Err(EscrowError::OutOfDomain(format!("Observed deposit {observed} is negative")));
        }
        self.live_transaction(id).await?;
        let evm = self
            .db
            .fetch_evm_transaction(id)
            .await?
            .ok_or_else(|| EscrowError::DatabaseError(format!("Order {id} has no funding record")))?;
        let policy = self.config.policy().await?;
        let status = if qualifies_as_completed(observed, evm.required_amount, policy.completion_tolerance) {
            PaymentStatus::Completed
        } else {
            debug!(
                "🔄️💰️ Deposit of {observed} for order {id} is outside tolerance of the required {}",
                evm.required_amount
            );
            PaymentStatus::Pending
        };
        let event = NewStatusEvent::payment(*id, status, at).with_amount(observed).with_source(source);
        let outcome = self.append(event, AppendGuard::Payment).await?;
        info!("🔄️💰️ Deposit of {observed} observed for order {id}: {outcome:?}");
        Ok(outcome)
    }

    pub async fn record_shipping_update(
        &self,
        id: &TransactionId,
        status: ShippingStatus,
        source: &str,
    ) -> Result<AppendOutcome, EscrowError> {
        self.record_shipping_update_at(id, status, source, Utc::now()).await
    }

    pub async fn record_shipping_update_at(
        &self,
        id: &TransactionId,
        status: ShippingStatus,
        source: &str,
        at: DateTime<Utc>,
    ) -> Result<AppendOutcome, EscrowError> {
        self.live_transaction(id).await?;
        let event = NewStatusEvent::shipping(*id, status, at).with_source(source);
        let outcome = self.append(event, AppendGuard::Shipping).await?;
        debug!("🔄️🚚️ Shipping update [{status}] for order {id}: {outcome:?}");
        Ok(outcome)
    }

    pub async fn record_chain_confirmation(
        &self,
        id: &TransactionId,
        status: ChainStatus,
        source: &str,
    ) -> Result<AppendOutcome, EscrowError> {
        self.record_chain_confirmation_at(id, status, source, Utc::now()).await
    }

    pub async fn record_chain_confirmation_at(
        &self,
        id: &TransactionId,
        status: ChainStatus,
        source: &str,
        at: DateTime<Utc>,
    ) -> Result<AppendOutcome, EscrowError> {
        self.live_transaction(id).await?;
        let event = NewStatusEvent::chain(*id, status, at).with_source(source);
        let outcome = self.append(event, AppendGuard::Chain).await?;
        debug!("🔄️⛓️ Chain status [{status}] for order {id}: {outcome:?}");
        Ok(outcome)
    }

    pub async fn get_cumulative_status(&self, id: &TransactionId) -> Result<OrderStatusReport, EscrowError> {
        self.get_cumulative_status_at(id, Utc::now()).await
    }

    /// Projects the order's current status. Nothing is written.
    pub async fn get_cumulative_status_at(
        &self,
        id: &TransactionId,
        now: DateTime<Utc>,
    ) -> Result<OrderStatusReport, EscrowError> {
        let policy = self.config.policy().await?;
        let snapshot = OrderSnapshot::load(&self.db, id, &policy, now).await?;
        Ok(OrderStatusReport::from(&snapshot))
    }

    pub async fn list_statuses(
        &self,
        after: Option<TransactionId>,
        limit: u32,
    ) -> Result<Vec<OrderStatusReport>, EscrowError> {
        self.list_statuses_at(after, limit, Utc::now()).await
    }

    /// Projects the current status of up to `limit` orders (never more than [`MAX_STATUS_LISTING`]) with ids after
    /// `after`, ordered by id. Deleted orders are left out.
    pub async fn list_statuses_at(
        &self,
        after: Option<TransactionId>,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderStatusReport>, EscrowError> {
        let policy = self.config.policy().await?;
        let ids = self.db.fetch_transaction_ids(after, limit.min(MAX_STATUS_LISTING)).await?;
        let mut reports = Vec::with_capacity(ids.len());
        for id in &ids {
            let snapshot = OrderSnapshot::load(&self.db, id, &policy, now).await?;
            reports.push(OrderStatusReport::from(&snapshot));
        }
        trace!("🔄️ Listed the status of {} orders", reports.len());
        Ok(reports)
    }

    pub async fn events_for_order(&self, id: &TransactionId) -> Result<Vec<StatusEvent>, EscrowError> {
        self.db.fetch_transaction(id).await?.ok_or(EscrowError::TransactionNotFound(*id))?;
        self.db.fetch_status_events(id).await
    }

    pub async fn soft_delete_order(&self, id: &TransactionId) -> Result<Transaction, EscrowError> {
        self.soft_delete_order_at(id, Utc::now()).await
    }

    /// Hides the order from the scheduler and from creation-time listings. Refused while a dispute is open or while
    /// funds are held in escrow and not yet settled.
    pub async fn soft_delete_order_at(
        &self,
        id: &TransactionId,
        at: DateTime<Utc>,
    ) -> Result<Transaction, EscrowError> {
        let policy = self.config.policy().await?;
        let snapshot = OrderSnapshot::load(&self.db, id, &policy, at).await?;
        if snapshot.open_dispute.is_some() {
            return Err(EscrowError::InvalidTransition(format!("Order {id} has an open dispute")));
        }
        let escrowed = snapshot.projection.payment.status == PaymentStatus::Completed;
        if escrowed && self.db.fetch_settlement(id).await?.is_none() {
            return Err(EscrowError::InvalidTransition(format!("Order {id} has unsettled funds in escrow")));
        }
        let tx = self.db.soft_delete_order(id, at).await?;
        info!("🔄️🗑️ Order {id} deleted");
        Ok(tx)
    }

    async fn live_transaction(&self, id: &TransactionId) -> Result<Transaction, EscrowError> {
        let tx = self.db.fetch_transaction(id).await?.ok_or(EscrowError::TransactionNotFound(*id))?;
        if tx.is_deleted() {
            return Err(EscrowError::InvalidTransition(format!("Order {id} has been deleted")));
        }
        Ok(tx)
    }

    async fn append(&self, event: NewStatusEvent, guard: AppendGuard) -> Result<AppendOutcome, EscrowError> {
        let outcome = self.db.append_status_event(event, guard).await?;
        if let Some(event) = outcome.event() {
            self.producers.publish_status_changed(StatusChangedEvent { event: event.clone() }).await;
        }
        Ok(outcome)
    }
}
