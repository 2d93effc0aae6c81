use std::{fmt::Debug, str::FromStr};

use chrono::{DateTime, Utc};
use log::*;
use rust_decimal::Decimal;

use crate::{
    db_types::{Fraction, Settlement, SettlementKind, TransactionId, VendorTier},
    escrow_api::{config_api::ConfigApi, order_objects::OrderSnapshot},
    events::{EventProducers, OrderSettledEvent},
    projector::escrowed_amount,
    settlement::{commission_split, dispute_split, settlement_kind_for},
    traits::{ConfigStorage, DisputeManagement, EscrowDatabase, EscrowError, NewSettlement, SettlementManagement},
};

/// Distributes the escrowed funds of orders that have reached a settleable state.
///
/// Settlement is idempotent. The rates in force when an order is first settled are stored with the settlement, so
/// later configuration changes never alter a settled order.
pub struct SettlementApi<B> {
    db: B,
    config: ConfigApi<B>,
    producers: EventProducers,
}

impl<B> Debug for SettlementApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SettlementApi")
    }
}

impl<B> SettlementApi<B> {
    pub fn new(db: B, config: ConfigApi<B>, producers: EventProducers) -> Self {
        Self { db, config, producers }
    }
}

impl<B> SettlementApi<B>
where B: EscrowDatabase + DisputeManagement + SettlementManagement + ConfigStorage
{
    pub async fn settlement_for(&self, id: &TransactionId) -> Result<Option<Settlement>, EscrowError> {
        self.db.fetch_settlement(id).await
    }

    pub async fn settle(&self, id: &TransactionId) -> Result<Settlement, EscrowError> {
        self.settle_at(id, Utc::now()).await
    }

    /// Settles the order and credits the vendor payout to the store's deposit ledger.
    ///
    /// * `completed` orders pay the platform commission for the vendor's tier.
    /// * `refunded` and `resolved` orders are split according to the dispute's refund ratio, with the resolver taking
    ///   `partial_refund_resolver_percent` of the vendor's share.
    ///
    /// Any other status fails with [`EscrowError::InvalidTransition`]. Settling an already settled order returns the
    /// existing settlement.
    pub async fn settle_at(&self, id: &TransactionId, now: DateTime<Utc>) -> Result<Settlement, EscrowError> {
        if let Some(existing) = self.db.fetch_settlement(id).await? {
            debug!("💸️ Order {id} was already settled");
            return Ok(existing);
        }
        let policy = self.config.policy().await?;
        let snapshot = OrderSnapshot::load(&self.db, id, &policy, now).await?;
        let kind = settlement_kind_for(snapshot.status())?;
        let amount = escrowed_amount(&snapshot.events)
            .ok_or_else(|| EscrowError::InvalidTransition(format!("Order {id} has no completed payment to settle")))?;
        let currency = snapshot.evm_transaction.currency.clone();
        let new_settlement = match kind {
            SettlementKind::Commission => {
                let store_id = &snapshot.transaction.store_id;
                let tier = match self.db.fetch_vendor_tier(store_id).await? {
                    Some(s) => VendorTier::from_str(&s)
                        .map_err(|e| EscrowError::OutOfDomain(format!("Store {store_id}: {e}")))?,
                    None => VendorTier::default(),
                };
                let rate = policy.commission_rate(tier);
                let split = commission_split(amount, rate)?;
                NewSettlement {
                    transaction_id: *id,
                    kind,
                    amount: split.amount,
                    payout: split.payout,
                    commission: split.commission,
                    refund: split.refund,
                    tier: Some(tier),
                    commission_rate: Some(to_fraction("commission rate", rate)?),
                    resolver_rate: None,
                    refund_ratio: None,
                    currency,
                    created_at: now,
                }
            },
            SettlementKind::DisputeSplit => {
                let dispute = self
                    .db
                    .fetch_resolved_dispute_for_transaction(id)
                    .await?
                    .ok_or_else(|| EscrowError::DisputeNotFound(format!("No resolved dispute for order {id}")))?;
                let ratio = dispute.refund_ratio.ok_or_else(|| {
                    EscrowError::DatabaseError(format!("Resolved dispute {} has no refund ratio", dispute.id))
                })?;
                let split = dispute_split(amount, ratio.value(), policy.resolver_percent)?;
                NewSettlement {
                    transaction_id: *id,
                    kind,
                    amount: split.amount,
                    payout: split.payout,
                    commission: split.commission,
                    refund: split.refund,
                    tier: None,
                    commission_rate: None,
                    resolver_rate: Some(to_fraction("resolver percent", policy.resolver_percent)?),
                    refund_ratio: Some(ratio),
                    currency,
                    created_at: now,
                }
            },
        };
        let (settlement, created) = self.db.insert_settlement(new_settlement, &snapshot.transaction.store_id).await?;
        if created {
            info!(
                "💸️ Order {id} settled ({}). Payout {}, commission {}, refund {}",
                settlement.kind, settlement.payout, settlement.commission, settlement.refund
            );
            self.producers.publish_order_settled(OrderSettledEvent { settlement: settlement.clone() }).await;
        } else {
            debug!("💸️ Order {id} was settled concurrently. Returning the stored settlement.");
        }
        Ok(settlement)
    }
}

fn to_fraction(name: &str, value: Decimal) -> Result<Fraction, EscrowError> {
    Fraction::new(value).map_err(|e| EscrowError::OutOfDomain(format!("{name}: {e}")))
}
