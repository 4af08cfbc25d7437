//! Entry points for the payment and delivery collaborators, and manual access to the release engine.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::EscrowEntry,
    ledger_api::{commission::CommissionRates, policy::PayoutPolicy},
    traits::{EscrowError, EscrowManagement, FundingResult, PayoutContext, PayoutOutcome, PendingResult},
};

/// `EscrowFlowApi` moves an order's money through escrow: funding on payment, the pending transition on delivery, and
/// release or refund afterwards.
///
/// The treasury user is injected here once and handed to the backend with every call.
#[derive(Clone)]
pub struct EscrowFlowApi<B> {
    db: B,
    treasury_user_id: i64,
    rates: CommissionRates,
    policy: PayoutPolicy,
}

impl<B> Debug for EscrowFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EscrowFlowApi (treasury: #{}, rates: {:?})", self.treasury_user_id, self.rates)
    }
}

impl<B> EscrowFlowApi<B> {
    pub fn new(db: B, treasury_user_id: i64, rates: CommissionRates, policy: PayoutPolicy) -> Self {
        Self { db, treasury_user_id, rates, policy }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn treasury_user_id(&self) -> i64 {
        self.treasury_user_id
    }

    pub fn policy(&self) -> &PayoutPolicy {
        &self.policy
    }

    pub fn context(&self, now: DateTime<Utc>) -> PayoutContext {
        PayoutContext { treasury_user_id: self.treasury_user_id, rates: self.rates, now, ignore_disputes: false }
    }
}

impl<B> EscrowFlowApi<B>
where B: EscrowManagement
{
    /// Called once the payment for an order is confirmed. Webhook replays with the same order are no-ops.
    pub async fn fund_escrow_for_order(
        &self,
        order_id: i64,
        payment_reference: &str,
    ) -> Result<FundingResult, EscrowError> {
        let ctx = self.context(Utc::now());
        let result = self.db.fund_escrow_for_order(order_id, payment_reference, &ctx).await?;
        if result.created {
            info!("💸️ Order #{order_id} funded escrow with {} ({payment_reference})", result.amount);
        } else {
            debug!("💸️ Order #{order_id} was already funded. Nothing to do.");
        }
        Ok(result)
    }

    /// Called when delivery is confirmed. Earnings move to pending and a release is scheduled for `confirmed_at`
    /// plus the release delay.
    pub async fn move_order_earnings_to_pending(
        &self,
        order_id: i64,
        confirmed_at: DateTime<Utc>,
    ) -> Result<PendingResult, EscrowError> {
        let release_at = confirmed_at + self.policy.release_delay;
        let result = self.db.move_order_earnings_to_pending(order_id, confirmed_at, release_at).await?;
        debug!(
            "💸️ Order #{order_id} earnings pending. Sellers: {}, rider: {}. Release at {release_at}",
            result.seller_earnings_held,
            result.rider_earning_held.unwrap_or_default()
        );
        Ok(result)
    }

    pub async fn release_order_payout(&self, order_id: i64, now: DateTime<Utc>) -> Result<PayoutOutcome, EscrowError> {
        let ctx = self.context(now);
        let outcome = self.db.release_order_payout(order_id, &ctx).await?;
        log_outcome("Order", order_id, &outcome);
        Ok(outcome)
    }

    /// Releases an order even though it has an active dispute. Operator use only.
    pub async fn force_release_order_payout(
        &self,
        order_id: i64,
        now: DateTime<Utc>,
    ) -> Result<PayoutOutcome, EscrowError> {
        let ctx = PayoutContext { ignore_disputes: true, ..self.context(now) };
        warn!("💸️ Releasing order #{order_id} regardless of disputes");
        let outcome = self.db.release_order_payout(order_id, &ctx).await?;
        log_outcome("Order", order_id, &outcome);
        Ok(outcome)
    }

    pub async fn release_seller_group_payout(
        &self,
        group_id: i64,
        now: DateTime<Utc>,
    ) -> Result<PayoutOutcome, EscrowError> {
        let ctx = self.context(now);
        let outcome = self.db.release_seller_group_payout(group_id, &ctx).await?;
        log_outcome("Seller group", group_id, &outcome);
        Ok(outcome)
    }

    pub async fn release_rider_payout(
        &self,
        delivery_id: i64,
        now: DateTime<Utc>,
    ) -> Result<PayoutOutcome, EscrowError> {
        let ctx = self.context(now);
        let outcome = self.db.release_rider_payout(delivery_id, &ctx).await?;
        log_outcome("Delivery", delivery_id, &outcome);
        Ok(outcome)
    }

    pub async fn refund_hub_timeout(&self, group_id: i64, now: DateTime<Utc>) -> Result<PayoutOutcome, EscrowError> {
        let ctx = self.context(now);
        let outcome = self.db.refund_hub_timeout(group_id, &ctx).await?;
        log_outcome("Hub timeout for group", group_id, &outcome);
        Ok(outcome)
    }

    pub async fn escrow_entries_for_order(&self, order_id: i64) -> Result<Vec<EscrowEntry>, EscrowError> {
        self.db.fetch_escrow_entries_for_order(order_id).await
    }
}

fn log_outcome(what: &str, id: i64, outcome: &PayoutOutcome) {
    match outcome {
        PayoutOutcome::Released(summary) => {
            info!("💸️ {what} #{id} released. {} paid out, {} refunded", summary.total_paid(), summary.refunded)
        },
        PayoutOutcome::Skipped(reason) => debug!("💸️ {what} #{id} skipped: {reason}"),
    }
}
