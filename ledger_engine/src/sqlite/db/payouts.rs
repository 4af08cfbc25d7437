//! The escrow lifecycle: funding, holding, release and hub-timeout refunds.
//!
//! Every function here expects to run inside a transaction opened by the caller. The release and refund functions
//! start with a claim, then check their preconditions. A skip is returned as a value and the caller rolls the
//! transaction back, which also undoes the claim.
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::*;
use serde_json::json;
use sqlx::SqliteConnection;

use super::{escrow, jobs, ledger, orders, transactions, wallets};
use crate::{
    db_types::{
        Delivery,
        DeliveryStatus,
        EscrowEntry,
        EscrowEntryType,
        EscrowRole,
        EscrowStatus,
        GroupStatus,
        LedgerEntryType,
        NewEscrowEntry,
        NewWalletTransaction,
        OrderStatusType,
        TransactionStatus,
        TransactionType,
        Usd,
    },
    ledger_api::jobs::{JobPayload, DEFAULT_MAX_RETRIES},
    references,
    traits::{
        DoubleEntryRequest,
        DoubleEntryResult,
        EscrowError,
        FundingResult,
        Party,
        PayoutContext,
        PayoutOutcome,
        PayoutSummary,
        PendingResult,
        RiderPayout,
        SellerPayout,
        SkipReason,
    },
};

//--------------------------------------        Funding        ---------------------------------------------------------

/// Records the buyer's payment as an escrow deposit into the treasury wallet, and opens the order's escrow rows.
///
/// The seller earnings and platform commission rows are created PENDING: the money is committed, but not yet held
/// for anyone until delivery is confirmed.
pub async fn fund_escrow(
    order_id: i64,
    payment_reference: &str,
    ctx: &PayoutContext,
    conn: &mut SqliteConnection,
) -> Result<FundingResult, EscrowError> {
    let order = orders::mark_order_paid(order_id, payment_reference, conn)
        .await?
        .ok_or(EscrowError::OrderNotFound(order_id))?;
    if order.status == OrderStatusType::Cancelled {
        return Err(EscrowError::OrderCancelled(order_id));
    }
    let amount = order.total_amount;
    let fund_ref = references::escrow_fund(order_id);
    let mut created = false;
    if amount.is_positive() {
        let request = DoubleEntryRequest::new(
            Party::External(Some(order.buyer_id)),
            Party::User(ctx.treasury_user_id),
            amount,
            LedgerEntryType::EscrowDeposit,
            fund_ref.as_str(),
        )
        .for_order(order_id)
        .with_description(format!("Escrow deposit for order #{order_id} (payment {payment_reference})"));
        created = ledger::create_double_entry(&request, conn).await?.created;
    }

    let metadata = json!({
        "source": "fund_escrow_for_order",
        "payment_reference": payment_reference,
        "at": ctx.now,
    });
    let mut escrow_entries = Vec::new();
    let fund = NewEscrowEntry {
        order_id,
        seller_group_id: None,
        user_id: Some(order.buyer_id),
        role: EscrowRole::Buyer,
        entry_type: EscrowEntryType::Fund,
        amount,
        status: EscrowStatus::Held,
        reference: fund_ref,
        metadata: Some(metadata.clone()),
    };
    escrow_entries.push(escrow::idempotent_insert(fund, conn).await?.into_inner());

    let groups = orders::fetch_groups_for_order(order_id, conn).await?;
    for group in groups.iter().filter(|g| g.status != GroupStatus::Cancelled) {
        let split = ctx.rates.split(group.store_type, group.subtotal)?;
        let earning = NewEscrowEntry {
            order_id,
            seller_group_id: Some(group.id),
            user_id: Some(group.seller_id),
            role: EscrowRole::Seller,
            entry_type: EscrowEntryType::SellerEarning,
            amount: split.seller_net,
            status: EscrowStatus::Pending,
            reference: references::escrow_seller_earning(group.id),
            metadata: Some(metadata.clone()),
        };
        escrow_entries.push(escrow::idempotent_insert(earning, conn).await?.into_inner());
        let commission = NewEscrowEntry {
            order_id,
            seller_group_id: Some(group.id),
            user_id: Some(ctx.treasury_user_id),
            role: EscrowRole::Platform,
            entry_type: EscrowEntryType::PlatformCommission,
            amount: split.commission,
            status: EscrowStatus::Pending,
            reference: references::escrow_commission(group.id),
            metadata: Some(metadata.clone()),
        };
        escrow_entries.push(escrow::idempotent_insert(commission, conn).await?.into_inner());
    }
    if created {
        info!("💸️ Escrow funded with {amount} for order #{order_id}");
    } else {
        debug!("💸️ Escrow for order #{order_id} was already funded");
    }
    Ok(FundingResult { order_id, amount, created, escrow_entries })
}

/// Holds the order's earnings for release once delivery has been confirmed, and queues the release job.
///
/// Wallet `pending` figures only move for escrow rows that this call actually moved, so confirming the same delivery
/// twice changes nothing the second time.
pub async fn move_to_pending(
    order_id: i64,
    confirmed_at: DateTime<Utc>,
    release_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<PendingResult, EscrowError> {
    let metadata = json!({
        "source": "move_order_earnings_to_pending",
        "confirmed_at": confirmed_at,
        "release_at": release_at,
    });
    let held = escrow::transition_order_entries(
        order_id,
        &[EscrowEntryType::SellerEarning, EscrowEntryType::PlatformCommission],
        EscrowStatus::Pending,
        EscrowStatus::Held,
        &metadata,
        conn,
    )
    .await?;
    let order = orders::fetch_order(order_id, conn).await?.ok_or(EscrowError::OrderNotFound(order_id))?;
    if !order.is_paid {
        return Err(EscrowError::OrderNotPaid(order_id));
    }
    if order.status == OrderStatusType::Cancelled {
        return Err(EscrowError::OrderCancelled(order_id));
    }

    let mut seller_earnings_held = Usd::default();
    for row in held.iter().filter(|r| r.entry_type == EscrowEntryType::SellerEarning) {
        if let Some(seller_id) = row.user_id {
            let wallet = wallets::fetch_or_create_wallet(seller_id, conn).await?;
            wallets::adjust_pending(wallet.id, row.amount, conn).await?;
            seller_earnings_held += row.amount;
        }
    }

    let mut rider_earning_held = None;
    if let Some(delivery) = orders::fetch_delivery_for_order(order_id, conn).await? {
        if let Some(rider_id) = delivery.rider_id.filter(|_| delivery.delivery_fee.is_positive()) {
            let earning = NewEscrowEntry {
                order_id,
                seller_group_id: None,
                user_id: Some(rider_id),
                role: EscrowRole::Rider,
                entry_type: EscrowEntryType::RiderEarning,
                amount: delivery.delivery_fee,
                status: EscrowStatus::Held,
                reference: references::escrow_rider_earning(order_id),
                metadata: Some(metadata.clone()),
            };
            if escrow::idempotent_insert(earning, conn).await?.created() {
                let wallet = wallets::fetch_or_create_wallet(rider_id, conn).await?;
                wallets::adjust_pending(wallet.id, delivery.delivery_fee, conn).await?;
                rider_earning_held = Some(delivery.delivery_fee);
            }
        }
    }

    orders::mark_order_delivered(order_id, confirmed_at, conn).await?;
    orders::mark_delivery_delivered(order_id, confirmed_at, conn).await?;
    let payload = JobPayload::ReleaseOrderPayout { order_id, release_at };
    let job = jobs::insert_job(&payload, release_at, DEFAULT_MAX_RETRIES, Utc::now(), conn)
        .await
        .map_err(|e| EscrowError::JobError(e.to_string()))?;
    info!(
        "💸️ Order #{order_id} earnings held: {seller_earnings_held} for sellers, {} for the rider. Release at \
         {release_at}",
        rider_earning_held.unwrap_or_default()
    );
    Ok(PendingResult { order_id, seller_earnings_held, rider_earning_held, release_at, job_created: job.created() })
}

//--------------------------------------        Release        ---------------------------------------------------------

/// Releases every seller's net proceeds and the rider's fee for the order.
pub async fn release_order(
    order_id: i64,
    ctx: &PayoutContext,
    conn: &mut SqliteConnection,
) -> Result<PayoutOutcome, EscrowError> {
    if !orders::claim_order_release(order_id, conn).await? {
        let reason = match orders::fetch_order(order_id, conn).await? {
            None => SkipReason::OrderNotFound,
            Some(_) => SkipReason::AlreadyReleased,
        };
        return Ok(PayoutOutcome::Skipped(reason));
    }
    let Some(order) = orders::fetch_order(order_id, conn).await? else {
        return Ok(PayoutOutcome::Skipped(SkipReason::OrderNotFound));
    };
    if !order.is_paid {
        return Ok(PayoutOutcome::Skipped(SkipReason::NotPaid));
    }
    if order.status != OrderStatusType::Delivered {
        return Ok(PayoutOutcome::Skipped(SkipReason::NotDelivered));
    }
    if !ctx.ignore_disputes && orders::has_active_dispute(order_id, conn).await? {
        return Ok(PayoutOutcome::Skipped(SkipReason::ActiveDispute));
    }
    let Some(delivery) = orders::fetch_delivery_for_order(order_id, conn).await? else {
        return Ok(PayoutOutcome::Skipped(SkipReason::NoRiderAssigned));
    };
    let Some(rider_id) = delivery.rider_id else {
        return Ok(PayoutOutcome::Skipped(SkipReason::NoRiderAssigned));
    };
    if delivery.status != DeliveryStatus::Delivered {
        return Ok(PayoutOutcome::Skipped(SkipReason::DeliveryNotConfirmed));
    }
    if let Some(tx) = transactions::fetch_payout_for_order(order_id, conn).await? {
        debug!("💸️ Order #{order_id} already has payout transaction {}", tx.reference);
        return Ok(PayoutOutcome::Skipped(SkipReason::AlreadyPaid));
    }

    let metadata = json!({ "source": "release_order_payout", "released_at": ctx.now });
    let released = escrow::transition_order_entries(
        order_id,
        &[EscrowEntryType::SellerEarning, EscrowEntryType::PlatformCommission],
        EscrowStatus::Held,
        EscrowStatus::Released,
        &metadata,
        conn,
    )
    .await?;
    release_pending(released.iter().filter(|r| r.entry_type == EscrowEntryType::SellerEarning), conn).await?;
    let mut summary = PayoutSummary::new(order_id);
    let (net_by_seller, commission) = released_totals(&released);
    summary.commission = commission;

    for (seller_id, net) in net_by_seller {
        let reference = references::seller_payout_order(order_id, seller_id);
        let description = format!("Payout for order #{order_id}");
        credit_earnings(
            Party::User(seller_id),
            net,
            LedgerEntryType::SellerPayout,
            TransactionType::SellerPayout,
            &reference,
            order_id,
            &description,
            ctx,
            conn,
        )
        .await?;
        summary.sellers.push(SellerPayout { seller_id, amount: net });
    }
    summary.rider = pay_rider(&delivery, rider_id, ctx, &metadata, conn).await?;

    orders::complete_rider_payout(delivery.id, conn).await?;
    orders::complete_order_groups(order_id, ctx.now, conn).await?;
    orders::complete_order(order_id, conn).await?;
    let fund_ref = references::escrow_fund(order_id);
    escrow::transition_entry(&fund_ref, EscrowStatus::Held, EscrowStatus::Released, &metadata, conn).await?;
    info!(
        "💸️ Order #{order_id} released. {} paid out to {} seller(s) and the rider, {} commission retained",
        summary.total_paid(),
        summary.sellers.len(),
        summary.commission
    );
    Ok(PayoutOutcome::Released(summary))
}

/// Releases one seller group's net proceeds to its seller.
pub async fn release_group(
    group_id: i64,
    ctx: &PayoutContext,
    conn: &mut SqliteConnection,
) -> Result<PayoutOutcome, EscrowError> {
    if !orders::claim_group_payout(group_id, conn).await? {
        let reason = match orders::fetch_group(group_id, conn).await? {
            None => SkipReason::GroupNotFound,
            Some(_) => SkipReason::AlreadyReleased,
        };
        return Ok(PayoutOutcome::Skipped(reason));
    }
    let Some(group) = orders::fetch_group(group_id, conn).await? else {
        return Ok(PayoutOutcome::Skipped(SkipReason::GroupNotFound));
    };
    let order_id = group.order_id;
    let Some(order) = orders::fetch_order(order_id, conn).await? else {
        return Ok(PayoutOutcome::Skipped(SkipReason::OrderNotFound));
    };
    if !order.is_paid {
        return Ok(PayoutOutcome::Skipped(SkipReason::NotPaid));
    }
    if group.status != GroupStatus::Delivered {
        return Ok(PayoutOutcome::Skipped(SkipReason::NotDelivered));
    }
    if !ctx.ignore_disputes && orders::has_active_dispute(order_id, conn).await? {
        return Ok(PayoutOutcome::Skipped(SkipReason::ActiveDispute));
    }
    let reference = references::seller_payout_group(group_id);
    if transactions::fetch_by_reference(&reference, conn).await?.is_some() {
        return Ok(PayoutOutcome::Skipped(SkipReason::AlreadyPaid));
    }

    let metadata = json!({ "source": "release_seller_group_payout", "group_id": group_id, "released_at": ctx.now });
    let released = escrow::transition_group_entries(
        group_id,
        &[EscrowEntryType::SellerEarning, EscrowEntryType::PlatformCommission],
        EscrowStatus::Held,
        EscrowStatus::Released,
        &metadata,
        conn,
    )
    .await?;
    if !released.iter().any(|r| r.entry_type == EscrowEntryType::SellerEarning) {
        debug!("💸️ Seller group #{group_id} has no held earnings to release");
        return Ok(PayoutOutcome::Skipped(SkipReason::NotEligible));
    }
    release_pending(released.iter().filter(|r| r.entry_type == EscrowEntryType::SellerEarning), conn).await?;
    let (net_by_seller, commission) = released_totals(&released);
    let net = net_by_seller.values().copied().sum::<Usd>();
    let description = format!("Payout for seller group #{group_id} of order #{order_id}");
    credit_earnings(
        Party::User(group.seller_id),
        net,
        LedgerEntryType::SellerPayout,
        TransactionType::SellerPayout,
        &reference,
        order_id,
        &description,
        ctx,
        conn,
    )
    .await?;
    orders::complete_group_payout(group_id, ctx.now, conn).await?;
    if orders::release_order_if_groups_paid(order_id, conn).await? {
        let fund_ref = references::escrow_fund(order_id);
        escrow::transition_entry(&fund_ref, EscrowStatus::Held, EscrowStatus::Released, &metadata, conn).await?;
        debug!("💸️ All seller groups of order #{order_id} are paid out. The order payout is released.");
    }
    info!("💸️ Seller group #{group_id} released {net} to seller #{}", group.seller_id);
    let mut summary = PayoutSummary::new(order_id);
    summary.sellers.push(SellerPayout { seller_id: group.seller_id, amount: net });
    summary.commission = commission;
    Ok(PayoutOutcome::Released(summary))
}

/// Releases the delivery fee to the rider.
pub async fn release_rider(
    delivery_id: i64,
    ctx: &PayoutContext,
    conn: &mut SqliteConnection,
) -> Result<PayoutOutcome, EscrowError> {
    if !orders::claim_rider_payout(delivery_id, conn).await? {
        let reason = match orders::fetch_delivery(delivery_id, conn).await? {
            None => SkipReason::DeliveryNotFound,
            Some(_) => SkipReason::AlreadyReleased,
        };
        return Ok(PayoutOutcome::Skipped(reason));
    }
    let Some(delivery) = orders::fetch_delivery(delivery_id, conn).await? else {
        return Ok(PayoutOutcome::Skipped(SkipReason::DeliveryNotFound));
    };
    let Some(rider_id) = delivery.rider_id else {
        return Ok(PayoutOutcome::Skipped(SkipReason::NoRiderAssigned));
    };
    if delivery.status != DeliveryStatus::Delivered {
        return Ok(PayoutOutcome::Skipped(SkipReason::DeliveryNotConfirmed));
    }
    let Some(order) = orders::fetch_order(delivery.order_id, conn).await? else {
        return Ok(PayoutOutcome::Skipped(SkipReason::OrderNotFound));
    };
    if !order.is_paid {
        return Ok(PayoutOutcome::Skipped(SkipReason::NotPaid));
    }
    if !ctx.ignore_disputes && orders::has_active_dispute(order.id, conn).await? {
        return Ok(PayoutOutcome::Skipped(SkipReason::ActiveDispute));
    }
    if transactions::fetch_by_reference(&references::rider_payout_delivery(delivery_id), conn).await?.is_some() {
        return Ok(PayoutOutcome::Skipped(SkipReason::AlreadyPaid));
    }
    let metadata = json!({ "source": "release_rider_payout", "delivery_id": delivery_id, "released_at": ctx.now });
    let mut summary = PayoutSummary::new(order.id);
    summary.rider = pay_rider(&delivery, rider_id, ctx, &metadata, conn).await?;
    orders::complete_rider_payout(delivery_id, conn).await?;
    info!("💸️ Delivery #{delivery_id} fee of {} released to rider #{rider_id}", delivery.delivery_fee);
    Ok(PayoutOutcome::Released(summary))
}

//--------------------------------------      Hub timeout      ---------------------------------------------------------

/// Cancels a general-store seller group that never made it to the hub, and refunds its subtotal to the buyer's
/// wallet. When no live groups remain, the rest of the order (the delivery fee) is refunded and the order cancelled.
pub async fn refund_hub_timeout(
    group_id: i64,
    ctx: &PayoutContext,
    conn: &mut SqliteConnection,
) -> Result<PayoutOutcome, EscrowError> {
    if !orders::claim_group_for_hub_timeout(group_id, conn).await? {
        let reason = match orders::fetch_group(group_id, conn).await? {
            None => SkipReason::GroupNotFound,
            Some(_) => SkipReason::NotEligible,
        };
        return Ok(PayoutOutcome::Skipped(reason));
    }
    let Some(group) = orders::fetch_group(group_id, conn).await? else {
        return Ok(PayoutOutcome::Skipped(SkipReason::GroupNotFound));
    };
    let order_id = group.order_id;
    let Some(order) = orders::fetch_order(order_id, conn).await? else {
        return Ok(PayoutOutcome::Skipped(SkipReason::OrderNotFound));
    };
    if !order.is_paid {
        return Ok(PayoutOutcome::Skipped(SkipReason::NotPaid));
    }

    let metadata = json!({ "source": "hub_timeout_refund", "group_id": group_id, "at": ctx.now });
    let entry_types = [EscrowEntryType::SellerEarning, EscrowEntryType::PlatformCommission];
    let (held, pending, cancelled) = (EscrowStatus::Held, EscrowStatus::Pending, EscrowStatus::Cancelled);
    let held = escrow::transition_group_entries(group_id, &entry_types, held, cancelled, &metadata, conn).await?;
    release_pending(held.iter().filter(|r| r.entry_type == EscrowEntryType::SellerEarning), conn).await?;
    escrow::transition_group_entries(group_id, &entry_types, pending, cancelled, &metadata, conn).await?;

    let mut summary = PayoutSummary::new(order_id);
    let reference = references::hub_timeout_refund(group_id);
    let description = format!("Refund for seller group #{group_id} of order #{order_id}: not received at the hub");
    let refund = Refund { buyer_id: order.buyer_id, amount: group.subtotal, group_id: Some(group_id), order_id };
    refund_buyer(refund, &reference, &description, ctx, &metadata, conn).await?;
    summary.refunded += group.subtotal;

    let order = orders::reduce_order_total(order_id, group.subtotal, conn)
        .await?
        .ok_or(EscrowError::OrderNotFound(order_id))?;
    if orders::count_live_groups(order_id, conn).await? == 0 {
        let reference = references::hub_timeout_refund_order(order_id);
        let description = format!("Refund of the remaining balance of order #{order_id}: every seller group timed out");
        let refund = Refund { buyer_id: order.buyer_id, amount: order.total_amount, group_id: None, order_id };
        refund_buyer(refund, &reference, &description, ctx, &metadata, conn).await?;
        summary.refunded += order.total_amount;
        orders::cancel_order(order_id, conn).await?;
        let fund_ref = references::escrow_fund(order_id);
        escrow::transition_entry(&fund_ref, EscrowStatus::Held, EscrowStatus::Cancelled, &metadata, conn).await?;
        info!("💸️ Order #{order_id} cancelled after every seller group missed the hub");
    }
    info!(
        "💸️ Seller group #{group_id} timed out at the hub. {} refunded to buyer #{}",
        summary.refunded, order.buyer_id
    );
    Ok(PayoutOutcome::Released(summary))
}

//--------------------------------------        Helpers        ---------------------------------------------------------

/// Takes released (or cancelled) earning rows off their owners' `pending` figures.
async fn release_pending<'a, I>(rows: I, conn: &mut SqliteConnection) -> Result<(), EscrowError>
where I: Iterator<Item = &'a EscrowEntry> {
    for row in rows {
        if let Some(user_id) = row.user_id {
            let wallet = wallets::fetch_or_create_wallet(user_id, conn).await?;
            wallets::adjust_pending(wallet.id, -row.remaining(), conn).await?;
        }
    }
    Ok(())
}

/// What the released rows owe: each seller's unwithdrawn earnings, and the platform's commission. The split was fixed
/// when the escrow was funded and is never recomputed here.
fn released_totals(released: &[EscrowEntry]) -> (BTreeMap<i64, Usd>, Usd) {
    let mut net_by_seller = BTreeMap::<i64, Usd>::new();
    let mut commission = Usd::default();
    for row in released {
        match (row.entry_type, row.user_id) {
            (EscrowEntryType::SellerEarning, Some(seller_id)) => {
                *net_by_seller.entry(seller_id).or_default() += row.remaining();
            },
            (EscrowEntryType::PlatformCommission, _) => commission += row.amount,
            _ => {},
        }
    }
    (net_by_seller, commission)
}

/// Moves `amount` from the treasury to the recipient's available balance, counts it as earnings, and records the
/// history row. Earnings are only counted when the ledger movement is new.
#[allow(clippy::too_many_arguments)]
async fn credit_earnings(
    recipient: Party,
    amount: Usd,
    entry_type: LedgerEntryType,
    tx_type: TransactionType,
    reference: &str,
    order_id: i64,
    description: &str,
    ctx: &PayoutContext,
    conn: &mut SqliteConnection,
) -> Result<(), EscrowError> {
    if !amount.is_positive() {
        return Ok(());
    }
    let request = DoubleEntryRequest::new(Party::User(ctx.treasury_user_id), recipient, amount, entry_type, reference)
        .for_order(order_id)
        .with_description(description);
    let result = ledger::create_double_entry(&request, conn).await?;
    let wallet_id = credited_wallet(&result, reference)?;
    if result.created {
        wallets::add_earnings(wallet_id, amount, conn).await?;
    }
    let tx = NewWalletTransaction {
        wallet_id,
        order_id: Some(order_id),
        user_id: result.credit.user_id,
        amount,
        tx_type,
        status: TransactionStatus::Success,
        reference: reference.to_string(),
        description: Some(description.to_string()),
    };
    transactions::idempotent_insert(tx, conn).await?;
    Ok(())
}

async fn pay_rider(
    delivery: &Delivery,
    rider_id: i64,
    ctx: &PayoutContext,
    metadata: &serde_json::Value,
    conn: &mut SqliteConnection,
) -> Result<Option<RiderPayout>, EscrowError> {
    let earning_ref = references::escrow_rider_earning(delivery.order_id);
    let released =
        escrow::transition_entry(&earning_ref, EscrowStatus::Held, EscrowStatus::Released, metadata, conn).await?;
    if let Some(row) = released {
        release_pending(std::iter::once(&row), conn).await?;
    }
    let fee = delivery.delivery_fee;
    if !fee.is_positive() {
        return Ok(None);
    }
    let reference = references::rider_payout_delivery(delivery.id);
    let description = format!("Delivery fee for order #{}", delivery.order_id);
    credit_earnings(
        Party::User(rider_id),
        fee,
        LedgerEntryType::RiderPayout,
        TransactionType::Earning,
        &reference,
        delivery.order_id,
        &description,
        ctx,
        conn,
    )
    .await?;
    Ok(Some(RiderPayout { rider_id, amount: fee }))
}

struct Refund {
    buyer_id: i64,
    amount: Usd,
    group_id: Option<i64>,
    order_id: i64,
}

/// Refunds the buyer from the treasury into their wallet, with a REFUND history row and a REFUND escrow row.
async fn refund_buyer(
    refund: Refund,
    reference: &str,
    description: &str,
    ctx: &PayoutContext,
    metadata: &serde_json::Value,
    conn: &mut SqliteConnection,
) -> Result<(), EscrowError> {
    let Refund { buyer_id, amount, group_id, order_id } = refund;
    if !amount.is_positive() {
        return Ok(());
    }
    let treasury = Party::User(ctx.treasury_user_id);
    let request = DoubleEntryRequest::new(treasury, Party::User(buyer_id), amount, LedgerEntryType::Refund, reference)
        .for_order(order_id)
        .with_description(description);
    let result = ledger::create_double_entry(&request, conn).await?;
    let wallet_id = credited_wallet(&result, reference)?;
    let tx = NewWalletTransaction {
        wallet_id,
        order_id: Some(order_id),
        user_id: Some(buyer_id),
        amount,
        tx_type: TransactionType::Refund,
        status: TransactionStatus::Success,
        reference: reference.to_string(),
        description: Some(description.to_string()),
    };
    transactions::idempotent_insert(tx, conn).await?;
    let refund = NewEscrowEntry {
        order_id,
        seller_group_id: group_id,
        user_id: Some(buyer_id),
        role: EscrowRole::Buyer,
        entry_type: EscrowEntryType::Refund,
        amount,
        status: EscrowStatus::Released,
        reference: reference.to_string(),
        metadata: Some(metadata.clone()),
    };
    escrow::idempotent_insert(refund, conn).await?;
    Ok(())
}

fn credited_wallet(result: &DoubleEntryResult, reference: &str) -> Result<i64, EscrowError> {
    result.credit.wallet_id.ok_or_else(|| EscrowError::DatabaseError(format!("{reference} credited no wallet")))
}
