//! Idempotency keys.
//!
//! Every financial effect is keyed by one of these strings, and the keys are unique per table. Changing a format
//! here means already-applied operations will no longer be recognised on retry, so treat them as persisted data.
use crate::db_types::WithdrawalKind;

/// Escrow deposit of the buyer's payment. Also the buyer's FUND escrow row.
pub fn escrow_fund(order_id: i64) -> String {
    format!("escrow-fund-{order_id}")
}

pub fn escrow_seller_earning(group_id: i64) -> String {
    format!("escrow-seller-{group_id}")
}

pub fn escrow_commission(group_id: i64) -> String {
    format!("escrow-commission-{group_id}")
}

pub fn escrow_rider_earning(order_id: i64) -> String {
    format!("escrow-rider-{order_id}")
}

/// Order-level release to one seller, aggregated over all of that seller's groups in the order.
pub fn seller_payout_order(order_id: i64, seller_id: i64) -> String {
    format!("seller-payout-order-{order_id}-{seller_id}")
}

pub fn seller_payout_group(group_id: i64) -> String {
    format!("seller-payout-group-{group_id}")
}

/// Shared by the order-level and the delivery-level rider release, so only one of them can ever pay.
pub fn rider_payout_delivery(delivery_id: i64) -> String {
    format!("rider-payout-delivery-{delivery_id}")
}

pub fn hub_timeout_refund(group_id: i64) -> String {
    format!("hub-timeout-refund-{group_id}")
}

/// Refund of whatever is left of an order (the delivery fee) once every group has timed out.
pub fn hub_timeout_refund_order(order_id: i64) -> String {
    format!("hub-timeout-refund-order-{order_id}")
}

/// The transfer idempotency key, the settlement ledger pair and the settlement transaction.
pub fn withdrawal(kind: WithdrawalKind, id: i64) -> String {
    format!("{}-withdrawal-{id}", kind.prefix())
}

pub fn withdrawal_reserve(kind: WithdrawalKind, id: i64) -> String {
    format!("{}-reserve", withdrawal(kind, id))
}

pub fn withdrawal_reversal(kind: WithdrawalKind, id: i64) -> String {
    format!("{}-reversal", withdrawal(kind, id))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn withdrawal_keys() {
        assert_eq!(withdrawal(WithdrawalKind::Rider, 12), "rider-withdrawal-12");
        assert_eq!(withdrawal_reserve(WithdrawalKind::Seller, 3), "seller-withdrawal-3-reserve");
        assert_eq!(withdrawal_reversal(WithdrawalKind::Seller, 3), "seller-withdrawal-3-reversal");
    }

    #[test]
    fn payout_keys_do_not_collide() {
        assert_ne!(hub_timeout_refund(5), hub_timeout_refund_order(5));
        assert_ne!(seller_payout_group(5), seller_payout_order(5, 5));
    }
}
