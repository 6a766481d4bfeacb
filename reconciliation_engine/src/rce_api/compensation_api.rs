use std::fmt::Debug;

use cpg_common::Money;
use log::*;
use provider_client::{CaptureRequest, PaymentStatus, RefundRequest, VoidRequest};

use crate::{
    db_types::{Order, OrderStatus},
    traits::{PaymentEngineError, PaymentProvider, ReconciliationDatabase},
};

/// Result of a merchant-initiated compensation operation.
#[derive(Debug, Clone)]
pub enum CompensationOutcome {
    Completed(Order),
    /// The provider call timed out. The operation may or may not have landed remotely, so
    /// nothing was written locally. The operator must re-check before retrying.
    Unknown(Order),
}

/// `CompensationApi` carries the merchant-initiated operations that push local intent at the
/// provider: capture, void and refund. Every operation re-reads the remote payment state first,
/// so a stale local record cannot double-move funds.
pub struct CompensationApi<B, P> {
    db: B,
    provider: P,
}

impl<B, P> Debug for CompensationApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CompensationApi")
    }
}

impl<B, P> CompensationApi<B, P> {
    pub fn new(db: B, provider: P) -> Self {
        Self { db, provider }
    }
}

impl<B, P> CompensationApi<B, P>
where
    B: ReconciliationDatabase,
    P: PaymentProvider,
{
    pub async fn capture(&self, order_id: i64, amount: Option<Money>) -> Result<CompensationOutcome, PaymentEngineError> {
        let (order, payment_id) = self.order_with_payment(order_id).await?;
        let remote = match self.provider.get_payment_details(&payment_id).await {
            Ok(p) => p,
            Err(e) if e.is_indeterminate() => return Ok(CompensationOutcome::Unknown(order)),
            Err(e) => return Err(e.into()),
        };
        if matches!(remote.status, PaymentStatus::Voided | PaymentStatus::Captured) {
            return Err(remote_conflict(order_id, remote.status));
        }
        let request = CaptureRequest { amount, reference: Some(order.order_number.0.clone()) };
        let action = match self.provider.capture_payment(&payment_id, &request).await {
            Ok(a) => a,
            Err(e) if e.is_indeterminate() => {
                warn!("🛠️ Capture of payment {payment_id} timed out. Remote outcome unknown.");
                return Ok(CompensationOutcome::Unknown(order));
            },
            Err(e) => return Err(e.into()),
        };
        let note = match amount {
            Some(a) if a < order.total_amount => {
                format!("Payment {payment_id} partially captured: {a} of {}. Action id {}.", order.total_amount, action.action_id)
            },
            _ => format!("Payment {payment_id} captured. Action id {}.", action.action_id),
        };
        let order = self.db.mark_captured(order.id, &action.action_id, &note).await?;
        info!("🛠️ Order {} captured via payment {payment_id}", order.order_number);
        Ok(CompensationOutcome::Completed(order))
    }

    pub async fn void(&self, order_id: i64) -> Result<CompensationOutcome, PaymentEngineError> {
        let (order, payment_id) = self.order_with_payment(order_id).await?;
        let remote = match self.provider.get_payment_details(&payment_id).await {
            Ok(p) => p,
            Err(e) if e.is_indeterminate() => return Ok(CompensationOutcome::Unknown(order)),
            Err(e) => return Err(e.into()),
        };
        if matches!(remote.status, PaymentStatus::Voided | PaymentStatus::Captured) {
            return Err(remote_conflict(order_id, remote.status));
        }
        let request = VoidRequest { reference: Some(order.order_number.0.clone()) };
        let action = match self.provider.void_payment(&payment_id, &request).await {
            Ok(a) => a,
            Err(e) if e.is_indeterminate() => {
                warn!("🛠️ Void of payment {payment_id} timed out. Remote outcome unknown.");
                return Ok(CompensationOutcome::Unknown(order));
            },
            Err(e) => return Err(e.into()),
        };
        let note = format!("Authorization for payment {payment_id} voided. Action id {}.", action.action_id);
        let order = self.db.mark_voided(order.id, Some(&action.action_id), &note).await?;
        info!("🛠️ Order {} voided via payment {payment_id}", order.order_number);
        Ok(CompensationOutcome::Completed(order))
    }

    /// Refund the captured funds, in full by default or partially when an amount is given.
    pub async fn refund(&self, order_id: i64, amount: Option<Money>) -> Result<CompensationOutcome, PaymentEngineError> {
        let (order, payment_id) = self.order_with_payment(order_id).await?;
        let remote = match self.provider.get_payment_details(&payment_id).await {
            Ok(p) => p,
            Err(e) if e.is_indeterminate() => return Ok(CompensationOutcome::Unknown(order)),
            Err(e) => return Err(e.into()),
        };
        if remote.status == PaymentStatus::Refunded {
            return Err(remote_conflict(order_id, remote.status));
        }
        let outstanding = order.outstanding_amount();
        let amount = amount.unwrap_or(outstanding);
        if !amount.is_positive() || amount > outstanding {
            return Err(PaymentEngineError::RefundExceedsOutstanding { requested: amount, outstanding });
        }
        let request = RefundRequest { amount: Some(amount), reference: Some(order.order_number.0.clone()) };
        let action = match self.provider.refund_payment(&payment_id, &request).await {
            Ok(a) => a,
            Err(e) if e.is_indeterminate() => {
                warn!("🛠️ Refund of payment {payment_id} timed out. Remote outcome unknown.");
                return Ok(CompensationOutcome::Unknown(order));
            },
            Err(e) => return Err(e.into()),
        };
        let new_status =
            if amount >= outstanding { OrderStatus::Refunded } else { OrderStatus::PartiallyRefunded };
        let note = match new_status {
            OrderStatus::Refunded => format!("Payment {payment_id} refunded in full. Action id {}.", action.action_id),
            _ => format!("Payment {payment_id} partially refunded: {amount}. Action id {}.", action.action_id),
        };
        let order = self.db.record_refund(order.id, amount, Some(&action.action_id), new_status, &note).await?;
        info!("🛠️ Order {} refunded {amount} via payment {payment_id}", order.order_number);
        Ok(CompensationOutcome::Completed(order))
    }

    async fn order_with_payment(&self, order_id: i64) -> Result<(Order, String), PaymentEngineError> {
        let order =
            self.db.fetch_order_by_id(order_id).await?.ok_or(PaymentEngineError::OrderIdNotFound(order_id))?;
        let payment_id = order.payment_id.clone().ok_or(PaymentEngineError::NoPaymentForOrder(order_id))?;
        Ok((order, payment_id))
    }
}

fn remote_conflict(order_id: i64, status: PaymentStatus) -> PaymentEngineError {
    PaymentEngineError::RemoteStateConflict { order_id, status: format!("{status:?}") }
}
