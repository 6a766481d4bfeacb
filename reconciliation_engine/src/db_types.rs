use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use cpg_common::Money;
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

//--------------------------------------        OrderId        -------------------------------------------------------

/// The human-readable order reference that appears on invoices and is attached to provider
/// payments as the payment reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------     OrderStatus       -------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatus {
    /// The order exists but no payment outcome has been applied.
    Unpaid,
    /// A payment has been requested and the customer was sent to a 3DS challenge.
    PendingChallenge,
    /// The payment was approved and the funds are reserved but not yet captured.
    Authorized,
    /// The funds have been captured.
    Captured,
    /// The payment was declined or failed authentication.
    Declined,
    /// The authorization was voided before capture.
    Voided,
    /// The payment was approved but flagged by the provider's risk engine. Needs manual review.
    Flagged,
    /// Part of the captured amount has been refunded.
    PartiallyRefunded,
    /// The full captured amount has been refunded.
    Refunded,
}

impl OrderStatus {
    /// True while the order is still waiting for its first payment outcome. Fulfilment side
    /// effects may only fire on a transition out of a pending status.
    pub fn is_pending(&self) -> bool {
        matches!(self, OrderStatus::Unpaid | OrderStatus::PendingChallenge)
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Unpaid => write!(f, "Unpaid"),
            OrderStatus::PendingChallenge => write!(f, "PendingChallenge"),
            OrderStatus::Authorized => write!(f, "Authorized"),
            OrderStatus::Captured => write!(f, "Captured"),
            OrderStatus::Declined => write!(f, "Declined"),
            OrderStatus::Voided => write!(f, "Voided"),
            OrderStatus::Flagged => write!(f, "Flagged"),
            OrderStatus::PartiallyRefunded => write!(f, "PartiallyRefunded"),
            OrderStatus::Refunded => write!(f, "Refunded"),
        }
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Unpaid");
            OrderStatus::Unpaid
        })
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion: {0}")]
pub struct ConversionError(pub String);

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Unpaid" => Ok(Self::Unpaid),
            "PendingChallenge" => Ok(Self::PendingChallenge),
            "Authorized" => Ok(Self::Authorized),
            "Captured" => Ok(Self::Captured),
            "Declined" => Ok(Self::Declined),
            "Voided" => Ok(Self::Voided),
            "Flagged" => Ok(Self::Flagged),
            "PartiallyRefunded" => Ok(Self::PartiallyRefunded),
            "Refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------        Order          -------------------------------------------------------

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_number: OrderId,
    /// Secret key handed to the customer at checkout. Must round-trip through the redirect
    /// before an explicit order-id match is trusted.
    pub order_key: String,
    pub customer_email: Option<String>,
    pub currency: String,
    pub total_amount: Money,
    pub refunded_total: Money,
    pub status: OrderStatus,
    /// The provider payment id, once a payment has been pinned to this order.
    pub payment_id: Option<String>,
    /// The provider checkout session id, carried through the redirect round-trip.
    pub session_id: Option<String>,
    pub payment_method: Option<String>,
    /// The provider action id of the most recent applied transition.
    pub transaction_id: Option<String>,
    pub authorized: bool,
    pub save_card: bool,
    pub billing_name: Option<String>,
    pub billing_line1: Option<String>,
    pub billing_line2: Option<String>,
    pub billing_city: Option<String>,
    pub billing_state: Option<String>,
    pub billing_postcode: Option<String>,
    pub billing_country: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn outstanding_amount(&self) -> Money {
        self.total_amount - self.refunded_total
    }
}

//--------------------------------------       NewOrder        -------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct NewOrder {
    pub order_number: OrderId,
    pub order_key: String,
    pub customer_email: Option<String>,
    pub currency: String,
    pub total_amount: Money,
    pub session_id: Option<String>,
    pub payment_method: Option<String>,
    pub save_card: bool,
    pub billing_name: Option<String>,
    pub billing_line1: Option<String>,
    pub billing_line2: Option<String>,
    pub billing_city: Option<String>,
    pub billing_state: Option<String>,
    pub billing_postcode: Option<String>,
    pub billing_country: Option<String>,
    pub lines: Vec<NewOrderLine>,
}

impl NewOrder {
    pub fn new(order_number: OrderId, order_key: String, currency: String, total_amount: Money) -> Self {
        Self { order_number, order_key, currency, total_amount, ..Default::default() }
    }
}

//--------------------------------------      Order lines      -------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum LineKind {
    Product,
    Shipping,
}

impl Display for LineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineKind::Product => write!(f, "Product"),
            LineKind::Shipping => write!(f, "Shipping"),
        }
    }
}

impl From<String> for LineKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Shipping" => Self::Shipping,
            _ => Self::Product,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: i64,
    pub order_id: i64,
    pub product_id: Option<i64>,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub kind: LineKind,
}

#[derive(Debug, Clone)]
pub struct NewOrderLine {
    pub product_id: Option<i64>,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub kind: LineKind,
}

impl NewOrderLine {
    pub fn subtotal(&self) -> Money {
        self.unit_price * self.quantity
    }
}

//--------------------------------------      Order notes      -------------------------------------------------------

/// Append-only audit trail. One row per applied transition or noteworthy non-transition.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderNote {
    pub id: i64,
    pub order_id: i64,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------      Storefront       -------------------------------------------------------

#[derive(Debug, Clone, FromRow)]
pub struct CartItem {
    pub product_id: i64,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
}

#[derive(Debug, Clone)]
pub struct Cart {
    pub token: String,
    pub items: Vec<CartItem>,
    pub shipping_method: Option<String>,
    pub shipping_cost: Money,
}

impl Cart {
    pub fn total(&self) -> Money {
        self.items.iter().map(|i| i.unit_price * i.quantity).sum::<Money>() + self.shipping_cost
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn order_status_round_trip() {
        for status in [
            OrderStatus::Unpaid,
            OrderStatus::PendingChallenge,
            OrderStatus::Authorized,
            OrderStatus::Captured,
            OrderStatus::Declined,
            OrderStatus::Voided,
            OrderStatus::Flagged,
            OrderStatus::PartiallyRefunded,
            OrderStatus::Refunded,
        ] {
            assert_eq!(status.to_string().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("Shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn new_order_fills_the_rest_with_defaults() {
        let order = NewOrder::new(OrderId("1001".into()), "key".into(), "USD".into(), Money::from(100));
        assert_eq!(order.order_number.as_str(), "1001");
        assert!(order.session_id.is_none());
        assert!(order.lines.is_empty());
        assert!(!order.save_card);
        assert_eq!(OrderId::default().as_str(), "");
    }

    #[test]
    fn pending_statuses() {
        assert!(OrderStatus::Unpaid.is_pending());
        assert!(OrderStatus::PendingChallenge.is_pending());
        assert!(!OrderStatus::Authorized.is_pending());
        assert!(!OrderStatus::Declined.is_pending());
    }

    #[test]
    fn cart_total_includes_shipping() {
        let cart = Cart {
            token: "t".into(),
            items: vec![
                CartItem { product_id: 1, name: "A".into(), quantity: 2, unit_price: Money::from(500) },
                CartItem { product_id: 2, name: "B".into(), quantity: 1, unit_price: Money::from(1200) },
            ],
            shipping_method: Some("flat_rate".into()),
            shipping_cost: Money::from(300),
        };
        assert_eq!(cart.total(), Money::from(2500));
    }
}
