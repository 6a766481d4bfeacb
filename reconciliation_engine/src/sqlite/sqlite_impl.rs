//! `SqliteDatabase` is a concrete implementation of a reconciliation engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements the traits defined in the [`crate::traits`] module.
use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use cpg_common::Money;
use log::*;
use sqlx::SqlitePool;

use super::db::{db_url, new_pool, orders, storefront};
use crate::{
    db_types::{Cart, NewOrder, Order, OrderId, OrderLine, OrderNote, OrderStatus},
    traits::{ClaimResult, PaymentEngineError, PaymentTransition, ReconciliationDatabase},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Connect using the URL from the environment, or the default store path.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        debug!("🗃️ Connected to database {url}");
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl ReconciliationDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), PaymentEngineError> {
        let mut tx = self.pool.begin().await?;
        let result = orders::idempotent_insert(order, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn insert_order_for_payment(
        &self,
        order: NewOrder,
        payment_id: &str,
    ) -> Result<(Order, bool), PaymentEngineError> {
        let mut tx = self.pool.begin().await?;
        if let Some(existing) = orders::fetch_order_by_payment_id(payment_id, &mut tx).await? {
            tx.commit().await?;
            debug!("🗃️ Payment {payment_id} is already pinned to order id {}. Not inserting.", existing.id);
            return Ok((existing, false));
        }
        let (inserted, created) = orders::idempotent_insert(order, &mut tx).await?;
        orders::claim_payment_id(inserted.id, payment_id, &mut tx).await?;
        let order = orders::fetch_order_by_id(inserted.id, &mut tx)
            .await?
            .ok_or(PaymentEngineError::OrderIdNotFound(inserted.id))?;
        tx.commit().await?;
        Ok((order, created))
    }

    async fn fetch_order_by_id(&self, id: i64) -> Result<Option<Order>, PaymentEngineError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_id(id, &mut conn).await?)
    }

    async fn fetch_order_by_reference(&self, reference: &OrderId) -> Result<Option<Order>, PaymentEngineError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_reference(reference, &mut conn).await?)
    }

    async fn fetch_order_by_payment_id(&self, payment_id: &str) -> Result<Option<Order>, PaymentEngineError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_payment_id(payment_id, &mut conn).await?)
    }

    async fn fetch_order_by_session_id(&self, session_id: &str) -> Result<Option<Order>, PaymentEngineError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_session_id(session_id, &mut conn).await?)
    }

    async fn fetch_pending_orders_for_email(
        &self,
        email: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<Order>, PaymentEngineError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_pending_orders_for_email(email, window, now, &mut conn).await?)
    }

    async fn fetch_order_lines(&self, order_id: i64) -> Result<Vec<OrderLine>, PaymentEngineError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_lines(order_id, &mut conn).await?)
    }

    async fn fetch_order_notes(&self, order_id: i64) -> Result<Vec<OrderNote>, PaymentEngineError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_notes(order_id, &mut conn).await?)
    }

    async fn claim_payment_id(&self, order_id: i64, payment_id: &str) -> Result<ClaimResult, PaymentEngineError> {
        let mut tx = self.pool.begin().await?;
        let result = orders::claim_payment_id(order_id, payment_id, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn apply_payment_approval(
        &self,
        order_id: i64,
        transition: PaymentTransition,
    ) -> Result<Option<Order>, PaymentEngineError> {
        let mut tx = self.pool.begin().await?;
        let result = orders::apply_payment_approval(order_id, &transition, &mut tx).await?;
        tx.commit().await?;
        if let Some(order) = &result {
            info!("🗃️ Order {} moved to {} by payment {}", order.order_number, order.status, transition.payment_id);
        }
        Ok(result)
    }

    async fn mark_captured(
        &self,
        order_id: i64,
        transaction_id: &str,
        note: &str,
    ) -> Result<Order, PaymentEngineError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::mark_captured(order_id, transaction_id, note, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn mark_voided(
        &self,
        order_id: i64,
        transaction_id: Option<&str>,
        note: &str,
    ) -> Result<Order, PaymentEngineError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::mark_voided(order_id, transaction_id, note, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn mark_declined(&self, order_id: i64, payment_id: &str, note: &str) -> Result<Order, PaymentEngineError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::mark_declined(order_id, payment_id, note, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn record_refund(
        &self,
        order_id: i64,
        amount: Money,
        transaction_id: Option<&str>,
        new_status: OrderStatus,
        note: &str,
    ) -> Result<Order, PaymentEngineError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::record_refund(order_id, amount, transaction_id, new_status, note, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn append_order_note(&self, order_id: i64, note: &str) -> Result<OrderNote, PaymentEngineError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::insert_order_note(order_id, note, &mut conn).await?)
    }

    async fn fetch_cart(&self, token: &str) -> Result<Option<Cart>, PaymentEngineError> {
        let mut conn = self.pool.acquire().await?;
        Ok(storefront::fetch_cart(token, &mut conn).await?)
    }

    async fn clear_cart(&self, token: &str) -> Result<(), PaymentEngineError> {
        let mut conn = self.pool.acquire().await?;
        Ok(storefront::clear_cart(token, &mut conn).await?)
    }
}
