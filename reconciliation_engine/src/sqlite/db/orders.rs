use chrono::{DateTime, Duration, Utc};
use cpg_common::Money;
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{LineKind, NewOrder, Order, OrderId, OrderLine, OrderNote, OrderStatus},
    traits::{ClaimResult, PaymentEngineError, PaymentTransition},
};

/// Inserts the order into the database, returning `false` in the second parameter if the order already exists.
pub async fn idempotent_insert(
    order: NewOrder,
    conn: &mut SqliteConnection,
) -> Result<(Order, bool), PaymentEngineError> {
    let inserted = match fetch_order_by_reference(&order.order_number, conn).await? {
        Some(order) => (order, false),
        None => {
            let order = insert_order(order, conn).await?;
            debug!("📝️ Order [{}] inserted with id {}", order.order_number, order.id);
            (order, true)
        },
    };
    Ok(inserted)
}

/// Inserts a new order and its lines using the given connection. This is not atomic on its own.
/// Embed this call inside a transaction and pass `&mut *tx` as the connection argument.
async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, PaymentEngineError> {
    let inserted: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_number,
                order_key,
                customer_email,
                currency,
                total_amount,
                session_id,
                payment_method,
                save_card,
                billing_name,
                billing_line1,
                billing_line2,
                billing_city,
                billing_state,
                billing_postcode,
                billing_country
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *;
        "#,
    )
    .bind(order.order_number)
    .bind(order.order_key)
    .bind(order.customer_email)
    .bind(order.currency)
    .bind(order.total_amount)
    .bind(order.session_id)
    .bind(order.payment_method)
    .bind(order.save_card)
    .bind(order.billing_name)
    .bind(order.billing_line1)
    .bind(order.billing_line2)
    .bind(order.billing_city)
    .bind(order.billing_state)
    .bind(order.billing_postcode)
    .bind(order.billing_country)
    .fetch_one(&mut *conn)
    .await?;
    for line in order.lines {
        sqlx::query(
            "INSERT INTO order_lines (order_id, product_id, name, quantity, unit_price, kind) VALUES ($1, $2, $3, \
             $4, $5, $6)",
        )
        .bind(inserted.id)
        .bind(line.product_id)
        .bind(line.name)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.kind.to_string())
        .execute(&mut *conn)
        .await?;
    }
    Ok(inserted)
}

pub async fn fetch_order_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_reference(
    reference: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE order_number = $1")
        .bind(reference.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

pub async fn fetch_order_by_payment_id(
    payment_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE payment_id = $1").bind(payment_id).fetch_optional(conn).await?;
    Ok(order)
}

/// Returns the most recent order carrying the given checkout session id.
pub async fn fetch_order_by_session_id(
    session_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE session_id = $1 ORDER BY created_at DESC LIMIT 1")
        .bind(session_id)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Orders for the given email that are still awaiting a payment outcome, created within
/// `window` of `now`. Most recent first.
pub async fn fetch_pending_orders_for_email(
    email: &str,
    window: Duration,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let cutoff = now - window;
    let orders = sqlx::query_as(
        "SELECT * FROM orders WHERE customer_email = $1 AND status IN ('Unpaid', 'PendingChallenge') AND created_at \
         >= $2 ORDER BY created_at DESC",
    )
    .bind(email)
    .bind(cutoff)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

pub async fn fetch_order_lines(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderLine>, sqlx::Error> {
    let lines =
        sqlx::query_as("SELECT * FROM order_lines WHERE order_id = $1 ORDER BY id").bind(order_id).fetch_all(conn).await?;
    Ok(lines)
}

pub async fn fetch_order_notes(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderNote>, sqlx::Error> {
    let notes =
        sqlx::query_as("SELECT * FROM order_notes WHERE order_id = $1 ORDER BY id").bind(order_id).fetch_all(conn).await?;
    Ok(notes)
}

pub async fn insert_order_note(
    order_id: i64,
    note: &str,
    conn: &mut SqliteConnection,
) -> Result<OrderNote, sqlx::Error> {
    let note = sqlx::query_as("INSERT INTO order_notes (order_id, note) VALUES ($1, $2) RETURNING *")
        .bind(order_id)
        .bind(note)
        .fetch_one(conn)
        .await?;
    Ok(note)
}

/// Compare-and-set claim of a payment id on an order. The claim only lands when the order holds
/// no payment id yet, or already holds this one.
pub(crate) async fn claim_payment_id(
    order_id: i64,
    payment_id: &str,
    conn: &mut SqliteConnection,
) -> Result<ClaimResult, PaymentEngineError> {
    let stored: Option<Option<String>> = sqlx::query_scalar("SELECT payment_id FROM orders WHERE id = $1")
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?;
    let stored = stored.ok_or(PaymentEngineError::OrderIdNotFound(order_id))?;
    match stored {
        Some(p) if p == payment_id => Ok(ClaimResult::AlreadyClaimed),
        Some(p) => Ok(ClaimResult::Conflict(p)),
        None => {
            let result = sqlx::query(
                "UPDATE orders SET payment_id = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 AND (payment_id IS \
                 NULL OR payment_id = $1)",
            )
            .bind(payment_id)
            .bind(order_id)
            .execute(&mut *conn)
            .await?;
            if result.rows_affected() == 1 {
                debug!("📝️ Payment {payment_id} claimed order id {order_id}");
                Ok(ClaimResult::Claimed)
            } else {
                // Lost the race to a writer on another connection. Re-read to report the winner.
                let winner: Option<String> = sqlx::query_scalar("SELECT payment_id FROM orders WHERE id = $1")
                    .bind(order_id)
                    .fetch_one(&mut *conn)
                    .await?;
                match winner {
                    Some(p) if p == payment_id => Ok(ClaimResult::AlreadyClaimed),
                    Some(p) => Ok(ClaimResult::Conflict(p)),
                    None => Err(PaymentEngineError::DatabaseError(format!(
                        "Claim of order id {order_id} failed but no payment id is stored"
                    ))),
                }
            }
        },
    }
}

/// Apply an approval transition, guarded on the order still being pending. Returns `None` if the
/// guard did not hold. The caller is responsible for wrapping this in a transaction together
/// with the note and stock writes.
pub(crate) async fn apply_payment_approval(
    order_id: i64,
    transition: &PaymentTransition,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, PaymentEngineError> {
    let updated: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders SET
                status = $1,
                authorized = 1,
                payment_id = $2,
                transaction_id = COALESCE($3, transaction_id),
                session_id = COALESCE($4, session_id),
                payment_method = COALESCE($5, payment_method),
                save_card = save_card OR $6,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $7 AND status IN ('Unpaid', 'PendingChallenge')
            RETURNING *;
        "#,
    )
    .bind(transition.new_status.to_string())
    .bind(&transition.payment_id)
    .bind(transition.transaction_id.as_deref())
    .bind(transition.session_id.as_deref())
    .bind(transition.payment_method.as_deref())
    .bind(transition.save_card)
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?;
    let Some(order) = updated else { return Ok(None) };
    insert_order_note(order_id, &transition.note, &mut *conn).await?;
    let lines = fetch_order_lines(order_id, &mut *conn).await?;
    decrement_stock_for_lines(&lines, &mut *conn).await?;
    Ok(Some(order))
}

async fn decrement_stock_for_lines(lines: &[OrderLine], conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    for line in lines.iter().filter(|l| l.kind == LineKind::Product) {
        if let Some(product_id) = line.product_id {
            sqlx::query("UPDATE products SET stock = stock - $1 WHERE id = $2")
                .bind(line.quantity)
                .bind(product_id)
                .execute(&mut *conn)
                .await?;
        }
    }
    Ok(())
}

pub(crate) async fn mark_captured(
    order_id: i64,
    transaction_id: &str,
    note: &str,
    conn: &mut SqliteConnection,
) -> Result<Order, PaymentEngineError> {
    let order: Option<Order> = sqlx::query_as(
        "UPDATE orders SET status = 'Captured', transaction_id = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 \
         RETURNING *",
    )
    .bind(transaction_id)
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?;
    let order = order.ok_or(PaymentEngineError::OrderIdNotFound(order_id))?;
    insert_order_note(order_id, note, conn).await?;
    Ok(order)
}

pub(crate) async fn mark_voided(
    order_id: i64,
    transaction_id: Option<&str>,
    note: &str,
    conn: &mut SqliteConnection,
) -> Result<Order, PaymentEngineError> {
    let order: Option<Order> = sqlx::query_as(
        "UPDATE orders SET status = 'Voided', transaction_id = COALESCE($1, transaction_id), updated_at = \
         CURRENT_TIMESTAMP WHERE id = $2 RETURNING *",
    )
    .bind(transaction_id)
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?;
    let order = order.ok_or(PaymentEngineError::OrderIdNotFound(order_id))?;
    insert_order_note(order_id, note, conn).await?;
    Ok(order)
}

/// The payment id is kept for the audit trail even though the payment failed, so a later retry
/// against the same order can be traced back.
pub(crate) async fn mark_declined(
    order_id: i64,
    payment_id: &str,
    note: &str,
    conn: &mut SqliteConnection,
) -> Result<Order, PaymentEngineError> {
    let order: Option<Order> = sqlx::query_as(
        "UPDATE orders SET status = 'Declined', payment_id = COALESCE(payment_id, $1), updated_at = \
         CURRENT_TIMESTAMP WHERE id = $2 RETURNING *",
    )
    .bind(payment_id)
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?;
    let order = order.ok_or(PaymentEngineError::OrderIdNotFound(order_id))?;
    insert_order_note(order_id, note, conn).await?;
    Ok(order)
}

pub(crate) async fn record_refund(
    order_id: i64,
    amount: Money,
    transaction_id: Option<&str>,
    new_status: OrderStatus,
    note: &str,
    conn: &mut SqliteConnection,
) -> Result<Order, PaymentEngineError> {
    let order: Option<Order> = sqlx::query_as(
        "UPDATE orders SET refunded_total = refunded_total + $1, status = $2, transaction_id = COALESCE($3, \
         transaction_id), updated_at = CURRENT_TIMESTAMP WHERE id = $4 RETURNING *",
    )
    .bind(amount)
    .bind(new_status.to_string())
    .bind(transaction_id)
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?;
    let order = order.ok_or(PaymentEngineError::OrderIdNotFound(order_id))?;
    insert_order_note(order_id, note, conn).await?;
    Ok(order)
}
