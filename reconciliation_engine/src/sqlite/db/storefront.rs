use cpg_common::Money;
use log::debug;
use sqlx::{FromRow, SqliteConnection};

use crate::db_types::{Cart, CartItem};

#[derive(Debug, Clone, FromRow)]
struct CartRow {
    cart_token: String,
    shipping_method: Option<String>,
    shipping_cost: Money,
}

pub async fn fetch_cart(token: &str, conn: &mut SqliteConnection) -> Result<Option<Cart>, sqlx::Error> {
    let row: Option<CartRow> = sqlx::query_as("SELECT cart_token, shipping_method, shipping_cost FROM carts WHERE \
         cart_token = $1")
        .bind(token)
        .fetch_optional(&mut *conn)
        .await?;
    let Some(row) = row else { return Ok(None) };
    let items: Vec<CartItem> = sqlx::query_as(
        "SELECT product_id, name, quantity, unit_price FROM cart_items WHERE cart_token = $1 ORDER BY id",
    )
    .bind(token)
    .fetch_all(conn)
    .await?;
    Ok(Some(Cart {
        token: row.cart_token,
        items,
        shipping_method: row.shipping_method,
        shipping_cost: row.shipping_cost,
    }))
}

pub async fn clear_cart(token: &str, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM cart_items WHERE cart_token = $1").bind(token).execute(&mut *conn).await?;
    sqlx::query("DELETE FROM carts WHERE cart_token = $1").bind(token).execute(conn).await?;
    debug!("🗃️ Cart {token} cleared");
    Ok(())
}
