pub mod prepare_env;

use cpg_common::Money;
use reconciliation_engine::{
    db_types::{LineKind, NewOrder, NewOrderLine, OrderId},
    SqliteDatabase,
};
use sqlx::SqlitePool;

pub async fn seed_product(pool: &SqlitePool, id: i64, name: &str, price: i64, stock: i64) {
    sqlx::query("INSERT INTO products (id, name, unit_price, stock) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind(name)
        .bind(price)
        .bind(stock)
        .execute(pool)
        .await
        .expect("Error seeding product");
}

pub async fn seed_cart(pool: &SqlitePool, token: &str, items: &[(i64, &str, i64, i64)], shipping: i64) {
    sqlx::query("INSERT INTO carts (cart_token, shipping_method, shipping_cost) VALUES ($1, 'flat_rate', $2)")
        .bind(token)
        .bind(shipping)
        .execute(pool)
        .await
        .expect("Error seeding cart");
    for (product_id, name, quantity, unit_price) in items {
        sqlx::query("INSERT INTO cart_items (cart_token, product_id, name, quantity, unit_price) VALUES ($1, $2, $3, $4, $5)")
            .bind(token)
            .bind(product_id)
            .bind(name)
            .bind(quantity)
            .bind(unit_price)
            .execute(pool)
            .await
            .expect("Error seeding cart item");
    }
}

pub async fn stock_of(pool: &SqlitePool, product_id: i64) -> i64 {
    sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_one(pool)
        .await
        .expect("Error reading stock")
}

pub fn test_order(number: &str, email: &str, total: i64) -> NewOrder {
    let mut order = NewOrder::new(
        OrderId(number.to_string()),
        format!("order_key_{number}"),
        "USD".to_string(),
        Money::from(total),
    );
    order.customer_email = Some(email.to_string());
    order.lines = vec![NewOrderLine {
        product_id: Some(1),
        name: "Widget".to_string(),
        quantity: 2,
        unit_price: Money::from(total / 2),
        kind: LineKind::Product,
    }];
    order
}

pub async fn new_test_db() -> SqliteDatabase {
    let url = prepare_env::random_db_path();
    prepare_env::prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    seed_product(db.pool(), 1, "Widget", 3_000, 10).await;
    db
}
