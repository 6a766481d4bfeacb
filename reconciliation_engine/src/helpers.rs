use rand::Rng;

use crate::db_types::OrderId;

const KEY_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a fresh human-readable order number for synthesized orders.
pub fn new_order_number() -> OrderId {
    let n: u32 = rand::thread_rng().gen_range(10_000_000..100_000_000);
    OrderId(format!("CPG-{n}"))
}

/// Generate the secret order key that is round-tripped through the customer redirect.
pub fn new_order_key() -> String {
    let mut rng = rand::thread_rng();
    let key: String = (0..13).map(|_| KEY_CHARSET[rng.gen_range(0..KEY_CHARSET.len())] as char).collect();
    format!("order_{key}")
}
