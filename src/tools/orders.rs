use serde_json::{json, Value};

use super::envelope;
use crate::client::MintedClient;
use crate::error::Result;

pub async fn get_orders(client: &MintedClient, limit: Option<Value>) -> Value {
    envelope(orders(client, requested_limit(limit.as_ref())).await)
}

async fn orders(client: &MintedClient, limit: Option<i64>) -> Result<Value> {
    let orders = client.fetch_orders(limit).await?;
    Ok(json!({
        "count": orders.len(),
        "orders": orders,
        "endpoint": client.endpoints().orders.as_str(),
    }))
}

/// Clients send the limit as a number or a numeric string. Anything that is
/// not a whole number is ignored and the default limit applies.
fn requested_limit(limit: Option<&Value>) -> Option<i64> {
    match limit? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
