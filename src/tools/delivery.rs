use serde_json::Value;

use super::envelope;
use crate::client::MintedClient;
use crate::error::Result;

pub async fn get_latest_delivery(client: &MintedClient) -> Value {
    envelope(latest_delivery(client).await)
}

async fn latest_delivery(client: &MintedClient) -> Result<Value> {
    let delivery = client.fetch_latest_delivery().await?;
    let mut result = Value::from(delivery);
    if let Value::Object(map) = &mut result {
        map.insert("endpoint".to_string(), Value::from(client.endpoints().groups.as_str()));
    }
    Ok(result)
}
