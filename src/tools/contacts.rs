use serde_json::{json, Value};

use super::envelope;
use crate::client::MintedClient;
use crate::error::Result;

pub async fn get_contacts(client: &MintedClient) -> Value {
    envelope(contacts(client).await)
}

async fn contacts(client: &MintedClient) -> Result<Value> {
    let contacts = client.fetch_contacts().await?;
    Ok(json!({"count": contacts.len(), "contacts": contacts}))
}
