pub mod contacts;
pub mod delivery;
pub mod orders;

use rmcp::model::{CallToolResult, Content};
use serde_json::{json, Value};

use crate::error::Result;

pub fn result_text(v: Value) -> CallToolResult {
    CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&v).unwrap_or_default()
    )])
}

/// `{"success": true, ...data}` on success, `{"success": false, "error": ...}`
/// for every credential, login or API failure.
pub fn envelope(outcome: Result<Value>) -> Value {
    match outcome {
        Ok(Value::Object(mut data)) => {
            data.insert("success".to_string(), Value::Bool(true));
            Value::Object(data)
        }
        Ok(other) => json!({"success": true, "data": other}),
        Err(e) => {
            tracing::warn!("tool call failed: {e}");
            json!({"success": false, "error": e.to_string()})
        }
    }
}
