use std::sync::Arc;
use rmcp::{
    ServerHandler,
    model::{CallToolResult, ServerCapabilities, ServerInfo},
    schemars, tool, Error as McpError,
};
use crate::client::MintedClient;
use crate::tools::{contacts, delivery, orders, result_text};

// Tool failures are reported inside the result as {"success": false, ...},
// so none of these return Err.
#[derive(Clone)]
pub struct MintedMcp {
    pub client: Arc<MintedClient>,
}

#[tool(tool_box)]
impl MintedMcp {
    #[tool(description = "Get all contacts from the Minted address book")]
    async fn get_minted_contacts(&self) -> Result<CallToolResult, McpError> {
        Ok(result_text(contacts::get_contacts(&self.client).await))
    }

    #[tool(description = "Get recipients from the latest Minted card delivery/order")]
    async fn get_minted_latest_delivery(&self) -> Result<CallToolResult, McpError> {
        Ok(result_text(delivery::get_latest_delivery(&self.client).await))
    }

    #[tool(description = "Get order history from Minted, newest first")]
    async fn get_minted_orders(
        &self,
        #[tool(param)]
        #[schemars(description = "Maximum number of orders to return (default: 10)")]
        limit: Option<serde_json::Value>,
    ) -> Result<CallToolResult, McpError> {
        Ok(result_text(orders::get_orders(&self.client, limit).await))
    }
}

#[tool(tool_box)]
impl ServerHandler for MintedMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Read-only access to a Minted account: address book contacts, order history \
                 and the recipients of the latest card delivery."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
