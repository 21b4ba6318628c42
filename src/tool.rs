//! Execution template shared by the domain tools: correlation ids, timing,
//! the one-record-per-invocation log contract and lazy ARM clients.

use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::arm::ArmClient;
use crate::auth::AuthManager;
use crate::error::{OperationContext, ProviderError, Result, StorageMcpError};
use crate::logging::{self, ToolExecutionRecord};
use crate::models::ResponseMetadata;

/// State of a single tool call, from argument receipt to the log record.
pub struct Invocation {
    tool_name: &'static str,
    correlation_id: String,
    started: Instant,
    parameters: Value,
}

impl Invocation {
    pub fn start<R: Serialize>(tool_name: &'static str, request: &R) -> Self {
        Self {
            tool_name,
            correlation_id: Uuid::new_v4().to_string(),
            started: Instant::now(),
            parameters: serde_json::to_value(request).unwrap_or(Value::Null),
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Response metadata stamped with the elapsed time so far.
    pub fn metadata(&self, request_id: Option<String>) -> ResponseMetadata {
        ResponseMetadata {
            timestamp: chrono::Utc::now(),
            correlation_id: self.correlation_id.clone(),
            request_id,
            execution_time_ms: Some(self.started.elapsed().as_millis() as u64),
        }
    }

    /// Emit the execution record for `result` and hand it back unchanged.
    pub fn finish<T>(&self, result: Result<T>) -> Result<T> {
        let record = match &result {
            Ok(_) => ToolExecutionRecord::success(
                self.tool_name,
                &self.correlation_id,
                &self.parameters,
                logging::short_type_name::<T>(),
            ),
            Err(err) => ToolExecutionRecord::failure(
                self.tool_name,
                Some(&self.correlation_id),
                &self.parameters,
                err,
            ),
        };
        record.emit();
        result
    }

    /// Absorb the failure of an optional sub-call.
    ///
    /// Only HTTP errors other than 401 and 403 are absorbed: they are logged
    /// and reported as `None` so the caller can substitute its default.
    /// Credential, permission, transport and decode failures abort the
    /// whole invocation.
    pub fn optional<T>(
        &self,
        sub_call: &str,
        result: std::result::Result<T, ProviderError>,
        op: &OperationContext,
    ) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_degradable() => {
                logging::log_error(
                    err.kind_name(),
                    &err.to_string(),
                    &json!({
                        "context": sub_call,
                        "tool_name": self.tool_name,
                        "correlation_id": self.correlation_id,
                    }),
                );
                Ok(None)
            }
            Err(err) => Err(StorageMcpError::from_provider(err, op)),
        }
    }
}

/// ARM client built on first use from the shared credential.
pub struct LazyArmClient {
    auth: Arc<AuthManager>,
    endpoint: String,
    client: OnceCell<ArmClient>,
}

impl LazyArmClient {
    pub fn new(auth: Arc<AuthManager>, endpoint: &str) -> Self {
        Self {
            auth,
            endpoint: endpoint.to_string(),
            client: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> Result<&ArmClient> {
        self.client
            .get_or_try_init(|| async {
                let token = self.auth.get_credential().await?;
                ArmClient::new(&self.endpoint, token)
                    .map_err(|e| StorageMcpError::unknown(format!("Unexpected error: {e}")))
            })
            .await
    }
}

/// Owned copy of an optional provider string, or `default` when absent.
pub fn text_or(value: &Option<String>, default: &str) -> String {
    value.as_deref().unwrap_or(default).to_string()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by the wiremock-backed tool tests.

    use serde_json::{json, Value};
    use std::sync::Arc;
    use wiremock::MockServer;

    use crate::auth::testing::static_auth;
    use crate::auth::AuthManager;

    pub const SUBSCRIPTION_ID: &str = "12345678-1234-1234-1234-123456789012";
    pub const RESOURCE_GROUP: &str = "rg-storage";

    pub fn account_id(account: &str) -> String {
        format!(
            "/subscriptions/{SUBSCRIPTION_ID}/resourceGroups/{RESOURCE_GROUP}\
             /providers/Microsoft.Storage/storageAccounts/{account}"
        )
    }

    /// Minimal ARM storage account body.
    pub fn account_json(account: &str, location: &str) -> Value {
        json!({
            "id": account_id(account),
            "name": account,
            "location": location,
            "kind": "StorageV2",
            "sku": { "name": "Standard_LRS", "tier": "Standard" },
            "properties": {
                "provisioningState": "Succeeded",
                "creationTime": "2024-03-01T10:00:00Z",
                "primaryLocation": location,
                "statusOfPrimary": "available",
                "accessTier": "Hot",
                "primaryEndpoints": { "blob": format!("https://{account}.blob.core.windows.net/") }
            }
        })
    }

    pub async fn server_and_auth() -> (MockServer, Arc<AuthManager>) {
        (MockServer::start().await, static_auth())
    }
}
