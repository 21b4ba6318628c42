//! Authenticated client for the Azure Resource Manager REST API, plus the
//! provider-side shapes of the storage resources it returns.
//!
//! Provider shapes mirror ARM JSON with every field optional; the domain
//! tools resolve each one to a documented default when normalizing.

use chrono::{DateTime, Utc};
use reqwest::{header, Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::{TokenSource, MANAGEMENT_SCOPE};
use crate::error::ProviderError;

/// API version used for `Microsoft.Storage` resources.
pub const STORAGE_API_VERSION: &str = "2023-05-01";

const REQUEST_ID_HEADER: &str = "x-ms-request-id";

/// A decoded ARM response together with the provider request id.
#[derive(Debug)]
pub struct ArmResponse<T> {
    pub body: T,
    pub request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArmErrorEnvelope {
    error: Option<ArmErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ArmErrorDetail {
    code: Option<String>,
    message: Option<String>,
}

/// Read-only ARM client.  Cheap to share; one instance per domain tool.
pub struct ArmClient {
    http: Client,
    endpoint: String,
    token: Arc<dyn TokenSource>,
}

impl ArmClient {
    pub fn new(endpoint: &str, token: Arc<dyn TokenSource>) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .user_agent(concat!("azure-storage-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    /// GET a single resource at `path` (relative to the ARM endpoint).
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<ArmResponse<T>, ProviderError> {
        let response = self.send(&self.url(path), query).await?;
        let request_id = request_id_of(&response);
        let body = response.json::<T>().await?;
        Ok(ArmResponse { body, request_id })
    }

    /// GET a collection at `path`, following `nextLink` until exhausted.
    ///
    /// The request id reported is the one from the first page.
    pub async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<ArmResponse<Vec<T>>, ProviderError> {
        let first = self.send(&self.url(path), query).await?;
        let request_id = request_id_of(&first);
        let mut page: Page<T> = first.json().await?;
        let mut items = std::mem::take(&mut page.value);

        let mut previous: Option<String> = None;
        while let Some(next) = page.next_link.take() {
            if previous.as_deref() == Some(next.as_str()) {
                tracing::warn!(next_link = %next, "nextLink repeats the previous page; stopping");
                break;
            }
            // nextLink already carries the api-version and continuation token.
            page = self.send(&next, &[]).await?.json().await?;
            items.append(&mut page.value);
            previous = Some(next);
        }

        Ok(ArmResponse {
            body: items,
            request_id,
        })
    }

    async fn send(&self, url: &str, query: &[(&str, &str)]) -> Result<Response, ProviderError> {
        let token = self.token.bearer_token(MANAGEMENT_SCOPE).await?;

        tracing::debug!(url, "ARM GET");
        let response = self
            .http
            .get(url)
            .query(query)
            .bearer_auth(token)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::Http {
            status: status.as_u16(),
            message: parse_arm_error(&body)
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
        })
    }
}

fn request_id_of(response: &Response) -> Option<String> {
    response
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Extract `"{code}: {message}"` from an ARM error body, if it has one.
fn parse_arm_error(body: &str) -> Option<String> {
    let detail = serde_json::from_str::<ArmErrorEnvelope>(body).ok()?.error?;
    match (detail.code, detail.message) {
        (Some(code), Some(message)) => Some(format!("{code}: {message}")),
        (None, Some(message)) => Some(message),
        (Some(code), None) => Some(code),
        (None, None) => None,
    }
}

/// ARM path of a storage account.
pub fn storage_account_path(subscription_id: &str, resource_group: &str, account_name: &str) -> String {
    format!(
        "/subscriptions/{subscription_id}/resourceGroups/{resource_group}\
         /providers/Microsoft.Storage/storageAccounts/{account_name}"
    )
}

/// ARM path listing storage accounts in a subscription or resource group.
pub fn storage_accounts_path(subscription_id: &str, resource_group: Option<&str>) -> String {
    match resource_group {
        Some(rg) => format!(
            "/subscriptions/{subscription_id}/resourceGroups/{rg}\
             /providers/Microsoft.Storage/storageAccounts"
        ),
        None => format!("/subscriptions/{subscription_id}/providers/Microsoft.Storage/storageAccounts"),
    }
}

/// Resource group segment of an ARM resource id, matched case-insensitively.
pub fn resource_group_from_id(id: &str) -> Option<String> {
    let mut segments = id.split('/').filter(|s| !s.is_empty());
    while let Some(segment) = segments.next() {
        if segment.eq_ignore_ascii_case("resourceGroups") {
            return segments.next().map(str::to_string);
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Provider shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageAccountResource {
    pub id: Option<String>,
    pub name: Option<String>,
    pub location: Option<String>,
    pub kind: Option<String>,
    pub sku: Option<Sku>,
    pub properties: Option<StorageAccountProperties>,
    pub system_data: Option<SystemData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Sku {
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemData {
    pub last_modified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageAccountProperties {
    pub provisioning_state: Option<String>,
    pub creation_time: Option<DateTime<Utc>>,
    pub primary_location: Option<String>,
    pub secondary_location: Option<String>,
    pub status_of_primary: Option<String>,
    pub status_of_secondary: Option<String>,
    pub primary_endpoints: Option<Endpoints>,
    pub secondary_endpoints: Option<Endpoints>,
    pub access_tier: Option<String>,
    pub supports_https_traffic_only: Option<bool>,
    pub allow_blob_public_access: Option<bool>,
    pub allow_shared_key_access: Option<bool>,
    pub allow_cross_tenant_replication: Option<bool>,
    pub public_network_access: Option<String>,
    pub minimum_tls_version: Option<String>,
    pub encryption: Option<Encryption>,
    pub network_acls: Option<NetworkRuleSet>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Endpoints {
    pub blob: Option<String>,
    pub queue: Option<String>,
    pub table: Option<String>,
    pub file: Option<String>,
    pub dfs: Option<String>,
    pub web: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Encryption {
    pub services: Option<EncryptionServices>,
    pub key_source: Option<String>,
    pub require_infrastructure_encryption: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EncryptionServices {
    pub blob: Option<EncryptionService>,
    pub file: Option<EncryptionService>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EncryptionService {
    pub enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkRuleSet {
    pub bypass: Option<String>,
    pub default_action: Option<String>,
    pub ip_rules: Option<Vec<IpRuleResource>>,
    pub virtual_network_rules: Option<Vec<VirtualNetworkRuleResource>>,
    pub resource_access_rules: Option<Vec<ResourceAccessRuleResource>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IpRuleResource {
    pub value: Option<String>,
    pub action: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VirtualNetworkRuleResource {
    /// Subnet resource id.
    pub id: Option<String>,
    pub action: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceAccessRuleResource {
    pub tenant_id: Option<String>,
    pub resource_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BlobServiceResource {
    pub properties: Option<BlobServicePropertiesResource>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlobServicePropertiesResource {
    pub is_versioning_enabled: Option<bool>,
    pub change_feed: Option<RetentionPolicy>,
    pub delete_retention_policy: Option<RetentionPolicy>,
    pub container_delete_retention_policy: Option<RetentionPolicy>,
    pub restore_policy: Option<RetentionPolicy>,
    pub last_access_time_tracking_policy: Option<LastAccessTimeTrackingPolicy>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    pub enabled: Option<bool>,
    pub days: Option<u32>,
}

/// ARM spells this flag `enable`, unlike the other policies.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LastAccessTimeTrackingPolicy {
    pub enable: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PrivateEndpointConnectionResource {
    pub name: Option<String>,
    pub properties: Option<PrivateEndpointConnectionProperties>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrivateEndpointConnectionProperties {
    pub private_endpoint: Option<PrivateEndpointRef>,
    pub private_link_service_connection_state: Option<PrivateLinkConnectionState>,
    pub provisioning_state: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PrivateEndpointRef {
    pub id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrivateLinkConnectionState {
    pub status: Option<String>,
    pub description: Option<String>,
    pub action_required: Option<String>,
}
