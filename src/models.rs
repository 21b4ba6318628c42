//! Request and response schema exposed through the MCP tools.
//!
//! Requests derive `JsonSchema` so the tool router can advertise them;
//! responses are plain serializable records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Common
// ---------------------------------------------------------------------------

/// Metadata attached to every response.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseMetadata {
    pub timestamp: DateTime<Utc>,
    /// Correlation id for request tracking; also present in log records.
    pub correlation_id: String,
    /// `x-ms-request-id` of the primary provider call.
    pub request_id: Option<String>,
    pub execution_time_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IpRule {
    pub ip_address_or_range: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VirtualNetworkRule {
    pub subnet_id: String,
    pub action: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceAccessRule {
    pub tenant_id: String,
    pub resource_id: String,
}

// ---------------------------------------------------------------------------
// Storage accounts
// ---------------------------------------------------------------------------

/// Parameters for `list_storage_accounts`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListStorageAccountsRequest {
    /// Azure subscription ID.
    pub subscription_id: String,
    /// Resource group name.  Omit to list the whole subscription.
    #[serde(default)]
    pub resource_group: Option<String>,
    /// Include deleted storage accounts (accepted for compatibility; the
    /// listing API only returns live accounts).
    #[serde(default)]
    pub include_deleted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageAccountSummary {
    pub name: String,
    pub resource_group: String,
    pub location: String,
    pub sku: String,
    pub kind: String,
    pub access_tier: Option<String>,
    pub creation_time: Option<DateTime<Utc>>,
    pub last_modified_time: Option<DateTime<Utc>>,
    pub provisioning_state: String,
    pub status_of_primary: String,
    pub status_of_secondary: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListStorageAccountsResponse {
    pub storage_accounts: Vec<StorageAccountSummary>,
    pub total_count: usize,
    pub metadata: ResponseMetadata,
    pub summary: String,
}

/// Parameters for `get_storage_account_details`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetStorageAccountDetailsRequest {
    /// Azure subscription ID.
    pub subscription_id: String,
    /// Resource group name.
    pub resource_group: String,
    /// Storage account name.
    pub account_name: String,
    /// Include access keys.  Keys are never returned; the flag is accepted
    /// for compatibility only.
    #[serde(default)]
    pub include_keys: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageAccountBasicProperties {
    pub name: String,
    pub resource_group: String,
    pub subscription_id: String,
    pub location: String,
    pub sku: String,
    pub kind: String,
    pub access_tier: Option<String>,
    pub creation_time: Option<DateTime<Utc>>,
    pub last_modified_time: Option<DateTime<Utc>>,
    pub provisioning_state: String,
    pub primary_location: String,
    pub secondary_location: Option<String>,
    pub status_of_primary: String,
    pub status_of_secondary: Option<String>,
    pub primary_endpoints: BTreeMap<String, String>,
    pub secondary_endpoints: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EncryptionAtRest {
    pub enabled: bool,
    pub key_source: String,
    pub file_enabled: bool,
    pub infrastructure_encryption: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EncryptionInTransit {
    pub enabled: bool,
    pub minimum_tls_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SecuritySettings {
    pub require_secure_transfer: bool,
    pub allow_blob_public_access: bool,
    pub allow_shared_key_access: bool,
    pub allow_cross_tenant_replication: bool,
    pub public_network_access: String,
    pub minimum_tls_version: String,
    pub encryption_at_rest: EncryptionAtRest,
    pub encryption_in_transit: EncryptionInTransit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkConfiguration {
    pub default_action: String,
    pub ip_rules: Vec<IpRule>,
    pub virtual_network_rules: Vec<VirtualNetworkRule>,
    pub resource_access_rules: Vec<ResourceAccessRule>,
    pub bypass: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BlobServiceProperties {
    pub versioning_enabled: bool,
    pub change_feed_enabled: bool,
    pub soft_delete_enabled: bool,
    pub soft_delete_retention_days: Option<u32>,
    pub container_soft_delete_enabled: bool,
    pub container_soft_delete_retention_days: Option<u32>,
    pub restore_policy_enabled: bool,
    pub restore_policy_days: Option<u32>,
    pub last_access_time_tracking_enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessPolicy {
    pub id: String,
    pub start_time: Option<DateTime<Utc>>,
    pub expiry_time: Option<DateTime<Utc>>,
    pub permissions: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiagnosticSettings {
    pub enabled: bool,
    pub workspace_id: Option<String>,
    pub storage_account_id: Option<String>,
    pub retention_policy: Option<serde_json::Value>,
    pub categories: Vec<String>,
    pub metrics: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageAccountDetails {
    pub basic_properties: StorageAccountBasicProperties,
    pub security_settings: SecuritySettings,
    pub network_configuration: NetworkConfiguration,
    pub blob_service_properties: BlobServiceProperties,
    /// Not populated: needs a data-plane call per container.
    pub access_policies: Vec<AccessPolicy>,
    /// Not populated: needs a `Microsoft.Insights/diagnosticSettings` call.
    pub diagnostic_settings: DiagnosticSettings,
    pub metadata: ResponseMetadata,
    pub summary: String,
}

// ---------------------------------------------------------------------------
// Network rules and private endpoints
// ---------------------------------------------------------------------------

/// Parameters for `get_network_rules`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetNetworkRulesRequest {
    /// Azure subscription ID.
    pub subscription_id: String,
    /// Resource group name.
    pub resource_group: String,
    /// Storage account name.
    pub account_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkRules {
    pub default_action: String,
    pub ip_rules: Vec<IpRule>,
    pub virtual_network_rules: Vec<VirtualNetworkRule>,
    pub resource_access_rules: Vec<ResourceAccessRule>,
    pub bypass: String,
    pub metadata: ResponseMetadata,
    pub summary: String,
}

/// Parameters for `get_private_endpoints`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetPrivateEndpointsRequest {
    /// Azure subscription ID.
    pub subscription_id: String,
    /// Resource group name.
    pub resource_group: String,
    /// Storage account name.
    pub account_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkInterfaceInfo {
    pub id: String,
    pub name: String,
    /// Always empty: resolving it needs a `Microsoft.Network` call.
    pub private_ip_address: String,
    pub subnet_id: String,
    pub is_primary: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrivateEndpointConnection {
    pub name: String,
    pub private_endpoint_id: String,
    pub connection_state: String,
    pub provisioning_state: String,
    pub network_interface_info: NetworkInterfaceInfo,
    pub dns_zones: Vec<String>,
    pub actions_required: Vec<String>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetPrivateEndpointsResponse {
    pub private_endpoints: Vec<PrivateEndpointConnection>,
    pub total_count: usize,
    pub metadata: ResponseMetadata,
    pub summary: String,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

fn default_time_range() -> String {
    "1h".to_string()
}

fn default_metrics() -> Vec<String> {
    vec!["UsedCapacity".to_string(), "Transactions".to_string()]
}

fn default_aggregation_type() -> String {
    "Average".to_string()
}

fn default_interval() -> String {
    "PT1H".to_string()
}

/// Parameters for `get_storage_metrics`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetStorageMetricsRequest {
    /// Azure subscription ID.
    pub subscription_id: String,
    /// Resource group name.
    pub resource_group: String,
    /// Storage account name.
    pub account_name: String,
    /// Time range: 1h, 24h, 7d or 30d (default 1h).
    #[serde(default = "default_time_range")]
    pub time_range: String,
    /// Metrics to retrieve (default UsedCapacity and Transactions).
    #[serde(default = "default_metrics")]
    pub metrics: Vec<String>,
    /// Aggregation type: Average, Total, Maximum, Minimum or Count (default Average).
    #[serde(default = "default_aggregation_type")]
    pub aggregation_type: String,
    /// ISO 8601 interval between data points (default PT1H).
    #[serde(default = "default_interval")]
    pub interval: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub unit: String,
    pub aggregation_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDefinition {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub unit: String,
    pub primary_aggregation_type: String,
    pub supported_aggregation_types: Vec<String>,
    pub dimensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageMetrics {
    pub account_name: String,
    pub time_range: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub metrics_data: BTreeMap<String, Vec<MetricDataPoint>>,
    pub aggregated_summary: BTreeMap<String, f64>,
    pub available_metrics: Vec<MetricDefinition>,
    pub metadata: ResponseMetadata,
    pub summary: String,
}
