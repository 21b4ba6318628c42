//! Storage account listing and detail introspection.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::arm::{
    resource_group_from_id, storage_account_path, storage_accounts_path, BlobServiceResource,
    EncryptionService, Endpoints, RetentionPolicy, StorageAccountProperties, StorageAccountResource,
    STORAGE_API_VERSION,
};
use crate::auth::AuthManager;
use crate::error::{OperationContext, Result, StorageMcpError};
use crate::models::{
    BlobServiceProperties, DiagnosticSettings, EncryptionAtRest, EncryptionInTransit,
    GetStorageAccountDetailsRequest, ListStorageAccountsRequest, ListStorageAccountsResponse,
    SecuritySettings, StorageAccountBasicProperties, StorageAccountDetails, StorageAccountSummary,
};
use crate::network::{network_configuration, ACCOUNT_READ_PERMISSION};
use crate::tool::{text_or, Invocation, LazyArmClient};
use crate::validation::{
    validate_resource_group, validate_storage_account_name, validate_subscription_id,
};

fn endpoint_map(endpoints: &Endpoints) -> BTreeMap<String, String> {
    [
        ("blob", &endpoints.blob),
        ("queue", &endpoints.queue),
        ("table", &endpoints.table),
        ("file", &endpoints.file),
        ("dfs", &endpoints.dfs),
        ("web", &endpoints.web),
    ]
    .into_iter()
    .filter_map(|(service, url)| url.as_ref().map(|u| (service.to_string(), u.clone())))
    .collect()
}

fn sku_name(account: &StorageAccountResource) -> String {
    account
        .sku
        .as_ref()
        .and_then(|sku| sku.name.clone())
        .unwrap_or_default()
}

fn account_summary(account: StorageAccountResource, fallback_rg: Option<&str>) -> StorageAccountSummary {
    let sku = sku_name(&account);
    let resource_group = account
        .id
        .as_deref()
        .and_then(resource_group_from_id)
        .or_else(|| fallback_rg.map(str::to_string))
        .unwrap_or_default();
    let last_modified = account.system_data.and_then(|d| d.last_modified_at);
    let props = account.properties.unwrap_or_default();

    StorageAccountSummary {
        name: text_or(&account.name, ""),
        resource_group,
        location: text_or(&account.location, ""),
        sku,
        kind: text_or(&account.kind, ""),
        access_tier: props.access_tier,
        creation_time: props.creation_time,
        last_modified_time: last_modified.or(props.creation_time),
        provisioning_state: text_or(&props.provisioning_state, "Unknown"),
        status_of_primary: text_or(&props.status_of_primary, "Unknown"),
        status_of_secondary: props.status_of_secondary,
    }
}

fn list_summary(accounts: &[StorageAccountSummary], resource_group: Option<&str>) -> String {
    let scope = match resource_group {
        Some(rg) => format!("resource group '{rg}'"),
        None => "subscription".to_string(),
    };
    if accounts.is_empty() {
        return format!("No storage accounts found in {scope}");
    }

    let mut regions: BTreeMap<&str, usize> = BTreeMap::new();
    for account in accounts {
        *regions.entry(account.location.as_str()).or_default() += 1;
    }
    let regions: Vec<String> = regions
        .iter()
        .map(|(location, count)| format!("{location}: {count}"))
        .collect();

    let count = accounts.len();
    format!(
        "Found {count} storage account{} in {scope}. Distribution by region: {}",
        if count == 1 { "" } else { "s" },
        regions.join(", ")
    )
}

fn basic_properties(
    account: &StorageAccountResource,
    props: &StorageAccountProperties,
    subscription_id: &str,
    resource_group: &str,
    account_name: &str,
) -> StorageAccountBasicProperties {
    let location = text_or(&account.location, "");
    StorageAccountBasicProperties {
        name: account.name.clone().unwrap_or_else(|| account_name.to_string()),
        resource_group: resource_group.to_string(),
        subscription_id: subscription_id.to_string(),
        sku: sku_name(account),
        kind: text_or(&account.kind, ""),
        access_tier: props.access_tier.clone(),
        creation_time: props.creation_time,
        last_modified_time: account
            .system_data
            .as_ref()
            .and_then(|d| d.last_modified_at)
            .or(props.creation_time),
        provisioning_state: text_or(&props.provisioning_state, "Unknown"),
        primary_location: props.primary_location.clone().unwrap_or_else(|| location.clone()),
        secondary_location: props.secondary_location.clone(),
        status_of_primary: text_or(&props.status_of_primary, "Unknown"),
        status_of_secondary: props.status_of_secondary.clone(),
        primary_endpoints: props.primary_endpoints.as_ref().map(endpoint_map).unwrap_or_default(),
        secondary_endpoints: props.secondary_endpoints.as_ref().map(endpoint_map),
        location,
    }
}

/// Resolve security flags, applying the Azure service defaults for absent values.
fn security_settings(props: &StorageAccountProperties) -> SecuritySettings {
    let require_secure_transfer = props.supports_https_traffic_only.unwrap_or(true);
    let minimum_tls_version = text_or(&props.minimum_tls_version, "TLS1_0");

    let encryption = props.encryption.as_ref();
    let services = encryption.and_then(|e| e.services.as_ref());
    let service_enabled = |service: Option<&EncryptionService>| {
        service.and_then(|s| s.enabled).unwrap_or(false)
    };

    SecuritySettings {
        require_secure_transfer,
        allow_blob_public_access: props.allow_blob_public_access.unwrap_or(false),
        allow_shared_key_access: props.allow_shared_key_access.unwrap_or(true),
        allow_cross_tenant_replication: props.allow_cross_tenant_replication.unwrap_or(false),
        public_network_access: text_or(&props.public_network_access, "Enabled"),
        encryption_at_rest: EncryptionAtRest {
            enabled: service_enabled(services.and_then(|s| s.blob.as_ref())),
            key_source: encryption
                .and_then(|e| e.key_source.clone())
                .unwrap_or_else(|| "Microsoft.Storage".to_string()),
            file_enabled: service_enabled(services.and_then(|s| s.file.as_ref())),
            infrastructure_encryption: encryption
                .and_then(|e| e.require_infrastructure_encryption)
                .unwrap_or(false),
        },
        encryption_in_transit: EncryptionInTransit {
            enabled: require_secure_transfer,
            minimum_tls_version: minimum_tls_version.clone(),
        },
        minimum_tls_version,
    }
}

fn retention(policy: &Option<RetentionPolicy>) -> (bool, Option<u32>) {
    match policy {
        Some(p) if p.enabled.unwrap_or(false) => (true, p.days),
        _ => (false, None),
    }
}

fn blob_service_properties(blob: Option<BlobServiceResource>) -> BlobServiceProperties {
    let Some(props) = blob.and_then(|b| b.properties) else {
        return BlobServiceProperties::default();
    };

    let (soft_delete_enabled, soft_delete_retention_days) = retention(&props.delete_retention_policy);
    let (container_soft_delete_enabled, container_soft_delete_retention_days) =
        retention(&props.container_delete_retention_policy);
    let (restore_policy_enabled, restore_policy_days) = retention(&props.restore_policy);

    BlobServiceProperties {
        versioning_enabled: props.is_versioning_enabled.unwrap_or(false),
        change_feed_enabled: props
            .change_feed
            .as_ref()
            .and_then(|c| c.enabled)
            .unwrap_or(false),
        soft_delete_enabled,
        soft_delete_retention_days,
        container_soft_delete_enabled,
        container_soft_delete_retention_days,
        restore_policy_enabled,
        restore_policy_days,
        last_access_time_tracking_enabled: props
            .last_access_time_tracking_policy
            .as_ref()
            .and_then(|p| p.enable)
            .unwrap_or(false),
    }
}

fn details_summary(basic: &StorageAccountBasicProperties, security: &SecuritySettings) -> String {
    let mut items = Vec::new();
    if security.require_secure_transfer {
        items.push("secure transfer required");
    }
    if !security.allow_blob_public_access {
        items.push("public access disabled");
    }
    if !security.allow_shared_key_access {
        items.push("shared key access disabled");
    }
    let security_text = if items.is_empty() {
        "standard security settings".to_string()
    } else {
        items.join(", ")
    };

    format!(
        "Storage account '{}' in {} ({}, {}). Security: {security_text}. Status: {}",
        basic.name, basic.location, basic.sku, basic.kind, basic.provisioning_state
    )
}

/// Read-only storage account tools.
pub struct StorageAccountTools {
    arm: LazyArmClient,
}

impl StorageAccountTools {
    pub fn new(auth: Arc<AuthManager>, endpoint: &str) -> Self {
        Self {
            arm: LazyArmClient::new(auth, endpoint),
        }
    }

    /// List storage accounts in a subscription, or in one resource group.
    pub async fn list_storage_accounts(
        &self,
        request: &ListStorageAccountsRequest,
    ) -> Result<ListStorageAccountsResponse> {
        let call = Invocation::start("list_storage_accounts", request);
        let result = self.list(&call, request).await;
        call.finish(result)
    }

    async fn list(
        &self,
        call: &Invocation,
        request: &ListStorageAccountsRequest,
    ) -> Result<ListStorageAccountsResponse> {
        let subscription_id = validate_subscription_id(&request.subscription_id)?;
        // An empty resource group means "whole subscription".
        let resource_group = request
            .resource_group
            .as_deref()
            .filter(|rg| !rg.is_empty())
            .map(validate_resource_group)
            .transpose()?;

        let op = OperationContext {
            action: "list storage accounts",
            required_permission: ACCOUNT_READ_PERMISSION,
            not_found: match resource_group {
                Some(rg) => format!("Resource group not found: {rg}"),
                None => format!("Subscription not found: {subscription_id}"),
            },
        };

        let arm = self.arm.get().await?;
        let response = arm
            .list::<StorageAccountResource>(
                &storage_accounts_path(subscription_id, resource_group),
                &[("api-version", STORAGE_API_VERSION)],
            )
            .await
            .map_err(|e| StorageMcpError::from_provider(e, &op))?;

        let storage_accounts: Vec<_> = response
            .body
            .into_iter()
            .map(|account| account_summary(account, resource_group))
            .collect();
        let summary = list_summary(&storage_accounts, resource_group);

        Ok(ListStorageAccountsResponse {
            total_count: storage_accounts.len(),
            storage_accounts,
            metadata: call.metadata(response.request_id),
            summary,
        })
    }

    /// Full configuration of one storage account.
    ///
    /// Blob service properties are best effort: any failure other than 403
    /// leaves them at their disabled defaults.
    pub async fn get_storage_account_details(
        &self,
        request: &GetStorageAccountDetailsRequest,
    ) -> Result<StorageAccountDetails> {
        let call = Invocation::start("get_storage_account_details", request);
        let result = self.details(&call, request).await;
        call.finish(result)
    }

    async fn details(
        &self,
        call: &Invocation,
        request: &GetStorageAccountDetailsRequest,
    ) -> Result<StorageAccountDetails> {
        let subscription_id = validate_subscription_id(&request.subscription_id)?;
        let resource_group = validate_resource_group(&request.resource_group)?;
        let account_name = validate_storage_account_name(&request.account_name)?;

        let op = OperationContext {
            action: "access storage account",
            required_permission: ACCOUNT_READ_PERMISSION,
            not_found: format!("Storage account not found: {account_name}"),
        };

        let arm = self.arm.get().await?;
        let account_path = storage_account_path(subscription_id, resource_group, account_name);
        let account = arm
            .get::<StorageAccountResource>(&account_path, &[("api-version", STORAGE_API_VERSION)])
            .await
            .map_err(|e| StorageMcpError::from_provider(e, &op))?;

        let blob = arm
            .get::<BlobServiceResource>(
                &format!("{account_path}/blobServices/default"),
                &[("api-version", STORAGE_API_VERSION)],
            )
            .await
            .map(|r| r.body);
        let blob = call.optional("get_blob_properties", blob, &op)?;

        let resource = account.body;
        let default_props = StorageAccountProperties::default();
        let props = resource.properties.as_ref().unwrap_or(&default_props);

        let basic = basic_properties(&resource, props, subscription_id, resource_group, account_name);
        let security = security_settings(props);
        let summary = details_summary(&basic, &security);

        Ok(StorageAccountDetails {
            network_configuration: network_configuration(props.network_acls.as_ref()),
            blob_service_properties: blob_service_properties(blob),
            access_policies: Vec::new(),
            diagnostic_settings: DiagnosticSettings::default(),
            metadata: call.metadata(account.request_id),
            basic_properties: basic,
            security_settings: security,
            summary,
        })
    }
}
