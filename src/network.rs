//! Network access rules and private endpoint connections of a storage account.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::arm::{
    storage_account_path, NetworkRuleSet, PrivateEndpointConnectionResource,
    StorageAccountResource, STORAGE_API_VERSION,
};
use crate::auth::AuthManager;
use crate::error::{OperationContext, Result, StorageMcpError};
use crate::logging;
use crate::models::{
    GetNetworkRulesRequest, GetPrivateEndpointsRequest, GetPrivateEndpointsResponse, IpRule,
    NetworkConfiguration, NetworkInterfaceInfo, NetworkRules, PrivateEndpointConnection,
    ResourceAccessRule, VirtualNetworkRule,
};
use crate::tool::{text_or, Invocation, LazyArmClient};
use crate::validation::{
    validate_resource_group, validate_storage_account_name, validate_subscription_id,
};

pub const ACCOUNT_READ_PERMISSION: &str = "Microsoft.Storage/storageAccounts/read";
pub const PRIVATE_ENDPOINT_READ_PERMISSION: &str =
    "Microsoft.Storage/storageAccounts/privateEndpointConnections/read";

/// Normalize an account's network rule set.
///
/// Without a rule set the account is open: `Allow`, no rules and the
/// `AzureServices` bypass.  A rule set without a bypass means `None`.
pub(crate) fn network_configuration(acls: Option<&NetworkRuleSet>) -> NetworkConfiguration {
    let Some(acls) = acls else {
        return NetworkConfiguration {
            default_action: "Allow".to_string(),
            ip_rules: Vec::new(),
            virtual_network_rules: Vec::new(),
            resource_access_rules: Vec::new(),
            bypass: "AzureServices".to_string(),
        };
    };

    NetworkConfiguration {
        default_action: text_or(&acls.default_action, "Allow"),
        ip_rules: acls
            .ip_rules
            .iter()
            .flatten()
            .map(|rule| IpRule {
                ip_address_or_range: text_or(&rule.value, ""),
                action: text_or(&rule.action, "Allow"),
            })
            .collect(),
        virtual_network_rules: acls
            .virtual_network_rules
            .iter()
            .flatten()
            .map(|rule| VirtualNetworkRule {
                subnet_id: text_or(&rule.id, ""),
                action: text_or(&rule.action, "Allow"),
                state: text_or(&rule.state, ""),
            })
            .collect(),
        resource_access_rules: acls
            .resource_access_rules
            .iter()
            .flatten()
            .map(|rule| ResourceAccessRule {
                tenant_id: text_or(&rule.tenant_id, ""),
                resource_id: text_or(&rule.resource_id, ""),
            })
            .collect(),
        bypass: text_or(&acls.bypass, "None"),
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

fn network_summary(account_name: &str, config: &NetworkConfiguration) -> String {
    let counts = [
        (config.ip_rules.len(), "IP rule"),
        (config.virtual_network_rules.len(), "VNet rule"),
        (config.resource_access_rules.len(), "resource rule"),
    ];
    let rules: Vec<String> = counts
        .iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, label)| format!("{count} {label}{}", plural(*count)))
        .collect();
    let rules = if rules.is_empty() {
        "no custom rules".to_string()
    } else {
        rules.join(", ")
    };

    format!(
        "Network access for '{account_name}': default action is {}. Rules: {rules}. Bypass: {}",
        config.default_action, config.bypass
    )
}

fn private_endpoints_summary(account_name: &str, endpoints: &[PrivateEndpointConnection]) -> String {
    if endpoints.is_empty() {
        return format!("No private endpoints configured for storage account '{account_name}'");
    }

    let mut states: BTreeMap<&str, usize> = BTreeMap::new();
    for endpoint in endpoints {
        *states.entry(endpoint.connection_state.as_str()).or_default() += 1;
    }
    let states: Vec<String> = states
        .iter()
        .map(|(state, count)| format!("{state}: {count}"))
        .collect();

    format!(
        "Found {} private endpoint{} for '{account_name}'. Connection states: {}",
        endpoints.len(),
        plural(endpoints.len()),
        states.join(", ")
    )
}

fn private_endpoint_connection(resource: PrivateEndpointConnectionResource) -> PrivateEndpointConnection {
    let name = text_or(&resource.name, "");
    let properties = resource.properties.unwrap_or_default();
    let endpoint_id = properties
        .private_endpoint
        .and_then(|pe| pe.id)
        .unwrap_or_default();
    let state = properties.private_link_service_connection_state.unwrap_or_default();

    let actions_required = state
        .action_required
        .as_deref()
        .map(|actions| {
            actions
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    PrivateEndpointConnection {
        network_interface_info: NetworkInterfaceInfo {
            id: endpoint_id.clone(),
            name: name.clone(),
            private_ip_address: String::new(),
            subnet_id: String::new(),
            is_primary: true,
        },
        name,
        private_endpoint_id: endpoint_id,
        connection_state: text_or(&state.status, "Unknown"),
        provisioning_state: text_or(&properties.provisioning_state, "Unknown"),
        dns_zones: Vec::new(),
        actions_required,
        description: text_or(&state.description, ""),
    }
}

/// Read-only network tools.
pub struct NetworkTools {
    arm: LazyArmClient,
}

impl NetworkTools {
    pub fn new(auth: Arc<AuthManager>, endpoint: &str) -> Self {
        Self {
            arm: LazyArmClient::new(auth, endpoint),
        }
    }

    /// Network ACL of a storage account: default action, IP, VNet and
    /// resource-instance rules, bypass.
    pub async fn get_network_rules(&self, request: &GetNetworkRulesRequest) -> Result<NetworkRules> {
        let call = Invocation::start("get_network_rules", request);
        let result = self.network_rules(&call, request).await;
        call.finish(result)
    }

    async fn network_rules(
        &self,
        call: &Invocation,
        request: &GetNetworkRulesRequest,
    ) -> Result<NetworkRules> {
        let subscription_id = validate_subscription_id(&request.subscription_id)?;
        let resource_group = validate_resource_group(&request.resource_group)?;
        let account_name = validate_storage_account_name(&request.account_name)?;

        let op = OperationContext {
            action: "access network rules",
            required_permission: ACCOUNT_READ_PERMISSION,
            not_found: format!("Storage account not found: {account_name}"),
        };

        let arm = self.arm.get().await?;
        let account = arm
            .get::<StorageAccountResource>(
                &storage_account_path(subscription_id, resource_group, account_name),
                &[("api-version", STORAGE_API_VERSION)],
            )
            .await
            .map_err(|e| StorageMcpError::from_provider(e, &op))?;

        let acls = account.body.properties.as_ref().and_then(|p| p.network_acls.as_ref());
        let config = network_configuration(acls);
        let summary = network_summary(account_name, &config);

        Ok(NetworkRules {
            default_action: config.default_action,
            ip_rules: config.ip_rules,
            virtual_network_rules: config.virtual_network_rules,
            resource_access_rules: config.resource_access_rules,
            bypass: config.bypass,
            metadata: call.metadata(account.request_id),
            summary,
        })
    }

    /// Private endpoint connections of a storage account.
    pub async fn get_private_endpoints(
        &self,
        request: &GetPrivateEndpointsRequest,
    ) -> Result<GetPrivateEndpointsResponse> {
        let call = Invocation::start("get_private_endpoints", request);
        let result = self.private_endpoints(&call, request).await;
        call.finish(result)
    }

    async fn private_endpoints(
        &self,
        call: &Invocation,
        request: &GetPrivateEndpointsRequest,
    ) -> Result<GetPrivateEndpointsResponse> {
        let subscription_id = validate_subscription_id(&request.subscription_id)?;
        let resource_group = validate_resource_group(&request.resource_group)?;
        let account_name = validate_storage_account_name(&request.account_name)?;

        let op = OperationContext {
            action: "access private endpoints",
            required_permission: PRIVATE_ENDPOINT_READ_PERMISSION,
            not_found: format!("Storage account not found: {account_name}"),
        };

        let arm = self.arm.get().await?;
        let path = format!(
            "{}/privateEndpointConnections",
            storage_account_path(subscription_id, resource_group, account_name)
        );

        let (connections, request_id) = match arm
            .list::<PrivateEndpointConnectionResource>(&path, &[("api-version", STORAGE_API_VERSION)])
            .await
        {
            Ok(response) => (response.body, response.request_id),
            // A missing collection just means nothing is configured.
            Err(err) if err.status() == Some(404) => {
                logging::log_error(
                    err.kind_name(),
                    &err.to_string(),
                    &serde_json::json!({
                        "context": "list_private_endpoint_connections",
                        "correlation_id": call.correlation_id(),
                    }),
                );
                (Vec::new(), None)
            }
            Err(err) => return Err(StorageMcpError::from_provider(err, &op)),
        };

        let private_endpoints: Vec<_> = connections
            .into_iter()
            .map(private_endpoint_connection)
            .collect();
        let summary = private_endpoints_summary(account_name, &private_endpoints);

        Ok(GetPrivateEndpointsResponse {
            total_count: private_endpoints.len(),
            private_endpoints,
            metadata: call.metadata(request_id),
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::IpRuleResource;
    use crate::tool::testing::{account_id, account_json, server_and_auth, RESOURCE_GROUP, SUBSCRIPTION_ID};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rules_request(account: &str) -> GetNetworkRulesRequest {
        GetNetworkRulesRequest {
            subscription_id: SUBSCRIPTION_ID.into(),
            resource_group: RESOURCE_GROUP.into(),
            account_name: account.into(),
        }
    }

    fn endpoints_request(account: &str) -> GetPrivateEndpointsRequest {
        GetPrivateEndpointsRequest {
            subscription_id: SUBSCRIPTION_ID.into(),
            resource_group: RESOURCE_GROUP.into(),
            account_name: account.into(),
        }
    }

    #[test]
    fn absent_rule_set_is_open_with_azure_services_bypass() {
        let config = network_configuration(None);
        assert_eq!(config.default_action, "Allow");
        assert!(config.ip_rules.is_empty());
        assert!(config.virtual_network_rules.is_empty());
        assert!(config.resource_access_rules.is_empty());
        assert_eq!(config.bypass, "AzureServices");
    }

    #[test]
    fn rule_set_without_bypass_reports_none() {
        let acls = NetworkRuleSet {
            default_action: Some("Deny".into()),
            ip_rules: Some(vec![IpRuleResource {
                value: Some("10.0.0.0/24".into()),
                action: None,
            }]),
            ..Default::default()
        };
        let config = network_configuration(Some(&acls));
        assert_eq!(config.default_action, "Deny");
        assert_eq!(config.bypass, "None");
        assert_eq!(
            config.ip_rules,
            vec![IpRule {
                ip_address_or_range: "10.0.0.0/24".into(),
                action: "Allow".into()
            }]
        );
    }

    #[test]
    fn network_summary_lists_only_non_empty_categories() {
        let mut config = network_configuration(None);
        assert_eq!(
            network_summary("acct", &config),
            "Network access for 'acct': default action is Allow. Rules: no custom rules. Bypass: AzureServices"
        );

        config.default_action = "Deny".into();
        config.ip_rules = vec![
            IpRule { ip_address_or_range: "1.1.1.1".into(), action: "Allow".into() },
            IpRule { ip_address_or_range: "2.2.2.2".into(), action: "Allow".into() },
        ];
        config.resource_access_rules = vec![ResourceAccessRule {
            tenant_id: "t".into(),
            resource_id: "r".into(),
        }];
        assert_eq!(
            network_summary("acct", &config),
            "Network access for 'acct': default action is Deny. \
             Rules: 2 IP rules, 1 resource rule. Bypass: AzureServices"
        );
    }

    #[tokio::test]
    async fn network_rules_are_normalized_from_account() {
        let (server, auth) = server_and_auth().await;
        let mut body = account_json("acct", "eastus");
        body["properties"]["networkAcls"] = json!({
            "bypass": "AzureServices, Logging",
            "defaultAction": "Deny",
            "ipRules": [{ "value": "203.0.113.0/24", "action": "Allow" }],
            "virtualNetworkRules": [{ "id": "/subnets/a", "action": "Allow", "state": "Succeeded" }]
        });
        Mock::given(method("GET"))
            .and(path(account_id("acct")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(&server)
            .await;

        let tools = NetworkTools::new(auth, &server.uri());
        let rules = tools.get_network_rules(&rules_request("acct")).await.unwrap();
        assert_eq!(rules.default_action, "Deny");
        assert_eq!(rules.bypass, "AzureServices, Logging");
        assert_eq!(rules.virtual_network_rules[0].subnet_id, "/subnets/a");
        assert!(rules.summary.contains("1 IP rule, 1 VNet rule"));
    }

    #[tokio::test]
    async fn zero_private_endpoints_is_reported() {
        let (server, auth) = server_and_auth().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/privateEndpointConnections", account_id("acct"))))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
            .mount(&server)
            .await;

        let tools = NetworkTools::new(auth, &server.uri());
        let response = tools.get_private_endpoints(&endpoints_request("acct")).await.unwrap();
        assert_eq!(response.total_count, 0);
        assert_eq!(
            response.summary,
            "No private endpoints configured for storage account 'acct'"
        );
    }

    #[tokio::test]
    async fn private_endpoints_are_grouped_by_state() {
        let (server, auth) = server_and_auth().await;
        let connection = |name: &str, status: &str| {
            json!({
                "name": name,
                "properties": {
                    "privateEndpoint": { "id": format!("/privateEndpoints/{name}") },
                    "privateLinkServiceConnectionState": {
                        "status": status,
                        "description": "Auto-approved",
                        "actionRequired": "None, Recreate"
                    },
                    "provisioningState": "Succeeded"
                }
            })
        };
        Mock::given(method("GET"))
            .and(path(format!("{}/privateEndpointConnections", account_id("acct"))))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    connection("pe1", "Pending"),
                    connection("pe2", "Approved"),
                    connection("pe3", "Approved"),
                ]
            })))
            .mount(&server)
            .await;

        let tools = NetworkTools::new(auth, &server.uri());
        let response = tools.get_private_endpoints(&endpoints_request("acct")).await.unwrap();
        assert_eq!(response.total_count, 3);
        assert_eq!(
            response.summary,
            "Found 3 private endpoints for 'acct'. Connection states: Approved: 2, Pending: 1"
        );
        let first = &response.private_endpoints[0];
        assert_eq!(first.private_endpoint_id, "/privateEndpoints/pe1");
        assert_eq!(first.actions_required, vec!["None", "Recreate"]);
        assert_eq!(first.network_interface_info.private_ip_address, "");
        assert!(first.network_interface_info.is_primary);
    }

    #[tokio::test]
    async fn missing_private_endpoint_collection_is_empty() {
        let (server, auth) = server_and_auth().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tools = NetworkTools::new(auth, &server.uri());
        let response = tools.get_private_endpoints(&endpoints_request("acct")).await.unwrap();
        assert_eq!(response.total_count, 0);
        assert!(response.metadata.request_id.is_none());
    }

    #[tokio::test]
    async fn forbidden_network_rules_need_account_read_permission() {
        let (server, auth) = server_and_auth().await;
        Mock::given(method("GET"))
            .and(path(account_id("acct")))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": { "code": "AuthorizationFailed", "message": "denied" }
            })))
            .mount(&server)
            .await;

        let tools = NetworkTools::new(auth, &server.uri());
        let err = tools.get_network_rules(&rules_request("acct")).await.unwrap_err();
        assert_eq!(err.code(), "PERMISSION_ERROR");
        match err {
            StorageMcpError::Permission { required_permission, .. } => {
                assert_eq!(required_permission, ACCOUNT_READ_PERMISSION)
            }
            other => panic!("expected permission error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn forbidden_private_endpoints_need_connection_permission() {
        let (server, auth) = server_and_auth().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let tools = NetworkTools::new(auth, &server.uri());
        let err = tools
            .get_private_endpoints(&endpoints_request("acct"))
            .await
            .unwrap_err();
        match err {
            StorageMcpError::Permission { required_permission, .. } => {
                assert_eq!(required_permission, PRIVATE_ENDPOINT_READ_PERMISSION)
            }
            other => panic!("expected permission error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_account_is_named_in_the_error() {
        let (server, auth) = server_and_auth().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tools = NetworkTools::new(auth, &server.uri());
        let err = tools.get_network_rules(&rules_request("ghost")).await.unwrap_err();
        assert_eq!(err.to_string(), "Storage account not found: ghost");
    }

    #[tokio::test]
    async fn invalid_account_name_never_reaches_azure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let tools = NetworkTools::new(crate::auth::testing::static_auth(), &server.uri());
        let err = tools
            .get_network_rules(&rules_request("Bad_Name"))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }
}
