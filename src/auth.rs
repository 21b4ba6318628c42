//! Azure credential selection and caching.

use async_trait::async_trait;
use azure_core::credentials::TokenCredential;
use azure_identity::{
    AzureCliCredential, ClientSecretCredential, DeveloperToolsCredential,
    ManagedIdentityCredential,
};
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::config::{AuthConfig, ServicePrincipalConfig};
use crate::error::{ProviderError, Result, StorageMcpError};
use crate::logging;

/// Scope requested for Azure Resource Manager and Azure Monitor calls.
pub const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";

/// Anything that can hand out bearer tokens for a scope.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn bearer_token(&self, scope: &str) -> std::result::Result<String, ProviderError>;
}

/// [`TokenSource`] backed by an `azure_identity` credential.
struct IdentityTokenSource {
    credential: Arc<dyn TokenCredential>,
}

#[async_trait]
impl TokenSource for IdentityTokenSource {
    async fn bearer_token(&self, scope: &str) -> std::result::Result<String, ProviderError> {
        let token = self
            .credential
            .get_token(&[scope], None)
            .await
            .map_err(|e| ProviderError::Authentication(e.to_string()))?;
        Ok(token.token.secret().to_string())
    }
}

/// Supported authentication strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// Developer tool chain: Azure CLI, then Azure Developer CLI.
    Default,
    Cli,
    ManagedIdentity,
    ServicePrincipal,
}

impl AuthMethod {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "default" => Some(AuthMethod::Default),
            "cli" => Some(AuthMethod::Cli),
            "managed_identity" => Some(AuthMethod::ManagedIdentity),
            "service_principal" => Some(AuthMethod::ServicePrincipal),
            _ => None,
        }
    }
}

/// Owns the process-wide credential.
///
/// The credential is built on first use and reused afterwards; a failed
/// construction is not cached, so the next call tries again.
pub struct AuthManager {
    method: String,
    service_principal: ServicePrincipalConfig,
    credential: OnceCell<Arc<dyn TokenSource>>,
}

impl AuthManager {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            method: config.method,
            service_principal: config.service_principal,
            credential: OnceCell::new(),
        }
    }

    /// Build a manager whose credential is already resolved.
    #[cfg(test)]
    pub fn with_token_source(method: &str, source: Arc<dyn TokenSource>) -> Self {
        Self {
            method: method.to_string(),
            service_principal: ServicePrincipalConfig::default(),
            credential: OnceCell::new_with(Some(source)),
        }
    }

    pub fn auth_method(&self) -> &str {
        &self.method
    }

    /// Return the cached credential, constructing it on first call.
    pub async fn get_credential(&self) -> Result<Arc<dyn TokenSource>> {
        self.credential
            .get_or_try_init(|| async { self.create_credential() })
            .await
            .cloned()
    }

    fn create_credential(&self) -> Result<Arc<dyn TokenSource>> {
        match self.build_identity_credential() {
            Ok(credential) => {
                logging::log_authentication(&self.method, true, None);
                Ok(Arc::new(IdentityTokenSource { credential }))
            }
            Err(message) => {
                logging::log_authentication(&self.method, false, Some(&message));
                Err(StorageMcpError::authentication(
                    format!(
                        "Failed to create credential for method {}: {message}",
                        self.method
                    ),
                    self.method.clone(),
                ))
            }
        }
    }

    fn build_identity_credential(&self) -> std::result::Result<Arc<dyn TokenCredential>, String> {
        let method = AuthMethod::parse(&self.method)
            .ok_or_else(|| format!("Unknown authentication method: {}", self.method))?;

        let credential: Arc<dyn TokenCredential> = match method {
            AuthMethod::Default => DeveloperToolsCredential::new(None).map_err(|e| e.to_string())?,
            AuthMethod::Cli => AzureCliCredential::new(None).map_err(|e| e.to_string())?,
            AuthMethod::ManagedIdentity => {
                ManagedIdentityCredential::new(None).map_err(|e| e.to_string())?
            }
            AuthMethod::ServicePrincipal => {
                let sp = &self.service_principal;
                let (Some(tenant_id), Some(client_id), Some(secret)) =
                    (&sp.tenant_id, &sp.client_id, &sp.client_secret)
                else {
                    return Err("Service principal authentication requires AZURE_TENANT_ID, \
                                AZURE_CLIENT_ID, and AZURE_CLIENT_SECRET environment variables"
                        .to_string());
                };
                ClientSecretCredential::new(tenant_id, client_id.clone(), secret.clone(), None)
                    .map_err(|e| e.to_string())?
            }
        };
        Ok(credential)
    }

    /// Check the credential by requesting a management-plane token.
    ///
    /// Never fails: every problem is logged and reported as `false`.
    pub async fn test_authentication(&self) -> bool {
        let credential = match self.get_credential().await {
            Ok(credential) => credential,
            // Construction failures are already logged as authentication events.
            Err(_) => return false,
        };

        match credential.bearer_token(MANAGEMENT_SCOPE).await {
            Ok(token) => !token.is_empty(),
            Err(ProviderError::Authentication(message)) => {
                logging::log_authentication(&self.method, false, Some(&message));
                false
            }
            Err(other) => {
                logging::log_error(
                    other.kind_name(),
                    &other.to_string(),
                    &serde_json::json!({ "context": "test_authentication" }),
                );
                false
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{RejectingToken, StaticToken};
    use super::*;

    fn manager(method: &str, sp: ServicePrincipalConfig) -> AuthManager {
        AuthManager::new(AuthConfig {
            method: method.to_string(),
            service_principal: sp,
        })
    }

    #[test]
    fn parse_recognises_the_four_methods() {
        assert_eq!(AuthMethod::parse("default"), Some(AuthMethod::Default));
        assert_eq!(AuthMethod::parse("cli"), Some(AuthMethod::Cli));
        assert_eq!(AuthMethod::parse("managed_identity"), Some(AuthMethod::ManagedIdentity));
        assert_eq!(AuthMethod::parse("service_principal"), Some(AuthMethod::ServicePrincipal));
        assert_eq!(AuthMethod::parse("kerberos"), None);
    }

    #[tokio::test]
    async fn unknown_method_is_an_authentication_error() {
        let auth = manager("kerberos", ServicePrincipalConfig::default());
        let err = auth.get_credential().await.err().unwrap();
        assert_eq!(err.code(), "AUTH_ERROR");
        assert!(err.to_string().contains("Unknown authentication method: kerberos"));
        assert_eq!(err.context()["auth_method"], "kerberos");
    }

    #[tokio::test]
    async fn service_principal_requires_all_three_secrets() {
        let partial = ServicePrincipalConfig {
            tenant_id: Some("tenant".into()),
            client_id: Some("client".into()),
            client_secret: None,
        };
        let auth = manager("service_principal", partial);
        let err = auth.get_credential().await.err().unwrap();
        assert_eq!(err.code(), "AUTH_ERROR");
        assert!(err.to_string().contains("AZURE_CLIENT_SECRET"));
        assert!(!auth.test_authentication().await);
    }

    #[tokio::test]
    async fn credential_is_cached_between_calls() {
        let auth = AuthManager::with_token_source("cli", Arc::new(StaticToken("abc")));
        let first = auth.get_credential().await.unwrap();
        let second = auth.get_credential().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(auth.auth_method(), "cli");
    }

    #[tokio::test]
    async fn test_authentication_reports_token_outcome() {
        let good = AuthManager::with_token_source("default", Arc::new(StaticToken("abc")));
        assert!(good.test_authentication().await);

        let bad = AuthManager::with_token_source("default", Arc::new(RejectingToken));
        assert!(!bad.test_authentication().await);
    }
}
