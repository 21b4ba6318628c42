use anyhow::{Context, Result};
use azure_core::credentials::Secret;
use std::env;

/// Default Azure Resource Manager endpoint (public cloud).
pub const DEFAULT_ARM_ENDPOINT: &str = "https://management.azure.com";

/// Service principal secrets read from the standard Azure environment variables.
///
/// Each value is optional here; the credential provider decides whether the
/// combination is sufficient for the selected authentication method.
#[derive(Debug, Clone, Default)]
pub struct ServicePrincipalConfig {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<Secret>,
}

/// Authentication configuration.
///
/// - `AZURE_AUTH_METHOD`: one of `default`, `cli`, `managed_identity`,
///   `service_principal` (default: `default`).
/// - `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET`: required
///   only for `service_principal`.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub method: String,
    pub service_principal: ServicePrincipalConfig,
}

/// Output format of the structured log sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" | "pretty" => Ok(LogFormat::Text),
            other => anyhow::bail!("Unsupported LOG_FORMAT '{other}'.  Use `json` or `text`."),
        }
    }
}

/// Top-level server configuration assembled from environment variables at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub auth: AuthConfig,
    /// Base URL of the Azure Resource Manager endpoint
    /// (`AZURE_RESOURCE_MANAGER_ENDPOINT`), without a trailing slash.
    pub arm_endpoint: String,
    pub log_format: LogFormat,
}

impl Config {
    /// Build configuration from the current process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// The authentication method string is kept verbatim; unknown methods are
    /// rejected by the credential provider, not here.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let method = lookup("AZURE_AUTH_METHOD")
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "default".to_string());

        let service_principal = ServicePrincipalConfig {
            tenant_id: lookup("AZURE_TENANT_ID").filter(|v| !v.is_empty()),
            client_id: lookup("AZURE_CLIENT_ID").filter(|v| !v.is_empty()),
            client_secret: lookup("AZURE_CLIENT_SECRET")
                .filter(|v| !v.is_empty())
                .map(Secret::from),
        };

        let arm_endpoint = lookup("AZURE_RESOURCE_MANAGER_ENDPOINT")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_ARM_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string();
        anyhow::ensure!(
            arm_endpoint.starts_with("https://") || arm_endpoint.starts_with("http://"),
            "AZURE_RESOURCE_MANAGER_ENDPOINT must be an http(s) URL, got '{arm_endpoint}'"
        );

        let log_format = lookup("LOG_FORMAT")
            .map(|raw| LogFormat::parse(&raw))
            .transpose()
            .context("Invalid LOG_FORMAT")?
            .unwrap_or(LogFormat::Json);

        Ok(Config {
            auth: AuthConfig {
                method,
                service_principal,
            },
            arm_endpoint,
            log_format,
        })
    }
}
