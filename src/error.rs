//! Error taxonomy shared by every tool.
//!
//! [`ProviderError`] describes what went wrong talking to Azure;
//! [`StorageMcpError`] is the closed set of kinds surfaced to MCP clients.
//! The single translation between the two lives in [`StorageMcpError::from_provider`].

use thiserror::Error;

/// Auth method recorded on errors raised while calling Azure with an existing credential.
pub const PROVIDER_AUTH_METHOD: &str = "azure_auth";

/// Failure reported by the Azure provider layer (identity or REST).
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The credential could not produce a bearer token.
    #[error("{0}")]
    Authentication(String),

    /// ARM or Azure Monitor answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The request never produced a response.
    #[error("request failed: {0}")]
    Transport(String),

    /// The response body did not match the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ProviderError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// An HTTP failure that is neither a credential (401) nor a permission
    /// (403) rejection. Optional sub-calls may fall back to defaults on these.
    pub fn is_degradable(&self) -> bool {
        matches!(self.status(), Some(status) if status != 401 && status != 403)
    }

    /// Kind name used as `error_type` in log records.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ProviderError::Authentication(_) => "ClientAuthenticationError",
            ProviderError::Http { .. } => "HttpResponseError",
            ProviderError::Transport(_) => "TransportError",
            ProviderError::Decode(_) => "DecodeError",
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

/// Main error type for tool operations.
#[derive(Debug, Error)]
pub enum StorageMcpError {
    #[error("{message}")]
    Authentication { message: String, auth_method: String },

    #[error("{message}")]
    Permission {
        message: String,
        required_permission: String,
    },

    #[error("{message}")]
    Validation { message: String, field: String },

    #[error("{message}")]
    AzureApi {
        message: String,
        status_code: Option<u16>,
    },

    #[error("{message}")]
    Unknown { message: String },
}

/// Per-operation facts needed to translate a provider failure.
#[derive(Debug, Clone)]
pub struct OperationContext {
    /// Phrase completing "Insufficient permissions to …".
    pub action: &'static str,
    /// RBAC action the caller needs for this operation.
    pub required_permission: &'static str,
    /// Message used when the provider answers 404.
    pub not_found: String,
}

impl StorageMcpError {
    pub fn authentication<S: Into<String>>(msg: S, auth_method: S) -> Self {
        Self::Authentication {
            message: msg.into(),
            auth_method: auth_method.into(),
        }
    }

    pub fn permission<S: Into<String>>(msg: S, required_permission: S) -> Self {
        Self::Permission {
            message: msg.into(),
            required_permission: required_permission.into(),
        }
    }

    pub fn validation<S: Into<String>>(msg: S, field: S) -> Self {
        Self::Validation {
            message: msg.into(),
            field: field.into(),
        }
    }

    pub fn azure_api<S: Into<String>>(msg: S, status_code: Option<u16>) -> Self {
        Self::AzureApi {
            message: msg.into(),
            status_code,
        }
    }

    pub fn unknown<S: Into<String>>(msg: S) -> Self {
        Self::Unknown {
            message: msg.into(),
        }
    }

    /// Machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            StorageMcpError::Authentication { .. } => "AUTH_ERROR",
            StorageMcpError::Permission { .. } => "PERMISSION_ERROR",
            StorageMcpError::Validation { .. } => "VALIDATION_ERROR",
            StorageMcpError::AzureApi { .. } => "AZURE_API_ERROR",
            StorageMcpError::Unknown { .. } => "UNKNOWN_ERROR",
        }
    }

    /// Kind name used as `error_type` in log records.
    pub fn kind_name(&self) -> &'static str {
        match self {
            StorageMcpError::Authentication { .. } => "AuthenticationError",
            StorageMcpError::Permission { .. } => "PermissionError",
            StorageMcpError::Validation { .. } => "ValidationError",
            StorageMcpError::AzureApi { .. } => "AzureAPIError",
            StorageMcpError::Unknown { .. } => "AzureStorageMCPError",
        }
    }

    /// Kind-specific context fields, rendered for log records.
    pub fn context(&self) -> serde_json::Value {
        match self {
            StorageMcpError::Authentication { auth_method, .. } => {
                serde_json::json!({ "auth_method": auth_method })
            }
            StorageMcpError::Permission {
                required_permission,
                ..
            } => serde_json::json!({ "required_permission": required_permission }),
            StorageMcpError::Validation { field, .. } => {
                serde_json::json!({ "field_name": field })
            }
            StorageMcpError::AzureApi { status_code, .. } => {
                serde_json::json!({ "status_code": status_code })
            }
            StorageMcpError::Unknown { .. } => serde_json::json!({}),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, StorageMcpError::Validation { .. })
    }

    /// Translate a provider failure for the given operation.
    pub fn from_provider(err: ProviderError, op: &OperationContext) -> Self {
        match err {
            ProviderError::Authentication(msg) => Self::authentication(
                format!("Authentication failed: {msg}"),
                PROVIDER_AUTH_METHOD.to_string(),
            ),
            ProviderError::Http {
                status: 401,
                message,
                ..
            } => Self::authentication(
                format!("Authentication failed: {message}"),
                PROVIDER_AUTH_METHOD.to_string(),
            ),
            ProviderError::Http {
                status: 403,
                message,
                ..
            } => Self::permission(
                format!("Insufficient permissions to {}: {message}", op.action),
                op.required_permission.to_string(),
            ),
            ProviderError::Http { status: 404, .. } => {
                Self::azure_api(op.not_found.clone(), Some(404))
            }
            err @ ProviderError::Http { .. } => {
                let status = err.status();
                Self::azure_api(format!("Azure API error: {err}"), status)
            }
            err @ (ProviderError::Transport(_) | ProviderError::Decode(_)) => {
                Self::unknown(format!("Unexpected error: {err}"))
            }
        }
    }
}

/// Result type alias for tool operations.
pub type Result<T> = std::result::Result<T, StorageMcpError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn op() -> OperationContext {
        OperationContext {
            action: "access storage account",
            required_permission: "Microsoft.Storage/storageAccounts/read",
            not_found: "Storage account not found: mystorage".into(),
        }
    }

    fn http(status: u16) -> ProviderError {
        ProviderError::Http {
            status,
            message: "provider said no".into(),
        }
    }

    #[test]
    fn forbidden_becomes_permission_error_with_operation_permission() {
        let err = StorageMcpError::from_provider(http(403), &op());
        match &err {
            StorageMcpError::Permission {
                required_permission,
                message,
            } => {
                assert_eq!(required_permission, "Microsoft.Storage/storageAccounts/read");
                assert!(message.starts_with("Insufficient permissions to access storage account"));
            }
            other => panic!("expected permission error, got {other:?}"),
        }
        assert_eq!(err.code(), "PERMISSION_ERROR");
    }

    #[test]
    fn not_found_names_missing_resource() {
        let err = StorageMcpError::from_provider(http(404), &op());
        assert_eq!(err.to_string(), "Storage account not found: mystorage");
        assert!(matches!(
            err,
            StorageMcpError::AzureApi {
                status_code: Some(404),
                ..
            }
        ));
    }

    #[test]
    fn other_statuses_keep_status_code() {
        let err = StorageMcpError::from_provider(http(503), &op());
        assert_eq!(err.code(), "AZURE_API_ERROR");
        assert!(matches!(
            err,
            StorageMcpError::AzureApi {
                status_code: Some(503),
                ..
            }
        ));
        assert!(err.to_string().contains("HTTP 503"));
    }

    #[test]
    fn unauthorized_and_token_failures_are_auth_errors() {
        let from_status = StorageMcpError::from_provider(http(401), &op());
        assert_eq!(from_status.code(), "AUTH_ERROR");

        let from_token = StorageMcpError::from_provider(
            ProviderError::Authentication("no az login".into()),
            &op(),
        );
        assert_eq!(from_token.code(), "AUTH_ERROR");
        assert_eq!(from_token.to_string(), "Authentication failed: no az login");
        assert_eq!(from_token.context()["auth_method"], PROVIDER_AUTH_METHOD);
    }

    #[test]
    fn transport_failures_are_unknown() {
        let err = StorageMcpError::from_provider(
            ProviderError::Transport("connection reset".into()),
            &op(),
        );
        assert_eq!(err.code(), "UNKNOWN_ERROR");
        assert!(err.to_string().starts_with("Unexpected error:"));
    }

    #[test]
    fn validation_context_names_field() {
        let err = StorageMcpError::validation("bad", "account_name");
        assert!(err.is_validation());
        assert_eq!(err.context()["field_name"], "account_name");
    }

    #[test]
    fn only_plain_http_failures_are_degradable() {
        assert!(ProviderError::Http { status: 500, message: "boom".into() }.is_degradable());
        assert!(ProviderError::Http { status: 404, message: "gone".into() }.is_degradable());
        assert!(!ProviderError::Http { status: 401, message: "no".into() }.is_degradable());
        assert!(!ProviderError::Http { status: 403, message: "no".into() }.is_degradable());
        assert!(!ProviderError::Authentication("expired".into()).is_degradable());
        assert!(!ProviderError::Transport("refused".into()).is_degradable());
        assert!(!ProviderError::Decode("garbled".into()).is_degradable());
    }
}
