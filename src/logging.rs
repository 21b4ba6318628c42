//! Structured logging for tool invocations, authentication attempts and errors.
//!
//! Everything goes through `tracing`; with the JSON formatter each record is a
//! single line on stderr so stdout stays clean for MCP JSON-RPC.

use serde_json::{Map, Value};

use crate::config::LogFormat;
use crate::error::StorageMcpError;

/// Replacement written in place of sensitive parameter values.
pub const REDACTED: &str = "***REDACTED***";

/// Parameter names containing any of these (case-insensitive) are redacted.
const SENSITIVE_KEYS: [&str; 5] = ["password", "secret", "key", "token", "credential"];

pub const TOOL_EXECUTION_TARGET: &str = "azure_storage_mcp::tool_execution";
pub const AUTHENTICATION_TARGET: &str = "azure_storage_mcp::authentication";
pub const ERROR_TARGET: &str = "azure_storage_mcp::error";

/// Install the global subscriber.  `RUST_LOG` refines the default filter.
pub fn init(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::from_env("RUST_LOG")
        .add_directive("azure_storage_mcp=info".parse().unwrap());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .init(),
        LogFormat::Text => builder.init(),
    }
}

fn is_sensitive(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_KEYS.iter().any(|s| key.contains(s))
}

/// Return a copy of `parameters` with sensitive values replaced by [`REDACTED`].
///
/// Nested objects are sanitized too; non-object values pass through unchanged.
pub fn sanitize_parameters(parameters: &Value) -> Value {
    match parameters {
        Value::Object(map) => {
            let sanitized: Map<String, Value> = map
                .iter()
                .map(|(key, value)| {
                    let value = if is_sensitive(key) {
                        Value::String(REDACTED.to_string())
                    } else {
                        sanitize_parameters(value)
                    };
                    (key.clone(), value)
                })
                .collect();
            Value::Object(sanitized)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize_parameters).collect()),
        other => other.clone(),
    }
}

/// Unqualified name of `T`, used as the `result_type` of a record.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// One record per tool invocation, successful or not.
#[derive(Debug, Clone)]
pub struct ToolExecutionRecord {
    pub tool_name: String,
    pub correlation_id: Option<String>,
    pub parameters: Value,
    pub result_type: &'static str,
    pub success: bool,
    pub error: Option<ErrorDetails>,
}

#[derive(Debug, Clone)]
pub struct ErrorDetails {
    pub error_type: &'static str,
    pub error_code: &'static str,
    pub message: String,
    pub context: Value,
}

impl ErrorDetails {
    pub fn from_error(err: &StorageMcpError) -> Self {
        Self {
            error_type: err.kind_name(),
            error_code: err.code(),
            message: err.to_string(),
            context: err.context(),
        }
    }
}

impl ToolExecutionRecord {
    /// Record a successful invocation.  `parameters` are sanitized here.
    pub fn success(
        tool_name: &str,
        correlation_id: &str,
        parameters: &Value,
        result_type: &'static str,
    ) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            correlation_id: Some(correlation_id.to_string()),
            parameters: sanitize_parameters(parameters),
            result_type,
            success: true,
            error: None,
        }
    }

    /// Record a failed invocation.  `correlation_id` is absent when the call
    /// failed before a tool was reached (unknown tool, malformed arguments).
    pub fn failure(
        tool_name: &str,
        correlation_id: Option<&str>,
        parameters: &Value,
        err: &StorageMcpError,
    ) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            correlation_id: correlation_id.map(str::to_string),
            parameters: sanitize_parameters(parameters),
            result_type: "None",
            success: false,
            error: Some(ErrorDetails::from_error(err)),
        }
    }

    pub fn emit(&self) {
        let correlation_id = self.correlation_id.as_deref().unwrap_or("");
        match &self.error {
            None => tracing::info!(
                target: TOOL_EXECUTION_TARGET,
                event_type = "tool_execution",
                tool_name = %self.tool_name,
                correlation_id,
                parameters = %self.parameters,
                result_type = self.result_type,
                success = self.success,
                "tool executed"
            ),
            Some(err) => tracing::error!(
                target: TOOL_EXECUTION_TARGET,
                event_type = "tool_execution",
                tool_name = %self.tool_name,
                correlation_id,
                parameters = %self.parameters,
                result_type = self.result_type,
                success = self.success,
                error_type = err.error_type,
                error_code = err.error_code,
                error = %err.message,
                context = %err.context,
                "tool failed"
            ),
        }
    }
}

/// Log an authentication attempt.  Failures are warnings, not errors.
pub fn log_authentication(auth_method: &str, success: bool, error: Option<&str>) {
    if success {
        tracing::info!(
            target: AUTHENTICATION_TARGET,
            event_type = "authentication",
            auth_method,
            success,
            "authentication succeeded"
        );
    } else {
        tracing::warn!(
            target: AUTHENTICATION_TARGET,
            event_type = "authentication",
            auth_method,
            success,
            error = error.unwrap_or(""),
            "authentication failed"
        );
    }
}

/// Log an error that was absorbed or is about to be handled elsewhere.
pub fn log_error(error_type: &str, message: &str, context: &Value) {
    tracing::error!(
        target: ERROR_TARGET,
        event_type = "error",
        error_type,
        error_message = message,
        context = %sanitize_parameters(context),
        "error"
    );
}

#[cfg(test)]
pub(crate) mod capture {
    //! Test-only subscriber layer that records emitted events.

    use std::fmt::Debug;
    use std::sync::{Arc, Mutex};

    use tracing::field::{Field, Visit};
    use tracing::{Event, Subscriber};
    use tracing_subscriber::layer::{Context, Layer};

    #[derive(Debug, Clone)]
    pub struct CapturedEvent {
        pub target: String,
        pub fields: Vec<(String, String)>,
    }

    impl CapturedEvent {
        pub fn field(&self, name: &str) -> Option<&str> {
            self.fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        }
    }

    #[derive(Clone, Default)]
    pub struct CaptureLayer {
        events: Arc<Mutex<Vec<CapturedEvent>>>,
    }

    impl CaptureLayer {
        pub fn events(&self) -> Vec<CapturedEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn with_target(&self, target: &str) -> Vec<CapturedEvent> {
            self.events()
                .into_iter()
                .filter(|e| e.target == target)
                .collect()
        }
    }

    struct FieldVisitor<'a>(&'a mut Vec<(String, String)>);

    impl Visit for FieldVisitor<'_> {
        fn record_str(&mut self, field: &Field, value: &str) {
            self.0.push((field.name().to_string(), value.to_string()));
        }

        fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
            self.0.push((field.name().to_string(), format!("{value:?}")));
        }
    }

    impl<S: Subscriber> Layer<S> for CaptureLayer {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut fields = Vec::new();
            event.record(&mut FieldVisitor(&mut fields));
            self.events.lock().unwrap().push(CapturedEvent {
                target: event.metadata().target().to_string(),
                fields,
            });
        }
    }
}
