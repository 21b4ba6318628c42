//! Azure Monitor metrics for a storage account.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::arm::{storage_account_path, ArmClient, ArmResponse};
use crate::auth::AuthManager;
use crate::error::{OperationContext, ProviderError, Result};
use crate::models::{GetStorageMetricsRequest, MetricDataPoint, MetricDefinition, StorageMetrics};
use crate::tool::{text_or, Invocation, LazyArmClient};
use crate::validation::{
    validate_resource_group, validate_storage_account_name, validate_subscription_id,
};

/// API version used for `Microsoft.Insights` metrics and definitions.
pub const MONITOR_API_VERSION: &str = "2018-01-01";

pub const METRICS_READ_PERMISSION: &str = "Microsoft.Insights/metrics/read";

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Lookback window for a time range token.  Unknown tokens mean one hour.
pub fn lookback(time_range: &str) -> Duration {
    match time_range {
        "24h" => Duration::hours(24),
        "7d" => Duration::days(7),
        "30d" => Duration::days(30),
        _ => Duration::hours(1),
    }
}

/// Aggregation applied to metric data points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Average,
    Total,
    Maximum,
    Minimum,
    Count,
}

impl Aggregation {
    /// Case-insensitive; anything unrecognized is `Average`.
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "total" => Aggregation::Total,
            "maximum" => Aggregation::Maximum,
            "minimum" => Aggregation::Minimum,
            "count" => Aggregation::Count,
            _ => Aggregation::Average,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Average => "Average",
            Aggregation::Total => "Total",
            Aggregation::Maximum => "Maximum",
            Aggregation::Minimum => "Minimum",
            Aggregation::Count => "Count",
        }
    }

    fn pick(&self, point: &MetricValue) -> Option<f64> {
        match self {
            Aggregation::Average => point.average,
            Aggregation::Total => point.total,
            Aggregation::Maximum => point.maximum,
            Aggregation::Minimum => point.minimum,
            Aggregation::Count => point.count,
        }
    }
}

// ---------------------------------------------------------------------------
// Azure Monitor shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LocalizableString {
    value: Option<String>,
    #[serde(rename = "localizedValue")]
    localized_value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetricsResponse {
    value: Vec<MetricResource>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetricResource {
    unit: Option<String>,
    timeseries: Vec<TimeSeries>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TimeSeries {
    data: Vec<MetricValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct MetricValue {
    time_stamp: Option<DateTime<Utc>>,
    average: Option<f64>,
    total: Option<f64>,
    maximum: Option<f64>,
    minimum: Option<f64>,
    count: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetricDefinitionsResponse {
    value: Vec<MetricDefinitionResource>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct MetricDefinitionResource {
    name: Option<LocalizableString>,
    display_description: Option<String>,
    unit: Option<String>,
    primary_aggregation_type: Option<String>,
    supported_aggregation_types: Option<Vec<String>>,
    dimensions: Option<Vec<LocalizableString>>,
}

fn metric_definition(resource: MetricDefinitionResource) -> MetricDefinition {
    let name = resource.name.unwrap_or_default();
    let value = name.value.unwrap_or_default();
    MetricDefinition {
        display_name: name.localized_value.unwrap_or_else(|| value.clone()),
        name: value,
        description: resource.display_description.unwrap_or_default(),
        unit: text_or(&resource.unit, ""),
        primary_aggregation_type: text_or(&resource.primary_aggregation_type, ""),
        supported_aggregation_types: resource.supported_aggregation_types.unwrap_or_default(),
        dimensions: resource
            .dimensions
            .unwrap_or_default()
            .into_iter()
            .filter_map(|d| d.value)
            .collect(),
    }
}

/// Keep points that have a timestamp and a value for `aggregation`.
///
/// `label` is the aggregation name echoed on every point.
fn data_points(response: MetricsResponse, aggregation: Aggregation, label: &str) -> Vec<MetricDataPoint> {
    let mut points = Vec::new();
    for metric in response.value {
        let unit = text_or(&metric.unit, "");
        for series in metric.timeseries {
            for point in series.data {
                if let (Some(timestamp), Some(value)) = (point.time_stamp, aggregation.pick(&point)) {
                    points.push(MetricDataPoint {
                        timestamp,
                        value,
                        unit: unit.clone(),
                        aggregation_type: label.to_string(),
                    });
                }
            }
        }
    }
    points
}

/// Arithmetic mean of the point values; 0 with no points.
fn mean(points: &[MetricDataPoint]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    points.iter().map(|p| p.value).sum::<f64>() / points.len() as f64
}

fn format_metric(name: &str, value: f64) -> String {
    match name {
        "UsedCapacity" => format!("{name}: {:.2} GB", value / BYTES_PER_GB),
        "Transactions" => format!("{name}: {value:.0}"),
        _ => format!("{name}: {value:.2}"),
    }
}

fn metrics_summary(request: &GetStorageMetricsRequest, names: &[&str], aggregated: &BTreeMap<String, f64>) -> String {
    if names.is_empty() {
        return format!(
            "No metrics data available for '{}' in the last {}",
            request.account_name, request.time_range
        );
    }

    let values: Vec<String> = names
        .iter()
        .map(|name| format_metric(name, aggregated.get(*name).copied().unwrap_or(0.0)))
        .collect();
    format!(
        "Metrics for '{}' over the last {} ({}): {}",
        request.account_name,
        request.time_range,
        request.aggregation_type,
        values.join(", ")
    )
}

/// Requested metric names in request order, duplicates dropped.
fn unique_names(metrics: &[String]) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::with_capacity(metrics.len());
    for metric in metrics {
        if !names.contains(&metric.as_str()) {
            names.push(metric);
        }
    }
    names
}

/// Read-only metrics tool.
pub struct MetricsTools {
    arm: LazyArmClient,
}

impl MetricsTools {
    pub fn new(auth: Arc<AuthManager>, endpoint: &str) -> Self {
        Self {
            arm: LazyArmClient::new(auth, endpoint),
        }
    }

    /// Time series and mean per requested metric, plus the catalog of
    /// metrics the account exposes.
    ///
    /// Each metric is fetched independently; one failing metric yields an
    /// empty series instead of failing the call.  A 403 on any of them does
    /// fail it.
    pub async fn get_storage_metrics(&self, request: &GetStorageMetricsRequest) -> Result<StorageMetrics> {
        let call = Invocation::start("get_storage_metrics", request);
        let result = self.metrics(&call, request).await;
        call.finish(result)
    }

    async fn metrics(&self, call: &Invocation, request: &GetStorageMetricsRequest) -> Result<StorageMetrics> {
        let subscription_id = validate_subscription_id(&request.subscription_id)?;
        let resource_group = validate_resource_group(&request.resource_group)?;
        let account_name = validate_storage_account_name(&request.account_name)?;

        let op = OperationContext {
            action: "access metrics",
            required_permission: METRICS_READ_PERMISSION,
            not_found: format!("Storage account not found: {account_name}"),
        };

        let arm = self.arm.get().await?;
        let resource_id = storage_account_path(subscription_id, resource_group, account_name);

        let end_time = Utc::now();
        let start_time = end_time - lookback(&request.time_range);
        let timespan = format!(
            "{}/{}",
            start_time.to_rfc3339_opts(SecondsFormat::Secs, true),
            end_time.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let aggregation = Aggregation::parse(&request.aggregation_type);

        let definitions = arm
            .get::<MetricDefinitionsResponse>(
                &format!("{resource_id}/providers/Microsoft.Insights/metricDefinitions"),
                &[("api-version", MONITOR_API_VERSION)],
            )
            .await
            .map(|r| r.body);
        let available_metrics: Vec<MetricDefinition> = call
            .optional("get_available_metrics", definitions, &op)?
            .map(|d| d.value.into_iter().map(metric_definition).collect())
            .unwrap_or_default();

        let names = unique_names(&request.metrics);
        let mut request_id = None;
        let mut metrics_data = BTreeMap::new();
        let mut aggregated_summary = BTreeMap::new();

        for name in &names {
            let response = fetch_metric(arm, &resource_id, name, &timespan, &request.interval, aggregation).await;
            let response = call.optional(&format!("get_metric:{name}"), response, &op)?;

            let points = match response {
                Some(response) => {
                    request_id = request_id.or(response.request_id);
                    data_points(response.body, aggregation, &request.aggregation_type)
                }
                None => Vec::new(),
            };
            aggregated_summary.insert(name.to_string(), mean(&points));
            metrics_data.insert(name.to_string(), points);
        }

        let summary = metrics_summary(request, &names, &aggregated_summary);

        Ok(StorageMetrics {
            account_name: account_name.to_string(),
            time_range: request.time_range.clone(),
            start_time,
            end_time,
            metrics_data,
            aggregated_summary,
            available_metrics,
            metadata: call.metadata(request_id),
            summary,
        })
    }
}

async fn fetch_metric(
    arm: &ArmClient,
    resource_id: &str,
    name: &str,
    timespan: &str,
    interval: &str,
    aggregation: Aggregation,
) -> std::result::Result<ArmResponse<MetricsResponse>, ProviderError> {
    arm.get(
        &format!("{resource_id}/providers/Microsoft.Insights/metrics"),
        &[
            ("api-version", MONITOR_API_VERSION),
            ("timespan", timespan),
            ("interval", interval),
            ("metricnames", name),
            ("aggregation", aggregation.as_str()),
        ],
    )
    .await
}
