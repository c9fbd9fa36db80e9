use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const METRIC_ACTION_IS_EFFECTIVE: &str = "action_is_effective";
pub const METRIC_ACTION_IS_VALID: &str = "action_is_valid";
pub const METRIC_SUCCESS: &str = "success";
pub const METRIC_FORMAT_PENALTY: &str = "format_penalty";

/// How a trainer should summarise a per-turn metric across an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricAggregation {
    Mean,
    Last,
}

/// Aggregation hints attached to every step outcome.
pub fn default_metrics_agg_mode() -> BTreeMap<String, MetricAggregation> {
    BTreeMap::from([
        (METRIC_ACTION_IS_EFFECTIVE.to_string(), MetricAggregation::Mean),
        (METRIC_ACTION_IS_VALID.to_string(), MetricAggregation::Mean),
        (METRIC_SUCCESS.to_string(), MetricAggregation::Last),
        (METRIC_FORMAT_PENALTY.to_string(), MetricAggregation::Mean),
    ])
}

/// Metrics for a turn that never reached the server.
pub(crate) fn failed_turn_metrics(format_penalty: f64) -> Map<String, Value> {
    let mut metrics = Map::new();
    metrics.insert(METRIC_ACTION_IS_EFFECTIVE.to_string(), Value::Bool(false));
    metrics.insert(METRIC_ACTION_IS_VALID.to_string(), Value::Bool(false));
    metrics.insert(METRIC_SUCCESS.to_string(), Value::Bool(false));
    metrics.insert(METRIC_FORMAT_PENALTY.to_string(), Value::from(format_penalty));
    metrics
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetInfo {
    pub env_instruction: String,
}

/// Side information of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    pub metrics: Map<String, Value>,
    pub metrics_agg_mode: BTreeMap<String, MetricAggregation>,
    /// Human-readable feedback for the acting model.
    pub action_desc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_action_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_params: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward_from_server: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

impl StepInfo {
    pub(crate) fn new(metrics: Map<String, Value>, action_desc: String) -> Self {
        Self {
            metrics,
            metrics_agg_mode: default_metrics_agg_mode(),
            action_desc,
            raw_action_text: None,
            tool_name: None,
            tool_params: None,
            reward_from_server: None,
            error_details: None,
        }
    }

    pub fn metric_bool(&self, key: &str) -> Option<bool> {
        self.metrics.get(key).and_then(Value::as_bool)
    }

    pub fn metric_f64(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).and_then(Value::as_f64)
    }
}

/// Result of one step. `terminated` and `truncated` are never both set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub observation: String,
    pub reward: f64,
    pub terminated: bool,
    pub truncated: bool,
    pub info: StepInfo,
}

impl StepOutcome {
    pub fn is_done(&self) -> bool {
        self.terminated || self.truncated
    }
}
