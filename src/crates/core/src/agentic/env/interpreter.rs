//! Turns raw tool envelopes into turn outcomes.
//!
//! Wire payload: `{"Observation": str, "Reward": num, "Game End": bool,
//! "info": {"success": bool, ...}}`, every field optional.

use crate::agentic::env::types::{METRIC_FORMAT_PENALTY, METRIC_SUCCESS};
use crate::service::mcp::protocol::ToolResponse;
use crate::util::errors::{EnvError, EnvResult};
use log::{debug, warn};
use serde::Deserialize;
use serde_json::{Map, Value};

pub const MISSING_OBSERVATION: &str = "Error: No observation found.";

#[derive(Debug, Deserialize)]
struct ToolPayload {
    #[serde(rename = "Observation", default)]
    observation: Option<String>,
    #[serde(rename = "Reward", default)]
    reward: Option<f64>,
    #[serde(rename = "Game End", default)]
    game_end: Option<bool>,
    #[serde(default)]
    info: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTurn {
    pub observation: String,
    pub terminated: bool,
    pub truncated: bool,
    /// Server metrics with `format_penalty` forced to 0.0.
    pub metrics: Map<String, Value>,
    pub reward_from_server: f64,
}

/// Maps the end-of-episode signal and success flag to (terminated, truncated).
pub fn episode_flags(game_end: bool, success: bool) -> (bool, bool) {
    (game_end && success, game_end && !success)
}

pub fn decode(response: &ToolResponse) -> EnvResult<DecodedTurn> {
    if response.is_error {
        warn!("Tool server flagged its result as an error");
    }
    let text = response.first_text().ok_or(EnvError::EmptyResponse)?;
    debug!("Parsing tool response text: {}", text);

    let payload: ToolPayload = serde_json::from_str(text).map_err(|e| EnvError::malformed(text, e))?;

    let mut metrics = payload.info.unwrap_or_default();
    metrics.insert(METRIC_FORMAT_PENALTY.to_string(), Value::from(0.0));
    let success = metrics
        .get(METRIC_SUCCESS)
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let (terminated, truncated) = episode_flags(payload.game_end.unwrap_or(false), success);

    Ok(DecodedTurn {
        observation: payload
            .observation
            .unwrap_or_else(|| MISSING_OBSERVATION.to_string()),
        terminated,
        truncated,
        metrics,
        reward_from_server: payload.reward.unwrap_or(0.0),
    })
}

#[cfg(test)]
mod tests {
    use super::{decode, episode_flags, MISSING_OBSERVATION};
    use crate::service::mcp::protocol::{ToolContent, ToolResponse};
    use crate::util::errors::EnvError;
    use serde_json::json;

    fn envelope(payload: serde_json::Value) -> ToolResponse {
        ToolResponse::from_text(payload.to_string())
    }

    #[test]
    fn end_with_success_terminates() {
        let turn = decode(&envelope(json!({
            "Observation": "done",
            "Reward": 10.0,
            "Game End": true,
            "info": {"success": true}
        })))
        .unwrap();
        assert!(turn.terminated);
        assert!(!turn.truncated);
        assert_eq!(turn.reward_from_server, 10.0);
    }

    #[test]
    fn end_without_success_truncates() {
        let turn = decode(&envelope(json!({"Game End": true, "info": {"success": false}}))).unwrap();
        assert!(!turn.terminated);
        assert!(turn.truncated);
    }

    #[test]
    fn success_without_end_sets_neither_flag() {
        for success in [true, false] {
            assert_eq!(episode_flags(false, success), (false, false));
        }
        let turn = decode(&envelope(json!({"Game End": false, "info": {"success": true}}))).unwrap();
        assert!(!turn.terminated && !turn.truncated);
    }

    #[test]
    fn absent_fields_take_defaults() {
        let turn = decode(&envelope(json!({}))).unwrap();
        assert_eq!(turn.observation, MISSING_OBSERVATION);
        assert_eq!(turn.reward_from_server, 0.0);
        assert!(!turn.terminated && !turn.truncated);
        assert_eq!(turn.metrics.len(), 1);
        assert_eq!(turn.metrics["format_penalty"], json!(0.0));
    }

    #[test]
    fn server_format_penalty_is_overridden() {
        let turn = decode(&envelope(json!({
            "info": {"format_penalty": -3.0, "action_is_effective": true}
        })))
        .unwrap();
        assert_eq!(turn.metrics["format_penalty"], json!(0.0));
        assert_eq!(turn.metrics["action_is_effective"], json!(true));
    }

    #[test]
    fn first_text_part_is_used() {
        let response = ToolResponse {
            content: vec![
                ToolContent::Image {
                    mime_type: "image/png".to_string(),
                },
                ToolContent::text(r#"{"Observation": "first"}"#),
                ToolContent::text(r#"{"Observation": "second"}"#),
            ],
            is_error: false,
        };
        assert_eq!(decode(&response).unwrap().observation, "first");
    }

    #[test]
    fn missing_text_is_empty_response() {
        let response = ToolResponse {
            content: vec![ToolContent::Image {
                mime_type: "image/png".to_string(),
            }],
            is_error: false,
        };
        assert!(matches!(decode(&response), Err(EnvError::EmptyResponse)));
        assert!(matches!(
            decode(&ToolResponse::default()),
            Err(EnvError::EmptyResponse)
        ));
    }

    #[test]
    fn invalid_json_keeps_original_text() {
        let err = decode(&ToolResponse::from_text("not json")).unwrap_err();
        match err {
            EnvError::MalformedResponse { text, .. } => assert_eq!(text, "not json"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn wrongly_typed_fields_are_malformed() {
        assert!(matches!(
            decode(&envelope(json!("Observation"))),
            Err(EnvError::MalformedResponse { .. })
        ));
        assert!(matches!(
            decode(&envelope(json!({"Reward": "high"}))),
            Err(EnvError::MalformedResponse { .. })
        ));
    }
}
