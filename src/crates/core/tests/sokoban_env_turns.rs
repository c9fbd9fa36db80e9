use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mcpgym_core::{
    EnvConfig, EnvError, EnvResult, MetricAggregation, SokobanMcpEnv, StepOutcome, TextEnv,
    ToolCall, ToolResponse, ToolSession,
};
use serde_json::json;

#[derive(Default)]
struct Script {
    calls: Vec<ToolCall>,
    responses: VecDeque<EnvResult<ToolResponse>>,
    connect_failures: usize,
    connects: usize,
    disconnects: usize,
}

#[derive(Clone, Default)]
struct StubSession {
    script: Arc<Mutex<Script>>,
    connected: bool,
}

impl StubSession {
    fn respond(&self, payload: serde_json::Value) {
        self.script
            .lock()
            .unwrap()
            .responses
            .push_back(Ok(ToolResponse::from_text(payload.to_string())));
    }

    fn fail_next(&self, error: EnvError) {
        self.script.lock().unwrap().responses.push_back(Err(error));
    }

    fn calls(&self) -> Vec<ToolCall> {
        self.script.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl ToolSession for StubSession {
    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> EnvResult<()> {
        let mut script = self.script.lock().unwrap();
        if script.connect_failures > 0 {
            script.connect_failures -= 1;
            return Err(EnvError::connection("connection refused"));
        }
        script.connects += 1;
        self.connected = true;
        Ok(())
    }

    async fn invoke(&mut self, call: &ToolCall) -> EnvResult<ToolResponse> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(call.clone());
        script
            .responses
            .pop_front()
            .unwrap_or_else(|| Err(EnvError::invocation("no scripted response")))
    }

    async fn disconnect(&mut self) -> EnvResult<()> {
        if self.connected {
            self.script.lock().unwrap().disconnects += 1;
        }
        self.connected = false;
        Ok(())
    }
}

fn env_with_stub() -> (SokobanMcpEnv<StubSession>, StubSession) {
    let stub = StubSession::default();
    let env = SokobanMcpEnv::with_session(EnvConfig::new("http://stub/mcp"), stub.clone())
        .expect("env builds");
    (env, stub)
}

fn reset_payload() -> serde_json::Value {
    json!({"Observation": "P_ __\n_X #", "Reward": 0, "Game End": false, "info": {"success": false}})
}

fn assert_agg_hints(outcome: &StepOutcome) {
    let agg = &outcome.info.metrics_agg_mode;
    assert_eq!(agg.len(), 4);
    assert_eq!(agg["action_is_effective"], MetricAggregation::Mean);
    assert_eq!(agg["action_is_valid"], MetricAggregation::Mean);
    assert_eq!(agg["success"], MetricAggregation::Last);
    assert_eq!(agg["format_penalty"], MetricAggregation::Mean);
}

#[test]
fn reset_then_effective_move() {
    let (mut env, stub) = env_with_stub();
    stub.respond(reset_payload());
    stub.respond(json!({
        "Observation": "_P __\n_X #",
        "Reward": 1.0,
        "Game End": false,
        "info": {"success": false, "action_is_effective": true}
    }));

    let (obs, info) = env.reset(None).expect("reset");
    assert_eq!(obs, "P_ __\n_X #");
    assert!(info.env_instruction.contains("Your available actions are:\nUp, Down, Left, Right"));

    let outcome = env.step("<answer>Up</answer>");
    assert_eq!(outcome.observation, "_P __\n_X #");
    assert_eq!(outcome.reward, 1.0);
    assert!(!outcome.terminated);
    assert!(!outcome.truncated);
    assert!(outcome.info.action_desc.contains("moved Up, which was effective"));
    assert_eq!(outcome.info.tool_name.as_deref(), Some("play"));
    assert_eq!(outcome.info.raw_action_text.as_deref(), Some("<answer>Up</answer>"));
    assert_eq!(outcome.info.metric_f64("format_penalty"), Some(0.0));
    assert_agg_hints(&outcome);

    let calls = stub.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].name, "play");
    assert_eq!(json!(calls[1].params), json!({"action": 1}));
    assert_eq!(env.last_observation(), Some("_P __\n_X #"));
    assert_eq!(env.num_env_steps(), 1);
}

#[test]
fn ineffective_move_is_reported() {
    let (mut env, stub) = env_with_stub();
    stub.respond(reset_payload());
    stub.respond(json!({"Observation": "P_ __\n_X #", "info": {"action_is_effective": false}}));

    env.reset(None).unwrap();
    let outcome = env.step("<answer>left</answer>");
    assert_eq!(
        outcome.info.action_desc,
        "At turn 1, you tried to move Left, which was not effective."
    );
}

#[test]
fn reset_sends_seed_only_when_given() {
    let (mut env, stub) = env_with_stub();
    stub.respond(reset_payload());
    stub.respond(reset_payload());

    env.reset(Some(7)).unwrap();
    env.reset(None).unwrap();

    let calls = stub.calls();
    assert_eq!(calls[0].name, "reset");
    assert_eq!(json!(calls[0].params), json!({"seed": 7}));
    assert!(calls[1].params.is_empty());
}

#[test]
fn negative_seed_is_forwarded_verbatim() {
    let (mut env, stub) = env_with_stub();
    stub.respond(reset_payload());

    env.reset(Some(-3)).unwrap();
    assert_eq!(json!(stub.calls()[0].params), json!({"seed": -3}));
}

#[test]
fn reset_after_close_reports_the_bridge() {
    let (mut env, stub) = env_with_stub();
    stub.respond(reset_payload());
    env.reset(None).unwrap();
    env.close();

    let err = env.reset(None).unwrap_err();
    let message = err.to_string();
    assert!(message.starts_with("Failed to reset the environment: Async bridge error"));
    assert!(!message.contains("network"));
    match err {
        EnvError::ResetFailed(source) => assert!(matches!(*source, EnvError::Bridge(_))),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn invalid_action_costs_format_penalty_without_network() {
    let (mut env, stub) = env_with_stub();
    stub.respond(reset_payload());
    let (obs, _) = env.reset(None).unwrap();

    let outcome = env.step("I think I should go up");
    assert_eq!(outcome.observation, obs);
    assert_eq!(outcome.reward, -0.1);
    assert!(!outcome.terminated);
    assert!(!outcome.truncated);
    assert_eq!(outcome.info.metric_bool("action_is_valid"), Some(false));
    assert_eq!(outcome.info.metric_bool("action_is_effective"), Some(false));
    assert_eq!(outcome.info.metric_f64("format_penalty"), Some(-0.1));
    assert_eq!(outcome.info.action_desc, "At turn 1, you provided an invalid action.");
    assert_agg_hints(&outcome);

    let unknown = env.step("<answer>Jump</answer>");
    assert_eq!(unknown.reward, -0.1);
    assert_eq!(unknown.info.action_desc, "At turn 2, you provided an invalid action.");

    assert_eq!(stub.calls().len(), 1, "only the reset reached the server");
}

#[test]
fn transport_fault_truncates_and_keeps_observation() {
    let (mut env, stub) = env_with_stub();
    stub.respond(reset_payload());
    stub.fail_next(EnvError::invocation("connection reset by peer"));

    let (obs, _) = env.reset(None).unwrap();
    let outcome = env.step("<answer>Down</answer>");

    assert_eq!(outcome.observation, obs);
    assert_eq!(outcome.reward, 0.0);
    assert!(!outcome.terminated);
    assert!(outcome.truncated);
    assert_eq!(outcome.info.action_desc, "System Error");
    assert!(outcome
        .info
        .error_details
        .as_deref()
        .unwrap_or_default()
        .contains("connection reset by peer"));
    assert_eq!(outcome.info.metric_f64("format_penalty"), Some(0.0));
    assert_agg_hints(&outcome);
    assert_eq!(env.last_observation(), Some(obs.as_str()));
}

#[test]
fn malformed_payload_during_step_truncates() {
    let (mut env, stub) = env_with_stub();
    stub.respond(reset_payload());
    stub.script
        .lock()
        .unwrap()
        .responses
        .push_back(Ok(ToolResponse::from_text("<html>502</html>")));

    env.reset(None).unwrap();
    let outcome = env.step("<answer>Right</answer>");
    assert!(outcome.truncated);
    assert!(outcome
        .info
        .error_details
        .as_deref()
        .unwrap_or_default()
        .contains("<html>502</html>"));
}

#[test]
fn successful_game_end_terminates() {
    let (mut env, stub) = env_with_stub();
    stub.respond(reset_payload());
    stub.respond(json!({"Observation": "done", "Reward": 10.0, "Game End": true, "info": {"success": true}}));

    env.reset(None).unwrap();
    let outcome = env.step("<answer>Right</answer>");
    assert!(outcome.terminated);
    assert!(!outcome.truncated);
    assert_eq!(outcome.info.reward_from_server, Some(10.0));
}

#[test]
fn reset_failure_is_fatal_but_not_sticky() {
    let (mut env, stub) = env_with_stub();
    stub.script.lock().unwrap().connect_failures = 1;
    stub.respond(reset_payload());

    let err = env.reset(None).unwrap_err();
    assert!(matches!(err, EnvError::ResetFailed(_)));
    assert!(!env.is_connected());
    assert!(stub.calls().is_empty());

    let (obs, _) = env.reset(None).expect("second reset reconnects");
    assert_eq!(obs, "P_ __\n_X #");
    assert!(env.is_connected());
}

#[test]
fn empty_envelope_fails_reset() {
    let (mut env, stub) = env_with_stub();
    stub.script
        .lock()
        .unwrap()
        .responses
        .push_back(Ok(ToolResponse::default()));

    match env.reset(None) {
        Err(EnvError::ResetFailed(source)) => assert!(matches!(*source, EnvError::EmptyResponse)),
        other => panic!("unexpected reset result: {other:?}"),
    }
}

#[test]
fn close_is_idempotent() {
    let (mut env, stub) = env_with_stub();
    stub.respond(reset_payload());
    env.reset(None).unwrap();
    assert!(env.is_connected());

    env.close();
    assert!(!env.is_connected());
    env.close();
    assert!(!env.is_connected());

    let script = stub.script.lock().unwrap();
    assert_eq!(script.connects, 1);
    assert_eq!(script.disconnects, 1);
}

#[test]
fn close_without_connecting_touches_nothing() {
    let (mut env, stub) = env_with_stub();
    env.close();
    env.close();
    assert_eq!(stub.script.lock().unwrap().disconnects, 0);
}

#[test]
fn render_supports_text_only() {
    let (mut env, stub) = env_with_stub();
    assert_eq!(
        env.render("text").unwrap(),
        "The environment has not been reset yet."
    );

    stub.respond(reset_payload());
    env.reset(None).unwrap();
    assert_eq!(env.render("text").unwrap(), "P_ __\n_X #");
    assert!(matches!(
        env.render("rgb_array"),
        Err(EnvError::UnsupportedMode(mode)) if mode == "rgb_array"
    ));
}

#[test]
fn random_actions_are_valid_and_seeded() {
    let (mut first, first_stub) = env_with_stub();
    let (mut second, second_stub) = env_with_stub();
    first_stub.respond(reset_payload());
    second_stub.respond(reset_payload());
    first.reset(Some(3)).unwrap();
    second.reset(Some(3)).unwrap();

    for _ in 0..8 {
        let action = first.sample_random_action();
        assert_eq!(action, second.sample_random_action());
        assert!(first.parse_action(&action).action.is_some());
    }
}
