//! Sokoban over MCP.
//!
//! The puzzle lives on a remote tool server exposing `reset` and `play`.
//! This environment turns model text into `play` calls and server payloads
//! into step outcomes, blocking the caller for the duration of each call.

use crate::agentic::env::action::{ActionParser, ParsedAction};
use crate::agentic::env::bridge::AsyncBridge;
use crate::agentic::env::config::EnvConfig;
use crate::agentic::env::interpreter::{self, DecodedTurn};
use crate::agentic::env::types::{
    failed_turn_metrics, ResetInfo, StepInfo, StepOutcome, METRIC_ACTION_IS_EFFECTIVE,
};
use crate::agentic::env::TextEnv;
use crate::service::mcp::protocol::{ToolCall, ToolResponse};
use crate::service::mcp::server::{MCPConnection, ToolSession};
use crate::util::errors::{EnvError, EnvResult};
use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use rand::SeedableRng;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

pub const RESET_TOOL: &str = "reset";
pub const PLAY_TOOL: &str = "play";

const NOT_RESET_MESSAGE: &str = "The environment has not been reset yet.";

pub struct SokobanMcpEnv<S: ToolSession = MCPConnection> {
    config: EnvConfig,
    parser: ActionParser,
    session: Arc<Mutex<S>>,
    connected: Arc<AtomicBool>,
    bridge: AsyncBridge,
    num_env_steps: u32,
    last_obs: Option<String>,
    rng: StdRng,
}

impl SokobanMcpEnv<MCPConnection> {
    /// Environment backed by a Streamable HTTP connection to `config.server_url`.
    pub fn new(config: EnvConfig) -> EnvResult<Self> {
        let connection = MCPConnection::new_remote(
            config.server_url.clone(),
            &config.headers,
            config.request_timeout(),
        )
        .with_client_info(config.client_name.clone(), config.client_version.clone());
        Self::with_session(config, connection)
    }
}

impl<S: ToolSession> SokobanMcpEnv<S> {
    pub fn with_session(config: EnvConfig, session: S) -> EnvResult<Self> {
        config.validate()?;
        let parser = ActionParser::new(
            &config.action_pattern,
            &config.action_lookup,
            &config.special_token_list,
        )?;
        let bridge = AsyncBridge::new()?;

        Ok(Self {
            config,
            parser,
            session: Arc::new(Mutex::new(session)),
            connected: Arc::new(AtomicBool::new(false)),
            bridge,
            num_env_steps: 0,
            last_obs: None,
            rng: StdRng::from_entropy(),
        })
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn num_env_steps(&self) -> u32 {
        self.num_env_steps
    }

    pub fn last_observation(&self) -> Option<&str> {
        self.last_obs.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn instructions(&self) -> String {
        self.config.instructions()
    }

    pub fn action_names(&self) -> Vec<String> {
        self.config.action_names()
    }

    pub fn parse_action(&self, text: &str) -> ParsedAction {
        self.parser.parse(text)
    }

    /// Connects if needed, invokes the tool and decodes its payload.
    fn execute_and_decode(&self, call: ToolCall) -> EnvResult<DecodedTurn> {
        let session = Arc::clone(&self.session);
        let connected = Arc::clone(&self.connected);

        self.bridge.run(async move {
            let mut session = session.lock().await;
            let response: EnvResult<ToolResponse> = async {
                if !session.is_connected() {
                    session.connect().await?;
                }
                session.invoke(&call).await
            }
            .await;
            connected.store(session.is_connected(), Ordering::SeqCst);
            interpreter::decode(&response?)
        })?
    }

    fn current_observation(&self) -> String {
        self.last_obs.clone().unwrap_or_default()
    }
}

impl<S: ToolSession> TextEnv for SokobanMcpEnv<S> {
    fn reset(&mut self, seed: Option<i64>) -> EnvResult<(String, ResetInfo)> {
        info!("Resetting Sokoban environment with seed={:?}...", seed);
        if let Some(seed) = seed {
            self.rng = StdRng::seed_from_u64(seed as u64);
        }
        self.num_env_steps = 0;

        let mut call = ToolCall::new(RESET_TOOL);
        if let Some(seed) = seed {
            call = call.with_param("seed", seed);
        }

        let turn = self.execute_and_decode(call).map_err(|e| {
            error!("Failed to reset the environment: {}", e);
            EnvError::ResetFailed(Box::new(e))
        })?;

        self.last_obs = Some(turn.observation.clone());
        Ok((
            turn.observation,
            ResetInfo {
                env_instruction: self.instructions(),
            },
        ))
    }

    fn step(&mut self, action: &str) -> StepOutcome {
        self.num_env_steps += 1;
        let turn_no = self.num_env_steps;
        let parsed = self.parser.parse(action);

        let Some(action_id) = parsed.action else {
            let penalty = self.config.format_penalty;
            let mut info = StepInfo::new(
                failed_turn_metrics(penalty),
                format!("At turn {}, you provided an invalid action.", turn_no),
            );
            info.raw_action_text = Some(action.to_string());
            return StepOutcome {
                observation: self.current_observation(),
                reward: penalty,
                terminated: false,
                truncated: false,
                info,
            };
        };

        let call = ToolCall::new(PLAY_TOOL).with_param("action", action_id);
        let tool_params = call.params.clone();

        let turn = match self.execute_and_decode(call) {
            Ok(turn) => turn,
            Err(e) => {
                if e.is_remote_failure() {
                    error!("Server/Network Error on action '{}': {}", action, e);
                } else {
                    error!("Environment error on action '{}': {}", action, e);
                }
                let mut info = StepInfo::new(failed_turn_metrics(0.0), "System Error".to_string());
                info.raw_action_text = Some(action.to_string());
                info.error_details = Some(e.to_string());
                return StepOutcome {
                    observation: self.current_observation(),
                    reward: 0.0,
                    terminated: false,
                    truncated: true,
                    info,
                };
            }
        };

        self.last_obs = Some(turn.observation.clone());

        let effective = turn
            .metrics
            .get(METRIC_ACTION_IS_EFFECTIVE)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let action_desc = if effective {
            format!(
                "At turn {}, you moved {}, which was effective.",
                turn_no, parsed.action_content
            )
        } else {
            format!(
                "At turn {}, you tried to move {}, which was not effective.",
                turn_no, parsed.action_content
            )
        };

        let mut info = StepInfo::new(turn.metrics, action_desc);
        info.tool_name = Some(PLAY_TOOL.to_string());
        info.tool_params = Some(tool_params);
        info.raw_action_text = Some(action.to_string());
        info.reward_from_server = Some(turn.reward_from_server);

        StepOutcome {
            observation: turn.observation,
            reward: turn.reward_from_server,
            terminated: turn.terminated,
            truncated: turn.truncated,
            info,
        }
    }

    fn render(&self, mode: &str) -> EnvResult<String> {
        match mode {
            "text" => Ok(self
                .last_obs
                .clone()
                .unwrap_or_else(|| NOT_RESET_MESSAGE.to_string())),
            other => Err(EnvError::UnsupportedMode(other.to_string())),
        }
    }

    fn close(&mut self) {
        if self.connected.load(Ordering::SeqCst) {
            let session = Arc::clone(&self.session);
            match self
                .bridge
                .run(async move { session.lock().await.disconnect().await })
            {
                Ok(Ok(())) => info!("Closed connection to MCP server"),
                Ok(Err(e)) | Err(e) => warn!("Failed to disconnect from MCP server cleanly: {}", e),
            }
            self.connected.store(false, Ordering::SeqCst);
        }
        self.bridge.shutdown();
    }

    fn sample_random_action(&mut self) -> String {
        let name = self
            .config
            .action_lookup
            .values()
            .choose(&mut self.rng)
            .map(String::as_str)
            .unwrap_or_default();
        format!("<answer>{}</answer>", name)
    }
}
