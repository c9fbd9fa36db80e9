//! Turn-based environments
//!
//! A synchronous reset/step facade over a remote MCP tool server. The caller
//! never sees asynchrony: every call blocks through [`AsyncBridge`] until the
//! underlying tool session resolves.

pub mod action;
pub mod bridge;
pub mod config;
pub mod interpreter;
pub mod sokoban;
pub mod types;

pub use action::{ActionParser, ParsedAction};
pub use bridge::AsyncBridge;
pub use config::EnvConfig;
pub use interpreter::DecodedTurn;
pub use sokoban::SokobanMcpEnv;
pub use types::*;

use crate::util::errors::EnvResult;

/// The reset/step contract consumed by training loops.
pub trait TextEnv {
    /// Starts a new episode. Fails when no episode state could be obtained.
    fn reset(&mut self, seed: Option<i64>) -> EnvResult<(String, ResetInfo)>;

    /// Plays one turn. Always yields a well-formed outcome once an episode is
    /// underway; faults are reported inside the outcome.
    fn step(&mut self, action: &str) -> StepOutcome;

    fn render(&self, mode: &str) -> EnvResult<String>;

    fn close(&mut self);

    /// A uniformly chosen action, formatted as the expected answer text.
    fn sample_random_action(&mut self) -> String;
}
