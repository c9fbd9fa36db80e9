//! Subcommand implementations.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use mcpgym_core::{
    AsyncBridge, EnvConfig, EnvError, MCPConnection, SokobanMcpEnv, StepOutcome, TextEnv,
    ToolSession,
};
use tracing::{info, warn};

pub fn play(config: EnvConfig, seed: Option<i64>, episodes: u32, random: bool) -> Result<()> {
    let max_steps = config.max_steps;
    let mut env = SokobanMcpEnv::new(config).context("Failed to create environment")?;

    let stdin = io::stdin();
    let mut actions = stdin.lock().lines();
    let result = run_episodes(&mut env, seed, episodes, max_steps, |env| {
        if random {
            let action = env.sample_random_action();
            println!("action> {}", action);
            return Ok(Some(action));
        }
        print!("action> ");
        io::stdout().flush()?;
        actions.next().transpose().map_err(Into::into)
    });

    env.close();
    result
}

fn run_episodes<F>(
    env: &mut SokobanMcpEnv,
    seed: Option<i64>,
    episodes: u32,
    max_steps: u32,
    mut next_action: F,
) -> Result<()>
where
    F: FnMut(&mut SokobanMcpEnv) -> Result<Option<String>>,
{
    for episode in 0..episodes {
        let episode_seed = seed.map(|s| s.wrapping_add(i64::from(episode)));
        let (obs, reset_info) = env.reset(episode_seed)?;
        info!("Episode {} started (seed={:?})", episode + 1, episode_seed);
        if episode == 0 {
            println!("{}\n", reset_info.env_instruction);
        }
        println!("{}", obs);

        let mut total_reward = 0.0;
        let mut turns = 0;
        while turns < max_steps {
            let Some(action) = next_action(env)? else {
                warn!("Input closed, stopping");
                return Ok(());
            };
            turns += 1;

            let outcome = env.step(action.trim_end());
            total_reward += outcome.reward;
            print_turn(turns, &outcome);
            if outcome.is_done() {
                break;
            }
        }

        println!(
            "Episode {} finished after {} turns, total reward {:.2}\n",
            episode + 1,
            turns,
            total_reward
        );
    }
    Ok(())
}

fn print_turn(turn: u32, outcome: &StepOutcome) {
    println!(
        "[turn {}] reward={:.2} terminated={} truncated={}",
        turn, outcome.reward, outcome.terminated, outcome.truncated
    );
    println!("{}", outcome.info.action_desc);
    if let Some(details) = &outcome.info.error_details {
        println!("error: {}", details);
    }
    println!("{}", outcome.observation);
}

pub fn tools(config: &EnvConfig) -> Result<()> {
    let bridge = AsyncBridge::new()?;
    let mut connection = MCPConnection::new_remote(
        config.server_url.clone(),
        &config.headers,
        config.request_timeout(),
    )
    .with_client_info(config.client_name.clone(), config.client_version.clone());

    let (server_info, tools) = bridge.run(async move {
        connection.connect().await?;
        let summary = (connection.server_info().cloned(), connection.tools().to_vec());
        connection.disconnect().await?;
        Ok::<_, EnvError>(summary)
    })??;

    if let Some(server) = server_info {
        println!(
            "{} {} (protocol {}, tools: {})",
            server.server_info.name,
            server.server_info.version,
            server.protocol_version,
            server.supports_tools
        );
        if let Some(description) = server.server_info.description {
            println!("{}", description);
        }
    }

    for tool in tools {
        println!(
            "- {}: {}",
            tool.name,
            tool.description.as_deref().unwrap_or("")
        );
        println!("    input: {}", serde_json::to_string(&tool.input_schema)?);
    }
    Ok(())
}
