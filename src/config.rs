//! Command line and environment configuration.
//!
//! Every option can come from a flag or from the environment; `.env` is read
//! by the binary before parsing. The relay refuses to start without a
//! provider credential.

use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use thiserror::Error;

use crate::conversation::DEFAULT_RELAY_ENDPOINT;
use crate::llm::{ApiKey, DEFAULT_ENDPOINT, DEFAULT_MODEL};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("OPENAI_API_KEY is not set (or is blank); refusing to start the relay without a provider credential")]
    MissingCredential,
}

#[derive(Debug, Parser)]
#[command(name = "relaychat", version, about = "Chat with an LLM through a credential-holding relay")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the relay (`POST /api/chat`)
    Serve(ServeArgs),
    /// Chat from the terminal through a running relay
    Chat(ChatArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Provider credential
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Interface to listen on
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 3001)]
    pub port: u16,

    /// Chat-completion endpoint of the provider
    #[arg(long, env = "OPENAI_URL", default_value = DEFAULT_ENDPOINT, value_name = "URL")]
    pub upstream_url: String,

    /// Model name sent with every completion request
    #[arg(long, env = "OPENAI_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Origin allowed to call the relay from a browser; repeatable, `*` for any
    #[arg(long = "allow-origin", value_name = "ORIGIN", default_value = "*")]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ChatArgs {
    /// Relay endpoint
    #[arg(long, env = "RELAY_URL", default_value = DEFAULT_RELAY_ENDPOINT, value_name = "URL")]
    pub endpoint: String,

    /// Pause before each relay call while "typing..." is shown
    #[arg(long, default_value_t = 1200, value_name = "MS")]
    pub typing_delay_ms: u64,

    /// Skip loading the sample prior history
    #[arg(long)]
    pub no_history: bool,
}

impl ChatArgs {
    pub fn typing_delay(&self) -> Duration {
        Duration::from_millis(self.typing_delay_ms)
    }
}

/// Validated relay settings.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub api_key: ApiKey,
    pub host: String,
    pub port: u16,
    pub upstream_url: String,
    pub model: String,
    pub allowed_origins: Vec<String>,
}

impl RelayConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl TryFrom<ServeArgs> for RelayConfig {
    type Error = ConfigError;

    fn try_from(args: ServeArgs) -> Result<Self, Self::Error> {
        let api_key = args
            .api_key
            .map(|k| ApiKey::new(k.trim()))
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingCredential)?;

        Ok(Self {
            api_key,
            host: args.host,
            port: args.port,
            upstream_url: args.upstream_url,
            model: args.model,
            allowed_origins: args.allowed_origins,
        })
    }
}
