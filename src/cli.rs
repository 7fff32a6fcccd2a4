use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::EngineConfig;
use crate::error::ConfigError;

#[derive(Parser, Debug)]
#[command(name = "council-watch")]
#[command(version)]
#[command(about = "Follow a streamed council debate simulation in the terminal")]
pub struct Args {
    /// Simulation id to attach to
    pub simulation_id: String,

    /// Base WebSocket endpoint (overrides config file and environment)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// TOML config file with `endpoint` / `pacing_interval_ms`
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Milliseconds between token releases; 0 shows tokens as they arrive
    #[arg(long)]
    pub pacing_ms: Option<u64>,

    /// Write the Markdown transcript here when the session ends
    #[arg(long)]
    pub markdown: Option<PathBuf>,

    /// City name for the Markdown header
    #[arg(long)]
    pub city: Option<String>,

    /// Print each turn only once it is finalized (no live token echo)
    #[arg(long, short)]
    pub quiet: bool,

    /// Disable ANSI colors
    #[arg(long)]
    pub no_color: bool,
}

impl Args {
    /// Defaults, then `--config`, then environment, then flags.
    pub fn resolve_config(&self) -> Result<EngineConfig, ConfigError> {
        let base = match &self.config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };
        self.apply_flags(base.with_env()?)
    }

    /// Layer the command-line flags over an already resolved config.
    pub fn apply_flags(&self, mut config: EngineConfig) -> Result<EngineConfig, ConfigError> {
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(ms) = self.pacing_ms {
            config.pacing_interval = Duration::from_millis(ms);
        }
        config.validate()?;
        Ok(config)
    }
}
