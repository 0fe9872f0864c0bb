//! CLI commands for the options desk.

pub mod cadence;
pub mod run;
pub mod validate;

use anyhow::Result;
use clap::Args;
use optdesk_core::{AppConfig, ConfigLoader};

pub use cadence::{run_cadence, CadenceArgs};
pub use run::{run_orchestrator, RunArgs};
pub use validate::{run_validate, ValidateArgs};

/// Where to read configuration from.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Config file path
    #[arg(short, long, default_value = "config/Config.toml")]
    pub config: String,

    /// Profile overlay, read from `Config.<profile>.toml` next to the config file
    #[arg(short, long, env = "OPTDESK_PROFILE")]
    pub profile: Option<String>,
}

impl ConfigArgs {
    /// Loads the file, the optional profile overlay, then `OPTDESK_*` env vars.
    ///
    /// # Errors
    /// Returns an error if the configuration cannot be parsed or is invalid.
    pub fn load(&self) -> Result<AppConfig> {
        match &self.profile {
            Some(profile) => ConfigLoader::load_with_profile(&self.config, profile),
            None => ConfigLoader::load_from(&self.config),
        }
    }
}
