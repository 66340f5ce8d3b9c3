#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;

use clap::Parser;
use eyre::{Context, Result};

use crate::config::{self, Configuration, load_configuration, lookup_config_path};

#[derive(Debug, Parser)]
#[command(
    version,
    about,
    long_about = r#"A line-oriented client for a streaming multi-model chat server

Default configuration file location looks up in the following order:
    * $XDG_CONFIG_HOME/chatstream/config.toml
    * $HOME/.config/chatstream/config.toml
    * $HOME/.chatstream.toml
"#,
    disable_version_flag = true
)]
pub struct Command {
    /// Configuration file path
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Show the version
    #[arg(short, long)]
    version: bool,

    /// Open an existing conversation
    #[arg(long, value_name = "ID")]
    conversation: Option<String>,

    /// Model configuration used for sends, overrides `general.default_config_id`
    #[arg(long, value_name = "ID")]
    config_id: Option<String>,

    /// Chat server base URL, overrides `server.endpoint`
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,

    /// Print startup progress to stderr
    #[arg(long)]
    verbose: bool,
}

impl Command {
    pub fn new() -> Command {
        Self::parse()
    }

    pub fn get_config(&self) -> Result<Configuration> {
        let config_path = self
            .config
            .clone()
            .unwrap_or_else(|| lookup_config_path().unwrap_or_default());

        let config = if config_path.is_empty() {
            Configuration::default()
        } else {
            load_configuration(config_path.as_str()).wrap_err("loading configuration")?
        };
        Ok(self.apply_overrides(config))
    }

    /// Flags win over the file.
    pub fn apply_overrides(&self, mut config: Configuration) -> Configuration {
        if let Some(endpoint) = &self.endpoint {
            config.server.endpoint = endpoint.clone();
        }
        if self.verbose {
            config.general.verbose = true;
        }
        config
    }

    pub fn version(&self) -> bool {
        self.version
    }

    pub fn conversation(&self) -> Option<&str> {
        self.conversation.as_deref()
    }

    pub fn config_id<'a>(&'a self, config: &'a Configuration) -> Option<&'a str> {
        self.config_id
            .as_deref()
            .or(config.general.default_config_id.as_deref())
    }

    pub fn print_version(&self) {
        println!("{}", config::version())
    }
}
