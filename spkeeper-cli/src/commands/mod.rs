pub mod list;
pub mod sync;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use spkeeper_core::{config::PartialDbConfig, PartialConfig};

/// Database connection flags shared by every subcommand.
#[derive(Args, Debug)]
pub struct ConnectionArgs {
    /// YAML config file. Flags override values read from it.
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Database host [default: 127.0.0.1].
    #[arg(long, short = 'H')]
    pub host: Option<String>,

    /// Database port [default: 3306].
    #[arg(long, short = 'P')]
    pub port: Option<u16>,

    /// Database (schema) name.
    #[arg(long, short = 'd')]
    pub database: Option<String>,

    /// Database user [default: root].
    #[arg(long, short = 'u')]
    pub user: Option<String>,

    /// Database password.
    #[arg(long, short = 'p', env = "SPKEEPER_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

impl ConnectionArgs {
    /// Config file layer (or an empty one) with `flags` merged on top.
    pub fn layered(&self, flags: PartialConfig) -> Result<PartialConfig> {
        let base = match &self.config {
            Some(path) => PartialConfig::load(path)
                .with_context(|| format!("cannot load config file '{}'", path.display()))?,
            None => PartialConfig::default(),
        };
        Ok(base.merge(flags))
    }

    pub fn db_layer(&self) -> PartialDbConfig {
        PartialDbConfig {
            host: self.host.clone(),
            port: self.port,
            name: self.database.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
        }
    }
}
