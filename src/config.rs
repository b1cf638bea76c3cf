use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;

/// Serve the exports of a dynamic library over a line-based TCP protocol.
#[derive(Debug, Parser)]
#[command(name = "dllbridge", version)]
pub struct Cli {
    /// Path to the library to load
    pub library: Option<PathBuf>,

    /// Port to listen on
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// JSON config file; command line values take precedence
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Settings read from a `--config` file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub library: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl FileConfig {
    pub fn from_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(Into::into)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_str(&s).with_context(|| format!("Invalid config {}", path.display()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub library: PathBuf,
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// Merges the command line over the config file over the defaults.
    pub fn resolve(cli: Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };

        let library = cli
            .library
            .or(file.library)
            .ok_or_else(|| anyhow!("No library given on the command line or in the config"))?;

        Ok(ServerConfig {
            library,
            host: cli.host.or(file.host).unwrap_or_else(|| DEFAULT_HOST.into()),
            port: cli.port.or(file.port).unwrap_or(DEFAULT_PORT),
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
