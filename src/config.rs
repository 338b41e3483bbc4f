use clap::Parser;
use serde::Deserialize;

use handle_errors::Error;

/// Q&A polling service with an admin moderation queue
#[derive(Parser, Debug, Default, PartialEq)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Settings file, looked up with any supported extension
    #[clap(short, long, default_value = "setup")]
    pub config: String,
    /// Overrides `log_level` from the settings
    #[clap(short, long)]
    pub log_level: Option<String>,
    /// Overrides `port` from the settings
    #[clap(short, long)]
    pub port: Option<u16>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub log_level: String,
    pub port: u16,
    pub database_url: String,
    pub max_connections: u32,
    pub secret_key: String,
    pub admin_password: String,
    pub upload_dir: String,
    pub recent_days: i64,
    pub session_hours: i64,
    pub max_upload_bytes: u64,
}

impl Config {
    pub fn new() -> Result<Config, Error> {
        dotenv::dotenv().ok();
        Config::load(&Args::parse())
    }

    /// Defaults, then the settings file, then `POLL_*` variables, then flags.
    pub fn load(args: &Args) -> Result<Config, Error> {
        let settings = config::Config::builder()
            .set_default("log_level", "warn")
            .and_then(|b| b.set_default("port", 3030))
            .and_then(|b| b.set_default("database_url", "postgres://localhost:5432/pollboard"))
            .and_then(|b| b.set_default("max_connections", 5))
            .and_then(|b| b.set_default("upload_dir", "static/images"))
            .and_then(|b| b.set_default("recent_days", 14))
            .and_then(|b| b.set_default("session_hours", 24))
            .and_then(|b| b.set_default("max_upload_bytes", 10 * 1024 * 1024))
            .map_err(Error::ConfigError)?
            .add_source(config::File::with_name(&args.config).required(false))
            .add_source(config::Environment::with_prefix("POLL").try_parsing(true))
            .build()
            .map_err(Error::ConfigError)?;

        let mut config = settings
            .try_deserialize::<Config>()
            .map_err(Error::ConfigError)?;

        if let Some(log_level) = &args.log_level {
            config.log_level = log_level.clone();
        }
        if let Some(port) = args.port {
            config.port = port;
        }

        Ok(config)
    }
}
