use std::path::PathBuf;

use clap::builder::PossibleValue;
use clap::{Args, Parser, Subcommand};

const HELP_TEXT: &str = "Suggestions and bug reports are greatly appreciated:
https://github.com/proxy-harvester/proxy-harvester/issues";

#[derive(Parser, Debug, Clone)]
#[command(after_help = HELP_TEXT)]
pub struct Cli {
    /// Path to the TOML config file (defaults used for any missing section)
    #[arg(long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Logging level, overrides LOG_LEVEL from config
    #[arg(long = "log", value_parser([
        PossibleValue::new("debug"),
        PossibleValue::new("info"),
        PossibleValue::new("warn"),
        PossibleValue::new("error"),
    ]))]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub sub: Commands,
}

#[derive(Subcommand, Debug, Clone)]
#[command(after_help = HELP_TEXT)]
pub enum Commands {
    /// Run the coordinator, scheduler, and API server until shutdown
    Serve(ServeArgs),

    /// Run one coordinator tick against the selected sources and exit
    Harvest(HarvestArgs),

    /// Validate a list of ip:port entries directly, bypassing the store
    Validate(ValidateArgs),
}

#[derive(Args, Debug, Clone)]
#[command(after_help = HELP_TEXT)]
pub struct ServeArgs {
    /// Bind address for the REST API
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub bind: String,
}

#[derive(Args, Debug, Clone)]
#[command(after_help = HELP_TEXT)]
pub struct HarvestArgs {
    /// Source names to run; defaults to every enabled source
    #[arg(long, num_args(1..))]
    pub sources: Vec<String>,

    /// Present results as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
#[command(after_help = HELP_TEXT)]
pub struct ValidateArgs {
    /// File of ip:port entries, one per line; reads stdin if omitted
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Subtest depth to run
    #[arg(long, default_value = "standard", value_parser([
        PossibleValue::new("basic"),
        PossibleValue::new("standard"),
        PossibleValue::new("comprehensive"),
    ]))]
    pub level: String,

    /// Present results as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}
