use std::path::PathBuf;

use clap::{Parser, Subcommand};
use orchestrator_engine::DEFAULT_CONFIG_FILENAME;

use crate::logging::DEFAULT_LOG_FILE;

#[derive(Parser, Debug)]
#[command(name = "orchestrator", version)]
#[command(about = "Dispatches AI analytics requests and follows streamed analyses")]
pub struct Cli {
    /// RON settings file; missing means defaults
    #[arg(long, default_value = DEFAULT_CONFIG_FILENAME)]
    pub config: PathBuf,
    /// Overrides `base_url` from the settings file
    #[arg(long)]
    pub base_url: Option<String>,
    /// Also log to a file (./orchestrator.log when no path is given)
    #[arg(long, num_args = 0..=1, default_missing_value = DEFAULT_LOG_FILE)]
    pub log_file: Option<PathBuf>,
    #[arg(short, long)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check whether the AI service is reachable
    Health,
    /// Run one or more analyses concurrently
    Run {
        /// business, performance, revenue, occupancy, trends, recommendations
        #[arg(required = true)]
        types: Vec<String>,
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Directory for the exported JSON reports
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Run the component analyses and merge them into one report
    Comprehensive {
        /// Defaults to every component type
        types: Vec<String>,
        #[arg(long)]
        timeout_ms: Option<u64>,
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Follow a streamed analysis until it completes
    Stream {
        /// overall, daily-trends, monthly-performance, revenue-patterns
        kind: String,
        /// Extra query parameter as key=value; repeatable
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in `{raw}`"));
    }
    Ok((key.trim().to_string(), value.to_string()))
}
