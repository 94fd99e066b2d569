use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "multiuploader")]
#[command(about = "Upload files to file-hosting providers", version)]
pub struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Also register simulated providers
    #[arg(long, global = true)]
    pub mock_providers: bool,

    /// Log to stderr as well (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload a file
    Upload(UploadArgs),
    /// List providers and their configuration state
    Providers,
    /// Store an API key or enable/disable a provider
    Configure(ConfigureArgs),
    /// Print the log directory
    Logs,
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    pub file: PathBuf,

    /// Provider name as shown by `providers`
    #[arg(short, long)]
    pub provider: String,
}

#[derive(Args, Debug)]
pub struct ConfigureArgs {
    pub provider: String,

    #[arg(long)]
    pub api_key: Option<String>,

    #[arg(long, conflicts_with = "disable")]
    pub enable: bool,

    #[arg(long)]
    pub disable: bool,
}

impl Cli {
    /// Filter for the stderr log layer, if enabled.
    pub fn stderr_level(&self) -> Option<String> {
        match self.verbose {
            0 => None,
            1 => Some("info".into()),
            _ => Some("debug".into()),
        }
    }
}
