use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

/// Keeps a chat channel's event schedule in sync and announces donation milestones.
#[derive(Parser, Debug, Clone)]
#[command(name = "runroster", version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to the per-user config directory).
    #[arg(long, global = true, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the schedule, donation and ping loops until Ctrl-C.
    Run(EventArgs),
    /// Fetch the schedule once and print the rendered pages.
    Preview(EventArgs),
    /// Print the milestone ladder, target alerts and predictions in use.
    Thresholds,
    /// Check a claimed donation total against the live total.
    Claim(ClaimArgs),
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Clone, Args, Default)]
pub struct EventArgs {
    /// Event id or short code, overriding the configuration.
    #[arg(long, value_name = "EVENT")]
    pub event: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct ClaimArgs {
    /// Text starting with an amount, e.g. "$1.5M" or "250k".
    #[arg(required = true, num_args = 1.., value_name = "TEXT")]
    pub text: Vec<String>,

    /// Compare against this total instead of fetching it.
    #[arg(long, value_name = "AMOUNT")]
    pub total: Option<f64>,

    #[command(flatten)]
    pub event: EventArgs,
}

impl ClaimArgs {
    pub fn joined_text(&self) -> String {
        self.text.join(" ")
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigCommand {
    /// Write a default config.toml.
    Init {
        /// Overwrite an existing file.
        #[arg(long, action = ArgAction::SetTrue)]
        force: bool,
    },
    /// Print the effective configuration and any warnings.
    Show,
}
