// bidpay CLI - payment-to-bid reconciliation against a JSON ledger

mod exit_codes;
mod ledger;
mod recon;
mod util;

use std::process::ExitCode;

use clap::Parser;

use bidpay_recon::ReconError;
use exit_codes::{exit_code_for, EXIT_ERROR, EXIT_IO, EXIT_PARSE, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "bidpay")]
#[command(about = "Match incoming payments to bids awaiting payment")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: recon::Commands,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::init_from_env(env_logger::Env::default().default_filter_or(level));

    match recon::cmd_recon(cli.command) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self { code: EXIT_PARSE, message: msg.into(), hint: None }
    }

    pub fn eval(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    /// Engine error with its registered exit code and, where one helps, a hint.
    pub fn recon(err: ReconError) -> Self {
        let hint = match &err {
            ReconError::MatchConflict { entity: "payment", .. } => {
                Some("the payment is already matched; dispute it first to re-match".to_string())
            }
            ReconError::MatchConflict { entity: "bid", .. } | ReconError::StaleState { .. } => {
                Some("the bid is no longer awaiting payment; see `bidpay reopen`".to_string())
            }
            ReconError::ConfigValidation(_) => Some("check with `bidpay validate <config>`".to_string()),
            _ => None,
        };
        Self { code: exit_code_for(&err), message: err.to_string(), hint }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
