//! `bidpay` subcommands: batch auto-match, suggestions, and the operator
//! actions, all against a JSON ledger snapshot.

use std::path::{Path, PathBuf};

use clap::Subcommand;

use bidpay_recon::model::{AutoMatchRun, CommittedMatch, MatchCandidate, MatchField};
use bidpay_recon::ReconConfig;

use crate::exit_codes::EXIT_RECON_PARTIAL;
use crate::ledger::OpenLedger;
use crate::util::{format_cents, pad_right};
use crate::CliError;

#[derive(Subcommand)]
pub enum Commands {
    /// Auto-match every open payment in a ledger
    #[command(after_help = "\
Examples:
  bidpay run ledger.json
  bidpay run ledger.json --config recon.toml --json
  bidpay run ledger.json --output run.json
  bidpay run ledger.json --dry-run")]
    Run {
        /// Path to the ledger snapshot (JSON)
        ledger: PathBuf,

        /// Path to a .recon.toml config (defaults apply when omitted)
        #[arg(long, env = "BIDPAY_CONFIG")]
        config: Option<PathBuf>,

        /// Output JSON to stdout instead of human summary
        #[arg(long)]
        json: bool,

        /// Write JSON output to file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Score and decide, but leave the ledger file untouched
        #[arg(long)]
        dry_run: bool,
    },

    /// Show ranked bid candidates for one payment (read-only)
    #[command(after_help = "\
Examples:
  bidpay suggest ledger.json PAY-1001
  bidpay suggest ledger.json PAY-1001 --json")]
    Suggest {
        /// Path to the ledger snapshot (JSON)
        ledger: PathBuf,

        /// Payment id
        payment: String,

        /// Path to a .recon.toml config
        #[arg(long, env = "BIDPAY_CONFIG")]
        config: Option<PathBuf>,

        /// Output JSON to stdout instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Match a payment to a bid by operator decision
    #[command(after_help = "\
Examples:
  bidpay match ledger.json PAY-1001 BID-42 --operator alice
  bidpay match ledger.json PAY-1001 BID-42 --operator alice --notes 'confirmed by phone'")]
    Match {
        /// Path to the ledger snapshot (JSON)
        ledger: PathBuf,

        /// Payment id
        payment: String,

        /// Bid id
        bid: String,

        /// Operator id recorded in the audit trail
        #[arg(long, env = "BIDPAY_OPERATOR")]
        operator: String,

        /// Free-text notes, audited alongside the match
        #[arg(long)]
        notes: Option<String>,
    },

    /// Reverse a committed match; the payment becomes open again
    #[command(after_help = "\
Examples:
  bidpay dispute ledger.json PAY-1001 --operator alice --reason 'duplicate transfer'")]
    Dispute {
        /// Path to the ledger snapshot (JSON)
        ledger: PathBuf,

        /// Payment id
        payment: String,

        /// Operator id recorded in the audit trail
        #[arg(long, env = "BIDPAY_OPERATOR")]
        operator: String,

        /// Why the match is being reversed
        #[arg(long)]
        reason: String,
    },

    /// Return a bid from payment_received to awaiting_payment
    #[command(after_help = "\
Examples:
  bidpay reopen ledger.json BID-42 --operator alice --reason 'payment disputed'")]
    Reopen {
        /// Path to the ledger snapshot (JSON)
        ledger: PathBuf,

        /// Bid id
        bid: String,

        /// Operator id recorded in the audit trail
        #[arg(long, env = "BIDPAY_OPERATOR")]
        operator: String,

        /// Why the bid is being reopened
        #[arg(long)]
        reason: String,
    },

    /// Validate a recon config without running
    #[command(after_help = "\
Examples:
  bidpay validate recon.toml")]
    Validate {
        /// Path to the .recon.toml config file
        config: PathBuf,
    },
}

pub fn cmd_recon(cmd: Commands) -> Result<(), CliError> {
    match cmd {
        Commands::Run { ledger, config, json, output, dry_run } => {
            cmd_run(&ledger, config.as_deref(), json, output, dry_run)
        }
        Commands::Suggest { ledger, payment, config, json } => {
            cmd_suggest(&ledger, &payment, config.as_deref(), json)
        }
        Commands::Match { ledger, payment, bid, operator, notes } => {
            cmd_match(&ledger, &payment, &bid, &operator, notes.as_deref())
        }
        Commands::Dispute { ledger, payment, operator, reason } => {
            cmd_dispute(&ledger, &payment, &operator, &reason)
        }
        Commands::Reopen { ledger, bid, operator, reason } => cmd_reopen(&ledger, &bid, &operator, &reason),
        Commands::Validate { config } => cmd_validate(&config),
    }
}

fn load_config(path: Option<&Path>) -> Result<ReconConfig, CliError> {
    let Some(path) = path else {
        return Ok(ReconConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::io(format!("cannot read config {}: {e}", path.display())))?;
    ReconConfig::from_toml(&text).map_err(CliError::recon)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(value).map_err(|e| CliError::eval(format!("JSON serialization error: {e}")))
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

fn cmd_run(
    ledger_path: &Path,
    config_path: Option<&Path>,
    json_output: bool,
    output_file: Option<PathBuf>,
    dry_run: bool,
) -> Result<(), CliError> {
    if output_file.as_deref() == Some(ledger_path) {
        return Err(CliError::args("--output must not overwrite the ledger"));
    }

    let config = load_config(config_path)?;
    let ledger = OpenLedger::open(ledger_path)?;
    let engine = ledger.engine(config)?;

    let run = engine.run_automatic_matching().map_err(CliError::recon)?;

    if dry_run {
        eprintln!("dry run: ledger not written");
    } else if !run.committed.is_empty() {
        ledger.save(ledger_path)?;
    }

    let json_str = to_json(&run)?;
    if let Some(ref path) = output_file {
        std::fs::write(path, &json_str)
            .map_err(|e| CliError::io(format!("cannot write output: {e}")))?;
        eprintln!("wrote {}", path.display());
    }
    if json_output {
        println!("{json_str}");
    }

    print_run_summary(&run);

    if run.summary.failed > 0 {
        return Err(CliError {
            code: EXIT_RECON_PARTIAL,
            message: format!("{} payment(s) failed to commit", run.summary.failed),
            hint: Some("re-run to retry; conflicts resolve once the ledger is current".into()),
        });
    }
    Ok(())
}

fn print_run_summary(run: &AutoMatchRun) {
    let s = &run.summary;
    eprintln!(
        "auto-match '{}': {} open payment(s), {} eligible bid(s): {} committed, {} for review, {} without candidates, {} failed",
        run.meta.config_name,
        s.payments_considered,
        run.meta.eligible_bids,
        s.committed,
        s.needs_review,
        s.no_candidates,
        s.failed,
    );
    for c in &run.committed {
        eprintln!("  {} -> {} ({:.4})", c.payment_id, c.bid_id, c.score);
    }
    for f in &run.failures {
        match &f.bid_id {
            Some(bid) => eprintln!("  failed {} -> {}: {}", f.payment_id, bid, f.message),
            None => eprintln!("  failed {}: {}", f.payment_id, f.message),
        }
    }
}

// ---------------------------------------------------------------------------
// suggest
// ---------------------------------------------------------------------------

fn cmd_suggest(
    ledger_path: &Path,
    payment_id: &str,
    config_path: Option<&Path>,
    json_output: bool,
) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let ledger = OpenLedger::open(ledger_path)?;
    let engine = ledger.engine(config)?;
    let candidates = engine.find_matches(payment_id).map_err(CliError::recon)?;

    if json_output {
        println!("{}", to_json(&candidates)?);
        return Ok(());
    }

    if candidates.is_empty() {
        eprintln!("no candidates for payment '{payment_id}'");
        return Ok(());
    }

    let bids = ledger.snapshot().bids;
    println!(
        "{}  {}  {}  {}  {}",
        pad_right("BID", 16),
        pad_right("SCORE", 6),
        pad_right("TIER", 6),
        pad_right("EXPECTED", 14),
        "MATCHED"
    );
    for c in &candidates {
        let expected = bids
            .iter()
            .find(|b| b.id == c.bid_id)
            .map(|b| format!("{} {}", format_cents(b.expected_amount_cents), b.currency))
            .unwrap_or_default();
        println!(
            "{}  {:.4}  {}  {}  {}",
            pad_right(&c.bid_id, 16),
            c.score,
            pad_right(&c.confidence.to_string(), 6),
            pad_right(&expected, 14),
            matched_fields_label(c)
        );
    }
    Ok(())
}

fn matched_fields_label(candidate: &MatchCandidate) -> String {
    if candidate.matched_fields.is_empty() {
        return "-".into();
    }
    candidate
        .matched_fields
        .iter()
        .map(MatchField::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

// ---------------------------------------------------------------------------
// Operator actions
// ---------------------------------------------------------------------------

fn cmd_match(
    ledger_path: &Path,
    payment_id: &str,
    bid_id: &str,
    operator: &str,
    notes: Option<&str>,
) -> Result<(), CliError> {
    let ledger = OpenLedger::open(ledger_path)?;
    let engine = ledger.engine(ReconConfig::default())?;
    let done = engine
        .manual_match(payment_id, bid_id, operator, notes)
        .map_err(CliError::recon)?;
    ledger.save(ledger_path)?;
    print_committed(&done);
    Ok(())
}

fn print_committed(done: &CommittedMatch) {
    eprintln!(
        "{} {} to {} (score {:.4}, by {})",
        done.payment_id, done.status, done.bid_id, done.score, done.actor
    );
}

fn cmd_dispute(ledger_path: &Path, payment_id: &str, operator: &str, reason: &str) -> Result<(), CliError> {
    let ledger = OpenLedger::open(ledger_path)?;
    let engine = ledger.engine(ReconConfig::default())?;
    engine
        .dispute_match(payment_id, operator, reason)
        .map_err(CliError::recon)?;
    ledger.save(ledger_path)?;
    eprintln!("{payment_id} disputed; payment is open for matching again");
    Ok(())
}

fn cmd_reopen(ledger_path: &Path, bid_id: &str, operator: &str, reason: &str) -> Result<(), CliError> {
    let ledger = OpenLedger::open(ledger_path)?;
    let engine = ledger.engine(ReconConfig::default())?;
    engine
        .reopen_bid(bid_id, operator, reason)
        .map_err(CliError::recon)?;
    ledger.save(ledger_path)?;
    eprintln!("{bid_id} reopened; awaiting payment");
    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn cmd_validate(config_path: &Path) -> Result<(), CliError> {
    let config = load_config(Some(config_path))?;
    let w = &config.weights;
    eprintln!(
        "valid: recon '{}' (weights amount {:.2}, payer_name {:.2}, reference {:.2}, date {:.2}; auto-commit above {:.2})",
        config.name,
        w.amount,
        w.payer_name,
        w.reference,
        w.date,
        config.thresholds.auto_commit_above,
    );
    Ok(())
}
