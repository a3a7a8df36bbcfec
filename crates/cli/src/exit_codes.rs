//! CLI Exit Code Registry
//!
//! Single source of truth for `bidpay` exit codes. Scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain     | Description                               |
//! |---------|------------|-------------------------------------------|
//! | 0       | Universal  | Success                                   |
//! | 1       | Universal  | General error (unspecified)               |
//! | 2       | Universal  | CLI usage error (bad args)                |
//! | 3-9     | Ledger     | Ledger file read/write and parse errors   |
//! | 30-39   | Recon      | Engine outcomes                           |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into `exit_code_for` or the command's error handling

use bidpay_recon::ReconError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Ledger (3-9)
// =============================================================================

/// Cannot read or write the ledger, config, or output file.
pub const EXIT_IO: u8 = 3;

/// Ledger file is not valid JSON or has the wrong shape.
pub const EXIT_PARSE: u8 = 4;

// =============================================================================
// Recon (30-39)
// =============================================================================

/// Config failed to parse or validate.
pub const EXIT_RECON_INVALID_CONFIG: u8 = 30;

/// Payment or bid changed state under us, or is no longer eligible.
pub const EXIT_RECON_CONFLICT: u8 = 31;

/// Unknown payment/bid id or a record rejected at the engine boundary.
pub const EXIT_RECON_VALIDATION: u8 = 32;

/// Audit sink or another collaborator failed; nothing was committed.
pub const EXIT_RECON_AUDIT: u8 = 33;

/// `run` finished but one or more payments failed to commit.
/// Successful commits are still saved.
pub const EXIT_RECON_PARTIAL: u8 = 34;

/// Map an engine error to its exit code.
pub fn exit_code_for(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_RECON_INVALID_CONFIG,
        ReconError::MatchConflict { .. } | ReconError::StaleState { .. } => EXIT_RECON_CONFLICT,
        ReconError::UnknownPayment(_) | ReconError::UnknownBid(_) | ReconError::InvalidInput(_) => {
            EXIT_RECON_VALIDATION
        }
        ReconError::AuditWriteFailure(_) | ReconError::Store(_) => EXIT_RECON_AUDIT,
    }
}
