//! CLI Exit Code Registry
//!
//! Single source of truth for every exit code. Exit codes are part of the
//! shell contract: cron jobs and wrappers branch on them.
//!
//! | Code | Meaning                                                    |
//! |------|------------------------------------------------------------|
//! | 0    | Success                                                    |
//! | 1    | General error (unspecified)                                |
//! | 2    | CLI usage error (bad args, missing subsidiary)             |
//! | 3    | Export bundle could not be read or parsed                  |
//! | 4    | Data integrity error (unknown reference, malformed record) |
//! | 5    | Invalid import configuration                               |
//! | 6    | Storage error                                              |
//! | 7    | Import completed, some records failed (`--keep-going`)     |

use crmsync_recon::ImportError;

// ============================================================================
// Success / general
// ============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure. Prefer a specific code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

// ============================================================================
// Import run
// ============================================================================

/// Bundle root missing, unreadable file, invalid XML, unknown record element.
pub const EXIT_LOAD: u8 = 3;

/// A record references an unknown firm, contact or lead, or lacks a required field.
pub const EXIT_INTEGRITY: u8 = 4;

/// Import config could not be parsed or failed validation.
pub const EXIT_CONFIG: u8 = 5;

/// The database could not be opened, read or written.
pub const EXIT_STORAGE: u8 = 6;

/// Every subject ran, but at least one record failed and was reported.
pub const EXIT_PARTIAL: u8 = 7;

/// Map an engine error to its exit code.
pub fn import_exit_code(err: &ImportError) -> u8 {
    match err {
        ImportError::Load(_) => EXIT_LOAD,
        ImportError::ReferentialIntegrity { .. } | ImportError::MalformedRecord { .. } => {
            EXIT_INTEGRITY
        }
        ImportError::ConfigParse(_) | ImportError::ConfigValidation(_) => EXIT_CONFIG,
        ImportError::Store(_) => EXIT_STORAGE,
    }
}
