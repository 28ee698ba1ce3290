//! Script checksums
//!
//! The ledger stores the SHA-256 of each applied script so that edits to a
//! unit that already shipped can be noticed on the next boot.

use sha2::{Digest, Sha256};

/// Hex SHA-256 of a script
pub fn compute_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Outcome of comparing a recorded checksum with the script on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumCheck {
    Match,
    /// Entry written without a checksum (e.g. a repair marker)
    Unrecorded,
    Drifted { recorded: String, current: String },
}

pub fn verify(recorded: Option<&str>, current: &str) -> ChecksumCheck {
    match recorded {
        None => ChecksumCheck::Unrecorded,
        Some(r) if r == current => ChecksumCheck::Match,
        Some(r) => ChecksumCheck::Drifted {
            recorded: r.to_string(),
            current: current.to_string(),
        },
    }
}
