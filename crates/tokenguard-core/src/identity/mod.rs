//! Caller identification.
//!
//! Credentials map to identities through an immutable [`CredentialMap`]
//! snapshot; reloading the users file builds a new snapshot and swaps it in.

mod credentials;
mod resolver;


pub use credentials::{CredentialMap, UserRecord, UsersFile};
pub use resolver::{IdentityResolver, IdentitySource, ReloadSummary, ResolvedIdentity};

use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;

static IDENTITY_REGEX: OnceLock<Regex> = OnceLock::new();

#[allow(clippy::expect_used, reason = "pattern is a compile-time constant")]
fn identity_regex() -> &'static Regex {
    IDENTITY_REGEX
        .get_or_init(|| Regex::new(r"^[가-힣A-Za-z0-9_.\-]{1,50}$").expect("Identity regex is valid"))
}

/// 1 to 50 characters of Hangul syllables, ASCII letters/digits, `_`, `-`, `.`.
pub fn validate_identity(identity: &str) -> bool {
    identity_regex().is_match(identity)
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("No users file configured")]
    NoUsersFile,
    #[error("Failed to read users file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse users file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid identity '{0}'")]
    InvalidIdentity(String),
    #[error("Invalid limits for '{identity}': {message}")]
    InvalidProfile { identity: String, message: String },
}
