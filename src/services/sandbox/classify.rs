// Failure classification
// The sandbox CLI reports failures as free text, so classification is
// pattern-matching over combined stdout+stderr. The match order is part of
// the contract: failure text can contain overlapping keywords (a missing
// container often also prints "not logged in"), so the categories are kept
// in one ordered table rather than scattered conditionals.

use once_cell::sync::Lazy;
use regex::Regex;

/// Sandbox/daemon absence or non-running state
pub const UNAVAILABLE_PATTERNS: &[&str] = &[
    "no such container",
    "is not running",
    "cannot connect to the docker daemon",
    "sandbox not found",
    "docker daemon is not running",
    "does not exist",
];

/// Missing or expired credentials
pub const AUTH_FAILURE_PATTERNS: &[&str] = &[
    "not logged in",
    "unauthenticated",
    "authentication required",
    "oauth token has expired",
    "token has expired",
];

/// A `--resume` attempt the agent could not honor
pub const RESUME_FAILURE_PATTERNS: &[&str] = &[
    "invalid session",
    "session not found",
    "could not resume",
    "no conversation found",
];

/// Failure category of a non-zero agent exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Unavailable,
    AuthFailed,
    /// Only produced for attempts that supplied a resume session id
    ResumeFailed,
    Unknown,
}

/// Category precedence. Unavailability outranks auth, which outranks resume.
const CLASSIFICATION_ORDER: &[(FailureKind, &[&str])] = &[
    (FailureKind::Unavailable, UNAVAILABLE_PATTERNS),
    (FailureKind::AuthFailed, AUTH_FAILURE_PATTERNS),
    (FailureKind::ResumeFailed, RESUME_FAILURE_PATTERNS),
];

/// Classification outcome plus the pattern that decided it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: FailureKind,
    pub matched: Option<&'static str>,
}

/// Lowercased stderr+stdout, the shape the pattern lists expect
pub fn combine_output(stderr: &str, stdout: &str) -> String {
    format!("{} {}", stderr, stdout).to_lowercase()
}

/// Classify combined (lowercased) output from a failed invocation.
///
/// `was_resume` gates the resume category: a fresh attempt can never fail
/// to resume, whatever its output happens to contain.
pub fn classify_failure(combined: &str, was_resume: bool) -> Classification {
    for (kind, patterns) in CLASSIFICATION_ORDER {
        if *kind == FailureKind::ResumeFailed && !was_resume {
            continue;
        }
        for &pattern in *patterns {
            if combined.contains(pattern) {
                return Classification {
                    kind: *kind,
                    matched: Some(pattern),
                };
            }
        }
    }
    Classification {
        kind: FailureKind::Unknown,
        matched: None,
    }
}

#[allow(clippy::unwrap_used)]
static API_KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)api[_-]?key").unwrap());

#[allow(clippy::unwrap_used)]
static FIRST_PARTY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^first[_-]?party$").unwrap());

/// Check if auth credentials indicate API-key fallback rather than
/// first-party OAuth. Either signal disqualifies the sandbox.
pub fn is_api_key_auth(auth_method: Option<&str>, api_provider: Option<&str>) -> bool {
    if let Some(method) = auth_method {
        if API_KEY_RE.is_match(method) {
            return true;
        }
    }
    if let Some(provider) = api_provider {
        if !FIRST_PARTY_RE.is_match(provider) {
            return true;
        }
    }
    false
}
