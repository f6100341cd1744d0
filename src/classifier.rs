//! Normalizes provider outcomes into the four classes the retry policy acts on.
//!
//! Providers speak different error vocabularies; this module is the only place
//! that knows about status codes and error bodies.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::provider::{FailureDescriptor, ProviderOutput, RawOutcome};

/// Normalized outcome of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    Success,
    RateLimited,
    /// Network, timeout or server-side failure.
    Transient,
    /// Bad request, auth or validation failure.
    Permanent,
}

impl Classification {
    /// Whether the same provider may be tried again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Classification::RateLimited | Classification::Transient)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Success => write!(f, "success"),
            Classification::RateLimited => write!(f, "rate limited"),
            Classification::Transient => write!(f, "transient failure"),
            Classification::Permanent => write!(f, "permanent failure"),
        }
    }
}

const RATE_LIMIT_MARKERS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "ratelimit",
    "too many requests",
    "quota",
    "throttl",
];

const PERMANENT_STATUSES: &[u16] = &[
    400, 401, 402, 403, 404, 405, 406, 409, 410, 411, 413, 414, 415, 422,
];

pub fn classify(outcome: &RawOutcome) -> Classification {
    match outcome {
        RawOutcome::Success(output) => classify_output(output),
        RawOutcome::Failure(failure) => classify_failure(failure),
    }
}

/// A success is only a success if it carries something usable.
fn classify_output(output: &ProviderOutput) -> Classification {
    let usable = match output {
        ProviderOutput::Text(text) => !text.trim().is_empty(),
        ProviderOutput::Media(artifact) => !artifact.location.trim().is_empty(),
        ProviderOutput::Accepted { token } => !token.trim().is_empty(),
    };
    if usable {
        Classification::Success
    } else {
        Classification::Transient
    }
}

pub fn classify_failure(failure: &FailureDescriptor) -> Classification {
    if failure.status == Some(429) || mentions_rate_limit(&failure.body) {
        return Classification::RateLimited;
    }

    match failure.status {
        None | Some(408) | Some(425) | Some(500..=599) => Classification::Transient,
        Some(status) if PERMANENT_STATUSES.contains(&status) => Classification::Permanent,
        // Unknown vocabulary: keep retrying, bounded by max_retries.
        Some(_) => Classification::Transient,
    }
}

fn mentions_rate_limit(body: &str) -> bool {
    let lower = body.to_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m))
}
