//! Retry/fallback policy.
//!
//! Pure decision logic: given the job so far and the classification of its
//! latest attempt, say what happens next. The driver in `orchestrator`
//! carries the decision out.

use std::time::Duration;

use crate::classifier::Classification;
use crate::router::ProviderChain;
use crate::state_machine::{Job, Origin};

/// Next step for a job after one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Try the same provider again after `delay`.
    RetrySame { delay: Duration },
    /// Move on to the provider at `position` in the chain.
    Advance { position: usize, provider: String },
    Succeed(Origin),
    /// No provider left to try.
    FailTerminal,
}

pub struct PolicyEngine;

impl PolicyEngine {
    /// Decides the next step after an attempt on `chain[position]`.
    ///
    /// `job` must already hold the attempt being decided on, so the number
    /// of tries against the current provider includes it.
    pub fn decide(
        job: &Job,
        classification: Classification,
        chain: &ProviderChain,
        position: usize,
        retry_after: Option<Duration>,
    ) -> Decision {
        let Some(current) = chain.get(position) else {
            return Decision::FailTerminal;
        };

        match classification {
            Classification::Success => Decision::Succeed(if position == 0 {
                Origin::Primary
            } else {
                Origin::Fallback
            }),
            Classification::RateLimited | Classification::Transient => {
                let tries = job.attempts_for(&current.id);
                if tries <= current.max_retries {
                    let backoff = current.backoff_for(tries);
                    let delay = retry_after
                        .map_or(backoff, |hint| backoff.max(hint))
                        .min(current.backoff_cap);
                    Decision::RetrySame { delay }
                } else {
                    Self::advance(chain, position)
                }
            }
            Classification::Permanent => Self::advance(chain, position),
        }
    }

    fn advance(chain: &ProviderChain, position: usize) -> Decision {
        match chain.get(position + 1) {
            Some(next) => Decision::Advance {
                position: position + 1,
                provider: next.id.clone(),
            },
            None => Decision::FailTerminal,
        }
    }
}
