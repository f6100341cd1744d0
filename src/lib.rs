//! genrelay: multi-provider AI content generation with retry and fallback.
//!
//! A [`Dispatcher`] accepts text, video and audio generation requests,
//! drives each one through an ordered chain of interchangeable providers and
//! exposes the job's progress until an artifact reference is ready.

pub mod classifier;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod orchestrator;
pub mod policy;
pub mod provider;
pub mod request;
pub mod router;
pub mod state_machine;
pub mod tracker;
pub mod ui;

pub use classifier::{Classification, classify};
pub use config::GenrelayConfig;
pub use dispatcher::{DispatchSettings, Dispatcher, JobHandle, ProviderCheck, Submission};
pub use error::{GenrelayError, Result};
pub use request::{GenerationKind, GenerationRequest, OptimizeMode, Payload, Quality};
pub use state_machine::{GenerationResult, JobError, JobId, JobSnapshot, JobState, Origin, ResultArtifact};
pub use tracker::CancelOutcome;
