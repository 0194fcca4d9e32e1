//! HTTP middleware.
//!
//! `pipeline` runs the security stages ahead of routing; `envelope`
//! gives bare error statuses from inner layers the generic JSON body.

pub mod envelope;
pub mod pipeline;

pub use envelope::generic_error_bodies;
pub use pipeline::{security_pipeline, PipelineError, Rejection, SecurityPipeline, Stage, StageOutcome};
