//! Core types and error definitions for Kognia.
//!
//! This crate provides the domain types shared across all Kognia crates:
//! jobs and their lifecycle, sessions, messages, reports, the closed set of
//! specialist capabilities, and the error taxonomy.
//!
//! # Main types
//!
//! - [`KogniaError`]: Unified error enum for all Kognia subsystems.
//! - [`KogniaResult`]: Convenience alias for `Result<T, KogniaError>`.
//! - [`SpecialistError`]: Typed failure raised by a specialist invocation.
//! - [`Job`] / [`JobStatus`]: A unit of work and its lifecycle status.
//! - [`FailureReason`]: Structured, enumerable cause of a failed job.
//! - [`Message`] / [`Role`]: Append-only session messages.
//! - [`Capability`]: The closed set of specialist capabilities.
//! - [`SpecialistOutput`]: Output passed along execution plan edges.

/// Specialist capabilities and their outputs.
pub mod capability;
/// Error taxonomy.
pub mod error;
/// Jobs, sessions, reports and the job status state machine.
pub mod job;
/// Session messages.
pub mod message;

pub use capability::{Capability, SpecialistOutput};
pub use error::{KogniaError, KogniaResult, SpecialistError};
pub use job::{
    session_title, FailureKind, FailureReason, Job, JobStatus, JobView, Report, Session,
    SESSION_TITLE_CHARS,
};
pub use message::{Message, Role};
