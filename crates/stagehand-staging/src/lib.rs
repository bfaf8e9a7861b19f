//! Staging orchestration for stagehand.
//!
//! This crate owns the staging flow end to end:
//! - `Stagers` validates staging preconditions and selects the execution
//!   backend for a package
//! - the lifecycle protocols assemble backend-specific build payloads
//! - the `Messenger` dispatches stage requests and process-control
//!   messages over the asynchronous channels
//! - the `StagingCompletionHandler` processes completion callbacks and
//!   applies droplet state transitions
//! - the `CompletionWorker` drains the inbound completion channel

pub mod blobstore;
pub mod completion;
pub mod details;
pub mod error;
pub mod lifecycle;
pub mod messenger;
pub mod queue;
pub mod runner;
pub mod stagers;
pub mod worker;

pub use completion::StagingCompletionHandler;
pub use details::StagingDetails;
pub use error::{StagingError, ValidationFailure};
pub use messenger::Messenger;
pub use stagers::{Stager, Stagers, StagingBackend};
pub use worker::CompletionWorker;
