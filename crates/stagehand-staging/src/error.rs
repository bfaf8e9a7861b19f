//! Staging error taxonomy.

use thiserror::Error;

use crate::completion::payload::DecodeError;
use stagehand_db::DbError;

#[derive(Debug, Error)]
pub enum StagingError {
    /// A staging precondition failed before dispatch.
    #[error("staging validation failed: {0}")]
    Validation(#[from] ValidationFailure),

    /// A completion callback failed schema validation. The failure has
    /// already been recorded on the droplet when this is returned; the
    /// direct invoker observes it as well.
    #[error("malformed staging response: {0}")]
    MalformedResponse(DecodeError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Core(#[from] stagehand_core::Error),
}

/// Precondition failures raised by `Stagers::validate`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationFailure {
    #[error("docker staging is disabled")]
    DockerDisabled,

    #[error("invalid package: {0}")]
    InvalidPackage(String),

    #[error("custom buildpacks are disabled")]
    CustomBuildpacksDisabled,

    #[error("no buildpacks are registered")]
    NoBuildpacksFound,
}
