//! KDL configuration parsing for stagehand.
//!
//! Parses the system configuration file (`stagehand.kdl`): staging
//! resource limits, feature flags and the blobstore endpoint.

pub mod error;
pub mod staging;

pub use error::{ConfigError, ConfigResult};
pub use staging::{
    BlobstoreConfig, FeatureFlags, StagingConfig, StagingLimits, load_staging_config,
    parse_staging_config,
};
