//! Typed decoding of completion callback payloads.
//!
//! Both the success and failure branches use the same explicit decode
//! step; a mismatch yields a `DecodeError` carrying the path of the
//! offending field.

use serde_json::Value;
use std::collections::HashMap;

/// A schema violation in a callback payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    /// Dotted path of the field that failed, e.g. `result.process_types`.
    pub path: String,
    pub reason: String,
}

impl DecodeError {
    fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

impl std::error::Error for DecodeError {}

/// A well-formed failure callback: `{error: {id, message}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPayload {
    pub id: String,
    pub message: String,
}

/// A well-formed success callback's `result`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingResult {
    pub lifecycle_type: String,
    pub lifecycle_metadata: LifecycleMetadata,
    pub execution_metadata: String,
    pub process_types: HashMap<String, String>,
}

/// Lifecycle-specific completion metadata. The buildpack fields default
/// to empty strings when the stager detected nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleMetadata {
    pub buildpack_key: String,
    pub detected_buildpack: String,
    pub docker_image: Option<String>,
}

/// Decode a failure callback.
pub fn decode_failure(payload: &Value) -> Result<ErrorPayload, DecodeError> {
    let error = required_object(payload, "error", "error")?;
    Ok(ErrorPayload {
        id: required_string(error, "id", "error.id")?,
        message: required_string(error, "message", "error.message")?,
    })
}

/// Decode a success callback. Absent or null `result.process_types` is
/// normalized to an empty mapping before validation.
pub fn decode_success(payload: &Value) -> Result<StagingResult, DecodeError> {
    let result = required_object(payload, "result", "result")?;

    let lifecycle_type = required_string(result, "lifecycle_type", "result.lifecycle_type")?;

    let metadata_value = result
        .get("lifecycle_metadata")
        .ok_or_else(|| DecodeError::new("result.lifecycle_metadata", "missing key"))?;
    let metadata_object = metadata_value
        .as_object()
        .ok_or_else(|| DecodeError::new("result.lifecycle_metadata", "expected an object"))?;
    let lifecycle_metadata = LifecycleMetadata {
        buildpack_key: optional_string(
            metadata_object,
            "buildpack_key",
            "result.lifecycle_metadata.buildpack_key",
        )?
        .unwrap_or_default(),
        detected_buildpack: optional_string(
            metadata_object,
            "detected_buildpack",
            "result.lifecycle_metadata.detected_buildpack",
        )?
        .unwrap_or_default(),
        docker_image: optional_string(
            metadata_object,
            "docker_image",
            "result.lifecycle_metadata.docker_image",
        )?,
    };

    let execution_metadata =
        required_string(result, "execution_metadata", "result.execution_metadata")?;

    let process_types = match result.get("process_types") {
        None | Some(Value::Null) => HashMap::new(),
        Some(Value::Object(map)) => {
            let mut process_types = HashMap::with_capacity(map.len());
            for (process_type, command) in map {
                let command = command.as_str().ok_or_else(|| {
                    DecodeError::new(
                        format!("result.process_types.{process_type}"),
                        "expected a string",
                    )
                })?;
                process_types.insert(process_type.clone(), command.to_string());
            }
            process_types
        }
        Some(_) => {
            return Err(DecodeError::new("result.process_types", "expected a mapping"));
        }
    };

    Ok(StagingResult {
        lifecycle_type,
        lifecycle_metadata,
        execution_metadata,
        process_types,
    })
}

fn required_object<'a>(
    value: &'a Value,
    key: &str,
    path: &str,
) -> Result<&'a serde_json::Map<String, Value>, DecodeError> {
    value
        .get(key)
        .ok_or_else(|| DecodeError::new(path, "missing key"))?
        .as_object()
        .ok_or_else(|| DecodeError::new(path, "expected an object"))
}

fn required_string(
    object: &serde_json::Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<String, DecodeError> {
    object
        .get(key)
        .ok_or_else(|| DecodeError::new(path, "missing key"))?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| DecodeError::new(path, "expected a string"))
}

fn optional_string(
    object: &serde_json::Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<Option<String>, DecodeError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(DecodeError::new(path, "expected a string")),
    }
}
