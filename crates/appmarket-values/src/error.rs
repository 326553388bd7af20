use thiserror::Error;

/// Errors raised while merging configuration layers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
  /// The tree nests deeper than the merge engine is willing to descend.
  #[error("values nested deeper than {limit} levels at '{path}'")]
  TooDeep { path: String, limit: usize },
}

/// Errors raised by required-key validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
  /// One or more required paths are absent from the values.
  #[error("missing required keys: {}", missing.join(", "))]
  MissingKeys { missing: Vec<String> },
}
