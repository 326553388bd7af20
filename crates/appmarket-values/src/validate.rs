//! Required-key validation.
//!
//! Required keys are a contract on what the requester supplies explicitly, so
//! validation runs against the user layer alone, before any defaults are
//! merged in. Only presence is checked: a key holding `null`, `""` or `[]`
//! still counts as supplied.

use crate::Values;
use crate::error::ValidationError;
use crate::path::get_path;

/// Return every path in `required` that `values` does not contain, in the
/// order given.
pub fn missing_paths(values: &Values, required: &[String]) -> Vec<String> {
  required
    .iter()
    .filter(|path| get_path(values, path).is_none())
    .cloned()
    .collect()
}

/// Check that all `required` paths are present in `values`.
///
/// All misses are reported together rather than stopping at the first.
pub fn validate_required(values: &Values, required: &[String]) -> Result<(), ValidationError> {
  let missing = missing_paths(values, required);
  if missing.is_empty() {
    Ok(())
  } else {
    Err(ValidationError::MissingKeys { missing })
  }
}
