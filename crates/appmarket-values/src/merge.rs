//! Three-layer deep merge.
//!
//! Later layers win key by key at every depth. Two objects under the same key
//! are merged recursively; any other pairing (object vs scalar, list vs list,
//! scalar vs scalar) is resolved by taking the higher-precedence value as is.
//! Lists are never concatenated.

use serde_json::Value;

use crate::Values;
use crate::error::MergeError;
use crate::path::{get_path, set_path};

/// Deepest object nesting the merge will descend into.
pub const MAX_DEPTH: usize = 128;

/// Merge chart defaults, admin defaults and user values into a new tree.
///
/// Precedence is `user_values > admin_defaults > chart_defaults`. An empty
/// layer passes the lower layers through untouched.
pub fn merge(
  chart_defaults: &Values,
  admin_defaults: &Values,
  user_values: &Values,
) -> Result<Values, MergeError> {
  let mut merged = Values::new();
  merge_into(&mut merged, chart_defaults)?;
  merge_into(&mut merged, admin_defaults)?;
  merge_into(&mut merged, user_values)?;
  Ok(merged)
}

/// Deep-merge `overlay` onto `base`, with `overlay` taking precedence.
pub fn merge_into(base: &mut Values, overlay: &Values) -> Result<(), MergeError> {
  merge_level(base, overlay, &mut Vec::new())
}

fn merge_level<'a>(
  base: &mut Values,
  overlay: &'a Values,
  path: &mut Vec<&'a str>,
) -> Result<(), MergeError> {
  if path.len() >= MAX_DEPTH {
    return Err(MergeError::TooDeep {
      path: path.join("."),
      limit: MAX_DEPTH,
    });
  }

  for (key, value) in overlay {
    if let (Some(Value::Object(existing)), Value::Object(incoming)) = (base.get_mut(key), value) {
      path.push(key);
      merge_level(existing, incoming, path)?;
      path.pop();
    } else {
      base.insert(key.clone(), value.clone());
    }
  }

  Ok(())
}

/// Force the admin value for each listed path onto `merged`.
///
/// Paths the admin layer does not define are left alone, so a fixed key
/// without an admin default behaves like any other key.
pub fn pin_paths(merged: &mut Values, admin_defaults: &Values, fixed_paths: &[String]) {
  for path in fixed_paths {
    if let Some(value) = get_path(admin_defaults, path) {
      set_path(merged, path, value.clone());
    }
  }
}
