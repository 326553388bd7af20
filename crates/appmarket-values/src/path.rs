//! Dotted path access into a values tree.
//!
//! A path such as `image.repository` addresses `values["image"]["repository"]`.

use serde_json::Value;

use crate::Values;

/// Split a dotted path into its key segments.
pub fn split_path(path: &str) -> impl Iterator<Item = &str> {
  path.split('.')
}

/// Look up the value at `path`.
///
/// Returns `None` if any segment is missing, or if an intermediate segment
/// holds something other than an object.
pub fn get_path<'a>(values: &'a Values, path: &str) -> Option<&'a Value> {
  let mut segments = split_path(path);
  let first = segments.next()?;
  let mut current = values.get(first)?;

  for segment in segments {
    current = current.as_object()?.get(segment)?;
  }

  Some(current)
}

/// Set the value at `path`, creating intermediate objects as needed.
///
/// An intermediate segment holding a non-object value is replaced by an
/// object.
pub fn set_path(values: &mut Values, path: &str, value: Value) {
  let segments: Vec<&str> = split_path(path).collect();
  let Some((last, parents)) = segments.split_last() else {
    return;
  };

  let mut current = values;
  for segment in parents {
    let entry = current
      .entry(segment.to_string())
      .or_insert_with(|| Value::Object(Values::new()));
    if !entry.is_object() {
      *entry = Value::Object(Values::new());
    }
    let Some(map) = entry.as_object_mut() else {
      return;
    };
    current = map;
  }

  current.insert(last.to_string(), value);
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn values(v: Value) -> Values {
    v.as_object().cloned().unwrap()
  }

  #[test]
  fn test_get_nested_path() {
    let v = values(json!({"image": {"repository": "nginx", "tag": "1.25"}}));
    assert_eq!(get_path(&v, "image.repository"), Some(&json!("nginx")));
    assert_eq!(get_path(&v, "image"), Some(&json!({"repository": "nginx", "tag": "1.25"})));
  }

  #[test]
  fn test_get_path_stops_at_scalar() {
    let v = values(json!({"image": "nginx:latest"}));
    assert_eq!(get_path(&v, "image.repository"), None);
  }

  #[test]
  fn test_get_path_null_leaf_is_present() {
    let v = values(json!({"service": {"port": null}}));
    assert_eq!(get_path(&v, "service.port"), Some(&Value::Null));
  }

  #[test]
  fn test_set_path_creates_parents() {
    let mut v = Values::new();
    set_path(&mut v, "ingress.tls.enabled", json!(true));
    assert_eq!(Value::Object(v), json!({"ingress": {"tls": {"enabled": true}}}));
  }

  #[test]
  fn test_set_path_replaces_scalar_parent() {
    let mut v = values(json!({"ingress": false}));
    set_path(&mut v, "ingress.enabled", json!(true));
    assert_eq!(Value::Object(v), json!({"ingress": {"enabled": true}}));
  }
}
