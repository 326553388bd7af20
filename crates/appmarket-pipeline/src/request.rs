use appmarket_values::Values;
use serde::{Deserialize, Serialize};

/// What a user asked to deploy. Stored as the payload of a deploy task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRequest {
  pub user_id: String,
  pub chart_id: String,
  pub version: String,
  pub release_name: String,
  pub namespace: String,
  #[serde(default)]
  pub user_values: Values,
  /// Pin the policy's fixed keys to the admin defaults.
  #[serde(default, alias = "is_quick_mode")]
  pub quick_mode: bool,
}

impl DeploymentRequest {
  pub fn new(
    user_id: impl Into<String>,
    chart_id: impl Into<String>,
    version: impl Into<String>,
    release_name: impl Into<String>,
    namespace: impl Into<String>,
  ) -> Self {
    Self {
      user_id: user_id.into(),
      chart_id: chart_id.into(),
      version: version.into(),
      release_name: release_name.into(),
      namespace: namespace.into(),
      user_values: Values::new(),
      quick_mode: false,
    }
  }

  pub fn with_values(mut self, values: Values) -> Self {
    self.user_values = values;
    self
  }

  pub fn quick(mut self) -> Self {
    self.quick_mode = true;
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_payload_defaults() {
    let request: DeploymentRequest = serde_json::from_value(json!({
      "user_id": "alice",
      "chart_id": "nginx",
      "version": "1.0.0",
      "release_name": "my-nginx",
      "namespace": "default",
    }))
    .unwrap();

    assert!(request.user_values.is_empty());
    assert!(!request.quick_mode);
  }

  #[test]
  fn test_quick_mode_alias() {
    let request: DeploymentRequest = serde_json::from_value(json!({
      "user_id": "alice",
      "chart_id": "nginx",
      "version": "1.0.0",
      "release_name": "my-nginx",
      "namespace": "default",
      "user_values": {"replicaCount": 3},
      "is_quick_mode": true,
    }))
    .unwrap();

    assert!(request.quick_mode);
    assert_eq!(request.user_values["replicaCount"], json!(3));
  }
}
