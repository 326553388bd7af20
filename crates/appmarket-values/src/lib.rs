//! Appmarket Values
//!
//! This crate contains the configuration tree handling for appmarket. Chart
//! configuration ("values") is arbitrary, chart-defined nested data, so it is
//! kept as a [`serde_json::Value`] tree rather than a fixed schema.
//!
//! A deployment resolves its final values from three layers, lowest
//! precedence first:
//!
//! 1. chart defaults (shipped by the chart author)
//! 2. admin defaults (policy attached to a chart version)
//! 3. user values (supplied with the deployment request)
//!
//! [`merge`] combines the layers, [`validate_required`] checks that the user
//! layer carries every key the policy requires.

mod error;
mod merge;
mod path;
mod validate;

pub use error::{MergeError, ValidationError};
pub use merge::{MAX_DEPTH, merge, merge_into, pin_paths};
pub use path::{get_path, set_path, split_path};
pub use validate::{missing_paths, validate_required};

/// One configuration layer: a string-keyed tree.
pub type Values = serde_json::Map<String, serde_json::Value>;
