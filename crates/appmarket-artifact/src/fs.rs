use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::ResolveError;

/// Filesystem store for uploaded chart packages.
///
/// Each package is stored at `{root}/{chart_id}/{version}.tgz`; the returned
/// path is what goes into a chart version's `local_path`.
#[derive(Debug, Clone)]
pub struct FsPackageStore {
  root: PathBuf,
}

impl FsPackageStore {
  /// Create a new package store rooted at `root`.
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  /// Where the package for `chart_id@version` lives.
  ///
  /// Both parts must be single path components, so the result is always
  /// inside the store root.
  pub fn package_path(&self, chart_id: &str, version: &str) -> Result<PathBuf, ResolveError> {
    check_component("chart id", chart_id)?;
    check_component("version", version)?;
    Ok(self.root.join(chart_id).join(format!("{version}.tgz")))
  }

  /// Copy a package file from disk into the store, replacing any existing
  /// one, and return its path.
  pub async fn import(
    &self,
    chart_id: &str,
    version: &str,
    source: &Path,
  ) -> Result<PathBuf, ResolveError> {
    let path = self.package_path(chart_id, version)?;
    let file = File::open(source).await?;
    write_stream(&path, ReaderStream::new(file)).await?;
    Ok(path)
  }
}

fn check_component(kind: &'static str, value: &str) -> Result<(), ResolveError> {
  let bad = value.is_empty()
    || value == "."
    || value == ".."
    || value.contains(['/', '\\', '\0']);
  if bad {
    return Err(ResolveError::InvalidName {
      kind,
      value: value.to_string(),
    });
  }
  Ok(())
}

async fn write_stream<S>(path: &Path, data: S) -> Result<(), ResolveError>
where
  S: Stream<Item = std::io::Result<Bytes>>,
{
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).await?;
  }

  let mut file = File::create(path).await?;
  let mut stream = std::pin::pin!(data);

  while let Some(chunk) = stream.next().await {
    file.write_all(&chunk?).await?;
  }

  file.flush().await?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_import_copies_file() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("upload.tgz");
    std::fs::write(&source, b"uploaded").unwrap();

    let store = FsPackageStore::new(dir.path().join("charts"));
    let path = store.import("redis", "7.0.1", &source).await.unwrap();

    assert_eq!(path, dir.path().join("charts").join("redis").join("7.0.1.tgz"));
    assert_eq!(std::fs::read(path).unwrap(), b"uploaded");
  }

  #[tokio::test]
  async fn test_import_replaces_existing_package() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.tgz");
    let second = dir.path().join("second.tgz");
    std::fs::write(&first, b"a much longer first upload").unwrap();
    std::fs::write(&second, b"second").unwrap();

    let store = FsPackageStore::new(dir.path().join("charts"));
    store.import("nginx", "1.0.0", &first).await.unwrap();
    let path = store.import("nginx", "1.0.0", &second).await.unwrap();

    assert_eq!(std::fs::read(path).unwrap(), b"second");
  }

  #[tokio::test]
  async fn test_import_missing_source() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsPackageStore::new(dir.path());

    let err = store
      .import("nginx", "1.0.0", &dir.path().join("nope.tgz"))
      .await
      .unwrap_err();
    assert!(matches!(err, ResolveError::Io(_)));
  }

  #[tokio::test]
  async fn test_names_cannot_leave_the_root() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("upload.tgz");
    std::fs::write(&source, b"uploaded").unwrap();
    let store = FsPackageStore::new(dir.path().join("charts"));

    for (chart, version) in [
      ("../../etc", "1.0.0"),
      ("..", "1.0.0"),
      ("nginx", "../../../x"),
      ("a/b", "1.0.0"),
      ("nginx", "1.0\\..\\x"),
      ("", "1.0.0"),
      ("nginx", ""),
    ] {
      let err = store.import(chart, version, &source).await.unwrap_err();
      assert!(matches!(err, ResolveError::InvalidName { .. }), "{chart}@{version}");
    }
    assert!(!dir.path().join("charts").exists());

    // Dots inside a component are fine.
    assert!(store.package_path("nginx", "1.0.0-rc.1").is_ok());
  }
}
