//! Resolver tests against a throwaway HTTP responder.

use appmarket_artifact::{ArtifactResolver, HttpResolver, ResolveError};
use appmarket_store::ChartVersionRecord;
use sqlx::types::Json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve a single canned response and return the URL to request.
async fn serve_once(status: &'static str, body: &'static [u8]) -> String {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();

  tokio::spawn(async move {
    let (mut socket, _) = listener.accept().await.unwrap();

    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
      let n = socket.read(&mut buf).await.unwrap();
      if n == 0 {
        break;
      }
      request.extend_from_slice(&buf[..n]);
    }

    let head = format!(
      "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
      body.len()
    );
    socket.write_all(head.as_bytes()).await.unwrap();
    socket.write_all(body).await.unwrap();
    socket.shutdown().await.unwrap();
  });

  format!("http://{addr}/charts/nginx-1.0.0.tgz")
}

fn remote_record(url: String) -> ChartVersionRecord {
  let mut record = ChartVersionRecord::new("nginx", "1.0.0");
  record.urls = Json(vec![url]);
  record
}

fn entries(dir: &std::path::Path) -> usize {
  std::fs::read_dir(dir).unwrap().count()
}

#[tokio::test]
async fn test_download_is_removed_on_drop() {
  let dir = tempfile::tempdir().unwrap();
  let resolver = HttpResolver::with_temp_dir(dir.path());
  let url = serve_once("200 OK", b"fake chart package").await;

  let artifact = resolver.resolve(&remote_record(url)).await.unwrap();
  assert!(artifact.is_temporary());
  assert!(artifact.path().starts_with(dir.path()));
  assert_eq!(std::fs::read(artifact.path()).unwrap(), b"fake chart package");

  let path = artifact.path().to_path_buf();
  drop(artifact);
  assert!(!path.exists());
  assert_eq!(entries(dir.path()), 0);
}

#[tokio::test]
async fn test_explicit_cleanup_removes_download() {
  let dir = tempfile::tempdir().unwrap();
  let resolver = HttpResolver::with_temp_dir(dir.path());
  let url = serve_once("200 OK", b"package").await;

  let artifact = resolver.resolve(&remote_record(url)).await.unwrap();
  let path = artifact.path().to_path_buf();
  artifact.cleanup().unwrap();
  assert!(!path.exists());
}

#[tokio::test]
async fn test_non_success_status_fails_without_leftovers() {
  let dir = tempfile::tempdir().unwrap();
  let resolver = HttpResolver::with_temp_dir(dir.path());
  let url = serve_once("404 Not Found", b"no such chart").await;

  let err = resolver.resolve(&remote_record(url)).await.unwrap_err();
  assert!(matches!(err, ResolveError::Status { status: 404, .. }));
  assert_eq!(entries(dir.path()), 0);
}

#[tokio::test]
async fn test_unreachable_host_is_http_error() {
  let dir = tempfile::tempdir().unwrap();
  let resolver = HttpResolver::with_temp_dir(dir.path());

  // Bind then drop to get a port nothing listens on.
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  drop(listener);

  let err = resolver
    .resolve(&remote_record(format!("http://{addr}/nginx.tgz")))
    .await
    .unwrap_err();
  assert!(matches!(err, ResolveError::Http(_)));
  assert_eq!(entries(dir.path()), 0);
}

#[tokio::test]
async fn test_no_source_leaves_no_file() {
  let dir = tempfile::tempdir().unwrap();
  let resolver = HttpResolver::with_temp_dir(dir.path());

  let err = resolver
    .resolve(&ChartVersionRecord::new("nginx", "1.0.0"))
    .await
    .unwrap_err();
  assert!(matches!(err, ResolveError::NoSource { .. }));
  assert_eq!(entries(dir.path()), 0);
}

#[tokio::test]
async fn test_local_package_is_used_in_place() {
  let dir = tempfile::tempdir().unwrap();
  let package = dir.path().join("nginx-1.0.0.tgz");
  std::fs::write(&package, b"local").unwrap();

  let mut record = ChartVersionRecord::new("nginx", "1.0.0");
  record.local_path = Some(package.display().to_string());

  let resolver = HttpResolver::with_temp_dir(dir.path().join("tmp"));
  let artifact = resolver.resolve(&record).await.unwrap();
  assert_eq!(artifact.path(), package.as_path());
  drop(artifact);
  assert!(package.exists());
}
