use pxmcache::{AcquisitionError, ContentCache, Fetcher, HttpFetcher, SourceDescriptor};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_http_fetch_streams_body() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clip.gif"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![42u8; 4096]))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("clip.part");
    let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();

    let size = fetcher
        .fetch("url:test", &format!("{}/clip.gif", mock_server.uri()), &dest)
        .await
        .unwrap();

    assert_eq!(size, 4096);
    assert_eq!(std::fs::read(&dest).unwrap(), vec![42u8; 4096]);
}

#[tokio::test]
async fn test_http_status_is_mapped() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.gif"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/busy.gif"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();

    let err = fetcher
        .fetch("url:gone", &format!("{}/gone.gif", mock_server.uri()), &dir.path().join("a"))
        .await
        .unwrap_err();
    assert!(matches!(err, AcquisitionError::ServiceRejected { status: 404, .. }));
    assert_eq!(err.source_id(), Some("url:gone"));

    let err = fetcher
        .fetch("url:busy", &format!("{}/busy.gif", mock_server.uri()), &dir.path().join("b"))
        .await
        .unwrap_err();
    assert!(matches!(err, AcquisitionError::ServiceRejected { status: 503, .. }));
}

#[tokio::test]
async fn test_http_timeout_is_network_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.gif"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let fetcher = HttpFetcher::new(Duration::from_millis(200)).unwrap();
    let err = fetcher
        .fetch("url:slow", &format!("{}/slow.gif", mock_server.uri()), &dir.path().join("c"))
        .await
        .unwrap_err();
    assert!(matches!(err, AcquisitionError::Network { .. }));
}

#[tokio::test]
async fn test_file_url_through_cache() {
    let source_dir = TempDir::new().unwrap();
    let source = source_dir.path().join("local.gif");
    std::fs::write(&source, b"GIF89a-local").unwrap();

    let cache_dir = TempDir::new().unwrap();
    let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(5)).unwrap());
    let cache = ContentCache::with_fetcher(cache_dir.path(), 1_000, fetcher).unwrap();

    let url = format!("file://{}", source.display());
    let handle = cache.resolve(&SourceDescriptor::url(url)).await.unwrap();
    assert_eq!(std::fs::read(handle.path()).unwrap(), b"GIF89a-local");
    assert!(handle.path().starts_with(cache_dir.path()));
}
