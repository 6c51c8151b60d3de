use async_trait::async_trait;
use pxmcache::{ContentCache, SourceDescriptor};
use pxmsource::{
    AudioServiceClient, MediaKind, ResolutionError, ServiceLookup, ServiceStream, SourceResolver,
    VideoServiceClient,
};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VIDEO_ID: &str = "dQw4w9WgXcQ";

fn create_cache() -> (TempDir, ContentCache) {
    let dir = TempDir::new().unwrap();
    let cache = ContentCache::new(dir.path(), 10 * 1024 * 1024).unwrap();
    (dir, cache)
}

fn video_client(server: &MockServer) -> Arc<VideoServiceClient> {
    Arc::new(
        VideoServiceClient::builder(format!("{}/api", server.uri()))
            .max_height(720)
            .timeout(Duration::from_millis(500))
            .build()
            .unwrap(),
    )
}

fn audio_client(server: &MockServer) -> Arc<AudioServiceClient> {
    Arc::new(
        AudioServiceClient::builder(server.uri())
            .api_key("secret")
            .build()
            .unwrap(),
    )
}

async fn mount_video_lookup(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("/api/streams/{VIDEO_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "title": "Demo clip",
            "duration_secs": 10.0,
            "streams": [
                { "url": format!("{}/media/1080.mp4", server.uri()), "height": 1080, "format": "mp4" },
                { "url": format!("{}/media/720.mp4", server.uri()), "height": 720, "format": "mp4" },
                { "url": format!("{}/media/audio.m4a", server.uri()), "format": "m4a", "progressive": false }
            ]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_resolve_direct_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clip.gif"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"GIF89a-bytes".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, cache) = create_cache();
    let resolver = SourceResolver::new(cache.clone());
    let descriptor = SourceDescriptor::url(format!("{}/clip.gif", server.uri()));

    let first = resolver.resolve(&descriptor).await.unwrap();
    assert_eq!(first.stream.media_kind, MediaKind::Image);
    assert!(first.handle.is_some());
    assert_eq!(std::fs::read(&first.stream.local_path).unwrap(), b"GIF89a-bytes");

    let second = resolver.resolve(&descriptor).await.unwrap();
    assert_eq!(first.stream.local_path, second.stream.local_path);
    assert_eq!(cache.stats().entries, 1);
}

#[tokio::test]
async fn test_concurrent_video_resolutions_share_one_transfer() {
    let server = MockServer::start().await;
    mount_video_lookup(&server).await;
    Mock::given(method("GET"))
        .and(path("/media/720.mp4"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0u8; 2048])
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, cache) = create_cache();
    let resolver = SourceResolver::new(cache.clone()).with_video_service(video_client(&server));

    let watch = SourceDescriptor::video_service(format!("https://www.youtube.com/watch?v={VIDEO_ID}"));
    let short = SourceDescriptor::video_service(format!("https://youtu.be/{VIDEO_ID}"));
    let (a, b) = tokio::join!(resolver.resolve(&watch), resolver.resolve(&short));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.stream.local_path, b.stream.local_path);
    assert_eq!(a.stream.media_kind, MediaKind::Video);
    let info = a.info.as_ref().unwrap();
    assert_eq!(info.title.as_deref(), Some("Demo clip"));
    assert_eq!(info.duration, Some(Duration::from_secs(10)));
    assert_eq!(info.format.as_deref(), Some("mp4"));

    let stats = cache.stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.referenced, 1);
    assert_eq!(
        cache.ref_count(&SourceDescriptor::url(format!("{}/media/720.mp4", server.uri())).cache_key()),
        Some(2)
    );
}

#[tokio::test]
async fn test_video_service_errors_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/streams/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/streams/busy"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/streams/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/streams/garbled"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let (_dir, cache) = create_cache();
    let resolver = SourceResolver::new(cache.clone()).with_video_service(video_client(&server));

    let err = resolver
        .resolve(&SourceDescriptor::video_service("missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, ResolutionError::NotFound { .. }), "{err:?}");

    let err = resolver
        .resolve(&SourceDescriptor::video_service("busy"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ResolutionError::ServiceUnavailable { status: Some(429), .. }
    ));
    assert!(err.is_retryable());

    let err = resolver
        .resolve(&SourceDescriptor::video_service("slow"))
        .await
        .unwrap_err();
    assert!(matches!(err, ResolutionError::Timeout { .. }), "{err:?}");

    let err = resolver
        .resolve(&SourceDescriptor::video_service("garbled"))
        .await
        .unwrap_err();
    assert!(matches!(err, ResolutionError::ServiceUnavailable { .. }), "{err:?}");

    assert_eq!(cache.stats().entries, 0);
}

#[tokio::test]
async fn test_video_without_suitable_stream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/streams/tall"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "streams": [{ "url": "https://cdn.example/4k.mp4", "height": 2160 }]
        })))
        .mount(&server)
        .await;

    let (_dir, cache) = create_cache();
    let resolver = SourceResolver::new(cache).with_video_service(video_client(&server));
    let err = resolver
        .resolve(&SourceDescriptor::video_service("tall"))
        .await
        .unwrap_err();
    assert!(matches!(err, ResolutionError::NotFound { .. }));
}

#[tokio::test]
async fn test_service_cannot_point_at_local_files() {
    let server = MockServer::start().await;
    let (dir, cache) = create_cache();
    let secret = dir.path().join("secret.txt");
    std::fs::write(&secret, "not for the cache").unwrap();

    Mock::given(method("GET"))
        .and(path("/api/streams/local"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "streams": [{ "url": format!("file://{}", secret.display()), "height": 360 }]
        })))
        .mount(&server)
        .await;

    let resolver = SourceResolver::new(cache.clone()).with_video_service(video_client(&server));
    let err = resolver
        .resolve(&SourceDescriptor::video_service("local"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, ResolutionError::ServiceUnavailable { .. }),
        "{err:?}"
    );
    assert_eq!(cache.stats().entries, 0);
    assert_eq!(cache.stats().in_flight, 0);
}

#[tokio::test]
async fn test_audio_search_then_stream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "daft punk one more time"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tracks": [
                { "id": "t42", "title": "One More Time", "duration_secs": 320.5 },
                { "id": "t43", "title": "One More Time (Edit)" }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tracks/t42/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": format!("{}/cdn/t42", server.uri()),
            "format": "mp3"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cdn/t42"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3-audio".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, cache) = create_cache();
    let resolver = SourceResolver::new(cache).with_audio_service(audio_client(&server));

    let resolved = resolver
        .resolve(&SourceDescriptor::audio_service("daft punk one more time"))
        .await
        .unwrap();
    // Extension inconnue dans l'URL : le format annoncé décide
    assert_eq!(resolved.stream.media_kind, MediaKind::Audio);
    let info = resolved.info.unwrap();
    assert_eq!(info.title.as_deref(), Some("One More Time"));
    assert_eq!(info.duration, Some(Duration::from_secs_f64(320.5)));

    let by_id = resolver
        .resolve(&SourceDescriptor::audio_service("track:t42"))
        .await
        .unwrap();
    assert_eq!(by_id.stream.local_path, resolved.stream.local_path);

    let requests = server.received_requests().await.unwrap();
    assert!(requests
        .iter()
        .all(|r| r.url.path().starts_with("/cdn") || r.headers.get("x-api-key").is_some()));
}

#[tokio::test]
async fn test_audio_search_without_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tracks": [] })))
        .mount(&server)
        .await;

    let (_dir, cache) = create_cache();
    let resolver = SourceResolver::new(cache).with_audio_service(audio_client(&server));
    let err = resolver
        .resolve(&SourceDescriptor::audio_service("nothing"))
        .await
        .unwrap_err();
    assert!(matches!(err, ResolutionError::NotFound { .. }));
}

#[tokio::test]
async fn test_unconfigured_service() {
    let (_dir, cache) = create_cache();
    let resolver = SourceResolver::new(cache);
    let err = resolver
        .resolve(&SourceDescriptor::video_service(VIDEO_ID))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ResolutionError::ServiceUnavailable { status: None, .. }
    ));
}

struct StalledLookup;

#[async_trait]
impl ServiceLookup for StalledLookup {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn lookup(&self, _descriptor: &SourceDescriptor) -> pxmsource::Result<ServiceStream> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        unreachable!("lookup should have been cancelled")
    }
}

#[tokio::test(start_paused = true)]
async fn test_lookup_is_bounded_by_resolver_timeout() {
    let (_dir, cache) = create_cache();
    let resolver = SourceResolver::new(cache)
        .with_video_service(Arc::new(StalledLookup))
        .with_lookup_timeout(Duration::from_secs(5));

    let err = resolver
        .resolve(&SourceDescriptor::video_service(VIDEO_ID))
        .await
        .unwrap_err();
    assert!(matches!(err, ResolutionError::Timeout { .. }));
}

#[tokio::test]
async fn test_resolved_hint_short_circuits() {
    let dir = TempDir::new().unwrap();
    let local = dir.path().join("already-here.gif");
    std::fs::write(&local, b"GIF89a").unwrap();

    let (_cache_dir, cache) = create_cache();
    let resolver = SourceResolver::new(cache.clone());

    // Port 9 (discard) : toute tentative réseau échouerait
    let descriptor =
        SourceDescriptor::url("http://127.0.0.1:9/never.gif").with_resolved_hint(&local);
    let resolved = resolver.resolve(&descriptor).await.unwrap();
    assert_eq!(resolved.stream.local_path, local);
    assert_eq!(resolved.stream.media_kind, MediaKind::Image);
    assert!(resolved.handle.is_none());
    assert_eq!(cache.stats().entries, 0);
}

#[tokio::test]
async fn test_stale_hint_falls_back_to_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clip.gif"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"GIF89a".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, cache) = create_cache();
    let resolver = SourceResolver::new(cache);
    let descriptor = SourceDescriptor::url(format!("{}/clip.gif", server.uri()))
        .with_resolved_hint("/nonexistent/clip.gif");

    let resolved = resolver.resolve(&descriptor).await.unwrap();
    assert!(resolved.handle.is_some());
}

fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer
            .start_file(name.to_string(), zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

#[tokio::test]
async fn test_bundle_url_selects_primary_media() {
    let server = MockServer::start().await;
    let archive = zip_bytes(&[
        ("pack/README.txt", b"hello"),
        ("pack/music/theme.ogg", b"OggS"),
        ("pack/frames.gif", b"GIF89a"),
    ]);
    Mock::given(method("GET"))
        .and(path("/packs/demo.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive.clone()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/packs/opaque"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
        .mount(&server)
        .await;

    let (_dir, cache) = create_cache();
    let resolver = SourceResolver::new(cache.clone());

    for url in ["/packs/demo.zip", "/packs/opaque"] {
        let resolved = resolver
            .resolve(&SourceDescriptor::url(format!("{}{url}", server.uri())))
            .await
            .unwrap();
        assert_eq!(resolved.stream.media_kind, MediaKind::Image);
        assert!(resolved.stream.local_path.ends_with("pack/frames.gif"));
        assert!(resolved
            .stream
            .audio_path
            .as_ref()
            .is_some_and(|p| p.ends_with("pack/music/theme.ogg")));
        assert!(resolved.handle.is_some());
    }
    assert_eq!(cache.stats().entries, 2);
}

#[tokio::test]
async fn test_bundle_without_media() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/packs/docs.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(zip_bytes(&[("notes.txt", b"x")])))
        .mount(&server)
        .await;

    let (_dir, cache) = create_cache();
    let resolver = SourceResolver::new(cache);
    let err = resolver
        .resolve(&SourceDescriptor::url(format!("{}/packs/docs.zip", server.uri())))
        .await
        .unwrap_err();
    assert!(matches!(err, ResolutionError::NotFound { .. }));
}
