mod common;

use common::{cache_files, create_test_cache, FakeFetcher};
use pxmcache::{AcquisitionError, BundleError, ContentCache, SourceDescriptor};
use std::io::Write;
use std::sync::Arc;

const GIF: &str = "https://cdn.example.com/clips/cat.gif";

#[tokio::test]
async fn test_resolve_then_hit() {
    let fetcher = Arc::new(FakeFetcher::new());
    fetcher.serve(GIF, vec![7u8; 40]);
    let (_dir, cache) = create_test_cache(1_000, fetcher.clone());
    let descriptor = SourceDescriptor::url(GIF);

    let first = cache.resolve(&descriptor).await.unwrap();
    assert!(first.path().exists());
    assert_eq!(first.path().extension().unwrap(), "gif");
    assert_eq!(std::fs::read(first.path()).unwrap().len(), 40);

    let second = cache.resolve(&descriptor).await.unwrap();
    assert_eq!(first.path(), second.path());
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(cache.ref_count(first.key()), Some(2));

    let key = first.key().clone();
    drop(first);
    drop(second);
    assert_eq!(cache.ref_count(&key), Some(0));

    let stats = cache.stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.total_bytes, 40);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test]
async fn test_referenced_entries_are_never_evicted() {
    let fetcher = Arc::new(FakeFetcher::new());
    for name in ["a", "b", "c"] {
        fetcher.serve(&format!("https://example.com/{name}.bin"), vec![0u8; 40]);
    }
    let (_dir, cache) = create_test_cache(100, fetcher.clone());

    let a = cache.resolve(&SourceDescriptor::url("https://example.com/a.bin")).await.unwrap();
    let b = cache.resolve(&SourceDescriptor::url("https://example.com/b.bin")).await.unwrap();
    let c = cache.resolve(&SourceDescriptor::url("https://example.com/c.bin")).await.unwrap();

    // 120 octets > 100, mais tout est référencé
    assert_eq!(cache.stats().total_bytes, 120);
    assert!(a.path().exists() && b.path().exists() && c.path().exists());

    let a_key = a.key().clone();
    let a_path = a.path().to_path_buf();
    drop(a);

    // La libération déclenche l'éviction de la seule entrée libre
    assert!(!cache.contains(&a_key));
    assert!(!a_path.exists());
    assert_eq!(cache.stats().total_bytes, 80);

    drop(b);
    drop(c);
    assert_eq!(cache.stats().entries, 2);
}

#[tokio::test]
async fn test_lru_order() {
    let fetcher = Arc::new(FakeFetcher::new());
    for name in ["a", "b", "c"] {
        fetcher.serve(&format!("https://example.com/{name}.bin"), vec![0u8; 40]);
    }
    let (_dir, cache) = create_test_cache(100, fetcher.clone());
    let a = SourceDescriptor::url("https://example.com/a.bin");
    let b = SourceDescriptor::url("https://example.com/b.bin");
    let c = SourceDescriptor::url("https://example.com/c.bin");

    drop(cache.resolve(&a).await.unwrap());
    drop(cache.resolve(&b).await.unwrap());
    // `a` redevient la plus récente
    drop(cache.resolve(&a).await.unwrap());
    drop(cache.resolve(&c).await.unwrap());

    assert!(cache.contains(&a.cache_key()));
    assert!(!cache.contains(&b.cache_key()));
    assert!(cache.contains(&c.cache_key()));
    assert!(cache.stats().total_bytes <= 100);
    assert_eq!(fetcher.calls(), 3);
}

#[tokio::test]
async fn test_failed_transfer_leaves_no_entry() {
    let fetcher = Arc::new(FakeFetcher::new());
    fetcher.serve(GIF, vec![1u8; 10]);
    fetcher.fail(
        GIF,
        AcquisitionError::network("url:test", "connection reset by peer"),
    );
    let (dir, cache) = create_test_cache(1_000, fetcher.clone());
    let descriptor = SourceDescriptor::url(GIF);

    let err = cache.resolve(&descriptor).await.unwrap_err();
    assert!(matches!(err, AcquisitionError::Network { .. }));
    assert!(err.is_retryable());
    assert!(!cache.contains(&descriptor.cache_key()));
    assert!(cache_files(dir.path()).is_empty(), "partial files must be removed");

    fetcher.heal(GIF);
    let handle = cache.resolve(&descriptor).await.unwrap();
    assert!(handle.path().exists());
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn test_unknown_url_is_rejected() {
    let fetcher = Arc::new(FakeFetcher::new());
    let (_dir, cache) = create_test_cache(1_000, fetcher);

    let err = cache
        .resolve(&SourceDescriptor::url("https://example.com/missing.gif"))
        .await
        .unwrap_err();
    assert!(matches!(err, AcquisitionError::ServiceRejected { status: 404, .. }));
}

#[tokio::test]
async fn test_service_descriptor_is_not_fetchable() {
    let fetcher = Arc::new(FakeFetcher::new());
    let (_dir, cache) = create_test_cache(1_000, fetcher.clone());

    let err = cache
        .resolve(&SourceDescriptor::video_service("dQw4w9WgXcQ"))
        .await
        .unwrap_err();
    assert!(matches!(err, AcquisitionError::NotFetchable { .. }));
    assert!(!err.is_retryable());
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn test_index_survives_restart() {
    let fetcher = Arc::new(FakeFetcher::new());
    fetcher.serve(GIF, vec![3u8; 64]);
    let (dir, cache) = create_test_cache(1_000, fetcher.clone());
    let descriptor = SourceDescriptor::url(GIF);

    drop(cache.resolve(&descriptor).await.unwrap());
    drop(cache);

    // Fichier partiel d'une session interrompue
    std::fs::write(
        dir.path().join(format!("{}.part-1234", SourceDescriptor::url("x").cache_key())),
        b"junk",
    )
    .unwrap();

    let reopened = ContentCache::with_fetcher(dir.path(), 1_000, fetcher.clone()).unwrap();
    assert!(reopened.contains(&descriptor.cache_key()));
    assert_eq!(reopened.stats().total_bytes, 64);

    let handle = reopened.resolve(&descriptor).await.unwrap();
    assert_eq!(std::fs::read(handle.path()).unwrap(), vec![3u8; 64]);
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(cache_files(dir.path()).len(), 1);
}

#[tokio::test]
async fn test_missing_file_drops_index_entry() {
    let fetcher = Arc::new(FakeFetcher::new());
    fetcher.serve(GIF, vec![3u8; 64]);
    let (dir, cache) = create_test_cache(1_000, fetcher.clone());
    let descriptor = SourceDescriptor::url(GIF);

    let path = {
        let handle = cache.resolve(&descriptor).await.unwrap();
        handle.path().to_path_buf()
    };
    drop(cache);
    std::fs::remove_file(path).unwrap();

    let reopened = ContentCache::with_fetcher(dir.path(), 1_000, fetcher.clone()).unwrap();
    assert!(!reopened.contains(&descriptor.cache_key()));
    assert_eq!(reopened.stats().entries, 0);
}

#[tokio::test]
async fn test_purge_keeps_referenced_entries() {
    let fetcher = Arc::new(FakeFetcher::new());
    fetcher.serve("https://example.com/a.bin", vec![0u8; 5]);
    fetcher.serve("https://example.com/b.bin", vec![0u8; 5]);
    let (_dir, cache) = create_test_cache(1_000, fetcher);

    let held = cache.resolve(&SourceDescriptor::url("https://example.com/a.bin")).await.unwrap();
    drop(cache.resolve(&SourceDescriptor::url("https://example.com/b.bin")).await.unwrap());

    assert_eq!(cache.purge(), 1);
    assert!(cache.contains(held.key()));
    assert_eq!(cache.stats().entries, 1);
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
async fn test_bundle_is_extracted_once() {
    let url = "https://example.com/pack.zip";
    let fetcher = Arc::new(FakeFetcher::new());
    fetcher.serve(url, zip_bytes(&[("frames/a.gif", b"GIF89a"), ("track.mp3", b"ID3")]));
    let (dir, cache) = create_test_cache(10_000, fetcher.clone());
    let descriptor = SourceDescriptor::url(url);

    let bundle = cache.resolve_bundle(&descriptor).await.unwrap();
    assert_eq!(bundle.files().len(), 2);
    assert!(bundle.dir().join("frames/a.gif").is_file());
    let archive_size = std::fs::metadata(bundle.handle().path()).unwrap().len();
    assert_eq!(cache.stats().total_bytes, archive_size + 6 + 3);
    drop(bundle);

    let again = cache.resolve_bundle(&descriptor).await.unwrap();
    assert_eq!(again.files().len(), 2);
    assert_eq!(fetcher.calls(), 1);

    let names = cache_files(dir.path());
    assert!(names.iter().all(|n| !n.contains(".part-")));
}

#[tokio::test]
async fn test_failed_extraction_leaves_no_bundle() {
    let url = "https://example.com/not-an-archive.zip";
    let fetcher = Arc::new(FakeFetcher::new());
    fetcher.serve(url, b"definitely not a zip".to_vec());
    let (dir, cache) = create_test_cache(10_000, fetcher);

    let err = cache
        .resolve_bundle(&SourceDescriptor::url(url))
        .await
        .unwrap_err();
    assert!(matches!(err, BundleError::Extraction(_)));

    let names = cache_files(dir.path());
    assert!(names.iter().all(|n| !n.ends_with(".d") && !n.contains(".d.part-")));
}

#[tokio::test]
async fn test_bundle_evicted_with_archive() {
    let url = "https://example.com/pack.zip";
    let other = "https://example.com/big.bin";
    let fetcher = Arc::new(FakeFetcher::new());
    fetcher.serve(url, zip_bytes(&[("clip.gif", &[0u8; 100])]));
    fetcher.serve(other, vec![0u8; 900]);
    let (dir, cache) = create_test_cache(1_000, fetcher);

    let bundle_dir = {
        let bundle = cache.resolve_bundle(&SourceDescriptor::url(url)).await.unwrap();
        bundle.dir().to_path_buf()
    };
    assert!(bundle_dir.is_dir());

    let _big = cache.resolve(&SourceDescriptor::url(other)).await.unwrap();
    assert!(!bundle_dir.exists());
    assert_eq!(cache_files(dir.path()).len(), 1);
}
