mod common;

use common::{config, write_clip, CollectingSink, FRAME_COLORS};
use pxmdither::{DitherMode, QuantizedFrame};
use pxmedia::{MediaCore, PlaybackState, SourceDescriptor, TracingObserver};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

async fn play_clip(core: &MediaCore, descriptor: &SourceDescriptor) -> Vec<QuantizedFrame> {
    let sink = CollectingSink::default();
    let frames = sink.frames.clone();
    let handle = core
        .play(descriptor, sink, None, Arc::new(TracingObserver))
        .await
        .unwrap();

    let stats = handle.wait().await;
    assert_eq!(handle.state(), PlaybackState::Stopped);
    assert_eq!(stats.frames_dropped, 0);
    let frames = frames.lock().unwrap().clone();
    frames
}

fn clip_descriptor(dir: &TempDir) -> SourceDescriptor {
    let clip = dir.path().join("clip.gif");
    write_clip(&clip);
    SourceDescriptor::url(format!("file://{}", clip.display()))
}

#[test]
fn test_core_from_config() {
    let dir = TempDir::new().unwrap();
    let core = MediaCore::from_config(&config(dir.path(), "random")).unwrap();

    assert_eq!(core.palette().len(), 4);
    assert!(matches!(core.quantizer().mode(), DitherMode::Random { weight: 64 }));
    assert!(dir.path().join("cache").is_dir());
    assert_eq!(core.cache().stats().entries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_undithered_playback_is_nearest_color_and_repeatable() {
    let dir = TempDir::new().unwrap();
    let core = MediaCore::from_config(&config(dir.path(), "none")).unwrap();
    let descriptor = clip_descriptor(&dir);

    let first = play_clip(&core, &descriptor).await;
    assert_eq!(first.len(), 10);

    let palette = core.palette();
    for (i, (frame, color)) in first.iter().zip(FRAME_COLORS).enumerate() {
        assert_eq!(frame.index, i as u64);
        assert_eq!(frame.pts, Duration::from_secs(i as u64));
        assert_eq!((frame.width, frame.height), (8, 8));
        let nearest = palette.nearest(color);
        assert!(frame.indices.iter().all(|&idx| idx == nearest), "frame {i}");
    }

    // Seconde lecture servie par le cache, même résultat
    let second = play_clip(&core, &descriptor).await;
    assert_eq!(first, second);
    assert_eq!(core.cache().stats().entries, 1);
    assert_eq!(core.cache().ref_count(&descriptor.cache_key()), Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_dithering_changes_off_palette_frames_only() {
    let dir = TempDir::new().unwrap();
    let descriptor = clip_descriptor(&dir);

    // Un cache par contexte
    let plain =
        MediaCore::from_config(&config(&dir.path().join("plain"), "none")).unwrap();
    let dithered =
        MediaCore::from_config(&config(&dir.path().join("fs"), "floyd_steinberg")).unwrap();

    let plain = play_clip(&plain, &descriptor).await;
    let dithered = play_clip(&dithered, &descriptor).await;
    assert_eq!(plain.len(), dithered.len());

    // Images 0 à 3: couleurs exactes de la palette
    for i in 0..4 {
        assert_eq!(plain[i].indices, dithered[i].indices, "frame {i}");
    }
    // Image 4: gris moyen, loin de toute entrée
    assert_ne!(plain[4].indices, dithered[4].indices);
    let distinct: std::collections::BTreeSet<u8> = dithered[4].indices.iter().copied().collect();
    assert!(distinct.len() > 1);
}

#[tokio::test]
async fn test_unreachable_source_is_an_error() {
    let dir = TempDir::new().unwrap();
    let core = MediaCore::from_config(&config(dir.path(), "none")).unwrap();
    let missing = dir.path().join("missing.gif");

    let result = core
        .play(
            &SourceDescriptor::url(format!("file://{}", missing.display())),
            CollectingSink::default(),
            None,
            Arc::new(TracingObserver),
        )
        .await;
    assert!(result.is_err());
    assert_eq!(core.cache().stats().entries, 0);
}
