//! # pxmsource - Source resolution
//!
//! Turns a [`SourceDescriptor`](pxmcache::SourceDescriptor) into a local,
//! decodable file:
//!
//! - direct URLs are downloaded once through the content cache
//! - video and audio service identifiers are looked up (`ServiceLookup`)
//!   into a transfer URL, which is then cached
//! - archives are unpacked and their primary media file selected
//!
//! Lookups are bounded by a timeout. Service refusals
//! (`ServiceUnavailable`, `NotFound`) are reported apart from transport
//! failures (`Timeout`, `Network`).
//!
//! # Example
//!
//! ```no_run
//! use pxmcache::{ContentCache, SourceDescriptor};
//! use pxmsource::{SourceResolver, VideoServiceClient};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = ContentCache::new("/tmp/pxmedia-cache", 1 << 30)?;
//!     let video = VideoServiceClient::builder("https://video.example.com/api")
//!         .max_height(480)
//!         .build()?;
//!     let resolver = SourceResolver::new(cache).with_video_service(Arc::new(video));
//!
//!     let resolved = resolver
//!         .resolve(&SourceDescriptor::video_service("https://youtu.be/dQw4w9WgXcQ"))
//!         .await?;
//!     println!("{:?} at {}", resolved.stream.media_kind, resolved.stream.local_path.display());
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod error;
pub mod lookup;
pub mod media;
pub mod resolver;
pub mod video;

pub use audio::{AudioServiceClient, AudioServiceClientBuilder};
pub use error::{ResolutionError, Result};
pub use lookup::{ServiceLookup, ServiceStream, TrackInfo};
pub use media::{select_bundle_media, MediaKind, StreamDescriptor};
pub use resolver::{ResolvedSource, SourceResolver};
pub use video::{normalize_video_id, VideoServiceClient, VideoServiceClientBuilder};
