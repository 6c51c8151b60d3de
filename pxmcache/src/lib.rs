//! # pxmcache - Cache de contenus
//!
//! Télécharge les sources une seule fois et les conserve sur disque :
//!
//! - clé dérivée de la source (`SHA-256` de `kind:identifier`)
//! - un seul transfert par clé, partagé entre appelants concurrents
//! - handles comptés : une entrée en cours d'utilisation n'est jamais évincée
//! - éviction LRU au-delà d'une taille totale configurée
//! - index SQLite persistant entre deux sessions
//! - extraction des archives via `pxmarchive`
//!
//! ## Exemple
//!
//! ```rust,no_run
//! use pxmcache::{ContentCache, SourceDescriptor};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = ContentCache::new("/var/cache/pxmedia", 512 * 1024 * 1024)?;
//! let handle = cache
//!     .resolve(&SourceDescriptor::url("https://example.com/clip.gif"))
//!     .await?;
//! println!("cached at {}", handle.path().display());
//! // La référence est rendue à la destruction du handle
//! drop(handle);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod db;
pub mod descriptor;
pub mod error;
pub mod fetch;

pub use cache::{BundleHandle, CacheHandle, CacheStats, ContentCache, INDEX_FILE_NAME};
pub use descriptor::{CacheKey, SourceDescriptor, SourceKind};
pub use error::{AcquisitionError, BundleError, Result};
pub use fetch::{extension_from_url, Fetcher, HttpFetcher};
