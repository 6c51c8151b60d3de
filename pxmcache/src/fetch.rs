//! Transferts réseau
//!
//! Le cache ne parle jamais directement au réseau : il délègue à un
//! [`Fetcher`]. [`HttpFetcher`] est l'implémentation par défaut ; les tests
//! injectent leur propre implémentation.

use crate::error::{AcquisitionError, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Timeout global d'un transfert (corps compris)
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;
/// Timeout d'établissement de la connexion
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Transfert d'une URL vers un fichier local
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Télécharge `url` dans `dest` et retourne le nombre d'octets écrits
    ///
    /// `dest` est un fichier temporaire ; l'appelant se charge du renommage
    /// et du nettoyage en cas d'échec.
    async fn fetch(&self, source_id: &str, url: &str, dest: &Path) -> Result<u64>;
}

/// Transferts HTTP(S) en streaming, et copie locale pour les URLs `file://`
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Crée un fetcher avec le timeout donné
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| AcquisitionError::network("http-client", e))?;
        Ok(Self { client })
    }

    /// Réutilise un client existant (pool de connexions partagé)
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn fetch_http(&self, source_id: &str, url: &str, dest: &Path) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AcquisitionError::network(source_id, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AcquisitionError::from_status_code(
                source_id,
                status.as_u16(),
                status.canonical_reason().unwrap_or("request failed"),
            ));
        }

        if let Some(expected) = response.content_length() {
            debug!(source = source_id, expected, "Starting transfer");
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| AcquisitionError::from_io(source_id, &e))?;

        let mut total = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| AcquisitionError::network(source_id, e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| AcquisitionError::from_io(source_id, &e))?;
            total += chunk.len() as u64;
        }

        file.flush()
            .await
            .map_err(|e| AcquisitionError::from_io(source_id, &e))?;
        file.sync_all()
            .await
            .map_err(|e| AcquisitionError::from_io(source_id, &e))?;

        Ok(total)
    }

    async fn fetch_file(&self, source_id: &str, path: &str, dest: &Path) -> Result<u64> {
        match tokio::fs::copy(path, dest).await {
            Ok(size) => Ok(size),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
                AcquisitionError::from_status_code(source_id, 404, format!("{path} not found")),
            ),
            Err(e) => Err(AcquisitionError::from_io(source_id, &e)),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, source_id: &str, url: &str, dest: &Path) -> Result<u64> {
        match url.strip_prefix("file://") {
            Some(path) => self.fetch_file(source_id, path, dest).await,
            None => self.fetch_http(source_id, url, dest).await,
        }
    }
}

/// Extension de fichier déduite de l'URL (`bin` par défaut)
pub fn extension_from_url(url: &str) -> String {
    let path = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url);
    let last_segment = path.rsplit('/').next().unwrap_or(path);

    match last_segment.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => "bin".to_string(),
    }
}
