#![allow(dead_code)]

use async_trait::async_trait;
use pxmcache::{AcquisitionError, ContentCache, Fetcher};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;

/// Fetcher en mémoire qui compte les transferts
#[derive(Default)]
pub struct FakeFetcher {
    calls: AtomicUsize,
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    failures: Mutex<HashMap<String, AcquisitionError>>,
    gate: Option<Arc<Semaphore>>,
    delay: Option<Duration>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Les transferts attendent un jeton du sémaphore avant d'écrire
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn serve(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.bodies.lock().unwrap().insert(url.to_string(), body.into());
    }

    pub fn fail(&self, url: &str, error: AcquisitionError) {
        self.failures.lock().unwrap().insert(url.to_string(), error);
    }

    pub fn heal(&self, url: &str) {
        self.failures.lock().unwrap().remove(url);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, source_id: &str, url: &str, dest: &Path) -> Result<u64, AcquisitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.expect("gate closed");
            permit.forget();
        }

        if let Some(error) = self.failures.lock().unwrap().get(url).cloned() {
            return Err(error);
        }

        let body = self
            .bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| AcquisitionError::from_status_code(source_id, 404, "Not Found"))?;

        tokio::fs::write(dest, &body)
            .await
            .map_err(|e| AcquisitionError::from_io(source_id, &e))?;
        Ok(body.len() as u64)
    }
}

pub fn create_test_cache(max_bytes: u64, fetcher: Arc<FakeFetcher>) -> (TempDir, ContentCache) {
    let temp_dir = TempDir::new().unwrap();
    let cache = ContentCache::with_fetcher(temp_dir.path(), max_bytes, fetcher).unwrap();
    (temp_dir, cache)
}

/// Liste les fichiers du répertoire de cache (hors index)
pub fn cache_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| !n.starts_with("cache.db"))
        .collect();
    names.sort();
    names
}
