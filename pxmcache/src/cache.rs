//! Module de gestion du cache de contenus
//!
//! Le cache associe une clé (dérivée de la source) à un fichier local.
//!
//! - Un seul transfert par clé : les appelants concurrents s'abonnent au
//!   transfert en cours. Celui-ci tourne dans sa propre tâche, l'abandon
//!   d'un appelant n'interrompt donc pas les autres.
//! - Chaque [`CacheHandle`] compte une référence ; une entrée référencée
//!   n'est jamais supprimée.
//! - Après chaque insertion et chaque libération, les entrées non
//!   référencées les moins récemment utilisées sont évincées tant que la
//!   taille totale dépasse la limite.
//! - Les transferts sont écrits dans `{clé}.part-{uuid}` puis renommés :
//!   un fichier partiel n'est jamais visible comme entrée.

use crate::db::{IndexRow, DB};
use crate::descriptor::{CacheKey, SourceDescriptor, SourceKind};
use crate::error::{AcquisitionError, BundleError, Result};
use crate::fetch::{extension_from_url, Fetcher, HttpFetcher, DEFAULT_FETCH_TIMEOUT_SECS};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Nom du fichier d'index dans le répertoire du cache
pub const INDEX_FILE_NAME: &str = "cache.db";

const PART_MARKER: &str = ".part-";
const BUNDLE_SUFFIX: &str = ".d";

type FlightOutcome = Option<Result<()>>;

/// Entrée en mémoire
#[derive(Debug)]
struct Entry {
    file_name: String,
    source: String,
    size: u64,
    last_access: u64,
    ref_count: usize,
}

/// Transfert en cours pour une clé
struct Flight {
    id: u64,
    /// Appelants en attente, convertis en références au succès
    claims: usize,
    rx: watch::Receiver<FlightOutcome>,
}

#[derive(Default)]
struct State {
    entries: HashMap<CacheKey, Entry>,
    in_flight: HashMap<CacheKey, Flight>,
    total_bytes: u64,
    clock: u64,
    next_flight: u64,
}

impl State {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

struct Inner {
    dir: PathBuf,
    max_bytes: u64,
    db: DB,
    fetcher: Arc<dyn Fetcher>,
    state: Mutex<State>,
    bundle_locks: Mutex<HashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>>,
}

/// Statistiques instantanées du cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub referenced: usize,
    pub total_bytes: u64,
    pub max_bytes: u64,
    pub in_flight: usize,
}

/// Cache de contenus adressé par clé
///
/// Le type est un simple `Arc` interne : le cloner partage le même cache.
#[derive(Clone)]
pub struct ContentCache {
    inner: Arc<Inner>,
}

impl ContentCache {
    /// Ouvre le cache avec le fetcher HTTP par défaut
    ///
    /// # Arguments
    ///
    /// * `dir` - Répertoire de stockage du cache
    /// * `max_bytes` - Taille totale maximale des entrées
    pub fn new(dir: impl AsRef<Path>, max_bytes: u64) -> Result<Self> {
        let fetcher = HttpFetcher::new(Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS))?;
        Self::with_fetcher(dir, max_bytes, Arc::new(fetcher))
    }

    /// Ouvre le cache avec un fetcher donné
    ///
    /// Les entrées de l'index dont le fichier a disparu sont oubliées, les
    /// fichiers partiels d'une session précédente sont supprimés.
    pub fn with_fetcher(
        dir: impl AsRef<Path>,
        max_bytes: u64,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| AcquisitionError::from_io("cache", &e))?;
        let db = DB::init(&dir.join(INDEX_FILE_NAME))?;

        let inner = Arc::new(Inner {
            dir,
            max_bytes,
            db,
            fetcher,
            state: Mutex::new(State::default()),
            bundle_locks: Mutex::new(HashMap::new()),
        });
        inner.consolidate()?;

        Ok(Self { inner })
    }

    /// Résout une source `Url` en fichier local
    ///
    /// Les sources de service doivent d'abord être résolues en URL de
    /// transfert (voir `pxmsource`).
    pub async fn resolve(&self, descriptor: &SourceDescriptor) -> Result<CacheHandle> {
        if descriptor.kind() != SourceKind::Url {
            return Err(AcquisitionError::NotFetchable {
                source_id: descriptor.source_id(),
            });
        }
        self.acquire(
            descriptor.cache_key(),
            descriptor.source_id(),
            descriptor.identifier().to_string(),
        )
        .await
    }

    /// Résout une archive puis l'extrait dans `{clé}.d/`
    ///
    /// L'extraction se fait dans un répertoire temporaire renommé en cas de
    /// succès : une extraction ratée ne laisse aucune entrée visible.
    pub async fn resolve_bundle(
        &self,
        descriptor: &SourceDescriptor,
    ) -> std::result::Result<BundleHandle, BundleError> {
        let handle = self.resolve(descriptor).await?;
        let key = handle.key().clone();
        let source_id = descriptor.source_id();
        let bundle_dir = self.inner.bundle_dir(&key);

        let lock = self.inner.bundle_lock(&key);
        let _guard = lock.lock().await;

        if !bundle_dir.is_dir() {
            let staging = self
                .inner
                .dir
                .join(format!("{key}{BUNDLE_SUFFIX}{PART_MARKER}{}", Uuid::new_v4()));
            let archive = handle.path().to_path_buf();
            let target = staging.clone();

            let extracted =
                tokio::task::spawn_blocking(move || pxmarchive::extract(&archive, &target))
                    .await
                    .map_err(|e| AcquisitionError::Storage {
                        source_id: source_id.clone(),
                        message: format!("extraction task failed: {e}"),
                    })?;

            if let Err(e) = extracted {
                warn!(%key, error = %e, "Bundle extraction failed");
                let _ = tokio::fs::remove_dir_all(&staging).await;
                return Err(e.into());
            }

            if let Err(e) = tokio::fs::rename(&staging, &bundle_dir).await {
                let _ = tokio::fs::remove_dir_all(&staging).await;
                return Err(AcquisitionError::from_io(&source_id, &e).into());
            }

            let size = dir_size(&bundle_dir).map_err(|e| AcquisitionError::from_io(&source_id, &e))?;
            self.inner.add_bundle_size(&key, size);
            info!(%key, bytes = size, "Bundle installed");
        }

        let files = list_files(&bundle_dir).map_err(|e| AcquisitionError::from_io(&source_id, &e))?;
        Ok(BundleHandle {
            handle,
            dir: bundle_dir,
            files,
        })
    }

    async fn acquire(&self, key: CacheKey, source_id: String, url: String) -> Result<CacheHandle> {
        let (flight_id, rx) = {
            let mut state = self.inner.state.lock();
            let now = state.tick();

            if let Some(entry) = state.entries.get_mut(&key) {
                entry.ref_count += 1;
                entry.last_access = now;
                let path = self.inner.dir.join(&entry.file_name);
                drop(state);

                debug!(%key, source = %source_id, "Cache hit");
                self.inner.record_hit(&key, now);
                return Ok(CacheHandle::new(self.inner.clone(), key, path));
            }

            if let Some(flight) = state.in_flight.get_mut(&key) {
                flight.claims += 1;
                debug!(%key, claims = flight.claims, "Joining in-flight transfer");
                (flight.id, flight.rx.clone())
            } else {
                state.next_flight += 1;
                let id = state.next_flight;
                let (tx, rx) = watch::channel(None);
                state.in_flight.insert(
                    key.clone(),
                    Flight {
                        id,
                        claims: 1,
                        rx: rx.clone(),
                    },
                );
                debug!(%key, source = %source_id, "Starting transfer");
                tokio::spawn(run_transfer(
                    self.inner.clone(),
                    key.clone(),
                    id,
                    source_id.clone(),
                    url,
                    tx,
                ));
                (id, rx)
            }
        };

        // Si l'appelant est annulé pendant l'attente, la réclamation est rendue
        let mut claim = Claim {
            inner: self.inner.clone(),
            key: key.clone(),
            flight_id,
            rx,
            armed: true,
        };

        let outcome = wait_outcome(&mut claim.rx).await;
        claim.armed = false;

        match outcome {
            Some(Ok(())) => {
                let path = {
                    let state = self.inner.state.lock();
                    state
                        .entries
                        .get(&key)
                        .map(|entry| self.inner.dir.join(&entry.file_name))
                };
                match path {
                    Some(path) => Ok(CacheHandle::new(self.inner.clone(), key, path)),
                    None => Err(AcquisitionError::Storage {
                        source_id,
                        message: "entry vanished after transfer".to_string(),
                    }),
                }
            }
            Some(Err(e)) => Err(e),
            None => {
                self.inner.forget_flight(&key, flight_id);
                Err(AcquisitionError::network(&source_id, "transfer task aborted"))
            }
        }
    }

    /// Chemin du fichier d'une entrée présente
    pub fn entry_path(&self, key: &CacheKey) -> Option<PathBuf> {
        let state = self.inner.state.lock();
        state
            .entries
            .get(key)
            .map(|entry| self.inner.dir.join(&entry.file_name))
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.state.lock().entries.contains_key(key)
    }

    /// Nombre de références actives sur une entrée
    pub fn ref_count(&self, key: &CacheKey) -> Option<usize> {
        self.inner.state.lock().entries.get(key).map(|e| e.ref_count)
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock();
        CacheStats {
            entries: state.entries.len(),
            referenced: state.entries.values().filter(|e| e.ref_count > 0).count(),
            total_bytes: state.total_bytes,
            max_bytes: self.inner.max_bytes,
            in_flight: state.in_flight.len(),
        }
    }

    /// Supprime toutes les entrées non référencées
    pub fn purge(&self) -> usize {
        let mut state = self.inner.state.lock();
        let keys: Vec<CacheKey> = state
            .entries
            .iter()
            .filter(|(_, e)| e.ref_count == 0)
            .map(|(k, _)| k.clone())
            .collect();

        let count = keys.len();
        for key in keys {
            if let Some(entry) = state.entries.remove(&key) {
                state.total_bytes = state.total_bytes.saturating_sub(entry.size);
                self.inner.remove_entry_files(&key, &entry.file_name);
            }
        }
        info!(removed = count, "Cache purged");
        count
    }

    pub fn cache_dir(&self) -> &Path {
        &self.inner.dir
    }

    pub fn max_bytes(&self) -> u64 {
        self.inner.max_bytes
    }
}

// ============================================================================
// Transfert mutualisé
// ============================================================================

async fn wait_outcome(rx: &mut watch::Receiver<FlightOutcome>) -> FlightOutcome {
    loop {
        if let Some(outcome) = rx.borrow_and_update().clone() {
            return Some(outcome);
        }
        if rx.changed().await.is_err() {
            return rx.borrow().clone();
        }
    }
}

async fn run_transfer(
    inner: Arc<Inner>,
    key: CacheKey,
    flight_id: u64,
    source_id: String,
    url: String,
    tx: watch::Sender<FlightOutcome>,
) {
    let file_name = format!("{key}.{}", extension_from_url(&url));
    let part = inner.dir.join(format!("{key}{PART_MARKER}{}", Uuid::new_v4()));
    let final_path = inner.dir.join(&file_name);

    let result = match inner.fetcher.fetch(&source_id, &url, &part).await {
        Ok(size) => match tokio::fs::rename(&part, &final_path).await {
            Ok(()) => Ok(size),
            Err(e) => Err(AcquisitionError::from_io(&source_id, &e)),
        },
        Err(e) => Err(e),
    };

    if result.is_err() {
        let _ = tokio::fs::remove_file(&part).await;
    }

    let mut state = inner.state.lock();
    let owns_flight = state.in_flight.get(&key).is_some_and(|f| f.id == flight_id);
    let claims = if owns_flight {
        state.in_flight.remove(&key).map_or(0, |f| f.claims)
    } else {
        0
    };

    match &result {
        Ok(size) => {
            let now = state.tick();
            state.entries.insert(
                key.clone(),
                Entry {
                    file_name: file_name.clone(),
                    source: source_id.clone(),
                    size: *size,
                    last_access: now,
                    ref_count: claims,
                },
            );
            state.total_bytes += size;

            let row = IndexRow {
                key: key.to_string(),
                source: source_id.clone(),
                file_name,
                size: *size,
                hits: 0,
                access_seq: now,
                last_used: None,
            };
            if let Err(e) = inner.db.upsert(&row) {
                warn!(%key, "Error recording entry in index: {}", e);
            }
            info!(%key, source = %source_id, bytes = size, waiters = claims, "Transfer complete");
        }
        Err(e) => {
            warn!(%key, source = %source_id, error = %e, "Transfer failed");
        }
    }

    // L'état est publié sous le verrou : un appelant annulé sait ainsi s'il
    // détient une référence à rendre
    let _ = tx.send(Some(result.map(|_| ())));
    inner.evict_locked(&mut state);
}

/// Réclamation d'un appelant en attente d'un transfert
struct Claim {
    inner: Arc<Inner>,
    key: CacheKey,
    flight_id: u64,
    rx: watch::Receiver<FlightOutcome>,
    armed: bool,
}

impl Drop for Claim {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let mut state = self.inner.state.lock();
        if let Some(flight) = state.in_flight.get_mut(&self.key) {
            if flight.id == self.flight_id {
                flight.claims = flight.claims.saturating_sub(1);
                debug!(key = %self.key, claims = flight.claims, "Waiter abandoned transfer");
                return;
            }
        }

        // Transfert terminé : sa référence a été comptée, on la rend
        let succeeded = matches!(*self.rx.borrow(), Some(Ok(())));
        if succeeded {
            self.inner.release_locked(&mut state, &self.key);
        }
    }
}

// ============================================================================
// Références, éviction, cohérence disque/index
// ============================================================================

impl Inner {
    fn bundle_dir(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}{BUNDLE_SUFFIX}"))
    }

    fn bundle_lock(&self, key: &CacheKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.bundle_locks.lock();
        locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn record_hit(&self, key: &CacheKey, access_seq: u64) {
        if let Err(e) = self.db.touch(key.as_str(), access_seq) {
            warn!(%key, "Error updating index: {}", e);
        }
    }

    fn forget_flight(&self, key: &CacheKey, flight_id: u64) {
        let mut state = self.state.lock();
        if state.in_flight.get(key).is_some_and(|f| f.id == flight_id) {
            state.in_flight.remove(key);
        }
    }

    fn release(&self, key: &CacheKey) {
        let mut state = self.state.lock();
        self.release_locked(&mut state, key);
    }

    fn release_locked(&self, state: &mut State, key: &CacheKey) {
        let now = state.tick();
        if let Some(entry) = state.entries.get_mut(key) {
            entry.ref_count = entry.ref_count.saturating_sub(1);
            entry.last_access = now;
            debug!(%key, refs = entry.ref_count, "Handle released");
        }
        if let Err(e) = self.db.touch(key.as_str(), now) {
            warn!(%key, "Error updating index: {}", e);
        }
        self.evict_locked(state);
    }

    fn add_bundle_size(&self, key: &CacheKey, extra: u64) {
        let mut state = self.state.lock();
        let Some(entry) = state.entries.get_mut(key) else {
            return;
        };
        entry.size += extra;
        let size = entry.size;
        state.total_bytes += extra;

        if let Err(e) = self.db.set_size(key.as_str(), size) {
            warn!(%key, "Error updating index: {}", e);
        }
        self.evict_locked(&mut state);
    }

    /// Politique LRU : évince les entrées non référencées les plus anciennes
    /// tant que la limite est dépassée
    ///
    /// Les fichiers sont supprimés sous le verrou, un nouveau transfert pour
    /// la même clé ne peut donc pas être effacé par erreur.
    fn evict_locked(&self, state: &mut State) -> usize {
        let before = state.entries.len();
        let mut removed = 0;

        while state.total_bytes > self.max_bytes {
            let victim = state
                .entries
                .iter()
                .filter(|(_, e)| e.ref_count == 0)
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone());

            let Some(key) = victim else {
                if removed == 0 {
                    debug!(
                        total = state.total_bytes,
                        limit = self.max_bytes,
                        "Cache over limit but every entry is in use"
                    );
                }
                break;
            };

            if let Some(entry) = state.entries.remove(&key) {
                state.total_bytes = state.total_bytes.saturating_sub(entry.size);
                debug!(%key, source = %entry.source, bytes = entry.size, "Evicting entry");
                self.remove_entry_files(&key, &entry.file_name);
                removed += 1;
            }
        }

        if removed > 0 {
            info!(
                "LRU eviction: removed {} entries (cache size: {} -> {}, {} bytes)",
                removed,
                before,
                before - removed,
                state.total_bytes
            );
        }
        removed
    }

    fn remove_entry_files(&self, key: &CacheKey, file_name: &str) {
        if let Err(e) = fs::remove_file(self.dir.join(file_name)) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(%key, "Error deleting cached file: {}", e);
            }
        }
        let bundle = self.bundle_dir(key);
        if bundle.exists() {
            if let Err(e) = fs::remove_dir_all(&bundle) {
                warn!(%key, "Error deleting bundle directory: {}", e);
            }
        }
        if let Err(e) = self.db.delete(key.as_str()) {
            warn!(%key, "Error deleting entry {} from DB: {}", key, e);
        }
    }

    /// Réconcilie l'index et le répertoire au démarrage
    fn consolidate(&self) -> Result<()> {
        let rows = self.db.all()?;
        let mut state = self.state.lock();

        for row in rows {
            let key = match CacheKey::parse(&row.key) {
                Some(key) if self.dir.join(&row.file_name).is_file() => key,
                _ => {
                    debug!(key = %row.key, "Dropping index entry without file");
                    self.db.delete(&row.key)?;
                    continue;
                }
            };
            state.clock = state.clock.max(row.access_seq);
            state.total_bytes += row.size;
            state.entries.insert(
                key,
                Entry {
                    file_name: row.file_name,
                    source: row.source,
                    size: row.size,
                    last_access: row.access_seq,
                    ref_count: 0,
                },
            );
        }

        // Fichiers partiels et orphelins
        let dir_entries = fs::read_dir(&self.dir).map_err(|e| AcquisitionError::from_io("cache", &e))?;
        for dir_entry in dir_entries.flatten() {
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            let Some(key) = name.get(..32).and_then(CacheKey::parse) else {
                continue;
            };
            let path = dir_entry.path();
            let orphan = name.contains(PART_MARKER) || !state.entries.contains_key(&key);
            if orphan {
                debug!(file = %name, "Removing stale cache file");
                let result = if path.is_dir() {
                    fs::remove_dir_all(&path)
                } else {
                    fs::remove_file(&path)
                };
                if let Err(e) = result {
                    warn!(file = %name, "Error removing stale file: {}", e);
                }
            }
        }

        info!(
            dir = %self.dir.display(),
            entries = state.entries.len(),
            bytes = state.total_bytes,
            "Cache opened"
        );
        self.evict_locked(&mut state);
        Ok(())
    }
}

// ============================================================================
// Handles
// ============================================================================

/// Référence à une entrée du cache
///
/// Tant que le handle existe, l'entrée ne peut pas être évincée. Sa
/// destruction rend la référence et déclenche l'éviction si nécessaire.
pub struct CacheHandle {
    inner: Arc<Inner>,
    key: CacheKey,
    path: PathBuf,
}

impl CacheHandle {
    fn new(inner: Arc<Inner>, key: CacheKey, path: PathBuf) -> Self {
        Self { inner, key, path }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Chemin du fichier local
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for CacheHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheHandle")
            .field("key", &self.key)
            .field("path", &self.path)
            .finish()
    }
}

impl Drop for CacheHandle {
    fn drop(&mut self) {
        self.inner.release(&self.key);
    }
}

/// Archive résolue et extraite
#[derive(Debug)]
pub struct BundleHandle {
    handle: CacheHandle,
    dir: PathBuf,
    files: Vec<PathBuf>,
}

impl BundleHandle {
    /// Répertoire d'extraction
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fichiers extraits, triés
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Handle de l'archive elle-même
    pub fn handle(&self) -> &CacheHandle {
        &self.handle
    }

    pub fn into_handle(self) -> CacheHandle {
        self.handle
    }
}

fn list_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }
    files.sort();
    Ok(files)
}

fn dir_size(dir: &Path) -> io::Result<u64> {
    let mut total = 0;
    for file in list_files(dir)? {
        total += fs::metadata(file)?.len();
    }
    Ok(total)
}
