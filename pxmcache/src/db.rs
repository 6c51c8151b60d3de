//! Module de gestion de la base de données SQLite pour le cache
//!
//! L'index persiste les entrées d'une session à l'autre : clé, source,
//! nom du fichier, taille et statistiques d'accès. Les compteurs de
//! références restent en mémoire, ils n'ont pas de sens après un redémarrage.

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;

const TABLE: &str = "entries";

/// Ligne de l'index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
    /// Clé de l'entrée (32 caractères hexadécimaux)
    pub key: String,
    /// Identifiant de la source (`kind:identifier`)
    pub source: String,
    /// Nom du fichier dans le répertoire du cache
    pub file_name: String,
    /// Taille occupée sur le disque, répertoire d'extraction compris
    pub size: u64,
    /// Nombre d'accès
    pub hits: i64,
    /// Ordre du dernier accès (plus grand = plus récent)
    pub access_seq: u64,
    /// Date/heure du dernier accès (RFC3339)
    pub last_used: Option<String>,
}

/// Base de données SQLite de l'index
#[derive(Debug)]
pub struct DB {
    conn: Mutex<Connection>,
}

impl DB {
    /// Ouvre (ou crée) l'index
    ///
    /// # Arguments
    ///
    /// * `path` - Chemin vers le fichier de base de données SQLite
    pub fn init(path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {TABLE} (
                    key TEXT PRIMARY KEY,
                    source TEXT NOT NULL,
                    file_name TEXT NOT NULL,
                    size INTEGER NOT NULL DEFAULT 0,
                    hits INTEGER NOT NULL DEFAULT 0,
                    access_seq INTEGER NOT NULL DEFAULT 0,
                    last_used TEXT
                )"
            ),
            [],
        )?;

        // Index pour la politique LRU
        conn.execute(
            &format!("CREATE INDEX IF NOT EXISTS idx_{TABLE}_lru ON {TABLE} (access_seq ASC)"),
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Ajoute ou met à jour une entrée
    pub fn upsert(&self, row: &IndexRow) -> rusqlite::Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT INTO {TABLE} (key, source, file_name, size, hits, access_seq, last_used)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(key) DO UPDATE SET
                     source = excluded.source,
                     file_name = excluded.file_name,
                     size = excluded.size,
                     access_seq = excluded.access_seq,
                     last_used = excluded.last_used"
            ),
            params![
                row.key,
                row.source,
                row.file_name,
                row.size as i64,
                row.hits,
                row.access_seq as i64,
                row.last_used.clone().unwrap_or_else(|| Utc::now().to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Met à jour le compteur d'accès et l'ordre LRU
    pub fn touch(&self, key: &str, access_seq: u64) -> rusqlite::Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "UPDATE {TABLE} SET hits = hits + 1, access_seq = ?1, last_used = ?2 WHERE key = ?3"
            ),
            params![access_seq as i64, Utc::now().to_rfc3339(), key],
        )?;
        Ok(())
    }

    /// Met à jour la taille occupée par une entrée
    pub fn set_size(&self, key: &str, size: u64) -> rusqlite::Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            &format!("UPDATE {TABLE} SET size = ?1 WHERE key = ?2"),
            params![size as i64, key],
        )?;
        Ok(())
    }

    /// Supprime une entrée
    pub fn delete(&self, key: &str) -> rusqlite::Result<()> {
        let conn = self.conn.lock();
        conn.execute(&format!("DELETE FROM {TABLE} WHERE key = ?1"), [key])?;
        Ok(())
    }

    /// Récupère une entrée par sa clé
    pub fn get(&self, key: &str) -> rusqlite::Result<Option<IndexRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT key, source, file_name, size, hits, access_seq, last_used FROM {TABLE} WHERE key = ?1"
        ))?;
        let mut rows = stmt.query_map([key], row_to_entry)?;
        rows.next().transpose()
    }

    /// Toutes les entrées, de la moins récemment utilisée à la plus récente
    pub fn all(&self) -> rusqlite::Result<Vec<IndexRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT key, source, file_name, size, hits, access_seq, last_used FROM {TABLE} ORDER BY access_seq ASC"
        ))?;
        let rows = stmt.query_map([], row_to_entry)?;
        rows.collect()
    }

    /// Nombre d'entrées
    pub fn count(&self) -> rusqlite::Result<usize> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {TABLE}"), [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<IndexRow> {
    Ok(IndexRow {
        key: row.get(0)?,
        source: row.get(1)?,
        file_name: row.get(2)?,
        size: row.get::<_, i64>(3)?.max(0) as u64,
        hits: row.get(4)?,
        access_seq: row.get::<_, i64>(5)?.max(0) as u64,
        last_used: row.get(6)?,
    })
}
