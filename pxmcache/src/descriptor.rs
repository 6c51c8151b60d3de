//! Descripteurs de sources et clés de cache

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

/// Provenance d'un média
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// URL HTTP(S) ou `file://` directe
    Url,
    /// Identifiant d'un service d'hébergement vidéo
    VideoService,
    /// Identifiant (ou requête) d'un service de streaming audio
    AudioService,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Url => "url",
            SourceKind::VideoService => "video",
            SourceKind::AudioService => "audio",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Description immuable d'une source à résoudre
///
/// Sa clé de cache est dérivée de `kind` et `identifier` uniquement ;
/// `resolved_hint` est un raccourci vers un fichier local déjà connu.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceDescriptor {
    kind: SourceKind,
    identifier: String,
    resolved_hint: Option<PathBuf>,
}

impl SourceDescriptor {
    pub fn new(kind: SourceKind, identifier: impl Into<String>) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
            resolved_hint: None,
        }
    }

    /// Source désignée directement par son URL
    pub fn url(url: impl Into<String>) -> Self {
        Self::new(SourceKind::Url, url)
    }

    pub fn video_service(identifier: impl Into<String>) -> Self {
        Self::new(SourceKind::VideoService, identifier)
    }

    pub fn audio_service(identifier: impl Into<String>) -> Self {
        Self::new(SourceKind::AudioService, identifier)
    }

    /// Associe un chemin local déjà résolu
    pub fn with_resolved_hint(mut self, path: impl Into<PathBuf>) -> Self {
        self.resolved_hint = Some(path.into());
        self
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn resolved_hint(&self) -> Option<&Path> {
        self.resolved_hint.as_deref()
    }

    /// Identifiant lisible utilisé dans les erreurs et les logs (`kind:identifier`)
    pub fn source_id(&self) -> String {
        format!("{}:{}", self.kind, self.identifier)
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::derive(self.kind, &self.identifier)
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.identifier)
    }
}

/// Clé d'une entrée du cache : 32 caractères hexadécimaux
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Calcule la clé `SHA-256("{kind}:{identifier}")` tronquée à 16 octets
    pub fn derive(kind: SourceKind, identifier: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(identifier.as_bytes());
        let result = hasher.finalize();
        CacheKey(hex::encode(&result[..16]))
    }

    /// Reconstruit une clé lue depuis l'index ou un nom de fichier
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() == 32 && s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
            Some(CacheKey(s.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
