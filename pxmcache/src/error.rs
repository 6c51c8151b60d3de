//! Gestion des erreurs du cache

use pxmarchive::ExtractionError;
use std::io;
use thiserror::Error;

/// Type Result personnalisé pour pxmcache
pub type Result<T> = std::result::Result<T, AcquisitionError>;

/// Échecs d'acquisition d'une source
///
/// Le type est `Clone` : un même résultat est partagé entre tous les
/// appelants d'un téléchargement mutualisé, les causes sont donc conservées
/// sous forme de texte.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionError {
    /// Erreur de transport (connexion, timeout, flux interrompu)
    #[error("Network error while fetching {source_id}: {message}")]
    Network { source_id: String, message: String },

    /// Le serveur distant a refusé la requête
    #[error("{source_id} rejected by remote service (HTTP {status}): {message}")]
    ServiceRejected {
        source_id: String,
        status: u16,
        message: String,
    },

    /// Plus de place sur le disque du cache
    #[error("Disk full while storing {source_id}: {message}")]
    DiskFull { source_id: String, message: String },

    /// Autre erreur d'écriture dans le répertoire du cache
    #[error("Storage error for {source_id}: {message}")]
    Storage { source_id: String, message: String },

    /// Source de service non résolue, le cache ne sait télécharger que des URLs
    #[error("{source_id} must be resolved to a URL before it can be fetched")]
    NotFetchable { source_id: String },

    /// Erreur de la base d'index
    #[error("Cache index error: {0}")]
    Index(String),
}

impl AcquisitionError {
    /// Crée une erreur depuis un code de statut HTTP
    pub fn from_status_code(source_id: &str, status: u16, message: impl Into<String>) -> Self {
        Self::ServiceRejected {
            source_id: source_id.to_string(),
            status,
            message: message.into(),
        }
    }

    /// Classe une erreur d'I/O locale (disque plein ou autre)
    pub fn from_io(source_id: &str, error: &io::Error) -> Self {
        if is_disk_full(error) {
            Self::DiskFull {
                source_id: source_id.to_string(),
                message: error.to_string(),
            }
        } else {
            Self::Storage {
                source_id: source_id.to_string(),
                message: error.to_string(),
            }
        }
    }

    pub fn network(source_id: &str, message: impl ToString) -> Self {
        Self::Network {
            source_id: source_id.to_string(),
            message: message.to_string(),
        }
    }

    /// Une nouvelle tentative peut réussir
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AcquisitionError::NotFetchable { .. })
    }

    /// Identifiant de la source concernée, si l'erreur en porte un
    pub fn source_id(&self) -> Option<&str> {
        match self {
            AcquisitionError::Network { source_id, .. }
            | AcquisitionError::ServiceRejected { source_id, .. }
            | AcquisitionError::DiskFull { source_id, .. }
            | AcquisitionError::Storage { source_id, .. }
            | AcquisitionError::NotFetchable { source_id } => Some(source_id),
            AcquisitionError::Index(_) => None,
        }
    }
}

impl From<rusqlite::Error> for AcquisitionError {
    fn from(e: rusqlite::Error) -> Self {
        AcquisitionError::Index(e.to_string())
    }
}

fn is_disk_full(error: &io::Error) -> bool {
    // ENOSPC
    error.kind() == io::ErrorKind::StorageFull || error.raw_os_error() == Some(28)
}

/// Échecs de `resolve_bundle` : acquisition de l'archive puis extraction
#[derive(Error, Debug)]
pub enum BundleError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}
