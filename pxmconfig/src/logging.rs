//! Initialisation du système de logging
//!
//! Construit un subscriber `tracing` : un filtre `EnvFilter` (niveau de la
//! configuration, surchargé par `RUST_LOG`) puis une couche console
//! optionnelle. Les bibliothèques du workspace n'installent jamais de
//! subscriber elles-mêmes, c'est à l'application hôte d'appeler
//! [`init_logging`].

use crate::settings::LoggingSettings;
use anyhow::{anyhow, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Construit le filtre à partir de `RUST_LOG` ou, à défaut, du niveau configuré
pub fn build_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installe le subscriber global
///
/// # Errors
///
/// Échoue si un subscriber global est déjà installé.
pub fn init_logging(settings: &LoggingSettings) -> Result<()> {
    let subscriber = Registry::default().with(build_filter(settings));

    let result = if settings.console {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(settings.ansi),
            )
            .try_init()
    } else {
        subscriber.try_init()
    };

    result.map_err(|e| anyhow!("Cannot install tracing subscriber: {}", e))
}
