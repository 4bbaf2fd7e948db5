//! Types d'erreurs pour le crate semob-wfs

use thiserror::Error;

/// Erreurs pouvant survenir lors de la transformation d'un payload WFS
#[derive(Debug, Error)]
pub enum WfsError {
    /// Le payload n'est pas une FeatureCollection exploitable
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Une feature n'a pas pu être lue (elle est ignorée, le reste est conservé)
    #[error("Malformed feature #{index}: {reason}")]
    MalformedData { index: usize, reason: String },

    /// Coordonnées hors de la zone plausible (feature ignorée silencieusement)
    #[error("Invalid geometry for feature #{index}: {reason}")]
    InvalidGeometry { index: usize, reason: String },
}

impl WfsError {
    /// Crée une erreur de feature malformée avec contexte
    pub fn malformed(index: usize, reason: impl Into<String>) -> Self {
        Self::MalformedData {
            index,
            reason: reason.into(),
        }
    }

    /// Crée une erreur de géométrie invalide
    pub fn invalid_geometry(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            index,
            reason: reason.into(),
        }
    }

    /// Indique si l'erreur concerne une seule feature (dégradation gracieuse)
    pub fn is_per_feature(&self) -> bool {
        matches!(self, Self::MalformedData { .. } | Self::InvalidGeometry { .. })
    }
}

impl From<serde_json::Error> for WfsError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidPayload(e.to_string())
    }
}
