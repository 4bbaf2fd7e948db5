//! Politique de cache et de retry

use std::time::Duration;

use reqwest::Url;

use crate::Config;

/// Classe de fraîcheur d'une URL, déduite du jeu de données visé
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlClass {
    /// Tracés de linhas, horários
    Routes,
    /// Paradas
    Stops,
    /// Cadastre de la frota (operadoras)
    Fleet,
    /// Positions temps réel, jamais en cache
    Live,
}

impl TtlClass {
    /// Classe une URL d'après son paramètre `typeName` (décodé, insensible à la casse)
    ///
    /// Une URL illisible ou sans `typeName` est considérée temps réel.
    pub fn classify(url: &str) -> Self {
        let Some(type_name) = type_name(url) else {
            return TtlClass::Live;
        };

        if type_name.contains("posição") {
            TtlClass::Live
        } else if type_name.contains("operadora") {
            TtlClass::Fleet
        } else if type_name.contains("linhas") || type_name.contains("horários") {
            TtlClass::Routes
        } else if type_name.contains("paradas") {
            TtlClass::Stops
        } else {
            // "frota", "posição" et tout le reste
            TtlClass::Live
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, TtlClass::Live)
    }
}

/// Valeur décodée et en minuscules du paramètre `typeName`
pub fn type_name(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let type_name = parsed
        .query_pairs()
        .find(|(k, _)| k.eq_ignore_ascii_case("typeName"))
        .map(|(_, v)| v.to_lowercase());
    type_name
}

/// Vrai si l'URL vise les positions temps réel de la frota
pub fn is_live_positions(url: &str) -> bool {
    TtlClass::classify(url).is_live()
        && type_name(url).is_some_and(|t| t.contains("frota") || t.contains("posição"))
}

/// Plafond `maxFeatures` appliqué aux requêtes qui n'en portent pas
pub fn feature_cap(url: &str) -> u32 {
    if is_live_positions(url) {
        300
    } else if TtlClass::classify(url) == TtlClass::Stops {
        150
    } else {
        50
    }
}

/// Bornes appliquées par le client
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub max_response_bytes: u64,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub max_cache_entries: usize,
    pub ttl_routes: Duration,
    pub ttl_stops: Duration,
    pub ttl_fleet: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl FetchPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_response_bytes: config.max_response_bytes,
            request_timeout: config.request_timeout(),
            max_attempts: config.max_attempts,
            retry_backoff: config.retry_backoff(),
            max_cache_entries: config.max_cache_entries,
            ttl_routes: config.ttl_routes(),
            ttl_stops: config.ttl_stops(),
            ttl_fleet: config.ttl_fleet(),
        }
    }

    pub fn ttl(&self, class: TtlClass) -> Duration {
        match class {
            TtlClass::Routes => self.ttl_routes,
            TtlClass::Stops => self.ttl_stops,
            TtlClass::Fleet => self.ttl_fleet,
            TtlClass::Live => Duration::ZERO,
        }
    }

    /// Attente avant la tentative suivante (linéaire : `attempt × backoff`)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff * attempt
    }
}
