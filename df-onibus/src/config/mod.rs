//! Configuration du système
//!
//! Ordre de priorité : valeurs par défaut → fichier JSON optionnel →
//! variables d'environnement `DFBUS_*` → options CLI (appliquées par `cli`).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

/// URL de base du geoserver SEMOB
pub const DEFAULT_BASE_URL: &str = "http://geoserver.semob.df.gov.br/geoserver/semob/ows";

/// Configuration principale
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// URL de base du service WFS
    pub base_url: String,

    /// Fragments de query string par jeu de données
    pub endpoints: Endpoints,

    /// Cadence de rafraîchissement des ônibus (secondes)
    pub poll_interval_secs: u64,

    /// Taille maximale d'une réponse (octets)
    pub max_response_bytes: u64,

    /// Nombre maximal d'entrées dans le cache
    pub max_cache_entries: usize,

    /// Timeout par tentative (secondes)
    pub request_timeout_secs: u64,

    pub max_attempts: u32,

    /// Pas du backoff linéaire (millisecondes)
    pub retry_backoff_ms: u64,

    /// TTL des tracés de linhas (secondes)
    pub ttl_routes_secs: u64,

    /// TTL des paradas (secondes)
    pub ttl_stops_secs: u64,

    /// TTL du cadastre de la frota (secondes)
    pub ttl_fleet_secs: u64,

    /// Déplacement minimal de l'emprise avant de recharger les paradas (mètres)
    pub movement_threshold_m: f64,

    /// Délai de réponse d'une requête proxifiée par la surface (secondes)
    pub bridge_timeout_secs: u64,

    /// Masquer les ônibus sans linha
    pub show_only_active_buses: bool,

    /// Codes de linha à afficher (vide = toutes)
    pub selected_lines: Vec<String>,
}

/// Fragments de query string WFS (sans `?`)
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Endpoints {
    pub buses: String,
    pub stops: String,
    pub lines: String,
    /// Cadastre de la frota (véhicule → operadora)
    pub fleet: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            buses: "service=WFS&version=1.0.0&request=GetFeature\
                    &typeName=semob%3A%C3%9Altima%20posi%C3%A7%C3%A3o%20da%20frota\
                    &outputFormat=application%2Fjson&maxFeatures=500"
                .into(),
            stops: "service=WFS&version=1.0.0&request=GetFeature\
                    &typeName=semob%3AParadas%20de%20onibus\
                    &outputFormat=application%2Fjson&maxFeatures=200"
                .into(),
            lines: "service=WFS&version=1.0.0&request=GetFeature\
                    &typeName=semob%3ALinhas%20de%20onibus\
                    &outputFormat=application%2Fjson&maxFeatures=100"
                .into(),
            fleet: "service=WFS&version=1.0.0&request=GetFeature\
                    &typeName=semob%3AFrota%20por%20operadora\
                    &outputFormat=application%2Fjson"
                .into(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            endpoints: Endpoints::default(),
            poll_interval_secs: 10,
            max_response_bytes: 5 * 1024 * 1024,
            max_cache_entries: 100,
            request_timeout_secs: 15,
            max_attempts: 3,
            retry_backoff_ms: 1000,
            ttl_routes_secs: 6 * 3600,
            ttl_stops_secs: 30 * 60,
            ttl_fleet_secs: 3 * 24 * 3600,
            movement_threshold_m: 250.0,
            bridge_timeout_secs: 15,
            show_only_active_buses: false,
            selected_lines: Vec::new(),
        }
    }
}

impl Config {
    /// Charge une configuration depuis un fichier JSON (champs absents = défaut)
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config JSON")
    }

    /// Défauts, fichier optionnel puis environnement
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Surcharge par variables d'environnement
    ///
    /// Une valeur illisible est ignorée, la valeur courante est conservée.
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = var("DFBUS_BASE_URL").filter(|s| !s.trim().is_empty()) {
            self.base_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(secs) = var("DFBUS_POLL_SECS").and_then(|s| s.parse().ok()) {
            self.poll_interval_secs = secs;
        }
        if let Some(bytes) = var("DFBUS_MAX_RESPONSE_BYTES").and_then(|s| s.parse().ok()) {
            self.max_response_bytes = bytes;
        }
        if let Some(entries) = var("DFBUS_CACHE_ENTRIES").and_then(|s| s.parse().ok()) {
            self.max_cache_entries = entries;
        }
        if let Some(meters) = var("DFBUS_MOVEMENT_THRESHOLD_M").and_then(|s| s.parse().ok()) {
            self.movement_threshold_m = meters;
        }
        if let Some(flag) = var("DFBUS_ONLY_ACTIVE").and_then(|s| parse_flag(&s)) {
            self.show_only_active_buses = flag;
        }
    }

    pub fn poll_interval(&self) -> Duration {
        // Un intervalle nul ferait paniquer tokio::time::interval
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn ttl_routes(&self) -> Duration {
        Duration::from_secs(self.ttl_routes_secs)
    }

    pub fn ttl_stops(&self) -> Duration {
        Duration::from_secs(self.ttl_stops_secs)
    }

    pub fn ttl_fleet(&self) -> Duration {
        Duration::from_secs(self.ttl_fleet_secs)
    }

    pub fn bridge_timeout(&self) -> Duration {
        Duration::from_secs(self.bridge_timeout_secs)
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "sim" => Some(true),
        "0" | "false" | "no" | "off" | "nao" | "não" => Some(false),
        _ => None,
    }
}
