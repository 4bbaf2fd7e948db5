//! Reprojection légère en Rust pur (sans dépendances externes)
//!
//! Le geoserver SEMOB renvoie selon les couches soit des degrés (EPSG:4326),
//! soit du SIRGAS 2000 / UTM 23S (EPSG:31983) même quand `srsName` est demandé.
//! Chaque paire brute est donc classée puis ramenée en degrés :
//! - Géographique : utilisée telle quelle
//! - UTM 23S : inverse de Mercator transverse
//!
//! Le résultat doit tomber dans la boîte de plausibilité de la région.

mod ellipsoid;
mod utm;

pub use ellipsoid::GRS80;
pub use utm::{utm_to_geographic, UtmZone};

/// Point en coordonnées géographiques (radians)
#[derive(Debug, Clone, Copy)]
pub struct Geographic {
    /// Longitude en radians
    pub lon: f64,
    /// Latitude en radians
    pub lat: f64,
}

impl Geographic {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Convertit en degrés
    pub fn to_degrees(self) -> (f64, f64) {
        (self.lon.to_degrees(), self.lat.to_degrees())
    }

    /// Crée depuis des degrés
    pub fn from_degrees(lon_deg: f64, lat_deg: f64) -> Self {
        Self {
            lon: lon_deg.to_radians(),
            lat: lat_deg.to_radians(),
        }
    }
}

/// Bande d'eastings UTM 23S couvrant le DF et l'entorno
pub const UTM_EASTING_RANGE: (f64, f64) = (100_000.0, 400_000.0);

/// Bande de northings UTM 23S couvrant le DF et l'entorno
pub const UTM_NORTHING_RANGE: (f64, f64) = (8_000_000.0, 9_200_000.0);

/// Système de coordonnées détecté pour une paire brute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateKind {
    /// Déjà en degrés (lon, lat)
    Geographic,
    /// Easting / northing UTM 23S
    Utm23S,
    /// Ni l'un ni l'autre
    Unknown,
}

impl CoordinateKind {
    /// Heuristique par plages numériques
    pub fn detect(x: f64, y: f64) -> Self {
        if !x.is_finite() || !y.is_finite() {
            return Self::Unknown;
        }
        if x > UTM_EASTING_RANGE.0
            && x < UTM_EASTING_RANGE.1
            && y > UTM_NORTHING_RANGE.0
            && y < UTM_NORTHING_RANGE.1
        {
            return Self::Utm23S;
        }
        if x.abs() <= 180.0 && y.abs() <= 90.0 {
            return Self::Geographic;
        }
        Self::Unknown
    }
}

/// Boîte de plausibilité (Brésil central, large)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlausibilityBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl PlausibilityBox {
    pub const CENTRAL_BRAZIL: PlausibilityBox = PlausibilityBox {
        min_lat: -35.0,
        max_lat: 10.0,
        min_lon: -75.0,
        max_lon: -25.0,
    };

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

/// Raison du rejet d'une paire de coordonnées
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    UnknownSystem,
    OutsideRegion,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::UnknownSystem => write!(f, "coordinates are neither degrees nor UTM 23S"),
            Rejection::OutsideRegion => write!(f, "coordinates outside the plausibility box"),
        }
    }
}

/// Ramène une paire brute en `(lon, lat)` degrés
pub fn to_lon_lat(x: f64, y: f64) -> Result<(f64, f64), Rejection> {
    let (lon, lat) = match CoordinateKind::detect(x, y) {
        CoordinateKind::Geographic => (x, y),
        CoordinateKind::Utm23S => utm_to_geographic(x, y, UtmZone::ZONE_23S).to_degrees(),
        CoordinateKind::Unknown => return Err(Rejection::UnknownSystem),
    };

    if lon.is_nan() || lat.is_nan() || !PlausibilityBox::CENTRAL_BRAZIL.contains(lon, lat) {
        return Err(Rejection::OutsideRegion);
    }
    Ok((lon, lat))
}
