//! Types de données pour le crate semob-wfs

use geo::{coord, BoundingRect, Centroid, HaversineDistance, LineString, Point, Rect};
use serde::{Deserialize, Serialize};

use crate::WfsError;

/// Résultat d'une transformation : entités valides + erreurs non fatales
#[derive(Debug)]
pub struct TransformResult<T> {
    /// Entités extraites, dans l'ordre du payload
    pub items: Vec<T>,

    /// Features ignorées (malformées ou hors zone)
    pub errors: Vec<WfsError>,
}

impl<T> TransformResult<T> {
    pub fn skipped(&self) -> usize {
        self.errors.len()
    }
}

impl<T> Default for TransformResult<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// Position d'un ônibus (dernière position connue de la frota)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bus {
    /// Identifiant (le prefixo du véhicule)
    pub id: String,

    /// Code de la linha desservie (vide si inconnu)
    pub line_code: String,

    /// Prefixo du véhicule
    pub prefix: String,

    pub lat: f64,
    pub lon: f64,

    /// Vitesse en km/h (0 si illisible)
    pub speed_kmh: f64,

    /// Sentido (ida / volta / circular...)
    pub direction: String,

    /// Horodatage local brut fourni par l'amont
    pub local_timestamp: String,

    /// Tarifa si publiée avec la position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fare: Option<f64>,

    /// Vrai ssi une propriété de linha est présente et exploitable
    pub active: bool,

    /// Operadora d'après le cadastre de la frota
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<Operator>,
}

impl Bus {
    pub fn position(&self) -> Point {
        Point::new(self.lon, self.lat)
    }
}

/// Operadora rattachée à un véhicule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operator {
    /// Nom réduit pour les operadoras principales, complet sinon
    pub name: String,
    pub service: String,
    pub bus_type: String,
    pub reference_date: String,

    /// Couleur d'affichage, seulement pour les operadoras principales
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Parada de ônibus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stop {
    pub id: String,

    /// Code de la parada, ou clé synthétique `"lat-lon"` à défaut
    pub code: String,

    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl Stop {
    pub fn position(&self) -> Point {
        Point::new(self.lon, self.lat)
    }
}

/// Type de géométrie d'origine d'une linha
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryKind {
    LineString,
    MultiLineString,
}

/// Tracé d'une linha de ônibus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    pub id: String,
    pub code: String,
    pub name: String,

    /// Libellé du serviço (retombe sur le code)
    pub service_label: String,

    /// Sommets `[lon, lat]` en degrés, MultiLineString aplatie
    pub coordinates: Vec<[f64; 2]>,

    pub geometry_kind: GeometryKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fare: Option<f64>,

    /// Toutes les valeurs non vides des propriétés identifiant la linha
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl Line {
    /// Tracé sous forme de `LineString` geo
    pub fn to_line_string(&self) -> LineString {
        self.coordinates
            .iter()
            .map(|&[x, y]| coord! { x: x, y: y })
            .collect()
    }

    /// Emprise du tracé, `None` si aucun sommet
    pub fn bounding_rect(&self) -> Option<Rect> {
        self.to_line_string().bounding_rect()
    }
}

/// Emprise de la carte en degrés géographiques
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapBounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl MapBounds {
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    /// Rectangle min/max normalisé (résiste aux coins inversés)
    pub fn to_rect(&self) -> Rect {
        // Rect::new normalise déjà min/max
        Rect::new(
            coord! { x: self.west, y: self.south },
            coord! { x: self.east, y: self.north },
        )
    }

    /// Centre de l'emprise
    pub fn center(&self) -> Point {
        self.to_rect().centroid()
    }

    /// Longueur de la diagonale en mètres
    pub fn diagonal_m(&self) -> f64 {
        let rect = self.to_rect();
        Point::from(rect.min()).haversine_distance(&Point::from(rect.max()))
    }

    /// Indique si l'emprise a bougé de plus de `threshold_m` par rapport à `previous`
    ///
    /// Compare la distance entre les centres et la variation de la diagonale.
    pub fn moved_beyond(&self, previous: &MapBounds, threshold_m: f64) -> bool {
        let shift = self.center().haversine_distance(&previous.center());
        let extent_change = (self.diagonal_m() - previous.diagonal_m()).abs();
        shift > threshold_m || extent_change > threshold_m
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        let rect = self.to_rect();
        lon >= rect.min().x && lon <= rect.max().x && lat >= rect.min().y && lat <= rect.max().y
    }
}
