//! Transformation des FeatureCollection WFS en entités typées
//!
//! Une feature illisible ou hors zone est ignorée (erreur non fatale
//! collectée dans `TransformResult::errors`), le reste de la collection
//! est conservé.

pub mod bus;
pub mod fleet;
pub mod line;
pub mod stop;

pub use bus::{transform_buses, BusFilter};
pub use fleet::{main_operator, transform_fleet, FleetEntry, FleetIndex};
pub use line::{lines_matching, transform_lines};
pub use stop::{stop_is_active, transform_stops};

use geojson::Feature;
use serde_json::Value;

use crate::properties::Properties;
use crate::reproject;
use crate::WfsError;

/// Features lues du payload, avec leur index d'origine
pub(crate) struct RawCollection {
    pub features: Vec<(usize, Feature)>,
    pub errors: Vec<WfsError>,
}

/// Lit une FeatureCollection feature par feature
///
/// Seule une enveloppe illisible est fatale ; une feature malformée
/// est remontée comme `WfsError::MalformedData`.
pub(crate) fn parse_collection(body: &[u8]) -> Result<RawCollection, WfsError> {
    let root: Value = serde_json::from_slice(body)?;

    let Value::Object(mut root) = root else {
        return Err(WfsError::InvalidPayload("expected a JSON object".into()));
    };

    if let Some(kind) = root.get("type").and_then(Value::as_str) {
        if kind != "FeatureCollection" {
            return Err(WfsError::InvalidPayload(format!(
                "expected FeatureCollection, got {}",
                kind
            )));
        }
    }

    let features = match root.remove("features") {
        Some(Value::Array(features)) => features,
        Some(_) => return Err(WfsError::InvalidPayload("`features` is not an array".into())),
        None => return Err(WfsError::InvalidPayload("missing `features`".into())),
    };

    let mut parsed = Vec::with_capacity(features.len());
    let mut errors = Vec::new();
    for (index, value) in features.into_iter().enumerate() {
        match serde_json::from_value::<Feature>(value) {
            Ok(feature) => parsed.push((index, feature)),
            Err(e) => errors.push(WfsError::malformed(index, e.to_string())),
        }
    }

    Ok(RawCollection {
        features: parsed,
        errors,
    })
}

/// Propriétés d'une feature (vide si absentes)
pub(crate) fn properties(feature: &Feature) -> Properties {
    feature.properties.clone().unwrap_or_default()
}

/// Position `(lon, lat)` d'une feature Point, reprojetée si besoin
pub(crate) fn point_lon_lat(index: usize, feature: &Feature) -> Result<(f64, f64), WfsError> {
    let geometry = feature
        .geometry
        .as_ref()
        .ok_or_else(|| WfsError::malformed(index, "missing geometry"))?;

    let (x, y) = match &geometry.value {
        geojson::Value::Point(position) if position.len() >= 2 => (position[0], position[1]),
        geojson::Value::Point(_) => {
            return Err(WfsError::malformed(index, "Point with fewer than 2 ordinates"))
        }
        _ => return Err(WfsError::malformed(index, "expected Point geometry")),
    };

    reproject::to_lon_lat(x, y).map_err(|r| WfsError::invalid_geometry(index, r.to_string()))
}
