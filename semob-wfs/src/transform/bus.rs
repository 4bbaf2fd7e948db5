//! Positions de la frota

use tracing::debug;

use super::{parse_collection, point_lon_lat, properties};
use crate::line_code::codes_match;
use crate::properties::{bus, pick_f64, pick_meaningful, pick_str, pick_str_or};
use crate::{Bus, TransformResult, WfsError};

/// Transforme le payload "Última posição da frota"
pub fn transform_buses(body: &[u8]) -> Result<TransformResult<Bus>, WfsError> {
    let raw = parse_collection(body)?;
    let mut result = TransformResult {
        items: Vec::with_capacity(raw.features.len()),
        errors: raw.errors,
    };

    for (index, feature) in &raw.features {
        let props = properties(feature);

        let prefix = match pick_str(&props, bus::PREFIX) {
            Some(p) => p,
            None => {
                result.errors.push(WfsError::malformed(*index, "missing prefixo"));
                continue;
            }
        };

        let (lon, lat) = match point_lon_lat(*index, feature) {
            Ok(p) => p,
            Err(e) => {
                result.errors.push(e);
                continue;
            }
        };

        let line_code = pick_meaningful(&props, bus::LINE);

        result.items.push(Bus {
            id: prefix.clone(),
            active: line_code.is_some(),
            line_code: line_code.unwrap_or_default(),
            prefix,
            lat,
            lon,
            speed_kmh: pick_f64(&props, bus::SPEED).unwrap_or(0.0),
            direction: pick_str_or(&props, bus::DIRECTION, ""),
            local_timestamp: pick_str_or(&props, bus::TIMESTAMP, ""),
            fare: pick_f64(&props, bus::FARE),
            operator: None,
        });
    }

    debug!(
        buses = result.items.len(),
        skipped = result.skipped(),
        "Transformed bus positions"
    );
    Ok(result)
}

/// Filtres côté client sur les positions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BusFilter {
    /// Ne garder que les ônibus rattachés à une linha
    pub only_active: bool,

    /// Codes de linha sélectionnés (vide = toutes)
    pub selected_lines: Vec<String>,
}

impl BusFilter {
    pub fn accepts(&self, bus: &Bus) -> bool {
        if !self.selected_lines.is_empty()
            && !self
                .selected_lines
                .iter()
                .any(|code| codes_match(&bus.line_code, code))
        {
            return false;
        }
        !self.only_active || bus.active
    }

    pub fn apply(&self, buses: Vec<Bus>) -> Vec<Bus> {
        buses.into_iter().filter(|b| self.accepts(b)).collect()
    }
}
