//! Paradas de ônibus

use tracing::debug;

use super::{parse_collection, point_lon_lat, properties};
use crate::properties::{pick_str, pick_str_or, stop, Properties};
use crate::{Stop, TransformResult, WfsError};

const ACTIVE_VALUES: &[&str] = &["1", "S", "SIM", "ATIVA", "ATIVO", "TRUE", "T"];
const INACTIVE_VALUES: &[&str] = &["0", "N", "NAO", "NÃO", "INATIVA", "INATIVO", "FALSE", "F"];

/// Statut d'activité d'une parada
///
/// Un statut absent ou inconnu compte comme actif : l'absence du champ
/// amont ne dit rien de fiable sur la parada.
pub fn stop_is_active(props: &Properties) -> bool {
    let Some(value) = pick_str(props, stop::STATUS) else {
        return true;
    };
    let value = value.to_uppercase();
    if ACTIVE_VALUES.contains(&value.as_str()) {
        return true;
    }
    !INACTIVE_VALUES.contains(&value.as_str())
}

/// Transforme le payload "Paradas de onibus"
pub fn transform_stops(body: &[u8]) -> Result<TransformResult<Stop>, WfsError> {
    let raw = parse_collection(body)?;
    let mut result = TransformResult {
        items: Vec::with_capacity(raw.features.len()),
        errors: raw.errors,
    };
    let mut inactive = 0usize;

    for (index, feature) in &raw.features {
        let props = properties(feature);

        if !stop_is_active(&props) {
            inactive += 1;
            continue;
        }

        let (lon, lat) = match point_lon_lat(*index, feature) {
            Ok(p) => p,
            Err(e) => {
                result.errors.push(e);
                continue;
            }
        };

        let code = pick_str(&props, stop::CODE).unwrap_or_else(|| format!("{}-{}", lat, lon));

        result.items.push(Stop {
            id: code.clone(),
            code,
            name: pick_str_or(&props, stop::NAME, stop::DEFAULT_NAME),
            lat,
            lon,
        });
    }

    debug!(
        stops = result.items.len(),
        inactive,
        skipped = result.skipped(),
        "Transformed stops"
    );
    Ok(result)
}
