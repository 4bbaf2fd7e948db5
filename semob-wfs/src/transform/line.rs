//! Tracés des linhas

use tracing::debug;

use super::{parse_collection, properties};
use crate::line_code::any_matches;
use crate::properties::{collect_str, line, pick_f64, pick_str};
use crate::reproject;
use crate::{GeometryKind, Line, TransformResult, WfsError};

impl Line {
    /// Vrai si le code (ou l'un des alias) correspond à `code`
    pub fn matches_code(&self, code: &str) -> bool {
        any_matches(
            std::iter::once(self.code.as_str()).chain(self.aliases.iter().map(String::as_str)),
            code,
        )
    }
}

/// Linhas dont le code correspond
pub fn lines_matching<'a>(lines: &'a [Line], code: &str) -> Vec<&'a Line> {
    lines.iter().filter(|l| l.matches_code(code)).collect()
}

/// Transforme le payload "Linhas de onibus"
///
/// Les MultiLineString sont aplaties ; chaque sommet passe par la
/// détection de système, les sommets hors zone sont retirés.
pub fn transform_lines(body: &[u8]) -> Result<TransformResult<Line>, WfsError> {
    let raw = parse_collection(body)?;
    let mut result = TransformResult {
        items: Vec::with_capacity(raw.features.len()),
        errors: raw.errors,
    };
    let mut dropped_vertices = 0usize;

    for (index, feature) in &raw.features {
        let index = *index;
        let props = properties(feature);

        let Some(code) = pick_str(&props, line::CODE) else {
            result.errors.push(WfsError::malformed(index, "missing line code"));
            continue;
        };

        let Some(geometry) = feature.geometry.as_ref() else {
            result.errors.push(WfsError::malformed(index, "missing geometry"));
            continue;
        };

        let (raw_coords, geometry_kind): (Vec<&Vec<f64>>, GeometryKind) = match &geometry.value {
            geojson::Value::LineString(ls) => (ls.iter().collect(), GeometryKind::LineString),
            geojson::Value::MultiLineString(mls) => (
                mls.iter().flatten().collect(),
                GeometryKind::MultiLineString,
            ),
            _ => {
                result
                    .errors
                    .push(WfsError::malformed(index, "expected LineString or MultiLineString"));
                continue;
            }
        };

        let total = raw_coords.len();
        let coordinates: Vec<[f64; 2]> = raw_coords
            .into_iter()
            .filter(|p| p.len() >= 2)
            .filter_map(|p| reproject::to_lon_lat(p[0], p[1]).ok())
            .map(|(lon, lat)| [lon, lat])
            .collect();
        dropped_vertices += total - coordinates.len();

        if coordinates.is_empty() {
            result
                .errors
                .push(WfsError::invalid_geometry(index, "no vertex inside the region"));
            continue;
        }

        result.items.push(Line {
            id: code.clone(),
            name: code.clone(),
            service_label: pick_str(&props, line::SERVICE).unwrap_or_else(|| code.clone()),
            coordinates,
            geometry_kind,
            fare: pick_f64(&props, line::FARE),
            aliases: collect_str(&props, line::MATCH),
            code,
        });
    }

    debug!(
        lines = result.items.len(),
        skipped = result.skipped(),
        dropped_vertices,
        "Transformed lines"
    );
    Ok(result)
}
