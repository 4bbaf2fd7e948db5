//! Export GeoJSON d'un instantané (ônibus, paradas, linhas)

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use serde::Serialize;

use semob_wfs::{Bus, Line, Stop};

/// Nombre de features écrites par fichier
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub buses: usize,
    pub stops: usize,
    pub lines: usize,
}

/// Propriétés d'une entité, sans les champs portés par la géométrie
fn properties<T: Serialize>(entity: &T, geometry_fields: &[&str]) -> Result<JsonObject> {
    let value = serde_json::to_value(entity).context("Failed to serialize entity")?;
    let serde_json::Value::Object(mut map) = value else {
        anyhow::bail!("Entity did not serialize to an object");
    };
    for field in geometry_fields {
        map.remove(*field);
    }
    Ok(map)
}

fn feature(id: &str, geometry: Value, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(geometry)),
        id: Some(geojson::feature::Id::String(id.to_string())),
        properties: Some(properties),
        foreign_members: None,
    }
}

fn collection(features: Vec<Feature>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

pub fn buses_to_collection(buses: &[Bus]) -> Result<FeatureCollection> {
    let features = buses
        .iter()
        .map(|b| {
            let props = properties(b, &["lat", "lon"])?;
            Ok(feature(&b.id, Value::Point(vec![b.lon, b.lat]), props))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(collection(features))
}

pub fn stops_to_collection(stops: &[Stop]) -> Result<FeatureCollection> {
    let features = stops
        .iter()
        .map(|s| {
            let props = properties(s, &["lat", "lon"])?;
            Ok(feature(&s.id, Value::Point(vec![s.lon, s.lat]), props))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(collection(features))
}

/// Les tracés aplatis sont écrits en LineString
pub fn lines_to_collection(lines: &[Line]) -> Result<FeatureCollection> {
    let features = lines
        .iter()
        .map(|l| {
            let props = properties(l, &["coordinates"])?;
            let coords = l.coordinates.iter().map(|c| c.to_vec()).collect();
            Ok(feature(&l.id, Value::LineString(coords), props))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(collection(features))
}

/// Écrit une FeatureCollection dans un fichier
pub fn write_collection(collection: &FeatureCollection, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)
        .context(format!("Failed to create file: {}", output_path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, collection)
        .context(format!("Failed to write {}", output_path.display()))?;
    writer.flush()?;
    Ok(())
}

/// Écrit `buses.geojson`, `stops.geojson` et `lines.geojson` dans `output`
pub fn export_snapshot(
    output: &Path,
    buses: &[Bus],
    stops: &[Stop],
    lines: &[Line],
) -> Result<ExportSummary> {
    std::fs::create_dir_all(output)
        .context(format!("Failed to create directory: {}", output.display()))?;

    write_collection(&buses_to_collection(buses)?, &output.join("buses.geojson"))?;
    write_collection(&stops_to_collection(stops)?, &output.join("stops.geojson"))?;
    write_collection(&lines_to_collection(lines)?, &output.join("lines.geojson"))?;

    Ok(ExportSummary {
        buses: buses.len(),
        stops: stops.len(),
        lines: lines.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use semob_wfs::GeometryKind;

    fn bus() -> Bus {
        Bus {
            id: "331457".into(),
            line_code: "0.110".into(),
            prefix: "331457".into(),
            lat: -15.79,
            lon: -47.88,
            speed_kmh: 32.5,
            direction: "IDA".into(),
            local_timestamp: String::new(),
            fare: None,
            active: true,
            operator: Some(semob_wfs::Operator {
                name: "URBI".into(),
                service: "Básico".into(),
                bus_type: "Padron".into(),
                reference_date: "2024-05-01".into(),
                color: Some("#2b97bbff".into()),
            }),
        }
    }

    #[test]
    fn test_bus_feature() {
        let fc = buses_to_collection(&[bus()]).unwrap();
        let value = serde_json::to_value(&fc).unwrap();
        let f = &value["features"][0];
        assert_eq!(f["id"], "331457");
        assert_eq!(f["geometry"]["type"], "Point");
        assert_eq!(f["geometry"]["coordinates"][0], -47.88);
        assert_eq!(f["properties"]["lineCode"], "0.110");
        assert!(f["properties"].get("lat").is_none());
        assert_eq!(f["properties"]["operator"]["color"], "#2b97bbff");
    }

    #[test]
    fn test_line_feature() {
        let line = Line {
            id: "0.110".into(),
            code: "0.110".into(),
            name: "0.110".into(),
            service_label: "W3 Sul".into(),
            coordinates: vec![[-47.9, -15.8], [-47.8, -15.7]],
            geometry_kind: GeometryKind::MultiLineString,
            fare: Some(5.5),
            aliases: vec![],
        };
        let fc = lines_to_collection(&[line]).unwrap();
        let value = serde_json::to_value(&fc).unwrap();
        let f = &value["features"][0];
        assert_eq!(f["geometry"]["type"], "LineString");
        assert_eq!(f["geometry"]["coordinates"][1][1], -15.7);
        assert_eq!(f["properties"]["geometryKind"], "MultiLineString");
        assert!(f["properties"].get("coordinates").is_none());
    }

    #[test]
    fn test_export_snapshot() {
        let dir = std::env::temp_dir().join(format!("df-onibus-export-{}", std::process::id()));
        let summary = export_snapshot(&dir, &[bus()], &[], &[]).unwrap();
        assert_eq!(summary.buses, 1);

        let content = std::fs::read_to_string(dir.join("buses.geojson")).unwrap();
        assert!(content.contains(r#""type":"FeatureCollection""#));
        assert!(content.contains("331457"));
        assert!(dir.join("stops.geojson").exists());
        assert!(dir.join("lines.geojson").exists());

        std::fs::remove_dir_all(dir).ok();
    }
}
