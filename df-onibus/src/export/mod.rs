//! Export des entités transformées

pub mod geojson;

pub use self::geojson::{export_snapshot, ExportSummary};
