//! # semob-wfs
//!
//! Transformation des données WFS du geoserver SEMOB-DF (ônibus, paradas, linhas)
//! en entités typées.
//!
//! ## Features
//!
//! - Lecture feature par feature : une feature illisible n'invalide pas la collection
//! - Détection du système de coordonnées et inverse UTM 23S (SIRGAS 2000) en Rust pur
//! - Résolution des attributs par listes de clés candidates
//! - Comparaison des codes de linha tolérante au zéro-padding
//! - Rattachement des ônibus à leur operadora via le cadastre de la frota
//!
//! ## Usage
//!
//! ```rust,ignore
//! use semob_wfs::transform::{transform_buses, BusFilter};
//!
//! let result = transform_buses(&body)?;
//! println!("{} ônibus, {} ignorés", result.items.len(), result.skipped());
//!
//! let filter = BusFilter { only_active: true, ..Default::default() };
//! let buses = filter.apply(result.items);
//! ```

pub mod error;
pub mod line_code;
pub mod properties;
pub mod query;
pub mod reproject;
pub mod transform;
pub mod types;

pub use error::WfsError;
pub use line_code::codes_match;
pub use types::{Bus, GeometryKind, Line, MapBounds, Operator, Stop, TransformResult};
