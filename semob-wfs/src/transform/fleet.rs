//! Cadastre de la frota : véhicule → operadora

use std::collections::HashMap;

use tracing::debug;

use super::{parse_collection, properties};
use crate::properties::{fleet, pick_str, pick_str_or};
use crate::{Bus, Operator, TransformResult, WfsError};

/// Operadoras principales : motif cherché dans le nom, couleur d'affichage
pub const MAIN_OPERATORS: &[(&str, &str)] = &[
    ("URBI", "#2b97bbff"),
    ("PIONEIRA", "#ffff00"),
    ("PIRACICABANA", "#006400"),
    ("MARECHAL", "#fb6900f0"),
    ("SÃO JOSÉ", "#938326"),
    ("UNIÃO TRANSPORTE BRASÍLIA", "cyan"),
];

/// Entrée du cadastre pour un véhicule
#[derive(Debug, Clone, PartialEq)]
pub struct FleetEntry {
    pub vehicle_number: String,
    pub operator: String,
    pub service: String,
    pub bus_type: String,
    pub reference_date: String,
}

impl FleetEntry {
    pub fn to_operator(&self) -> Operator {
        let (name, color) = main_operator(&self.operator);
        Operator {
            name,
            service: self.service.clone(),
            bus_type: self.bus_type.clone(),
            reference_date: self.reference_date.clone(),
            color,
        }
    }
}

/// Réduit le nom d'une operadora principale et lui associe sa couleur
///
/// Une operadora inconnue garde son nom complet, sans couleur.
pub fn main_operator(name: &str) -> (String, Option<String>) {
    let upper = name.to_uppercase();
    match MAIN_OPERATORS.iter().find(|(key, _)| upper.contains(key)) {
        Some((key, color)) => (key.to_string(), Some(color.to_string())),
        None => (name.to_string(), None),
    }
}

/// Transforme le payload du cadastre de la frota
///
/// La géométrie n'est pas lue ; une entrée sans numéro de véhicule est ignorée.
pub fn transform_fleet(body: &[u8]) -> Result<TransformResult<FleetEntry>, WfsError> {
    let raw = parse_collection(body)?;
    let mut result = TransformResult {
        items: Vec::with_capacity(raw.features.len()),
        errors: raw.errors,
    };

    for (index, feature) in &raw.features {
        let props = properties(feature);
        let Some(vehicle_number) = pick_str(&props, fleet::VEHICLE) else {
            result
                .errors
                .push(WfsError::malformed(*index, "missing numero_veiculo"));
            continue;
        };

        result.items.push(FleetEntry {
            vehicle_number,
            operator: pick_str_or(&props, fleet::OPERATOR, ""),
            service: pick_str_or(&props, fleet::SERVICE, ""),
            bus_type: pick_str_or(&props, fleet::BUS_TYPE, ""),
            reference_date: pick_str_or(&props, fleet::REFERENCE_DATE, ""),
        });
    }

    debug!(
        vehicles = result.items.len(),
        skipped = result.skipped(),
        "Transformed fleet registry"
    );
    Ok(result)
}

/// Index du cadastre par numéro de véhicule
#[derive(Debug, Clone, Default)]
pub struct FleetIndex {
    by_vehicle: HashMap<String, FleetEntry>,
}

impl FleetIndex {
    /// En cas de doublon, la dernière entrée l'emporte
    pub fn new(entries: Vec<FleetEntry>) -> Self {
        let by_vehicle = entries
            .into_iter()
            .map(|e| (e.vehicle_number.clone(), e))
            .collect();
        Self { by_vehicle }
    }

    pub fn len(&self) -> usize {
        self.by_vehicle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_vehicle.is_empty()
    }

    pub fn get(&self, vehicle_number: &str) -> Option<&FleetEntry> {
        self.by_vehicle.get(vehicle_number.trim())
    }

    /// Rattache l'operadora de chaque ônibus via son prefixo
    ///
    /// Renvoie le nombre d'ônibus trouvés dans le cadastre.
    pub fn enrich(&self, buses: &mut [Bus]) -> usize {
        let mut matched = 0;
        for bus in buses.iter_mut() {
            bus.operator = self.get(&bus.prefix).map(FleetEntry::to_operator);
            if bus.operator.is_some() {
                matched += 1;
            }
        }
        matched
    }
}
