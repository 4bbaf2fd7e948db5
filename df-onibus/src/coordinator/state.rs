//! État observable du coordinateur

use semob_wfs::{Bus, Line, Stop};

use crate::bridge::UserLocation;

/// Jeu de données rafraîchi par le coordinateur
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Buses,
    Stops,
}

/// `Idle → Fetching → (Idle | Error)`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FetchState {
    #[default]
    Idle,
    Fetching,
    Error(String),
}

impl FetchState {
    pub fn is_fetching(&self) -> bool {
        matches!(self, FetchState::Fetching)
    }
}

/// Dernières données affichées ; chaque champ est remplacé en bloc
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub buses: Vec<Bus>,
    pub stops: Vec<Stop>,
    /// Tracés de la linha sélectionnée
    pub route: Vec<Line>,
    pub selected_line: Option<String>,
    pub user_location: Option<UserLocation>,
}
