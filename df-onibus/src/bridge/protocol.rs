//! Messages échangés avec la surface de rendu
//!
//! Chaque message est un objet JSON avec un discriminant `type`.

use serde::{Deserialize, Serialize};

use semob_wfs::{Bus, Line, MapBounds, Stop};

/// Position de l'utilisateur
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserLocation {
    pub lat: f64,
    pub lon: f64,
}

/// Instantané complet poussé à la surface
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateData {
    pub buses: Vec<Bus>,
    pub stops: Vec<Stop>,
    pub lines: Vec<Line>,
    pub user_location: Option<UserLocation>,
    pub show_buses: bool,
    pub show_stops: bool,
    pub show_only_active_buses: bool,
    pub selected_lines: Vec<String>,
}

/// Commandes hôte → surface (fire-and-forget)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostCommand {
    Recenter {
        lat: f64,
        lon: f64,
        zoom: f64,
    },
    SetUserPosition {
        lat: f64,
        lon: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        zoom: Option<f64>,
    },
    SetUserMarkerVisible {
        visible: bool,
    },
    #[serde(rename_all = "camelCase")]
    SetBusRoute {
        line_code: String,
    },
    UpdateData {
        data: UpdateData,
    },
    /// Calque de tracé, indépendant des ônibus et paradas
    #[serde(rename_all = "camelCase")]
    ShowRoute {
        line_code: String,
        lines: Vec<Line>,
    },
    ClearRoute,
    ShowLoading {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<f64>,
    },
    HideLoading,
    #[serde(rename_all = "camelCase")]
    ShowToast {
        message: String,
        duration_ms: u64,
    },
    /// Réponse à un `fetch` proxifié
    FetchResponse {
        id: u64,
        ok: bool,
        status: u16,
        text: String,
    },
}

/// Événements surface → hôte
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SurfaceEvent {
    Log {
        #[serde(default)]
        tag: String,
        #[serde(default)]
        msg: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extra: Option<serde_json::Value>,
    },
    MapReady,
    MapError {
        #[serde(default)]
        error: serde_json::Value,
    },
    BoundsChanged {
        north: f64,
        south: f64,
        east: f64,
        west: f64,
    },
    CenterChanged {
        lat: f64,
        lon: f64,
    },
    ZoomChanged {
        zoom: f64,
    },
    /// La surface ne peut pas sortir sur le réseau : l'hôte fait l'appel
    Fetch {
        id: u64,
        url: String,
    },
    #[serde(rename_all = "camelCase")]
    BusSelected {
        line_code: String,
    },
    SelectionCleared,
}

/// Événement de vue remonté au coordinateur
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    Ready,
    BoundsChanged(MapBounds),
    CenterChanged { lat: f64, lon: f64 },
    ZoomChanged(f64),
    LineSelected(String),
    SelectionCleared,
}
