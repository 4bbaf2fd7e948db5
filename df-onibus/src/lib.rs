//! # df-onibus
//!
//! Hôte de la carte des ônibus du Distrito Federal : récupère les couches du
//! geoserver SEMOB, les transforme et les échange avec une surface de rendu
//! embarquée par messages asynchrones.
//!
//! ## Features
//!
//! - Client HTTP avec cache TTL, coalescence des requêtes, plafond de taille et retry
//! - Jeu de linhas gardé en mémoire, rechargé une fois sur recherche infructueuse
//! - Pont typé hôte/surface avec proxy HTTP et file `updateData` à un emplacement
//! - Rafraîchissement périodique des ônibus, paradas selon l'emprise
//! - Export GeoJSON
//!
//! ## Usage CLI
//!
//! ```bash
//! # Pont stdio pour la surface de rendu
//! df-onibus serve --only-active
//!
//! # Export GeoJSON ponctuel
//! df-onibus snapshot --output ./out --bbox -48.0,-15.9,-47.8,-15.7
//!
//! # Tracés d'une linha
//! df-onibus route 0.110
//! ```

pub mod bridge;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod export;
pub mod fetch;
pub mod geodata;

pub use config::Config;
pub use coordinator::RefreshCoordinator;
pub use fetch::{FetchClient, FetchOptions, FetchResponse};
pub use geodata::GeodataService;
