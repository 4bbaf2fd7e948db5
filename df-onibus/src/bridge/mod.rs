//! Pont asynchrone avec la surface de rendu
//!
//! Deux canaux typés : commandes hôte → surface, événements surface → hôte.
//! Aucun appel synchrone ne traverse le pont.

pub mod dispatcher;
pub mod pending;
pub mod protocol;
pub mod stdio;
pub mod wire;

pub use dispatcher::Dispatcher;
pub use pending::{PendingRequests, ProxiedResponse};
pub use protocol::{HostCommand, SurfaceEvent, UpdateData, UserLocation, ViewEvent};

use std::time::Duration;

use thiserror::Error;

/// Erreurs du pont
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Aucune réponse dans le délai imparti
    #[error("No reply for request {id} after {after:?}")]
    Timeout { id: u64, after: Duration },

    /// L'autre côté du pont est fermé
    #[error("Bridge channel closed")]
    Closed,

    /// Message illisible ou de type inconnu
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Identifiant déjà en attente
    #[error("Request {0} is already pending")]
    DuplicateRequest(u64),
}
