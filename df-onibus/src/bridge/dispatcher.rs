//! Dispatcher côté hôte
//!
//! Émet les commandes vers la surface, retient le dernier `updateData` tant
//! que la surface n'a pas signalé `mapReady`, et proxifie ses requêtes HTTP.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use semob_wfs::query::ensure_max_features;
use semob_wfs::MapBounds;

use super::{BridgeError, HostCommand, SurfaceEvent, UpdateData, ViewEvent};
use crate::fetch::{
    feature_cap, is_live_positions, FetchClient, FetchError, FetchOptions, Transport,
};
use crate::Config;

#[derive(Default)]
struct Readiness {
    ready: bool,
    /// Un seul emplacement : seul le plus récent compte
    queued: Option<UpdateData>,
}

pub struct Dispatcher<T> {
    commands: mpsc::UnboundedSender<HostCommand>,
    client: FetchClient<T>,
    readiness: Mutex<Readiness>,
    /// Au-delà, la surface reçoit un 408 plutôt que d'attendre les retries
    proxy_timeout: Duration,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(commands: mpsc::UnboundedSender<HostCommand>, client: FetchClient<T>) -> Self {
        Self {
            commands,
            client,
            readiness: Mutex::new(Readiness::default()),
            proxy_timeout: Config::default().bridge_timeout(),
        }
    }

    pub fn with_proxy_timeout(mut self, timeout: Duration) -> Self {
        self.proxy_timeout = timeout;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Readiness> {
        self.readiness.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_ready(&self) -> bool {
        self.lock().ready
    }

    /// Envoie une commande sans attendre d'accusé
    ///
    /// Avant `mapReady`, un `updateData` remplace celui déjà en attente.
    pub fn send(&self, command: HostCommand) -> Result<(), BridgeError> {
        let HostCommand::UpdateData { data } = command else {
            return self.deliver(command);
        };

        let mut readiness = self.lock();
        if !readiness.ready {
            if readiness.queued.replace(data).is_some() {
                debug!("Queued updateData superseded");
            }
            return Ok(());
        }
        // Verrou tenu pendant l'envoi : l'ordre avec un flush concurrent est préservé
        self.deliver(HostCommand::UpdateData { data })
    }

    fn deliver(&self, command: HostCommand) -> Result<(), BridgeError> {
        self.commands.send(command).map_err(|_| BridgeError::Closed)
    }

    /// Traite un événement de la surface
    ///
    /// Les événements de vue sont renvoyés à l'appelant ; les logs et les
    /// requêtes proxifiées sont traités ici.
    pub fn handle_event(&self, event: SurfaceEvent) -> Option<ViewEvent> {
        match event {
            SurfaceEvent::Log { tag, msg, extra } => {
                debug!(target: "surface", tag = %tag, extra = ?extra, "{}", msg);
                None
            }
            SurfaceEvent::MapReady => {
                self.mark_ready();
                Some(ViewEvent::Ready)
            }
            SurfaceEvent::MapError { error } => {
                warn!(error = %error, "Map surface reported an error");
                None
            }
            SurfaceEvent::BoundsChanged {
                north,
                south,
                east,
                west,
            } => Some(ViewEvent::BoundsChanged(MapBounds::new(north, south, east, west))),
            SurfaceEvent::CenterChanged { lat, lon } => Some(ViewEvent::CenterChanged { lat, lon }),
            SurfaceEvent::ZoomChanged { zoom } => Some(ViewEvent::ZoomChanged(zoom)),
            SurfaceEvent::Fetch { id, url } => {
                self.proxy_fetch(id, url);
                None
            }
            SurfaceEvent::BusSelected { line_code } => Some(ViewEvent::LineSelected(line_code)),
            SurfaceEvent::SelectionCleared => Some(ViewEvent::SelectionCleared),
        }
    }

    fn mark_ready(&self) {
        let mut readiness = self.lock();
        if readiness.ready {
            debug!("Duplicate mapReady");
            return;
        }
        readiness.ready = true;
        info!("Map surface ready");

        if let Some(data) = readiness.queued.take() {
            debug!(buses = data.buses.len(), stops = data.stops.len(), "Flushing queued updateData");
            if let Err(e) = self.deliver(HostCommand::UpdateData { data }) {
                warn!(error = %e, "Could not flush queued updateData");
            }
        }
    }

    /// Exécute un fetch demandé par la surface et lui renvoie la réponse
    ///
    /// Les positions temps réel ne passent jamais par le cache ; un plafond
    /// `maxFeatures` est ajouté si l'URL n'en porte pas. La réponse part au
    /// plus tard après `proxy_timeout`.
    fn proxy_fetch(&self, id: u64, url: String) {
        let url = ensure_max_features(&url, feature_cap(&url));
        let options = FetchOptions {
            bypass_cache: is_live_positions(&url),
        };
        let client = self.client.clone();
        let commands = self.commands.clone();
        let deadline = self.proxy_timeout;

        tokio::spawn(async move {
            let response = match tokio::time::timeout(deadline, client.fetch(&url, options)).await {
                Ok(response) => response,
                Err(_) => {
                    warn!(id, url = %url, "Proxied fetch exceeded the bridge timeout");
                    FetchError::Timeout(deadline).into_response()
                }
            };
            debug!(id, url = %url, status = response.status, "Proxied fetch done");
            let reply = HostCommand::FetchResponse {
                id,
                ok: response.ok,
                status: response.status,
                text: response.text(),
            };
            if commands.send(reply).is_err() {
                debug!(id, "Surface gone before the proxied reply");
            }
        });
    }
}
