//! Requêtes proxifiées côté surface
//!
//! La surface ne sort pas sur le réseau : elle émet `fetch{id,url}` et attend
//! le `fetchResponse` de même `id`. Une requête sans réponse est rejetée et
//! retirée à l'expiration du délai.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::{BridgeError, HostCommand, SurfaceEvent};

/// Réponse livrée par l'hôte
#[derive(Debug, Clone, PartialEq)]
pub struct ProxiedResponse {
    pub ok: bool,
    pub status: u16,
    pub text: String,
}

/// Table des requêtes en attente, indexée par identifiant
pub struct PendingRequests {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<ProxiedResponse>>>,
    events: mpsc::UnboundedSender<SurfaceEvent>,
    timeout: Duration,
}

impl PendingRequests {
    pub fn new(events: mpsc::UnboundedSender<SurfaceEvent>, timeout: Duration) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            events,
            timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<ProxiedResponse>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Demande à l'hôte de récupérer `url`
    pub async fn request(&self, url: &str) -> Result<ProxiedResponse, BridgeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.request_with_id(id, url).await
    }

    /// Variante avec identifiant imposé
    pub async fn request_with_id(&self, id: u64, url: &str) -> Result<ProxiedResponse, BridgeError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.lock();
            if pending.contains_key(&id) {
                return Err(BridgeError::DuplicateRequest(id));
            }
            pending.insert(id, tx);
        }

        let event = SurfaceEvent::Fetch {
            id,
            url: url.to_string(),
        };
        if self.events.send(event).is_err() {
            self.lock().remove(&id);
            return Err(BridgeError::Closed);
        }
        debug!(id, url = %url, "Proxied fetch requested");

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(BridgeError::Closed),
            Err(_) => {
                self.lock().remove(&id);
                warn!(id, url = %url, "Proxied fetch timed out");
                Err(BridgeError::Timeout {
                    id,
                    after: self.timeout,
                })
            }
        }
    }

    /// Livre une réponse ; faux si l'identifiant n'est plus attendu
    pub fn deliver(&self, id: u64, ok: bool, status: u16, text: String) -> bool {
        let Some(tx) = self.lock().remove(&id) else {
            debug!(id, "Reply for unknown or expired request");
            return false;
        };
        tx.send(ProxiedResponse { ok, status, text }).is_ok()
    }

    /// Traite une commande reçue ; vrai si c'était une réponse attendue
    pub fn handle_command(&self, command: HostCommand) -> bool {
        match command {
            HostCommand::FetchResponse {
                id,
                ok,
                status,
                text,
            } => self.deliver(id, ok, status, text),
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_reply_resolves_request() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let table = Arc::new(PendingRequests::new(tx, Duration::from_secs(15)));

        let requester = {
            let table = table.clone();
            tokio::spawn(async move { table.request("http://x/ows").await })
        };

        let Some(SurfaceEvent::Fetch { id, url }) = rx.recv().await else {
            panic!("expected a fetch event");
        };
        assert_eq!(url, "http://x/ows");
        assert_eq!(table.len(), 1);

        assert!(table.deliver(id, true, 200, "{}".into()));
        let response = requester.await.unwrap().unwrap();
        assert_eq!(response.status, 200);
        assert!(table.is_empty());

        // Seconde livraison : plus rien n'attend
        assert!(!table.deliver(id, true, 200, "{}".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_rejects_and_cleans_up() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let table = PendingRequests::new(tx, Duration::from_secs(15));

        let err = table.request("http://x/ows").await.unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { id: 1, .. }));
        assert!(table.is_empty());
        assert!(!table.deliver(1, true, 200, String::new()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_id_is_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let table = Arc::new(PendingRequests::new(tx, Duration::from_secs(15)));

        let first = {
            let table = table.clone();
            tokio::spawn(async move { table.request_with_id(42, "http://x/a").await })
        };
        tokio::task::yield_now().await;

        let err = table.request_with_id(42, "http://x/b").await.unwrap_err();
        assert_eq!(err, BridgeError::DuplicateRequest(42));

        assert!(table.handle_command(HostCommand::FetchResponse {
            id: 42,
            ok: false,
            status: 0,
            text: String::new(),
        }));
        assert!(!first.await.unwrap().unwrap().ok);
    }

    #[tokio::test]
    async fn test_closed_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let table = PendingRequests::new(tx, Duration::from_secs(15));
        assert_eq!(table.request("http://x").await.unwrap_err(), BridgeError::Closed);
        assert!(table.is_empty());
    }
}
