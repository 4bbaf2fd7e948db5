//! Coordination des rafraîchissements
//!
//! Les ônibus sont rechargés à cadence fixe ; les paradas seulement quand
//! l'emprise a suffisamment bougé ; le tracé d'une linha à la sélection.
//! Un échec garde l'instantané précédent et affiche un toast.

pub mod state;

pub use state::{DataKind, FetchState, Snapshot};

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use geo::{BoundingRect, MultiLineString, Rect};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use semob_wfs::transform::BusFilter;
use semob_wfs::{Bus, Line, MapBounds, Stop};

use crate::bridge::{Dispatcher, HostCommand, SurfaceEvent, UpdateData, UserLocation, ViewEvent};
use crate::fetch::Transport;
use crate::geodata::{GeodataError, GeodataService};
use crate::Config;

const DEFAULT_ZOOM: f64 = 13.0;
const ERROR_TOAST_MS: u64 = 3000;
const CLEARED_TOAST_MS: u64 = 1500;

/// Paramètres du coordinateur
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub poll_interval: Duration,
    pub movement_threshold_m: f64,
    pub show_only_active_buses: bool,
    pub selected_lines: Vec<String>,
    pub show_buses: bool,
    pub show_stops: bool,
}

impl From<&Config> for CoordinatorConfig {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            movement_threshold_m: config.movement_threshold_m,
            show_only_active_buses: config.show_only_active_buses,
            selected_lines: config.selected_lines.clone(),
            show_buses: true,
            show_stops: true,
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Résultat d'un chargement mené hors de la boucle d'événements
enum Refresh {
    Lines(Result<usize, GeodataError>),
    Buses(Result<Vec<Bus>, GeodataError>),
    Stops {
        bounds: MapBounds,
        result: Result<Vec<Stop>, GeodataError>,
    },
    Route {
        code: String,
        result: Result<Vec<Line>, GeodataError>,
    },
}

type Job = BoxFuture<'static, Refresh>;

pub struct RefreshCoordinator<T> {
    service: Arc<GeodataService<T>>,
    dispatcher: Dispatcher<T>,
    config: CoordinatorConfig,
    snapshot: Snapshot,
    buses_state: FetchState,
    stops_state: FetchState,
    /// Emprise du dernier chargement de paradas réussi
    stops_bounds: Option<MapBounds>,
    view_bounds: Option<MapBounds>,
    zoom: f64,
    /// Chargements en cours, lancés par `run`
    jobs: JoinSet<Refresh>,
}

impl<T: Transport> RefreshCoordinator<T> {
    pub fn new(
        service: Arc<GeodataService<T>>,
        dispatcher: Dispatcher<T>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            service,
            dispatcher,
            config,
            snapshot: Snapshot::default(),
            buses_state: FetchState::Idle,
            stops_state: FetchState::Idle,
            stops_bounds: None,
            view_bounds: None,
            zoom: DEFAULT_ZOOM,
            jobs: JoinSet::new(),
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn state(&self, kind: DataKind) -> &FetchState {
        match kind {
            DataKind::Buses => &self.buses_state,
            DataKind::Stops => &self.stops_state,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher<T> {
        &self.dispatcher
    }

    /// Boucle principale, jusqu'à la fermeture du canal d'événements
    ///
    /// Les chargements tournent en tâches de fond : la boucle continue de
    /// traiter les événements de la surface pendant qu'un fetch est en cours.
    pub async fn run(&mut self, mut events: mpsc::UnboundedReceiver<SurfaceEvent>) {
        let preload = self.preload_job();
        self.jobs.spawn(preload);

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.on_tick(),
                Some(joined) = self.jobs.join_next() => self.on_joined(joined),
                event = events.recv() => match event {
                    Some(event) => self.on_event(event),
                    None => break,
                },
            }
        }

        if !self.jobs.is_empty() {
            debug!(pending = self.jobs.len(), "Abandoning pending refreshes");
            self.jobs.shutdown().await;
            self.release_guards();
        }
        info!("Surface event channel closed, coordinator stopped");
    }

    /// Traite un événement de la surface sans attendre les chargements qu'il déclenche
    pub fn on_event(&mut self, event: SurfaceEvent) {
        let Some(view) = self.dispatcher.handle_event(event) else {
            return;
        };
        match view {
            ViewEvent::Ready => debug!("Surface ready"),
            ViewEvent::BoundsChanged(bounds) => {
                self.view_bounds = Some(bounds);
                if let Some(job) = self.stops_job(bounds) {
                    self.jobs.spawn(job);
                }
            }
            ViewEvent::CenterChanged { lat, lon } => debug!(lat, lon, "Center changed"),
            ViewEvent::ZoomChanged(zoom) => self.zoom = zoom,
            ViewEvent::LineSelected(code) => {
                let job = self.route_job(code);
                self.jobs.spawn(job);
            }
            ViewEvent::SelectionCleared => self.clear_selection(),
        }
    }

    /// Attend la fin des chargements en cours et applique leurs résultats
    pub async fn settle(&mut self) {
        while let Some(joined) = self.jobs.join_next().await {
            self.on_joined(joined);
        }
    }

    fn on_tick(&mut self) {
        if let Some(job) = self.buses_job() {
            self.jobs.spawn(job);
        }
    }

    fn on_joined(&mut self, joined: Result<Refresh, JoinError>) {
        match joined {
            Ok(refresh) => {
                let stops_loaded = matches!(&refresh, Refresh::Stops { result: Ok(_), .. });
                self.apply(refresh);
                // La vue a pu bouger pendant le chargement
                if stops_loaded {
                    if let Some(view) = self.view_bounds {
                        if let Some(job) = self.stops_job(view) {
                            self.jobs.spawn(job);
                        }
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Refresh task failed");
                // Tâche inconnue : aucune garde ne doit rester bloquée
                self.release_guards();
            }
        }
    }

    fn release_guards(&mut self) {
        for state in [&mut self.buses_state, &mut self.stops_state] {
            if state.is_fetching() {
                *state = FetchState::Idle;
            }
        }
    }

    /// Recharge les positions et attend le résultat
    pub async fn refresh_buses(&mut self) {
        if let Some(job) = self.buses_job() {
            let refresh = job.await;
            self.apply(refresh);
        }
    }

    /// Emprise de la carte modifiée
    ///
    /// Les paradas ne sont rechargées que si l'emprise s'est éloignée du
    /// dernier chargement réussi de plus du seuil.
    pub async fn on_bounds_changed(&mut self, bounds: MapBounds) {
        self.view_bounds = Some(bounds);
        if let Some(job) = self.stops_job(bounds) {
            let refresh = job.await;
            self.apply(refresh);
        }
    }

    /// Affiche le tracé d'une linha et centre la carte dessus
    ///
    /// Renvoie le nombre de tracés trouvés.
    pub async fn select_line(&mut self, code: &str) -> Result<usize, GeodataError> {
        let result = self.service.lines_for_code(code).await;
        self.show_route(code, result)
    }

    /// Retire le calque de tracé sans toucher aux autres
    pub fn clear_selection(&mut self) {
        if self.snapshot.selected_line.take().is_none() && self.snapshot.route.is_empty() {
            return;
        }
        self.snapshot.route.clear();
        self.send(HostCommand::ClearRoute);
        self.toast("Rota limpa".to_string(), CLEARED_TOAST_MS);
        self.push_update();
    }

    /// Charge le jeu de linhas en avance (échec non bloquant)
    pub async fn preload_lines(&mut self) {
        let refresh = self.preload_job().await;
        self.apply(refresh);
    }

    pub fn set_user_location(&mut self, lat: f64, lon: f64) {
        self.snapshot.user_location = Some(UserLocation { lat, lon });
        self.send(HostCommand::SetUserPosition {
            lat,
            lon,
            zoom: None,
        });
        self.push_update();
    }

    /// Chargement des positions, `None` si un chargement est déjà en cours
    fn buses_job(&mut self) -> Option<Job> {
        if self.buses_state.is_fetching() {
            debug!("Buses already loading, tick skipped");
            return None;
        }
        self.buses_state = FetchState::Fetching;

        let service = Arc::clone(&self.service);
        let bounds = self.view_bounds;
        Some(
            async move {
                let result: Result<Vec<Bus>, GeodataError> = async {
                    let mut buses = service.get_buses_with_operators(bounds.as_ref()).await?;
                    if service.cached_lines().await.is_some() {
                        service.fill_fares(&mut buses).await;
                    }
                    Ok(buses)
                }
                .await;
                Refresh::Buses(result)
            }
            .boxed(),
        )
    }

    /// Chargement des paradas si l'emprise a assez bougé et qu'aucun n'est en cours
    fn stops_job(&mut self, bounds: MapBounds) -> Option<Job> {
        if let Some(previous) = &self.stops_bounds {
            if !bounds.moved_beyond(previous, self.config.movement_threshold_m) {
                debug!("Bounds within threshold, stops kept");
                return None;
            }
        }
        if self.stops_state.is_fetching() {
            debug!("Stops already loading");
            return None;
        }
        self.stops_state = FetchState::Fetching;

        let service = Arc::clone(&self.service);
        Some(
            async move {
                let result = service.get_stops(Some(&bounds)).await;
                Refresh::Stops { bounds, result }
            }
            .boxed(),
        )
    }

    fn route_job(&self, code: String) -> Job {
        let service = Arc::clone(&self.service);
        async move {
            let result = service.lines_for_code(&code).await;
            Refresh::Route { code, result }
        }
        .boxed()
    }

    fn preload_job(&self) -> Job {
        let service = Arc::clone(&self.service);
        async move { Refresh::Lines(service.get_lines().await.map(|lines| lines.len())) }.boxed()
    }

    fn apply(&mut self, refresh: Refresh) {
        match refresh {
            Refresh::Lines(Ok(count)) => info!(lines = count, "Line dataset preloaded"),
            Refresh::Lines(Err(e)) => warn!(error = %e, "Line dataset preload failed"),
            Refresh::Buses(Ok(buses)) => {
                let filter = BusFilter {
                    only_active: self.config.show_only_active_buses,
                    selected_lines: self.config.selected_lines.clone(),
                };
                let total = buses.len();
                self.snapshot.buses = filter.apply(buses);
                debug!(total, shown = self.snapshot.buses.len(), "Buses refreshed");
                self.buses_state = FetchState::Idle;
                self.push_update();
            }
            Refresh::Buses(Err(e)) => self.fail(DataKind::Buses, "Falha ao atualizar ônibus", &e),
            Refresh::Stops {
                bounds,
                result: Ok(stops),
            } => {
                debug!(stops = stops.len(), "Stops refreshed");
                self.snapshot.stops = stops;
                self.stops_bounds = Some(bounds);
                self.stops_state = FetchState::Idle;
                self.push_update();
            }
            Refresh::Stops { result: Err(e), .. } => {
                self.fail(DataKind::Stops, "Falha ao carregar paradas", &e)
            }
            Refresh::Route { code, result } => {
                // L'échec est déjà signalé par un toast
                let _ = self.show_route(&code, result);
            }
        }
    }

    fn show_route(
        &mut self,
        code: &str,
        result: Result<Vec<Line>, GeodataError>,
    ) -> Result<usize, GeodataError> {
        let lines = match result {
            Ok(lines) => lines,
            Err(e) => {
                self.toast(format!("Falha ao carregar rota: {}", e), ERROR_TOAST_MS);
                return Err(e);
            }
        };

        if lines.is_empty() {
            self.toast(
                format!("Nenhuma rota encontrada para a linha {}", code),
                ERROR_TOAST_MS,
            );
            return Ok(0);
        }

        info!(code, routes = lines.len(), "Route selected");
        self.send(HostCommand::SetBusRoute {
            line_code: code.to_string(),
        });
        self.send(HostCommand::ShowRoute {
            line_code: code.to_string(),
            lines: lines.clone(),
        });
        if let Some(rect) = routes_extent(&lines) {
            let center = rect.center();
            self.send(HostCommand::Recenter {
                lat: center.y,
                lon: center.x,
                zoom: self.zoom,
            });
        }

        let count = lines.len();
        self.snapshot.route = lines;
        self.snapshot.selected_line = Some(code.to_string());
        self.push_update();
        Ok(count)
    }

    /// Renvoie l'instantané complet à la surface
    fn push_update(&self) {
        let data = UpdateData {
            buses: self.snapshot.buses.clone(),
            stops: self.snapshot.stops.clone(),
            lines: self.snapshot.route.clone(),
            user_location: self.snapshot.user_location,
            show_buses: self.config.show_buses,
            show_stops: self.config.show_stops,
            show_only_active_buses: self.config.show_only_active_buses,
            selected_lines: self.config.selected_lines.clone(),
        };
        self.send(HostCommand::UpdateData { data });
    }

    fn fail(&mut self, kind: DataKind, prefix: &str, error: &GeodataError) {
        warn!(kind = ?kind, error = %error, "Refresh failed, keeping previous data");
        let state = FetchState::Error(error.to_string());
        match kind {
            DataKind::Buses => self.buses_state = state,
            DataKind::Stops => self.stops_state = state,
        }
        self.toast(format!("{}: {}", prefix, error), ERROR_TOAST_MS);
    }

    fn toast(&self, message: String, duration_ms: u64) {
        self.send(HostCommand::ShowToast {
            message,
            duration_ms,
        });
    }

    fn send(&self, command: HostCommand) {
        if let Err(e) = self.dispatcher.send(command) {
            debug!(error = %e, "Command dropped");
        }
    }
}

/// Emprise cumulée des tracés
fn routes_extent(lines: &[Line]) -> Option<Rect> {
    MultiLineString::new(lines.iter().map(Line::to_line_string).collect()).bounding_rect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchClient, FetchError, FetchPolicy, RawResponse};
    use std::sync::Mutex;

    const BUSES: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","geometry":{"type":"Point","coordinates":[-47.88,-15.79]},
         "properties":{"prefixo":"331457","cd_linha":"0.110"}},
        {"type":"Feature","geometry":{"type":"Point","coordinates":[-47.9,-15.8]},
         "properties":{"prefixo":"221001","linha":""}}]}"#;
    const STOPS: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","geometry":{"type":"Point","coordinates":[-47.9,-15.8]},
         "properties":{"parada":"1001"}}]}"#;
    const LINES: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","geometry":{"type":"LineString","coordinates":[[-48.0,-15.9],[-47.8,-15.7]]},
         "properties":{"cd_linha":"0.110","tarifa":5.5}}]}"#;

    /// Sert les trois couches ; `fail_buses` simule une panne de la frota
    #[derive(Default)]
    struct Geoserver {
        requests: Mutex<Vec<String>>,
        fail_buses: Mutex<bool>,
    }

    impl Transport for Arc<Geoserver> {
        async fn get(&self, url: &str) -> Result<RawResponse, FetchError> {
            self.requests.lock().unwrap().push(url.to_string());
            if url.contains("operadora") {
                return Ok(RawResponse::from_bytes(404, "not found"));
            }
            let body = if url.contains("frota") {
                if *self.fail_buses.lock().unwrap() {
                    return Ok(RawResponse::from_bytes(500, "upstream down"));
                }
                BUSES
            } else if url.contains("Paradas") {
                STOPS
            } else {
                LINES
            };
            Ok(RawResponse::from_bytes(200, body))
        }
    }

    fn coordinator(
        config: CoordinatorConfig,
    ) -> (
        RefreshCoordinator<Arc<Geoserver>>,
        mpsc::UnboundedReceiver<HostCommand>,
        Arc<Geoserver>,
    ) {
        let geoserver = Arc::new(Geoserver::default());
        let client = FetchClient::new(geoserver.clone(), FetchPolicy::default());
        let service = Arc::new(GeodataService::new(
            client.clone(),
            "http://x/ows",
            crate::config::Endpoints::default(),
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(tx, client);
        dispatcher.handle_event(SurfaceEvent::MapReady);
        (RefreshCoordinator::new(service, dispatcher, config), rx, geoserver)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<HostCommand>) -> Vec<HostCommand> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    fn requests_to(geoserver: &Geoserver, fragment: &str) -> usize {
        geoserver
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.contains(fragment))
            .count()
    }

    #[tokio::test]
    async fn test_tick_skipped_while_buses_loading() {
        let (mut coordinator, _rx, geoserver) = coordinator(CoordinatorConfig::default());

        coordinator.on_tick();
        assert_eq!(coordinator.state(DataKind::Buses), &FetchState::Fetching);
        coordinator.on_tick();

        coordinator.settle().await;
        assert_eq!(requests_to(&geoserver, "frota"), 1);
        assert_eq!(coordinator.state(DataKind::Buses), &FetchState::Idle);
        assert_eq!(coordinator.snapshot().buses.len(), 2);
    }

    #[tokio::test]
    async fn test_bounds_moved_during_stop_load_are_caught_up() {
        let (mut coordinator, _rx, geoserver) = coordinator(CoordinatorConfig::default());
        let bounds = |north: f64, south: f64| SurfaceEvent::BoundsChanged {
            north,
            south,
            east: -47.8,
            west: -48.0,
        };

        coordinator.on_event(bounds(-15.7, -15.9));
        assert_eq!(coordinator.state(DataKind::Stops), &FetchState::Fetching);
        // Plusieurs kilomètres plus au sud, pendant le chargement
        coordinator.on_event(bounds(-15.8, -16.0));
        assert_eq!(requests_to(&geoserver, "Paradas"), 0);

        coordinator.settle().await;
        let requests: Vec<String> = geoserver.requests.lock().unwrap().clone();
        let stops: Vec<&String> = requests.iter().filter(|u| u.contains("Paradas")).collect();
        assert_eq!(stops.len(), 2);
        assert!(stops[1].contains("bbox=-48,-16,-47.8,-15.8"));
        assert_eq!(coordinator.state(DataKind::Stops), &FetchState::Idle);
    }

    #[tokio::test]
    async fn test_user_location_is_pushed() {
        let (mut coordinator, mut rx, _) = coordinator(CoordinatorConfig::default());

        coordinator.set_user_location(-15.79, -47.88);
        let sent = drain(&mut rx);
        assert_eq!(
            sent[0],
            HostCommand::SetUserPosition {
                lat: -15.79,
                lon: -47.88,
                zoom: None
            }
        );
        assert!(matches!(
            &sent[1],
            HostCommand::UpdateData { data }
                if data.user_location == Some(UserLocation { lat: -15.79, lon: -47.88 })
        ));
        assert_eq!(
            coordinator.snapshot().user_location,
            Some(UserLocation { lat: -15.79, lon: -47.88 })
        );
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_buses() {
        let (mut coordinator, mut rx, geoserver) = coordinator(CoordinatorConfig::default());

        coordinator.refresh_buses().await;
        assert_eq!(coordinator.snapshot().buses.len(), 2);
        assert_eq!(coordinator.state(DataKind::Buses), &FetchState::Idle);
        drain(&mut rx);

        *geoserver.fail_buses.lock().unwrap() = true;
        coordinator.refresh_buses().await;
        assert_eq!(coordinator.snapshot().buses.len(), 2);
        assert!(matches!(
            coordinator.state(DataKind::Buses),
            FetchState::Error(msg) if msg.contains("500")
        ));

        let sent = drain(&mut rx);
        assert!(matches!(
            sent.as_slice(),
            [HostCommand::ShowToast { duration_ms: 3000, .. }]
        ));

        // Reprise automatique au cycle suivant
        *geoserver.fail_buses.lock().unwrap() = false;
        coordinator.refresh_buses().await;
        assert_eq!(coordinator.state(DataKind::Buses), &FetchState::Idle);
    }

    #[tokio::test]
    async fn test_only_active_buses() {
        let config = CoordinatorConfig {
            show_only_active_buses: true,
            ..Default::default()
        };
        let (mut coordinator, _rx, _) = coordinator(config);
        coordinator.refresh_buses().await;
        let buses = &coordinator.snapshot().buses;
        assert_eq!(buses.len(), 1);
        assert_eq!(buses[0].prefix, "331457");
    }

    #[tokio::test]
    async fn test_select_and_clear_route() {
        let (mut coordinator, mut rx, _) = coordinator(CoordinatorConfig::default());

        assert_eq!(coordinator.select_line("110").await.unwrap(), 1);
        let sent = drain(&mut rx);
        assert!(matches!(&sent[0], HostCommand::SetBusRoute { line_code } if line_code == "110"));
        assert!(matches!(&sent[1], HostCommand::ShowRoute { lines, .. } if lines.len() == 1));
        match &sent[2] {
            HostCommand::Recenter { lat, lon, zoom } => {
                assert!((lat - (-15.8)).abs() < 1e-9);
                assert!((lon - (-47.9)).abs() < 1e-9);
                assert_eq!(*zoom, DEFAULT_ZOOM);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(&sent[3], HostCommand::UpdateData { data } if data.lines.len() == 1));

        coordinator.clear_selection();
        assert!(coordinator.snapshot().route.is_empty());
        let sent = drain(&mut rx);
        assert_eq!(sent[0], HostCommand::ClearRoute);
        assert!(matches!(&sent[2], HostCommand::UpdateData { data } if data.lines.is_empty()));
    }

    #[tokio::test]
    async fn test_unknown_line_shows_toast() {
        let (mut coordinator, mut rx, _) = coordinator(CoordinatorConfig::default());
        assert_eq!(coordinator.select_line("999").await.unwrap(), 0);
        let sent = drain(&mut rx);
        assert!(matches!(
            sent.as_slice(),
            [HostCommand::ShowToast { message, .. }] if message.contains("999")
        ));
        assert!(coordinator.snapshot().selected_line.is_none());
    }

    #[tokio::test]
    async fn test_fares_filled_from_lines() {
        let (mut coordinator, _rx, _) = coordinator(CoordinatorConfig::default());
        coordinator.preload_lines().await;
        coordinator.refresh_buses().await;
        let buses = &coordinator.snapshot().buses;
        assert_eq!(buses[0].fare, Some(5.5));
        assert_eq!(buses[1].fare, None);
    }

    #[test]
    fn test_routes_extent() {
        let line = |coords: Vec<[f64; 2]>| Line {
            id: "x".into(),
            code: "x".into(),
            name: "x".into(),
            service_label: "x".into(),
            coordinates: coords,
            geometry_kind: semob_wfs::GeometryKind::LineString,
            fare: None,
            aliases: vec![],
        };
        let rect = routes_extent(&[
            line(vec![[-48.0, -15.9], [-47.9, -15.8]]),
            line(vec![[-47.85, -15.75], [-47.8, -15.7]]),
            line(vec![]),
        ])
        .unwrap();
        assert_eq!(rect.min().x, -48.0);
        assert_eq!(rect.max().y, -15.7);
        assert!(routes_extent(&[]).is_none());
    }
}
