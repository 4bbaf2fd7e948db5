//! Service de données géographiques
//!
//! Enchaîne le client de fetch et les transformations de `semob-wfs`.
//! Le jeu de linhas est gardé en mémoire pour la durée du processus.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use semob_wfs::query::{build_url, ensure_srs_name};
use semob_wfs::transform::{
    lines_matching, transform_buses, transform_fleet, transform_lines, transform_stops, FleetIndex,
};
use semob_wfs::{Bus, Line, MapBounds, Stop, TransformResult, WfsError};

use crate::config::Endpoints;
use crate::fetch::{FetchClient, FetchOptions, FetchResponse, Transport};

/// Erreur d'une récupération de jeu de données
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeodataError {
    /// Le fetch a échoué (après retries)
    #[error("Fetch failed with status {status}: {message}")]
    Fetch { status: u16, message: String },

    /// Le payload n'est pas une FeatureCollection exploitable
    #[error("Invalid payload: {0}")]
    Payload(String),
}

impl GeodataError {
    fn from_response(response: &FetchResponse) -> Self {
        GeodataError::Fetch {
            status: response.status,
            message: response.text(),
        }
    }
}

impl From<WfsError> for GeodataError {
    fn from(e: WfsError) -> Self {
        GeodataError::Payload(e.to_string())
    }
}

/// Accès typé aux trois couches du geoserver
pub struct GeodataService<T> {
    client: FetchClient<T>,
    base_url: String,
    endpoints: Endpoints,
    lines: RwLock<Option<Arc<Vec<Line>>>>,
    lines_refresh: Mutex<()>,
}

impl<T: Transport> GeodataService<T> {
    pub fn new(client: FetchClient<T>, base_url: impl Into<String>, endpoints: Endpoints) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            endpoints,
            lines: RwLock::new(None),
            lines_refresh: Mutex::new(()),
        }
    }

    pub fn client(&self) -> &FetchClient<T> {
        &self.client
    }

    pub fn buses_url(&self, bounds: Option<&MapBounds>) -> String {
        build_url(&self.base_url, &self.endpoints.buses, bounds)
    }

    pub fn stops_url(&self, bounds: Option<&MapBounds>) -> String {
        ensure_srs_name(&build_url(&self.base_url, &self.endpoints.stops, bounds))
    }

    pub fn lines_url(&self) -> String {
        build_url(&self.base_url, &self.endpoints.lines, None)
    }

    pub fn fleet_url(&self) -> String {
        build_url(&self.base_url, &self.endpoints.fleet, None)
    }

    /// Positions de la frota, toujours depuis le réseau
    pub async fn get_buses(&self, bounds: Option<&MapBounds>) -> Result<Vec<Bus>, GeodataError> {
        let url = self.buses_url(bounds);
        let body = self.fetch_body(&url, FetchOptions::live()).await?;
        let result = transform_buses(&body)?;
        log_skipped("buses", &result);
        Ok(result.items)
    }

    /// Positions rattachées à leur operadora
    ///
    /// Le cadastre est chargé en parallèle des positions ; s'il manque,
    /// les ônibus sont rendus sans operadora.
    pub async fn get_buses_with_operators(
        &self,
        bounds: Option<&MapBounds>,
    ) -> Result<Vec<Bus>, GeodataError> {
        let (buses, fleet) = tokio::join!(self.get_buses(bounds), self.get_fleet());
        let mut buses = buses?;
        match fleet {
            Ok(index) => {
                let matched = index.enrich(&mut buses);
                debug!(matched, total = buses.len(), "Operators attached");
            }
            Err(e) => debug!(error = %e, "Fleet registry unavailable, operators left empty"),
        }
        Ok(buses)
    }

    /// Cadastre de la frota, servi par le cache HTTP pendant son TTL
    pub async fn get_fleet(&self) -> Result<FleetIndex, GeodataError> {
        let body = self
            .fetch_body(&self.fleet_url(), FetchOptions::default())
            .await?;
        let result = transform_fleet(&body)?;
        log_skipped("fleet", &result);
        Ok(FleetIndex::new(result.items))
    }

    /// Paradas actives
    pub async fn get_stops(&self, bounds: Option<&MapBounds>) -> Result<Vec<Stop>, GeodataError> {
        let url = self.stops_url(bounds);
        let body = self.fetch_body(&url, FetchOptions::default()).await?;
        let result = transform_stops(&body)?;
        log_skipped("stops", &result);
        Ok(result.items)
    }

    /// Jeu de linhas complet, chargé une fois puis servi depuis la mémoire
    pub async fn get_lines(&self) -> Result<Arc<Vec<Line>>, GeodataError> {
        if let Some(lines) = self.lines.read().await.as_ref() {
            return Ok(Arc::clone(lines));
        }
        self.refresh_lines(None).await
    }

    /// Linhas correspondant à `code`
    ///
    /// Aucun résultat déclenche un unique rechargement forcé avant d'abandonner.
    pub async fn lines_for_code(&self, code: &str) -> Result<Vec<Line>, GeodataError> {
        let lines = self.get_lines().await?;
        let found: Vec<Line> = lines_matching(&lines, code).into_iter().cloned().collect();
        if !found.is_empty() {
            return Ok(found);
        }

        debug!(code, "No line matched, forcing a refresh of the line dataset");
        let lines = self.refresh_lines(Some(lines)).await?;
        let found: Vec<Line> = lines_matching(&lines, code).into_iter().cloned().collect();
        if found.is_empty() {
            info!(code, "No line found after refresh");
        }
        Ok(found)
    }

    /// Tarifa d'une linha d'après le jeu de linhas
    pub async fn fare_for_line(&self, code: &str) -> Result<Option<f64>, GeodataError> {
        let lines = self.get_lines().await?;
        Ok(lines_matching(&lines, code).into_iter().find_map(|l| l.fare))
    }

    /// Complète la tarifa des ônibus qui n'en portent pas
    pub async fn fill_fares(&self, buses: &mut [Bus]) {
        let lines = match self.get_lines().await {
            Ok(lines) => lines,
            Err(e) => {
                debug!(error = %e, "Line dataset unavailable, fares left empty");
                return;
            }
        };
        for bus in buses.iter_mut().filter(|b| b.fare.is_none() && b.active) {
            bus.fare = lines_matching(&lines, &bus.line_code)
                .into_iter()
                .find_map(|l| l.fare);
        }
    }

    /// Recharge le jeu de linhas
    ///
    /// `stale` est le jeu observé par l'appelant : s'il est fourni, le rechargement
    /// ignore le cache HTTP. Les rechargements sont sérialisés ; un appelant qui
    /// arrive après un rechargement concurrent réutilise son résultat.
    async fn refresh_lines(
        &self,
        stale: Option<Arc<Vec<Line>>>,
    ) -> Result<Arc<Vec<Line>>, GeodataError> {
        let _guard = self.lines_refresh.lock().await;

        let current = self.lines.read().await.clone();
        if let Some(current) = current {
            let replaced = match &stale {
                Some(seen) => !Arc::ptr_eq(seen, &current),
                None => true,
            };
            if replaced {
                return Ok(current);
            }
        }

        let forced = stale.is_some();
        let url = self.lines_url();
        let options = FetchOptions {
            bypass_cache: forced,
        };
        let body = self.fetch_body(&url, options).await?;
        let result = transform_lines(&body)?;
        log_skipped("lines", &result);
        info!(lines = result.items.len(), forced, "Line dataset loaded");

        let lines = Arc::new(result.items);
        *self.lines.write().await = Some(Arc::clone(&lines));
        Ok(lines)
    }

    /// Jeu de linhas en mémoire, sans déclencher de chargement
    pub async fn cached_lines(&self) -> Option<Arc<Vec<Line>>> {
        self.lines.read().await.clone()
    }

    async fn fetch_body(
        &self,
        url: &str,
        options: FetchOptions,
    ) -> Result<bytes::Bytes, GeodataError> {
        let response = self.client.fetch(url, options).await;
        if !response.ok {
            return Err(GeodataError::from_response(&response));
        }
        Ok(response.body)
    }
}

fn log_skipped<T>(kind: &str, result: &TransformResult<T>) {
    if result.errors.is_empty() {
        return;
    }
    warn!(kind, skipped = result.skipped(), kept = result.items.len(), "Features skipped");
    for e in &result.errors {
        debug!(kind, error = %e, "Skipped feature");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchError, FetchPolicy, RawResponse};
    use std::sync::Mutex as StdMutex;

    /// Transport qui rejoue des corps selon un fragment d'URL
    #[derive(Default)]
    struct Scripted {
        routes: StdMutex<Vec<(&'static str, Vec<&'static str>)>>,
        requests: StdMutex<Vec<String>>,
    }

    impl Scripted {
        fn on(self, fragment: &'static str, bodies: Vec<&'static str>) -> Self {
            self.routes.lock().unwrap().push((fragment, bodies));
            self
        }
    }

    impl Transport for Arc<Scripted> {
        async fn get(&self, url: &str) -> Result<RawResponse, FetchError> {
            self.requests.lock().unwrap().push(url.to_string());
            let mut routes = self.routes.lock().unwrap();
            let Some((_, bodies)) = routes.iter_mut().find(|(f, _)| url.contains(f)) else {
                return Ok(RawResponse::from_bytes(404, "not found"));
            };
            // Le dernier corps est rejoué indéfiniment
            let body = if bodies.len() > 1 { bodies.remove(0) } else { bodies[0] };
            Ok(RawResponse::from_bytes(200, body))
        }
    }

    const LINES_V1: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","geometry":{"type":"LineString","coordinates":[[-47.9,-15.8],[-47.8,-15.7]]},
         "properties":{"cd_linha":"0.110","tarifa":"5,50"}}]}"#;
    const LINES_V2: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","geometry":{"type":"LineString","coordinates":[[-47.9,-15.8],[-47.8,-15.7]]},
         "properties":{"cd_linha":"0.110","tarifa":"5,50"}},
        {"type":"Feature","geometry":{"type":"LineString","coordinates":[[-48.0,-15.85],[-47.95,-15.8]]},
         "properties":{"cd_linha":"0.123"}}]}"#;

    fn service(transport: Arc<Scripted>) -> GeodataService<Arc<Scripted>> {
        let client = FetchClient::new(transport, FetchPolicy::default());
        GeodataService::new(client, "http://x/ows", Endpoints::default())
    }

    fn line_requests(transport: &Scripted) -> usize {
        transport
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.contains("Linhas"))
            .count()
    }

    #[tokio::test]
    async fn test_lines_loaded_once() {
        let transport = Arc::new(Scripted::default().on("Linhas", vec![LINES_V1]));
        let service = service(transport.clone());

        assert_eq!(service.lines_for_code("110").await.unwrap().len(), 1);
        assert_eq!(service.lines_for_code("0110").await.unwrap().len(), 1);
        assert_eq!(line_requests(&transport), 1);
    }

    #[tokio::test]
    async fn test_miss_forces_one_refresh() {
        let transport = Arc::new(Scripted::default().on("Linhas", vec![LINES_V1, LINES_V2]));
        let service = service(transport.clone());

        service.get_lines().await.unwrap();
        let found = service.lines_for_code("123").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].code, "0.123");
        assert_eq!(line_requests(&transport), 2);

        // Toujours absent après rechargement : résultat vide, un seul rechargement de plus
        assert!(service.lines_for_code("999").await.unwrap().is_empty());
        assert_eq!(line_requests(&transport), 3);
    }

    #[tokio::test]
    async fn test_fare_lookup() {
        let transport = Arc::new(Scripted::default().on("Linhas", vec![LINES_V1]));
        let service = service(transport);
        assert_eq!(service.fare_for_line("110").await.unwrap(), Some(5.5));
    }

    #[tokio::test]
    async fn test_failed_fetch_is_an_error() {
        let service = service(Arc::new(Scripted::default()));
        let err = service.get_stops(None).await.unwrap_err();
        assert_eq!(
            err,
            GeodataError::Fetch {
                status: 404,
                message: "not found".into()
            }
        );
    }

    const FROTA: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","geometry":{"type":"Point","coordinates":[-47.88,-15.79]},
         "properties":{"prefixo":"331457","cd_linha":"0.110"}},
        {"type":"Feature","geometry":{"type":"Point","coordinates":[-47.9,-15.8]},
         "properties":{"prefixo":"999999","cd_linha":"0.030"}}]}"#;
    const CADASTRE: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","geometry":null,
         "properties":{"numero_veiculo":"331457","operadora":"Urbi Mobilidade Urbana","servico":"Básico",
                       "tipo_onibus":"Articulado","data_referencia":"2024-05-01"}}]}"#;

    fn requests_to(transport: &Scripted, fragment: &str) -> usize {
        transport
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.contains(fragment))
            .count()
    }

    #[tokio::test]
    async fn test_buses_joined_with_fleet_registry() {
        let transport = Arc::new(
            Scripted::default()
                .on("operadora", vec![CADASTRE])
                .on("da%20frota", vec![FROTA]),
        );
        let service = service(transport.clone());

        let buses = service.get_buses_with_operators(None).await.unwrap();
        let operator = buses[0].operator.as_ref().unwrap();
        assert_eq!(operator.name, "URBI");
        assert_eq!(operator.color.as_deref(), Some("#2b97bbff"));
        assert_eq!(operator.service, "Básico");
        assert_eq!(operator.bus_type, "Articulado");
        assert!(buses[1].operator.is_none());

        // Positions toujours relues, cadastre servi depuis le cache
        service.get_buses_with_operators(None).await.unwrap();
        assert_eq!(requests_to(&transport, "da%20frota"), 2);
        assert_eq!(requests_to(&transport, "operadora"), 1);
    }

    #[tokio::test]
    async fn test_missing_fleet_registry_keeps_buses() {
        let transport = Arc::new(Scripted::default().on("da%20frota", vec![FROTA]));
        let service = service(transport);

        let buses = service.get_buses_with_operators(None).await.unwrap();
        assert_eq!(buses.len(), 2);
        assert!(buses.iter().all(|b| b.operator.is_none()));
    }

    #[tokio::test]
    async fn test_stop_url_has_srs_name() {
        let service = service(Arc::new(Scripted::default()));
        let bounds = MapBounds::new(-15.7, -15.9, -47.8, -48.0);
        let url = service.stops_url(Some(&bounds));
        assert!(url.starts_with("http://x/ows?service=WFS"));
        assert!(url.contains("bbox=-48,-15.9,-47.8,-15.7,EPSG:4326"));
        assert_eq!(url.matches("srsName").count(), 1);
        assert!(service.stops_url(None).contains("srsName=EPSG:4326"));
    }
}
