//! Geoserver en mémoire pour les tests d'intégration

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;

use df_onibus::config::Endpoints;
use df_onibus::fetch::{FetchClient, FetchError, FetchPolicy, RawResponse, Transport};
use df_onibus::GeodataService;

pub const BASE: &str = "http://geoserver.test/geoserver/semob/ows";

pub const FROTA: &str = r#"{"type":"FeatureCollection","features":[
  {"type":"Feature","geometry":{"type":"Point","coordinates":[-47.8828,-15.7939]},
   "properties":{"prefixo":"331457","cd_linha":"0.110","velocidade":"28,5","sentido":"IDA"}},
  {"type":"Feature","geometry":{"type":"Point","coordinates":[-47.9,-15.8]},
   "properties":{"prefixo":"221001","linha":"","velocidade":0}}
]}"#;

pub const PARADAS: &str = r#"{"type":"FeatureCollection","features":[
  {"type":"Feature","geometry":{"type":"Point","coordinates":[191138.743,8251745.906]},
   "properties":{"parada":"4521","descricao":"Esplanada dos Ministérios"}},
  {"type":"Feature","geometry":{"type":"Point","coordinates":[-47.9,-15.8]},
   "properties":{"parada":"4522","situacao":"INATIVA"}}
]}"#;

pub const LINHAS: &str = r#"{"type":"FeatureCollection","features":[
  {"type":"Feature","geometry":{"type":"LineString","coordinates":[[-48.0,-15.9],[-47.8,-15.7]]},
   "properties":{"cd_linha":"0.110","servico":"W3 Sul","tarifa":"5,50"}}
]}"#;

pub const LINHAS_UPDATED: &str = r#"{"type":"FeatureCollection","features":[
  {"type":"Feature","geometry":{"type":"LineString","coordinates":[[-48.0,-15.9],[-47.8,-15.7]]},
   "properties":{"cd_linha":"0.110","servico":"W3 Sul","tarifa":"5,50"}},
  {"type":"Feature","geometry":{"type":"MultiLineString","coordinates":[[[-48.1,-15.85],[-48.05,-15.83]],[[-48.05,-15.83],[-48.0,-15.8]]]},
   "properties":{"cd_linha":"0.123","servico":"Taguatinga"}}
]}"#;

/// Cadastre de la frota : seul 331457 y figure
pub const CADASTRE: &str = r#"{"type":"FeatureCollection","features":[
  {"type":"Feature","geometry":null,
   "properties":{"id_frota":"77","numero_veiculo":"331457","operadora":"Auto Viação Marechal",
                 "servico":"Básico","tipo_onibus":"Padron","data_referencia":"2024-05-01"}}
]}"#;

/// Réponse scriptée
#[derive(Clone)]
pub enum Reply {
    Json(&'static str),
    /// Plusieurs versions successives, la dernière est rejouée
    Sequence(Vec<&'static str>),
    Status(u16, &'static str),
    /// `Content-Length` annoncé, corps jamais lu
    Advertised(u64),
    /// Corps en morceaux, sans `Content-Length`
    Chunks { count: usize, size: usize },
    /// En-têtes reçus, corps qui n'arrive jamais
    Stall,
}

#[derive(Default)]
struct Inner {
    routes: Mutex<Vec<(&'static str, Reply)>>,
    requests: Mutex<Vec<String>>,
    delay: Mutex<Duration>,
}

/// Enregistre chaque requête et sert la première route dont le fragment apparaît dans l'URL
#[derive(Clone, Default)]
pub struct FakeGeoserver(Arc<Inner>);

impl FakeGeoserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Les couches avec leurs payloads par défaut
    pub fn semob() -> Self {
        Self::new()
            .route("operadora", Reply::Json(CADASTRE))
            .route("frota", Reply::Json(FROTA))
            .route("Paradas", Reply::Json(PARADAS))
            .route("Linhas", Reply::Json(LINHAS))
    }

    pub fn route(self, fragment: &'static str, reply: Reply) -> Self {
        self.0.routes.lock().unwrap().insert(0, (fragment, reply));
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.0.delay.lock().unwrap() = delay;
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.0.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, fragment: &str) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|u| u.contains(fragment))
            .collect()
    }

    fn next_reply(&self, url: &str) -> Option<Reply> {
        let mut routes = self.0.routes.lock().unwrap();
        let (_, reply) = routes.iter_mut().find(|(f, _)| url.contains(f))?;
        if let Reply::Sequence(bodies) = reply {
            let body = if bodies.len() > 1 {
                bodies.remove(0)
            } else {
                bodies[0]
            };
            return Some(Reply::Json(body));
        }
        Some(reply.clone())
    }
}

impl Transport for FakeGeoserver {
    async fn get(&self, url: &str) -> Result<RawResponse, FetchError> {
        self.0.requests.lock().unwrap().push(url.to_string());
        let delay = *self.0.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let response = match self.next_reply(url) {
            None => RawResponse::from_bytes(404, "not found"),
            Some(Reply::Json(body)) => RawResponse::from_bytes(200, body),
            // Résolue par next_reply
            Some(Reply::Sequence(_)) => RawResponse::from_bytes(500, "empty sequence"),
            Some(Reply::Status(status, body)) => RawResponse::from_bytes(status, body),
            Some(Reply::Advertised(length)) => RawResponse {
                status: 200,
                content_length: Some(length),
                body: futures::stream::pending().boxed(),
            },
            Some(Reply::Stall) => RawResponse {
                status: 200,
                content_length: None,
                body: futures::stream::pending().boxed(),
            },
            Some(Reply::Chunks { count, size }) => RawResponse {
                status: 200,
                content_length: None,
                body: futures::stream::iter(
                    (0..count).map(move |_| Ok(Bytes::from(vec![b' '; size]))),
                )
                .boxed(),
            },
        };
        Ok(response)
    }
}

pub fn client(geoserver: &FakeGeoserver) -> FetchClient<FakeGeoserver> {
    FetchClient::new(geoserver.clone(), FetchPolicy::default())
}

pub fn service(client: &FetchClient<FakeGeoserver>) -> GeodataService<FakeGeoserver> {
    GeodataService::new(client.clone(), BASE, Endpoints::default())
}
