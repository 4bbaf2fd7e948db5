//! Accès réseau brut
//!
//! Le client de cache ne connaît que ce trait ; `ReqwestTransport` est
//! l'implémentation HTTP, les tests branchent une implémentation en mémoire.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;

use super::FetchError;

/// Réponse HTTP dont le corps n'a pas encore été lu
pub struct RawResponse {
    pub status: u16,

    /// `Content-Length` annoncé, s'il y en a un
    pub content_length: Option<u64>,

    pub body: BoxStream<'static, Result<Bytes, FetchError>>,
}

impl RawResponse {
    /// Réponse dont le corps est déjà en mémoire
    pub fn from_bytes(status: u16, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self {
            status,
            content_length: Some(body.len() as u64),
            body: futures::stream::once(async move { Ok(body) }).boxed(),
        }
    }
}

/// Émission d'un GET
pub trait Transport: Send + Sync + 'static {
    fn get(&self, url: &str) -> impl Future<Output = Result<RawResponse, FetchError>> + Send;
}

/// Transport HTTP basé sur reqwest
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("df-onibus/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<RawResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(RawResponse {
            status: response.status().as_u16(),
            content_length: response.content_length(),
            body: response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| FetchError::Network(e.to_string())))
                .boxed(),
        })
    }
}
