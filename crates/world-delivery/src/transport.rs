//! Transporte saliente: un POST con headers y cuerpo JSON.
use std::time::Duration;

use async_trait::async_trait;
use log::debug;

use crate::error::DeliveryError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl OutboundRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status,
               body: body.into() }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Seam para sustituir HTTP (tests, entrega en proceso).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Un `Err` significa que no hubo respuesta; cualquier status llega como
    /// `Ok`.
    async fn post(&self, request: OutboundRequest) -> Result<TransportResponse, DeliveryError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, request: OutboundRequest) -> Result<TransportResponse, DeliveryError> {
        let mut builder = self.client
                              .post(&request.url)
                              .header(reqwest::header::CONTENT_TYPE, "application/json");
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder.body(request.body).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!("[delivery] POST {} -> {}", request.url, status);
        Ok(TransportResponse { status, body })
    }
}
