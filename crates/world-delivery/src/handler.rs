//! Lado receptor: traduce una entrega entrante en una llamada al handler de
//! la aplicación y la respuesta en el protocolo que entiende la cola
//! (200 / 503 `{retryIn}` / 400 / 500).
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::DeliveryError;
use crate::queue::{HEADER_DEPLOYMENT_ID, HEADER_MESSAGE_ATTEMPT, HEADER_MESSAGE_ID, HEADER_QUEUE_NAME};
use crate::transport::{OutboundRequest, Transport, TransportResponse};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    pub queue_name: String,
    pub message_id: String,
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
}

/// Respuesta del handler: `Ok(Some(d))` pide re-entrega tras `d`.
pub type HandlerResult = Result<Option<Duration>, String>;

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Value, meta: MessageMetadata) -> HandlerResult;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncomingRequest {
    /// Nombres en minúsculas.
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl IncomingRequest {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self { headers: HashMap::new(),
               body: Some(body.into()) }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }
}

impl From<OutboundRequest> for IncomingRequest {
    fn from(req: OutboundRequest) -> Self {
        Self { headers: req.headers
                           .into_iter()
                           .map(|(k, v)| (k.to_ascii_lowercase(), v))
                           .collect(),
               body: Some(req.body) }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResponse {
    pub status: u16,
    pub body: Value,
}

impl HandlerResponse {
    fn json(status: u16, body: Value) -> Self {
        Self { status, body }
    }
}

#[derive(Clone)]
pub struct QueueHandler {
    prefix: String,
    handler: Arc<dyn MessageHandler>,
}

impl QueueHandler {
    pub fn new(prefix: impl Into<String>, handler: Arc<dyn MessageHandler>) -> Self {
        Self { prefix: prefix.into(),
               handler }
    }

    fn metadata(req: &IncomingRequest) -> Option<MessageMetadata> {
        let queue_name = req.headers.get(HEADER_QUEUE_NAME)?.clone();
        let message_id = req.headers.get(HEADER_MESSAGE_ID)?.clone();
        let attempt = req.headers.get(HEADER_MESSAGE_ATTEMPT)?.trim().parse().ok()?;
        if queue_name.is_empty() || message_id.is_empty() {
            return None;
        }
        Some(MessageMetadata { queue_name,
                               message_id,
                               attempt,
                               deployment_id: req.headers.get(HEADER_DEPLOYMENT_ID).cloned() })
    }

    pub async fn handle(&self, req: IncomingRequest) -> HandlerResponse {
        let (Some(meta), Some(body)) = (Self::metadata(&req), req.body.as_ref()) else {
            return HandlerResponse::json(400, json!({"error": "Missing required headers"}));
        };
        if !meta.queue_name.starts_with(&self.prefix) {
            return HandlerResponse::json(400, json!({"error": "Unhandled queue"}));
        }
        let message: Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => return HandlerResponse::json(400, json!({"error": format!("Invalid body: {e}")})),
        };

        debug!("[handler] {} attempt {} ({})", meta.queue_name, meta.attempt, meta.message_id);
        match self.handler.handle(message, meta).await {
            Ok(Some(retry_in)) if !retry_in.is_zero() => {
                HandlerResponse::json(503, json!({"retryIn": retry_in.as_secs_f64()}))
            }
            Ok(_) => HandlerResponse::json(200, json!({"ok": true})),
            Err(e) => {
                warn!("[handler] message failed: {e}");
                HandlerResponse::json(500, Value::String(e))
            }
        }
    }
}

/// Entrega en proceso: la cola habla directamente con el handler, sin red.
#[async_trait]
impl Transport for QueueHandler {
    async fn post(&self, request: OutboundRequest) -> Result<TransportResponse, DeliveryError> {
        let response = self.handle(request.into()).await;
        Ok(TransportResponse { status: response.status,
                               body: serde_json::to_string(&response.body)? })
    }
}
