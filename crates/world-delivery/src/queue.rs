//! Cola de entrega: empuja mensajes opacos hacia `deliver_to`.
//!
//! Dos mecanismos de reintento conviven sin mezclarse:
//!
//! - reintento acotado (`RetryPolicy`) para fallos de transporte y
//!   respuestas rechazadas; repite la misma invocación.
//! - reintento por protocolo: un 503 con `{retryIn}` programa una nueva
//!   invocación independiente con `attempt + 1` y la actual termina con
//!   éxito. Éste no tiene tope.
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::{DeliveryConfig, RetryPolicy};
use crate::error::DeliveryError;
use crate::transport::{HttpTransport, OutboundRequest, Transport, TransportResponse};

pub const HEADER_QUEUE_NAME: &str = "x-vqs-queue-name";
pub const HEADER_MESSAGE_ID: &str = "x-vqs-message-id";
pub const HEADER_MESSAGE_ATTEMPT: &str = "x-vqs-message-attempt";
pub const HEADER_DEPLOYMENT_ID: &str = "x-vqs-deployment-id";
pub const HEADER_IDEMPOTENCY_KEY: &str = "idempotency-key";

pub const STEP_QUEUE_PREFIX: &str = "__wkf_step_";
pub const WORKFLOW_QUEUE_PREFIX: &str = "__wkf_workflow_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Step,
    Workflow,
}

impl QueueKind {
    pub fn of(queue_name: &str) -> Result<Self, DeliveryError> {
        if queue_name.starts_with(STEP_QUEUE_PREFIX) {
            Ok(QueueKind::Step)
        } else if queue_name.starts_with(WORKFLOW_QUEUE_PREFIX) {
            Ok(QueueKind::Workflow)
        } else {
            Err(DeliveryError::UnknownQueue(queue_name.to_string()))
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            QueueKind::Step => "step",
            QueueKind::Workflow => "flow",
        }
    }
}

/// Endpoint receptor según el prefijo de la cola.
pub fn queue_url(deliver_to: &str, queue_name: &str) -> Result<String, DeliveryError> {
    let kind = QueueKind::of(queue_name)?;
    Ok(format!("{}/.well-known/workflow/v1/{}",
               deliver_to.trim_end_matches('/'),
               kind.path()))
}

pub fn new_message_id() -> String {
    format!("msg_{}", Uuid::new_v4().simple())
}

fn default_attempt() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueParams {
    pub deliver_to: String,
    pub queue_name: String,
    pub message: Value,
    #[serde(default = "default_attempt")]
    pub attempt: u32,
    /// Se fija en la primera invocación y se conserva en toda la cadena.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Viaja como `x-vqs-deployment-id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
    /// Viaja como `idempotency-key`, igual en todos los intentos de la cadena.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl QueueParams {
    pub fn new(deliver_to: impl Into<String>, queue_name: impl Into<String>, message: Value) -> Self {
        Self { deliver_to: deliver_to.into(),
               queue_name: queue_name.into(),
               message,
               attempt: default_attempt(),
               message_id: None,
               deployment_id: None,
               idempotency_key: None }
    }

    pub fn with_deployment_id(mut self, deployment_id: impl Into<String>) -> Self {
        self.deployment_id = Some(deployment_id.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeliveryOutcome {
    Delivered,
    /// El receptor pidió esperar; ya hay una re-entrega programada.
    Delayed { retry_in: Duration },
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueReceipt {
    pub message_id: String,
    pub outcome: DeliveryOutcome,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetryAfter {
    retry_in: f64,
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Clone)]
pub struct DeliveryQueue {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
}

impl DeliveryQueue {
    pub fn new(transport: Arc<dyn Transport>, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    pub fn from_config(config: &DeliveryConfig) -> Result<Self, DeliveryError> {
        let transport = HttpTransport::new(config.http_timeout)?;
        Ok(Self::new(Arc::new(transport), config.retry))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Ejecuta una invocación completa (con reintento acotado) y devuelve su
    /// resultado. Un 503 cuenta como éxito.
    pub async fn queue(&self, params: QueueParams) -> Result<QueueReceipt, DeliveryError> {
        self.invoke(params).await
    }

    /// Variante fire-and-forget: devuelve el id del mensaje y entrega en
    /// segundo plano.
    pub fn enqueue(&self, mut params: QueueParams) -> String {
        let message_id = params.message_id.get_or_insert_with(new_message_id).clone();
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.invoke(params).await {
                error!("[delivery] background delivery failed: {e}");
            }
        });
        message_id
    }

    fn invoke(&self, mut params: QueueParams) -> BoxFuture<'_, Result<QueueReceipt, DeliveryError>> {
        Box::pin(async move {
            let message_id = params.message_id.get_or_insert_with(new_message_id).clone();
            let outcome = self.deliver_with_retry(&params).await?;
            if let DeliveryOutcome::Delayed { retry_in } = outcome {
                self.schedule(params, retry_in);
            }
            Ok(QueueReceipt { message_id, outcome })
        })
    }

    fn schedule(&self, mut params: QueueParams, retry_in: Duration) {
        params.attempt += 1;
        debug!("[delivery] {} rescheduled in {:?} as attempt {}",
               params.queue_name, retry_in, params.attempt);
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(retry_in).await;
            if let Err(e) = this.invoke(params).await {
                error!("[delivery] rescheduled delivery failed: {e}");
            }
        });
    }

    async fn deliver_with_retry(&self, params: &QueueParams) -> Result<DeliveryOutcome, DeliveryError> {
        let mut tries = 1;
        loop {
            match self.deliver_once(params).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if tries >= self.retry.max_attempts => {
                    error!("[delivery] {} gave up after {} attempt(s): {}", params.queue_name, tries, e);
                    return Err(if self.retry.kill_on_exhaustion {
                                   DeliveryError::Exhausted { attempts: tries,
                                                              last: Box::new(e) }
                               } else {
                                   e
                               });
                }
                Err(e) => {
                    let delay = self.retry.backoff(tries);
                    warn!("[delivery] {} attempt {} failed ({}); retrying in {:?}",
                          params.queue_name, tries, e, delay);
                    tokio::time::sleep(delay).await;
                    tries += 1;
                }
            }
        }
    }

    async fn deliver_once(&self, params: &QueueParams) -> Result<DeliveryOutcome, DeliveryError> {
        let url = queue_url(&params.deliver_to, &params.queue_name)?;
        let body = serde_json::to_vec(&params.message)?;
        let message_id = params.message_id.clone().unwrap_or_default();
        let mut headers = vec![(HEADER_QUEUE_NAME.to_string(), params.queue_name.clone()),
                               (HEADER_MESSAGE_ID.to_string(), message_id),
                               (HEADER_MESSAGE_ATTEMPT.to_string(), params.attempt.to_string()),];
        if let Some(deployment_id) = &params.deployment_id {
            headers.push((HEADER_DEPLOYMENT_ID.to_string(), deployment_id.clone()));
        }
        if let Some(key) = &params.idempotency_key {
            headers.push((HEADER_IDEMPOTENCY_KEY.to_string(), key.clone()));
        }
        let request = OutboundRequest { url, headers, body };
        let response = self.transport.post(request).await?;
        classify(&params.queue_name, response)
    }
}

fn classify(queue_name: &str, response: TransportResponse) -> Result<DeliveryOutcome, DeliveryError> {
    if response.is_success() {
        info!("[delivery] {queue_name} delivered");
        return Ok(DeliveryOutcome::Delivered);
    }
    if response.status == 503 {
        let retry_in = serde_json::from_str::<RetryAfter>(&response.body).ok()
                                                                          .and_then(|r| Duration::try_from_secs_f64(r.retry_in).ok());
        if let Some(retry_in) = retry_in {
            info!("[delivery] {queue_name} delayed by receiver for {retry_in:?}");
            return Ok(DeliveryOutcome::Delayed { retry_in });
        }
    }
    Err(DeliveryError::Rejected { status: response.status,
                                  body: response.body })
}
