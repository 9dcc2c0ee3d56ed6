//! Entrega de mensajes de cola hacia el endpoint de la aplicación, con
//! reintento acotado y re-entrega programada por 503.

pub mod config;
pub mod error;
pub mod handler;
pub mod queue;
pub mod transport;

pub use config::{init_dotenv, DeliveryConfig, RetryPolicy};
pub use error::DeliveryError;
pub use handler::{HandlerResponse, HandlerResult, IncomingRequest, MessageHandler, MessageMetadata, QueueHandler};
pub use queue::{new_message_id, queue_url, DeliveryOutcome, DeliveryQueue, QueueKind, QueueParams, QueueReceipt,
                HEADER_DEPLOYMENT_ID, HEADER_IDEMPOTENCY_KEY, HEADER_MESSAGE_ATTEMPT, HEADER_MESSAGE_ID, HEADER_QUEUE_NAME,
                STEP_QUEUE_PREFIX, WORKFLOW_QUEUE_PREFIX};
pub use transport::{HttpTransport, OutboundRequest, Transport, TransportResponse};
