//! Registro de un hook (future durable) propiedad de un run.
//!
//! El registro vive en la partición del run; el estado de resolución del
//! future vive aparte, en su propia partición (ver `world-core::hooks`).
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hook {
    pub run_id: String,
    pub hook_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl Hook {
    pub fn new(run_id: impl Into<String>, req: CreateHookRequest, now: DateTime<Utc>) -> Self {
        Self { run_id: run_id.into(),
               hook_id: req.hook_id,
               token: req.token,
               metadata: req.metadata,
               created_at: now }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateHookRequest {
    pub hook_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl CreateHookRequest {
    pub fn new(hook_id: impl Into<String>) -> Self {
        Self { hook_id: hook_id.into(),
               token: None,
               metadata: None }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
