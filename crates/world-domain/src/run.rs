//! Ejecución de un workflow (`WorkflowRun`) y su máquina de estados.
//!
//! Transiciones:
//! - `Pending` -> `Running` (primer arranque, fija `started_at`)
//! - `Running` <-> `Paused`
//! - cualquiera no terminal -> `Completed` | `Failed` | `Cancelled`
//!
//! Los estados terminales son pegajosos: una vez alcanzados sólo se aceptan
//! parches con el mismo estado (replay idempotente).
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// `Completed`, `Failed` y `Cancelled` cierran el run.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "paused" => Ok(RunStatus::Paused),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "cancelled" => Ok(RunStatus::Cancelled),
            other => Err(DomainError::InvalidStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub run_id: String,
    pub workflow_name: String,
    pub deployment_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_context: Option<Map<String, Value>>,
    pub status: RunStatus,
    #[serde(default)]
    pub input: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    /// Construye un run recién creado: `Pending`, sin `started_at` ni
    /// `completed_at`.
    pub fn pending(run_id: impl Into<String>, req: CreateWorkflowRunRequest, now: DateTime<Utc>) -> Self {
        Self { run_id: run_id.into(),
               workflow_name: req.workflow_name,
               deployment_id: req.deployment_id,
               execution_context: req.execution_context,
               status: RunStatus::Pending,
               input: req.input,
               output: None,
               error: None,
               error_code: None,
               created_at: now,
               updated_at: now,
               started_at: None,
               completed_at: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkflowRunRequest {
    pub workflow_name: String,
    pub deployment_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_context: Option<Map<String, Value>>,
    #[serde(default)]
    pub input: Vec<Value>,
}

impl CreateWorkflowRunRequest {
    pub fn new(workflow_name: impl Into<String>, deployment_id: impl Into<String>, input: Vec<Value>) -> Self {
        Self { workflow_name: workflow_name.into(),
               deployment_id: deployment_id.into(),
               execution_context: None,
               input }
    }
}

/// Parche parcial sobre un run. Los campos ausentes no se tocan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWorkflowRunRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RunStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_context: Option<Map<String, Value>>,
}

impl UpdateWorkflowRunRequest {
    pub fn status(status: RunStatus) -> Self {
        Self { status: Some(status),
               ..Self::default() }
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>, code: Option<String>) -> Self {
        self.error = Some(error.into());
        self.error_code = code;
        self
    }
}
