//! `World`: fachada que compone almacén, cola de entrega y registro de steps.
//!
//! Es el punto de contacto del runtime externo que ejecuta workflows. Todas
//! las dependencias se construyen al arranque y se pasan explícitamente.
use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;
use world_core::{HookWaiter, StepRegistry, Storage};
use world_delivery::{DeliveryQueue, QueueKind, QueueParams, Transport};
use world_domain::{CreateEventRequest, CreateHookRequest, CreateStepRequest, Hook, ResolveData, Step, StepStatus,
                   UpdateStepRequest};

use crate::config::AppConfig;
use crate::errors::{WorldError, WorldResult};

/// Opciones de `World::queue`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub success: bool,
    pub healthy: bool,
    pub message: String,
}

pub struct World {
    config: AppConfig,
    storage: Storage,
    registry: Arc<StepRegistry>,
    queue: DeliveryQueue,
}

impl World {
    /// Entrega por HTTP hacia `config.delivery.deliver_to`.
    pub fn new(config: AppConfig, registry: StepRegistry) -> WorldResult<Self> {
        let queue = DeliveryQueue::from_config(&config.delivery)?;
        Ok(Self::assemble(config, registry, queue))
    }

    /// Igual que `new` pero con un transporte propio (p. ej. en proceso).
    pub fn with_transport(config: AppConfig, registry: StepRegistry, transport: Arc<dyn Transport>) -> Self {
        let queue = DeliveryQueue::new(transport, config.delivery.retry);
        Self::assemble(config, registry, queue)
    }

    fn assemble(config: AppConfig, registry: StepRegistry, queue: DeliveryQueue) -> Self {
        info!("[world] {} step(s) registered, delivering to {}",
              registry.len(),
              config.delivery.deliver_to);
        Self { config,
               storage: Storage::new(),
               registry: Arc::new(registry),
               queue }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Proyección pedida o, si no se indicó, la configurada.
    pub fn resolve_data(&self, requested: Option<ResolveData>) -> ResolveData {
        requested.unwrap_or(self.config.default_resolve_data)
    }

    /// Ejecuta un step registrado dentro de un run con semántica de replay:
    /// un `AlreadyExists` al crear significa "ya aplicado" y se continúa con
    /// el registro existente; un step ya completado no se vuelve a ejecutar.
    pub async fn run_step(&self, run_id: &str, step_id: &str, step_name: &str, input: Vec<Value>) -> WorldResult<Step> {
        let handler = self.registry.get(step_name)?;

        let step = match self.storage
                             .create_step(run_id, CreateStepRequest::new(step_id, step_name, input))
                             .await
        {
            Ok(step) => step,
            Err(e) if e.is_already_exists() => {
                debug!("[world] step {step_id} already recorded; replaying");
                self.storage.get_step(run_id, step_id, ResolveData::All).await?
            }
            Err(e) => return Err(e.into()),
        };
        if step.status == StepStatus::Completed {
            return Ok(step);
        }

        let running = self.storage
                          .update_step(run_id,
                                       step_id,
                                       UpdateStepRequest::status(StepStatus::Running).with_attempt(step.attempt + 1))
                          .await?;
        match handler.call(running.input.clone()).await {
            Ok(output) => {
                let done = self.storage
                               .update_step(run_id,
                                            step_id,
                                            UpdateStepRequest::status(StepStatus::Completed).with_output(output))
                               .await?;
                Ok(done)
            }
            Err(message) => {
                warn!("[world] step {step_id} attempt {} failed: {message}", running.attempt);
                self.storage
                    .update_step(run_id,
                                 step_id,
                                 UpdateStepRequest::status(StepStatus::Failed).with_error(message.clone()))
                    .await?;
                Err(WorldError::StepFailed(message))
            }
        }
    }

    /// Encola un mensaje hacia `deliver_to` y devuelve su id. La entrega
    /// sigue en segundo plano; un prefijo de cola desconocido falla aquí.
    pub fn queue(&self, queue_name: &str, message: Value, opts: QueueOptions) -> WorldResult<String> {
        QueueKind::of(queue_name)?;
        let mut params = QueueParams::new(self.config.delivery.deliver_to.clone(), queue_name, message);
        params.deployment_id = opts.deployment_id;
        params.idempotency_key = opts.idempotency_key;
        Ok(self.queue.enqueue(params))
    }

    pub fn delivery(&self) -> &DeliveryQueue {
        &self.queue
    }

    /// Crea el registro del hook y suscribe al run a su future. Sin token se
    /// genera uno aleatorio.
    pub async fn create_hook_future(&self, run_id: &str, mut req: CreateHookRequest) -> WorldResult<(Hook, HookWaiter)> {
        let token = req.token
                       .get_or_insert_with(|| Uuid::new_v4().to_string())
                       .clone();
        let hook = self.storage.create_hook(run_id, req).await?;
        let waiter = self.storage
                         .futures()
                         .subscribe(&token, Some(json!({"runId": run_id, "hookId": hook.hook_id})))
                         .await?;
        Ok((hook, waiter))
    }

    /// Resuelve el hook con ese token. Sólo el primer resume deja constancia
    /// en el journal del run dueño (`hook_received`, correlacionado por
    /// `hook_id`) y siempre con el valor que observaron los waiters.
    pub async fn resume_hook(&self, token: &str, payload: Value) -> WorldResult<Hook> {
        let hook = self.storage.get_hook_by_token(token, ResolveData::All).await?;
        let resolution = self.storage.futures().resolve(token, payload).await?;
        if !resolution.first {
            debug!("[world] hook {} of {} already resumed", hook.hook_id, hook.run_id);
            return Ok(hook);
        }
        self.storage
            .create_event(&hook.run_id,
                          CreateEventRequest::new("hook_received").correlated(hook.hook_id.clone())
                                                                  .with_data(resolution.value),
                          ResolveData::None)
            .await?;
        info!("[world] hook {} of {} resumed", hook.hook_id, hook.run_id);
        Ok(hook)
    }

    pub fn health(&self) -> HealthReport {
        HealthReport { success: true,
                       healthy: true,
                       message: "backend is healthy".to_string() }
    }
}
