//! Entity Store: fachada asíncrona sobre las particiones de run.
//!
//! Todas las operaciones sobre un mismo `run_id` se serializan en la
//! partición de ese run. Operaciones sobre runs distintos corren en paralelo
//! sin orden entre ellas.

pub mod lifecycle;
mod partition;

pub use partition::{RunCommand, RunDeps, RunPartition};

use world_domain::{CreateEventRequest, CreateHookRequest, CreateStepRequest, CreateWorkflowRunRequest, Event, Hook,
                   ListParams, PaginatedResponse, ResolveData, RunStatus, Step, UpdateStepRequest,
                   UpdateWorkflowRunRequest, WorkflowRun};

use log::debug;

use crate::errors::{EntityKind, StoreError, StoreResult};
use crate::index::{IndexKey, IndexRef};
use crate::partition::{PartitionRouter, Reply};

#[derive(Clone)]
pub struct EntityStore {
    router: PartitionRouter<RunPartition>,
    deps: RunDeps,
}

impl EntityStore {
    pub fn new(deps: RunDeps) -> Self {
        Self { router: PartitionRouter::new("run", deps.clone()),
               deps }
    }

    /// Todo comando salvo `CreateRun` va a un run existente; sin partición
    /// la respuesta es `NotFound(run)` y no se abre ninguna.
    async fn request<T, F>(&self, run_id: &str, build: F) -> StoreResult<T>
        where F: FnOnce(Reply<T>) -> RunCommand
    {
        self.router
            .request_if_present(&run_id.to_string(), build, || {
                Err(StoreError::not_found(EntityKind::Run, run_id))
            })
            .await
    }

    // --- runs ---

    /// Falla con `AlreadyExists` si el id ya está ocupado.
    pub async fn create_run(&self, run_id: &str, req: CreateWorkflowRunRequest) -> StoreResult<WorkflowRun> {
        self.router
            .request(&run_id.to_string(), |reply| RunCommand::CreateRun { req, reply })
            .await
    }

    pub async fn get_run(&self, run_id: &str, resolve_data: ResolveData) -> StoreResult<WorkflowRun> {
        self.request(run_id, |reply| RunCommand::GetRun { resolve_data, reply }).await
    }

    pub async fn update_run(&self, run_id: &str, patch: UpdateWorkflowRunRequest) -> StoreResult<WorkflowRun> {
        self.request(run_id, |reply| RunCommand::UpdateRun { patch, reply }).await
    }

    pub async fn cancel_run(&self, run_id: &str) -> StoreResult<WorkflowRun> {
        self.update_run(run_id, UpdateWorkflowRunRequest::status(RunStatus::Cancelled))
            .await
    }

    pub async fn pause_run(&self, run_id: &str) -> StoreResult<WorkflowRun> {
        self.update_run(run_id, UpdateWorkflowRunRequest::status(RunStatus::Paused))
            .await
    }

    /// Vuelve a `running`; sella `started_at` si todavía no estaba.
    pub async fn resume_run(&self, run_id: &str) -> StoreResult<WorkflowRun> {
        self.update_run(run_id, UpdateWorkflowRunRequest::status(RunStatus::Running))
            .await
    }

    // --- steps ---

    pub async fn create_step(&self, run_id: &str, req: CreateStepRequest) -> StoreResult<Step> {
        self.request(run_id, |reply| RunCommand::CreateStep { req, reply }).await
    }

    pub async fn get_step(&self, run_id: &str, step_id: &str, resolve_data: ResolveData) -> StoreResult<Step> {
        self.request(run_id, |reply| RunCommand::GetStep { step_id: step_id.to_string(),
                                                           resolve_data,
                                                           reply })
            .await
    }

    pub async fn update_step(&self, run_id: &str, step_id: &str, patch: UpdateStepRequest) -> StoreResult<Step> {
        self.request(run_id, |reply| RunCommand::UpdateStep { step_id: step_id.to_string(),
                                                              patch,
                                                              reply })
            .await
    }

    pub async fn list_steps(&self, run_id: &str, params: ListParams) -> StoreResult<PaginatedResponse<Step>> {
        self.request(run_id, |reply| RunCommand::ListSteps { params, reply }).await
    }

    // --- events ---

    /// Asigna el siguiente `event_id` del run. Si trae `correlation_id`, el
    /// append al índice sale sin esperar confirmación.
    pub async fn create_event(&self, run_id: &str, req: CreateEventRequest, resolve_data: ResolveData) -> StoreResult<Event> {
        self.request(run_id, |reply| RunCommand::CreateEvent { req,
                                                               resolve_data,
                                                               reply })
            .await
    }

    pub async fn list_events(&self, run_id: &str, params: ListParams) -> StoreResult<PaginatedResponse<Event>> {
        self.request(run_id, |reply| RunCommand::ListEvents { params, reply }).await
    }

    // --- hooks ---

    pub async fn create_hook(&self, run_id: &str, req: CreateHookRequest) -> StoreResult<Hook> {
        self.request(run_id, |reply| RunCommand::CreateHook { req, reply }).await
    }

    pub async fn get_hook(&self, run_id: &str, hook_id: &str, resolve_data: ResolveData) -> StoreResult<Hook> {
        self.request(run_id, |reply| RunCommand::GetHook { hook_id: hook_id.to_string(),
                                                           resolve_data,
                                                           reply })
            .await
    }

    pub async fn list_hooks(&self, run_id: &str, resolve_data: ResolveData) -> StoreResult<Vec<Hook>> {
        self.request(run_id, |reply| RunCommand::ListHooks { resolve_data, reply }).await
    }

    /// Borra el hook y, del índice, sólo las referencias a este hook. Otro
    /// run puede usar el mismo hookId o token: sus entradas se conservan y el
    /// future del token sólo se descarta cuando ya nadie lo referencia.
    /// Devuelve el registro eliminado.
    pub async fn dispose_hook(&self, run_id: &str, hook_id: &str) -> StoreResult<Hook> {
        let hook = self.request(run_id, |reply| RunCommand::DisposeHook { hook_id: hook_id.to_string(),
                                                                          reply })
                       .await?;
        for (key, r) in partition::hook_index_entries(&hook) {
            let left = self.deps.index.remove(&key, r).await?;
            if let IndexKey::Token(token) = &key {
                if left == 0 {
                    self.deps.futures.dispose(token).await?;
                } else {
                    debug!("[store] token of {} still referenced by {left} hook(s)", hook.hook_id);
                }
            }
        }
        Ok(hook)
    }

    // --- mantenimiento ---

    pub async fn index_entries(&self, run_id: &str) -> StoreResult<Vec<(IndexKey, IndexRef)>> {
        self.request(run_id, |reply| RunCommand::IndexEntries { reply }).await
    }

    /// Ids de los runs creados.
    pub fn run_ids(&self) -> Vec<String> {
        self.router.keys()
    }
}
