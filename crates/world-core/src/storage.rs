//! `Storage`: punto de entrada único al almacén.
//!
//! Compone el Entity Store, el índice secundario, las particiones de futures
//! y el servicio de consultas, todos compartiendo los mismos routers.
use std::collections::HashSet;

use indexmap::IndexMap;
use log::{debug, info};
use uuid::Uuid;
use world_domain::{CreateEventRequest, CreateHookRequest, CreateStepRequest, CreateWorkflowRunRequest, Event, Hook,
                   ListHooksParams, ListParams, PaginatedResponse, ResolveData, Step, UpdateStepRequest,
                   UpdateWorkflowRunRequest, WorkflowRun};

use crate::errors::{StoreError, StoreResult};
use crate::hooks::HookFutures;
use crate::index::{IndexKey, IndexRef, SecondaryIndex};
use crate::query::QueryService;
use crate::store::{EntityStore, RunDeps};

#[derive(Clone)]
pub struct Storage {
    index: SecondaryIndex,
    futures: HookFutures,
    entities: EntityStore,
    query: QueryService,
}

impl Default for Storage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage {
    pub fn new() -> Self {
        let index = SecondaryIndex::new();
        let futures = HookFutures::new();
        let entities = EntityStore::new(RunDeps { index: index.clone(),
                                                  futures: futures.clone() });
        let query = QueryService::new(index.clone(), entities.clone());
        Self { index,
               futures,
               entities,
               query }
    }

    /// Id opaco de run: `wfrun_` + uuid v4 sin guiones.
    pub fn new_run_id() -> String {
        format!("wfrun_{}", Uuid::new_v4().simple())
    }

    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    pub fn index(&self) -> &SecondaryIndex {
        &self.index
    }

    pub fn futures(&self) -> &HookFutures {
        &self.futures
    }

    pub fn query(&self) -> &QueryService {
        &self.query
    }

    // --- runs ---

    pub async fn create_run(&self, req: CreateWorkflowRunRequest) -> StoreResult<WorkflowRun> {
        let run_id = Self::new_run_id();
        self.entities.create_run(&run_id, req).await
    }

    pub async fn get_run(&self, run_id: &str, resolve_data: ResolveData) -> StoreResult<WorkflowRun> {
        self.entities.get_run(run_id, resolve_data).await
    }

    pub async fn update_run(&self, run_id: &str, patch: UpdateWorkflowRunRequest) -> StoreResult<WorkflowRun> {
        self.entities.update_run(run_id, patch).await
    }

    pub async fn cancel_run(&self, run_id: &str) -> StoreResult<WorkflowRun> {
        self.entities.cancel_run(run_id).await
    }

    pub async fn pause_run(&self, run_id: &str) -> StoreResult<WorkflowRun> {
        self.entities.pause_run(run_id).await
    }

    pub async fn resume_run(&self, run_id: &str) -> StoreResult<WorkflowRun> {
        self.entities.resume_run(run_id).await
    }

    /// Listado global de runs: no soportado, falla en vez de devolver vacío.
    pub async fn list_runs(&self, _params: ListParams) -> StoreResult<PaginatedResponse<WorkflowRun>> {
        Err(StoreError::Unimplemented("runs.list".into()))
    }

    // --- steps ---

    pub async fn create_step(&self, run_id: &str, req: CreateStepRequest) -> StoreResult<Step> {
        self.entities.create_step(run_id, req).await
    }

    pub async fn get_step(&self, run_id: &str, step_id: &str, resolve_data: ResolveData) -> StoreResult<Step> {
        self.entities.get_step(run_id, step_id, resolve_data).await
    }

    pub async fn update_step(&self, run_id: &str, step_id: &str, patch: UpdateStepRequest) -> StoreResult<Step> {
        self.entities.update_step(run_id, step_id, patch).await
    }

    pub async fn list_steps(&self, run_id: &str, params: ListParams) -> StoreResult<PaginatedResponse<Step>> {
        self.entities.list_steps(run_id, params).await
    }

    // --- events ---

    pub async fn create_event(&self, run_id: &str, req: CreateEventRequest, resolve_data: ResolveData) -> StoreResult<Event> {
        self.entities.create_event(run_id, req, resolve_data).await
    }

    pub async fn list_events(&self, run_id: &str, params: ListParams) -> StoreResult<PaginatedResponse<Event>> {
        self.entities.list_events(run_id, params).await
    }

    pub async fn list_events_by_correlation_id(&self, correlation_id: &str, resolve_data: ResolveData) -> StoreResult<Vec<Event>> {
        self.query
            .get_events_by_correlation_id(correlation_id, resolve_data)
            .await
    }

    // --- hooks ---

    pub async fn create_hook(&self, run_id: &str, req: CreateHookRequest) -> StoreResult<Hook> {
        self.entities.create_hook(run_id, req).await
    }

    pub async fn get_hook(&self, run_id: &str, hook_id: &str, resolve_data: ResolveData) -> StoreResult<Hook> {
        self.entities.get_hook(run_id, hook_id, resolve_data).await
    }

    /// Sólo se soporta el listado filtrado por run.
    pub async fn list_hooks(&self, params: ListHooksParams) -> StoreResult<Vec<Hook>> {
        match params.run_id {
            Some(run_id) => self.entities.list_hooks(&run_id, params.resolve_data).await,
            None => Err(StoreError::Unimplemented("hooks.list without runId".into())),
        }
    }

    pub async fn dispose_hook(&self, run_id: &str, hook_id: &str) -> StoreResult<Hook> {
        self.entities.dispose_hook(run_id, hook_id).await
    }

    pub async fn get_hook_by_token(&self, token: &str, resolve_data: ResolveData) -> StoreResult<Hook> {
        self.query.get_hook_by_token(token, resolve_data).await
    }

    pub async fn get_hook_by_id(&self, hook_id: &str, resolve_data: ResolveData) -> StoreResult<Hook> {
        self.query.get_hook_by_id(hook_id, resolve_data).await
    }

    // --- índice ---

    /// Reconstruye el índice completo a partir de las entidades. Las claves
    /// que ya no tienen respaldo quedan vacías. Devuelve cuántas claves
    /// quedaron con referencias.
    pub async fn rebuild_indexes(&self) -> StoreResult<usize> {
        let mut rebuilt: IndexMap<IndexKey, Vec<IndexRef>> = IndexMap::new();
        for run_id in self.entities.run_ids() {
            for (key, r) in self.entities.index_entries(&run_id).await? {
                rebuilt.entry(key).or_default().push(r);
            }
        }

        let live: HashSet<&IndexKey> = rebuilt.keys().collect();
        for key in self.index.keys() {
            if !live.contains(&key) {
                debug!("[index] dropping stale key {key}");
                self.index.clear(&key).await?;
            }
        }
        for (key, refs) in &rebuilt {
            self.index.set(key, refs.clone()).await?;
        }
        info!("[index] rebuilt {} key(s)", rebuilt.len());
        Ok(rebuilt.len())
    }
}
