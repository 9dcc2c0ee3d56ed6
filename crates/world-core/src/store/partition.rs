//! Partición de un run: dueña exclusiva del run, sus steps, su journal de
//! eventos y sus hooks.
use chrono::Utc;
use indexmap::IndexMap;
use log::debug;
use world_domain::{paginate, CreateEventRequest, CreateHookRequest, CreateStepRequest, CreateWorkflowRunRequest, Event,
                   Hook, ListParams, PaginatedResponse, ResolveData, ResolveDataFilter, SortOrder, Step, UpdateStepRequest,
                   UpdateWorkflowRunRequest, WorkflowRun};

use super::lifecycle::{apply_run_patch, apply_step_patch};
use crate::errors::{EntityKind, StoreError, StoreResult};
use crate::event::{EventStore, InMemoryEventStore};
use crate::hooks::HookFutures;
use crate::index::{IndexKey, IndexRef, SecondaryIndex};
use crate::partition::{PartitionState, Reply};

/// Handles a las particiones con las que el almacén se comunica por
/// mensajes.
#[derive(Clone, Default)]
pub struct RunDeps {
    pub index: SecondaryIndex,
    pub futures: HookFutures,
}

pub enum RunCommand {
    CreateRun {
        req: CreateWorkflowRunRequest,
        reply: Reply<WorkflowRun>,
    },
    GetRun {
        resolve_data: ResolveData,
        reply: Reply<WorkflowRun>,
    },
    UpdateRun {
        patch: UpdateWorkflowRunRequest,
        reply: Reply<WorkflowRun>,
    },
    CreateStep {
        req: CreateStepRequest,
        reply: Reply<Step>,
    },
    GetStep {
        step_id: String,
        resolve_data: ResolveData,
        reply: Reply<Step>,
    },
    UpdateStep {
        step_id: String,
        patch: UpdateStepRequest,
        reply: Reply<Step>,
    },
    ListSteps {
        params: ListParams,
        reply: Reply<PaginatedResponse<Step>>,
    },
    CreateEvent {
        req: CreateEventRequest,
        resolve_data: ResolveData,
        reply: Reply<Event>,
    },
    ListEvents {
        params: ListParams,
        reply: Reply<PaginatedResponse<Event>>,
    },
    CreateHook {
        req: CreateHookRequest,
        reply: Reply<Hook>,
    },
    GetHook {
        hook_id: String,
        resolve_data: ResolveData,
        reply: Reply<Hook>,
    },
    ListHooks {
        resolve_data: ResolveData,
        reply: Reply<Vec<Hook>>,
    },
    DisposeHook {
        hook_id: String,
        reply: Reply<Hook>,
    },
    /// Entradas de índice que este run debería tener (para reconstruir el
    /// índice desde las entidades).
    IndexEntries {
        reply: Reply<Vec<(IndexKey, IndexRef)>>,
    },
}

pub struct RunPartition {
    run_id: String,
    run: Option<WorkflowRun>,
    steps: IndexMap<String, Step>,
    events: InMemoryEventStore,
    hooks: IndexMap<String, Hook>,
    deps: RunDeps,
}

impl PartitionState for RunPartition {
    type Key = String;
    type Command = RunCommand;
    type Deps = RunDeps;

    fn new(key: &String, deps: &RunDeps) -> Self {
        Self { run_id: key.clone(),
               run: None,
               steps: IndexMap::new(),
               events: InMemoryEventStore::default(),
               hooks: IndexMap::new(),
               deps: deps.clone() }
    }

    fn apply(&mut self, command: RunCommand) {
        match command {
            RunCommand::CreateRun { req, reply } => {
                let _ = reply.send(self.create_run(req));
            }
            RunCommand::GetRun { resolve_data, reply } => {
                let _ = reply.send(self.run().map(|r| r.clone().resolve(resolve_data)));
            }
            RunCommand::UpdateRun { patch, reply } => {
                let _ = reply.send(self.update_run(patch));
            }
            RunCommand::CreateStep { req, reply } => {
                let _ = reply.send(self.create_step(req));
            }
            RunCommand::GetStep { step_id,
                                  resolve_data,
                                  reply, } => {
                let _ = reply.send(self.step(&step_id).map(|s| s.clone().resolve(resolve_data)));
            }
            RunCommand::UpdateStep { step_id, patch, reply } => {
                let _ = reply.send(self.update_step(&step_id, patch));
            }
            RunCommand::ListSteps { params, reply } => {
                let _ = reply.send(self.list_steps(&params));
            }
            RunCommand::CreateEvent { req,
                                      resolve_data,
                                      reply, } => {
                let _ = reply.send(self.create_event(req).map(|e| e.resolve(resolve_data)));
            }
            RunCommand::ListEvents { params, reply } => {
                let _ = reply.send(self.list_events(&params));
            }
            RunCommand::CreateHook { req, reply } => {
                let _ = reply.send(self.create_hook(req));
            }
            RunCommand::GetHook { hook_id,
                                  resolve_data,
                                  reply, } => {
                let _ = reply.send(self.hook(&hook_id).map(|h| h.clone().resolve(resolve_data)));
            }
            RunCommand::ListHooks { resolve_data, reply } => {
                let _ = reply.send(self.list_hooks(resolve_data));
            }
            RunCommand::DisposeHook { hook_id, reply } => {
                let _ = reply.send(self.dispose_hook(&hook_id));
            }
            RunCommand::IndexEntries { reply } => {
                let _ = reply.send(Ok(self.index_entries()));
            }
        }
    }
}

impl RunPartition {
    fn run(&self) -> StoreResult<&WorkflowRun> {
        self.run
            .as_ref()
            .ok_or_else(|| StoreError::not_found(EntityKind::Run, &self.run_id))
    }

    fn step(&self, step_id: &str) -> StoreResult<&Step> {
        self.run()?;
        self.steps
            .get(step_id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Step, step_id))
    }

    fn hook(&self, hook_id: &str) -> StoreResult<&Hook> {
        self.run()?;
        self.hooks
            .get(hook_id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Hook, hook_id))
    }

    fn create_run(&mut self, req: CreateWorkflowRunRequest) -> StoreResult<WorkflowRun> {
        if self.run.is_some() {
            return Err(StoreError::already_exists(EntityKind::Run, &self.run_id));
        }
        let run = WorkflowRun::pending(self.run_id.clone(), req, Utc::now());
        debug!("[store] created run {} ({})", run.run_id, run.workflow_name);
        self.run = Some(run.clone());
        Ok(run)
    }

    fn update_run(&mut self, patch: UpdateWorkflowRunRequest) -> StoreResult<WorkflowRun> {
        let run = self.run
                      .as_mut()
                      .ok_or_else(|| StoreError::not_found(EntityKind::Run, &self.run_id))?;
        apply_run_patch(run, patch, Utc::now())?;
        Ok(run.clone())
    }

    fn create_step(&mut self, req: CreateStepRequest) -> StoreResult<Step> {
        self.run()?;
        if self.steps.contains_key(&req.step_id) {
            return Err(StoreError::already_exists(EntityKind::Step, &req.step_id));
        }
        let step = Step::pending(self.run_id.clone(), req, Utc::now());
        debug!("[store] created step {} in {}", step.step_id, self.run_id);
        self.steps.insert(step.step_id.clone(), step.clone());
        Ok(step)
    }

    fn update_step(&mut self, step_id: &str, patch: UpdateStepRequest) -> StoreResult<Step> {
        self.run()?;
        let step = self.steps
                       .get_mut(step_id)
                       .ok_or_else(|| StoreError::not_found(EntityKind::Step, step_id))?;
        apply_step_patch(step, patch, Utc::now());
        Ok(step.clone())
    }

    fn list_steps(&self, params: &ListParams) -> StoreResult<PaginatedResponse<Step>> {
        self.run()?;
        let mut steps: Vec<Step> = self.steps.values().cloned().collect();
        // sort estable: empates quedan en orden de inserción
        steps.sort_by_key(|s| s.created_at);
        if params.sort_order == SortOrder::Desc {
            steps.reverse();
        }
        let mut page = paginate(steps, params, |s| s.step_id.clone());
        page.data = page.data.into_iter().map(|s| s.resolve(params.resolve_data)).collect();
        Ok(page)
    }

    fn create_event(&mut self, req: CreateEventRequest) -> StoreResult<Event> {
        self.run()?;
        let event = self.events.append(&self.run_id, req, Utc::now());
        if let Some(correlation_id) = &event.correlation_id {
            self.deps
                .index
                .append_detached(IndexKey::Correlation(correlation_id.clone()), IndexRef::run(&self.run_id));
        }
        Ok(event)
    }

    fn list_events(&self, params: &ListParams) -> StoreResult<PaginatedResponse<Event>> {
        self.run()?;
        let mut events = self.events.list();
        if params.sort_order == SortOrder::Desc {
            events.reverse();
        }
        let mut page = paginate(events, params, |e| e.event_id.to_string());
        page.data = page.data.into_iter().map(|e| e.resolve(params.resolve_data)).collect();
        Ok(page)
    }

    fn create_hook(&mut self, req: CreateHookRequest) -> StoreResult<Hook> {
        self.run()?;
        if self.hooks.contains_key(&req.hook_id) {
            return Err(StoreError::already_exists(EntityKind::Hook, &req.hook_id));
        }
        let hook = Hook::new(self.run_id.clone(), req, Utc::now());
        for (key, r) in hook_index_entries(&hook) {
            self.deps.index.append_detached(key, r);
        }
        debug!("[store] created hook {} in {}", hook.hook_id, self.run_id);
        self.hooks.insert(hook.hook_id.clone(), hook.clone());
        Ok(hook)
    }

    fn list_hooks(&self, resolve_data: ResolveData) -> StoreResult<Vec<Hook>> {
        self.run()?;
        Ok(self.hooks.values().cloned().map(|h| h.resolve(resolve_data)).collect())
    }

    fn dispose_hook(&mut self, hook_id: &str) -> StoreResult<Hook> {
        self.run()?;
        let hook = self.hooks
                       .shift_remove(hook_id)
                       .ok_or_else(|| StoreError::not_found(EntityKind::Hook, hook_id))?;
        debug!("[store] disposed hook {} in {}", hook.hook_id, self.run_id);
        Ok(hook)
    }

    fn index_entries(&self) -> Vec<(IndexKey, IndexRef)> {
        if self.run.is_none() {
            return Vec::new();
        }
        let mut entries: Vec<(IndexKey, IndexRef)> = Vec::new();
        for event in self.events.list() {
            if let Some(correlation_id) = event.correlation_id {
                let key = IndexKey::Correlation(correlation_id);
                if !entries.iter().any(|(k, _)| k == &key) {
                    entries.push((key, IndexRef::run(&self.run_id)));
                }
            }
        }
        for hook in self.hooks.values() {
            entries.extend(hook_index_entries(hook));
        }
        entries
    }
}

/// Claves de índice que apuntan a un hook: su id y, si lo tiene, su token.
pub(super) fn hook_index_entries(hook: &Hook) -> Vec<(IndexKey, IndexRef)> {
    let r = IndexRef::hook(&hook.run_id, &hook.hook_id);
    let mut entries = vec![(IndexKey::HookId(hook.hook_id.clone()), r.clone())];
    if let Some(token) = &hook.token {
        entries.push((IndexKey::Token(token.clone()), r));
    }
    entries
}
