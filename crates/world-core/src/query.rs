//! Consultas entre particiones: índice primero, entidad después.
//!
//! No guarda estado propio. El índice puede estar atrasado o traer
//! referencias colgantes; ambos casos se resuelven como `NotFound` o se
//! descartan, nunca como error.
use log::debug;
use world_domain::{Event, Hook, ListParams, ResolveData};

use crate::errors::{EntityKind, StoreError, StoreResult};
use crate::index::{IndexKey, IndexRef, SecondaryIndex};
use crate::store::EntityStore;

#[derive(Clone)]
pub struct QueryService {
    index: SecondaryIndex,
    store: EntityStore,
}

impl QueryService {
    pub fn new(index: SecondaryIndex, store: EntityStore) -> Self {
        Self { index, store }
    }

    /// Eventos de todos los runs con ese `correlation_id`, agrupados por run
    /// en el orden en que aparecen en el índice y ascendentes por id dentro
    /// de cada run.
    pub async fn get_events_by_correlation_id(&self, correlation_id: &str, resolve_data: ResolveData) -> StoreResult<Vec<Event>> {
        let refs = self.index
                       .get(&IndexKey::Correlation(correlation_id.to_string()))
                       .await?;
        let mut run_ids: Vec<String> = Vec::new();
        for r in &refs {
            if !run_ids.iter().any(|id| id == r.run_id()) {
                run_ids.push(r.run_id().to_string());
            }
        }

        let params = ListParams::default().with_resolve_data(resolve_data);
        let mut events = Vec::new();
        for run_id in run_ids {
            match self.store.list_events(&run_id, params.clone()).await {
                Ok(page) => events.extend(page.data
                                              .into_iter()
                                              .filter(|e| e.correlation_id.as_deref() == Some(correlation_id))),
                Err(e) if e.is_not_found() => debug!("[query] dangling correlation ref to {run_id}"),
                Err(e) => return Err(e),
            }
        }
        Ok(events)
    }

    pub async fn get_hook_by_token(&self, token: &str, resolve_data: ResolveData) -> StoreResult<Hook> {
        self.first_hook(IndexKey::Token(token.to_string()), token, resolve_data)
            .await
    }

    pub async fn get_hook_by_id(&self, hook_id: &str, resolve_data: ResolveData) -> StoreResult<Hook> {
        self.first_hook(IndexKey::HookId(hook_id.to_string()), hook_id, resolve_data)
            .await
    }

    async fn first_hook(&self, key: IndexKey, id: &str, resolve_data: ResolveData) -> StoreResult<Hook> {
        let refs = self.index.get(&key).await?;
        let Some(IndexRef::Hook { run_id, hook_id }) = refs.into_iter().next() else {
            return Err(StoreError::not_found(EntityKind::Hook, id));
        };
        match self.store.get_hook(&run_id, &hook_id, resolve_data).await {
            Err(e) if e.is_not_found() => {
                debug!("[query] dangling {key} -> {run_id}/{hook_id}");
                Err(StoreError::not_found(EntityKind::Hook, id))
            }
            other => other,
        }
    }
}
