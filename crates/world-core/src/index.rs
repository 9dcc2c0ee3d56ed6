//! Índice secundario: lista append-only de referencias por clave.
//!
//! Cada clave es su propia partición serializada. No hay transacción entre
//! claves ni entre índice y entidades: una escritura de entidad y su append
//! al índice son dos mensajes independientes, así que una lectura puede ver
//! el índice sin el append todavía. Las referencias son débiles: una que ya
//! no apunta a nada se resuelve como `NotFound`, nunca como error.
use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::StoreResult;
use crate::partition::{PartitionRouter, PartitionState, Reply};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKey {
    Correlation(String),
    Token(String),
    HookId(String),
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Correlation(id) => write!(f, "correlation:{id}"),
            IndexKey::Token(token) => write!(f, "token:{token}"),
            IndexKey::HookId(id) => write!(f, "hook:{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexRef {
    Run { run_id: String },
    Hook { run_id: String, hook_id: String },
}

impl IndexRef {
    pub fn run(run_id: impl Into<String>) -> Self {
        IndexRef::Run { run_id: run_id.into() }
    }

    pub fn hook(run_id: impl Into<String>, hook_id: impl Into<String>) -> Self {
        IndexRef::Hook { run_id: run_id.into(),
                         hook_id: hook_id.into() }
    }

    pub fn run_id(&self) -> &str {
        match self {
            IndexRef::Run { run_id } | IndexRef::Hook { run_id, .. } => run_id,
        }
    }
}

pub enum IndexCommand {
    Get(Reply<Vec<IndexRef>>),
    Set(Vec<IndexRef>, Option<Reply<()>>),
    Append(IndexRef, Option<Reply<()>>),
    Clear(Option<Reply<()>>),
    /// Quita todas las apariciones de una referencia y devuelve cuántas
    /// quedan bajo la clave.
    Remove(IndexRef, Reply<usize>),
}

pub struct IndexPartition {
    key: IndexKey,
    refs: Vec<IndexRef>,
}

fn ack(reply: Option<Reply<()>>) {
    if let Some(reply) = reply {
        let _ = reply.send(Ok(()));
    }
}

impl PartitionState for IndexPartition {
    type Key = IndexKey;
    type Command = IndexCommand;
    type Deps = ();

    fn new(key: &IndexKey, _deps: &()) -> Self {
        Self { key: key.clone(),
               refs: Vec::new() }
    }

    fn apply(&mut self, command: IndexCommand) {
        match command {
            IndexCommand::Get(reply) => {
                let _ = reply.send(Ok(self.refs.clone()));
            }
            IndexCommand::Set(refs, reply) => {
                self.refs = refs;
                ack(reply);
            }
            IndexCommand::Append(r, reply) => {
                // sin deduplicación
                self.refs.push(r);
                ack(reply);
            }
            IndexCommand::Clear(reply) => {
                debug!("[index] clearing {} ({} refs)", self.key, self.refs.len());
                self.refs.clear();
                ack(reply);
            }
            IndexCommand::Remove(r, reply) => {
                self.refs.retain(|existing| existing != &r);
                debug!("[index] removed {r:?} from {} ({} left)", self.key, self.refs.len());
                let _ = reply.send(Ok(self.refs.len()));
            }
        }
    }
}

/// Handle clonable al índice.
#[derive(Clone)]
pub struct SecondaryIndex {
    router: PartitionRouter<IndexPartition>,
}

impl Default for SecondaryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SecondaryIndex {
    pub fn new() -> Self {
        Self { router: PartitionRouter::new("index", ()) }
    }

    /// Referencias en orden de inserción (vacío si la clave nunca se escribió).
    pub async fn get(&self, key: &IndexKey) -> StoreResult<Vec<IndexRef>> {
        self.router
            .request_if_present(key, IndexCommand::Get, || Ok(Vec::new()))
            .await
    }

    pub async fn set(&self, key: &IndexKey, refs: Vec<IndexRef>) -> StoreResult<()> {
        self.router.request(key, |reply| IndexCommand::Set(refs, Some(reply))).await
    }

    pub async fn append(&self, key: &IndexKey, r: IndexRef) -> StoreResult<()> {
        self.router.request(key, |reply| IndexCommand::Append(r, Some(reply))).await
    }

    pub async fn clear(&self, key: &IndexKey) -> StoreResult<()> {
        self.router
            .request_if_present(key, |reply| IndexCommand::Clear(Some(reply)), || Ok(()))
            .await
    }

    /// Quita sólo `r` de la clave; el resto de referencias se conserva.
    /// Devuelve cuántas quedan.
    pub async fn remove(&self, key: &IndexKey, r: IndexRef) -> StoreResult<usize> {
        self.router
            .request_if_present(key, |reply| IndexCommand::Remove(r, reply), || Ok(0))
            .await
    }

    /// Claves que alguna vez se escribieron.
    pub fn keys(&self) -> Vec<IndexKey> {
        self.router.keys()
    }

    /// Append sin esperar confirmación (lo usan las particiones de run).
    pub fn append_detached(&self, key: IndexKey, r: IndexRef) {
        if let Err(e) = self.router.send(&key, IndexCommand::Append(r, None)) {
            log::warn!("[index] append to {key} dropped: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_keeps_insertion_order_and_duplicates() {
        let index = SecondaryIndex::new();
        let key = IndexKey::Correlation("c1".into());
        index.append(&key, IndexRef::run("r1")).await.unwrap();
        index.append(&key, IndexRef::run("r2")).await.unwrap();
        index.append(&key, IndexRef::run("r1")).await.unwrap();
        let refs = index.get(&key).await.unwrap();
        let runs: Vec<&str> = refs.iter().map(|r| r.run_id()).collect();
        assert_eq!(runs, vec!["r1", "r2", "r1"]);
    }

    #[tokio::test]
    async fn set_replaces_and_clear_empties() {
        let index = SecondaryIndex::new();
        let key = IndexKey::Token("tok".into());
        index.append(&key, IndexRef::hook("r1", "h1")).await.unwrap();
        index.set(&key, vec![IndexRef::hook("r2", "h2")]).await.unwrap();
        assert_eq!(index.get(&key).await.unwrap(), vec![IndexRef::hook("r2", "h2")]);
        index.clear(&key).await.unwrap();
        assert!(index.get(&key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn detached_append_is_visible_after_a_later_read() {
        let index = SecondaryIndex::new();
        let key = IndexKey::HookId("h1".into());
        index.append_detached(key.clone(), IndexRef::hook("r1", "h1"));
        // misma partición: el Get se encola detrás del Append
        assert_eq!(index.get(&key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn remove_drops_only_the_given_ref() {
        let index = SecondaryIndex::new();
        let key = IndexKey::Token("tok".into());
        index.append(&key, IndexRef::hook("ra", "h1")).await.unwrap();
        index.append(&key, IndexRef::hook("rb", "h1")).await.unwrap();
        assert_eq!(index.remove(&key, IndexRef::hook("rb", "h1")).await, Ok(1));
        assert_eq!(index.get(&key).await.unwrap(), vec![IndexRef::hook("ra", "h1")]);
        assert_eq!(index.remove(&key, IndexRef::hook("ra", "h1")).await, Ok(0));
    }

    #[tokio::test]
    async fn reads_of_unwritten_keys_leave_no_partition() {
        let index = SecondaryIndex::new();
        for i in 0..50 {
            assert!(index.get(&IndexKey::Token(format!("t{i}"))).await.unwrap().is_empty());
        }
        index.clear(&IndexKey::HookId("h".into())).await.unwrap();
        assert!(index.keys().is_empty());
    }

    #[tokio::test]
    async fn keys_are_namespaced() {
        let index = SecondaryIndex::new();
        index.append(&IndexKey::Token("x".into()), IndexRef::hook("r", "h")).await.unwrap();
        assert!(index.get(&IndexKey::HookId("x".into())).await.unwrap().is_empty());
    }
}
