//! Runtime de particiones: un dueño lógico de un solo hilo por clave.
//!
//! Cada clave (un run, un hook-future, una entrada de índice) tiene su propia
//! tarea tokio que posee el estado y aplica los comandos de su buzón uno a
//! uno. El handler (`PartitionState::apply`) es síncrono, así que todo
//! read-modify-write dentro de él es atómico. Las interacciones entre
//! particiones son siempre mensajes: `send` (fire-and-forget) o `request`
//! (espera la respuesta por un `oneshot`).
//!
//! Sólo las escrituras que crean estado abren una partición. Las lecturas y
//! las escrituras sobre una clave que nunca se abrió se responden sin
//! arrancar tarea (`request_if_present`).
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use log::debug;
use tokio::sync::{mpsc, oneshot};

use crate::errors::{StoreError, StoreResult};

/// Canal de respuesta que viaja dentro de cada comando.
pub type Reply<T> = oneshot::Sender<StoreResult<T>>;

pub trait PartitionState: Send + 'static {
    type Key: Clone + Eq + Hash + Display + Send + Sync + 'static;
    type Command: Send + 'static;
    /// Dependencias compartidas (handles a otras particiones).
    type Deps: Clone + Send + Sync + 'static;

    fn new(key: &Self::Key, deps: &Self::Deps) -> Self;
    fn apply(&mut self, command: Self::Command);
}

pub struct PartitionRouter<S: PartitionState> {
    name: &'static str,
    deps: S::Deps,
    mailboxes: Arc<DashMap<S::Key, mpsc::UnboundedSender<S::Command>>>,
}

impl<S: PartitionState> Clone for PartitionRouter<S> {
    fn clone(&self) -> Self {
        Self { name: self.name,
               deps: self.deps.clone(),
               mailboxes: Arc::clone(&self.mailboxes) }
    }
}

impl<S: PartitionState> PartitionRouter<S> {
    pub fn new(name: &'static str, deps: S::Deps) -> Self {
        Self { name,
               deps,
               mailboxes: Arc::new(DashMap::new()) }
    }

    fn mailbox(&self, key: &S::Key) -> mpsc::UnboundedSender<S::Command> {
        self.mailboxes
            .entry(key.clone())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                let state = S::new(key, &self.deps);
                debug!("[{}] spawning partition {}", self.name, key);
                tokio::spawn(run_partition(state, rx));
                tx
            })
            .clone()
    }

    fn unavailable(&self, key: &S::Key) -> StoreError {
        StoreError::Unavailable(format!("{}/{}", self.name, key))
    }

    /// Encola un comando sin esperar su efecto.
    pub fn send(&self, key: &S::Key, command: S::Command) -> StoreResult<()> {
        self.mailbox(key).send(command).map_err(|_| self.unavailable(key))
    }

    /// Encola un comando construido alrededor de un `Reply` y espera el
    /// resultado.
    pub async fn request<T, F>(&self, key: &S::Key, build: F) -> StoreResult<T>
        where F: FnOnce(Reply<T>) -> S::Command
    {
        let (tx, rx) = oneshot::channel();
        self.send(key, build(tx))?;
        rx.await.map_err(|_| self.unavailable(key))?
    }

    /// Como `request`, pero si la clave no tiene partición responde `absent()`
    /// sin crearla.
    pub async fn request_if_present<T, F, A>(&self, key: &S::Key, build: F, absent: A) -> StoreResult<T>
        where F: FnOnce(Reply<T>) -> S::Command,
              A: FnOnce() -> StoreResult<T>
    {
        let Some(mailbox) = self.mailboxes.get(key).map(|m| m.clone()) else {
            return absent();
        };
        let (tx, rx) = oneshot::channel();
        mailbox.send(build(tx)).map_err(|_| self.unavailable(key))?;
        rx.await.map_err(|_| self.unavailable(key))?
    }

    /// Claves con partición viva (en orden arbitrario).
    pub fn keys(&self) -> Vec<S::Key> {
        self.mailboxes.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.mailboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mailboxes.is_empty()
    }
}

async fn run_partition<S: PartitionState>(mut state: S, mut rx: mpsc::UnboundedReceiver<S::Command>) {
    while let Some(command) = rx.recv().await {
        state.apply(command);
    }
}
