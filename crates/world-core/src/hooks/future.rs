//! Protocolo de future durable (hook).
//!
//! Estado por future: resultado (opcional), metadata (se fija una sola vez) y
//! la lista ordenada de waiters pendientes. Como subscribe/resolve/dispose de
//! una misma clave pasan por la misma partición, un subscribe tardío y un
//! resolve en vuelo nunca se pierden mutuamente.
//!
//! - `subscribe`: si ya hay resultado se entrega de inmediato; si no, el
//!   waiter queda pendiente y la metadata se persiste en la primera
//!   suscripción.
//! - `resolve`: el primero gana. Notifica a cada waiter pendiente una vez,
//!   vacía la lista y conserva el valor para suscriptores tardíos. Las
//!   llamadas siguientes no cambian nada.
//! - `dispose`: borra todo. Los waiters todavía pendientes fallan con
//!   `StoreError::HookDisposed` (se suelta su `Sender`).
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::errors::{StoreError, StoreResult};
use crate::partition::{PartitionRouter, PartitionState, Reply};

/// Handle que espera el valor del future.
#[derive(Debug)]
pub struct HookWaiter {
    key: String,
    rx: oneshot::Receiver<Value>,
}

impl HookWaiter {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Espera la resolución. Falla con `HookDisposed` si el future se
    /// descarta antes de resolverse.
    pub async fn wait(self) -> StoreResult<Value> {
        self.rx.await.map_err(|_| StoreError::HookDisposed(self.key))
    }

    /// Lectura no bloqueante; `None` mientras siga pendiente.
    pub fn try_take(&mut self) -> Option<StoreResult<Value>> {
        match self.rx.try_recv() {
            Ok(v) => Some(Ok(v)),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(StoreError::HookDisposed(self.key.clone()))),
        }
    }
}

/// Vista de diagnóstico del estado de un future.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FutureSnapshot {
    pub result: Option<Value>,
    pub metadata: Option<Value>,
    pub pending: usize,
}

/// Resultado de `resolve`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    /// `true` sólo para la llamada que fijó el valor.
    pub first: bool,
    /// El valor que observan los waiters, siempre el del primer resolve.
    pub value: Value,
    pub metadata: Option<Value>,
}

pub enum FutureCommand {
    Subscribe {
        waiter: oneshot::Sender<Value>,
        metadata: Option<Value>,
        reply: Reply<()>,
    },
    Resolve {
        value: Value,
        reply: Reply<Resolution>,
    },
    Dispose {
        reply: Reply<()>,
    },
    Snapshot {
        reply: Reply<FutureSnapshot>,
    },
}

pub struct HookFutureState {
    key: String,
    result: Option<Value>,
    metadata: Option<Value>,
    waiters: Vec<oneshot::Sender<Value>>,
}

impl PartitionState for HookFutureState {
    type Key = String;
    type Command = FutureCommand;
    type Deps = ();

    fn new(key: &String, _deps: &()) -> Self {
        Self { key: key.clone(),
               result: None,
               metadata: None,
               waiters: Vec::new() }
    }

    fn apply(&mut self, command: FutureCommand) {
        match command {
            FutureCommand::Subscribe { waiter, metadata, reply } => {
                if let Some(value) = &self.result {
                    let _ = waiter.send(value.clone());
                } else {
                    if self.metadata.is_none() {
                        self.metadata = metadata;
                    }
                    self.waiters.push(waiter);
                }
                let _ = reply.send(Ok(()));
            }
            FutureCommand::Resolve { value, reply } => {
                let resolution = match &self.result {
                    Some(winner) => {
                        debug!("[hooks] {} already resolved; ignoring", self.key);
                        Resolution { first: false,
                                     value: winner.clone(),
                                     metadata: self.metadata.clone() }
                    }
                    None => {
                        debug!("[hooks] resolving {} for {} waiter(s)", self.key, self.waiters.len());
                        for waiter in self.waiters.drain(..) {
                            let _ = waiter.send(value.clone());
                        }
                        self.result = Some(value.clone());
                        Resolution { first: true,
                                     value,
                                     metadata: self.metadata.clone() }
                    }
                };
                let _ = reply.send(Ok(resolution));
            }
            FutureCommand::Dispose { reply } => {
                if !self.waiters.is_empty() {
                    warn!("[hooks] disposing {} with {} pending waiter(s)", self.key, self.waiters.len());
                }
                self.result = None;
                self.metadata = None;
                self.waiters.clear();
                let _ = reply.send(Ok(()));
            }
            FutureCommand::Snapshot { reply } => {
                let _ = reply.send(Ok(FutureSnapshot { result: self.result.clone(),
                                                       metadata: self.metadata.clone(),
                                                       pending: self.waiters.len() }));
            }
        }
    }
}

/// Handle clonable a las particiones de futures, indexadas por clave
/// (normalmente el token del hook).
#[derive(Clone)]
pub struct HookFutures {
    router: PartitionRouter<HookFutureState>,
}

impl Default for HookFutures {
    fn default() -> Self {
        Self::new()
    }
}

impl HookFutures {
    pub fn new() -> Self {
        Self { router: PartitionRouter::new("hook-future", ()) }
    }

    pub async fn subscribe(&self, key: &str, metadata: Option<Value>) -> StoreResult<HookWaiter> {
        let (tx, rx) = oneshot::channel();
        self.router
            .request(&key.to_string(), |reply| FutureCommand::Subscribe { waiter: tx,
                                                                           metadata,
                                                                           reply })
            .await?;
        Ok(HookWaiter { key: key.to_string(),
                        rx })
    }

    /// Resolver antes de cualquier suscripción abre la partición: el valor
    /// queda para los suscriptores tardíos. La `Resolution` indica si esta
    /// llamada ganó y trae la metadata persistida para localizar al
    /// suscriptor.
    pub async fn resolve(&self, key: &str, value: Value) -> StoreResult<Resolution> {
        self.router
            .request(&key.to_string(), |reply| FutureCommand::Resolve { value, reply })
            .await
    }

    pub async fn dispose(&self, key: &str) -> StoreResult<()> {
        self.router
            .request_if_present(&key.to_string(),
                                |reply| FutureCommand::Dispose { reply },
                                || Ok(()))
            .await
    }

    pub async fn snapshot(&self, key: &str) -> StoreResult<FutureSnapshot> {
        self.router
            .request_if_present(&key.to_string(),
                                |reply| FutureCommand::Snapshot { reply },
                                || Ok(FutureSnapshot::default()))
            .await
    }

    /// Claves con partición abierta.
    pub fn keys(&self) -> Vec<String> {
        self.router.keys()
    }
}
