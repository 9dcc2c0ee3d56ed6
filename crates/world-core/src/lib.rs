//! Núcleo del almacén de workflows: particiones serializadas por clave,
//! Entity Store, índice secundario, futures de hooks y consultas.

pub mod errors;
pub mod event;
pub mod hooks;
pub mod index;
pub mod partition;
pub mod query;
pub mod registry;
pub mod storage;
pub mod store;

pub use errors::{EntityKind, StoreError, StoreResult};
pub use event::{EventStore, InMemoryEventStore};
pub use hooks::{FutureSnapshot, HookFutures, HookWaiter, Resolution};
pub use index::{IndexKey, IndexRef, SecondaryIndex};
pub use partition::{PartitionRouter, PartitionState, Reply};
pub use query::QueryService;
pub use registry::{parse_step_name, FnStep, StepHandler, StepName, StepOutcome, StepRegistry, StepRegistryBuilder};
pub use storage::Storage;
pub use store::{EntityStore, RunDeps};
