//! world-domain: modelo de datos del almacén de metadatos de workflows.
//!
//! Contiene las entidades (`WorkflowRun`, `Step`, `Event`, `Hook`), los
//! requests de creación/actualización y los parámetros de lectura
//! (`ResolveData`, `SortOrder`, `ListParams`). No contiene lógica de
//! concurrencia: eso vive en `world-core`.
pub mod error;
pub mod event;
pub mod hook;
pub mod params;
pub mod run;
pub mod step;

pub use error::DomainError;
pub use event::{CreateEventRequest, Event};
pub use hook::{CreateHookRequest, Hook};
pub use params::{paginate, ListHooksParams, ListParams, PaginatedResponse, ResolveData, ResolveDataFilter, SortOrder};
pub use run::{CreateWorkflowRunRequest, RunStatus, UpdateWorkflowRunRequest, WorkflowRun};
pub use step::{CreateStepRequest, Step, StepStatus, UpdateStepRequest};
