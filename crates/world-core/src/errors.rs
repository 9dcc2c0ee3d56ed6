//! Errores del almacén de entidades.
//!
//! Cada variante expone un código máquina (`code`) y un identificador estable
//! (`kind`) para que la capa de transporte los traduzca sin inspeccionar el
//! mensaje.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use world_domain::RunStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Run,
    Step,
    Event,
    Hook,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
                        EntityKind::Run => "run",
                        EntityKind::Step => "step",
                        EntityKind::Event => "event",
                        EntityKind::Hook => "hook",
                    })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{entity} no encontrado: {id}")]
    NotFound { entity: EntityKind, id: String },
    #[error("{entity} ya existe: {id}")]
    AlreadyExists { entity: EntityKind, id: String },
    #[error("No implementado: {0}")]
    Unimplemented(String),
    #[error("Transición inválida de {from} a {to}")]
    InvalidTransition { from: RunStatus, to: RunStatus },
    #[error("Hook descartado antes de resolverse: {0}")]
    HookDisposed(String),
    #[error("Step '{name}' no registrado (disponibles: {available})")]
    UnknownStep { name: String, available: String },
    #[error("Partición no disponible: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(entity: EntityKind, id: impl Into<String>) -> Self {
        StoreError::NotFound { entity, id: id.into() }
    }

    pub fn already_exists(entity: EntityKind, id: impl Into<String>) -> Self {
        StoreError::AlreadyExists { entity, id: id.into() }
    }

    /// Código estilo HTTP.
    pub fn code(&self) -> u16 {
        match self {
            StoreError::NotFound { .. } | StoreError::UnknownStep { .. } => 404,
            StoreError::AlreadyExists { .. } | StoreError::InvalidTransition { .. } => 409,
            StoreError::HookDisposed(_) => 410,
            StoreError::Unimplemented(_) => 501,
            StoreError::Unavailable(_) => 503,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "not_found",
            StoreError::AlreadyExists { .. } => "already_exists",
            StoreError::Unimplemented(_) => "unimplemented",
            StoreError::InvalidTransition { .. } => "invalid_transition",
            StoreError::HookDisposed(_) => "hook_disposed",
            StoreError::UnknownStep { .. } => "unknown_step",
            StoreError::Unavailable(_) => "unavailable",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// En replay durable un `AlreadyExists` significa "ya aplicado".
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
