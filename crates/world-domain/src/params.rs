//! Parámetros de lectura: proyección (`ResolveData`), orden y paginación.
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{DomainError, Event, Hook, Step, WorkflowRun};

/// Nivel de detalle devuelto por las lecturas.
///
/// `None` es la variante barata para polling: elimina los payloads
/// (input/output, event_data, metadata) y conserva estado y timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveData {
    None,
    #[default]
    All,
}

impl FromStr for ResolveData {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ResolveData::None),
            "all" => Ok(ResolveData::All),
            other => Err(DomainError::Validation(format!("unknown resolveData '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    #[serde(default)]
    pub sort_order: SortOrder,
    #[serde(default)]
    pub resolve_data: ResolveData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Identificador del último elemento ya entregado.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

impl ListParams {
    pub fn desc() -> Self {
        Self { sort_order: SortOrder::Desc,
               ..Self::default() }
    }

    pub fn with_resolve_data(mut self, resolve_data: ResolveData) -> Self {
        self.resolve_data = resolve_data;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListHooksParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default)]
    pub resolve_data: ResolveData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub cursor: Option<String>,
    pub has_more: bool,
}

/// Corta una lista ya ordenada según `cursor` y `limit`.
///
/// Un cursor que no aparece en la lista produce una página vacía (nunca se
/// reinicia desde el principio). `limit == 0` equivale a no limitar.
pub fn paginate<T, F>(items: Vec<T>, params: &ListParams, cursor_of: F) -> PaginatedResponse<T>
    where F: Fn(&T) -> String
{
    let start = match &params.cursor {
        Some(cursor) => items.iter()
                             .position(|item| &cursor_of(item) == cursor)
                             .map(|p| p + 1)
                             .unwrap_or(items.len()),
        None => 0,
    };
    let mut data: Vec<T> = items.into_iter().skip(start).collect();
    let limit = params.limit.filter(|l| *l > 0);
    let has_more = matches!(limit, Some(l) if data.len() > l);
    if let Some(l) = limit {
        data.truncate(l);
    }
    let cursor = if has_more { data.last().map(&cursor_of) } else { None };
    PaginatedResponse { data,
                        cursor,
                        has_more }
}

/// Proyección según `ResolveData`. Con `All` devuelve el valor intacto.
pub trait ResolveDataFilter: Sized {
    fn resolve(self, resolve_data: ResolveData) -> Self;
}

impl ResolveDataFilter for WorkflowRun {
    fn resolve(mut self, resolve_data: ResolveData) -> Self {
        if resolve_data == ResolveData::None {
            self.input = Vec::new();
            self.output = None;
        }
        self
    }
}

impl ResolveDataFilter for Step {
    fn resolve(mut self, resolve_data: ResolveData) -> Self {
        if resolve_data == ResolveData::None {
            self.input = Vec::new();
            self.output = None;
        }
        self
    }
}

impl ResolveDataFilter for Event {
    fn resolve(mut self, resolve_data: ResolveData) -> Self {
        if resolve_data == ResolveData::None {
            self.event_data = None;
        }
        self
    }
}

impl ResolveDataFilter for Hook {
    fn resolve(mut self, resolve_data: ResolveData) -> Self {
        if resolve_data == ResolveData::None {
            self.metadata = None;
        }
        self
    }
}
