//! Tabla de steps registrados, construida una vez al arranque.
//!
//! Los nombres completos tienen la forma `step//<ruta>//<función>`.
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use log::warn;
use serde_json::Value;

use crate::errors::{StoreError, StoreResult};

/// Resultado de ejecutar un step: valor de salida o mensaje de error.
pub type StepOutcome = Result<Value, String>;

#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn call(&self, input: Vec<Value>) -> StepOutcome;
}

/// Adaptador para registrar closures async como steps.
pub struct FnStep<F>(pub F);

#[async_trait]
impl<F, Fut> StepHandler for FnStep<F>
    where F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
          Fut: Future<Output = StepOutcome> + Send + 'static
{
    async fn call(&self, input: Vec<Value>) -> StepOutcome {
        (self.0)(input).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepName<'a> {
    pub module_path: &'a str,
    pub short_name: &'a str,
}

/// `step//src/workflows/signup.ts//sendWelcomeEmail` -> ruta + función.
pub fn parse_step_name(name: &str) -> Option<StepName<'_>> {
    let rest = name.strip_prefix("step//")?;
    let (module_path, short_name) = rest.rsplit_once("//")?;
    if module_path.is_empty() || short_name.is_empty() {
        return None;
    }
    Some(StepName { module_path,
                    short_name })
}

#[derive(Clone, Default)]
pub struct StepRegistry {
    steps: BTreeMap<String, Arc<dyn StepHandler>>,
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRegistry")
         .field("steps", &self.steps.keys().collect::<Vec<_>>())
         .finish()
    }
}

impl StepRegistry {
    pub fn builder() -> StepRegistryBuilder {
        StepRegistryBuilder::default()
    }

    /// Busca un step; si no existe el error lista los disponibles.
    pub fn get(&self, name: &str) -> StoreResult<Arc<dyn StepHandler>> {
        self.steps
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownStep { name: name.to_string(),
                                                     available: self.names().join(", ") })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.steps.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.steps.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Default)]
pub struct StepRegistryBuilder {
    steps: BTreeMap<String, Arc<dyn StepHandler>>,
}

impl StepRegistryBuilder {
    pub fn register(mut self, name: impl Into<String>, handler: impl StepHandler + 'static) -> Self {
        let name = name.into();
        if parse_step_name(&name).is_none() {
            warn!("[registry] step name '{name}' does not follow step//<path>//<fn>");
        }
        if self.steps.insert(name.clone(), Arc::new(handler)).is_some() {
            warn!("[registry] step '{name}' registered twice; keeping the last one");
        }
        self
    }

    pub fn register_fn<F, Fut>(self, name: impl Into<String>, f: F) -> Self
        where F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
              Fut: Future<Output = StepOutcome> + Send + 'static
    {
        self.register(name, FnStep(f))
    }

    pub fn build(self) -> StepRegistry {
        StepRegistry { steps: self.steps }
    }
}
