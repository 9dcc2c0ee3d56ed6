//! Configuración central de la aplicación.
//! Carga variables de entorno (.env) y construye una estructura inmutable que
//! se pasa explícitamente a `World`.
use std::env;

use world_delivery::{init_dotenv, DeliveryConfig};
use world_domain::ResolveData;

use crate::errors::WorldError;

/// Configuración de la aplicación (extensible para más secciones).
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Destino y política de reintento de la cola.
    pub delivery: DeliveryConfig,
    /// Proyección usada cuando el llamador no indica `resolveData`.
    pub default_resolve_data: ResolveData,
}

impl AppConfig {
    /// Lee `WORLD_*` del entorno. Un `WORLD_DEFAULT_RESOLVE_DATA` inválido es
    /// un error; el resto cae a sus defaults.
    pub fn from_env() -> Result<Self, WorldError> {
        init_dotenv();
        let default_resolve_data = match env::var("WORLD_DEFAULT_RESOLVE_DATA") {
            Ok(v) => v.trim()
                      .parse()
                      .map_err(|e| WorldError::Config(format!("WORLD_DEFAULT_RESOLVE_DATA: {e}")))?,
            Err(_) => ResolveData::All,
        };
        Ok(Self { delivery: DeliveryConfig::from_env(),
                  default_resolve_data })
    }

    pub fn with_delivery(mut self, delivery: DeliveryConfig) -> Self {
        self.delivery = delivery;
        self
    }
}
