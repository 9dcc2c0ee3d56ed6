//! Workflow World
//!
//! Librería central del almacén de workflows:
//! - Expone `World`, la fachada que usa el runtime de ejecución.
//! - Expone `config` para construir la configuración desde el entorno.
//! - Expone `errors` con el error agregado de todas las capas.
//!
//! Puede usarse desde `main.rs` o por otros crates/clientes.

pub mod config;
pub mod errors;
pub mod world;

pub use config::AppConfig;
pub use errors::{WorldError, WorldResult};
pub use world::{HealthReport, QueueOptions, World};
