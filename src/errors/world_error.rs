use thiserror::Error;
use world_core::StoreError;
use world_delivery::DeliveryError;
use world_domain::DomainError;

/// Error de la fachada `World`: agrupa los de cada capa.
#[derive(Debug, Error)]
pub enum WorldError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("Error de configuración: {0}")]
    Config(String),
    #[error("Step fallido: {0}")]
    StepFailed(String),
}

impl WorldError {
    /// Código estilo HTTP para la capa de transporte.
    pub fn code(&self) -> u16 {
        match self {
            WorldError::Store(e) => e.code(),
            WorldError::Delivery(DeliveryError::UnknownQueue(_)) | WorldError::Domain(_) => 400,
            WorldError::Delivery(_) => 502,
            WorldError::Config(_) | WorldError::StepFailed(_) => 500,
        }
    }
}

pub type WorldResult<T> = Result<T, WorldError>;

#[cfg(test)]
mod tests {
    use super::*;
    use world_core::EntityKind;

    #[test]
    fn test_store_errors_keep_their_message_and_code() {
        let err: WorldError = StoreError::not_found(EntityKind::Hook, "tok").into();
        assert_eq!(err.to_string(), "hook no encontrado: tok");
        assert_eq!(err.code(), 404);
    }

    #[test]
    fn test_config_variant_format() {
        let err = WorldError::Config("mala configuración".into());
        assert_eq!(err.to_string(), "Error de configuración: mala configuración");
        assert_eq!(err.code(), 500);
    }

    #[test]
    fn test_unknown_queue_is_a_client_error() {
        let err: WorldError = DeliveryError::UnknownQueue("jobs".into()).into();
        assert_eq!(err.code(), 400);
    }
}
