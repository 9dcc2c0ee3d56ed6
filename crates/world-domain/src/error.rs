use thiserror::Error;

/// Errores de validación del modelo (parseo de estados, parámetros).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Estado inválido: {0}")]
    InvalidStatus(String),
    #[error("Validación fallida: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_status_variant_format() {
        let err = DomainError::InvalidStatus("sleeping".into());
        assert_eq!(err.to_string(), "Estado inválido: sleeping");
    }

    #[test]
    fn test_validation_variant_format() {
        let err = DomainError::Validation("limit must be > 0".into());
        assert_eq!(err.to_string(), "Validación fallida: limit must be > 0");
    }
}
