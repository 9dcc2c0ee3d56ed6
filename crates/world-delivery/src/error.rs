use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Entrega rechazada con estado {status}:\n{body}")]
    Rejected { status: u16, body: String },
    #[error("Error de transporte: {0}")]
    Transport(String),
    #[error("Prefijo de cola desconocido: {0}")]
    UnknownQueue(String),
    #[error("Error de serialización: {0}")]
    Serialization(String),
    #[error("Entrega abandonada tras {attempts} intento(s): {last}")]
    Exhausted { attempts: u32, last: Box<DeliveryError> },
}

impl DeliveryError {
    /// Sólo los fallos transitorios entran al reintento acotado.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Transport(_) | DeliveryError::Rejected { .. })
    }
}

impl From<serde_json::Error> for DeliveryError {
    fn from(e: serde_json::Error) -> Self {
        DeliveryError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(e: reqwest::Error) -> Self {
        DeliveryError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_errors_are_not_retried() {
        assert!(DeliveryError::Transport("reset".into()).is_retryable());
        assert!(DeliveryError::Rejected { status: 500,
                                          body: "boom".into() }.is_retryable());
        assert!(!DeliveryError::UnknownQueue("jobs".into()).is_retryable());
        assert!(!DeliveryError::Serialization("eof".into()).is_retryable());
    }
}
