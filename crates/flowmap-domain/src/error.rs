use thiserror::Error;

/// Errores del dominio (validación de referencias y (de)serialización de tablas).
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Error de validación: {0}")]
    Validation(String),

    #[error("Error de serialización: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for DomainError {
    fn from(e: serde_json::Error) -> Self {
        DomainError::Serialization(e.to_string())
    }
}
