use thiserror::Error;

/// Fallos del panel de detección.
///
/// `AuthFailure` es una sola variante opaca: quien llama nunca sabe si falló
/// el usuario o la contraseña.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Username/password is incorrect")]
    AuthFailure,
    #[error("Not logged in")]
    Unauthenticated,
    #[error("Unable to load model. Check the specified path: {path}: {reason}")]
    ModelLoad { path: String, reason: String },
    #[error("Error occurred while opening the image: {0}")]
    ImageDecode(String),
    #[error("Permission denied: {0}")]
    StreamPermission(String),
    #[error("An error occurred: {0}")]
    StreamFailure(String),
    #[error("No image is uploaded yet!")]
    NoInput,
    #[error("Please select a valid source type!")]
    InvalidSource,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

pub type DomainResult<T> = Result<T, DomainError>;
