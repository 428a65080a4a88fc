use serde::{Deserialize, Serialize};

/// Fila de la tabla de credenciales. Se da de alta fuera de la app web.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub display_name: String,
    pub password_digest: String,
}

/// Quién tiene la sesión iniciada.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    pub display_name: String,
}
