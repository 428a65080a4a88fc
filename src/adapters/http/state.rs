use std::path::PathBuf;
use std::sync::Arc;
use crate::application::services::{AuthService, DetectionService};
use crate::application::session::SessionStore;

/// Estado compartido para los manejadores HTTP de Axum.
/// Siguiendo la Arquitectura Hexagonal, el estado contiene los servicios (Casos de Uso).
#[derive(Clone)]
pub struct HttpState {
    /// Verificación de credenciales, login y logout.
    pub auth: Arc<AuthService>,
    /// Selección de fuente, inferencia sobre imágenes y streams.
    pub detection: Arc<DetectionService>,
    /// Una sesión por navegador, identificada por cookie.
    pub sessions: Arc<SessionStore>,
    /// Imágenes de la página de inicio.
    pub overview_images: Arc<Vec<PathBuf>>,
    /// Límite del cuerpo de las subidas, en bytes.
    pub max_upload_bytes: usize,
}
