use image::RgbImage;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::application::ports::StreamHandle;
use crate::domain::{
    history::{DetectionRecord, EncodedImage, HistoryLedger},
    mode::ModeSelection,
    user::Identity,
};

/// Imagen aceptada por el cargador y todavía no reemplazada.
#[derive(Clone)]
pub struct Upload {
    pub encoded: EncodedImage,
    pub rgb: RgbImage,
}

/// Estado de una sesión de navegador. Se pasa explícitamente a cada caso de uso.
#[derive(Default)]
pub struct Session {
    pub identity: Option<Identity>,
    pub dark_mode: bool,
    pub selection: ModeSelection,
    pub pending_upload: Option<Upload>,
    /// Resultado de la última detección sobre la subida actual.
    pub last_result: Option<DetectionRecord>,
    pub history: HistoryLedger,
    pub stream: Option<StreamHandle>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub type SharedSession = Arc<Mutex<Session>>;

struct Entry {
    session: SharedSession,
    last_seen: Instant,
}

/// Sesiones vivas indexadas por id de cookie, con caducidad por inactividad.
///
/// Cada sesión tiene su propio mutex: una sesión de navegador se atiende
/// interacción a interacción y sesiones distintas no comparten estado.
pub struct SessionStore {
    entries: RwLock<HashMap<SessionId, Entry>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: RwLock::new(HashMap::new()), ttl }
    }

    pub async fn create(&self) -> (SessionId, SharedSession) {
        let id = SessionId::generate();
        let session: SharedSession = Arc::new(Mutex::new(Session::default()));
        self.entries.write().await.insert(
            id.clone(),
            Entry { session: session.clone(), last_seen: Instant::now() },
        );
        debug!(session = %id, "sesión creada");
        (id, session)
    }

    /// Busca una sesión y renueva su inactividad. Las caducadas se eliminan
    /// en el momento.
    pub async fn get(&self, id: &SessionId) -> Option<SharedSession> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(id)?;
        if entry.last_seen.elapsed() > self.ttl {
            entries.remove(id);
            info!(session = %id, "sesión caducada");
            return None;
        }
        entry.last_seen = Instant::now();
        Some(entry.session.clone())
    }

    pub async fn remove(&self, id: &SessionId) {
        self.entries.write().await.remove(id);
    }

    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.last_seen.elapsed() <= self.ttl);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
