use async_trait::async_trait;
use image::RgbImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

use crate::domain::{
    camera::CameraInfo,
    detection::Detection,
    errors::DomainResult,
    model::ModelId,
    stream::{StreamEvent, StreamSource},
    user::User,
};

#[async_trait]
pub trait CredentialStorePort: Send + Sync {
    async fn find_user(&self, username: &str) -> DomainResult<Option<User>>;
}

#[async_trait]
pub trait CameraCatalogPort: Send + Sync {
    async fn list_cameras(&self) -> DomainResult<Vec<CameraInfo>>;
}

/// Orden de canales de una imagen dibujada.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// Lo que devuelve el modelo: las cajas y su propio dibujo de ellas.
pub struct RawPrediction {
    pub plot: RgbImage,
    pub order: ChannelOrder,
    pub boxes: Vec<Detection>,
}

/// Detector cargado. `predict` es bloqueante.
pub trait DetectionModel: Send + Sync {
    fn name(&self) -> &str;
    fn predict(&self, image: &RgbImage, conf: f32) -> DomainResult<RawPrediction>;
}

#[async_trait]
pub trait ModelLoaderPort: Send + Sync {
    async fn load(&self, model: &ModelId) -> DomainResult<Arc<dyn DetectionModel>>;
}

pub struct StreamRequest {
    pub source: StreamSource,
    pub model: Arc<dyn DetectionModel>,
    pub confidence: f32,
}

#[async_trait]
pub trait FrameStreamPort: Send + Sync {
    /// Abre la fuente y arranca el bucle de frames. Los fallos al abrir se
    /// devuelven aquí; los del bucle se publican como `StreamEvent::Error`.
    async fn start(&self, request: StreamRequest) -> DomainResult<StreamHandle>;
}

type StopHook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct StopState {
    stopped: AtomicBool,
    hooks: Mutex<Vec<StopHook>>,
}

/// Señal de parada compartida entre el handle y el hilo del bucle.
///
/// Además de la bandera guarda acciones que desbloquean la fuente (matar
/// ffmpeg, por ejemplo): un bucle parado en una lectura no ve la bandera.
#[derive(Clone, Default)]
pub struct StopSignal {
    state: Arc<StopState>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.state.stopped.load(Ordering::SeqCst)
    }

    /// Activa la bandera y ejecuta una sola vez las acciones registradas.
    pub fn trigger(&self) {
        let hooks = {
            let mut hooks = self.state.hooks.lock().unwrap_or_else(PoisonError::into_inner);
            self.state.stopped.store(true, Ordering::SeqCst);
            std::mem::take(&mut *hooks)
        };
        for hook in hooks {
            hook();
        }
    }

    /// Registra una acción para `trigger`. Si la señal ya está activa se
    /// ejecuta en el acto.
    pub fn on_trigger(&self, hook: impl FnOnce() + Send + 'static) {
        {
            let mut hooks = self.state.hooks.lock().unwrap_or_else(PoisonError::into_inner);
            if !self.state.stopped.load(Ordering::SeqCst) {
                hooks.push(Box::new(hook));
                return;
            }
        }
        hook();
    }
}

/// Bucle de frames en marcha, propiedad de una sesión. Soltar el handle lo
/// detiene y mata la fuente.
pub struct StreamHandle {
    source: StreamSource,
    tx: broadcast::Sender<StreamEvent>,
    stop: StopSignal,
}

impl StreamHandle {
    pub fn new(source: StreamSource, tx: broadcast::Sender<StreamEvent>, stop: StopSignal) -> Self {
        Self { source, tx, stop }
    }

    pub fn source(&self) -> &StreamSource {
        &self.source
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.tx.subscribe()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_set()
    }

    pub fn stop(&self) {
        self.stop.trigger();
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
