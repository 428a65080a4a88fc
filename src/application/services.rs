use image::{ImageFormat, RgbImage};
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::{
    application::{
        dto::StreamTarget,
        inference,
        ports::{CameraCatalogPort, CredentialStorePort, DetectionModel, FrameStreamPort, ModelLoaderPort, StreamRequest},
        session::{Session, Upload},
    },
    domain::{
        camera::CameraInfo,
        errors::{DomainError, DomainResult},
        history::{extension_of, DetectionRecord, EncodedImage},
        mode::{Branch, ModeSelection, SourceKind, Task},
        model::{Confidence, ModelId},
        stream::StreamSource,
        user::Identity,
    },
};

/// Extensiones que acepta el cargador de imágenes.
pub const UPLOAD_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];
const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "avi", "mov", "mkv", "webm"];

/// SHA-256 en hexadecimal de la contraseña, tal como está en la tabla de credenciales.
///
/// Sin sal: contraseñas iguales dan el mismo digest. Se mantiene así para que
/// las tablas existentes sigan funcionando.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Verificación de credenciales y transición autenticado / no autenticado.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStorePort>,
}

impl AuthService {
    pub fn new(store: Arc<dyn CredentialStorePort>) -> Self {
        Self { store }
    }

    /// Nombre visible si coinciden, `None` si no. Usuario desconocido y
    /// contraseña errónea no se distinguen. Sin recortes ni cambios de mayúsculas.
    pub async fn verify(&self, username: &str, password: &str) -> DomainResult<Option<String>> {
        let Some(user) = self.store.find_user(username).await? else {
            return Ok(None);
        };
        if user.password_digest == hash_password(password) {
            Ok(Some(user.display_name))
        } else {
            Ok(None)
        }
    }

    /// Identidad de un usuario válido; `AuthFailure` en cualquier otro caso.
    /// No toca ninguna sesión.
    pub async fn authenticate(&self, username: &str, password: &str) -> DomainResult<Identity> {
        match self.verify(username, password).await? {
            Some(display_name) => Ok(Identity { username: username.to_string(), display_name }),
            None => {
                warn!(username = %username, "login rechazado");
                Err(DomainError::AuthFailure)
            }
        }
    }

    pub fn sign_in(&self, session: &mut Session, identity: Identity) {
        info!(username = %identity.username, "login correcto");
        session.identity = Some(identity);
    }

    /// Borra la identidad y para el stream en marcha. El historial se queda:
    /// un login posterior en la misma sesión del navegador lo vuelve a ver.
    pub fn logout(&self, session: &mut Session) {
        if let Some(identity) = session.identity.take() {
            info!(username = %identity.username, "logout");
        }
        session.stream = None;
    }
}

/// Rutas de configuración que usa el servicio de detección.
#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub model: ModelId,
    pub default_image: PathBuf,
    pub default_detect_image: PathBuf,
    pub video_dir: PathBuf,
    pub webcam_device: String,
}

/// Lo que muestra la rama de imagen en un render.
#[derive(Debug, Clone)]
pub enum ImageView {
    Default { input: EncodedImage, output: EncodedImage },
    Uploaded { upload: EncodedImage, result: Option<DetectionRecord> },
}

/// Orquestador de la página de detección: elige la rama según la fuente
/// seleccionada y ejecuta la inferencia sólo cuando el usuario la dispara.
pub struct DetectionService {
    settings: DetectionSettings,
    loader: Arc<dyn ModelLoaderPort>,
    streams: Arc<dyn FrameStreamPort>,
    cameras: Arc<dyn CameraCatalogPort>,
    model: Mutex<Option<Arc<dyn DetectionModel>>>,
}

impl DetectionService {
    pub fn new(
        settings: DetectionSettings,
        loader: Arc<dyn ModelLoaderPort>,
        streams: Arc<dyn FrameStreamPort>,
        cameras: Arc<dyn CameraCatalogPort>,
    ) -> Self {
        Self { settings, loader, streams, cameras, model: Mutex::new(None) }
    }

    pub fn settings(&self) -> &DetectionSettings {
        &self.settings
    }

    /// Modelo cargado. Sólo se guarda una carga correcta; tras un fallo la
    /// siguiente llamada lo reintenta.
    pub async fn load_model(&self) -> DomainResult<Arc<dyn DetectionModel>> {
        let mut slot = self.model.lock().await;
        if let Some(model) = slot.as_ref() {
            return Ok(model.clone());
        }

        let path = self.settings.model.onnx_path.clone();
        let model = self.loader.load(&self.settings.model).await.map_err(|e| {
            error!(path = %path, error = %e, "no se pudo cargar el modelo");
            match e {
                DomainError::ModelLoad { .. } => e,
                other => DomainError::ModelLoad { path: path.clone(), reason: other.to_string() },
            }
        })?;

        info!(model = model.name(), path = %path, "modelo cargado");
        *slot = Some(model.clone());
        Ok(model)
    }

    pub fn select_mode(&self, session: &mut Session, task: &str, source: &str, percent: u8) -> DomainResult<ModeSelection> {
        let task: Task = task.parse()?;
        let confidence = Confidence::from_percent(percent)?;
        // Una etiqueta desconocida deja la fuente sin elegir; el enrutado lo informa.
        let source = source.parse::<SourceKind>().ok();

        session.selection = ModeSelection { task, source, confidence };
        Ok(session.selection)
    }

    /// Elige exactamente una rama para la selección actual.
    pub fn route(&self, session: &Session) -> DomainResult<Branch> {
        match session.selection.task {
            Task::Detection => session
                .selection
                .source
                .map(Branch::from)
                .ok_or(DomainError::InvalidSource),
        }
    }

    fn require_branch(&self, session: &Session, want: Branch) -> DomainResult<()> {
        let got = self.route(session)?;
        if got != want {
            return Err(DomainError::InvalidInput(format!(
                "current source routes to {got:?}, not {want:?}"
            )));
        }
        Ok(())
    }

    /// Guarda una subida. Nunca ejecuta inferencia.
    pub fn upload_image(&self, session: &mut Session, filename: &str, bytes: Vec<u8>) -> DomainResult<()> {
        self.require_branch(session, Branch::StaticImage)?;

        let ext = extension_of(filename).unwrap_or_default();
        if !UPLOAD_EXTENSIONS.contains(&ext.as_str()) {
            return Err(DomainError::InvalidInput(format!(
                "unsupported file type '{ext}', expected one of {}",
                UPLOAD_EXTENSIONS.join(", ")
            )));
        }

        let rgb = image::load_from_memory(&bytes)
            .map_err(|e| DomainError::ImageDecode(e.to_string()))?
            .to_rgb8();

        session.pending_upload = Some(Upload { encoded: EncodedImage::new(filename, bytes), rgb });
        session.last_result = None;
        Ok(())
    }

    /// Sólo presentación: el par por defecto si no hay subida; si la hay, la
    /// imagen subida y lo que produjo la última detección.
    pub async fn image_view(&self, session: &Session) -> DomainResult<ImageView> {
        self.require_branch(session, Branch::StaticImage)?;

        match &session.pending_upload {
            None => Ok(ImageView::Default {
                input: read_image_file(&self.settings.default_image).await?,
                output: read_image_file(&self.settings.default_detect_image).await?,
            }),
            Some(upload) => Ok(ImageView::Uploaded {
                upload: upload.encoded.clone(),
                result: session.last_result.clone(),
            }),
        }
    }

    /// Disparo de detección: una inferencia sobre la subida actual con la
    /// confianza actual; el resultado se añade al historial de la sesión.
    pub async fn detect_image(&self, session: &mut Session) -> DomainResult<DetectionRecord> {
        self.require_branch(session, Branch::StaticImage)?;
        let upload = session.pending_upload.clone().ok_or(DomainError::NoInput)?;
        let model = self.load_model().await?;

        let result = inference::detect(model, upload.rgb, session.selection.confidence).await?;
        let result_image = EncodedImage::new(result_name(&upload.encoded.name), encode_png(&result.annotated_image)?);

        let record = DetectionRecord {
            source_image: upload.encoded,
            result_image,
            boxes: result.boxes,
        };
        info!(boxes = record.boxes.len(), history = session.history.len() + 1, "detección añadida al historial");
        session.history.append(record.clone());
        session.last_result = Some(record.clone());
        Ok(record)
    }

    /// Entrega modelo y umbral al colaborador de streaming en cualquier rama
    /// que no sea de imagen. Se para el stream anterior de la sesión.
    pub async fn start_stream(&self, session: &mut Session, target: StreamTarget) -> DomainResult<StreamSource> {
        let branch = self.route(session)?;
        let source = self.resolve_source(branch, target)?;
        let model = self.load_model().await?;
        let confidence = session.selection.confidence.value();

        session.stream = None;
        let handle = self
            .streams
            .start(StreamRequest { source: source.clone(), model, confidence })
            .await
            .inspect_err(|e| warn!(source = ?source, error = %e, "no se pudo iniciar el stream"))?;

        info!(source = ?source, confidence, "stream iniciado");
        session.stream = Some(handle);
        Ok(source)
    }

    pub fn stop_stream(&self, session: &mut Session) -> bool {
        session.stream.take().is_some()
    }

    fn resolve_source(&self, branch: Branch, target: StreamTarget) -> DomainResult<StreamSource> {
        match branch {
            Branch::StaticImage => Err(DomainError::InvalidInput(
                "the Image source does not stream; upload an image instead".into(),
            )),
            Branch::StoredVideo => {
                let name = target.video.ok_or_else(|| DomainError::InvalidInput("no video selected".into()))?;
                if name.is_empty() || name.contains(['/', '\\']) || name == ".." || name == "." {
                    return Err(DomainError::InvalidInput(format!("invalid video name: {name}")));
                }
                let path = self.settings.video_dir.join(&name);
                Ok(StreamSource::StoredVideo(path.to_string_lossy().into_owned()))
            }
            Branch::Webcam => Ok(StreamSource::Webcam(
                target.device.unwrap_or_else(|| self.settings.webcam_device.clone()),
            )),
            Branch::NetworkStream => {
                let url = target.url.ok_or_else(|| DomainError::InvalidInput("no RTSP url given".into()))?;
                if !(url.starts_with("rtsp://") || url.starts_with("rtsps://")) {
                    return Err(DomainError::InvalidInput(format!("not an rtsp url: {url}")));
                }
                Ok(StreamSource::Rtsp(url))
            }
            Branch::HostedVideo => {
                let url = target.url.ok_or_else(|| DomainError::InvalidInput("no YouTube url given".into()))?;
                if !(url.starts_with("https://") || url.starts_with("http://")) {
                    return Err(DomainError::InvalidInput(format!("not a video url: {url}")));
                }
                Ok(StreamSource::YouTube(url))
            }
        }
    }

    /// Vídeos guardados que ofrece la fuente Video.
    pub async fn list_videos(&self) -> Vec<String> {
        let mut out = Vec::new();
        let Ok(mut dir) = tokio::fs::read_dir(&self.settings.video_dir).await else {
            return out;
        };
        while let Ok(Some(entry)) = dir.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            let is_video = extension_of(&name).is_some_and(|e| VIDEO_EXTENSIONS.contains(&e.as_str()));
            if is_video {
                out.push(name);
            }
        }
        out.sort();
        out
    }

    pub async fn list_webcams(&self) -> Vec<CameraInfo> {
        self.cameras.list_cameras().await.unwrap_or_else(|e| {
            warn!(error = %e, "no se pudieron listar las cámaras");
            Vec::new()
        })
    }
}

fn result_name(source: &str) -> String {
    let stem = Path::new(source)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".into());
    format!("{stem}_detected.png")
}

fn encode_png(img: &RgbImage) -> DomainResult<Vec<u8>> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| DomainError::OperationFailed(format!("png encode: {e}")))?;
    Ok(buf)
}

async fn read_image_file(path: &Path) -> DomainResult<EncodedImage> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| DomainError::ImageDecode(format!("{}: {e}", path.display())))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(EncodedImage::new(name, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{ChannelOrder, RawPrediction, StopSignal, StreamHandle};
    use crate::domain::{detection::Detection, user::User};
    use async_trait::async_trait;
    use image::Rgb;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::broadcast;

    struct MemoryStore(HashMap<String, User>);

    #[async_trait]
    impl CredentialStorePort for MemoryStore {
        async fn find_user(&self, username: &str) -> DomainResult<Option<User>> {
            Ok(self.0.get(username).cloned())
        }
    }

    fn alice_store() -> Arc<MemoryStore> {
        let mut users = HashMap::new();
        users.insert(
            "alice".to_string(),
            User {
                username: "alice".into(),
                display_name: "Alice A.".into(),
                password_digest: hash_password("secret123"),
            },
        );
        Arc::new(MemoryStore(users))
    }

    #[derive(Default)]
    struct FakeModel {
        calls: StdMutex<Vec<f32>>,
    }

    impl DetectionModel for FakeModel {
        fn name(&self) -> &str {
            "fake"
        }

        fn predict(&self, image: &RgbImage, conf: f32) -> DomainResult<RawPrediction> {
            self.calls.lock().unwrap().push(conf);
            Ok(RawPrediction {
                plot: image.clone(),
                order: ChannelOrder::Bgr,
                boxes: vec![Detection {
                    x1: 0.0, y1: 0.0, x2: 1.0, y2: 1.0, score: 0.9, class_id: 0, label: "apple".into(),
                }],
            })
        }
    }

    struct FakeLoader {
        model: Arc<FakeModel>,
        failures_left: AtomicUsize,
        loads: AtomicUsize,
    }

    #[async_trait]
    impl ModelLoaderPort for FakeLoader {
        async fn load(&self, model: &ModelId) -> DomainResult<Arc<dyn DetectionModel>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(DomainError::NotFound(model.onnx_path.clone()));
            }
            Ok(self.model.clone())
        }
    }

    #[derive(Default)]
    struct FakeStreams {
        requests: StdMutex<Vec<(StreamSource, f32, String)>>,
        fail_with_permission: AtomicBool,
    }

    #[async_trait]
    impl FrameStreamPort for FakeStreams {
        async fn start(&self, request: StreamRequest) -> DomainResult<StreamHandle> {
            if self.fail_with_permission.load(Ordering::SeqCst) {
                return Err(DomainError::StreamPermission("/dev/video0".into()));
            }
            self.requests.lock().unwrap().push((
                request.source.clone(),
                request.confidence,
                request.model.name().to_string(),
            ));
            let (tx, _) = broadcast::channel(4);
            Ok(StreamHandle::new(request.source, tx, StopSignal::new()))
        }
    }

    struct NoCameras;

    #[async_trait]
    impl CameraCatalogPort for NoCameras {
        async fn list_cameras(&self) -> DomainResult<Vec<CameraInfo>> {
            Ok(vec![])
        }
    }

    struct Fixture {
        service: DetectionService,
        model: Arc<FakeModel>,
        loader: Arc<FakeLoader>,
        streams: Arc<FakeStreams>,
        _dir: tempfile::TempDir,
    }

    fn fixture(failures: usize) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let default_image = dir.path().join("default.jpg");
        let default_detect_image = dir.path().join("default_detected.jpg");
        std::fs::write(&default_image, b"in").unwrap();
        std::fs::write(&default_detect_image, b"out").unwrap();

        let model = Arc::new(FakeModel::default());
        let loader = Arc::new(FakeLoader {
            model: model.clone(),
            failures_left: AtomicUsize::new(failures),
            loads: AtomicUsize::new(0),
        });
        let streams = Arc::new(FakeStreams::default());
        let settings = DetectionSettings {
            model: ModelId { name: "apple".into(), onnx_path: "weights/best.onnx".into() },
            default_image,
            default_detect_image,
            video_dir: dir.path().to_path_buf(),
            webcam_device: "/dev/video0".into(),
        };
        let service = DetectionService::new(settings, loader.clone(), streams.clone(), Arc::new(NoCameras));
        Fixture { service, model, loader, streams, _dir: dir }
    }

    fn png_bytes() -> Vec<u8> {
        encode_png(&RgbImage::from_pixel(4, 4, Rgb([200, 10, 10]))).unwrap()
    }

    #[tokio::test]
    async fn verify_matches_stored_digest() {
        let auth = AuthService::new(alice_store());
        assert_eq!(auth.verify("alice", "secret123").await.unwrap().as_deref(), Some("Alice A."));
        assert_eq!(auth.verify("alice", "wrong").await.unwrap(), None);
        assert_eq!(auth.verify("bob", "anything").await.unwrap(), None);
    }

    #[tokio::test]
    async fn verify_does_not_normalize_input() {
        let auth = AuthService::new(alice_store());
        assert_eq!(auth.verify("Alice", "secret123").await.unwrap(), None);
        assert_eq!(auth.verify(" alice", "secret123").await.unwrap(), None);
        assert_eq!(auth.verify("alice", "secret123 ").await.unwrap(), None);
    }

    #[tokio::test]
    async fn verify_is_deterministic() {
        let auth = AuthService::new(alice_store());
        for _ in 0..5 {
            assert_eq!(auth.verify("alice", "secret123").await.unwrap().as_deref(), Some("Alice A."));
        }
    }

    #[tokio::test]
    async fn authenticate_returns_identity_or_auth_failure() {
        let auth = AuthService::new(alice_store());
        let identity = auth.authenticate("alice", "secret123").await.unwrap();
        assert_eq!((identity.username.as_str(), identity.display_name.as_str()), ("alice", "Alice A."));

        let err = auth.authenticate("bob", "anything").await.unwrap_err();
        assert!(matches!(err, DomainError::AuthFailure));
    }

    #[tokio::test]
    async fn logout_clears_identity_but_keeps_history() {
        let f = fixture(0);
        let auth = AuthService::new(alice_store());
        let mut session = Session::default();
        auth.sign_in(&mut session, auth.authenticate("alice", "secret123").await.unwrap());
        f.service.upload_image(&mut session, "apple.png", png_bytes()).unwrap();
        f.service.detect_image(&mut session).await.unwrap();

        auth.logout(&mut session);
        assert!(session.identity.is_none());
        assert_eq!(session.history.len(), 1);
    }

    #[test]
    fn digest_is_hex_sha256() {
        assert_eq!(
            hash_password("secret123"),
            "fcf730b6d95236ecd3c9fc2d92d7b6b2bb061514961aec041d6c7a7192f592e4"
        );
    }

    #[tokio::test]
    async fn no_upload_shows_defaults_without_inference() {
        let f = fixture(0);
        let session = Session::default();

        let view = f.service.image_view(&session).await.unwrap();
        match view {
            ImageView::Default { input, output } => {
                assert_eq!(input.bytes, b"in");
                assert_eq!(output.bytes, b"out");
            }
            other => panic!("unexpected view {other:?}"),
        }
        assert!(f.model.calls.lock().unwrap().is_empty());
        assert_eq!(f.loader.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn upload_alone_does_not_infer() {
        let f = fixture(0);
        let mut session = Session::default();
        f.service.upload_image(&mut session, "apple.png", png_bytes()).unwrap();
        f.service.image_view(&session).await.unwrap();
        f.service.image_view(&session).await.unwrap();

        assert!(f.model.calls.lock().unwrap().is_empty());
        assert!(session.history.is_empty());
    }

    #[tokio::test]
    async fn one_trigger_is_one_inference_with_current_confidence() {
        let f = fixture(0);
        let mut session = Session::default();
        f.service.select_mode(&mut session, "Detection", "Image", 40).unwrap();
        f.service.upload_image(&mut session, "apple.png", png_bytes()).unwrap();

        let record = f.service.detect_image(&mut session).await.unwrap();
        assert_eq!(*f.model.calls.lock().unwrap(), vec![0.40]);
        assert_eq!(record.boxes.len(), 1);
        assert_eq!(record.result_image.name, "apple_detected.png");
        assert_eq!(session.history.len(), 1);

        match f.service.image_view(&session).await.unwrap() {
            ImageView::Uploaded { result: Some(r), .. } => assert_eq!(r, record),
            other => panic!("unexpected view {other:?}"),
        }
        assert_eq!(f.model.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn repeated_triggers_append_in_order() {
        let f = fixture(0);
        let mut session = Session::default();
        f.service.upload_image(&mut session, "first.png", png_bytes()).unwrap();
        f.service.detect_image(&mut session).await.unwrap();
        f.service.upload_image(&mut session, "second.png", png_bytes()).unwrap();
        f.service.detect_image(&mut session).await.unwrap();
        f.service.detect_image(&mut session).await.unwrap();

        let names: Vec<_> = session.history.list().iter().map(|r| r.source_image.name.as_str()).collect();
        assert_eq!(names, ["first.png", "second.png", "second.png"]);
        assert_eq!(f.model.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn detect_without_upload_is_no_input() {
        let f = fixture(0);
        let mut session = Session::default();
        let err = f.service.detect_image(&mut session).await.unwrap_err();
        assert!(matches!(err, DomainError::NoInput));
        assert!(f.model.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn model_load_failure_blocks_detection_then_retries() {
        let f = fixture(1);
        let mut session = Session::default();
        f.service.upload_image(&mut session, "apple.png", png_bytes()).unwrap();

        let err = f.service.detect_image(&mut session).await.unwrap_err();
        assert!(matches!(err, DomainError::ModelLoad { .. }));
        assert!(session.history.is_empty());

        f.service.detect_image(&mut session).await.unwrap();
        assert_eq!(f.loader.loads.load(Ordering::SeqCst), 2);
        f.service.detect_image(&mut session).await.unwrap();
        assert_eq!(f.loader.loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let f = fixture(0);
        let mut session = Session::default();
        let err = f.service.upload_image(&mut session, "apple.gif", png_bytes()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
        assert!(session.pending_upload.is_none());
    }

    #[test]
    fn undecodable_upload_is_image_decode_error() {
        let f = fixture(0);
        let mut session = Session::default();
        let err = f.service.upload_image(&mut session, "apple.jpg", b"not an image".to_vec()).unwrap_err();
        assert!(matches!(err, DomainError::ImageDecode(_)));
    }

    #[test]
    fn unknown_source_routes_nowhere() {
        let f = fixture(0);
        let mut session = Session::default();
        f.service.select_mode(&mut session, "Detection", "Satellite", 50).unwrap();
        assert!(matches!(f.service.route(&session), Err(DomainError::InvalidSource)));
    }

    #[test]
    fn routing_is_one_branch_per_source() {
        let f = fixture(0);
        let mut session = Session::default();
        for (label, branch) in [
            ("Image", Branch::StaticImage),
            ("Video", Branch::StoredVideo),
            ("Webcam", Branch::Webcam),
            ("RTSP", Branch::NetworkStream),
            ("YouTube", Branch::HostedVideo),
        ] {
            f.service.select_mode(&mut session, "Detection", label, 60).unwrap();
            assert_eq!(f.service.route(&session).unwrap(), branch);
        }
    }

    #[test]
    fn confidence_outside_slider_is_rejected() {
        let f = fixture(0);
        let mut session = Session::default();
        assert!(f.service.select_mode(&mut session, "Detection", "Image", 10).is_err());
        assert_eq!(session.selection.confidence.percent(), 40);
    }

    #[tokio::test]
    async fn streams_receive_model_and_threshold_unchanged() {
        let f = fixture(0);
        let mut session = Session::default();
        f.service.select_mode(&mut session, "Detection", "RTSP", 55).unwrap();

        let source = f
            .service
            .start_stream(&mut session, StreamTarget { url: Some("rtsp://cam/1".into()), ..Default::default() })
            .await
            .unwrap();

        assert_eq!(source, StreamSource::Rtsp("rtsp://cam/1".into()));
        let reqs = f.streams.requests.lock().unwrap();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].1, 0.55);
        assert_eq!(reqs[0].2, "fake");
        assert!(session.stream.is_some());
    }

    #[tokio::test]
    async fn webcam_defaults_to_configured_device() {
        let f = fixture(0);
        let mut session = Session::default();
        f.service.select_mode(&mut session, "Detection", "Webcam", 40).unwrap();
        let source = f.service.start_stream(&mut session, StreamTarget::default()).await.unwrap();
        assert_eq!(source, StreamSource::Webcam("/dev/video0".into()));
    }

    #[tokio::test]
    async fn stored_video_names_cannot_escape_the_video_dir() {
        let f = fixture(0);
        let mut session = Session::default();
        f.service.select_mode(&mut session, "Detection", "Video", 40).unwrap();
        let err = f
            .service
            .start_stream(&mut session, StreamTarget { video: Some("../etc/passwd".into()), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
        assert!(f.streams.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stream_permission_errors_are_reported_not_fatal() {
        let f = fixture(0);
        let mut session = Session::default();
        f.service.select_mode(&mut session, "Detection", "Webcam", 40).unwrap();
        f.streams.fail_with_permission.store(true, Ordering::SeqCst);

        let err = f.service.start_stream(&mut session, StreamTarget::default()).await.unwrap_err();
        assert!(matches!(err, DomainError::StreamPermission(_)));
        assert!(session.stream.is_none());

        f.streams.fail_with_permission.store(false, Ordering::SeqCst);
        f.service.start_stream(&mut session, StreamTarget::default()).await.unwrap();
        assert!(session.stream.is_some());
    }

    #[tokio::test]
    async fn image_source_cannot_stream() {
        let f = fixture(0);
        let mut session = Session::default();
        let err = f.service.start_stream(&mut session, StreamTarget::default()).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn listed_videos_are_filtered_by_extension() {
        let f = fixture(0);
        let dir = f.service.settings().video_dir.clone();
        std::fs::write(dir.join("orchard.mp4"), b"").unwrap();
        std::fs::write(dir.join("notes.txt"), b"").unwrap();
        assert_eq!(f.service.list_videos().await, vec!["orchard.mp4".to_string()]);
    }
}
