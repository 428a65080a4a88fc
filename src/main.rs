use std::sync::Arc;
use std::time::Duration;
use tower_http::services::ServeDir;
use tracing_subscriber::EnvFilter;

use apple_detect::adapters::{
    http::{router, state::HttpState},
    onnx::model_catalog::OnnxModelCatalog,
    sqlite::credential_store::SqliteCredentialStore,
    stream::{
        ffmpeg::FfmpegConfig,
        player::{FramePlayer, PlayerConfig},
    },
    v4l2::{camera_repo::V4l2CameraCatalog, capture::CaptureConfig},
};
use apple_detect::application::services::{AuthService, DetectionService, DetectionSettings};
use apple_detect::application::session::SessionStore;
use apple_detect::config::AppConfig;
use apple_detect::domain::model::ModelId;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Inicializar logs (RUST_LOG=info por defecto)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = AppConfig::from_env()?;
    tracing::info!("🔧 Inicializando adaptadores de infraestructura...");

    // 2. Instanciar Adaptadores (Capa de Infraestructura)
    let credentials = Arc::new(SqliteCredentialStore::new(&cfg.users_db));
    if !credentials.path().exists() {
        tracing::warn!(
            "⚠️ No existe la tabla de usuarios {}; créala con `provision_user`",
            credentials.path().display()
        );
    }
    let model_cat = Arc::new(OnnxModelCatalog::new(cfg.yolo.clone(), cfg.class_names.clone()));
    let camera_cat = Arc::new(V4l2CameraCatalog::new());
    let player = Arc::new(FramePlayer::new(PlayerConfig {
        ffmpeg: FfmpegConfig { ffmpeg_bin: cfg.ffmpeg_bin.clone(), ytdlp_bin: cfg.ytdlp_bin.clone() },
        webcam: CaptureConfig { camera_path: cfg.webcam_device.clone(), ..CaptureConfig::default() },
        ..PlayerConfig::default()
    }));

    // 3. Instanciar Servicios (Capa de Aplicación - Casos de Uso)
    let auth = Arc::new(AuthService::new(credentials));
    let detection = Arc::new(DetectionService::new(
        DetectionSettings {
            model: ModelId { name: "apple-yolov8".into(), onnx_path: cfg.model_path.clone() },
            default_image: cfg.default_image.clone(),
            default_detect_image: cfg.default_detect_image.clone(),
            video_dir: cfg.video_dir.clone(),
            webcam_device: cfg.webcam_device.clone(),
        },
        model_cat,
        player,
        camera_cat,
    ));
    let sessions = Arc::new(SessionStore::new(cfg.session_ttl));

    // Sesiones inactivas: se purgan periódicamente (y con ellas sus streams).
    let purge = sessions.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        loop {
            tick.tick().await;
            let n = purge.purge_expired().await;
            if n > 0 {
                tracing::info!(purged = n, "sesiones caducadas eliminadas");
            }
        }
    });

    // 4. Configurar el Estado de la API
    let state = HttpState {
        auth,
        detection,
        sessions,
        overview_images: Arc::new(cfg.overview_images.clone()),
        max_upload_bytes: cfg.max_upload_bytes,
    };

    // 5. Router de Axum y archivos estáticos
    let app = router(state).fallback_service(ServeDir::new(&cfg.static_dir));

    // 6. Lanzar el Servidor
    tracing::info!("🚀 Apple Detection iniciado en http://{}", cfg.bind);
    tracing::info!("📂 Archivos estáticos servidos desde '{}'", cfg.static_dir.display());

    let listener = tokio::net::TcpListener::bind(&cfg.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
