use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::model::YoloParams;

/// Ajustes estáticos de la aplicación, leídos de variables de entorno.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: String,
    pub model_path: String,
    pub class_names: Vec<String>,
    pub yolo: YoloParams,
    pub users_db: PathBuf,
    pub default_image: PathBuf,
    pub default_detect_image: PathBuf,
    pub overview_images: Vec<PathBuf>,
    pub video_dir: PathBuf,
    pub webcam_device: String,
    pub static_dir: PathBuf,
    pub session_ttl: Duration,
    pub max_upload_bytes: usize,
    pub ffmpeg_bin: String,
    pub ytdlp_bin: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8090".into(),
            model_path: "weights/best.onnx".into(),
            class_names: vec!["apple".into()],
            yolo: YoloParams::default(),
            users_db: "users.db".into(),
            default_image: "images/apple.jpg".into(),
            default_detect_image: "images/apple_detected.jpg".into(),
            overview_images: vec!["images/apple.jpg".into(), "images/apple detection.jpg".into()],
            video_dir: "videos".into(),
            webcam_device: "/dev/video0".into(),
            static_dir: "static".into(),
            session_ttl: Duration::from_secs(3600),
            max_upload_bytes: 50 * 1024 * 1024,
            ffmpeg_bin: "ffmpeg".into(),
            ytdlp_bin: "yt-dlp".into(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Igual que `from_env` pero con una fuente de variables arbitraria.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let d = Self::default();
        let text = |key: &str, default: String| get(key).filter(|v| !v.is_empty()).unwrap_or(default);

        let yolo = YoloParams {
            input_size: parse_or(&get, "APP_INPUT_SIZE", d.yolo.input_size)?,
            iou_threshold: parse_or(&get, "APP_IOU_THRESHOLD", d.yolo.iou_threshold)?,
            max_detections: parse_or(&get, "APP_MAX_DETECTIONS", d.yolo.max_detections)?,
            ..d.yolo
        };

        Ok(Self {
            bind: text("APP_BIND", d.bind),
            model_path: text("APP_MODEL_PATH", d.model_path),
            class_names: get("APP_CLASS_NAMES").map(|v| split_list(&v)).unwrap_or(d.class_names),
            yolo,
            users_db: text("APP_USERS_DB", d.users_db.to_string_lossy().into_owned()).into(),
            default_image: text("APP_DEFAULT_IMAGE", d.default_image.to_string_lossy().into_owned()).into(),
            default_detect_image: text(
                "APP_DEFAULT_DETECT_IMAGE",
                d.default_detect_image.to_string_lossy().into_owned(),
            )
            .into(),
            overview_images: get("APP_OVERVIEW_IMAGES")
                .map(|v| split_list(&v).into_iter().map(PathBuf::from).collect())
                .unwrap_or(d.overview_images),
            video_dir: text("APP_VIDEO_DIR", d.video_dir.to_string_lossy().into_owned()).into(),
            webcam_device: text("APP_WEBCAM_DEVICE", d.webcam_device),
            static_dir: text("APP_STATIC_DIR", d.static_dir.to_string_lossy().into_owned()).into(),
            session_ttl: Duration::from_secs(parse_or(&get, "APP_SESSION_TTL_SECS", d.session_ttl.as_secs())?),
            max_upload_bytes: parse_or(&get, "APP_MAX_UPLOAD_BYTES", d.max_upload_bytes)?,
            ffmpeg_bin: text("APP_FFMPEG_BIN", d.ffmpeg_bin),
            ytdlp_bin: text("APP_YTDLP_BIN", d.ytdlp_bin),
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        _ => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
}
