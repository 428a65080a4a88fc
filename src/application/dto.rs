use base64::{prelude::BASE64_STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::application::services::ImageView;
use crate::domain::{
    camera::CameraInfo,
    detection::Detection,
    history::{DetectionRecord, EncodedImage},
    mode::{Branch, ModeSelection},
    stream::StreamSource,
    user::Identity,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub authenticated: bool,
    pub username: Option<String>,
    pub name: Option<String>,
    pub dark_mode: bool,
}

impl SessionResponse {
    pub fn anonymous() -> Self {
        Self { authenticated: false, username: None, name: None, dark_mode: false }
    }

    pub fn from_parts(identity: Option<&Identity>, dark_mode: bool) -> Self {
        Self {
            authenticated: identity.is_some(),
            username: identity.map(|i| i.username.clone()),
            name: identity.map(|i| i.display_name.clone()),
            dark_mode,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferencesRequest {
    pub dark_mode: bool,
}

/// Estado de la barra lateral: tarea, fuente y confianza (en porcentaje).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeRequest {
    #[serde(default = "default_task")]
    pub task: String,
    pub source: String,
    pub confidence: u8,
}

fn default_task() -> String {
    "Detection".to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct ModeResponse {
    pub task: String,
    pub source: Option<String>,
    pub confidence_percent: u8,
    pub confidence: f32,
    pub branch: Option<Branch>,
}

impl From<&ModeSelection> for ModeResponse {
    fn from(sel: &ModeSelection) -> Self {
        Self {
            task: format!("{:?}", sel.task),
            source: sel.source.map(|s| s.label().to_string()),
            confidence_percent: sel.confidence.percent(),
            confidence: sel.confidence.value(),
            branch: sel.source.map(Branch::from),
        }
    }
}

/// Vídeo guardado, dispositivo o URL que debe abrir la rama de streaming.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamTarget {
    pub video: Option<String>,
    pub device: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamStartedResponse {
    pub ok: bool,
    pub source: StreamSource,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePayload {
    pub name: String,
    pub mime: String,
    pub data_base64: String,
}

impl From<&EncodedImage> for ImagePayload {
    fn from(img: &EncodedImage) -> Self {
        Self {
            name: img.name.clone(),
            mime: img.mime.clone(),
            data_base64: BASE64_STANDARD.encode(&img.bytes),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BoxPayload {
    pub data: [f32; 6],
    pub label: String,
}

impl From<&Detection> for BoxPayload {
    fn from(d: &Detection) -> Self {
        Self { data: d.data(), label: d.label.clone() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionPayload {
    pub source_image: ImagePayload,
    pub result_image: ImagePayload,
    pub boxes: Vec<BoxPayload>,
}

impl From<&DetectionRecord> for DetectionPayload {
    fn from(r: &DetectionRecord) -> Self {
        Self {
            source_image: (&r.source_image).into(),
            result_image: (&r.result_image).into(),
            boxes: r.boxes.iter().map(BoxPayload::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    /// Empieza en 1, como se muestra ("Detection 1", "Detection 2", ...).
    pub index: usize,
    #[serde(flatten)]
    pub record: DetectionPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub entries: Vec<HistoryEntry>,
    pub message: Option<String>,
}

impl HistoryResponse {
    pub fn from_records(records: &[DetectionRecord]) -> Self {
        let entries: Vec<HistoryEntry> = records
            .iter()
            .enumerate()
            .map(|(i, r)| HistoryEntry { index: i + 1, record: r.into() })
            .collect();
        let message = entries.is_empty().then(|| "No detection history available.".to_string());
        Self { entries, message }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionConfigResponse {
    pub tasks: Vec<String>,
    pub sources: Vec<String>,
    pub confidence_min: u8,
    pub confidence_max: u8,
    pub confidence_default: u8,
    pub upload_extensions: Vec<String>,
    pub videos: Vec<String>,
    pub webcams: Vec<CameraInfo>,
    pub model: String,
    pub model_error: Option<String>,
    pub mode: ModeResponse,
}

/// Render de la rama de imagen: el par por defecto, o la subida y su último resultado.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ImageViewResponse {
    Default { input: ImagePayload, output: ImagePayload },
    Uploaded { upload: ImagePayload, result: Option<DetectionPayload> },
}

impl From<&ImageView> for ImageViewResponse {
    fn from(view: &ImageView) -> Self {
        match view {
            ImageView::Default { input, output } => Self::Default { input: input.into(), output: output.into() },
            ImageView::Uploaded { upload, result } => Self::Uploaded {
                upload: upload.into(),
                result: result.as_ref().map(DetectionPayload::from),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectResponse {
    #[serde(flatten)]
    pub record: DetectionPayload,
    pub history_len: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HomeResponse {
    pub title: String,
    pub description: String,
    pub images: Vec<ImagePayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}
