use serde::{Deserialize, Serialize};

use super::detection::Detection;

/// Imagen codificada y el nombre con el que se subió.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedImage {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl EncodedImage {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let mime = mime_for_name(&name).to_string();
        Self { name, mime, bytes }
    }
}

pub fn extension_of(name: &str) -> Option<String> {
    std::path::Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

pub fn mime_for_name(name: &str) -> &'static str {
    match extension_of(name).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub source_image: EncodedImage,
    pub result_image: EncodedImage,
    pub boxes: Vec<Detection>,
}

/// Lista, sólo de añadir, de las detecciones de una sesión.
///
/// Crece mientras vive la sesión; nunca se descarta nada.
#[derive(Debug, Default, Clone)]
pub struct HistoryLedger {
    records: Vec<DetectionRecord>,
}

impl HistoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: DetectionRecord) {
        self.records.push(record);
    }

    /// La más antigua primero.
    pub fn list(&self) -> &[DetectionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
