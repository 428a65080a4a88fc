use serde::{Deserialize, Serialize};

use super::errors::{DomainError, DomainResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelId {
    pub name: String,       // logical name, e.g. "apple-yolov8"
    pub onnx_path: String,  // filesystem path
}

/// Posición mínima del deslizador, en porcentaje.
pub const MIN_CONFIDENCE_PERCENT: u8 = 25;
pub const MAX_CONFIDENCE_PERCENT: u8 = 100;
pub const DEFAULT_CONFIDENCE_PERCENT: u8 = 40;

/// Umbral de confianza, siempre a partir de un porcentaje del deslizador en 25..=100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Confidence {
    percent: u8,
}

impl Confidence {
    pub fn from_percent(percent: u8) -> DomainResult<Self> {
        if !(MIN_CONFIDENCE_PERCENT..=MAX_CONFIDENCE_PERCENT).contains(&percent) {
            return Err(DomainError::InvalidInput(format!(
                "confidence must be between {MIN_CONFIDENCE_PERCENT} and {MAX_CONFIDENCE_PERCENT} percent, got {percent}"
            )));
        }
        Ok(Self { percent })
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn value(&self) -> f32 {
        f32::from(self.percent) / 100.0
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Self { percent: DEFAULT_CONFIDENCE_PERCENT }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoloParams {
    pub input_size: u32,        // 640 typical
    pub conf_threshold: f32,    // 0..1
    pub iou_threshold: f32,     // 0..1
    pub max_detections: usize,  // e.g. 300
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            conf_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 300,
        }
    }
}

impl YoloParams {
    pub fn with_confidence(&self, conf: f32) -> Self {
        Self { conf_threshold: conf, ..self.clone() }
    }
}
