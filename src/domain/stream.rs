use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use super::detection::Detection;

/// De dónde salen los frames de una rama de streaming. Se pasa tal cual al
/// colaborador de streaming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target")]
pub enum StreamSource {
    StoredVideo(String),
    Webcam(String),
    Rtsp(String),
    YouTube(String),
}

impl StreamSource {
    pub fn target(&self) -> &str {
        match self {
            StreamSource::StoredVideo(t)
            | StreamSource::Webcam(t)
            | StreamSource::Rtsp(t)
            | StreamSource::YouTube(t) => t,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMeta {
    pub width: u32,
    pub height: u32,
    pub infer_ms: f32,
    pub fps_est: f32,
    pub detections: Vec<Detection>,
}

/// Lo que publica el bucle de frames a los suscriptores.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Frame { meta: FrameMeta, jpeg: Vec<u8> },
    Error(String),
    Finished,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WsMessage {
    Frame { meta: FrameMeta, summary: String },
    Error { message: String },
    Finished,
}

pub fn summarize_detections(detections: &[Detection]) -> String {
    let mut counts = BTreeMap::new();
    for det in detections {
        *counts.entry(&det.label).or_insert(0) += 1;
    }
    counts.iter()
        .map(|(label, count)| format!("{} {}", count, label))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(label: &str) -> Detection {
        Detection { x1: 0.0, y1: 0.0, x2: 1.0, y2: 1.0, score: 0.9, class_id: 0, label: label.into() }
    }

    #[test]
    fn summary_counts_labels() {
        let s = summarize_detections(&[det("apple"), det("leaf"), det("apple")]);
        assert_eq!(s, "2 apple, 1 leaf");
    }

    #[test]
    fn summary_of_nothing_is_empty() {
        assert_eq!(summarize_detections(&[]), "");
    }

    #[test]
    fn ws_message_is_tagged_by_type() {
        let json = serde_json::to_value(WsMessage::Error { message: "boom".into() }).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "boom");
    }
}
