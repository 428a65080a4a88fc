use image::RgbImage;
use std::sync::Arc;
use tracing::debug;

use crate::application::ports::{ChannelOrder, DetectionModel, RawPrediction};
use crate::domain::{
    detection::Detection,
    errors::{DomainError, DomainResult},
    model::Confidence,
};

/// Imagen anotada (siempre RGB) y las cajas detectadas.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub annotated_image: RgbImage,
    pub boxes: Vec<Detection>,
}

/// Una inferencia exacta en un hilo bloqueante. Sin lotes ni reintentos ni
/// caché: cada llamada llega al modelo.
pub async fn detect(
    model: Arc<dyn DetectionModel>,
    image: RgbImage,
    confidence: Confidence,
) -> DomainResult<DetectionResult> {
    let conf = confidence.value();
    let raw = tokio::task::spawn_blocking(move || model.predict(&image, conf))
        .await
        .map_err(|e| DomainError::OperationFailed(format!("inference task aborted: {e}")))??;

    debug!(boxes = raw.boxes.len(), conf, "inferencia completada");
    Ok(normalize(raw))
}

/// La misma conversión para quien ya corre en un hilo bloqueante (bucles de frames).
pub fn normalize(raw: RawPrediction) -> DetectionResult {
    let annotated_image = match raw.order {
        ChannelOrder::Rgb => raw.plot,
        ChannelOrder::Bgr => swap_red_blue(raw.plot),
    };
    DetectionResult { annotated_image, boxes: raw.boxes }
}

fn swap_red_blue(mut img: RgbImage) -> RgbImage {
    for px in img.pixels_mut() {
        px.0.swap(0, 2);
    }
    img
}
