use anyhow::{anyhow, Result};
use image::{imageops::FilterType, RgbImage};
use ndarray::{s, Array4, ArrayView2, ArrayViewD, Axis, IxDyn};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::Session;
use ort::value::Value;
use std::fs;
use std::sync::Mutex;

use crate::adapters::onnx::plot;
use crate::application::ports::{ChannelOrder, DetectionModel, RawPrediction};
use crate::domain::detection::{non_max_suppression, Detection};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::model::YoloParams;

/// YOLOv8 exportado a ONNX. La salida esperada es `[1, 4 + clases, candidatos]`.
pub struct OnnxYoloEngine {
    name: String,
    // `Session::run` necesita `&mut`; el mismo modelo lo comparten todas las sesiones.
    session: Mutex<Session>,
    params: YoloParams,
    class_names: Vec<String>,
}

impl OnnxYoloEngine {
    pub fn load(name: &str, path: &str, params: YoloParams, class_names: Vec<String>) -> Result<Self> {
        let mut builder = Session::builder()?.with_intra_threads(4)?;

        // CUDA es opcional: si está disponible se registra, si no continuamos en CPU.
        let cuda = CUDAExecutionProvider::default().build();
        if let Ok(builder_with_cuda) = builder.clone().with_execution_providers([cuda]) {
            builder = builder_with_cuda;
        }

        let model_bytes = fs::read(path)?;
        let session = builder.commit_from_memory(&model_bytes)?;

        Ok(Self {
            name: name.to_string(),
            session: Mutex::new(session),
            params,
            class_names,
        })
    }

    pub fn infer(&self, rgb: &RgbImage, params: &YoloParams) -> Result<Vec<Detection>> {
        let imgsz = params.input_size as usize;
        let resized = image::imageops::resize(rgb, imgsz as u32, imgsz as u32, FilterType::Triangle);

        let mut input = Array4::<f32>::zeros((1, 3, imgsz, imgsz));
        for (x, y, pixel) in resized.enumerate_pixels() {
            input[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
            input[[0, 1, y as usize, x as usize]] = pixel[1] as f32 / 255.0;
            input[[0, 2, y as usize, x as usize]] = pixel[2] as f32 / 255.0;
        }

        let input_shape = vec![1, 3, imgsz as i64, imgsz as i64];
        let input_tensor = Value::from_array((input_shape, input.into_raw_vec_and_offset().0))?;

        let mut session = self.session.lock().map_err(|_| anyhow!("sesión ONNX envenenada"))?;
        let outputs = session.run(ort::inputs![input_tensor])?;
        let (shape_out, data_out) = outputs[0].try_extract_tensor::<f32>()?;

        let dims: Vec<usize> = shape_out.iter().map(|&x| x as usize).collect();
        let array_view = ArrayViewD::from_shape(IxDyn(&dims), data_out)?;
        let view = array_view
            .index_axis(Axis(0), 0)
            .into_dimensionality::<ndarray::Ix2>()?;

        let sx = rgb.width() as f32 / imgsz as f32;
        let sy = rgb.height() as f32 / imgsz as f32;
        let candidates = decode_candidates(view, params.conf_threshold, sx, sy, &self.class_names);

        Ok(non_max_suppression(candidates, params.iou_threshold, params.max_detections))
    }
}

/// Convierte la matriz cruda `[4 + clases, N]` en cajas en píxeles de la imagen original.
/// Sólo queda la mejor clase de cada candidato, y sólo por encima de `conf`.
pub fn decode_candidates(
    view: ArrayView2<'_, f32>,
    conf: f32,
    sx: f32,
    sy: f32,
    class_names: &[String],
) -> Vec<Detection> {
    let mut out = Vec::new();
    if view.shape()[0] <= 4 {
        return out;
    }

    for i in 0..view.shape()[1] {
        let scores = view.slice(s![4.., i]);
        let Some((class_id, &max_score)) = scores
            .indexed_iter()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
        else {
            continue;
        };

        if max_score >= conf {
            let cx = view[[0, i]];
            let cy = view[[1, i]];
            let w = view[[2, i]];
            let h = view[[3, i]];

            out.push(Detection {
                x1: (cx - w / 2.0) * sx,
                y1: (cy - h / 2.0) * sy,
                x2: (cx + w / 2.0) * sx,
                y2: (cy + h / 2.0) * sy,
                score: max_score,
                class_id,
                label: class_names
                    .get(class_id)
                    .cloned()
                    .unwrap_or_else(|| format!("class{class_id}")),
            });
        }
    }
    out
}

impl DetectionModel for OnnxYoloEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, image: &RgbImage, conf: f32) -> DomainResult<RawPrediction> {
        let params = self.params.with_confidence(conf);
        let boxes = self
            .infer(image, &params)
            .map_err(|e| DomainError::OperationFailed(format!("inference failed: {e}")))?;

        Ok(RawPrediction {
            plot: plot::plot_bgr(image, &boxes),
            order: ChannelOrder::Bgr,
            boxes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn names() -> Vec<String> {
        vec!["apple".into(), "leaf".into()]
    }

    /// Columnas: candidatos. Filas: cx, cy, w, h, score(apple), score(leaf).
    fn raw(cols: &[[f32; 6]]) -> Array2<f32> {
        let mut a = Array2::<f32>::zeros((6, cols.len()));
        for (i, c) in cols.iter().enumerate() {
            for (r, v) in c.iter().enumerate() {
                a[[r, i]] = *v;
            }
        }
        a
    }

    #[test]
    fn picks_best_class_and_scales_to_source() {
        let a = raw(&[[320.0, 320.0, 64.0, 32.0, 0.2, 0.8]]);
        let out = decode_candidates(a.view(), 0.4, 2.0, 0.5, &names());

        assert_eq!(out.len(), 1);
        let d = &out[0];
        assert_eq!(d.class_id, 1);
        assert_eq!(d.label, "leaf");
        assert_eq!((d.x1, d.x2), (576.0, 704.0));
        assert_eq!((d.y1, d.y2), (152.0, 168.0));
    }

    #[test]
    fn drops_candidates_below_threshold() {
        let a = raw(&[[10.0, 10.0, 4.0, 4.0, 0.39, 0.1], [50.0, 50.0, 4.0, 4.0, 0.40, 0.0]]);
        let out = decode_candidates(a.view(), 0.40, 1.0, 1.0, &names());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].score, 0.40);
    }

    #[test]
    fn unknown_class_gets_a_generic_label() {
        let a = raw(&[[10.0, 10.0, 4.0, 4.0, 0.0, 0.9]]);
        let out = decode_candidates(a.view(), 0.5, 1.0, 1.0, &["apple".to_string()]);
        assert_eq!(out[0].label, "class1");
    }

    #[test]
    fn malformed_output_yields_nothing() {
        let a = Array2::<f32>::zeros((4, 3));
        assert!(decode_candidates(a.view(), 0.1, 1.0, 1.0, &names()).is_empty());
    }
}
