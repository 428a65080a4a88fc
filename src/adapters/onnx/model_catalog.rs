use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::adapters::onnx::yolo_engine::OnnxYoloEngine;
use crate::application::ports::{DetectionModel, ModelLoaderPort};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::model::{ModelId, YoloParams};

/// Carga modelos YOLO desde disco con los parámetros de la configuración.
pub struct OnnxModelCatalog {
    params: YoloParams,
    class_names: Vec<String>,
}

impl OnnxModelCatalog {
    pub fn new(params: YoloParams, class_names: Vec<String>) -> Self {
        Self { params, class_names }
    }

    fn validate_model(model: &ModelId) -> DomainResult<()> {
        if model.onnx_path.trim().is_empty() {
            return Err(load_error(model, "onnx_path empty"));
        }
        if !Path::new(&model.onnx_path).is_file() {
            return Err(load_error(model, "model file not found"));
        }
        Ok(())
    }
}

fn load_error(model: &ModelId, reason: impl Into<String>) -> DomainError {
    DomainError::ModelLoad { path: model.onnx_path.clone(), reason: reason.into() }
}

#[async_trait]
impl ModelLoaderPort for OnnxModelCatalog {
    async fn load(&self, model: &ModelId) -> DomainResult<Arc<dyn DetectionModel>> {
        Self::validate_model(model)?;

        let (name, path) = (model.name.clone(), model.onnx_path.clone());
        let params = self.params.clone();
        let class_names = self.class_names.clone();
        let engine = tokio::task::spawn_blocking(move || OnnxYoloEngine::load(&name, &path, params, class_names))
            .await
            .map_err(|e| load_error(model, e.to_string()))?
            .map_err(|e| load_error(model, format!("{e:#}")))?;

        Ok(Arc::new(engine))
    }
}
