pub mod model_catalog;
pub mod plot;
pub mod yolo_engine;
