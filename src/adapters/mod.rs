pub mod http;
pub mod onnx;
pub mod sqlite;
pub mod stream;
pub mod v4l2;
