use async_trait::async_trait;
use v4l::video::Capture;
use v4l::Device;
use crate::application::ports::CameraCatalogPort;
use crate::domain::camera::*;
use crate::domain::errors::DomainResult;

/// Lista los dispositivos de captura para la fuente Webcam.
pub struct V4l2CameraCatalog;
impl V4l2CameraCatalog { pub fn new() -> Self { Self } }

impl Default for V4l2CameraCatalog {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl CameraCatalogPort for V4l2CameraCatalog {
    async fn list_cameras(&self) -> DomainResult<Vec<CameraInfo>> {
        let nodes = v4l::context::enum_devices();
        let mut out = Vec::new();
        for node in nodes {
            let path = node.path().to_string_lossy().to_string();
            let Ok(dev) = Device::with_path(&path) else { continue };
            let Ok(caps) = dev.query_caps() else { continue };
            // Los nodos de metadatos también aparecen en /dev/video*; sólo interesan los de captura.
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            out.push(CameraInfo {
                id: CameraId { path },
                name: node.name().unwrap_or_else(|| "Unknown".to_string()),
                driver: caps.driver,
                card: caps.card,
                bus: caps.bus,
            });
        }
        out.sort_by(|a, b| a.id.path.cmp(&b.id.path));
        Ok(out)
    }
}
