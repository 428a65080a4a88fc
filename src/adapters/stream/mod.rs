pub mod ffmpeg;
pub mod player;

use anyhow::Result;
use image::RgbImage;
use std::io;

use crate::domain::errors::DomainError;

/// Fuente de frames bloqueante que consume el hilo del pipeline.
pub trait FrameReader {
    /// `Ok(None)` al final del stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// Un problema de permisos en cualquier punto de la cadena de causas es
/// `StreamPermission`; el resto es un fallo genérico del stream.
pub fn classify_stream_error(err: &anyhow::Error) -> DomainError {
    let denied = err
        .chain()
        .filter_map(|c| c.downcast_ref::<io::Error>())
        .any(|e| e.kind() == io::ErrorKind::PermissionDenied);
    if denied {
        DomainError::StreamPermission(format!("{err:#}"))
    } else {
        DomainError::StreamFailure(format!("{err:#}"))
    }
}
