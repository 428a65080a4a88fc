use anyhow::{bail, Context, Result};
use image::{ImageFormat, Rgb, RgbImage};
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::adapters::stream::FrameReader;

const MMAP_BUFFERS: u32 = 4;

/// Parámetros pedidos a la webcam; el driver puede ajustarlos.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub camera_path: String,
    pub fourcc: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            camera_path: "/dev/video0".into(),
            fourcc: "MJPG".into(),
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

/// Formatos de píxel que el lector sabe pasar a RGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
    Mjpg,
    Yuyv,
}

impl PixelFormat {
    fn from_fourcc(fourcc: &FourCC) -> Result<Self> {
        match &fourcc.repr {
            b"MJPG" => Ok(Self::Mjpg),
            b"YUYV" => Ok(Self::Yuyv),
            other => bail!("unsupported webcam pixel format {}", String::from_utf8_lossy(other)),
        }
    }
}

fn parse_fourcc(code: &str) -> Result<FourCC> {
    let bytes: [u8; 4] = code
        .as_bytes()
        .try_into()
        .with_context(|| format!("FourCC '{code}' must be 4 characters"))?;
    Ok(FourCC::new(&bytes))
}

/// Lector de frames de una webcam V4L2 (MMAP), siempre en RGB.
///
/// Es dueño del dispositivo: al soltarlo se para el stream y se cierra el
/// descriptor. `stream` va primero para caer antes que el dispositivo.
pub struct V4l2Capture {
    stream: Stream<'static>,
    _device: Device,
    format: PixelFormat,
    width: u32,
    height: u32,
}

impl V4l2Capture {
    pub fn open(cfg: &CaptureConfig) -> Result<Self> {
        let dev = Device::with_path(&cfg.camera_path)
            .with_context(|| format!("opening webcam {}", cfg.camera_path))?;

        let mut wanted = dev.format()?;
        wanted.fourcc = parse_fourcc(&cfg.fourcc)?;
        wanted.width = cfg.width;
        wanted.height = cfg.height;
        let negotiated = dev.set_format(&wanted)?;
        let format = PixelFormat::from_fourcc(&negotiated.fourcc)?;

        // No todos los drivers aceptan fijar el intervalo; se ignora el fallo.
        if let Ok(mut params) = dev.params() {
            params.interval.numerator = 1;
            params.interval.denominator = cfg.fps.max(1);
            let _ = dev.set_params(&params);
        }

        // El stream guarda su propia referencia al handle; no toma prestado `dev`.
        let stream = Stream::with_buffers(&dev, v4l::buffer::Type::VideoCapture, MMAP_BUFFERS)
            .with_context(|| format!("mapping buffers of {}", cfg.camera_path))?;

        tracing::info!(
            device = %cfg.camera_path,
            width = negotiated.width,
            height = negotiated.height,
            format = ?format,
            "Webcam abierta"
        );

        Ok(Self { stream, _device: dev, format, width: negotiated.width, height: negotiated.height })
    }
}

fn decode(format: PixelFormat, width: u32, height: u32, data: &[u8]) -> Result<RgbImage> {
    match format {
        PixelFormat::Mjpg => Ok(image::load_from_memory_with_format(data, ImageFormat::Jpeg)?.to_rgb8()),
        PixelFormat::Yuyv => Ok(yuyv_to_rgb(data, width, height)),
    }
}

impl FrameReader for V4l2Capture {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        // Una webcam no se acaba: cualquier fallo de lectura es un error.
        let (data, _) = self.stream.next()?;
        decode(self.format, self.width, self.height, data).map(Some)
    }
}

/// BT.601, rango completo.
fn bt601(y: u8, u: f32, v: f32) -> Rgb<u8> {
    let y = f32::from(y);
    let clamp = |c: f32| c.clamp(0.0, 255.0) as u8;
    Rgb([
        clamp(y + 1.402 * v),
        clamp(y - 0.344_136 * u - 0.714_136 * v),
        clamp(y + 1.772 * u),
    ])
}

/// YUYV (4:2:2) a RGB. Un buffer corto deja en negro lo que falte.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> RgbImage {
    let mut out = RgbImage::new(width, height);
    let total = u64::from(width) * u64::from(height);

    // [Y0 U Y1 V] -> dos píxeles que comparten crominancia.
    for (pair, px) in yuyv.chunks_exact(4).enumerate() {
        let (u, v) = (f32::from(px[1]) - 128.0, f32::from(px[3]) - 128.0);
        for (k, y) in [px[0], px[2]].into_iter().enumerate() {
            let idx = pair as u64 * 2 + k as u64;
            if idx >= total {
                return out;
            }
            let (x, row) = ((idx % u64::from(width)) as u32, (idx / u64::from(width)) as u32);
            out.put_pixel(x, row, bt601(y, u, v));
        }
    }
    out
}
