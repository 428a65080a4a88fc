use anyhow::{anyhow, bail, Context, Result};
use image::{ImageFormat, RgbImage};
use std::io::{self, Read};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::adapters::stream::FrameReader;

const READ_CHUNK: usize = 64 * 1024;
const STDERR_TAIL: usize = 2048;
const EXIT_POLL: Duration = Duration::from_millis(20);

/// Binarios externos que hacen de colaborador de streaming.
#[derive(Debug, Clone)]
pub struct FfmpegConfig {
    pub ffmpeg_bin: String,
    pub ytdlp_bin: String,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self { ffmpeg_bin: "ffmpeg".into(), ytdlp_bin: "yt-dlp".into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Fichero local, al ritmo nativo del vídeo.
    File,
    Rtsp,
    /// URL directa de un sitio de vídeos, al ritmo de un fichero.
    Hosted,
}

/// Lee frames MJPEG que ffmpeg escribe por stdout (`image2pipe`).
pub struct FfmpegReader {
    child: Arc<Mutex<Child>>,
    stdout: ChildStdout,
    buf: Vec<u8>,
    stderr_tail: Arc<Mutex<String>>,
}

pub fn ffmpeg_args(input: &str, kind: InputKind) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostdin"]
        .into_iter()
        .map(String::from)
        .collect();
    match kind {
        InputKind::File | InputKind::Hosted => args.push("-re".into()),
        InputKind::Rtsp => args.extend(["-rtsp_transport".into(), "tcp".into()]),
    }
    args.extend(
        ["-i", input, "-f", "image2pipe", "-vcodec", "mjpeg", "-q:v", "5", "-"]
            .into_iter()
            .map(String::from),
    );
    args
}

impl FfmpegReader {
    pub fn spawn(cfg: &FfmpegConfig, input: &str, kind: InputKind) -> Result<Self> {
        let mut child = Command::new(&cfg.ffmpeg_bin)
            .args(ffmpeg_args(input, kind))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("starting {}", cfg.ffmpeg_bin))?;

        let stdout = child.stdout.take().ok_or_else(|| anyhow!("ffmpeg stdout not captured"))?;
        let stderr_tail = Arc::new(Mutex::new(String::new()));
        if let Some(mut stderr) = child.stderr.take() {
            let tail = stderr_tail.clone();
            // Se drena stderr para que ffmpeg nunca se bloquee con el pipe lleno.
            std::thread::spawn(move || {
                let mut chunk = [0u8; 1024];
                while let Ok(n) = stderr.read(&mut chunk) {
                    if n == 0 {
                        break;
                    }
                    if let Ok(mut t) = tail.lock() {
                        t.push_str(&String::from_utf8_lossy(&chunk[..n]));
                        if t.len() > STDERR_TAIL {
                            let mut cut = t.len() - STDERR_TAIL;
                            while !t.is_char_boundary(cut) {
                                cut += 1;
                            }
                            t.drain(..cut);
                        }
                    }
                }
            });
        }

        Ok(Self {
            child: Arc::new(Mutex::new(child)),
            stdout,
            buf: Vec::with_capacity(READ_CHUNK * 2),
            stderr_tail,
        })
    }

    /// Acción que mata ffmpeg desde otro hilo. La lectura bloqueada recibe EOF.
    pub fn killer(&self) -> impl FnOnce() + Send + 'static {
        let child = self.child.clone();
        move || {
            let mut child = child.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = child.kill() {
                tracing::debug!(error = %e, "ffmpeg ya había terminado");
            }
        }
    }

    fn read_jpeg(&mut self) -> Result<Option<Vec<u8>>> {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            if let Some(frame) = take_jpeg(&mut self.buf) {
                return Ok(Some(frame));
            }
            let n = self.stdout.read(&mut chunk)?;
            if n == 0 {
                return self.finish().map(|_| None);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Al llegar a EOF: una salida limpia cierra el stream, cualquier otra es
    /// un error con las últimas líneas de ffmpeg.
    fn finish(&mut self) -> Result<()> {
        let status = self.wait_exit()?;
        if status.success() {
            return Ok(());
        }
        let tail = self.stderr_tail.lock().map(|t| t.trim().to_string()).unwrap_or_default();
        let msg = format!("ffmpeg exited with {status}: {tail}");
        if looks_like_denied(&tail) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, msg).into());
        }
        bail!(msg)
    }

    // Sin retener el lock mientras se espera: `killer` tiene que poder entrar.
    fn wait_exit(&self) -> io::Result<ExitStatus> {
        loop {
            if let Some(status) = self.child.lock().unwrap_or_else(PoisonError::into_inner).try_wait()? {
                return Ok(status);
            }
            std::thread::sleep(EXIT_POLL);
        }
    }
}

impl FrameReader for FfmpegReader {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        match self.read_jpeg()? {
            Some(jpeg) => Ok(Some(image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)?.to_rgb8())),
            None => Ok(None),
        }
    }
}

impl Drop for FfmpegReader {
    fn drop(&mut self) {
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = child.kill();
        let _ = child.wait();
    }
}

fn looks_like_denied(stderr: &str) -> bool {
    ["Permission denied", "401 Unauthorized", "403 Forbidden"]
        .iter()
        .any(|needle| stderr.contains(needle))
}

/// Saca del principio de `buf` el primer JPEG completo (SOI..EOI). Lo que
/// hay antes del SOI se descarta; sin SOI sólo se guarda el último byte, que
/// puede ser la mitad de un marcador.
pub fn take_jpeg(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    let Some(soi) = buf.windows(2).position(|w| w == [0xFF, 0xD8]) else {
        let keep_from = buf.len().saturating_sub(1);
        buf.drain(..keep_from);
        return None;
    };
    if soi > 0 {
        buf.drain(..soi);
    }
    let eoi = buf[2..].windows(2).position(|w| w == [0xFF, 0xD9])? + 2;
    Some(buf.drain(..eoi + 2).collect())
}

/// Convierte la URL de la página de un vídeo en la URL directa del medio con `yt-dlp -g`.
pub fn resolve_hosted_url(cfg: &FfmpegConfig, url: &str) -> Result<String> {
    let output = Command::new(&cfg.ytdlp_bin)
        .args(["-g", "-f", "best[ext=mp4]/best", url])
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("starting {}", cfg.ytdlp_bin))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let msg = format!("{} could not resolve {url}: {stderr}", cfg.ytdlp_bin);
        if looks_like_denied(&stderr) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, msg).into());
        }
        bail!(msg);
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(String::from)
        .ok_or_else(|| anyhow!("{} returned no media url for {url}", cfg.ytdlp_bin))
}
