use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, oneshot};
use tracing::{error, info, warn};

use crate::adapters::stream::ffmpeg::{resolve_hosted_url, FfmpegConfig, FfmpegReader, InputKind};
use crate::adapters::stream::{classify_stream_error, FrameReader};
use crate::adapters::v4l2::capture::{CaptureConfig, V4l2Capture};
use crate::application::inference;
use crate::application::ports::{DetectionModel, FrameStreamPort, StopSignal, StreamHandle, StreamRequest};
use crate::domain::{
    errors::{DomainError, DomainResult},
    stream::{FrameMeta, StreamEvent, StreamSource},
};

#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub ffmpeg: FfmpegConfig,
    pub webcam: CaptureConfig,
    /// Espera máxima de `start` hasta el primer frame de la fuente.
    pub open_timeout: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            ffmpeg: FfmpegConfig::default(),
            webcam: CaptureConfig::default(),
            open_timeout: Duration::from_secs(20),
        }
    }
}

/// Colaborador de streaming: un hilo por stream que lee frames, los anota con
/// el modelo y los publica por un canal broadcast.
pub struct FramePlayer {
    cfg: PlayerConfig,
}

impl FramePlayer {
    pub fn new(cfg: PlayerConfig) -> Self {
        Self { cfg }
    }
}

/// Guarda el primer frame, leído al abrir, para que el bucle no lo pierda.
struct Primed {
    first: Option<RgbImage>,
    inner: Box<dyn FrameReader>,
}

impl FrameReader for Primed {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        match self.first.take() {
            Some(frame) => Ok(Some(frame)),
            None => self.inner.next_frame(),
        }
    }
}

/// Arranca ffmpeg y deja en `stop` la orden de matarlo.
fn spawn_ffmpeg(cfg: &PlayerConfig, input: &str, kind: InputKind, stop: &StopSignal) -> Result<Box<dyn FrameReader>> {
    let reader = FfmpegReader::spawn(&cfg.ffmpeg, input, kind)?;
    stop.on_trigger(reader.killer());
    Ok(Box::new(reader))
}

fn open_reader(source: &StreamSource, cfg: &PlayerConfig, stop: &StopSignal) -> Result<Box<dyn FrameReader>> {
    let mut reader: Box<dyn FrameReader> = match source {
        StreamSource::Webcam(device) => {
            let capture_cfg = CaptureConfig { camera_path: device.clone(), ..cfg.webcam.clone() };
            Box::new(V4l2Capture::open(&capture_cfg)?)
        }
        StreamSource::StoredVideo(path) => {
            // ffmpeg sólo dice "No such file"; abrirlo aquí conserva el io::ErrorKind.
            std::fs::File::open(path).with_context(|| format!("opening video {path}"))?;
            spawn_ffmpeg(cfg, path, InputKind::File, stop)?
        }
        StreamSource::Rtsp(url) => spawn_ffmpeg(cfg, url, InputKind::Rtsp, stop)?,
        StreamSource::YouTube(url) => {
            let media_url = resolve_hosted_url(&cfg.ffmpeg, url)?;
            if stop.is_set() {
                bail!("stream stopped while resolving {url}");
            }
            spawn_ffmpeg(cfg, &media_url, InputKind::Hosted, stop)?
        }
    };

    let first = reader
        .next_frame()
        .with_context(|| format!("reading first frame from {}", source.target()))?;
    Ok(Box::new(Primed { first, inner: reader }))
}

fn encode_jpeg(img: &RgbImage) -> Result<Vec<u8>> {
    let mut jpeg = Vec::new();
    let mut enc = JpegEncoder::new_with_quality(&mut jpeg, 80);
    enc.encode(img.as_raw(), img.width(), img.height(), image::ExtendedColorType::Rgb8)?;
    Ok(jpeg)
}

/// Bucle de frames: termina al final del stream, ante el primer error o
/// cuando se activa `stop`. Lo que devuelva la fuente después de `stop` (el
/// EOF de un ffmpeg matado, por ejemplo) no se publica.
pub fn run_frame_loop(
    mut reader: Box<dyn FrameReader>,
    model: Arc<dyn DetectionModel>,
    confidence: f32,
    tx: broadcast::Sender<StreamEvent>,
    stop: StopSignal,
) {
    let mut fps_est: f32 = 0.0;
    let mut last_t = Instant::now();

    while !stop.is_set() {
        let next = reader.next_frame();
        if stop.is_set() {
            break;
        }
        let rgb = match next {
            Ok(Some(rgb)) => rgb,
            Ok(None) => {
                info!("Pipeline: fin del stream");
                let _ = tx.send(StreamEvent::Finished);
                return;
            }
            Err(e) => {
                let err = classify_stream_error(&e);
                warn!("Error capturando frame: {}", err);
                let _ = tx.send(StreamEvent::Error(err.to_string()));
                return;
            }
        };

        let t_infer_start = Instant::now();
        let result = match model.predict(&rgb, confidence) {
            Ok(raw) => inference::normalize(raw),
            Err(e) => {
                error!("Error de inferencia en el stream: {}", e);
                let _ = tx.send(StreamEvent::Error(DomainError::StreamFailure(e.to_string()).to_string()));
                return;
            }
        };
        let infer_ms = t_infer_start.elapsed().as_secs_f32() * 1000.0;

        // Cálculo de FPS para la interfaz
        let dt = last_t.elapsed().as_secs_f32().max(0.001);
        last_t = Instant::now();
        fps_est = 0.9 * fps_est + 0.1 * (1.0 / dt);

        if tx.receiver_count() == 0 {
            continue;
        }
        let jpeg = match encode_jpeg(&result.annotated_image) {
            Ok(j) => j,
            Err(e) => {
                warn!("No se pudo codificar el frame: {}", e);
                continue;
            }
        };
        let meta = FrameMeta {
            width: rgb.width(),
            height: rgb.height(),
            infer_ms,
            fps_est,
            detections: result.boxes,
        };
        let _ = tx.send(StreamEvent::Frame { meta, jpeg });
    }
    info!("Pipeline: stream detenido");
}

#[async_trait]
impl FrameStreamPort for FramePlayer {
    async fn start(&self, request: StreamRequest) -> DomainResult<StreamHandle> {
        let StreamRequest { source, model, confidence } = request;
        let (tx, _) = broadcast::channel(16);
        let stop = StopSignal::new();
        let (ready_tx, ready_rx) = oneshot::channel::<DomainResult<()>>();

        let cfg = self.cfg.clone();
        let thread_source = source.clone();
        let thread_tx = tx.clone();
        let thread_stop = stop.clone();

        // El lector se abre dentro del hilo: los streams V4L2 no son `Send`.
        std::thread::Builder::new()
            .name("frame-loop".into())
            .spawn(move || {
                let reader = match open_reader(&thread_source, &cfg, &thread_stop) {
                    Ok(r) => r,
                    Err(e) => {
                        let _ = ready_tx.send(Err(classify_stream_error(&e)));
                        return;
                    }
                };
                if ready_tx.send(Ok(())).is_err() {
                    return;
                }
                info!("Pipeline: procesando {:?}", thread_source);
                run_frame_loop(reader, model, confidence, thread_tx, thread_stop.clone());
                // Marca el handle como terminado también al final del stream.
                thread_stop.trigger();
            })
            .map_err(|e| DomainError::StreamFailure(format!("spawning frame loop: {e}")))?;

        match tokio::time::timeout(self.cfg.open_timeout, ready_rx).await {
            Ok(Ok(Ok(()))) => Ok(StreamHandle::new(source, tx, stop)),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(DomainError::StreamFailure("frame loop exited while opening".into())),
            Err(_) => {
                // Mata la fuente: el hilo sigue bloqueado en `open_reader`.
                stop.trigger();
                Err(DomainError::StreamFailure(format!(
                    "timed out after {:?} waiting for {}",
                    self.cfg.open_timeout,
                    source.target()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{ChannelOrder, RawPrediction};
    use crate::domain::detection::Detection;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedReader(VecDeque<Result<Option<RgbImage>>>);

    impl FrameReader for ScriptedReader {
        fn next_frame(&mut self) -> Result<Option<RgbImage>> {
            self.0.pop_front().unwrap_or(Ok(None))
        }
    }

    struct CountingModel {
        confs: Mutex<Vec<f32>>,
    }

    impl DetectionModel for CountingModel {
        fn name(&self) -> &str {
            "counting"
        }

        fn predict(&self, image: &RgbImage, conf: f32) -> DomainResult<RawPrediction> {
            self.confs.lock().unwrap().push(conf);
            Ok(RawPrediction {
                plot: image.clone(),
                order: ChannelOrder::Bgr,
                boxes: vec![Detection {
                    x1: 0.0, y1: 0.0, x2: 2.0, y2: 2.0, score: 0.8, class_id: 0, label: "apple".into(),
                }],
            })
        }
    }

    fn frame() -> RgbImage {
        RgbImage::new(8, 8)
    }

    #[test]
    fn loop_publishes_frames_then_finishes() {
        let reader = Box::new(ScriptedReader(VecDeque::from([Ok(Some(frame())), Ok(Some(frame()))])));
        let model = Arc::new(CountingModel { confs: Mutex::new(vec![]) });
        let (tx, mut rx) = broadcast::channel(16);

        run_frame_loop(reader, model.clone(), 0.55, tx, StopSignal::new());

        assert!(matches!(rx.try_recv().unwrap(), StreamEvent::Frame { .. }));
        match rx.try_recv().unwrap() {
            StreamEvent::Frame { meta, jpeg } => {
                assert_eq!((meta.width, meta.height), (8, 8));
                assert_eq!(meta.detections.len(), 1);
                assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(rx.try_recv().unwrap(), StreamEvent::Finished));
        assert_eq!(*model.confs.lock().unwrap(), vec![0.55, 0.55]);
    }

    #[test]
    fn reader_errors_are_published_not_raised() {
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "EACCES");
        let reader = Box::new(ScriptedReader(VecDeque::from([Err(denied.into())])));
        let model = Arc::new(CountingModel { confs: Mutex::new(vec![]) });
        let (tx, mut rx) = broadcast::channel(16);

        run_frame_loop(reader, model, 0.4, tx, StopSignal::new());

        match rx.try_recv().unwrap() {
            StreamEvent::Error(msg) => assert!(msg.starts_with("Permission denied")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn stop_flag_ends_the_loop() {
        let reader = Box::new(ScriptedReader(VecDeque::from([Ok(Some(frame()))])));
        let model = Arc::new(CountingModel { confs: Mutex::new(vec![]) });
        let (tx, _rx) = broadcast::channel(16);

        let stop = StopSignal::new();
        stop.trigger();
        run_frame_loop(reader, model.clone(), 0.4, tx, stop);
        assert!(model.confs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_video_file_fails_at_start() {
        let player = FramePlayer::new(PlayerConfig::default());
        let model = Arc::new(CountingModel { confs: Mutex::new(vec![]) });
        let err = player
            .start(StreamRequest {
                source: StreamSource::StoredVideo("/no/such/video.mp4".into()),
                model,
                confidence: 0.4,
            })
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DomainError::StreamFailure(_)));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn stop_kills_a_stalled_source() {
        use std::os::unix::fs::PermissionsExt;

        // ffmpeg de mentira: un frame y luego silencio.
        let dir = tempfile::tempdir().unwrap();
        let jpeg = dir.path().join("frame.jpg");
        std::fs::write(&jpeg, encode_jpeg(&frame()).unwrap()).unwrap();
        let pid_file = dir.path().join("pid");
        let script = dir.path().join("ffmpeg");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho $$ > {}\ncat {}\nexec sleep 30\n", pid_file.display(), jpeg.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let player = FramePlayer::new(PlayerConfig {
            ffmpeg: FfmpegConfig { ffmpeg_bin: script.display().to_string(), ..Default::default() },
            ..Default::default()
        });
        let model = Arc::new(CountingModel { confs: Mutex::new(vec![]) });
        let handle = player
            .start(StreamRequest {
                source: StreamSource::StoredVideo(jpeg.display().to_string()),
                model,
                confidence: 0.4,
            })
            .await
            .unwrap();
        let mut rx = handle.subscribe();
        let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();

        tokio::time::sleep(Duration::from_millis(300)).await;
        drop(handle);

        // El canal se cierra cuando el hilo del bucle suelta su emisor.
        let loop_done = tokio::time::timeout(Duration::from_secs(5), async {
            while !matches!(rx.recv().await, Err(broadcast::error::RecvError::Closed)) {}
        })
        .await;
        assert!(loop_done.is_ok(), "frame loop still running after stop");

        let proc_dir = std::path::PathBuf::from(format!("/proc/{pid}"));
        let deadline = Instant::now() + Duration::from_secs(5);
        while proc_dir.exists() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(!proc_dir.exists(), "source process {pid} still alive after stop");
    }
}
