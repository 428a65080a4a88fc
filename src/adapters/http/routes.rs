use axum::extract::{Multipart, State};
use axum::Json;
use axum_extra::extract::cookie::CookieJar;

use crate::adapters::http::error::ApiError;
use crate::adapters::http::session;
use crate::adapters::http::state::HttpState;
use crate::application::dto::{
    DetectResponse, DetectionConfigResponse, HistoryResponse, HomeResponse, ImagePayload, ImageViewResponse,
    LoginRequest, ModeRequest, ModeResponse, OkResponse, PreferencesRequest, SessionResponse, StreamStartedResponse,
    StreamTarget,
};
use crate::application::services::UPLOAD_EXTENSIONS;
use crate::domain::errors::DomainError;
use crate::domain::history::EncodedImage;
use crate::domain::mode::SourceKind;
use crate::domain::model::{DEFAULT_CONFIDENCE_PERCENT, MAX_CONFIDENCE_PERCENT, MIN_CONFIDENCE_PERCENT};

type ApiResult<T> = Result<Json<T>, ApiError>;

const HOME_TITLE: &str = "Welcome to the Apple Detection and Tracking Application!";
const HOME_DESCRIPTION: &str = "This application helps apple farmers detect apples with a YOLOv8 model. \
Home gives an overview, Detection lets you pick a source and run the detector, \
History lists the detections made in this session.";

// --- Sesión ---

pub async fn get_session(State(st): State<HttpState>, jar: CookieJar) -> Json<SessionResponse> {
    match session::current(&st, &jar).await {
        Some(shared) => {
            let s = shared.lock().await;
            Json(SessionResponse::from_parts(s.identity.as_ref(), s.dark_mode))
        }
        None => Json(SessionResponse::anonymous()),
    }
}

pub async fn login(
    State(st): State<HttpState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), ApiError> {
    // Primero las credenciales: un login fallido no deja sesiones huérfanas.
    let identity = st.auth.authenticate(&req.username, &req.password).await?;
    let (jar, shared) = session::current_or_create(&st, jar).await;
    let mut s = shared.lock().await;
    st.auth.sign_in(&mut s, identity);
    Ok((jar, Json(SessionResponse::from_parts(s.identity.as_ref(), s.dark_mode))))
}

pub async fn logout(State(st): State<HttpState>, jar: CookieJar) -> Json<OkResponse> {
    if let Some(shared) = session::current(&st, &jar).await {
        let mut s = shared.lock().await;
        st.auth.logout(&mut s);
    }
    Json(OkResponse { ok: true })
}

pub async fn set_preferences(
    State(st): State<HttpState>,
    jar: CookieJar,
    Json(req): Json<PreferencesRequest>,
) -> ApiResult<SessionResponse> {
    let mut s = session::authenticated(&st, &jar).await?;
    s.dark_mode = req.dark_mode;
    Ok(Json(SessionResponse::from_parts(s.identity.as_ref(), s.dark_mode)))
}

// --- Home ---

pub async fn home(State(st): State<HttpState>, jar: CookieJar) -> ApiResult<HomeResponse> {
    let _s = session::authenticated(&st, &jar).await?;

    let mut images = Vec::new();
    for path in st.overview_images.iter() {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
                images.push(ImagePayload::from(&EncodedImage::new(name, bytes)));
            }
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "imagen de portada no disponible"),
        }
    }

    Ok(Json(HomeResponse {
        title: HOME_TITLE.to_string(),
        description: HOME_DESCRIPTION.to_string(),
        images,
    }))
}

// --- Detección ---

pub async fn detection_config(State(st): State<HttpState>, jar: CookieJar) -> ApiResult<DetectionConfigResponse> {
    let s = session::authenticated(&st, &jar).await?;

    // El fallo de carga se muestra en cada render; la siguiente petición reintenta.
    let (model, model_error) = match st.detection.load_model().await {
        Ok(m) => (m.name().to_string(), None),
        Err(e) => (st.detection.settings().model.name.clone(), Some(e.to_string())),
    };

    Ok(Json(DetectionConfigResponse {
        tasks: vec!["Detection".into()],
        sources: SourceKind::ALL.iter().map(|k| k.label().to_string()).collect(),
        confidence_min: MIN_CONFIDENCE_PERCENT,
        confidence_max: MAX_CONFIDENCE_PERCENT,
        confidence_default: DEFAULT_CONFIDENCE_PERCENT,
        upload_extensions: UPLOAD_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        videos: st.detection.list_videos().await,
        webcams: st.detection.list_webcams().await,
        model,
        model_error,
        mode: ModeResponse::from(&s.selection),
    }))
}

pub async fn set_mode(
    State(st): State<HttpState>,
    jar: CookieJar,
    Json(req): Json<ModeRequest>,
) -> ApiResult<ModeResponse> {
    let mut s = session::authenticated(&st, &jar).await?;
    let selection = st.detection.select_mode(&mut s, &req.task, &req.source, req.confidence)?;
    // La selección queda guardada aunque la fuente no sea válida.
    st.detection.route(&s)?;
    Ok(Json(ModeResponse::from(&selection)))
}

pub async fn upload_image(
    State(st): State<HttpState>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> ApiResult<ImageViewResponse> {
    let mut s = session::authenticated(&st, &jar).await?;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(bad_multipart)?;
        tracing::info!(file = %filename, size = bytes.len(), "imagen subida");

        st.detection.upload_image(&mut s, &filename, bytes.to_vec())?;
        let view = st.detection.image_view(&s).await?;
        return Ok(Json(ImageViewResponse::from(&view)));
    }

    Err(ApiError(DomainError::InvalidInput("missing multipart field 'file'".into())))
}

fn bad_multipart(e: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError(DomainError::InvalidInput(format!("multipart: {e}")))
}

pub async fn image_view(State(st): State<HttpState>, jar: CookieJar) -> ApiResult<ImageViewResponse> {
    let s = session::authenticated(&st, &jar).await?;
    let view = st.detection.image_view(&s).await?;
    Ok(Json(ImageViewResponse::from(&view)))
}

pub async fn detect_image(State(st): State<HttpState>, jar: CookieJar) -> ApiResult<DetectResponse> {
    let mut s = session::authenticated(&st, &jar).await?;
    let record = st.detection.detect_image(&mut s).await?;
    Ok(Json(DetectResponse { record: (&record).into(), history_len: s.history.len() }))
}

pub async fn start_stream(
    State(st): State<HttpState>,
    jar: CookieJar,
    Json(target): Json<StreamTarget>,
) -> ApiResult<StreamStartedResponse> {
    let mut s = session::authenticated(&st, &jar).await?;
    let source = st.detection.start_stream(&mut s, target).await?;
    Ok(Json(StreamStartedResponse { ok: true, source, confidence: s.selection.confidence.value() }))
}

pub async fn stop_stream(State(st): State<HttpState>, jar: CookieJar) -> ApiResult<OkResponse> {
    let mut s = session::authenticated(&st, &jar).await?;
    let stopped = st.detection.stop_stream(&mut s);
    Ok(Json(OkResponse { ok: stopped }))
}

// --- Historial ---

pub async fn history(State(st): State<HttpState>, jar: CookieJar) -> ApiResult<HistoryResponse> {
    let s = session::authenticated(&st, &jar).await?;
    Ok(Json(HistoryResponse::from_records(s.history.list())))
}
