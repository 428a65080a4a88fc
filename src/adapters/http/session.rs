use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tokio::sync::OwnedMutexGuard;

use crate::adapters::http::error::ApiError;
use crate::adapters::http::state::HttpState;
use crate::application::session::{Session, SessionId, SharedSession};
use crate::domain::errors::DomainError;

pub const SESSION_COOKIE: &str = "apple_session";

fn session_cookie(id: &SessionId) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Sesión del navegador, si la cookie apunta a una sesión viva.
pub async fn current(st: &HttpState, jar: &CookieJar) -> Option<SharedSession> {
    let id = SessionId::from(jar.get(SESSION_COOKIE)?.value());
    st.sessions.get(&id).await
}

/// Igual que `current`, pero crea una sesión nueva (y su cookie) si no existe.
pub async fn current_or_create(st: &HttpState, jar: CookieJar) -> (CookieJar, SharedSession) {
    if let Some(session) = current(st, &jar).await {
        return (jar, session);
    }
    let (id, session) = st.sessions.create().await;
    tracing::debug!(session = %id, "nueva sesión");
    (jar.add(session_cookie(&id)), session)
}

/// Sesión autenticada, ya bloqueada. Sin cookie, con la sesión caducada o
/// sin login: `Unauthenticated`.
pub async fn authenticated(st: &HttpState, jar: &CookieJar) -> Result<OwnedMutexGuard<Session>, ApiError> {
    let session = current(st, jar).await.ok_or(ApiError(DomainError::Unauthenticated))?;
    let guard = session.lock_owned().await;
    if !guard.is_authenticated() {
        return Err(ApiError(DomainError::Unauthenticated));
    }
    Ok(guard)
}
