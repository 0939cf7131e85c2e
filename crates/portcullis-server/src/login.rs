//! Sending browsers to the identity provider and back.

use crate::routes::{LOGIN_PATH, LOGOUT_PATH};
use crate::{ServiceState, found};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::http::header::SET_COOKIE;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use portcullis_auth::AuthResult;
use portcullis_auth::saml::SamlSettings;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct LoginQuery {
    /// Where to return after logging in.
    #[serde(default)]
    pub next: Option<String>,
}

pub fn login_router<U, T>() -> Router<Arc<ServiceState<U, T>>>
where
    U: Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    Router::new()
        .route(LOGIN_PATH, get(login::<U, T>))
        .route(LOGOUT_PATH, get(logout::<U, T>))
}

async fn login<U, T>(
    State(state): State<Arc<ServiceState<U, T>>>,
    Query(query): Query<LoginQuery>,
) -> AuthResult<Response> {
    let Some(saml) = &state.saml else {
        tracing::debug!("Login requested, but SAML is not configured");
        return Ok(StatusCode::NOT_FOUND.into_response());
    };
    let location = saml.login_url(query.next.as_deref())?;
    Ok(found(&location))
}

async fn logout<U, T>(State(state): State<Arc<ServiceState<U, T>>>) -> Response {
    let location = state.saml.as_ref().and_then(SamlSettings::logout_url).unwrap_or("/");
    let mut response = found(location);
    response.headers_mut().append(SET_COOKIE, state.sessions.clear());
    response
}
