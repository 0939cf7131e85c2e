use crate::ServiceState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use portcullis_auth::AuthError;
use portcullis_auth::context::{Identity, Purpose, RequestContext};
use std::sync::Arc;

/// Extractor for handlers that need a logged-in user.
///
/// Runs the identity hooks for serving, so a first-time SSO user gets their local account
/// created here. Rejects with 401 when nobody is logged in.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Identity);

#[axum::async_trait]
impl<U, T> FromRequestParts<Arc<ServiceState<U, T>>> for Authenticated
where
    U: Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<ServiceState<U, T>>) -> Result<Self, Self::Rejection> {
        let route = state.routes.match_path(parts.uri.path());
        let ctx = RequestContext::new(
            parts.method.clone(),
            parts.uri.to_string(),
            parts.headers.clone(),
            Purpose::Serve,
        )
        .with_route(route);

        state.hooks.get_identity(&ctx).await?.map(Self).ok_or(AuthError::Unauthorized)
    }
}
