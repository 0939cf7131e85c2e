//! `/+authcheck`: asked by the reverse proxy before it forwards a request.
//!
//! The proxy passes the original request line in `X-Original-URI` (and optionally
//! `X-Original-Method`) along with the client's own headers, so cookies and the user agent
//! arrive unchanged.

use crate::ServiceState;
use crate::routes::{RouteTable, decode_path};
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use metrics::counter;
use portcullis_auth::context::{Purpose, RequestContext};
use std::sync::Arc;

pub const ORIGINAL_URI: &str = "x-original-uri";
pub const ORIGINAL_METHOD: &str = "x-original-method";

/// The request as the proxy received it. Falls back to the check request itself when the
/// proxy didn't forward the original URI. The URL keeps its query but carries the decoded path.
pub fn evaluation_context(routes: &RouteTable, method: Method, own_uri: &Uri, headers: &HeaderMap) -> RequestContext {
    let original = headers
        .get(ORIGINAL_URI)
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| own_uri.to_string(), str::to_owned);

    let method = headers
        .get(ORIGINAL_METHOD)
        .and_then(|v| Method::from_bytes(v.as_bytes()).ok())
        .unwrap_or(method);

    let (route, url) = match original.parse::<Uri>() {
        Ok(uri) => {
            let origin = uri
                .scheme_str()
                .zip(uri.authority())
                .map(|(scheme, authority)| format!("{scheme}://{authority}"))
                .unwrap_or_default();
            let path = decode_path(uri.path());
            let url = match uri.query() {
                Some(query) => format!("{origin}{path}?{query}"),
                None => format!("{origin}{path}"),
            };
            (routes.match_path(uri.path()), url)
        }
        Err(e) => {
            tracing::warn!("Unparseable original URI {original:?}: {e}");
            (None, original)
        }
    };
    if route.is_none() {
        tracing::debug!("No route matches {url}");
    }

    RequestContext::new(method, url, headers.clone(), Purpose::Authcheck).with_route(route)
}

pub async fn authcheck<U, T>(
    State(state): State<Arc<ServiceState<U, T>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> StatusCode {
    let mut ctx = evaluation_context(&state.routes, method, &uri, &headers);

    // A broken session or token store must not lock everybody out of public routes
    let identity = match state.hooks.get_identity(&ctx).await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!("Treating request as anonymous, identity lookup failed: {e}");
            None
        }
    };
    ctx.set_identity(identity);

    let decision = state.hooks.authcheck(&ctx);
    counter!("portcullis_authcheck_total", "decision" => decision.label()).increment(1);
    decision.status()
}
