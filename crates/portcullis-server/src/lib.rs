use anyhow::Context;
use axum::body::Body;
use axum::extract::{MatchedPath, Request, State};
use axum::http::header::LOCATION;
use axum::http::StatusCode;
use axum::middleware::{Next, from_fn};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use metrics::{counter, histogram};
use portcullis_auth::gate::AuthDecisionGate;
use portcullis_auth::hooks::{ApiTokenHook, HookRegistry, SamlSessionHook};
use portcullis_auth::saml::SamlSettings;
use portcullis_auth::session::{DEFAULT_COOKIE_NAME, SessionCodec};
use portcullis_auth::store::UserStore;
use portcullis_auth::tokens::TokenProvider;
use routes::{AUTHCHECK_PATH, HEALTHCHECK_PATH, RouteSpec, RouteTable};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tokio::try_join;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::classify::StatusInRangeAsFailures;
use tower_http::trace::{DefaultOnFailure, TraceLayer};

pub mod authcheck;

pub mod identity;

pub mod login;

pub mod routes;

pub mod tokens;

pub const SESSION_SECRET_ENV: &str = "PORTCULLIS_SESSION_SECRET";

#[derive(Clone, Deserialize)]
pub struct ServiceConfig {
    pub address: SocketAddr,
    pub metrics_address: SocketAddr,

    /// Signs the session cookie. Falls back to `PORTCULLIS_SESSION_SECRET`.
    #[serde(default = "session_secret_from_env")]
    pub session_secret: String,
    #[serde(default = "default_cookie_name")]
    pub session_cookie_name: String,
    #[serde(default = "default_true")]
    pub secure_cookies: bool,

    /// Create local users for SSO identities seen for the first time.
    #[serde(default = "default_true")]
    pub create_users_on_demand: bool,
    #[serde(default = "default_token_lifetime_days")]
    pub token_lifetime_days: u32,

    /// Public base URL, used for links in responses. Links are relative without it.
    #[serde(default)]
    pub outside_url: Option<String>,

    /// Routes of the application behind the proxy, for matching authcheck requests.
    #[serde(default = "routes::default_host_routes")]
    pub host_routes: Vec<RouteSpec>,
}

pub struct ServiceState<U, T> {
    pub config: ServiceConfig,
    pub users: Arc<U>,
    pub tokens: Arc<T>,
    pub hooks: HookRegistry,
    pub sessions: Arc<SessionCodec>,
    pub routes: RouteTable,
    pub saml: Option<SamlSettings>,
}

impl<U, T> ServiceState<U, T>
where
    U: UserStore + Send + Sync + 'static,
    T: TokenProvider + Send + Sync + 'static,
{
    pub fn new(config: ServiceConfig, users: Arc<U>, tokens: Arc<T>, saml: Option<SamlSettings>) -> anyhow::Result<Self> {
        let sessions = SessionCodec::new(
            config.session_secret.as_bytes(),
            config.session_cookie_name.as_str(),
            config.secure_cookies,
        )
        .with_context(|| format!("Invalid session_secret (set in config or {SESSION_SECRET_ENV})"))?;
        let sessions = Arc::new(sessions);

        let routes = RouteTable::new(routes::own_routes().into_iter().chain(config.host_routes.iter().cloned()))?;
        tracing::debug!("Route table has {} routes", routes.len());

        let hooks = HookRegistry::new(vec![
            Box::new(SamlSessionHook::new(
                Arc::clone(&sessions),
                Arc::clone(&users),
                config.create_users_on_demand,
            )),
            Box::new(ApiTokenHook::new(Arc::clone(&tokens))),
            Box::new(AuthDecisionGate),
        ]);

        Ok(Self {
            config,
            users,
            tokens,
            hooks,
            sessions,
            routes,
            saml,
        })
    }
}

impl<U, T> ServiceState<U, T> {
    /// Absolute when `outside_url` is configured.
    pub fn url_for(&self, path: &str) -> String {
        match &self.config.outside_url {
            Some(base) => format!("{}{path}", base.trim_end_matches('/')),
            None => path.to_owned(),
        }
    }
}

pub fn router<U, T>(
    config: ServiceConfig,
    users: Arc<U>,
    tokens: Arc<T>,
    saml: Option<SamlSettings>,
) -> anyhow::Result<Router>
where
    U: UserStore + Send + Sync + 'static,
    T: TokenProvider + Send + Sync + 'static,
{
    let state = Arc::new(ServiceState::new(config, users, tokens, saml)?);

    Ok(Router::new()
        .route(AUTHCHECK_PATH, get(authcheck::authcheck::<U, T>))
        .merge(tokens::tokens_router::<U, T>())
        .merge(login::login_router::<U, T>())
        .route(HEALTHCHECK_PATH, get(healthcheck::<U, T>))
        .with_state(state)
        .fallback(handle_global_fallback)
        .layer(CatchPanicLayer::custom(|_| {
            counter!("panics_total").increment(1);

            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }))
        .layer(
            // 401 and 403 are the normal answers of the authcheck endpoint
            TraceLayer::new(StatusInRangeAsFailures::new(500..=599).into_make_classifier())
                .make_span_with(|request: &axum::http::Request<Body>| {
                    let method = request.method();
                    let uri = request.uri();

                    tracing::info_span!("http-request", ?method, ?uri)
                })
                .on_failure(DefaultOnFailure::new()),
        )
        .layer(from_fn(metrics_layer)))
}

async fn metrics_layer(request: Request, next: Next) -> Response {
    let timer = Instant::now();

    let path = if let Some(path) = request.extensions().get::<MatchedPath>() {
        path.as_str().to_string()
    } else {
        // unmatched paths are arbitrary, keep them out of the label set
        "<fallback>".to_string()
    };

    let response = next.run(request).await;

    let elapsed = timer.elapsed();

    let code = response.status().as_u16().to_string();

    histogram!("request_duration_seconds", "code" => code, "endpoint" => path).record(elapsed);

    response
}

async fn healthcheck<U, T>(State(state): State<Arc<ServiceState<U, T>>>) -> axum::response::Result<String>
where
    U: UserStore + Sync,
    T: TokenProvider + Sync,
{
    let check_time = Duration::from_secs(4);
    let label = |label, res: Result<Result<(), anyhow::Error>, _>| match res {
        // healthcheck is unauthenticated and shouldn't leak internals via errors
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            for e in e.chain() {
                tracing::error!("{label} healthcheck: {e}");
            }
            Err(format!("{label} failed"))
        }
        Err(_) => Err(format!("{label} timed out")),
    };

    try_join! {
        async { label("users", timeout(check_time, UserStore::healthcheck(&*state.users)).await) },
        async { label("tokens", timeout(check_time, TokenProvider::healthcheck(&*state.tokens)).await) },
    }
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e))?;

    Ok(if state.saml.is_some() { "OK" } else { "OK (SAML disabled)" }.into())
}

pub async fn handle_global_fallback() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// 302 redirect.
pub(crate) fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_owned())]).into_response()
}

fn session_secret_from_env() -> String {
    std::env::var(SESSION_SECRET_ENV).unwrap_or_default()
}

fn default_cookie_name() -> String {
    DEFAULT_COOKIE_NAME.to_owned()
}

fn default_token_lifetime_days() -> u32 {
    365
}

#[inline(always)]
fn default_true() -> bool {
    true
}
