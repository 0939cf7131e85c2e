#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::header::{CONTENT_TYPE, COOKIE, USER_AGENT};
use axum::http::{Request, Response};
use axum::Router;
use chrono::Utc;
use parking_lot::Mutex;
use portcullis_api_types::tokens::{Restrictions, TokenInfo};
use portcullis_auth::saml::{Endpoint, IdentityProvider, SamlSettings, ServiceProvider};
use portcullis_auth::session::{DEFAULT_COOKIE_NAME, SAML_NAME_ID, Session, SessionCodec};
use portcullis_auth::store::{StoreError, StoreResult, Transaction, UserRecord, UserStore};
use portcullis_auth::tokens::TokenProvider;
use portcullis_auth::{AuthError, AuthResult};
use portcullis_server::authcheck::ORIGINAL_URI;
use portcullis_server::routes::default_host_routes;
use portcullis_server::{ServiceConfig, router};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const SECRET: &str = "test-secret-test-secret-test-secret";
pub const BROWSER: &str = "Mozilla/5.0 (X11; Linux x86_64)";
pub const CLI: &str = "devpi-client/7.0.2 (py3.11.4; linux)";

#[derive(Default)]
pub struct MockUserStore {
    pub users: Mutex<BTreeMap<String, UserRecord>>,
    pub unhealthy: bool,
}

impl MockUserStore {
    pub fn with_users(names: &[&str]) -> Self {
        let store = Self::default();
        for name in names {
            store.users.lock().insert(
                (*name).to_owned(),
                UserRecord {
                    username: (*name).to_owned(),
                    created: Utc::now(),
                },
            );
        }
        store
    }

    pub fn has_user(&self, name: &str) -> bool {
        self.users.lock().contains_key(name)
    }
}

#[async_trait]
impl UserStore for MockUserStore {
    async fn healthcheck(&self) -> anyhow::Result<()> {
        if self.unhealthy {
            anyhow::bail!("disk on fire");
        }
        Ok(())
    }

    async fn get_user(
        &self,
        _txn: &Transaction,
        username: &str,
    ) -> StoreResult<Option<UserRecord>> {
        Ok(self.users.lock().get(username).cloned())
    }

    async fn create_user(&self, txn: &Transaction, username: &str) -> StoreResult<UserRecord> {
        txn.ensure_writable()?;
        let mut users = self.users.lock();
        if users.contains_key(username) {
            return Err(StoreError::UserExists(username.to_owned()));
        }
        let user = UserRecord {
            username: username.to_owned(),
            created: Utc::now(),
        };
        users.insert(username.to_owned(), user.clone());
        Ok(user)
    }
}

struct MockToken {
    id: String,
    user: String,
    restrictions: Restrictions,
}

#[derive(Default)]
pub struct MockTokenProvider {
    tokens: Mutex<Vec<(String, MockToken)>>,
    counter: Mutex<u32>,
    broken: bool,
}

impl MockTokenProvider {
    /// Every token lookup fails as if the backing store were gone.
    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    pub fn count(&self) -> usize {
        self.tokens.lock().len()
    }
}

#[async_trait]
impl TokenProvider for MockTokenProvider {
    async fn get_tokens_info(&self, user: &str) -> AuthResult<BTreeMap<String, TokenInfo>> {
        Ok(self
            .tokens
            .lock()
            .iter()
            .filter(|(_, t)| t.user == user)
            .map(|(_, t)| {
                let info = TokenInfo {
                    restrictions: t.restrictions.clone().into_vec(),
                };
                (t.id.clone(), info)
            })
            .collect())
    }

    async fn new_token(&self, user: &str, restrictions: Restrictions) -> AuthResult<String> {
        let n = {
            let mut counter = self.counter.lock();
            *counter += 1;
            *counter
        };
        let token = format!("pc1_mock{n}");
        self.tokens.lock().push((
            token.clone(),
            MockToken {
                id: format!("id{n}"),
                user: user.to_owned(),
                restrictions,
            },
        ));
        Ok(token)
    }

    async fn remove_token(&self, user: &str, token_id: &str) -> AuthResult<()> {
        let mut tokens = self.tokens.lock();
        let before = tokens.len();
        tokens.retain(|(_, t)| !(t.user == user && t.id == token_id));
        if tokens.len() == before {
            return Err(AuthError::TokenNotFound);
        }
        Ok(())
    }

    async fn user_for_token(&self, token: &str) -> AuthResult<String> {
        if self.broken {
            return Err(AuthError::ServiceError(anyhow::anyhow!("token store gone")));
        }
        let now = Utc::now().timestamp();
        self.tokens
            .lock()
            .iter()
            .find(|(t, info)| t == token && !info.restrictions.is_expired_at(now))
            .map(|(_, info)| info.user.clone())
            .ok_or(AuthError::InvalidCredentials)
    }
}

pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        address: "127.0.0.1:3141".parse().unwrap(),
        metrics_address: "127.0.0.1:9141".parse().unwrap(),
        session_secret: SECRET.to_owned(),
        session_cookie_name: DEFAULT_COOKIE_NAME.to_owned(),
        secure_cookies: false,
        create_users_on_demand: true,
        token_lifetime_days: 30,
        outside_url: None,
        host_routes: default_host_routes(),
    }
}

pub fn test_saml() -> SamlSettings {
    SamlSettings {
        sp: ServiceProvider {
            entity_id: "https://pkg.example.com/+saml/metadata".to_owned(),
        },
        idp: IdentityProvider {
            entity_id: "https://idp.example.com/metadata".to_owned(),
            single_sign_on_service: Endpoint {
                url: "https://idp.example.com/sso".to_owned(),
            },
            single_logout_service: Some(Endpoint {
                url: "https://idp.example.com/slo".to_owned(),
            }),
        },
    }
}

pub struct TestRouterBuilder {
    pub config: ServiceConfig,
    pub users: Arc<MockUserStore>,
    pub tokens: Arc<MockTokenProvider>,
    pub saml: Option<SamlSettings>,
}

impl Default for TestRouterBuilder {
    fn default() -> Self {
        Self {
            config: test_config(),
            users: Arc::default(),
            tokens: Arc::default(),
            saml: Some(test_saml()),
        }
    }
}

impl TestRouterBuilder {
    pub fn build(&self) -> Router {
        router(
            self.config.clone(),
            Arc::clone(&self.users),
            Arc::clone(&self.tokens),
            self.saml.clone(),
        )
        .unwrap()
    }
}

/// `Cookie` header value of a browser logged in as `name`.
pub fn session_cookie(name: &str) -> String {
    let codec = SessionCodec::new(SECRET.as_bytes(), DEFAULT_COOKIE_NAME, false).unwrap();
    let mut session = Session::new();
    session.insert(SAML_NAME_ID, name);
    let set_cookie = codec.encode(&session).unwrap();
    set_cookie.to_str().unwrap().split(';').next().unwrap().to_owned()
}

pub fn authcheck_request(
    original_uri: &str,
    cookie: Option<&str>,
    user_agent: &str,
) -> Request<Body> {
    let mut builder = Request::builder()
        .uri("/+authcheck")
        .header(ORIGINAL_URI, original_uri)
        .header(USER_AGENT, user_agent);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_form(uri: &str, cookie: Option<&str>, form: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::from(form.to_owned())).unwrap()
}

pub async fn body_json<D: DeserializeOwned>(response: Response<Body>) -> D {
    let body = to_bytes(response.into_body(), 100_000).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub fn location(response: &Response<Body>) -> &str {
    response.headers()["location"].to_str().unwrap()
}
