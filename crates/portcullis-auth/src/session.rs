//! Signed session cookie.
//!
//! The cookie value is a base64-encoded JSON object signed with a key derived from the
//! configured secret. Whoever completes the SAML login stores the `samlNameId` in it.

use anyhow::Context;
use axum::http::header::COOKIE;
use axum::http::{HeaderMap, HeaderValue};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use cookie::{Cookie, CookieJar, Key, SameSite};
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;

/// Session field holding the username asserted by the identity provider.
pub const SAML_NAME_ID: &str = "samlNameId";

pub const DEFAULT_COOKIE_NAME: &str = "portcullis_session";

/// Separates session keys from other keys derived from the same secret.
const KEY_PURPOSE: &[u8] = b"portcullis_saml";

const MIN_SECRET_LEN: usize = 32;

/// Decoded session contents. Unknown fields are preserved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session(Map<String, Value>);

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Blank names count as no session.
    pub fn saml_name_id(&self) -> Option<&str> {
        self.get_str(SAML_NAME_ID).filter(|s| !s.trim().is_empty())
    }

    #[must_use]
    pub fn identity(&self) -> SessionIdentity {
        SessionIdentity {
            authenticated_user_id: self.saml_name_id().map(String::from),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The part of a session the authcheck gate cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionIdentity {
    pub authenticated_user_id: Option<String>,
}

pub struct SessionCodec {
    key: Key,
    cookie_name: String,
    secure: bool,
}

impl SessionCodec {
    pub fn new(secret: &[u8], cookie_name: impl Into<String>, secure: bool) -> anyhow::Result<Self> {
        if secret.len() < MIN_SECRET_LEN {
            anyhow::bail!("session secret must be at least {MIN_SECRET_LEN} bytes long");
        }
        let mut mac = Hmac::<Sha256>::new_from_slice(secret)
            .map_err(|_| anyhow::anyhow!("unusable session secret"))?;
        mac.update(KEY_PURPOSE);
        let derived = mac.finalize().into_bytes();

        Ok(Self {
            key: Key::derive_from(&derived),
            cookie_name: cookie_name.into(),
            secure,
        })
    }

    /// Missing, tampered or malformed cookies all decode to an empty session.
    pub fn decode(&self, headers: &HeaderMap) -> Session {
        let mut jar = CookieJar::new();
        for header in headers.get_all(COOKIE) {
            let Ok(cookies) = header.to_str() else {
                tracing::warn!("Non-ASCII cookie header");
                continue;
            };
            for c in Cookie::split_parse(cookies) {
                match c {
                    Ok(c) if c.name() == self.cookie_name => jar.add_original(c.into_owned()),
                    Ok(_) => {}
                    Err(e) => tracing::debug!("Skipping unparseable cookie: {e}"),
                }
            }
        }

        let Some(verified) = jar.signed(&self.key).get(&self.cookie_name) else {
            if jar.get(&self.cookie_name).is_some() {
                tracing::warn!("Session cookie failed signature check");
            }
            return Session::new();
        };

        match Self::parse_payload(verified.value()) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Bad session payload: {e:#}");
                Session::new()
            }
        }
    }

    fn parse_payload(value: &str) -> anyhow::Result<Session> {
        let json = URL_SAFE_NO_PAD.decode(value).context("base64")?;
        let map: Map<String, Value> = serde_json::from_slice(&json).context("json")?;
        Ok(Session(map))
    }

    /// `Set-Cookie` header value carrying the signed session.
    pub fn encode(&self, session: &Session) -> anyhow::Result<HeaderValue> {
        let json = serde_json::to_vec(&session.0)?;
        let payload = URL_SAFE_NO_PAD.encode(json);

        let mut jar = CookieJar::new();
        jar.signed_mut(&self.key).add(self.build_cookie(payload));
        let signed = jar
            .get(&self.cookie_name)
            .context("signed session cookie missing from jar")?;
        HeaderValue::from_str(&signed.to_string()).context("session cookie header")
    }

    /// `Set-Cookie` header value that makes the browser drop the session.
    pub fn clear(&self) -> HeaderValue {
        let mut cookie = self.build_cookie(String::new());
        cookie.make_removal();
        HeaderValue::from_str(&cookie.to_string()).unwrap_or(HeaderValue::from_static(""))
    }

    fn build_cookie(&self, value: String) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), value))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .build()
    }
}
