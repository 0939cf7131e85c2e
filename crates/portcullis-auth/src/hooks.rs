//! Extension points consulted for every request.
//!
//! Each hook may answer or abstain (`None`). The registry is assembled once at startup and
//! shared read-only between requests.

use crate::context::{Identity, Purpose, RequestContext};
use crate::gate::{AuthDecisionGate, Decision};
use crate::provision::ensure_user;
use crate::session::{SessionCodec, SessionIdentity};
use crate::store::UserStore;
use crate::tokens::TokenProvider;
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use std::sync::Arc;

#[async_trait]
pub trait AuthHook: Send + Sync {
    fn name(&self) -> &'static str;

    /// Establish who is making the request.
    async fn get_identity(&self, ctx: &RequestContext) -> AuthResult<Option<Identity>> {
        let _ = ctx;
        Ok(None)
    }

    /// `Some(true)` lets the request through regardless of login state.
    fn authcheck_always_ok(&self, ctx: &RequestContext) -> Option<bool> {
        let _ = ctx;
        None
    }

    /// `Some(true)` marks the request as lacking authentication.
    fn authcheck_unauthorized(&self, ctx: &RequestContext) -> Option<bool> {
        let _ = ctx;
        None
    }
}

pub struct HookRegistry {
    hooks: Vec<Box<dyn AuthHook>>,
}

impl HookRegistry {
    #[must_use]
    pub fn new(hooks: Vec<Box<dyn AuthHook>>) -> Self {
        let names: Vec<_> = hooks.iter().map(|h| h.name()).collect();
        tracing::info!(?names, "Registered auth hooks");
        Self { hooks }
    }

    /// The first hook that recognizes the caller wins. Errors are not skipped over.
    pub async fn get_identity(&self, ctx: &RequestContext) -> AuthResult<Option<Identity>> {
        for hook in &self.hooks {
            if let Some(identity) = hook.get_identity(ctx).await? {
                tracing::debug!(hook = hook.name(), username = %identity.username, "Identified");
                return Ok(Some(identity));
            }
        }
        Ok(None)
    }

    pub fn authcheck_always_ok(&self, ctx: &RequestContext) -> bool {
        self.hooks.iter().any(|h| h.authcheck_always_ok(ctx) == Some(true))
    }

    pub fn authcheck_unauthorized(&self, ctx: &RequestContext) -> bool {
        self.hooks.iter().any(|h| h.authcheck_unauthorized(ctx) == Some(true))
    }

    /// Run the authcheck hooks against a context whose identity has already been resolved.
    pub fn authcheck(&self, ctx: &RequestContext) -> Decision {
        let route = ctx.route_name().unwrap_or("<none>");
        let (method, url) = (ctx.method(), ctx.url());
        if self.authcheck_always_ok(ctx) {
            tracing::debug!("Authcheck always OK for {method} {url} ({route})");
            return Decision::Allow;
        }
        let unauthorized = self.authcheck_unauthorized(ctx);
        if unauthorized {
            tracing::debug!("Authcheck Unauthorized for {method} {url} ({route})");
        } else {
            tracing::debug!("Authcheck OK for {method} {url} ({route})");
        }
        AuthDecisionGate::resolve(false, unauthorized, ctx.user_agent())
    }
}

/// Identity from the SSO session cookie, with the local user created on first sight.
pub struct SamlSessionHook<U> {
    sessions: Arc<SessionCodec>,
    users: Arc<U>,
    create_users_on_demand: bool,
}

impl<U> SamlSessionHook<U> {
    pub fn new(sessions: Arc<SessionCodec>, users: Arc<U>, create_users_on_demand: bool) -> Self {
        Self {
            sessions,
            users,
            create_users_on_demand,
        }
    }
}

#[async_trait]
impl<U: UserStore + Send + Sync + 'static> AuthHook for SamlSessionHook<U> {
    fn name(&self) -> &'static str {
        "saml-session"
    }

    async fn get_identity(&self, ctx: &RequestContext) -> AuthResult<Option<Identity>> {
        let session = self.sessions.decode(ctx.headers());
        let SessionIdentity { authenticated_user_id } = session.identity();
        let Some(username) = authenticated_user_id else {
            // Might still use other login means
            tracing::debug!("No SAML session found");
            return Ok(None);
        };

        if ctx.purpose() == Purpose::Serve {
            ensure_user(&*self.users, &username, self.create_users_on_demand).await?;
        }
        Ok(Some(Identity::new(username)))
    }
}

/// Identity from an API token in the `Authorization` header, for clients without a browser session.
pub struct ApiTokenHook<T> {
    tokens: Arc<T>,
}

impl<T> ApiTokenHook<T> {
    pub fn new(tokens: Arc<T>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl<T: TokenProvider + Send + Sync + 'static> AuthHook for ApiTokenHook<T> {
    fn name(&self) -> &'static str {
        "api-token"
    }

    async fn get_identity(&self, ctx: &RequestContext) -> AuthResult<Option<Identity>> {
        let Some(auth) = ctx.header(AUTHORIZATION.as_str()) else {
            return Ok(None);
        };
        let token = auth.strip_prefix("Bearer ").unwrap_or(auth).trim();
        match self.tokens.user_for_token(token).await {
            Ok(username) => Ok(Some(Identity::new(username))),
            Err(AuthError::InvalidCredentials) => {
                tracing::warn!("Ignoring invalid API token");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::USER_AGENT;
    use axum::http::{HeaderMap, HeaderValue, Method};
    use crate::context::RouteMatch;

    struct Fixed(&'static str);

    #[async_trait]
    impl AuthHook for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn get_identity(&self, _ctx: &RequestContext) -> AuthResult<Option<Identity>> {
            Ok(Some(Identity::new(self.0)))
        }
    }

    struct Abstain;

    impl AuthHook for Abstain {
        fn name(&self) -> &'static str {
            "abstain"
        }
    }

    fn ctx(route: Option<&str>, ua: &str) -> RequestContext {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(ua).unwrap());
        RequestContext::new(Method::GET, "http://x/alice/+tokens/ui", headers, Purpose::Authcheck)
            .with_route(route.map(RouteMatch::new))
    }

    #[tokio::test]
    async fn first_identity_wins() {
        let registry =
            HookRegistry::new(vec![Box::new(Abstain), Box::new(Fixed("a")), Box::new(Fixed("b"))]);
        let id = registry.get_identity(&ctx(None, "")).await.unwrap();
        assert_eq!(id, Some(Identity::new("a")));

        let registry = HookRegistry::new(vec![Box::new(Abstain)]);
        assert_eq!(registry.get_identity(&ctx(None, "")).await.unwrap(), None);
    }

    #[test]
    fn registry_agrees_with_gate() {
        let registry = HookRegistry::new(vec![Box::new(Abstain), Box::new(AuthDecisionGate)]);
        let gate = AuthDecisionGate;
        for route in [None, Some("/{user}/+tokens/ui"), Some("/+api"), Some("login")] {
            for user in [None, Some("alice")] {
                for ua in ["Mozilla/5.0", "devpi-client/6.0"] {
                    let mut c = ctx(route, ua);
                    c.set_identity(user.map(Identity::new));
                    assert_eq!(registry.authcheck(&c), gate.decide(route, c.url(), user, ua));
                }
            }
        }
    }

    #[test]
    fn no_opinion_allows() {
        // without the gate nobody claims the request is unauthorized
        let registry = HookRegistry::new(vec![Box::new(Abstain)]);
        assert_eq!(registry.authcheck(&ctx(None, "Mozilla/5.0")), Decision::Allow);
    }
}
