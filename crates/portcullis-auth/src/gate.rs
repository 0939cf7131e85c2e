//! The decision behind `/+authcheck`.
//!
//! A reverse proxy asks before every request whether to let it through. The answer depends
//! only on the matched route, the URL, whether a user is logged in, and the user agent.

use crate::context::RequestContext;
use crate::hooks::AuthHook;
use axum::http::StatusCode;

/// The CLI client reports 403 with a clearer message than 401.
pub const CLI_USER_AGENT_SIGNATURE: &str = "devpi-client";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Forbidden,
    Unauthorized,
}

impl Decision {
    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            Self::Allow => StatusCode::OK,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Forbidden => "forbidden",
            Self::Unauthorized => "unauthorized",
        }
    }

    /// Browsers get 401 so they go through the login flow, the CLI gets 403.
    #[must_use]
    pub fn deny_for(user_agent: &str) -> Self {
        if user_agent.contains(CLI_USER_AGENT_SIGNATURE) {
            Self::Forbidden
        } else {
            Self::Unauthorized
        }
    }
}

/// Routes that stay reachable without logging in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExemptionClass {
    /// Index metadata, needed by tooling that does its own auth.
    IndexApi,
    /// The login and logout endpoints, or the login flow would loop.
    LoginLogout,
    StaticAssets,
    ThemeStaticAssets,
}

pub const EXEMPTIONS: &[ExemptionClass] = &[
    ExemptionClass::IndexApi,
    ExemptionClass::LoginLogout,
    ExemptionClass::StaticAssets,
    ExemptionClass::ThemeStaticAssets,
];

const INDEX_API_SUFFIX: &str = "/+api";
const LOGIN_LOGOUT_ROUTES: &[&str] = &["/+login", "login", "logout"];

impl ExemptionClass {
    #[must_use]
    pub fn matches(self, route_name: &str, url: &str) -> bool {
        match self {
            Self::IndexApi => route_name.ends_with(INDEX_API_SUFFIX),
            Self::LoginLogout => LOGIN_LOGOUT_ROUTES.contains(&route_name),
            Self::StaticAssets => route_name.contains("+static") && url.contains("/+static"),
            Self::ThemeStaticAssets => {
                route_name.contains("+theme-static") && url.contains("/+theme-static")
            }
        }
    }
}

/// Stateless; every call with the same inputs gives the same answer.
#[derive(Debug, Default, Clone, Copy)]
pub struct AuthDecisionGate;

impl AuthDecisionGate {
    #[must_use]
    pub fn decide(
        &self,
        route_name: Option<&str>,
        url: &str,
        authenticated_user_id: Option<&str>,
        user_agent: &str,
    ) -> Decision {
        let decision = Self::resolve(
            Self::is_exempt(route_name, url),
            Self::is_unauthenticated(authenticated_user_id),
            user_agent,
        );
        tracing::debug!(route = route_name.unwrap_or("<none>"), url, ?decision, "Authcheck");
        decision
    }

    /// The decision table, given the aggregated answers of the authcheck hooks.
    #[must_use]
    pub fn resolve(always_ok: bool, unauthorized: bool, user_agent: &str) -> Decision {
        if always_ok || !unauthorized {
            Decision::Allow
        } else {
            Decision::deny_for(user_agent)
        }
    }

    /// No route matched means no exemption.
    #[must_use]
    pub fn is_exempt(route_name: Option<&str>, url: &str) -> bool {
        let Some(route_name) = route_name else {
            return false;
        };
        EXEMPTIONS.iter().any(|class| class.matches(route_name, url))
    }

    #[must_use]
    pub fn is_unauthenticated(authenticated_user_id: Option<&str>) -> bool {
        authenticated_user_id.is_none_or(|id| id.trim().is_empty())
    }
}

impl AuthHook for AuthDecisionGate {
    fn name(&self) -> &'static str {
        "authcheck-gate"
    }

    fn authcheck_always_ok(&self, ctx: &RequestContext) -> Option<bool> {
        Self::is_exempt(ctx.route_name(), ctx.url()).then_some(true)
    }

    fn authcheck_unauthorized(&self, ctx: &RequestContext) -> Option<bool> {
        Some(Self::is_unauthenticated(ctx.authenticated_user_id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKENS_UI: Option<&str> = Some("/{user}/+tokens/ui");
    const BROWSER: &str = "Mozilla/5.0";
    const CLI: &str = "devpi-client/6.0";

    #[test]
    fn index_api_without_session() {
        let gate = AuthDecisionGate;
        let d = gate.decide(Some("pkg-index/+api"), "http://x/pkg-index/+api", None, BROWSER);
        assert_eq!(d, Decision::Allow);
        assert_eq!(Decision::Allow.status(), StatusCode::OK);
    }

    #[test]
    fn browser_without_session() {
        let gate = AuthDecisionGate;
        let d = gate.decide(TOKENS_UI, "http://x/alice/+tokens/ui", None, BROWSER);
        assert_eq!(d, Decision::Unauthorized);
        assert_eq!(d.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn cli_without_session() {
        let gate = AuthDecisionGate;
        let d = gate.decide(TOKENS_UI, "http://x/alice/+tokens/ui", None, CLI);
        assert_eq!(d, Decision::Forbidden);
        assert_eq!(d.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn logged_in() {
        let gate = AuthDecisionGate;
        for ua in [BROWSER, CLI] {
            let d = gate.decide(TOKENS_UI, "http://x/alice/+tokens/ui", Some("alice"), ua);
            assert_eq!(d, Decision::Allow, "{ua}");
        }
    }

    #[test]
    fn no_route_is_not_exempt() {
        let gate = AuthDecisionGate;
        assert_eq!(gate.decide(None, "http://x/+api", None, BROWSER), Decision::Unauthorized);
        assert_eq!(gate.decide(None, "http://x/+static/x.css", None, CLI), Decision::Forbidden);
        assert_eq!(gate.decide(None, "http://x/whatever", Some("bob"), BROWSER), Decision::Allow);
    }

    #[test]
    fn blank_user_is_anonymous() {
        let gate = AuthDecisionGate;
        for blank in ["", " ", "\t\n"] {
            let d = gate.decide(TOKENS_UI, "http://x/a/+tokens/ui", Some(blank), BROWSER);
            assert_eq!(d, Decision::Unauthorized, "{blank:?}");
        }
    }

    #[test]
    fn exemptions_ignore_login_state() {
        let gate = AuthDecisionGate;
        let exempt = [
            ("/+api", "http://x/+api"),
            ("/{user}/{index}/+api", "http://x/root/pypi/+api"),
            ("/+login", "http://x/+login"),
            ("login", "http://x/+saml/login"),
            ("logout", "http://x/+saml/logout"),
            ("/+static/{path:path}", "http://x/+static/style.css"),
            ("/+theme-static/{path:path}", "http://x/+theme-static/logo.png"),
        ];
        for (route, url) in exempt {
            for user in [None, Some(""), Some("alice")] {
                for ua in ["", BROWSER, CLI] {
                    let d = gate.decide(Some(route), url, user, ua);
                    assert_eq!(d, Decision::Allow, "{route} {url}");
                }
            }
        }
    }

    #[test]
    fn static_needs_matching_url() {
        let gate = AuthDecisionGate;
        // route name alone isn't enough
        let d = gate.decide(Some("/+static/{path:path}"), "http://x/other", None, BROWSER);
        assert_eq!(d, Decision::Unauthorized);
        let theme = Some("/+theme-static/{path:path}");
        let d = gate.decide(theme, "http://x/+static/a", None, BROWSER);
        assert_eq!(d, Decision::Unauthorized);
        assert!(!ExemptionClass::LoginLogout.matches("/+logout", "http://x/+logout"));
        assert!(!ExemptionClass::IndexApi.matches("/+api/extra", "http://x/+api/extra"));
    }

    #[test]
    fn decide_is_idempotent() {
        let gate = AuthDecisionGate;
        let inputs = [
            (TOKENS_UI, None, BROWSER),
            (TOKENS_UI, None, CLI),
            (TOKENS_UI, Some("alice"), BROWSER),
            (Some("/+api"), None, CLI),
            (None, None, ""),
        ];
        for (route, user, ua) in inputs {
            let first = gate.decide(route, "http://x/a/b", user, ua);
            for _ in 0..10 {
                assert_eq!(gate.decide(route, "http://x/a/b", user, ua), first);
            }
        }
    }

    #[test]
    fn resolve_table() {
        assert_eq!(AuthDecisionGate::resolve(true, true, CLI), Decision::Allow);
        assert_eq!(AuthDecisionGate::resolve(false, false, CLI), Decision::Allow);
        assert_eq!(AuthDecisionGate::resolve(false, true, CLI), Decision::Forbidden);
        assert_eq!(AuthDecisionGate::resolve(false, true, "curl/8.0"), Decision::Unauthorized);
    }
}
