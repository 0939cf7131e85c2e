use axum::http::header::USER_AGENT;
use axum::http::{HeaderMap, Method};
use std::collections::BTreeMap;

/// Who made the request, as established by one of the identity hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub groups: Vec<String>,
}

impl Identity {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            groups: Vec::new(),
        }
    }
}

/// Route that matched a request path, with the values of its `{param}` segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub name: String,
    pub params: BTreeMap<String, String>,
}

impl RouteMatch {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }
}

/// What the request is being evaluated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Pre-check on behalf of the reverse proxy. Identity is read, never provisioned.
    Authcheck,
    /// A route that needs a local user behind the identity.
    Serve,
}

/// Everything the hooks and the gate are allowed to know about a request.
///
/// For authchecks this describes the original request reconstructed from the proxy's
/// forwarded headers, not the check request itself.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    url: String,
    headers: HeaderMap,
    route: Option<RouteMatch>,
    identity: Option<Identity>,
    purpose: Purpose,
}

impl RequestContext {
    pub fn new(method: Method, url: impl Into<String>, headers: HeaderMap, purpose: Purpose) -> Self {
        Self {
            method,
            url: url.into(),
            headers,
            route: None,
            identity: None,
            purpose,
        }
    }

    #[must_use]
    pub fn with_route(mut self, route: Option<RouteMatch>) -> Self {
        self.route = route;
        self
    }

    pub fn set_identity(&mut self, identity: Option<Identity>) {
        self.identity = identity;
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Empty when missing or not valid UTF-8.
    pub fn user_agent(&self) -> &str {
        self.header(USER_AGENT.as_str()).unwrap_or("")
    }

    pub fn matched_route(&self) -> Option<&RouteMatch> {
        self.route.as_ref()
    }

    pub fn route_name(&self) -> Option<&str> {
        self.route.as_ref().map(|r| r.name.as_str())
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn authenticated_user_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.username.as_str())
    }

    pub fn purpose(&self) -> Purpose {
        self.purpose
    }
}
