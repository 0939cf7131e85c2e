//! Named route patterns, used to find out which route an arbitrary URL would hit.
//!
//! The authcheck endpoint is called with somebody else's URL, so it can't rely on the
//! router's own matching. Patterns use `{name}` for a single segment and `{name:path}` for
//! the remainder of the path. First match in registration order wins.

use anyhow::{Context, bail};
use percent_encoding::percent_decode_str;
use portcullis_auth::context::RouteMatch;
use serde::Deserialize;
use std::borrow::Cow;
use std::collections::BTreeMap;

pub const AUTHCHECK_PATH: &str = "/+authcheck";
pub const HEALTHCHECK_PATH: &str = "/+healthcheck";
pub const TOKENS_PATH: &str = "/+tokens";
pub const USER_TOKENS_ROUTE: &str = "/{user}/+tokens/ui";
pub const TOKEN_CREATE_ROUTE: &str = "/{user}/+token-create/ui";
pub const TOKEN_DELETE_ROUTE: &str = "/{user}/+token-delete/{id}/ui";
pub const LOGIN_PATH: &str = "/+saml/login";
pub const LOGOUT_PATH: &str = "/+saml/logout";

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct RouteSpec {
    pub name: String,
    pub pattern: String,
}

impl RouteSpec {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
        }
    }

    /// Most routes are simply named after their pattern.
    pub fn by_pattern(pattern: &str) -> Self {
        Self::new(pattern, pattern)
    }
}

/// Routes served by this crate.
#[must_use]
pub fn own_routes() -> Vec<RouteSpec> {
    let mut routes: Vec<_> = [
        AUTHCHECK_PATH,
        HEALTHCHECK_PATH,
        TOKENS_PATH,
        USER_TOKENS_ROUTE,
        TOKEN_CREATE_ROUTE,
        TOKEN_DELETE_ROUTE,
    ]
    .into_iter()
    .map(RouteSpec::by_pattern)
    .collect();
    routes.push(RouteSpec::new("login", LOGIN_PATH));
    routes.push(RouteSpec::new("logout", LOGOUT_PATH));
    routes
}

/// Routes of the package index behind the proxy.
#[must_use]
pub fn default_host_routes() -> Vec<RouteSpec> {
    [
        "/",
        "/+api",
        "/+login",
        "/+static/{path:path}",
        "/+theme-static/{path:path}",
        "/{user}/+api",
        "/{user}",
        "/{user}/{index}/+api",
        "/{user}/{index}/+simple",
        "/{user}/{index}/+simple/{project}",
        "/{user}/{index}/+f/{path:path}",
        "/{user}/{index}",
        "/{user}/{index}/{project}",
        "/{user}/{index}/{project}/{version}",
    ]
    .into_iter()
    .map(RouteSpec::by_pattern)
    .collect()
}

#[derive(Debug, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
    Rest(String),
}

#[derive(Debug)]
struct Route {
    name: String,
    segments: Vec<Segment>,
}

#[derive(Debug)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(specs: impl IntoIterator<Item = RouteSpec>) -> anyhow::Result<Self> {
        let routes = specs
            .into_iter()
            .map(|spec| {
                let segments = parse_pattern(&spec.pattern)
                    .with_context(|| format!("Invalid pattern {:?} for route {:?}", spec.pattern, spec.name))?;
                Ok(Route { name: spec.name, segments })
            })
            .collect::<anyhow::Result<_>>()?;
        Ok(Self { routes })
    }

    /// `path` is the raw, still percent-encoded path without the query string.
    pub fn match_path(&self, path: &str) -> Option<RouteMatch> {
        let decoded = decode_path(path);
        let parts = split_path(&decoded);
        self.routes.iter().find_map(|route| route.match_parts(&parts))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Route {
    fn match_parts(&self, parts: &[&str]) -> Option<RouteMatch> {
        let mut params = BTreeMap::new();
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Rest(name) => {
                    let rest = parts.get(i..).filter(|r| !r.is_empty())?;
                    params.insert(name.clone(), rest.join("/"));
                    return Some(RouteMatch { name: self.name.clone(), params });
                }
                Segment::Static(s) => {
                    if parts.get(i) != Some(&s.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = parts.get(i).filter(|v| !v.is_empty())?;
                    params.insert(name.clone(), (*value).to_owned());
                }
            }
        }
        (parts.len() == self.segments.len()).then(|| RouteMatch {
            name: self.name.clone(),
            params,
        })
    }
}

/// The path as the application behind the proxy routes it.
/// `%2B` and `+` are the same segment there.
pub fn decode_path(path: &str) -> Cow<'_, str> {
    percent_decode_str(path).decode_utf8_lossy()
}

/// Trailing slashes are not significant.
fn split_path(path: &str) -> Vec<&str> {
    let trimmed = path.trim_start_matches('/').trim_end_matches('/');
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

fn parse_pattern(pattern: &str) -> anyhow::Result<Vec<Segment>> {
    if !pattern.starts_with('/') {
        bail!("must start with /");
    }
    let parts = split_path(pattern);
    let last = parts.len().saturating_sub(1);
    parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            let Some(inner) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) else {
                if part.contains(['{', '}']) {
                    bail!("placeholders must span a whole segment");
                }
                return Ok(Segment::Static((*part).to_owned()));
            };
            match inner.split_once(':') {
                Some((name, "path")) if !name.is_empty() => {
                    if i != last {
                        bail!("{{{inner}}} must be the last segment");
                    }
                    Ok(Segment::Rest(name.to_owned()))
                }
                Some((_, kind)) => bail!("unknown placeholder kind {kind:?}"),
                None if !inner.is_empty() => Ok(Segment::Param(inner.to_owned())),
                None => bail!("empty placeholder"),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        RouteTable::new(own_routes().into_iter().chain(default_host_routes())).unwrap()
    }

    fn name(table: &RouteTable, path: &str) -> Option<String> {
        table.match_path(path).map(|m| m.name)
    }

    #[test]
    fn matches_in_order() {
        let t = table();
        assert_eq!(name(&t, "/"), Some("/".into()));
        assert_eq!(name(&t, "/+api"), Some("/+api".into()));
        assert_eq!(name(&t, "/+tokens"), Some(TOKENS_PATH.into()));
        assert_eq!(name(&t, "/alice/+tokens/ui"), Some(USER_TOKENS_ROUTE.into()));
        assert_eq!(name(&t, "/alice/+tokens/ui/"), Some(USER_TOKENS_ROUTE.into()));
        assert_eq!(name(&t, "/+saml/login"), Some("login".into()));
        assert_eq!(name(&t, "/+saml/logout"), Some("logout".into()));
        assert_eq!(name(&t, "/root/pypi/+api"), Some("/{user}/{index}/+api".into()));
        assert_eq!(
            name(&t, "/root/pypi/+simple/requests/"),
            Some("/{user}/{index}/+simple/{project}".into())
        );
        assert_eq!(name(&t, "/root/pypi"), Some("/{user}/{index}".into()));
        assert_eq!(name(&t, "/a/b/c/d/e"), None);
    }

    #[test]
    fn params_and_rest() {
        let t = table();
        let m = t.match_path("/alice/+token-delete/abc123/ui").unwrap();
        assert_eq!(m.name, TOKEN_DELETE_ROUTE);
        assert_eq!(m.params["user"], "alice");
        assert_eq!(m.params["id"], "abc123");

        let m = t.match_path("/+static/css/style.css").unwrap();
        assert_eq!(m.name, "/+static/{path:path}");
        assert_eq!(m.params["path"], "css/style.css");

        // a catch-all needs at least one segment
        assert_eq!(name(&t, "/+static"), Some("/{user}".into()));
    }

    #[test]
    fn encoded_paths_are_decoded() {
        let t = table();
        assert_eq!(name(&t, "/root/pypi/%2Bapi"), Some("/{user}/{index}/+api".into()));
        assert_eq!(name(&t, "/%2bstatic/style.css"), Some("/+static/{path:path}".into()));
        let m = t.match_path("/r%C3%B6ot/+tokens/ui").unwrap();
        assert_eq!(m.params["user"], "röot");
        assert_eq!(decode_path("/%2Btheme-static/a%20b"), "/+theme-static/a b");
    }

    #[test]
    fn bad_patterns() {
        for bad in ["no-slash", "/{}", "/{rest:path}/more", "/x{y}", "/{a:int}"] {
            assert!(RouteTable::new([RouteSpec::by_pattern(bad)]).is_err(), "{bad}");
        }
    }
}
