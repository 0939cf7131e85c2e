use serde::{Deserialize, Serialize};

/// Prefix of the restriction carrying a token's expiry as a unix timestamp.
pub const EXPIRES_PREFIX: &str = "expires=";

/// Ordered list of restrictions attached to an API token, e.g. `expires=1735689600`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct Restrictions(Vec<String>);

impl Restrictions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, restriction: impl Into<String>) {
        self.0.push(restriction.into());
    }

    #[must_use]
    pub fn with_expires(mut self, timestamp: i64) -> Self {
        self.add(format!("{EXPIRES_PREFIX}{timestamp}"));
        self
    }

    /// Unix timestamp of the last parseable `expires=` restriction.
    /// Later entries override earlier ones.
    #[must_use]
    pub fn expires(&self) -> Option<i64> {
        expires_from(&self.0)
    }

    /// A token without an expiry never expires.
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires().is_some_and(|expires| expires <= now)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl From<Vec<String>> for Restrictions {
    fn from(list: Vec<String>) -> Self {
        Self(list)
    }
}

/// What the token provider reveals about a token without revealing the token itself.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenInfo {
    #[serde(default)]
    pub restrictions: Vec<String>,
}

impl TokenInfo {
    #[must_use]
    pub fn expires(&self) -> Option<i64> {
        expires_from(&self.restrictions)
    }
}

fn expires_from(restrictions: &[String]) -> Option<i64> {
    restrictions
        .iter()
        .rev()
        .filter_map(|r| r.strip_prefix(EXPIRES_PREFIX))
        .find_map(|ts| ts.trim().parse().ok())
}

pub mod request {
    #[derive(serde::Deserialize, Default)]
    #[cfg_attr(feature = "client", derive(serde::Serialize))]
    pub struct CreateToken {
        /// Unix timestamp. The server picks its default lifetime when missing.
        #[serde(default)]
        pub expires: Option<i64>,
    }
}

pub mod response {
    use chrono::{DateTime, Utc};

    #[cfg_attr(feature = "client", derive(serde::Deserialize))]
    #[cfg_attr(feature = "server", derive(serde::Serialize))]
    #[derive(Debug)]
    pub struct TokenList {
        pub error: Option<String>,
        // Sorted by token id.
        pub tokens: Vec<ListedToken>,
        pub urls: TokenListUrls,
    }

    #[cfg_attr(feature = "client", derive(serde::Deserialize))]
    #[cfg_attr(feature = "server", derive(serde::Serialize))]
    #[derive(Debug)]
    pub struct ListedToken {
        pub id: String,
        pub expires: Option<DateTime<Utc>>,
        pub expires_text: String,
        pub delete_url: String,
    }

    #[cfg_attr(feature = "client", derive(serde::Deserialize))]
    #[cfg_attr(feature = "server", derive(serde::Serialize))]
    #[derive(Debug)]
    pub struct TokenListUrls {
        pub add_token: String,
    }

    #[cfg_attr(feature = "client", derive(serde::Deserialize))]
    #[cfg_attr(feature = "server", derive(serde::Serialize))]
    #[derive(Debug)]
    pub struct CreatedToken {
        // Shown once, the server only keeps a hash.
        pub token: String,
        pub urls: CreatedTokenUrls,
    }

    #[cfg_attr(feature = "client", derive(serde::Deserialize))]
    #[cfg_attr(feature = "server", derive(serde::Serialize))]
    #[derive(Debug)]
    pub struct CreatedTokenUrls {
        pub tokens: String,
    }
}

#[test]
fn expires_restriction() {
    let r = Restrictions::new().with_expires(1_700_000_000);
    assert_eq!(r.expires(), Some(1_700_000_000));
    assert!(r.is_expired_at(1_700_000_000));
    assert!(!r.is_expired_at(1_699_999_999));

    let mut r = Restrictions::from(vec!["projects=foo".to_owned(), "expires=garbage".to_owned()]);
    assert_eq!(r.expires(), None);
    assert!(!r.is_expired_at(i64::MAX));
    r.add("expires=42");
    assert_eq!(r.expires(), Some(42));
    // garbage after a valid entry doesn't erase it
    r.add("expires=");
    assert_eq!(r.expires(), Some(42));
    assert_eq!(TokenInfo { restrictions: r.into_vec() }.expires(), Some(42));

    let r = Restrictions::from(vec![
        "expires=4000000000".to_owned(),
        "projects=foo".to_owned(),
        "expires=1700000000".to_owned(),
    ]);
    assert_eq!(r.expires(), Some(1_700_000_000));
    assert!(r.is_expired_at(1_700_000_000));
}
