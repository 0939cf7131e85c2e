use crate::AuthResult;
use async_trait::async_trait;
use portcullis_api_types::tokens::{Restrictions, TokenInfo};
use std::collections::BTreeMap;

/// API token lifecycle for a user.
///
/// Tokens are handed out once by [`TokenProvider::new_token`]; afterwards only their ids and
/// restrictions can be listed.
#[async_trait]
pub trait TokenProvider {
    async fn healthcheck(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Token id → info, for all tokens owned by `user`.
    async fn get_tokens_info(&self, user: &str) -> AuthResult<BTreeMap<String, TokenInfo>>;

    /// Create a new token for `user`, returning the full token string.
    async fn new_token(&self, user: &str, restrictions: Restrictions) -> AuthResult<String>;

    /// Fails with `TokenNotFound` if `user` has no token with that id.
    async fn remove_token(&self, user: &str, token_id: &str) -> AuthResult<()>;

    /// Owner of a valid, unexpired token.
    async fn user_for_token(&self, token: &str) -> AuthResult<String>;
}
