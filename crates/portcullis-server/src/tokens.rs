use crate::identity::Authenticated;
use crate::routes::TOKENS_PATH;
use crate::{ServiceState, found};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use chrono::{DateTime, TimeDelta, Utc};
use portcullis_api_types::tokens::Restrictions;
use portcullis_api_types::tokens::request::CreateToken;
use portcullis_api_types::tokens::response::{CreatedToken, CreatedTokenUrls, ListedToken, TokenList, TokenListUrls};
use portcullis_auth::context::Identity;
use portcullis_auth::tokens::TokenProvider;
use portcullis_auth::{AuthError, AuthResult};
use std::sync::Arc;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

pub fn tokens_router<U, T>() -> Router<Arc<ServiceState<U, T>>>
where
    U: Send + Sync + 'static,
    T: TokenProvider + Send + Sync + 'static,
{
    Router::new()
        .route(TOKENS_PATH, get(current_user_tokens::<U, T>))
        .route("/:user/+tokens/ui", get(list_tokens::<U, T>))
        .route("/:user/+token-create/ui", post(create_token::<U, T>))
        .route("/:user/+token-delete/:id/ui", post(delete_token::<U, T>))
}

pub fn user_tokens_path(user: &str) -> String {
    format!("/{user}/+tokens/ui")
}

/// Users only get to manage their own tokens.
fn ensure_owner(identity: &Identity, user: &str) -> AuthResult<()> {
    if identity.username == user {
        Ok(())
    } else {
        tracing::info!("{} tried to access tokens of {user}", identity.username);
        Err(AuthError::Forbidden)
    }
}

async fn current_user_tokens<U, T>(
    State(state): State<Arc<ServiceState<U, T>>>,
    Authenticated(identity): Authenticated,
) -> Response {
    found(&state.url_for(&user_tokens_path(&identity.username)))
}

async fn list_tokens<U, T>(
    State(state): State<Arc<ServiceState<U, T>>>,
    Authenticated(identity): Authenticated,
    Path(user): Path<String>,
) -> AuthResult<Json<TokenList>>
where
    T: TokenProvider + Sync,
{
    ensure_owner(&identity, &user)?;

    let now = Utc::now();
    let tokens = state
        .tokens
        .get_tokens_info(&user)
        .await?
        .into_iter()
        .map(|(id, info)| {
            let expires = info.expires().and_then(|ts| DateTime::from_timestamp(ts, 0));
            ListedToken {
                expires_text: expires_text(expires, now),
                expires,
                delete_url: state.url_for(&format!("/{user}/+token-delete/{id}/ui")),
                id,
            }
        })
        .collect();

    Ok(Json(TokenList {
        error: None,
        tokens,
        urls: TokenListUrls {
            add_token: state.url_for(&format!("/{user}/+token-create/ui")),
        },
    }))
}

async fn create_token<U, T>(
    State(state): State<Arc<ServiceState<U, T>>>,
    Authenticated(identity): Authenticated,
    Path(user): Path<String>,
    Form(form): Form<CreateToken>,
) -> AuthResult<Json<CreatedToken>>
where
    T: TokenProvider + Sync,
{
    ensure_owner(&identity, &user)?;

    let now = Utc::now().timestamp();
    let expires = match form.expires {
        Some(expires) if expires <= now => return Err(AuthError::BadRequest("Token expiry must be in the future")),
        Some(expires) => expires,
        None => now + i64::from(state.config.token_lifetime_days) * SECONDS_PER_DAY,
    };

    let token = state.tokens.new_token(&user, Restrictions::new().with_expires(expires)).await?;
    tracing::info!("Created API token for {user}, expiring at {expires}");

    Ok(Json(CreatedToken {
        token,
        urls: CreatedTokenUrls {
            tokens: state.url_for(&user_tokens_path(&user)),
        },
    }))
}

async fn delete_token<U, T>(
    State(state): State<Arc<ServiceState<U, T>>>,
    Authenticated(identity): Authenticated,
    Path((user, id)): Path<(String, String)>,
) -> AuthResult<Response>
where
    T: TokenProvider + Sync,
{
    ensure_owner(&identity, &user)?;

    state.tokens.remove_token(&user, &id).await?;
    tracing::info!("Removed API token {id} of {user}");

    Ok(found(&state.url_for(&user_tokens_path(&user))))
}

/// Soon-to-expire tokens show the time as well.
fn expires_text(expires: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    match expires {
        None => "-".into(),
        Some(expires) if expires - now < TimeDelta::days(7) => expires.format("%Y-%m-%d %H:%M:%S").to_string(),
        Some(expires) => expires.format("%Y-%m-%d").to_string(),
    }
}

#[test]
fn expiry_formatting() {
    let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    assert_eq!(expires_text(None, now), "-");
    assert_eq!(
        expires_text(Some(now + TimeDelta::hours(5)), now),
        "2023-11-15 03:13:20"
    );
    assert_eq!(expires_text(Some(now + TimeDelta::days(30)), now), "2023-12-14");
    // already expired
    assert_eq!(expires_text(Some(now - TimeDelta::days(30)), now), "2023-10-15 22:13:20");
}
