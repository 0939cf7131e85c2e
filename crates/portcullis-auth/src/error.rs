use crate::store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("The credentials were missing, or were insufficient to perform the operation requested")]
    Unauthorized,
    #[error("The client is not allowed to perform the operation requested")]
    Forbidden,
    #[error("User is not authorized on this server")]
    UnknownUser,
    #[error("The credentials supplied were invalid")]
    InvalidCredentials,
    #[error("The requested token does not exist")]
    TokenNotFound,
    #[error("Invalid request: {0}")]
    BadRequest(&'static str),
    #[error("Internal error ({})", error_id(_0))]
    ServiceError(#[from] anyhow::Error),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::TokenNotFound => Self::TokenNotFound,
            other => Self::ServiceError(other.into()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let code = match &self {
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::UnknownUser => StatusCode::FORBIDDEN,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::TokenNotFound => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::ServiceError(error) => {
                tracing::error!(?error, "Encountered service error in auth operation");

                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (code, self.to_string()).into_response()
    }
}

/// We can't disclose the actual message, it could contain private info or attacker-injected strings.
/// But it is useful to differentiate between different types of internal errors.
fn error_id(err: &anyhow::Error) -> String {
    let msg = err.to_string();
    format!("{:.6x}", Sha256::digest(msg.as_bytes()))
}

#[test]
fn service_errors_are_opaque() {
    let err = AuthError::ServiceError(anyhow::anyhow!("secret path /etc/shadow"));
    let msg = err.to_string();
    assert!(msg.starts_with("Internal error ("));
    assert!(!msg.contains("shadow"));

    let readonly: AuthError = StoreError::ReadOnly.into();
    assert!(matches!(readonly, AuthError::ServiceError(_)));
    assert!(matches!(AuthError::from(StoreError::TokenNotFound), AuthError::TokenNotFound));
}
