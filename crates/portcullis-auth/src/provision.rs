use crate::store::{StoreError, UserRecord, UserStore};
use crate::{AuthError, AuthResult};
use metrics::counter;

/// Look up the local user behind an SSO identity, creating it on first sight.
///
/// Creation first runs in the request's read transaction. If the store refuses because of
/// that, the transaction is restarted for writing and creation is retried once.
pub async fn ensure_user<U>(users: &U, username: &str, create_on_demand: bool) -> AuthResult<UserRecord>
where
    U: UserStore + Sync + ?Sized,
{
    let mut txn = users.begin();
    tracing::debug!(read_only = !txn.is_writable(), "Looking up user {username}");

    if let Some(user) = users.get_user(&txn, username).await? {
        return Ok(user);
    }
    if !create_on_demand {
        tracing::info!("Refusing unknown user {username}, on-demand creation is disabled");
        return Err(AuthError::UnknownUser);
    }

    let created = match users.create_user(&txn, username).await {
        Err(StoreError::ReadOnly) => {
            tracing::debug!("Restarting as write transaction to create {username}");
            users.restart_as_write_transaction(&mut txn).await?;
            users.create_user(&txn, username).await
        }
        res => res,
    };

    match created {
        Ok(user) => {
            counter!("portcullis_users_provisioned_total").increment(1);
            tracing::info!("Created user {username} on demand");
            Ok(user)
        }
        // a concurrent request got there first
        Err(StoreError::UserExists(_)) => users
            .get_user(&txn, username)
            .await?
            .ok_or_else(|| anyhow::anyhow!("user {username} vanished after creation").into()),
        Err(e) => Err(e.into()),
    }
}
