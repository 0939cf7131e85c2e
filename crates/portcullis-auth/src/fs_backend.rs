//! Users and API tokens kept in a single JSON file.
//!
//! Tokens are only stored as peppered HMACs, so a leaked file doesn't leak usable tokens.

use crate::base64_serde;
use crate::store::{StoreError, StoreResult, Transaction, UserRecord, UserStore};
use crate::tokens::TokenProvider;
use crate::{AuthError, AuthResult};
use anyhow::Context;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use portcullis_api_types::tokens::{Restrictions, TokenInfo};
use serde::{Deserialize, Serialize};
use sha2::Sha224; // FIPS 180-4
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// 28 base64 chars
pub type BareToken = [u8; 21];
const TOKEN_PREFIX: &str = "pc1_";
const DATA_FILE: &str = "users.json";
/// Bytes of the hash shown as the token id
const TOKEN_ID_LEN: usize = 6;

pub struct FsAuthStore {
    data_file_path: PathBuf,
    data: RwLock<Option<AuthData>>,
    /// 24 base64 chars in config
    pepper: [u8; 18],
}

#[derive(Deserialize, Clone)]
pub struct Config {
    pub auth_path: PathBuf,
    #[serde(with = "base64_serde")]
    pub auth_tokens_pepper: [u8; 18],
}

impl FsAuthStore {
    pub fn new(config: Config) -> AuthResult<Self> {
        std::fs::create_dir_all(&config.auth_path)
            .with_context(|| format!("Auth root at {}", config.auth_path.display()))?;
        Ok(Self {
            data_file_path: config.auth_path.join(DATA_FILE),
            data: RwLock::default(),
            pepper: config.auth_tokens_pepper,
        })
    }

    fn token_to_str(&self, bare_token: &BareToken) -> String {
        let mut out = String::with_capacity(TOKEN_PREFIX.len() + bare_token.len() * 8 / 6 + 1);
        out.push_str(TOKEN_PREFIX);
        base64_serde::encode(bare_token, &mut out);
        debug_assert_eq!(self.token_from_str(&out).ok(), Some(self.hash_token(bare_token)));
        out
    }

    fn token_from_str(&self, token_str: &str) -> AuthResult<HashedToken> {
        let rest = token_str.strip_prefix(TOKEN_PREFIX).ok_or(AuthError::InvalidCredentials)?;
        let bare = base64_serde::decode(rest).ok_or(AuthError::InvalidCredentials)?;
        Ok(self.hash_token(&bare))
    }

    fn hash_token(&self, bare_token: &BareToken) -> HashedToken {
        use hmac::{Hmac, Mac};
        let mut mac = Hmac::<Sha224>::new_from_slice(&self.pepper).expect("HMAC takes keys of any length");
        mac.update(bare_token);
        HashedToken(mac.finalize().into_bytes().into())
    }

    fn load_data_file(&self) -> StoreResult<AuthData> {
        if !self.data_file_path.try_exists().context("access to auth dir")? {
            return Ok(AuthData::default());
        }
        let data = std::fs::File::open(&self.data_file_path)
            .map(BufReader::new)
            .context("read auth data")
            .and_then(|r| serde_json::from_reader(r).context("parse auth data"))?;
        Ok(data)
    }

    fn data(&self) -> StoreResult<MappedRwLockReadGuard<'_, AuthData>> {
        let mut read_lock = self.data.read();
        loop {
            if let Ok(loaded) = RwLockReadGuard::try_map(read_lock, |x| x.as_ref()) {
                return Ok(loaded);
            }
            let mut locked = self.data.write();
            if locked.is_none() {
                *locked = Some(self.load_data_file()?);
            }
            read_lock = RwLockWriteGuard::downgrade(locked);
        }
    }

    fn data_mut(&self) -> StoreResult<MappedRwLockWriteGuard<'_, AuthData>> {
        let mut locked = self.data.write();
        if locked.is_none() {
            *locked = Some(self.load_data_file()?);
        }
        Ok(RwLockWriteGuard::map(locked, |x| x.get_or_insert_with(AuthData::default)))
    }

    fn sync_data(&self, data: &AuthData) -> StoreResult<()> {
        fn inner(path: &Path, data: &AuthData) -> io::Result<()> {
            let parent = path.parent().ok_or(io::ErrorKind::InvalidInput)?;
            let mut tmp = NamedTempFile::new_in(parent)?;
            serde_json::to_writer(io::BufWriter::new(tmp.by_ref()), data)?;
            tmp.persist(path)?;
            Ok(())
        }
        inner(&self.data_file_path, data).context("saving auth data")?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for FsAuthStore {
    async fn healthcheck(&self) -> anyhow::Result<()> {
        let _ = self.data()?;
        Ok(())
    }

    async fn get_user(&self, _txn: &Transaction, username: &str) -> StoreResult<Option<UserRecord>> {
        Ok(self.data()?.users.get(username).cloned())
    }

    async fn create_user(&self, txn: &Transaction, username: &str) -> StoreResult<UserRecord> {
        txn.ensure_writable()?;
        let data = &mut *self.data_mut()?;
        if data.users.contains_key(username) {
            return Err(StoreError::UserExists(username.into()));
        }
        let user = UserRecord {
            username: username.into(),
            created: Utc::now(),
        };
        data.users.insert(username.into(), user.clone());
        self.sync_data(data)?;
        Ok(user)
    }
}

#[async_trait]
impl TokenProvider for FsAuthStore {
    async fn healthcheck(&self) -> anyhow::Result<()> {
        let _ = self.data()?;
        Ok(())
    }

    async fn get_tokens_info(&self, user: &str) -> AuthResult<BTreeMap<String, TokenInfo>> {
        let data = self.data()?;
        Ok(data
            .tokens
            .iter()
            .filter(|(_, t)| &*t.user == user)
            .map(|(hashed, t)| {
                (hashed.id(), TokenInfo {
                    restrictions: t.restrictions.iter().map(String::from).collect(),
                })
            })
            .collect())
    }

    async fn new_token(&self, user: &str, restrictions: Restrictions) -> AuthResult<String> {
        let data = &mut *self.data_mut()?;
        if !data.users.contains_key(user) {
            return Err(AuthError::UnknownUser);
        }
        let bare_token: BareToken = rand::random();
        let hashed_token = self.hash_token(&bare_token);
        let token_str = self.token_to_str(&bare_token);
        let id = hashed_token.id();
        data.tokens.insert(hashed_token, StoredToken {
            user: user.into(),
            restrictions,
        });
        self.sync_data(data)?;
        tracing::info!("Created token {id} for {user}");
        Ok(token_str)
    }

    async fn remove_token(&self, user: &str, token_id: &str) -> AuthResult<()> {
        let data = &mut *self.data_mut()?;
        let hashed = data
            .tokens
            .iter()
            .find(|(hashed, t)| &*t.user == user && hashed.id() == token_id)
            .map(|(hashed, _)| hashed.clone())
            .ok_or(StoreError::TokenNotFound)?;
        data.tokens.remove(&hashed);
        self.sync_data(data)?;
        tracing::info!("Removed token {token_id} of {user}");
        Ok(())
    }

    async fn user_for_token(&self, token_str: &str) -> AuthResult<String> {
        let hashed = self.token_from_str(token_str)?;
        let data = self.data()?;
        let token = data.tokens.get(&hashed).ok_or(AuthError::InvalidCredentials)?;
        if token.restrictions.is_expired_at(Utc::now().timestamp()) {
            tracing::info!("Token {} of {} has expired", hashed.id(), token.user);
            return Err(AuthError::InvalidCredentials);
        }
        Ok(token.user.to_string())
    }
}

#[derive(Serialize, Deserialize, Default)]
struct AuthData {
    #[serde(default)]
    users: BTreeMap<Box<str>, UserRecord>,
    #[serde(default)]
    tokens: HashMap<HashedToken, StoredToken>,
}

#[derive(Serialize, Deserialize)]
struct StoredToken {
    user: Box<str>,
    restrictions: Restrictions,
}

/// Because it's hashed, it can have Eq without constant-time comparisons,
/// because attackers control only unhashed token, and won't be able to reliably
/// choose more than a few bytes for an oracle.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Hash)]
struct HashedToken(#[serde(with = "base64_serde")] [u8; 28]);

impl HashedToken {
    /// Stable public handle, doesn't allow recovering the token.
    fn id(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.0[..TOKEN_ID_LEN])
    }
}

/// Needed for assert
impl fmt::Debug for HashedToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("HashedToken")
    }
}
