//! Credential issuance and verification.
//!
//! Tokens are 32 random bytes, base64url encoded behind a fixed prefix. Only
//! two derived values are persisted:
//! - an Argon2id PHC hash (salted, memory-hard) which is the sole match check;
//! - a lookup key, the first 8 bytes of SHA-256(token) as hex, which narrows
//!   the candidate set so verification never walks the whole table.
//!
//! Hashing and verification are CPU-bound and run on the blocking pool.

use std::sync::Arc;

use anyhow::anyhow;
use argon2::password_hash::{rand_core::OsRng as SaltRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::errors::{AppError, AuthFailure, Denial};
use crate::models::actor::{Actor, Authenticated};
use crate::models::credential::{Credential, CredentialMeta, CredentialOwner, CredentialRole, IssuedCredential};
use crate::store::ForgeStore;

pub const TOKEN_PREFIX: &str = "fgk_";
const TOKEN_BYTES: usize = 32;
const LOOKUP_BYTES: usize = 8;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl HashParams {
    /// Cheapest parameters Argon2 accepts. Never use outside tests.
    pub fn for_tests() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }

    fn hasher(&self) -> anyhow::Result<Argon2<'static>> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|e| anyhow!("invalid argon2 params: {}", e))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Fresh bearer token with 256 bits of entropy.
pub fn generate_token() -> String {
    let mut raw = Zeroizing::new([0u8; TOKEN_BYTES]);
    OsRng.fill_bytes(raw.as_mut());
    format!("{}{}", TOKEN_PREFIX, URL_SAFE_NO_PAD.encode(raw.as_ref()))
}

/// Non-secret index key for a token.
pub fn lookup_key(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..LOOKUP_BYTES])
}

pub fn hash_secret(secret: &str, params: &HashParams) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut SaltRng);
    let hash = params
        .hasher()?
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| anyhow!("hashing failed: {}", e))?;
    Ok(hash.to_string())
}

/// Checks `secret` against a stored PHC string. Parameters come from the hash itself.
pub fn verify_secret(secret: &str, phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!("stored hash is not a valid PHC string: {}", e);
            false
        }
    }
}

pub async fn hash_blocking(secret: String, params: HashParams) -> Result<String, AppError> {
    let secret = Zeroizing::new(secret);
    let hash = tokio::task::spawn_blocking(move || hash_secret(&secret, &params))
        .await
        .map_err(|e| anyhow!("hash task failed: {}", e))??;
    Ok(hash)
}

pub async fn verify_blocking(secret: String, phc: String) -> Result<bool, AppError> {
    let secret = Zeroizing::new(secret);
    let ok = tokio::task::spawn_blocking(move || verify_secret(&secret, &phc))
        .await
        .map_err(|e| anyhow!("verify task failed: {}", e))?;
    Ok(ok)
}

/// Masked form of a token, safe for logs.
pub fn mask(token: &str) -> String {
    if token.len() > 12 {
        format!("{}…", &token[..8])
    } else {
        "****".to_string()
    }
}

/// Issues, verifies and revokes credentials against a `ForgeStore`.
#[derive(Clone)]
pub struct CredentialService {
    store: Arc<dyn ForgeStore>,
    params: HashParams,
}

impl CredentialService {
    pub fn new(store: Arc<dyn ForgeStore>, params: HashParams) -> Self {
        Self { store, params }
    }

    pub fn params(&self) -> HashParams {
        self.params
    }

    /// Mints a credential. The returned `api_key` is the only copy of the plaintext.
    pub async fn issue(
        &self,
        role: CredentialRole,
        owner: CredentialOwner,
        label: &str,
        ttl: Option<chrono::Duration>,
    ) -> Result<IssuedCredential, AppError> {
        if !role.fits(&owner) {
            return Err(AppError::Internal(anyhow!(
                "{} credential cannot be owned by {:?}",
                role,
                owner
            )));
        }

        let token = generate_token();
        let hash = hash_blocking(token.clone(), self.params).await?;
        let now = Utc::now();

        let cred = Credential {
            id: Uuid::new_v4(),
            lookup: lookup_key(&token),
            hash,
            role,
            owner,
            label: label.to_string(),
            created_at: now,
            expires_at: ttl.map(|d| now + d),
        };
        self.store.insert_credential(&cred).await?;

        tracing::info!(
            credential_id = %cred.id,
            role = %role,
            expires_at = ?cred.expires_at,
            "credential issued"
        );

        Ok(IssuedCredential {
            meta: cred.meta(),
            api_key: token,
        })
    }

    /// Resolves a presented token to its actor.
    ///
    /// Expired credentials are deleted on the way out. Worker liveness is
    /// read from the store on every call.
    pub async fn verify(&self, presented: &str) -> Result<Authenticated, AppError> {
        let presented = presented.trim();
        if presented.is_empty() {
            return Err(AppError::Unauthenticated(AuthFailure::Missing));
        }

        let candidates = self.store.find_credentials(&lookup_key(presented)).await?;
        let mut matched = None;
        for cand in candidates {
            if verify_blocking(presented.to_string(), cand.hash.clone()).await? {
                matched = Some(cand);
                break;
            }
        }
        let cred = matched.ok_or(AppError::Unauthenticated(AuthFailure::Unknown))?;

        if cred.is_expired_at(Utc::now()) {
            self.store.delete_credential(cred.id).await?;
            tracing::info!(credential_id = %cred.id, "expired credential presented, deleted");
            return Err(AppError::Unauthenticated(AuthFailure::Expired));
        }

        let actor = self.resolve_owner(&cred).await?;
        Ok(Authenticated {
            credential_id: cred.id,
            role: cred.role,
            actor,
        })
    }

    async fn resolve_owner(&self, cred: &Credential) -> Result<Actor, AppError> {
        if !cred.role.fits(&cred.owner) {
            tracing::error!(credential_id = %cred.id, role = %cred.role, "credential role does not match owner kind");
            return Err(AppError::Unauthenticated(AuthFailure::Unknown));
        }
        match cred.owner {
            CredentialOwner::User(id) => match self.store.get_user(id).await? {
                Some(user) => Ok(Actor::User(user)),
                None => Err(AppError::Unauthenticated(AuthFailure::Unknown)),
            },
            CredentialOwner::Worker(id) => match self.store.get_worker(id).await? {
                Some(worker) if worker.is_deleted() => {
                    tracing::warn!(credential_id = %cred.id, worker_id = %id, "key presented for deleted worker");
                    Err(AppError::Forbidden(Denial::WorkerDeleted))
                }
                Some(worker) => Ok(Actor::Worker(worker)),
                None => Err(AppError::Unauthenticated(AuthFailure::Unknown)),
            },
        }
    }

    /// Deletes a credential only if it belongs to `caller`.
    pub async fn revoke(&self, id: Uuid, caller: CredentialOwner) -> Result<(), AppError> {
        if self.store.delete_owned_credential(id, caller).await? {
            tracing::info!(credential_id = %id, "credential revoked");
            Ok(())
        } else {
            Err(AppError::NotFound)
        }
    }

    pub async fn list(&self, owner: CredentialOwner) -> Result<Vec<CredentialMeta>, AppError> {
        let creds = self.store.list_credentials(owner).await?;
        Ok(creds.iter().map(Credential::meta).collect())
    }
}
