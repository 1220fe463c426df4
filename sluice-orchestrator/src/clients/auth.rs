//! Auth service client trait

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Access scopes on a repo, in increasing order of privilege
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scope {
    None,
    Reader,
    Writer,
    Owner,
}

/// The identity behind the current credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhoAmI {
    pub username: String,
    pub is_admin: bool,
}

/// Client for the auth service. Every method returns
/// `Error::AuthNotActivated` when auth is switched off cluster-wide;
/// callers use that to short-circuit into permissive behavior.
#[async_trait]
pub trait AuthClient: Send + Sync {
    async fn who_am_i(&self) -> Result<WhoAmI>;

    /// True if the caller holds at least `scope` on `repo`
    async fn authorize(&self, repo: &str, scope: Scope) -> Result<bool>;

    /// Mint a revocable capability token carrying the caller's rights
    async fn get_capability(&self) -> Result<String>;

    async fn revoke_auth_token(&self, token: &str) -> Result<()>;
}
