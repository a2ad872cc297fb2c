//! Identity validator contract
//!
//! Token formats and signature checks live outside this crate; the engine
//! only needs the verified claims back.

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::context::AuthMethod;
use crate::error::Result;

/// Verified claims returned by a [`TokenValidator`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Opaque subject id, used exactly as issued
    pub subject: String,
    /// Human-readable name
    pub display_name: String,
    /// Cluster the token was minted for, if the token says
    pub cluster_id: Option<String>,
    /// Node that issued the token
    pub issuer: String,
    /// Roles or claims embedded in the token
    pub roles: Vec<String>,
    /// Email claim; present for human accounts
    pub email: Option<String>,
    /// How the credential was proven
    pub auth_method: AuthMethod,
}

/// Validates bearer credentials
///
/// Implementations must be cancel-safe: the engine drops the future when
/// the caller goes away or the deadline passes.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Validate `token` and return the verified identity
    ///
    /// Returns `Error::InvalidToken` for bad, expired or revoked tokens.
    async fn validate_token(&self, token: &str) -> Result<Identity>;
}
