//! Per-call identity and request context
//!
//! [`CallMetadata`] is what the transport tells us (metadata keys, peer
//! address, method). [`AuthContext`] is the canonical identity built from it
//! once the token has been validated; it is never mutated afterwards.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::Serialize;
use tonic::metadata::MetadataMap;

use crate::identity::Identity;

/// Metadata key carrying the bearer credential
pub const TOKEN_KEY: &str = "token";
/// Standard authorization header, used when `token` is absent
pub const AUTHORIZATION_KEY: &str = "authorization";
/// Metadata key carrying the calling application id
pub const APPLICATION_KEY: &str = "application";
/// Metadata key carrying the target domain
pub const DOMAIN_KEY: &str = "domain";
/// Metadata key carrying an optional port appended to the domain
pub const PORT_KEY: &str = "port";

/// Kind of principal behind a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalType {
    /// Human or service account
    Account,
    /// Calling client application
    Application,
    /// Federated peer node
    Peer,
    /// Superuser
    Admin,
    /// No identity
    Anonymous,
}

impl PrincipalType {
    /// Wire name used in audit records
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Application => "application",
            Self::Peer => "peer",
            Self::Admin => "admin",
            Self::Anonymous => "anonymous",
        }
    }
}

impl fmt::Display for PrincipalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the caller proved its identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Signed bearer token
    Jwt,
    /// Client certificate
    Mtls,
    /// Static API key
    ApiKey,
    /// Nothing presented
    None,
}

impl AuthMethod {
    /// Wire name used in audit records
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jwt => "jwt",
            Self::Mtls => "mtls",
            Self::ApiKey => "apikey",
            Self::None => "none",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-level facts about an inbound call
///
/// The token is kept only long enough to validate it and to fingerprint the
/// decision cache key. `Debug` redacts it.
#[derive(Clone, Default)]
pub struct CallMetadata {
    /// Full gRPC method, e.g. `/dns.DnsService/CreateZone`
    pub method: String,
    /// Bearer credential, if any
    pub token: Option<String>,
    /// Calling application id (empty when absent)
    pub application: String,
    /// Target domain, with `:port` appended when a separate port was sent
    pub domain: String,
    /// Peer socket address, if the transport knows it
    pub remote_addr: Option<SocketAddr>,
}

impl fmt::Debug for CallMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallMetadata")
            .field("method", &self.method)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("application", &self.application)
            .field("domain", &self.domain)
            .field("remote_addr", &self.remote_addr)
            .finish()
    }
}

impl CallMetadata {
    /// Extract call metadata from a tonic request
    pub fn from_request<T>(method: &str, request: &tonic::Request<T>) -> Self {
        Self::from_parts(method, request.metadata(), request.remote_addr())
    }

    /// Extract call metadata from raw parts
    pub fn from_parts(
        method: &str,
        metadata: &MetadataMap,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        let domain = metadata_str(metadata, DOMAIN_KEY).unwrap_or_default();
        let domain = match metadata_str(metadata, PORT_KEY) {
            Some(port) if !domain.is_empty() && !domain.contains(':') => {
                format!("{domain}:{port}")
            }
            _ => domain,
        };

        Self {
            method: method.to_string(),
            token: extract_token(metadata),
            application: metadata_str(metadata, APPLICATION_KEY).unwrap_or_default(),
            domain,
            remote_addr,
        }
    }

    /// Whether the call came from this host
    ///
    /// A call with no peer address (unix socket, in-process) counts as local.
    pub fn is_loopback(&self) -> bool {
        self.remote_addr
            .map(|addr| is_loopback_ip(addr.ip()))
            .unwrap_or(true)
    }
}

/// Read the bearer credential: `token` first, then `authorization`
/// (with an optional, case-insensitive `Bearer ` prefix)
pub fn extract_token(metadata: &MetadataMap) -> Option<String> {
    if let Some(token) = metadata_str(metadata, TOKEN_KEY) {
        return Some(token);
    }

    let auth = metadata_str(metadata, AUTHORIZATION_KEY)?;
    if auth.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let has_bearer = auth
        .get(..7)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("bearer "));
    let token = if has_bearer {
        auth[7..].trim().to_string()
    } else {
        auth
    };
    Some(token).filter(|t| !t.is_empty())
}

fn metadata_str(metadata: &MetadataMap, key: &str) -> Option<String> {
    metadata
        .get(key)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn is_loopback_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => v6.is_loopback() || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback()),
    }
}

/// Canonical identity and security properties of a single call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// Verified subject id; empty when anonymous
    pub subject: String,
    /// Display name reported by the validator
    pub display_name: String,
    /// Kind of principal
    pub principal_type: PrincipalType,
    /// How the identity was proven
    pub auth_method: AuthMethod,
    /// Token issuer (the peer node that minted the token)
    pub issuer: String,
    /// Cluster the caller belongs to; empty when unknown
    pub cluster_id: String,
    /// Whether the call came from this host
    pub is_loopback: bool,
    /// Full gRPC method
    pub grpc_method: String,
    /// Whether the cluster was still in Day-0 bootstrap for this call
    pub is_bootstrap: bool,
    /// Peer address as seen by the transport, if any
    pub remote_addr: Option<SocketAddr>,
}

impl AuthContext {
    /// Context for a call with no (validated) identity
    pub fn anonymous(call: &CallMetadata, is_bootstrap: bool) -> Self {
        Self {
            subject: String::new(),
            display_name: String::new(),
            principal_type: PrincipalType::Anonymous,
            auth_method: AuthMethod::None,
            issuer: String::new(),
            cluster_id: String::new(),
            is_loopback: call.is_loopback(),
            grpc_method: call.method.clone(),
            is_bootstrap,
            remote_addr: call.remote_addr,
        }
    }

    /// Context for a call whose token was validated
    pub fn authenticated(
        call: &CallMetadata,
        is_bootstrap: bool,
        identity: Identity,
        superuser: &str,
    ) -> Self {
        let principal_type = classify_principal(&identity, superuser);
        let cluster_id = identity
            .cluster_id
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| identity.issuer.clone());

        Self {
            subject: identity.subject,
            display_name: identity.display_name,
            principal_type,
            auth_method: identity.auth_method,
            issuer: identity.issuer,
            cluster_id,
            ..Self::anonymous(call, is_bootstrap)
        }
    }

    /// Whether a subject was established
    pub fn is_authenticated(&self) -> bool {
        !self.subject.is_empty()
    }
}

impl fmt::Display for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AuthContext{{subject={:?}, type={}, method={}, bootstrap={}, loopback={}}}",
            self.subject, self.principal_type, self.grpc_method, self.is_bootstrap, self.is_loopback
        )
    }
}

fn classify_principal(identity: &Identity, superuser: &str) -> PrincipalType {
    let subject = identity.subject.as_str();
    if subject.is_empty() {
        PrincipalType::Anonymous
    } else if subject == superuser || subject.starts_with(&format!("{superuser}@")) {
        PrincipalType::Admin
    } else if identity.email.as_deref().is_some_and(|e| !e.is_empty()) {
        PrincipalType::Account
    } else {
        PrincipalType::Application
    }
}
