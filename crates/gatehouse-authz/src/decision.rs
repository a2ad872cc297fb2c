//! Authorization outcomes

use std::fmt;

use serde::Serialize;
use tonic::Status;

use crate::bootstrap::BootstrapDenial;
use crate::context::AuthContext;
use crate::rbac::SubjectType;

/// Why a call was allowed or denied
///
/// The snake_case codes are written to the audit trail and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// Method is on the unauthenticated allowlist
    Allowlist,
    /// Day-0 loopback call inside the bootstrap window
    BootstrapAllowed,
    /// Day-0 call from a remote address
    BootstrapRemote,
    /// Day-0 call after the bootstrap window closed
    BootstrapExpired,
    /// Day-0 call to a method outside the bootstrap allowlist
    BootstrapMethodBlocked,
    /// Initialized cluster, caller carries no cluster id
    ClusterIdMissing,
    /// Caller belongs to another cluster
    ClusterIdMismatch,
    /// Token was rejected (or validation did not finish in time)
    InvalidToken,
    /// Anonymous call to a mutating method after Day-0
    AuthenticationRequired,
    /// Superuser subject
    Superuser,
    /// Positive RBAC decision served from the decision cache
    CacheHit,
    /// One of the subject's roles grants the method
    RoleBindingGranted,
    /// No role grants the method, or the binding could not be read
    RoleBindingDenied,
    /// Method has no RBAC mapping; allowed with a warning
    NoRbacMappingWarning,
    /// Method has no RBAC mapping and unmapped methods are denied
    NoRbacMappingDenied,
    /// Mutating method without RBAC mapping on an initialized cluster
    NoRbacMappingPostDay0,
    /// Some subject of the fallback chain holds a grant
    RbacGranted,
    /// Nothing granted access
    PermissionDenied,
}

impl Reason {
    /// Audit code
    pub fn code(self) -> &'static str {
        match self {
            Self::Allowlist => "allowlist",
            Self::BootstrapAllowed => "bootstrap_allowed",
            Self::BootstrapRemote => "bootstrap_remote",
            Self::BootstrapExpired => "bootstrap_expired",
            Self::BootstrapMethodBlocked => "bootstrap_method_blocked",
            Self::ClusterIdMissing => "cluster_id_missing",
            Self::ClusterIdMismatch => "cluster_id_mismatch",
            Self::InvalidToken => "invalid_token",
            Self::AuthenticationRequired => "authentication_required",
            Self::Superuser => "superuser",
            Self::CacheHit => "cache_hit",
            Self::RoleBindingGranted => "role_binding_granted",
            Self::RoleBindingDenied => "role_binding_denied",
            Self::NoRbacMappingWarning => "no_rbac_mapping_warning",
            Self::NoRbacMappingDenied => "no_rbac_mapping_denied",
            Self::NoRbacMappingPostDay0 => "no_rbac_mapping_post_day0",
            Self::RbacGranted => "rbac_granted",
            Self::PermissionDenied => "permission_denied",
        }
    }

    /// Whether the caller failed to prove who they are, as opposed to
    /// lacking permission
    pub fn is_authentication_failure(self) -> bool {
        matches!(
            self,
            Self::InvalidToken
                | Self::AuthenticationRequired
                | Self::ClusterIdMissing
                | Self::ClusterIdMismatch
        )
    }
}

impl From<BootstrapDenial> for Reason {
    fn from(denial: BootstrapDenial) -> Self {
        match denial {
            BootstrapDenial::Remote => Self::BootstrapRemote,
            BootstrapDenial::Expired => Self::BootstrapExpired,
            BootstrapDenial::MethodBlocked => Self::BootstrapMethodBlocked,
            BootstrapDenial::ClusterIdMissing => Self::ClusterIdMissing,
            BootstrapDenial::ClusterIdMismatch => Self::ClusterIdMismatch,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of authorizing one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Whether the call may proceed
    pub allowed: bool,
    /// Why
    pub reason: Reason,
    /// Identity the decision was made for
    pub auth: AuthContext,
    /// Target domain from the call metadata
    pub domain: String,
    /// Calling application id
    pub application: String,
    /// Bound resource paths, comma-joined; empty when none
    pub resource_path: String,
    /// Permissions required on those resources, comma-joined
    pub permission: String,
    /// Subject of the fallback chain that held the grant
    pub granted_by: Option<(SubjectType, String)>,
}

impl Decision {
    /// Error returned to the caller for a denial; `None` when allowed
    ///
    /// Never includes credentials.
    pub fn to_status(&self) -> Option<Status> {
        if self.allowed {
            return None;
        }

        let message = format!(
            "permission denied ({}): method={} user={} domain={} application={}",
            self.reason,
            self.auth.grpc_method,
            self.auth.subject,
            self.domain,
            self.application
        );
        Some(if self.reason.is_authentication_failure() {
            Status::unauthenticated(message)
        } else {
            Status::permission_denied(message)
        })
    }
}
