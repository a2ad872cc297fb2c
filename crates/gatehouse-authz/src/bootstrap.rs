//! Day-0 bootstrap gate contract
//!
//! The state machine deciding whether a cluster is still in Day-0 (flag
//! file, time window, nonce) is owned elsewhere. The engine asks it two
//! things: is the cluster initialized, and may this call bypass
//! authorization under bootstrap rules.

use std::fmt;

use serde::Serialize;

#[cfg(test)]
use mockall::automock;

use crate::context::AuthContext;

/// Why the gate refused a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapDenial {
    /// Call did not originate from loopback
    Remote,
    /// Bootstrap window has closed
    Expired,
    /// Method is not on the Day-0 allowlist
    MethodBlocked,
    /// Cluster is initialized but the caller presented no cluster id
    ClusterIdMissing,
    /// Caller's cluster id differs from the local one
    ClusterIdMismatch,
}

impl BootstrapDenial {
    /// Reason code recorded in the audit trail
    pub fn code(self) -> &'static str {
        match self {
            Self::Remote => "bootstrap_remote",
            Self::Expired => "bootstrap_expired",
            Self::MethodBlocked => "bootstrap_method_blocked",
            Self::ClusterIdMissing => "cluster_id_missing",
            Self::ClusterIdMismatch => "cluster_id_mismatch",
        }
    }
}

impl fmt::Display for BootstrapDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of asking the gate about an uninitialized cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapVerdict {
    /// Bootstrap mode is not enabled; normal authorization applies
    Inactive,
    /// Loopback, allowlisted method, inside the window
    Allowed,
    /// Bootstrap mode is on but this call fails one of its gates
    Denied(BootstrapDenial),
}

/// Collaborator deciding Day-0 behaviour
#[cfg_attr(test, automock)]
pub trait BootstrapGate: Send + Sync {
    /// Whether Day-0 is complete (local cluster id set, bootstrap inactive)
    fn is_cluster_initialized(&self) -> bool;

    /// Whether this call may bypass authorization under bootstrap rules
    fn should_allow(&self, ctx: &AuthContext) -> BootstrapVerdict;

    /// Check an authenticated caller's cluster id against the local one
    ///
    /// Only consulted once the cluster is initialized.
    fn check_cluster_id(&self, ctx: &AuthContext) -> Result<(), BootstrapDenial>;
}

/// Gate for clusters that are always initialized and never check cluster ids
///
/// Useful for single-node deployments and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitializedCluster;

impl BootstrapGate for InitializedCluster {
    fn is_cluster_initialized(&self) -> bool {
        true
    }

    fn should_allow(&self, _ctx: &AuthContext) -> BootstrapVerdict {
        BootstrapVerdict::Inactive
    }

    fn check_cluster_id(&self, _ctx: &AuthContext) -> Result<(), BootstrapDenial> {
        Ok(())
    }
}
