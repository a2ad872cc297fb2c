//! RBAC service contract
//!
//! The RBAC service is a separate network service. The engine needs three
//! calls from it: per-method resource descriptors, action validation for a
//! subject, and a subject's role bindings.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

#[cfg(test)]
use mockall::automock;

use crate::error::Result;

/// Methods on the RBAC service itself; never role-checked, to avoid the
/// interceptor calling back into the service it is guarding
pub const RBAC_SERVICE_PREFIX: &str = "/rbac.RbacService/";

/// RBAC method whose own descriptor lookup would recurse
pub const RESOURCE_INFOS_METHOD: &str = "/rbac.RbacService/GetActionResourceInfos";

/// Kind of subject a grant is evaluated for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    /// Human or service account
    Account,
    /// Calling client application
    Application,
    /// Federated peer node (token issuer)
    NodeIdentity,
}

impl SubjectType {
    /// Wire name used in audit records
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Application => "application",
            Self::NodeIdentity => "node_identity",
        }
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One resource constraint of a method
///
/// The service declares `index`, `permission` and optionally `field`; `path`
/// is filled in per call from the request message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceInfo {
    /// Request field number holding the resource path
    pub index: u32,
    /// Permission required on that resource (e.g., "write")
    pub permission: String,
    /// Sub-field to read when the indexed field is a message
    pub field: Option<String>,
    /// Resolved resource path; empty until bound
    pub path: String,
}

impl ResourceInfo {
    /// Create an unbound descriptor
    pub fn new(index: u32, permission: impl Into<String>) -> Self {
        Self {
            index,
            permission: permission.into(),
            field: None,
            path: String::new(),
        }
    }

    /// Read the path from a sub-field of the indexed message field
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Copy of this descriptor bound to `path`
    pub fn bound(&self, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..self.clone()
        }
    }
}

/// Client for the RBAC service
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RbacClient: Send + Sync {
    /// Resource descriptors declared for `method`
    ///
    /// Returns `Error::NotFound` when the method has no mapping.
    async fn get_action_resource_infos(&self, method: &str) -> Result<Vec<ResourceInfo>>;

    /// Whether `subject` may call `method` on the bound resources
    async fn validate_action(
        &self,
        method: &str,
        subject: &str,
        subject_type: SubjectType,
        resources: &[ResourceInfo],
    ) -> Result<bool>;

    /// Roles bound to `subject`
    ///
    /// Returns `Error::NotFound` when the subject has no binding.
    async fn get_role_binding(&self, subject: &str) -> Result<Vec<String>>;
}
