//! Static method policy: role permission table, wildcard matcher and the
//! mutating-method classifier
//!
//! Permission entries are full method paths or wildcards:
//! - `"/*"` grants every method
//! - `"/pkg.Service/*"` grants every method of that service

use std::collections::HashMap;

#[cfg(test)]
use mockall::automock;

/// Full access to every cluster operation
pub const ROLE_ADMIN: &str = "globular-admin";
/// Artifact and service publishing pipeline
pub const ROLE_PUBLISHER: &str = "globular-publisher";
/// Human operators: service lifecycle and domain management
pub const ROLE_OPERATOR: &str = "globular-operator";
/// Least-privilege cluster-controller automation
pub const ROLE_CONTROLLER_SA: &str = "globular-controller-sa";
/// Least-privilege per-node agent
pub const ROLE_NODE_AGENT_SA: &str = "globular-node-agent-sa";

/// Global wildcard
pub const WILDCARD_ALL: &str = "/*";

/// Method-name prefixes that mark a read-only RPC; checked first
const READ_ONLY_PREFIXES: &[&str] = &[
    "get", "list", "watch", "read", "fetch", "query", "check", "status", "health", "metrics",
    "info", "search", "describe", "inspect", "resolve",
];

/// Classification of gRPC methods consumed by the engine
#[cfg_attr(test, automock)]
pub trait MethodPolicy: Send + Sync {
    /// Whether `method` changes state
    fn is_mutating(&self, method: &str) -> bool;

    /// Whether `method` is governed by role bindings
    fn is_role_based(&self, method: &str) -> bool;

    /// Whether any of `roles` grants `method`
    fn has_role_permission(&self, roles: &[String], method: &str) -> bool;
}

/// Whether a single permission entry covers `method`
pub fn permission_matches(permission: &str, method: &str) -> bool {
    if permission == WILDCARD_ALL || permission == method {
        return true;
    }
    match permission.strip_suffix('*') {
        Some(prefix) if prefix.ends_with('/') && prefix.len() > 1 => method.starts_with(prefix),
        _ => false,
    }
}

/// Whether the method name (last path segment) reads as state-changing
///
/// Read-only prefixes win; anything unrecognized is treated as mutating.
pub fn is_mutating_rpc(full_method: &str) -> bool {
    let name = full_method
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if name.is_empty() {
        return true;
    }
    !READ_ONLY_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Role table compiled into the binary
#[derive(Debug, Clone)]
pub struct StaticMethodPolicy {
    roles: HashMap<String, Vec<String>>,
}

impl Default for StaticMethodPolicy {
    fn default() -> Self {
        Self::new(default_role_permissions())
    }
}

impl StaticMethodPolicy {
    /// Build a policy from an explicit role table
    pub fn new(roles: HashMap<String, Vec<String>>) -> Self {
        Self { roles }
    }

    /// Permission entries of `role`, if known
    pub fn permissions(&self, role: &str) -> Option<&[String]> {
        self.roles.get(role).map(Vec::as_slice)
    }
}

impl MethodPolicy for StaticMethodPolicy {
    fn is_mutating(&self, method: &str) -> bool {
        is_mutating_rpc(method)
    }

    /// Listed by exact path or by a service wildcard in some role; the global
    /// wildcard alone does not make every method role-based
    fn is_role_based(&self, method: &str) -> bool {
        self.roles
            .values()
            .flatten()
            .filter(|p| p.as_str() != WILDCARD_ALL)
            .any(|p| permission_matches(p, method))
    }

    fn has_role_permission(&self, roles: &[String], method: &str) -> bool {
        roles
            .iter()
            .filter_map(|r| self.roles.get(r))
            .flatten()
            .any(|p| permission_matches(p, method))
    }
}

/// Minimum permission sets of the built-in roles
pub fn default_role_permissions() -> HashMap<String, Vec<String>> {
    let table: &[(&str, &[&str])] = &[
        (ROLE_ADMIN, &[WILDCARD_ALL]),
        (
            ROLE_PUBLISHER,
            &[
                "/discovery.PackageDiscovery/PublishService",
                "/discovery.PackageDiscovery/PublishApplication",
                "/repository.PackageRepository/UploadArtifact",
                "/repository.PackageRepository/UploadBundle",
                "/repository.PackageRepository/GetArtifactManifest",
                "/repository.PackageRepository/ListArtifacts",
                "/discovery.PackageDiscovery/GetPackageDescriptor",
            ],
        ),
        (
            ROLE_OPERATOR,
            &[
                "/clustercontroller.ResourcesService/ApplyServiceRelease",
                "/clustercontroller.ResourcesService/GetServiceRelease",
                "/clustercontroller.ResourcesService/ListServiceReleases",
                "/clustercontroller.ResourcesService/DeleteServiceRelease",
                "/clustercontroller.ResourcesService/ApplyServiceDesiredVersion",
                "/clustercontroller.ResourcesService/DeleteServiceDesiredVersion",
                "/clustercontroller.ResourcesService/ListServiceDesiredVersions",
                "/clustercontroller.ClusterControllerService/ApplyNodePlan",
                "/clustercontroller.ClusterControllerService/GetNodePlan",
                "/clustercontroller.ClusterControllerService/ListNodes",
                "/clustercontroller.ClusterControllerService/UpgradeGlobular",
                "/clustercontroller.ClusterControllerService/UpdateClusterNetwork",
                "/dns.DnsService/*",
                "/clustercontroller.ClusterControllerService/GetClusterHealth",
                "/clustercontroller.ClusterControllerService/GetClusterInfo",
            ],
        ),
        (
            ROLE_CONTROLLER_SA,
            &[
                "/clustercontroller.ResourcesService/GetServiceRelease",
                "/clustercontroller.ResourcesService/ListServiceReleases",
                "/clustercontroller.ResourcesService/ApplyServiceDesiredVersion",
                "/clustercontroller.ResourcesService/ListServiceDesiredVersions",
                "/clustercontroller.ClusterControllerService/ApplyNodePlan",
                "/clustercontroller.ClusterControllerService/GetNodePlan",
                "/clustercontroller.ClusterControllerService/ListNodes",
                "/clustercontroller.ClusterControllerService/ReportNodeStatus",
                "/clustercontroller.ResourcesService/Watch",
                "/clustercontroller.ClusterControllerService/WatchOperations",
                "/clustercontroller.ClusterControllerService/CompleteOperation",
                "/clustercontroller.ResourcesService/GetClusterNetwork",
                "/clustercontroller.ClusterControllerService/GetClusterHealth",
                "/clustercontroller.ClusterControllerService/GetClusterInfo",
            ],
        ),
        (
            ROLE_NODE_AGENT_SA,
            &[
                "/clustercontroller.ClusterControllerService/ReportNodeStatus",
                "/clustercontroller.ClusterControllerService/RequestJoin",
                "/clustercontroller.ClusterControllerService/GetJoinRequestStatus",
                "/nodeagent.NodeAgentService/ApplyPlan",
                "/nodeagent.NodeAgentService/WatchOperation",
                "/nodeagent.NodeAgentService/GetInventory",
                "/nodeagent.NodeAgentService/BootstrapFirstNode",
                "/clustercontroller.ClusterControllerService/GetClusterInfo",
                "/clustercontroller.ResourcesService/GetClusterNetwork",
            ],
        ),
    ];

    table
        .iter()
        .map(|(role, perms)| {
            (
                role.to_string(),
                perms.iter().map(|p| p.to_string()).collect(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(r: &[&str]) -> Vec<String> {
        r.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_permission_matches() {
        assert!(permission_matches("/*", "/anything.Service/Method"));
        assert!(permission_matches("/dns.DnsService/*", "/dns.DnsService/CreateZone"));
        assert!(!permission_matches("/dns.DnsService/*", "/dnsx.DnsService/CreateZone"));
        assert!(permission_matches(
            "/dns.DnsService/GetZone",
            "/dns.DnsService/GetZone"
        ));
        assert!(!permission_matches(
            "/dns.DnsService/GetZone",
            "/dns.DnsService/GetZones"
        ));
        assert!(!permission_matches("*", "/dns.DnsService/GetZone"));
    }

    #[test]
    fn test_mutating_classifier() {
        assert!(is_mutating_rpc("/clustercontroller.ResourcesService/ApplyServiceRelease"));
        assert!(is_mutating_rpc("/repository.PackageRepository/UploadArtifact"));
        assert!(is_mutating_rpc("/dns.DnsService/SetA"));
        assert!(!is_mutating_rpc("/dns.DnsService/GetZone"));
        assert!(!is_mutating_rpc("/clustercontroller.ClusterControllerService/ListNodes"));
        assert!(!is_mutating_rpc("/grpc.health.v1.Health/Check"));
        assert!(!is_mutating_rpc("/clustercontroller.ResourcesService/Watch"));
    }

    #[test]
    fn test_unknown_methods_are_mutating() {
        assert!(is_mutating_rpc(""));
        assert!(is_mutating_rpc("/some.Service/"));
        assert!(is_mutating_rpc("/some.NewService/DoMutation"));
    }

    #[test]
    fn test_operator_can_apply_release() {
        let policy = StaticMethodPolicy::default();
        let method = "/clustercontroller.ResourcesService/ApplyServiceRelease";
        assert!(policy.is_role_based(method));
        assert!(policy.has_role_permission(&roles(&[ROLE_OPERATOR]), method));
        assert!(!policy.has_role_permission(&[], method));
    }

    #[test]
    fn test_controller_sa_least_privilege() {
        let policy = StaticMethodPolicy::default();
        let sa = roles(&[ROLE_CONTROLLER_SA]);
        assert!(policy.has_role_permission(
            &sa,
            "/clustercontroller.ClusterControllerService/ReportNodeStatus"
        ));
        assert!(!policy.has_role_permission(&sa, "/repository.PackageRepository/UploadArtifact"));
        assert!(!policy.has_role_permission(
            &sa,
            "/clustercontroller.ResourcesService/ApplyServiceRelease"
        ));
    }

    #[test]
    fn test_admin_wildcard() {
        let policy = StaticMethodPolicy::default();
        assert!(policy.has_role_permission(&roles(&[ROLE_ADMIN]), "/file.FileService/ReadFile"));
        // The global wildcard does not make unrelated methods role-based
        assert!(!policy.is_role_based("/file.FileService/ReadFile"));
    }

    #[test]
    fn test_service_wildcard_is_role_based() {
        let policy = StaticMethodPolicy::default();
        assert!(policy.is_role_based("/dns.DnsService/CreateRecord"));
        assert!(policy.has_role_permission(
            &roles(&[ROLE_OPERATOR]),
            "/dns.DnsService/CreateRecord"
        ));
    }

    #[test]
    fn test_unknown_role_grants_nothing() {
        let policy = StaticMethodPolicy::default();
        assert!(!policy.has_role_permission(
            &roles(&["does-not-exist"]),
            "/dns.DnsService/GetZone"
        ));
        assert!(policy.permissions(ROLE_ADMIN).is_some());
        assert!(policy.permissions("does-not-exist").is_none());
    }
}
