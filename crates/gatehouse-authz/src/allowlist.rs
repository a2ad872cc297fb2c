//! Methods that bypass authentication and authorization entirely

use dashmap::DashSet;
use tracing::debug;

/// Infrastructure methods that must always be reachable
pub const DEFAULT_ALLOWED_METHODS: &[&str] = &[
    "/grpc.health.v1.Health/Check",
    "/grpc.health.v1.Health/Watch",
    "/grpc.reflection.v1alpha.ServerReflection/ServerReflectionInfo",
    "/grpc.reflection.v1.ServerReflection/ServerReflectionInfo",
    "/authentication.AuthenticationService/Authenticate",
];

/// Exact methods and method/service prefixes exempt from every check
///
/// Registration is safe while calls are being served.
#[derive(Debug, Default)]
pub struct Allowlist {
    exact: DashSet<String>,
    prefixes: DashSet<String>,
}

impl Allowlist {
    /// Allowlist seeded with [`DEFAULT_ALLOWED_METHODS`]
    pub fn with_defaults() -> Self {
        let list = Self::default();
        list.allow_methods(DEFAULT_ALLOWED_METHODS.iter().copied());
        list
    }

    /// Register fully-qualified methods; empty names are ignored
    pub fn allow_methods<I, S>(&self, methods: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for method in methods {
            let method = method.into();
            if method.is_empty() {
                continue;
            }
            debug!(method = %method, "allowlisted method");
            self.exact.insert(method);
        }
    }

    /// Register prefixes such as `"/log.LogService/"`; empty prefixes are
    /// ignored since they would match everything
    pub fn allow_prefixes<I, S>(&self, prefixes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for prefix in prefixes {
            let prefix = prefix.into();
            if prefix.is_empty() {
                continue;
            }
            debug!(prefix = %prefix, "allowlisted prefix");
            self.prefixes.insert(prefix);
        }
    }

    /// Whether `method` bypasses authorization
    pub fn contains(&self, method: &str) -> bool {
        self.exact.contains(method)
            || self
                .prefixes
                .iter()
                .any(|prefix| method.starts_with(prefix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let list = Allowlist::with_defaults();
        assert!(list.contains("/grpc.health.v1.Health/Check"));
        assert!(list.contains("/authentication.AuthenticationService/Authenticate"));
        assert!(!list.contains("/dns.DnsService/CreateZone"));
    }

    #[test]
    fn test_exact_match_only() {
        let list = Allowlist::default();
        list.allow_methods(["/file.FileService/ReadFile"]);
        assert!(list.contains("/file.FileService/ReadFile"));
        assert!(!list.contains("/file.FileService/ReadFileStream"));
    }

    #[test]
    fn test_prefix_match() {
        let list = Allowlist::default();
        list.allow_prefixes(["/log.LogService/"]);
        assert!(list.contains("/log.LogService/Log"));
        assert!(list.contains("/log.LogService/GetLog"));
        assert!(!list.contains("/logx.LogService/Log"));
    }

    #[test]
    fn test_empty_entries_ignored() {
        let list = Allowlist::default();
        list.allow_methods([""]);
        list.allow_prefixes([String::new()]);
        assert!(!list.contains("/anything.Service/Method"));
        assert!(!list.contains(""));
    }
}
