//! Authorization audit trail
//!
//! Every decision produces exactly one [`AuditDecision`]. Denials are
//! emitted at WARN and allows at INFO; the level is chosen here so a sink
//! cannot sample denials away. Records never contain tokens.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{error, info, warn, Level};

use crate::context::{AuthMethod, PrincipalType};
use crate::decision::Decision;
use crate::error::{Error, Result};
use crate::rbac::SubjectType;

/// Tracing target carrying audit records
pub const AUDIT_TARGET: &str = "gatehouse::audit";

/// Where a call came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallSource {
    /// Loopback
    Local,
    /// Another cluster member
    Peer,
    /// Anything else
    Remote,
}

/// One audit record; field names are a stable external contract
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditDecision {
    /// When the decision was made
    pub timestamp: DateTime<Utc>,
    /// Policy version in effect
    pub policy_version: String,
    /// Caller subject, `anonymous` when none
    pub subject: String,
    /// Principal kind
    pub principal_type: PrincipalType,
    /// How the caller authenticated
    pub auth_method: AuthMethod,
    /// Whether the call came from loopback
    pub is_loopback: bool,
    /// Peer address with any embedded credentials removed
    pub remote_addr: String,
    /// Full gRPC method
    pub grpc_method: String,
    /// Resource paths checked, if any
    pub resource_path: String,
    /// Permissions required, if any
    pub permission: String,
    /// Outcome
    pub allowed: bool,
    /// Reason code
    pub reason: String,
    /// Time from call start to decision
    pub decision_latency_ms: u64,
    /// Caller cluster id
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cluster_id: String,
    /// Whether the cluster was in Day-0 bootstrap
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub bootstrap: bool,
    /// Host part of `remote_addr` (deprecated, kept for older consumers)
    #[serde(skip_serializing_if = "String::is_empty")]
    pub caller_ip: String,
    /// Local, peer or remote
    pub call_source: CallSource,
    /// Subject of the fallback chain that held the grant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted_by: Option<String>,
    /// Kind of that subject
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted_by_type: Option<SubjectType>,
}

/// Destination for rendered audit records
pub trait AuditSink: Send + Sync {
    /// Emit one record at `level`
    fn emit(&self, level: Level, record: &AuditDecision) -> Result<()>;
}

/// Writes records as single-line JSON through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, level: Level, record: &AuditDecision) -> Result<()> {
        let audit = serde_json::to_string(record).map_err(|e| Error::audit(e.to_string()))?;
        if level == Level::WARN {
            warn!(
                target: AUDIT_TARGET,
                audit = %audit,
                subject = %record.subject,
                method = %record.grpc_method,
                allowed = record.allowed,
                reason = %record.reason,
                latency_ms = record.decision_latency_ms,
                policy_version = %record.policy_version,
                "authz_decision"
            );
        } else {
            info!(
                target: AUDIT_TARGET,
                audit = %audit,
                subject = %record.subject,
                method = %record.grpc_method,
                allowed = record.allowed,
                reason = %record.reason,
                latency_ms = record.decision_latency_ms,
                policy_version = %record.policy_version,
                "authz_decision"
            );
        }
        Ok(())
    }
}

/// Builds and emits audit records
#[derive(Clone)]
pub struct AuditLogger {
    policy_version: String,
    sink: Arc<dyn AuditSink>,
}

impl AuditLogger {
    /// Logger writing through [`TracingAuditSink`]
    pub fn new(policy_version: impl Into<String>) -> Self {
        Self::with_sink(policy_version, Arc::new(TracingAuditSink))
    }

    /// Logger writing to a custom sink
    pub fn with_sink(policy_version: impl Into<String>, sink: Arc<dyn AuditSink>) -> Self {
        Self {
            policy_version: policy_version.into(),
            sink,
        }
    }

    /// Record `decision`; never fails and never blocks on the caller
    pub fn log(&self, decision: &Decision, started: Instant) {
        let record = self.build_record(decision, started);
        let level = if record.allowed {
            Level::INFO
        } else {
            Level::WARN
        };
        if let Err(e) = self.sink.emit(level, &record) {
            error!(
                error = %e,
                subject = %record.subject,
                method = %record.grpc_method,
                "failed to write audit record"
            );
        }
    }

    /// Render `decision` as an audit record
    pub fn build_record(&self, decision: &Decision, started: Instant) -> AuditDecision {
        let auth = &decision.auth;
        let remote_addr = auth
            .remote_addr
            .map(|addr| scrub_remote_addr(&addr.to_string()))
            .unwrap_or_else(|| "unknown".to_string());
        let caller_ip = auth.remote_addr.map(host_of).unwrap_or_default();

        let call_source = if auth.is_loopback {
            CallSource::Local
        } else if !auth.cluster_id.is_empty() {
            CallSource::Peer
        } else {
            CallSource::Remote
        };

        let (granted_by_type, granted_by) = match &decision.granted_by {
            Some((kind, subject)) => (Some(*kind), Some(subject.clone())),
            None => (None, None),
        };
        let principal_type = match granted_by_type {
            Some(SubjectType::NodeIdentity) => PrincipalType::Peer,
            _ => auth.principal_type,
        };
        let subject = if auth.subject.is_empty() {
            "anonymous".to_string()
        } else {
            auth.subject.clone()
        };

        AuditDecision {
            timestamp: Utc::now(),
            policy_version: self.policy_version.clone(),
            subject,
            principal_type,
            auth_method: auth.auth_method,
            is_loopback: auth.is_loopback,
            remote_addr,
            grpc_method: auth.grpc_method.clone(),
            resource_path: decision.resource_path.clone(),
            permission: decision.permission.clone(),
            allowed: decision.allowed,
            reason: decision.reason.code().to_string(),
            decision_latency_ms: started.elapsed().as_millis() as u64,
            cluster_id: auth.cluster_id.clone(),
            bootstrap: auth.is_bootstrap,
            caller_ip,
            call_source,
            granted_by,
            granted_by_type,
        }
    }
}

/// Drop a `user:pass@` prefix if an address ever carries one
fn scrub_remote_addr(addr: &str) -> String {
    match addr.rsplit_once('@') {
        Some((_, host)) => host.to_string(),
        None => addr.to_string(),
    }
}

fn host_of(addr: SocketAddr) -> String {
    addr.ip().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::context::{AuthContext, CallMetadata};
    use crate::decision::Reason;

    #[derive(Default)]
    struct Capture {
        records: Mutex<Vec<(Level, AuditDecision)>>,
    }

    impl AuditSink for Capture {
        fn emit(&self, level: Level, record: &AuditDecision) -> Result<()> {
            self.records.lock().unwrap().push((level, record.clone()));
            Ok(())
        }
    }

    struct Broken;

    impl AuditSink for Broken {
        fn emit(&self, _level: Level, _record: &AuditDecision) -> Result<()> {
            Err(Error::audit("sink closed"))
        }
    }

    fn decision(allowed: bool, reason: Reason, remote: &str) -> Decision {
        let call = CallMetadata {
            method: "/file.FileService/WriteFile".to_string(),
            token: Some("secret-token".to_string()),
            application: "files".to_string(),
            domain: "example.com".to_string(),
            remote_addr: Some(remote.parse().unwrap()),
        };
        Decision {
            allowed,
            reason,
            auth: AuthContext::anonymous(&call, false),
            domain: call.domain.clone(),
            application: call.application.clone(),
            resource_path: "/docs/a.txt".to_string(),
            permission: "write".to_string(),
            granted_by: None,
        }
    }

    #[test]
    fn test_levels_follow_outcome() {
        let sink = Arc::new(Capture::default());
        let logger = AuditLogger::with_sink("v1", sink.clone());

        logger.log(&decision(false, Reason::PermissionDenied, "10.0.0.1:1"), Instant::now());
        logger.log(&decision(true, Reason::Allowlist, "10.0.0.1:1"), Instant::now());

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, Level::WARN);
        assert_eq!(records[1].0, Level::INFO);
    }

    #[test]
    fn test_record_fields() {
        let logger = AuditLogger::new("abc123");
        let record =
            logger.build_record(&decision(false, Reason::PermissionDenied, "10.0.0.7:5000"), Instant::now());

        assert_eq!(record.policy_version, "abc123");
        assert_eq!(record.subject, "anonymous");
        assert_eq!(record.principal_type, PrincipalType::Anonymous);
        assert_eq!(record.auth_method, AuthMethod::None);
        assert_eq!(record.remote_addr, "10.0.0.7:5000");
        assert_eq!(record.caller_ip, "10.0.0.7");
        assert_eq!(record.call_source, CallSource::Remote);
        assert_eq!(record.reason, "permission_denied");
        assert_eq!(record.resource_path, "/docs/a.txt");
        assert_eq!(record.permission, "write");
    }

    #[test]
    fn test_loopback_is_local() {
        let logger = AuditLogger::new("v1");
        let record =
            logger.build_record(&decision(true, Reason::Allowlist, "127.0.0.1:9"), Instant::now());
        assert_eq!(record.call_source, CallSource::Local);
        assert!(record.is_loopback);
    }

    #[test]
    fn test_peer_grant_attribution() {
        let logger = AuditLogger::new("v1");
        let mut d = decision(true, Reason::RbacGranted, "10.0.0.7:5000");
        d.auth.cluster_id = "cluster-1".to_string();
        d.granted_by = Some((SubjectType::NodeIdentity, "node-b".to_string()));

        let record = logger.build_record(&d, Instant::now());
        assert_eq!(record.call_source, CallSource::Peer);
        assert_eq!(record.principal_type, PrincipalType::Peer);
        assert_eq!(record.granted_by.as_deref(), Some("node-b"));
        assert_eq!(record.granted_by_type, Some(SubjectType::NodeIdentity));
    }

    #[test]
    fn test_json_never_contains_token() {
        let logger = AuditLogger::new("v1");
        let record =
            logger.build_record(&decision(false, Reason::PermissionDenied, "10.0.0.7:1"), Instant::now());
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("secret-token"));
        assert!(json.contains("\"reason\":\"permission_denied\""));
        assert!(json.contains("\"principal_type\":\"anonymous\""));
        assert!(!json.contains("granted_by"));
    }

    #[test]
    fn test_sink_failure_is_swallowed() {
        let logger = AuditLogger::with_sink("v1", Arc::new(Broken));
        logger.log(&decision(false, Reason::PermissionDenied, "10.0.0.7:1"), Instant::now());
    }

    #[test]
    fn test_scrub_remote_addr() {
        assert_eq!(scrub_remote_addr("user:pw@10.0.0.1:80"), "10.0.0.1:80");
        assert_eq!(scrub_remote_addr("10.0.0.1:80"), "10.0.0.1:80");
    }
}
