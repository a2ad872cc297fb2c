//! Hand-written collaborators shared by the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gatehouse_authz::{
    AuditDecision, AuditLogger, AuditSink, AuthContext, AuthMethod, AuthorizationEngine,
    AuthzConfig, BootstrapDenial, BootstrapGate, BootstrapVerdict, Error, FieldValue, Identity,
    RbacClient, ResourceFieldExtractor, ResourceInfo, Result, SubjectType, TokenValidator,
};
use tonic::Request;
use tracing::Level;

pub const WRITE_FILE: &str = "/file.FileService/WriteFile";
pub const READ_FILE: &str = "/file.FileService/ReadFile";

/// Request carrying the target path in field 1
#[derive(Debug, Clone)]
pub struct FileRequest {
    pub path: String,
}

impl FileRequest {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
        }
    }
}

impl ResourceFieldExtractor for FileRequest {
    fn field_value(&self, index: u32, _field: Option<&str>) -> FieldValue {
        match index {
            1 => FieldValue::Scalar(self.path.clone()),
            _ => FieldValue::Missing,
        }
    }
}

/// Tokens map to fixed identities
#[derive(Default)]
pub struct FakeValidator {
    identities: HashMap<String, Identity>,
}

impl FakeValidator {
    pub fn with(mut self, token: &str, subject: &str, issuer: &str) -> Self {
        self.identities.insert(
            token.to_string(),
            Identity {
                subject: subject.to_string(),
                display_name: subject.to_string(),
                cluster_id: Some("cluster-1".to_string()),
                issuer: issuer.to_string(),
                roles: vec![],
                email: None,
                auth_method: AuthMethod::Jwt,
            },
        );
        self
    }
}

#[async_trait]
impl TokenValidator for FakeValidator {
    async fn validate_token(&self, token: &str) -> Result<Identity> {
        self.identities
            .get(token)
            .cloned()
            .ok_or_else(|| Error::invalid_token("unknown token"))
    }
}

/// Gate with a fixed cluster state; Day-0 allows loopback only
pub struct FakeGate {
    pub initialized: bool,
}

impl BootstrapGate for FakeGate {
    fn is_cluster_initialized(&self) -> bool {
        self.initialized
    }

    fn should_allow(&self, ctx: &AuthContext) -> BootstrapVerdict {
        if ctx.is_loopback {
            BootstrapVerdict::Allowed
        } else {
            BootstrapVerdict::Denied(BootstrapDenial::Remote)
        }
    }

    fn check_cluster_id(&self, ctx: &AuthContext) -> std::result::Result<(), BootstrapDenial> {
        match ctx.cluster_id.as_str() {
            "cluster-1" => Ok(()),
            "" => Err(BootstrapDenial::ClusterIdMissing),
            _ => Err(BootstrapDenial::ClusterIdMismatch),
        }
    }
}

/// RBAC service with in-memory grants and call counters
#[derive(Default)]
pub struct FakeRbac {
    pub mappings: HashMap<String, Vec<ResourceInfo>>,
    pub grants: HashSet<(SubjectType, String)>,
    pub bindings: HashMap<String, Vec<String>>,
    pub validate_calls: AtomicUsize,
    pub descriptor_calls: AtomicUsize,
    pub binding_calls: AtomicUsize,
}

impl FakeRbac {
    pub fn map(mut self, method: &str, infos: Vec<ResourceInfo>) -> Self {
        self.mappings.insert(method.to_string(), infos);
        self
    }

    pub fn grant(mut self, subject_type: SubjectType, subject: &str) -> Self {
        self.grants.insert((subject_type, subject.to_string()));
        self
    }

    pub fn bind(mut self, subject: &str, roles: &[&str]) -> Self {
        self.bindings.insert(
            subject.to_string(),
            roles.iter().map(|r| r.to_string()).collect(),
        );
        self
    }

    pub fn validate_calls(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.validate_calls()
            + self.descriptor_calls.load(Ordering::SeqCst)
            + self.binding_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RbacClient for FakeRbac {
    async fn get_action_resource_infos(&self, method: &str) -> Result<Vec<ResourceInfo>> {
        self.descriptor_calls.fetch_add(1, Ordering::SeqCst);
        self.mappings
            .get(method)
            .cloned()
            .ok_or_else(|| Error::not_found(method))
    }

    async fn validate_action(
        &self,
        _method: &str,
        subject: &str,
        subject_type: SubjectType,
        _resources: &[ResourceInfo],
    ) -> Result<bool> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.grants.contains(&(subject_type, subject.to_string())))
    }

    async fn get_role_binding(&self, subject: &str) -> Result<Vec<String>> {
        self.binding_calls.fetch_add(1, Ordering::SeqCst);
        self.bindings
            .get(subject)
            .cloned()
            .ok_or_else(|| Error::not_found(subject))
    }
}

/// Sink that keeps every record
#[derive(Default)]
pub struct CaptureSink {
    records: Mutex<Vec<(Level, AuditDecision)>>,
}

impl CaptureSink {
    pub fn records(&self) -> Vec<(Level, AuditDecision)> {
        self.records.lock().unwrap().clone()
    }
}

impl AuditSink for CaptureSink {
    fn emit(&self, level: Level, record: &AuditDecision) -> Result<()> {
        self.records.lock().unwrap().push((level, record.clone()));
        Ok(())
    }
}

pub fn build_engine(
    validator: FakeValidator,
    initialized: bool,
    rbac: Arc<FakeRbac>,
) -> Arc<AuthorizationEngine> {
    Arc::new(AuthorizationEngine::new(
        AuthzConfig::default(),
        Arc::new(validator),
        Arc::new(FakeGate { initialized }),
        rbac,
    ))
}

pub fn capture_logger() -> (AuditLogger, Arc<CaptureSink>) {
    let sink = Arc::new(CaptureSink::default());
    (AuditLogger::with_sink("test-policy", sink.clone()), sink)
}

pub fn request_with_token<T>(message: T, token: Option<&str>) -> Request<T> {
    let mut request = Request::new(message);
    if let Some(token) = token {
        request
            .metadata_mut()
            .insert("token", token.parse().unwrap());
    }
    request
        .metadata_mut()
        .insert("application", "files_app".parse().unwrap());
    request
        .metadata_mut()
        .insert("domain", "example.com".parse().unwrap());
    request
}
