//! Authorization engine
//!
//! One engine instance is built at server startup with its collaborators
//! injected, then shared by the unary and stream interceptors.
//!
//! # Evaluation order
//!
//! 1. Allowlist (no network)
//! 2. Day-0 bootstrap gate, while the cluster is not initialized
//! 3. Token validation
//! 4. Cluster-id check (initialized cluster, authenticated caller)
//! 5. Superuser (exact subject id only)
//! 6. Anonymous mutating call on an initialized cluster
//! 7. Role bindings for role-based methods
//! 8. Resource descriptor resolution and unmapped-method handling
//! 9. Decision cache
//! 10. RBAC fallback chain: account, then application, then issuing peer
//! 11. Deny
//!
//! Every collaborator call is bounded by the configured timeout. A timeout
//! or error is a denial, except a failed resource descriptor lookup, which
//! evaluates the call with no resource constraints (still gated by RBAC).

use std::future::Future;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::allowlist::Allowlist;
use crate::bootstrap::{BootstrapGate, BootstrapVerdict};
use crate::cache::{fingerprint, DecisionCache, ResourceInfoCache, SessionCache};
use crate::config::AuthzConfig;
use crate::context::{AuthContext, CallMetadata};
use crate::decision::{Decision, Reason};
use crate::error::{Error, Result};
use crate::extractor::{bind_resources, ResourceFieldExtractor};
use crate::identity::TokenValidator;
use crate::metrics::AuthzMetrics;
use crate::policy::{MethodPolicy, StaticMethodPolicy};
use crate::rbac::{
    RbacClient, ResourceInfo, SubjectType, RBAC_SERVICE_PREFIX, RESOURCE_INFOS_METHOD,
};

/// Decides whether calls may proceed
pub struct AuthorizationEngine {
    config: AuthzConfig,
    allowlist: Allowlist,
    validator: Arc<dyn TokenValidator>,
    bootstrap: Arc<dyn BootstrapGate>,
    rbac: Arc<dyn RbacClient>,
    policy: Arc<dyn MethodPolicy>,
    decisions: DecisionCache,
    resource_infos: ResourceInfoCache,
    sessions: SessionCache,
    metrics: Arc<AuthzMetrics>,
}

impl AuthorizationEngine {
    /// Create an engine with the default allowlist and static method policy
    pub fn new(
        config: AuthzConfig,
        validator: Arc<dyn TokenValidator>,
        bootstrap: Arc<dyn BootstrapGate>,
        rbac: Arc<dyn RbacClient>,
    ) -> Self {
        if config.deny_unmapped_methods {
            info!("deny-by-default enabled for methods without RBAC mapping");
        }
        Self {
            decisions: DecisionCache::new(config.decision_ttl),
            config,
            allowlist: Allowlist::with_defaults(),
            validator,
            bootstrap,
            rbac,
            policy: Arc::new(StaticMethodPolicy::default()),
            resource_infos: ResourceInfoCache::new(),
            sessions: SessionCache::new(),
            metrics: Arc::new(AuthzMetrics::new()),
        }
    }

    /// Replace the method classification policy
    pub fn with_method_policy(mut self, policy: Arc<dyn MethodPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Exempt exact methods from every check
    pub fn allow_unauthenticated<I, S>(&self, methods: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowlist.allow_methods(methods);
    }

    /// Exempt every method starting with one of `prefixes`
    pub fn allow_unauthenticated_prefix<I, S>(&self, prefixes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowlist.allow_prefixes(prefixes);
    }

    /// Engine configuration
    pub fn config(&self) -> &AuthzConfig {
        &self.config
    }

    /// Counters
    pub fn metrics(&self) -> Arc<AuthzMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Cached RBAC decisions
    pub fn decision_cache(&self) -> &DecisionCache {
        &self.decisions
    }

    /// Streams granted on their first message
    pub fn sessions(&self) -> &SessionCache {
        &self.sessions
    }

    /// Authorize one call against the bound request message
    ///
    /// Never fails: collaborator errors become denials.
    pub async fn authorize(
        &self,
        call: &CallMetadata,
        request: &dyn ResourceFieldExtractor,
    ) -> Decision {
        let started = Instant::now();
        let decision = self.evaluate(call, request).await;
        let elapsed = started.elapsed();
        self.metrics.record_decision(decision.allowed, elapsed);

        debug!(
            method = %call.method,
            subject = %decision.auth.subject,
            allowed = decision.allowed,
            reason = %decision.reason,
            elapsed_us = elapsed.as_micros(),
            "Authorization decision"
        );
        decision
    }

    async fn evaluate(
        &self,
        call: &CallMetadata,
        request: &dyn ResourceFieldExtractor,
    ) -> Decision {
        let method = call.method.as_str();
        let initialized = self.bootstrap.is_cluster_initialized();
        let anonymous = AuthContext::anonymous(call, !initialized);

        if self.allowlist.contains(method) {
            return outcome(call, anonymous, true, Reason::Allowlist);
        }

        if !initialized {
            match self.bootstrap.should_allow(&anonymous) {
                BootstrapVerdict::Inactive => {}
                BootstrapVerdict::Allowed => {
                    return outcome(call, anonymous, true, Reason::BootstrapAllowed);
                }
                BootstrapVerdict::Denied(denial) => {
                    return outcome(call, anonymous, false, denial.into());
                }
            }
        }

        let auth = match self.resolve_identity(call, initialized).await {
            Ok(auth) => auth,
            Err(e) => {
                self.metrics.record_token_failure();
                warn!(method = %method, error = %e, "token validation failed");
                return outcome(call, anonymous, false, Reason::InvalidToken);
            }
        };

        if initialized && auth.is_authenticated() {
            if let Err(denial) = self.bootstrap.check_cluster_id(&auth) {
                return outcome(call, auth, false, denial.into());
            }
        }

        // Only the exact superuser id bypasses; `sa@<cluster>` is just labelled admin
        if auth.is_authenticated() && auth.subject == self.config.superuser {
            return outcome(call, auth, true, Reason::Superuser);
        }

        let mutating = self.policy.is_mutating(method);
        if initialized && mutating && !auth.is_authenticated() {
            return outcome(call, auth, false, Reason::AuthenticationRequired);
        }

        if initialized
            && auth.is_authenticated()
            && !method.starts_with(RBAC_SERVICE_PREFIX)
            && self.policy.is_role_based(method)
        {
            let reason = if self.check_role_binding(&auth.subject, method).await {
                Reason::RoleBindingGranted
            } else {
                Reason::RoleBindingDenied
            };
            return outcome(call, auth, reason == Reason::RoleBindingGranted, reason);
        }

        let resources = match self.resource_infos_for(method).await {
            Ok(infos) if infos.is_empty() => {
                return self.unmapped(call, auth, initialized && mutating);
            }
            Ok(infos) => bind_resources(&infos, request),
            Err(e) => {
                warn!(
                    method = %method,
                    error = %e,
                    "resource descriptor lookup failed, evaluating without resource constraints"
                );
                Vec::new()
            }
        };

        let key = fingerprint(
            &call.domain,
            method,
            call.token.as_deref().unwrap_or_default(),
            &resources,
        );
        let cached = self.decisions.get(&key);
        self.metrics.record_cache_lookup(cached == Some(true));
        if cached == Some(true) {
            return outcome(call, auth, true, Reason::CacheHit).with_resources(&resources);
        }

        if let Some(grantee) = self.fallback_chain(call, &auth, &resources, &key).await {
            let mut decision =
                outcome(call, auth, true, Reason::RbacGranted).with_resources(&resources);
            decision.granted_by = Some(grantee);
            return decision;
        }

        outcome(call, auth, false, Reason::PermissionDenied).with_resources(&resources)
    }

    async fn resolve_identity(&self, call: &CallMetadata, initialized: bool) -> Result<AuthContext> {
        let Some(token) = call.token.as_deref() else {
            return Ok(AuthContext::anonymous(call, !initialized));
        };

        let identity = self
            .bounded("token validation", self.validator.validate_token(token))
            .await?;
        Ok(AuthContext::authenticated(
            call,
            !initialized,
            identity,
            &self.config.superuser,
        ))
    }

    /// Whether one of the subject's bound roles grants `method`
    ///
    /// Lookup failures and missing bindings deny.
    async fn check_role_binding(&self, subject: &str, method: &str) -> bool {
        let result = self
            .bounded("role binding lookup", self.rbac.get_role_binding(subject))
            .await;
        self.metrics.record_rbac_call(result.is_err());

        match result {
            Ok(roles) => {
                let granted = self.policy.has_role_permission(&roles, method);
                debug!(subject = %subject, method = %method, ?roles, granted, "role binding check");
                granted
            }
            Err(e) if e.is_not_found() => {
                debug!(subject = %subject, method = %method, "no role binding");
                false
            }
            Err(e) => {
                warn!(subject = %subject, method = %method, error = %e, "role binding lookup failed");
                false
            }
        }
    }

    /// Resource descriptors of `method`, memoized
    ///
    /// "Not found" is memoized as an empty mapping; other failures are
    /// returned and retried on the next call.
    async fn resource_infos_for(&self, method: &str) -> Result<Arc<[ResourceInfo]>> {
        if method == RESOURCE_INFOS_METHOD {
            return Ok(Arc::from(Vec::new()));
        }
        if let Some(infos) = self.resource_infos.get(method) {
            return Ok(infos);
        }

        let result = self
            .bounded(
                "resource descriptor lookup",
                self.rbac.get_action_resource_infos(method),
            )
            .await;
        self.metrics
            .record_rbac_call(result.as_ref().is_err_and(|e| !e.is_not_found()));

        match result {
            Ok(infos) => {
                debug!(method = %method, count = infos.len(), "resolved resource descriptors");
                Ok(self.resource_infos.insert(method, infos))
            }
            Err(e) if e.is_not_found() => Ok(self.resource_infos.insert(method, Vec::new())),
            Err(e) => Err(e),
        }
    }

    fn unmapped(&self, call: &CallMetadata, auth: AuthContext, secured_mutation: bool) -> Decision {
        if secured_mutation {
            return outcome(call, auth, false, Reason::NoRbacMappingPostDay0);
        }
        if self.config.deny_unmapped_methods {
            return outcome(call, auth, false, Reason::NoRbacMappingDenied);
        }
        warn!(method = %call.method, "method has no RBAC mapping, allowing");
        outcome(call, auth, true, Reason::NoRbacMappingWarning)
    }

    /// Ask RBAC for each candidate subject in turn; the first grant wins
    ///
    /// Every answer is written to the decision cache under `key`. Errors
    /// count as "not granted" for that subject.
    async fn fallback_chain(
        &self,
        call: &CallMetadata,
        auth: &AuthContext,
        resources: &[ResourceInfo],
        key: &str,
    ) -> Option<(SubjectType, String)> {
        for (subject_type, subject) in self.candidates(call, auth) {
            let result = self
                .bounded(
                    "action validation",
                    self.rbac
                        .validate_action(&call.method, &subject, subject_type, resources),
                )
                .await;
            self.metrics.record_rbac_call(result.is_err());

            match result {
                Ok(granted) => {
                    self.decisions.put(key, granted);
                    if granted {
                        debug!(
                            method = %call.method,
                            subject = %subject,
                            subject_type = %subject_type,
                            "RBAC grant"
                        );
                        return Some((subject_type, subject));
                    }
                }
                Err(e) => {
                    warn!(
                        method = %call.method,
                        subject = %subject,
                        subject_type = %subject_type,
                        error = %e,
                        "action validation failed"
                    );
                }
            }
        }
        None
    }

    fn candidates(&self, call: &CallMetadata, auth: &AuthContext) -> Vec<(SubjectType, String)> {
        let mut subjects = Vec::with_capacity(3);
        if auth.is_authenticated() {
            subjects.push((SubjectType::Account, auth.subject.clone()));
        }
        if !call.application.is_empty() {
            subjects.push((SubjectType::Application, call.application.clone()));
        }
        let own_node = self.config.local_node_id.as_deref();
        if !auth.issuer.is_empty() && own_node != Some(auth.issuer.as_str()) {
            subjects.push((SubjectType::NodeIdentity, auth.issuer.clone()));
        }
        subjects
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let limit = self.config.collaborator_timeout;
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(operation, limit)),
        }
    }
}

fn outcome(call: &CallMetadata, auth: AuthContext, allowed: bool, reason: Reason) -> Decision {
    Decision {
        allowed,
        reason,
        auth,
        domain: call.domain.clone(),
        application: call.application.clone(),
        resource_path: String::new(),
        permission: String::new(),
        granted_by: None,
    }
}

impl Decision {
    fn with_resources(mut self, resources: &[ResourceInfo]) -> Self {
        self.resource_path = join(resources.iter().map(|r| r.path.as_str()));
        self.permission = join(resources.iter().map(|r| r.permission.as_str()));
        self
    }
}

fn join<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts.collect::<Vec<_>>().join(",")
}
