//! Authorization gate for gRPC services
//!
//! Every inbound call passes through an [`AuthorizationEngine`] before it
//! reaches business logic. The engine combines three regimes:
//!
//! - an unauthenticated allowlist (health checks, reflection, login)
//! - a time-boxed Day-0 bootstrap mode, decided by a [`BootstrapGate`]
//! - steady-state RBAC: role bindings for role-based methods, otherwise
//!   per-resource checks against the RBAC service with an account,
//!   application, peer fallback chain
//!
//! Each decision is written to the audit trail by an [`AuditLogger`]
//! (denials at WARN, allows at INFO).
//!
//! # Wiring
//!
//! ```rust,ignore
//! let engine = Arc::new(AuthorizationEngine::new(
//!     AuthzConfig::from_env(),
//!     Arc::new(my_validator),
//!     Arc::new(my_bootstrap_gate),
//!     Arc::new(my_rbac_client),
//! ));
//! let audit = AuditLogger::new(engine.config().policy_version.clone());
//! let unary = UnaryInterceptor::new(engine.clone(), audit.clone());
//! let streams = StreamInterceptor::new(engine, audit);
//! ```

#![deny(missing_docs)]

pub mod allowlist;
pub mod audit;
pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod context;
pub mod decision;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod identity;
pub mod interceptor;
pub mod metrics;
pub mod policy;
pub mod rbac;
pub mod stream;

pub use allowlist::Allowlist;
pub use audit::{AuditDecision, AuditLogger, AuditSink, CallSource, TracingAuditSink, AUDIT_TARGET};
pub use bootstrap::{BootstrapDenial, BootstrapGate, BootstrapVerdict, InitializedCluster};
pub use cache::{fingerprint, DecisionCache, ResourceInfoCache, SessionCache, MAX_DECISION_TTL};
pub use config::AuthzConfig;
pub use context::{AuthContext, AuthMethod, CallMetadata, PrincipalType};
pub use decision::{Decision, Reason};
pub use engine::AuthorizationEngine;
pub use error::{Error, Result};
pub use extractor::{bind_resources, FieldValue, ResourceFieldExtractor};
pub use identity::{Identity, TokenValidator};
pub use interceptor::UnaryInterceptor;
pub use metrics::{AuthzMetrics, MetricsSnapshot};
pub use policy::{MethodPolicy, StaticMethodPolicy};
pub use rbac::{RbacClient, ResourceInfo, SubjectType};
pub use stream::{AuthorizedStream, StreamInterceptor};
