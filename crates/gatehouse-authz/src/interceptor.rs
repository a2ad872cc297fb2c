//! Unary call gate
//!
//! tonic's `Interceptor` only sees metadata, and resource paths usually live
//! in the decoded message. The gate therefore wraps the handler itself:
//!
//! ```rust,ignore
//! async fn create_zone(&self, request: Request<CreateZoneRequest>)
//!     -> Result<Response<CreateZoneResponse>, Status>
//! {
//!     self.gate
//!         .intercept("/dns.DnsService/CreateZone", request, |req| self.do_create_zone(req))
//!         .await
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use tokio::time::Instant;
use tonic::{Request, Response, Status};
use tracing::error;

use crate::audit::AuditLogger;
use crate::context::CallMetadata;
use crate::engine::AuthorizationEngine;
use crate::extractor::ResourceFieldExtractor;

/// Authorizes unary calls before they reach the handler
#[derive(Clone)]
pub struct UnaryInterceptor {
    engine: Arc<AuthorizationEngine>,
    audit: AuditLogger,
}

impl UnaryInterceptor {
    /// Create a gate over a shared engine
    pub fn new(engine: Arc<AuthorizationEngine>, audit: AuditLogger) -> Self {
        Self { engine, audit }
    }

    /// Shared engine
    pub fn engine(&self) -> &Arc<AuthorizationEngine> {
        &self.engine
    }

    /// Authorize `request` for `method`, then run `handler`
    ///
    /// On success the caller's [`AuthContext`](crate::AuthContext) is in the
    /// request extensions. Handler errors are logged and returned unchanged.
    pub async fn intercept<Req, Resp, F, Fut>(
        &self,
        method: &str,
        mut request: Request<Req>,
        handler: F,
    ) -> Result<Response<Resp>, Status>
    where
        Req: ResourceFieldExtractor,
        F: FnOnce(Request<Req>) -> Fut,
        Fut: Future<Output = Result<Response<Resp>, Status>>,
    {
        let started = Instant::now();
        let call = CallMetadata::from_request(method, &request);

        let decision = self.engine.authorize(&call, request.get_ref()).await;
        self.audit.log(&decision, started);
        if let Some(status) = decision.to_status() {
            return Err(status);
        }

        let subject = decision.auth.subject.clone();
        request.extensions_mut().insert(decision.auth);

        let result = handler(request).await;
        if let Err(status) = &result {
            error!(
                method = %call.method,
                subject = %subject,
                domain = %call.domain,
                application = %call.application,
                code = ?status.code(),
                message = %status.message(),
                "handler failed"
            );
        }
        result
    }
}
