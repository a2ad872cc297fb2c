//! Client-streaming and bidirectional call gate
//!
//! Authorization is deferred to the first inbound message, since resource
//! identifiers live in message payloads. The outcome is recorded per stream
//! under a random session id; later messages only consult the session cache.
//! The session is forgotten when the wrapper is dropped, whatever ended the
//! stream.
//!
//! Server-streaming calls carry a single request message and go through
//! [`UnaryInterceptor`](crate::UnaryInterceptor) instead.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::time::Instant;
use tonic::{Request, Status};
use tracing::debug;
use uuid::Uuid;

use crate::audit::AuditLogger;
use crate::context::{AuthContext, CallMetadata};
use crate::engine::AuthorizationEngine;
use crate::extractor::ResourceFieldExtractor;

/// Wraps inbound streams so that they authorize on first receive
#[derive(Clone)]
pub struct StreamInterceptor {
    engine: Arc<AuthorizationEngine>,
    audit: AuditLogger,
}

impl StreamInterceptor {
    /// Create a gate over a shared engine
    pub fn new(engine: Arc<AuthorizationEngine>, audit: AuditLogger) -> Self {
        Self { engine, audit }
    }

    /// Wrap the inbound stream of `request`
    pub fn intercept<S>(&self, method: &str, request: Request<S>) -> AuthorizedStream<S> {
        let call = CallMetadata::from_request(method, &request);
        let session = Uuid::new_v4();
        debug!(method = %method, session = %session, "stream opened");

        AuthorizedStream {
            inner: request.into_inner(),
            engine: Arc::clone(&self.engine),
            audit: self.audit.clone(),
            call,
            session,
            started: Instant::now(),
            state: SessionState::Pending,
        }
    }
}

enum SessionState {
    Pending,
    Granted(AuthContext),
    Denied(Status),
}

/// Inbound stream that only yields messages once the call is authorized
pub struct AuthorizedStream<S> {
    inner: S,
    engine: Arc<AuthorizationEngine>,
    audit: AuditLogger,
    call: CallMetadata,
    session: Uuid,
    started: Instant,
    state: SessionState,
}

impl<S, M> AuthorizedStream<S>
where
    S: Stream<Item = Result<M, Status>> + Unpin,
    M: ResourceFieldExtractor,
{
    /// Next inbound message, `Ok(None)` at end of stream
    ///
    /// The first message is authorized (and audited) before it is returned.
    /// After a denial every call returns the same error.
    pub async fn message(&mut self) -> Result<Option<M>, Status> {
        if let SessionState::Denied(status) = &self.state {
            return Err(status.clone());
        }

        let message = match self.inner.next().await {
            Some(item) => item?,
            None => return Ok(None),
        };

        if matches!(self.state, SessionState::Pending) {
            self.authorize_first(&message).await?;
        } else if !self.engine.sessions().is_granted(&self.session) {
            let status = Status::permission_denied(format!(
                "stream session is no longer authorized: method={}",
                self.call.method
            ));
            self.state = SessionState::Denied(status.clone());
            return Err(status);
        }
        Ok(Some(message))
    }

    async fn authorize_first(&mut self, message: &M) -> Result<(), Status> {
        let decision = self.engine.authorize(&self.call, message).await;
        self.audit.log(&decision, self.started);

        if let Some(status) = decision.to_status() {
            self.state = SessionState::Denied(status.clone());
            return Err(status);
        }
        self.engine.sessions().grant(self.session);
        self.state = SessionState::Granted(decision.auth);
        Ok(())
    }
}

impl<S> AuthorizedStream<S> {
    /// Random id of this stream's session
    pub fn session_id(&self) -> Uuid {
        self.session
    }

    /// Caller identity, once the first message was authorized
    pub fn auth_context(&self) -> Option<&AuthContext> {
        match &self.state {
            SessionState::Granted(auth) => Some(auth),
            _ => None,
        }
    }

    /// Metadata of the call this stream belongs to
    pub fn call(&self) -> &CallMetadata {
        &self.call
    }
}

impl<S> Drop for AuthorizedStream<S> {
    fn drop(&mut self) {
        self.engine.sessions().revoke(&self.session);
        debug!(method = %self.call.method, session = %self.session, "stream closed");
    }
}
