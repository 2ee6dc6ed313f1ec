//! Registry of live exchanges.
//!
//! Request sessions track requests this side is serving; response sessions
//! track responses this side is waiting for. An id lives in at most one of the
//! two registries at a time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use bridgerpc_protocol::{Id, RequestStateMachine, ResponseStateMachine};
use tracing::debug;

use crate::error::SessionError;

/// Per-session state that needs cleanup when the session closes.
pub trait SessionContext: Send + 'static {
    /// Called once, under the session lock, after the session left the
    /// registry.
    fn on_close(&mut self) {}
}

impl SessionContext for () {}

/// One exchange: its frame-order validator plus caller-defined context.
#[derive(Debug)]
pub struct Session<M, C> {
    id: Id,
    pub machine: M,
    pub context: C,
}

impl<M, C> Session<M, C> {
    pub fn id(&self) -> Id {
        self.id
    }
}

/// Shared handle to a registered session.
///
/// All work on a session goes through [`run_exclusive`](Self::run_exclusive),
/// so frames for one exchange are applied one at a time.
#[derive(Debug)]
pub struct SessionRef<M, C> {
    id: Id,
    inner: Arc<tokio::sync::Mutex<Session<M, C>>>,
}

impl<M, C> SessionRef<M, C> {
    fn new(id: Id, machine: M, context: C) -> Self {
        Self {
            id,
            inner: Arc::new(tokio::sync::Mutex::new(Session {
                id,
                machine,
                context,
            })),
        }
    }

    pub fn id(&self) -> Id {
        self.id
    }

    /// Run `f` with exclusive access to the session.
    pub async fn run_exclusive<T>(&self, f: impl FnOnce(&mut Session<M, C>) -> T) -> T {
        let mut session = self.inner.lock().await;
        f(&mut session)
    }
}

impl<M, C> Clone for SessionRef<M, C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Arc::clone(&self.inner),
        }
    }
}

pub type RequestSession<Q> = SessionRef<RequestStateMachine, Q>;
pub type ResponseSession<R> = SessionRef<ResponseStateMachine, R>;

struct Registry<Q, R> {
    requests: HashMap<Id, RequestSession<Q>>,
    responses: HashMap<Id, ResponseSession<R>>,
}

impl<Q, R> Registry<Q, R> {
    fn contains(&self, id: Id) -> bool {
        self.requests.contains_key(&id) || self.responses.contains_key(&id)
    }
}

/// Request and response session registries of one engine.
pub struct SessionManager<Q, R> {
    registry: Mutex<Registry<Q, R>>,
}

impl<Q: SessionContext, R: SessionContext> SessionManager<Q, R> {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry {
                requests: HashMap::new(),
                responses: HashMap::new(),
            }),
        }
    }

    /// Register a request session with a fresh state machine.
    pub fn start_request_session(
        &self,
        id: Id,
        context: Q,
    ) -> Result<RequestSession<Q>, SessionError> {
        let mut registry = self.lock();
        if registry.contains(id) {
            return Err(SessionError::SessionIdInUse(id));
        }
        let session = SessionRef::new(id, RequestStateMachine::new(), context);
        registry.requests.insert(id, session.clone());
        debug!(%id, "request session started");
        Ok(session)
    }

    /// Register a response session with a fresh state machine.
    pub fn start_response_session(
        &self,
        id: Id,
        context: R,
    ) -> Result<ResponseSession<R>, SessionError> {
        let mut registry = self.lock();
        if registry.contains(id) {
            return Err(SessionError::SessionIdInUse(id));
        }
        let session = SessionRef::new(id, ResponseStateMachine::new(), context);
        registry.responses.insert(id, session.clone());
        debug!(%id, "response session started");
        Ok(session)
    }

    pub fn get_request_session(&self, id: Id) -> Option<RequestSession<Q>> {
        self.lock().requests.get(&id).cloned()
    }

    pub fn get_response_session(&self, id: Id) -> Option<ResponseSession<R>> {
        self.lock().responses.get(&id).cloned()
    }

    /// Remove a request session and run its close hook.
    ///
    /// Returns false if no such session was registered.
    pub async fn close_request_session(&self, id: Id) -> bool {
        let Some(session) = self.lock().requests.remove(&id) else {
            return false;
        };
        session.run_exclusive(|s| s.context.on_close()).await;
        debug!(%id, "request session closed");
        true
    }

    /// Remove a response session and run its close hook.
    pub async fn close_response_session(&self, id: Id) -> bool {
        let Some(session) = self.lock().responses.remove(&id) else {
            return false;
        };
        session.run_exclusive(|s| s.context.on_close()).await;
        debug!(%id, "response session closed");
        true
    }

    /// Forget every session without running close hooks.
    ///
    /// Anyone still waiting on a forgotten session is left waiting.
    pub fn clear(&self) -> usize {
        let mut registry = self.lock();
        let count = registry.requests.len() + registry.responses.len();
        registry.requests.clear();
        registry.responses.clear();
        count
    }

    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    pub fn response_count(&self) -> usize {
        self.lock().responses.len()
    }

    fn lock(&self) -> MutexGuard<'_, Registry<Q, R>> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<Q: SessionContext, R: SessionContext> Default for SessionManager<Q, R> {
    fn default() -> Self {
        Self::new()
    }
}
