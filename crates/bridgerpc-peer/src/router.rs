//! Path-based dispatch of inbound requests.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bridgerpc_protocol::{Headers, Id, ResponseStatusCode};
use bytes::Bytes;
use tracing::debug;

use crate::error::Result;
use crate::request::IncomingRequest;
use crate::response::ResponseWriter;

/// Future returned by [`Service::run`].
pub type ServiceFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Everything a service needs to handle one request.
#[derive(Debug)]
pub struct RequestContext {
    pub request: IncomingRequest,
    pub response: ResponseWriter,
}

impl RequestContext {
    pub fn new(request: IncomingRequest, response: ResponseWriter) -> Self {
        Self { request, response }
    }
}

/// Handles requests for one path.
///
/// A service owns the exchange: it reads the request body and writes the
/// response through the context. If it returns `Ok` without finishing the
/// response, the engine completes it with `SUCCESS`; if it returns `Err`, the
/// engine answers with `HANDLER_FAILED`.
pub trait Service: Send + Sync + 'static {
    fn run(&self, ctx: RequestContext) -> ServiceFuture;
}

struct FnService<F>(F);

impl<F, Fut> Service for FnService<F>
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn run(&self, ctx: RequestContext) -> ServiceFuture {
        Box::pin((self.0)(ctx))
    }
}

/// A fully buffered request, as seen by a unary handler.
#[derive(Debug, Clone, PartialEq)]
pub struct UnaryRequest {
    pub id: Id,
    pub path: String,
    pub headers: Option<Headers>,
    pub body: Bytes,
    pub trailers: Option<Headers>,
}

struct UnaryService<F>(Arc<F>);

impl<F, Fut> Service for UnaryService<F>
where
    F: Fn(UnaryRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Bytes>> + Send + 'static,
{
    fn run(&self, ctx: RequestContext) -> ServiceFuture {
        let handler = Arc::clone(&self.0);
        Box::pin(async move {
            let RequestContext {
                mut request,
                response,
            } = ctx;
            let body = request.read_to_end().await?;
            let unary = UnaryRequest {
                id: request.id(),
                path: request.path().to_string(),
                headers: request.headers().cloned(),
                body,
                trailers: request.trailers().await?,
            };
            let reply = handler(unary).await?;
            response.send(ResponseStatusCode::Success, reply).await
        })
    }
}

/// Maps exact request paths to services.
#[derive(Default)]
pub struct Router {
    services: HashMap<String, Arc<dyn Service>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service. A later registration for the same path replaces
    /// the earlier one.
    pub fn add_service(&mut self, path: impl Into<String>, service: impl Service) -> &mut Self {
        let path = path.into();
        if self.services.insert(path.clone(), Arc::new(service)).is_some() {
            debug!(%path, "replaced service");
        }
        self
    }

    /// Register an async function as a streaming service.
    pub fn add_handler<F, Fut>(&mut self, path: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.add_service(path, FnService(handler))
    }

    /// Register a unary handler: the whole request body in, the whole
    /// `SUCCESS` response body out.
    pub fn add_unary<F, Fut>(&mut self, path: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(UnaryRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Bytes>> + Send + 'static,
    {
        self.add_service(path, UnaryService(Arc::new(handler)))
    }

    pub fn has_service(&self, path: &str) -> bool {
        self.services.contains_key(path)
    }

    /// Registered paths, sorted.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<_> = self.services.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    /// Dispatch one request.
    ///
    /// Unknown paths are answered with `NO_HANDLER_FOR_PATH` and an empty
    /// body.
    pub async fn run(&self, ctx: RequestContext) -> Result<()> {
        match self.services.get(ctx.request.path()) {
            Some(service) => service.run(ctx).await,
            None => {
                debug!(path = ctx.request.path(), "no service for path");
                ctx.response
                    .start(ResponseStatusCode::NoHandlerForPath, None)
                    .await?;
                ctx.response.end(None).await
            }
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("paths", &self.paths())
            .finish()
    }
}
