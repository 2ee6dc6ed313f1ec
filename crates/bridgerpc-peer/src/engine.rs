//! The connection engine.
//!
//! One inbound task turns transport chunks into frames and applies them one
//! at a time: request frames drive the sessions of requests this side is
//! serving, response frames drive the sessions of requests this side sent,
//! and control frames drive liveness and shutdown. Services run in their own
//! tasks so a slow service never stalls the connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use bridgerpc_frame::{FrameError, ReadFramer};
use bridgerpc_protocol::{
    wire, CodecError, ErrorFrame, Frame, Headers, Id, ProtocolState, RequestErrorCode,
    RequestFrame, RequestStart, ResponseErrorCode, ResponseFrame, StateError,
};
use bridgerpc_sync::{queue, QueueReceiver, QueueSender};
use bridgerpc_transport::Transport;
use bytes::Bytes;
use tracing::{debug, info, trace, warn};

use crate::config::RpcConfig;
use crate::control::ProbeSet;
use crate::error::{PeerError, Result};
use crate::link::Link;
use crate::request::{request_channel, OutgoingRequest, RequestSink};
use crate::response::{
    response_channel, IncomingResponse, ResponseHead, ResponseSink, ResponseWriter, UnaryResponse,
};
use crate::router::{RequestContext, Router};
use crate::session::{SessionContext, SessionManager};

/// Session context of a request this side is serving.
#[derive(Debug)]
pub(crate) struct Serving {
    sink: RequestSink,
    writer: ResponseWriter,
}

impl SessionContext for Serving {
    fn on_close(&mut self) {
        self.sink.on_close();
    }
}

pub(crate) struct Shared {
    link: Arc<Link>,
    router: Arc<Router>,
    config: RpcConfig,
    pub(crate) sessions: SessionManager<Serving, ResponseSink>,
    probes: ProbeSet,
    running: AtomicBool,
    inbound: Mutex<Option<QueueSender<Bytes>>>,
}

/// A bridgerpc endpoint on one transport.
///
/// Both sides of a connection are symmetric: each can serve requests through
/// its [`Router`] and send requests of its own.
///
/// The engine must be created inside a Tokio runtime. Dropping it ends the
/// inbound task; it does not close the transport.
pub struct BridgeRpc {
    shared: Arc<Shared>,
}

impl BridgeRpc {
    /// Create and start an engine with the default configuration.
    pub fn new(transport: impl Transport + 'static, router: Router) -> Self {
        Self::with_config(transport, router, RpcConfig::default())
    }

    pub fn with_config(
        transport: impl Transport + 'static,
        router: Router,
        config: RpcConfig,
    ) -> Self {
        Self::from_shared(Arc::new(transport), router, config)
    }

    /// Create and start an engine on a transport shared with other owners.
    pub fn from_shared(transport: Arc<dyn Transport>, router: Router, config: RpcConfig) -> Self {
        let link = Arc::new(Link::new(transport, config.frame.clone()));
        let engine = Self {
            shared: Arc::new(Shared {
                link,
                router: Arc::new(router),
                config,
                sessions: SessionManager::new(),
                probes: ProbeSet::new(),
                running: AtomicBool::new(false),
                inbound: Mutex::new(None),
            }),
        };
        engine.start();
        engine
    }

    /// Resume processing inbound frames after [`stop`](Self::stop).
    ///
    /// The transport listener is registered only once per engine.
    pub fn start(&self) {
        {
            let mut inbound = self.shared.lock_inbound();
            if inbound.is_none() {
                let (tx, rx) = queue();
                let listener = tx.clone();
                self.shared
                    .link
                    .transport()
                    .on_receive(Arc::new(move |chunk: Bytes| {
                        let _ = listener.send(chunk);
                    }));
                let framer = ReadFramer::with_config(self.shared.config.frame.clone());
                tokio::spawn(inbound_loop(Arc::downgrade(&self.shared), rx, framer));
                *inbound = Some(tx);
            }
        }
        if !self.shared.running.swap(true, Ordering::SeqCst) {
            info!(transport = self.shared.link.transport().name(), "engine started");
        }
    }

    /// Send `CLOSE` and stop processing inbound frames.
    ///
    /// Pending requests and probes are abandoned: their callers are not
    /// notified. Frames that arrive while stopped are dropped.
    pub async fn stop(&self) -> Result<()> {
        if !self.shared.halt() {
            return Ok(());
        }
        self.shared.link.send(&Frame::Close).await
    }

    /// [`stop`](Self::stop), then close the transport.
    pub async fn shutdown(&self) -> Result<()> {
        let stopped = self.stop().await;
        self.shared.link.transport().close().await?;
        stopped
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn config(&self) -> &RpcConfig {
        &self.shared.config
    }

    /// Requests this side is currently serving.
    pub fn serving_count(&self) -> usize {
        self.shared.sessions.request_count()
    }

    /// Requests this side sent that still await their response.
    pub fn awaiting_count(&self) -> usize {
        self.shared.sessions.response_count()
    }

    /// Start a streaming request.
    ///
    /// `REQUEST_START` is sent before this returns. Body chunks go through
    /// the returned [`OutgoingRequest`]; the response arrives on the
    /// [`IncomingResponse`], which can be read while the request is still
    /// being written.
    pub async fn start_request(
        &self,
        path: &str,
        headers: Option<Headers>,
    ) -> Result<(OutgoingRequest, IncomingResponse)> {
        if !self.is_running() {
            return Err(PeerError::Stopped);
        }
        let id = self.shared.config.id_generator.next_id();
        let (sink, response) = response_channel(id);
        self.shared.sessions.start_response_session(id, sink)?;

        let opened = OutgoingRequest::open(
            id,
            path,
            headers,
            Arc::clone(&self.shared.link),
            Arc::downgrade(&self.shared),
        )
        .await;
        match opened {
            Ok(request) => {
                debug!(%id, path, "request started");
                Ok((request, response))
            }
            Err(err) => {
                self.shared.sessions.close_response_session(id).await;
                Err(err)
            }
        }
    }

    /// Send a single-chunk request and wait for the whole response.
    ///
    /// Bounded by [`RpcConfig::request_timeout`]; on expiry the remote side
    /// is told with `REQUEST_ERROR{TIMED_OUT}`.
    pub async fn request(&self, path: &str, body: impl Into<Bytes>) -> Result<UnaryResponse> {
        self.request_with_headers(path, None, body).await
    }

    pub async fn request_with_headers(
        &self,
        path: &str,
        headers: Option<Headers>,
        body: impl Into<Bytes>,
    ) -> Result<UnaryResponse> {
        let body = body.into();
        let (mut request, response) = self.start_request(path, headers).await?;
        let id = request.id();
        let exchange = async move {
            if !body.is_empty() {
                request.write(body).await?;
            }
            request.end(None).await?;
            response.collect().await
        };

        let Some(limit) = self.shared.config.request_timeout else {
            return exchange.await;
        };
        match tokio::time::timeout(limit, exchange).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%id, path, ?limit, "request timed out");
                self.shared.abandon(id, limit).await;
                Err(PeerError::Timeout(limit))
            }
        }
    }

    /// Check liveness with the configured probe timeout.
    pub async fn probe(&self) -> bool {
        self.probe_with_timeout(self.shared.config.probe_timeout)
            .await
    }

    /// Send `PING` and wait up to `timeout` for a `PONG`.
    pub async fn probe_with_timeout(&self, timeout: Duration) -> bool {
        if !self.is_running() {
            return false;
        }
        let probes = &self.shared.probes;
        let ticket = probes.register();
        if let Err(err) = self.shared.link.send(&Frame::Ping).await {
            debug!(error = %err, "probe could not be sent");
            probes.forget(ticket.key);
            return false;
        }
        match tokio::time::timeout(timeout, ticket.reply.recv()).await {
            Ok(Ok(())) => true,
            _ => {
                probes.forget(ticket.key);
                debug!(?timeout, "probe unanswered");
                false
            }
        }
    }
}

impl Drop for BridgeRpc {
    fn drop(&mut self) {
        if let Some(inbound) = self.shared.lock_inbound().take() {
            inbound.close();
        }
    }
}

impl std::fmt::Debug for BridgeRpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeRpc")
            .field("link", &self.shared.link)
            .field("running", &self.is_running())
            .field("serving", &self.serving_count())
            .field("awaiting", &self.awaiting_count())
            .finish()
    }
}

async fn inbound_loop(
    engine: Weak<Shared>,
    mut chunks: QueueReceiver<Bytes>,
    mut framer: ReadFramer,
) {
    while let Some(chunk) = chunks.recv().await {
        let Some(shared) = engine.upgrade() else {
            break;
        };
        if !shared.is_running() {
            trace!(len = chunk.len(), "engine stopped, dropping chunk");
            framer.reset();
            continue;
        }
        for framed in framer.push(&chunk) {
            if !shared.is_running() {
                break;
            }
            match framed {
                Ok(payload) => shared.handle_payload(payload).await,
                Err(err) => shared.reject_oversized(err).await,
            }
        }
    }
    debug!("inbound loop finished");
}

impl Shared {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn lock_inbound(&self) -> MutexGuard<'_, Option<QueueSender<Bytes>>> {
        self.inbound.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stop processing and forget all exchanges. Returns false if already
    /// stopped.
    fn halt(&self) -> bool {
        if !self.running.swap(false, Ordering::SeqCst) {
            return false;
        }
        let abandoned = self.sessions.clear();
        self.probes.clear();
        info!(abandoned, "engine stopped");
        true
    }

    async fn send_best_effort(&self, frame: Frame) {
        match self.link.send(&frame).await {
            Ok(()) => {}
            Err(err @ PeerError::Frame(_)) => {
                warn!(
                    frame_type = ?frame.frame_type(),
                    error = %err,
                    "frame over payload limit not sent"
                );
            }
            Err(err) => {
                debug!(frame_type = ?frame.frame_type(), error = %err, "could not send frame");
            }
        }
    }

    async fn handle_payload(&self, payload: Bytes) {
        let frame = match wire::decode_frame(&payload) {
            Ok(frame) => frame,
            Err(err) => return self.reject_undecodable(&payload, err).await,
        };
        trace!(frame_type = ?frame.frame_type(), id = ?frame.id(), "received frame");

        match frame {
            Frame::Request(frame) => self.on_request_frame(frame).await,
            Frame::Response(frame) => self.on_response_frame(frame).await,
            Frame::Ping => self.send_best_effort(Frame::Pong).await,
            Frame::Pong => {
                let resolved = self.probes.resolve_all();
                trace!(resolved, "pong received");
            }
            Frame::Close => {
                info!("remote side closed the connection");
                self.halt();
            }
        }
    }

    async fn on_request_frame(&self, frame: RequestFrame) {
        let id = frame.id();
        let Some(session) = self.sessions.get_request_session(id) else {
            match frame {
                RequestFrame::Start(start) => self.accept_request(start).await,
                other => warn!(
                    %id,
                    frame_type = ?other.frame_type(),
                    "dropping request frame for unknown exchange"
                ),
            }
            return;
        };

        let applied = session
            .run_exclusive(|s| -> std::result::Result<ProtocolState, StateError> {
                let transition = s.machine.transition(frame)?;
                match transition.event {
                    RequestFrame::Start(_) => {}
                    RequestFrame::BodyChunk(chunk) => s.context.sink.chunk(chunk.chunk),
                    RequestFrame::End(end) => s.context.sink.ended(end.trailers),
                    RequestFrame::Error(error) => {
                        debug!(
                            %id,
                            code = %error.code,
                            message = %error.message,
                            "request aborted by remote side"
                        );
                        s.context.sink.failed(error);
                    }
                }
                Ok(transition.to)
            })
            .await;

        match applied {
            Ok(state) if state.is_terminal() => {
                self.sessions.close_request_session(id).await;
            }
            Ok(_) => {}
            Err(err) => self.request_violation(id, err).await,
        }
    }

    async fn accept_request(&self, start: RequestStart) {
        let id = start.id;
        let path = start.path.clone();
        let writer = ResponseWriter::new(id, Arc::clone(&self.link));
        let (sink, request) = request_channel(start.clone());
        let serving = Serving {
            sink,
            writer: writer.clone(),
        };

        let session = match self.sessions.start_request_session(id, serving) {
            Ok(session) => session,
            Err(err) => {
                warn!(%id, %path, error = %err, "rejecting request");
                if let Err(err) = writer
                    .error(ResponseErrorCode::UnexpectedFrame, err.to_string())
                    .await
                {
                    debug!(%id, error = %err, "could not reject request");
                }
                return;
            }
        };
        let started = session
            .run_exclusive(|s| s.machine.transition(RequestFrame::Start(start)))
            .await;
        if let Err(err) = started {
            return self.request_violation(id, err).await;
        }

        debug!(%id, %path, "dispatching request");
        self.dispatch(RequestContext::new(request, writer), path);
    }

    fn dispatch(&self, ctx: RequestContext, path: String) {
        let router = Arc::clone(&self.router);
        let writer = ctx.response.clone();
        let id = writer.id();

        tokio::spawn(async move {
            let outcome = tokio::spawn(async move { router.run(ctx).await }).await;
            let failure = match outcome {
                Ok(Ok(())) => {
                    if let Err(err) = writer.finish().await {
                        debug!(%id, error = %err, "could not complete response");
                    }
                    return;
                }
                Ok(Err(err)) => err.to_string(),
                Err(err) if err.is_panic() => "service panicked".to_string(),
                Err(_) => "service cancelled".to_string(),
            };

            warn!(%id, %path, error = %failure, "service failed");
            if writer.is_finished().await {
                return;
            }
            let message = format!("service for path {path} failed: {failure}");
            if let Err(err) = writer.error(ResponseErrorCode::HandlerFailed, message).await {
                debug!(%id, error = %err, "could not report service failure");
            }
        });
    }

    /// Fail a request this side is serving after the remote side broke the
    /// frame order, and tell the remote side.
    async fn request_violation(&self, id: Id, err: StateError) {
        warn!(%id, error = %err, "protocol violation on inbound request");
        let Some(session) = self.sessions.get_request_session(id) else {
            return;
        };
        let message = err.to_string();
        let writer = session
            .run_exclusive(|s| {
                s.context.sink.failed(ErrorFrame {
                    id,
                    code: RequestErrorCode::UnexpectedFrame,
                    message: message.clone(),
                });
                s.context.writer.clone()
            })
            .await;
        self.sessions.close_request_session(id).await;
        if let Err(err) = writer.error(ResponseErrorCode::UnexpectedFrame, message).await {
            debug!(%id, error = %err, "could not report protocol violation");
        }
    }

    async fn on_response_frame(&self, frame: ResponseFrame) {
        let id = frame.id();
        let Some(session) = self.sessions.get_response_session(id) else {
            warn!(
                %id,
                frame_type = ?frame.frame_type(),
                "dropping response frame for unknown exchange"
            );
            return;
        };

        let applied = session
            .run_exclusive(|s| -> std::result::Result<ProtocolState, StateError> {
                // An error may stand in for the whole response.
                if s.machine.state() == ProtocolState::Initial {
                    if let ResponseFrame::Error(error) = frame {
                        s.context.failed(error);
                        return Ok(ProtocolState::Errored);
                    }
                }
                let transition = s.machine.transition(frame)?;
                match transition.event {
                    ResponseFrame::Start(start) => s.context.started(ResponseHead {
                        id: start.id,
                        status: start.status,
                        headers: start.headers,
                    }),
                    ResponseFrame::BodyChunk(chunk) => s.context.chunk(chunk.chunk),
                    ResponseFrame::End(end) => s.context.ended(end.trailers),
                    ResponseFrame::Error(error) => s.context.failed(error),
                }
                Ok(transition.to)
            })
            .await;

        match applied {
            Ok(state) if state.is_terminal() => {
                self.sessions.close_response_session(id).await;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(%id, error = %err, "protocol violation on inbound response");
                let message = err.to_string();
                self.fail_awaiting(id, ResponseErrorCode::UnexpectedFrame, &message)
                    .await;
                self.send_best_effort(Frame::Request(RequestFrame::Error(ErrorFrame {
                    id,
                    code: RequestErrorCode::UnexpectedFrame,
                    message,
                })))
                .await;
            }
        }
    }

    /// Fail and close a request this side is waiting on, if it exists.
    async fn fail_awaiting(&self, id: Id, code: ResponseErrorCode, message: &str) {
        if let Some(session) = self.sessions.get_response_session(id) {
            session
                .run_exclusive(|s| {
                    s.context.failed(ErrorFrame {
                        id,
                        code,
                        message: message.to_string(),
                    })
                })
                .await;
            self.sessions.close_response_session(id).await;
        }
    }

    /// Answer a payload that could not be decoded.
    ///
    /// Whatever of the frame header can be read decides which side gets the
    /// error: a broken response is reported with `REQUEST_ERROR`, anything
    /// else with `RESPONSE_ERROR`.
    async fn reject_undecodable(&self, payload: &[u8], err: CodecError) {
        let (frame_type, recovered) = wire::recover_frame_header(payload);
        let id = recovered.unwrap_or_else(|| self.config.id_generator.next_id());
        warn!(%id, ?frame_type, error = %err, "could not decode frame");
        let message = format!("could not decode frame: {err}");

        if frame_type.is_some_and(|ty| ty.is_response()) {
            self.fail_awaiting(id, ResponseErrorCode::DecodeFailed, &message)
                .await;
            self.send_best_effort(Frame::Request(RequestFrame::Error(ErrorFrame {
                id,
                code: RequestErrorCode::DecodeFailed,
                message,
            })))
            .await;
            return;
        }

        let writer = match self.sessions.get_request_session(id) {
            Some(session) => {
                let writer = session
                    .run_exclusive(|s| {
                        s.context.sink.failed(ErrorFrame {
                            id,
                            code: RequestErrorCode::DecodeFailed,
                            message: message.clone(),
                        });
                        s.context.writer.clone()
                    })
                    .await;
                self.sessions.close_request_session(id).await;
                Some(writer)
            }
            None => None,
        };
        match writer {
            Some(writer) => {
                if let Err(err) = writer.error(ResponseErrorCode::DecodeFailed, message).await {
                    debug!(%id, error = %err, "could not report decode failure");
                }
            }
            None => {
                self.send_best_effort(Frame::Response(ResponseFrame::Error(ErrorFrame {
                    id,
                    code: ResponseErrorCode::DecodeFailed,
                    message,
                })))
                .await;
            }
        }
    }

    /// Answer a frame the read framer refused for its size. Its payload is
    /// never read, so the id is always a fresh one.
    async fn reject_oversized(&self, err: FrameError) {
        let id = self.config.id_generator.next_id();
        warn!(%id, error = %err, "rejecting oversized frame");
        self.send_best_effort(Frame::Response(ResponseFrame::Error(ErrorFrame {
            id,
            code: ResponseErrorCode::DecodeFailed,
            message: format!("could not decode frame: {err}"),
        })))
        .await;
    }

    /// Give up on a request this side sent.
    async fn abandon(&self, id: Id, limit: Duration) {
        self.sessions.close_response_session(id).await;
        if !self.is_running() {
            return;
        }
        self.send_best_effort(Frame::Request(RequestFrame::Error(ErrorFrame {
            id,
            code: RequestErrorCode::TimedOut,
            message: format!("no response within {limit:?}"),
        })))
        .await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use bridgerpc_frame::WriteFramer;
    use bridgerpc_protocol::{FrameType, Value};
    use bridgerpc_transport::DuplexTransport;

    use super::*;

    /// The far end of a loopback pair, speaking raw frames.
    struct Raw {
        transport: DuplexTransport,
        received: QueueReceiver<Bytes>,
        framer: ReadFramer,
    }

    impl Raw {
        fn pair(router: Router) -> (BridgeRpc, Raw) {
            Self::pair_with_config(router, RpcConfig::default())
        }

        fn pair_with_config(router: Router, config: RpcConfig) -> (BridgeRpc, Raw) {
            let (near, far) = DuplexTransport::pair();
            let engine = BridgeRpc::with_config(near, router, config);
            let (tx, received) = queue();
            far.on_receive(Arc::new(move |chunk: Bytes| {
                let _ = tx.send(chunk);
            }));
            (
                engine,
                Raw {
                    transport: far,
                    received,
                    framer: ReadFramer::new(),
                },
            )
        }

        async fn send(&self, frame: Frame) {
            let payload = wire::encode_frame(&frame).unwrap();
            self.send_payload(&payload).await;
        }

        async fn send_payload(&self, payload: &[u8]) {
            let bytes = WriteFramer::new().frame(payload).unwrap();
            self.transport.send(bytes).await.unwrap();
        }

        async fn next(&mut self) -> Frame {
            loop {
                let chunk = tokio::time::timeout(Duration::from_secs(2), self.received.recv())
                    .await
                    .expect("no frame from engine")
                    .unwrap();
                let mut payloads = self.framer.push(&chunk);
                if !payloads.is_empty() {
                    assert_eq!(payloads.len(), 1, "one frame per send");
                    return wire::decode_frame(&payloads.remove(0).unwrap()).unwrap();
                }
            }
        }
    }

    #[tokio::test]
    async fn ping_is_answered_with_pong() {
        let (_engine, mut raw) = Raw::pair(Router::new());
        raw.send(Frame::Ping).await;
        assert_eq!(raw.next().await, Frame::Pong);
    }

    #[tokio::test]
    async fn probe_resolves_on_pong() {
        let (engine, mut raw) = Raw::pair(Router::new());
        let probe = tokio::spawn(async move {
            let alive = engine.probe_with_timeout(Duration::from_secs(2)).await;
            (engine, alive)
        });

        assert_eq!(raw.next().await, Frame::Ping);
        raw.send(Frame::Pong).await;
        let (_engine, alive) = probe.await.unwrap();
        assert!(alive);
    }

    #[tokio::test]
    async fn probe_times_out_without_pong() {
        let (engine, _raw) = Raw::pair(Router::new());
        assert!(!engine.probe_with_timeout(Duration::from_millis(50)).await);
        assert!(engine.shared.probes.is_empty());
    }

    #[tokio::test]
    async fn stop_sends_close_and_blocks_requests() {
        let (engine, mut raw) = Raw::pair(Router::new());
        engine.stop().await.unwrap();

        assert_eq!(raw.next().await, Frame::Close);
        assert!(!engine.is_running());
        assert!(matches!(
            engine.start_request("/x", None).await,
            Err(PeerError::Stopped)
        ));
        assert!(!engine.probe().await);

        // Stopping twice sends nothing.
        engine.stop().await.unwrap();
        assert!(raw.received.try_recv().is_none());
    }

    #[tokio::test]
    async fn remote_close_stops_without_echo() {
        let (engine, mut raw) = Raw::pair(Router::new());
        raw.send(Frame::Close).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!engine.is_running());
        assert!(raw.received.try_recv().is_none());

        // Frames are ignored until restarted.
        raw.send(Frame::Ping).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(raw.received.try_recv().is_none());

        engine.start();
        raw.send(Frame::Ping).await;
        assert_eq!(raw.next().await, Frame::Pong);
    }

    #[tokio::test]
    async fn garbage_is_answered_with_response_error() {
        let (_engine, mut raw) = Raw::pair(Router::new());
        raw.send_payload(&[0x92, 0x01]).await;

        match raw.next().await {
            Frame::Response(ResponseFrame::Error(error)) => {
                assert_eq!(error.code, ResponseErrorCode::DecodeFailed);
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[tokio::test]
    async fn broken_response_is_answered_with_request_error() {
        let (_engine, mut raw) = Raw::pair(Router::new());
        let mut envelope = BTreeMap::new();
        envelope.insert("data".to_string(), Value::from("junk"));
        envelope.insert(
            "type".to_string(),
            Value::from(i64::from(FrameType::ResponseStart.tag())),
        );
        let payload = wire::encode_value(&Value::Map(envelope)).unwrap();
        raw.send_payload(&payload).await;

        match raw.next().await {
            Frame::Request(RequestFrame::Error(error)) => {
                assert_eq!(error.code, RequestErrorCode::DecodeFailed);
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[tokio::test]
    async fn out_of_order_request_frame_is_rejected() {
        let mut router = Router::new();
        router.add_handler("/slow", |_ctx: RequestContext| async move {
            std::future::pending::<()>().await;
            Ok(())
        });
        let (engine, mut raw) = Raw::pair(router);
        let id = Id::from_parts(77, 1);

        raw.send(Frame::Request(RequestFrame::Start(RequestStart {
            id,
            path: "/slow".into(),
            headers: None,
        })))
        .await;
        raw.send(Frame::Request(RequestFrame::Start(RequestStart {
            id,
            path: "/slow".into(),
            headers: None,
        })))
        .await;

        match raw.next().await {
            Frame::Response(ResponseFrame::Error(error)) => {
                assert_eq!(error.id, id);
                assert_eq!(error.code, ResponseErrorCode::UnexpectedFrame);
            }
            other => panic!("unexpected frame {other:?}"),
        }
        assert_eq!(engine.serving_count(), 0);
    }

    /// Log sink for asserting on emitted events.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture_warnings() -> (Captured, tracing::subscriber::DefaultGuard) {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(captured.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();
        (captured, tracing::subscriber::set_default(subscriber))
    }

    #[tokio::test]
    async fn unmatched_response_is_dropped_with_warning() {
        let (logs, _guard) = capture_warnings();
        let (engine, mut raw) = Raw::pair(Router::new());
        raw.send(Frame::Response(ResponseFrame::End(bridgerpc_protocol::End {
            id: Id::from_parts(1, 1),
            trailers: None,
        })))
        .await;
        raw.send(Frame::Ping).await;

        assert_eq!(raw.next().await, Frame::Pong);
        assert!(engine.is_running());
        assert!(logs
            .text()
            .contains("dropping response frame for unknown exchange"));
    }

    #[tokio::test]
    async fn unmatched_request_chunk_is_dropped_with_warning() {
        let (logs, _guard) = capture_warnings();
        let (engine, mut raw) = Raw::pair(Router::new());
        raw.send(Frame::Request(RequestFrame::BodyChunk(
            bridgerpc_protocol::BodyChunk {
                id: Id::from_parts(1, 2),
                chunk: Bytes::from_static(b"stray"),
            },
        )))
        .await;
        raw.send(Frame::Ping).await;

        assert_eq!(raw.next().await, Frame::Pong);
        assert_eq!(engine.serving_count(), 0);
        assert!(logs
            .text()
            .contains("dropping request frame for unknown exchange"));
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected_and_stream_stays_aligned() {
        let config = RpcConfig::default().with_max_payload_size(256);
        let (engine, mut raw) = Raw::pair_with_config(Router::new(), config);

        let mut header = 300u32.to_le_bytes().to_vec();
        header.extend_from_slice(&[0; 8]);
        raw.transport.send(Bytes::from(header)).await.unwrap();
        raw.transport.send(Bytes::from(vec![0; 292])).await.unwrap();
        raw.send(Frame::Ping).await;

        match raw.next().await {
            Frame::Response(ResponseFrame::Error(error)) => {
                assert_eq!(error.code, ResponseErrorCode::DecodeFailed);
                assert!(error.message.contains("300"), "{}", error.message);
            }
            other => panic!("unexpected frame {other:?}"),
        }
        assert_eq!(raw.next().await, Frame::Pong);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(raw.received.try_recv().is_none());
        assert!(engine.is_running());
    }

    #[tokio::test]
    async fn reply_over_payload_limit_is_dropped_with_warning() {
        let (logs, _guard) = capture_warnings();
        let config = RpcConfig::default().with_max_payload_size(16);
        let (engine, mut raw) = Raw::pair_with_config(Router::new(), config);

        // The DECODE_FAILED reply does not fit in 16 bytes.
        raw.send_payload(&[0x92, 0x01]).await;
        raw.send(Frame::Ping).await;

        assert_eq!(raw.next().await, Frame::Pong);
        assert!(engine.is_running());
        assert!(logs.text().contains("frame over payload limit not sent"));
    }
}
