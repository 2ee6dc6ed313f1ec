use std::sync::Arc;

use bridgerpc_protocol::{
    BodyChunk, End, ErrorFrame, Frame, Headers, Id, ProtocolState, ResponseErrorCode,
    ResponseFrame, ResponseStart, ResponseStateMachine, ResponseStatusCode, StateError,
};
use bridgerpc_sync::{queue, QueueReceiver, QueueSender, ValueChannel};
use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::error::{PeerError, Result};
use crate::link::Link;
use crate::session::SessionContext;

/// Status and headers of a started response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseHead {
    pub id: Id,
    pub status: ResponseStatusCode,
    pub headers: Option<Headers>,
}

/// A fully received response.
#[derive(Debug, Clone, PartialEq)]
pub struct UnaryResponse {
    pub id: Id,
    pub status: ResponseStatusCode,
    pub headers: Option<Headers>,
    pub body: Bytes,
    pub trailers: Option<Headers>,
}

impl UnaryResponse {
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatusCode::Success
    }
}

type RemoteFailure = ErrorFrame<ResponseErrorCode>;

pub(crate) fn remote_error(frame: RemoteFailure) -> PeerError {
    PeerError::Remote {
        code: frame.code,
        message: frame.message,
    }
}

/// Engine-side half of an awaited response.
#[derive(Debug)]
pub(crate) struct ResponseSink {
    head: ValueChannel<std::result::Result<ResponseHead, RemoteFailure>>,
    body: QueueSender<Bytes>,
    outcome: ValueChannel<std::result::Result<Option<Headers>, RemoteFailure>>,
}

impl ResponseSink {
    pub(crate) fn started(&self, head: ResponseHead) {
        let _ = self.head.send(Ok(head));
    }

    pub(crate) fn chunk(&self, chunk: Bytes) {
        let _ = self.body.send(chunk);
    }

    pub(crate) fn ended(&self, trailers: Option<Headers>) {
        let _ = self.outcome.send(Ok(trailers));
        self.body.close();
    }

    /// Fail whatever part of the response is still outstanding.
    pub(crate) fn failed(&self, failure: RemoteFailure) {
        if !self.head.has_value() {
            let _ = self.head.send(Err(failure.clone()));
        }
        let _ = self.outcome.send(Err(failure));
        self.body.close();
    }
}

impl SessionContext for ResponseSink {
    fn on_close(&mut self) {
        self.head.close();
        self.body.close();
        self.outcome.close();
    }
}

/// Create the two halves of an awaited response.
pub(crate) fn response_channel(id: Id) -> (ResponseSink, IncomingResponse) {
    let head = ValueChannel::new();
    let outcome = ValueChannel::new();
    let (tx, rx) = queue();
    (
        ResponseSink {
            head: head.clone(),
            body: tx,
            outcome: outcome.clone(),
        },
        IncomingResponse {
            id,
            head,
            body: rx,
            outcome,
        },
    )
}

/// A response arriving for a request this side sent.
///
/// The head, the body chunks and the trailers can be awaited independently;
/// [`collect`](Self::collect) waits for all of them.
#[derive(Debug)]
pub struct IncomingResponse {
    id: Id,
    head: ValueChannel<std::result::Result<ResponseHead, RemoteFailure>>,
    body: QueueReceiver<Bytes>,
    outcome: ValueChannel<std::result::Result<Option<Headers>, RemoteFailure>>,
}

impl IncomingResponse {
    pub fn id(&self) -> Id {
        self.id
    }

    /// Wait for `RESPONSE_START`.
    pub async fn head(&self) -> Result<ResponseHead> {
        match self.head.recv().await {
            Ok(Ok(head)) => Ok(head),
            Ok(Err(failure)) => Err(remote_error(failure)),
            Err(_) => Err(PeerError::Closed),
        }
    }

    /// Next body chunk, or `None` once the body is finished.
    pub async fn next_chunk(&mut self) -> Option<Bytes> {
        self.body.recv().await
    }

    /// The body as a stream of chunks.
    pub fn body(&mut self) -> &mut QueueReceiver<Bytes> {
        &mut self.body
    }

    /// Wait for `RESPONSE_END` and return its trailers.
    pub async fn trailers(&self) -> Result<Option<Headers>> {
        match self.outcome.recv().await {
            Ok(Ok(trailers)) => Ok(trailers),
            Ok(Err(failure)) => Err(remote_error(failure)),
            Err(_) => Err(PeerError::Closed),
        }
    }

    /// Wait for the whole response and concatenate its body.
    pub async fn collect(mut self) -> Result<UnaryResponse> {
        let head = self.head().await?;
        let mut body = BytesMut::new();
        while let Some(chunk) = self.body.recv().await {
            body.extend_from_slice(&chunk);
        }
        let trailers = self.trailers().await?;
        Ok(UnaryResponse {
            id: self.id,
            status: head.status,
            headers: head.headers,
            body: body.freeze(),
            trailers,
        })
    }
}

struct WriterState {
    machine: ResponseStateMachine,
    // Set when an error was sent before the response started.
    aborted: bool,
}

struct WriterShared {
    id: Id,
    link: Arc<Link>,
    state: tokio::sync::Mutex<WriterState>,
}

/// Writes the response to one inbound request.
///
/// Every frame is checked against a response state machine before it is
/// sent, so a writer can never emit an out-of-order frame. Clones share the
/// same state.
#[derive(Clone)]
pub struct ResponseWriter {
    shared: Arc<WriterShared>,
}

impl ResponseWriter {
    pub(crate) fn new(id: Id, link: Arc<Link>) -> Self {
        Self {
            shared: Arc::new(WriterShared {
                id,
                link,
                state: tokio::sync::Mutex::new(WriterState {
                    machine: ResponseStateMachine::new(),
                    aborted: false,
                }),
            }),
        }
    }

    pub fn id(&self) -> Id {
        self.shared.id
    }

    pub async fn state(&self) -> ProtocolState {
        let state = self.shared.state.lock().await;
        if state.aborted {
            ProtocolState::Errored
        } else {
            state.machine.state()
        }
    }

    /// True once `END` or `ERROR` was sent.
    pub async fn is_finished(&self) -> bool {
        self.state().await.is_terminal()
    }

    /// Send `RESPONSE_START`.
    pub async fn start(&self, status: ResponseStatusCode, headers: Option<Headers>) -> Result<()> {
        self.emit(ResponseFrame::Start(ResponseStart {
            id: self.id(),
            status,
            headers,
        }))
        .await
    }

    /// Send one `RESPONSE_BODY_CHUNK`.
    pub async fn write(&self, chunk: impl Into<Bytes>) -> Result<()> {
        self.emit(ResponseFrame::BodyChunk(BodyChunk {
            id: self.id(),
            chunk: chunk.into(),
        }))
        .await
    }

    /// Send `RESPONSE_END`.
    pub async fn end(&self, trailers: Option<Headers>) -> Result<()> {
        self.emit(ResponseFrame::End(End {
            id: self.id(),
            trailers,
        }))
        .await
    }

    /// Send `RESPONSE_ERROR`.
    ///
    /// Allowed before `start`: the error then stands in for the whole
    /// response.
    pub async fn error(&self, code: ResponseErrorCode, message: impl Into<String>) -> Result<()> {
        let frame = ResponseFrame::Error(ErrorFrame {
            id: self.id(),
            code,
            message: message.into(),
        });
        let mut state = self.shared.state.lock().await;
        if state.aborted {
            return Err(StateError::Errored(self.id()).into());
        }
        let frame = if state.machine.state() == ProtocolState::Initial {
            state.aborted = true;
            frame
        } else {
            state.machine.transition(frame)?.event
        };
        self.shared.link.send(&Frame::Response(frame)).await
    }

    /// Send a complete single-chunk response.
    pub async fn send(&self, status: ResponseStatusCode, body: impl Into<Bytes>) -> Result<()> {
        let body = body.into();
        self.start(status, None).await?;
        if !body.is_empty() {
            self.write(body).await?;
        }
        self.end(None).await
    }

    /// Complete a response the service left open: start it with `SUCCESS`
    /// if needed, then end it. Does nothing once finished.
    pub(crate) async fn finish(&self) -> Result<()> {
        match self.state().await {
            ProtocolState::Ended | ProtocolState::Errored => return Ok(()),
            ProtocolState::Initial => {
                debug!(id = %self.id(), "service returned without starting a response");
                self.start(ResponseStatusCode::Success, None).await?;
            }
            ProtocolState::Started | ProtocolState::BodyChunksReceiving => {}
        }
        self.end(None).await
    }

    async fn emit(&self, frame: ResponseFrame) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        if state.aborted {
            return Err(StateError::Errored(self.id()).into());
        }
        let transition = state.machine.transition(frame)?;
        self.shared
            .link
            .send(&Frame::Response(transition.event))
            .await
    }
}

impl std::fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("id", &self.shared.id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use bridgerpc_frame::{FrameConfig, ReadFramer};
    use bridgerpc_protocol::wire;
    use bridgerpc_sync::queue as chunk_queue;
    use bridgerpc_transport::{DuplexTransport, Transport};

    use super::*;

    fn id() -> Id {
        Id::from_parts(5, 1)
    }

    /// A writer wired to a loopback pair, plus the frames seen by the far end.
    fn writer() -> (ResponseWriter, QueueReceiver<Bytes>) {
        let (near, far) = DuplexTransport::pair();
        let (tx, rx) = chunk_queue();
        far.on_receive(Arc::new(move |chunk: Bytes| {
            let _ = tx.send(chunk);
        }));
        let link = Arc::new(Link::new(Arc::new(near), FrameConfig::default()));
        (ResponseWriter::new(id(), link), rx)
    }

    fn drain(rx: &mut QueueReceiver<Bytes>) -> Vec<Frame> {
        let mut framer = ReadFramer::new();
        let mut frames = Vec::new();
        while let Some(chunk) = rx.try_recv() {
            for payload in framer.push(&chunk) {
                frames.push(wire::decode_frame(&payload.unwrap()).unwrap());
            }
        }
        frames
    }

    #[tokio::test]
    async fn send_emits_start_body_end() {
        let (writer, mut rx) = writer();
        writer
            .send(ResponseStatusCode::Success, Bytes::from_static(b"ok"))
            .await
            .unwrap();

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 3);
        assert!(matches!(
            &frames[0],
            Frame::Response(ResponseFrame::Start(s)) if s.status == ResponseStatusCode::Success
        ));
        assert!(matches!(
            &frames[1],
            Frame::Response(ResponseFrame::BodyChunk(c)) if c.chunk.as_ref() == b"ok"
        ));
        assert!(matches!(&frames[2], Frame::Response(ResponseFrame::End(_))));
        assert!(writer.is_finished().await);
    }

    #[tokio::test]
    async fn out_of_order_write_rejected_and_not_sent() {
        let (writer, mut rx) = writer();
        let err = writer.write(Bytes::from_static(b"early")).await.unwrap_err();

        assert!(matches!(err, PeerError::Protocol(StateError::InvalidFrame { .. })));
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn error_before_start_aborts() {
        let (writer, mut rx) = writer();
        writer
            .error(ResponseErrorCode::HandlerFailed, "boom")
            .await
            .unwrap();

        assert_eq!(writer.state().await, ProtocolState::Errored);
        assert!(writer.start(ResponseStatusCode::Success, None).await.is_err());
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert!(matches!(
            &frames[0],
            Frame::Response(ResponseFrame::Error(e)) if e.code == ResponseErrorCode::HandlerFailed
        ));
    }

    #[tokio::test]
    async fn finish_completes_open_response() {
        let (writer, mut rx) = writer();
        writer.finish().await.unwrap();
        writer.finish().await.unwrap();

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 2);
        assert_eq!(writer.state().await, ProtocolState::Ended);
    }

    #[tokio::test]
    async fn collect_gathers_head_body_trailers() {
        let (sink, response) = response_channel(id());
        sink.started(ResponseHead {
            id: id(),
            status: ResponseStatusCode::Success,
            headers: None,
        });
        sink.chunk(Bytes::from_static(b"ab"));
        sink.chunk(Bytes::from_static(b"cd"));
        let mut trailers = Headers::new();
        trailers.insert("done".into(), true.into());
        sink.ended(Some(trailers.clone()));

        let unary = response.collect().await.unwrap();
        assert!(unary.is_success());
        assert_eq!(unary.body.as_ref(), b"abcd");
        assert_eq!(unary.trailers, Some(trailers));
    }

    #[tokio::test]
    async fn failure_before_head_surfaces_on_head() {
        let (sink, response) = response_channel(id());
        sink.failed(ErrorFrame {
            id: id(),
            code: ResponseErrorCode::HandlerFailed,
            message: "nope".into(),
        });

        let err = response.head().await.unwrap_err();
        assert!(matches!(
            err,
            PeerError::Remote { code: ResponseErrorCode::HandlerFailed, .. }
        ));
    }

    #[tokio::test]
    async fn close_hook_releases_waiters() {
        let (mut sink, mut response) = response_channel(id());
        sink.on_close();

        assert!(matches!(response.head().await, Err(PeerError::Closed)));
        assert_eq!(response.next_chunk().await, None);
    }
}
