use std::sync::{Arc, Weak};

use bridgerpc_protocol::{
    BodyChunk, End, ErrorFrame, Frame, Headers, Id, ProtocolState, RequestErrorCode,
    RequestFrame, RequestStart, RequestStateMachine, Value,
};
use bridgerpc_sync::{queue, QueueReceiver, QueueSender, ValueChannel};
use bytes::{Bytes, BytesMut};

use crate::engine::Shared;
use crate::error::{PeerError, Result};
use crate::link::Link;
use crate::session::SessionContext;

type AbortFailure = ErrorFrame<RequestErrorCode>;

fn request_error(frame: AbortFailure) -> PeerError {
    PeerError::RequestFailed {
        code: frame.code,
        message: frame.message,
    }
}

/// Engine-side half of a request being served.
#[derive(Debug)]
pub(crate) struct RequestSink {
    body: QueueSender<Bytes>,
    outcome: ValueChannel<std::result::Result<Option<Headers>, AbortFailure>>,
}

impl RequestSink {
    pub(crate) fn chunk(&self, chunk: Bytes) {
        let _ = self.body.send(chunk);
    }

    pub(crate) fn ended(&self, trailers: Option<Headers>) {
        let _ = self.outcome.send(Ok(trailers));
        self.body.close();
    }

    pub(crate) fn failed(&self, failure: AbortFailure) {
        let _ = self.outcome.send(Err(failure));
        self.body.close();
    }
}

impl SessionContext for RequestSink {
    fn on_close(&mut self) {
        self.body.close();
        self.outcome.close();
    }
}

/// Create the two halves of a request being served.
pub(crate) fn request_channel(start: RequestStart) -> (RequestSink, IncomingRequest) {
    let outcome = ValueChannel::new();
    let (tx, rx) = queue();
    (
        RequestSink {
            body: tx,
            outcome: outcome.clone(),
        },
        IncomingRequest {
            id: start.id,
            path: start.path,
            headers: start.headers,
            body: rx,
            outcome,
        },
    )
}

/// A request received from the remote side, as seen by a service.
#[derive(Debug)]
pub struct IncomingRequest {
    id: Id,
    path: String,
    headers: Option<Headers>,
    body: QueueReceiver<Bytes>,
    outcome: ValueChannel<std::result::Result<Option<Headers>, AbortFailure>>,
}

impl IncomingRequest {
    pub fn id(&self) -> Id {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> Option<&Headers> {
        self.headers.as_ref()
    }

    pub fn header(&self, key: &str) -> Option<&Value> {
        self.headers.as_ref()?.get(key)
    }

    /// Next body chunk, or `None` once the body is finished.
    pub async fn next_chunk(&mut self) -> Option<Bytes> {
        self.body.recv().await
    }

    /// The body as a stream of chunks.
    pub fn body(&mut self) -> &mut QueueReceiver<Bytes> {
        &mut self.body
    }

    /// Wait for `REQUEST_END` and return its trailers.
    pub async fn trailers(&self) -> Result<Option<Headers>> {
        match self.outcome.recv().await {
            Ok(Ok(trailers)) => Ok(trailers),
            Ok(Err(failure)) => Err(request_error(failure)),
            Err(_) => Err(PeerError::Closed),
        }
    }

    /// Read the remaining body and wait for the request to end.
    pub async fn read_to_end(&mut self) -> Result<Bytes> {
        let mut body = BytesMut::new();
        while let Some(chunk) = self.body.recv().await {
            body.extend_from_slice(&chunk);
        }
        self.trailers().await?;
        Ok(body.freeze())
    }
}

/// A request this side is sending.
///
/// `REQUEST_START` is sent when the request is created; body chunks follow
/// through [`write`](Self::write) until [`end`](Self::end) or
/// [`error`](Self::error). The response arrives on the paired
/// [`IncomingResponse`](crate::IncomingResponse).
pub struct OutgoingRequest {
    id: Id,
    path: String,
    link: Arc<Link>,
    machine: RequestStateMachine,
    engine: Weak<Shared>,
}

impl OutgoingRequest {
    pub(crate) async fn open(
        id: Id,
        path: &str,
        headers: Option<Headers>,
        link: Arc<Link>,
        engine: Weak<Shared>,
    ) -> Result<Self> {
        let mut request = Self {
            id,
            path: path.to_string(),
            link,
            machine: RequestStateMachine::new(),
            engine,
        };
        request
            .emit(RequestFrame::Start(RequestStart {
                id,
                path: path.to_string(),
                headers,
            }))
            .await?;
        Ok(request)
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> ProtocolState {
        self.machine.state()
    }

    /// Send one `REQUEST_BODY_CHUNK`.
    pub async fn write(&mut self, chunk: impl Into<Bytes>) -> Result<()> {
        let id = self.id;
        self.emit(RequestFrame::BodyChunk(BodyChunk {
            id,
            chunk: chunk.into(),
        }))
        .await
    }

    /// Send `REQUEST_END`.
    pub async fn end(&mut self, trailers: Option<Headers>) -> Result<()> {
        let id = self.id;
        self.emit(RequestFrame::End(End { id, trailers })).await
    }

    /// Send `REQUEST_ERROR` and stop waiting for the response.
    pub async fn error(&mut self, code: RequestErrorCode, message: impl Into<String>) -> Result<()> {
        let id = self.id;
        let sent = self
            .emit(RequestFrame::Error(ErrorFrame {
                id,
                code,
                message: message.into(),
            }))
            .await;
        if let Some(engine) = self.engine.upgrade() {
            engine.sessions.close_response_session(id).await;
        }
        sent
    }

    async fn emit(&mut self, frame: RequestFrame) -> Result<()> {
        let transition = self.machine.transition(frame)?;
        self.link.send(&Frame::Request(transition.event)).await
    }
}

impl std::fmt::Debug for OutgoingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutgoingRequest")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("state", &self.machine.state())
            .finish()
    }
}
