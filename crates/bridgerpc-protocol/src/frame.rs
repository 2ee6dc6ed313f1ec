use bytes::Bytes;

use crate::code::{RequestErrorCode, ResponseErrorCode, ResponseStatusCode};
use crate::id::Id;
use crate::value::Headers;

/// Numeric frame discriminant sent as the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    RequestStart,
    RequestBodyChunk,
    RequestEnd,
    RequestError,
    ResponseStart,
    ResponseBodyChunk,
    ResponseEnd,
    ResponseError,
    Close,
    Ping,
    Pong,
}

impl FrameType {
    pub const fn tag(self) -> u8 {
        match self {
            FrameType::RequestStart => 0,
            FrameType::RequestBodyChunk => 1,
            FrameType::RequestEnd => 2,
            FrameType::RequestError => 3,
            FrameType::ResponseStart => 20,
            FrameType::ResponseBodyChunk => 21,
            FrameType::ResponseEnd => 22,
            FrameType::ResponseError => 23,
            FrameType::Close => 40,
            FrameType::Ping => 41,
            FrameType::Pong => 42,
        }
    }

    pub const fn from_tag(tag: i64) -> Option<Self> {
        Some(match tag {
            0 => FrameType::RequestStart,
            1 => FrameType::RequestBodyChunk,
            2 => FrameType::RequestEnd,
            3 => FrameType::RequestError,
            20 => FrameType::ResponseStart,
            21 => FrameType::ResponseBodyChunk,
            22 => FrameType::ResponseEnd,
            23 => FrameType::ResponseError,
            40 => FrameType::Close,
            41 => FrameType::Ping,
            42 => FrameType::Pong,
            _ => return None,
        })
    }

    /// True for the four request-side frame types.
    pub const fn is_request(self) -> bool {
        self.tag() < 20
    }

    /// True for the four response-side frame types.
    pub const fn is_response(self) -> bool {
        let tag = self.tag();
        tag >= 20 && tag < 40
    }
}

/// First frame of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestStart {
    pub id: Id,
    pub path: String,
    pub headers: Option<Headers>,
}

/// First frame of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseStart {
    pub id: Id,
    pub status: ResponseStatusCode,
    pub headers: Option<Headers>,
}

/// One piece of a streamed body.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyChunk {
    pub id: Id,
    pub chunk: Bytes,
}

/// Successful end of a body, with optional trailers.
#[derive(Debug, Clone, PartialEq)]
pub struct End {
    pub id: Id,
    pub trailers: Option<Headers>,
}

/// Abnormal end of one side of an exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorFrame<C> {
    pub id: Id,
    pub code: C,
    pub message: String,
}

/// Frames sent by the requesting side.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestFrame {
    Start(RequestStart),
    BodyChunk(BodyChunk),
    End(End),
    Error(ErrorFrame<RequestErrorCode>),
}

/// Frames sent by the responding side.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFrame {
    Start(ResponseStart),
    BodyChunk(BodyChunk),
    End(End),
    Error(ErrorFrame<ResponseErrorCode>),
}

/// One protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Request(RequestFrame),
    Response(ResponseFrame),
    Close,
    Ping,
    Pong,
}

impl RequestFrame {
    pub fn id(&self) -> Id {
        match self {
            RequestFrame::Start(f) => f.id,
            RequestFrame::BodyChunk(f) => f.id,
            RequestFrame::End(f) => f.id,
            RequestFrame::Error(f) => f.id,
        }
    }

    pub fn frame_type(&self) -> FrameType {
        match self {
            RequestFrame::Start(_) => FrameType::RequestStart,
            RequestFrame::BodyChunk(_) => FrameType::RequestBodyChunk,
            RequestFrame::End(_) => FrameType::RequestEnd,
            RequestFrame::Error(_) => FrameType::RequestError,
        }
    }
}

impl ResponseFrame {
    pub fn id(&self) -> Id {
        match self {
            ResponseFrame::Start(f) => f.id,
            ResponseFrame::BodyChunk(f) => f.id,
            ResponseFrame::End(f) => f.id,
            ResponseFrame::Error(f) => f.id,
        }
    }

    pub fn frame_type(&self) -> FrameType {
        match self {
            ResponseFrame::Start(_) => FrameType::ResponseStart,
            ResponseFrame::BodyChunk(_) => FrameType::ResponseBodyChunk,
            ResponseFrame::End(_) => FrameType::ResponseEnd,
            ResponseFrame::Error(_) => FrameType::ResponseError,
        }
    }
}

impl Frame {
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Request(f) => f.frame_type(),
            Frame::Response(f) => f.frame_type(),
            Frame::Close => FrameType::Close,
            Frame::Ping => FrameType::Ping,
            Frame::Pong => FrameType::Pong,
        }
    }

    /// Exchange id, if this frame belongs to an exchange.
    pub fn id(&self) -> Option<Id> {
        match self {
            Frame::Request(f) => Some(f.id()),
            Frame::Response(f) => Some(f.id()),
            Frame::Close | Frame::Ping | Frame::Pong => None,
        }
    }
}

impl From<RequestFrame> for Frame {
    fn from(frame: RequestFrame) -> Self {
        Frame::Request(frame)
    }
}

impl From<ResponseFrame> for Frame {
    fn from(frame: ResponseFrame) -> Self {
        Frame::Response(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_roundtrip() {
        for tag in [0, 1, 2, 3, 20, 21, 22, 23, 40, 41, 42] {
            let ty = FrameType::from_tag(tag).unwrap();
            assert_eq!(i64::from(ty.tag()), tag);
        }
        assert!(FrameType::from_tag(4).is_none());
        assert!(FrameType::from_tag(-1).is_none());
    }

    #[test]
    fn side_classification() {
        assert!(FrameType::RequestError.is_request());
        assert!(FrameType::ResponseStart.is_response());
        assert!(!FrameType::Ping.is_request());
        assert!(!FrameType::Pong.is_response());
    }
}
