use std::marker::PhantomData;

use crate::error::StateError;
use crate::frame::{RequestFrame, ResponseFrame};
use crate::id::Id;

/// Where an exchange is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolState {
    Initial,
    Started,
    BodyChunksReceiving,
    Ended,
    Errored,
}

impl ProtocolState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProtocolState::Ended | ProtocolState::Errored)
    }
}

/// Event shape shared by request and response frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Start,
    BodyChunk,
    End,
    Error,
}

/// A frame that can drive a [`StateMachine`].
pub trait ExchangeEvent {
    fn id(&self) -> Id;
    fn kind(&self) -> EventKind;
}

impl ExchangeEvent for RequestFrame {
    fn id(&self) -> Id {
        RequestFrame::id(self)
    }

    fn kind(&self) -> EventKind {
        match self {
            RequestFrame::Start(_) => EventKind::Start,
            RequestFrame::BodyChunk(_) => EventKind::BodyChunk,
            RequestFrame::End(_) => EventKind::End,
            RequestFrame::Error(_) => EventKind::Error,
        }
    }
}

impl ExchangeEvent for ResponseFrame {
    fn id(&self) -> Id {
        ResponseFrame::id(self)
    }

    fn kind(&self) -> EventKind {
        match self {
            ResponseFrame::Start(_) => EventKind::Start,
            ResponseFrame::BodyChunk(_) => EventKind::BodyChunk,
            ResponseFrame::End(_) => EventKind::End,
            ResponseFrame::Error(_) => EventKind::Error,
        }
    }
}

/// Outcome of an accepted event: the states on both sides and the event itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition<E> {
    pub from: ProtocolState,
    pub to: ProtocolState,
    pub event: E,
}

/// Validates the frame order of one side of one exchange.
///
/// ```text
/// Initial --START--> Started --BODY--> BodyChunksReceiving --BODY--> ...
///                       |                     |
///                       +--END--> Ended <-----+--END
///                       +--ERROR--> Errored <-+--ERROR
/// ```
///
/// The first `START` binds the exchange id. A rejected event never changes
/// the state.
#[derive(Debug, Clone)]
pub struct StateMachine<E> {
    state: ProtocolState,
    id: Option<Id>,
    _event: PhantomData<fn(E)>,
}

/// Validates frames of one request.
pub type RequestStateMachine = StateMachine<RequestFrame>;

/// Validates frames of one response.
pub type ResponseStateMachine = StateMachine<ResponseFrame>;

impl<E: ExchangeEvent> StateMachine<E> {
    pub fn new() -> Self {
        Self {
            state: ProtocolState::Initial,
            id: None,
            _event: PhantomData,
        }
    }

    /// Current state.
    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// Exchange id, once bound by `START`.
    pub fn id(&self) -> Option<Id> {
        self.id
    }

    /// Apply one event.
    pub fn transition(&mut self, event: E) -> Result<Transition<E>, StateError> {
        let kind = event.kind();
        let actual = event.id();

        let Some(expected) = self.id else {
            if kind != EventKind::Start {
                return Err(StateError::InvalidFrame {
                    state: self.state,
                    event: kind,
                });
            }
            self.id = Some(actual);
            return Ok(self.advance(ProtocolState::Started, event));
        };

        if actual != expected {
            return Err(StateError::InvalidId { expected, actual });
        }

        let next = match (self.state, kind) {
            (ProtocolState::Ended, _) => return Err(StateError::Ended(expected)),
            (ProtocolState::Errored, _) => return Err(StateError::Errored(expected)),
            (_, EventKind::Start) => {
                return Err(StateError::InvalidFrame {
                    state: self.state,
                    event: kind,
                })
            }
            (_, EventKind::BodyChunk) => ProtocolState::BodyChunksReceiving,
            (_, EventKind::End) => ProtocolState::Ended,
            (_, EventKind::Error) => ProtocolState::Errored,
        };
        Ok(self.advance(next, event))
    }

    fn advance(&mut self, to: ProtocolState, event: E) -> Transition<E> {
        let from = self.state;
        self.state = to;
        Transition { from, to, event }
    }
}

impl<E: ExchangeEvent> Default for StateMachine<E> {
    fn default() -> Self {
        Self::new()
    }
}
