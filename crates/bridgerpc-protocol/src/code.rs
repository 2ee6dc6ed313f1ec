//! Status and error codes carried in response and error frames.
//!
//! Each set is closed; decoding an integer outside the set is a codec error.

use std::fmt;

use crate::error::CodecError;

macro_rules! wire_code {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal => $label:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            /// Backing integer sent on the wire.
            pub const fn as_u32(self) -> u32 {
                match self {
                    $( Self::$variant => $value, )+
                }
            }

            /// Wire label, e.g. `NO_HANDLER_FOR_PATH`.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                }
            }
        }

        impl TryFrom<u64> for $name {
            type Error = CodecError;

            fn try_from(value: u64) -> Result<Self, CodecError> {
                match value {
                    $( $value => Ok(Self::$variant), )+
                    other => Err(CodecError::UnknownCode { kind: $kind, value: other }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_code! {
    /// Status of a started response.
    ResponseStatusCode, "response status code" {
        Success = 0 => "SUCCESS",
        /// The router had no service registered for the request path.
        NoHandlerForPath = 1 => "NO_HANDLER_FOR_PATH",
    }
}

wire_code! {
    /// Reason carried by a `REQUEST_ERROR` frame.
    RequestErrorCode, "request error code" {
        UnexpectedFrame = 0 => "UNEXPECTED_FRAME",
        TimedOut = 1 => "TIMED_OUT",
        DecodeFailed = 2 => "DECODE_FAILED",
        /// The caller gave up on the request.
        Aborted = 3 => "ABORTED",
    }
}

wire_code! {
    /// Reason carried by a `RESPONSE_ERROR` frame.
    ResponseErrorCode, "response error code" {
        UnexpectedFrame = 0 => "UNEXPECTED_FRAME",
        TimedOut = 1 => "TIMED_OUT",
        DecodeFailed = 2 => "DECODE_FAILED",
        /// The service for the path failed.
        HandlerFailed = 3 => "HANDLER_FAILED",
    }
}
