//! msgpack encoding of frames.
//!
//! A frame is the map `{data: <payload or nil>, type: <tag>}`. Payload maps use
//! these keys:
//!
//! | frame            | keys                                  |
//! |------------------|---------------------------------------|
//! | REQUEST_START    | `headers`?, `id`, `path`              |
//! | RESPONSE_START   | `headers`?, `id`, `status`            |
//! | *_BODY_CHUNK     | `chunk`, `id`                         |
//! | *_END            | `id`, `trailers`?                     |
//! | *_ERROR          | `code`, `id`, `message`               |
//!
//! Keys are always written in sorted order. Domain values use msgpack
//! extension types whose payload is the msgpack encoding of the backing
//! integer:
//!
//! | ext | value                |
//! |-----|----------------------|
//! | 1   | [`Id`]               |
//! | 2   | [`ResponseStatusCode`] |
//! | 3   | [`RequestErrorCode`] |
//! | 4   | [`ResponseErrorCode`] |

use std::collections::BTreeMap;

use bytes::Bytes;
use rmpv::Value as Mp;

use crate::code::{RequestErrorCode, ResponseErrorCode, ResponseStatusCode};
use crate::error::CodecError;
use crate::frame::{
    BodyChunk, End, ErrorFrame, Frame, FrameType, RequestFrame, RequestStart, ResponseFrame,
    ResponseStart,
};
use crate::id::Id;
use crate::value::{Headers, Value};

pub const EXT_ID: i8 = 0x01;
pub const EXT_RESPONSE_STATUS: i8 = 0x02;
pub const EXT_REQUEST_ERROR: i8 = 0x03;
pub const EXT_RESPONSE_ERROR: i8 = 0x04;

type Result<T> = std::result::Result<T, CodecError>;

/// Encode a frame to msgpack bytes (without the length prefix).
pub fn encode_frame(frame: &Frame) -> Result<Bytes> {
    let data = match frame {
        Frame::Request(RequestFrame::Start(f)) => {
            let mut map = BTreeMap::new();
            put_headers(&mut map, "headers", f.headers.as_ref());
            map.insert("id", ext_id(f.id));
            map.insert("path", Mp::from(f.path.as_str()));
            to_map(map)
        }
        Frame::Response(ResponseFrame::Start(f)) => {
            let mut map = BTreeMap::new();
            put_headers(&mut map, "headers", f.headers.as_ref());
            map.insert("id", ext_id(f.id));
            map.insert(
                "status",
                ext_int(EXT_RESPONSE_STATUS, u64::from(f.status.as_u32())),
            );
            to_map(map)
        }
        Frame::Request(RequestFrame::BodyChunk(f)) | Frame::Response(ResponseFrame::BodyChunk(f)) => {
            body_chunk_map(f)
        }
        Frame::Request(RequestFrame::End(f)) | Frame::Response(ResponseFrame::End(f)) => {
            end_map(f)
        }
        Frame::Request(RequestFrame::Error(f)) => {
            error_map(f.id, EXT_REQUEST_ERROR, f.code.as_u32(), &f.message)
        }
        Frame::Response(ResponseFrame::Error(f)) => {
            error_map(f.id, EXT_RESPONSE_ERROR, f.code.as_u32(), &f.message)
        }
        Frame::Close | Frame::Ping | Frame::Pong => Mp::Nil,
    };

    let envelope = Mp::Map(vec![
        (Mp::from("data"), data),
        (Mp::from("type"), Mp::from(frame.frame_type().tag())),
    ]);
    write(&envelope)
}

/// Decode msgpack bytes (without the length prefix) into a frame.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame> {
    let envelope = read(bytes)?;
    let tag = field(&envelope, "type")
        .and_then(Mp::as_i64)
        .ok_or(CodecError::MissingField("type"))?;
    let frame_type = FrameType::from_tag(tag).ok_or(CodecError::UnknownFrameType(tag))?;
    let data = field(&envelope, "data").unwrap_or(&Mp::Nil);

    let frame = match frame_type {
        FrameType::RequestStart => Frame::Request(RequestFrame::Start(RequestStart {
            id: read_id(data)?,
            path: read_string(data, "path")?,
            headers: read_headers(data, "headers")?,
        })),
        FrameType::ResponseStart => Frame::Response(ResponseFrame::Start(ResponseStart {
            id: read_id(data)?,
            status: ResponseStatusCode::try_from(read_ext_int(
                data,
                "status",
                EXT_RESPONSE_STATUS,
            )?)?,
            headers: read_headers(data, "headers")?,
        })),
        FrameType::RequestBodyChunk => {
            Frame::Request(RequestFrame::BodyChunk(read_body_chunk(data)?))
        }
        FrameType::ResponseBodyChunk => {
            Frame::Response(ResponseFrame::BodyChunk(read_body_chunk(data)?))
        }
        FrameType::RequestEnd => Frame::Request(RequestFrame::End(read_end(data)?)),
        FrameType::ResponseEnd => Frame::Response(ResponseFrame::End(read_end(data)?)),
        FrameType::RequestError => Frame::Request(RequestFrame::Error(ErrorFrame {
            id: read_id(data)?,
            code: RequestErrorCode::try_from(read_ext_int(data, "code", EXT_REQUEST_ERROR)?)?,
            message: read_string(data, "message")?,
        })),
        FrameType::ResponseError => Frame::Response(ResponseFrame::Error(ErrorFrame {
            id: read_id(data)?,
            code: ResponseErrorCode::try_from(read_ext_int(data, "code", EXT_RESPONSE_ERROR)?)?,
            message: read_string(data, "message")?,
        })),
        FrameType::Close => Frame::Close,
        FrameType::Ping => Frame::Ping,
        FrameType::Pong => Frame::Pong,
    };
    Ok(frame)
}

/// Best-effort recovery of the frame type and exchange id from bytes that
/// failed to decode.
pub fn recover_frame_header(bytes: &[u8]) -> (Option<FrameType>, Option<Id>) {
    let Ok(envelope) = read(bytes) else {
        return (None, None);
    };
    let frame_type = field(&envelope, "type")
        .and_then(Mp::as_i64)
        .and_then(FrameType::from_tag);
    let id = field(&envelope, "data").and_then(|data| read_id(data).ok());
    (frame_type, id)
}

/// Encode a standalone [`Value`] as msgpack, e.g. for a request body.
pub fn encode_value(value: &Value) -> Result<Bytes> {
    write(&to_mp(value))
}

/// Decode msgpack bytes into a [`Value`].
pub fn decode_value(bytes: &[u8]) -> Result<Value> {
    from_mp(read(bytes)?)
}

fn write(value: &Mp) -> Result<Bytes> {
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, value).map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(Bytes::from(buf))
}

fn read(bytes: &[u8]) -> Result<Mp> {
    let mut cursor = bytes;
    let value =
        rmpv::decode::read_value(&mut cursor).map_err(|e| CodecError::Decode(e.to_string()))?;
    if !cursor.is_empty() {
        return Err(CodecError::TrailingBytes(cursor.len()));
    }
    Ok(value)
}

fn to_map(map: BTreeMap<&'static str, Mp>) -> Mp {
    Mp::Map(map.into_iter().map(|(k, v)| (Mp::from(k), v)).collect())
}

fn put_headers(map: &mut BTreeMap<&'static str, Mp>, key: &'static str, headers: Option<&Headers>) {
    if let Some(headers) = headers {
        map.insert(key, headers_to_mp(headers));
    }
}

fn body_chunk_map(f: &BodyChunk) -> Mp {
    let mut map = BTreeMap::new();
    map.insert("chunk", Mp::Binary(f.chunk.to_vec()));
    map.insert("id", ext_id(f.id));
    to_map(map)
}

fn end_map(f: &End) -> Mp {
    let mut map = BTreeMap::new();
    map.insert("id", ext_id(f.id));
    put_headers(&mut map, "trailers", f.trailers.as_ref());
    to_map(map)
}

fn error_map(id: Id, ext: i8, code: u32, message: &str) -> Mp {
    let mut map = BTreeMap::new();
    map.insert("code", ext_int(ext, u64::from(code)));
    map.insert("id", ext_id(id));
    map.insert("message", Mp::from(message));
    to_map(map)
}

fn ext_id(id: Id) -> Mp {
    ext_int(EXT_ID, id.as_u64())
}

fn ext_int(ext: i8, value: u64) -> Mp {
    let mut payload = Vec::with_capacity(9);
    // Writing an integer into a Vec cannot fail.
    let _ = rmpv::encode::write_value(&mut payload, &Mp::from(value));
    Mp::Ext(ext, payload)
}

fn field<'a>(map: &'a Mp, key: &str) -> Option<&'a Mp> {
    match map {
        Mp::Map(entries) => entries
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v),
        _ => None,
    }
}

fn require<'a>(map: &'a Mp, key: &'static str) -> Result<&'a Mp> {
    field(map, key).ok_or(CodecError::MissingField(key))
}

fn read_ext_int(map: &Mp, key: &'static str, expected: i8) -> Result<u64> {
    match require(map, key)? {
        Mp::Ext(ext, payload) if *ext == expected => {
            let mut cursor = payload.as_slice();
            rmpv::decode::read_value(&mut cursor)
                .ok()
                .and_then(|v| v.as_u64())
                .ok_or(CodecError::InvalidField {
                    field: key,
                    expected: "integer extension payload",
                })
        }
        Mp::Ext(ext, _) => Err(CodecError::UnknownExtension(*ext)),
        _ => Err(CodecError::InvalidField {
            field: key,
            expected: "extension value",
        }),
    }
}

fn read_id(map: &Mp) -> Result<Id> {
    read_ext_int(map, "id", EXT_ID).map(Id::from_raw)
}

fn read_string(map: &Mp, key: &'static str) -> Result<String> {
    require(map, key)?
        .as_str()
        .map(str::to_string)
        .ok_or(CodecError::InvalidField {
            field: key,
            expected: "string",
        })
}

fn read_headers(map: &Mp, key: &'static str) -> Result<Option<Headers>> {
    match field(map, key) {
        None | Some(Mp::Nil) => Ok(None),
        Some(value) => match from_mp(value.clone())? {
            Value::Map(headers) => Ok(Some(headers)),
            _ => Err(CodecError::InvalidField {
                field: key,
                expected: "map",
            }),
        },
    }
}

fn read_body_chunk(map: &Mp) -> Result<BodyChunk> {
    let chunk = match require(map, "chunk")? {
        Mp::Binary(bytes) => Bytes::copy_from_slice(bytes),
        _ => {
            return Err(CodecError::InvalidField {
                field: "chunk",
                expected: "binary",
            })
        }
    };
    Ok(BodyChunk {
        id: read_id(map)?,
        chunk,
    })
}

fn read_end(map: &Mp) -> Result<End> {
    Ok(End {
        id: read_id(map)?,
        trailers: read_headers(map, "trailers")?,
    })
}

fn headers_to_mp(headers: &Headers) -> Mp {
    Mp::Map(
        headers
            .iter()
            .map(|(k, v)| (Mp::from(k.as_str()), to_mp(v)))
            .collect(),
    )
}

fn to_mp(value: &Value) -> Mp {
    match value {
        Value::Null => Mp::Nil,
        Value::Bool(b) => Mp::Boolean(*b),
        Value::Float(f) => Mp::F64(*f),
        Value::Int(n) => Mp::from(*n),
        Value::Str(s) => Mp::from(s.as_str()),
        Value::Bytes(b) => Mp::Binary(b.to_vec()),
        Value::Array(items) => Mp::Array(items.iter().map(to_mp).collect()),
        Value::Map(map) => headers_to_mp(map),
    }
}

fn from_mp(value: Mp) -> Result<Value> {
    Ok(match value {
        Mp::Nil => Value::Null,
        Mp::Boolean(b) => Value::Bool(b),
        Mp::F32(f) => Value::Float(f64::from(f)),
        Mp::F64(f) => Value::Float(f),
        Mp::Integer(n) => match n.as_i64() {
            Some(n) => Value::Int(n),
            None => {
                return Err(CodecError::UnsupportedValue(format!(
                    "integer {} exceeds i64",
                    n.as_u64().unwrap_or_default()
                )))
            }
        },
        Mp::String(s) => match s.into_str() {
            Some(s) => Value::Str(s),
            None => return Err(CodecError::UnsupportedValue("non-utf8 string".to_string())),
        },
        Mp::Binary(b) => Value::Bytes(Bytes::from(b)),
        Mp::Array(items) => Value::Array(items.into_iter().map(from_mp).collect::<Result<_>>()?),
        Mp::Map(entries) => {
            let mut map = BTreeMap::new();
            for (k, v) in entries {
                let Mp::String(key) = k else {
                    return Err(CodecError::UnsupportedValue("non-string map key".to_string()));
                };
                let Some(key) = key.into_str() else {
                    return Err(CodecError::UnsupportedValue("non-utf8 map key".to_string()));
                };
                map.insert(key, from_mp(v)?);
            }
            Value::Map(map)
        }
        Mp::Ext(ext, _) => return Err(CodecError::UnknownExtension(ext)),
    })
}
