//! RESP2 / RESP3 framing.
//!
//! Commands are packed by `redis::Cmd` as arrays of bulk strings. Replies are
//! read with the `redis` crate's incremental parser into [`redis::Value`],
//! which bounds nesting depth and reports malformed input as an error.

use std::io;

use combine::parser::combinator::AnySendSyncPartialState;
use combine::stream::PointerOffset;
use tokio::io::AsyncRead;

use crate::error::{CommandError, ProtocolError};

pub use redis::Value;

/// Parser state for one connection. Holds bytes read past the last reply.
pub type ReplyDecoder = combine::stream::Decoder<AnySendSyncPartialState, PointerOffset<[u8]>>;

/// Pack a command as an array of bulk strings.
pub fn pack_command<A: AsRef<[u8]>>(args: &[A]) -> Vec<u8> {
    let mut cmd = redis::Cmd::new();
    for arg in args {
        cmd.arg(arg.as_ref());
    }
    cmd.get_packed_command()
}

/// Read one reply from `reader`.
///
/// Attribute frames are unwrapped to the value they annotate. Error replies
/// are returned as values; [`server_message`] renders them.
pub async fn read_value<R>(decoder: &mut ReplyDecoder, reader: &mut R) -> Result<Value, CommandError>
where
    R: AsyncRead + Unpin,
{
    let mut value = redis::parse_redis_value_async(decoder, reader)
        .await
        .map_err(from_redis)?;
    while let Value::Attribute { data, .. } = value {
        value = *data;
    }
    Ok(value)
}

/// `CODE detail` text of an error reply.
pub fn server_message(value: &Value) -> Option<String> {
    match value {
        Value::ServerError(e) => Some(match e.details() {
            Some(detail) => format!("{} {}", e.code(), detail),
            None => e.code().to_string(),
        }),
        _ => None,
    }
}

fn from_redis(err: redis::RedisError) -> CommandError {
    if err.is_io_error() {
        let kind = std::error::Error::source(&err)
            .and_then(|source| source.downcast_ref::<io::Error>())
            .map_or(io::ErrorKind::Other, io::Error::kind);
        return CommandError::Io(io::Error::new(kind, err.to_string()));
    }
    ProtocolError::Malformed(err.to_string()).into()
}

/// Accessors over reply values.
pub trait ValueExt {
    /// Short name of the value's type, for diagnostics.
    fn kind(&self) -> &'static str;

    /// Returns true for both the RESP2 and RESP3 null.
    fn is_null(&self) -> bool;

    /// Raw bytes of a string-like value.
    fn as_bytes(&self) -> Option<&[u8]>;

    /// Text of a string-like value, replacing invalid UTF-8.
    fn as_text(&self) -> Option<String> {
        self.as_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Elements of an array, set or push.
    fn into_items(self) -> Option<Vec<Value>>;
}

impl ValueExt for Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Nil => "null",
            Value::Int(_) => "integer",
            Value::BulkString(_) => "bulk string",
            Value::Array(_) => "array",
            Value::SimpleString(_) | Value::Okay => "simple string",
            Value::Map(_) => "map",
            Value::Attribute { .. } => "attribute",
            Value::Set(_) => "set",
            Value::Double(_) => "double",
            Value::Boolean(_) => "boolean",
            Value::VerbatimString { .. } => "verbatim string",
            Value::BigNumber(_) => "big number",
            Value::Push { .. } => "push",
            Value::ServerError(_) => "error",
        }
    }

    fn is_null(&self) -> bool {
        matches!(self, Value::Nil)
    }

    fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::SimpleString(s) => Some(s.as_bytes()),
            Value::Okay => Some(b"OK"),
            Value::BulkString(b) => Some(b),
            Value::VerbatimString { text, .. } => Some(text.as_bytes()),
            _ => None,
        }
    }

    fn into_items(self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) | Value::Set(items) | Value::Push { data: items, .. } => {
                Some(items)
            }
            _ => None,
        }
    }
}
