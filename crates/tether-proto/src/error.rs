//! Wire error objects, reserved codes, and handler-failure normalization.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

/// The frame could not be decoded.
pub const PARSE_ERROR: i64 = -32700;
/// The message is not a valid request.
pub const INVALID_REQUEST: i64 = -32600;
/// No dispatcher is registered for the requested method.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// The parameters are invalid for the requested operation.
pub const INVALID_PARAMS: i64 = -32602;
/// A handler or the engine failed for a reason of its own.
pub const INTERNAL_ERROR: i64 = -32603;
/// Reserved for daemon-side response timeouts; never emitted by this peer.
pub const RESPONSE_TIMEOUT: i64 = -32001;
/// Synthesized locally when the connection closes with requests in flight.
pub const CONNECTION_CLOSED: i64 = -32000;

/// A structured protocol error carried inside an error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Reserved error code.
    pub code: i64,
    /// Human-readable summary.
    pub message: String,
    /// Optional detail payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    /// Builds an error object from its parts.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            code,
            message: message.into(),
            data,
        }
    }

    /// Parse Error (−32700).
    #[must_use]
    pub fn parse_error(data: Option<Value>) -> Self {
        Self::new(PARSE_ERROR, "Parse error", data)
    }

    /// Invalid Request (−32600).
    #[must_use]
    pub fn invalid_request(data: Option<Value>) -> Self {
        Self::new(INVALID_REQUEST, "Invalid Request", data)
    }

    /// Method Not Found (−32601), carrying the unknown method name.
    #[must_use]
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::new(
            METHOD_NOT_FOUND,
            "Method not found",
            Some(Value::String(method.into())),
        )
    }

    /// Invalid Params (−32602).
    #[must_use]
    pub fn invalid_params(data: Option<Value>) -> Self {
        Self::new(INVALID_PARAMS, "Invalid params", data)
    }

    /// Internal Error (−32603).
    #[must_use]
    pub fn internal_error(data: Option<Value>) -> Self {
        Self::new(INTERNAL_ERROR, "Internal error", data)
    }

    /// Connection Closed (−32000), synthesized for abandoned requests.
    #[must_use]
    pub fn connection_closed() -> Self {
        Self::new(CONNECTION_CLOSED, "Connection closed", None)
    }

    /// Normalizes an arbitrary failure value into an error object.
    ///
    /// A value already shaped `{code, message}` passes through unchanged;
    /// anything else becomes an Internal Error with the value as `data`.
    #[must_use]
    pub fn normalize(value: Value) -> Self {
        match serde_json::from_value::<Self>(value.clone()) {
            Ok(error) => error,
            Err(_) => Self::internal_error(Some(value)),
        }
    }
}

impl From<ErrorObject> for Value {
    fn from(error: ErrorObject) -> Self {
        let mut map = Map::new();
        map.insert("code".to_owned(), Self::from(error.code));
        map.insert("message".to_owned(), Self::String(error.message));
        if let Some(data) = error.data {
            map.insert("data".to_owned(), data);
        }
        Self::Object(map)
    }
}

/// Failure raised by a state or method handler.
///
/// Handlers report failure through `Result`; the dispatch boundary maps
/// whichever variant they return into a single error response.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HandlerError {
    /// A pre-shaped protocol error, passed through verbatim.
    #[error("{}", .0.message)]
    Rpc(ErrorObject),
    /// A plain failure message, wrapped as Internal Error with the message
    /// under `data.message`.
    #[error("{0}")]
    Message(String),
    /// An arbitrary failure value, wrapped as Internal Error with the value
    /// as `data`.
    #[error("handler failed")]
    Data(Value),
}

impl From<ErrorObject> for HandlerError {
    fn from(error: ErrorObject) -> Self {
        Self::Rpc(error)
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::Message(message.to_owned())
    }
}

impl From<HandlerError> for ErrorObject {
    fn from(failure: HandlerError) -> Self {
        match failure {
            HandlerError::Rpc(error) => error,
            HandlerError::Message(message) => {
                Self::internal_error(Some(json!({ "message": message })))
            }
            HandlerError::Data(value) => Self::normalize(value),
        }
    }
}
