//! Request/response message model and the wire frame shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ErrorObject;

/// A request message.
///
/// A request without an id is a notification: the remote side must not
/// answer it. Ids allocated by this peer are integers; ids received from
/// the daemon are treated as opaque JSON values and echoed verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id, absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Verb or routing key (a path or a fetcher id).
    pub method: String,
    /// Request parameters.
    pub params: Value,
}

impl Request {
    /// Builds an id-bearing request expecting exactly one response.
    #[must_use]
    pub fn with_id(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id: Some(Value::from(id)),
            method: method.into(),
            params,
        }
    }

    /// Builds a notification (no response expected).
    #[must_use]
    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self {
            id: None,
            method: method.into(),
            params,
        }
    }
}

impl From<Request> for Value {
    fn from(request: Request) -> Self {
        let mut map = Map::new();
        if let Some(id) = request.id {
            map.insert("id".to_owned(), id);
        }
        map.insert("method".to_owned(), Self::String(request.method));
        map.insert("params".to_owned(), request.params);
        Self::Object(map)
    }
}

/// A response message carrying either a result or an error, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Correlation id of the request being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// The result on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Response {
    /// Builds a success response.
    #[must_use]
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response.
    #[must_use]
    pub fn error(id: Value, error: ErrorObject) -> Self {
        Self {
            id: Some(id),
            result: None,
            error: Some(error),
        }
    }

    /// Whether the response carries a result rather than an error.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }
}

impl From<Response> for Value {
    fn from(response: Response) -> Self {
        let mut map = Map::new();
        if let Some(id) = response.id {
            map.insert("id".to_owned(), id);
        }
        if let Some(result) = response.result {
            map.insert("result".to_owned(), result);
        }
        if let Some(error) = response.error {
            map.insert("error".to_owned(), error.into());
        }
        Self::Object(map)
    }
}

/// Classification of a decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A method invocation or notification addressed to this peer.
    Request(Request),
    /// An answer to a request this peer issued.
    Response(Response),
    /// Anything that is neither: a protocol error to be logged and dropped.
    Other(Value),
}

impl Inbound {
    /// Classifies a decoded message by field shape.
    ///
    /// A message with `method` and `params` routes as a request; one with
    /// `result` or `error` routes as a response; everything else, including
    /// messages whose fields fail to parse, is [`Inbound::Other`].
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let Value::Object(map) = value else {
            return Self::Other(value);
        };
        if map.contains_key("method") && map.contains_key("params") {
            return classify_request(map);
        }
        if map.contains_key("result") || map.contains_key("error") {
            return classify_response(map);
        }
        Self::Other(Value::Object(map))
    }
}

fn classify_request(mut map: Map<String, Value>) -> Inbound {
    if !map.get("method").is_some_and(Value::is_string) {
        return Inbound::Other(Value::Object(map));
    }
    let (Some(Value::String(method)), Some(params)) = (map.remove("method"), map.remove("params"))
    else {
        return Inbound::Other(Value::Object(map));
    };
    Inbound::Request(Request {
        id: map.remove("id"),
        method,
        params,
    })
}

fn classify_response(mut map: Map<String, Value>) -> Inbound {
    let error = match map.get("error") {
        Some(raw) => match serde_json::from_value::<ErrorObject>(raw.clone()) {
            Ok(error) => Some(error),
            Err(_) => return Inbound::Other(Value::Object(map)),
        },
        None => None,
    };
    Inbound::Response(Response {
        id: map.remove("id"),
        result: map.remove("result"),
        error,
    })
}

/// One wire frame: a single message or an ordered batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Exactly one message, sent unwrapped.
    Single(Value),
    /// Two or more messages, sent as an ordered array.
    Batch(Vec<Value>),
}

impl Frame {
    /// Builds the outbound frame for a drained queue.
    ///
    /// Returns `None` for an empty queue so that flushing nothing stays a
    /// no-op.
    #[must_use]
    pub fn from_messages(mut messages: Vec<Value>) -> Option<Self> {
        match messages.len() {
            0 => None,
            1 => messages.pop().map(Self::Single),
            _ => Some(Self::Batch(messages)),
        }
    }

    /// Splits a decoded frame into individual messages.
    #[must_use]
    pub fn into_messages(self) -> Vec<Value> {
        match self {
            Self::Single(message) => vec![message],
            Self::Batch(messages) => messages,
        }
    }

    /// Interprets a decoded value as a frame: arrays are batches.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(messages) => Self::Batch(messages),
            other => Self::Single(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    fn serializes_request_without_id_as_notification() {
        let value = Value::from(Request::notification("change", json!({"path": "a"})));
        assert_eq!(value, json!({"method": "change", "params": {"path": "a"}}));
    }

    #[rstest]
    fn serializes_request_with_id() {
        let value = Value::from(Request::with_id(7, "add", json!({"path": "a"})));
        assert_eq!(value, json!({"id": 7, "method": "add", "params": {"path": "a"}}));
    }

    #[rstest]
    fn classifies_request_with_method_and_params() {
        let inbound = Inbound::from_value(json!({"method": "a/b", "params": {"value": 1}, "id": 3}));
        match inbound {
            Inbound::Request(request) => {
                assert_eq!(request.method, "a/b");
                assert_eq!(request.id, Some(json!(3)));
            }
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[rstest]
    #[case(json!({"id": 1, "result": true}))]
    #[case(json!({"id": 1, "error": {"code": -32601, "message": "Method not found"}}))]
    fn classifies_responses(#[case] raw: Value) {
        assert!(matches!(Inbound::from_value(raw), Inbound::Response(_)));
    }

    #[rstest]
    #[case(json!({"id": 1}))]
    #[case(json!({"method": "x"}))]
    #[case(json!(42))]
    #[case(json!({"id": 1, "error": "not an error object"}))]
    fn classifies_everything_else_as_other(#[case] raw: Value) {
        assert!(matches!(Inbound::from_value(raw), Inbound::Other(_)));
    }

    #[rstest]
    fn frame_from_messages_unwraps_singletons() {
        assert_eq!(Frame::from_messages(Vec::new()), None);
        assert_eq!(
            Frame::from_messages(vec![json!(1)]),
            Some(Frame::Single(json!(1)))
        );
        assert_eq!(
            Frame::from_messages(vec![json!(1), json!(2)]),
            Some(Frame::Batch(vec![json!(1), json!(2)]))
        );
    }

    #[rstest]
    fn frame_from_value_treats_arrays_as_batches() {
        let frame = Frame::from_value(json!([{"id": 1, "result": true}]));
        assert_eq!(frame.into_messages(), vec![json!({"id": 1, "result": true})]);
    }
}
