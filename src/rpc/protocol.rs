// nasvm/src/rpc/protocol.rs
//
// Copyright (c) 2025 Arcella Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Wire messages of the NAS websocket API.
//!
//! Every frame is a text frame carrying one JSON object. The client opens
//! with a `connect` message, the server answers `connected` with a session
//! id, and from then on each `method` message gets exactly one reply.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The only protocol version this client speaks.
pub const PROTOCOL_VERSION: &str = "1";

/// Reason reported when a reply has neither `result` nor `error.reason`.
pub const MALFORMED_RESPONSE: &str = "malformed response";

/// Opening message of a connection.
#[derive(Serialize, Debug, Clone)]
pub struct ConnectRequest {
    pub msg: &'static str,
    pub version: &'static str,
    pub support: [&'static str; 1],
}

impl Default for ConnectRequest {
    fn default() -> Self {
        Self {
            msg: "connect",
            version: PROTOCOL_VERSION,
            support: [PROTOCOL_VERSION],
        }
    }
}

/// Server answer to [`ConnectRequest`].
#[derive(Deserialize, Debug, Clone)]
pub struct ConnectReply {
    pub msg: String,
    #[serde(default)]
    pub session: Option<Value>,
}

impl ConnectReply {
    /// Parses a handshake reply, returning the session id when the server accepted.
    ///
    /// The id is kept as the server sent it (string or number) and echoed back
    /// unchanged. Anything other than `{"msg":"connected","session":<id>}` with a
    /// non-null id is refused with a short human-readable reason.
    pub fn session_id(raw: &str) -> Result<Value, String> {
        let reply: ConnectReply = serde_json::from_str(raw)
            .map_err(|e| format!("unparseable handshake reply: {}", e))?;
        if reply.msg != "connected" {
            return Err(format!("server answered '{}' instead of 'connected'", reply.msg));
        }
        reply
            .session
            .filter(|id| !id.is_null())
            .ok_or_else(|| "handshake reply carries no session id".to_string())
    }
}

/// A method call. `id` is the session id, which doubles as the correlation id.
#[derive(Serialize, Debug, Clone)]
pub struct MethodCall<'a> {
    pub id: &'a Value,
    pub msg: &'static str,
    pub method: &'a str,
    pub params: &'a [Value],
}

impl<'a> MethodCall<'a> {
    pub fn new(id: &'a Value, method: &'a str, params: &'a [Value]) -> Self {
        Self {
            id,
            msg: "method",
            method,
            params,
        }
    }
}

/// Classified reply to a [`MethodCall`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The reply carried a `result` field (which may itself be `null`).
    Success(Value),
    /// The reply carried `error.reason`, or could not be understood.
    Failure(String),
}

impl Outcome {
    /// Classifies a raw reply frame. Never fails: anything unrecognised
    /// becomes `Failure("malformed response")`.
    pub fn from_reply(raw: &str) -> Self {
        let Ok(Value::Object(mut reply)) = serde_json::from_str::<Value>(raw) else {
            return Outcome::Failure(MALFORMED_RESPONSE.to_string());
        };

        if let Some(result) = reply.remove("result") {
            return Outcome::Success(result);
        }

        match reply
            .get("error")
            .and_then(|e| e.get("reason"))
            .and_then(Value::as_str)
        {
            Some(reason) => Outcome::Failure(reason.to_string()),
            None => Outcome::Failure(MALFORMED_RESPONSE.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connect_request_wire_shape() {
        let value = serde_json::to_value(ConnectRequest::default()).unwrap();
        assert_eq!(value, json!({"msg": "connect", "version": "1", "support": ["1"]}));
    }

    #[test]
    fn test_method_call_wire_shape() {
        let params = vec![json!(3), json!({"overcommit": true})];
        let id = json!("abc");
        let value = serde_json::to_value(MethodCall::new(&id, "vm.start", &params)).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "abc",
                "msg": "method",
                "method": "vm.start",
                "params": [3, {"overcommit": true}]
            })
        );
    }

    #[test]
    fn test_session_id_is_taken_verbatim() {
        let raw = r#"{"msg":"connected","session":"e4f1-99 ÄÖ"}"#;
        assert_eq!(ConnectReply::session_id(raw).unwrap(), json!("e4f1-99 ÄÖ"));
    }

    #[test]
    fn test_numeric_session_id_is_accepted() {
        let raw = r#"{"msg":"connected","session":42}"#;
        assert_eq!(ConnectReply::session_id(raw).unwrap(), json!(42));

        let id = json!(42);
        let value = serde_json::to_value(MethodCall::new(&id, "vm.query", &[])).unwrap();
        assert_eq!(value["id"], json!(42));
    }

    #[test]
    fn test_handshake_rejections() {
        assert!(ConnectReply::session_id(r#"{"msg":"failed","version":"1"}"#).is_err());
        assert!(ConnectReply::session_id(r#"{"msg":"connected"}"#).is_err());
        assert!(ConnectReply::session_id(r#"{"msg":"connected","session":null}"#).is_err());
        assert!(ConnectReply::session_id("not json").is_err());
        assert!(ConnectReply::session_id(r#"{"session":"abc"}"#).is_err());
    }

    #[test]
    fn test_outcome_success_variants() {
        assert_eq!(Outcome::from_reply(r#"{"result":true}"#), Outcome::Success(json!(true)));
        assert_eq!(Outcome::from_reply(r#"{"result":null}"#), Outcome::Success(Value::Null));
        assert_eq!(
            Outcome::from_reply(r#"{"id":"abc","msg":"result","result":[1,2]}"#),
            Outcome::Success(json!([1, 2]))
        );
    }

    #[test]
    fn test_outcome_result_wins_over_error() {
        let raw = r#"{"result":false,"error":{"reason":"ignored"}}"#;
        assert_eq!(Outcome::from_reply(raw), Outcome::Success(json!(false)));
    }

    #[test]
    fn test_outcome_error_reason() {
        let raw = r#"{"error":{"error":22,"reason":"[EINVAL] vm.start: VM is already running"}}"#;
        assert_eq!(
            Outcome::from_reply(raw),
            Outcome::Failure("[EINVAL] vm.start: VM is already running".into())
        );
    }

    #[test]
    fn test_outcome_malformed() {
        let replies = [
            "",
            "garbage",
            "[1,2]",
            r#"{"error":"flat string"}"#,
            r#"{"error":{"reason":5}}"#,
            "{}",
        ];
        for raw in replies {
            let outcome = Outcome::from_reply(raw);
            assert_eq!(outcome, Outcome::Failure(MALFORMED_RESPONSE.into()), "{raw}");
        }
    }
}
