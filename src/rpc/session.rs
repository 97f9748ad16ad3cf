// nasvm/src/rpc/session.rs
//
// Copyright (c) 2025 Arcella Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

//! One authenticated conversation with the NAS.
//!
//! A [`Session`] is only ever built from a successful handshake, so holding
//! one proves the server issued a session id. Calls are additionally refused
//! locally until `auth.login` has returned `true`.

use std::time::Duration;

use serde_json::Value;

use crate::error::{NasvmError, Result as NasvmResult};
use crate::rpc::protocol::{ConnectReply, ConnectRequest, MethodCall, Outcome};
use crate::rpc::transport::Transport;

pub const LOGIN_METHOD: &str = "auth.login";

pub struct Session<T: Transport> {
    transport: T,
    id: Value,
    authenticated: bool,
    recv_timeout: Duration,
}

impl<T: Transport> Session<T> {
    /// Performs the `connect`/`connected` exchange on a fresh transport.
    ///
    /// Any reply other than `connected` yields [`NasvmError::Handshake`];
    /// the transport is closed and nothing else is sent.
    pub async fn handshake(mut transport: T, recv_timeout: Duration) -> NasvmResult<Self> {
        let hello = serde_json::to_string(&ConnectRequest::default())?;
        transport.send(hello).await?;

        let reply = recv_bounded(&mut transport, recv_timeout).await?;
        tracing::trace!(%reply, "Handshake reply");

        let id = match ConnectReply::session_id(&reply) {
            Ok(id) => id,
            Err(reason) => {
                transport.close().await.ok();
                return Err(NasvmError::Handshake(reason));
            }
        };
        tracing::debug!(session = %id, "Connected");

        Ok(Self {
            transport,
            id,
            authenticated: false,
            recv_timeout,
        })
    }

    /// The server-issued session id, as sent by the server.
    pub fn id(&self) -> &Value {
        &self.id
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Sends `auth.login`. Only a literal `true` result counts as success.
    pub async fn login(&mut self, user: &str, password: &str, server: &str) -> NasvmResult<()> {
        tracing::debug!(session = %self.id, %user, "Calling {}", LOGIN_METHOD);
        let params = [Value::from(user), Value::from(password)];
        let reply = self.exchange(LOGIN_METHOD, &params).await?;

        match serde_json::from_str::<Value>(&reply)
            .ok()
            .and_then(|v| v.get("result").cloned())
        {
            Some(Value::Bool(true)) => {
                self.authenticated = true;
                Ok(())
            }
            _ => {
                tracing::debug!(%reply, "Login refused");
                Err(NasvmError::Auth {
                    user: user.to_string(),
                    server: server.to_string(),
                })
            }
        }
    }

    /// Issues one method call and classifies the reply.
    ///
    /// Fails locally with [`NasvmError::NotAuthenticated`] before login;
    /// otherwise only transport problems are errors, and every reply resolves
    /// to an [`Outcome`].
    pub async fn call(&mut self, method: &str, params: Vec<Value>) -> NasvmResult<Outcome> {
        if !self.authenticated {
            return Err(NasvmError::NotAuthenticated);
        }

        tracing::debug!(session = %self.id, %method, "Calling");
        let reply = self.exchange(method, &params).await?;
        tracing::trace!(%method, %reply, "Reply");

        let outcome = Outcome::from_reply(&reply);
        if let Outcome::Failure(reason) = &outcome {
            tracing::debug!(%method, %reason, "Call failed");
        }
        Ok(outcome)
    }

    /// Closes the underlying connection, ending the session.
    pub async fn close(mut self) -> NasvmResult<()> {
        tracing::debug!(session = %self.id, "Closing session");
        self.transport.close().await
    }

    async fn exchange(&mut self, method: &str, params: &[Value]) -> NasvmResult<String> {
        let frame = serde_json::to_string(&MethodCall::new(&self.id, method, params))?;
        self.transport.send(frame).await?;
        recv_bounded(&mut self.transport, self.recv_timeout).await
    }
}

async fn recv_bounded<T: Transport>(transport: &mut T, limit: Duration) -> NasvmResult<String> {
    tokio::time::timeout(limit, transport.recv())
        .await
        .map_err(|_| NasvmError::Timeout { seconds: limit.as_secs() })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::testing::ScriptedTransport;
    use serde_json::json;

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn logged_in(replies: &[&str]) -> (Session<ScriptedTransport>, ScriptedTransport) {
        let mut script = vec![r#"{"msg":"connected","session":"abc"}"#, r#"{"result":true}"#];
        script.extend_from_slice(replies);
        let transport = ScriptedTransport::new(&script);
        let probe = transport.clone();
        let mut session = Session::handshake(transport, TIMEOUT).await.unwrap();
        session.login("root", "secret", "nas").await.unwrap();
        (session, probe)
    }

    #[tokio::test]
    async fn test_handshake_extracts_session() {
        let transport = ScriptedTransport::new(&[r#"{"msg":"connected","session":"7d3c-11"}"#]);
        let probe = transport.clone();
        let session = Session::handshake(transport, TIMEOUT).await.unwrap();

        assert_eq!(session.id(), &json!("7d3c-11"));
        assert!(!session.is_authenticated());
        assert_eq!(
            probe.sent_json(),
            vec![json!({"msg": "connect", "version": "1", "support": ["1"]})]
        );
    }

    #[tokio::test]
    async fn test_handshake_rejected_sends_nothing_more() {
        let transport = ScriptedTransport::new(&[r#"{"msg":"failed"}"#, r#"{"result":true}"#]);
        let probe = transport.clone();

        let err = Session::handshake(transport, TIMEOUT).await.err().unwrap();
        assert!(matches!(err, NasvmError::Handshake(_)));
        assert_eq!(probe.sent().len(), 1);
        assert!(probe.is_closed());
    }

    #[tokio::test]
    async fn test_numeric_session_id_is_echoed() {
        let transport = ScriptedTransport::new(&[
            r#"{"msg":"connected","session":42}"#,
            r#"{"result":true}"#,
            r#"{"result":[]}"#,
        ]);
        let probe = transport.clone();
        let mut session = Session::handshake(transport, TIMEOUT).await.unwrap();
        assert_eq!(session.id(), &json!(42));

        session.login("root", "pw", "nas").await.unwrap();
        session.call("vm.query", vec![]).await.unwrap();

        let sent = probe.sent_json();
        assert_eq!(sent[1]["id"], json!(42));
        assert_eq!(
            sent[2],
            json!({"id": 42, "msg": "method", "method": "vm.query", "params": []})
        );
    }

    #[tokio::test]
    async fn test_login_sends_credentials_with_session_id() {
        let (_session, probe) = logged_in(&[]).await;
        let sent = probe.sent_json();
        assert_eq!(
            sent[1],
            json!({
                "id": "abc",
                "msg": "method",
                "method": "auth.login",
                "params": ["root", "secret"]
            })
        );
    }

    #[tokio::test]
    async fn test_login_failure() {
        let transport = ScriptedTransport::new(&[
            r#"{"msg":"connected","session":"abc"}"#,
            r#"{"result":false,"error":"bad creds"}"#,
        ]);
        let mut session = Session::handshake(transport, TIMEOUT).await.unwrap();
        let err = session.login("root", "wrong", "nas").await.unwrap_err();

        assert!(matches!(err, NasvmError::Auth { .. }));
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_login_truthy_but_not_true_is_failure() {
        let transport = ScriptedTransport::new(&[
            r#"{"msg":"connected","session":"abc"}"#,
            r#"{"result":"yes"}"#,
        ]);
        let mut session = Session::handshake(transport, TIMEOUT).await.unwrap();
        assert!(session.login("root", "pw", "nas").await.is_err());
    }

    #[tokio::test]
    async fn test_call_before_login_is_rejected_locally() {
        let transport = ScriptedTransport::new(&[r#"{"msg":"connected","session":"abc"}"#]);
        let probe = transport.clone();
        let mut session = Session::handshake(transport, TIMEOUT).await.unwrap();

        let err = session.call("vm.query", vec![]).await.unwrap_err();
        assert!(matches!(err, NasvmError::NotAuthenticated));
        assert_eq!(probe.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_call_classifies_replies() {
        let (mut session, probe) = logged_in(&[
            r#"{"result":[]}"#,
            r#"{"error":{"reason":"VM 9 does not exist"}}"#,
            r#"{"unexpected":1}"#,
        ])
        .await;

        assert_eq!(session.call("vm.query", vec![]).await.unwrap(), Outcome::Success(json!([])));
        assert_eq!(
            session.call("vm.stop", vec![json!(9)]).await.unwrap(),
            Outcome::Failure("VM 9 does not exist".into())
        );
        assert_eq!(
            session.call("vm.stop", vec![json!(10)]).await.unwrap(),
            Outcome::Failure("malformed response".into())
        );

        let sent = probe.sent_json();
        assert_eq!(sent.len(), 5);
        assert_eq!(
            sent[3],
            json!({"id": "abc", "msg": "method", "method": "vm.stop", "params": [9]})
        );
    }

    #[tokio::test]
    async fn test_closed_connection_is_transport_failure() {
        let (mut session, _probe) = logged_in(&[]).await;
        let err = session.call("vm.query", vec![]).await.unwrap_err();
        assert!(matches!(err, NasvmError::ConnectionClosed));
        assert!(err.is_fatal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_server_times_out() {
        let transport = ScriptedTransport::silent();
        let err = Session::handshake(transport, Duration::from_secs(3)).await.err().unwrap();
        assert!(matches!(err, NasvmError::Timeout { seconds: 3 }));
    }

    #[tokio::test]
    async fn test_close_closes_transport() {
        let (session, probe) = logged_in(&[]).await;
        session.close().await.unwrap();
        assert!(probe.is_closed());
    }
}
