// nasvm/src/rpc/testing.rs
//
// Copyright (c) 2025 Arcella Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

//! In-memory transport replaying canned server replies.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::error::{NasvmError, Result as NasvmResult};
use crate::rpc::transport::Transport;

#[derive(Default)]
struct Script {
    replies: VecDeque<String>,
    sent: Vec<String>,
    closed: bool,
    silent: bool,
}

/// Clones share the same script, so a test keeps one clone as a probe
/// after handing the other to a session.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new(replies: &[&str]) -> Self {
        let script = Script {
            replies: replies.iter().map(|r| r.to_string()).collect(),
            ..Default::default()
        };
        Self { inner: Arc::new(Mutex::new(script)) }
    }

    /// A peer that accepts frames but never answers.
    pub fn silent() -> Self {
        let script = Script { silent: true, ..Default::default() };
        Self { inner: Arc::new(Mutex::new(script)) }
    }

    pub fn sent(&self) -> Vec<String> {
        self.inner.lock().unwrap().sent.clone()
    }

    pub fn sent_json(&self) -> Vec<Value> {
        self.sent()
            .iter()
            .map(|frame| serde_json::from_str(frame).unwrap())
            .collect()
    }

    /// Method names of every `method` frame sent so far.
    pub fn methods(&self) -> Vec<String> {
        self.sent_json()
            .iter()
            .filter_map(|v| v.get("method").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }
}

impl Transport for ScriptedTransport {
    async fn send(&mut self, text: String) -> NasvmResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(NasvmError::ConnectionClosed);
        }
        inner.sent.push(text);
        Ok(())
    }

    async fn recv(&mut self) -> NasvmResult<String> {
        let next = {
            let mut inner = self.inner.lock().unwrap();
            if inner.silent {
                None
            } else {
                Some(inner.replies.pop_front().ok_or(NasvmError::ConnectionClosed))
            }
        };
        match next {
            Some(reply) => reply,
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> NasvmResult<()> {
        self.inner.lock().unwrap().closed = true;
        Ok(())
    }
}
