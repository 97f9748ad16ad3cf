// nasvm/src/rpc/mod.rs
//
// Copyright (c) 2025 Arcella Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Session and call layer of the NAS websocket JSON-RPC API.
//!
//! [`connect`] opens `ws://<server>/websocket`, performs the versioned
//! handshake, resolves a password and logs in. The returned [`Session`]
//! then serves one call at a time until it is closed.

pub mod protocol;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use protocol::Outcome;
pub use session::Session;
pub use transport::{Transport, WsTransport};

use crate::config::NasvmConfig;
use crate::credentials::{
    credential_key, resolve_password, CredentialStore, PasswordPrompt, PasswordRequest,
};
use crate::error::Result as NasvmResult;

/// Opens a websocket to the configured server and authenticates on it.
pub async fn connect(
    config: &NasvmConfig,
    store: &dyn CredentialStore,
    prompt: &dyn PasswordPrompt,
) -> NasvmResult<Session<WsTransport>> {
    let transport = WsTransport::connect(&config.server).await?;
    establish(transport, config, store, prompt).await
}

/// Handshake, password resolution and login over an already open transport.
///
/// The password is written back to `store` only after the server accepted it.
/// A store write failure is reported but does not invalidate the session.
pub async fn establish<T: Transport>(
    transport: T,
    config: &NasvmConfig,
    store: &dyn CredentialStore,
    prompt: &dyn PasswordPrompt,
) -> NasvmResult<Session<T>> {
    let mut session = Session::handshake(transport, config.timeout).await?;

    let request = PasswordRequest {
        user: &config.user,
        server: &config.server,
        explicit: config.password.as_deref(),
        force_prompt: config.force_prompt,
    };
    let password = match resolve_password(&request, store, prompt) {
        Ok(password) => password,
        Err(e) => {
            session.close().await.ok();
            return Err(e);
        }
    };

    if let Err(e) = session.login(&config.user, &password, &config.server).await {
        session.close().await.ok();
        return Err(e);
    }

    let key = credential_key(&config.user, &config.server);
    if let Err(e) = store.set(&key, &password) {
        tracing::warn!(%key, "Could not cache password: {}", e);
    }

    tracing::info!(
        session = %session.id(),
        user = %config.user,
        server = %config.server,
        "Authenticated"
    );
    Ok(session)
}
