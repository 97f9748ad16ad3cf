// nasvm/src/credentials/mod.rs
//
// Copyright (c) 2025 Arcella Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Password sources for `auth.login`.
//!
//! Passwords are cached in OS secret storage under the service
//! [`SERVICE_NAME`] and the key `<user>@<server>`, so only the first
//! successful login of a user on a server needs a prompt.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{NasvmError, Result as NasvmResult};

/// Service name under which passwords are stored.
pub const SERVICE_NAME: &str = "nasvm";

/// Builds the credential key for a user on a server.
pub fn credential_key(user: &str, server: &str) -> String {
    format!("{}@{}", user, server)
}

/// Persistent password cache.
pub trait CredentialStore {
    /// Looks up a cached password. `Ok(None)` means no entry.
    fn get(&self, key: &str) -> NasvmResult<Option<String>>;

    /// Stores a password, replacing any previous value.
    fn set(&self, key: &str, password: &str) -> NasvmResult<()>;
}

/// [`CredentialStore`] backed by the platform keyring (Keychain,
/// Credential Manager, Secret Service).
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringStore;

impl CredentialStore for KeyringStore {
    fn get(&self, key: &str) -> NasvmResult<Option<String>> {
        let entry = keyring::Entry::new(SERVICE_NAME, key)?;
        match entry.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, password: &str) -> NasvmResult<()> {
        keyring::Entry::new(SERVICE_NAME, key)?.set_password(password)?;
        Ok(())
    }
}

/// Process-local store. Used by `--no-store` and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, password: &str) -> Self {
        let store = Self::new();
        if let Ok(mut entries) = store.entries.lock() {
            entries.insert(key.to_string(), password.to_string());
        }
        store
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: &str) -> NasvmResult<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| NasvmError::Internal("credential map poisoned".into()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, password: &str) -> NasvmResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| NasvmError::Internal("credential map poisoned".into()))?;
        entries.insert(key.to_string(), password.to_string());
        Ok(())
    }
}

/// Blocking secret input.
pub trait PasswordPrompt {
    fn prompt(&self, message: &str) -> NasvmResult<String>;
}

/// Reads from the controlling terminal without echo.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl PasswordPrompt for TerminalPrompt {
    fn prompt(&self, message: &str) -> NasvmResult<String> {
        Ok(rpassword::prompt_password(message)?)
    }
}

/// What the invocation knows about the password before looking anywhere.
#[derive(Debug, Clone, Default)]
pub struct PasswordRequest<'a> {
    pub user: &'a str,
    pub server: &'a str,
    pub explicit: Option<&'a str>,
    pub force_prompt: bool,
}

/// Picks the login password: forced prompt, then the explicit argument,
/// then the cached entry, then an interactive prompt.
///
/// A prompt answered with an empty string is [`NasvmError::EmptyPassword`].
/// An unreadable store is logged and treated like a missing entry.
pub fn resolve_password(
    request: &PasswordRequest<'_>,
    store: &dyn CredentialStore,
    prompt: &dyn PasswordPrompt,
) -> NasvmResult<String> {
    let ask = || -> NasvmResult<String> {
        let message = format!("Password for {}: ", credential_key(request.user, request.server));
        let password = prompt.prompt(&message)?;
        if password.is_empty() {
            return Err(NasvmError::EmptyPassword);
        }
        Ok(password)
    };

    if request.force_prompt {
        return ask();
    }

    if let Some(password) = request.explicit {
        return Ok(password.to_string());
    }

    let key = credential_key(request.user, request.server);
    match store.get(&key) {
        Ok(Some(password)) => {
            tracing::debug!(%key, "Using cached password");
            return Ok(password);
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(%key, "Credential lookup failed: {}", e),
    }

    ask()
}
