// nasvm/src/lib.rs
//
// Copyright (c) 2025 Arcella Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Client for the virtual machine API of a NAS appliance.
//!
//! The appliance exposes a JSON-RPC control plane over a websocket at
//! `ws://<server>/websocket`. [`rpc`] owns the connection, handshake and
//! login; [`vm`] maps VM lifecycle actions onto `vm.*` methods; [`commands`]
//! is the command-line front end.

pub mod commands;
pub mod config;
pub mod credentials;
pub mod error;
pub mod log;
pub mod rpc;
pub mod vm;

pub use error::{NasvmError, Result};
