// nasvm/src/commands/mod.rs
//
// Copyright (c) 2025 Arcella Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Command-line surface of nasvm.
//!
//! Each invocation opens one session, runs one command against it (once,
//! or once per VM id) and closes it again. Fatal errors are reported here
//! with a single message and turned into an exit status.

use clap::{ArgAction, Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;

use crate::config::{self, ConfigOverrides, NasvmConfig};
use crate::credentials::{
    CredentialStore, KeyringStore, MemoryStore, PasswordPrompt, TerminalPrompt,
};
use crate::error::{AnyResult, NasvmError, Result as NasvmResult};
use crate::log;
use crate::rpc::{self, Session, Transport, WsTransport};
use crate::vm::{self, LocalSignaller, ProcessSignaller, VmAction, VmId};

pub mod output;

pub const EXIT_OK: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_REFUSED: u8 = 2;

/// nasvm: manage virtual machines on a NAS through its websocket API
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// NAS host name or address (optionally host:port)
    #[arg(short, long, env = "NASVM_SERVER", global = true)]
    pub server: Option<String>,

    /// User to log in as (default: root)
    #[arg(short, long, env = "NASVM_USER", global = true)]
    pub user: Option<String>,

    /// Password; cached in the OS keyring after a successful login
    #[arg(short, long, env = "NASVM_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    /// Always prompt for the password, ignoring --password and the keyring
    #[arg(short = 'P', long = "prompt", global = true)]
    pub force_prompt: bool,

    /// Allow destructive actions (restart, halt by default)
    #[arg(short, long, global = true)]
    pub force: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (default: <config dir>/nasvm/config.toml)
    #[arg(long, env = "NASVM_CONFIG", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Seconds to wait for each server reply
    #[arg(long, env = "NASVM_TIMEOUT", value_name = "SECONDS", global = true)]
    pub timeout: Option<u64>,

    /// Do not read or write the OS keyring
    #[arg(long, global = true)]
    pub no_store: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct Targets {
    /// VM ids, processed in the given order
    #[arg(value_name = "ID", required = true)]
    pub ids: Vec<VmId>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List virtual machines
    List,
    /// Start virtual machines
    Start {
        #[command(flatten)]
        targets: Targets,
        /// Start even if the NAS reports insufficient free memory
        #[arg(long)]
        overcommit: bool,
    },
    /// Ask guests to power off (ACPI)
    Stop(Targets),
    /// Power off immediately (requires --force)
    Halt(Targets),
    /// Restart virtual machines (requires --force)
    Restart(Targets),
    /// Send SIGTERM to the VM process on THIS machine (pid from vm.status)
    Shutdown(Targets),
    /// Show state and pid
    Status(Targets),
    /// Show VNC port, resolution and web URL
    Vnc(Targets),
}

impl Commands {
    /// The per-VM action and its ids, or `None` for `list`.
    pub fn action(&self) -> Option<(VmAction, &[VmId])> {
        match self {
            Commands::List => None,
            Commands::Start { targets, overcommit } => {
                Some((VmAction::Start { overcommit: *overcommit }, targets.ids.as_slice()))
            }
            Commands::Stop(t) => Some((VmAction::Stop, t.ids.as_slice())),
            Commands::Halt(t) => Some((VmAction::Halt, t.ids.as_slice())),
            Commands::Restart(t) => Some((VmAction::Restart, t.ids.as_slice())),
            Commands::Shutdown(t) => Some((VmAction::Shutdown, t.ids.as_slice())),
            Commands::Status(t) => Some((VmAction::Status, t.ids.as_slice())),
            Commands::Vnc(t) => Some((VmAction::Vnc, t.ids.as_slice())),
        }
    }
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            server: self.server.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            force_prompt: self.force_prompt,
            timeout_secs: self.timeout,
            verbosity: self.verbose,
        }
    }
}

/// Collaborators an invocation needs besides the network.
pub struct Context<'a> {
    pub config: &'a NasvmConfig,
    pub store: &'a dyn CredentialStore,
    pub prompt: &'a dyn PasswordPrompt,
    pub signaller: &'a dyn ProcessSignaller,
}

/// Entry point used by `main`. Returns the process exit status.
pub async fn run(cli: Cli) -> AnyResult<u8> {
    let file = config::load(cli.config.as_deref()).await?;
    let config = NasvmConfig::resolve(file, cli.overrides())?;

    let _log_guard = log::init(&config.log)?;
    tracing::debug!("Starting nasvm v{}", env!("CARGO_PKG_VERSION"));

    let keyring = KeyringStore;
    let memory = MemoryStore::new();
    let store: &dyn CredentialStore = if cli.no_store { &memory } else { &keyring };

    let ctx = Context {
        config: &config,
        store,
        prompt: &TerminalPrompt,
        signaller: &LocalSignaller,
    };

    let mut stdout = std::io::stdout().lock();
    let mut stderr = std::io::stderr().lock();
    Ok(execute(&cli.command, cli.force, &ctx, &mut stdout, &mut stderr).await)
}

/// Runs one command against the configured server.
pub async fn execute(
    command: &Commands,
    force: bool,
    ctx: &Context<'_>,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> u8 {
    // Refuse before any network activity or password prompt.
    if let Some((action, _)) = command.action() {
        if let Err(e) = ctx.config.guard.check(action.kind(), force) {
            return report_fatal(&e, ctx.config, err);
        }
    }

    match WsTransport::connect(&ctx.config.server).await {
        Ok(transport) => execute_on(transport, command, force, ctx, out, err).await,
        Err(e) => report_fatal(&e, ctx.config, err),
    }
}

/// Same as [`execute`], over an already open transport.
pub async fn execute_on<T: Transport>(
    transport: T,
    command: &Commands,
    force: bool,
    ctx: &Context<'_>,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> u8 {
    let mut session = match rpc::establish(transport, ctx.config, ctx.store, ctx.prompt).await {
        Ok(session) => session,
        Err(e) => return report_fatal(&e, ctx.config, err),
    };

    let result = dispatch(&mut session, command, force, ctx, out, err).await;

    if let Err(e) = session.close().await {
        tracing::debug!("Error while closing session: {}", e);
    }

    match result {
        Ok(code) => code,
        Err(e) => report_fatal(&e, ctx.config, err),
    }
}

async fn dispatch<T: Transport>(
    session: &mut Session<T>,
    command: &Commands,
    force: bool,
    ctx: &Context<'_>,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> NasvmResult<u8> {
    let Some((action, ids)) = command.action() else {
        let vms = match vm::list_vms(session).await {
            Ok(vms) => vms,
            Err(e @ NasvmError::Rpc { .. }) => {
                writeln!(err, "{}", e)?;
                return Ok(EXIT_FAILURE);
            }
            Err(e) => return Err(e),
        };
        write!(out, "{}", output::format_vm_table(&vms))?;
        return Ok(EXIT_OK);
    };

    let report =
        vm::run_batch(session, action, ids, force, &ctx.config.guard, ctx.signaller).await?;
    for entry in &report.entries {
        match output::format_entry(report.action, entry) {
            Ok(line) => writeln!(out, "{}", line)?,
            Err(line) => writeln!(err, "{}", line)?,
        }
    }

    Ok(if report.all_succeeded() { EXIT_OK } else { EXIT_FAILURE })
}

/// Prints the one message a fatal error gets and picks the exit status.
fn report_fatal(error: &NasvmError, config: &NasvmConfig, err: &mut dyn Write) -> u8 {
    tracing::debug!("Fatal: {:?}", error);

    let (message, code) = match error {
        NasvmError::ForceRequired { .. } => (format!("Warning: {}", error), EXIT_REFUSED),
        NasvmError::Handshake(_) | NasvmError::Auth { .. } | NasvmError::EmptyPassword => {
            (error.to_string(), EXIT_FAILURE)
        }
        NasvmError::Transport(_)
        | NasvmError::ConnectionClosed
        | NasvmError::Timeout { .. } => (
            format!("Failed to communicate with {}: {}", config.server, error),
            EXIT_FAILURE,
        ),
        _ => (format!("Error: {}", error), EXIT_FAILURE),
    };

    // Nothing sensible is left to do if stderr itself is gone.
    let _ = writeln!(err, "{}", message);
    code
}
