// nasvm/src/main.rs
//
// Copyright (c) 2025 Arcella Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

use clap::Parser;
use std::process::ExitCode;

use nasvm::commands::{self, Cli};
use nasvm::error::AnyResult;

#[tokio::main(flavor = "current_thread")]
async fn main() -> AnyResult<ExitCode> {
    let cli = Cli::parse();
    let code = commands::run(cli).await?;
    Ok(ExitCode::from(code))
}
