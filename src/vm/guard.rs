// nasvm/src/vm/guard.rs
//
// Copyright (c) 2025 Arcella Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

use serde::Deserialize;
use std::collections::BTreeSet;

use crate::error::{NasvmError, Result as NasvmResult};
use crate::vm::ActionKind;

/// Which actions need `--force`.
///
/// Defaults to `restart` and `halt`: both cut a running guest off without
/// asking it. `stop` (ACPI power button) and `shutdown` are not gated.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GuardPolicy {
    #[serde(default = "default_require_force")]
    require_force: BTreeSet<ActionKind>,
}

fn default_require_force() -> BTreeSet<ActionKind> {
    BTreeSet::from([ActionKind::Restart, ActionKind::Halt])
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self { require_force: default_require_force() }
    }
}

impl GuardPolicy {
    pub fn new(require_force: impl IntoIterator<Item = ActionKind>) -> Self {
        Self { require_force: require_force.into_iter().collect() }
    }

    pub fn requires_force(&self, kind: ActionKind) -> bool {
        self.require_force.contains(&kind)
    }

    /// Refuses a gated action unless `force` is set.
    pub fn check(&self, kind: ActionKind, force: bool) -> NasvmResult<()> {
        if force || !self.requires_force(kind) {
            return Ok(());
        }
        tracing::warn!(action = %kind, "Destructive action refused without --force");
        Err(NasvmError::ForceRequired { action: kind.to_string() })
    }
}
