//! Logical command alias table.
//!
//! Registry entries may name a logical command (`node`, `python`) that the
//! host maps to a concrete executable, e.g. a bundled interpreter. Unknown
//! commands pass through unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Logical command → executable path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandAliases {
    aliases: BTreeMap<String, String>,
}

impl CommandAliases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an alias.
    #[must_use]
    pub fn with_alias(mut self, command: impl Into<String>, executable: impl Into<String>) -> Self {
        self.insert(command, executable);
        self
    }

    pub fn insert(&mut self, command: impl Into<String>, executable: impl Into<String>) {
        self.aliases.insert(command.into(), executable.into());
    }

    /// Resolve `command` through the table.
    pub fn resolve<'a>(&'a self, command: &'a str) -> &'a str {
        self.aliases.get(command).map_or(command, String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }
}

impl FromIterator<(String, String)> for CommandAliases {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            aliases: iter.into_iter().collect(),
        }
    }
}
