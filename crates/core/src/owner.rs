// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity of the process claiming locks

use serde::{Deserialize, Serialize};

/// Opaque holder identity, written as the value of every claimed key
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerToken(pub String);

impl OwnerToken {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// `<hostname>-<pid>`, or a random UUID when the hostname is unreadable
    pub fn for_process() -> Self {
        let pid = std::process::id();
        match hostname::get() {
            Ok(host) if !host.is_empty() => Self(format!("{}-{}", host.to_string_lossy(), pid)),
            _ => Self(format!("{}-{}", uuid::Uuid::new_v4(), pid)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Display for OwnerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OwnerToken {
    fn from(s: &str) -> Self {
        OwnerToken(s.to_string())
    }
}

impl From<String> for OwnerToken {
    fn from(s: String) -> Self {
        OwnerToken(s)
    }
}
