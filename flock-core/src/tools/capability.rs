//! Capability tiers for tools
//!
//! A tool declares what it touches when it is registered. Privileged
//! capabilities are refused at resolution time unless the policy allows them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Something a tool may touch outside the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    FilesystemRead,
    FilesystemWrite,
    Network,
    Subprocess,
    Secrets,
    MemoryRead,
    MemoryWrite,
    LlmAccess,
}

impl Capability {
    const ALL: [Capability; 8] = [
        Capability::FilesystemRead,
        Capability::FilesystemWrite,
        Capability::Network,
        Capability::Subprocess,
        Capability::Secrets,
        Capability::MemoryRead,
        Capability::MemoryWrite,
        Capability::LlmAccess,
    ];

    pub fn all() -> &'static [Capability] {
        &Self::ALL
    }

    /// Reaches outside the process or holds credentials
    pub fn is_privileged(self) -> bool {
        matches!(
            self,
            Capability::FilesystemWrite
                | Capability::Network
                | Capability::Subprocess
                | Capability::Secrets
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::FilesystemRead => "filesystem_read",
            Capability::FilesystemWrite => "filesystem_write",
            Capability::Network => "network",
            Capability::Subprocess => "subprocess",
            Capability::Secrets => "secrets",
            Capability::MemoryRead => "memory_read",
            Capability::MemoryWrite => "memory_write",
            Capability::LlmAccess => "llm_access",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capabilities declared by one tool, serialized as a sorted list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn contains(&self, cap: Capability) -> bool {
        self.0.contains(&cap)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(Capability::as_str).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// Which capabilities resolved tools may hold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityPolicy {
    allowed: CapabilitySet,
}

impl Default for CapabilityPolicy {
    fn default() -> Self {
        Self::safe_only()
    }
}

impl CapabilityPolicy {
    /// Non-privileged capabilities only
    pub fn safe_only() -> Self {
        Self {
            allowed: Capability::all()
                .iter()
                .copied()
                .filter(|cap| !cap.is_privileged())
                .collect(),
        }
    }

    pub fn allow_all() -> Self {
        Self {
            allowed: Capability::all().iter().copied().collect(),
        }
    }

    pub fn allow(self, cap: Capability) -> Self {
        Self {
            allowed: self.allowed.iter().chain([cap]).collect(),
        }
    }

    pub fn deny(self, cap: Capability) -> Self {
        Self {
            allowed: self.allowed.iter().filter(|c| *c != cap).collect(),
        }
    }

    pub fn is_allowed(&self, cap: Capability) -> bool {
        self.allowed.contains(cap)
    }

    /// The subset of `required` this policy refuses, as an error when non-empty
    pub fn check_all(&self, required: &CapabilitySet) -> Result<(), CapabilitySet> {
        let refused: CapabilitySet = required.iter().filter(|cap| !self.is_allowed(*cap)).collect();
        if refused.is_empty() { Ok(()) } else { Err(refused) }
    }
}
