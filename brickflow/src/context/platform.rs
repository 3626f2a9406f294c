//! Platform services injected into brick invocations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A capability the host platform may grant to bricks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformCapability {
    /// DOM access on the current page.
    Dom,
    /// Outbound HTTP requests.
    Http,
    /// Sandboxed script execution.
    Sandbox,
    /// User-facing notifications.
    Notifications,
    /// Page and mod state access.
    State,
}

impl fmt::Display for PlatformCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Dom => "dom",
            Self::Http => "http",
            Self::Sandbox => "sandbox",
            Self::Notifications => "notifications",
            Self::State => "state",
        };
        write!(f, "{name}")
    }
}

/// The capability-gated services bundle a brick receives.
///
/// The engine passes it through opaquely and only consults
/// [`PlatformServices::capabilities`] to gate bricks that declare
/// requirements.
#[cfg_attr(test, mockall::automock)]
pub trait PlatformServices: Send + Sync {
    /// Returns the platform name (e.g. `extension`, `page-editor`).
    fn platform_name(&self) -> String;

    /// Returns the capabilities this platform grants.
    fn capabilities(&self) -> Vec<PlatformCapability>;
}

/// A platform with a fixed capability set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticPlatform {
    name: String,
    capabilities: BTreeSet<PlatformCapability>,
}

impl StaticPlatform {
    /// Creates a platform with no capabilities.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: BTreeSet::new(),
        }
    }

    /// Creates a platform granting every capability.
    #[must_use]
    pub fn full(name: impl Into<String>) -> Self {
        Self::new(name).with_capabilities([
            PlatformCapability::Dom,
            PlatformCapability::Http,
            PlatformCapability::Sandbox,
            PlatformCapability::Notifications,
            PlatformCapability::State,
        ])
    }

    /// Adds a capability.
    #[must_use]
    pub fn with_capability(mut self, capability: PlatformCapability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    /// Adds several capabilities.
    #[must_use]
    pub fn with_capabilities(
        mut self,
        capabilities: impl IntoIterator<Item = PlatformCapability>,
    ) -> Self {
        self.capabilities.extend(capabilities);
        self
    }
}

impl Default for StaticPlatform {
    fn default() -> Self {
        Self::full("static")
    }
}

impl PlatformServices for StaticPlatform {
    fn platform_name(&self) -> String {
        self.name.clone()
    }

    fn capabilities(&self) -> Vec<PlatformCapability> {
        self.capabilities.iter().copied().collect()
    }
}
