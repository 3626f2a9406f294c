//! Execution context for brick invocations.
//!
//! This module provides:
//! - Immutable context snapshots that expressions resolve against
//! - Run identity used for trace correlation and state namespacing
//! - Root element references and the root resolution boundary
//! - The platform services bundle injected into every brick

mod identity;
mod platform;
mod root;
mod snapshot;

pub use identity::RunIdentity;
#[cfg(test)]
pub use platform::MockPlatformServices;
pub use platform::{PlatformCapability, PlatformServices, StaticPlatform};
pub use root::{ElementRef, RootMode, RootResolver, SelectorRootResolver};
pub use snapshot::BrickContext;

/// Context key holding the previous brick's output.
pub const INPUT_KEY: &str = "@input";
/// Context key holding the mod options.
pub const OPTIONS_KEY: &str = "@options";
/// Context key holding the mod variable snapshot.
pub const MOD_KEY: &str = "@mod";
/// Context key holding run metadata.
pub const RUN_KEY: &str = "@run";
/// Context key holding the caught error inside an except branch.
pub const ERROR_KEY: &str = "@error";
