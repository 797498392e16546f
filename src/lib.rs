//! Timeout Weaver
//!
//! A load-time class patcher that forces default connect and read timeouts
//! into the JDK http(s) URL connection classes. Hosts that never call
//! `setConnectTimeout`/`setReadTimeout` otherwise hang forever on a dead
//! endpoint; the injected prologue applies a default exactly when the
//! current value is still the unset sentinel zero, so explicit caller
//! choices always win.
//!
//! ## Architecture
//!
//! - **classfile**: Class file parsing, in-memory model, serialization and structural verification
//! - **pool**: Shared class pool; sources supply raw bytes, leases hand out exclusive units
//! - **engine**: Target registry, `connect` locator, prologue injector and the interception hook
//! - **bin**: Command-line interface for patching exploded class trees on disk
//!
//! ## Patch Flow
//!
//! ```text
//! (name, bytes) → registry match → resolve from pool → locate connect → inject guards → new bytes
//!        ↓ (no match)
//!   bytes returned unchanged
//! ```

pub mod classfile;
pub mod engine;
pub mod pool;

pub use engine::{ConfigError, TimeoutDefaults, TimeoutTransformer, TransformError};
pub use pool::{ClassPool, PoolError};

use std::path::PathBuf;
use std::sync::Arc;

use pool::DirSource;

/// Builds a transformer whose pool reads `.class` files under `root`,
/// laid out by package the way an exploded jar is.
pub fn transformer_for_directory(
    root: impl Into<PathBuf>,
    defaults: TimeoutDefaults,
) -> TimeoutTransformer {
    let pool = ClassPool::with_source(Box::new(DirSource::new(root)));
    TimeoutTransformer::new(defaults, Arc::new(pool))
}
