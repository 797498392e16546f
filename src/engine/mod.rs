//! The patch engine
//!
//! Target registry, declared-method locator, prologue injector and the
//! interception hook that ties them together.

pub mod config;
pub mod error;
pub mod hook;
pub mod injector;
pub mod locator;
pub mod registry;

// Re-export commonly used types
pub use config::{ConfigError, TimeoutDefaults};
pub use error::TransformError;
pub use hook::TimeoutTransformer;
pub use injector::{inject, PatchError};
pub use locator::{locate, LocateError, MethodHandle};
