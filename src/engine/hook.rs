//! Load-time interception hook

use std::sync::Arc;

use crate::engine::config::TimeoutDefaults;
use crate::engine::error::TransformError;
use crate::engine::injector;
use crate::engine::locator::{self, LocateError};
use crate::engine::registry;
use crate::pool::ClassPool;

/// Byte transformer driven by the target registry.
///
/// `transform` is a pure function of the pool sources, the defaults and
/// the class name. An unregistered name returns its input bytes unchanged
/// and never touches the pool. A registered name is resolved fresh by
/// name, patched and re-serialized; the host-supplied bytes of a
/// registered class are deliberately ignored so the patch always starts
/// from the pool's pristine view. That also makes repeat invocations
/// yield identical output: the injector detaches every unit it mutates,
/// so no patched state survives in the pool between calls.
pub struct TimeoutTransformer {
    defaults: TimeoutDefaults,
    pool: Arc<ClassPool>,
}

impl TimeoutTransformer {
    pub fn new(defaults: TimeoutDefaults, pool: Arc<ClassPool>) -> Self {
        Self { defaults, pool }
    }

    pub fn defaults(&self) -> TimeoutDefaults {
        self.defaults
    }

    /// Transforms one class presented at load time.
    ///
    /// For a registered class every failure is fatal and reported as a
    /// [`TransformError`] naming the class; there is no partial output.
    pub fn transform(
        &self,
        internal_name: &str,
        class_bytes: &[u8],
    ) -> Result<Vec<u8>, TransformError> {
        if !registry::is_target(internal_name) {
            return Ok(class_bytes.to_vec());
        }
        eprintln!("🔧 WEAVER: intercepted {}", internal_name);

        let handle = locator::locate(&self.pool, internal_name).map_err(|error| match error {
            LocateError::Unresolved { name, source } => {
                TransformError::UnitUnresolved { name, source }
            }
            LocateError::MethodNotFound { class, method } => {
                TransformError::MethodNotFound { name: class, method }
            }
        })?;

        let patched = injector::inject(handle, self.defaults).map_err(|source| {
            TransformError::Patch { name: internal_name.to_string(), source }
        })?;

        eprintln!(
            "✅ WEAVER: patched {} (connect={} ms, read={} ms)",
            internal_name,
            self.defaults.connect_millis(),
            self.defaults.read_millis()
        );
        Ok(patched)
    }
}
