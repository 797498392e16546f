//! Declared-method lookup on resolved units

use thiserror::Error;

use crate::classfile::{ClassFile, MethodInfo};
use crate::engine::registry::TARGET_METHOD;
use crate::pool::{ClassLease, ClassPool, PoolError};

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("could not resolve {name}")]
    Unresolved {
        name: String,
        #[source]
        source: PoolError,
    },

    #[error("{class} does not declare {method}")]
    MethodNotFound { class: String, method: &'static str },
}

/// A located `connect` declaration together with the lease it lives on.
#[derive(Debug)]
pub struct MethodHandle<'pool> {
    pub(crate) lease: ClassLease<'pool>,
    pub(crate) method_index: usize,
}

impl MethodHandle<'_> {
    pub fn class_file(&self) -> &ClassFile {
        self.lease.unit()
    }

    pub fn method(&self) -> &MethodInfo {
        &self.lease.unit().methods[self.method_index]
    }

    pub fn method_index(&self) -> usize {
        self.method_index
    }
}

/// Finds the `connect` method declared directly on `name`.
///
/// Only declarations on the class itself count. A class that merely
/// inherits `connect` from a superclass reports `MethodNotFound`; patching
/// it would re-declare the method instead of amending the inherited body.
/// The returned error drops the lease, so an unpatched unit re-attaches to
/// the pool untouched.
pub fn locate<'pool>(pool: &'pool ClassPool, name: &str) -> Result<MethodHandle<'pool>, LocateError> {
    let lease = pool
        .resolve(name)
        .map_err(|source| LocateError::Unresolved { name: name.to_string(), source })?;
    match lease.unit().declared_method(TARGET_METHOD) {
        Some(method_index) => Ok(MethodHandle { lease, method_index }),
        None => Err(LocateError::MethodNotFound {
            class: name.to_string(),
            method: TARGET_METHOD,
        }),
    }
}
