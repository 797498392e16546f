//! Shared class pool with attach-based caching
//!
//! Resolution hands out an exclusive [`ClassLease`]. When a lease is
//! dropped its unit re-attaches to the pool, so later resolutions of the
//! same name see accumulated edits instead of a fresh copy from the
//! sources. [`ClassLease::detach`] is the opt-out: it consumes the lease
//! and the unit never returns to the pool. The patch pipeline detaches
//! every unit it mutates, which keeps one patched class from bleeding
//! into a later resolution of the same name.

use std::fmt;
use std::mem;

use dashmap::DashMap;
use thiserror::Error;

use crate::classfile::{ClassFile, ClassReader, ReadError};

pub mod source;

pub use source::{BytecodeSource, DirSource, MemorySource};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("class {name} not found in any source")]
    NotFound { name: String },

    #[error("failed to load bytes for {name}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("class {name} is malformed")]
    Malformed {
        name: String,
        #[source]
        source: ReadError,
    },
}

/// Ordered sources plus the attach cache. Safe to share across threads;
/// each named unit is still held by at most one lease at a time because
/// resolution removes it from the cache.
pub struct ClassPool {
    sources: Vec<Box<dyn BytecodeSource>>,
    attached: DashMap<String, ClassFile>,
}

impl ClassPool {
    pub fn new() -> Self {
        Self { sources: Vec::new(), attached: DashMap::new() }
    }

    pub fn with_source(source: Box<dyn BytecodeSource>) -> Self {
        let mut pool = Self::new();
        pool.add_source(source);
        pool
    }

    /// Sources are consulted in insertion order.
    pub fn add_source(&mut self, source: Box<dyn BytecodeSource>) {
        self.sources.push(source);
    }

    /// Resolves a class into an exclusive lease. An attached unit wins over
    /// the sources, so a resolve/drop/resolve sequence observes the same
    /// unit rather than re-reading bytes.
    pub fn resolve(&self, name: &str) -> Result<ClassLease<'_>, PoolError> {
        if let Some((cached_name, unit)) = self.attached.remove(name) {
            return Ok(ClassLease { pool: self, name: cached_name, unit: Some(unit) });
        }
        for source in &self.sources {
            match source.load(name) {
                Ok(Some(bytes)) => {
                    let unit = ClassReader::new(&bytes).parse().map_err(|error| {
                        PoolError::Malformed { name: name.to_string(), source: error }
                    })?;
                    return Ok(ClassLease { pool: self, name: name.to_string(), unit: Some(unit) });
                }
                Ok(None) => continue,
                Err(error) => {
                    return Err(PoolError::Io { name: name.to_string(), source: error })
                }
            }
        }
        eprintln!("⚠️  WEAVER: {} not found in any source", name);
        Err(PoolError::NotFound { name: name.to_string() })
    }

    pub fn attach(&self, name: impl Into<String>, unit: ClassFile) {
        self.attached.insert(name.into(), unit);
    }

    pub fn is_attached(&self, name: &str) -> bool {
        self.attached.contains_key(name)
    }

    pub fn attached_len(&self) -> usize {
        self.attached.len()
    }
}

impl Default for ClassPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive hold on a resolved unit.
pub struct ClassLease<'pool> {
    pool: &'pool ClassPool,
    name: String,
    unit: Option<ClassFile>,
}

impl ClassLease<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &ClassFile {
        match &self.unit {
            Some(unit) => unit,
            // The slot only empties when the lease is consumed or dropped.
            None => unreachable!("lease without unit"),
        }
    }

    /// Takes the unit out of the lease. It will not re-attach to the pool,
    /// so the next resolution of this name starts from the sources again.
    pub fn detach(mut self) -> ClassFile {
        match self.unit.take() {
            Some(unit) => unit,
            None => unreachable!("lease without unit"),
        }
    }
}

impl fmt::Debug for ClassLease<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The pool reference carries no Debug impl; name and unit identify the lease.
        f.debug_struct("ClassLease")
            .field("name", &self.name)
            .field("unit", &self.unit)
            .finish_non_exhaustive()
    }
}

impl Drop for ClassLease<'_> {
    fn drop(&mut self) {
        if let Some(unit) = self.unit.take() {
            self.pool.attach(mem::take(&mut self.name), unit);
        }
    }
}
