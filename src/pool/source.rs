//! Bytecode sources consulted by the class pool

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;

/// Supplies raw class bytes by internal name, e.g.
/// `sun/net/www/protocol/http/HttpURLConnection`.
///
/// `Ok(None)` means this source does not carry the class and the pool
/// moves on to the next one. `Err` aborts resolution.
pub trait BytecodeSource: Send + Sync {
    fn load(&self, internal_name: &str) -> io::Result<Option<Vec<u8>>>;
}

/// Loads `.class` files from a directory tree laid out by package, the
/// way an exploded jar is.
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl BytecodeSource for DirSource {
    fn load(&self, internal_name: &str) -> io::Result<Option<Vec<u8>>> {
        let path = self.root.join(format!("{}.class", internal_name));
        if !path.is_file() {
            return Ok(None);
        }
        eprintln!("✅ WEAVER: found class file {} at {}", internal_name, path.display());
        fs::read(path).map(Some)
    }
}

/// In-memory source, mainly for tests and for hosts that already hold the
/// bytes of the classes they want patched.
#[derive(Default)]
pub struct MemorySource {
    classes: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, internal_name: impl Into<String>, bytes: Vec<u8>) {
        self.classes.insert(internal_name.into(), bytes);
    }
}

impl BytecodeSource for MemorySource {
    fn load(&self, internal_name: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.classes.get(internal_name).cloned())
    }
}
