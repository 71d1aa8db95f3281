//! In-memory cache of compiled objects.
//!
//! Entries are keyed by unit identifier and remember the content digest of
//! the unit they were compiled from. A fetch with a different digest is a
//! miss, so two different modules sharing an identifier never receive each
//! other's code. Entries are never evicted.

use crate::unit::DeclId;
use cranelift_codegen::binemit::{Addend, CodeOffset, Reloc};
use cranelift_codegen::ir::{KnownSymbol, LibCall};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Relocation target recorded against the unit's own declarations, so the
/// object can be loaded into any session holding a unit with the same digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelocTarget {
    /// A declaration of the unit.
    Decl(DeclId),
    LibCall(LibCall),
    KnownSymbol(KnownSymbol),
    /// An offset inside the function itself.
    SelfOffset(CodeOffset),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocRecord {
    pub offset: CodeOffset,
    pub kind: Reloc,
    pub target: RelocTarget,
    pub addend: Addend,
}

/// Machine code of one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledFunction {
    pub decl: DeclId,
    /// Symbol name, for logs.
    pub name: String,
    pub alignment: u64,
    pub code: Vec<u8>,
    pub relocs: Vec<RelocRecord>,
}

/// Machine code of a whole unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledObject {
    pub functions: Vec<CompiledFunction>,
}

impl CompiledObject {
    pub fn code_size(&self) -> usize {
        self.functions.iter().map(|f| f.code.len()).sum()
    }
}

struct CacheEntry {
    digest: u64,
    object: CompiledObject,
}

#[derive(Default)]
pub struct ObjectCache {
    entries: Mutex<FxHashMap<String, CacheEntry>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl ObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the entry for `identifier`.
    pub fn store(&self, identifier: &str, digest: u64, object: CompiledObject) {
        log::debug!(
            "caching object for `{}` ({} functions, {} bytes)",
            identifier,
            object.functions.len(),
            object.code_size()
        );
        self.entries.lock().insert(identifier.to_string(), CacheEntry { digest, object });
    }

    /// A copy of the cached object, if one exists for exactly this content.
    pub fn fetch(&self, identifier: &str, digest: u64) -> Option<CompiledObject> {
        let entries = self.entries.lock();
        match entries.get(identifier) {
            Some(entry) if entry.digest == digest => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                log::debug!("object cache hit for `{}`", identifier);
                Some(entry.object.clone())
            }
            Some(entry) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                log::debug!(
                    "stale object cache entry for `{}` (digest {:#018x}, wanted {:#018x})",
                    identifier,
                    entry.digest,
                    digest
                );
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                log::debug!("object cache miss for `{}`", identifier);
                None
            }
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
