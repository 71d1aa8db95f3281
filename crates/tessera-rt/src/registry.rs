use crate::error::RuntimeError;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// One `(name, address)` binding published for generated code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSymbol {
    pub name: String,
    /// Address of the kernel. Stored as an integer so the registry is `Sync`.
    pub addr: usize,
}

impl RuntimeSymbol {
    pub fn ptr(&self) -> *const u8 {
        self.addr as *const u8
    }
}

#[derive(Default)]
struct Table {
    /// Registration order; engines bind symbols in this order.
    symbols: Vec<RuntimeSymbol>,
    index: FxHashMap<String, usize>,
}

/// Table of runtime kernels visible to JIT-compiled code.
///
/// Names are unique. Registering the same name twice is accepted only when
/// the address is identical, which keeps repeated initialization harmless.
pub struct RuntimeSymbolRegistry {
    table: RwLock<Table>,
}

static GLOBAL_REGISTRY: Lazy<RuntimeSymbolRegistry> = Lazy::new(RuntimeSymbolRegistry::new);

impl RuntimeSymbolRegistry {
    pub fn new() -> Self {
        Self { table: RwLock::new(Table::default()) }
    }

    /// The process-wide registry read by every execution engine at creation.
    pub fn global() -> &'static RuntimeSymbolRegistry {
        &GLOBAL_REGISTRY
    }

    pub fn register(&self, name: &str, ptr: *const u8) -> Result<(), RuntimeError> {
        if name.is_empty() {
            return Err(RuntimeError::EmptyName);
        }
        if ptr.is_null() {
            return Err(RuntimeError::NullAddress(name.to_string()));
        }
        let addr = ptr as usize;
        let mut table = self.table.write();
        if let Some(&slot) = table.index.get(name) {
            if table.symbols[slot].addr == addr {
                return Ok(());
            }
            return Err(RuntimeError::DuplicateSymbol(name.to_string()));
        }
        log::debug!("registering runtime symbol `{}` at {:#x}", name, addr);
        let slot = table.symbols.len();
        table.symbols.push(RuntimeSymbol { name: name.to_string(), addr });
        table.index.insert(name.to_string(), slot);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<*const u8> {
        let table = self.table.read();
        table.index.get(name).map(|&slot| table.symbols[slot].ptr())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.read().index.contains_key(name)
    }

    /// Snapshot of every binding in registration order.
    pub fn all(&self) -> Vec<RuntimeSymbol> {
        self.table.read().symbols.clone()
    }

    pub fn len(&self) -> usize {
        self.table.read().symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RuntimeSymbolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
