//! Symbol resolution for generated code.
//!
//! A [`SymbolNamespace`] resolves names through an ordered [`ResolverChain`].
//! The first resolver is always the namespace's own [`AbsoluteSymbols`]
//! (runtime kernels bound at engine creation); fallback generators such as
//! [`ProcessSymbols`] follow in the order they were added. The first hit wins.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt::Write as _;
use std::sync::Arc;

/// Name of the namespace every engine resolves through.
pub const MAIN_NAMESPACE: &str = "<main>";

/// One strategy for turning a symbol name into an address.
pub trait SymbolResolver: Send + Sync {
    /// Short label used in logs and session dumps.
    fn name(&self) -> &'static str;

    fn resolve(&self, symbol: &str) -> Option<*const u8>;
}

/// Where a symbol was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub addr: *const u8,
    pub resolver: &'static str,
}

/// Symbols bound to fixed addresses.
#[derive(Default)]
pub struct AbsoluteSymbols {
    table: RwLock<FxHashMap<String, usize>>,
}

impl AbsoluteSymbols {
    /// Binds `name`. Rebinding to the same address is a no-op; to another address it fails.
    pub fn define(&self, name: &str, addr: *const u8) -> Result<(), String> {
        let mut table = self.table.write();
        match table.get(name) {
            Some(&existing) if existing == addr as usize => Ok(()),
            Some(&existing) => Err(format!(
                "`{}` is already bound to {:#x}, refusing {:#x}",
                name, existing, addr as usize
            )),
            None => {
                table.insert(name.to_string(), addr as usize);
                Ok(())
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bound names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.table.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl SymbolResolver for AbsoluteSymbols {
    fn name(&self) -> &'static str {
        "absolute"
    }

    fn resolve(&self, symbol: &str) -> Option<*const u8> {
        self.table.read().get(symbol).map(|&addr| addr as *const u8)
    }
}

/// Searches the exported symbols of the host process and the libraries it has loaded.
pub struct ProcessSymbols {
    #[cfg(unix)]
    this: libloading::os::unix::Library,
}

impl ProcessSymbols {
    pub fn new() -> Self {
        Self {
            #[cfg(unix)]
            this: libloading::os::unix::Library::this(),
        }
    }
}

impl Default for ProcessSymbols {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolResolver for ProcessSymbols {
    fn name(&self) -> &'static str {
        "process"
    }

    #[cfg(unix)]
    fn resolve(&self, symbol: &str) -> Option<*const u8> {
        // SAFETY: the symbol is only read as an address, never called here.
        let ptr = unsafe {
            self.this
                .get::<*const std::ffi::c_void>(symbol.as_bytes())
                .map(|sym| *sym)
                .ok()?
        };
        (!ptr.is_null()).then_some(ptr as *const u8)
    }

    #[cfg(not(unix))]
    fn resolve(&self, _symbol: &str) -> Option<*const u8> {
        None
    }
}

/// Resolvers tried in order; the first hit wins.
#[derive(Default)]
pub struct ResolverChain {
    resolvers: RwLock<Vec<Arc<dyn SymbolResolver>>>,
}

impl ResolverChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, resolver: Arc<dyn SymbolResolver>) {
        self.resolvers.write().push(resolver);
    }

    pub fn resolve(&self, symbol: &str) -> Option<Resolved> {
        self.resolvers.read().iter().find_map(|r| {
            r.resolve(symbol).map(|addr| Resolved { addr, resolver: r.name() })
        })
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.resolvers.read().iter().map(|r| r.name()).collect()
    }
}

/// A named symbol namespace: absolute bindings first, then fallback generators.
pub struct SymbolNamespace {
    name: String,
    absolutes: Arc<AbsoluteSymbols>,
    chain: ResolverChain,
}

impl SymbolNamespace {
    pub fn new(name: impl Into<String>) -> Self {
        let absolutes = Arc::new(AbsoluteSymbols::default());
        let chain = ResolverChain::new();
        chain.push(absolutes.clone());
        Self { name: name.into(), absolutes, chain }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn define_absolute(&self, symbol: &str, addr: *const u8) -> Result<(), String> {
        self.absolutes.define(symbol, addr)
    }

    pub fn absolutes(&self) -> &AbsoluteSymbols {
        &self.absolutes
    }

    /// Appends a fallback consulted after every earlier resolver missed.
    pub fn add_generator(&self, generator: Arc<dyn SymbolResolver>) {
        log::debug!("namespace {}: adding `{}` generator", self.name, generator.name());
        self.chain.push(generator);
    }

    pub fn resolve(&self, symbol: &str) -> Option<Resolved> {
        self.chain.resolve(symbol)
    }

    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "namespace {}: resolvers [{}], {} absolute symbols",
            self.name,
            self.chain.names().join(", "),
            self.absolutes.len()
        );
        for name in self.absolutes.names() {
            let _ = writeln!(out, "  absolute {}", name);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn fake_labs(_x: i64) -> i64 {
        -1
    }

    #[test]
    fn test_absolute_wins_over_process() {
        let ns = SymbolNamespace::new(MAIN_NAMESPACE);
        ns.add_generator(Arc::new(ProcessSymbols::new()));
        ns.define_absolute("labs", fake_labs as *const u8).unwrap();
        let resolved = ns.resolve("labs").unwrap();
        assert_eq!(resolved.addr, fake_labs as *const u8);
        assert_eq!(resolved.resolver, "absolute");
    }

    #[test]
    #[cfg(unix)]
    fn test_process_fallback_finds_libc() {
        let ns = SymbolNamespace::new(MAIN_NAMESPACE);
        ns.add_generator(Arc::new(ProcessSymbols::new()));
        let resolved = ns.resolve("labs").unwrap();
        assert_eq!(resolved.resolver, "process");
        assert!(!resolved.addr.is_null());
    }

    #[test]
    fn test_unknown_symbol_misses_every_resolver() {
        let ns = SymbolNamespace::new(MAIN_NAMESPACE);
        ns.add_generator(Arc::new(ProcessSymbols::new()));
        assert!(ns.resolve("__tessera_does_not_exist__").is_none());
    }

    #[test]
    fn test_rebinding_absolute() {
        let abs = AbsoluteSymbols::default();
        abs.define("k", fake_labs as *const u8).unwrap();
        abs.define("k", fake_labs as *const u8).unwrap();
        assert!(abs.define("k", 0x10 as *const u8).is_err());
        assert_eq!(abs.len(), 1);
    }

    #[test]
    fn test_chain_order_is_insertion_order() {
        let ns = SymbolNamespace::new("n");
        ns.add_generator(Arc::new(ProcessSymbols::new()));
        assert_eq!(ns.chain.names(), vec!["absolute", "process"]);
        assert!(ns.describe().contains("resolvers [absolute, process]"));
    }
}
