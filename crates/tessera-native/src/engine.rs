use crate::cache::ObjectCache;
use crate::config::EngineOptions;
use crate::error::{EngineError, LinkError, VerifyError};
use crate::host::{build_isa, initialize, HostTarget};
use crate::optimizer::ModuleOptimizer;
use crate::runtime_support;
use crate::session::{Session, UnitCompiler};
use crate::translator::{CodeGen, Lowering};
use crate::unit::{DeclId, NativeUnit};
use crate::verify::verify_unit;
use cranelift_codegen::isa::OwnedTargetIsa;
use parking_lot::Mutex;
use std::sync::Arc;
use tessera_ir::Module;
use tessera_rt::RuntimeSymbolRegistry;

/// Counters describing what an engine has done so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Units committed to the session.
    pub units_linked: usize,
    /// Units whose machine code has been loaded.
    pub units_materialized: usize,
    /// Units run through the code generator (cache hits excluded).
    pub compilations: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
}

/// JIT execution engine: links intermediate modules and hands out native addresses.
///
/// Linking lowers, verifies and optimizes a module without holding any
/// lock; committing it and looking symbols up go through one session mutex.
/// Machine code for a unit is generated on the first lookup that needs it.
pub struct ExecutionEngine {
    options: EngineOptions,
    host: &'static HostTarget,
    isa: OwnedTargetIsa,
    optimizer: ModuleOptimizer,
    cache: Option<Arc<ObjectCache>>,
    session: Mutex<Session>,
}

impl ExecutionEngine {
    /// Creates an engine bound to the global runtime registry. Panics on failure.
    pub fn create(options: EngineOptions) -> Self {
        match Self::try_create(options) {
            Ok(engine) => engine,
            Err(err) => panic!("failed to create execution engine: {}", err),
        }
    }

    pub fn try_create(options: EngineOptions) -> Result<Self, EngineError> {
        Self::try_create_in(options, RuntimeSymbolRegistry::global(), None)
    }

    /// Creates an engine that shares `cache` with other engines.
    pub fn try_create_with_cache(options: EngineOptions, cache: Arc<ObjectCache>) -> Result<Self, EngineError> {
        Self::try_create_in(options, RuntimeSymbolRegistry::global(), Some(cache))
    }

    /// Creates an engine from an explicit registry and, optionally, an existing cache.
    ///
    /// `cache` is ignored when the options disable caching.
    pub fn try_create_in(
        options: EngineOptions,
        registry: &RuntimeSymbolRegistry,
        cache: Option<Arc<ObjectCache>>,
    ) -> Result<Self, EngineError> {
        let host = initialize().map_err(|e| EngineError::Host(e.to_string()))?;

        let cache = if options.enable_object_cache {
            Some(cache.unwrap_or_else(|| Arc::new(ObjectCache::new())))
        } else {
            None
        };

        let isa = build_isa(options.opt_level, options.verify)?;
        let mut session = Session::new(UnitCompiler::new(isa.clone(), cache.clone()));
        session.add_process_symbols();

        let symbols = registry.all();
        for symbol in &symbols {
            session.define_absolute(&symbol.name, symbol.ptr()).map_err(|reason| {
                log::error!("binding runtime symbol: {}", reason);
                EngineError::Binding(symbol.name.clone())
            })?;
        }

        let optimizer = ModuleOptimizer::new(options.opt_level, options.passes.clone())?;
        log::info!(
            "execution engine ready on {} ({} runtime symbols, object cache {})",
            host.triple,
            symbols.len(),
            if cache.is_some() { "on" } else { "off" }
        );

        Ok(Self { options, host, isa, optimizer, cache, session: Mutex::new(session) })
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn host(&self) -> &HostTarget {
        self.host
    }

    pub fn object_cache(&self) -> Option<&Arc<ObjectCache>> {
        self.cache.as_ref()
    }

    /// Links `module`. Returns `false` if the session rejects it.
    ///
    /// # Panics
    /// If lowering or verification fails. Those are compiler defects, not
    /// conditions a caller can recover from.
    pub fn link(&self, module: &Module) -> bool {
        match self.try_link(module) {
            Ok(()) => true,
            Err(err) if err.is_recoverable() => {
                log::error!("{}", err);
                false
            }
            Err(err) => panic!("internal code generation failure: {}", err),
        }
    }

    pub fn try_link(&self, module: &Module) -> Result<(), LinkError> {
        self.try_link_with(module, &mut CodeGen::new())
    }

    /// Links `module` using a caller-supplied code generator.
    pub fn try_link_with(&self, module: &Module, lowering: &mut dyn Lowering) -> Result<(), LinkError> {
        log::info!(
            "linking module `{}` ({} buffers, {} functions)",
            module.name,
            module.buffers.len(),
            module.functions.len()
        );
        let isa = self.isa.as_ref();
        let mut unit = NativeUnit::new(module.name.clone(), isa);
        runtime_support::load(&mut unit).map_err(LinkError::RuntimeSupport)?;

        for buffer in &module.buffers {
            let id = lowering
                .lower_buffer(&mut unit, buffer)
                .map_err(|source| LinkError::Codegen { module: module.name.clone(), source })?;
            self.log_function(&unit, id);
        }
        for function in &module.functions {
            let id = lowering
                .lower_function(&mut unit, function)
                .map_err(|source| LinkError::Codegen { module: module.name.clone(), source })?;
            self.log_function(&unit, id);
            verify_unit(&unit, isa).map_err(|source| verify_error(module, "function", source))?;
        }
        verify_unit(&unit, isa).map_err(|source| verify_error(module, "module", source))?;

        self.optimizer.apply(&mut unit);
        verify_unit(&unit, isa).map_err(|source| verify_error(module, "optimized", source))?;

        let mut session = self.session.lock();
        session
            .commit(unit)
            .map_err(|source| LinkError::Commit { module: module.name.clone(), source })?;
        log::trace!("{}", session.dump());
        Ok(())
    }

    fn log_function(&self, unit: &NativeUnit, id: DeclId) {
        let Some(func) = unit.module().function(id) else {
            return;
        };
        let name = &unit.context().decl(id).name;
        if self.options.dump_ir {
            log::info!("{} `{}`:\n{}", unit.identifier(), name, func.display());
        } else {
            log::debug!("{} `{}`:\n{}", unit.identifier(), name, func.display());
        }
    }

    /// Address of `name`, compiling its unit on first use.
    ///
    /// Misses are logged and return `None`; the engine stays usable.
    pub fn lookup(&self, name: &str) -> Option<*const u8> {
        let mut session = self.session.lock();
        match session.lookup(name) {
            Ok(Some(addr)) => Some(addr),
            Ok(None) => {
                log::error!("symbol `{}` not found", name);
                None
            }
            Err(err) => {
                log::error!("looking up `{}` failed: {}", name, err);
                None
            }
        }
    }

    /// Looks `name` up and reinterprets the address as `F`.
    ///
    /// # Safety
    /// `F` must be a function pointer type matching the symbol's native
    /// signature, with the `extern "C"` ABI.
    pub unsafe fn lookup_fn<F: Copy>(&self, name: &str) -> Option<F> {
        debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<*const u8>());
        self.lookup(name).map(|addr| std::mem::transmute_copy::<*const u8, F>(&addr))
    }

    pub fn stats(&self) -> EngineStats {
        let session = self.session.lock();
        EngineStats {
            units_linked: session.unit_count(),
            units_materialized: session.materialized_count(),
            compilations: session.compiler().compilations(),
            cache_hits: self.cache.as_ref().map_or(0, |c| c.hits()),
            cache_misses: self.cache.as_ref().map_or(0, |c| c.misses()),
        }
    }

    pub fn dump_session(&self) -> String {
        self.session.lock().dump()
    }
}

fn verify_error(module: &Module, stage: &'static str, source: VerifyError) -> LinkError {
    LinkError::Verify { module: module.name.clone(), stage, source }
}
