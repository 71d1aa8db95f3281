//! The compilation session shared by every link and lookup of one engine.
//!
//! Committed units are only declared in the loader. Machine code is produced
//! the first time one of a unit's symbols is looked up, together with every
//! still-pending unit it calls into.

use crate::cache::{CompiledFunction, CompiledObject, ObjectCache, RelocRecord, RelocTarget};
use crate::error::{CommitError, NativeError};
use crate::resolver::{ProcessSymbols, SymbolNamespace, MAIN_NAMESPACE};
use crate::unit::{DeclId, DeclKind, NativeContext, NativeUnit};
use cranelift_codegen::control::ControlPlane;
use cranelift_codegen::ir::{ExternalName, Function, LibCall, Signature, UserExternalName};
use cranelift_codegen::isa::OwnedTargetIsa;
use cranelift_codegen::{Context, FinalizedMachReloc, FinalizedRelocTarget};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, FuncId, FuncOrDataId, Linkage, Module};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt::Write as _;
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub type UnitId = usize;

/// Compiles units to relocatable objects, going through the object cache when there is one.
pub struct UnitCompiler {
    isa: OwnedTargetIsa,
    cache: Option<Arc<ObjectCache>>,
    compilations: AtomicUsize,
}

impl UnitCompiler {
    pub fn new(isa: OwnedTargetIsa, cache: Option<Arc<ObjectCache>>) -> Self {
        Self { isa, cache, compilations: AtomicUsize::new(0) }
    }

    /// Number of units actually run through the code generator.
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::Relaxed)
    }

    pub fn compile(&self, unit: &NativeUnit, digest: u64) -> Result<CompiledObject, NativeError> {
        if let Some(object) = self.cache.as_ref().and_then(|c| c.fetch(unit.identifier(), digest)) {
            return Ok(object);
        }
        let object = self.compile_uncached(unit)?;
        if let Some(cache) = &self.cache {
            cache.store(unit.identifier(), digest, object.clone());
        }
        Ok(object)
    }

    fn compile_uncached(&self, unit: &NativeUnit) -> Result<CompiledObject, NativeError> {
        self.compilations.fetch_add(1, Ordering::Relaxed);
        log::debug!("compiling unit `{}` for {}", unit.identifier(), self.isa.triple());

        let decls = unit.context();
        let mut ctx = Context::new();
        let mut functions = Vec::with_capacity(unit.module().len());
        for (id, func) in unit.module().functions() {
            ctx.clear();
            ctx.func = func.clone();
            let compiled = ctx
                .compile(self.isa.as_ref(), &mut ControlPlane::default())
                .map_err(|e| e.inner)?;
            let relocs = compiled
                .buffer
                .relocs()
                .iter()
                .map(|r| symbolic_reloc(r, func, decls))
                .collect::<Result<Vec<_>, _>>()?;
            functions.push(CompiledFunction {
                decl: id,
                name: decls.decl(id).name.clone(),
                alignment: compiled.buffer.alignment as u64,
                code: compiled.code_buffer().to_vec(),
                relocs,
            });
        }
        Ok(CompiledObject { functions })
    }
}

/// Detaches a relocation from `func`'s external-name table so it can be cached.
fn symbolic_reloc(
    reloc: &FinalizedMachReloc,
    func: &Function,
    decls: &NativeContext,
) -> Result<RelocRecord, NativeError> {
    let target = match &reloc.target {
        FinalizedRelocTarget::ExternalName(ExternalName::User(name_ref)) => {
            let user = &func.params.user_named_funcs()[*name_ref];
            if decls.try_decl(user.index).is_none() {
                return Err(NativeError::CompilationError(format!("dangling reference u0:{}", user.index)));
            }
            RelocTarget::Decl(DeclId::from_u32(user.index))
        }
        FinalizedRelocTarget::ExternalName(ExternalName::LibCall(libcall)) => RelocTarget::LibCall(*libcall),
        FinalizedRelocTarget::ExternalName(ExternalName::KnownSymbol(sym)) => RelocTarget::KnownSymbol(*sym),
        FinalizedRelocTarget::ExternalName(ExternalName::TestCase(name)) => {
            return Err(NativeError::CompilationError(format!("unexpected test-case reference {}", name)))
        }
        FinalizedRelocTarget::Func(offset) => RelocTarget::SelfOffset(*offset),
    };
    Ok(RelocRecord { offset: reloc.offset, kind: reloc.kind, target, addend: reloc.addend })
}

/// Creates the loader for compiled code, resolving through `namespace`.
fn create_loader(isa: OwnedTargetIsa, namespace: Arc<SymbolNamespace>) -> JITModule {
    let mut builder = JITBuilder::with_isa(isa, default_libcall_names());
    builder.symbol_lookup_fn(Box::new(move |name| namespace.resolve(name).map(|r| r.addr)));
    JITModule::new(builder)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum UnitState {
    Pending,
    Materialized,
    Failed(String),
}

struct CommittedUnit {
    unit: NativeUnit,
    digest: u64,
    /// Loader id of every declaration, indexed by `DeclId`.
    func_ids: Vec<FuncId>,
    state: UnitState,
}

pub struct Session {
    jit: ManuallyDrop<JITModule>,
    compiler: UnitCompiler,
    main: Arc<SymbolNamespace>,
    units: Vec<CommittedUnit>,
    /// Exported name to the unit defining it.
    owners: FxHashMap<String, UnitId>,
    libcall_names: Box<dyn Fn(LibCall) -> String + Send + Sync>,
}

// SAFETY: the loader owns its code memory outright and the raw pointers inside
// it are never shared; the engine only touches the session under its mutex.
unsafe impl Send for Session {}

impl Session {
    pub fn new(compiler: UnitCompiler) -> Self {
        log::debug!("creating symbol namespace {}", MAIN_NAMESPACE);
        let main = Arc::new(SymbolNamespace::new(MAIN_NAMESPACE));
        let jit = create_loader(compiler.isa.clone(), main.clone());
        Self {
            jit: ManuallyDrop::new(jit),
            compiler,
            main,
            units: Vec::new(),
            owners: FxHashMap::default(),
            libcall_names: default_libcall_names(),
        }
    }

    pub fn compiler(&self) -> &UnitCompiler {
        &self.compiler
    }

    /// Installs the host-process fallback on the main namespace.
    pub fn add_process_symbols(&mut self) {
        self.main.add_generator(Arc::new(ProcessSymbols::new()));
    }

    pub fn define_absolute(&mut self, name: &str, addr: *const u8) -> Result<(), String> {
        if self.owners.contains_key(name) {
            return Err(format!("`{}` is already defined by a committed unit", name));
        }
        self.main.define_absolute(name, addr)
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn materialized_count(&self) -> usize {
        self.units.iter().filter(|u| u.state == UnitState::Materialized).count()
    }

    /// Takes ownership of `unit` and declares its symbols.
    ///
    /// Nothing is declared unless every check passes, so a rejected unit
    /// leaves the session exactly as it was.
    pub fn commit(&mut self, unit: NativeUnit) -> Result<UnitId, CommitError> {
        for (_, decl) in unit.context().decls() {
            match decl.kind {
                DeclKind::Export => {
                    if let Some(&owner) = self.owners.get(&decl.name) {
                        return Err(CommitError::DuplicateSymbol {
                            symbol: decl.name.clone(),
                            owner: self.units[owner].unit.identifier().to_string(),
                        });
                    }
                    if self.main.absolutes().contains(&decl.name) {
                        return Err(CommitError::AbsoluteSymbolClash(decl.name.clone()));
                    }
                    self.check_signature(&decl.name, &decl.signature)?;
                }
                DeclKind::Import => self.check_signature(&decl.name, &decl.signature)?,
                DeclKind::Local => {}
            }
        }

        let unit_id = self.units.len();
        let mut func_ids = Vec::with_capacity(unit.context().len());
        for (_, decl) in unit.context().decls() {
            let func_id = match decl.kind {
                DeclKind::Export => self.jit.declare_function(&decl.name, Linkage::Export, &decl.signature)?,
                DeclKind::Import => self.jit.declare_function(&decl.name, Linkage::Import, &decl.signature)?,
                DeclKind::Local => self.jit.declare_anonymous_function(&decl.signature)?,
            };
            func_ids.push(func_id);
        }
        for name in unit.exports() {
            self.owners.insert(name.to_string(), unit_id);
        }

        let digest = unit.digest();
        log::info!(
            "committed unit `{}` as #{} ({} functions, digest {:#018x})",
            unit.identifier(),
            unit_id,
            unit.module().len(),
            digest
        );
        self.units.push(CommittedUnit { unit, digest, func_ids, state: UnitState::Pending });
        Ok(unit_id)
    }

    fn check_signature(&self, name: &str, signature: &Signature) -> Result<(), CommitError> {
        if let Some(FuncOrDataId::Func(id)) = self.jit.get_name(name) {
            if self.jit.declarations().get_function_decl(id).signature != *signature {
                return Err(CommitError::IncompatibleSignature(name.to_string()));
            }
        }
        Ok(())
    }

    /// Address of `name`: committed units first, then the main namespace.
    pub fn lookup(&mut self, name: &str) -> Result<Option<*const u8>, NativeError> {
        if let Some(&unit_id) = self.owners.get(name) {
            self.materialize(unit_id)?;
            let record = &self.units[unit_id];
            let Some(decl) = record.unit.context().get(name) else {
                return Ok(None);
            };
            let func_id = record.func_ids[decl.index()];
            return Ok(Some(self.jit.get_finalized_function(func_id)));
        }
        Ok(self.main.resolve(name).map(|resolved| {
            log::debug!("`{}` resolved by the {} resolver", name, resolved.resolver);
            resolved.addr
        }))
    }

    fn materialize(&mut self, root: UnitId) -> Result<(), NativeError> {
        if let UnitState::Failed(reason) = &self.units[root].state {
            return Err(NativeError::PoisonedUnit(
                self.units[root].unit.identifier().to_string(),
                reason.clone(),
            ));
        }
        let pending = self.pending_closure(root);
        if pending.is_empty() {
            return Ok(());
        }
        // Anything the loader cannot resolve would abort inside it, so check up front.
        for &unit_id in &pending {
            self.check_imports(unit_id)?;
        }

        match self.define_units(&pending) {
            Ok(()) => {
                for &unit_id in &pending {
                    self.units[unit_id].state = UnitState::Materialized;
                }
                log::debug!("materialized {} unit(s) for #{}", pending.len(), root);
                Ok(())
            }
            Err(err) => {
                for &unit_id in &pending {
                    self.units[unit_id].state = UnitState::Failed(err.to_string());
                }
                Err(err)
            }
        }
    }

    /// `root` and every pending unit reachable from it through imports.
    fn pending_closure(&self, root: UnitId) -> Vec<UnitId> {
        let mut seen = FxHashSet::default();
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(unit_id) = stack.pop() {
            if !seen.insert(unit_id) || self.units[unit_id].state != UnitState::Pending {
                continue;
            }
            order.push(unit_id);
            for import in self.units[unit_id].unit.imports() {
                if let Some(&owner) = self.owners.get(import) {
                    stack.push(owner);
                }
            }
        }
        order
    }

    fn check_imports(&self, unit_id: UnitId) -> Result<(), NativeError> {
        let unit = &self.units[unit_id].unit;
        for name in unit.imports() {
            match self.owners.get(name) {
                Some(&owner) => {
                    if let UnitState::Failed(reason) = &self.units[owner].state {
                        return Err(NativeError::PoisonedUnit(
                            self.units[owner].unit.identifier().to_string(),
                            reason.clone(),
                        ));
                    }
                }
                None if self.main.resolve(name).is_none() => {
                    return Err(NativeError::UnresolvedSymbol {
                        symbol: name.to_string(),
                        unit: unit.identifier().to_string(),
                    });
                }
                None => {}
            }
        }
        Ok(())
    }

    fn define_units(&mut self, order: &[UnitId]) -> Result<(), NativeError> {
        for &unit_id in order {
            let record = &self.units[unit_id];
            let object = self.compiler.compile(&record.unit, record.digest)?;
            self.define_object(unit_id, &object)?;
        }
        self.jit.finalize_definitions()?;
        Ok(())
    }

    fn define_object(&mut self, unit_id: UnitId, object: &CompiledObject) -> Result<(), NativeError> {
        let record = &self.units[unit_id];
        let identifier = record.unit.identifier();
        let func_id_of = |decl: DeclId| {
            record.func_ids.get(decl.index()).copied().ok_or_else(|| {
                NativeError::CompilationError(format!(
                    "object for `{}` refers to missing u0:{}",
                    identifier,
                    decl.as_u32()
                ))
            })
        };
        for function in &object.functions {
            let func_id = func_id_of(function.decl)?;
            // The loader reads user relocation targets out of a function's
            // name table, so rebuild one naming loader ids.
            let mut names = Function::new();
            let mut name_refs = FxHashMap::default();
            let mut relocs = Vec::with_capacity(function.relocs.len());
            for reloc in &function.relocs {
                let target = match &reloc.target {
                    RelocTarget::Decl(decl) => {
                        let target_id = func_id_of(*decl)?;
                        let name_ref = *name_refs.entry(target_id).or_insert_with(|| {
                            names.declare_imported_user_function(UserExternalName::new(0, target_id.as_u32()))
                        });
                        FinalizedRelocTarget::ExternalName(ExternalName::User(name_ref))
                    }
                    RelocTarget::LibCall(libcall) => {
                        let symbol = (self.libcall_names)(*libcall);
                        if self.main.resolve(&symbol).is_none() {
                            return Err(NativeError::UnresolvedSymbol { symbol, unit: identifier.to_string() });
                        }
                        FinalizedRelocTarget::ExternalName(ExternalName::LibCall(*libcall))
                    }
                    RelocTarget::KnownSymbol(sym) => {
                        FinalizedRelocTarget::ExternalName(ExternalName::KnownSymbol(*sym))
                    }
                    RelocTarget::SelfOffset(offset) => FinalizedRelocTarget::Func(*offset),
                };
                relocs.push(FinalizedMachReloc {
                    offset: reloc.offset,
                    kind: reloc.kind,
                    target,
                    addend: reloc.addend,
                });
            }
            log::trace!(
                "defining `{}` ({} bytes, {} relocs)",
                function.name,
                function.code.len(),
                relocs.len()
            );
            self.jit.define_function_bytes(
                func_id,
                &names,
                function.alignment,
                &function.code,
                &relocs,
            )?;
        }
        Ok(())
    }

    /// Multi-line description of namespaces and units, for trace logs.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "session on {}", self.compiler.isa.triple());
        out.push_str(&self.main.describe());
        for (unit_id, record) in self.units.iter().enumerate() {
            let state = match &record.state {
                UnitState::Pending => "pending".to_string(),
                UnitState::Materialized => "materialized".to_string(),
                UnitState::Failed(reason) => format!("failed: {}", reason),
            };
            let exports: Vec<_> = record.unit.exports().collect();
            let _ = writeln!(
                out,
                "unit #{} `{}` [{}] digest {:#018x} exports [{}]",
                unit_id,
                record.unit.identifier(),
                state,
                record.digest,
                exports.join(", ")
            );
        }
        out
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // SAFETY: `jit` is never used again, and callers must not keep pointers
        // into generated code past the engine's lifetime.
        unsafe {
            let jit = ManuallyDrop::take(&mut self.jit);
            jit.free_memory();
        }
    }
}
