//! The native unit: a Cranelift module and the declaration table it is written against.
//!
//! Functions inside a unit never refer to each other by symbol name. Every
//! callee is a [`DeclId`] in the unit's [`NativeContext`], encoded as
//! `UserExternalName { namespace: 0, index: decl }`. Names only become global
//! when the session commits the unit.

use crate::error::CodegenError;
use cranelift_codegen::ir::{
    AbiParam, ExtFuncData, ExternalName, FuncRef, Function, Signature, Type, UserExternalName,
    UserFuncName,
};
use cranelift_codegen::isa::{CallConv, TargetIsa};
use rustc_hash::{FxHashMap, FxHasher};
use std::fmt::Write as _;
use std::hash::{Hash, Hasher};

/// Index of a declaration in a [`NativeContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclId(u32);

impl DeclId {
    pub fn from_u32(index: u32) -> Self {
        DeclId(index)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclKind {
    /// Defined here and visible to every other unit and to lookup.
    Export,
    /// Defined here, private to the unit.
    Local,
    /// Defined elsewhere: another unit, a runtime kernel or the host process.
    Import,
}

impl DeclKind {
    pub fn is_defined_here(self) -> bool {
        !matches!(self, DeclKind::Import)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub signature: Signature,
    pub kind: DeclKind,
}

/// Every declaration a native module refers to.
///
/// Local declarations are named in their own table: a local helper and a
/// global symbol may share a name without meeting.
#[derive(Debug)]
pub struct NativeContext {
    decls: Vec<Declaration>,
    by_name: FxHashMap<String, DeclId>,
    locals: FxHashMap<String, DeclId>,
    call_conv: CallConv,
    pointer_type: Type,
}

impl NativeContext {
    pub fn new(isa: &dyn TargetIsa) -> Self {
        Self {
            decls: Vec::new(),
            by_name: FxHashMap::default(),
            locals: FxHashMap::default(),
            call_conv: isa.default_call_conv(),
            pointer_type: isa.pointer_type(),
        }
    }

    pub fn call_conv(&self) -> CallConv {
        self.call_conv
    }

    pub fn pointer_type(&self) -> Type {
        self.pointer_type
    }

    pub fn make_signature(&self, params: &[Type], ret: Option<Type>) -> Signature {
        let mut sig = Signature::new(self.call_conv);
        sig.params.extend(params.iter().map(|&ty| AbiParam::new(ty)));
        sig.returns.extend(ret.map(AbiParam::new));
        sig
    }

    /// Declares `name`, or merges with an existing declaration of it.
    ///
    /// An import may later be upgraded to a definition (a call to a function
    /// that appears further down the module). Two definitions of one name, or
    /// two different signatures, are errors.
    pub fn declare(
        &mut self,
        name: &str,
        kind: DeclKind,
        signature: Signature,
    ) -> Result<DeclId, CodegenError> {
        let table = match kind {
            DeclKind::Local => &mut self.locals,
            DeclKind::Export | DeclKind::Import => &mut self.by_name,
        };
        if let Some(&id) = table.get(name) {
            let existing = &mut self.decls[id.index()];
            if existing.signature != signature {
                return Err(CodegenError::SignatureMismatch(name.to_string()));
            }
            match (existing.kind, kind) {
                (DeclKind::Import, new_kind) => existing.kind = new_kind,
                (_, DeclKind::Import) => {}
                _ => return Err(CodegenError::DuplicateDeclaration(name.to_string())),
            }
            return Ok(id);
        }
        let id = DeclId(self.decls.len() as u32);
        self.decls.push(Declaration { name: name.to_string(), signature, kind });
        table.insert(name.to_string(), id);
        Ok(id)
    }

    /// Exported or imported declaration called `name`.
    pub fn get(&self, name: &str) -> Option<DeclId> {
        self.by_name.get(name).copied()
    }

    /// Unit-private declaration called `name`.
    pub fn local(&self, name: &str) -> Option<DeclId> {
        self.locals.get(name).copied()
    }

    pub fn decl(&self, id: DeclId) -> &Declaration {
        &self.decls[id.index()]
    }

    pub fn try_decl(&self, index: u32) -> Option<&Declaration> {
        self.decls.get(index as usize)
    }

    pub fn decls(&self) -> impl Iterator<Item = (DeclId, &Declaration)> {
        self.decls.iter().enumerate().map(|(i, d)| (DeclId(i as u32), d))
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Makes `callee` callable from `func`, like `Module::declare_func_in_func`.
    pub fn declare_func_in_func(&self, callee: DeclId, func: &mut Function) -> FuncRef {
        let decl = self.decl(callee);
        let signature = func.import_signature(decl.signature.clone());
        let name_ref =
            func.declare_imported_user_function(UserExternalName::new(0, callee.as_u32()));
        func.import_function(ExtFuncData {
            name: ExternalName::user(name_ref),
            signature,
            colocated: false,
        })
    }

    /// Fresh, empty function for a declaration, named after its `DeclId`.
    pub fn new_function(&self, id: DeclId) -> Function {
        Function::with_name_signature(UserFuncName::user(0, id.as_u32()), self.decl(id).signature.clone())
    }
}

/// Function bodies of a unit, keyed by declaration.
#[derive(Debug)]
pub struct NativeModule {
    identifier: String,
    functions: Vec<(DeclId, Function)>,
}

impl NativeModule {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn function(&self, id: DeclId) -> Option<&Function> {
        self.functions.iter().find(|(d, _)| *d == id).map(|(_, f)| f)
    }

    pub fn functions(&self) -> impl Iterator<Item = (DeclId, &Function)> {
        self.functions.iter().map(|(d, f)| (*d, f))
    }

    pub fn functions_mut(&mut self) -> impl Iterator<Item = (DeclId, &mut Function)> {
        self.functions.iter_mut().map(|(d, f)| (*d, f))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// A native module together with its context. Always moved as one value.
#[derive(Debug)]
pub struct NativeUnit {
    module: NativeModule,
    context: NativeContext,
}

impl NativeUnit {
    pub fn new(identifier: impl Into<String>, isa: &dyn TargetIsa) -> Self {
        Self {
            module: NativeModule { identifier: identifier.into(), functions: Vec::new() },
            context: NativeContext::new(isa),
        }
    }

    pub fn identifier(&self) -> &str {
        self.module.identifier()
    }

    pub fn module(&self) -> &NativeModule {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut NativeModule {
        &mut self.module
    }

    pub fn context(&self) -> &NativeContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut NativeContext {
        &mut self.context
    }

    pub fn declare(
        &mut self,
        name: &str,
        kind: DeclKind,
        signature: Signature,
    ) -> Result<DeclId, CodegenError> {
        self.context.declare(name, kind, signature)
    }

    /// Attaches the body of a declaration that is defined in this unit.
    pub fn define(&mut self, id: DeclId, func: Function) -> Result<(), CodegenError> {
        let decl = self.context.decl(id);
        if !decl.kind.is_defined_here() || self.module.function(id).is_some() {
            return Err(CodegenError::DuplicateDeclaration(decl.name.clone()));
        }
        self.module.functions.push((id, func));
        Ok(())
    }

    /// Names this unit makes visible to the session.
    pub fn exports(&self) -> impl Iterator<Item = &str> {
        self.context
            .decls()
            .filter(|(_, d)| d.kind == DeclKind::Export)
            .map(|(_, d)| d.name.as_str())
    }

    pub fn imports(&self) -> impl Iterator<Item = &str> {
        self.context
            .decls()
            .filter(|(_, d)| d.kind == DeclKind::Import)
            .map(|(_, d)| d.name.as_str())
    }

    /// Content digest over declarations and function bodies.
    ///
    /// Two units with the same identifier and the same native IR hash equal;
    /// any change to a body, signature or linkage changes the digest.
    pub fn digest(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.identifier().hash(&mut hasher);
        for (id, decl) in self.context.decls() {
            id.hash(&mut hasher);
            decl.name.hash(&mut hasher);
            decl.kind.hash(&mut hasher);
            decl.signature.to_string().hash(&mut hasher);
        }
        for (id, func) in self.module.functions() {
            id.hash(&mut hasher);
            func.display().to_string().hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Human-readable listing of declarations and CLIF bodies.
    pub fn display(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "; unit {}", self.identifier());
        for (id, decl) in self.context.decls() {
            let _ = writeln!(out, "; u0:{} {:?} {} {}", id.as_u32(), decl.kind, decl.name, decl.signature);
        }
        for (_, func) in self.module.functions() {
            let _ = write!(out, "{}", func.display());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptLevel;
    use crate::host::build_isa;
    use cranelift_codegen::ir::{types, InstBuilder};
    use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};

    fn unit(name: &str) -> NativeUnit {
        let isa = build_isa(OptLevel::None, false).unwrap();
        NativeUnit::new(name, isa.as_ref())
    }

    fn define_const(unit: &mut NativeUnit, name: &str, value: i64) {
        let sig = unit.context().make_signature(&[], Some(types::I64));
        let id = unit.declare(name, DeclKind::Export, sig).unwrap();
        let mut func = unit.context().new_function(id);
        let mut fctx = FunctionBuilderContext::new();
        let mut b = FunctionBuilder::new(&mut func, &mut fctx);
        let entry = b.create_block();
        b.switch_to_block(entry);
        b.seal_block(entry);
        let v = b.ins().iconst(types::I64, value);
        b.ins().return_(&[v]);
        b.finalize();
        unit.define(id, func).unwrap();
    }

    #[test]
    fn test_import_upgrades_to_definition() {
        let mut unit = unit("m");
        let sig = unit.context().make_signature(&[types::I64], Some(types::I64));
        let a = unit.declare("f", DeclKind::Import, sig.clone()).unwrap();
        let b = unit.declare("f", DeclKind::Export, sig.clone()).unwrap();
        assert_eq!(a, b);
        assert_eq!(unit.context().decl(a).kind, DeclKind::Export);
        // Later references keep the definition.
        unit.declare("f", DeclKind::Import, sig).unwrap();
        assert_eq!(unit.context().decl(a).kind, DeclKind::Export);
    }

    #[test]
    fn test_double_definition_rejected() {
        let mut unit = unit("m");
        let sig = unit.context().make_signature(&[], None);
        unit.declare("g", DeclKind::Export, sig.clone()).unwrap();
        assert_eq!(
            unit.declare("g", DeclKind::Export, sig.clone()),
            Err(CodegenError::DuplicateDeclaration("g".to_string()))
        );
        unit.declare("l", DeclKind::Local, sig.clone()).unwrap();
        assert_eq!(
            unit.declare("l", DeclKind::Local, sig),
            Err(CodegenError::DuplicateDeclaration("l".to_string()))
        );
    }

    #[test]
    fn test_local_and_export_share_a_name() {
        let mut unit = unit("m");
        let sig = unit.context().make_signature(&[types::I64], Some(types::I64));
        let local = unit.declare("round", DeclKind::Local, sig.clone()).unwrap();
        let export = unit.declare("round", DeclKind::Export, sig).unwrap();
        assert_ne!(local, export);
        assert_eq!(unit.context().local("round"), Some(local));
        assert_eq!(unit.context().get("round"), Some(export));
        assert_eq!(unit.exports().collect::<Vec<_>>(), vec!["round"]);
    }

    #[test]
    fn test_signature_conflict_rejected() {
        let mut unit = unit("m");
        let one = unit.context().make_signature(&[types::I64], None);
        let two = unit.context().make_signature(&[types::F32], None);
        unit.declare("h", DeclKind::Import, one).unwrap();
        assert_eq!(
            unit.declare("h", DeclKind::Import, two),
            Err(CodegenError::SignatureMismatch("h".to_string()))
        );
    }

    #[test]
    fn test_digest_tracks_content() {
        let mut a = unit("m");
        define_const(&mut a, "k", 1);
        let mut b = unit("m");
        define_const(&mut b, "k", 1);
        let mut c = unit("m");
        define_const(&mut c, "k", 2);
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn test_exports_and_imports() {
        let mut unit = unit("m");
        define_const(&mut unit, "k", 7);
        let sig = unit.context().make_signature(&[], None);
        unit.declare("ext", DeclKind::Import, sig.clone()).unwrap();
        unit.declare("helper", DeclKind::Local, sig).unwrap();
        assert_eq!(unit.exports().collect::<Vec<_>>(), vec!["k"]);
        assert_eq!(unit.imports().collect::<Vec<_>>(), vec!["ext"]);
        assert!(unit.display().contains("; unit m"));
    }
}
