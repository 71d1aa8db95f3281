use cranelift_codegen::ir::{types, InstBuilder};
use cranelift_frontend::{FunctionBuilder as ClifBuilder, FunctionBuilderContext};
use tessera_ir::{Buffer, Expr, Function, FunctionBuilder, ModuleBuilder, Param, ScalarType, Stmt};
use tessera_native::translator::types::translate_signature;
use tessera_native::{
    CodeGen, CodegenError, DeclId, DeclKind, LinkError, Lowering, NativeUnit, VerifyError,
};

mod common;
use common::{add_function, add_module, engine};

// out[0] = ghost[0], where `ghost` was never declared.
fn undeclared_buffer_module() -> tessera_ir::Module {
    let f = FunctionBuilder::new("reads_ghost")
        .param(Param::buffer("out", ScalarType::F32))
        .stmt(Stmt::Store {
            buffer: "out".to_string(),
            index: Expr::int(0),
            value: Expr::load("ghost", Expr::int(0)),
        })
        .build();
    ModuleBuilder::new("ghost")
        .buffer(Buffer::new("out", ScalarType::F32, vec![1]))
        .function(f)
        .build()
        .unwrap()
}

/// Lowers buffers normally but emits a body that returns the wrong type.
struct WrongReturnType {
    inner: CodeGen,
    builder_ctx: FunctionBuilderContext,
}

impl Lowering for WrongReturnType {
    fn lower_buffer(&mut self, unit: &mut NativeUnit, buffer: &Buffer) -> Result<DeclId, CodegenError> {
        self.inner.lower_buffer(unit, buffer)
    }

    fn lower_function(&mut self, unit: &mut NativeUnit, function: &Function) -> Result<DeclId, CodegenError> {
        let signature = translate_signature(unit.context(), function);
        let id = unit.declare(&function.name, DeclKind::Export, signature)?;
        let mut func = unit.context().new_function(id);
        {
            let mut b = ClifBuilder::new(&mut func, &mut self.builder_ctx);
            let entry = b.create_block();
            b.append_block_params_for_function_params(entry);
            b.switch_to_block(entry);
            b.seal_block(entry);
            let bogus = b.ins().f32const(1.0);
            b.ins().return_(&[bogus]);
            b.finalize();
        }
        unit.define(id, func)?;
        Ok(id)
    }
}

#[test]
fn test_undeclared_buffer_rejected() {
    let engine = engine();
    let err = engine.try_link(&undeclared_buffer_module()).unwrap_err();
    assert!(!err.is_recoverable());
    match err {
        LinkError::Codegen { source: CodegenError::UnknownBuffer { function, buffer }, .. } => {
            assert_eq!(function, "reads_ghost");
            assert_eq!(buffer, "ghost");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(engine.stats().units_linked, 0);
}

#[test]
#[should_panic(expected = "internal code generation failure")]
fn test_link_panics_on_malformed_function() {
    let engine = engine();
    engine.link(&undeclared_buffer_module());
}

#[test]
fn test_invalid_native_ir_caught_by_verifier() {
    let engine = engine();
    let mut lowering = WrongReturnType { inner: CodeGen::new(), builder_ctx: FunctionBuilderContext::new() };
    let module = ModuleBuilder::new("bogus").function(add_function("bogus_add")).build().unwrap();

    let err = engine.try_link_with(&module, &mut lowering).unwrap_err();
    match err {
        LinkError::Verify { stage, source: VerifyError::Function { name, .. }, .. } => {
            assert_eq!(stage, "function");
            assert_eq!(name, "bogus_add");
        }
        other => panic!("unexpected error: {other}"),
    }
    // Nothing was committed.
    assert!(engine.lookup("bogus_add").is_none());
}

#[test]
fn test_oversized_buffer_rejected() {
    let engine = engine();
    for (name, dtype, shape) in [
        ("huge", ScalarType::F64, vec![1usize << 61]),
        ("wide", ScalarType::I32, vec![1usize << 40, 1usize << 40]),
        ("edge", ScalarType::I64, vec![(isize::MAX as usize) / 8]),
    ] {
        let module = ModuleBuilder::new(name)
            .buffer(Buffer::new(name, dtype, shape))
            .build()
            .unwrap();
        match engine.try_link(&module) {
            Err(LinkError::Codegen { source: CodegenError::BufferTooLarge(buffer), .. }) => {
                assert_eq!(buffer, name);
            }
            other => panic!("`{name}` was not rejected: {other:?}"),
        }
    }
    assert_eq!(engine.stats().units_linked, 0);
}

#[test]
fn test_type_mismatch_rejected() {
    let engine = engine();
    let f = FunctionBuilder::new("mixed")
        .param(Param::scalar("a", ScalarType::I32))
        .param(Param::scalar("b", ScalarType::F32))
        .returns(ScalarType::I32)
        .stmt(Stmt::Return(Expr::add(Expr::var("a"), Expr::var("b"))))
        .build();
    let module = ModuleBuilder::new("mixed").function(f).build().unwrap();
    assert!(matches!(
        engine.try_link(&module),
        Err(LinkError::Codegen { source: CodegenError::TypeMismatch { .. }, .. })
    ));
}

#[test]
fn test_missing_return_rejected() {
    let engine = engine();
    let f = FunctionBuilder::new("no_return")
        .returns(ScalarType::I64)
        .stmt(Stmt::Let { var: "x".to_string(), value: Expr::int(1) })
        .build();
    let module = ModuleBuilder::new("no_return").function(f).build().unwrap();
    assert!(matches!(
        engine.try_link(&module),
        Err(LinkError::Codegen { source: CodegenError::MissingReturn(_), .. })
    ));
}

#[test]
fn test_unknown_variable_rejected() {
    let engine = engine();
    let f = FunctionBuilder::new("uses_y")
        .returns(ScalarType::I64)
        .stmt(Stmt::Return(Expr::var("y")))
        .build();
    let module = ModuleBuilder::new("uses_y").function(f).build().unwrap();
    assert!(matches!(
        engine.try_link(&module),
        Err(LinkError::Codegen { source: CodegenError::UnknownVariable { .. }, .. })
    ));
}

#[test]
fn test_engine_usable_after_rejection() {
    let engine = engine();
    assert!(engine.try_link(&undeclared_buffer_module()).is_err());
    assert!(engine.link(&add_module("recovered")));
    let add: extern "C" fn(i64, i64) -> i64 = unsafe { engine.lookup_fn("add").unwrap() };
    assert_eq!(add(2, 3), 5);
}
