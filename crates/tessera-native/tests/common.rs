// Common helpers for execution engine integration tests
#![allow(dead_code)]

use std::sync::Once;
use tessera_ir::{
    Buffer, CmpOp, Expr, Function, FunctionBuilder, Module, ModuleBuilder, Param, ScalarType, Stmt,
};
use tessera_native::{EngineOptions, ExecutionEngine};

static INIT: Once = Once::new();

/// Logger plus built-in runtime kernels, once per test binary.
pub fn init() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
        tessera_rt::register_builtin_kernels().unwrap();
    });
}

pub fn engine() -> ExecutionEngine {
    init();
    ExecutionEngine::create(EngineOptions::default())
}

pub fn engine_with(options: EngineOptions) -> ExecutionEngine {
    init();
    ExecutionEngine::create(options)
}

// add(a: i64, b: i64) -> i64
pub fn add_function(name: &str) -> Function {
    FunctionBuilder::new(name)
        .param(Param::scalar("a", ScalarType::I64))
        .param(Param::scalar("b", ScalarType::I64))
        .returns(ScalarType::I64)
        .stmt(Stmt::Return(Expr::add(Expr::var("a"), Expr::var("b"))))
        .build()
}

/// One buffer declaration and `add(a, b) = a + b`.
pub fn add_module(name: &str) -> Module {
    ModuleBuilder::new(name)
        .buffer(Buffer::new("scratch", ScalarType::F32, vec![4]))
        .function(add_function("add"))
        .build()
        .unwrap()
}

// name() -> i64 { return value }
pub fn const_function(name: &str, value: i64) -> Function {
    FunctionBuilder::new(name)
        .returns(ScalarType::I64)
        .stmt(Stmt::Return(Expr::int(value)))
        .build()
}

pub fn const_module(module: &str, function: &str, value: i64) -> Module {
    ModuleBuilder::new(module).function(const_function(function, value)).build().unwrap()
}

// vadd(a, b, out, n): for i in 0..n { out[i] = a[i] + b[i] }
pub fn vector_add_function(name: &str) -> Function {
    FunctionBuilder::new(name)
        .param(Param::buffer("a", ScalarType::F32))
        .param(Param::buffer("b", ScalarType::F32))
        .param(Param::buffer("out", ScalarType::F32))
        .param(Param::scalar("n", ScalarType::I64))
        .stmt(Stmt::For {
            var: "i".to_string(),
            extent: Expr::var("n"),
            body: vec![Stmt::Store {
                buffer: "out".to_string(),
                index: Expr::var("i"),
                value: Expr::add(
                    Expr::load("a", Expr::var("i")),
                    Expr::load("b", Expr::var("i")),
                ),
            }],
        })
        .build()
}

// relu(x: f32) -> f32 { return x > 0 ? x : 0 }
pub fn relu_function(name: &str) -> Function {
    FunctionBuilder::new(name)
        .param(Param::scalar("x", ScalarType::F32))
        .returns(ScalarType::F32)
        .stmt(Stmt::Return(Expr::Select {
            cmp: CmpOp::Gt,
            lhs: Box::new(Expr::var("x")),
            rhs: Box::new(Expr::f32(0.0)),
            then: Box::new(Expr::var("x")),
            otherwise: Box::new(Expr::f32(0.0)),
        }))
        .build()
}

// name(x) -> ret { return callee(x) }
pub fn call_function(name: &str, callee: &str, ty: ScalarType) -> Function {
    FunctionBuilder::new(name)
        .param(Param::scalar("x", ty))
        .returns(ty)
        .stmt(Stmt::Return(Expr::call(callee, vec![Expr::var("x")], ty)))
        .build()
}
