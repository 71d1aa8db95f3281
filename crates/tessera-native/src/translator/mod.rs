//! Lowering of `tessera-ir` modules into native units.

pub mod buffer;
pub mod context;
pub mod expr;
pub mod func;
pub mod stmt;
pub mod types;

use crate::error::CodegenError;
use crate::unit::{DeclId, NativeUnit};
use cranelift_frontend::FunctionBuilderContext;
use tessera_ir::{Buffer, Function as IrFunction};

/// Lowers one intermediate construct at a time into a unit.
///
/// The engine creates one lowering per link and feeds it every buffer, then
/// every function, of the module being linked.
pub trait Lowering {
    fn lower_buffer(&mut self, unit: &mut NativeUnit, buffer: &Buffer) -> Result<DeclId, CodegenError>;

    fn lower_function(
        &mut self,
        unit: &mut NativeUnit,
        function: &IrFunction,
    ) -> Result<DeclId, CodegenError>;
}

/// The built-in code generator.
pub struct CodeGen {
    builder_ctx: FunctionBuilderContext,
}

impl CodeGen {
    pub fn new() -> Self {
        Self { builder_ctx: FunctionBuilderContext::new() }
    }

    fn reset_after<T>(&mut self, result: Result<T, CodegenError>) -> Result<T, CodegenError> {
        // A builder abandoned mid-function leaves its context dirty.
        if result.is_err() {
            self.builder_ctx = FunctionBuilderContext::new();
        }
        result
    }
}

impl Default for CodeGen {
    fn default() -> Self {
        Self::new()
    }
}

impl Lowering for CodeGen {
    fn lower_buffer(&mut self, unit: &mut NativeUnit, buffer: &Buffer) -> Result<DeclId, CodegenError> {
        let result = buffer::translate_buffer(&mut self.builder_ctx, unit, buffer);
        self.reset_after(result)
    }

    fn lower_function(
        &mut self,
        unit: &mut NativeUnit,
        function: &IrFunction,
    ) -> Result<DeclId, CodegenError> {
        let result = func::translate_function(&mut self.builder_ctx, unit, function);
        self.reset_after(result)
    }
}
