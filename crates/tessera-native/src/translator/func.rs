use crate::error::CodegenError;
use crate::translator::context::{Binding, TranslationContext};
use crate::translator::stmt::translate_block;
use crate::translator::types::translate_signature;
use crate::unit::{DeclId, DeclKind, NativeUnit};
use cranelift_codegen::ir::InstBuilder;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use tessera_ir::{Function as IrFunction, ParamKind};

/// Translates an intermediate function into an exported native function of `unit`.
pub fn translate_function(
    builder_ctx: &mut FunctionBuilderContext,
    unit: &mut NativeUnit,
    function: &IrFunction,
) -> Result<DeclId, CodegenError> {
    let signature = translate_signature(unit.context(), function);
    let id = unit.declare(&function.name, DeclKind::Export, signature)?;
    let mut func = unit.context().new_function(id);

    {
        let mut builder = FunctionBuilder::new(&mut func, builder_ctx);
        let entry_block = builder.create_block();
        builder.append_block_params_for_function_params(entry_block);
        builder.switch_to_block(entry_block);
        builder.seal_block(entry_block);

        let mut ctx = TranslationContext::new(&function.name, function.ret);
        let entry_params = builder.block_params(entry_block).to_vec();
        for (param, value) in function.params.iter().zip(entry_params) {
            match param.kind {
                ParamKind::Scalar(ty) => {
                    let var = ctx.new_variable(&mut builder, ty);
                    builder.def_var(var, value);
                    ctx.bind(&param.name, Binding::Scalar { var, ty });
                }
                ParamKind::Buffer(dtype) => {
                    ctx.bind(&param.name, Binding::Buffer { ptr: value, dtype });
                }
            }
        }

        let terminated = translate_block(&mut builder, &mut ctx, unit.context_mut(), &function.body)?;
        if !terminated {
            if function.ret.is_some() {
                return Err(CodegenError::MissingReturn(function.name.clone()));
            }
            builder.ins().return_(&[]);
        }

        builder.seal_all_blocks();
        builder.finalize();
    }

    log::trace!("translated `{}`:\n{}", function.name, func.display());
    unit.define(id, func)?;
    Ok(id)
}
