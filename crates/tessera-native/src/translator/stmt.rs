use crate::error::CodegenError;
use crate::translator::context::{Binding, TranslationContext};
use crate::translator::expr::{element_address, translate_expr};
use crate::unit::NativeContext;
use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::{types, InstBuilder, MemFlags};
use cranelift_frontend::FunctionBuilder;
use tessera_ir::{Expr, ScalarType, Stmt};

/// Translates a statement list. Returns `true` if control cannot fall off its end.
///
/// Statements after a `Return` are unreachable and are not emitted.
pub fn translate_block(
    builder: &mut FunctionBuilder,
    ctx: &mut TranslationContext,
    decls: &mut NativeContext,
    stmts: &[Stmt],
) -> Result<bool, CodegenError> {
    for stmt in stmts {
        if translate_stmt(builder, ctx, decls, stmt)? {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn translate_stmt(
    builder: &mut FunctionBuilder,
    ctx: &mut TranslationContext,
    decls: &mut NativeContext,
    stmt: &Stmt,
) -> Result<bool, CodegenError> {
    match stmt {
        Stmt::Let { var, value } => {
            let (v, ty) = translate_expr(builder, ctx, decls, value)?;
            let variable = ctx.new_variable(builder, ty);
            builder.def_var(variable, v);
            ctx.bind(var, Binding::Scalar { var: variable, ty });
            Ok(false)
        }
        Stmt::Assign { var, value } => {
            let (variable, ty) = ctx.scalar(var)?;
            let (v, vty) = translate_expr(builder, ctx, decls, value)?;
            ctx.expect_type(ty, vty)?;
            builder.def_var(variable, v);
            Ok(false)
        }
        Stmt::Store { buffer, index, value } => {
            let (addr, dtype) = element_address(builder, ctx, decls, buffer, index)?;
            let (v, vty) = translate_expr(builder, ctx, decls, value)?;
            ctx.expect_type(dtype, vty)?;
            builder.ins().store(MemFlags::trusted(), v, addr, 0);
            Ok(false)
        }
        Stmt::For { var, extent, body } => {
            translate_for(builder, ctx, decls, var, extent, body)?;
            Ok(false)
        }
        Stmt::Eval(expr) => {
            translate_expr(builder, ctx, decls, expr)?;
            Ok(false)
        }
        Stmt::Return(expr) => {
            let Some(ret) = ctx.return_type() else {
                return Err(CodegenError::UnexpectedReturn(ctx.function_name().to_string()));
            };
            let (v, ty) = translate_expr(builder, ctx, decls, expr)?;
            ctx.expect_type(ret, ty)?;
            builder.ins().return_(&[v]);
            Ok(true)
        }
    }
}

// for var in 0..extent:
//
//   current:  jump header
//   header:   brif i < extent, body, exit
//   body:     ...; i += 1; jump header
//   exit:
fn translate_for(
    builder: &mut FunctionBuilder,
    ctx: &mut TranslationContext,
    decls: &mut NativeContext,
    var: &str,
    extent: &Expr,
    body: &[Stmt],
) -> Result<(), CodegenError> {
    let (extent, extent_ty) = translate_expr(builder, ctx, decls, extent)?;
    let extent = match extent_ty {
        ScalarType::I64 => extent,
        ScalarType::I32 => builder.ins().sextend(types::I64, extent),
        found => {
            return Err(CodegenError::TypeMismatch {
                function: ctx.function_name().to_string(),
                expected: ScalarType::I64,
                found,
            })
        }
    };

    let induction = ctx.new_variable(builder, ScalarType::I64);
    let zero = builder.ins().iconst(types::I64, 0);
    builder.def_var(induction, zero);

    let header = builder.create_block();
    let body_block = builder.create_block();
    let exit = builder.create_block();
    builder.ins().jump(header, &[]);

    builder.switch_to_block(header);
    let i = builder.use_var(induction);
    let in_range = builder.ins().icmp(IntCC::SignedLessThan, i, extent);
    builder.ins().brif(in_range, body_block, &[], exit, &[]);

    builder.switch_to_block(body_block);
    builder.seal_block(body_block);
    ctx.push_scope();
    ctx.bind(var, Binding::Scalar { var: induction, ty: ScalarType::I64 });
    let terminated = translate_block(builder, ctx, decls, body);
    ctx.pop_scope();
    if !terminated? {
        let i = builder.use_var(induction);
        let next = builder.ins().iadd_imm(i, 1);
        builder.def_var(induction, next);
        builder.ins().jump(header, &[]);
    }
    builder.seal_block(header);

    builder.switch_to_block(exit);
    builder.seal_block(exit);
    Ok(())
}
